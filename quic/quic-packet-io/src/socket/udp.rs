// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::{RecvSlot, Socket};
use crate::{features::Sockopt, message::cmsg::Storage};
use core::{ffi::c_int, mem::size_of};
use libc::{sockaddr_in, sockaddr_in6, sockaddr_storage, socklen_t, AF_INET, AF_INET6};
use std::{
    io,
    net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV6, UdpSocket},
    os::fd::{AsRawFd, RawFd},
};

/// Capacity of the aligned copy of the control messages passed to `sendmsg`
const SEND_CONTROL_LEN: usize = 256;

/// Sends the datagram with `sendmsg`
///
/// `remote` must use the socket's address family. Dual-stack IPv6 sockets
/// expect IPv4 peers as IPv4-mapped addresses.
impl Socket for UdpSocket {
    #[inline]
    fn local_addr(&self) -> io::Result<SocketAddr> {
        UdpSocket::local_addr(self)
    }

    #[inline]
    fn recv_batch(&self, slots: &mut [RecvSlot]) -> io::Result<usize> {
        debug_assert!(!slots.is_empty());

        cfg_if::cfg_if! {
            if #[cfg(quic_packet_io_mmsg)] {
                recv_mmsg(self.as_raw_fd(), slots)
            } else {
                recv_one(self.as_raw_fd(), slots)
            }
        }
    }

    #[inline]
    fn send_msg(&self, payload: &[u8], remote: &SocketAddr, control: &[u8]) -> io::Result<usize> {
        send_msg(self.as_raw_fd(), payload, remote, control)
    }

    #[inline]
    fn set_option(&self, (level, name): Sockopt, value: c_int) -> io::Result<()> {
        libc_call(|| unsafe {
            libc::setsockopt(
                self.as_raw_fd(),
                level,
                name,
                (&value as *const c_int).cast(),
                size_of::<c_int>() as socklen_t,
            ) as _
        })?;
        Ok(())
    }

    #[inline]
    fn get_option(&self, (level, name): Sockopt) -> io::Result<c_int> {
        let mut value: c_int = 0;
        let mut len = size_of::<c_int>() as socklen_t;
        libc_call(|| unsafe {
            libc::getsockopt(
                self.as_raw_fd(),
                level,
                name,
                (&mut value as *mut c_int).cast(),
                &mut len,
            ) as _
        })?;
        Ok(value)
    }
}

#[inline]
fn libc_call(call: impl FnOnce() -> isize) -> io::Result<usize> {
    let res = call();

    ensure!(res >= 0, Err(io::Error::last_os_error()));

    Ok(res as _)
}

#[cfg_attr(quic_packet_io_mmsg, allow(dead_code))]
#[inline]
fn recv_one(fd: RawFd, slots: &mut [RecvSlot]) -> io::Result<usize> {
    let Some(slot) = slots.first_mut() else {
        return Ok(0);
    };

    let mut name = unsafe { core::mem::zeroed::<sockaddr_storage>() };
    let mut msg = unsafe { core::mem::zeroed::<libc::msghdr>() };

    let (payload, control) = slot.parts_mut();
    let mut iov = libc::iovec {
        iov_base: payload.as_mut_ptr().cast(),
        iov_len: payload.len(),
    };

    msg.msg_name = (&mut name as *mut sockaddr_storage).cast();
    msg.msg_namelen = size_of::<sockaddr_storage>() as _;
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;
    msg.msg_control = control.as_mut_ptr().cast();
    msg.msg_controllen = control.len() as _;

    let len = libc_call(|| unsafe { libc::recvmsg(fd, &mut msg, 0) as _ })?;

    let remote = decode_addr(&name, msg.msg_namelen);
    slot.complete(len, remote, msg.msg_controllen as usize);
    if msg.msg_flags & libc::MSG_TRUNC != 0 {
        slot.mark_truncated();
    }

    Ok(1)
}

#[cfg(quic_packet_io_mmsg)]
#[inline]
fn recv_mmsg(fd: RawFd, slots: &mut [RecvSlot]) -> io::Result<usize> {
    const MAX_BATCH: usize = 64;

    let count = slots.len().min(MAX_BATCH);

    let mut names = [unsafe { core::mem::zeroed::<sockaddr_storage>() }; MAX_BATCH];
    let mut iovecs = [unsafe { core::mem::zeroed::<libc::iovec>() }; MAX_BATCH];
    let mut msgs = [unsafe { core::mem::zeroed::<libc::mmsghdr>() }; MAX_BATCH];

    let names_ptr = names.as_mut_ptr();
    let iovecs_ptr = iovecs.as_mut_ptr();

    for (idx, (slot, msg)) in slots.iter_mut().zip(msgs.iter_mut()).take(count).enumerate() {
        let (payload, control) = slot.parts_mut();
        let hdr = &mut msg.msg_hdr;

        unsafe {
            // SAFETY: `idx` is less than `MAX_BATCH`
            let iov = iovecs_ptr.add(idx);
            (*iov).iov_base = payload.as_mut_ptr().cast();
            (*iov).iov_len = payload.len();
            hdr.msg_iov = iov;
            hdr.msg_name = names_ptr.add(idx).cast();
        }

        hdr.msg_iovlen = 1;
        hdr.msg_namelen = size_of::<sockaddr_storage>() as _;
        hdr.msg_control = control.as_mut_ptr().cast();
        hdr.msg_controllen = control.len() as _;
    }

    let received = libc_call(|| unsafe {
        libc::recvmmsg(
            fd,
            msgs.as_mut_ptr(),
            count as _,
            libc::MSG_WAITFORONE as _,
            core::ptr::null_mut(),
        ) as _
    })?;

    for (idx, (slot, msg)) in slots.iter_mut().zip(msgs.iter()).take(received).enumerate() {
        // SAFETY: the kernel initialized the first `received` names
        let name = unsafe { &*names_ptr.add(idx) };
        let remote = decode_addr(name, msg.msg_hdr.msg_namelen);
        slot.complete(
            msg.msg_len as usize,
            remote,
            msg.msg_hdr.msg_controllen as usize,
        );
        if msg.msg_hdr.msg_flags & libc::MSG_TRUNC != 0 {
            slot.mark_truncated();
        }
    }

    Ok(received)
}

#[inline]
fn send_msg(fd: RawFd, payload: &[u8], remote: &SocketAddr, control: &[u8]) -> io::Result<usize> {
    ensure!(
        control.len() <= SEND_CONTROL_LEN,
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "control messages exceed the send buffer"
        ))
    );

    let addr = socket2::SockAddr::from(*remote);

    // the kernel expects the control buffer to be aligned to `cmsghdr`
    let mut storage = Storage::<SEND_CONTROL_LEN>::default();
    storage.as_mut_capacity()[..control.len()].copy_from_slice(control);
    storage.set_len(control.len());

    let mut msg = unsafe { core::mem::zeroed::<libc::msghdr>() };
    let mut iov = libc::iovec {
        iov_base: payload.as_ptr() as *mut _,
        iov_len: payload.len(),
    };

    msg.msg_name = addr.as_ptr() as *mut _;
    msg.msg_namelen = addr.len();
    msg.msg_iov = &mut iov;
    msg.msg_iovlen = 1;

    if !storage.is_empty() {
        msg.msg_control = storage.as_mut_ptr().cast();
        msg.msg_controllen = storage.len() as _;
    }

    libc_call(|| unsafe { libc::sendmsg(fd, &msg, 0) as _ })
}

#[inline]
fn decode_addr(name: &sockaddr_storage, len: socklen_t) -> SocketAddr {
    let len = len as usize;
    match name.ss_family as c_int {
        AF_INET if len >= size_of::<sockaddr_in>() => {
            let addr: &sockaddr_in = unsafe { &*(name as *const sockaddr_storage).cast() };
            let ip = Ipv4Addr::from(addr.sin_addr.s_addr.to_ne_bytes());
            SocketAddr::new(ip.into(), u16::from_be(addr.sin_port))
        }
        AF_INET6 if len >= size_of::<sockaddr_in6>() => {
            let addr: &sockaddr_in6 = unsafe { &*(name as *const sockaddr_storage).cast() };
            SocketAddrV6::new(
                Ipv6Addr::from(addr.sin6_addr.s6_addr),
                u16::from_be(addr.sin6_port),
                addr.sin6_flowinfo,
                addr.sin6_scope_id,
            )
            .into()
        }
        family => {
            tracing::debug!(family, len, "received datagram with an unknown address family");
            SocketAddr::new(Ipv4Addr::UNSPECIFIED.into(), 0)
        }
    }
}
