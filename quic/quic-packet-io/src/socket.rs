// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! The raw socket primitives used by a [`Conn`](crate::Conn)

use crate::{
    buffer::PacketBuffer,
    features::Sockopt,
    message::cmsg::{self, Storage},
};
use core::ffi::c_int;
use std::{io, net::SocketAddr};

pub mod options;
#[cfg(unix)]
mod udp;

/// A datagram socket with batched receive and control message support
pub trait Socket {
    fn local_addr(&self) -> io::Result<SocketAddr>;

    /// Receives up to `slots.len()` datagrams and returns the number received
    ///
    /// Each filled slot must be [completed](RecvSlot::complete) and datagrams
    /// larger than the payload buffer [marked](RecvSlot::mark_truncated).
    /// Returning `Ok(0)` signals that the socket was closed.
    fn recv_batch(&self, slots: &mut [RecvSlot]) -> io::Result<usize>;

    /// Sends a single datagram with the encoded control messages in `control`
    fn send_msg(&self, payload: &[u8], remote: &SocketAddr, control: &[u8]) -> io::Result<usize>;

    fn set_option(&self, option: Sockopt, value: c_int) -> io::Result<()>;

    fn get_option(&self, option: Sockopt) -> io::Result<c_int>;
}

impl<S: Socket + ?Sized> Socket for &S {
    #[inline]
    fn local_addr(&self) -> io::Result<SocketAddr> {
        (**self).local_addr()
    }

    #[inline]
    fn recv_batch(&self, slots: &mut [RecvSlot]) -> io::Result<usize> {
        (**self).recv_batch(slots)
    }

    #[inline]
    fn send_msg(&self, payload: &[u8], remote: &SocketAddr, control: &[u8]) -> io::Result<usize> {
        (**self).send_msg(payload, remote, control)
    }

    #[inline]
    fn set_option(&self, option: Sockopt, value: c_int) -> io::Result<()> {
        (**self).set_option(option, value)
    }

    #[inline]
    fn get_option(&self, option: Sockopt) -> io::Result<c_int> {
        (**self).get_option(option)
    }
}

/// A receive buffer and its control message storage
#[derive(Debug, Default)]
pub struct RecvSlot {
    pub(crate) buffer: Option<PacketBuffer>,
    pub(crate) remote: Option<SocketAddr>,
    pub(crate) control: Storage<{ cmsg::MAX_LEN }>,
    pub(crate) truncated: bool,
}

impl RecvSlot {
    /// Returns the payload and control buffers for the socket to fill
    ///
    /// The payload is empty if the slot holds no buffer.
    #[inline]
    pub fn parts_mut(&mut self) -> (&mut [u8], &mut [u8]) {
        let payload: &mut [u8] = match self.buffer.as_mut() {
            Some(buffer) => buffer.capacity_mut(),
            None => &mut [],
        };
        (payload, self.control.as_mut_capacity())
    }

    /// Records the result of a receive into this slot
    #[inline]
    pub fn complete(&mut self, payload_len: usize, remote: SocketAddr, control_len: usize) {
        if let Some(buffer) = self.buffer.as_mut() {
            buffer.set_len(payload_len.min(buffer.capacity()));
        }
        self.remote = Some(remote);
        self.control.set_len(control_len);
    }

    /// Marks the datagram as cut short because it exceeded the payload buffer
    #[inline]
    pub fn mark_truncated(&mut self) {
        self.truncated = true;
    }

    #[inline]
    pub(crate) fn is_filled(&self) -> bool {
        self.buffer.is_some()
    }

    /// Installs a fresh buffer and clears the previous result
    #[inline]
    pub(crate) fn reset(&mut self, buffer: PacketBuffer) {
        self.buffer = Some(buffer);
        self.remote = None;
        self.control.clear();
        self.truncated = false;
    }
}

/// Returns `true` if a send error indicates the NIC rejected a segmented send
///
/// Linux reports `EIO` when the device cannot offload segmentation.
#[inline]
pub fn is_gso_error(err: &io::Error) -> bool {
    cfg_if::cfg_if! {
        if #[cfg(unix)] {
            err.raw_os_error() == Some(libc::EIO)
        } else {
            let _ = err;
            false
        }
    }
}

/// Returns `true` if a send was blocked by a local firewall rule
#[inline]
pub fn is_permission_error(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::PermissionDenied
}
