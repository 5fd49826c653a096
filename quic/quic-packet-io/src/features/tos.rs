// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! ECN via the IP TOS/traffic class control messages

use super::{Platform, Sockopt};
use crate::{
    inet::{AddressFamily, ExplicitCongestionNotification},
    message::cmsg::{self, Header, Width},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Table {
    /// Socket option that enables TOS reporting on IPv4 sockets
    pub v4_option: Option<Sockopt>,
    /// Socket option that enables traffic class reporting on IPv6 sockets
    pub v6_option: Option<Sockopt>,
    pub v4_recv: Option<Sockopt>,
    pub v6_recv: Option<Sockopt>,
    pub v4_send: Option<Sockopt>,
    pub v6_send: Option<Sockopt>,
    /// Width of the value written on send
    pub send_width: Width,
}

impl Table {
    pub const DISABLED: Self = Self {
        v4_option: None,
        v6_option: None,
        v4_recv: None,
        v6_recv: None,
        v4_send: None,
        v6_send: None,
        send_width: Width::U32,
    };

    #[inline]
    pub fn option(&self, family: AddressFamily) -> Option<Sockopt> {
        match family {
            AddressFamily::V4 => self.v4_option,
            AddressFamily::V6 => self.v6_option,
        }
    }

    #[inline]
    pub fn send(&self, family: AddressFamily) -> Option<Sockopt> {
        match family {
            AddressFamily::V4 => self.v4_send,
            AddressFamily::V6 => self.v6_send,
        }
    }

    /// Returns `true` if ECN marks can be both read and written
    #[inline]
    pub fn is_complete(&self) -> bool {
        self.v4_recv.is_some()
            && self.v6_recv.is_some()
            && self.v4_send.is_some()
            && self.v6_send.is_some()
    }

    #[inline]
    pub fn is_recv_match(&self, header: &Header) -> bool {
        [self.v4_recv, self.v6_recv]
            .into_iter()
            .flatten()
            .any(|pair| header.is_match(pair))
    }
}

pub(super) const LINUX: Table = Table {
    v4_option: Some((IPPROTO_IP, 13)),
    v6_option: Some((IPPROTO_IPV6, 66)),
    v4_recv: Some((IPPROTO_IP, 1)),
    v6_recv: Some((IPPROTO_IPV6, 67)),
    v4_send: Some((IPPROTO_IP, 1)),
    v6_send: Some((IPPROTO_IPV6, 67)),
    send_width: Width::U32,
};

/// Darwin reports the IPv4 TOS under the `IP_RECVTOS` type
pub(super) const APPLE: Table = Table {
    v4_option: Some((IPPROTO_IP, 27)),
    v6_option: Some((IPPROTO_IPV6, 35)),
    v4_recv: Some((IPPROTO_IP, 27)),
    v6_recv: Some((IPPROTO_IPV6, 36)),
    v4_send: Some((IPPROTO_IP, 3)),
    v6_send: Some((IPPROTO_IPV6, 36)),
    send_width: Width::U32,
};

pub(super) const WINDOWS: Table = Table {
    v4_option: Some((IPPROTO_IP, 50)),
    v6_option: Some((IPPROTO_IPV6, 50)),
    v4_recv: Some((IPPROTO_IP, 50)),
    v6_recv: Some((IPPROTO_IPV6, 50)),
    v4_send: Some((IPPROTO_IP, 50)),
    v6_send: Some((IPPROTO_IPV6, 50)),
    send_width: Width::U32,
};

const IPPROTO_IP: core::ffi::c_int = 0;
const IPPROTO_IPV6: core::ffi::c_int = 41;

/// Decodes the ECN codepoint from a TOS record value
///
/// Platforms report either a single byte or a native `int`.
#[inline]
pub fn decode(value: &[u8]) -> Option<ExplicitCongestionNotification> {
    let tos = match value.len() {
        1 => value[0],
        4 => Width::U32.read(value) as u8,
        _ => return None,
    };
    Some(ExplicitCongestionNotification::new(tos))
}

/// Appends an ECN record for a datagram to a peer of the given family
///
/// Returns the number of bytes written, which is zero for `Unsupported` or
/// when the platform has no send record for the family.
#[inline]
pub fn encode(
    platform: &Platform,
    buffer: &mut Vec<u8>,
    ecn: ExplicitCongestionNotification,
    is_ipv4: bool,
) -> usize {
    let Some(bits) = ecn.header_bits() else {
        return 0;
    };

    let family = if is_ipv4 {
        AddressFamily::V4
    } else {
        AddressFamily::V6
    };

    let Some((level, ty)) = platform.tos.send(family) else {
        return 0;
    };

    let width = platform.tos.send_width;
    let mut value = [0u8; 8];
    width.write(&mut value, bits as u64);

    cmsg::encode(&platform.cmsg, buffer, level, ty, &value[..width.size()])
}

/// Appends a record as the kernel would deliver it on receive
#[cfg(any(test, feature = "testing"))]
pub fn encode_recv(
    platform: &Platform,
    buffer: &mut Vec<u8>,
    ecn: ExplicitCongestionNotification,
    is_ipv4: bool,
) -> usize {
    let Some(bits) = ecn.header_bits() else {
        return 0;
    };

    let (pair, width) = if is_ipv4 {
        (platform.tos.v4_recv, Width::U8)
    } else {
        (platform.tos.v6_recv, Width::U32)
    };

    let Some((level, ty)) = pair else {
        return 0;
    };

    let mut value = [0u8; 8];
    // set the DSCP bits to make sure they are masked out
    width.write(&mut value, (0b1011_1000 | bits) as u64);

    cmsg::encode(&platform.cmsg, buffer, level, ty, &value[..width.size()])
}
