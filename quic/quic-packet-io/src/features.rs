// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Per-platform socket option and control message tables
//!
//! The codec and the capability probe are platform independent; everything
//! that differs between operating systems lives in a [`Platform`] value.

use crate::{
    inet::{AddressFamily, ExplicitCongestionNotification},
    message::cmsg::{self, DecodeError, Layout},
};
use core::ffi::c_int;

pub mod gso;
pub mod pktinfo;
pub mod tos;

pub use gso::encode as encode_gso;
pub use pktinfo::PacketInfo;
pub use tos::encode as encode_ecn;

/// A `(level, name)` socket option or a `(level, type)` control message
pub type Sockopt = (c_int, c_int);

/// `SOL_SOCKET` options used to inspect and tune the socket buffers
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SocketBuffers {
    pub level: c_int,
    pub recv: c_int,
    pub send: c_int,
    /// Variant of `recv` that ignores the system limit, if the platform has one
    pub recv_force: Option<c_int>,
    /// Variant of `send` that ignores the system limit, if the platform has one
    pub send_force: Option<c_int>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Platform {
    pub name: &'static str,
    pub cmsg: Layout,
    pub tos: tos::Table,
    pub pktinfo: pktinfo::Table,
    pub gso: gso::Table,
    pub buffers: Option<SocketBuffers>,
}

impl Platform {
    pub const LINUX: Self = Self {
        name: "linux",
        cmsg: Layout::WORD,
        tos: tos::LINUX,
        pktinfo: pktinfo::LINUX,
        gso: gso::LINUX,
        buffers: Some(SocketBuffers {
            level: 1,
            recv: 8,
            send: 7,
            recv_force: Some(33),
            send_force: Some(32),
        }),
    };

    pub const APPLE: Self = Self {
        name: "apple",
        cmsg: Layout::SOCKLEN_32,
        tos: tos::APPLE,
        pktinfo: pktinfo::APPLE,
        gso: gso::Table::DISABLED,
        buffers: Some(BSD_BUFFERS),
    };

    /// `WSACMSGHDR` uses a `SIZE_T` length and pointer alignment
    pub const WINDOWS: Self = Self {
        name: "windows",
        cmsg: Layout::WORD,
        tos: tos::WINDOWS,
        pktinfo: pktinfo::WINDOWS,
        gso: gso::WINDOWS,
        buffers: Some(BSD_BUFFERS),
    };

    pub const UNSUPPORTED: Self = Self {
        name: "unsupported",
        cmsg: Layout::WORD,
        tos: tos::Table::DISABLED,
        pktinfo: pktinfo::Table::DISABLED,
        gso: gso::Table::DISABLED,
        buffers: None,
    };

    /// The table for the build target, restricted to the features enabled by the build script
    pub const NATIVE: Self = native::BASE.with_features(
        cfg!(quic_packet_io_gso),
        cfg!(quic_packet_io_tos),
        cfg!(quic_packet_io_pktinfo),
    );

    /// Returns a copy of the table with the disabled features removed
    #[inline]
    pub const fn with_features(self, gso: bool, tos: bool, pktinfo: bool) -> Self {
        let mut platform = self;
        if !gso {
            platform.gso = gso::Table::DISABLED;
        }
        if !tos {
            platform.tos = tos::Table::DISABLED;
        }
        if !pktinfo {
            platform.pktinfo = pktinfo::Table::DISABLED;
        }
        platform
    }
}

impl Default for Platform {
    #[inline]
    fn default() -> Self {
        Self::NATIVE
    }
}

const BSD_BUFFERS: SocketBuffers = SocketBuffers {
    level: 0xffff,
    recv: 0x1002,
    send: 0x1001,
    recv_force: None,
    send_force: None,
};

mod native {
    use super::Platform;

    cfg_if::cfg_if! {
        if #[cfg(any(target_os = "linux", target_os = "android"))] {
            pub const BASE: Platform = Platform::LINUX;
        } else if #[cfg(any(target_os = "macos", target_os = "ios"))] {
            pub const BASE: Platform = Platform::APPLE;
        } else if #[cfg(windows)] {
            pub const BASE: Platform = Platform::WINDOWS;
        } else {
            pub const BASE: Platform = Platform::UNSUPPORTED;
        }
    }
}

/// Values decoded from a received datagram's control messages
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AncillaryData {
    pub ecn: ExplicitCongestionNotification,
    pub packet_info: Option<PacketInfo>,
}

/// Decodes all recognized control messages in `control`
///
/// Unknown `(level, type)` pairs are skipped. Packet info records with an
/// unexpected length are reported to `on_invalid_packet_info` and otherwise
/// ignored. A malformed chain fails the whole decode.
#[inline]
pub fn decode<'a, F>(
    platform: &Platform,
    control: &'a [u8],
    mut on_invalid_packet_info: F,
) -> Result<AncillaryData, DecodeError>
where
    F: FnMut(AddressFamily, &'a [u8]),
{
    let mut data = AncillaryData::default();

    for item in cmsg::Iter::new(platform.cmsg, control) {
        let (header, value) = item?;

        if platform.tos.is_recv_match(&header) {
            if let Some(ecn) = tos::decode(value) {
                data.ecn = ecn;
            } else {
                tracing::trace!(len = value.len(), "invalid TOS value");
            }
            continue;
        }

        if let Some(family) = platform.pktinfo.match_record(&header) {
            if let Some(info) = pktinfo::decode(&platform.pktinfo, family, value) {
                data.packet_info = Some(info);
            } else {
                on_invalid_packet_info(family, value);
            }
            continue;
        }

        tracing::trace!(
            level = header.level,
            r#type = header.ty,
            len = header.len,
            "skipping unrecognized control message"
        );
    }

    Ok(data)
}
