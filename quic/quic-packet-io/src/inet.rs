// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::fmt;
use std::net::{IpAddr, SocketAddr};

/// The ECN codepoint carried in the two least significant bits of the IP
/// TOS/traffic class field
///
/// `Unsupported` is used for datagrams where the OS did not report a value
/// and for sends that should not carry an ECN control message.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ExplicitCongestionNotification {
    #[default]
    Unsupported,
    /// The not-ECT codepoint '00' indicates a packet that is not using ECN.
    NotEct,
    /// ECT(1) is set to '01'
    Ect1,
    /// ECT(0) is set to '10'
    Ect0,
    /// The CE codepoint '11' is set by an ECN-capable router to indicate congestion
    Ce,
}

impl ExplicitCongestionNotification {
    pub const MASK: u8 = 0b11;

    /// Decodes the codepoint from a TOS/traffic class byte
    #[inline]
    pub fn new(bits: u8) -> Self {
        match bits & Self::MASK {
            0b00 => Self::NotEct,
            0b01 => Self::Ect1,
            0b10 => Self::Ect0,
            _ => Self::Ce,
        }
    }

    /// Returns the header bits for the codepoint, or `None` if unsupported
    #[inline]
    pub fn header_bits(self) -> Option<u8> {
        match self {
            Self::Unsupported => None,
            Self::NotEct => Some(0b00),
            Self::Ect1 => Some(0b01),
            Self::Ect0 => Some(0b10),
            Self::Ce => Some(0b11),
        }
    }

    #[inline]
    pub fn is_supported(self) -> bool {
        self != Self::Unsupported
    }

    #[inline]
    pub fn is_ect(self) -> bool {
        matches!(self, Self::Ect0 | Self::Ect1)
    }
}

impl fmt::Display for ExplicitCongestionNotification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unsupported => "unsupported",
            Self::NotEct => "Not-ECT",
            Self::Ect1 => "ECT(1)",
            Self::Ect0 => "ECT(0)",
            Self::Ce => "CE",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum AddressFamily {
    V4,
    V6,
}

impl fmt::Display for AddressFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::V4 => f.write_str("IPv4"),
            Self::V6 => f.write_str("IPv6"),
        }
    }
}

/// Returns `true` if the address should use the IPv4 control messages
///
/// IPv4-mapped IPv6 addresses are treated as IPv4.
#[inline]
pub fn is_ipv4(addr: &SocketAddr) -> bool {
    match addr.ip() {
        IpAddr::V4(_) => true,
        IpAddr::V6(ip) => ip.to_ipv4_mapped().is_some(),
    }
}
