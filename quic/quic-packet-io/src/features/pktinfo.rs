// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Local destination address and interface via `IP_PKTINFO`/`IPV6_PKTINFO`

use super::{Platform, Sockopt};
use crate::{
    inet::AddressFamily,
    message::cmsg::{self, Header, Width},
};
use core::ffi::c_int;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

/// Length of `struct in6_pktinfo { struct in6_addr ipi6_addr; unsigned int ipi6_ifindex; }`
///
/// This is the same on every supported platform.
pub const V6_LEN: usize = 20;
const V6_IFINDEX_OFFSET: usize = 16;

/// Field offsets of the platform's IPv4 packet info struct
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct V4Layout {
    pub len: usize,
    /// Offset of the destination address of a received datagram
    pub recv_addr_offset: usize,
    /// Offset of the source address to use for a sent datagram
    pub send_addr_offset: usize,
    pub ifindex_offset: usize,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Table {
    pub v4_option: Option<Sockopt>,
    pub v6_option: Option<Sockopt>,
    pub v4_record: Option<Sockopt>,
    pub v6_record: Option<Sockopt>,
    pub v4: V4Layout,
}

impl Table {
    pub const DISABLED: Self = Self {
        v4_option: None,
        v6_option: None,
        v4_record: None,
        v6_record: None,
        v4: IN_PKTINFO,
    };

    #[inline]
    pub fn option(&self, family: AddressFamily) -> Option<Sockopt> {
        match family {
            AddressFamily::V4 => self.v4_option,
            AddressFamily::V6 => self.v6_option,
        }
    }

    #[inline]
    pub fn record(&self, family: AddressFamily) -> Option<Sockopt> {
        match family {
            AddressFamily::V4 => self.v4_record,
            AddressFamily::V6 => self.v6_record,
        }
    }

    /// Returns the family of a packet info record, if `header` is one
    #[inline]
    pub fn match_record(&self, header: &Header) -> Option<AddressFamily> {
        [AddressFamily::V4, AddressFamily::V6]
            .into_iter()
            .find(|family| self.record(*family).is_some_and(|pair| header.is_match(pair)))
    }
}

/// `struct in_pktinfo { unsigned int ipi_ifindex; struct in_addr ipi_spec_dst; struct in_addr ipi_addr; }`
const IN_PKTINFO: V4Layout = V4Layout {
    len: 12,
    recv_addr_offset: 8,
    send_addr_offset: 4,
    ifindex_offset: 0,
};

pub(super) const LINUX: Table = Table {
    v4_option: Some((IPPROTO_IP, 8)),
    v6_option: Some((IPPROTO_IPV6, 49)),
    v4_record: Some((IPPROTO_IP, 8)),
    v6_record: Some((IPPROTO_IPV6, 50)),
    v4: IN_PKTINFO,
};

pub(super) const APPLE: Table = Table {
    v4_option: Some((IPPROTO_IP, 26)),
    v6_option: Some((IPPROTO_IPV6, 61)),
    v4_record: Some((IPPROTO_IP, 26)),
    v6_record: Some((IPPROTO_IPV6, 46)),
    v4: IN_PKTINFO,
};

/// `IN_PKTINFO { IN_ADDR ipi_addr; ULONG ipi_ifindex; }`
pub(super) const WINDOWS: Table = Table {
    v4_option: Some((IPPROTO_IP, 19)),
    v6_option: Some((IPPROTO_IPV6, 19)),
    v4_record: Some((IPPROTO_IP, 19)),
    v6_record: Some((IPPROTO_IPV6, 19)),
    v4: V4Layout {
        len: 8,
        recv_addr_offset: 0,
        send_addr_offset: 0,
        ifindex_offset: 4,
    },
};

const IPPROTO_IP: c_int = 0;
const IPPROTO_IPV6: c_int = 41;

/// The local address a datagram was received on, along with the interface
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PacketInfo {
    pub addr: IpAddr,
    pub interface: u32,
}

impl PacketInfo {
    /// Returns a control message that sends a datagram from this address and interface
    ///
    /// The result can be passed as the base control message of a write. It is
    /// empty if the platform cannot select the source address.
    #[inline]
    pub fn control_message(&self, platform: &Platform) -> Vec<u8> {
        let mut buffer = vec![];
        encode(platform, &mut buffer, self);
        buffer
    }
}

/// Decodes a packet info record value
///
/// Returns `None` if the value does not have the exact length of the family's struct.
/// IPv4-mapped IPv6 addresses are converted to IPv4.
#[inline]
pub fn decode(table: &Table, family: AddressFamily, value: &[u8]) -> Option<PacketInfo> {
    match family {
        AddressFamily::V4 => {
            let layout = &table.v4;
            if value.len() != layout.len {
                return None;
            }
            let addr = read_v4(&value[layout.recv_addr_offset..]);
            let interface = Width::U32.read(&value[layout.ifindex_offset..]) as u32;
            Some(PacketInfo {
                addr: addr.into(),
                interface,
            })
        }
        AddressFamily::V6 => {
            if value.len() != V6_LEN {
                return None;
            }
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&value[..16]);
            let addr = Ipv6Addr::from(octets);
            let addr = match addr.to_ipv4_mapped() {
                Some(addr) => IpAddr::V4(addr),
                None => IpAddr::V6(addr),
            };
            let interface = Width::U32.read(&value[V6_IFINDEX_OFFSET..]) as u32;
            Some(PacketInfo { addr, interface })
        }
    }
}

/// Appends a record that selects the source address and interface of a sent datagram
///
/// Returns the number of bytes written. Nothing is written for an unspecified
/// address or if the platform lacks the record.
#[inline]
pub fn encode(platform: &Platform, buffer: &mut Vec<u8>, info: &PacketInfo) -> usize {
    if info.addr.is_unspecified() {
        return 0;
    }

    match info.addr {
        IpAddr::V4(addr) => {
            let layout = platform.pktinfo.v4;
            encode_v4(platform, buffer, addr, info.interface, layout.send_addr_offset)
        }
        IpAddr::V6(addr) => encode_v6(platform, buffer, addr, info.interface),
    }
}

/// Appends a record as the kernel would deliver it on receive
#[cfg(any(test, feature = "testing"))]
pub fn encode_recv(platform: &Platform, buffer: &mut Vec<u8>, info: &PacketInfo) -> usize {
    match info.addr {
        IpAddr::V4(addr) => {
            let layout = platform.pktinfo.v4;
            encode_v4(platform, buffer, addr, info.interface, layout.recv_addr_offset)
        }
        IpAddr::V6(addr) => encode_v6(platform, buffer, addr, info.interface),
    }
}

#[inline]
fn encode_v4(
    platform: &Platform,
    buffer: &mut Vec<u8>,
    addr: Ipv4Addr,
    interface: u32,
    addr_offset: usize,
) -> usize {
    let Some((level, ty)) = platform.pktinfo.v4_record else {
        return 0;
    };
    let layout = platform.pktinfo.v4;

    let mut value = [0u8; 16];
    let value = &mut value[..layout.len];
    value[addr_offset..addr_offset + 4].copy_from_slice(&addr.octets());
    Width::U32.write(&mut value[layout.ifindex_offset..], interface as u64);

    cmsg::encode(&platform.cmsg, buffer, level, ty, value)
}

#[inline]
fn encode_v6(platform: &Platform, buffer: &mut Vec<u8>, addr: Ipv6Addr, interface: u32) -> usize {
    let Some((level, ty)) = platform.pktinfo.v6_record else {
        return 0;
    };

    let mut value = [0u8; V6_LEN];
    value[..16].copy_from_slice(&addr.octets());
    Width::U32.write(&mut value[V6_IFINDEX_OFFSET..], interface as u64);

    cmsg::encode(&platform.cmsg, buffer, level, ty, &value)
}

#[inline]
fn read_v4(bytes: &[u8]) -> Ipv4Addr {
    // `in_addr` is stored in network byte order
    Ipv4Addr::new(bytes[0], bytes[1], bytes[2], bytes[3])
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolero::check;

    #[test]
    fn send_and_recv_offsets() {
        let info = PacketInfo {
            addr: Ipv4Addr::new(192, 0, 2, 10).into(),
            interface: 0x0102_0304,
        };

        let platform = Platform::LINUX;
        let buffer = info.control_message(&platform);
        let (header, value, _) = cmsg::parse_one(&platform.cmsg, &buffer).unwrap();
        assert!(header.is_match((0, 8)));
        assert_eq!(value.len(), 12);
        assert_eq!(&value[4..8], &[192, 0, 2, 10]);
        assert_eq!(&value[8..12], &[0; 4]);
        assert_eq!(&value[..4], &0x0102_0304u32.to_ne_bytes());

        let platform = Platform::WINDOWS;
        let buffer = info.control_message(&platform);
        let (header, value, _) = cmsg::parse_one(&platform.cmsg, &buffer).unwrap();
        assert!(header.is_match((0, 19)));
        assert_eq!(value.len(), 8);
        assert_eq!(&value[..4], &[192, 0, 2, 10]);
        assert_eq!(&value[4..], &0x0102_0304u32.to_ne_bytes());
    }

    #[test]
    fn recv_round_trip() {
        check!()
            .with_type::<([u8; 16], u32, bool)>()
            .cloned()
            .for_each(|(octets, interface, is_ipv4)| {
                for platform in [Platform::LINUX, Platform::APPLE, Platform::WINDOWS] {
                    let addr = if is_ipv4 {
                        IpAddr::V4(Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]))
                    } else {
                        let addr = Ipv6Addr::from(octets);
                        if addr.to_ipv4_mapped().is_some() {
                            continue;
                        }
                        IpAddr::V6(addr)
                    };
                    let info = PacketInfo { addr, interface };

                    let mut buffer = vec![];
                    encode_recv(&platform, &mut buffer, &info);
                    let (header, value, _) = cmsg::parse_one(&platform.cmsg, &buffer).unwrap();
                    let family = platform.pktinfo.match_record(&header).unwrap();

                    assert_eq!(decode(&platform.pktinfo, family, value), Some(info));
                }
            });
    }

    #[test]
    fn wrong_length_is_rejected() {
        let table = &Platform::LINUX.pktinfo;
        assert_eq!(decode(table, AddressFamily::V4, &[0; 8]), None);
        assert_eq!(decode(table, AddressFamily::V4, &[0; 16]), None);
        assert_eq!(decode(table, AddressFamily::V6, &[0; 12]), None);
        assert_eq!(decode(table, AddressFamily::V6, &[0; 24]), None);
    }

    #[test]
    fn unspecified_address_is_not_encoded() {
        let info = PacketInfo {
            addr: Ipv6Addr::UNSPECIFIED.into(),
            interface: 1,
        };
        assert!(info.control_message(&Platform::LINUX).is_empty());
        assert!(PacketInfo {
            addr: Ipv4Addr::LOCALHOST.into(),
            interface: 1
        }
        .control_message(&Platform::UNSUPPORTED)
        .is_empty());
    }
}
