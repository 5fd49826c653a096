// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Generic segmentation offload: a single send split into equally sized datagrams

use super::{Platform, Sockopt};
use crate::message::cmsg::{self, Width};
use core::ffi::c_int;

/// Segment size used to probe for support
pub const PROBE_SEGMENT_SIZE: c_int = 1500;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Table {
    /// Socket option that sets a default segment size
    pub option: Option<Sockopt>,
    /// Control message that sets the segment size of a single send
    pub record: Option<Sockopt>,
    pub width: Width,
}

impl Table {
    pub const DISABLED: Self = Self {
        option: None,
        record: None,
        width: Width::U16,
    };

    #[inline]
    pub fn is_enabled(&self) -> bool {
        self.option.is_some() && self.record.is_some()
    }
}

pub(super) const LINUX: Table = Table {
    option: Some((SOL_UDP, 103)),
    record: Some((SOL_UDP, 103)),
    width: Width::U16,
};

/// `UDP_SEND_MSG_SIZE`, carried as a `DWORD`
pub(super) const WINDOWS: Table = Table {
    option: Some((SOL_UDP, 2)),
    record: Some((SOL_UDP, 2)),
    width: Width::U32,
};

const SOL_UDP: c_int = 17;

/// Appends a segment size record and returns the number of bytes written
///
/// # Panics
///
/// Panics if the platform does not support GSO
#[inline]
pub fn encode(platform: &Platform, buffer: &mut Vec<u8>, segment_size: u16) -> usize {
    let Some((level, ty)) = platform.gso.record else {
        panic!("GSO is not supported on {}", platform.name);
    };

    let width = platform.gso.width;
    let mut value = [0u8; 8];
    width.write(&mut value, segment_size as u64);

    cmsg::encode(&platform.cmsg, buffer, level, ty, &value[..width.size()])
}

#[cfg(test)]
mod tests {
    use super::*;
    use bolero::check;

    #[test]
    fn encode_width() {
        check!().with_type::<u16>().cloned().for_each(|size| {
            for platform in [Platform::LINUX, Platform::WINDOWS] {
                let mut buffer = vec![];
                let len = encode(&platform, &mut buffer, size);
                assert_eq!(len, buffer.len());
                assert_eq!(len, platform.cmsg.record_space(platform.gso.width.size()));

                let (header, value, remainder) =
                    cmsg::parse_one(&platform.cmsg, &buffer).unwrap();
                assert!(header.is_match(platform.gso.record.unwrap()));
                assert_eq!(platform.gso.width.read(value), size as u64);
                assert!(remainder.is_empty());
            }
        });
    }

    #[test]
    #[should_panic]
    fn encode_without_support() {
        encode(&Platform::APPLE, &mut vec![], 1200);
    }
}
