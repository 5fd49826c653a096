// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use byteorder::{ByteOrder, NativeEndian};
use core::mem::size_of;

/// Width of an integer field inside a control message
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Width {
    U8,
    U16,
    U32,
    U64,
}

impl Width {
    /// The width of a pointer-sized integer (`size_t`) on the current target
    pub const POINTER: Self = if size_of::<usize>() == 8 {
        Self::U64
    } else {
        Self::U32
    };

    #[inline]
    pub const fn size(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
            Self::U64 => 8,
        }
    }

    /// Reads a native-endian unsigned integer of this width
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than the width
    #[inline]
    pub fn read(self, bytes: &[u8]) -> u64 {
        match self {
            Self::U8 => bytes[0] as u64,
            Self::U16 => NativeEndian::read_u16(bytes) as u64,
            Self::U32 => NativeEndian::read_u32(bytes) as u64,
            Self::U64 => NativeEndian::read_u64(bytes),
        }
    }

    /// Writes a native-endian unsigned integer of this width, truncating `value`
    ///
    /// # Panics
    ///
    /// Panics if `bytes` is shorter than the width
    #[inline]
    pub fn write(self, bytes: &mut [u8], value: u64) {
        match self {
            Self::U8 => bytes[0] = value as u8,
            Self::U16 => NativeEndian::write_u16(bytes, value as u16),
            Self::U32 => NativeEndian::write_u32(bytes, value as u32),
            Self::U64 => NativeEndian::write_u64(bytes, value),
        }
    }
}

/// The binary layout of a control message header on a platform
///
/// A header is `{ len, level, type }` where `len` has a platform-specific width
/// and `level`/`type` are `int`s. Records start at `header_align` boundaries and
/// payloads start at `data_align` boundaries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Layout {
    pub len: Width,
    pub header_align: usize,
    pub data_align: usize,
}

impl Layout {
    /// `struct cmsghdr { size_t cmsg_len; int cmsg_level; int cmsg_type; }` aligned to `size_t`
    pub const WORD: Self = Self {
        len: Width::POINTER,
        header_align: size_of::<usize>(),
        data_align: size_of::<usize>(),
    };

    /// `struct cmsghdr { socklen_t cmsg_len; int cmsg_level; int cmsg_type; }` aligned to 4 bytes
    pub const SOCKLEN_32: Self = Self {
        len: Width::U32,
        header_align: 4,
        data_align: 4,
    };

    const LEVEL_SIZE: usize = size_of::<i32>();
    const TYPE_SIZE: usize = size_of::<i32>();

    /// Size of the header struct, including any trailing struct padding
    #[inline]
    pub const fn header_size(&self) -> usize {
        let fields = self.len.size() + Self::LEVEL_SIZE + Self::TYPE_SIZE;
        align(fields, self.header_align)
    }

    /// Offset of the payload from the start of a record (`CMSG_LEN(0)`)
    #[inline]
    pub const fn header_space(&self) -> usize {
        align(self.header_size(), self.data_align)
    }

    /// Value stored in the header `len` field for a payload of `payload_len` bytes (`CMSG_LEN`)
    #[inline]
    pub const fn record_size(&self, payload_len: usize) -> usize {
        self.header_space() + payload_len
    }

    /// Number of bytes a record occupies including trailing padding (`CMSG_SPACE`)
    #[inline]
    pub const fn record_space(&self, payload_len: usize) -> usize {
        self.next_offset(self.record_size(payload_len))
    }

    /// Offset of the record following one whose header declares `len`
    #[inline]
    pub const fn next_offset(&self, len: usize) -> usize {
        align(len, self.header_align)
    }

    #[inline]
    pub(crate) const fn level_offset(&self) -> usize {
        self.len.size()
    }

    #[inline]
    pub(crate) const fn type_offset(&self) -> usize {
        self.len.size() + Self::LEVEL_SIZE
    }
}

/// Rounds `value` up to the next multiple of `to`, which must be a power of two
#[inline]
pub const fn align(value: usize, to: usize) -> usize {
    debug_assert!(to.is_power_of_two());
    (value + to - 1) & !(to - 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn word_layout_64() {
        if size_of::<usize>() != 8 {
            return;
        }

        let layout = Layout::WORD;
        assert_eq!(layout.header_size(), 16);
        assert_eq!(layout.header_space(), 16);
        assert_eq!(layout.record_size(2), 18);
        assert_eq!(layout.record_space(2), 24);
        assert_eq!(layout.record_space(4), 24);
        assert_eq!(layout.record_space(20), 40);
        assert_eq!(layout.next_offset(18), 24);
    }

    #[test]
    fn socklen_layout() {
        let layout = Layout::SOCKLEN_32;
        assert_eq!(layout.header_size(), 12);
        assert_eq!(layout.header_space(), 12);
        assert_eq!(layout.record_size(1), 13);
        assert_eq!(layout.record_space(1), 16);
        assert_eq!(layout.record_space(12), 24);
        assert_eq!(layout.next_offset(13), 16);
    }

    #[test]
    fn split_alignment() {
        // 4-byte aligned headers with 8-byte aligned payloads
        let layout = Layout {
            len: Width::U32,
            header_align: 4,
            data_align: 8,
        };
        assert_eq!(layout.header_size(), 12);
        assert_eq!(layout.header_space(), 16);
        assert_eq!(layout.record_size(4), 20);
        assert_eq!(layout.record_space(4), 20);
        assert_eq!(layout.record_space(6), 24);
    }

    #[test]
    fn width_round_trip() {
        let mut bytes = [0u8; 8];
        for (width, value) in [
            (Width::U8, 0xab),
            (Width::U16, 0xabcd),
            (Width::U32, 0xabcd_ef01),
            (Width::U64, 0xabcd_ef01_2345_6789),
        ] {
            width.write(&mut bytes, value);
            assert_eq!(width.read(&bytes), value);
        }
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn word_layout_matches_libc() {
        for len in 0..64 {
            unsafe {
                assert_eq!(Layout::WORD.record_size(len), libc::CMSG_LEN(len as _) as usize);
                assert_eq!(
                    Layout::WORD.record_space(len),
                    libc::CMSG_SPACE(len as _) as usize
                );
            }
        }
        assert_eq!(Layout::WORD.header_size(), size_of::<libc::cmsghdr>());
    }
}
