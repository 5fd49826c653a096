// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Encoding and decoding of socket control messages (ancillary data)
//!
//! Records are read and written field by field in native byte order so the
//! codec never reinterprets raw memory as a `cmsghdr`.

use core::ffi::c_int;

mod layout;
mod storage;

pub use layout::{align, Layout, Width};
pub use storage::Storage;

/// Size of the control message buffer attached to each receive slot
pub const MAX_LEN: usize = 128;

/// A decoded control message header
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// Length of the record including the header, as declared by the header
    pub len: usize,
    pub level: c_int,
    pub ty: c_int,
}

impl Header {
    #[inline]
    pub fn is_match(&self, (level, ty): (c_int, c_int)) -> bool {
        self.level == level && self.ty == ty
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("{remaining} bytes remaining is not enough for a control message header")]
    Truncated { remaining: usize },
    #[error("control message length {len} is smaller than the header size {header_size}")]
    LengthTooSmall { len: u64, header_size: usize },
    #[error("control message length {len} exceeds the {remaining} remaining bytes")]
    LengthOutOfBounds { len: u64, remaining: usize },
}

/// Parses a single control message from the start of `buffer`
///
/// Returns the header, the payload and the remainder of the buffer after the
/// record. The remainder is empty once the chain is exhausted.
#[inline]
pub fn parse_one<'a>(
    layout: &Layout,
    buffer: &'a [u8],
) -> Result<(Header, &'a [u8], &'a [u8]), DecodeError> {
    let header_size = layout.header_size();

    ensure!(
        buffer.len() >= header_size,
        Err(DecodeError::Truncated {
            remaining: buffer.len()
        })
    );

    let declared = layout.len.read(buffer);

    ensure!(
        declared >= header_size as u64,
        Err(DecodeError::LengthTooSmall {
            len: declared,
            header_size,
        })
    );

    let len = usize::try_from(declared)
        .ok()
        .filter(|len| *len <= buffer.len())
        .ok_or(DecodeError::LengthOutOfBounds {
            len: declared,
            remaining: buffer.len(),
        })?;

    let level = read_int(&buffer[layout.level_offset()..]);
    let ty = read_int(&buffer[layout.type_offset()..]);

    // a header-only record with a payload alignment gap has no data
    let data_start = layout.header_space().min(len);
    let data = &buffer[data_start..len];

    let next = layout.next_offset(len);
    let remainder = buffer.get(next..).unwrap_or_default();

    let header = Header { len, level, ty };

    Ok((header, data, remainder))
}

/// Appends a control message to `buffer` and returns the number of bytes written
///
/// The buffer is first padded so the record starts on a header boundary.
#[inline]
pub fn encode(
    layout: &Layout,
    buffer: &mut Vec<u8>,
    level: c_int,
    ty: c_int,
    payload: &[u8],
) -> usize {
    let start = align(buffer.len(), layout.header_align);
    let space = layout.record_space(payload.len());
    let end = start + space;
    let written = end - buffer.len();

    buffer.resize(end, 0);

    let record = &mut buffer[start..end];
    layout
        .len
        .write(record, layout.record_size(payload.len()) as u64);
    write_int(&mut record[layout.level_offset()..], level);
    write_int(&mut record[layout.type_offset()..], ty);

    let data_start = layout.header_space();
    record[data_start..data_start + payload.len()].copy_from_slice(payload);

    written
}

/// Iterates over a chain of control messages
///
/// Iteration stops after the first malformed record.
#[derive(Clone, Debug)]
pub struct Iter<'a> {
    layout: Layout,
    buffer: &'a [u8],
}

impl<'a> Iter<'a> {
    #[inline]
    pub fn new(layout: Layout, buffer: &'a [u8]) -> Self {
        Self { layout, buffer }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = Result<(Header, &'a [u8]), DecodeError>;

    #[inline]
    fn next(&mut self) -> Option<Self::Item> {
        ensure!(!self.buffer.is_empty(), None);

        match parse_one(&self.layout, self.buffer) {
            Ok((header, data, remainder)) => {
                self.buffer = remainder;
                Some(Ok((header, data)))
            }
            Err(err) => {
                self.buffer = &[];
                Some(Err(err))
            }
        }
    }
}

#[inline]
fn read_int(bytes: &[u8]) -> c_int {
    Width::U32.read(bytes) as u32 as c_int
}

#[inline]
fn write_int(bytes: &mut [u8], value: c_int) {
    Width::U32.write(bytes, value as u32 as u64)
}
