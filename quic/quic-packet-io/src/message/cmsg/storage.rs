// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use core::ops::{Deref, DerefMut};

/// Fixed-size control message buffer handed to the kernel on receive
// `bytes` is the first field so it shares the `cmsghdr` alignment of the struct
#[repr(C, align(8))]
#[derive(Clone, Debug)]
pub struct Storage<const L: usize> {
    bytes: [u8; L],
    len: usize,
}

impl<const L: usize> Storage<L> {
    pub const CAPACITY: usize = L;

    /// Returns the full buffer for the kernel to write into
    #[inline]
    pub fn as_mut_capacity(&mut self) -> &mut [u8] {
        &mut self.bytes
    }

    /// Sets the number of bytes the kernel wrote
    #[inline]
    pub fn set_len(&mut self, len: usize) {
        debug_assert!(len <= L, "control length {len} exceeds capacity {L}");
        self.len = len.min(L);
    }

    /// Zeroes the written region and resets the length
    #[inline]
    pub fn clear(&mut self) {
        self.bytes[..self.len].fill(0);
        self.len = 0;
    }
}

impl<const L: usize> Default for Storage<L> {
    #[inline]
    fn default() -> Self {
        Self {
            bytes: [0; L],
            len: 0,
        }
    }
}

impl<const L: usize> Deref for Storage<L> {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        &self.bytes[..self.len]
    }
}

impl<const L: usize> DerefMut for Storage<L> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.bytes[..self.len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_is_aligned() {
        let storage = Storage::<128>::default();
        assert_eq!(storage.bytes.as_ptr().align_offset(8), 0);
        assert!(storage.is_empty());
    }

    #[test]
    fn bytes_start_the_struct() {
        fn check<const L: usize>() {
            let storage = Storage::<L>::default();
            let base = &storage as *const Storage<L> as usize;
            assert_eq!(storage.bytes.as_ptr() as usize, base);
            assert_eq!(base % 8, 0);
        }

        check::<3>();
        check::<128>();
        check::<256>();
    }

    #[test]
    fn clear_zeroes_written_bytes() {
        let mut storage = Storage::<16>::default();
        storage.as_mut_capacity()[..4].copy_from_slice(&[1, 2, 3, 4]);
        storage.set_len(4);
        assert_eq!(&*storage, &[1, 2, 3, 4]);

        storage.clear();
        assert!(storage.is_empty());
        assert!(storage.as_mut_capacity().iter().all(|b| *b == 0));
    }
}
