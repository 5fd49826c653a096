// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! Reusable datagram buffers
//!
//! A [`PacketBuffer`] returns itself to the [`Pool`] it came from when it is
//! released or dropped. Buffers may be released from any thread.

use core::{
    fmt,
    ops::{Deref, DerefMut},
};
use parking_lot::Mutex;
use std::sync::{Arc, Weak};

/// Largest UDP payload that fits in an unfragmented 1500 byte IPv6 packet
pub const DEFAULT_MAX_PACKET_SIZE: usize = 1452;

/// Default number of idle buffers kept for reuse
pub const DEFAULT_MAX_IDLE: usize = 256;

#[derive(Clone)]
pub struct Pool {
    free: Arc<Free>,
}

impl fmt::Debug for Pool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pool")
            .field("max_packet_size", &self.free.max_packet_size)
            .field("max_idle", &self.free.max_idle)
            .field("idle", &self.idle())
            .finish()
    }
}

impl Default for Pool {
    #[inline]
    fn default() -> Self {
        Self::new(DEFAULT_MAX_PACKET_SIZE, DEFAULT_MAX_IDLE)
    }
}

impl Pool {
    /// Creates a pool of buffers with `max_packet_size` bytes of capacity
    ///
    /// At most `max_idle` released buffers are retained; the rest are freed.
    #[inline]
    pub fn new(max_packet_size: usize, max_idle: usize) -> Self {
        debug_assert!(max_packet_size > 0, "packets need to be at least 1 byte");

        let free = Arc::new(Free {
            buffers: Mutex::new(Vec::with_capacity(max_idle.min(DEFAULT_MAX_IDLE))),
            max_packet_size,
            max_idle,
        });

        Self { free }
    }

    /// Takes an idle buffer or allocates a new one
    ///
    /// The returned buffer has a length of zero.
    #[inline]
    pub fn alloc(&self) -> PacketBuffer {
        let data = self
            .free
            .buffers
            .lock()
            .pop()
            .unwrap_or_else(|| vec![0; self.free.max_packet_size].into_boxed_slice());

        PacketBuffer {
            data,
            len: 0,
            free: Arc::downgrade(&self.free),
        }
    }

    #[inline]
    pub fn max_packet_size(&self) -> usize {
        self.free.max_packet_size
    }

    /// Number of buffers currently available for reuse
    #[inline]
    pub fn idle(&self) -> usize {
        self.free.buffers.lock().len()
    }
}

struct Free {
    buffers: Mutex<Vec<Box<[u8]>>>,
    max_packet_size: usize,
    max_idle: usize,
}

impl Free {
    #[inline]
    fn release(&self, data: Box<[u8]>) {
        let mut buffers = self.buffers.lock();
        if buffers.len() < self.max_idle {
            buffers.push(data);
        }
    }
}

/// A datagram buffer owned by the caller until it is released
pub struct PacketBuffer {
    data: Box<[u8]>,
    len: usize,
    free: Weak<Free>,
}

impl fmt::Debug for PacketBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PacketBuffer")
            .field("len", &self.len)
            .field("capacity", &self.data.len())
            .finish()
    }
}

impl PacketBuffer {
    /// The full buffer, for filling by the socket
    #[inline]
    pub fn capacity_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    /// Sets the number of filled bytes
    ///
    /// # Panics
    ///
    /// Panics if `len` exceeds the capacity
    #[inline]
    pub fn set_len(&mut self, len: usize) {
        assert!(
            len <= self.data.len(),
            "length {len} exceeds capacity {}",
            self.data.len()
        );
        self.len = len;
    }

    /// Returns the buffer to its pool
    #[inline]
    pub fn release(self) {
        drop(self)
    }
}

impl Deref for PacketBuffer {
    type Target = [u8];

    #[inline]
    fn deref(&self) -> &[u8] {
        &self.data[..self.len]
    }
}

impl DerefMut for PacketBuffer {
    #[inline]
    fn deref_mut(&mut self) -> &mut [u8] {
        &mut self.data[..self.len]
    }
}

impl Drop for PacketBuffer {
    #[inline]
    fn drop(&mut self) {
        // the pool may have been dropped, in which case the memory is freed
        if let Some(free) = self.free.upgrade() {
            free.release(core::mem::take(&mut self.data));
        }
    }
}
