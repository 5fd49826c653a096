// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use crate::{
    buffer::{PacketBuffer, Pool},
    socket::{RecvSlot, Socket},
};
use std::{io, net::SocketAddr};

/// A set of receive slots filled by a single `recv_batch` call
///
/// `read_pos` is the next slot to hand out and `len` is the number of slots
/// the last receive filled. A receive is only issued once `read_pos == len`.
#[derive(Debug)]
pub(crate) struct Batch {
    slots: Box<[RecvSlot]>,
    len: usize,
    read_pos: usize,
}

impl Batch {
    #[inline]
    pub fn new(size: usize) -> Self {
        debug_assert!(size > 0, "batches need at least 1 slot");

        let slots: Box<[RecvSlot]> = (0..size).map(|_| RecvSlot::default()).collect();

        // start out exhausted with every slot consumed so the first refill covers the whole batch
        Self {
            slots,
            len: size,
            read_pos: size,
        }
    }

    #[inline]
    pub fn is_exhausted(&self) -> bool {
        self.read_pos == self.len
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Replaces the buffers of the slots consumed since the previous refill
    #[inline]
    pub fn refill(&mut self, pool: &Pool) {
        debug_assert!(self.is_exhausted());

        for slot in &mut self.slots[..self.read_pos] {
            debug_assert!(!slot.is_filled(), "slot was not consumed");
            slot.reset(pool.alloc());
        }

        self.read_pos = 0;
        self.len = 0;
    }

    /// Issues a single receive into the refilled slots
    ///
    /// The batch stays exhausted if the socket fails or delivers nothing.
    #[inline]
    pub fn recv<S: Socket + ?Sized>(&mut self, socket: &S) -> io::Result<usize> {
        debug_assert_eq!(self.read_pos, 0, "the batch needs to be refilled first");

        let count = socket.recv_batch(&mut self.slots)?;
        self.len = count.min(self.slots.len());

        tracing::trace!(count = self.len, capacity = self.slots.len(), "received batch");

        Ok(self.len)
    }

    /// Takes the next filled slot
    #[inline]
    pub fn take(&mut self) -> Option<Received<'_>> {
        ensure!(!self.is_exhausted(), None);

        let slot = &mut self.slots[self.read_pos];
        self.read_pos += 1;

        let payload = slot.buffer.take()?;
        let remote = slot.remote?;

        Some(Received {
            payload,
            remote,
            control: &slot.control,
            truncated: slot.truncated,
        })
    }

    #[cfg(test)]
    pub fn read_pos(&self) -> usize {
        self.read_pos
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.len
    }
}

pub(crate) struct Received<'a> {
    pub payload: PacketBuffer,
    pub remote: SocketAddr,
    pub control: &'a [u8],
    pub truncated: bool,
}
