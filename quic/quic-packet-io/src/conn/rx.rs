// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::{Conn, ReceivedPacket};
use crate::{
    error::{Error, Result},
    features,
    inet::AddressFamily,
    socket::Socket,
};
use core::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

/// Process-wide gate so a misbehaving kernel logs at most once per address family
pub(crate) static INVALID_PACKET_INFO: InvalidPacketInfo = InvalidPacketInfo::new();

#[derive(Debug, Default)]
pub(crate) struct InvalidPacketInfo {
    v4: AtomicBool,
    v6: AtomicBool,
}

impl InvalidPacketInfo {
    pub const fn new() -> Self {
        Self {
            v4: AtomicBool::new(false),
            v6: AtomicBool::new(false),
        }
    }

    #[inline]
    pub fn report(&self, family: AddressFamily, len: usize) {
        let logged = match family {
            AddressFamily::V4 => &self.v4,
            AddressFamily::V6 => &self.v6,
        };

        if !logged.swap(true, Ordering::Relaxed) {
            tracing::warn!(%family, len, "received packet info with an unexpected length");
        }
    }
}

impl<S: Socket> Conn<S> {
    /// Returns the next received datagram
    ///
    /// Datagrams are received in batches; a socket call is only made once
    /// every datagram of the previous batch has been returned. A malformed
    /// control message chain fails only the current call and the datagram is
    /// dropped. Datagrams truncated by the socket are skipped.
    pub fn read_packet(&mut self) -> Result<ReceivedPacket> {
        loop {
            if self.batch.is_exhausted() {
                self.batch.refill(&self.pool);
                let count = self.batch.recv(&self.socket)?;
                ensure!(count > 0, Err(Error::Closed));
            }

            let Some(received) = self.batch.take() else {
                // the socket reported a slot it did not fill
                return Err(Error::Closed);
            };

            if received.truncated {
                tracing::debug!(
                    remote = %received.remote,
                    capacity = received.payload.capacity(),
                    "dropped truncated datagram"
                );
                continue;
            }

            let gate = self.invalid_packet_info;
            let data = features::decode(self.platform, received.control, |family, value| {
                gate.report(family, value.len())
            })?;

            let packet_info = data.packet_info.filter(|_| self.packet_info);

            return Ok(ReceivedPacket {
                remote_address: received.remote,
                timestamp: Instant::now(),
                payload: received.payload,
                ecn: data.ecn,
                packet_info,
            });
        }
    }
}
