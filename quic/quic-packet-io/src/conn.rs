// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

//! A UDP endpoint with batched receive and GSO/ECN-aware send

use crate::{
    buffer::{PacketBuffer, Pool},
    error::Result,
    features::{Platform, SocketBuffers},
    inet::ExplicitCongestionNotification,
    probe,
    socket::{options::Options, Socket},
};
use core::ffi::c_int;
use std::{io, net::SocketAddr, time::Instant};

mod batch;
mod rx;
mod tx;

pub use crate::features::PacketInfo;

use batch::Batch;
use rx::InvalidPacketInfo;

/// Capabilities negotiated when the connection is created
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// The don't-fragment bit is set on outgoing datagrams
    pub supports_df: bool,
    /// Sends may carry a segment size
    pub supports_gso: bool,
    /// Sends may carry an ECN mark
    pub supports_ecn: bool,
}

/// A datagram returned by [`Conn::read_packet`]
#[derive(Debug)]
pub struct ReceivedPacket {
    pub remote_address: SocketAddr,
    pub timestamp: Instant,
    pub payload: PacketBuffer,
    /// `Unsupported` if the OS did not report a codepoint
    pub ecn: ExplicitCongestionNotification,
    /// Only set for sockets bound to an unspecified address
    pub packet_info: Option<PacketInfo>,
}

impl ReceivedPacket {
    /// Returns the payload buffer to the pool
    #[inline]
    pub fn release(self) {
        self.payload.release()
    }
}

pub struct Conn<S: Socket> {
    socket: S,
    platform: &'static Platform,
    capabilities: Capabilities,
    pool: Pool,
    batch: Batch,
    /// Packet info reporting was enabled on the socket
    packet_info: bool,
    invalid_packet_info: &'static InvalidPacketInfo,
}

impl<S: Socket> core::fmt::Debug for Conn<S> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Conn")
            .field("platform", &self.platform.name)
            .field("capabilities", &self.capabilities)
            .field("packet_info", &self.packet_info)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

impl<S: Socket> Conn<S> {
    /// Wraps `socket` with the default options
    #[inline]
    pub fn new(socket: S, supports_df: bool) -> Result<Self> {
        Self::with_options(socket, Options::new(supports_df))
    }

    /// Probes the socket's capabilities and wraps it
    ///
    /// ECN and packet info reporting are enabled on the socket. Failing to
    /// enable either for both address families is an error.
    #[inline]
    pub fn with_options(socket: S, options: Options) -> Result<Self> {
        Self::build(socket, options, &rx::INVALID_PACKET_INFO)
    }

    pub(crate) fn build(
        socket: S,
        options: Options,
        invalid_packet_info: &'static InvalidPacketInfo,
    ) -> Result<Self> {
        let platform = options.platform;
        let local_address = socket.local_addr()?;
        let needs_packet_info = local_address.ip().is_unspecified();

        let receive =
            probe::probe_receive_options(platform, &socket, options.ecn, needs_packet_info)?;
        let supports_gso = options.gso && probe::probe_gso(platform, &socket);

        let capabilities = Capabilities {
            supports_df: options.supports_df,
            supports_gso,
            supports_ecn: receive.ecn,
        };

        let pool = Pool::new(options.max_packet_size, options.pool_max_idle);
        let batch = Batch::new(options.batch_size.max(1));

        tracing::debug!(
            %local_address,
            platform = platform.name,
            ?capabilities,
            packet_info = receive.packet_info,
            batch_size = batch.capacity(),
            "connection created"
        );

        Ok(Self {
            socket,
            platform,
            capabilities,
            pool,
            batch,
            packet_info: receive.packet_info,
            invalid_packet_info,
        })
    }

    #[inline]
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    #[inline]
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    #[inline]
    pub fn platform(&self) -> &'static Platform {
        self.platform
    }

    #[inline]
    pub fn socket(&self) -> &S {
        &self.socket
    }

    #[inline]
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    #[inline]
    pub fn inspect_receive_buffer_size(&self) -> io::Result<usize> {
        let buffers = self.buffers()?;
        self.get_size((buffers.level, buffers.recv))
    }

    #[inline]
    pub fn inspect_send_buffer_size(&self) -> io::Result<usize> {
        let buffers = self.buffers()?;
        self.get_size((buffers.level, buffers.send))
    }

    /// Sets the receive buffer size, bypassing the system limit where the platform allows it
    #[inline]
    pub fn force_set_receive_buffer_size(&self, bytes: usize) -> io::Result<()> {
        let buffers = self.buffers()?;
        let name = buffers.recv_force.unwrap_or(buffers.recv);
        self.socket.set_option((buffers.level, name), clamp(bytes))
    }

    /// Sets the send buffer size, bypassing the system limit where the platform allows it
    #[inline]
    pub fn force_set_send_buffer_size(&self, bytes: usize) -> io::Result<()> {
        let buffers = self.buffers()?;
        let name = buffers.send_force.unwrap_or(buffers.send);
        self.socket.set_option((buffers.level, name), clamp(bytes))
    }

    #[inline]
    fn buffers(&self) -> io::Result<SocketBuffers> {
        self.platform.buffers.ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::Unsupported,
                "socket buffer options are not available on this platform",
            )
        })
    }

    #[inline]
    fn get_size(&self, option: (c_int, c_int)) -> io::Result<usize> {
        let value = self.socket.get_option(option)?;
        Ok(value.max(0) as usize)
    }
}

#[inline]
fn clamp(bytes: usize) -> c_int {
    bytes.try_into().unwrap_or(c_int::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::Scripted;

    pub(super) fn scripted_conn(socket: Scripted, platform: &'static Platform) -> Conn<Scripted> {
        let options = Options {
            platform,
            batch_size: 4,
            ..Options::new(true)
        };
        Conn::build(socket, options, Box::leak(Box::new(InvalidPacketInfo::new()))).unwrap()
    }

    #[test]
    fn capabilities() {
        let socket = Scripted::new("0.0.0.0:4433".parse().unwrap());
        let conn = scripted_conn(socket, &Platform::LINUX);
        assert_eq!(
            conn.capabilities(),
            Capabilities {
                supports_df: true,
                supports_gso: true,
                supports_ecn: true,
            }
        );
        assert!(conn.packet_info);

        let socket = Scripted::new("127.0.0.1:4433".parse().unwrap());
        let conn = scripted_conn(socket, &Platform::APPLE);
        assert!(!conn.capabilities().supports_gso);
        assert!(conn.capabilities().supports_ecn);
        assert!(!conn.packet_info);
    }

    #[test]
    fn disabled_by_options() {
        let socket = Scripted::new("127.0.0.1:4433".parse().unwrap());
        let options = Options {
            gso: false,
            ecn: false,
            platform: &Platform::LINUX,
            ..Options::new(false)
        };
        let conn = Conn::with_options(socket, options).unwrap();
        assert_eq!(conn.capabilities(), Capabilities::default());
        assert!(conn.socket().option_writes((17, 103)).is_empty());
    }

    #[test]
    fn ecn_probe_failure_is_fatal() {
        let platform = &Platform::LINUX;
        let socket = Scripted::new("127.0.0.1:4433".parse().unwrap());
        socket.reject(platform.tos.v4_option.unwrap());
        socket.reject(platform.tos.v6_option.unwrap());

        let options = Options {
            platform,
            ..Options::new(false)
        };
        assert!(Conn::with_options(socket, options).is_err());
    }

    #[test]
    fn buffer_sizes() {
        let socket = Scripted::new("127.0.0.1:4433".parse().unwrap());
        let conn = scripted_conn(socket, &Platform::LINUX);

        conn.force_set_receive_buffer_size(1 << 20).unwrap();
        conn.force_set_send_buffer_size(usize::MAX).unwrap();
        assert_eq!(conn.socket().option_writes((1, 33)), [1 << 20]);
        assert_eq!(conn.socket().option_writes((1, 32)), [c_int::MAX]);

        // the plain options are read back
        conn.socket().set_option((1, 8), 4096).unwrap();
        assert_eq!(conn.inspect_receive_buffer_size().unwrap(), 4096);
        assert_eq!(conn.inspect_send_buffer_size().unwrap(), 0);

        let socket = Scripted::new("127.0.0.1:4433".parse().unwrap());
        let conn = scripted_conn(socket, &Platform::APPLE);
        conn.force_set_receive_buffer_size(1024).unwrap();
        assert_eq!(conn.socket().option_writes((0xffff, 0x1002)), [1024]);

        let socket = Scripted::new("127.0.0.1:4433".parse().unwrap());
        let conn = scripted_conn(socket, &Platform::UNSUPPORTED);
        assert_eq!(
            conn.inspect_receive_buffer_size().unwrap_err().kind(),
            io::ErrorKind::Unsupported
        );
    }
}
