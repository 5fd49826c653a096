// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

use super::Conn;
use crate::{
    features,
    inet::{self, ExplicitCongestionNotification},
    socket::Socket,
};
use std::{io, net::SocketAddr};

impl<S: Socket> Conn<S> {
    /// Sends a datagram to `destination`
    ///
    /// `base_control` is copied in front of the generated control messages.
    /// A non-zero `gso_size` splits the payload into segments of that size.
    /// The byte count and any error are returned as reported by the socket.
    ///
    /// # Panics
    ///
    /// Panics if `gso_size` is non-zero without GSO support or `ecn` is
    /// supported without ECN support.
    pub fn write_packet(
        &self,
        payload: &[u8],
        destination: SocketAddr,
        base_control: &[u8],
        gso_size: u16,
        ecn: ExplicitCongestionNotification,
    ) -> io::Result<usize> {
        if gso_size > 0 {
            assert!(self.capabilities.supports_gso, "GSO disabled");
        }
        if ecn.is_supported() {
            assert!(
                self.capabilities.supports_ecn,
                "tried to send an ECN-marked packet although ECN is disabled"
            );
        }

        let mut control = Vec::with_capacity(base_control.len() + 64);
        control.extend_from_slice(base_control);

        if gso_size > 0 {
            features::encode_gso(self.platform, &mut control, gso_size);
        }

        if ecn.is_supported() {
            let is_ipv4 = inet::is_ipv4(&destination);
            features::encode_ecn(self.platform, &mut control, ecn, is_ipv4);
        }

        self.socket.send_msg(payload, &destination, &control)
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        conn::tests::scripted_conn,
        features::{PacketInfo, Platform},
        inet::ExplicitCongestionNotification,
        message::cmsg,
        testing::Scripted,
        Conn, Options,
    };
    use std::net::SocketAddr;

    const PLATFORM: &Platform = &Platform::LINUX;

    fn socket() -> Scripted {
        Scripted::new("0.0.0.0:443".parse().unwrap())
    }

    fn records(control: &[u8]) -> Vec<((i32, i32), Vec<u8>)> {
        cmsg::Iter::new(PLATFORM.cmsg, control)
            .map(|item| {
                let (header, value) = item.unwrap();
                ((header.level, header.ty), value.to_vec())
            })
            .collect()
    }

    #[test]
    fn plain_send() {
        let conn = scripted_conn(socket(), PLATFORM);
        let remote: SocketAddr = "192.0.2.1:4433".parse().unwrap();

        let len = conn
            .write_packet(
                b"hello",
                remote,
                &[],
                0,
                ExplicitCongestionNotification::Unsupported,
            )
            .unwrap();
        assert_eq!(len, 5);

        let sent = conn.socket().sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].payload, b"hello");
        assert_eq!(sent[0].remote, remote);
        assert!(sent[0].control.is_empty());
    }

    #[test]
    fn gso_and_ecn_records() {
        let conn = scripted_conn(socket(), PLATFORM);

        let info = PacketInfo {
            addr: "192.0.2.9".parse().unwrap(),
            interface: 4,
        };
        let base = info.control_message(PLATFORM);

        conn.write_packet(
            &[0; 2400],
            "[::ffff:192.0.2.1]:4433".parse().unwrap(),
            &base,
            1200,
            ExplicitCongestionNotification::Ect0,
        )
        .unwrap();
        conn.write_packet(
            &[0; 10],
            "[2001:db8::1]:4433".parse().unwrap(),
            &[],
            0,
            ExplicitCongestionNotification::Ce,
        )
        .unwrap();

        let sent = conn.socket().sent();

        let first = records(&sent[0].control);
        assert_eq!(first.len(), 3);
        assert_eq!(first[0].0, (0, 8));
        assert_eq!(first[1], ((17, 103), 1200u16.to_ne_bytes().to_vec()));
        // the mapped destination uses the IPv4 record
        assert_eq!(first[2], ((0, 1), 0b10u32.to_ne_bytes().to_vec()));

        let second = records(&sent[1].control);
        assert_eq!(second, [((41, 67), 0b11u32.to_ne_bytes().to_vec())]);
    }

    #[test]
    #[should_panic(expected = "GSO disabled")]
    fn gso_without_support() {
        let conn = scripted_conn(socket(), &Platform::APPLE);
        assert!(!conn.capabilities().supports_gso);

        let _ = conn.write_packet(
            &[0; 2400],
            "192.0.2.1:4433".parse().unwrap(),
            &[],
            1200,
            ExplicitCongestionNotification::Unsupported,
        );
    }

    #[test]
    #[should_panic(expected = "GSO disabled")]
    fn gso_probe_rejected() {
        let socket = socket();
        socket.reject(PLATFORM.gso.option.unwrap());
        let conn = scripted_conn(socket, PLATFORM);
        assert!(!conn.capabilities().supports_gso);

        let _ = conn.write_packet(
            &[0; 2400],
            "192.0.2.1:4433".parse().unwrap(),
            &[],
            1200,
            ExplicitCongestionNotification::Unsupported,
        );
    }

    #[test]
    #[should_panic(expected = "ECN is disabled")]
    fn ecn_without_support() {
        let mut options = Options::new(false);
        options.ecn = false;
        options.platform = PLATFORM;
        let conn = Conn::with_options(socket(), options).unwrap();

        let _ = conn.write_packet(
            b"x",
            "192.0.2.1:4433".parse().unwrap(),
            &[],
            0,
            ExplicitCongestionNotification::Ect1,
        );
    }
}
