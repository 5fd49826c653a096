// Copyright Amazon.com, Inc. or its affiliates. All Rights Reserved.
// SPDX-License-Identifier: Apache-2.0

#![cfg(target_os = "linux")]

use quic_packet_io::{testing::init_tracing, Conn, ExplicitCongestionNotification, Options};
use std::{
    net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket},
    time::Duration,
};

fn bind(addr: &str) -> Conn<UdpSocket> {
    init_tracing();

    let socket = UdpSocket::bind(addr).unwrap();
    socket
        .set_read_timeout(Some(Duration::from_secs(5)))
        .unwrap();

    let mut options = Options::new(false);
    options.batch_size = 4;
    Conn::with_options(socket, options).unwrap()
}

fn loopback(conn: &Conn<UdpSocket>) -> SocketAddr {
    let port = conn.local_addr().unwrap().port();
    SocketAddr::new(Ipv4Addr::LOCALHOST.into(), port)
}

#[test]
fn ecn_and_packet_info() {
    let mut server = bind("0.0.0.0:0");
    let client = bind("127.0.0.1:0");
    assert!(client.capabilities().supports_ecn);

    client
        .write_packet(
            b"hello",
            loopback(&server),
            &[],
            0,
            ExplicitCongestionNotification::Ect0,
        )
        .unwrap();

    let packet = server.read_packet().unwrap();
    assert_eq!(&*packet.payload, b"hello");
    assert_eq!(packet.remote_address, client.local_addr().unwrap());
    assert_eq!(packet.ecn, ExplicitCongestionNotification::Ect0);

    let info = packet.packet_info.expect("wildcard sockets report packet info");
    assert_eq!(info.addr, IpAddr::V4(Ipv4Addr::LOCALHOST));
}

#[test]
fn reply_from_packet_info() {
    let mut server = bind("0.0.0.0:0");
    let mut client = bind("127.0.0.1:0");

    client
        .write_packet(
            b"ping",
            loopback(&server),
            &[],
            0,
            ExplicitCongestionNotification::Unsupported,
        )
        .unwrap();

    let packet = server.read_packet().unwrap();
    let info = packet.packet_info.unwrap();
    let control = info.control_message(server.platform());

    server
        .write_packet(
            b"pong",
            packet.remote_address,
            &control,
            0,
            ExplicitCongestionNotification::NotEct,
        )
        .unwrap();

    let reply = client.read_packet().unwrap();
    assert_eq!(&*reply.payload, b"pong");
    assert_eq!(reply.remote_address, loopback(&server));
    assert_eq!(reply.ecn, ExplicitCongestionNotification::NotEct);
}

#[test]
fn segmented_send() {
    let mut server = bind("127.0.0.1:0");
    let client = bind("127.0.0.1:0");

    if !client.capabilities().supports_gso {
        return;
    }

    let payload: Vec<u8> = (0..2500u32).map(|i| i as u8).collect();
    let sent = client
        .write_packet(
            &payload,
            loopback(&server),
            &[],
            1000,
            ExplicitCongestionNotification::Unsupported,
        )
        .unwrap();
    assert_eq!(sent, payload.len());

    let mut received = vec![];
    for expected in [1000, 1000, 500] {
        let packet = server.read_packet().unwrap();
        assert_eq!(packet.payload.len(), expected);
        received.extend_from_slice(&packet.payload);
    }
    assert_eq!(received, payload);
}

#[test]
fn oversized_datagrams_are_skipped() {
    let mut server = bind("127.0.0.1:0");
    let client = bind("127.0.0.1:0");

    let payloads: [&[u8]; 2] = [&[7; 3000], b"small"];
    for payload in payloads {
        client
            .write_packet(
                payload,
                loopback(&server),
                &[],
                0,
                ExplicitCongestionNotification::Unsupported,
            )
            .unwrap();
    }

    let packet = server.read_packet().unwrap();
    assert_eq!(&*packet.payload, b"small");
}

#[test]
fn buffer_sizes() {
    let conn = bind("127.0.0.1:0");
    assert!(conn.inspect_receive_buffer_size().unwrap() > 0);
    assert!(conn.inspect_send_buffer_size().unwrap() > 0);
}

#[test]
fn read_timeout_is_passed_through() {
    let socket = UdpSocket::bind("127.0.0.1:0").unwrap();
    socket
        .set_read_timeout(Some(Duration::from_millis(10)))
        .unwrap();
    let mut conn = Conn::new(socket, false).unwrap();

    let err = conn.read_packet().unwrap_err();
    assert!(err.is_would_block(), "{err:?}");

    // the batch stays exhausted and the next read tries again
    let err = conn.read_packet().unwrap_err();
    assert!(err.is_would_block(), "{err:?}");
}
