//! Loopback tests for the echo server.
//!
//! These need kernel SCTP support (the `sctp` module on linux); when the
//! protocol is unavailable each test skips itself instead of failing.

use std::net::{IpAddr, Ipv6Addr, Shutdown, SocketAddr};
use std::time::Duration;

use tokio::time::timeout;

use sctp_echo::config::Config;
use sctp_echo::sctp::{SctpSocket, SndInfo, SocketKind};
use sctp_echo::server::Server;
use sctp_echo::shutdown::ShutdownFlag;
use sctp_echo::AsyncSctpSocket;

fn sctp_available() -> bool {
    SctpSocket::new(SocketKind::Stream).is_ok()
}

fn test_config(kind: SocketKind, echo: bool) -> Config {
    Config {
        port: 0,
        recvbuf_size: 1024,
        kind,
        echo,
        verbose: false,
    }
}

fn loopback(port: u16) -> SocketAddr {
    SocketAddr::new(IpAddr::V6(Ipv6Addr::LOCALHOST), port)
}

#[tokio::test]
async fn stream_echo_round_trip() {
    if !sctp_available() {
        eprintln!("skipping: kernel lacks SCTP support");
        return;
    }

    let flag = ShutdownFlag::new();
    let mut server = Server::bind(&test_config(SocketKind::Stream, true), flag.clone()).unwrap();
    let port = server.local_addr().unwrap().port();
    let handle = tokio::spawn(async move { server.run().await });

    let client = AsyncSctpSocket::new(SocketKind::Stream).unwrap();
    client.connect(loopback(port)).await.unwrap();
    client
        .sendmsg(b"hello", &SndInfo::default(), None)
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let msg = timeout(Duration::from_secs(5), client.recvmsg(&mut buf))
        .await
        .expect("no echo within 5s")
        .unwrap();
    assert_eq!(&buf[..msg.len], b"hello");

    flag.request();
    timeout(Duration::from_secs(1), handle)
        .await
        .expect("server did not stop after shutdown request")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn seqpacket_echo_round_trip() {
    if !sctp_available() {
        eprintln!("skipping: kernel lacks SCTP support");
        return;
    }

    let flag = ShutdownFlag::new();
    let mut server = Server::bind(&test_config(SocketKind::SeqPacket, true), flag.clone()).unwrap();
    let port = server.local_addr().unwrap().port();
    let handle = tokio::spawn(async move { server.run().await });

    let client = AsyncSctpSocket::new(SocketKind::SeqPacket).unwrap();
    client
        .sendmsg(b"ping", &SndInfo::default(), Some(loopback(port)))
        .await
        .unwrap();

    let mut buf = [0u8; 64];
    let msg = timeout(Duration::from_secs(5), client.recvmsg(&mut buf))
        .await
        .expect("no echo within 5s")
        .unwrap();
    assert_eq!(&buf[..msg.len], b"ping");

    flag.request();
    timeout(Duration::from_secs(1), handle)
        .await
        .expect("server did not stop after shutdown request")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn seqpacket_peer_close_keeps_loop_serving_other_peers() {
    if !sctp_available() {
        eprintln!("skipping: kernel lacks SCTP support");
        return;
    }

    let flag = ShutdownFlag::new();
    let mut server = Server::bind(&test_config(SocketKind::SeqPacket, true), flag.clone()).unwrap();
    let port = server.local_addr().unwrap().port();
    let handle = tokio::spawn(async move { server.run().await });

    let mut buf = [0u8; 64];

    let first = AsyncSctpSocket::new(SocketKind::SeqPacket).unwrap();
    first
        .sendmsg(b"one", &SndInfo::default(), Some(loopback(port)))
        .await
        .unwrap();
    let msg = timeout(Duration::from_secs(5), first.recvmsg(&mut buf))
        .await
        .expect("no echo within 5s")
        .unwrap();
    assert_eq!(&buf[..msg.len], b"one");

    // tear the first association down; the receive loop must keep running
    first.shutdown(Shutdown::Both).unwrap();
    drop(first);

    let second = AsyncSctpSocket::new(SocketKind::SeqPacket).unwrap();
    second
        .sendmsg(b"two", &SndInfo::default(), Some(loopback(port)))
        .await
        .unwrap();
    let msg = timeout(Duration::from_secs(5), second.recvmsg(&mut buf))
        .await
        .expect("no echo within 5s")
        .unwrap();
    assert_eq!(&buf[..msg.len], b"two");

    flag.request();
    timeout(Duration::from_secs(1), handle)
        .await
        .expect("server did not stop after shutdown request")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn shutdown_request_stops_idle_accept_loop() {
    if !sctp_available() {
        eprintln!("skipping: kernel lacks SCTP support");
        return;
    }

    let flag = ShutdownFlag::new();
    let mut server = Server::bind(&test_config(SocketKind::Stream, false), flag.clone()).unwrap();
    let handle = tokio::spawn(async move { server.run().await });

    // let the accept loop park in its bounded wait first
    tokio::time::sleep(Duration::from_millis(150)).await;
    flag.request();

    timeout(Duration::from_millis(500), handle)
        .await
        .expect("accept loop did not stop within the polling interval")
        .unwrap()
        .unwrap();
}

#[tokio::test]
async fn peer_close_ends_session_but_not_server() {
    if !sctp_available() {
        eprintln!("skipping: kernel lacks SCTP support");
        return;
    }

    let flag = ShutdownFlag::new();
    let mut server = Server::bind(&test_config(SocketKind::Stream, true), flag.clone()).unwrap();
    let port = server.local_addr().unwrap().port();
    let handle = tokio::spawn(async move { server.run().await });

    let mut buf = [0u8; 64];

    let first = AsyncSctpSocket::new(SocketKind::Stream).unwrap();
    first.connect(loopback(port)).await.unwrap();
    first
        .sendmsg(b"one", &SndInfo::default(), None)
        .await
        .unwrap();
    let msg = timeout(Duration::from_secs(5), first.recvmsg(&mut buf))
        .await
        .expect("no echo within 5s")
        .unwrap();
    assert_eq!(&buf[..msg.len], b"one");

    // orderly close: the session loop must end without taking the server down
    first.shutdown(Shutdown::Write).unwrap();
    drop(first);

    // the server must get back to accepting after the peer went away
    let second = AsyncSctpSocket::new(SocketKind::Stream).unwrap();
    second.connect(loopback(port)).await.unwrap();
    second
        .sendmsg(b"two", &SndInfo::default(), None)
        .await
        .unwrap();
    let msg = timeout(Duration::from_secs(5), second.recvmsg(&mut buf))
        .await
        .expect("no echo within 5s")
        .unwrap();
    assert_eq!(&buf[..msg.len], b"two");

    flag.request();
    timeout(Duration::from_secs(1), handle)
        .await
        .expect("server did not stop after shutdown request")
        .unwrap()
        .unwrap();
}
