//! Integration tests driving a real relay over TCP.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use imrelay_protocol::{ClientFrame, ClientFrameCodec, ServerFrame, ServerFrameCodec};
use imrelay_server::Relay;
use tokio::{
    io::{AsyncWriteExt, ReadHalf, WriteHalf},
    net::TcpStream,
    sync::oneshot,
};
use tokio_util::codec::{FramedRead, FramedWrite};

// =========================================================================
// Helpers
// =========================================================================

struct TestClient {
    reader: FramedRead<ReadHalf<TcpStream>, ServerFrameCodec>,
    writer: FramedWrite<WriteHalf<TcpStream>, ClientFrameCodec>,
}

impl TestClient {
    async fn connect(addr: &str) -> Self {
        let stream = TcpStream::connect(addr).await.expect("should connect");
        let (rx, tx) = tokio::io::split(stream);
        Self {
            reader: FramedRead::new(rx, ServerFrameCodec::default()),
            writer: FramedWrite::new(tx, ClientFrameCodec::default()),
        }
    }

    async fn send(&mut self, frame: ClientFrame) {
        self.writer.send(frame).await.expect("send");
    }

    async fn recv(&mut self) -> ServerFrame {
        tokio::time::timeout(Duration::from_secs(5), self.reader.next())
            .await
            .expect("timed out waiting for frame")
            .expect("stream ended")
            .expect("decode")
    }

    /// Asserts nothing arrives within a short window.
    async fn expect_silence(&mut self) {
        let next = tokio::time::timeout(Duration::from_millis(100), self.reader.next()).await;
        assert!(next.is_err(), "unexpected frame: {next:?}");
    }

    async fn login(addr: &str, name: &str) -> (Self, ServerFrame) {
        let mut client = Self::connect(addr).await;
        client.send(ClientFrame::login(name)).await;
        let result = client.recv().await;
        (client, result)
    }
}

/// Starts a relay on a random port and returns its address.
async fn start_relay() -> String {
    let relay = Relay::bind("127.0.0.1:0").await.expect("relay should bind");
    let addr = relay.local_addr().expect("should have local addr").to_string();
    tokio::spawn(async move {
        let _ = relay.run().await;
    });
    addr
}

// =========================================================================
// Tests
// =========================================================================

#[tokio::test]
async fn test_scenario_walkthrough() {
    let addr = start_relay().await;

    let (mut alice, result) = TestClient::login(&addr, "alice").await;
    assert_eq!(result, ServerFrame::login_ok(Vec::<String>::new()));

    let (mut bob, result) = TestClient::login(&addr, "bob").await;
    assert_eq!(result, ServerFrame::login_ok(["alice"]));
    assert_eq!(alice.recv().await, ServerFrame::UserOnline("bob".into()));

    bob.send(ClientFrame::private("alice", "hi")).await;
    assert_eq!(alice.recv().await, ServerFrame::private("bob", "hi"));

    alice.send(ClientFrame::group("hello")).await;
    assert_eq!(bob.recv().await, ServerFrame::group("alice", "hello"));
    alice.expect_silence().await;

    let (_impostor, result) = TestClient::login(&addr, "alice").await;
    assert_eq!(result, ServerFrame::login_fail());
    alice.expect_silence().await;
    bob.expect_silence().await;

    drop(alice);
    assert_eq!(bob.recv().await, ServerFrame::UserOffline("alice".into()));
}

#[tokio::test]
async fn test_private_message_to_unknown_user_is_silent() {
    let addr = start_relay().await;
    let (mut alice, _) = TestClient::login(&addr, "alice").await;
    let (mut bob, _) = TestClient::login(&addr, "bob").await;
    alice.recv().await;

    bob.send(ClientFrame::private("carol", "anyone?")).await;
    bob.expect_silence().await;
    alice.expect_silence().await;
}

#[tokio::test]
async fn test_failed_login_can_be_retried() {
    let addr = start_relay().await;
    let (_alice, _) = TestClient::login(&addr, "alice").await;

    let mut client = TestClient::connect(&addr).await;
    client.send(ClientFrame::login("alice")).await;
    assert_eq!(client.recv().await, ServerFrame::login_fail());
    client.send(ClientFrame::login("a b")).await;
    assert_eq!(client.recv().await, ServerFrame::login_fail());
    client.send(ClientFrame::login("alice2")).await;
    assert_eq!(client.recv().await, ServerFrame::login_ok(["alice"]));
}

#[tokio::test]
async fn test_malformed_frames_are_skipped() {
    let addr = start_relay().await;
    let (mut alice, _) = TestClient::login(&addr, "alice").await;

    // several frames in one write, some of them garbage
    let mut raw = TcpStream::connect(&addr).await.expect("should connect");
    raw.write_all(b"garbage\n99 what\n1 bob\n2 alice\n2 alice psst\n")
        .await
        .expect("write");

    assert_eq!(alice.recv().await, ServerFrame::UserOnline("bob".into()));
    assert_eq!(alice.recv().await, ServerFrame::private("bob", "psst"));
    alice.expect_silence().await;
}

#[tokio::test]
async fn test_stray_carriage_return_does_not_disconnect_others() {
    let addr = start_relay().await;
    let (mut alice, _) = TestClient::login(&addr, "alice").await;

    let mut raw = TcpStream::connect(&addr).await.expect("should connect");
    raw.write_all(b"1 bob\n").await.expect("write");
    assert_eq!(alice.recv().await, ServerFrame::UserOnline("bob".into()));

    raw.write_all(b"3 evil\rtext\n2 alice sneaky\rdm\n")
        .await
        .expect("write");
    alice.expect_silence().await;

    // both ends are still connected
    raw.write_all(b"3 still here\n").await.expect("write");
    assert_eq!(alice.recv().await, ServerFrame::group("bob", "still here"));
    alice.send(ClientFrame::private("bob", "hi")).await;
    let mut bob = FramedRead::new(raw, ServerFrameCodec::default());
    let next = tokio::time::timeout(Duration::from_secs(5), bob.next())
        .await
        .expect("timed out waiting for frame")
        .expect("stream ended")
        .expect("decode");
    assert_eq!(next, ServerFrame::private("alice", "hi"));
}

#[tokio::test]
async fn test_unauthenticated_disconnect_is_not_broadcast() {
    let addr = start_relay().await;
    let (mut alice, _) = TestClient::login(&addr, "alice").await;

    let lurker = TestClient::connect(&addr).await;
    drop(lurker);
    alice.expect_silence().await;
}

#[tokio::test]
async fn test_shutdown_closes_connections() {
    let relay = Relay::bind("127.0.0.1:0").await.expect("relay should bind");
    let addr = relay.local_addr().expect("should have local addr").to_string();
    let (stop, stopped) = oneshot::channel::<()>();
    let server = tokio::spawn(relay.run_until(async move {
        let _ = stopped.await;
    }));

    let (mut alice, _) = TestClient::login(&addr, "alice").await;
    stop.send(()).expect("relay still running");
    server.await.expect("join").expect("clean shutdown");

    let next = tokio::time::timeout(Duration::from_secs(5), alice.reader.next())
        .await
        .expect("connection should close");
    assert!(next.is_none(), "unexpected frame: {next:?}");
}
