//! End-to-end transfers through a live relay on localhost.

use airpipe_relay::{serve, Config, PipeRelay};
use futures_util::{SinkExt, StreamExt};
use pipe_client::{Receiver, Sender, SessionConfig, TransferError};
use pipe_core::PairingLink;
use pipe_types::{ControlMessage, Role, Token};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use tokio::net::TcpListener;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;

async fn start_relay(config: Config) -> (String, Arc<PipeRelay>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let relay = Arc::new(PipeRelay::new(config));
    tokio::spawn(serve(listener, Arc::clone(&relay)));
    (format!("ws://{addr}"), relay)
}

fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

async fn next_control<S>(stream: &mut S) -> ControlMessage
where
    S: futures_util::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => return ControlMessage::from_json(&text).unwrap(),
            Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
            other => panic!("expected control message, got {other:?}"),
        }
    }
}

fn join_text(token: Token, role: Role) -> Message {
    Message::Text(ControlMessage::Join { token, role }.to_json().unwrap())
}

#[tokio::test]
async fn ten_megabytes_arrive_byte_identical() {
    let (url, relay) = start_relay(Config::default()).await;
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let data = pattern(10 * 1024 * 1024);
    let path = src.path().join("archive.bin");
    std::fs::write(&path, &data).unwrap();

    let mut sender = Sender::new(SessionConfig::generate(&url).unwrap());
    let link = sender.pairing_link().unwrap().to_url().unwrap();
    assert!(link.starts_with("http://127.0.0.1:"));
    assert!(link.contains("/d/"));

    let parsed = PairingLink::parse(&link).unwrap();
    let mut receiver = Receiver::new(SessionConfig::from_link(&parsed).unwrap());

    sender.connect().await.unwrap();
    receiver.connect().await.unwrap();
    sender.wait_for_peer(Duration::from_secs(5)).await.unwrap();

    let mut progress = Vec::new();
    let (sent, received) = tokio::join!(
        sender.send_file(&path, |_, _| {}),
        receiver.receive_file(dest.path(), |done, total| progress.push((done, total)))
    );
    let sent = sent.unwrap();
    let received = received.unwrap();

    assert_eq!(received.name, "archive.bin");
    assert_eq!(received.bytes, data.len() as u64);
    assert_eq!(received.chunks, sent.chunks);
    assert_eq!(std::fs::read(&received.path).unwrap(), data);

    assert!(progress.windows(2).all(|w| w[0].0 <= w[1].0));
    assert_eq!(progress.last(), Some(&(data.len() as u64, data.len() as u64)));

    let forwarded = relay.metrics().bytes_forwarded.load(Ordering::Relaxed);
    assert!(forwarded > data.len() as u64);
    assert_eq!(relay.metrics().pairings_total.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn receiver_first_link_flow() {
    let (url, _relay) = start_relay(Config::default()).await;
    let src = TempDir::new().unwrap();
    let dest = TempDir::new().unwrap();
    let path = src.path().join("notes.txt");
    std::fs::write(&path, b"upload from a phone").unwrap();

    let mut receiver = Receiver::new(SessionConfig::generate(&url).unwrap());
    let link = receiver.pairing_link().unwrap().to_url().unwrap();
    assert!(link.contains("/u/"));

    receiver.connect().await.unwrap();
    let parsed = PairingLink::parse(&link).unwrap();
    let mut sender = Sender::new(SessionConfig::from_link(&parsed).unwrap());
    sender.connect().await.unwrap();

    let (sent, received) = tokio::join!(
        sender.send_file(&path, |_, _| {}),
        receiver.receive_file(dest.path(), |_, _| {})
    );
    sent.unwrap();
    let received = received.unwrap();
    assert_eq!(std::fs::read(received.path).unwrap(), b"upload from a phone");
}

#[tokio::test]
async fn lone_sender_times_out() {
    let (url, relay) = start_relay(Config::default()).await;
    let mut sender = Sender::new(SessionConfig::generate(&url).unwrap());

    sender.connect().await.unwrap();
    let result = sender.wait_for_peer(Duration::ZERO).await;
    assert!(matches!(result, Err(TransferError::Timeout { .. })));
    sender.close().await;

    // The slot is released once the connection is gone
    tokio::time::timeout(Duration::from_secs(5), async {
        while relay.slot_count() > 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn duplicate_role_is_rejected() {
    let (url, _relay) = start_relay(Config::default()).await;
    let config = SessionConfig::generate(&url).unwrap();

    let mut first = Sender::new(config.clone());
    first.connect().await.unwrap();

    let mut second = Sender::new(config);
    let result = second.connect().await;
    assert!(matches!(result, Err(TransferError::HandshakeRejected(_))));
}

#[tokio::test]
async fn sender_leaving_before_metadata_is_reported() {
    let (url, _relay) = start_relay(Config::default()).await;
    let dest = TempDir::new().unwrap();
    let config = SessionConfig::generate(&url).unwrap();

    let mut sender = Sender::new(config.clone());
    let mut receiver = Receiver::new(config);
    sender.connect().await.unwrap();
    receiver.connect().await.unwrap();
    sender.close().await;

    let result = receiver.receive_file(dest.path(), |_, _| {}).await;
    assert!(matches!(
        result,
        Err(TransferError::ConnectionLost { bytes_transferred: 0, .. })
    ));
    assert_eq!(std::fs::read_dir(dest.path()).unwrap().count(), 0);
}

#[tokio::test]
async fn other_paths_are_refused() {
    let (url, _relay) = start_relay(Config::default()).await;
    assert!(connect_async(format!("{url}/d/abc")).await.is_err());
    assert!(connect_async(format!("{url}/ws")).await.is_ok());
}

#[tokio::test]
async fn malformed_join_gets_error() {
    let (url, relay) = start_relay(Config::default()).await;
    let (mut ws, _) = connect_async(format!("{url}/ws")).await.unwrap();

    ws.send(Message::Text("{\"type\":\"hello\"}".into())).await.unwrap();
    assert!(matches!(
        next_control(&mut ws).await,
        ControlMessage::Error { .. }
    ));
    assert_eq!(relay.metrics().joins_rejected.load(Ordering::Relaxed), 1);
}

#[tokio::test]
async fn frames_are_forwarded_verbatim_then_peer_left() {
    let (url, _relay) = start_relay(Config::default()).await;
    let token = Token::generate().unwrap();

    let (mut offer, _) = connect_async(format!("{url}/ws")).await.unwrap();
    offer.send(join_text(token, Role::Offer)).await.unwrap();
    assert_eq!(next_control(&mut offer).await, ControlMessage::Waiting);

    let (mut accept, _) = connect_async(format!("{url}/ws")).await.unwrap();
    accept.send(join_text(token, Role::Accept)).await.unwrap();
    assert_eq!(next_control(&mut accept).await, ControlMessage::PeerJoined);
    assert_eq!(next_control(&mut offer).await, ControlMessage::PeerJoined);

    offer.send(Message::Binary(vec![1, 2, 3])).await.unwrap();
    offer.send(Message::Binary(vec![4, 5])).await.unwrap();
    offer.close(None).await.unwrap();

    let mut frames = Vec::new();
    loop {
        match accept.next().await {
            Some(Ok(Message::Binary(frame))) => frames.push(frame),
            Some(Ok(Message::Text(text))) => {
                assert_eq!(
                    ControlMessage::from_json(&text).unwrap(),
                    ControlMessage::PeerLeft
                );
                break;
            }
            other => panic!("unexpected {other:?}"),
        }
    }
    assert_eq!(frames, vec![vec![1, 2, 3], vec![4, 5]]);
}

#[tokio::test]
async fn silent_connection_is_dropped_after_join_timeout() {
    let mut config = Config::default();
    config.limits.join_timeout_secs = 1;
    let (url, relay) = start_relay(config).await;

    let (mut ws, _) = connect_async(format!("{url}/ws")).await.unwrap();
    assert!(matches!(
        next_control(&mut ws).await,
        ControlMessage::Error { .. }
    ));
    assert_eq!(relay.metrics().join_timeouts.load(Ordering::Relaxed), 1);
}
