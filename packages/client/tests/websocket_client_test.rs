//! Integration tests running the client against an in-process STOMP broker.

use std::{sync::Arc, time::Duration};

use futures_util::{SinkExt, StreamExt};
use tokio::{net::TcpListener, sync::mpsc, time::timeout};
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};

use dengon_client::{
    ChannelEventHandler, ClientConfig, ConnectionState, GroupId, InboundEvent, MessageKind,
    MessagingClient, UserId, WebSocketConnector,
    stomp::{Command, Frame},
};

const WAIT: Duration = Duration::from_secs(5);
const RETRY_DELAY: Duration = Duration::from_millis(200);

/// What the broker does with a CONNECT frame
#[derive(Clone, Copy)]
enum Handshake {
    Accept,
    Reject,
}

/// Broker-side handle of one accepted session
struct BrokerSession {
    /// The CONNECT frame sent by the client
    connect: Frame,
    /// Frames received after the handshake
    frames: mpsc::UnboundedReceiver<Frame>,
    /// Frames to push to the client; dropping it closes the socket
    outbound: mpsc::UnboundedSender<Frame>,
}

impl BrokerSession {
    async fn next_frame(&mut self) -> Frame {
        timeout(WAIT, self.frames.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("session closed")
    }

    async fn next_frames(&mut self, count: usize) -> Vec<Frame> {
        let mut frames = Vec::with_capacity(count);
        for _ in 0..count {
            frames.push(self.next_frame().await);
        }
        frames
    }

    fn deliver(&self, subscription_id: &str, body: &str) {
        let frame = Frame::new(Command::Message)
            .with_header("subscription", subscription_id)
            .with_header("message-id", "1")
            .with_body(body);
        self.outbound.send(frame).unwrap();
    }
}

/// Minimal STOMP broker: answers the handshake according to `script`
/// (accepting once the script runs out) and hands every accepted session
/// to the test.
struct TestBroker {
    port: u16,
    sessions: mpsc::UnboundedReceiver<BrokerSession>,
    rejected: mpsc::UnboundedReceiver<Frame>,
}

impl TestBroker {
    async fn start(script: Vec<Handshake>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (sessions_tx, sessions_rx) = mpsc::unbounded_channel();
        let (rejected_tx, rejected_rx) = mpsc::unbounded_channel();

        tokio::spawn(async move {
            let mut script = script.into_iter();
            while let Ok((stream, _)) = listener.accept().await {
                let handshake = script.next().unwrap_or(Handshake::Accept);
                let sessions_tx = sessions_tx.clone();
                let rejected_tx = rejected_tx.clone();
                tokio::spawn(async move {
                    let ws = accept_async(stream).await.unwrap();
                    serve(ws, handshake, sessions_tx, rejected_tx).await;
                });
            }
        });

        Self {
            port,
            sessions: sessions_rx,
            rejected: rejected_rx,
        }
    }

    fn url(&self) -> String {
        format!("ws://127.0.0.1:{}/ws", self.port)
    }

    async fn next_session(&mut self) -> BrokerSession {
        timeout(WAIT, self.sessions.recv())
            .await
            .expect("timed out waiting for a session")
            .unwrap()
    }
}

async fn serve(
    ws: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    handshake: Handshake,
    sessions: mpsc::UnboundedSender<BrokerSession>,
    rejected: mpsc::UnboundedSender<Frame>,
) {
    let (mut write, mut read) = ws.split();

    let connect = loop {
        match read.next().await {
            Some(Ok(Message::Text(text))) => {
                if let Ok(Some(frame)) = Frame::parse(text.as_str()) {
                    break frame;
                }
            }
            _ => return,
        }
    };

    if let Handshake::Reject = handshake {
        let error = Frame::new(Command::Error).with_header("message", "Invalid token");
        write
            .send(Message::Text(error.encode().into()))
            .await
            .ok();
        write.close().await.ok();
        rejected.send(connect).ok();
        return;
    }

    let connected = Frame::new(Command::Connected)
        .with_header("version", "1.2")
        .with_header("heart-beat", "0,0");
    write
        .send(Message::Text(connected.encode().into()))
        .await
        .unwrap();

    let (frames_tx, frames_rx) = mpsc::unbounded_channel();
    let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel::<Frame>();
    sessions
        .send(BrokerSession {
            connect,
            frames: frames_rx,
            outbound: outbound_tx,
        })
        .ok();

    loop {
        tokio::select! {
            message = read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    if let Ok(Some(frame)) = Frame::parse(text.as_str()) {
                        frames_tx.send(frame).ok();
                    }
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                _ => {}
            },
            frame = outbound_rx.recv() => match frame {
                Some(frame) => {
                    if write.send(Message::Text(frame.encode().into())).await.is_err() {
                        break;
                    }
                }
                None => {
                    write.close().await.ok();
                    break;
                }
            },
        }
    }
}

fn create_client(url: &str) -> (MessagingClient, mpsc::UnboundedReceiver<InboundEvent>) {
    let config = ClientConfig::new(url, UserId::new(7))
        .with_auth_token("secret-token")
        .with_retry_delay(RETRY_DELAY);
    let (handler, events) = ChannelEventHandler::new();
    let client = MessagingClient::new(config, Arc::new(WebSocketConnector), Arc::new(handler));
    (client, events)
}

fn subscription_id(frames: &[Frame], destination: &str) -> String {
    frames
        .iter()
        .find(|f| f.command == Command::Subscribe && f.header("destination") == Some(destination))
        .and_then(|f| f.header("id"))
        .unwrap_or_else(|| panic!("no subscription for {}", destination))
        .to_string()
}

#[tokio::test]
async fn test_client_connects_and_subscribes_personal_queues() {
    // テスト項目: 実際の WebSocket 上で接続し、認証ヘッダ付きで CONNECT と個人キューの購読が送られる
    // given (前提条件):
    let mut broker = TestBroker::start(vec![]).await;
    let (client, _events) = create_client(&broker.url());

    // when (操作):
    client.connect();
    let mut session = broker.next_session().await;
    let frames = session.next_frames(2).await;

    // then (期待する結果):
    assert_eq!(session.connect.command, Command::Connect);
    assert_eq!(session.connect.header("accept-version"), Some("1.2"));
    assert_eq!(
        session.connect.header("Authorization"),
        Some("Bearer secret-token")
    );
    assert_eq!(frames[0].header("destination"), Some("/user/7/queue/messages"));
    assert_eq!(frames[1].header("destination"), Some("/user/7/queue/typing"));
    timeout(WAIT, client.wait_for_state(ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();
    client.dispose().await;
}

#[tokio::test]
async fn test_inbound_message_and_outbound_send_round_trip() {
    // テスト項目: ブローカーからのメッセージがハンドラに届き、送信メッセージがブローカーに届く
    // given (前提条件):
    let mut broker = TestBroker::start(vec![]).await;
    let (client, mut events) = create_client(&broker.url());
    client.connect();
    let mut session = broker.next_session().await;
    let frames = session.next_frames(2).await;
    let messages_sub = subscription_id(&frames, "/user/7/queue/messages");

    // when (操作):
    session.deliver(
        &messages_sub,
        r#"{"id": 1, "senderId": 8, "receiverId": 7, "content": "ping", "type": "TEXT", "timestamp": "2024-05-01T09:30:00"}"#,
    );
    client.send_message(UserId::new(7), UserId::new(8), "pong", MessageKind::Text);

    // then (期待する結果):
    match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
        InboundEvent::Message(message) => {
            assert_eq!(message.sender_id, UserId::new(8));
            assert_eq!(message.content, "ping");
        }
        other => panic!("unexpected event: {:?}", other),
    }
    let sent = session.next_frame().await;
    assert_eq!(sent.command, Command::Send);
    assert_eq!(sent.header("destination"), Some("/app/chat.sendMessage"));
    let body: serde_json::Value = serde_json::from_str(&sent.body).unwrap();
    assert_eq!(
        body,
        serde_json::json!({"senderId": 7, "receiverId": 8, "content": "pong", "type": "TEXT"})
    );
    client.dispose().await;
}

#[tokio::test]
async fn test_group_subscriptions_follow_latest_request() {
    // テスト項目: グループ購読の更新で古い購読が解除され、新しいグループだけが購読される
    // given (前提条件):
    let mut broker = TestBroker::start(vec![]).await;
    let (client, mut events) = create_client(&broker.url());
    client.refresh_group_subscriptions([GroupId::new(1), GroupId::new(2)]);
    client.connect();
    let mut session = broker.next_session().await;
    let initial = session.next_frames(4).await;
    let g1_sub = subscription_id(&initial, "/topic/group/1");

    // when (操作):
    client.refresh_group_subscriptions([GroupId::new(2), GroupId::new(3)]);
    let refreshed = session.next_frames(4).await;

    // then (期待する結果):
    let unsubscribed: Vec<_> = refreshed
        .iter()
        .filter(|f| f.command == Command::Unsubscribe)
        .filter_map(|f| f.header("id"))
        .collect();
    assert_eq!(unsubscribed.len(), 2);
    assert!(unsubscribed.contains(&g1_sub.as_str()));
    let g3_sub = subscription_id(&refreshed, "/topic/group/3");
    assert_eq!(
        client.group_subscriptions().await.unwrap(),
        vec![GroupId::new(2), GroupId::new(3)]
    );

    session.deliver(&g3_sub, r#"[{"groupId": 3, "senderId": 9, "content": "hi"}]"#);
    match timeout(WAIT, events.recv()).await.unwrap().unwrap() {
        InboundEvent::GroupMessages(group_id, messages) => {
            assert_eq!(group_id, GroupId::new(3));
            assert_eq!(messages[0].content, "hi");
        }
        other => panic!("unexpected event: {:?}", other),
    }
    client.dispose().await;
}

#[tokio::test]
async fn test_client_reconnects_after_broker_drops_connection() {
    // テスト項目: ブローカーが接続を切ると再接続され、グループ購読も復元される
    // given (前提条件):
    let mut broker = TestBroker::start(vec![]).await;
    let (client, _events) = create_client(&broker.url());
    client.refresh_group_subscriptions([GroupId::new(4)]);
    client.connect();
    let mut first = broker.next_session().await;
    first.next_frames(3).await;

    // when (操作):
    drop(first);
    let mut second = broker.next_session().await;
    let frames = second.next_frames(3).await;

    // then (期待する結果):
    let destinations: Vec<_> = frames
        .iter()
        .filter_map(|f| f.header("destination"))
        .collect();
    assert_eq!(
        destinations,
        vec![
            "/user/7/queue/messages",
            "/user/7/queue/typing",
            "/topic/group/4"
        ]
    );
    timeout(WAIT, client.wait_for_state(ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();
    client.dispose().await;
}

#[tokio::test]
async fn test_rejected_handshake_is_retried() {
    // テスト項目: ハンドシェイクが ERROR で拒否されても固定の間隔で再試行され、接続できる
    // given (前提条件):
    let mut broker = TestBroker::start(vec![Handshake::Reject]).await;
    let (client, _events) = create_client(&broker.url());

    // when (操作):
    client.connect();
    let rejected = timeout(WAIT, broker.rejected.recv()).await.unwrap().unwrap();
    let mut session = broker.next_session().await;

    // then (期待する結果):
    assert_eq!(rejected.command, Command::Connect);
    session.next_frames(2).await;
    timeout(WAIT, client.wait_for_state(ConnectionState::Connected))
        .await
        .unwrap()
        .unwrap();
    client.dispose().await;
}

#[tokio::test]
async fn test_disconnect_sends_disconnect_frame() {
    // テスト項目: 明示的な切断で DISCONNECT フレームが送られ、再接続されない
    // given (前提条件):
    let mut broker = TestBroker::start(vec![]).await;
    let (client, _events) = create_client(&broker.url());
    client.connect();
    let mut session = broker.next_session().await;
    session.next_frames(2).await;

    // when (操作):
    client.disconnect();
    let frame = session.next_frame().await;

    // then (期待する結果):
    assert_eq!(frame.command, Command::Disconnect);
    tokio::time::sleep(RETRY_DELAY * 3).await;
    assert!(broker.sessions.try_recv().is_err());
    assert_eq!(client.state(), ConnectionState::Disconnected);
    client.dispose().await;
}

#[tokio::test]
async fn test_silent_peer_times_out_and_is_retried() {
    // テスト項目: TCP 接続を受け付けたまま応答しない相手でも、接続試行はタイムアウトして再試行される
    // given (前提条件):
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/ws", listener.local_addr().unwrap());
    let (accepted_tx, mut accepted) = mpsc::unbounded_channel();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            // Keep the socket open without answering the upgrade.
            if accepted_tx.send(stream).is_err() {
                break;
            }
        }
    });
    let config = ClientConfig::new(url, UserId::new(7))
        .with_retry_delay(RETRY_DELAY)
        .with_handshake_timeout(Duration::from_millis(300));
    let (handler, _events) = ChannelEventHandler::new();
    let client = MessagingClient::new(config, Arc::new(WebSocketConnector), Arc::new(handler));

    // when (操作):
    client.connect();
    let _first = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();
    let _second = timeout(WAIT, accepted.recv()).await.unwrap().unwrap();

    // then (期待する結果):
    assert_ne!(client.state(), ConnectionState::Connected);
    client.dispose().await;
}
