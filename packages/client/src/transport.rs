//! Broker transport: the connector seam and its WebSocket implementation.

use std::time::Duration;

use async_trait::async_trait;
use futures_util::{
    Sink, SinkExt, Stream, StreamExt,
    stream::{SplitSink, SplitStream},
};
use tokio::{
    net::TcpStream,
    sync::{mpsc, oneshot},
    time::{Instant, Interval},
};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async,
    tungstenite::{Error as WsError, protocol::Message},
};

use crate::{
    config::ClientConfig,
    error::ClientError,
    stomp::{Command, Frame, HeartBeat},
    subscription::FrameSink,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type WsWriter = SplitSink<WsStream, Message>;
type WsReader = SplitStream<WsStream>;

/// An established broker session.
///
/// Frames pushed into `outbound` are written in order; frames read from the
/// broker arrive on `inbound`, which closes when the transport goes away.
pub struct Connection {
    outbound: mpsc::UnboundedSender<Frame>,
    inbound: mpsc::UnboundedReceiver<Frame>,
}

impl Connection {
    pub fn new(
        outbound: mpsc::UnboundedSender<Frame>,
        inbound: mpsc::UnboundedReceiver<Frame>,
    ) -> Self {
        Self { outbound, inbound }
    }

    /// Next frame from the broker, `None` once the transport is closed
    pub async fn recv(&mut self) -> Option<Frame> {
        self.inbound.recv().await
    }

    /// Send DISCONNECT and release the transport.
    pub fn close(self) {
        if self.outbound.send(Frame::disconnect()).is_err() {
            tracing::debug!("Transport already closed, skipping DISCONNECT");
        }
    }
}

impl FrameSink for Connection {
    fn send_frame(&self, frame: Frame) -> Result<(), ClientError> {
        self.outbound
            .send(frame)
            .map_err(|_| ClientError::NotConnected)
    }
}

/// Opens broker sessions
#[async_trait]
pub trait Connector: Send + Sync {
    /// Connect and complete the STOMP handshake.
    async fn connect(&self, config: &ClientConfig) -> Result<Connection, ClientError>;
}

/// STOMP over WebSocket, using tokio-tungstenite
#[derive(Debug, Clone, Copy, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn connect(&self, config: &ClientConfig) -> Result<Connection, ClientError> {
        // The deadline covers the TCP connect and the HTTP upgrade as well as
        // CONNECTED, so a silent peer still fails the attempt.
        let (write, read, connected) =
            tokio::time::timeout(config.handshake_timeout, handshake(config))
                .await
                .map_err(|_| ClientError::HandshakeTimeout)??;

        let server_heart_beat = HeartBeat::parse(connected.header("heart-beat"));
        let heartbeat_interval = HeartBeat::outgoing_interval(config.heart_beat, server_heart_beat);
        tracing::debug!(
            "STOMP session established (version {:?}, heart-beat {:?})",
            connected.header("version"),
            heartbeat_interval
        );

        Ok(spawn_session(write, read, heartbeat_interval))
    }
}

async fn handshake(config: &ClientConfig) -> Result<(WsWriter, WsReader, Frame), ClientError> {
    let (ws_stream, _response) = connect_async(config.endpoint.as_str()).await?;
    let (mut write, mut read) = ws_stream.split();

    let connect_frame = Frame::connect(
        config.host(),
        config.auth_token.as_deref(),
        config.heart_beat,
    );
    write
        .send(Message::Text(connect_frame.encode().into()))
        .await?;

    let connected = await_connected(&mut read).await?;
    Ok((write, read, connected))
}

/// Start the reader and writer tasks of an established session.
///
/// When the writer stops, the reader stops too, so a failed write shows up
/// as a closed `inbound` channel.
fn spawn_session<W, R>(write: W, read: R, heartbeat_interval: Option<Duration>) -> Connection
where
    W: Sink<Message, Error = WsError> + Unpin + Send + 'static,
    R: Stream<Item = Result<Message, WsError>> + Unpin + Send + 'static,
{
    let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
    let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
    let (writer_alive, writer_gone) = oneshot::channel::<()>();

    tokio::spawn(read_loop(read, inbound_tx, writer_gone));
    tokio::spawn(write_loop(write, outbound_rx, heartbeat_interval, writer_alive));

    Connection::new(outbound_tx, inbound_rx)
}

/// Wait for CONNECTED, skipping heart-beats.
async fn await_connected(read: &mut WsReader) -> Result<Frame, ClientError> {
    while let Some(message) = read.next().await {
        let text = match message? {
            Message::Text(text) => text.to_string(),
            Message::Binary(data) => String::from_utf8_lossy(&data).into_owned(),
            Message::Close(_) => break,
            _ => continue,
        };
        let Some(frame) = Frame::parse(&text)? else {
            continue;
        };
        match frame.command {
            Command::Connected => return Ok(frame),
            Command::Error => {
                let reason = frame
                    .header("message")
                    .map(str::to_string)
                    .unwrap_or_else(|| frame.body.clone());
                return Err(ClientError::Rejected(reason));
            }
            other => tracing::debug!("Ignoring {} frame during handshake", other),
        }
    }

    Err(ClientError::ConnectionError(
        "Connection closed during handshake".to_string(),
    ))
}

async fn read_loop<R>(
    mut read: R,
    inbound: mpsc::UnboundedSender<Frame>,
    mut writer_gone: oneshot::Receiver<()>,
) where
    R: Stream<Item = Result<Message, WsError>> + Unpin,
{
    loop {
        let message = tokio::select! {
            message = read.next() => message,
            _ = &mut writer_gone => {
                tracing::debug!("Writer stopped, closing the session");
                break;
            }
        };
        let Some(message) = message else {
            break;
        };
        let text = match message {
            Ok(Message::Text(text)) => text.to_string(),
            Ok(Message::Binary(data)) => match String::from_utf8(data.to_vec()) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!("Dropping non UTF-8 binary message: {}", e);
                    continue;
                }
            },
            Ok(Message::Close(_)) => {
                tracing::info!("Broker closed the connection");
                break;
            }
            Err(e) => {
                tracing::warn!("WebSocket read error: {}", e);
                break;
            }
            _ => continue,
        };

        match Frame::parse(&text) {
            Ok(Some(frame)) => {
                if inbound.send(frame).is_err() {
                    break;
                }
            }
            Ok(None) => tracing::trace!("Heart-beat received"),
            Err(e) => tracing::warn!("Dropping unparseable frame: {}", e),
        }
    }
}

/// Holds `_alive` until it returns, which releases the reader.
async fn write_loop<W>(
    mut write: W,
    mut outbound: mpsc::UnboundedReceiver<Frame>,
    heartbeat_interval: Option<Duration>,
    _alive: oneshot::Sender<()>,
) where
    W: Sink<Message, Error = WsError> + Unpin,
{
    let mut heartbeat =
        heartbeat_interval.map(|period| tokio::time::interval_at(Instant::now() + period, period));

    loop {
        tokio::select! {
            frame = outbound.recv() => {
                let Some(frame) = frame else {
                    if let Err(e) = write.close().await {
                        tracing::debug!("Error while closing WebSocket: {}", e);
                    }
                    break;
                };
                if let Err(e) = write.send(Message::Text(frame.encode().into())).await {
                    tracing::warn!("Failed to send {} frame: {}", frame.command, e);
                    break;
                }
            }
            _ = next_heartbeat(&mut heartbeat) => {
                if let Err(e) = write.send(Message::Text("\n".into())).await {
                    tracing::warn!("Failed to send heart-beat: {}", e);
                    break;
                }
            }
        }
    }
}

async fn next_heartbeat(heartbeat: &mut Option<Interval>) {
    match heartbeat {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}
