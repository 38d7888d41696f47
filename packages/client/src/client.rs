//! The realtime messaging client.
//!
//! [`MessagingClient`] is a cheap handle. All state (the connection, the
//! subscription registry, the pending group list and the retry timer) is
//! owned by a single event-loop task, and the handle talks to it through a
//! command channel. None of the public operations block.
//!
//! ```text
//! disconnected --connect--> connecting --ok--> connected
//!      ^                        |                  |
//!      |<------- failure -------+                  |
//!      |<----------------- transport lost ---------+
//!      +--(retry delay)--> connecting
//! ```
//!
//! An explicit disconnect drops the in-flight connect attempt or the retry
//! timer, so no reconnect happens afterwards.

use std::{future::Future, ops::ControlFlow, pin::Pin, sync::Arc};

use serde::Serialize;
use tokio::{
    sync::{mpsc, oneshot, watch},
    task::JoinHandle,
    time::Sleep,
};

use crate::{
    config::ClientConfig,
    destination,
    dto::{DirectMessageEnvelope, GroupMessageEnvelope, TypingEnvelope},
    error::ClientError,
    handler::{self, EventHandler},
    state::ConnectionState,
    stomp::{Command, Frame},
    subscription::{FrameSink, SubscriptionRegistry},
    transport::{Connection, Connector},
    types::{GroupId, MessageKind, UserId},
};

type ConnectAttempt = Pin<Box<dyn Future<Output = Result<Connection, ClientError>> + Send>>;

enum ClientCommand {
    Connect,
    Disconnect,
    SendDirect(DirectMessageEnvelope),
    SendGroup(GroupMessageEnvelope),
    SendTyping(TypingEnvelope),
    RefreshGroups(Vec<GroupId>),
    QueryGroups(oneshot::Sender<Vec<GroupId>>),
    Dispose,
}

/// Handle to a realtime messaging client
pub struct MessagingClient {
    commands: mpsc::UnboundedSender<ClientCommand>,
    state: watch::Receiver<ConnectionState>,
    task: JoinHandle<()>,
}

impl MessagingClient {
    /// Create the client and start its event loop. The client starts
    /// disconnected; call [`connect`](Self::connect) to go online.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new(
        config: ClientConfig,
        connector: Arc<dyn Connector>,
        handler: Arc<dyn EventHandler>,
    ) -> Self {
        let (commands_tx, commands_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);

        let actor = ClientActor {
            config: Arc::new(config),
            connector,
            handler,
            commands: commands_rx,
            state: state_tx,
            link: Link::Idle,
            subscriptions: SubscriptionRegistry::new(),
            pending_groups: None,
            attempt: 0,
        };
        let task = tokio::spawn(actor.run());

        Self {
            commands: commands_tx,
            state: state_rx,
            task,
        }
    }

    /// Start connecting. No-op while connecting or connected; cancels a
    /// scheduled retry and connects immediately otherwise.
    pub fn connect(&self) {
        self.submit(ClientCommand::Connect);
    }

    /// Close the connection and cancel any pending attempt or retry.
    /// Idempotent.
    pub fn disconnect(&self) {
        self.submit(ClientCommand::Disconnect);
    }

    /// Send a direct message. Dropped silently unless connected.
    pub fn send_message(
        &self,
        sender_id: UserId,
        receiver_id: UserId,
        content: impl Into<String>,
        kind: MessageKind,
    ) {
        self.submit(ClientCommand::SendDirect(DirectMessageEnvelope {
            sender_id,
            receiver_id,
            content: content.into(),
            r#type: kind,
        }));
    }

    /// Send a group message. Dropped silently unless connected.
    pub fn send_group_message(
        &self,
        group_id: GroupId,
        sender_id: UserId,
        content: impl Into<String>,
        kind: MessageKind,
    ) {
        self.submit(ClientCommand::SendGroup(GroupMessageEnvelope {
            group_id,
            sender_id,
            content: content.into(),
            r#type: kind,
        }));
    }

    /// Send the typing state. Dropped silently unless connected.
    pub fn send_typing(&self, sender_id: UserId, receiver_id: UserId, is_typing: bool) {
        self.submit(ClientCommand::SendTyping(TypingEnvelope {
            sender_id,
            receiver_id,
            is_typing,
        }));
    }

    /// Make the group subscriptions equal to `group_ids`.
    ///
    /// While not connected the list is kept as pending (replacing any
    /// earlier pending list) and applied once the connection is ready.
    pub fn refresh_group_subscriptions(&self, group_ids: impl IntoIterator<Item = GroupId>) {
        self.submit(ClientCommand::RefreshGroups(group_ids.into_iter().collect()));
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition
    pub fn subscribe_state(&self) -> watch::Receiver<ConnectionState> {
        self.state.clone()
    }

    /// Wait until the client reaches `target`.
    pub async fn wait_for_state(&self, target: ConnectionState) -> Result<(), ClientError> {
        let mut state = self.state.clone();
        state
            .wait_for(|s| *s == target)
            .await
            .map(|_| ())
            .map_err(|_| ClientError::Disposed)
    }

    /// Group ids with an active subscription on the current connection
    pub async fn group_subscriptions(&self) -> Result<Vec<GroupId>, ClientError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(ClientCommand::QueryGroups(tx))
            .map_err(|_| ClientError::Disposed)?;
        rx.await.map_err(|_| ClientError::Disposed)
    }

    /// Disconnect and stop the event loop.
    pub async fn dispose(self) {
        self.submit(ClientCommand::Dispose);
        if let Err(e) = self.task.await {
            tracing::warn!("Client event loop ended abnormally: {}", e);
        }
    }

    fn submit(&self, command: ClientCommand) {
        if self.commands.send(command).is_err() {
            tracing::debug!("Client event loop has stopped, ignoring command");
        }
    }
}

/// What the event loop currently waits on besides commands
enum Link {
    Idle,
    Connecting(ConnectAttempt),
    Connected(Connection),
    RetryScheduled(Pin<Box<Sleep>>),
}

enum Event {
    Command(Option<ClientCommand>),
    ConnectFinished(Result<Connection, ClientError>),
    Frame(Option<Frame>),
    RetryDue,
}

struct ClientActor {
    config: Arc<ClientConfig>,
    connector: Arc<dyn Connector>,
    handler: Arc<dyn EventHandler>,
    commands: mpsc::UnboundedReceiver<ClientCommand>,
    state: watch::Sender<ConnectionState>,
    link: Link,
    subscriptions: SubscriptionRegistry,
    /// Groups to subscribe once connected. `None` when nothing is pending.
    pending_groups: Option<Vec<GroupId>>,
    /// Consecutive connection attempts since the last success
    attempt: u32,
}

impl ClientActor {
    async fn run(mut self) {
        loop {
            match self.next_event().await {
                Event::Command(None) => break,
                Event::Command(Some(command)) => {
                    if self.handle_command(command).is_break() {
                        break;
                    }
                }
                Event::ConnectFinished(Ok(connection)) => self.on_connected(connection),
                Event::ConnectFinished(Err(e)) => {
                    tracing::warn!("WebSocket connection error: {}", e);
                    self.schedule_retry();
                }
                Event::Frame(Some(frame)) => self.on_frame(frame),
                Event::Frame(None) => self.on_connection_lost("transport closed"),
                Event::RetryDue => self.start_connect(),
            }
        }

        self.disconnect();
        tracing::debug!("Client event loop stopped");
    }

    async fn next_event(&mut self) -> Event {
        let commands = &mut self.commands;
        match &mut self.link {
            Link::Idle => Event::Command(commands.recv().await),
            Link::Connecting(attempt) => tokio::select! {
                biased;
                command = commands.recv() => Event::Command(command),
                result = attempt => Event::ConnectFinished(result),
            },
            Link::Connected(connection) => tokio::select! {
                biased;
                command = commands.recv() => Event::Command(command),
                frame = connection.recv() => Event::Frame(frame),
            },
            Link::RetryScheduled(sleep) => tokio::select! {
                biased;
                command = commands.recv() => Event::Command(command),
                _ = sleep.as_mut() => Event::RetryDue,
            },
        }
    }

    fn handle_command(&mut self, command: ClientCommand) -> ControlFlow<()> {
        match command {
            ClientCommand::Connect => match self.link {
                Link::Idle | Link::RetryScheduled(_) => self.start_connect(),
                Link::Connecting(_) | Link::Connected(_) => {
                    tracing::debug!("Already {}, ignoring connect", *self.state.borrow());
                }
            },
            ClientCommand::Disconnect => self.disconnect(),
            ClientCommand::SendDirect(envelope) => {
                self.send(destination::SEND_DIRECT_MESSAGE, &envelope)
            }
            ClientCommand::SendGroup(envelope) => {
                self.send(destination::SEND_GROUP_MESSAGE, &envelope)
            }
            ClientCommand::SendTyping(envelope) => self.send(destination::SEND_TYPING, &envelope),
            ClientCommand::RefreshGroups(group_ids) => self.refresh_groups(group_ids),
            ClientCommand::QueryGroups(reply) => {
                if reply.send(self.subscriptions.group_ids()).is_err() {
                    tracing::debug!("Group query caller went away");
                }
            }
            ClientCommand::Dispose => return ControlFlow::Break(()),
        }
        ControlFlow::Continue(())
    }

    fn start_connect(&mut self) {
        self.attempt += 1;
        tracing::info!(
            "Connecting to {} as user {} (attempt {})",
            self.config.endpoint,
            self.config.user_id,
            self.attempt
        );

        let connector = self.connector.clone();
        let config = self.config.clone();
        self.link = Link::Connecting(Box::pin(async move { connector.connect(&config).await }));
        self.set_state(ConnectionState::Connecting);
    }

    fn on_connected(&mut self, connection: Connection) {
        tracing::info!("Connected to {}", self.config.endpoint);
        self.attempt = 0;

        self.subscriptions.clear();
        if let Err(e) = self
            .subscriptions
            .subscribe_personal(&connection, self.config.user_id)
        {
            tracing::warn!("Failed to subscribe personal queues: {}", e);
        }
        if let Some(group_ids) = self.pending_groups.take() {
            tracing::debug!("Applying {} pending group subscriptions", group_ids.len());
            if let Err(e) = self.subscriptions.replace_groups(&connection, &group_ids) {
                tracing::warn!("Failed to subscribe pending groups: {}", e);
            }
        }

        self.link = Link::Connected(connection);
        self.set_state(ConnectionState::Connected);
    }

    fn on_frame(&mut self, frame: Frame) {
        match frame.command {
            Command::Message => {
                let Some(subscription_id) = frame.header("subscription") else {
                    tracing::warn!("Dropping MESSAGE frame without subscription header");
                    return;
                };
                let Some(route) = self.subscriptions.route(subscription_id) else {
                    tracing::debug!(
                        "Dropping MESSAGE for inactive subscription {}",
                        subscription_id
                    );
                    return;
                };
                if let Err(e) = handler::dispatch(self.handler.as_ref(), route, &frame.body) {
                    tracing::warn!("Dropping malformed payload on {:?}: {}", route, e);
                }
            }
            Command::Error => {
                let reason = frame.header("message").unwrap_or("no message").to_string();
                tracing::warn!("Broker error: {} {}", reason, frame.body);
                self.on_connection_lost(&reason);
            }
            Command::Receipt => {
                tracing::debug!("Receipt {:?}", frame.header("receipt-id"));
            }
            other => tracing::debug!("Ignoring unexpected {} frame", other),
        }
    }

    fn on_connection_lost(&mut self, reason: &str) {
        tracing::warn!("Connection lost: {}", reason);
        self.park_groups();
        self.link = Link::Idle;
        self.schedule_retry();
    }

    fn schedule_retry(&mut self) {
        tracing::info!(
            "Reconnecting in {} seconds...",
            self.config.retry_delay.as_secs_f64()
        );
        self.link = Link::RetryScheduled(Box::pin(tokio::time::sleep(self.config.retry_delay)));
        self.set_state(ConnectionState::Disconnected);
    }

    fn disconnect(&mut self) {
        match std::mem::replace(&mut self.link, Link::Idle) {
            Link::Connected(connection) => {
                self.park_groups();
                connection.close();
                tracing::info!("Disconnected");
            }
            Link::Connecting(_) => tracing::info!("Connection attempt cancelled"),
            Link::RetryScheduled(_) => tracing::info!("Scheduled reconnect cancelled"),
            Link::Idle => tracing::debug!("Already disconnected"),
        }
        self.attempt = 0;
        self.set_state(ConnectionState::Disconnected);
    }

    /// Keep the active group set as the pending request for the next
    /// connection, since the broker forgets subscriptions with the session.
    fn park_groups(&mut self) {
        let group_ids = self.subscriptions.group_ids();
        self.subscriptions.clear();
        if !group_ids.is_empty() {
            self.pending_groups = Some(group_ids);
        }
    }

    fn refresh_groups(&mut self, group_ids: Vec<GroupId>) {
        match &self.link {
            Link::Connected(connection) => {
                if let Err(e) = self.subscriptions.replace_groups(connection, &group_ids) {
                    tracing::warn!("Failed to refresh group subscriptions: {}", e);
                }
            }
            _ => {
                tracing::debug!(
                    "Not connected, keeping {} group ids pending",
                    group_ids.len()
                );
                self.pending_groups = Some(group_ids);
            }
        }
    }

    fn send<T: Serialize>(&self, destination: &str, envelope: &T) {
        let Link::Connected(connection) = &self.link else {
            tracing::debug!("Not connected, dropping message for {}", destination);
            return;
        };
        let body = match serde_json::to_string(envelope) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!("Failed to serialize message: {}", e);
                return;
            }
        };
        if let Err(e) = connection.send_frame(Frame::send_json(destination, body)) {
            tracing::warn!("Failed to send message to {}: {}", destination, e);
        }
    }

    fn set_state(&self, new_state: ConnectionState) {
        let old_state = self.state.send_replace(new_state);
        if old_state != new_state {
            tracing::debug!("Connection state {} -> {}", old_state, new_state);
        }
    }
}
