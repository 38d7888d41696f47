//! Inbound event handlers and payload dispatch.

use serde::Deserialize;
use tokio::sync::mpsc;

use crate::{
    dto::{ChatMessage, GroupMessage, TypingNotice},
    subscription::Route,
    types::GroupId,
};

/// Callbacks invoked by the client for inbound payloads.
///
/// Called from the client's event loop in arrival order per channel, so
/// implementations should return quickly.
pub trait EventHandler: Send + Sync {
    /// A direct message arrived on the personal message queue
    fn on_message_received(&self, message: ChatMessage);

    /// A group topic delivered its message history
    fn on_group_message_received(&self, group_id: GroupId, messages: Vec<GroupMessage>);

    /// A typing notice arrived on the personal typing queue
    fn on_typing_received(&self, typing: TypingNotice);
}

/// Inbound event, as forwarded by [`ChannelEventHandler`]
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Message(ChatMessage),
    GroupMessages(GroupId, Vec<GroupMessage>),
    Typing(TypingNotice),
}

/// Handler forwarding every event into an unbounded channel
pub struct ChannelEventHandler {
    tx: mpsc::UnboundedSender<InboundEvent>,
}

impl ChannelEventHandler {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<InboundEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    fn forward(&self, event: InboundEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("Event receiver dropped, discarding inbound event");
        }
    }
}

impl EventHandler for ChannelEventHandler {
    fn on_message_received(&self, message: ChatMessage) {
        self.forward(InboundEvent::Message(message));
    }

    fn on_group_message_received(&self, group_id: GroupId, messages: Vec<GroupMessage>) {
        self.forward(InboundEvent::GroupMessages(group_id, messages));
    }

    fn on_typing_received(&self, typing: TypingNotice) {
        self.forward(InboundEvent::Typing(typing));
    }
}

/// The group topic carries the group's history; a single message is
/// accepted as well.
#[derive(Deserialize)]
#[serde(untagged)]
enum GroupPayload {
    History(Vec<GroupMessage>),
    Single(GroupMessage),
}

/// Parse `body` for `route` and invoke the matching callback.
///
/// Nothing is invoked when the body does not parse.
pub fn dispatch(
    handler: &dyn EventHandler,
    route: Route,
    body: &str,
) -> Result<(), serde_json::Error> {
    match route {
        Route::Messages => {
            let message: ChatMessage = serde_json::from_str(body)?;
            handler.on_message_received(message);
        }
        Route::Typing => {
            let typing: TypingNotice = serde_json::from_str(body)?;
            handler.on_typing_received(typing);
        }
        Route::Group(group_id) => {
            let messages = match serde_json::from_str::<GroupPayload>(body)? {
                GroupPayload::History(messages) => messages,
                GroupPayload::Single(message) => vec![message],
            };
            handler.on_group_message_received(group_id, messages);
        }
    }
    Ok(())
}
