//! Broker destinations used by the chat server.

use crate::types::{GroupId, UserId};

/// Application destination for direct messages
pub const SEND_DIRECT_MESSAGE: &str = "/app/chat.sendMessage";
/// Application destination for group messages
pub const SEND_GROUP_MESSAGE: &str = "/app/chat.sendGroupMessage";
/// Application destination for typing state
pub const SEND_TYPING: &str = "/app/chat.typing";

/// Personal queue receiving direct messages
pub fn user_messages(user_id: UserId) -> String {
    format!("/user/{}/queue/messages", user_id)
}

/// Personal queue receiving typing notices
pub fn user_typing(user_id: UserId) -> String {
    format!("/user/{}/queue/typing", user_id)
}

/// Broadcast topic of a group
pub fn group_topic(group_id: GroupId) -> String {
    format!("/topic/group/{}", group_id)
}
