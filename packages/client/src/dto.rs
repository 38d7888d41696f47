//! JSON payloads exchanged with the chat server.
//!
//! Field names follow the server's camelCase wire format.

use serde::{Deserialize, Serialize};

use crate::types::{GroupId, MessageKind, UserId};

// ========================================
// Outbound envelopes
// ========================================

/// Direct message sent to `/app/chat.sendMessage`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectMessageEnvelope {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub content: String,
    pub r#type: MessageKind,
}

/// Group message sent to `/app/chat.sendGroupMessage`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessageEnvelope {
    pub group_id: GroupId,
    pub sender_id: UserId,
    pub content: String,
    pub r#type: MessageKind,
}

/// Typing state sent to `/app/chat.typing`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingEnvelope {
    pub sender_id: UserId,
    pub receiver_id: UserId,
    pub is_typing: bool,
}

// ========================================
// Inbound payloads
// ========================================

/// Direct message delivered on the personal message queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    #[serde(default)]
    pub id: Option<i64>,
    pub sender_id: UserId,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_username: Option<String>,
    pub receiver_id: UserId,
    #[serde(default)]
    pub receiver_name: Option<String>,
    pub content: String,
    #[serde(default)]
    pub r#type: MessageKind,
    #[serde(default)]
    pub media_data_base64: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    /// Sent as `read` by the server
    #[serde(default, alias = "read")]
    pub is_read: bool,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// One entry of the history broadcast on a group topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupMessage {
    #[serde(default)]
    pub id: Option<i64>,
    pub group_id: GroupId,
    #[serde(default)]
    pub group_name: Option<String>,
    pub sender_id: UserId,
    #[serde(default)]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub sender_username: Option<String>,
    pub content: String,
    #[serde(default)]
    pub r#type: MessageKind,
    #[serde(default)]
    pub media_data_base64: Option<String>,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub timestamp: Option<String>,
}

/// Typing state delivered on the personal typing queue
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TypingNotice {
    pub sender_id: UserId,
    pub is_typing: bool,
}
