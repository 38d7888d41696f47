//! Message formatting utilities for terminal display.

use dengon_shared::time::format_server_timestamp;

use crate::{
    dto::{ChatMessage, GroupMessage, TypingNotice},
    state::ConnectionState,
    types::{GroupId, MessageKind, UserId},
};

/// Message formatter for terminal display
pub struct MessageFormatter;

impl MessageFormatter {
    /// Format a direct message
    ///
    /// # Arguments
    ///
    /// * `message` - The received message
    /// * `me` - The current user, to tell echoes of our own messages apart
    pub fn format_direct_message(message: &ChatMessage, me: UserId) -> String {
        let from = display_name(
            message.sender_name.as_deref(),
            message.sender_username.as_deref(),
            message.sender_id,
        );
        let direction = if message.sender_id == me {
            format!("you -> {}", message.receiver_id)
        } else {
            format!("@{}", from)
        };
        format!(
            "\n\n------------------------------------------------------------\n\
             {}: {}\n\
             {}\n\
             ------------------------------------------------------------\n",
            direction,
            content_line(message.r#type, &message.content, message.file_name.as_deref()),
            sent_at(message.timestamp.as_deref())
        )
    }

    /// Format a group update.
    ///
    /// The group topic carries the group's whole history; only the newest
    /// entry is shown.
    pub fn format_group_update(group_id: GroupId, messages: &[GroupMessage]) -> String {
        let Some(latest) = messages.last() else {
            return format!("\n[group {}] (no messages)\n", group_id);
        };
        let group = latest
            .group_name
            .clone()
            .unwrap_or_else(|| group_id.to_string());
        let from = display_name(
            latest.sender_name.as_deref(),
            latest.sender_username.as_deref(),
            latest.sender_id,
        );
        format!(
            "\n\n------------------------------------------------------------\n\
             [{}] @{}: {}\n\
             {} ({} messages in history)\n\
             ------------------------------------------------------------\n",
            group,
            from,
            content_line(latest.r#type, &latest.content, latest.file_name.as_deref()),
            sent_at(latest.timestamp.as_deref()),
            messages.len()
        )
    }

    /// Format a typing notice
    pub fn format_typing(typing: &TypingNotice) -> String {
        if typing.is_typing {
            format!("\n* user {} is typing...\n", typing.sender_id)
        } else {
            format!("\n* user {} stopped typing\n", typing.sender_id)
        }
    }

    /// Format the connection status and the subscribed groups
    pub fn format_status(state: ConnectionState, groups: &[GroupId]) -> String {
        let groups = if groups.is_empty() {
            "(none)".to_string()
        } else {
            groups
                .iter()
                .map(|g| g.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        };
        format!("connection: {}\ngroups: {}\n", state, groups)
    }

    /// Format a confirmation after queueing an outbound message
    pub fn format_sent_confirmation(time: &str) -> String {
        format!("sent at {}\n", time)
    }
}

fn display_name(name: Option<&str>, username: Option<&str>, id: UserId) -> String {
    match (name, username) {
        (Some(name), Some(username)) => format!("{} ({})", username, name),
        (None, Some(username)) => username.to_string(),
        (Some(name), None) => name.to_string(),
        (None, None) => format!("user {}", id),
    }
}

fn content_line(kind: MessageKind, content: &str, file_name: Option<&str>) -> String {
    match kind {
        MessageKind::Text => content.to_string(),
        MessageKind::Image => format!("[image] {}", file_name.unwrap_or(content)),
        MessageKind::File => format!("[file] {}", file_name.unwrap_or(content)),
    }
}

fn sent_at(timestamp: Option<&str>) -> String {
    match timestamp {
        Some(ts) => format!("sent at {}", format_server_timestamp(ts)),
        None => "sent at (unknown)".to_string(),
    }
}
