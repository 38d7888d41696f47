//! Parsing of terminal input into client operations.

use thiserror::Error;

use crate::types::{GroupId, MessageKind, UserId};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    DirectMessage {
        receiver_id: UserId,
        kind: MessageKind,
        content: String,
    },
    GroupMessage {
        group_id: GroupId,
        kind: MessageKind,
        content: String,
    },
    Typing {
        receiver_id: UserId,
        is_typing: bool,
    },
    RefreshGroups(Vec<GroupId>),
    Status,
    Help,
    Quit,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CommandError {
    #[error("Unknown command '{0}', type /help for the list of commands")]
    Unknown(String),

    #[error("Usage: {0}")]
    Usage(&'static str),

    #[error("Invalid id '{0}'")]
    InvalidId(String),

    #[error("{0}")]
    InvalidKind(String),
}

const DM_USAGE: &str = "/dm[:text|image|file] <user-id> <message>";
const GROUP_USAGE: &str = "/group[:text|image|file] <group-id> <message>";
const TYPING_USAGE: &str = "/typing <user-id> on|off";

/// Help text listing every command
pub const HELP: &str = "\
/dm[:text|image|file] <user-id> <message>      send a direct message
/group[:text|image|file] <group-id> <message>  send a group message
/typing <user-id> on|off                       send a typing indicator
/groups <group-id>[,<group-id>...]             replace group subscriptions (empty clears)
/status                                        show connection state and groups
/help                                          show this help
/quit                                          disconnect and exit";

/// Parse one line of input.
pub fn parse_command(line: &str) -> Result<UserCommand, CommandError> {
    let line = line.trim();
    let (head, rest) = line
        .split_once(char::is_whitespace)
        .map(|(head, rest)| (head, rest.trim()))
        .unwrap_or((line, ""));
    let (name, kind) = match head.split_once(':') {
        Some((name, kind)) => (name, Some(kind)),
        None => (head, None),
    };

    match name {
        "/dm" => {
            let (receiver, content) = split_target(rest, DM_USAGE)?;
            Ok(UserCommand::DirectMessage {
                receiver_id: parse_id(receiver)?,
                kind: parse_kind(kind)?,
                content: content.to_string(),
            })
        }
        "/group" => {
            let (group, content) = split_target(rest, GROUP_USAGE)?;
            Ok(UserCommand::GroupMessage {
                group_id: parse_id(group)?,
                kind: parse_kind(kind)?,
                content: content.to_string(),
            })
        }
        "/typing" => {
            let (receiver, state) = split_target(rest, TYPING_USAGE)?;
            let is_typing = match state {
                "on" => true,
                "off" => false,
                _ => return Err(CommandError::Usage(TYPING_USAGE)),
            };
            Ok(UserCommand::Typing {
                receiver_id: parse_id(receiver)?,
                is_typing,
            })
        }
        "/groups" => {
            let group_ids = rest
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(parse_id)
                .collect::<Result<Vec<GroupId>, _>>()?;
            Ok(UserCommand::RefreshGroups(group_ids))
        }
        "/status" => Ok(UserCommand::Status),
        "/help" => Ok(UserCommand::Help),
        "/quit" | "/exit" => Ok(UserCommand::Quit),
        other => Err(CommandError::Unknown(other.to_string())),
    }
}

/// Split `<target> <rest>`; both parts must be present.
fn split_target<'a>(input: &'a str, usage: &'static str) -> Result<(&'a str, &'a str), CommandError> {
    match input.split_once(char::is_whitespace) {
        Some((target, rest)) if !rest.trim().is_empty() => Ok((target, rest.trim())),
        _ => Err(CommandError::Usage(usage)),
    }
}

fn parse_id<T: std::str::FromStr>(value: &str) -> Result<T, CommandError> {
    value
        .parse()
        .map_err(|_| CommandError::InvalidId(value.to_string()))
}

fn parse_kind(kind: Option<&str>) -> Result<MessageKind, CommandError> {
    match kind {
        None => Ok(MessageKind::Text),
        Some(kind) => kind.parse().map_err(CommandError::InvalidKind),
    }
}
