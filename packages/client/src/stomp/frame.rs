//! STOMP frame encoding and parsing.
//!
//! A frame is a command line, zero or more `name:value` header lines, a blank
//! line, the body and a terminating NUL byte. Frames made only of end-of-line
//! characters are heart-beats.

use std::{fmt, str::FromStr};

use thiserror::Error;

use super::HeartBeat;

const NUL: char = '\0';

/// Errors raised while parsing a frame
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("unknown command '{0}'")]
    UnknownCommand(String),

    #[error("malformed header line '{0}'")]
    MalformedHeader(String),

    #[error("invalid escape sequence in '{0}'")]
    InvalidEscape(String),

    #[error("invalid content-length '{0}'")]
    InvalidContentLength(String),

    #[error("frame ended before the body")]
    Incomplete,

    #[error("frame is missing its NUL terminator")]
    MissingTerminator,
}

/// STOMP commands used by this client
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    // client frames
    Connect,
    Send,
    Subscribe,
    Unsubscribe,
    Disconnect,
    // server frames
    Connected,
    Message,
    Receipt,
    Error,
}

impl Command {
    pub fn as_str(&self) -> &'static str {
        match self {
            Command::Connect => "CONNECT",
            Command::Send => "SEND",
            Command::Subscribe => "SUBSCRIBE",
            Command::Unsubscribe => "UNSUBSCRIBE",
            Command::Disconnect => "DISCONNECT",
            Command::Connected => "CONNECTED",
            Command::Message => "MESSAGE",
            Command::Receipt => "RECEIPT",
            Command::Error => "ERROR",
        }
    }

    /// CONNECT and CONNECTED headers are never escaped.
    fn escapes_headers(&self) -> bool {
        !matches!(self, Command::Connect | Command::Connected)
    }
}

impl FromStr for Command {
    type Err = FrameError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "CONNECT" | "STOMP" => Ok(Command::Connect),
            "SEND" => Ok(Command::Send),
            "SUBSCRIBE" => Ok(Command::Subscribe),
            "UNSUBSCRIBE" => Ok(Command::Unsubscribe),
            "DISCONNECT" => Ok(Command::Disconnect),
            "CONNECTED" => Ok(Command::Connected),
            "MESSAGE" => Ok(Command::Message),
            "RECEIPT" => Ok(Command::Receipt),
            "ERROR" => Ok(Command::Error),
            other => Err(FrameError::UnknownCommand(other.to_string())),
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single STOMP frame
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub command: Command,
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl Frame {
    pub fn new(command: Command) -> Self {
        Self {
            command,
            headers: Vec::new(),
            body: String::new(),
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn with_body(mut self, body: impl Into<String>) -> Self {
        self.body = body.into();
        self
    }

    /// Value of the first header with this name. Repeated headers keep the
    /// first occurrence, as STOMP 1.2 requires.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// CONNECT frame opening a session on `host`
    pub fn connect(host: &str, token: Option<&str>, heart_beat: HeartBeat) -> Self {
        let frame = Frame::new(Command::Connect)
            .with_header("accept-version", "1.2")
            .with_header("host", host)
            .with_header("heart-beat", heart_beat.to_string());
        match token {
            Some(token) => frame.with_header("Authorization", format!("Bearer {}", token)),
            None => frame,
        }
    }

    pub fn subscribe(id: &str, destination: &str) -> Self {
        Frame::new(Command::Subscribe)
            .with_header("id", id)
            .with_header("destination", destination)
            .with_header("ack", "auto")
    }

    pub fn unsubscribe(id: &str) -> Self {
        Frame::new(Command::Unsubscribe).with_header("id", id)
    }

    /// SEND frame carrying a JSON body
    pub fn send_json(destination: &str, body: String) -> Self {
        Frame::new(Command::Send)
            .with_header("destination", destination)
            .with_header("content-type", "application/json")
            .with_body(body)
    }

    pub fn disconnect() -> Self {
        Frame::new(Command::Disconnect)
    }

    /// Serialize the frame to its wire form.
    ///
    /// A `content-length` header is added for non-empty bodies unless one is
    /// already present.
    pub fn encode(&self) -> String {
        let escape_headers = self.command.escapes_headers();
        let mut out = String::with_capacity(64 + self.body.len());
        out.push_str(self.command.as_str());
        out.push('\n');

        for (name, value) in &self.headers {
            push_header(&mut out, name, value, escape_headers);
        }
        if !self.body.is_empty() && self.header("content-length").is_none() {
            push_header(
                &mut out,
                "content-length",
                &self.body.len().to_string(),
                false,
            );
        }

        out.push('\n');
        out.push_str(&self.body);
        out.push(NUL);
        out
    }

    /// Parse one frame from a WebSocket text message.
    ///
    /// Returns `Ok(None)` for a heart-beat (only end-of-line characters).
    pub fn parse(input: &str) -> Result<Option<Frame>, FrameError> {
        let mut remaining = input.trim_start_matches(['\r', '\n']);
        if remaining.is_empty() {
            return Ok(None);
        }

        let command_line = next_line(&mut remaining).ok_or(FrameError::Incomplete)?;
        let command: Command = command_line.parse()?;
        let unescape_headers = command.escapes_headers();

        let mut headers = Vec::new();
        loop {
            let line = next_line(&mut remaining).ok_or(FrameError::Incomplete)?;
            if line.is_empty() {
                break;
            }
            let (name, value) = line
                .split_once(':')
                .ok_or_else(|| FrameError::MalformedHeader(line.to_string()))?;
            if unescape_headers {
                headers.push((unescape(name)?, unescape(value)?));
            } else {
                headers.push((name.to_string(), value.to_string()));
            }
        }

        let content_length = headers
            .iter()
            .find(|(k, _)| k == "content-length")
            .map(|(_, v)| {
                v.trim()
                    .parse::<usize>()
                    .map_err(|_| FrameError::InvalidContentLength(v.clone()))
            })
            .transpose()?;

        let body = match content_length {
            Some(len) => {
                let body = remaining.get(..len).ok_or(FrameError::Incomplete)?;
                if !remaining[len..].starts_with(NUL) {
                    return Err(FrameError::MissingTerminator);
                }
                body
            }
            None => {
                let end = remaining.find(NUL).ok_or(FrameError::MissingTerminator)?;
                &remaining[..end]
            }
        };

        Ok(Some(Frame {
            command,
            headers,
            body: body.to_string(),
        }))
    }
}

fn push_header(out: &mut String, name: &str, value: &str, escape_headers: bool) {
    if escape_headers {
        out.push_str(&escape(name));
        out.push(':');
        out.push_str(&escape(value));
    } else {
        out.push_str(name);
        out.push(':');
        out.push_str(value);
    }
    out.push('\n');
}

/// Take the next line (without its `\n` or `\r\n`) and advance `input`.
fn next_line<'a>(input: &mut &'a str) -> Option<&'a str> {
    let pos = input.find('\n')?;
    let line = &input[..pos];
    *input = &input[pos + 1..];
    Some(line.strip_suffix('\r').unwrap_or(line))
}

fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ':' => out.push_str("\\c"),
            c => out.push(c),
        }
    }
    out
}

fn unescape(value: &str) -> Result<String, FrameError> {
    let mut out = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('\\') => out.push('\\'),
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('c') => out.push(':'),
            _ => return Err(FrameError::InvalidEscape(value.to_string())),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_subscribe_frame() {
        // テスト項目: SUBSCRIBE フレームが STOMP の形式でエンコードされる
        // given (前提条件):
        let frame = Frame::subscribe("sub-0", "/user/7/queue/messages");

        // when (操作):
        let encoded = frame.encode();

        // then (期待する結果):
        assert_eq!(
            encoded,
            "SUBSCRIBE\nid:sub-0\ndestination:/user/7/queue/messages\nack:auto\n\n\0"
        );
    }

    #[test]
    fn test_encode_send_frame_adds_content_length() {
        // テスト項目: ボディを持つ SEND フレームに content-length が付与される
        // given (前提条件):
        let frame = Frame::send_json("/app/chat.typing", "{\"a\":1}".to_string());

        // when (操作):
        let encoded = frame.encode();

        // then (期待する結果):
        assert_eq!(
            encoded,
            "SEND\ndestination:/app/chat.typing\ncontent-type:application/json\ncontent-length:7\n\n{\"a\":1}\0"
        );
    }

    #[test]
    fn test_encode_escapes_header_values() {
        // テスト項目: SEND フレームのヘッダ値に含まれる特殊文字がエスケープされる
        // given (前提条件):
        let frame = Frame::new(Command::Send).with_header("note", "a:b\nc\\d");

        // when (操作):
        let encoded = frame.encode();

        // then (期待する結果):
        assert!(encoded.contains("note:a\\cb\\nc\\\\d\n"));
    }

    #[test]
    fn test_encode_connect_frame_does_not_escape() {
        // テスト項目: CONNECT フレームのヘッダはエスケープされない
        // given (前提条件):
        let frame = Frame::connect("localhost:8080", Some("abc"), HeartBeat::new(10000, 10000));

        // when (操作):
        let encoded = frame.encode();

        // then (期待する結果):
        assert!(encoded.starts_with("CONNECT\naccept-version:1.2\nhost:localhost:8080\n"));
        assert!(encoded.contains("heart-beat:10000,10000\n"));
        assert!(encoded.contains("Authorization:Bearer abc\n"));
    }

    #[test]
    fn test_parse_message_frame() {
        // テスト項目: MESSAGE フレームが解析され、ヘッダとボディが取り出せる
        // given (前提条件):
        let input = "MESSAGE\nsubscription:sub-1\ndestination:/topic/group/3\nmessage-id:9\n\n[]\0";

        // when (操作):
        let frame = Frame::parse(input).unwrap().unwrap();

        // then (期待する結果):
        assert_eq!(frame.command, Command::Message);
        assert_eq!(frame.header("subscription"), Some("sub-1"));
        assert_eq!(frame.header("destination"), Some("/topic/group/3"));
        assert_eq!(frame.body, "[]");
    }

    #[test]
    fn test_parse_honours_content_length() {
        // テスト項目: content-length がある場合、NUL を含むボディも長さ通りに取り出せる
        // given (前提条件):
        let input = "MESSAGE\ncontent-length:3\n\na\0b\0\n";

        // when (操作):
        let frame = Frame::parse(input).unwrap().unwrap();

        // then (期待する結果):
        assert_eq!(frame.body, "a\0b");
    }

    #[test]
    fn test_parse_accepts_crlf_line_endings() {
        // テスト項目: CRLF の改行を含むフレームも解析できる
        // given (前提条件):
        let input = "CONNECTED\r\nversion:1.2\r\nheart-beat:0,0\r\n\r\n\0";

        // when (操作):
        let frame = Frame::parse(input).unwrap().unwrap();

        // then (期待する結果):
        assert_eq!(frame.command, Command::Connected);
        assert_eq!(frame.header("version"), Some("1.2"));
        assert_eq!(frame.header("heart-beat"), Some("0,0"));
    }

    #[test]
    fn test_parse_unescapes_header_values() {
        // テスト項目: MESSAGE フレームのエスケープされたヘッダ値が復元される
        // given (前提条件):
        let input = "MESSAGE\nnote:a\\cb\\nc\\\\d\n\n\0";

        // when (操作):
        let frame = Frame::parse(input).unwrap().unwrap();

        // then (期待する結果):
        assert_eq!(frame.header("note"), Some("a:b\nc\\d"));
    }

    #[test]
    fn test_parse_repeated_header_keeps_first() {
        // テスト項目: 同名ヘッダが複数ある場合、最初の値が使われる
        // given (前提条件):
        let input = "MESSAGE\nfoo:first\nfoo:second\n\n\0";

        // when (操作):
        let frame = Frame::parse(input).unwrap().unwrap();

        // then (期待する結果):
        assert_eq!(frame.header("foo"), Some("first"));
    }

    #[test]
    fn test_parse_heartbeat_returns_none() {
        // テスト項目: 改行だけのメッセージはハートビートとして扱われる
        // given (前提条件):
        let input = "\n";

        // when (操作):
        let result = Frame::parse(input);

        // then (期待する結果):
        assert_eq!(result, Ok(None));
    }

    #[test]
    fn test_parse_unknown_command_fails() {
        // テスト項目: 未知のコマンドはエラーになる
        // given (前提条件):
        let input = "HELLO\n\n\0";

        // when (操作):
        let result = Frame::parse(input);

        // then (期待する結果):
        assert_eq!(result, Err(FrameError::UnknownCommand("HELLO".to_string())));
    }

    #[test]
    fn test_parse_missing_terminator_fails() {
        // テスト項目: NUL 終端がないフレームはエラーになる
        // given (前提条件):
        let input = "MESSAGE\nsubscription:sub-0\n\n{}";

        // when (操作):
        let result = Frame::parse(input);

        // then (期待する結果):
        assert_eq!(result, Err(FrameError::MissingTerminator));
    }

    #[test]
    fn test_parse_malformed_header_fails() {
        // テスト項目: コロンのないヘッダ行はエラーになる
        // given (前提条件):
        let input = "MESSAGE\nnot-a-header\n\n\0";

        // when (操作):
        let result = Frame::parse(input);

        // then (期待する結果):
        assert_eq!(
            result,
            Err(FrameError::MalformedHeader("not-a-header".to_string()))
        );
    }

    #[test]
    fn test_parse_invalid_escape_fails() {
        // テスト項目: 不正なエスケープシーケンスはエラーになる
        // given (前提条件):
        let input = "MESSAGE\nfoo:bad\\t\n\n\0";

        // when (操作):
        let result = Frame::parse(input);

        // then (期待する結果):
        assert_eq!(result, Err(FrameError::InvalidEscape("bad\\t".to_string())));
    }

    #[test]
    fn test_parse_content_length_longer_than_body_fails() {
        // テスト項目: content-length が実際のボディより長い場合はエラーになる
        // given (前提条件):
        let input = "MESSAGE\ncontent-length:50\n\nshort\0";

        // when (操作):
        let result = Frame::parse(input);

        // then (期待する結果):
        assert_eq!(result, Err(FrameError::Incomplete));
    }

    #[test]
    fn test_encoded_send_frame_parses_back() {
        // テスト項目: エンコードした SEND フレームを解析すると同じ内容が得られる
        // given (前提条件):
        let frame = Frame::send_json("/app/chat.sendMessage", "{\"content\":\"hi\"}".to_string());

        // when (操作):
        let parsed = Frame::parse(&frame.encode()).unwrap().unwrap();

        // then (期待する結果):
        assert_eq!(parsed.command, Command::Send);
        assert_eq!(parsed.header("destination"), Some("/app/chat.sendMessage"));
        assert_eq!(parsed.header("content-length"), Some("16"));
        assert_eq!(parsed.body, "{\"content\":\"hi\"}");
    }
}
