//! STOMP heart-beat header handling.

use std::{fmt, time::Duration};

/// The `heart-beat` header: `<send-ms>,<receive-ms>`. Zero means "none".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HeartBeat {
    /// Smallest interval at which the sender can emit heart-beats
    pub send_ms: u64,
    /// Interval at which the sender would like to receive heart-beats
    pub receive_ms: u64,
}

impl HeartBeat {
    pub fn new(send_ms: u64, receive_ms: u64) -> Self {
        Self {
            send_ms,
            receive_ms,
        }
    }

    /// Parse a header value. Missing or malformed values mean no heart-beats.
    pub fn parse(value: Option<&str>) -> Self {
        let Some((send, receive)) = value.and_then(|v| v.split_once(',')) else {
            return Self::default();
        };
        Self {
            send_ms: send.trim().parse().unwrap_or(0),
            receive_ms: receive.trim().parse().unwrap_or(0),
        }
    }

    /// Interval at which the client has to emit heart-beats, given what the
    /// client offered and what the server answered in CONNECTED.
    pub fn outgoing_interval(client: HeartBeat, server: HeartBeat) -> Option<Duration> {
        if client.send_ms == 0 || server.receive_ms == 0 {
            return None;
        }
        Some(Duration::from_millis(client.send_ms.max(server.receive_ms)))
    }
}

impl fmt::Display for HeartBeat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.send_ms, self.receive_ms)
    }
}
