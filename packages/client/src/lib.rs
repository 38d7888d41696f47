//! Realtime messaging client for the Dengon chat application.
//!
//! Keeps one STOMP-over-WebSocket connection per signed-in user, subscribes
//! the user's personal message and typing queues plus any number of group
//! topics, and relays inbound payloads to an [`EventHandler`]. Outbound
//! sends are fire-and-forget; the connection is retried at a fixed delay
//! until an explicit disconnect.

pub mod client;
pub mod command;
pub mod config;
pub mod credential;
pub mod destination;
pub mod dto;
pub mod error;
pub mod formatter;
pub mod handler;
pub mod runner;
pub mod state;
pub mod stomp;
pub mod subscription;
pub mod transport;
pub mod types;
pub mod ui;

pub use client::MessagingClient;
pub use config::ClientConfig;
pub use error::ClientError;
pub use handler::{ChannelEventHandler, EventHandler, InboundEvent};
pub use state::ConnectionState;
pub use transport::{Connection, Connector, WebSocketConnector};
pub use types::{GroupId, MessageKind, UserId};
