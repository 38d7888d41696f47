//! Minimal STOMP 1.2 support: frame codec and heart-beat negotiation.

mod frame;
mod heartbeat;

pub use frame::{Command, Frame, FrameError};
pub use heartbeat::HeartBeat;
