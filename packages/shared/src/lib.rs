//! Utilities shared by the Dengon packages.

pub mod logger;
pub mod time;
