//! Transports between the coordinator and the outside world.
//!
//! # Module Structure
//!
//! - `frame` - WebSocket endpoint the preview panel's embedding frame connects to
//! - `host` - JSON lines with the host editor on stdin/stdout

pub mod frame;
pub mod host;

pub use frame::{BridgeEvent, FrameBridge};
pub use host::{read_commands, write_events};
