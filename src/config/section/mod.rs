//! Configuration section definitions.
//!
//! Each module corresponds to a section in `hugo-preview.toml`:
//!
//! | Module    | TOML Section | Purpose                          |
//! |-----------|--------------|----------------------------------|
//! | `hugo`    | `[hugo]`     | Hugo command line and payload    |
//! | `display` | `[display]`  | Checkin timeout, panel title     |
//! | `bridge`  | `[bridge]`   | WebSocket endpoint for the frame |

mod bridge;
mod display;
mod hugo;

pub use bridge::BridgeConfig;
pub use display::DisplayConfig;
pub use hugo::HugoConfig;
