//! Process-wide state.

mod state;

pub use state::{register_shutdown, setup_shutdown_handler};
