//! Command-line interface module.

mod args;
pub mod directory;
pub mod partial;
pub mod serve;

pub use args::{Cli, Commands};
