//! Configuration module for playmake
//!
//! Provides types and parsing for `playmake.toml` project configuration.

pub mod loader;
pub mod schema;

pub use loader::{default_config, load_config, ConfigError};
pub use schema::*;
