//! Configuration management
//!
//! Handles loading connection profiles and service settings.

pub mod connections;
pub mod import;
pub mod settings;

pub use connections::{ConnectionConfig, find_connection, load_connections};
pub use import::{ImportedConfig, parse_config};
pub use settings::{Settings, load_settings};
