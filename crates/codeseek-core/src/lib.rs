//! Configuration loading and wiring of the indexing and search components.

pub mod bootstrap;
pub mod config;

pub use bootstrap::{AppBuilder, CodeIndexer, CodeSearcher, resolve_config_path};
pub use config::{Config, ConfigError};
