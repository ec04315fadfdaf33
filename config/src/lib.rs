//! # Configuration System
//!
//! Configuration for the content sync engine.
//!
//! This crate provides:
//! - Configuration structures for the engine, storage and remote adapter
//! - Environment variable loading (`CS_*`)
//! - Configuration file loading (TOML/YAML)
//! - Configuration precedence (CLI > env > file > defaults)
//! - Configuration validation

pub mod config;
pub mod file_loader;
pub mod loader;
pub mod precedence;
pub mod validation;

pub use config::{
    CoordinatorConfig, EngineConfig, ObservabilityConfig, ProcessorConfig, RemoteConfig,
    ResolverConfig, RetryConfig, StorageConfig
};
pub use file_loader::{ConfigFileError, load_from_file, load_from_toml, load_from_yaml};
pub use loader::load_from_env;
pub use precedence::merge_configs;
pub use validation::validate;
pub use validator::Validate;
