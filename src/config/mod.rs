//! Configuration module for netpulse
//!
//! This module handles:
//! - Pipeline configuration (netpulse.toml)
//! - Source and output repository coordinates
//! - Classifier thresholds and diff policies
//! - API token resolution from the environment

mod settings;

pub use settings::{
    load_settings, resolve_token, ConfigError, DiffConfig, DuplicateKeyPolicy, OutputConfig,
    Settings, SourceConfig, Thresholds,
};
