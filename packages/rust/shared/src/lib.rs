//! Shared types, error model, and configuration for docenrich.
//!
//! This crate is the foundation depended on by all other docenrich crates.
//! It provides:
//! - [`EnrichError`]: the unified error type
//! - Domain types ([`Document`], [`Feature`], [`Location`], [`BatchRef`])
//! - UTF-16 slicing helpers for `artifact` text
//! - Configuration ([`AppConfig`], runtime settings, config loading)

pub mod config;
pub mod error;
pub mod text;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, BatchApiConfig, BatchApiSettings, ScoringConfig, ScoringSettings, ServerConfig,
    Timeouts, WorkerSettings, config_dir, config_file_path, init_config, load_config,
    load_config_from, resolve_secret,
};
pub use error::{EnrichError, Result};
pub use text::{slice_utf16, utf16_len};
pub use types::{
    AnnotationProperties, AnnotationType, BatchRef, Document, Feature, FeatureType,
    FieldProperties, FieldType, Location, NoticeProperties,
};
