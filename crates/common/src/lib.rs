//! Srcent Common Library
//!
//! Shared code for the Srcent gateway and ingestion binaries including:
//! - Database models, store traits and the repository
//! - Language model and mail clients
//! - Daily digest and subscription services
//! - Catalog utilities (categories, shuffle, transcript rendering)
//! - Error types, configuration, auth checks, metrics and tracing

pub mod auth;
pub mod catalog;
pub mod config;
pub mod db;
pub mod digest;
pub mod errors;
pub mod llm;
pub mod mail;
pub mod metrics;
pub mod subscription;
pub mod telemetry;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

// Re-export commonly used types
pub use config::AppConfig;
pub use db::{ContentStore, Repository};
pub use errors::{AppError, Result};
pub use llm::LanguageModel;
pub use mail::Mailer;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
