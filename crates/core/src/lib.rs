//! Pinesink Core Library
//!
//! This crate provides the foundational utilities shared by the Pinecone target:
//! - Error handling (`AppError`, `AppResult`)
//! - Logging infrastructure
//! - Configuration management (`AppConfig`, `SinkConfig`)

pub mod config;
pub mod error;
pub mod logging;

// Re-export commonly used types
pub use config::{AppConfig, LoadMethod, SinkConfig};
pub use error::{AppError, AppResult};
