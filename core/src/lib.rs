//! A3S Manifest Core - Foundational Types
//!
//! Error taxonomy and configuration shared by the manifest list engine
//! and its command-line surface.

pub mod config;
pub mod error;

// Re-export commonly used types
pub use config::{LogLevel, RegistryConfig, StorageLocation, ToolConfig};
pub use error::{ManifestError, Result};

/// A3S Manifest version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
