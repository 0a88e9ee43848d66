//! A3S Manifest Runtime - manifest list engine.
//!
//! Resolves image references, negotiates registry endpoints, keeps the
//! local transaction store of lists under construction and pushes verified
//! lists, propagating members from sibling repositories first.

#![allow(clippy::result_large_err)]

pub mod oci;

// Re-export common types
pub use oci::{
    ConfiguredCredentials, CredentialProvider, CredentialStore, Digest, ImageReference,
    Inspection, ManifestLists, ManifestRecord, Platform, PlatformAnnotation, PushOutcome,
    RegistryAuth, StaticCredentials, TransactionInfo, TransactionStore,
};

/// A3S Manifest Runtime version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
