//! Manifest records held by a transaction.

use a3s_manifest_core::error::{ManifestError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::digest::Digest;
use super::platform::Platform;

/// Docker image manifest, schema 2.
pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
/// Docker manifest list, schema 2.
pub const DOCKER_MANIFEST_LIST_V2: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
/// Legacy signed schema 1 manifest (not supported).
pub const DOCKER_MANIFEST_V1_SIGNED: &str =
    "application/vnd.docker.distribution.manifest.v1+prettyjws";
/// OCI image manifest.
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
/// OCI image index.
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

/// Whether `media_type` names a single-platform image manifest.
pub fn is_image_manifest(media_type: &str) -> bool {
    media_type == DOCKER_MANIFEST_V2 || media_type == OCI_MANIFEST
}

/// Whether `media_type` names a manifest list / image index.
pub fn is_manifest_list(media_type: &str) -> bool {
    media_type == DOCKER_MANIFEST_LIST_V2 || media_type == OCI_INDEX
}

/// A fetched image manifest plus its list-entry metadata.
///
/// `digest` always hashes `canonical_bytes`; both are fixed at construction.
/// Only `platform` is edited afterwards, by annotation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestRecord {
    digest: Digest,
    pub media_type: String,
    pub size: u64,
    pub platform: Platform,
    pub layer_digests: Vec<Digest>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub config_digest: Option<Digest>,
    #[serde(with = "base64_bytes")]
    canonical_bytes: Vec<u8>,
    pub origin_registry: String,
    pub origin_repository: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tag: Option<String>,
    /// Normalized reference the record was fetched under
    pub source_reference: String,
    pub created_at: DateTime<Utc>,
}

impl ManifestRecord {
    /// Create a record over raw manifest bytes; the digest is computed here.
    pub fn new(
        canonical_bytes: Vec<u8>,
        media_type: impl Into<String>,
        origin_registry: impl Into<String>,
        origin_repository: impl Into<String>,
    ) -> Self {
        let origin_registry = origin_registry.into();
        let origin_repository = origin_repository.into();
        Self {
            digest: Digest::sha256(&canonical_bytes),
            media_type: media_type.into(),
            size: canonical_bytes.len() as u64,
            platform: Platform::default(),
            layer_digests: Vec::new(),
            config_digest: None,
            source_reference: format!("{}/{}", origin_registry, origin_repository),
            canonical_bytes,
            origin_registry,
            origin_repository,
            tag: None,
            created_at: Utc::now(),
        }
    }

    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn with_layers(mut self, layers: Vec<Digest>) -> Self {
        self.layer_digests = layers;
        self
    }

    pub fn with_config(mut self, config: Digest) -> Self {
        self.config_digest = Some(config);
        self
    }

    pub fn with_tag(mut self, tag: Option<String>) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_source_reference(mut self, reference: impl Into<String>) -> Self {
        self.source_reference = reference.into();
        self
    }

    pub fn digest(&self) -> &Digest {
        &self.digest
    }

    pub fn canonical_bytes(&self) -> &[u8] {
        &self.canonical_bytes
    }

    /// Check the digest/content invariant (e.g. after loading from disk).
    pub fn verify(&self) -> Result<()> {
        if !self.digest.verify(&self.canonical_bytes) {
            return Err(ManifestError::InvalidDigest(format!(
                "record {} does not match its content",
                self.digest
            )));
        }
        if self.size != self.canonical_bytes.len() as u64 {
            return Err(ManifestError::InvalidDigest(format!(
                "record {} size {} does not match content length {}",
                self.digest,
                self.size,
                self.canonical_bytes.len()
            )));
        }
        Ok(())
    }

    /// Every blob this manifest references (config first, then layers), deduplicated.
    pub fn blob_digests(&self) -> Vec<Digest> {
        let mut blobs: Vec<Digest> = Vec::with_capacity(self.layer_digests.len() + 1);
        for digest in self.config_digest.iter().chain(self.layer_digests.iter()) {
            if !blobs.contains(digest) {
                blobs.push(digest.clone());
            }
        }
        blobs
    }
}

mod base64_bytes {
    use base64::engine::general_purpose::STANDARD;
    use base64::Engine;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let encoded = String::deserialize(deserializer)?;
        STANDARD
            .decode(encoded.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
