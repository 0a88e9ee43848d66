//! Manifest list payloads.
//!
//! The same wire types parse lists fetched from a registry and serialize the
//! list built from a transaction.

use a3s_manifest_core::error::{ManifestError, Result};
use serde::{Deserialize, Serialize};

use super::digest::Digest;
use super::platform::Platform;
use super::record::{self, ManifestRecord};

/// Manifest list / image index document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestList {
    pub schema_version: u32,
    #[serde(default)]
    pub media_type: String,
    pub manifests: Vec<ListDescriptor>,
}

/// One list entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDescriptor {
    #[serde(default)]
    pub media_type: String,
    pub digest: Digest,
    pub size: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub platform: Option<ListPlatform>,
}

/// Platform object of a list entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListPlatform {
    pub architecture: String,
    pub os: String,
    #[serde(rename = "os.version", default, skip_serializing_if = "Option::is_none")]
    pub os_version: Option<String>,
    #[serde(rename = "os.features", default, skip_serializing_if = "Vec::is_empty")]
    pub os_features: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

impl From<&Platform> for ListPlatform {
    fn from(platform: &Platform) -> Self {
        Self {
            architecture: platform.architecture.clone(),
            os: platform.os.clone(),
            os_version: None,
            os_features: platform.os_features.iter().cloned().collect(),
            variant: platform.variant.clone(),
            features: platform.cpu_features.iter().cloned().collect(),
        }
    }
}

impl From<ListPlatform> for Platform {
    fn from(platform: ListPlatform) -> Self {
        Self {
            os: platform.os,
            architecture: platform.architecture,
            variant: platform.variant.filter(|v| !v.is_empty()),
            os_features: platform.os_features.into_iter().collect(),
            cpu_features: platform.features.into_iter().collect(),
        }
    }
}

/// A serialized list ready to push.
#[derive(Debug, Clone)]
pub struct AssembledList {
    pub media_type: String,
    pub payload: Vec<u8>,
    pub digest: Digest,
    pub list: ManifestList,
}

/// Media type of a list over `records`: an OCI index when every member is an
/// OCI manifest, otherwise a Docker manifest list.
pub fn list_media_type(records: &[ManifestRecord]) -> &'static str {
    if !records.is_empty() && records.iter().all(|r| r.media_type == record::OCI_MANIFEST) {
        record::OCI_INDEX
    } else {
        record::DOCKER_MANIFEST_LIST_V2
    }
}

/// Build the list payload for `records`, in the given order.
///
/// The output is byte-identical for the same input.
pub fn assemble(records: &[ManifestRecord]) -> Result<AssembledList> {
    if records.is_empty() {
        return Err(ManifestError::InvalidMember(
            "a manifest list needs at least one member".to_string(),
        ));
    }

    let mut manifests = Vec::with_capacity(records.len());
    for member in records {
        member.verify()?;
        if !record::is_image_manifest(&member.media_type) {
            return Err(ManifestError::InvalidMember(format!(
                "{} has media type {}, not an image manifest",
                member.digest(),
                member.media_type
            )));
        }
        manifests.push(ListDescriptor {
            media_type: member.media_type.clone(),
            digest: member.digest().clone(),
            size: member.size,
            platform: Some(ListPlatform::from(&member.platform)),
        });
    }

    let media_type = list_media_type(records).to_string();
    let list = ManifestList {
        schema_version: 2,
        media_type: media_type.clone(),
        manifests,
    };
    let payload = serde_json::to_vec_pretty(&list)?;
    let digest = Digest::sha256(&payload);
    tracing::debug!(digest = %digest, members = records.len(), "Assembled manifest list");

    Ok(AssembledList {
        media_type,
        payload,
        digest,
        list,
    })
}
