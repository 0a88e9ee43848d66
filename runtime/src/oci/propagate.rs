//! Cross-repository propagation.
//!
//! A list may only reference manifests that exist in its own repository.
//! Members fetched from other repositories of the same registry are made
//! available in the target first: their blobs are cross-mounted, then the
//! member manifests are pushed under synthetic tags.

use std::collections::HashSet;
use std::sync::Arc;

use a3s_manifest_core::error::{ManifestError, Result};
use futures::{StreamExt, TryStreamExt};
use reqwest::Url;

use super::auth::RegistryClient;
use super::digest::Digest;
use super::endpoint::Endpoint;
use super::fetch::CONTENT_DIGEST_HEADER;
use super::push::put_manifest;
use super::record::ManifestRecord;
use super::reference::ImageReference;
use super::transport::{Method, RegistryRequest};

/// Longest tag a registry accepts.
const MAX_TAG_LEN: usize = 128;

/// Make a blob of `from_repo` available in the target repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobMountRequest {
    pub from_repo: String,
    pub digest: Digest,
}

/// Push a foreign member manifest into the target repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManifestPushRequest {
    pub target_tag: String,
    pub digest: Digest,
    pub payload: Vec<u8>,
    pub media_type: String,
}

/// Work needed before a list over the members can be pushed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PropagationPlan {
    pub mounts: Vec<BlobMountRequest>,
    pub pushes: Vec<ManifestPushRequest>,
}

impl PropagationPlan {
    pub fn is_empty(&self) -> bool {
        self.mounts.is_empty() && self.pushes.is_empty()
    }
}

/// Synthetic tag for the `ordinal`-th foreign manifest.
fn synthetic_tag(ordinal: usize, origin_repository: &str) -> String {
    let mut tag = format!("{}{}", ordinal, origin_repository.replace('/', "_"));
    tag.truncate(MAX_TAG_LEN);
    tag
}

/// Compute mounts and pushes for `members` of a list in `target`.
///
/// Every blob (config and layers) of a foreign member is mounted once, even
/// when several members share it.
pub fn plan(target: &ImageReference, members: &[ManifestRecord]) -> PropagationPlan {
    let mut plan = PropagationPlan::default();
    let mut mounted: HashSet<Digest> = HashSet::new();

    for member in members
        .iter()
        .filter(|m| m.origin_repository != target.repository)
    {
        for digest in member.blob_digests() {
            if mounted.insert(digest.clone()) {
                plan.mounts.push(BlobMountRequest {
                    from_repo: member.origin_repository.clone(),
                    digest,
                });
            }
        }
        plan.pushes.push(ManifestPushRequest {
            target_tag: synthetic_tag(plan.pushes.len(), &member.origin_repository),
            digest: member.digest().clone(),
            payload: member.canonical_bytes().to_vec(),
            media_type: member.media_type.clone(),
        });
    }
    plan
}

/// Executes a [`PropagationPlan`] against one endpoint.
pub struct Propagator {
    client: Arc<RegistryClient>,
    max_concurrent: usize,
}

impl Propagator {
    pub fn new(client: Arc<RegistryClient>, max_concurrent: usize) -> Self {
        Self {
            client,
            max_concurrent: max_concurrent.max(1),
        }
    }

    /// Run every mount, then every manifest push. Stops at the first error.
    pub async fn execute(
        &self,
        endpoint: &Endpoint,
        target: &ImageReference,
        plan: &PropagationPlan,
    ) -> Result<()> {
        if plan.is_empty() {
            return Ok(());
        }
        tracing::info!(
            target = %target,
            mounts = plan.mounts.len(),
            manifests = plan.pushes.len(),
            "Propagating foreign members"
        );

        futures::stream::iter(plan.mounts.iter())
            .map(|mount| self.mount(endpoint, target, mount))
            .buffer_unordered(self.max_concurrent)
            .try_collect::<Vec<()>>()
            .await?;

        futures::stream::iter(plan.pushes.iter())
            .map(|push| self.push_manifest(endpoint, target, push))
            .buffer_unordered(self.max_concurrent)
            .try_collect::<Vec<()>>()
            .await?;
        Ok(())
    }

    async fn mount(
        &self,
        endpoint: &Endpoint,
        target: &ImageReference,
        mount: &BlobMountRequest,
    ) -> Result<()> {
        let info = endpoint.info();
        let mut url = Url::parse(&format!(
            "{}/v2/{}/blobs/uploads/",
            info.base(),
            target.repository
        ))
        .map_err(|e| ManifestError::Other(format!("blob mount URL: {}", e)))?;
        url.query_pairs_mut()
            .append_pair("from", &mount.from_repo)
            .append_pair("mount", &mount.digest.to_string());

        let request = RegistryRequest::new(Method::Post, url.as_str())
            .header("Content-Length", "0")
            .insecure_tls(info.insecure_tls);
        let response = self.client.send(&target.registry, request).await?;
        if response.status != 201 {
            return Err(ManifestError::RegistryError {
                registry: target.registry.clone(),
                message: format!(
                    "blob mount of {} from {} failed with status {}",
                    mount.digest, mount.from_repo, response.status
                ),
            });
        }
        tracing::debug!(
            digest = %mount.digest,
            from = %mount.from_repo,
            location = response.header("location").unwrap_or_default(),
            "Mounted blob"
        );
        Ok(())
    }

    async fn push_manifest(
        &self,
        endpoint: &Endpoint,
        target: &ImageReference,
        push: &ManifestPushRequest,
    ) -> Result<()> {
        let response = put_manifest(
            &self.client,
            endpoint,
            &target.registry,
            &target.repository,
            &push.target_tag,
            &push.media_type,
            &push.payload,
        )
        .await?;

        let header = response.header(CONTENT_DIGEST_HEADER).unwrap_or_default();
        let returned = Digest::parse(header).map_err(|_| ManifestError::DigestMismatch {
            expected: push.digest.to_string(),
            actual: header.to_string(),
        })?;
        if returned != push.digest {
            return Err(ManifestError::DigestMismatch {
                expected: push.digest.to_string(),
                actual: returned.to_string(),
            });
        }
        tracing::debug!(tag = %push.target_tag, digest = %returned, "Pushed referenced manifest");
        Ok(())
    }
}
