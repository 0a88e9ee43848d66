//! Manifest list operations: create, annotate, inspect, fetch, push, remove.
//!
//! `ManifestLists` ties the components together. Transactions live in the
//! transaction store; images looked up by reference are cached in a
//! separate store under `<root>/cache` so inspecting an image never creates
//! a transaction.

use std::sync::Arc;

use a3s_manifest_core::config::{RegistryConfig, StorageLocation, ToolConfig};
use a3s_manifest_core::error::{ManifestError, Result};

use super::assemble::{self, AssembledList};
use super::auth::RegistryClient;
use super::credentials::CredentialProvider;
use super::digest::Digest;
use super::endpoint::Negotiator;
use super::platform::PlatformAnnotation;
use super::propagate::{self, Propagator};
use super::push;
use super::record::{self, ManifestRecord};
use super::reference::ImageReference;
use super::store::{TransactionInfo, TransactionStore};
use super::transport::HttpTransport;

/// Directory under the storage root holding cached lookups.
const CACHE_DIR: &str = "cache";

/// What `inspect` found for a reference.
#[derive(Debug, Clone)]
pub enum Inspection {
    /// A local manifest list under construction
    Transaction {
        target: ImageReference,
        records: Vec<ManifestRecord>,
        pushed_digest: Option<Digest>,
    },
    /// A registry image (one record per platform)
    Image {
        reference: ImageReference,
        records: Vec<ManifestRecord>,
    },
}

/// Result of a successful push.
#[derive(Debug, Clone)]
pub struct PushOutcome {
    pub target: ImageReference,
    pub digest: Digest,
    pub media_type: String,
    pub members: usize,
}

/// Manifest list service.
pub struct ManifestLists {
    store: TransactionStore,
    cache: TransactionStore,
    negotiator: Negotiator,
    propagator: Propagator,
}

impl ManifestLists {
    pub fn new(
        location: &StorageLocation,
        client: Arc<RegistryClient>,
        config: &RegistryConfig,
    ) -> Result<Self> {
        let cache_location = StorageLocation::new(location.root().join(CACHE_DIR));
        Ok(Self {
            store: TransactionStore::new(location)?,
            cache: TransactionStore::new(&cache_location)?,
            negotiator: Negotiator::new(client.clone(), config.clone()),
            propagator: Propagator::new(client, config.max_concurrent_uploads),
        })
    }

    /// Build the service over the HTTP transport.
    pub fn open(config: &ToolConfig, credentials: Arc<dyn CredentialProvider>) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(&config.registry)?);
        let client = Arc::new(RegistryClient::new(transport, credentials));
        Self::new(&config.storage, client, &config.registry)
    }

    pub fn store(&self) -> &TransactionStore {
        &self.store
    }

    /// Start (or with `amend`, extend) the list `target` with `members`.
    ///
    /// Every member is resolved before anything is stored, so a failing
    /// member leaves the store untouched.
    pub async fn create(
        &self,
        target: &str,
        members: &[String],
        amend: bool,
    ) -> Result<Vec<ManifestRecord>> {
        let target = parse_target(target)?;
        if self.store.exists(&target) && !amend {
            return Err(ManifestError::TransactionExists(target.full_reference()));
        }
        if members.is_empty() {
            return Err(ManifestError::InvalidMember(
                "a manifest list needs at least one member".to_string(),
            ));
        }

        let mut resolved = Vec::with_capacity(members.len());
        for member in members {
            let reference = ImageReference::parse(member)?;
            if reference.registry != target.registry {
                return Err(ManifestError::OriginMismatch {
                    member: reference.registry,
                    target: target.registry.clone(),
                });
            }
            let mut records = self.resolve(&reference).await?;
            if records.len() != 1 || !record::is_image_manifest(&records[0].media_type) {
                return Err(ManifestError::InvalidMember(format!(
                    "{} is a manifest list; members must be single-platform images",
                    reference
                )));
            }
            resolved.push(records.remove(0));
        }

        for member in resolved {
            tracing::info!(
                target = %target,
                digest = %member.digest(),
                platform = %member.platform,
                "Adding member"
            );
            self.store.put(&target, member, false)?;
        }
        self.store.list(&target)
    }

    /// Edit the platform of one member of `target`.
    pub async fn annotate(
        &self,
        target: &str,
        member: &str,
        annotation: &PlatformAnnotation,
    ) -> Result<ManifestRecord> {
        let target = parse_target(target)?;
        let members = self.store.list(&target)?;
        if let Some(pushed) = self.store.pushed_digest(&target)? {
            return Err(ManifestError::InvalidAnnotation(format!(
                "{} was already pushed as {}; remove it with `rm` and create it again to change it",
                target, pushed
            )));
        }

        let reference = ImageReference::parse(member)?;
        let digest = match reference.digest {
            Some(ref digest) => digest.clone(),
            None => {
                let full = reference.full_reference();
                match members.iter().find(|r| r.source_reference == full) {
                    Some(record) => record.digest().clone(),
                    None => {
                        let records = self.resolve(&reference).await?;
                        match records.as_slice() {
                            [record] => record.digest().clone(),
                            _ => {
                                return Err(ManifestError::InvalidMember(format!(
                                    "{} is a manifest list, not a member image",
                                    reference
                                )))
                            }
                        }
                    }
                }
            }
        };

        let mut record = self.store.get(&target, &digest)?.ok_or_else(|| {
            ManifestError::InvalidAnnotation(format!(
                "{} ({}) is not a member of {}",
                reference, digest, target
            ))
        })?;
        record.platform = annotation.apply(&record.platform)?;
        tracing::info!(
            target = %target,
            digest = %digest,
            platform = %record.platform,
            "Annotated member"
        );
        self.store.put(&target, record, true)
    }

    /// A local transaction, or the registry image (cached on first lookup).
    pub async fn inspect(&self, reference: &str) -> Result<Inspection> {
        let reference = ImageReference::parse(reference)?;
        if reference.digest.is_none() && self.store.exists(&reference) {
            return Ok(Inspection::Transaction {
                records: self.store.list(&reference)?,
                pushed_digest: self.store.pushed_digest(&reference)?,
                target: reference,
            });
        }
        let records = self.resolve(&reference).await?;
        Ok(Inspection::Image { reference, records })
    }

    /// Fetch `reference` from its registry, replacing any cached copy.
    pub async fn fetch(&self, reference: &str) -> Result<Vec<ManifestRecord>> {
        let reference = ImageReference::parse(reference)?;
        let records = self.negotiator.fetch(&reference).await?;
        // The registry's answer replaces the whole entry, not just matching digests
        if self.cache.exists(&reference) {
            self.cache.delete(&reference)?;
        }
        records
            .into_iter()
            .map(|record| self.cache.put(&reference, record, true))
            .collect()
    }

    /// The list payload `push` would upload for `target`.
    pub fn assemble(&self, target: &str) -> Result<AssembledList> {
        let target = parse_target(target)?;
        assemble::assemble(&self.store.list(&target)?)
    }

    /// Propagate foreign members, push the list and verify it.
    ///
    /// With `purge` the transaction is deleted afterwards; otherwise it is
    /// kept and sealed against further annotation.
    pub async fn push(&self, target: &str, purge: bool) -> Result<PushOutcome> {
        let target = parse_target(target)?;
        let members = self.store.list(&target)?;
        for member in &members {
            if member.origin_registry != target.registry {
                return Err(ManifestError::OriginMismatch {
                    member: member.origin_registry.clone(),
                    target: target.registry.clone(),
                });
            }
        }
        let assembled = assemble::assemble(&members)?;

        let endpoint = self.negotiator.push_endpoint(&target.registry).await?;
        tracing::info!(target = %target, endpoint = %endpoint, "Pushing manifest list");

        let plan = propagate::plan(&target, &members);
        self.propagator.execute(&endpoint, &target, &plan).await?;

        let digest = push::push_list(self.negotiator.client(), &endpoint, &target, &assembled).await?;

        if purge {
            self.store.delete(&target)?;
        } else {
            self.store.mark_pushed(&target, &digest)?;
        }
        Ok(PushOutcome {
            target,
            digest,
            media_type: assembled.media_type,
            members: members.len(),
        })
    }

    /// Delete the local transaction `target`.
    pub fn remove(&self, target: &str) -> Result<()> {
        let target = parse_target(target)?;
        self.store.delete(&target)?;
        tracing::info!(target = %target, "Removed manifest list");
        Ok(())
    }

    /// All local transactions.
    pub fn transactions(&self) -> Result<Vec<TransactionInfo>> {
        self.store.transactions()
    }

    /// Records for `reference` from the cache, else from the registry
    /// (cached without overwriting).
    async fn resolve(&self, reference: &ImageReference) -> Result<Vec<ManifestRecord>> {
        if self.cache.exists(reference) {
            tracing::debug!(reference = %reference, "Using cached manifest");
            return self.cache.list(reference);
        }
        let records = self.negotiator.fetch(reference).await?;
        records
            .into_iter()
            .map(|record| self.cache.put(reference, record, false))
            .collect()
    }
}

/// A list target must be a tag; the default tag applies.
fn parse_target(target: &str) -> Result<ImageReference> {
    let reference = ImageReference::parse(target)?;
    if reference.digest.is_some() {
        return Err(ManifestError::InvalidReference(format!(
            "'{}': a manifest list target must be a tag, not a digest",
            target
        )));
    }
    Ok(reference)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oci::credentials::StaticCredentials;
    use crate::oci::testing::{image_config, serve_image, MockRegistry, MockResponse};
    use crate::oci::transport::Method;
    use tempfile::TempDir;

    const BASE: &str = "https://ghcr.io";

    fn service(dir: &TempDir, mock: &Arc<MockRegistry>) -> ManifestLists {
        let client = Arc::new(RegistryClient::new(
            mock.clone(),
            Arc::new(StaticCredentials::new()),
        ));
        ManifestLists::new(
            &StorageLocation::new(dir.path()),
            client,
            &RegistryConfig::default(),
        )
        .unwrap()
    }

    /// img-a (linux/arm) in the target repo, img-b (windows/amd64) in another.
    fn serve_members(mock: &MockRegistry) -> (Vec<u8>, Vec<u8>) {
        let a = serve_image(mock, BASE, "org/app", "a", &image_config("linux", "arm"), &[b"la"]);
        let b = serve_image(mock, BASE, "org/b", "b", &image_config("windows", "amd64"), &[b"lb"]);
        (a, b)
    }

    fn members() -> Vec<String> {
        vec!["ghcr.io/org/app:a".to_string(), "ghcr.io/org/b:b".to_string()]
    }

    #[tokio::test]
    async fn test_create_annotate_push_scenario() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockRegistry::new());
        let (a, b) = serve_members(&mock);
        let lists = service(&dir, &mock);

        let created = lists.create("ghcr.io/org/app:multi", &members(), false).await.unwrap();
        assert_eq!(created.len(), 2);
        assert_eq!(created[0].platform.architecture, "arm");
        assert_eq!(created[1].platform.os, "windows");

        let annotation = PlatformAnnotation {
            os: Some("linux".to_string()),
            architecture: Some("amd64".to_string()),
            ..Default::default()
        };
        lists
            .annotate("ghcr.io/org/app:multi", "ghcr.io/org/app:a", &annotation)
            .await
            .unwrap();
        let target = ImageReference::parse("ghcr.io/org/app:multi").unwrap();
        let stored = lists.store().get(&target, &Digest::sha256(&a)).unwrap().unwrap();
        assert_eq!(stored.platform.architecture, "amd64");
        assert_eq!(stored.platform.os, "linux");

        let expected = lists.assemble("ghcr.io/org/app:multi").unwrap();
        mock.on_prefix(
            Method::Post,
            "https://ghcr.io/v2/org/app/blobs/uploads/",
            MockResponse::status(201),
        );
        mock.on(
            Method::Put,
            "https://ghcr.io/v2/org/app/manifests/0org_b",
            vec![MockResponse::status(201)
                .with_header("Docker-Content-Digest", &Digest::sha256(&b).to_string())],
        );
        mock.on(
            Method::Put,
            "https://ghcr.io/v2/org/app/manifests/multi",
            vec![MockResponse::status(201)
                .with_header("Docker-Content-Digest", &expected.digest.to_string())],
        );

        let outcome = lists.push("ghcr.io/org/app:multi", false).await.unwrap();
        assert_eq!(outcome.digest, expected.digest);
        assert_eq!(outcome.members, 2);
        assert_eq!(expected.list.manifests.len(), 2);
        assert_eq!(expected.list.manifests[0].digest, Digest::sha256(&a));
        assert_eq!(expected.list.manifests[1].digest, Digest::sha256(&b));

        // Only the foreign member's blobs were mounted, before any manifest PUT
        let requests = mock.requests();
        let mounts: Vec<_> = requests.iter().filter(|r| r.method == Method::Post).collect();
        assert_eq!(mounts.len(), 2);
        assert!(mounts.iter().all(|r| r.url.contains("from=org%2Fb")));
        let last_mount = requests.iter().rposition(|r| r.method == Method::Post).unwrap();
        let first_put = requests.iter().position(|r| r.method == Method::Put).unwrap();
        assert!(last_mount < first_put);

        assert_eq!(lists.store().pushed_digest(&target).unwrap(), Some(expected.digest));
        let err = lists
            .annotate("ghcr.io/org/app:multi", "ghcr.io/org/app:a", &annotation)
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidAnnotation(ref m) if m.contains("`rm`")));

        // Amending does not unseal a pushed list; only rm + create does
        lists.create("ghcr.io/org/app:multi", &members(), true).await.unwrap();
        let err = lists
            .annotate("ghcr.io/org/app:multi", "ghcr.io/org/app:a", &annotation)
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidAnnotation(_)));
        lists.remove("ghcr.io/org/app:multi").unwrap();
        lists.create("ghcr.io/org/app:multi", &members(), false).await.unwrap();
        lists
            .annotate("ghcr.io/org/app:multi", "ghcr.io/org/app:a", &annotation)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_create_refuses_existing_without_amend() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockRegistry::new());
        serve_members(&mock);
        let lists = service(&dir, &mock);

        lists.create("ghcr.io/org/app:multi", &members()[..1], false).await.unwrap();
        let err = lists
            .create("ghcr.io/org/app:multi", &members(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::TransactionExists(_)));

        let amended = lists.create("ghcr.io/org/app:multi", &members(), true).await.unwrap();
        assert_eq!(amended.len(), 2);
    }

    #[tokio::test]
    async fn test_amend_keeps_annotations() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockRegistry::new());
        serve_members(&mock);
        let lists = service(&dir, &mock);

        lists.create("ghcr.io/org/app:multi", &members()[..1], false).await.unwrap();
        let annotation = PlatformAnnotation {
            variant: Some("v7".to_string()),
            ..Default::default()
        };
        lists
            .annotate("ghcr.io/org/app:multi", "ghcr.io/org/app:a", &annotation)
            .await
            .unwrap();
        let amended = lists.create("ghcr.io/org/app:multi", &members(), true).await.unwrap();
        assert_eq!(amended[0].platform.variant.as_deref(), Some("v7"));
    }

    #[tokio::test]
    async fn test_create_rejects_other_registry() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockRegistry::new());
        let lists = service(&dir, &mock);
        let err = lists
            .create("ghcr.io/org/app:multi", &["quay.io/org/x:1".to_string()], false)
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::OriginMismatch { .. }));
        assert!(mock.requests().is_empty());
    }

    #[tokio::test]
    async fn test_create_rejects_list_member() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockRegistry::new());
        let (a, b) = serve_members(&mock);
        let list = serde_json::to_vec(&serde_json::json!({
            "schemaVersion": 2,
            "mediaType": record::DOCKER_MANIFEST_LIST_V2,
            "manifests": [
                {"mediaType": record::DOCKER_MANIFEST_V2, "digest": Digest::sha256(&a).to_string(), "size": a.len(),
                 "platform": {"architecture": "arm", "os": "linux"}},
                {"mediaType": record::DOCKER_MANIFEST_V2, "digest": Digest::sha256(&b).to_string(), "size": b.len(),
                 "platform": {"architecture": "amd64", "os": "windows"}},
            ]
        }))
        .unwrap();
        // Both entries must be reachable from org/app
        serve_image(&mock, BASE, "org/app", "b-copy", &image_config("windows", "amd64"), &[b"lb"]);
        mock.on(
            Method::Get,
            "https://ghcr.io/v2/org/app/manifests/multi",
            vec![MockResponse::manifest(record::DOCKER_MANIFEST_LIST_V2, &list)],
        );
        let lists = service(&dir, &mock);
        let err = lists
            .create("ghcr.io/org/app:new", &["ghcr.io/org/app:multi".to_string()], false)
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidMember(_)));
        assert!(!lists.store().exists(&ImageReference::parse("ghcr.io/org/app:new").unwrap()));
    }

    #[tokio::test]
    async fn test_failed_member_leaves_store_untouched() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockRegistry::new());
        serve_members(&mock);
        let lists = service(&dir, &mock);
        let err = lists
            .create(
                "ghcr.io/org/app:multi",
                &["ghcr.io/org/app:a".to_string(), "ghcr.io/org/app:missing".to_string()],
                false,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::ManifestNotFound { .. }));
        assert!(lists.transactions().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_annotate_rejects_non_member_and_bad_pair() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockRegistry::new());
        serve_members(&mock);
        let lists = service(&dir, &mock);
        lists.create("ghcr.io/org/app:multi", &members()[..1], false).await.unwrap();

        let annotation = PlatformAnnotation {
            architecture: Some("amd64".to_string()),
            ..Default::default()
        };
        let err = lists
            .annotate("ghcr.io/org/app:multi", "ghcr.io/org/b:b", &annotation)
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidAnnotation(_)));

        let bad = PlatformAnnotation {
            os: Some("plan9".to_string()),
            architecture: Some("s390x".to_string()),
            ..Default::default()
        };
        let err = lists
            .annotate("ghcr.io/org/app:multi", "ghcr.io/org/app:a", &bad)
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::InvalidAnnotation(_)));
    }

    #[tokio::test]
    async fn test_annotate_missing_transaction() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockRegistry::new());
        let lists = service(&dir, &mock);
        let err = lists
            .annotate("ghcr.io/org/app:none", "ghcr.io/org/app:a", &PlatformAnnotation::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ManifestError::TransactionNotFound(_)));
    }

    #[tokio::test]
    async fn test_inspect_prefers_transaction_and_caches_images() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockRegistry::new());
        serve_members(&mock);
        let lists = service(&dir, &mock);
        lists.create("ghcr.io/org/app:multi", &members(), false).await.unwrap();

        match lists.inspect("ghcr.io/org/app:multi").await.unwrap() {
            Inspection::Transaction { records, .. } => assert_eq!(records.len(), 2),
            other => panic!("expected transaction, got {:?}", other),
        }

        let before = mock.requests().len();
        match lists.inspect("ghcr.io/org/b:b").await.unwrap() {
            Inspection::Image { records, .. } => assert_eq!(records[0].platform.os, "windows"),
            other => panic!("expected image, got {:?}", other),
        }
        // Already cached by create
        assert_eq!(mock.requests().len(), before);
        // Inspecting an image does not create a transaction
        assert_eq!(lists.transactions().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_fetch_refreshes_cache() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockRegistry::new());
        serve_members(&mock);
        let lists = service(&dir, &mock);

        let first = lists.fetch("ghcr.io/org/app:a").await.unwrap();
        let before = mock.requests().len();
        let second = lists.fetch("ghcr.io/org/app:a").await.unwrap();
        assert!(mock.requests().len() > before);
        assert_eq!(first[0].digest(), second[0].digest());
    }

    #[tokio::test]
    async fn test_refetch_replaces_repointed_tag() {
        use crate::oci::record::DOCKER_MANIFEST_V2;
        use crate::oci::testing::image_manifest;

        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockRegistry::new());
        let amd64 = image_config("linux", "amd64");
        let arm64 = image_config("linux", "arm64");
        let first = image_manifest(DOCKER_MANIFEST_V2, &amd64, &[b"l1"]);
        let second = image_manifest(DOCKER_MANIFEST_V2, &arm64, &[b"l2"]);
        mock.on(Method::Get, &format!("{}/v2/", BASE), vec![MockResponse::v2_ok()]);
        mock.on(
            Method::Get,
            &format!("{}/v2/org/app/manifests/a", BASE),
            vec![
                MockResponse::manifest(DOCKER_MANIFEST_V2, &first),
                MockResponse::manifest(DOCKER_MANIFEST_V2, &second),
            ],
        );
        for config in [&amd64, &arm64] {
            mock.on(
                Method::Get,
                &format!("{}/v2/org/app/blobs/{}", BASE, Digest::sha256(config)),
                vec![MockResponse::status(200).with_body(config.to_vec())],
            );
        }
        let lists = service(&dir, &mock);

        let before = lists.fetch("ghcr.io/org/app:a").await.unwrap();
        let after = lists.fetch("ghcr.io/org/app:a").await.unwrap();
        assert_eq!(before[0].digest(), &Digest::sha256(&first));
        assert_eq!(after.len(), 1);
        assert_eq!(after[0].digest(), &Digest::sha256(&second));

        match lists.inspect("ghcr.io/org/app:a").await.unwrap() {
            Inspection::Image { records, .. } => {
                assert_eq!(records.len(), 1);
                assert_eq!(records[0].platform.architecture, "arm64");
            }
            other => panic!("expected image, got {:?}", other),
        }

        let created = lists
            .create("ghcr.io/org/app:multi", &["ghcr.io/org/app:a".to_string()], false)
            .await
            .unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].digest(), &Digest::sha256(&second));
    }

    #[tokio::test]
    async fn test_push_purge_deletes_transaction() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockRegistry::new());
        serve_members(&mock);
        let lists = service(&dir, &mock);
        lists.create("ghcr.io/org/app:one", &members()[..1], false).await.unwrap();

        let expected = lists.assemble("ghcr.io/org/app:one").unwrap();
        mock.on(
            Method::Put,
            "https://ghcr.io/v2/org/app/manifests/one",
            vec![MockResponse::status(201)
                .with_header("Docker-Content-Digest", &expected.digest.to_string())],
        );
        lists.push("ghcr.io/org/app:one", true).await.unwrap();
        assert!(lists.transactions().unwrap().is_empty());
        // Local-only members need no propagation
        assert!(mock.position(Method::Post, "/blobs/uploads/").is_none());
    }

    #[tokio::test]
    async fn test_push_verification_failure_keeps_transaction_unsealed() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockRegistry::new());
        serve_members(&mock);
        let lists = service(&dir, &mock);
        lists.create("ghcr.io/org/app:one", &members()[..1], false).await.unwrap();
        mock.on(
            Method::Put,
            "https://ghcr.io/v2/org/app/manifests/one",
            vec![MockResponse::status(201)
                .with_header("Docker-Content-Digest", &Digest::sha256(b"x").to_string())],
        );
        let err = lists.push("ghcr.io/org/app:one", true).await.unwrap_err();
        assert!(matches!(err, ManifestError::PushVerificationFailed(_)));
        let target = ImageReference::parse("ghcr.io/org/app:one").unwrap();
        assert!(lists.store().exists(&target));
        assert_eq!(lists.store().pushed_digest(&target).unwrap(), None);
    }

    #[tokio::test]
    async fn test_remove() {
        let dir = TempDir::new().unwrap();
        let mock = Arc::new(MockRegistry::new());
        serve_members(&mock);
        let lists = service(&dir, &mock);
        lists.create("ghcr.io/org/app:multi", &members(), false).await.unwrap();
        lists.remove("ghcr.io/org/app:multi").unwrap();
        assert!(matches!(
            lists.remove("ghcr.io/org/app:multi"),
            Err(ManifestError::TransactionNotFound(_))
        ));
    }

    #[test]
    fn test_parse_target_rejects_digest() {
        let digest = Digest::sha256(b"x");
        assert!(parse_target(&format!("ghcr.io/org/app@{}", digest)).is_err());
        assert_eq!(
            parse_target("ghcr.io/org/app").unwrap().tag.as_deref(),
            Some("latest")
        );
    }
}
