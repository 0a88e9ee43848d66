//! Manifest fetch adapters, one per registry API version.
//!
//! Each adapter fetches a reference from a single endpoint and classifies
//! failures for the endpoint walk. Fetching has no local side effects.

use a3s_manifest_core::error::ManifestError;
use serde::Deserialize;

use super::assemble::ManifestList;
use super::auth::RegistryClient;
use super::digest::Digest;
use super::endpoint::{Endpoint, EndpointInfo, FetchFailure, FetchOutcome, Probe};
use super::platform::Platform;
use super::record::{self, ManifestRecord};
use super::reference::ImageReference;
use super::transport::{RegistryRequest, RegistryResponse};

/// Media types accepted from a v2 manifest endpoint.
const MANIFEST_ACCEPT: &[&str] = &[
    record::DOCKER_MANIFEST_V2,
    record::DOCKER_MANIFEST_LIST_V2,
    record::OCI_MANIFEST,
    record::OCI_INDEX,
];

/// Header carrying the registry-computed content digest.
pub const CONTENT_DIGEST_HEADER: &str = "docker-content-digest";

/// Fetch `reference` from `endpoint`.
pub async fn fetch(
    client: &RegistryClient,
    endpoint: &Endpoint,
    reference: &ImageReference,
    probe: Probe,
) -> FetchOutcome {
    match endpoint {
        Endpoint::V2(info) => fetch_v2(client, info, reference, probe).await,
        Endpoint::V1(info) => fetch_v1(client, info, reference).await,
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestDocument {
    #[serde(default)]
    schema_version: Option<u32>,
    #[serde(default)]
    media_type: Option<String>,
    #[serde(default)]
    config: Option<BlobDescriptor>,
    #[serde(default)]
    layers: Vec<BlobDescriptor>,
    #[serde(default)]
    manifests: Option<serde_json::Value>,
}

#[derive(Deserialize)]
struct BlobDescriptor {
    digest: Digest,
}

#[derive(Deserialize)]
struct ImageConfig {
    #[serde(default)]
    os: String,
    #[serde(default)]
    architecture: String,
    #[serde(default)]
    variant: Option<String>,
    #[serde(rename = "os.features", default)]
    os_features: Vec<String>,
}

struct FetchedManifest {
    media_type: String,
    body: Vec<u8>,
    document: ManifestDocument,
}

async fn fetch_v2(
    client: &RegistryClient,
    info: &EndpointInfo,
    reference: &ImageReference,
    probe: Probe,
) -> FetchOutcome {
    if !probe.v2_confirmed {
        return Err(FetchFailure::fallback(ManifestError::UnsupportedMediaType(
            format!("{} does not serve the registry v2 API", info.base()),
        )));
    }

    let fetched = get_manifest(
        client,
        info,
        reference,
        &reference.reference_str(),
        reference.digest.as_ref(),
    )
    .await?;

    if record::is_manifest_list(&fetched.media_type) {
        return fetch_list_members(client, info, reference, fetched).await;
    }

    let platform = fetch_platform(client, info, reference, &fetched.document).await?;
    Ok(vec![to_record(reference, fetched).with_platform(platform)])
}

async fn fetch_list_members(
    client: &RegistryClient,
    info: &EndpointInfo,
    reference: &ImageReference,
    fetched: FetchedManifest,
) -> FetchOutcome {
    let list: ManifestList = serde_json::from_slice(&fetched.body)
        .map_err(|e| FetchFailure::fatal(ManifestError::from(e)).answered())?;
    tracing::debug!(
        reference = %reference,
        entries = list.manifests.len(),
        "Resolving manifest list entries"
    );

    let mut records = Vec::with_capacity(list.manifests.len());
    for entry in list.manifests {
        let member = get_manifest(
            client,
            info,
            reference,
            &entry.digest.to_string(),
            Some(&entry.digest),
        )
        .await?;
        if !record::is_image_manifest(&member.media_type) {
            return Err(FetchFailure::fatal(ManifestError::InvalidMember(format!(
                "{} lists {} with media type {}; nested lists are not supported",
                reference, entry.digest, member.media_type
            )))
            .answered());
        }
        let platform = entry.platform.map(Platform::from).unwrap_or_default();
        records.push(
            to_record(reference, member)
                .with_platform(platform)
                .with_source_reference(format!("{}@{}", reference.name(), entry.digest)),
        );
    }
    Ok(records)
}

fn to_record(reference: &ImageReference, fetched: FetchedManifest) -> ManifestRecord {
    let layers = fetched.document.layers.iter().map(|l| l.digest.clone()).collect();
    let config = fetched.document.config.as_ref().map(|c| c.digest.clone());
    let mut record = ManifestRecord::new(
        fetched.body,
        fetched.media_type,
        reference.registry.clone(),
        reference.repository.clone(),
    )
    .with_layers(layers)
    .with_tag(reference.tag.clone())
    .with_source_reference(reference.full_reference());
    if let Some(config) = config {
        record = record.with_config(config);
    }
    record
}

/// GET and validate one manifest.
async fn get_manifest(
    client: &RegistryClient,
    info: &EndpointInfo,
    reference: &ImageReference,
    tag_or_digest: &str,
    expected: Option<&Digest>,
) -> Result<FetchedManifest, FetchFailure> {
    let url = format!(
        "{}/v2/{}/manifests/{}",
        info.base(),
        reference.repository,
        tag_or_digest
    );
    let request = RegistryRequest::get(&url)
        .header("Accept", MANIFEST_ACCEPT.join(", "))
        .insecure_tls(info.insecure_tls);

    // A connection that fails mid-walk is not a protocol mismatch
    let response = client
        .send(&reference.registry, request)
        .await
        .map_err(FetchFailure::fatal)?;
    check_status(&reference.registry, &url, &response)
        .map_err(|failure| failure.answered())?;

    verify_content(&response, expected).map_err(|e| FetchFailure::fatal(e).answered())?;

    let document: ManifestDocument = serde_json::from_slice(&response.body).map_err(|e| {
        FetchFailure::fallback(ManifestError::UnsupportedMediaType(format!(
            "{}: unreadable manifest: {}",
            url, e
        )))
        .answered()
    })?;
    let media_type = resolve_media_type(&response, &document).ok_or_else(|| {
        FetchFailure::fallback(ManifestError::UnsupportedMediaType(format!(
            "{}: unsupported manifest format",
            url
        )))
        .answered()
    })?;

    Ok(FetchedManifest {
        media_type,
        body: response.body,
        document,
    })
}

fn check_status(registry: &str, url: &str, response: &RegistryResponse) -> Result<(), FetchFailure> {
    match response.status {
        200..=299 => Ok(()),
        404 => Err(FetchFailure::fallback(ManifestError::ManifestNotFound {
            reference: url.to_string(),
        })),
        401 | 403 => Err(FetchFailure::fatal(ManifestError::Unauthorized {
            registry: registry.to_string(),
            message: format!("{} returned status {}", url, response.status),
        })),
        406 | 415 => Err(FetchFailure::fallback(ManifestError::UnsupportedMediaType(
            format!("{} returned status {}", url, response.status),
        ))),
        status => Err(FetchFailure::fallback(ManifestError::RegistryError {
            registry: registry.to_string(),
            message: format!(
                "{} returned status {}: {}",
                url,
                status,
                response.body_excerpt()
            ),
        })),
    }
}

/// Check the body against the requested digest and the digest header.
fn verify_content(
    response: &RegistryResponse,
    expected: Option<&Digest>,
) -> a3s_manifest_core::error::Result<()> {
    if let Some(expected) = expected {
        let actual = Digest::compute(expected.algorithm(), &response.body);
        if &actual != expected {
            return Err(ManifestError::DigestMismatch {
                expected: expected.to_string(),
                actual: actual.to_string(),
            });
        }
    }

    if let Some(header) = response.header(CONTENT_DIGEST_HEADER) {
        match Digest::parse(header) {
            Ok(advertised) => {
                let actual = Digest::compute(advertised.algorithm(), &response.body);
                if actual != advertised {
                    return Err(ManifestError::DigestMismatch {
                        expected: advertised.to_string(),
                        actual: actual.to_string(),
                    });
                }
            }
            Err(e) => tracing::warn!(header, error = %e, "Ignoring malformed content digest header"),
        }
    }
    Ok(())
}

/// Media type of a fetched manifest, or `None` for formats we cannot list.
fn resolve_media_type(response: &RegistryResponse, document: &ManifestDocument) -> Option<String> {
    if document.schema_version == Some(1) {
        return None;
    }
    let known = |mt: &str| record::is_image_manifest(mt) || record::is_manifest_list(mt);

    if let Some(ct) = response.content_type() {
        if known(ct) {
            return Some(ct.to_string());
        }
    }
    if let Some(ref mt) = document.media_type {
        return known(mt).then(|| mt.clone());
    }
    // OCI documents may omit mediaType
    if document.manifests.is_some() {
        Some(record::OCI_INDEX.to_string())
    } else if document.config.is_some() {
        Some(record::OCI_MANIFEST.to_string())
    } else {
        None
    }
}

async fn fetch_platform(
    client: &RegistryClient,
    info: &EndpointInfo,
    reference: &ImageReference,
    document: &ManifestDocument,
) -> Result<Platform, FetchFailure> {
    let Some(ref config) = document.config else {
        return Ok(Platform::default());
    };

    let url = format!(
        "{}/v2/{}/blobs/{}",
        info.base(),
        reference.repository,
        config.digest
    );
    let request = RegistryRequest::get(&url).insecure_tls(info.insecure_tls);
    let response = client
        .send(&reference.registry, request)
        .await
        .map_err(FetchFailure::fatal)?;
    check_status(&reference.registry, &url, &response)
        .map_err(|failure| failure.answered())?;
    if !config.digest.verify(&response.body) {
        return Err(FetchFailure::fatal(ManifestError::DigestMismatch {
            expected: config.digest.to_string(),
            actual: Digest::compute(config.digest.algorithm(), &response.body).to_string(),
        })
        .answered());
    }

    let image_config: ImageConfig = serde_json::from_slice(&response.body)
        .map_err(|e| FetchFailure::fatal(ManifestError::from(e)).answered())?;
    Ok(Platform {
        os: image_config.os,
        architecture: image_config.architecture,
        variant: image_config.variant.filter(|v| !v.is_empty()),
        os_features: image_config.os_features.into_iter().collect(),
        cpu_features: Default::default(),
    })
}

/// Legacy v1 endpoints cannot serve content-addressed manifests. The tag
/// lookup only distinguishes "not found" from "unsupported".
async fn fetch_v1(
    client: &RegistryClient,
    info: &EndpointInfo,
    reference: &ImageReference,
) -> FetchOutcome {
    let unsupported = || {
        FetchFailure::fallback(ManifestError::UnsupportedMediaType(format!(
            "{} only serves the legacy v1 API",
            info.base()
        )))
    };
    let Some(ref tag) = reference.tag else {
        return Err(unsupported());
    };
    if reference.digest.is_some() {
        return Err(unsupported());
    }

    let url = format!(
        "{}/v1/repositories/{}/tags/{}",
        info.base(),
        reference.repository,
        tag
    );
    let request = RegistryRequest::get(&url).insecure_tls(info.insecure_tls);
    let response = client
        .send(&reference.registry, request)
        .await
        .map_err(FetchFailure::fatal)?;
    if response.status == 404 {
        return Err(FetchFailure::fallback(ManifestError::ManifestNotFound {
            reference: reference.to_string(),
        }));
    }
    Err(unsupported())
}
