//! Verified manifest uploads.

use a3s_manifest_core::error::{ManifestError, Result};

use super::assemble::AssembledList;
use super::auth::RegistryClient;
use super::digest::Digest;
use super::endpoint::Endpoint;
use super::fetch::CONTENT_DIGEST_HEADER;
use super::reference::ImageReference;
use super::transport::{Method, RegistryRequest, RegistryResponse};

/// PUT a manifest payload to `<repository>:<reference>` on `endpoint`.
///
/// Returns the response once the registry accepted it (2xx/3xx). The caller
/// decides how to verify the returned digest.
pub(crate) async fn put_manifest(
    client: &RegistryClient,
    endpoint: &Endpoint,
    registry: &str,
    repository: &str,
    reference: &str,
    media_type: &str,
    payload: &[u8],
) -> Result<RegistryResponse> {
    let info = endpoint.info();
    let url = format!("{}/v2/{}/manifests/{}", info.base(), repository, reference);
    let request = RegistryRequest::new(Method::Put, &url)
        .header("Content-Type", media_type)
        .body(payload.to_vec())
        .insecure_tls(info.insecure_tls);

    let response = client.send(registry, request).await?;
    match response.status {
        200..=399 => Ok(response),
        401 | 403 => Err(ManifestError::Unauthorized {
            registry: registry.to_string(),
            message: format!("PUT {} returned status {}", url, response.status),
        }),
        status => Err(ManifestError::RegistryError {
            registry: registry.to_string(),
            message: format!(
                "PUT {} returned status {}: {}",
                url,
                status,
                response.body_excerpt()
            ),
        }),
    }
}

/// Upload the assembled list to `target` and verify the digest the registry
/// reports for it.
pub async fn push_list(
    client: &RegistryClient,
    endpoint: &Endpoint,
    target: &ImageReference,
    assembled: &AssembledList,
) -> Result<Digest> {
    let response = put_manifest(
        client,
        endpoint,
        &target.registry,
        &target.repository,
        &target.reference_str(),
        &assembled.media_type,
        &assembled.payload,
    )
    .await?;

    let confirmed = verify_pushed_digest(&response, &assembled.payload)?;
    tracing::info!(target = %target, digest = %confirmed, "Pushed manifest list");
    Ok(confirmed)
}

/// The registry's digest header must be well formed and hash `payload` with
/// the same algorithm.
fn verify_pushed_digest(response: &RegistryResponse, payload: &[u8]) -> Result<Digest> {
    let header = response.header(CONTENT_DIGEST_HEADER).ok_or_else(|| {
        ManifestError::PushVerificationFailed("registry returned no content digest".to_string())
    })?;
    let returned = Digest::parse(header).map_err(|e| {
        ManifestError::PushVerificationFailed(format!(
            "registry returned malformed digest '{}': {}",
            header, e
        ))
    })?;

    let sent = Digest::sha256(payload);
    if returned.algorithm() != sent.algorithm() {
        return Err(ManifestError::PushVerificationFailed(format!(
            "registry digest {} uses {}, payload was hashed with {}",
            returned,
            returned.algorithm(),
            sent.algorithm()
        )));
    }
    if returned != sent {
        return Err(ManifestError::PushVerificationFailed(format!(
            "registry digest {} does not match pushed payload {}",
            returned, sent
        )));
    }
    Ok(returned)
}
