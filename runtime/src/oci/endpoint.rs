//! Registry endpoint lookup and the fetch-with-fallback walk.
//!
//! A registry host expands into an ordered list of candidate endpoints
//! (API version × scheme × mirror). The [`Negotiator`] walks them one at a
//! time: it probes each candidate, hands reachable ones to the manifest
//! fetcher and decides from the [`FetchFailure`] whether to move on.

use std::collections::HashSet;
use std::sync::Arc;

use a3s_manifest_core::config::RegistryConfig;
use a3s_manifest_core::error::{ManifestError, Result};
use reqwest::Url;

use super::auth::RegistryClient;
use super::fetch;
use super::record::ManifestRecord;
use super::reference::{ImageReference, DEFAULT_REGISTRY};
use super::transport::RegistryRequest;

/// Host actually serving the v2 API for Docker Hub.
const DOCKER_HUB_V2_HOST: &str = "registry-1.docker.io";

/// Header a v2 registry sets on every response.
pub const API_VERSION_HEADER: &str = "docker-distribution-api-version";

/// Location and transport settings of one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointInfo {
    pub url: Url,
    /// Skip certificate verification
    pub insecure_tls: bool,
    pub mirror: bool,
    /// Position in the candidate list (0 = tried first)
    pub priority: usize,
}

impl EndpointInfo {
    fn new(url: Url, insecure_tls: bool, mirror: bool) -> Self {
        Self {
            url,
            insecure_tls,
            mirror,
            priority: 0,
        }
    }

    /// Base URL without trailing slash.
    pub fn base(&self) -> &str {
        self.url.as_str().trim_end_matches('/')
    }

    pub fn is_tls(&self) -> bool {
        self.url.scheme() == "https"
    }

    /// `host[:port]` as written in the URL; default ports are omitted, so
    /// `https://r` and `http://r` share a key.
    pub fn host_key(&self) -> String {
        let host = self.url.host_str().unwrap_or_default();
        match self.url.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }
}

/// A candidate registry endpoint tagged with its API version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    V1(EndpointInfo),
    V2(EndpointInfo),
}

impl Endpoint {
    pub fn info(&self) -> &EndpointInfo {
        match self {
            Endpoint::V1(info) | Endpoint::V2(info) => info,
        }
    }

    fn info_mut(&mut self) -> &mut EndpointInfo {
        match self {
            Endpoint::V1(info) | Endpoint::V2(info) => info,
        }
    }

    pub fn is_v2(&self) -> bool {
        matches!(self, Endpoint::V2(_))
    }

    /// Sort key: v2 before v1, https before http, mirrors before origin.
    fn rank(&self) -> (u8, u8, u8) {
        let info = self.info();
        (
            u8::from(!self.is_v2()),
            u8::from(!info.is_tls()),
            u8::from(!info.mirror),
        )
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let version = if self.is_v2() { "v2" } else { "v1" };
        write!(f, "{} {}", version, self.info().base())
    }
}

/// Order candidates and assign priorities. The sort is stable.
pub fn order_endpoints(mut endpoints: Vec<Endpoint>) -> Vec<Endpoint> {
    endpoints.sort_by_key(|e| e.rank());
    for (priority, endpoint) in endpoints.iter_mut().enumerate() {
        endpoint.info_mut().priority = priority;
    }
    endpoints
}

fn origin_url(scheme: &str, host: &str) -> Result<Url> {
    Url::parse(&format!("{}://{}", scheme, host))
        .map_err(|e| ManifestError::InvalidReference(format!("registry host '{}': {}", host, e)))
}

fn mirror_url(mirror: &str) -> Result<Url> {
    let mirror = mirror.trim();
    let with_scheme = if mirror.contains("://") {
        mirror.to_string()
    } else {
        format!("https://{}", mirror)
    };
    Url::parse(&with_scheme)
        .map_err(|e| ManifestError::ConfigError(format!("invalid mirror '{}': {}", mirror, e)))
}

/// Candidate endpoints for pulling from `registry`, ordered.
pub fn lookup_pull_endpoints(
    registry: &str,
    config: &RegistryConfig,
    insecure: bool,
) -> Result<Vec<Endpoint>> {
    let mut endpoints = Vec::new();

    if registry == DEFAULT_REGISTRY {
        for mirror in &config.mirrors {
            let url = mirror_url(mirror)?;
            let mirror_insecure = url.scheme() == "http";
            endpoints.push(Endpoint::V2(EndpointInfo::new(url, mirror_insecure, true)));
        }
        endpoints.push(Endpoint::V2(EndpointInfo::new(
            origin_url("https", DOCKER_HUB_V2_HOST)?,
            false,
            false,
        )));
        return Ok(order_endpoints(endpoints));
    }

    endpoints.push(Endpoint::V2(EndpointInfo::new(
        origin_url("https", registry)?,
        insecure,
        false,
    )));
    if insecure {
        endpoints.push(Endpoint::V2(EndpointInfo::new(
            origin_url("http", registry)?,
            false,
            false,
        )));
    }
    endpoints.push(Endpoint::V1(EndpointInfo::new(
        origin_url("https", registry)?,
        insecure,
        false,
    )));
    if insecure {
        endpoints.push(Endpoint::V1(EndpointInfo::new(
            origin_url("http", registry)?,
            false,
            false,
        )));
    }
    Ok(order_endpoints(endpoints))
}

/// Candidate endpoints for pushing to `registry`. v2 only; insecure hosts
/// try plain HTTP first.
pub fn lookup_push_endpoints(registry: &str, insecure: bool) -> Result<Vec<Endpoint>> {
    let host = if registry == DEFAULT_REGISTRY {
        DOCKER_HUB_V2_HOST
    } else {
        registry
    };
    let https = Endpoint::V2(EndpointInfo::new(origin_url("https", host)?, insecure, false));
    let mut endpoints = if insecure {
        vec![
            Endpoint::V2(EndpointInfo::new(origin_url("http", host)?, false, false)),
            https,
        ]
    } else {
        vec![https]
    };
    for (priority, endpoint) in endpoints.iter_mut().enumerate() {
        endpoint.info_mut().priority = priority;
    }
    Ok(endpoints)
}

/// Result of the reachability probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Probe {
    /// The endpoint answered as a v2 distribution registry
    pub v2_confirmed: bool,
}

/// A failed fetch from one endpoint, classified by the adapter.
#[derive(Debug)]
pub struct FetchFailure {
    pub error: ManifestError,
    /// The walk may move on to the next candidate
    pub fallback_eligible: bool,
    /// The endpoint completed a v2 exchange before failing
    pub transport_ok: bool,
}

impl FetchFailure {
    pub fn fallback(error: ManifestError) -> Self {
        Self {
            error,
            fallback_eligible: true,
            transport_ok: false,
        }
    }

    pub fn fatal(error: ManifestError) -> Self {
        Self {
            error,
            fallback_eligible: false,
            transport_ok: false,
        }
    }

    pub fn answered(mut self) -> Self {
        self.transport_ok = true;
        self
    }
}

/// Outcome of fetching a reference from one endpoint.
pub type FetchOutcome = std::result::Result<Vec<ManifestRecord>, FetchFailure>;

/// Drives endpoint lookup, probing and fetch fallback for one registry.
pub struct Negotiator {
    client: Arc<RegistryClient>,
    config: RegistryConfig,
}

impl Negotiator {
    pub fn new(client: Arc<RegistryClient>, config: RegistryConfig) -> Self {
        Self { client, config }
    }

    pub fn client(&self) -> &Arc<RegistryClient> {
        &self.client
    }

    /// Fetch `reference` from the best endpoint of its registry.
    pub async fn fetch(&self, reference: &ImageReference) -> Result<Vec<ManifestRecord>> {
        let insecure = self.client.credentials().is_insecure(&reference.registry);
        let endpoints = lookup_pull_endpoints(&reference.registry, &self.config, insecure)?;
        self.walk(reference, &endpoints).await
    }

    /// Try `endpoints` in order until one yields manifests.
    pub async fn walk(
        &self,
        reference: &ImageReference,
        endpoints: &[Endpoint],
    ) -> Result<Vec<ManifestRecord>> {
        let mut confirmed_v2 = false;
        let mut confirmed_tls: HashSet<String> = HashSet::new();
        let mut last_err: Option<ManifestError> = None;
        let mut discard_unsupported = false;

        for endpoint in endpoints {
            let info = endpoint.info();
            if confirmed_v2 && !endpoint.is_v2() {
                tracing::debug!(endpoint = %endpoint, "Skipping v1 endpoint; v2 already confirmed");
                continue;
            }
            if !info.is_tls() && confirmed_tls.contains(&info.host_key()) {
                tracing::debug!(endpoint = %endpoint, "Skipping plain HTTP endpoint; TLS already confirmed");
                continue;
            }

            tracing::debug!(endpoint = %endpoint, reference = %reference, "Trying endpoint");
            let probe = match self.probe(&reference.registry, endpoint).await {
                Ok(probe) => probe,
                Err(e @ ManifestError::TimeoutError(_)) => return Err(e),
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, error = %e, "Endpoint unreachable");
                    retain(&mut last_err, &mut discard_unsupported, e);
                    continue;
                }
            };
            if probe.v2_confirmed {
                confirmed_v2 = true;
            }

            match fetch::fetch(&self.client, endpoint, reference, probe).await {
                Ok(records) => {
                    tracing::info!(
                        reference = %reference,
                        endpoint = %endpoint,
                        manifests = records.len(),
                        "Fetched manifest"
                    );
                    return Ok(records);
                }
                Err(failure) => {
                    if failure.transport_ok && info.is_tls() {
                        confirmed_tls.insert(info.host_key());
                    }
                    if !failure.fallback_eligible {
                        return Err(failure.error);
                    }
                    tracing::warn!(
                        endpoint = %endpoint,
                        error = %failure.error,
                        "Endpoint failed, trying next"
                    );
                    retain(&mut last_err, &mut discard_unsupported, failure.error);
                }
            }
        }

        match last_err {
            Some(err) if !err.is_unsupported() => Err(err),
            Some(err) => Err(ManifestError::NoReachableEndpoint(format!(
                "{}: {}",
                reference.registry, err
            ))),
            None => Err(ManifestError::NoReachableEndpoint(reference.registry.clone())),
        }
    }

    /// Pick the endpoint pushes go to: the first push candidate that answers
    /// its probe.
    pub async fn push_endpoint(&self, registry: &str) -> Result<Endpoint> {
        let insecure = self.client.credentials().is_insecure(registry);
        let mut last_err = None;
        for endpoint in lookup_push_endpoints(registry, insecure)? {
            match self.probe(registry, &endpoint).await {
                Ok(_) => return Ok(endpoint),
                Err(e @ ManifestError::TimeoutError(_)) => return Err(e),
                Err(e) => {
                    tracing::debug!(endpoint = %endpoint, error = %e, "Push endpoint unreachable");
                    last_err = Some(e);
                }
            }
        }
        Err(ManifestError::NoReachableEndpoint(match last_err {
            Some(e) => format!("{}: {}", registry, e),
            None => registry.to_string(),
        }))
    }

    /// Reachability probe. Any HTTP answer counts as reachable.
    async fn probe(&self, registry: &str, endpoint: &Endpoint) -> Result<Probe> {
        let info = endpoint.info();
        let url = match endpoint {
            Endpoint::V2(_) => format!("{}/v2/", info.base()),
            Endpoint::V1(_) => format!("{}/v1/_ping", info.base()),
        };
        let request = RegistryRequest::get(url).insecure_tls(info.insecure_tls);
        let response = self.client.send(registry, request).await?;

        let v2_header = response
            .header(API_VERSION_HEADER)
            .map_or(false, |v| v.split(',').any(|v| v.trim() == "registry/2.0"));
        let v2_confirmed = endpoint.is_v2() && (v2_header || matches!(response.status, 200 | 401));
        tracing::debug!(endpoint = %endpoint, status = response.status, v2_confirmed, "Probed endpoint");
        Ok(Probe { v2_confirmed })
    }
}

/// Keep the error that should be reported once the walk is exhausted.
///
/// The first non-"unsupported" error replaces any earlier "unsupported" ones
/// and from then on "unsupported" errors are dropped.
fn retain(last_err: &mut Option<ManifestError>, discard_unsupported: &mut bool, err: ManifestError) {
    if !err.is_unsupported() {
        *discard_unsupported = true;
        *last_err = Some(err);
    } else if !*discard_unsupported {
        *last_err = Some(err);
    }
}
