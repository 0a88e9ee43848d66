//! Scripted in-memory registry for tests.

use std::collections::VecDeque;

use a3s_manifest_core::error::{ManifestError, Result};
use async_trait::async_trait;
use parking_lot::Mutex;

use super::credentials::RegistryAuth;
use super::digest::Digest;
use super::transport::{Method, RegistryRequest, RegistryResponse, RegistryTransport};

/// One scripted reply.
#[derive(Debug, Clone)]
pub enum MockResponse {
    Reply(RegistryResponse),
    Refused,
    Timeout,
}

impl MockResponse {
    pub fn status(status: u16) -> Self {
        MockResponse::Reply(RegistryResponse {
            status,
            ..Default::default()
        })
    }

    /// `GET /v2/` answer of a distribution registry.
    pub fn v2_ok() -> Self {
        Self::status(200).with_header("Docker-Distribution-API-Version", "registry/2.0")
    }

    /// Manifest body with content type and digest headers.
    pub fn manifest(media_type: &str, body: &[u8]) -> Self {
        Self::status(200)
            .with_header("Content-Type", media_type)
            .with_header("Docker-Content-Digest", &Digest::sha256(body).to_string())
            .with_body(body.to_vec())
    }

    pub fn with_header(self, name: &str, value: &str) -> Self {
        match self {
            MockResponse::Reply(mut response) => {
                response
                    .headers
                    .insert(name.to_ascii_lowercase(), value.to_string());
                MockResponse::Reply(response)
            }
            other => other,
        }
    }

    pub fn with_body(self, body: Vec<u8>) -> Self {
        match self {
            MockResponse::Reply(mut response) => {
                response.body = body;
                MockResponse::Reply(response)
            }
            other => other,
        }
    }
}

/// A request as the mock saw it.
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub auth: RegistryAuth,
}

impl RecordedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

struct Route {
    method: Method,
    url: String,
    prefix: bool,
    /// The last reply repeats once the queue is down to one.
    replies: VecDeque<MockResponse>,
}

/// In-memory [`RegistryTransport`]. Unscripted URLs answer `404`.
#[derive(Default)]
pub struct MockRegistry {
    routes: Mutex<Vec<Route>>,
    log: Mutex<Vec<RecordedRequest>>,
}

impl MockRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Script replies for an exact URL.
    pub fn on(&self, method: Method, url: &str, replies: Vec<MockResponse>) {
        self.routes.lock().push(Route {
            method,
            url: url.to_string(),
            prefix: false,
            replies: replies.into(),
        });
    }

    /// Script a reply for every URL starting with `prefix`.
    pub fn on_prefix(&self, method: Method, prefix: &str, reply: MockResponse) {
        self.routes.lock().push(Route {
            method,
            url: prefix.to_string(),
            prefix: true,
            replies: VecDeque::from(vec![reply]),
        });
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.log.lock().clone()
    }

    /// Position of the first logged request matching `method` and `url_part`.
    pub fn position(&self, method: Method, url_part: &str) -> Option<usize> {
        self.log
            .lock()
            .iter()
            .position(|r| r.method == method && r.url.contains(url_part))
    }

    /// Whether any request went to a URL containing `url_part`.
    pub fn contacted(&self, url_part: &str) -> bool {
        self.log.lock().iter().any(|r| r.url.contains(url_part))
    }

    fn next_reply(&self, method: Method, url: &str) -> Option<MockResponse> {
        let mut routes = self.routes.lock();
        // Exact routes win over prefixes
        let index = routes
            .iter()
            .position(|r| !r.prefix && r.method == method && r.url == url)
            .or_else(|| {
                routes
                    .iter()
                    .position(|r| r.prefix && r.method == method && url.starts_with(&r.url))
            })?;
        let route = &mut routes[index];
        if route.replies.len() > 1 {
            route.replies.pop_front()
        } else {
            route.replies.front().cloned()
        }
    }
}

#[async_trait]
impl RegistryTransport for MockRegistry {
    async fn send(&self, request: RegistryRequest) -> Result<RegistryResponse> {
        self.log.lock().push(RecordedRequest {
            method: request.method,
            url: request.url.clone(),
            headers: request.headers.clone(),
            body: request.body.clone(),
            auth: request.auth.clone(),
        });

        match self.next_reply(request.method, &request.url) {
            Some(MockResponse::Reply(response)) => Ok(response),
            Some(MockResponse::Refused) => Err(ManifestError::TransportError {
                url: request.url,
                message: "connection refused".to_string(),
            }),
            Some(MockResponse::Timeout) => Err(ManifestError::TimeoutError(request.url)),
            None => Ok(RegistryResponse {
                status: 404,
                ..Default::default()
            }),
        }
    }
}

/// Image manifest JSON referencing `config` and `layers`.
pub fn image_manifest(media_type: &str, config: &[u8], layers: &[&[u8]]) -> Vec<u8> {
    let config_media_type = if media_type == super::record::OCI_MANIFEST {
        "application/vnd.oci.image.config.v1+json"
    } else {
        "application/vnd.docker.container.image.v1+json"
    };
    let layers: Vec<serde_json::Value> = layers
        .iter()
        .map(|layer| {
            serde_json::json!({
                "mediaType": "application/vnd.oci.image.layer.v1.tar+gzip",
                "digest": Digest::sha256(layer).to_string(),
                "size": layer.len(),
            })
        })
        .collect();
    serde_json::to_vec(&serde_json::json!({
        "schemaVersion": 2,
        "mediaType": media_type,
        "config": {
            "mediaType": config_media_type,
            "digest": Digest::sha256(config).to_string(),
            "size": config.len(),
        },
        "layers": layers,
    }))
    .unwrap()
}

/// Image config JSON for `os`/`arch`.
pub fn image_config(os: &str, arch: &str) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "architecture": arch,
        "os": os,
        "rootfs": {"type": "layers", "diff_ids": []},
    }))
    .unwrap()
}

/// Script `base` as a v2 registry serving a single-platform image at
/// `repo:tag` and `repo@digest`. Returns the manifest bytes.
pub fn serve_image(
    mock: &MockRegistry,
    base: &str,
    repo: &str,
    tag: &str,
    config: &[u8],
    layers: &[&[u8]],
) -> Vec<u8> {
    let manifest = image_manifest(super::record::DOCKER_MANIFEST_V2, config, layers);
    let digest = Digest::sha256(&manifest);
    mock.on(Method::Get, &format!("{}/v2/", base), vec![MockResponse::v2_ok()]);
    for reference in [tag.to_string(), digest.to_string()] {
        mock.on(
            Method::Get,
            &format!("{}/v2/{}/manifests/{}", base, repo, reference),
            vec![MockResponse::manifest(
                super::record::DOCKER_MANIFEST_V2,
                &manifest,
            )],
        );
    }
    mock.on(
        Method::Get,
        &format!("{}/v2/{}/blobs/{}", base, repo, Digest::sha256(config)),
        vec![MockResponse::status(200).with_body(config.to_vec())],
    );
    manifest
}
