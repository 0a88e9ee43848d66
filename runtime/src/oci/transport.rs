//! HTTP transport to container registries.
//!
//! Everything above this layer speaks in [`RegistryRequest`] /
//! [`RegistryResponse`] so the endpoint walk and the push protocol can be
//! driven against a scripted registry in tests.

use std::collections::HashMap;
use std::time::Duration;

use a3s_manifest_core::config::RegistryConfig;
use a3s_manifest_core::error::{ManifestError, Result};
use async_trait::async_trait;

use super::credentials::RegistryAuth;

/// HTTP methods used by the registry protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Head,
    Post,
    Put,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Post => "POST",
            Method::Put => "PUT",
        };
        write!(f, "{}", s)
    }
}

/// A single request to a registry.
#[derive(Debug, Clone)]
pub struct RegistryRequest {
    pub method: Method,
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<Vec<u8>>,
    pub auth: RegistryAuth,
    /// Skip TLS certificate verification (insecure registries only)
    pub insecure_tls: bool,
}

impl RegistryRequest {
    pub fn new(method: Method, url: impl Into<String>) -> Self {
        Self {
            method,
            url: url.into(),
            headers: Vec::new(),
            body: None,
            auth: RegistryAuth::Anonymous,
            insecure_tls: false,
        }
    }

    pub fn get(url: impl Into<String>) -> Self {
        Self::new(Method::Get, url)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn body(mut self, body: Vec<u8>) -> Self {
        self.body = Some(body);
        self
    }

    pub fn insecure_tls(mut self, insecure: bool) -> Self {
        self.insecure_tls = insecure;
        self
    }
}

/// A registry response. Header names are lowercased.
#[derive(Debug, Clone, Default)]
pub struct RegistryResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl RegistryResponse {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(|v| v.as_str())
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// `Content-Type` without parameters.
    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
            .map(|ct| ct.split(';').next().unwrap_or(ct).trim())
    }

    /// Short body excerpt for error messages.
    pub fn body_excerpt(&self) -> String {
        let text = String::from_utf8_lossy(&self.body);
        let text = text.trim();
        if text.len() > 200 {
            let mut end = 200;
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}...", &text[..end])
        } else {
            text.to_string()
        }
    }
}

/// Sends registry requests.
#[async_trait]
pub trait RegistryTransport: Send + Sync {
    async fn send(&self, request: RegistryRequest) -> Result<RegistryResponse>;
}

/// `reqwest`-backed transport with verified and unverified TLS clients.
pub struct HttpTransport {
    verified: reqwest::Client,
    unverified: reqwest::Client,
}

impl HttpTransport {
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        Ok(Self {
            verified: build_client(config, false)?,
            unverified: build_client(config, true)?,
        })
    }
}

fn build_client(config: &RegistryConfig, accept_invalid_certs: bool) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
        .timeout(Duration::from_secs(config.request_timeout_secs))
        .user_agent(format!("a3s-manifest/{}", a3s_manifest_core::VERSION))
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| ManifestError::ConfigError(format!("Failed to create HTTP client: {}", e)))
}

fn map_reqwest_error(url: &str, err: reqwest::Error) -> ManifestError {
    if err.is_timeout() {
        ManifestError::TimeoutError(format!("{}: {}", url, err))
    } else {
        ManifestError::TransportError {
            url: url.to_string(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
impl RegistryTransport for HttpTransport {
    async fn send(&self, request: RegistryRequest) -> Result<RegistryResponse> {
        let client = if request.insecure_tls {
            &self.unverified
        } else {
            &self.verified
        };

        let method = match request.method {
            Method::Get => reqwest::Method::GET,
            Method::Head => reqwest::Method::HEAD,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
        };
        tracing::debug!(method = %request.method, url = %request.url, "Registry request");

        let mut builder = client.request(method, &request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        builder = match request.auth {
            RegistryAuth::Anonymous => builder,
            RegistryAuth::Basic {
                ref username,
                ref password,
            } => builder.basic_auth(username, Some(password)),
            RegistryAuth::Bearer(ref token) => builder.bearer_auth(token),
        };
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder
            .send()
            .await
            .map_err(|e| map_reqwest_error(&request.url, e))?;

        let status = response.status().as_u16();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .collect();
        let body = response
            .bytes()
            .await
            .map_err(|e| map_reqwest_error(&request.url, e))?
            .to_vec();

        tracing::debug!(url = %request.url, status, bytes = body.len(), "Registry response");
        Ok(RegistryResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_is_case_insensitive() {
        let mut response = RegistryResponse {
            status: 200,
            ..Default::default()
        };
        response.headers.insert(
            "docker-content-digest".to_string(),
            "sha256:abc".to_string(),
        );
        assert_eq!(response.header("Docker-Content-Digest"), Some("sha256:abc"));
        assert!(response.is_success());
    }

    #[test]
    fn test_content_type_strips_parameters() {
        let mut response = RegistryResponse::default();
        response.headers.insert(
            "content-type".to_string(),
            "application/json; charset=utf-8".to_string(),
        );
        assert_eq!(response.content_type(), Some("application/json"));
    }

    #[test]
    fn test_body_excerpt_truncates() {
        let response = RegistryResponse {
            status: 500,
            body: vec![b'x'; 500],
            ..Default::default()
        };
        assert_eq!(response.body_excerpt().len(), 203);
    }

    #[test]
    fn test_request_builder() {
        let request = RegistryRequest::get("https://ghcr.io/v2/")
            .header("Accept", "application/json")
            .insecure_tls(true);
        assert_eq!(request.method, Method::Get);
        assert_eq!(request.headers.len(), 1);
        assert!(request.insecure_tls);
        assert_eq!(request.auth, RegistryAuth::Anonymous);
    }

    #[test]
    fn test_http_transport_builds() {
        assert!(HttpTransport::new(&RegistryConfig::default()).is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused_maps_to_transport_error() {
        let transport = HttpTransport::new(&RegistryConfig::default()).unwrap();
        // Port 9 on loopback (discard) is closed in test environments
        let err = transport
            .send(RegistryRequest::get("http://127.0.0.1:9/v2/"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ManifestError::TransportError { .. } | ManifestError::TimeoutError(_)
        ));
    }
}
