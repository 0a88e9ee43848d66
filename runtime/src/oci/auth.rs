//! Registry authentication on top of a [`RegistryTransport`].
//!
//! Requests go out with any pre-issued token first. A `401` carrying a
//! `WWW-Authenticate` challenge is answered once: `Bearer` challenges trade
//! the configured credentials for a token at the challenge realm, `Basic`
//! challenges are retried with the basic credentials.

use std::collections::HashMap;
use std::sync::Arc;

use a3s_manifest_core::error::{ManifestError, Result};
use parking_lot::Mutex;
use serde::Deserialize;

use super::credentials::{CredentialProvider, RegistryAuth};
use super::transport::{RegistryRequest, RegistryResponse, RegistryTransport};

/// Parsed `WWW-Authenticate` header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Challenge {
    Basic,
    Bearer {
        realm: String,
        service: Option<String>,
        scope: Option<String>,
    },
}

impl Challenge {
    pub fn parse(header: &str) -> Option<Self> {
        let header = header.trim();
        let (scheme, params) = match header.split_once(char::is_whitespace) {
            Some((scheme, params)) => (scheme, params),
            None => (header, ""),
        };

        if scheme.eq_ignore_ascii_case("basic") {
            return Some(Challenge::Basic);
        }
        if !scheme.eq_ignore_ascii_case("bearer") {
            return None;
        }

        let mut params = parse_params(params);
        let realm = params.remove("realm")?;
        Some(Challenge::Bearer {
            realm,
            service: params.remove("service"),
            scope: params.remove("scope"),
        })
    }
}

/// Parse `key="value",key=value` pairs. Quoted values may contain commas.
fn parse_params(input: &str) -> HashMap<String, String> {
    let mut params = HashMap::new();
    let mut chars = input.chars().peekable();

    loop {
        while matches!(chars.peek(), Some(c) if *c == ',' || c.is_whitespace()) {
            chars.next();
        }
        let key: String = chars.by_ref().take_while(|c| *c != '=').collect();
        if key.is_empty() {
            break;
        }

        let mut value = String::new();
        if chars.peek() == Some(&'"') {
            chars.next();
            while let Some(c) = chars.next() {
                match c {
                    '\\' => {
                        if let Some(escaped) = chars.next() {
                            value.push(escaped);
                        }
                    }
                    '"' => break,
                    c => value.push(c),
                }
            }
        } else {
            while let Some(c) = chars.peek() {
                if *c == ',' {
                    break;
                }
                value.push(*c);
                chars.next();
            }
        }
        params.insert(key.trim().to_ascii_lowercase(), value.trim().to_string());
    }
    params
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct TokenKey {
    realm: String,
    service: Option<String>,
    scope: Option<String>,
}

#[derive(Deserialize)]
struct TokenResponse {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    access_token: Option<String>,
}

/// Authenticating registry client shared by every component that talks to
/// a registry.
pub struct RegistryClient {
    transport: Arc<dyn RegistryTransport>,
    credentials: Arc<dyn CredentialProvider>,
    tokens: Mutex<HashMap<TokenKey, String>>,
}

impl RegistryClient {
    pub fn new(
        transport: Arc<dyn RegistryTransport>,
        credentials: Arc<dyn CredentialProvider>,
    ) -> Self {
        Self {
            transport,
            credentials,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    pub fn credentials(&self) -> &dyn CredentialProvider {
        self.credentials.as_ref()
    }

    /// Send a request to `registry`, answering one auth challenge.
    ///
    /// Returns the final response, including a `401` if the retry was refused.
    /// Transport failures are returned as errors.
    pub async fn send(&self, registry: &str, request: RegistryRequest) -> Result<RegistryResponse> {
        let configured = self.credentials.auth(registry);
        let mut first = request.clone();
        if let RegistryAuth::Bearer(_) = configured {
            first.auth = configured.clone();
        }

        let response = self.transport.send(first).await?;
        if response.status != 401 {
            return Ok(response);
        }

        let Some(challenge) = response.header("www-authenticate").and_then(Challenge::parse) else {
            return Ok(response);
        };

        let auth = match challenge {
            Challenge::Basic => match configured {
                RegistryAuth::Basic { .. } => configured,
                _ => return Ok(response),
            },
            Challenge::Bearer {
                realm,
                service,
                scope,
            } => {
                let key = TokenKey {
                    realm,
                    service,
                    scope,
                };
                RegistryAuth::Bearer(self.token(registry, key, &configured).await?)
            }
        };

        tracing::debug!(registry, url = %request.url, "Retrying request after auth challenge");
        let mut retry = request;
        retry.auth = auth;
        self.transport.send(retry).await
    }

    async fn token(&self, registry: &str, key: TokenKey, auth: &RegistryAuth) -> Result<String> {
        if let Some(token) = self.tokens.lock().get(&key) {
            return Ok(token.clone());
        }

        let mut url = reqwest::Url::parse(&key.realm).map_err(|e| ManifestError::Unauthorized {
            registry: registry.to_string(),
            message: format!("invalid token realm '{}': {}", key.realm, e),
        })?;
        {
            let mut query = url.query_pairs_mut();
            if let Some(ref service) = key.service {
                query.append_pair("service", service);
            }
            if let Some(ref scope) = key.scope {
                query.append_pair("scope", scope);
            }
        }

        let realm_host = url.host_str().unwrap_or_default().to_string();
        let mut request = RegistryRequest::get(url.as_str())
            .insecure_tls(self.credentials.is_insecure(&realm_host));
        if let RegistryAuth::Basic { .. } = auth {
            request.auth = auth.clone();
        }

        tracing::debug!(registry, realm = %key.realm, scope = ?key.scope, "Requesting registry token");
        let response = self.transport.send(request).await?;
        if !response.is_success() {
            return Err(ManifestError::Unauthorized {
                registry: registry.to_string(),
                message: format!(
                    "token request failed with status {}: {}",
                    response.status,
                    response.body_excerpt()
                ),
            });
        }

        let parsed: TokenResponse =
            serde_json::from_slice(&response.body).map_err(|e| ManifestError::Unauthorized {
                registry: registry.to_string(),
                message: format!("malformed token response: {}", e),
            })?;
        let token = parsed
            .token
            .or(parsed.access_token)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| ManifestError::Unauthorized {
                registry: registry.to_string(),
                message: "token response carried no token".to_string(),
            })?;

        self.tokens.lock().insert(key, token.clone());
        Ok(token)
    }
}
