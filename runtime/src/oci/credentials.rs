//! Registry credentials and the insecure-registry allow-list.
//!
//! Auth material is looked up by registry host through [`CredentialProvider`].
//! The file-backed [`CredentialStore`] keeps per-registry credentials at a
//! caller-supplied path and uses atomic writes (write tmp, rename).

use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

use a3s_manifest_core::config::RegistryConfig;
use a3s_manifest_core::error::{ManifestError, Result};
use serde::{Deserialize, Serialize};

/// Authentication material for a container registry.
#[derive(Clone, PartialEq, Eq)]
pub enum RegistryAuth {
    Anonymous,
    Basic { username: String, password: String },
    /// Pre-issued registry token sent as `Authorization: Bearer`
    Bearer(String),
}

impl RegistryAuth {
    /// Create anonymous authentication (no credentials).
    pub fn anonymous() -> Self {
        Self::Anonymous
    }

    /// Create basic authentication with username and password.
    pub fn basic(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self::Basic {
            username: username.into(),
            password: password.into(),
        }
    }

    /// Create authentication from environment variables.
    ///
    /// Reads `REGISTRY_USERNAME` and `REGISTRY_PASSWORD`.
    /// Falls back to anonymous if not set.
    pub fn from_env() -> Self {
        match (
            std::env::var("REGISTRY_USERNAME").ok(),
            std::env::var("REGISTRY_PASSWORD").ok(),
        ) {
            (Some(username), Some(password)) => Self::basic(username, password),
            _ => Self::anonymous(),
        }
    }
}

impl std::fmt::Debug for RegistryAuth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print secrets
        match self {
            Self::Anonymous => write!(f, "Anonymous"),
            Self::Basic { username, .. } => write!(f, "Basic({})", username),
            Self::Bearer(_) => write!(f, "Bearer(..)"),
        }
    }
}

/// Lookup of per-registry auth material and transport security policy.
pub trait CredentialProvider: Send + Sync {
    /// Auth material for a registry host (`host[:port]`).
    fn auth(&self, registry: &str) -> RegistryAuth;

    /// Whether plain HTTP and unverified TLS are allowed for the host.
    fn is_insecure(&self, registry: &str) -> bool;
}

/// Per-registry credential entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct CredentialEntry {
    #[serde(default)]
    username: String,
    #[serde(default)]
    password: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    registry_token: Option<String>,
}

/// Persistent credential file format.
#[derive(Debug, Default, Serialize, Deserialize)]
struct CredentialFile {
    registries: HashMap<String, CredentialEntry>,
}

/// Persistent credential store for container registries.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    /// Create a credential store at the given path.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Store credentials for a registry. Overwrites existing entry.
    pub fn store(&self, registry: &str, username: &str, password: &str) -> Result<()> {
        let mut file = self.load()?;
        file.registries.insert(
            normalize_registry(registry),
            CredentialEntry {
                username: username.to_string(),
                password: password.to_string(),
                registry_token: None,
            },
        );
        self.save(&file)
    }

    /// Store a pre-issued registry token. Overwrites existing entry.
    pub fn store_token(&self, registry: &str, token: &str) -> Result<()> {
        let mut file = self.load()?;
        file.registries.insert(
            normalize_registry(registry),
            CredentialEntry {
                username: String::new(),
                password: String::new(),
                registry_token: Some(token.to_string()),
            },
        );
        self.save(&file)
    }

    /// Get auth material for a registry, if any is stored.
    pub fn get(&self, registry: &str) -> Result<Option<RegistryAuth>> {
        let file = self.load()?;
        Ok(file
            .registries
            .get(&normalize_registry(registry))
            .map(|e| match e.registry_token {
                Some(ref token) => RegistryAuth::Bearer(token.clone()),
                None => RegistryAuth::basic(e.username.clone(), e.password.clone()),
            }))
    }

    /// Remove credentials for a registry. Returns true if entry existed.
    pub fn remove(&self, registry: &str) -> Result<bool> {
        let mut file = self.load()?;
        let removed = file
            .registries
            .remove(&normalize_registry(registry))
            .is_some();
        if removed {
            self.save(&file)?;
        }
        Ok(removed)
    }

    /// Load the credential file from disk. Returns empty if not found.
    fn load(&self) -> Result<CredentialFile> {
        if !self.path.exists() {
            return Ok(CredentialFile::default());
        }
        let data = std::fs::read_to_string(&self.path).map_err(|e| {
            ManifestError::Other(format!(
                "Failed to read credential store {}: {}",
                self.path.display(),
                e
            ))
        })?;
        serde_json::from_str(&data).map_err(|e| {
            ManifestError::Other(format!(
                "Failed to parse credential store {}: {}",
                self.path.display(),
                e
            ))
        })
    }

    /// Save the credential file to disk atomically (write tmp, rename).
    fn save(&self, file: &CredentialFile) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                ManifestError::Other(format!(
                    "Failed to create credential store directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let tmp_path = self.path.with_extension("tmp");
        let data = serde_json::to_string_pretty(file)?;
        std::fs::write(&tmp_path, &data)?;
        std::fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

/// Normalize registry names (e.g., "docker.io" and "index.docker.io" → "index.docker.io").
fn normalize_registry(registry: &str) -> String {
    let r = registry.trim().to_lowercase();
    if r == "docker.io" || r == "registry-1.docker.io" {
        "index.docker.io".to_string()
    } else {
        r
    }
}

/// Allow-list of registries that may be reached insecurely.
///
/// Loopback hosts are always insecure.
#[derive(Debug, Clone, Default)]
pub struct InsecureRegistries {
    entries: Vec<String>,
}

impl InsecureRegistries {
    pub fn new(entries: impl IntoIterator<Item = String>) -> Self {
        Self {
            entries: entries.into_iter().map(|e| e.trim().to_lowercase()).collect(),
        }
    }

    pub fn contains(&self, registry: &str) -> bool {
        let registry = registry.trim().to_lowercase();
        let host = split_host(&registry);
        if host == "localhost" {
            return true;
        }
        let ip = host.parse::<IpAddr>().ok();
        if ip.map_or(false, |ip| ip.is_loopback()) {
            return true;
        }

        self.entries.iter().any(|entry| {
            if *entry == registry || *entry == host {
                return true;
            }
            match (ip, entry.split_once('/')) {
                (Some(ip), Some((net, prefix))) => cidr_contains(net, prefix, ip),
                _ => false,
            }
        })
    }
}

/// Host part of `host[:port]`, handling bracketed IPv6.
fn split_host(registry: &str) -> &str {
    if let Some(rest) = registry.strip_prefix('[') {
        return rest.split(']').next().unwrap_or(rest);
    }
    match registry.rsplit_once(':') {
        Some((host, port)) if port.chars().all(|c| c.is_ascii_digit()) => host,
        _ => registry,
    }
}

fn cidr_contains(net: &str, prefix: &str, ip: IpAddr) -> bool {
    let (Ok(net), Ok(prefix)) = (net.parse::<IpAddr>(), prefix.parse::<u32>()) else {
        return false;
    };
    match (net, ip) {
        (IpAddr::V4(net), IpAddr::V4(ip)) if prefix <= 32 => {
            let mask = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix) };
            u32::from(net) & mask == u32::from(ip) & mask
        }
        (IpAddr::V6(net), IpAddr::V6(ip)) if prefix <= 128 => {
            let mask = if prefix == 0 { 0 } else { u128::MAX << (128 - prefix) };
            u128::from(net) & mask == u128::from(ip) & mask
        }
        _ => false,
    }
}

/// Credentials from an optional store, then env vars, then anonymous;
/// insecure policy from registry configuration.
pub struct ConfiguredCredentials {
    store: Option<CredentialStore>,
    insecure: InsecureRegistries,
}

impl ConfiguredCredentials {
    pub fn new(store: Option<CredentialStore>, config: &RegistryConfig) -> Self {
        Self {
            store,
            insecure: InsecureRegistries::new(config.insecure_registries.iter().cloned()),
        }
    }
}

impl CredentialProvider for ConfiguredCredentials {
    fn auth(&self, registry: &str) -> RegistryAuth {
        if let Some(ref store) = self.store {
            match store.get(registry) {
                Ok(Some(auth)) => return auth,
                Ok(None) => {}
                Err(e) => tracing::warn!(registry, error = %e, "Ignoring unreadable credential store"),
            }
        }
        RegistryAuth::from_env()
    }

    fn is_insecure(&self, registry: &str) -> bool {
        self.insecure.contains(registry)
    }
}

/// In-memory credentials.
#[derive(Debug, Clone, Default)]
pub struct StaticCredentials {
    auths: HashMap<String, RegistryAuth>,
    insecure: InsecureRegistries,
}

impl StaticCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_auth(mut self, registry: &str, auth: RegistryAuth) -> Self {
        self.auths.insert(normalize_registry(registry), auth);
        self
    }

    pub fn with_insecure(mut self, entries: &[&str]) -> Self {
        self.insecure = InsecureRegistries::new(entries.iter().map(|e| e.to_string()));
        self
    }
}

impl CredentialProvider for StaticCredentials {
    fn auth(&self, registry: &str) -> RegistryAuth {
        self.auths
            .get(&normalize_registry(registry))
            .cloned()
            .unwrap_or(RegistryAuth::Anonymous)
    }

    fn is_insecure(&self, registry: &str) -> bool {
        self.insecure.contains(registry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store(dir: &TempDir) -> CredentialStore {
        CredentialStore::new(dir.path().join("credentials.json"))
    }

    #[test]
    fn test_store_and_get() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        store.store("ghcr.io", "user1", "pass1").unwrap();
        assert_eq!(
            store.get("ghcr.io").unwrap(),
            Some(RegistryAuth::basic("user1", "pass1"))
        );
    }

    #[test]
    fn test_get_nonexistent() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        assert_eq!(store.get("ghcr.io").unwrap(), None);
    }

    #[test]
    fn test_store_token() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        store.store_token("quay.io", "tok").unwrap();
        assert_eq!(
            store.get("quay.io").unwrap(),
            Some(RegistryAuth::Bearer("tok".to_string()))
        );
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        store.store("ghcr.io", "user1", "pass1").unwrap();
        assert!(store.remove("ghcr.io").unwrap());
        assert!(!store.remove("ghcr.io").unwrap());
        assert_eq!(store.get("ghcr.io").unwrap(), None);
    }

    #[test]
    fn test_docker_io_normalization() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);

        store.store("docker.io", "user", "pass").unwrap();
        // All Docker Hub aliases should resolve to the same entry
        let expected = Some(RegistryAuth::basic("user", "pass"));
        assert_eq!(store.get("index.docker.io").unwrap(), expected);
        assert_eq!(store.get("registry-1.docker.io").unwrap(), expected);
    }

    #[test]
    fn test_debug_hides_secrets() {
        let auth = RegistryAuth::basic("alice", "s3cret");
        let printed = format!("{:?}", auth);
        assert!(printed.contains("alice"));
        assert!(!printed.contains("s3cret"));
        assert!(!format!("{:?}", RegistryAuth::Bearer("tok".into())).contains("tok"));
    }

    #[test]
    fn test_insecure_loopback_always() {
        let insecure = InsecureRegistries::default();
        assert!(insecure.contains("localhost:5000"));
        assert!(insecure.contains("127.0.0.1:5000"));
        assert!(insecure.contains("[::1]:5000"));
        assert!(!insecure.contains("ghcr.io"));
    }

    #[test]
    fn test_insecure_host_and_port_entries() {
        let insecure = InsecureRegistries::new(vec![
            "registry.lan:5000".to_string(),
            "build.lan".to_string(),
        ]);
        assert!(insecure.contains("registry.lan:5000"));
        assert!(!insecure.contains("registry.lan:6000"));
        assert!(insecure.contains("build.lan:443"));
    }

    #[test]
    fn test_insecure_cidr() {
        let insecure = InsecureRegistries::new(vec!["10.1.0.0/16".to_string()]);
        assert!(insecure.contains("10.1.2.3:5000"));
        assert!(!insecure.contains("10.2.0.1"));
    }

    #[test]
    fn test_static_credentials() {
        let creds = StaticCredentials::new()
            .with_auth("docker.io", RegistryAuth::basic("u", "p"))
            .with_insecure(&["registry.lan"]);
        assert_eq!(creds.auth("index.docker.io"), RegistryAuth::basic("u", "p"));
        assert_eq!(creds.auth("ghcr.io"), RegistryAuth::Anonymous);
        assert!(creds.is_insecure("registry.lan"));
    }

    #[test]
    fn test_configured_credentials_prefers_store() {
        let dir = TempDir::new().unwrap();
        let store = test_store(&dir);
        store.store("ghcr.io", "user", "pass").unwrap();
        let config = RegistryConfig {
            insecure_registries: vec!["registry.lan".to_string()],
            ..Default::default()
        };
        let creds = ConfiguredCredentials::new(Some(store), &config);
        assert_eq!(creds.auth("ghcr.io"), RegistryAuth::basic("user", "pass"));
        assert!(creds.is_insecure("registry.lan"));
        assert!(!creds.is_insecure("ghcr.io"));
    }
}
