//! Image reference parsing.
//!
//! Parses image references like `ghcr.io/a3s-box/code:v0.1.0` into structured components.

use a3s_manifest_core::error::{ManifestError, Result};

use super::digest::Digest;

/// Default registry when none is specified.
pub const DEFAULT_REGISTRY: &str = "docker.io";

/// Legacy alias of the default registry.
const LEGACY_DEFAULT_REGISTRY: &str = "index.docker.io";

/// Default tag when none is specified.
const DEFAULT_TAG: &str = "latest";

/// Longest tag a registry accepts.
const MAX_TAG_LEN: usize = 128;

/// Parsed image reference.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    /// Registry hostname (e.g., "ghcr.io", "docker.io", "localhost:5000")
    pub registry: String,
    /// Repository path (e.g., "library/nginx", "a3s-box/code")
    pub repository: String,
    /// Tag (e.g., "latest", "v0.1.0")
    pub tag: Option<String>,
    /// Digest (e.g., "sha256:abc123...")
    pub digest: Option<Digest>,
}

impl ImageReference {
    /// Parse an image reference string.
    ///
    /// Supports formats:
    /// - `nginx` → docker.io/library/nginx:latest
    /// - `nginx:1.25` → docker.io/library/nginx:1.25
    /// - `myuser/myimage` → docker.io/myuser/myimage:latest
    /// - `ghcr.io/org/image:tag` → ghcr.io/org/image:tag
    /// - `ghcr.io/org/image@sha256:abc...` → ghcr.io/org/image@sha256:abc...
    pub fn parse(reference: &str) -> Result<Self> {
        let reference = reference.trim();
        if reference.is_empty() {
            return Err(ManifestError::InvalidReference(
                "Empty image reference".to_string(),
            ));
        }

        // Split off digest first (@ separator)
        let (name_tag, digest) = match reference.rfind('@') {
            Some(at_pos) => {
                let digest = Digest::parse(&reference[at_pos + 1..]).map_err(|e| {
                    ManifestError::InvalidReference(format!("'{}': {}", reference, e))
                })?;
                (&reference[..at_pos], Some(digest))
            }
            None => (reference, None),
        };

        let (name, tag) = split_tag(name_tag);
        let (registry, repository) = Self::split_registry_repository(name, reference)?;

        if let Some(ref tag) = tag {
            validate_tag(tag, reference)?;
        }

        // Apply default tag if no tag and no digest
        let tag = if tag.is_none() && digest.is_none() {
            Some(DEFAULT_TAG.to_string())
        } else {
            tag
        };

        Ok(ImageReference {
            registry,
            repository,
            tag,
            digest,
        })
    }

    /// Split a name into registry and repository components.
    fn split_registry_repository(name: &str, original: &str) -> Result<(String, String)> {
        let (registry, repository) = match name.find('/') {
            Some(slash_pos) => {
                let first = &name[..slash_pos];
                // A registry component contains a dot or colon, or is "localhost"
                if first.contains('.') || first.contains(':') || first == "localhost" {
                    (first.to_string(), name[slash_pos + 1..].to_string())
                } else {
                    (DEFAULT_REGISTRY.to_string(), name.to_string())
                }
            }
            None => (DEFAULT_REGISTRY.to_string(), name.to_string()),
        };

        if repository.is_empty() {
            return Err(ManifestError::InvalidReference(format!(
                "Empty repository in reference '{}'",
                original
            )));
        }
        validate_registry(&registry, original)?;

        let registry = if registry == LEGACY_DEFAULT_REGISTRY {
            DEFAULT_REGISTRY.to_string()
        } else {
            registry
        };

        // Single name like "nginx" → "library/nginx" for Docker Hub
        let repository = if registry == DEFAULT_REGISTRY && !repository.contains('/') {
            format!("library/{}", repository)
        } else {
            repository
        };
        validate_repository(&repository, original)?;

        Ok((registry, repository))
    }

    /// `registry/repository` without tag or digest.
    pub fn name(&self) -> String {
        format!("{}/{}", self.registry, self.repository)
    }

    /// The tag-or-digest path component used on the wire (digest wins).
    pub fn reference_str(&self) -> String {
        match (&self.digest, &self.tag) {
            (Some(digest), _) => digest.to_string(),
            (None, Some(tag)) => tag.clone(),
            (None, None) => DEFAULT_TAG.to_string(),
        }
    }

    /// Same repository, addressed by `tag` only.
    pub fn with_tag(&self, tag: &str) -> Result<Self> {
        validate_tag(tag, tag)?;
        Ok(Self {
            registry: self.registry.clone(),
            repository: self.repository.clone(),
            tag: Some(tag.to_string()),
            digest: None,
        })
    }

    /// Get the full reference string.
    pub fn full_reference(&self) -> String {
        let mut s = self.name();
        if let Some(ref tag) = self.tag {
            s.push(':');
            s.push_str(tag);
        }
        if let Some(ref digest) = self.digest {
            s.push('@');
            s.push_str(&digest.to_string());
        }
        s
    }
}

impl std::fmt::Display for ImageReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.full_reference())
    }
}

/// Split `name[:tag]`; a colon before the last slash belongs to a registry port.
fn split_tag(name_tag: &str) -> (&str, Option<String>) {
    let search_from = name_tag.rfind('/').map(|p| p + 1).unwrap_or(0);
    match name_tag[search_from..].rfind(':') {
        Some(colon) => {
            let colon = search_from + colon;
            (&name_tag[..colon], Some(name_tag[colon + 1..].to_string()))
        }
        None => (name_tag, None),
    }
}

fn validate_registry(registry: &str, original: &str) -> Result<()> {
    let valid = !registry.is_empty()
        && registry
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | ':' | '[' | ']'));
    if valid {
        Ok(())
    } else {
        Err(ManifestError::InvalidReference(format!(
            "Invalid registry '{}' in reference '{}'",
            registry, original
        )))
    }
}

/// Path components are lowercase alphanumerics joined by `.`, `_` or `-`.
fn validate_repository(repository: &str, original: &str) -> Result<()> {
    for component in repository.split('/') {
        let valid = !component.is_empty()
            && component
                .chars()
                .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '.' | '_' | '-'))
            && component.starts_with(|c: char| c.is_ascii_alphanumeric())
            && component.ends_with(|c: char| c.is_ascii_alphanumeric());
        if !valid {
            return Err(ManifestError::InvalidReference(format!(
                "Invalid repository path '{}' in reference '{}'",
                repository, original
            )));
        }
    }
    Ok(())
}

fn validate_tag(tag: &str, original: &str) -> Result<()> {
    let valid = !tag.is_empty()
        && tag.len() <= MAX_TAG_LEN
        && tag.starts_with(|c: char| c.is_ascii_alphanumeric() || c == '_')
        && tag
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'));
    if valid {
        Ok(())
    } else {
        Err(ManifestError::InvalidReference(format!(
            "Invalid tag '{}' in reference '{}'",
            tag, original
        )))
    }
}
