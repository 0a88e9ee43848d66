//! Platform descriptors and the annotations that may edit them.

use std::collections::BTreeSet;

use a3s_manifest_core::error::{ManifestError, Result};
use serde::{Deserialize, Serialize};

/// Known os/architecture combinations (GOOS/GOARCH pairs).
const VALID_OS_ARCHES: &[(&str, &str)] = &[
    ("darwin", "386"),
    ("darwin", "amd64"),
    ("darwin", "arm"),
    ("darwin", "arm64"),
    ("dragonfly", "amd64"),
    ("freebsd", "386"),
    ("freebsd", "amd64"),
    ("freebsd", "arm"),
    ("freebsd", "arm64"),
    ("linux", "386"),
    ("linux", "amd64"),
    ("linux", "arm"),
    ("linux", "arm64"),
    ("linux", "ppc64"),
    ("linux", "ppc64le"),
    ("linux", "mips64"),
    ("linux", "mips64le"),
    ("linux", "riscv64"),
    ("linux", "s390x"),
    ("netbsd", "386"),
    ("netbsd", "amd64"),
    ("netbsd", "arm"),
    ("openbsd", "386"),
    ("openbsd", "amd64"),
    ("openbsd", "arm"),
    ("plan9", "386"),
    ("plan9", "amd64"),
    ("solaris", "amd64"),
    ("windows", "386"),
    ("windows", "amd64"),
    ("windows", "arm64"),
];

/// Whether `os`/`arch` is a known platform combination.
pub fn is_valid_os_arch(os: &str, arch: &str) -> bool {
    VALID_OS_ARCHES.iter().any(|(o, a)| *o == os && *a == arch)
}

/// Platform a manifest targets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub os: String,
    pub architecture: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub os_features: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub cpu_features: BTreeSet<String>,
}

impl Platform {
    pub fn new(os: impl Into<String>, architecture: impl Into<String>) -> Self {
        Self {
            os: os.into(),
            architecture: architecture.into(),
            ..Default::default()
        }
    }
}

impl std::fmt::Display for Platform {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.os, self.architecture)?;
        if let Some(ref variant) = self.variant {
            write!(f, "/{}", variant)?;
        }
        Ok(())
    }
}

/// Requested edits to a member's platform.
#[derive(Debug, Clone, Default)]
pub struct PlatformAnnotation {
    pub os: Option<String>,
    pub architecture: Option<String>,
    pub variant: Option<String>,
    pub cpu_features: Vec<String>,
    pub os_features: Vec<String>,
}

impl PlatformAnnotation {
    pub fn is_empty(&self) -> bool {
        self.os.is_none()
            && self.architecture.is_none()
            && self.variant.is_none()
            && self.cpu_features.is_empty()
            && self.os_features.is_empty()
    }

    /// Apply the edits, validating the resulting os/arch pair when either changed.
    ///
    /// Features are added to the existing sets; os, arch and variant replace.
    pub fn apply(&self, platform: &Platform) -> Result<Platform> {
        let mut updated = platform.clone();
        if let Some(ref os) = self.os {
            updated.os = os.clone();
        }
        if let Some(ref arch) = self.architecture {
            updated.architecture = arch.clone();
        }
        if (self.os.is_some() || self.architecture.is_some())
            && !is_valid_os_arch(&updated.os, &updated.architecture)
        {
            return Err(ManifestError::InvalidAnnotation(format!(
                "manifest entry for image has unsupported os/arch combination: {}/{}",
                updated.os, updated.architecture
            )));
        }
        if let Some(ref variant) = self.variant {
            updated.variant = if variant.is_empty() {
                None
            } else {
                Some(variant.clone())
            };
        }
        for feature in &self.cpu_features {
            check_feature(feature)?;
            updated.cpu_features.insert(feature.clone());
        }
        for feature in &self.os_features {
            check_feature(feature)?;
            updated.os_features.insert(feature.clone());
        }
        Ok(updated)
    }
}

fn check_feature(feature: &str) -> Result<()> {
    let valid = !feature.is_empty()
        && feature
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+'));
    if valid {
        Ok(())
    } else {
        Err(ManifestError::InvalidAnnotation(format!(
            "invalid feature name '{}'",
            feature
        )))
    }
}
