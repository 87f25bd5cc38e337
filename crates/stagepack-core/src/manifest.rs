use std::collections::BTreeMap;
use std::path::{Component, Path};

use anyhow::{anyhow, Context};
use semver::Version;
use serde::{Deserialize, Serialize};

use crate::PackageId;

pub const PACKAGE_MANIFEST_FILE_NAME: &str = "package.toml";

/// Per-version metadata shipped next to a package payload in a feed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PackageManifest {
    pub name: String,
    pub version: Version,
    pub description: Option<String>,
    #[serde(default)]
    pub frameworks: Vec<String>,
    /// Relative payload path to lowercase hex SHA-256.
    #[serde(default)]
    pub files: BTreeMap<String, String>,
}

impl PackageManifest {
    pub fn from_toml_str(input: &str) -> anyhow::Result<Self> {
        let manifest: Self = toml::from_str(input).context("failed to parse package manifest")?;
        PackageId::new(&manifest.name)
            .with_context(|| format!("invalid package name '{}'", manifest.name))?;

        for framework in &manifest.frameworks {
            if framework.trim().is_empty() {
                return Err(anyhow!(
                    "manifest '{}' declares an empty framework",
                    manifest.name
                ));
            }
        }
        for (path, digest) in &manifest.files {
            validate_payload_path(path).with_context(|| {
                format!("invalid payload path '{path}' in manifest '{}'", manifest.name)
            })?;
            validate_sha256_hex(digest).with_context(|| {
                format!("invalid digest for '{path}' in manifest '{}'", manifest.name)
            })?;
        }
        Ok(manifest)
    }

    pub fn package_id(&self) -> anyhow::Result<PackageId> {
        Ok(PackageId::new(&self.name)?)
    }

    /// Manifests without a framework list are framework-neutral.
    pub fn supports_framework(&self, framework: Option<&str>) -> bool {
        let Some(framework) = framework.map(str::trim).filter(|value| !value.is_empty()) else {
            return true;
        };
        self.frameworks.is_empty()
            || self
                .frameworks
                .iter()
                .any(|declared| declared.trim().eq_ignore_ascii_case(framework))
    }
}

fn validate_payload_path(path: &str) -> anyhow::Result<()> {
    if path.trim().is_empty() {
        return Err(anyhow!("payload path must not be empty"));
    }
    for component in Path::new(path).components() {
        match component {
            Component::Normal(_) | Component::CurDir => {}
            _ => return Err(anyhow!("payload path must be relative and stay inside the package")),
        }
    }
    Ok(())
}

fn validate_sha256_hex(digest: &str) -> anyhow::Result<()> {
    if digest.len() != 64 {
        return Err(anyhow!("sha256 digest must be 64 hex characters"));
    }
    if !digest
        .chars()
        .all(|ch| ch.is_ascii_digit() || ('a'..='f').contains(&ch))
    {
        return Err(anyhow!("sha256 digest must be lowercase hex"));
    }
    Ok(())
}
