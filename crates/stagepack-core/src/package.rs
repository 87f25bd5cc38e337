use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::{InstallError, ResolvedVersion};

/// Case-normalized package identifier, safe to use as a single path component.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageId(String);

impl PackageId {
    pub fn new(value: &str) -> Result<Self, InstallError> {
        let trimmed = value.trim();
        let invalid = |reason| InstallError::InvalidPackageId {
            value: value.to_string(),
            reason,
        };

        if trimmed.is_empty() {
            return Err(invalid("package id must not be empty"));
        }
        if trimmed.starts_with('.') {
            return Err(invalid("package id must not start with '.'"));
        }
        if trimmed.contains(['/', '\\']) {
            return Err(invalid("package id must not contain path separators"));
        }
        if trimmed.contains(':') {
            return Err(invalid("package id must not contain ':'"));
        }
        if trimmed
            .chars()
            .any(|ch| ch.is_control() || ch.is_whitespace())
        {
            return Err(invalid(
                "package id must not contain whitespace or control characters",
            ));
        }

        Ok(Self(trimmed.to_lowercase()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PackageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for PackageId {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl AsRef<str> for PackageId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// A committed installation: the versioned directory a successful install
/// promoted its staging directory into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstalledPackage {
    package_id: PackageId,
    version: ResolvedVersion,
    directory: PathBuf,
}

impl InstalledPackage {
    pub fn new(package_id: PackageId, version: ResolvedVersion, directory: PathBuf) -> Self {
        Self {
            package_id,
            version,
            directory,
        }
    }

    pub fn package_id(&self) -> &PackageId {
        &self.package_id
    }

    pub fn version(&self) -> &ResolvedVersion {
        &self.version
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }
}
