use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::{PackageId, ResolvedVersion};

pub type InstallResult<T> = Result<T, InstallError>;

/// Failures surfaced by the install and uninstall transactions.
///
/// Every variant raised after the staging directory exists is reported only
/// after the transaction has rolled back.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("invalid package id '{value}': {reason}")]
    InvalidPackageId { value: String, reason: &'static str },

    #[error("invalid version constraint '{value}'")]
    InvalidVersionConstraint {
        value: String,
        #[source]
        source: semver::Error,
    },

    #[error("invalid version '{value}'")]
    InvalidVersion {
        value: String,
        #[source]
        source: semver::Error,
    },

    #[error("invalid target framework {value:?}: {reason}")]
    InvalidTargetFramework { value: String, reason: &'static str },

    #[error("failed to resolve package '{package_id}'")]
    ResolutionFailed {
        package_id: PackageId,
        #[source]
        source: anyhow::Error,
    },

    #[error("package '{package_id}' version '{version}' is already installed")]
    Conflict {
        package_id: PackageId,
        version: ResolvedVersion,
    },

    #[error(
        "resolve output for '{package_id}' is malformed in {}: {reason}",
        staging_dir.display()
    )]
    MalformedResolveOutput {
        package_id: PackageId,
        staging_dir: PathBuf,
        reason: String,
    },

    #[error("failed to {action}: {}", path.display())]
    Io {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("package '{package_id}' version '{version}' is not installed")]
    NotInstalled {
        package_id: PackageId,
        version: ResolvedVersion,
    },
}

impl InstallError {
    pub fn io(action: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            action,
            path: path.into(),
            source,
        }
    }

    /// Whether repeating the same call can succeed without uninstalling
    /// anything first. Resolution and environment failures qualify; conflicts,
    /// contract violations and invalid input do not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::ResolutionFailed { .. } | Self::Io { .. })
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}
