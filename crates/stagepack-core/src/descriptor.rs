use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::{InstallError, PackageId, VersionConstraint};

pub const REQUEST_DESCRIPTOR_FILE_NAME: &str = "stagepack.request";

/// The single-record request handed to a resolve collaborator:
/// `<package id>:<constraint or *>:<target framework>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    pub package_id: PackageId,
    pub constraint: VersionConstraint,
    pub target_framework: Option<String>,
}

impl RequestDescriptor {
    /// Fails when the framework hint would break the one-line record.
    pub fn new(
        package_id: PackageId,
        constraint: VersionConstraint,
        target_framework: Option<&str>,
    ) -> Result<Self, InstallError> {
        let target_framework = target_framework
            .map(str::trim)
            .filter(|value| !value.is_empty());
        if let Some(value) = target_framework {
            if value.chars().any(char::is_control) {
                return Err(InstallError::InvalidTargetFramework {
                    value: value.to_string(),
                    reason: "must not contain control characters",
                });
            }
        }

        Ok(Self {
            package_id,
            constraint,
            target_framework: target_framework.map(str::to_string),
        })
    }

    pub fn render(&self) -> String {
        format!(
            "{}:{}:{}\n",
            self.package_id,
            self.constraint,
            self.target_framework.as_deref().unwrap_or_default()
        )
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let line = raw
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| anyhow!("request descriptor is empty"))?;

        let mut fields = line.splitn(3, ':');
        let (Some(id), Some(constraint), Some(framework)) =
            (fields.next(), fields.next(), fields.next())
        else {
            return Err(anyhow!(
                "request descriptor must have the form '<id>:<constraint>:<framework>': {line}"
            ));
        };

        let package_id = PackageId::new(id)
            .with_context(|| format!("invalid package id in request descriptor: {line}"))?;
        let constraint = VersionConstraint::parse(constraint)
            .with_context(|| format!("invalid constraint in request descriptor: {line}"))?;
        Self::new(package_id, constraint, Some(framework))
            .with_context(|| format!("invalid target framework in request descriptor: {line}"))
    }

    pub fn read_from(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read request descriptor: {}", path.display()))?;
        Self::parse(&raw)
            .with_context(|| format!("failed to parse request descriptor: {}", path.display()))
    }
}
