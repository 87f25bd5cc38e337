use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use semver::{BuildMetadata, Version, VersionReq};

use crate::InstallError;

/// Requested version range. An absent requirement means any release version
/// and renders as the `*` wildcard.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VersionConstraint {
    requirement: Option<VersionReq>,
}

impl VersionConstraint {
    pub fn any() -> Self {
        Self { requirement: None }
    }

    pub fn new(requirement: VersionReq) -> Self {
        if requirement == VersionReq::STAR {
            return Self::any();
        }
        Self {
            requirement: Some(requirement),
        }
    }

    pub fn parse(input: &str) -> Result<Self, InstallError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || trimmed == "*" {
            return Ok(Self::any());
        }

        let requirement =
            VersionReq::parse(trimmed).map_err(|source| InstallError::InvalidVersionConstraint {
                value: input.to_string(),
                source,
            })?;
        Ok(Self::new(requirement))
    }

    pub fn is_any(&self) -> bool {
        self.requirement.is_none()
    }

    pub fn matches(&self, version: &ResolvedVersion) -> bool {
        self.requirement
            .as_ref()
            .unwrap_or(&VersionReq::STAR)
            .matches(version.as_semver())
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.requirement {
            Some(requirement) => write!(f, "{requirement}"),
            None => f.write_str("*"),
        }
    }
}

impl FromStr for VersionConstraint {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Concrete version produced by a resolve step. Build metadata is dropped, so
/// `1.0.0+build.7` and `1.0.0` are the same installed version. Its display
/// form is the normalized string used as the versioned directory name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResolvedVersion(Version);

impl ResolvedVersion {
    pub fn new(version: Version) -> Self {
        Self(Version {
            build: BuildMetadata::EMPTY,
            ..version
        })
    }

    pub fn parse(input: &str) -> Result<Self, InstallError> {
        Version::parse(input.trim())
            .map(Self::new)
            .map_err(|source| InstallError::InvalidVersion {
                value: input.to_string(),
                source,
            })
    }

    pub fn as_semver(&self) -> &Version {
        &self.0
    }

    pub fn to_normalized_string(&self) -> String {
        self.0.to_string()
    }
}

impl fmt::Display for ResolvedVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ResolvedVersion {
    type Err = InstallError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl From<Version> for ResolvedVersion {
    fn from(value: Version) -> Self {
        Self::new(value)
    }
}

impl Ord for ResolvedVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.cmp(&other.0)
    }
}

impl PartialOrd for ResolvedVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
