use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

use anyhow::{Context, Result};
use stagepack_core::{InstallError, InstallResult, InstalledPackage, PackageId, ResolvedVersion};
use tracing::{debug, warn};
use uuid::Uuid;

pub const STAGING_DIR_NAME: &str = ".staging";

/// On-disk layout of installed packages:
///
/// ```text
/// <root>/<package id>/            package root
/// <root>/<package id>/<version>/  installed package
/// <root>/.staging/<random>/       in-flight install
/// ```
///
/// Transactions remove `.staging` when it is empty afterwards, but only if
/// the same call created it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackageStore {
    root: PathBuf,
}

impl PackageStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn staging_root(&self) -> PathBuf {
        self.root.join(STAGING_DIR_NAME)
    }

    pub fn root_directory(&self, package_id: &PackageId) -> PathBuf {
        self.root.join(package_id.as_str())
    }

    /// A fresh staging path. The directory is not created here.
    pub fn new_staging_directory(&self) -> PathBuf {
        self.staging_root()
            .join(Uuid::new_v4().simple().to_string())
    }

    pub fn versioned_directory(&self, package_id: &PackageId, version: &ResolvedVersion) -> PathBuf {
        self.root_directory(package_id)
            .join(version.to_normalized_string())
    }

    /// Reads the single version the resolve step materialized under
    /// `<staging>/<package id>/<version>/`.
    pub fn read_resolved_version(
        &self,
        staging_dir: &Path,
        package_id: &PackageId,
    ) -> InstallResult<ResolvedVersion> {
        let resolved_root = staging_dir.join(package_id.as_str());
        let malformed = |reason: String| InstallError::MalformedResolveOutput {
            package_id: package_id.clone(),
            staging_dir: staging_dir.to_path_buf(),
            reason,
        };

        let entries = match fs::read_dir(&resolved_root) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                return Err(malformed(format!(
                    "resolved package directory is missing: {}",
                    resolved_root.display()
                )));
            }
            Err(err) => {
                return Err(InstallError::io(
                    "read resolved package directory",
                    &resolved_root,
                    err,
                ));
            }
        };

        let mut versions = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| {
                InstallError::io("read resolved package directory", &resolved_root, err)
            })?;
            let file_type = entry
                .file_type()
                .map_err(|err| InstallError::io("inspect resolved entry", entry.path(), err))?;
            if !file_type.is_dir() {
                continue;
            }

            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else {
                return Err(malformed(format!(
                    "version directory name is not valid UTF-8: {}",
                    entry.path().display()
                )));
            };
            // Build metadata in the name is accepted and dropped.
            let version = ResolvedVersion::parse(name)
                .map_err(|_| malformed(format!("'{name}' is not a valid version")))?;
            versions.push(version);
        }

        match versions.len() {
            0 => Err(malformed("no version directory was produced".to_string())),
            1 => Ok(versions.remove(0)),
            _ => {
                versions.sort();
                let listed = versions
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ");
                Err(malformed(format!("expected one version, found {listed}")))
            }
        }
    }

    pub fn installed_versions(&self, package_id: &PackageId) -> InstallResult<Vec<ResolvedVersion>> {
        let package_root = self.root_directory(package_id);
        let mut versions = Vec::new();
        for name in list_directory_names(&package_root)? {
            match ResolvedVersion::parse(&name) {
                Ok(version) if version.to_normalized_string() == name => versions.push(version),
                _ => debug!(
                    path = %package_root.join(&name).display(),
                    "skipping non-version entry in package root"
                ),
            }
        }
        versions.sort();
        Ok(versions)
    }

    pub fn installed_package(
        &self,
        package_id: &PackageId,
        version: &ResolvedVersion,
    ) -> Option<InstalledPackage> {
        let directory = self.versioned_directory(package_id, version);
        directory
            .is_dir()
            .then(|| InstalledPackage::new(package_id.clone(), version.clone(), directory))
    }

    pub fn installed_packages(&self) -> InstallResult<Vec<InstalledPackage>> {
        let mut packages = Vec::new();
        for name in list_directory_names(&self.root)? {
            if name == STAGING_DIR_NAME {
                continue;
            }
            let Ok(package_id) = PackageId::new(&name) else {
                continue;
            };
            if package_id.as_str() != name {
                continue;
            }
            for version in self.installed_versions(&package_id)? {
                let directory = self.versioned_directory(&package_id, &version);
                packages.push(InstalledPackage::new(package_id.clone(), version, directory));
            }
        }
        packages.sort_by(|a, b| {
            a.package_id()
                .cmp(b.package_id())
                .then_with(|| a.version().cmp(b.version()))
        });
        Ok(packages)
    }

    pub fn staging_directories(&self) -> InstallResult<Vec<PathBuf>> {
        let staging_root = self.staging_root();
        Ok(list_directory_names(&staging_root)?
            .into_iter()
            .map(|name| staging_root.join(name))
            .collect())
    }

    /// Removes staging directories last modified at least `older_than` ago.
    /// Younger directories may belong to installs still in flight.
    pub fn purge_stale_staging(&self, older_than: Duration) -> InstallResult<Vec<PathBuf>> {
        let now = SystemTime::now();
        let mut removed = Vec::new();
        for path in self.staging_directories()? {
            let age = fs::metadata(&path)
                .and_then(|metadata| metadata.modified())
                .map(|modified| now.duration_since(modified).unwrap_or_default());
            let age = match age {
                Ok(age) => age,
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to stat staging directory");
                    continue;
                }
            };
            if age < older_than {
                continue;
            }

            match fs::remove_dir_all(&path) {
                Ok(()) => {
                    debug!(path = %path.display(), "purged stale staging directory");
                    removed.push(path);
                }
                Err(err) if err.kind() == io::ErrorKind::NotFound => {}
                Err(err) => {
                    warn!(path = %path.display(), error = %err, "failed to purge staging directory");
                }
            }
        }
        removed.sort();
        Ok(removed)
    }
}

pub fn default_store_root() -> Result<PathBuf> {
    if cfg!(windows) {
        let app_data = std::env::var("LOCALAPPDATA")
            .context("LOCALAPPDATA is not set; cannot resolve Windows store root")?;
        return Ok(PathBuf::from(app_data).join("Stagepack").join("packages"));
    }

    let home = std::env::var("HOME").context("HOME is not set; cannot resolve store root")?;
    Ok(PathBuf::from(home).join(".stagepack").join("packages"))
}

fn list_directory_names(dir: &Path) -> InstallResult<Vec<String>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(InstallError::io("read directory", dir, err)),
    };

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| InstallError::io("read directory", dir, err))?;
        let file_type = entry
            .file_type()
            .map_err(|err| InstallError::io("inspect directory entry", entry.path(), err))?;
        if !file_type.is_dir() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            names.push(name.to_string());
        }
    }
    names.sort();
    Ok(names)
}
