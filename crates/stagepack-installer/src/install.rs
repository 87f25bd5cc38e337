use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use stagepack_core::{
    InstallError, InstallResult, InstalledPackage, PackageId, RequestDescriptor, Resolve,
    ResolveOptions, ResolveRequest, ResolvedVersion, VersionConstraint,
    REQUEST_DESCRIPTOR_FILE_NAME,
};
use tracing::{debug, info, info_span, warn};

use crate::fs_utils::{remove_dir_all_if_exists, remove_dir_if_empty};
use crate::transaction::run_with_rollback;
use crate::{uninstall_package, PackageStore};

pub(crate) const DIRECTORY_RACE_RETRIES: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    CreateStaging,
    WriteDescriptor,
    Resolve,
    ReadVersion,
    CheckConflict,
    EnsureRoot,
    Promote,
    Complete,
}

impl InstallStep {
    pub const ALL: [InstallStep; 8] = [
        Self::CreateStaging,
        Self::WriteDescriptor,
        Self::Resolve,
        Self::ReadVersion,
        Self::CheckConflict,
        Self::EnsureRoot,
        Self::Promote,
        Self::Complete,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::CreateStaging => "create_staging",
            Self::WriteDescriptor => "write_descriptor",
            Self::Resolve => "resolve",
            Self::ReadVersion => "read_version",
            Self::CheckConflict => "check_conflict",
            Self::EnsureRoot => "ensure_root",
            Self::Promote => "promote",
            Self::Complete => "complete",
        }
    }
}

/// Drives the staged install transaction against a [`PackageStore`], using an
/// injected resolve collaborator to populate the staging directory.
#[derive(Debug, Clone)]
pub struct StagingCoordinator<R> {
    store: PackageStore,
    resolver: R,
}

impl<R: Resolve> StagingCoordinator<R> {
    pub fn new(store: PackageStore, resolver: R) -> Self {
        Self { store, resolver }
    }

    pub fn store(&self) -> &PackageStore {
        &self.store
    }

    /// Installs `package_id` as a single all-or-nothing transaction. On any
    /// error the store is left as it was before the call.
    pub fn install(
        &self,
        package_id: &PackageId,
        constraint: &VersionConstraint,
        target_framework: Option<&str>,
        options: &ResolveOptions,
    ) -> InstallResult<InstalledPackage> {
        self.install_with_hooks(package_id, constraint, target_framework, options, |_| Ok(()))
    }

    /// Removes one installed version. See [`uninstall_package`].
    pub fn uninstall(
        &self,
        package_id: &PackageId,
        version: &ResolvedVersion,
    ) -> InstallResult<PathBuf> {
        uninstall_package(&self.store, package_id, version)
    }

    pub(crate) fn install_with_hooks<H>(
        &self,
        package_id: &PackageId,
        constraint: &VersionConstraint,
        target_framework: Option<&str>,
        options: &ResolveOptions,
        mut before_step: H,
    ) -> InstallResult<InstalledPackage>
    where
        H: FnMut(InstallStep) -> InstallResult<()>,
    {
        let span = info_span!("install", package_id = %package_id);
        let _entered = span.enter();

        let descriptor =
            RequestDescriptor::new(package_id.clone(), constraint.clone(), target_framework)?;
        let package_root = self.store.root_directory(package_id);
        let staging_root = self.store.staging_root();
        // A staging root that predates this call is left in place.
        let prune_staging_root = !staging_root.is_dir();

        let installed = run_with_rollback(
            |target: Option<&Path>| {
                rollback_install(target, &package_root, &staging_root, prune_staging_root)
            },
            |scope| -> InstallResult<InstalledPackage> {
                before_step(InstallStep::CreateStaging)?;
                let staging_dir = self.store.new_staging_directory();
                create_staging_directory(&staging_dir)?;
                scope.track(&staging_dir);
                debug!(staging_dir = %staging_dir.display(), "created staging directory");

                before_step(InstallStep::WriteDescriptor)?;
                let descriptor_path = staging_dir.join(REQUEST_DESCRIPTOR_FILE_NAME);
                fs::write(&descriptor_path, descriptor.render()).map_err(|err| {
                    InstallError::io("write request descriptor", &descriptor_path, err)
                })?;

                before_step(InstallStep::Resolve)?;
                debug!(constraint = %constraint, "resolving package");
                self.resolver
                    .resolve(&ResolveRequest {
                        descriptor_path: &descriptor_path,
                        output_dir: &staging_dir,
                        options,
                    })
                    .map_err(|source| InstallError::ResolutionFailed {
                        package_id: package_id.clone(),
                        source,
                    })?;

                before_step(InstallStep::ReadVersion)?;
                let version = self.store.read_resolved_version(&staging_dir, package_id)?;
                debug!(version = %version, "resolve step produced version");

                before_step(InstallStep::CheckConflict)?;
                let package_dir = self.store.versioned_directory(package_id, &version);
                if package_dir.exists() {
                    return Err(InstallError::Conflict {
                        package_id: package_id.clone(),
                        version,
                    });
                }

                before_step(InstallStep::EnsureRoot)?;
                fs::create_dir_all(&package_root).map_err(|err| {
                    InstallError::io("create package root", &package_root, err)
                })?;

                before_step(InstallStep::Promote)?;
                promote(&staging_dir, &package_dir, &package_root, package_id, &version)?;
                scope.track(&package_dir);

                before_step(InstallStep::Complete)?;
                Ok(InstalledPackage::new(package_id.clone(), version, package_dir))
            },
        )?;

        if prune_staging_root {
            prune_empty_dir(&staging_root);
        }
        info!(
            version = %installed.version(),
            directory = %installed.directory().display(),
            "installed package"
        );
        Ok(installed)
    }
}

fn create_staging_directory(staging_dir: &Path) -> InstallResult<()> {
    let Some(staging_root) = staging_dir.parent() else {
        return Err(InstallError::io(
            "create staging directory",
            staging_dir,
            io::Error::new(io::ErrorKind::InvalidInput, "staging path has no parent"),
        ));
    };

    let mut attempt = 0;
    loop {
        fs::create_dir_all(staging_root)
            .map_err(|err| InstallError::io("create staging root", staging_root, err))?;
        match fs::create_dir(staging_dir) {
            Ok(()) => return Ok(()),
            // A concurrent rollback pruned the empty staging root in between.
            Err(err) if err.kind() == io::ErrorKind::NotFound && attempt < DIRECTORY_RACE_RETRIES => {
                attempt += 1;
            }
            Err(err) => return Err(InstallError::io("create staging directory", staging_dir, err)),
        }
    }
}

/// Renames the staging directory into its final place. An occupied target
/// makes the rename fail instead of clobbering it, and is reported as a
/// conflict.
fn promote(
    staging_dir: &Path,
    package_dir: &Path,
    package_root: &Path,
    package_id: &PackageId,
    version: &ResolvedVersion,
) -> InstallResult<()> {
    let mut attempt = 0;
    loop {
        match fs::rename(staging_dir, package_dir) {
            Ok(()) => return Ok(()),
            Err(_) if package_dir.exists() => {
                return Err(InstallError::Conflict {
                    package_id: package_id.clone(),
                    version: version.clone(),
                });
            }
            Err(err)
                if err.kind() == io::ErrorKind::NotFound
                    && staging_dir.exists()
                    && attempt < DIRECTORY_RACE_RETRIES =>
            {
                attempt += 1;
                fs::create_dir_all(package_root).map_err(|err| {
                    InstallError::io("create package root", package_root, err)
                })?;
            }
            Err(err) => {
                return Err(InstallError::io(
                    "promote staging directory",
                    package_dir,
                    err,
                ));
            }
        }
    }
}

fn rollback_install(
    target: Option<&Path>,
    package_root: &Path,
    staging_root: &Path,
    prune_staging_root: bool,
) {
    if let Some(target) = target {
        match remove_dir_all_if_exists(target) {
            Ok(true) => debug!(path = %target.display(), "rolled back directory"),
            Ok(false) => {}
            Err(err) => warn!(
                path = %target.display(),
                error = %err,
                "failed to remove directory during rollback"
            ),
        }
    }

    prune_empty_dir(package_root);
    if prune_staging_root {
        prune_empty_dir(staging_root);
    }
}

pub(crate) fn prune_empty_dir(path: &Path) {
    match remove_dir_if_empty(path) {
        Ok(true) => debug!(path = %path.display(), "removed empty directory"),
        Ok(false) => {}
        Err(err) => warn!(
            path = %path.display(),
            error = %err,
            "failed to remove empty directory"
        ),
    }
}
