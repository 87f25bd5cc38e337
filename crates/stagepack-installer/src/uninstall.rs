use std::fs;
use std::io;
use std::path::PathBuf;

use stagepack_core::{InstallError, InstallResult, PackageId, ResolvedVersion};
use tracing::{info, warn};

use crate::install::{prune_empty_dir, DIRECTORY_RACE_RETRIES};
use crate::PackageStore;

/// Removes one installed version. The versioned directory is first renamed
/// into staging so readers never observe a half-deleted package; the package
/// root goes away with its last version.
pub fn uninstall_package(
    store: &PackageStore,
    package_id: &PackageId,
    version: &ResolvedVersion,
) -> InstallResult<PathBuf> {
    let package_dir = store.versioned_directory(package_id, version);
    let not_installed = || InstallError::NotInstalled {
        package_id: package_id.clone(),
        version: version.clone(),
    };
    if !package_dir.is_dir() {
        return Err(not_installed());
    }

    let staging_root = store.staging_root();
    let prune_staging_root = !staging_root.is_dir();
    let trash_dir = store.new_staging_directory();
    let mut attempt = 0;
    loop {
        fs::create_dir_all(&staging_root)
            .map_err(|err| InstallError::io("create staging root", &staging_root, err))?;
        match fs::rename(&package_dir, &trash_dir) {
            Ok(()) => break,
            Err(err)
                if err.kind() == io::ErrorKind::NotFound
                    && package_dir.is_dir()
                    && attempt < DIRECTORY_RACE_RETRIES =>
            {
                attempt += 1;
            }
            Err(err) => {
                if prune_staging_root {
                    prune_empty_dir(&staging_root);
                }
                if err.kind() == io::ErrorKind::NotFound {
                    return Err(not_installed());
                }
                return Err(InstallError::io(
                    "move package out of the store",
                    &package_dir,
                    err,
                ));
            }
        }
    }

    if let Err(err) = fs::remove_dir_all(&trash_dir) {
        warn!(
            path = %trash_dir.display(),
            error = %err,
            "failed to delete uninstalled package contents"
        );
    }
    prune_empty_dir(&store.root_directory(package_id));
    if prune_staging_root {
        prune_empty_dir(&staging_root);
    }

    info!(package_id = %package_id, version = %version, "uninstalled package");
    Ok(package_dir)
}
