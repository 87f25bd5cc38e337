mod fs_utils;
mod install;
mod store;
mod transaction;
mod uninstall;

pub use install::{InstallStep, StagingCoordinator};
pub use store::{default_store_root, PackageStore, STAGING_DIR_NAME};
pub use transaction::{run_with_rollback, RollbackScope};
pub use uninstall::uninstall_package;
