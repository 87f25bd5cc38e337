mod descriptor;
mod error;
mod manifest;
mod package;
mod resolve;
mod version;

pub use descriptor::{RequestDescriptor, REQUEST_DESCRIPTOR_FILE_NAME};
pub use error::{InstallError, InstallResult};
pub use manifest::{PackageManifest, PACKAGE_MANIFEST_FILE_NAME};
pub use package::{InstalledPackage, PackageId};
pub use resolve::{Resolve, ResolveOptions, ResolveRequest};
pub use version::{ResolvedVersion, VersionConstraint};
