mod command;
mod feed;

use stagepack_core::{PackageManifest, ResolvedVersion, VersionConstraint};

pub use command::CommandResolver;
pub use feed::FeedResolver;

/// Picks the highest manifest version accepted by `constraint` that also
/// supports `target_framework`.
pub fn select_highest_compatible<'a>(
    candidates: &'a [PackageManifest],
    constraint: &VersionConstraint,
    target_framework: Option<&str>,
) -> Option<&'a PackageManifest> {
    candidates
        .iter()
        .filter(|m| m.supports_framework(target_framework))
        .filter(|m| constraint.matches(&ResolvedVersion::new(m.version.clone())))
        .max_by(|a, b| a.version.cmp(&b.version))
}
