use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use stagepack_core::{
    PackageId, PackageManifest, RequestDescriptor, Resolve, ResolveRequest, ResolvedVersion,
    PACKAGE_MANIFEST_FILE_NAME,
};
use stagepack_security::verify_sha256_file;
use tracing::{debug, info};

use crate::select_highest_compatible;

/// Resolves packages from a local directory feed laid out as
/// `<feed>/<package id>/<version>/package.toml` next to the payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedResolver {
    feed_root: PathBuf,
}

impl FeedResolver {
    pub fn new(feed_root: impl Into<PathBuf>) -> Self {
        Self {
            feed_root: feed_root.into(),
        }
    }

    pub fn feed_root(&self) -> &Path {
        &self.feed_root
    }

    /// Every manifest the feed publishes for `package_id`, sorted by version.
    pub fn available_versions(
        &self,
        feed_root: &Path,
        package_id: &PackageId,
    ) -> Result<Vec<PackageManifest>> {
        let package_dir = feed_root.join(package_id.as_str());
        if !package_dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut manifests = Vec::new();
        for entry in fs::read_dir(&package_dir)
            .with_context(|| format!("failed to read feed directory: {}", package_dir.display()))?
        {
            let entry = entry?;
            let manifest_path = entry.path().join(PACKAGE_MANIFEST_FILE_NAME);
            if !manifest_path.is_file() {
                continue;
            }

            let raw = fs::read_to_string(&manifest_path).with_context(|| {
                format!("failed to read package manifest: {}", manifest_path.display())
            })?;
            let manifest = PackageManifest::from_toml_str(&raw).with_context(|| {
                format!("failed to load package manifest: {}", manifest_path.display())
            })?;

            if manifest.package_id()? != *package_id {
                debug!(
                    manifest = %manifest_path.display(),
                    name = %manifest.name,
                    "skipping manifest published under another package id"
                );
                continue;
            }
            let normalized = ResolvedVersion::new(manifest.version.clone()).to_normalized_string();
            if entry.file_name().to_str() != Some(normalized.as_str()) {
                debug!(
                    manifest = %manifest_path.display(),
                    version = %normalized,
                    "skipping manifest whose directory does not match its version"
                );
                continue;
            }
            manifests.push(manifest);
        }

        manifests.sort_by(|a, b| a.version.cmp(&b.version));
        Ok(manifests)
    }
}

impl Resolve for FeedResolver {
    fn resolve(&self, request: &ResolveRequest<'_>) -> Result<()> {
        let descriptor = RequestDescriptor::read_from(request.descriptor_path)?;
        let feed_root = request
            .options
            .source
            .as_deref()
            .map(PathBuf::from)
            .unwrap_or_else(|| self.feed_root.clone());
        let package_id = &descriptor.package_id;

        let candidates = self.available_versions(&feed_root, package_id)?;
        if candidates.is_empty() {
            return Err(anyhow!(
                "package '{package_id}' was not found in feed {}",
                feed_root.display()
            ));
        }

        let framework = descriptor.target_framework.as_deref();
        let manifest = select_highest_compatible(&candidates, &descriptor.constraint, framework)
            .ok_or_else(|| {
                anyhow!(
                    "no version of '{package_id}' in feed {} satisfies '{}' for framework '{}'",
                    feed_root.display(),
                    descriptor.constraint,
                    framework.unwrap_or("any")
                )
            })?;

        let version = ResolvedVersion::new(manifest.version.clone()).to_normalized_string();
        let source_dir = feed_root.join(package_id.as_str()).join(&version);
        let output_dir = request
            .output_dir
            .join(package_id.as_str())
            .join(&version);
        copy_dir_recursive(&source_dir, &output_dir)?;
        verify_payload(manifest, &output_dir)?;

        info!(
            package_id = %package_id,
            version = %version,
            feed = %feed_root.display(),
            "resolved package from feed"
        );
        Ok(())
    }
}

fn verify_payload(manifest: &PackageManifest, package_dir: &Path) -> Result<()> {
    for (relative, expected) in &manifest.files {
        let path = package_dir.join(relative);
        if !path.is_file() {
            return Err(anyhow!(
                "payload file '{relative}' listed by '{}' {} is missing",
                manifest.name,
                manifest.version
            ));
        }
        if !verify_sha256_file(&path, expected)? {
            return Err(anyhow!(
                "sha256 mismatch for payload file '{relative}' of '{}' {}",
                manifest.name,
                manifest.version
            ));
        }
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    fs::create_dir_all(dst).with_context(|| format!("failed to create {}", dst.display()))?;
    for entry in fs::read_dir(src).with_context(|| format!("failed to read {}", src.display()))? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());
        let metadata = fs::symlink_metadata(&src_path)
            .with_context(|| format!("failed to stat {}", src_path.display()))?;
        if metadata.is_dir() {
            copy_dir_recursive(&src_path, &dst_path)?;
            continue;
        }
        if metadata.file_type().is_symlink() {
            return Err(anyhow!(
                "feed payload must not contain symlinks: {}",
                src_path.display()
            ));
        }

        fs::copy(&src_path, &dst_path).with_context(|| {
            format!(
                "failed to copy {} to {}",
                src_path.display(),
                dst_path.display()
            )
        })?;
    }
    Ok(())
}
