use std::path::{Path, PathBuf};

/// Pass-through options for the resolve step. The coordinator never
/// interprets them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolveOptions {
    pub config_file: Option<PathBuf>,
    pub source: Option<String>,
    pub verbosity: Option<String>,
}

#[derive(Debug, Clone, Copy)]
pub struct ResolveRequest<'a> {
    pub descriptor_path: &'a Path,
    pub output_dir: &'a Path,
    pub options: &'a ResolveOptions,
}

/// Turns a request descriptor into materialized package contents under
/// `output_dir/<package id>/<version>/`.
pub trait Resolve: Send + Sync {
    fn resolve(&self, request: &ResolveRequest<'_>) -> anyhow::Result<()>;
}

impl<F> Resolve for F
where
    F: Fn(&ResolveRequest<'_>) -> anyhow::Result<()> + Send + Sync,
{
    fn resolve(&self, request: &ResolveRequest<'_>) -> anyhow::Result<()> {
        self(request)
    }
}
