use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use stagepack_core::{Resolve, ResolveRequest};
use stagepack_installer::default_store_root;
use stagepack_resolver::{CommandResolver, FeedResolver};

pub(crate) const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct StagepackConfig {
    pub root: Option<PathBuf>,
    pub feed: Option<PathBuf>,
    pub target_framework: Option<String>,
    #[serde(default)]
    pub resolver: ResolverConfig,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub(crate) struct ResolverConfig {
    pub command: Option<PathBuf>,
    #[serde(default)]
    pub args: Vec<String>,
    pub timeout_secs: Option<u64>,
}

impl StagepackConfig {
    pub(crate) fn from_toml_str(input: &str) -> Result<Self> {
        toml::from_str(input).context("failed to parse stagepack config")
    }

    /// Loads `path`, resolving relative paths against its directory. A missing
    /// file is only an error when it was named explicitly.
    pub(crate) fn load(path: &Path, explicit: bool) -> Result<Self> {
        let raw = match fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound && !explicit => {
                return Ok(Self::default());
            }
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to read config: {}", path.display()));
            }
        };

        let mut config = Self::from_toml_str(&raw)
            .with_context(|| format!("failed to load config: {}", path.display()))?;
        if let Some(base) = path.parent() {
            config.root = config.root.map(|root| base.join(root));
            config.feed = config.feed.map(|feed| base.join(feed));
        }
        Ok(config)
    }
}

pub(crate) fn default_config_path() -> Result<PathBuf> {
    let store_root = default_store_root()?;
    store_root
        .parent()
        .map(|base| base.join(CONFIG_FILE_NAME))
        .ok_or_else(|| anyhow!("cannot derive config path from {}", store_root.display()))
}

pub(crate) fn load_config(flag: Option<&Path>) -> Result<StagepackConfig> {
    match flag {
        Some(path) => StagepackConfig::load(path, true),
        None => StagepackConfig::load(&default_config_path()?, false),
    }
}

pub(crate) fn resolve_store_root(flag: Option<&Path>, config: &StagepackConfig) -> Result<PathBuf> {
    if let Some(root) = flag {
        return Ok(root.to_path_buf());
    }
    if let Some(root) = &config.root {
        return Ok(root.clone());
    }
    default_store_root()
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct ResolverOverrides<'a> {
    pub feed: Option<&'a Path>,
    pub command: Option<&'a Path>,
    pub timeout_secs: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum ConfiguredResolver {
    Feed(FeedResolver),
    Command(CommandResolver),
}

impl Resolve for ConfiguredResolver {
    fn resolve(&self, request: &ResolveRequest<'_>) -> Result<()> {
        match self {
            Self::Feed(resolver) => resolver.resolve(request),
            Self::Command(resolver) => resolver.resolve(request),
        }
    }
}

/// A resolve command (flag, then config) wins over a feed (flag, then
/// config).
pub(crate) fn select_resolver(
    overrides: ResolverOverrides<'_>,
    config: &StagepackConfig,
) -> Result<ConfiguredResolver> {
    let timeout_secs = overrides.timeout_secs.or(config.resolver.timeout_secs);
    // Configured args belong to the configured program only.
    let command = match overrides.command {
        Some(program) => Some((program, &[] as &[String])),
        None => config
            .resolver
            .command
            .as_deref()
            .map(|program| (program, config.resolver.args.as_slice())),
    };
    if let Some((program, args)) = command {
        let resolver = CommandResolver::new(program)
            .with_args(args.iter().cloned())
            .with_timeout(timeout_secs.map(Duration::from_secs));
        return Ok(ConfiguredResolver::Command(resolver));
    }

    if let Some(feed) = overrides.feed.or(config.feed.as_deref()) {
        return Ok(ConfiguredResolver::Feed(FeedResolver::new(feed)));
    }

    Err(anyhow!(
        "no resolver configured: pass --feed or --resolve-command, or set 'feed' or 'resolver.command' in the config file"
    ))
}
