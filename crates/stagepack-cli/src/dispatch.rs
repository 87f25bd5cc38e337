use std::io::Write;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::CommandFactory;
use clap_complete::Shell;
use serde::Serialize;
use stagepack_core::{
    InstalledPackage, PackageId, ResolveOptions, ResolvedVersion, VersionConstraint,
};
use stagepack_installer::{uninstall_package, PackageStore, StagingCoordinator};
use tracing::debug;

use crate::config::{
    load_config, resolve_store_root, select_resolver, ResolverOverrides, StagepackConfig,
};
use crate::render::{OutputStyle, TerminalRenderer};
use crate::{Cli, Commands, InstallArgs};

pub(crate) fn run(cli: Cli, renderer: TerminalRenderer) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        return write_completions(shell, &mut std::io::stdout());
    }

    let config = load_config(cli.config.as_deref())?;
    let store = PackageStore::new(resolve_store_root(cli.root.as_deref(), &config)?);
    debug!(root = %store.root().display(), "using package store");

    match cli.command {
        Commands::Install(args) => run_install(&store, &config, &args, renderer),
        Commands::List { id, json } => run_list(&store, id.as_deref(), json, renderer),
        Commands::Uninstall { id, version } => run_uninstall(&store, &id, &version, renderer),
        Commands::Doctor {
            purge_staging,
            older_than_secs,
        } => run_doctor(
            &store,
            purge_staging,
            Duration::from_secs(older_than_secs),
            renderer,
        ),
        Commands::Completions { .. } => Ok(()),
    }
}

pub(crate) fn parse_spec(spec: &str) -> Result<(PackageId, VersionConstraint)> {
    let (name, req) = match spec.split_once('@') {
        Some((name, req)) => (name, req),
        None => (spec, "*"),
    };
    let package_id =
        PackageId::new(name).with_context(|| format!("invalid package spec '{spec}'"))?;
    let constraint = VersionConstraint::parse(req)
        .with_context(|| format!("invalid version requirement for '{name}': {req}"))?;
    Ok((package_id, constraint))
}

fn run_install(
    store: &PackageStore,
    config: &StagepackConfig,
    args: &InstallArgs,
    renderer: TerminalRenderer,
) -> Result<()> {
    let (package_id, constraint) = parse_spec(&args.spec)?;
    let resolver = select_resolver(
        ResolverOverrides {
            feed: args.feed.as_deref(),
            command: args.resolve_command.as_deref(),
            timeout_secs: args.timeout_secs,
        },
        config,
    )?;
    let framework = args
        .framework
        .as_deref()
        .or(config.target_framework.as_deref());
    let options = ResolveOptions {
        config_file: args.config_file.clone(),
        source: args.source.clone(),
        verbosity: args.verbosity.clone(),
    };

    let coordinator = StagingCoordinator::new(store.clone(), resolver);
    let spinner = renderer.start_spinner(&format!("installing {package_id} {constraint}"));
    let result = coordinator.install(&package_id, &constraint, framework, &options);
    spinner.finish();
    let installed = result?;

    renderer.print_status(
        "ok",
        &format!(
            "installed {} {} -> {}",
            installed.package_id(),
            installed.version(),
            installed.directory().display()
        ),
    );
    Ok(())
}

#[derive(Debug, Serialize, PartialEq, Eq)]
pub(crate) struct ListedPackage {
    pub id: String,
    pub version: String,
    pub directory: String,
}

impl From<&InstalledPackage> for ListedPackage {
    fn from(package: &InstalledPackage) -> Self {
        Self {
            id: package.package_id().to_string(),
            version: package.version().to_string(),
            directory: package.directory().display().to_string(),
        }
    }
}

fn run_list(
    store: &PackageStore,
    id: Option<&str>,
    json: bool,
    renderer: TerminalRenderer,
) -> Result<()> {
    let filter = id.map(PackageId::new).transpose()?;
    let packages = store
        .installed_packages()?
        .iter()
        .filter(|package| filter.as_ref().map_or(true, |id| package.package_id() == id))
        .map(ListedPackage::from)
        .collect::<Vec<_>>();

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&packages).context("failed to encode package list")?
        );
        return Ok(());
    }

    if packages.is_empty() {
        renderer.print_status("warn", "no packages installed");
        return Ok(());
    }
    renderer.print_lines(&format_list_lines(&packages, renderer.style()));
    Ok(())
}

pub(crate) fn format_list_lines(packages: &[ListedPackage], style: OutputStyle) -> Vec<String> {
    match style {
        OutputStyle::Plain => packages
            .iter()
            .map(|package| format!("{} {}", package.id, package.version))
            .collect(),
        OutputStyle::Rich => {
            let width = packages
                .iter()
                .map(|package| package.id.len())
                .max()
                .unwrap_or_default();
            packages
                .iter()
                .map(|package| {
                    format!(
                        "{:<width$}  {:<12} {}",
                        package.id, package.version, package.directory
                    )
                })
                .collect()
        }
    }
}

fn run_uninstall(
    store: &PackageStore,
    id: &str,
    version: &str,
    renderer: TerminalRenderer,
) -> Result<()> {
    let package_id = PackageId::new(id)?;
    let version = ResolvedVersion::parse(version)?;
    uninstall_package(store, &package_id, &version)?;
    renderer.print_status("ok", &format!("uninstalled {package_id} {version}"));
    Ok(())
}

fn run_doctor(
    store: &PackageStore,
    purge_staging: bool,
    older_than: Duration,
    renderer: TerminalRenderer,
) -> Result<()> {
    renderer.print_section("doctor");
    println!("root: {}", store.root().display());
    println!("staging: {}", store.staging_root().display());
    println!("installed: {}", store.installed_packages()?.len());

    let leftovers = store.staging_directories()?;
    println!("staging leftovers: {}", leftovers.len());
    if purge_staging {
        let removed = store.purge_stale_staging(older_than)?;
        renderer.print_status(
            "ok",
            &format!(
                "purged {} staging director{} older than {}s",
                removed.len(),
                if removed.len() == 1 { "y" } else { "ies" },
                older_than.as_secs()
            ),
        );
    } else if !leftovers.is_empty() {
        renderer.print_status(
            "warn",
            "staging leftovers found; run 'stagepack doctor --purge-staging' to remove them",
        );
    }
    Ok(())
}

pub(crate) fn write_completions<W: Write>(shell: Shell, writer: &mut W) -> Result<()> {
    let mut command = Cli::command();
    let mut generated = Vec::new();
    clap_complete::generate(shell, &mut command, "stagepack", &mut generated);
    if generated.is_empty() {
        return Err(anyhow!("no completion script generated for {shell}"));
    }
    writer
        .write_all(&generated)
        .with_context(|| "failed writing generated completion script")?;
    Ok(())
}
