mod config;
mod dispatch;
mod render;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Args, Parser, Subcommand};
use clap_complete::Shell;
use tracing_subscriber::EnvFilter;

use crate::render::{resolve_output_style, TerminalRenderer};

#[derive(Parser, Debug)]
#[command(name = "stagepack")]
#[command(version, about = "Transactional staged package installer", long_about = None)]
struct Cli {
    /// Package store root.
    #[arg(long, global = true, env = "STAGEPACK_ROOT")]
    root: Option<PathBuf>,
    /// Configuration file (TOML).
    #[arg(long, global = true, env = "STAGEPACK_CONFIG")]
    config: Option<PathBuf>,
    #[arg(short, long, global = true, action = ArgAction::Count)]
    verbose: u8,
    /// Disable badges, colors and spinners.
    #[arg(long, global = true)]
    plain: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Install a package as `<id>[@<constraint>]`.
    Install(InstallArgs),
    /// List installed packages.
    List {
        id: Option<String>,
        #[arg(long)]
        json: bool,
    },
    /// Remove one installed version.
    Uninstall { id: String, version: String },
    /// Inspect the store and optionally purge leftover staging directories.
    Doctor {
        #[arg(long)]
        purge_staging: bool,
        #[arg(long, default_value_t = 86_400)]
        older_than_secs: u64,
    },
    /// Print a shell completion script.
    Completions { shell: Shell },
}

#[derive(Args, Debug, Clone, Default)]
struct InstallArgs {
    spec: String,
    /// Target framework hint passed to the resolver.
    #[arg(long)]
    framework: Option<String>,
    /// Local feed directory.
    #[arg(long)]
    feed: Option<PathBuf>,
    /// External resolve program; takes precedence over the feed.
    #[arg(long)]
    resolve_command: Option<PathBuf>,
    #[arg(long)]
    source: Option<String>,
    /// Configuration file forwarded to the resolver.
    #[arg(long)]
    config_file: Option<PathBuf>,
    #[arg(long)]
    verbosity: Option<String>,
    #[arg(long)]
    timeout_secs: Option<u64>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let renderer = TerminalRenderer::new(resolve_output_style(
        cli.plain,
        std::env::var_os("NO_COLOR").is_some(),
        std::io::IsTerminal::is_terminal(&std::io::stdout()),
    ));
    match dispatch::run(cli, renderer) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            renderer.print_error(&format!("{err:#}"));
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: u8) {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(default_log_directive(verbose))),
        )
        .init();
}

fn default_log_directive(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "debug",
        _ => "trace",
    }
}

#[cfg(test)]
mod tests;
