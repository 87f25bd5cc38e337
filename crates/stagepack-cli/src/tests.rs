use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use clap::{CommandFactory, Parser};
use clap_complete::Shell;
use stagepack_core::{InstallError, PackageId, ResolvedVersion};
use stagepack_installer::PackageStore;

use crate::config::{
    resolve_store_root, select_resolver, ConfiguredResolver, ResolverOverrides, StagepackConfig,
};
use crate::dispatch::{self, format_list_lines, parse_spec, write_completions, ListedPackage};
use crate::render::{render_status_line, resolve_output_style, OutputStyle, TerminalRenderer};
use crate::{default_log_directive, Cli, Commands};

static TEST_DIR_COUNTER: AtomicU64 = AtomicU64::new(0);

fn test_dir() -> PathBuf {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .expect("system time")
        .as_nanos();
    let sequence = TEST_DIR_COUNTER.fetch_add(1, Ordering::Relaxed);
    let mut path = std::env::temp_dir();
    path.push(format!(
        "stagepack-cli-tests-{}-{}-{}",
        std::process::id(),
        nanos,
        sequence
    ));
    fs::create_dir_all(&path).expect("must create test dir");
    path
}

fn publish(feed: &Path, id: &str, version: &str) {
    let version_dir = feed.join(id).join(version);
    fs::create_dir_all(&version_dir).expect("must create feed version");
    fs::write(
        version_dir.join("package.toml"),
        format!("name = \"{id}\"\nversion = \"{version}\"\n"),
    )
    .expect("must write manifest");
    fs::write(version_dir.join("tool.txt"), format!("{id} {version}")).expect("must write payload");
}

#[test]
fn cli_definition_is_valid() {
    Cli::command().debug_assert();
}

#[test]
fn parse_spec_defaults_to_any_version() {
    let (id, constraint) = parse_spec("Demo.Tool").expect("spec must parse");
    assert_eq!(id.as_str(), "demo.tool");
    assert!(constraint.is_any());
}

#[test]
fn parse_spec_reads_constraint() {
    let (id, constraint) = parse_spec("demo.tool@^1.2").expect("spec must parse");
    assert_eq!(id.as_str(), "demo.tool");
    assert_eq!(constraint.to_string(), "^1.2");
}

#[test]
fn parse_spec_rejects_bad_input() {
    let err = parse_spec("@1.0.0").expect_err("empty id must fail");
    assert!(err.to_string().contains("invalid package spec"));

    let err = parse_spec("demo.tool@not-a-version").expect_err("bad constraint must fail");
    assert_eq!(
        err.to_string(),
        "invalid version requirement for 'demo.tool': not-a-version"
    );
}

#[test]
fn install_args_parse_with_resolver_flags() {
    let cli = Cli::try_parse_from([
        "stagepack",
        "install",
        "demo.tool@^2",
        "--framework",
        "net6.0",
        "--feed",
        "/srv/feed",
        "--source",
        "https://feed.example.test",
        "--config-file",
        "/etc/feeds.toml",
        "--verbosity",
        "quiet",
        "--timeout-secs",
        "90",
        "--root",
        "/srv/packages",
        "-vv",
    ])
    .expect("install command must parse");

    assert_eq!(cli.root, Some(PathBuf::from("/srv/packages")));
    assert_eq!(cli.verbose, 2);
    let Commands::Install(args) = cli.command else {
        panic!("expected install command");
    };
    assert_eq!(args.spec, "demo.tool@^2");
    assert_eq!(args.framework.as_deref(), Some("net6.0"));
    assert_eq!(args.feed, Some(PathBuf::from("/srv/feed")));
    assert_eq!(args.source.as_deref(), Some("https://feed.example.test"));
    assert_eq!(args.config_file, Some(PathBuf::from("/etc/feeds.toml")));
    assert_eq!(args.verbosity.as_deref(), Some("quiet"));
    assert_eq!(args.timeout_secs, Some(90));
    assert_eq!(args.resolve_command, None);
}

#[test]
fn other_subcommands_parse() {
    let cli = Cli::try_parse_from(["stagepack", "list", "demo.tool", "--json"]).expect("list");
    assert!(matches!(cli.command, Commands::List { id: Some(ref id), json: true } if id == "demo.tool"));

    let cli = Cli::try_parse_from(["stagepack", "uninstall", "demo.tool", "1.0.0"]).expect("uninstall");
    assert!(matches!(cli.command, Commands::Uninstall { .. }));

    let cli = Cli::try_parse_from(["stagepack", "doctor"]).expect("doctor");
    assert!(matches!(
        cli.command,
        Commands::Doctor {
            purge_staging: false,
            older_than_secs: 86_400
        }
    ));

    let cli = Cli::try_parse_from(["stagepack", "--plain", "completions", "zsh"]).expect("completions");
    assert!(cli.plain);
    assert!(matches!(cli.command, Commands::Completions { shell: Shell::Zsh }));
}

#[test]
fn log_directive_follows_verbosity() {
    assert_eq!(default_log_directive(0), "warn");
    assert_eq!(default_log_directive(1), "debug");
    assert_eq!(default_log_directive(4), "trace");
}

#[test]
fn config_parses_all_fields() {
    let config = StagepackConfig::from_toml_str(
        r#"
root = "/srv/packages"
feed = "/srv/feed"
target_framework = "net6.0"

[resolver]
command = "restore-tool"
args = ["restore", "--no-cache"]
timeout_secs = 120
"#,
    )
    .expect("config must parse");

    assert_eq!(config.root, Some(PathBuf::from("/srv/packages")));
    assert_eq!(config.feed, Some(PathBuf::from("/srv/feed")));
    assert_eq!(config.target_framework.as_deref(), Some("net6.0"));
    assert_eq!(config.resolver.command, Some(PathBuf::from("restore-tool")));
    assert_eq!(config.resolver.args, vec!["restore", "--no-cache"]);
    assert_eq!(config.resolver.timeout_secs, Some(120));
}

#[test]
fn config_rejects_unknown_keys() {
    let err = StagepackConfig::from_toml_str("root = \"/srv\"\nprefix = \"/opt\"\n")
        .expect_err("unknown key must fail");
    assert!(format!("{err:#}").contains("prefix"));

    StagepackConfig::from_toml_str("[resolver]\nprogram = \"x\"\n")
        .expect_err("unknown resolver key must fail");
}

#[test]
fn config_load_handles_missing_and_relative_paths() {
    let dir = test_dir();
    let path = dir.join("config.toml");

    assert_eq!(
        StagepackConfig::load(&path, false).expect("implicit missing config is empty"),
        StagepackConfig::default()
    );
    StagepackConfig::load(&path, true).expect_err("explicit missing config must fail");

    fs::write(&path, "root = \"packages\"\nfeed = \"/srv/feed\"\n").expect("must write config");
    let config = StagepackConfig::load(&path, true).expect("config must load");
    assert_eq!(config.root, Some(dir.join("packages")));
    assert_eq!(config.feed, Some(PathBuf::from("/srv/feed")));

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn store_root_flag_wins_over_config() {
    let config = StagepackConfig {
        root: Some(PathBuf::from("/from/config")),
        ..StagepackConfig::default()
    };

    assert_eq!(
        resolve_store_root(Some(Path::new("/from/flag")), &config).expect("root"),
        PathBuf::from("/from/flag")
    );
    assert_eq!(
        resolve_store_root(None, &config).expect("root"),
        PathBuf::from("/from/config")
    );
}

#[test]
fn resolve_command_wins_over_feed() {
    let mut config = StagepackConfig {
        feed: Some(PathBuf::from("/srv/feed")),
        ..StagepackConfig::default()
    };
    config.resolver.command = Some(PathBuf::from("restore-tool"));
    config.resolver.args = vec!["restore".to_string()];
    config.resolver.timeout_secs = Some(30);

    let ConfiguredResolver::Command(resolver) =
        select_resolver(ResolverOverrides::default(), &config).expect("resolver")
    else {
        panic!("expected command resolver");
    };
    assert_eq!(resolver.program(), Path::new("restore-tool"));
    assert_eq!(resolver.args(), ["restore".to_string()]);
    assert_eq!(resolver.timeout(), Some(Duration::from_secs(30)));

    let ConfiguredResolver::Command(resolver) = select_resolver(
        ResolverOverrides {
            command: Some(Path::new("/usr/bin/other")),
            timeout_secs: Some(5),
            ..ResolverOverrides::default()
        },
        &config,
    )
    .expect("resolver") else {
        panic!("expected command resolver");
    };
    assert_eq!(resolver.program(), Path::new("/usr/bin/other"));
    assert!(resolver.args().is_empty());
    assert_eq!(resolver.timeout(), Some(Duration::from_secs(5)));
}

#[test]
fn feed_flag_selects_feed_resolver() {
    let config = StagepackConfig {
        feed: Some(PathBuf::from("/srv/feed")),
        ..StagepackConfig::default()
    };

    let ConfiguredResolver::Feed(resolver) = select_resolver(
        ResolverOverrides {
            feed: Some(Path::new("/mnt/feed")),
            ..ResolverOverrides::default()
        },
        &config,
    )
    .expect("resolver") else {
        panic!("expected feed resolver");
    };
    assert_eq!(resolver.feed_root(), Path::new("/mnt/feed"));

    let err = select_resolver(ResolverOverrides::default(), &StagepackConfig::default())
        .expect_err("no resolver must fail");
    assert!(err.to_string().contains("no resolver configured"));
}

#[test]
fn output_style_is_plain_when_requested_or_not_a_tty() {
    assert_eq!(resolve_output_style(false, false, true), OutputStyle::Rich);
    assert_eq!(resolve_output_style(true, false, true), OutputStyle::Plain);
    assert_eq!(resolve_output_style(false, true, true), OutputStyle::Plain);
    assert_eq!(resolve_output_style(false, false, false), OutputStyle::Plain);
}

#[test]
fn render_status_line_plain_is_unadorned() {
    assert_eq!(
        render_status_line(OutputStyle::Plain, "ok", "installed demo.tool 1.0.0"),
        "installed demo.tool 1.0.0"
    );
}

#[test]
fn render_status_line_rich_includes_badge() {
    let line = render_status_line(OutputStyle::Rich, "ok", "installed demo.tool 1.0.0");
    assert!(line.contains("[OK]"));
    assert!(line.ends_with(" installed demo.tool 1.0.0"));

    let line = render_status_line(OutputStyle::Rich, "error", "already installed");
    assert!(line.contains("[ERR]"));
    assert!(line.contains('\u{1b}'));
}

#[test]
fn list_lines_follow_output_style() {
    let packages = vec![
        ListedPackage {
            id: "alpha".to_string(),
            version: "1.0.0".to_string(),
            directory: "/srv/packages/alpha/1.0.0".to_string(),
        },
        ListedPackage {
            id: "demo.tool".to_string(),
            version: "2.1.0".to_string(),
            directory: "/srv/packages/demo.tool/2.1.0".to_string(),
        },
    ];

    assert_eq!(
        format_list_lines(&packages, OutputStyle::Plain),
        vec!["alpha 1.0.0", "demo.tool 2.1.0"]
    );
    assert_eq!(
        format_list_lines(&packages, OutputStyle::Rich)[0],
        "alpha      1.0.0        /srv/packages/alpha/1.0.0"
    );

    let json = serde_json::to_value(&packages[1]).expect("must encode");
    assert_eq!(json["id"], "demo.tool");
    assert_eq!(json["version"], "2.1.0");
}

#[test]
fn completions_script_names_binary() {
    let mut output = Vec::new();
    write_completions(Shell::Bash, &mut output).expect("must generate completions");
    let script = String::from_utf8(output).expect("utf8");
    assert!(script.contains("stagepack"));
}

#[test]
fn install_and_uninstall_through_dispatch() {
    let dir = test_dir();
    let feed = dir.join("feed");
    let root = dir.join("packages");
    let config_path = dir.join("config.toml");
    publish(&feed, "demo.tool", "1.0.0");
    publish(&feed, "demo.tool", "1.1.0");
    fs::write(&config_path, "feed = \"feed\"\n").expect("must write config");

    let args = |extra: &[&str]| {
        let mut argv = vec![
            "stagepack".to_string(),
            "--plain".to_string(),
            "--root".to_string(),
            root.display().to_string(),
            "--config".to_string(),
            config_path.display().to_string(),
        ];
        argv.extend(extra.iter().map(|arg| arg.to_string()));
        Cli::try_parse_from(argv).expect("argv must parse")
    };
    let renderer = TerminalRenderer::new(OutputStyle::Plain);

    dispatch::run(args(&["install", "demo.tool@~1.0"]), renderer).expect("install must succeed");
    let store = PackageStore::new(&root);
    let id = PackageId::new("demo.tool").expect("id");
    assert_eq!(
        store.installed_versions(&id).expect("must list"),
        vec![ResolvedVersion::parse("1.0.0").expect("version")]
    );

    let err = dispatch::run(args(&["install", "demo.tool@~1.0"]), renderer)
        .expect_err("second install must conflict");
    assert!(err
        .downcast_ref::<InstallError>()
        .is_some_and(InstallError::is_conflict));

    dispatch::run(args(&["list", "--json"]), renderer).expect("list must succeed");
    dispatch::run(args(&["uninstall", "demo.tool", "1.0.0"]), renderer)
        .expect("uninstall must succeed");
    assert!(store.installed_packages().expect("must list").is_empty());

    let _ = fs::remove_dir_all(&dir);
}
