// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod config;
mod runtime;

use anyhow::{Context, Result};
use assetgrid_app::AppState;
use assetgrid_db::Store;
use clap::Parser;
use config::Config;
use runtime::{DemoRuntime, HttpRuntime};
use std::fs::{self, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

const LOG_ENV: &str = "ASSETGRID_LOG";

/// Terminal grid for browsing and editing fleet assets.
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
#[command(name = "assetgrid", version)]
struct CliOptions {
    /// Use a specific config file
    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Print the resolved config path and exit
    #[arg(long)]
    print_config_path: bool,

    /// Print a config template and exit
    #[arg(long)]
    print_example_config: bool,

    /// Print the resolved client state database path and exit
    #[arg(long)]
    print_state_path: bool,

    /// Run against seeded in-memory demo assets instead of the API. Column
    /// layout changes are not saved between demo sessions
    #[arg(long)]
    demo: bool,

    /// Validate config, state store and API client settings, then exit
    #[arg(long)]
    check: bool,
}

fn main() {
    if let Err(error) = run(CliOptions::parse()) {
        eprintln!("{error:#}");
        std::process::exit(1);
    }
}

fn run(options: CliOptions) -> Result<()> {
    let config_path = match options.config.clone() {
        Some(path) => path,
        None => Config::default_path()?,
    };

    if options.print_config_path {
        println!("{}", config_path.display());
        return Ok(());
    }

    if options.print_example_config {
        print!("{}", Config::example_config(&config_path));
        return Ok(());
    }

    let config = Config::load(&config_path).with_context(|| {
        format!(
            "load config {}; run `assetgrid --print-example-config` for a template",
            config_path.display()
        )
    })?;

    let state_path = if options.demo {
        PathBuf::from(":memory:")
    } else {
        config.state_path()?
    };
    if options.print_state_path {
        println!("{}", state_path.display());
        return Ok(());
    }

    let state = Store::open(&state_path).with_context(|| {
        format!(
            "open state store {} -- set [storage].state_path or ASSETGRID_STATE_PATH",
            state_path.display()
        )
    })?;
    state.bootstrap()?;

    let client = if options.demo {
        None
    } else {
        Some(
            assetgrid_api::Client::new(config.base_url(), config.timeout()?).with_context(
                || {
                    format!(
                        "invalid [api] config in {}; fix base_url/timeout",
                        config_path.display()
                    )
                },
            )?,
        )
    };
    if options.check {
        return Ok(());
    }

    init_logging(&config)?;
    let mut app_state = AppState::default();
    match client {
        Some(client) => {
            info!(base_url = client.base_url(), "starting against remote API");
            let mut runtime = HttpRuntime::new(client, state);
            assetgrid_tui::run_app(&mut app_state, &mut runtime, config.page_size())
        }
        None => {
            info!("starting in demo mode");
            let mut runtime = DemoRuntime::new(state)?;
            assetgrid_tui::run_app(&mut app_state, &mut runtime, config.page_size())
        }
    }
}

/// The grid owns the terminal, so log lines go to a file.
fn init_logging(config: &Config) -> Result<()> {
    let path = config.log_path()?;
    let file = open_log_file(&path)?;
    let filter = match std::env::var(LOG_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::try_new(&directives)
            .with_context(|| format!("invalid {LOG_ENV} filter {directives:?}"))?,
        _ => EnvFilter::try_new(config.log_level())
            .with_context(|| format!("invalid [log].level {:?}", config.log_level()))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .map_err(|error| anyhow::anyhow!("install log subscriber: {error}"))
}

fn open_log_file(path: &Path) -> Result<fs::File> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent)
            .with_context(|| format!("create log directory {}", parent.display()))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("open log file {} -- set [log].path", path.display()))
}

#[cfg(test)]
mod tests {
    use super::{CliOptions, open_log_file};
    use anyhow::Result;
    use clap::{CommandFactory, Parser};
    use std::path::PathBuf;

    #[test]
    fn defaults_leave_every_flag_off() -> Result<()> {
        let options = CliOptions::try_parse_from(["assetgrid"])?;
        assert_eq!(
            options,
            CliOptions {
                config: None,
                print_config_path: false,
                print_example_config: false,
                print_state_path: false,
                demo: false,
                check: false,
            }
        );
        Ok(())
    }

    #[test]
    fn config_flag_takes_a_path() -> Result<()> {
        let options = CliOptions::try_parse_from(["assetgrid", "--config", "/etc/grid.toml"])?;
        assert_eq!(options.config, Some(PathBuf::from("/etc/grid.toml")));
        Ok(())
    }

    #[test]
    fn config_flag_without_value_fails() {
        assert!(CliOptions::try_parse_from(["assetgrid", "--config"]).is_err());
    }

    #[test]
    fn unknown_flag_fails() {
        assert!(CliOptions::try_parse_from(["assetgrid", "--wat"]).is_err());
    }

    #[test]
    fn print_and_mode_flags_parse() -> Result<()> {
        let options = CliOptions::try_parse_from([
            "assetgrid",
            "--demo",
            "--check",
            "--print-state-path",
            "--print-example-config",
        ])?;
        assert!(options.demo);
        assert!(options.check);
        assert!(options.print_state_path);
        assert!(options.print_example_config);
        assert!(!options.print_config_path);
        Ok(())
    }

    #[test]
    fn demo_help_mentions_unsaved_layout() {
        let command = CliOptions::command();
        let help = command
            .get_arguments()
            .find(|arg| arg.get_id() == "demo")
            .and_then(|arg| arg.get_help())
            .map(ToString::to_string)
            .unwrap_or_default();
        assert!(help.contains("not saved between demo sessions"));
    }

    #[test]
    fn log_file_parent_is_created() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("nested").join("assetgrid.log");
        open_log_file(&path)?;
        assert!(path.exists());
        Ok(())
    }
}
