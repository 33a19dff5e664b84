mod cli;
mod error_fmt;
mod run;

use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use eyre::{Result, WrapErr};
use pool_config::{Config, Logging};
use pool_core::dispatcher::{Kind, TOPICS};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer, Registry};

use crate::cli::{Cli, Commands, FILE_GUARD, JSON_MODE};
use crate::error_fmt::{exit_code_for_error, format_error_json, humanize};

fn main() -> ExitCode {
    let cli = Cli::parse();
    let _ = JSON_MODE.set(cli.json);
    // color-eyre only for panics and Debug output; errors are printed below
    let _ = color_eyre::install();

    match real_main(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if JSON_MODE.get().copied().unwrap_or(false) {
                eprintln!("{}", format_error_json(&e));
            } else {
                eprintln!("{}", humanize(&e));
            }
            let code = u8::try_from(exit_code_for_error(&e)).unwrap_or(1);
            ExitCode::from(code)
        }
    }
}

fn real_main(cli: Cli) -> Result<()> {
    let cfg = match &cli.config {
        Some(path) => pool_config::load_file(path)?,
        None => {
            let cfg = Config::default();
            cfg.validate().wrap_err("built-in defaults")?;
            cfg
        }
    };
    init_tracing(cli.json, &cli.log_level, &cfg.logging)?;

    match cli.cmd {
        Commands::CheckConfig => {
            let source = cli
                .config
                .as_deref()
                .map_or_else(|| "built-in defaults".to_string(), |p| p.display().to_string());
            tracing::debug!(%source, "configuration validated");
            println!("config OK ({source})");
        }
        Commands::Topics => {
            for topic in TOPICS {
                let once = if topic.once { " (once)" } else { "" };
                println!("{}\t{}{once}", topic.path, describe(topic.kind));
            }
        }
        Commands::Run { mode, run_for } => {
            run::run(&cfg, &mode, run_for.map(Duration::from_secs))?;
        }
    }
    Ok(())
}

fn describe(kind: Kind) -> String {
    match kind {
        Kind::Int { min, max } => format!("int {min}..={max}"),
        Kind::Float { min, max } => format!("float {min}..={max}"),
        Kind::Bool => "bool".to_string(),
        Kind::Choice(choices) => choices.join("|"),
        Kind::Timestamp => "timestamp".to_string(),
    }
}

/// Console layer (pretty or JSON, `RUST_LOG` wins over `--log-level`) plus an
/// optional non-blocking JSON file layer from `[logging]`.
fn init_tracing(json: bool, level: &str, logging: &Logging) -> Result<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .wrap_err_with(|| format!("invalid log level {level:?}"))?;

    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();
    layers.push(if json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_filter(console_filter)
            .boxed()
    });

    if let Some(path) = &logging.file {
        let path = Path::new(path);
        let dir = path.parent().filter(|d| !d.as_os_str().is_empty()).unwrap_or(Path::new("."));
        let name = path
            .file_name()
            .ok_or_else(|| eyre::eyre!("logging.file has no file name"))?;
        let appender = match logging.rotation.as_deref().unwrap_or("never") {
            "daily" => tracing_appender::rolling::daily(dir, name),
            "hourly" => tracing_appender::rolling::hourly(dir, name),
            "never" => tracing_appender::rolling::never(dir, name),
            other => eyre::bail!("logging.rotation must be never|daily|hourly, got {other:?}"),
        };
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        let file_level = logging
            .level
            .as_deref()
            .unwrap_or("info")
            .parse::<LevelFilter>()
            .wrap_err("logging.level")?;
        layers.push(
            tracing_subscriber::fmt::layer()
                .json()
                .with_ansi(false)
                .with_writer(writer)
                .with_filter(file_level)
                .boxed(),
        );
    }

    tracing_subscriber::registry()
        .with(layers)
        .try_init()
        .wrap_err("installing tracing subscriber")?;
    Ok(())
}
