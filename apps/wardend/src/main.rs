//! wardend
//!
//! Loads the configuration, composes every configured service and serves
//! them until Ctrl-C.

mod args;

use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{error, info};
use warden_core::{Config, Topology};
use warden_gateway::{plan_waves, DependenciesBuilder, Orchestrator};

use args::Args;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let _guard = init_tracing(args.log_dir.as_deref())?;

    let config = Config::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;

    if args.check {
        let report = CheckReport::build(&config)?;
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    run(config).await
}

async fn run(config: Config) -> Result<()> {
    info!("[Daemon] Starting wardend {}", env!("CARGO_PKG_VERSION"));

    let deps = DependenciesBuilder::new()
        .build()
        .map_err(anyhow::Error::msg)?;
    let mut orchestrator = Orchestrator::new(config, deps).await?;

    let started = match orchestrator.config_services().await {
        Ok(()) => orchestrator.start().await,
        Err(e) => Err(e),
    };
    if let Err(e) = started {
        error!("[Daemon] {}", e);
        orchestrator.shutdown().await;
        return Err(e.into());
    }

    tokio::signal::ctrl_c()
        .await
        .context("waiting for Ctrl-C")?;
    info!("[Daemon] Ctrl-C received, shutting down");

    orchestrator.shutdown().await;
    Ok(())
}

/// Output of `--check`
#[derive(Debug, Serialize)]
struct CheckReport {
    topology: Topology,
    start_order: Vec<Vec<String>>,
}

impl CheckReport {
    fn build(config: &Config) -> Result<Self> {
        let topology = Topology::build(&config.api);
        let addresses: Vec<String> = topology.groups.keys().cloned().collect();
        let start_order = plan_waves(&addresses, &topology.dependencies)?;
        Ok(Self {
            topology,
            start_order,
        })
    }
}

/// Compact ANSI console output, plus a daily-rolling file when `log_dir` is set.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_tracing(
    log_dir: Option<&Path>,
) -> Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    use tracing_appender::rolling::{RollingFileAppender, Rotation};
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let env_filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::new("info")
            .add_directive("warden_core=debug".parse()?)
            .add_directive("warden_gateway=debug".parse()?)
            .add_directive("wardend=debug".parse()?)
            .add_directive("tower_http=info".parse()?),
    };

    let console_layer = fmt::layer()
        .with_ansi(true)
        .compact()
        .with_thread_names(false)
        .with_line_number(false)
        .with_file(false)
        .with_target(true);

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("creating log directory {}", dir.display()))?;
            let appender = RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("wardend")
                .filename_suffix("log")
                .build(dir)
                .context("creating log file appender")?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_ids(true)
                .with_line_number(true)
                .with_file(true)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    Ok(guard)
}
