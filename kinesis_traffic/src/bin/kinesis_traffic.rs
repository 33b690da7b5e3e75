use std::{io, net::SocketAddr, path::PathBuf};

use clap::{Args, Parser, Subcommand};
use kinesis_traffic::{
    config::{self, Config, Telemetry},
    driver::{self, Driver, Summary},
    submit::{DryRun, Kinesis},
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::runtime::Builder;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, filter::LevelFilter, util::SubscriberInitExt};

#[derive(thiserror::Error, Debug)]
enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("Invalid configuration: {0}")]
    Config(#[from] config::Error),
    #[error("Traffic run failed: {0}")]
    Driver(#[from] driver::Error),
    #[error("Failed to install prometheus exporter: {0}")]
    Prometheus(#[from] metrics_exporter_prometheus::BuildError),
}

#[derive(Parser)]
#[clap(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Push traffic into the configured stream, the default
    Run(RunCommand),
    /// Validate configuration and exit
    ConfigCheck(ConfigCheckCommand),
}

#[derive(Args, Default)]
struct RunCommand {
    /// path on disk to the configuration file, built-in defaults apply when
    /// absent
    #[clap(long)]
    config_path: Option<PathBuf>,
    /// print records to stdout rather than sending them
    #[clap(long)]
    dry_run: bool,
    /// address to bind prometheus exporter to
    #[clap(long)]
    prometheus_addr: Option<SocketAddr>,
}

#[derive(Args)]
struct ConfigCheckCommand {
    /// path on disk to the configuration file
    #[clap(long)]
    config_path: Option<PathBuf>,
}

fn get_config(args: &RunCommand) -> Result<Config, Error> {
    let mut config = config::load(args.config_path.as_deref()).inspect_err(|err| {
        error!("Configuration validation failed: {err}");
    })?;

    if args.dry_run {
        config.dry_run = true;
    }
    if let Some(addr) = args.prometheus_addr {
        let global_labels = match config.telemetry.take() {
            Some(Telemetry::Prometheus { global_labels, .. }) => global_labels,
            None => Default::default(),
        };
        config.telemetry = Some(Telemetry::Prometheus {
            addr,
            global_labels,
        });
    }
    Ok(config)
}

async fn inner_main(config: Config) -> Result<Summary, Error> {
    if let Some(Telemetry::Prometheus {
        addr,
        global_labels,
    }) = &config.telemetry
    {
        let mut builder = PrometheusBuilder::new().with_http_listener(*addr);
        for (k, v) in global_labels {
            builder = builder.add_global_label(k, v);
        }
        builder.install()?;
        info!("Prometheus exporter listening on {addr}");
    }

    // Progress lines go to stdout, logs go to stderr.
    let summary = if config.dry_run {
        info!("Dry run, records are printed and not sent");
        let mut driver = Driver::new(&config, DryRun::new(io::stdout()), io::stdout());
        driver.run().await?
    } else {
        let kinesis = Kinesis::new(&config.region, config.endpoint_url.as_deref()).await;
        let mut driver = Driver::new(&config, kinesis, io::stdout());
        driver.run().await?
    };
    Ok(summary)
}

fn log_filter() -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy()
}

fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(log_filter())
        .with_ansi(false)
        .with_writer(io::stderr)
        .finish()
        .init();

    let version = env!("CARGO_PKG_VERSION");
    info!("Starting kinesis-traffic {version} run.");

    let args = match Cli::parse().command {
        None => RunCommand::default(),
        Some(Commands::Run(args)) => args,
        Some(Commands::ConfigCheck(check)) => match config::load(check.config_path.as_deref()) {
            Ok(_) => {
                info!("Configuration is valid");
                std::process::exit(0)
            }
            Err(err) => {
                error!("Configuration validation failed: {err}");
                std::process::exit(1)
            }
        },
    };

    let config = get_config(&args)?;

    // A single thread of control: batches are never in flight concurrently.
    let runtime = Builder::new_current_thread().enable_all().build()?;
    let res = runtime.block_on(inner_main(config));
    match &res {
        Ok(summary) => info!(
            "Submitted {} records in {} batches, {} reported failed. Bye. :)",
            summary.records_submitted, summary.batches, summary.records_failed
        ),
        // The only place a failed run is logged.
        Err(err) => error!("{err}"),
    }
    res.map(|_| ())
}
