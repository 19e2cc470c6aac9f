use anyhow::Context;
use clap::Parser;
use shockosc::config::{Config, read_config_file};
use shockosc::openshock::OpenShockClient;
use shockosc::service::ShockOscService;
use tracing::{info, level_filters::LevelFilter, trace};
use tracing_subscriber::{filter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Parser)]
struct Args {
    /// Config file
    #[arg(short)]
    file: String,

    /// Verify the remote API token, list the account's shockers and exit
    #[arg(long)]
    check: bool,

    /// Include per-message traces
    #[arg(short, long)]
    verbose: bool,
}

fn init(verbose: bool) {
    let level = if verbose {
        LevelFilter::TRACE
    } else {
        LevelFilter::DEBUG
    };
    let filter = filter::Targets::new().with_targets(vec![("shockosc", level)]);
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact()
                .with_ansi(false),
        )
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init(args.verbose);
    trace!("started with args: {args:?}");

    let config = read_config_file(&args.file)?;

    if args.check {
        return check(&config).await;
    }

    let service = ShockOscService::start(config).await?;
    info!("running, press Ctrl+C to exit");

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for Ctrl+C")?;

    service.shutdown().await;
    Ok(())
}

async fn check(config: &Config) -> anyhow::Result<()> {
    let client = OpenShockClient::new()?;
    let devices = client
        .own_devices(&config.openshock)
        .await
        .context("remote connection check failed")?;

    let shockers: usize = devices.iter().map(|device| device.shockers.len()).sum();
    info!("found {} device(s) with {shockers} shocker(s)", devices.len());

    for device in &devices {
        for shocker in &device.shockers {
            let group = config
                .openshock
                .group_of(&shocker.id)
                .unwrap_or("unassigned");
            info!("{} / {} ({}) → {group}", device.name, shocker.name, shocker.id);
        }
    }

    Ok(())
}
