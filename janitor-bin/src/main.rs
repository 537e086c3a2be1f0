use clap::Parser;
use color_eyre::eyre;
use janitor_docker::DockerRuntime;
use janitor_retention::Janitor;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

mod cli;

use cli::Args;

#[tokio::main]
async fn main() -> eyre::Result<()> {
    dotenvy::dotenv().ok();
    color_eyre::install()?;
    let args = Args::parse();
    init_tracing(args.debug);

    let options = args.options()?;
    info!(filters = ?options.filters, "Parsed cleaner options");

    if !options.any_cleaner_enabled() {
        info!("No cleaner options provided, exit.");
        return Ok(());
    }

    if options.dry_run {
        info!("Dry-run option provided, nothing will be deleted");
    }

    let runtime = DockerRuntime::connect_with_defaults()?;
    match runtime.server_version().await {
        Ok(version) => info!(%version, "Connected to Docker"),
        Err(e) => warn!(error = %e, "Docker daemon is not answering yet"),
    }

    info!("Cleaner started: version {}", env!("CARGO_PKG_VERSION"));
    info!(
        "Checking unused docker objects every {}, with freshness {} and filters: \"{}\", \"{}\", \"{}\"",
        humantime::format_duration(options.interval),
        options
            .freshness
            .map(|f| humantime::format_duration(f).to_string())
            .unwrap_or_else(|| "disabled".to_string()),
        args.exclude_names,
        args.exclude_tags,
        args.exclude_fullnames
    );

    let mut janitor = Janitor::new(Arc::new(runtime), options);
    if args.once {
        janitor.run_cycle().await;
        info!("Execution complete, exit");
    } else {
        janitor.run_until(shutdown_signal()).await;
    }

    Ok(())
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S%.3f".to_string()))
        .with_ansi(false)
        .with_target(false)
        .init();
    if debug {
        tracing::debug!("Enabling debug output");
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl-c, running until killed");
        std::future::pending::<()>().await;
    }
}
