use asset_lab::file_watcher::FileWatcher;
use asset_lab::ingest_manager::IngestManager;
use asset_lab::LabConfig;
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

/// Watches the drop folder and files every new PNG into the catalog.
#[derive(Parser)]
#[command(name = "watch-assets", version)]
struct Cli {
    #[arg(long)]
    config: Option<PathBuf>,

    /// Process PNGs already sitting in the watch folder before watching
    #[arg(long)]
    scan_existing: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    asset_lab::init_logging();
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> asset_lab::Result<()> {
    let config = LabConfig::load(cli.config.as_deref())?;
    fs::create_dir_all(&config.watch_dir)?;

    let manager = Arc::new(IngestManager::from_config(&config));
    manager.prepare()?;

    if cli.scan_existing {
        let scan_manager = manager.clone();
        let watch_dir = config.watch_dir.clone();
        let handled = tokio::task::spawn_blocking(move || scan_manager.scan_existing(&watch_dir))
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))??;
        log::info!("Initial scan handled {} file(s)", handled);
    }

    let callback_manager = manager.clone();
    let _watcher = FileWatcher::new(&config.watch_dir, move |path| {
        callback_manager.handle_and_log(&path);
    })?;

    tokio::signal::ctrl_c().await?;
    log::info!("Stopping watcher");
    Ok(())
}
