use asset_lab::upload_server::UploadServer;
use asset_lab::{CatalogStore, LabConfig};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "asset-lab", version, about = "Upload form and catalog browser for game assets")]
struct Cli {
    /// Config file (defaults to ./asset-lab.json or the platform config dir)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Address to listen on, overrides the config
    #[arg(long)]
    bind: Option<String>,

    /// Open the page in the default browser once listening
    #[arg(long)]
    open: bool,
}

fn main() -> ExitCode {
    asset_lab::init_logging();
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> asset_lab::Result<()> {
    let mut config = LabConfig::load(cli.config.as_deref())?;
    if let Some(bind) = cli.bind {
        config.bind_addr = bind;
    }

    fs::create_dir_all(&config.assets_dir)?;
    let store = CatalogStore::from_config(&config);
    let server = UploadServer::bind(&config.bind_addr, store, config.max_upload_bytes)?;

    let port = server.local_addr().map(|a| a.port()).unwrap_or(8080);
    let url = format!("http://localhost:{}", port);
    println!("\n🚀 Asset Lab starting on {}", url);

    if cli.open {
        if let Err(e) = webbrowser::open(&url) {
            log::warn!("Could not open browser: {}", e);
        }
    }

    server.run()
}
