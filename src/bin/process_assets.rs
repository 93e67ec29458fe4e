use asset_lab::batch::{self, BatchRequest};
use asset_lab::{CatalogStore, LabConfig};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;

/// Crops and squares PNGs, then records them on an existing catalog entry.
#[derive(Parser)]
#[command(name = "process-assets", version)]
struct Cli {
    /// Category type (e.g. buildings, decorations, skins)
    #[arg(long = "type")]
    asset_type: String,

    /// Display name of the asset, must match an entry in the catalog
    #[arg(long)]
    name: String,

    /// Slug for the output filename
    #[arg(long)]
    slug: String,

    /// Input directory or file path
    #[arg(long)]
    input: PathBuf,

    /// Level of the building/asset
    #[arg(long)]
    level: Option<String>,

    /// Delete source files after processing (the default)
    #[arg(long, overrides_with = "no_delete")]
    delete: bool,

    /// Keep source files
    #[arg(long, overrides_with = "delete")]
    no_delete: bool,

    #[arg(long)]
    config: Option<PathBuf>,
}

fn main() -> ExitCode {
    asset_lab::init_logging();
    let cli = Cli::parse();

    let config = match LabConfig::load(cli.config.as_deref()) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    let store = CatalogStore::from_config(&config);

    let request = BatchRequest {
        asset_type: cli.asset_type,
        name: cli.name,
        slug: cli.slug,
        input: cli.input,
        level: cli.level,
        delete_sources: cli.delete || !cli.no_delete,
    };

    match batch::run_batch(&store, &request) {
        Ok(report) => {
            for saved in &report.saved {
                println!("Saved {}", saved.abs_path.display());
            }
            for skipped in &report.skipped {
                println!("Skipping {} - {}", skipped.source.display(), skipped.reason);
            }
            println!("Updated {}", store.catalog_path().display());
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
