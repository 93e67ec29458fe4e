use crate::asset_naming::{self, InferredAsset};
use crate::batch::{self, BatchReport, BatchRequest};
use crate::catalog::CatalogStore;
use crate::config::LabConfig;
use crate::error::{AssetError, Result};
use crate::file_watcher::is_png_file;
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

#[derive(Debug)]
pub struct IngestOutcome {
    pub inferred: InferredAsset,
    pub report: BatchReport,
    pub archived_to: PathBuf,
}

/// Turns files dropped into the watch folder into catalog updates.
pub struct IngestManager {
    store: CatalogStore,
    asset_type: String,
    processed_dir: PathBuf,
    settle_delay: Duration,
}

impl IngestManager {
    pub fn new(
        store: CatalogStore,
        asset_type: impl Into<String>,
        processed_dir: impl Into<PathBuf>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            store,
            asset_type: asset_type.into(),
            processed_dir: processed_dir.into(),
            settle_delay,
        }
    }

    pub fn from_config(config: &LabConfig) -> Self {
        Self::new(
            CatalogStore::from_config(config),
            config.watch_asset_type.clone(),
            config.processed_path(),
            config.settle_delay(),
        )
    }

    pub fn prepare(&self) -> Result<()> {
        fs::create_dir_all(&self.processed_dir)?;
        Ok(())
    }

    /// Waits for the writer to finish, processes the file and archives it.
    /// The source stays where it is if processing fails.
    pub fn handle_new_file(&self, file_path: &Path) -> Result<IngestOutcome> {
        if !self.settle_delay.is_zero() {
            thread::sleep(self.settle_delay);
        }

        let file_name = file_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AssetError::invalid_field("file", "invalid file name"))?
            .to_string();
        log::info!("🚀 New asset detected: {}", file_name);

        let inferred = asset_naming::infer_from_path(file_path).ok_or_else(|| {
            AssetError::invalid_field("file", format!("cannot infer an asset name from {}", file_name))
        })?;
        log::info!(
            "   Naming: '{}' | Slug: '{}' | Lvl: {}",
            inferred.name,
            inferred.slug,
            inferred.level.as_deref().unwrap_or("-")
        );

        let request = BatchRequest {
            asset_type: self.asset_type.clone(),
            name: inferred.name.clone(),
            slug: inferred.slug.clone(),
            input: file_path.to_path_buf(),
            level: inferred.level.clone(),
            delete_sources: false,
        };
        let report = batch::run_batch(&self.store, &request)?;
        if report.saved.is_empty() {
            let reason = report
                .skipped
                .first()
                .map(|s| s.reason.clone())
                .unwrap_or_else(|| "nothing saved".to_string());
            return Err(AssetError::invalid_field("file", reason));
        }

        let archived_to = self.archive(file_path, &file_name)?;
        log::info!("✅ Processed {} and archived to {}", file_name, archived_to.display());

        Ok(IngestOutcome {
            inferred,
            report,
            archived_to,
        })
    }

    /// Logging wrapper used as the watcher callback. One bad file never stops the watcher.
    pub fn handle_and_log(&self, file_path: &Path) {
        if let Err(e) = self.handle_new_file(file_path) {
            log::error!("❌ Failed to process {}: {}", file_path.display(), e);
        }
    }

    /// Processes PNGs that were already waiting before the watcher started.
    pub fn scan_existing(&self, watch_dir: &Path) -> Result<usize> {
        let mut handled = 0;
        for path in batch::collect_pngs(watch_dir)? {
            if !is_png_file(&path) {
                continue;
            }
            log::info!("🔍 Found existing file: {}", path.display());
            self.handle_and_log(&path);
            handled += 1;
        }
        Ok(handled)
    }

    fn archive(&self, file_path: &Path, file_name: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.processed_dir)?;
        let dest = self.processed_dir.join(file_name);
        if dest.exists() {
            fs::remove_file(&dest)?;
        }
        fs::rename(file_path, &dest)?;
        Ok(dest)
    }
}
