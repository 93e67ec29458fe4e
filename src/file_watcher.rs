use notify::{Event, EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use std::thread;

use crate::error::{AssetError, Result};

/// Watches one directory (non-recursively) for newly created PNG files and
/// hands each one to a callback on a dedicated thread, one at a time.
pub struct FileWatcher {
    _watcher: RecommendedWatcher,
    _thread_handle: thread::JoinHandle<()>,
}

impl FileWatcher {
    pub fn new<P: AsRef<Path>, F>(path: P, callback: F) -> Result<Self>
    where
        F: Fn(PathBuf) + Send + 'static,
    {
        let (tx, rx) = mpsc::channel();
        let path = path.as_ref().to_path_buf();

        if !path.exists() {
            return Err(AssetError::InputNotFound(path));
        }

        if !path.is_dir() {
            return Err(AssetError::invalid_field(
                "watch_dir",
                format!("{} is not a directory", path.display()),
            ));
        }

        // Processed files get moved out of here, so we need write access
        let test_file = path.join(".watcher_test");
        match fs::write(&test_file, "test") {
            Ok(_) => {
                let _ = fs::remove_file(&test_file);
                log::debug!("Watch directory is writable: {}", path.display());
            }
            Err(e) => {
                log::warn!("⚠ Watch directory may not be writable: {} - {}", path.display(), e);
            }
        }

        let mut watcher = RecommendedWatcher::new(
            move |res: std::result::Result<Event, notify::Error>| match res {
                Ok(event) => {
                    log::trace!("File system event: {:?} for paths: {:?}", event.kind, event.paths);
                    if let EventKind::Create(_) = event.kind {
                        for path in event.paths {
                            if is_png_file(&path) && !path.is_dir() {
                                log::debug!("New PNG detected: {}", path.display());
                                tx.send(path).ok();
                            }
                        }
                    }
                }
                Err(e) => {
                    log::error!("❌ Watch error: {:?}", e);
                    let error_str = e.to_string().to_lowercase();
                    if error_str.contains("permission") || error_str.contains("denied") {
                        log::error!("💡 This might be a permissions issue, check folder permissions.");
                    } else if error_str.contains("not found") {
                        log::error!("💡 The watched folder might have been moved or deleted.");
                    }
                }
            },
            notify::Config::default(),
        )?;

        watcher.watch(&path, RecursiveMode::NonRecursive)?;
        log::info!("👀 Watching {} for new PNGs...", path.display());

        let thread_handle = thread::spawn(move || {
            log::debug!("File watcher event handler thread started");
            while let Ok(path) = rx.recv() {
                callback(path);
            }
            log::debug!("File watcher event handler thread stopped");
        });

        Ok(Self {
            _watcher: watcher,
            _thread_handle: thread_handle,
        })
    }
}

pub fn is_png_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("png"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    #[test]
    fn test_is_png_file() {
        assert!(is_png_file(Path::new("cannon.png")));
        assert!(is_png_file(Path::new("CANNON.PNG")));
        assert!(is_png_file(Path::new("dir/gold_storage_lvl19.png")));
        assert!(!is_png_file(Path::new("cannon.jpg")));
        assert!(!is_png_file(Path::new("cannon")));
        assert!(!is_png_file(Path::new("png")));
    }

    #[test]
    fn missing_directory_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let result = FileWatcher::new(dir.path().join("missing"), |_| {});
        assert!(matches!(result, Err(AssetError::InputNotFound(_))));
    }

    #[test]
    fn created_png_reaches_callback() {
        let dir = tempfile::tempdir().unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _watcher = FileWatcher::new(dir.path(), move |path| {
            sink.lock().unwrap().push(path);
        })
        .unwrap();

        fs::write(dir.path().join("notes.txt"), "x").unwrap();
        fs::write(dir.path().join("cannon.png"), "x").unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if !seen.lock().unwrap().is_empty() {
                break;
            }
            thread::sleep(Duration::from_millis(20));
        }
        let seen = seen.lock().unwrap();
        assert!(seen.iter().any(|p| p.ends_with("cannon.png")));
        assert!(seen.iter().all(|p| is_png_file(p)));
    }
}
