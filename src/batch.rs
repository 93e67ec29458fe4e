//! Processes one PNG or a directory of PNGs against an existing catalog entry.

use crate::catalog::{self, Catalog, CatalogStore, Entry};
use crate::error::{AssetError, Result};
use crate::file_watcher::is_png_file;
use crate::normalizer;
use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

pub const SKINS: &str = "skins";

#[derive(Debug, Clone)]
pub struct BatchRequest {
    pub asset_type: String,
    pub name: String,
    pub slug: String,
    pub input: PathBuf,
    pub level: Option<String>,
    pub delete_sources: bool,
}

/// Where a processed file is recorded on its entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Placement {
    Level(String),
    Icon,
    /// 1-based pose index.
    Pose(usize),
}

impl Placement {
    /// `processed` counts files already saved in this run.
    pub fn for_file(asset_type: &str, level: Option<&str>, processed: usize) -> Self {
        match level {
            Some(level) => Placement::Level(level.to_string()),
            None if asset_type == SKINS && processed > 0 => Placement::Pose(processed),
            None => Placement::Icon,
        }
    }

    pub fn file_name(&self, slug: &str) -> String {
        match self {
            Placement::Pose(index) => format!("{}-pose-{}.png", slug, index),
            Placement::Level(_) | Placement::Icon => format!("{}.png", slug),
        }
    }

    pub fn apply(&self, entry: &mut Entry, rel_path: String) {
        match self {
            Placement::Level(level) => entry.set_level(level, rel_path),
            Placement::Icon => entry.icon = Some(rel_path),
            Placement::Pose(index) => entry.set_pose(*index, rel_path),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SavedImage {
    pub source: PathBuf,
    pub rel_path: String,
    pub abs_path: PathBuf,
    pub placement: Placement,
}

#[derive(Debug, Clone)]
pub struct SkippedImage {
    pub source: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone, Default)]
pub struct BatchReport {
    pub saved: Vec<SavedImage>,
    pub skipped: Vec<SkippedImage>,
}

/// Runs a batch. Lookup failures abort before any file is written; per-file
/// failures are logged and skipped.
pub fn run_batch(store: &CatalogStore, request: &BatchRequest) -> Result<BatchReport> {
    if !request.input.exists() {
        return Err(AssetError::InputNotFound(request.input.clone()));
    }
    catalog::validate_segment("asset_type", &request.asset_type)?;
    catalog::validate_segment("slug", &request.slug)?;

    let sources = collect_pngs(&request.input)?;
    if sources.is_empty() {
        return Err(AssetError::NoPngFiles(request.input.clone()));
    }

    if !store.exists() {
        return Err(AssetError::CatalogMissing(store.catalog_path().to_path_buf()));
    }

    let report = store.update(|catalog| place_batch(store, catalog, request, &sources))?;

    // Sources go only once the catalog that records their outputs is on disk
    if request.delete_sources {
        for saved in &report.saved {
            remove_source(&saved.source, &saved.abs_path);
        }
    }
    Ok(report)
}

/// Writes every output and records it on the entry. Never touches the sources.
fn place_batch(
    store: &CatalogStore,
    catalog: &mut Catalog,
    request: &BatchRequest,
    sources: &[PathBuf],
) -> Result<BatchReport> {
    if !catalog.has_type(&request.asset_type) {
        return Err(AssetError::UnknownType(request.asset_type.clone()));
    }
    let unknown_name = || AssetError::UnknownName {
        asset_type: request.asset_type.clone(),
        name: request.name.clone(),
    };
    let id = catalog
        .resolve_entry(&request.asset_type, &request.name)
        .ok_or_else(unknown_name)?;
    let entry = catalog
        .entry_mut(&request.asset_type, &id)
        .ok_or_else(unknown_name)?;

    let folder = catalog::folder_for(entry, &request.asset_type);
    log::info!(
        "Processing {} file(s) for '{}' ({}) into {}",
        sources.len(),
        request.name,
        id,
        folder
    );

    let mut report = BatchReport::default();
    for source in sources {
        let placement = Placement::for_file(
            &request.asset_type,
            request.level.as_deref(),
            report.saved.len(),
        );
        match save_one(store, source, &folder, &request.slug, &placement) {
            Ok(saved) => {
                placement.apply(entry, saved.rel_path.clone());
                log::debug!("Saved {}", saved.abs_path.display());
                report.saved.push(saved);
            }
            Err(e) => {
                log::debug!("Skipping {} - {}", source.display(), e);
                report.skipped.push(SkippedImage {
                    source: source.clone(),
                    reason: e.to_string(),
                });
            }
        }
    }
    Ok(report)
}

fn save_one(
    store: &CatalogStore,
    source: &Path,
    folder: &str,
    slug: &str,
    placement: &Placement,
) -> Result<SavedImage> {
    let normalized = normalizer::normalize_file(source)?;
    let rel_path = catalog::join_rel(folder, &placement.file_name(slug));
    let abs_path = store.absolute_path(&rel_path);
    normalized.save(&abs_path)?;

    Ok(SavedImage {
        source: source.to_path_buf(),
        rel_path,
        abs_path,
        placement: placement.clone(),
    })
}

fn remove_source(source: &Path, destination: &Path) {
    if same_file(source, destination) {
        return;
    }
    if let Err(e) = fs::remove_file(source) {
        log::warn!("Could not delete {}: {}", source.display(), e);
    }
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (fs::canonicalize(a), fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => a == b,
    }
}

/// A single file is taken as-is. A directory yields its PNGs in natural order.
pub fn collect_pngs(input: &Path) -> Result<Vec<PathBuf>> {
    if !input.is_dir() {
        return Ok(vec![input.to_path_buf()]);
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(input)?
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| path.is_file() && is_png_file(path))
        .collect();

    paths.sort_by(|a, b| natural_cmp(&file_name_of(a), &file_name_of(b)));
    Ok(paths)
}

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default()
}

#[derive(Debug)]
enum Chunk<'a> {
    Text(String),
    Digits(&'a str),
}

/// Runs of text and runs of ASCII digits, always starting with a (possibly
/// empty) text run so two chunk lists line up kind for kind.
fn chunks(s: &str) -> Vec<Chunk<'_>> {
    let mut out = Vec::new();
    let mut start = 0;
    let mut in_digits = false;

    for (i, c) in s.char_indices() {
        let digit = c.is_ascii_digit();
        if digit != in_digits {
            push_chunk(&mut out, &s[start..i], in_digits);
            start = i;
            in_digits = digit;
        }
    }
    push_chunk(&mut out, &s[start..], in_digits);
    out
}

fn push_chunk<'a>(out: &mut Vec<Chunk<'a>>, run: &'a str, digits: bool) {
    if digits {
        out.push(Chunk::Digits(run));
    } else {
        out.push(Chunk::Text(run.to_lowercase()));
    }
}

fn cmp_digits(a: &str, b: &str) -> Ordering {
    let a = a.trim_start_matches('0');
    let b = b.trim_start_matches('0');
    a.len().cmp(&b.len()).then_with(|| a.cmp(b))
}

/// Orders "img2" before "img10"; text runs compare case-insensitively.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let left = chunks(a);
    let right = chunks(b);

    for (l, r) in left.iter().zip(right.iter()) {
        let ord = match (l, r) {
            (Chunk::Text(l), Chunk::Text(r)) => l.cmp(r),
            (Chunk::Digits(l), Chunk::Digits(r)) => cmp_digits(l, r),
            (Chunk::Text(_), Chunk::Digits(_)) => Ordering::Less,
            (Chunk::Digits(_), Chunk::Text(_)) => Ordering::Greater,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    left.len().cmp(&right.len()).then_with(|| a.cmp(b))
}
