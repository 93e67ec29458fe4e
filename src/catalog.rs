//! The JSON asset map: asset type -> entry id -> entry.
//!
//! Every mutation goes through [`CatalogStore::update`], which holds a sidecar
//! lock file for the whole load, mutate, save sequence. Saves land in a temp
//! file first and are renamed over the catalog.

use crate::config::LabConfig;
use crate::error::{AssetError, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use uuid::Uuid;

const BUILDER_BASE: &str = "builder-base";
const CAPITAL_BASE: &str = "capital-base";
const HOME_BASE: &str = "home-base";

const LOCK_POLL_INTERVAL: Duration = Duration::from_millis(25);

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Empty when the document has no name; such entries never match a lookup.
    #[serde(default)]
    pub name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub levels: Option<IndexMap<String, String>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poses: Option<IndexMap<String, String>>,

    /// Fields this tool does not manage, kept as-is.
    #[serde(flatten)]
    pub extra: IndexMap<String, serde_json::Value>,
}

impl Entry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Icon first, then the first level, then the first pose.
    pub fn first_known_path(&self) -> Option<&str> {
        self.icon
            .as_deref()
            .or_else(|| first_value(&self.levels))
            .or_else(|| first_value(&self.poses))
    }

    pub fn set_level(&mut self, level: &str, path: String) {
        self.levels
            .get_or_insert_with(IndexMap::new)
            .insert(level.to_string(), path);
    }

    pub fn set_pose(&mut self, index: usize, path: String) {
        self.poses
            .get_or_insert_with(IndexMap::new)
            .insert(index.to_string(), path);
    }
}

fn first_value(map: &Option<IndexMap<String, String>>) -> Option<&str> {
    map.as_ref()
        .and_then(|m| m.values().next())
        .map(String::as_str)
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    types: IndexMap<String, IndexMap<String, Entry>>,
}

impl Catalog {
    pub fn has_type(&self, asset_type: &str) -> bool {
        self.types.contains_key(asset_type)
    }

    pub fn types(&self) -> impl Iterator<Item = (&String, &IndexMap<String, Entry>)> {
        self.types.iter()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    pub fn entry(&self, asset_type: &str, id: &str) -> Option<&Entry> {
        self.types.get(asset_type)?.get(id)
    }

    pub fn entry_mut(&mut self, asset_type: &str, id: &str) -> Option<&mut Entry> {
        self.types.get_mut(asset_type)?.get_mut(id)
    }

    /// Id of the first entry named `name`. Later entries with the same name
    /// are unreachable by name; that case is logged.
    pub fn resolve_entry(&self, asset_type: &str, name: &str) -> Option<String> {
        let entries = self.types.get(asset_type)?;
        let mut matches = entries
            .iter()
            .filter(|(_, entry)| !entry.name.is_empty() && entry.name == name)
            .map(|(id, _)| id.as_str());

        let first = matches.next()?;
        let aliased: Vec<&str> = matches.collect();
        if !aliased.is_empty() {
            log::warn!(
                "Name '{}' in '{}' matches several entries; using {} and ignoring {:?}",
                name,
                asset_type,
                first,
                aliased
            );
        }
        Some(first.to_string())
    }

    /// Adds a new entry under a fresh 6-digit id, creating the type section
    /// if needed.
    pub fn create_entry(&mut self, asset_type: &str, name: &str) -> String {
        let id = self.fresh_id();
        self.types
            .entry(asset_type.to_string())
            .or_default()
            .insert(id.clone(), Entry::new(name));
        log::info!("Created entry {} '{}' in '{}'", id, name, asset_type);
        id
    }

    pub fn resolve_or_create(&mut self, asset_type: &str, name: &str) -> String {
        match self.resolve_entry(asset_type, name) {
            Some(id) => id,
            None => self.create_entry(asset_type, name),
        }
    }

    fn fresh_id(&self) -> String {
        loop {
            let n = Uuid::new_v4().as_u128() % 900_000 + 100_000;
            let id = n.to_string();
            if !self.contains_id(&id) {
                return id;
            }
        }
    }

    fn contains_id(&self, id: &str) -> bool {
        self.types.values().any(|entries| entries.contains_key(id))
    }
}

/// "home-base" for everything except the builder and capital bases.
pub fn base_type_for(asset_type: &str) -> &str {
    match asset_type {
        BUILDER_BASE | CAPITAL_BASE => asset_type,
        _ => HOME_BASE,
    }
}

pub fn slugify(name: &str) -> String {
    name.to_lowercase().replace(' ', "-").replace('.', "")
}

/// Storage folder for an entry, catalog-relative with a leading slash.
///
/// An entry that already points at a file keeps that file's folder. Otherwise
/// the folder is derived from the asset type and the entry name.
pub fn folder_for(entry: &Entry, asset_type: &str) -> String {
    if let Some(existing) = entry.first_known_path() {
        if let Some((folder, _file)) = existing.rsplit_once('/') {
            let folder = folder.trim_end_matches('/');
            if !folder.is_empty() {
                return format!("/{}", folder.trim_start_matches('/'));
            }
        }
    }
    format!(
        "/{}/{}/{}",
        base_type_for(asset_type),
        asset_type,
        slugify(&entry.name)
    )
}

pub fn join_rel(folder: &str, file_name: &str) -> String {
    format!("{}/{}", folder.trim_end_matches('/'), file_name)
}

/// Asset types and slugs become path segments, so they must be exactly one.
pub fn validate_segment(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AssetError::invalid_field(field, "must not be empty"));
    }
    if value.contains(|c: char| c == '/' || c == '\\') || value == "." || value.contains("..") {
        return Err(AssetError::invalid_field(
            field,
            format!("'{}' must be a plain name without path separators", value),
        ));
    }
    Ok(())
}

pub struct CatalogStore {
    assets_dir: PathBuf,
    catalog_path: PathBuf,
    lock_timeout: Duration,
}

impl CatalogStore {
    pub fn new(assets_dir: impl Into<PathBuf>, catalog_path: impl Into<PathBuf>) -> Self {
        Self {
            assets_dir: assets_dir.into(),
            catalog_path: catalog_path.into(),
            lock_timeout: Duration::from_secs(5),
        }
    }

    pub fn from_config(config: &LabConfig) -> Self {
        Self::new(config.assets_dir.clone(), config.catalog_path()).with_lock_timeout(config.lock_timeout())
    }

    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn assets_dir(&self) -> &Path {
        &self.assets_dir
    }

    pub fn catalog_path(&self) -> &Path {
        &self.catalog_path
    }

    pub fn exists(&self) -> bool {
        self.catalog_path.is_file()
    }

    /// Maps a catalog path such as `/home-base/buildings/x/x.png` to disk.
    pub fn absolute_path(&self, rel_path: &str) -> PathBuf {
        self.assets_dir.join(rel_path.trim_start_matches('/'))
    }

    /// Empty catalog if the file does not exist yet.
    pub fn load(&self) -> Result<Catalog> {
        if !self.catalog_path.exists() {
            return Ok(Catalog::default());
        }
        let content = fs::read_to_string(&self.catalog_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn save(&self, catalog: &Catalog) -> Result<()> {
        let parent = self.catalog_dir();
        fs::create_dir_all(&parent)?;

        let mut tmp = tempfile::NamedTempFile::new_in(&parent)?;
        serde_json::to_writer_pretty(&mut tmp, catalog)?;
        tmp.write_all(b"\n")?;
        tmp.as_file().sync_all()?;
        tmp.persist(&self.catalog_path).map_err(|e| e.error)?;

        log::debug!("Wrote catalog {}", self.catalog_path.display());
        Ok(())
    }

    pub fn lock(&self) -> Result<CatalogLock> {
        CatalogLock::acquire(self.lock_path(), self.lock_timeout)
    }

    /// Locked load, mutate, save. Nothing is written if `f` fails.
    pub fn update<T>(&self, f: impl FnOnce(&mut Catalog) -> Result<T>) -> Result<T> {
        let _lock = self.lock()?;
        let mut catalog = self.load()?;
        let value = f(&mut catalog)?;
        self.save(&catalog)?;
        Ok(value)
    }

    fn catalog_dir(&self) -> PathBuf {
        match self.catalog_path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .catalog_path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.catalog_dir().join(name)
    }
}

/// Advisory lock held for as long as the value lives.
#[derive(Debug)]
pub struct CatalogLock {
    path: PathBuf,
}

impl CatalogLock {
    fn acquire(path: PathBuf, timeout: Duration) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let started = Instant::now();
        loop {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(mut file) => {
                    let _ = writeln!(file, "{}", std::process::id());
                    return Ok(Self { path });
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    if started.elapsed() >= timeout {
                        return Err(AssetError::CatalogLocked(path));
                    }
                    thread::sleep(LOCK_POLL_INTERVAL);
                }
                Err(e) => return Err(e.into()),
            }
        }
    }
}

impl Drop for CatalogLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            log::warn!("Could not release catalog lock {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store_in(dir: &Path) -> CatalogStore {
        CatalogStore::new(dir.join("assets"), dir.join("assets").join("image_map.json"))
            .with_lock_timeout(Duration::from_millis(100))
    }

    #[test]
    fn slugify_and_base_type() {
        assert_eq!(slugify("Mr. T Statue"), "mr-t-statue");
        assert_eq!(base_type_for("builder-base"), "builder-base");
        assert_eq!(base_type_for("capital-base"), "capital-base");
        assert_eq!(base_type_for("decorations"), "home-base");
    }

    #[test]
    fn new_entry_folder_is_derived_from_type_and_name() {
        let entry = Entry::new("Gold Storage");
        assert_eq!(folder_for(&entry, "buildings"), "/home-base/buildings/gold-storage");
    }

    #[test]
    fn existing_entry_reuses_folder_of_first_known_path() {
        let mut entry = Entry::new("Cannon");
        entry.set_pose(1, "/old/poses/cannon-pose-1.png".to_string());
        entry.set_level("3", "/legacy/cannon/cannon-3.png".to_string());
        assert_eq!(folder_for(&entry, "buildings"), "/legacy/cannon");

        entry.icon = Some("/icons/cannon.png".to_string());
        assert_eq!(folder_for(&entry, "buildings"), "/icons");
    }

    #[test]
    fn resolve_returns_first_match() {
        let json = r#"{
            "buildings": {
                "900001": { "name": "Wall" },
                "100002": { "name": "Wall" }
            }
        }"#;
        let catalog: Catalog = serde_json::from_str(json).unwrap();
        assert_eq!(catalog.resolve_entry("buildings", "Wall").as_deref(), Some("900001"));
        assert_eq!(catalog.resolve_entry("buildings", "Tower"), None);
        assert_eq!(catalog.resolve_entry("skins", "Wall"), None);
    }

    #[test]
    fn nameless_entries_load_and_are_kept() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        fs::create_dir_all(store.assets_dir()).unwrap();
        fs::write(
            store.catalog_path(),
            r#"{"buildings":{"1":{"icon":"/a/b.png"},"2":{"name":"Cannon"}}}"#,
        )
        .unwrap();

        let catalog = store.load().unwrap();
        assert_eq!(catalog.resolve_entry("buildings", "Cannon").as_deref(), Some("2"));
        assert_eq!(catalog.resolve_entry("buildings", ""), None);

        store
            .update(|catalog| {
                catalog.entry_mut("buildings", "2").unwrap().icon = Some("/c/d.png".to_string());
                Ok(())
            })
            .unwrap();

        let reloaded = store.load().unwrap();
        let nameless = reloaded.entry("buildings", "1").unwrap();
        assert_eq!(nameless.icon.as_deref(), Some("/a/b.png"));
        assert_eq!(
            reloaded.entry("buildings", "2").unwrap().icon.as_deref(),
            Some("/c/d.png")
        );
    }

    #[test]
    fn created_ids_are_six_digits() {
        let mut catalog = Catalog::default();
        let id = catalog.create_entry("decorations", "Flag");
        assert_eq!(id.len(), 6);
        assert!(id.chars().all(|c| c.is_ascii_digit()));
        assert_eq!(catalog.resolve_or_create("decorations", "Flag"), id);
        assert_ne!(catalog.resolve_or_create("decorations", "Torch"), id);
    }

    #[test]
    fn missing_file_loads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        assert!(!store.exists());
        assert!(store.load().unwrap().is_empty());
    }

    #[test]
    fn unmanaged_fields_and_order_survive_a_save() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        fs::create_dir_all(store.assets_dir()).unwrap();
        let original = r#"{
  "skins": {
    "500": { "name": "Gold King", "hero": "Barbarian King", "icon": "/a/b.png" }
  },
  "buildings": {}
}"#;
        fs::write(store.catalog_path(), original).unwrap();

        store.update(|_| Ok(())).unwrap();

        let written = fs::read_to_string(store.catalog_path()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&written).unwrap();
        assert_eq!(value["skins"]["500"]["hero"], "Barbarian King");
        assert!(written.find("skins").unwrap() < written.find("buildings").unwrap());
        assert!(written.ends_with('\n'));
    }

    #[test]
    fn failed_update_leaves_catalog_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let result: Result<()> = store.update(|catalog| {
            catalog.create_entry("buildings", "Cannon");
            Err(AssetError::UnknownType("x".to_string()))
        });
        assert!(result.is_err());
        assert!(!store.exists());
        // lock released
        store.update(|_| Ok(())).unwrap();
    }

    #[test]
    fn held_lock_times_out_other_writers() {
        let dir = tempfile::tempdir().unwrap();
        let store = store_in(dir.path());
        let guard = store.lock().unwrap();
        assert!(matches!(store.update(|_| Ok(())), Err(AssetError::CatalogLocked(_))));
        drop(guard);
        store.update(|_| Ok(())).unwrap();
    }

    #[test]
    fn path_segments_are_validated() {
        assert!(validate_segment("slug", "gold-storage-19").is_ok());
        assert!(validate_segment("slug", "").is_err());
        assert!(validate_segment("slug", "../etc").is_err());
        assert!(validate_segment("asset_type", "a/b").is_err());
    }
}
