//! The artifact catalog and its whole-document store.
//!
//! The catalog is one JSON document listing every generated artifact plus a
//! curated "library" of copied records:
//!
//! ```json
//! {
//!   "revision": 12,
//!   "thumbnails": [
//!     {
//!       "id": "5f0c…",
//!       "filename": "new-shoes-limited.png",
//!       "template": "bold.html",
//!       "data": { "badge": "New", "main_title": "…", "sub_title": "Limited" },
//!       "created_at": "2026-10-19T09:12:44Z"
//!     }
//!   ],
//!   "library": { "folders": [], "images": [] }
//! }
//! ```
//!
//! # Identity
//!
//! `id` is the primary key and never changes. `filename` is derived from the
//! record's copy once, at creation, and is then cached on the record: edits
//! never rename the artifact on disk. [`Catalog::by_filename`] is the index
//! from file back to record.
//!
//! # Unit of work
//!
//! The store has no partial updates: [`CatalogStore::update`] loads the whole
//! document, runs one operation against it, and writes it back only if the
//! operation succeeded.
//!
//! # Concurrency
//!
//! Writers serialize on an exclusive advisory lock on `<catalog>.lock`.
//! [`CatalogStore::update`] holds it across the whole load, operation and
//! save, so two updates never interleave. [`CatalogStore::save`] takes it
//! around the revision check and the write.
//!
//! Every save bumps `revision`. A save is refused with
//! [`CatalogError::Conflict`] when the revision on disk no longer matches the
//! revision that was loaded, so a caller holding a stale copy gets an error
//! instead of overwriting newer changes. Writes go through a temp file plus
//! rename, so readers never see a half-written document.

use crate::rows::RowData;
use chrono::{DateTime, Utc};
use fd_lock::RwLock;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::Write as _;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Catalog changed on disk (loaded revision {loaded}, found {found}); reload and retry")]
    Conflict { loaded: u64, found: u64 },
}

/// One generated thumbnail.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ArtifactRecord {
    pub id: String,
    /// Output file name inside the generated directory. Fixed at creation.
    pub filename: String,
    /// Template used for the most recent render.
    pub template: String,
    pub data: RowData,
    pub created_at: DateTime<Utc>,
}

/// Curated copies of records, independent of the working set.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Library {
    pub folders: Vec<String>,
    pub images: Vec<ArtifactRecord>,
}

/// The whole catalog document.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Catalog {
    /// Save counter used to detect concurrent writers.
    pub revision: u64,
    pub thumbnails: Vec<ArtifactRecord>,
    pub library: Library,
}

impl Catalog {
    pub fn is_empty(&self) -> bool {
        self.thumbnails.is_empty()
    }

    pub fn len(&self) -> usize {
        self.thumbnails.len()
    }

    pub fn get(&self, id: &str) -> Option<&ArtifactRecord> {
        self.thumbnails.iter().find(|r| r.id == id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut ArtifactRecord> {
        self.thumbnails.iter_mut().find(|r| r.id == id)
    }

    pub fn by_filename(&self, filename: &str) -> Option<&ArtifactRecord> {
        self.thumbnails.iter().find(|r| r.filename == filename)
    }

    /// Whether a working or library record already owns `filename`.
    pub fn filename_taken(&self, filename: &str) -> bool {
        self.by_filename(filename).is_some()
            || self.library.images.iter().any(|r| r.filename == filename)
    }

    /// Insert a record, replacing any record with the same id.
    pub fn upsert(&mut self, record: ArtifactRecord) {
        match self.get_mut(&record.id) {
            Some(existing) => *existing = record,
            None => self.thumbnails.push(record),
        }
    }

    pub fn remove(&mut self, id: &str) -> Option<ArtifactRecord> {
        let pos = self.thumbnails.iter().position(|r| r.id == id)?;
        Some(self.thumbnails.remove(pos))
    }

    /// Remove every working record, returning them. The library is kept.
    pub fn clear(&mut self) -> Vec<ArtifactRecord> {
        std::mem::take(&mut self.thumbnails)
    }

    /// Working records, newest first.
    pub fn recent(&self) -> Vec<&ArtifactRecord> {
        let mut records: Vec<&ArtifactRecord> = self.thumbnails.iter().collect();
        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        records
    }

    /// Copy a working record into the library.
    ///
    /// Returns `None` if the id is unknown, `Some(false)` if the library
    /// already holds a copy, `Some(true)` if a copy was added.
    pub fn save_to_library(&mut self, id: &str) -> Option<bool> {
        let record = self.get(id)?.clone();
        if self.library.images.iter().any(|r| r.id == id) {
            return Some(false);
        }
        self.library.images.push(record);
        Some(true)
    }

    /// Drop a library copy. Returns whether one was removed.
    pub fn remove_from_library(&mut self, id: &str) -> bool {
        let before = self.library.images.len();
        self.library.images.retain(|r| r.id != id);
        self.library.images.len() != before
    }
}

#[derive(Deserialize)]
struct RevisionOnly {
    #[serde(default)]
    revision: u64,
}

/// Whole-document JSON store for the [`Catalog`].
#[derive(Debug, Clone)]
pub struct CatalogStore {
    path: PathBuf,
}

impl CatalogStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the catalog. A missing file is an empty catalog; missing keys
    /// default to empty.
    pub fn load(&self) -> Result<Catalog, CatalogError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Catalog::default()),
            Err(e) => Err(e.into()),
        }
    }

    fn revision_on_disk(&self) -> Result<u64, CatalogError> {
        match std::fs::read_to_string(&self.path) {
            Ok(content) => Ok(serde_json::from_str::<RevisionOnly>(&content)?.revision),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Advisory lock file guarding writes to the catalog.
    fn lock_file(&self) -> Result<RwLock<File>, CatalogError> {
        let mut path = self.path.clone().into_os_string();
        path.push(".lock");
        let path = PathBuf::from(path);
        if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(dir)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)?;
        Ok(RwLock::new(file))
    }

    /// Write the catalog back, bumping its revision.
    ///
    /// Fails with [`CatalogError::Conflict`] if someone else saved since
    /// `catalog` was loaded.
    pub fn save(&self, catalog: &mut Catalog) -> Result<(), CatalogError> {
        let mut lock = self.lock_file()?;
        let _guard = lock.write()?;
        self.save_locked(catalog)
    }

    fn save_locked(&self, catalog: &mut Catalog) -> Result<(), CatalogError> {
        let found = self.revision_on_disk()?;
        if found != catalog.revision {
            return Err(CatalogError::Conflict {
                loaded: catalog.revision,
                found,
            });
        }

        catalog.revision += 1;
        if let Err(e) = self.write_atomic(catalog) {
            catalog.revision -= 1;
            return Err(e);
        }
        tracing::debug!(
            path = %self.path.display(),
            revision = catalog.revision,
            records = catalog.len(),
            "catalog saved"
        );
        Ok(())
    }

    fn write_atomic(&self, catalog: &Catalog) -> Result<(), CatalogError> {
        let dir = match self.path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p.to_path_buf(),
            _ => PathBuf::from("."),
        };
        std::fs::create_dir_all(&dir)?;
        let json = serde_json::to_string_pretty(catalog)?;
        let mut staged = tempfile::NamedTempFile::new_in(&dir)?;
        staged.write_all(json.as_bytes())?;
        staged.flush()?;
        staged.persist(&self.path).map_err(|e| e.error)?;
        Ok(())
    }

    /// Run one unit of work against the catalog.
    ///
    /// Loads the document, calls `op`, and saves only if `op` returned `Ok`.
    /// Other writers wait on the lock until the unit of work is done.
    pub fn update<T, E>(&self, op: impl FnOnce(&mut Catalog) -> Result<T, E>) -> Result<T, E>
    where
        E: From<CatalogError>,
    {
        let mut lock = self.lock_file()?;
        let _guard = lock.write().map_err(CatalogError::from)?;
        let mut catalog = self.load()?;
        let value = op(&mut catalog)?;
        self.save_locked(&mut catalog)?;
        Ok(value)
    }
}
