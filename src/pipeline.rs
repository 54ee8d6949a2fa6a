//! The artifact pipeline: create, refresh, and remove rendered thumbnails
//! while keeping the catalog, the files on disk, and the record data in step.
//!
//! ## Render, then commit
//!
//! Every operation that produces an image follows the same order:
//!
//! ```text
//! load template ──► substitute row data ──► render to <generated>/<filename>
//!                                                 │
//!                                     ok ─────────┴───────── err
//!                                     │                       │
//!                         update record in catalog     return error,
//!                         save catalog (1 write)       catalog untouched
//! ```
//!
//! A render failure therefore never leaves a record pointing at an image
//! that was not produced, and a record's data always describes the image on
//! disk (as of the last successful render).
//!
//! ## Identity
//!
//! | Field | Set | Changes |
//! |---|---|---|
//! | `id` | create (UUID v4) | never |
//! | `filename` | create, from `slugify("{badge} {product} {sub_title}")` | never |
//! | `template` | create, refresh, swap | on every successful re-render |
//! | `data` | create, refresh, bulk edits | on every successful re-render |
//! | `created_at` | create, from the written file | never |
//!
//! When the derived filename is already owned by another record (working set
//! or library), the first 8 hex digits of the new id are appended:
//! `new-shoes-limited-5f0c3a9e.png`.
//!
//! ## Deletion
//!
//! The catalog entry is removed first; the file afterwards. A file that is
//! already gone, or cannot be removed, is reported as a warning and never
//! keeps the entry alive. Library copies are never touched, and neither is
//! a file whose name a library copy still references.

use crate::catalog::{ArtifactRecord, Catalog, CatalogError, CatalogStore};
use crate::render::{RenderEngine, RenderError, RenderJob, Viewport};
use crate::rows::{self, IMAGE_URL, RowData, RowError};
use crate::slug::{sanitize_file_name, slugify};
use crate::template::{self, TemplateError, TemplateStore};
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;
use walkdir::WalkDir;

/// Extension of every rendered artifact.
pub const ARTIFACT_EXT: &str = "png";

/// Image types accepted as record uploads.
pub const UPLOAD_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif"];

const COLLISION_SUFFIX_LEN: usize = 8;

/// Problems with what the caller asked for. Reported before anything is
/// rendered or written.
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Template not found: {0}")]
    UnknownTemplate(String),
    #[error("Invalid template name: {0}")]
    InvalidTemplateName(String),
    #[error("Thumbnail not found: {0}")]
    UnknownRecord(String),
    #[error("No thumbnails to apply changes to")]
    EmptyCatalog,
    #[error("No rows to generate")]
    NoRows,
    #[error("No image URLs saved; add some with `thumbforge images set`")]
    NoImageUrls,
    #[error("No text entered for bulk edit")]
    NoTextEdits,
    #[error("Unsupported image type '{0}' (allowed: png, jpg, jpeg, gif)")]
    UnsupportedUpload(String),
    #[error("Upload not found: {}", .0.display())]
    MissingUpload(PathBuf),
    #[error(transparent)]
    Rows(#[from] RowError),
}

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("{0}")]
    Input(#[from] InputError),
    #[error("Render failed: {0}")]
    Render(#[from] RenderError),
    #[error("Template store error: {0}")]
    Template(TemplateError),
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<TemplateError> for PipelineError {
    fn from(e: TemplateError) -> Self {
        match e {
            TemplateError::NotFound(name) => InputError::UnknownTemplate(name).into(),
            TemplateError::InvalidName(name) => InputError::InvalidTemplateName(name).into(),
            other => PipelineError::Template(other),
        }
    }
}

impl From<RowError> for PipelineError {
    fn from(e: RowError) -> Self {
        InputError::Rows(e).into()
    }
}

/// Changes applied by [`Pipeline::refresh`].
#[derive(Debug, Clone, Default)]
pub struct RecordUpdate {
    /// Switch to this template; `None` keeps the current one.
    pub template: Option<String>,
    /// Fields to set or overwrite. Fields not named here are kept.
    pub fields: RowData,
    /// Local image to copy into the uploads directory and use as `image_url`.
    pub image_file: Option<PathBuf>,
}

/// One row that failed during [`Pipeline::create_batch`].
#[derive(Debug)]
pub struct RowFailure {
    /// Zero-based row index in the input.
    pub index: usize,
    pub error: PipelineError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub created: Vec<ArtifactRecord>,
    pub failures: Vec<RowFailure>,
}

#[derive(Debug)]
pub struct DeleteOutcome {
    pub record: ArtifactRecord,
    /// Why the artifact file could not be removed, if it couldn't.
    pub file_warning: Option<String>,
    /// The file was left in place because a library copy still uses it.
    pub kept_for_library: bool,
}

#[derive(Debug, Default)]
pub struct ClearReport {
    pub removed: usize,
    pub file_warnings: Vec<String>,
    /// Files left in place because library copies still use them.
    pub kept_for_library: usize,
}

/// A disagreement between the catalog and the output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inconsistency {
    /// The record's artifact file does not exist.
    MissingFile { id: String, filename: String },
    /// The file exists but isn't a readable image.
    Undecodable {
        id: String,
        filename: String,
        reason: String,
    },
    /// A file in the output directory that no record references.
    Orphan { filename: String },
}

/// Orchestrates template lookup, rendering, and catalog updates.
pub struct Pipeline<'a, T, R> {
    templates: &'a T,
    engine: &'a R,
    store: &'a CatalogStore,
    output_dir: PathBuf,
    uploads_dir: PathBuf,
    viewport: Viewport,
    base_url: Option<String>,
}

impl<'a, T: TemplateStore, R: RenderEngine> Pipeline<'a, T, R> {
    pub fn new(
        templates: &'a T,
        engine: &'a R,
        store: &'a CatalogStore,
        output_dir: impl Into<PathBuf>,
        uploads_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            templates,
            engine,
            store,
            output_dir: output_dir.into(),
            uploads_dir: uploads_dir.into(),
            viewport: Viewport::default(),
            base_url: None,
        }
    }

    pub fn with_viewport(mut self, viewport: Viewport) -> Self {
        self.viewport = viewport;
        self
    }

    pub fn with_base_url(mut self, base_url: Option<String>) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn artifact_path(&self, record: &ArtifactRecord) -> PathBuf {
        self.output_dir.join(&record.filename)
    }

    pub(crate) fn store(&self) -> &CatalogStore {
        self.store
    }

    pub(crate) fn template_html(&self, name: &str) -> Result<String, PipelineError> {
        Ok(self.templates.read(name)?)
    }

    // =========================================================================
    // Render core
    // =========================================================================

    fn render_to(
        &self,
        template_html: &str,
        data: &RowData,
        filename: &str,
    ) -> Result<PathBuf, PipelineError> {
        let mut html = template::substitute(template_html, data);
        if let Some(base) = &self.base_url {
            html = template::inject_base(&html, base);
        }
        let output = self.output_dir.join(filename);
        tracing::debug!(filename, "rendering");
        let job = RenderJob::new(html, output.clone(), self.viewport);
        self.engine.render(&job)?;
        Ok(output)
    }

    /// Re-render an existing record in place and update it in `catalog`.
    ///
    /// The record keeps its id and filename. On failure nothing in
    /// `catalog` changes.
    pub(crate) fn rerender_in(
        &self,
        catalog: &mut Catalog,
        id: &str,
        template_name: &str,
        template_html: &str,
        data: RowData,
    ) -> Result<ArtifactRecord, PipelineError> {
        let filename = catalog
            .get(id)
            .ok_or_else(|| InputError::UnknownRecord(id.to_string()))?
            .filename
            .clone();
        self.render_to(template_html, &data, &filename)?;

        let record = catalog
            .get_mut(id)
            .ok_or_else(|| InputError::UnknownRecord(id.to_string()))?;
        record.template = template_name.to_string();
        record.data = data;
        Ok(record.clone())
    }

    fn create_in(
        &self,
        catalog: &mut Catalog,
        template_name: &str,
        template_html: &str,
        data: RowData,
    ) -> Result<ArtifactRecord, PipelineError> {
        let id = Uuid::new_v4().to_string();
        let filename = artifact_filename(catalog, &data, &id);
        let path = self.render_to(template_html, &data, &filename)?;

        let record = ArtifactRecord {
            id,
            filename,
            template: template_name.to_string(),
            data,
            created_at: file_timestamp(&path),
        };
        catalog.upsert(record.clone());
        tracing::info!(id = %record.id, filename = %record.filename, "artifact created");
        Ok(record)
    }

    // =========================================================================
    // Create
    // =========================================================================

    /// Render a new artifact from `data` and add it to the catalog.
    pub fn create(&self, data: RowData, template_name: &str) -> Result<ArtifactRecord, PipelineError> {
        let html = self.template_html(template_name)?;
        self.store
            .update(|catalog| self.create_in(catalog, template_name, &html, data))
    }

    /// Create one artifact per row, in order.
    ///
    /// A failing row is reported and skipped; the rest still go through.
    /// Everything created is committed in one catalog write.
    pub fn create_batch(
        &self,
        rows: Vec<RowData>,
        template_name: &str,
    ) -> Result<BatchReport, PipelineError> {
        if rows.is_empty() {
            return Err(InputError::NoRows.into());
        }
        let html = self.template_html(template_name)?;

        self.store.update(|catalog| {
            let mut report = BatchReport::default();
            for (index, data) in rows.into_iter().enumerate() {
                match self.create_in(catalog, template_name, &html, data) {
                    Ok(record) => report.created.push(record),
                    Err(error) => {
                        tracing::warn!(row = index + 1, %error, "row skipped");
                        report.failures.push(RowFailure { index, error });
                    }
                }
            }
            Ok::<_, PipelineError>(report)
        })
    }

    // =========================================================================
    // Update
    // =========================================================================

    /// Apply `update` to a record and re-render it under its existing filename.
    pub fn refresh(&self, id: &str, update: RecordUpdate) -> Result<ArtifactRecord, PipelineError> {
        if let Some(src) = &update.image_file {
            check_upload(src)?;
        }

        self.store.update(|catalog| -> Result<_, PipelineError> {
            let current = catalog
                .get(id)
                .ok_or_else(|| InputError::UnknownRecord(id.to_string()))?;
            let template_name = update.template.unwrap_or_else(|| current.template.clone());
            let html = self.template_html(&template_name)?;

            let mut data = current.data.clone();
            data.extend(update.fields);
            // render from the upload itself; it is copied only once the render succeeded
            if let Some(src) = &update.image_file {
                data.insert(IMAGE_URL.to_string(), file_url(src)?);
            }

            let mut record = self.rerender_in(catalog, id, &template_name, &html, data)?;
            if let Some(src) = &update.image_file {
                record
                    .data
                    .insert(IMAGE_URL.to_string(), self.attach_image(id, src)?);
                catalog.upsert(record.clone());
            }
            tracing::info!(id, filename = %record.filename, template = %record.template, "artifact refreshed");
            Ok(record)
        })
    }

    /// Re-render one record with a different template.
    pub fn swap_template(&self, id: &str, template_name: &str) -> Result<ArtifactRecord, PipelineError> {
        self.refresh(
            id,
            RecordUpdate {
                template: Some(template_name.to_string()),
                ..RecordUpdate::default()
            },
        )
    }

    /// Copy an uploaded image to `<uploads>/<id>_<name>` and return its URL.
    fn attach_image(&self, id: &str, src: &Path) -> Result<String, PipelineError> {
        let name = src
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let stored = sanitize_file_name(&format!("{id}_{name}"));
        fs::create_dir_all(&self.uploads_dir)?;
        let dest = self.uploads_dir.join(stored);
        fs::copy(src, &dest)?;
        Ok(file_url(&dest)?)
    }

    // =========================================================================
    // Delete
    // =========================================================================

    /// Remove a record from the catalog, then its artifact file.
    pub fn delete(&self, id: &str) -> Result<DeleteOutcome, PipelineError> {
        let (record, kept_for_library) = self.store.update(|catalog| {
            let record = catalog
                .remove(id)
                .ok_or_else(|| PipelineError::from(InputError::UnknownRecord(id.to_string())))?;
            let in_library = catalog.filename_taken(&record.filename);
            Ok::<_, PipelineError>((record, in_library))
        })?;

        let path = self.artifact_path(&record);
        let file_warning = if kept_for_library {
            tracing::debug!(filename = %record.filename, "artifact file kept for library copy");
            None
        } else {
            match fs::remove_file(&path) {
                Ok(()) => None,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not delete artifact file");
                    Some(format!("Error deleting file {}: {e}", path.display()))
                }
            }
        };
        tracing::info!(id, filename = %record.filename, "artifact deleted");
        Ok(DeleteOutcome {
            record,
            file_warning,
            kept_for_library,
        })
    }

    /// Remove every working record and its file. The library is kept.
    pub fn clear(&self) -> Result<ClearReport, PipelineError> {
        let (removed, remaining) = self.store.update(|catalog| {
            let removed = catalog.clear();
            Ok::<_, PipelineError>((removed, catalog.clone()))
        })?;

        let mut report = ClearReport {
            removed: removed.len(),
            ..ClearReport::default()
        };
        for record in &removed {
            if remaining.filename_taken(&record.filename) {
                report.kept_for_library += 1;
                continue;
            }
            let path = self.artifact_path(record);
            match fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "could not delete artifact file");
                    report
                        .file_warnings
                        .push(format!("Error deleting file {}: {e}", path.display()));
                }
            }
        }
        tracing::info!(removed = report.removed, "catalog cleared");
        Ok(report)
    }

    // =========================================================================
    // Read-side
    // =========================================================================

    /// Working records, newest first.
    pub fn list(&self) -> Result<Vec<ArtifactRecord>, PipelineError> {
        let catalog = self.store.load()?;
        Ok(catalog.recent().into_iter().cloned().collect())
    }

    pub fn get(&self, id: &str) -> Result<ArtifactRecord, PipelineError> {
        let catalog = self.store.load()?;
        catalog
            .get(id)
            .cloned()
            .ok_or_else(|| InputError::UnknownRecord(id.to_string()).into())
    }

    /// Compare the catalog with the output directory. Nothing is repaired.
    pub fn verify(&self) -> Result<Vec<Inconsistency>, PipelineError> {
        let catalog = self.store.load()?;
        let mut issues = Vec::new();

        for record in &catalog.thumbnails {
            let path = self.artifact_path(record);
            if !path.is_file() {
                issues.push(Inconsistency::MissingFile {
                    id: record.id.clone(),
                    filename: record.filename.clone(),
                });
            } else if let Err(e) = image::image_dimensions(&path) {
                issues.push(Inconsistency::Undecodable {
                    id: record.id.clone(),
                    filename: record.filename.clone(),
                    reason: e.to_string(),
                });
            }
        }

        if self.output_dir.is_dir() {
            let mut orphans = Vec::new();
            for entry in WalkDir::new(&self.output_dir).min_depth(1).max_depth(1) {
                let entry = entry.map_err(std::io::Error::from)?;
                if !entry.file_type().is_file() {
                    continue;
                }
                let name = entry.file_name().to_string_lossy();
                // staging files from in-flight writes
                if name.starts_with('.') {
                    continue;
                }
                if !catalog.filename_taken(&name) {
                    orphans.push(name.into_owned());
                }
            }
            orphans.sort();
            issues.extend(
                orphans
                    .into_iter()
                    .map(|filename| Inconsistency::Orphan { filename }),
            );
        }
        Ok(issues)
    }

    /// Copy every existing artifact file into `dest`. Returns how many were copied.
    pub fn export(&self, dest: &Path) -> Result<usize, PipelineError> {
        let catalog = self.store.load()?;
        fs::create_dir_all(dest)?;
        let mut copied = 0;
        for record in &catalog.thumbnails {
            let src = self.artifact_path(record);
            if !src.is_file() {
                tracing::warn!(filename = %record.filename, "artifact missing, not exported");
                continue;
            }
            fs::copy(&src, dest.join(&record.filename))?;
            copied += 1;
        }
        tracing::info!(copied, dest = %dest.display(), "artifacts exported");
        Ok(copied)
    }

    // =========================================================================
    // Library
    // =========================================================================

    /// Copy a record into the library. Returns `false` if it was already there.
    pub fn save_to_library(&self, id: &str) -> Result<bool, PipelineError> {
        self.store.update(|catalog| {
            catalog
                .save_to_library(id)
                .ok_or_else(|| PipelineError::from(InputError::UnknownRecord(id.to_string())))
        })
    }

    /// Drop a library copy. Returns `false` if there was none.
    pub fn remove_from_library(&self, id: &str) -> Result<bool, PipelineError> {
        self.store
            .update(|catalog| Ok::<_, PipelineError>(catalog.remove_from_library(id)))
    }

    pub fn library(&self) -> Result<Vec<ArtifactRecord>, PipelineError> {
        Ok(self.store.load()?.library.images)
    }
}

/// Filename for a new record: the slug of its copy, made unique with a
/// suffix from `id` when another record already owns it.
pub fn artifact_filename(catalog: &Catalog, data: &RowData, id: &str) -> String {
    let stem = slugify(&rows::slug_source(data));
    let filename = format!("{stem}.{ARTIFACT_EXT}");
    if !catalog.filename_taken(&filename) {
        return filename;
    }
    let suffix: String = id
        .chars()
        .filter(char::is_ascii_hexdigit)
        .take(COLLISION_SUFFIX_LEN)
        .collect();
    format!("{stem}-{suffix}.{ARTIFACT_EXT}")
}

fn file_url(path: &Path) -> std::io::Result<String> {
    Ok(format!("file://{}", std::path::absolute(path)?.display()))
}

/// Reject uploads that are missing or not an accepted image type.
fn check_upload(src: &Path) -> Result<(), InputError> {
    let ext = src
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();
    if !UPLOAD_EXTENSIONS.contains(&ext.as_str()) {
        return Err(InputError::UnsupportedUpload(src.display().to_string()));
    }
    if !src.is_file() {
        return Err(InputError::MissingUpload(src.to_path_buf()));
    }
    Ok(())
}

/// Creation time of a freshly written file, falling back to its
/// modification time, then to now.
fn file_timestamp(path: &Path) -> DateTime<Utc> {
    fs::metadata(path)
        .and_then(|m| m.created().or_else(|_| m.modified()))
        .map(DateTime::<Utc>::from)
        .unwrap_or_else(|_| Utc::now())
}
