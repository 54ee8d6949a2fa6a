//! Shared test utilities for the thumbforge test suite.
//!
//! Provides a recording render engine and a throwaway workspace with a
//! template directory, an output directory and a catalog store.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let ws = TestWorkspace::new();
//! let engine = MockRenderer::new();
//! let record = ws.pipeline(&engine).create(row("New", "Shoes", "Now"), BASIC).unwrap();
//!
//! assert_eq!(engine.rendered_files(), vec![record.filename.clone()]);
//! assert!(ws.artifact(&record.filename).exists());
//! ```

use std::io::Cursor;
use std::path::PathBuf;
use std::sync::Mutex;
use tempfile::TempDir;

use crate::catalog::{Catalog, CatalogStore};
use crate::pipeline::Pipeline;
use crate::render::{RenderEngine, RenderError, RenderJob, Viewport, write_artifact};
use crate::rows::{BADGE, IMAGE_URL, MAIN_TITLE, RowData, SUB_TITLE, wrap_highlight};
use crate::template::{DirTemplateStore, TemplateStore};

/// Template name present in every [`TestWorkspace`].
pub const BASIC: &str = "basic.html";
/// Second template present in every [`TestWorkspace`].
pub const ALT: &str = "alt.html";

// =========================================================================
// MockRenderer
// =========================================================================

/// One render call as seen by [`MockRenderer`].
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedJob {
    pub filename: String,
    pub html: String,
    pub viewport: Viewport,
}

/// Render engine that records jobs and writes a small real PNG.
///
/// Uses Mutex (not RefCell) so it satisfies the `Send + Sync` bound.
#[derive(Default)]
pub struct MockRenderer {
    pub jobs: Mutex<Vec<RecordedJob>>,
    /// Output file names that fail with [`RenderError::Engine`].
    pub fail_on: Mutex<Vec<String>>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(filenames: &[&str]) -> Self {
        Self {
            jobs: Mutex::new(Vec::new()),
            fail_on: Mutex::new(filenames.iter().map(|s| s.to_string()).collect()),
        }
    }

    pub fn fail_everything(&self) {
        self.fail_on.lock().unwrap().push("*".into());
    }

    pub fn get_jobs(&self) -> Vec<RecordedJob> {
        self.jobs.lock().unwrap().clone()
    }

    pub fn render_count(&self) -> usize {
        self.jobs.lock().unwrap().len()
    }

    pub fn rendered_files(&self) -> Vec<String> {
        self.get_jobs().into_iter().map(|j| j.filename).collect()
    }
}

impl RenderEngine for MockRenderer {
    fn render(&self, job: &RenderJob) -> Result<(), RenderError> {
        let filename = job
            .output
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.jobs.lock().unwrap().push(RecordedJob {
            filename: filename.clone(),
            html: job.html.clone(),
            viewport: job.viewport,
        });

        let fail = self
            .fail_on
            .lock()
            .unwrap()
            .iter()
            .any(|f| f == "*" || *f == filename);
        if fail {
            return Err(RenderError::Engine(format!("mock failure for {filename}")));
        }

        let mut png = Vec::new();
        image::RgbaImage::new(16, 9)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .map_err(|e| RenderError::Engine(e.to_string()))?;
        write_artifact(job, &png)
    }
}

// =========================================================================
// Workspace fixture
// =========================================================================

/// Temp directory laid out like a real workspace.
pub struct TestWorkspace {
    pub tmp: TempDir,
    pub templates: DirTemplateStore,
    pub store: CatalogStore,
}

impl TestWorkspace {
    /// Workspace with [`BASIC`] and [`ALT`] templates and an empty catalog.
    pub fn new() -> Self {
        let tmp = TempDir::new().unwrap();
        let templates = DirTemplateStore::new(tmp.path().join("templates"));
        templates
            .write(
                BASIC,
                "<html><head></head><body><b>{{ badge }}</b><h1>{{ main_title | safe }}</h1><p>{{ sub_title }}</p><img src=\"{{ image_url }}\"></body></html>",
            )
            .unwrap();
        templates
            .write(ALT, "<div class=\"alt\">{{ main_title | safe }} / {{ image_url }}</div>")
            .unwrap();
        let store = CatalogStore::new(tmp.path().join("db.json"));
        Self {
            tmp,
            templates,
            store,
        }
    }

    pub fn output_dir(&self) -> PathBuf {
        self.tmp.path().join("generated")
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.tmp.path().join("uploads")
    }

    pub fn artifact(&self, filename: &str) -> PathBuf {
        self.output_dir().join(filename)
    }

    pub fn catalog(&self) -> Catalog {
        self.store.load().unwrap()
    }

    /// Raw catalog bytes, or empty when the file doesn't exist yet.
    pub fn catalog_bytes(&self) -> Vec<u8> {
        std::fs::read(self.store.path()).unwrap_or_default()
    }

    pub fn pipeline<'a>(
        &'a self,
        engine: &'a MockRenderer,
    ) -> Pipeline<'a, DirTemplateStore, MockRenderer> {
        Pipeline::new(
            &self.templates,
            engine,
            &self.store,
            self.output_dir(),
            self.uploads_dir(),
        )
    }
}

/// Canonical row with `product` highlighted inside `"Buy {product} Now"`.
pub fn row(badge: &str, product: &str, sub_title: &str) -> RowData {
    RowData::from([
        (BADGE.to_string(), badge.to_string()),
        (
            MAIN_TITLE.to_string(),
            format!("Buy {} Now", wrap_highlight(product)),
        ),
        (SUB_TITLE.to_string(), sub_title.to_string()),
        (IMAGE_URL.to_string(), "https://img.example/1.png".to_string()),
    ])
}
