//! Batch variants of the update path.
//!
//! | Operation | Changes | Template |
//! |---|---|---|
//! | [`Pipeline::swap_all_templates`] | template | the new one |
//! | [`Pipeline::edit_all_text`] | badge / main_title / sub_title | each record's own |
//! | [`Pipeline::spin_all`] | image_url (random pick) | each record's own |
//! | [`Pipeline::spin_one`] | image_url of one record | its own |
//!
//! Records are processed one at a time and independently: a record whose
//! render fails is reported in [`BulkReport::failures`] and keeps its old
//! data, while every record that rendered is committed in a single catalog
//! write at the end. Input problems (unknown template, empty catalog, empty
//! URL list, nothing to edit) are detected before the first render.
//!
//! ## Title format
//!
//! [`TextEdit::main_title_format`] may contain `{product_name}`, which is
//! replaced by the record's current highlighted product name, re-wrapped in
//! the highlight span:
//!
//! ```text
//! format:  "{product_name} Sale"
//! before:  "Buy <span class='highlight'>Shoes</span> Now"
//! after:   "<span class='highlight'>Shoes</span> Sale"
//! ```
//!
//! A record without a highlight gets the placeholder replaced by nothing.

use crate::catalog::ArtifactRecord;
use crate::pipeline::{InputError, Pipeline, PipelineError};
use crate::render::RenderEngine;
use crate::rows::{BADGE, IMAGE_URL, MAIN_TITLE, RowData, SUB_TITLE, highlighted_name, wrap_highlight};
use crate::template::TemplateStore;
use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;

/// Placeholder for the highlighted product name in a title format.
pub const PRODUCT_NAME_PLACEHOLDER: &str = "{product_name}";

/// Text replacements for [`Pipeline::edit_all_text`]. Empty strings count
/// as "leave unchanged".
#[derive(Debug, Clone, Default)]
pub struct TextEdit {
    pub badge: Option<String>,
    pub main_title_format: Option<String>,
    pub sub_title: Option<String>,
}

impl TextEdit {
    fn given(value: &Option<String>) -> Option<&str> {
        value.as_deref().filter(|v| !v.is_empty())
    }

    pub fn is_empty(&self) -> bool {
        Self::given(&self.badge).is_none()
            && Self::given(&self.main_title_format).is_none()
            && Self::given(&self.sub_title).is_none()
    }

    /// The record data after this edit.
    pub fn apply(&self, data: &RowData) -> RowData {
        let mut out = data.clone();
        if let Some(badge) = Self::given(&self.badge) {
            out.insert(BADGE.to_string(), badge.to_string());
        }
        if let Some(format) = Self::given(&self.main_title_format) {
            let current = data.get(MAIN_TITLE).map(String::as_str).unwrap_or("");
            out.insert(MAIN_TITLE.to_string(), format_title(format, current));
        }
        if let Some(sub_title) = Self::given(&self.sub_title) {
            out.insert(SUB_TITLE.to_string(), sub_title.to_string());
        }
        out
    }
}

/// Build a new title from `format`, carrying over the highlighted product
/// name of `current_title`.
pub fn format_title(format: &str, current_title: &str) -> String {
    if !format.contains(PRODUCT_NAME_PLACEHOLDER) {
        return format.to_string();
    }
    let replacement = highlighted_name(current_title)
        .map(wrap_highlight)
        .unwrap_or_default();
    format.replace(PRODUCT_NAME_PLACEHOLDER, &replacement)
}

/// One record that could not be updated.
#[derive(Debug)]
pub struct BulkFailure {
    pub id: String,
    pub filename: String,
    pub error: PipelineError,
}

#[derive(Debug, Default)]
pub struct BulkReport {
    pub updated: Vec<ArtifactRecord>,
    pub failures: Vec<BulkFailure>,
}

impl<T: TemplateStore, R: RenderEngine> Pipeline<'_, T, R> {
    /// Re-render every record with `template_name`.
    pub fn swap_all_templates(&self, template_name: &str) -> Result<BulkReport, PipelineError> {
        let html = self.template_html(template_name)?;
        self.bulk_update(|_record| Ok((template_name.to_string(), html.clone(), None)))
    }

    /// Apply the same text edit to every record and re-render.
    pub fn edit_all_text(&self, edit: &TextEdit) -> Result<BulkReport, PipelineError> {
        if edit.is_empty() {
            return Err(InputError::NoTextEdits.into());
        }
        let mut templates = TemplateCache::default();
        self.bulk_update(|record| {
            let html = templates.get(self, &record.template)?;
            Ok((record.template.clone(), html, Some(edit.apply(&record.data))))
        })
    }

    /// Give every record a random image from `urls` and re-render.
    pub fn spin_all(&self, urls: &[String], rng: &mut impl Rng) -> Result<BulkReport, PipelineError> {
        if urls.is_empty() {
            return Err(InputError::NoImageUrls.into());
        }
        let mut templates = TemplateCache::default();
        self.bulk_update(|record| {
            let html = templates.get(self, &record.template)?;
            Ok((record.template.clone(), html, Some(spun(&record.data, urls, rng))))
        })
    }

    /// Give one record a random image from `urls` and re-render it.
    pub fn spin_one(
        &self,
        id: &str,
        urls: &[String],
        rng: &mut impl Rng,
    ) -> Result<ArtifactRecord, PipelineError> {
        if urls.is_empty() {
            return Err(InputError::NoImageUrls.into());
        }
        self.store().update(|catalog| -> Result<_, PipelineError> {
            let record = catalog
                .get(id)
                .ok_or_else(|| InputError::UnknownRecord(id.to_string()))?;
            let template_name = record.template.clone();
            let data = spun(&record.data, urls, rng);
            let html = self.template_html(&template_name)?;
            let updated = self.rerender_in(catalog, id, &template_name, &html, data)?;
            tracing::info!(id, image_url = %updated.data[IMAGE_URL], "image spun");
            Ok(updated)
        })
    }

    /// Shared driver: for each record, `plan` yields the template name, its
    /// HTML, and the new data (`None` keeps the data as is).
    fn bulk_update(
        &self,
        mut plan: impl FnMut(&ArtifactRecord) -> Result<(String, String, Option<RowData>), PipelineError>,
    ) -> Result<BulkReport, PipelineError> {
        self.store().update(|catalog| -> Result<_, PipelineError> {
            if catalog.is_empty() {
                return Err(InputError::EmptyCatalog.into());
            }
            let mut report = BulkReport::default();
            let ids: Vec<String> = catalog.thumbnails.iter().map(|r| r.id.clone()).collect();

            for id in ids {
                let Some(record) = catalog.get(&id).cloned() else {
                    continue;
                };
                let outcome = plan(&record).and_then(|(template_name, html, data)| {
                    let data = data.unwrap_or_else(|| record.data.clone());
                    self.rerender_in(catalog, &id, &template_name, &html, data)
                });
                match outcome {
                    Ok(updated) => report.updated.push(updated),
                    Err(error) => {
                        tracing::warn!(id = %id, filename = %record.filename, %error, "bulk update failed for record");
                        report.failures.push(BulkFailure {
                            id,
                            filename: record.filename,
                            error,
                        });
                    }
                }
            }
            tracing::info!(
                updated = report.updated.len(),
                failed = report.failures.len(),
                "bulk update finished"
            );
            Ok(report)
        })
    }
}

/// Copy of `data` with `image_url` set to a random pick from `urls`.
fn spun(data: &RowData, urls: &[String], rng: &mut impl Rng) -> RowData {
    let mut out = data.clone();
    if let Some(url) = urls.choose(rng) {
        out.insert(IMAGE_URL.to_string(), url.clone());
    }
    out
}

/// Template text loaded once per name for the duration of a bulk run.
#[derive(Default)]
struct TemplateCache(BTreeMap<String, String>);

impl TemplateCache {
    fn get<T: TemplateStore, R: RenderEngine>(
        &mut self,
        pipeline: &Pipeline<'_, T, R>,
        name: &str,
    ) -> Result<String, PipelineError> {
        if let Some(html) = self.0.get(name) {
            return Ok(html.clone());
        }
        let html = pipeline.template_html(name)?;
        self.0.insert(name.to_string(), html.clone());
        Ok(html)
    }
}
