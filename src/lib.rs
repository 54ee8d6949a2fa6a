//! # Thumbforge
//!
//! Renders marketing thumbnails from HTML templates and keeps a catalog of
//! them in sync with the image files on disk. Rows of text (badge, title,
//! subtitle, image URL) come from CSV files or hand-entered columns; each row
//! is substituted into a template, rendered to PNG by headless Chrome, and
//! recorded in a JSON catalog.
//!
//! # Architecture: Render, Then Commit
//!
//! Every operation that produces an artifact follows the same order:
//!
//! ```text
//! 1. Load     db.json           →  Catalog        (revision-checked)
//! 2. Render   template + row    →  generated/x.png (atomic rename)
//! 3. Commit   Catalog           →  db.json         (only if 2 succeeded)
//! ```
//!
//! A failed or timed-out render leaves both the catalog and the previous
//! artifact byte-identical. Batch and bulk operations isolate failures per
//! row and commit everything that succeeded in one save.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`slug`] | Text → URL-safe slug, upload file name sanitizing |
//! | [`rows`] | CSV import, manual column assembly, title highlighting, CSV image respin |
//! | [`template`] | Template directory store, `{{ key }}` substitution, stock template |
//! | [`render`] | `RenderEngine` trait, headless Chrome engine, timeout wrapper |
//! | [`catalog`] | Artifact records, library, revision-checked JSON store |
//! | [`pipeline`] | Create / refresh / swap / delete / verify artifacts |
//! | [`bulk`] | Catalog-wide template swap, text edit, and image spin |
//! | [`publish`] | Schedule rules and the Facebook Graph API publisher |
//! | [`settings`] | Saved image URLs and publishing credentials |
//! | [`config`] | `config.toml` loading and validation |
//! | [`output`] | CLI output formatting |
//!
//! # Design Decisions
//!
//! ## Filenames Are Stable
//!
//! An artifact's file name is derived once, at creation, from the highlighted
//! product name (or the title). Edits and template swaps re-render in place
//! under the same name, so links to a thumbnail survive every change except
//! deletion. Name collisions get a short suffix from the record id.
//!
//! ## One Catalog Writer At A Time
//!
//! The catalog carries a revision counter. A save whose loaded revision does
//! not match the one on disk is rejected rather than silently overwriting
//! another process's work.
//!
//! ## Bounded Renders
//!
//! Browsers hang. [`render::TimedRenderer`] bounds every render and cancels
//! the job so a late result can never land on disk.

pub mod bulk;
pub mod catalog;
pub mod config;
pub mod output;
pub mod pipeline;
pub mod publish;
pub mod render;
pub mod rows;
pub mod settings;
pub mod slug;
pub mod template;

#[cfg(test)]
pub(crate) mod test_helpers;
