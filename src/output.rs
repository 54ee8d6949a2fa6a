//! CLI output formatting for every command.
//!
//! # Information-First Display
//!
//! A thumbnail is shown by what it says, not by its file: the header line is
//! the positional index plus the plain-text title, with the artifact file
//! after an arrow. Ids, templates and timestamps are indented context lines.
//!
//! ```text
//! 001 Buy Shoes Now → new-shoes-limited.png
//!     Id: 5f0c3a9e-…
//!     Template: basic.html
//!     Created: 2026-10-19 09:12 UTC
//! ```
//!
//! Reports from batch and bulk commands end with a one-line summary:
//!
//! ```text
//! 001 Buy Shoes Now → new-shoes-limited.png
//! 002 Buy Boots Now → new-boots-limited.png
//!
//! Failed
//!     row 003: Render failed: Render timed out after 60s
//!
//! Generated 2 thumbnails, 1 failed
//! ```
//!
//! # Architecture
//!
//! Each command has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure: no I/O, no side effects.

use crate::bulk::BulkReport;
use crate::catalog::ArtifactRecord;
use crate::pipeline::{BatchReport, ClearReport, DeleteOutcome, Inconsistency};
use crate::publish::PostReceipt;
use crate::rows::{MAIN_TITLE, RespinOutcome};
use chrono::FixedOffset;
use std::path::{Path, PathBuf};

// ============================================================================
// Shared display helpers
// ============================================================================

/// Format a 1-based position as zero-padded 3-digit string.
fn format_index(pos: usize) -> String {
    format!("{:0>3}", pos)
}

/// Indentation string for a given depth level (4 spaces per level).
fn indent(depth: usize) -> String {
    "    ".repeat(depth)
}

/// Strip HTML tags from a string (simple angle-bracket stripping).
fn strip_html_tags(html: &str) -> String {
    let mut result = String::with_capacity(html.len());
    let mut in_tag = false;
    for c in html.chars() {
        match c {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => result.push(c),
            _ => {}
        }
    }
    result
}

/// Plain-text title of a record, or `(untitled)`.
fn display_title(record: &ArtifactRecord) -> String {
    let title = record
        .data
        .get(MAIN_TITLE)
        .map(|t| strip_html_tags(t).trim().to_string())
        .unwrap_or_default();
    if title.is_empty() {
        "(untitled)".to_string()
    } else {
        title
    }
}

/// `001 Buy Shoes Now → new-shoes-limited.png`
fn record_header(index: usize, record: &ArtifactRecord) -> String {
    format!(
        "{} {} → {}",
        format_index(index),
        display_title(record),
        record.filename
    )
}

fn plural(n: usize, word: &str) -> String {
    if n == 1 {
        format!("{n} {word}")
    } else {
        format!("{n} {word}s")
    }
}

/// Print pre-formatted lines to stdout.
pub fn print_lines(lines: Vec<String>) {
    for line in lines {
        println!("{}", line);
    }
}

// ============================================================================
// Records
// ============================================================================

/// One header plus context lines per record.
pub fn format_records(records: &[ArtifactRecord]) -> Vec<String> {
    if records.is_empty() {
        return vec!["No thumbnails".to_string()];
    }
    let mut lines = Vec::new();
    for (i, record) in records.iter().enumerate() {
        lines.push(record_header(i + 1, record));
        lines.push(format!("{}Id: {}", indent(1), record.id));
        lines.push(format!("{}Template: {}", indent(1), record.template));
        lines.push(format!(
            "{}Created: {}",
            indent(1),
            record.created_at.format("%Y-%m-%d %H:%M UTC")
        ));
    }
    lines
}

pub fn print_records(records: &[ArtifactRecord]) {
    print_lines(format_records(records));
}

/// A single record with every data field.
pub fn format_record_detail(record: &ArtifactRecord) -> Vec<String> {
    let mut lines = vec![
        format!("{} → {}", display_title(record), record.filename),
        format!("{}Id: {}", indent(1), record.id),
        format!("{}Template: {}", indent(1), record.template),
        format!("{}Data:", indent(1)),
    ];
    for (key, value) in &record.data {
        lines.push(format!("{}{key}: {value}", indent(2)));
    }
    lines
}

pub fn print_record_detail(record: &ArtifactRecord) {
    print_lines(format_record_detail(record));
}

// ============================================================================
// Batch / bulk reports
// ============================================================================

pub fn format_batch_report(report: &BatchReport) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, record) in report.created.iter().enumerate() {
        lines.push(record_header(i + 1, record));
    }
    if !report.failures.is_empty() {
        lines.push(String::new());
        lines.push("Failed".to_string());
        for failure in &report.failures {
            lines.push(format!(
                "{}row {}: {}",
                indent(1),
                format_index(failure.index + 1),
                failure.error
            ));
        }
    }
    lines.push(String::new());
    let mut summary = format!("Generated {}", plural(report.created.len(), "thumbnail"));
    if !report.failures.is_empty() {
        summary.push_str(&format!(", {} failed", report.failures.len()));
    }
    lines.push(summary);
    lines
}

pub fn print_batch_report(report: &BatchReport) {
    print_lines(format_batch_report(report));
}

pub fn format_bulk_report(report: &BulkReport) -> Vec<String> {
    let mut lines = Vec::new();
    for (i, record) in report.updated.iter().enumerate() {
        lines.push(record_header(i + 1, record));
    }
    if !report.failures.is_empty() {
        lines.push(String::new());
        lines.push("Failed".to_string());
        for failure in &report.failures {
            lines.push(format!("{}{}: {}", indent(1), failure.filename, failure.error));
        }
    }
    lines.push(String::new());
    let mut summary = format!("Updated {}", plural(report.updated.len(), "thumbnail"));
    if !report.failures.is_empty() {
        summary.push_str(&format!(", {} failed", report.failures.len()));
    }
    lines.push(summary);
    lines
}

pub fn print_bulk_report(report: &BulkReport) {
    print_lines(format_bulk_report(report));
}

// ============================================================================
// Deletion
// ============================================================================

pub fn format_delete(outcome: &DeleteOutcome) -> Vec<String> {
    let mut lines = vec![format!(
        "Deleted {} → {}",
        display_title(&outcome.record),
        outcome.record.filename
    )];
    if outcome.kept_for_library {
        lines.push(format!("{}File kept: a library copy uses it", indent(1)));
    }
    if let Some(warning) = &outcome.file_warning {
        lines.push(format!("{}Warning: {warning}", indent(1)));
    }
    lines
}

pub fn format_clear(report: &ClearReport) -> Vec<String> {
    let mut lines = vec![format!("Cleared {}", plural(report.removed, "thumbnail"))];
    if report.kept_for_library > 0 {
        lines.push(format!(
            "{}Kept {} used by library copies",
            indent(1),
            plural(report.kept_for_library, "file")
        ));
    }
    for warning in &report.file_warnings {
        lines.push(format!("{}Warning: {warning}", indent(1)));
    }
    lines
}

// ============================================================================
// Verify
// ============================================================================

pub fn format_inconsistencies(issues: &[Inconsistency]) -> Vec<String> {
    if issues.is_empty() {
        return vec!["Catalog and output directory agree".to_string()];
    }
    let mut lines = Vec::new();
    for issue in issues {
        match issue {
            Inconsistency::MissingFile { id, filename } => {
                lines.push(format!("Missing file: {filename}"));
                lines.push(format!("{}Id: {id}", indent(1)));
            }
            Inconsistency::Undecodable {
                id,
                filename,
                reason,
            } => {
                lines.push(format!("Unreadable image: {filename}"));
                lines.push(format!("{}Id: {id}", indent(1)));
                lines.push(format!("{}Reason: {reason}", indent(1)));
            }
            Inconsistency::Orphan { filename } => {
                lines.push(format!("Untracked file: {filename}"));
            }
        }
    }
    lines.push(String::new());
    lines.push(format!("Found {}", plural(issues.len(), "problem")));
    lines
}

pub fn print_inconsistencies(issues: &[Inconsistency]) {
    print_lines(format_inconsistencies(issues));
}

// ============================================================================
// Templates, settings, CSV
// ============================================================================

pub fn format_templates(names: &[String], root: &Path) -> Vec<String> {
    if names.is_empty() {
        return vec![format!("No templates in {}", root.display())];
    }
    names
        .iter()
        .enumerate()
        .map(|(i, name)| format!("{} {}", format_index(i + 1), name))
        .collect()
}

pub fn format_image_urls(urls: &[String]) -> Vec<String> {
    if urls.is_empty() {
        return vec!["No image URLs saved".to_string()];
    }
    urls.iter()
        .enumerate()
        .map(|(i, url)| format!("{} {}", format_index(i + 1), url))
        .collect()
}

pub fn format_respin(outcomes: &[(PathBuf, RespinOutcome)]) -> Vec<String> {
    if outcomes.is_empty() {
        return vec!["No CSV files found".to_string()];
    }
    outcomes
        .iter()
        .map(|(path, outcome)| {
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            match outcome {
                RespinOutcome::Updated { rows } => {
                    format!("{name}: updated {}", plural(*rows, "row"))
                }
                RespinOutcome::SkippedEmpty => format!("{name}: skipped (empty)"),
                RespinOutcome::SkippedNoImageColumn => {
                    format!("{name}: skipped (no image_url or image column)")
                }
            }
        })
        .collect()
}

// ============================================================================
// Publish
// ============================================================================

/// Scheduled times are shown at the same offset the schedule was entered in.
pub fn format_receipt(receipt: &PostReceipt, offset: FixedOffset) -> Vec<String> {
    let mut lines = vec![match receipt.scheduled_for {
        Some(at) => format!(
            "Post scheduled for {}! Post ID: {}",
            at.with_timezone(&offset).format("%Y-%m-%d %H:%M %:z"),
            receipt.post_id
        ),
        None => format!("Post published successfully! Post ID: {}", receipt.post_id),
    }];
    if let Some(err) = &receipt.comment_error {
        lines.push(format!("{}Warning: first comment not posted: {err}", indent(1)));
    }
    lines
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bulk::BulkFailure;
    use crate::pipeline::{InputError, PipelineError, RowFailure};
    use crate::render::RenderError;
    use crate::rows::RowData;
    use chrono::{TimeZone, Utc};
    use std::time::Duration;

    fn record(title: &str, filename: &str) -> ArtifactRecord {
        ArtifactRecord {
            id: format!("id-{filename}"),
            filename: filename.into(),
            template: "basic.html".into(),
            data: RowData::from([(MAIN_TITLE.to_string(), title.to_string())]),
            created_at: Utc.with_ymd_and_hms(2026, 10, 19, 9, 12, 0).unwrap(),
        }
    }

    // =========================================================================
    // Helper tests
    // =========================================================================

    #[test]
    fn format_index_pads() {
        assert_eq!(format_index(1), "001");
        assert_eq!(format_index(42), "042");
        assert_eq!(format_index(1000), "1000");
    }

    #[test]
    fn strip_html_tags_removes_highlight() {
        assert_eq!(
            strip_html_tags("Buy <span class='highlight'>Shoes</span> Now"),
            "Buy Shoes Now"
        );
    }

    #[test]
    fn display_title_falls_back() {
        let mut r = record("", "a.png");
        assert_eq!(display_title(&r), "(untitled)");
        r.data.clear();
        assert_eq!(display_title(&r), "(untitled)");
    }

    // =========================================================================
    // Records
    // =========================================================================

    #[test]
    fn records_show_title_file_and_context() {
        let lines = format_records(&[record(
            "Buy <span class='highlight'>Shoes</span> Now",
            "new-shoes-now.png",
        )]);
        assert_eq!(
            lines,
            vec![
                "001 Buy Shoes Now → new-shoes-now.png",
                "    Id: id-new-shoes-now.png",
                "    Template: basic.html",
                "    Created: 2026-10-19 09:12 UTC",
            ]
        );
    }

    #[test]
    fn records_empty() {
        assert_eq!(format_records(&[]), vec!["No thumbnails"]);
    }

    #[test]
    fn record_detail_lists_data() {
        let mut r = record("T", "t.png");
        r.data.insert("badge".into(), "New".into());
        let lines = format_record_detail(&r);
        assert_eq!(lines[0], "T → t.png");
        assert!(lines.contains(&"        badge: New".to_string()));
        assert!(lines.contains(&"        main_title: T".to_string()));
    }

    // =========================================================================
    // Reports
    // =========================================================================

    #[test]
    fn batch_report_with_failure() {
        let report = BatchReport {
            created: vec![record("A", "a.png"), record("B", "b.png")],
            failures: vec![RowFailure {
                index: 2,
                error: PipelineError::Render(RenderError::Timeout(Duration::from_secs(60))),
            }],
        };
        let lines = format_batch_report(&report);
        assert_eq!(lines[0], "001 A → a.png");
        assert_eq!(lines[1], "002 B → b.png");
        assert!(lines.contains(&"Failed".to_string()));
        assert!(lines.contains(&"    row 003: Render failed: Render timed out after 60s".to_string()));
        assert_eq!(lines.last().unwrap(), "Generated 2 thumbnails, 1 failed");
    }

    #[test]
    fn batch_report_summary_singular() {
        let report = BatchReport {
            created: vec![record("A", "a.png")],
            failures: Vec::new(),
        };
        assert_eq!(
            format_batch_report(&report).last().unwrap(),
            "Generated 1 thumbnail"
        );
    }

    #[test]
    fn bulk_report_names_failed_files() {
        let report = BulkReport {
            updated: vec![record("A", "a.png")],
            failures: vec![BulkFailure {
                id: "x".into(),
                filename: "x.png".into(),
                error: PipelineError::Input(InputError::UnknownTemplate("gone.html".into())),
            }],
        };
        let lines = format_bulk_report(&report);
        assert!(lines.contains(&"    x.png: Template not found: gone.html".to_string()));
        assert_eq!(lines.last().unwrap(), "Updated 1 thumbnail, 1 failed");
    }

    #[test]
    fn delete_shows_warning() {
        let outcome = DeleteOutcome {
            record: record("A", "a.png"),
            file_warning: Some("gone".into()),
            kept_for_library: false,
        };
        assert_eq!(
            format_delete(&outcome),
            vec!["Deleted A → a.png", "    Warning: gone"]
        );
    }

    #[test]
    fn clear_summary() {
        let report = ClearReport {
            removed: 3,
            file_warnings: Vec::new(),
            kept_for_library: 0,
        };
        assert_eq!(format_clear(&report), vec!["Cleared 3 thumbnails"]);
    }

    #[test]
    fn delete_and_clear_mention_library_files() {
        let outcome = DeleteOutcome {
            record: record("A", "a.png"),
            file_warning: None,
            kept_for_library: true,
        };
        assert_eq!(
            format_delete(&outcome),
            vec!["Deleted A → a.png", "    File kept: a library copy uses it"]
        );
        let report = ClearReport {
            removed: 2,
            file_warnings: Vec::new(),
            kept_for_library: 1,
        };
        assert_eq!(
            format_clear(&report),
            vec!["Cleared 2 thumbnails", "    Kept 1 file used by library copies"]
        );
    }

    // =========================================================================
    // Verify / misc
    // =========================================================================

    #[test]
    fn inconsistencies_listed_with_summary() {
        let lines = format_inconsistencies(&[
            Inconsistency::MissingFile {
                id: "1".into(),
                filename: "a.png".into(),
            },
            Inconsistency::Orphan {
                filename: "b.png".into(),
            },
        ]);
        assert_eq!(lines[0], "Missing file: a.png");
        assert!(lines.contains(&"Untracked file: b.png".to_string()));
        assert_eq!(lines.last().unwrap(), "Found 2 problems");
    }

    #[test]
    fn no_inconsistencies() {
        assert_eq!(
            format_inconsistencies(&[]),
            vec!["Catalog and output directory agree"]
        );
    }

    #[test]
    fn templates_numbered() {
        let names = vec!["a.html".to_string(), "b.html".to_string()];
        assert_eq!(
            format_templates(&names, Path::new("t")),
            vec!["001 a.html", "002 b.html"]
        );
        assert_eq!(format_templates(&[], Path::new("t")), vec!["No templates in t"]);
    }

    #[test]
    fn respin_outcomes() {
        let lines = format_respin(&[
            (PathBuf::from("/x/a.csv"), RespinOutcome::Updated { rows: 1 }),
            (PathBuf::from("/x/b.csv"), RespinOutcome::SkippedNoImageColumn),
        ]);
        assert_eq!(lines[0], "a.csv: updated 1 row");
        assert_eq!(lines[1], "b.csv: skipped (no image_url or image column)");
    }

    #[test]
    fn receipt_shows_schedule_at_offset() {
        let offset = FixedOffset::east_opt(6 * 3600).unwrap();
        let receipt = PostReceipt {
            post_id: "1_2".into(),
            scheduled_for: Some(Utc.with_ymd_and_hms(2026, 3, 2, 3, 0, 0).unwrap()),
            comment_error: Some("denied".into()),
        };
        assert_eq!(
            format_receipt(&receipt, offset),
            vec![
                "Post scheduled for 2026-03-02 09:00 +06:00! Post ID: 1_2",
                "    Warning: first comment not posted: denied",
            ]
        );
    }
}
