//! Canonical row assembly.
//!
//! Every artifact is rendered from a flat `field → text` map ([`RowData`]).
//! Two input shapes are normalized into it:
//!
//! - **Tabular**: one CSV row becomes one map, verbatim. Column names pass
//!   through unchanged, so templates can reference any extra column.
//! - **Manual**: five line-separated text blocks (badges, titles, highlight
//!   words, subtitles, image URLs) are zipped by line index. The longest
//!   block decides how many rows come out; shorter blocks contribute empty
//!   strings.
//!
//! ## Highlight markup
//!
//! A title may carry one highlighted product name:
//!
//! ```text
//! Buy <span class='highlight'>Shoes</span> Now
//! ```
//!
//! The highlighted text doubles as the product name used for the artifact's
//! filename (see [`slug_source`]) and is what bulk title edits carry over.

use rand::Rng;
use rand::seq::SliceRandom;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Field name → text content for one artifact.
pub type RowData = BTreeMap<String, String>;

pub const BADGE: &str = "badge";
pub const MAIN_TITLE: &str = "main_title";
pub const SUB_TITLE: &str = "sub_title";
pub const IMAGE_URL: &str = "image_url";

/// Opening marker wrapped around a highlighted product name.
pub const HIGHLIGHT_OPEN: &str = "<span class='highlight'>";
/// Closing marker for [`HIGHLIGHT_OPEN`].
pub const HIGHLIGHT_CLOSE: &str = "</span>";

/// Title used for slug derivation when a row has no `main_title` at all.
const MISSING_TITLE: &str = "untitled";

#[derive(Error, Debug)]
pub enum RowError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
    #[error("No data entered")]
    Empty,
}

/// Raw manual-entry input: one text block per column, one line per artifact.
#[derive(Debug, Clone, Default)]
pub struct ManualColumns {
    pub badges: String,
    pub main_titles: String,
    pub highlight_words: String,
    pub sub_titles: String,
    pub image_urls: String,
}

/// Read every row of a CSV file (first line is the header).
///
/// Rows shorter than the header simply lack the trailing keys.
pub fn read_csv(path: &Path) -> Result<Vec<RowData>, RowError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    let headers = reader.headers()?.clone();
    let mut rows = Vec::new();
    for record in reader.records() {
        let record = record?;
        rows.push(
            headers
                .iter()
                .zip(record.iter())
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        );
    }
    Ok(rows)
}

/// Zip manual-entry columns into rows.
///
/// The row count is the length of the longest column; missing lines are
/// empty strings. Fails with [`RowError::Empty`] when every column is empty.
pub fn assemble_manual(columns: &ManualColumns) -> Result<Vec<RowData>, RowError> {
    let badges: Vec<&str> = columns.badges.lines().collect();
    let titles: Vec<&str> = columns.main_titles.lines().collect();
    let highlights: Vec<&str> = columns.highlight_words.lines().collect();
    let sub_titles: Vec<&str> = columns.sub_titles.lines().collect();
    let image_urls: Vec<&str> = columns.image_urls.lines().collect();

    let count = [
        badges.len(),
        titles.len(),
        highlights.len(),
        sub_titles.len(),
        image_urls.len(),
    ]
    .into_iter()
    .max()
    .unwrap_or(0);

    if count == 0 {
        return Err(RowError::Empty);
    }

    let at = |lines: &[&str], i: usize| lines.get(i).copied().unwrap_or("").to_string();

    Ok((0..count)
        .map(|i| {
            let title = highlight_title(&at(&titles, i), &at(&highlights, i));
            RowData::from([
                (BADGE.to_string(), at(&badges, i)),
                (MAIN_TITLE.to_string(), title),
                (SUB_TITLE.to_string(), at(&sub_titles, i)),
                (IMAGE_URL.to_string(), at(&image_urls, i)),
            ])
        })
        .collect())
}

/// Wrap the first occurrence of `word` in `title` with the highlight marker.
///
/// An empty word, or one that does not occur verbatim, leaves the title
/// untouched.
pub fn highlight_title(title: &str, word: &str) -> String {
    if word.is_empty() || !title.contains(word) {
        return title.to_string();
    }
    title.replacen(word, &wrap_highlight(word), 1)
}

pub fn wrap_highlight(text: &str) -> String {
    format!("{HIGHLIGHT_OPEN}{text}{HIGHLIGHT_CLOSE}")
}

/// Text inside the first highlight span of a title, if any.
pub fn highlighted_name(title: &str) -> Option<&str> {
    let start = title.find(HIGHLIGHT_OPEN)? + HIGHLIGHT_OPEN.len();
    let len = title[start..].find(HIGHLIGHT_CLOSE)?;
    Some(&title[start..start + len])
}

/// Product name used for filenames: the highlighted span, else the whole title.
pub fn product_name_for_slug(data: &RowData) -> &str {
    let title = data.get(MAIN_TITLE).map(String::as_str).unwrap_or(MISSING_TITLE);
    highlighted_name(title).unwrap_or(title)
}

/// The text a new artifact's filename is slugified from.
///
/// `"{badge} {product name} {sub_title}"`, trimmed.
pub fn slug_source(data: &RowData) -> String {
    let field = |key: &str| data.get(key).map(String::as_str).unwrap_or("");
    format!(
        "{} {} {}",
        field(BADGE),
        product_name_for_slug(data),
        field(SUB_TITLE)
    )
    .trim()
    .to_string()
}

// =============================================================================
// CSV image respin
// =============================================================================

/// Outcome of respinning one CSV file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RespinOutcome {
    /// File rewritten; number of data rows touched.
    Updated { rows: usize },
    /// File had no header row.
    SkippedEmpty,
    /// Neither an `image_url` nor an `image` column exists.
    SkippedNoImageColumn,
}

/// Rewrite the image column of every `.csv` file in `dir` with random picks
/// from `urls`. Returns one outcome per file, sorted by path.
pub fn respin_csv_dir(
    dir: &Path,
    urls: &[String],
    rng: &mut impl Rng,
) -> Result<Vec<(PathBuf, RespinOutcome)>, RowError> {
    if urls.is_empty() {
        return Err(RowError::Empty);
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| {
            p.is_file()
                && p.extension()
                    .map(|e| e.eq_ignore_ascii_case("csv"))
                    .unwrap_or(false)
        })
        .collect();
    files.sort();

    let mut outcomes = Vec::new();
    for path in files {
        let outcome = respin_csv_file(&path, urls, rng)?;
        outcomes.push((path, outcome));
    }
    Ok(outcomes)
}

fn respin_csv_file(
    path: &Path,
    urls: &[String],
    rng: &mut impl Rng,
) -> Result<RespinOutcome, RowError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut records = reader.records();

    let header = match records.next() {
        Some(h) => h?,
        None => return Ok(RespinOutcome::SkippedEmpty),
    };
    let column = header
        .iter()
        .position(|h| h == IMAGE_URL)
        .or_else(|| header.iter().position(|h| h == "image"));
    let Some(column) = column else {
        return Ok(RespinOutcome::SkippedNoImageColumn);
    };

    let mut rows = Vec::new();
    let mut touched = 0;
    for record in records {
        let mut row: Vec<String> = record?.iter().map(String::from).collect();
        if row.len() > column
            && let Some(url) = urls.choose(rng)
        {
            row[column] = url.clone();
            touched += 1;
        }
        rows.push(row);
    }

    let mut writer = csv::WriterBuilder::new().flexible(true).from_path(path)?;
    writer.write_record(&header)?;
    for row in &rows {
        writer.write_record(row)?;
    }
    writer.flush()?;

    Ok(RespinOutcome::Updated { rows: touched })
}
