//! Named HTML templates and placeholder substitution.
//!
//! A template is a plain HTML document stored under a name ending in
//! `.html`. Artifact records keep the *name*, never the content, so editing
//! a template changes every future re-render of the records that use it and
//! leaves already-rendered images alone.
//!
//! ## Placeholders
//!
//! ```text
//! {{ badge }}               → value, HTML-escaped
//! {{ main_title | safe }}   → value inserted raw (keeps highlight markup)
//! {{ unknown_field }}       → left exactly as written
//! ```
//!
//! Substitution is deliberately small: no loops, no conditionals, no
//! expressions. A placeholder that names a field missing from the row, or
//! uses a filter other than `safe`, passes through untouched so the problem
//! is visible in the rendered image instead of silently disappearing.

use crate::rows::RowData;
use crate::slug::sanitize_file_name;
use maud::{DOCTYPE, PreEscaped, html};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

const TEMPLATE_EXT: &str = ".html";

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Directory walk failed: {0}")]
    Walk(#[from] walkdir::Error),
    #[error("Invalid template name: {0}")]
    InvalidName(String),
    #[error("Template not found: {0}")]
    NotFound(String),
}

/// Storage for named templates.
pub trait TemplateStore {
    /// All template names, sorted.
    fn list_templates(&self) -> Result<Vec<String>, TemplateError>;

    /// Full HTML text of a template.
    fn read(&self, name: &str) -> Result<String, TemplateError>;

    /// Store a template, returning the name it was stored under.
    fn write(&self, name: &str, text: &str) -> Result<String, TemplateError>;

    fn exists(&self, name: &str) -> bool {
        self.read(name).is_ok()
    }
}

/// Templates kept as `*.html` files in one directory.
#[derive(Debug, Clone)]
pub struct DirTemplateStore {
    root: PathBuf,
}

impl DirTemplateStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl TemplateStore for DirTemplateStore {
    fn list_templates(&self) -> Result<Vec<String>, TemplateError> {
        if !self.root.is_dir() {
            return Ok(Vec::new());
        }
        let mut names = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(1).max_depth(1) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let name = entry.file_name().to_string_lossy();
            if name.ends_with(TEMPLATE_EXT) {
                names.push(name.into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    fn read(&self, name: &str) -> Result<String, TemplateError> {
        validate_name(name)?;
        let path = self.root.join(name);
        if !path.is_file() {
            return Err(TemplateError::NotFound(name.to_string()));
        }
        Ok(fs::read_to_string(path)?)
    }

    fn write(&self, name: &str, text: &str) -> Result<String, TemplateError> {
        let mut stored = sanitize_file_name(name);
        if stored.is_empty() {
            return Err(TemplateError::InvalidName(name.to_string()));
        }
        if !stored.ends_with(TEMPLATE_EXT) {
            stored.push_str(TEMPLATE_EXT);
        }
        fs::create_dir_all(&self.root)?;
        fs::write(self.root.join(&stored), text)?;
        Ok(stored)
    }
}

/// Reject names that could escape the template directory or aren't HTML.
pub fn validate_name(name: &str) -> Result<(), TemplateError> {
    if name.contains("..")
        || name.contains('/')
        || name.contains('\\')
        || !name.ends_with(TEMPLATE_EXT)
        || name.len() == TEMPLATE_EXT.len()
    {
        return Err(TemplateError::InvalidName(name.to_string()));
    }
    Ok(())
}

// =============================================================================
// Substitution
// =============================================================================

/// Replace `{{ field }}` placeholders with values from `data`.
pub fn substitute(template: &str, data: &RowData) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(open) = rest.find("{{") {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 2..];
        let Some(close) = after_open.find("}}") else {
            out.push_str(&rest[open..]);
            return out;
        };
        let placeholder = &rest[open..open + 2 + close + 2];
        match resolve_placeholder(&after_open[..close], data) {
            Some(value) => out.push_str(&value),
            None => out.push_str(placeholder),
        }
        rest = &after_open[close + 2..];
    }
    out.push_str(rest);
    out
}

fn resolve_placeholder(inner: &str, data: &RowData) -> Option<String> {
    let mut parts = inner.split('|').map(str::trim);
    let name = parts.next()?;
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    let mut raw = false;
    for filter in parts {
        match filter {
            "safe" => raw = true,
            _ => return None,
        }
    }
    let value = data.get(name)?;
    Some(if raw {
        value.clone()
    } else {
        escape_html(value)
    })
}

fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Make relative URLs in a rendered document resolve against `base_url`.
///
/// Inserts a `<base>` element right after `<head>`, or prepends one when the
/// document has no head.
pub fn inject_base(html: &str, base_url: &str) -> String {
    let base = format!("<base href=\"{}\">", escape_html(base_url));
    if html.contains("<head>") {
        html.replacen("<head>", &format!("<head>\n    {base}"), 1)
    } else {
        format!("{base}{html}")
    }
}

// =============================================================================
// Stock template
// =============================================================================

const STOCK_CSS: &str = "\
* { box-sizing: border-box; margin: 0; }
body { width: 1280px; height: 720px; overflow: hidden; font-family: 'Helvetica Neue', Arial, sans-serif; background: #101418; color: #ffffff; }
.frame { display: flex; height: 100%; }
.hero { width: 50%; height: 100%; object-fit: cover; }
.copy { width: 50%; padding: 72px 56px; display: flex; flex-direction: column; justify-content: center; gap: 28px; }
.badge { align-self: flex-start; padding: 8px 20px; border-radius: 999px; background: #ffcc00; color: #101418; font-weight: 700; text-transform: uppercase; letter-spacing: 0.08em; }
.title { font-size: 64px; line-height: 1.05; }
.highlight { color: #ffcc00; }
.subtitle { font-size: 30px; color: #c9d1d9; }
";

/// A starter template covering the canonical fields.
pub fn stock_template() -> String {
    let markup = html! {
        (DOCTYPE)
        html lang="en" {
            head {
                meta charset="utf-8";
                style { (PreEscaped(STOCK_CSS)) }
            }
            body {
                div.frame {
                    img.hero src="{{ image_url }}" alt="";
                    div.copy {
                        span.badge { "{{ badge }}" }
                        h1.title { (PreEscaped("{{ main_title | safe }}")) }
                        p.subtitle { "{{ sub_title }}" }
                    }
                }
            }
        }
    };
    markup.into_string()
}
