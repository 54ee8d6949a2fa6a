//! Stable names derived from free text.
//!
//! Two normalizers live here:
//!
//! - [`slugify`] turns display copy (badge, product name, subtitle) into the
//!   stem of an artifact filename. It is the identity rule for artifacts, so
//!   its output must never change for the same input.
//! - [`sanitize_file_name`] cleans user-supplied file names (uploaded images,
//!   template names) without lowercasing or dropping the extension.
//!
//! ## Slug rules
//!
//! ```text
//! "New Shoes Limited"      → "new-shoes-limited"
//! "  50% OFF -- today! "   → "50-off-today"
//! "Café Crème"             → "caf-crme"
//! "!!!" / "" / "   "       → "no-title"
//! ```

/// Fallback slug for input that normalizes to nothing.
pub const EMPTY_SLUG: &str = "no-title";

/// Derive a URL- and filesystem-safe slug from arbitrary text.
///
/// - Lowercases the input
/// - Drops every character outside `[a-z0-9]`, whitespace, and `-`
/// - Collapses runs of whitespace and dashes into a single dash
/// - Strips leading and trailing dashes
///
/// Returns [`EMPTY_SLUG`] when nothing survives.
pub fn slugify(text: &str) -> String {
    let lowered = text.to_lowercase();

    let mut slug = String::with_capacity(lowered.len());
    let mut pending_dash = false;
    for c in lowered.chars() {
        if c.is_ascii_lowercase() || c.is_ascii_digit() {
            if pending_dash && !slug.is_empty() {
                slug.push('-');
            }
            pending_dash = false;
            slug.push(c);
        } else if c.is_whitespace() || c == '-' {
            pending_dash = true;
        }
        // anything else is removed outright, without breaking the run
    }

    if slug.is_empty() {
        EMPTY_SLUG.to_string()
    } else {
        slug
    }
}

/// Sanitize a user-supplied file name for storage.
///
/// Keeps ASCII alphanumerics, `.`, `_` and `-`; whitespace becomes `_`;
/// everything else is dropped. Leading dots are stripped so the result is
/// never hidden and never a relative path component.
pub fn sanitize_file_name(name: &str) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let cleaned: String = base
        .chars()
        .filter_map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                Some(c)
            } else if c.is_whitespace() {
                Some('_')
            } else {
                None
            }
        })
        .collect();
    cleaned.trim_start_matches('.').to_string()
}
