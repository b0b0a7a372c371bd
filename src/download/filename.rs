//! Output filenames for catalog items.

use crate::catalog::CatalogItem;

/// Characters the catalog strips from its own download filenames.
const FORBIDDEN_CHARS: &[char] = &['/', '?', '<', '>', '\\', ':', '*', '|', '"'];

/// Removes characters that are unsafe in filenames.
#[must_use]
pub fn sanitize_filename(name: &str) -> String {
    name.chars().filter(|c| !FORBIDDEN_CHARS.contains(c)).collect()
}

/// `"{key} ({title} - {author}).zip"`, sanitized.
#[must_use]
pub fn filename_for_item(item: &CatalogItem) -> String {
    sanitize_filename(&format!(
        "{} ({} - {}).zip",
        item.key, item.title, item.author_name
    ))
}
