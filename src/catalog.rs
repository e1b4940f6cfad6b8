//! Static format catalog: which extensions can be converted into which.
//!
//! Formats are grouped into disjoint categories. A file may be converted to
//! any *other* extension of its own category and nothing else, so the
//! compatibility question reduces to a category lookup. The table is a
//! compile-time constant; disjointness is a property of the table itself and
//! is asserted by the unit tests below rather than checked at runtime.

use std::collections::BTreeSet;

/// One named group of mutually convertible extensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Category {
    pub name: &'static str,
    pub extensions: &'static [&'static str],
}

/// The categories understood by the conversion service.
pub const STANDARD_CATEGORIES: &[Category] = &[
    Category {
        name: "Document",
        extensions: &["docx", "txt", "pdf"],
    },
    Category {
        name: "Spreadsheet",
        extensions: &["xlsx", "csv"],
    },
    Category {
        name: "Image",
        extensions: &["jpg", "jpeg", "png", "bmp"],
    },
];

/// Extension → MIME table served by the download endpoint.
const MIME_TYPES: &[(&str, &str)] = &[
    ("pdf", "application/pdf"),
    (
        "docx",
        "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    ),
    (
        "xlsx",
        "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
    ),
    ("csv", "text/csv"),
    ("txt", "text/plain"),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("bmp", "image/bmp"),
];

/// Fallback content type for extensions missing from the MIME table.
pub const OCTET_STREAM: &str = "application/octet-stream";

/// Answers compatibility queries against a static category table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatCatalog {
    categories: &'static [Category],
}

impl Default for FormatCatalog {
    fn default() -> Self {
        Self::standard()
    }
}

impl FormatCatalog {
    /// The catalog matching the conversion service's supported formats.
    pub const fn standard() -> Self {
        Self {
            categories: STANDARD_CATEGORIES,
        }
    }

    /// Build a catalog over a custom table. Categories must be disjoint.
    pub const fn from_static(categories: &'static [Category]) -> Self {
        Self { categories }
    }

    pub fn categories(&self) -> &'static [Category] {
        self.categories
    }

    /// The category containing `extension`, if any.
    pub fn category_of(&self, extension: &str) -> Option<&'static Category> {
        let ext = normalize_extension(extension);
        self.categories
            .iter()
            .find(|c| c.extensions.contains(&ext.as_str()))
    }

    /// Every other extension in the same category as `extension`.
    ///
    /// Returns an empty set when the extension belongs to no category.
    pub fn compatible_targets(&self, extension: &str) -> BTreeSet<&'static str> {
        let ext = normalize_extension(extension);
        match self.category_of(&ext) {
            Some(category) => category
                .extensions
                .iter()
                .copied()
                .filter(|e| *e != ext)
                .collect(),
            None => BTreeSet::new(),
        }
    }

    /// `true` when a file with extension `from` may be converted to `to`.
    pub fn is_compatible(&self, from: &str, to: &str) -> bool {
        let to = normalize_extension(to);
        self.compatible_targets(from).contains(to.as_str())
    }

    /// All known extensions, in table order.
    pub fn all_extensions(&self) -> Vec<&'static str> {
        self.categories
            .iter()
            .flat_map(|c| c.extensions.iter().copied())
            .collect()
    }
}

/// Lower-cased suffix after the last `.` of `file_name`, or `""` when the
/// name contains no dot.
pub fn extension_of(file_name: &str) -> String {
    match file_name.rsplit_once('.') {
        Some((_, ext)) => ext.to_lowercase(),
        None => String::new(),
    }
}

/// Canonical form of a user-supplied format: trimmed, without a leading
/// dot, lower-cased. `".PDF "` → `"pdf"`.
pub fn normalize_extension(format: &str) -> String {
    format.trim().trim_start_matches('.').to_lowercase()
}

/// The content type the download endpoint uses for `extension`.
pub fn mime_for_extension(extension: &str) -> &'static str {
    let ext = normalize_extension(extension);
    MIME_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or(OCTET_STREAM)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn categories_are_disjoint() {
        let mut seen = HashSet::new();
        for category in STANDARD_CATEGORIES {
            for ext in category.extensions {
                assert!(seen.insert(*ext), "'{ext}' appears in two categories");
            }
        }
    }

    #[test]
    fn compatible_targets_excludes_source() {
        let catalog = FormatCatalog::standard();
        let targets: Vec<_> = catalog.compatible_targets("docx").into_iter().collect();
        assert_eq!(targets, vec!["pdf", "txt"]);
        assert!(!catalog.compatible_targets("png").contains("png"));
    }

    #[test]
    fn unknown_extension_has_no_targets() {
        let catalog = FormatCatalog::standard();
        assert!(catalog.compatible_targets("exe").is_empty());
        assert!(catalog.compatible_targets("").is_empty());
    }

    #[test]
    fn compatibility_is_case_insensitive() {
        let catalog = FormatCatalog::standard();
        assert!(catalog.is_compatible("XLSX", "csv"));
        assert!(catalog.is_compatible("jpg", ".PNG"));
        assert!(!catalog.is_compatible("png", "txt"));
        assert!(!catalog.is_compatible("pdf", "pdf"));
    }

    #[test]
    fn extension_of_takes_last_segment() {
        assert_eq!(extension_of("report.final.DOCX"), "docx");
        assert_eq!(extension_of("README"), "");
        assert_eq!(extension_of("archive."), "");
    }

    #[test]
    fn mime_lookup_falls_back_to_octet_stream() {
        assert_eq!(mime_for_extension("pdf"), "application/pdf");
        assert_eq!(mime_for_extension("JPEG"), "image/jpeg");
        assert_eq!(mime_for_extension("zip"), OCTET_STREAM);
    }
}
