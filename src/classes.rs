//! Layout block class table
//!
//! The detector predicts one of 25 document-layout classes per block. The
//! table below is canonical: class ids elsewhere in the crate always index
//! into it, and user-facing configuration refers to classes strictly by name.

use std::collections::HashSet;

/// Canonical class table, in detector index order.
pub const CLASS_NAMES: [&str; 25] = [
    "abstract",          // 0
    "algorithm",         // 1
    "aside_text",        // 2
    "chart",             // 3
    "content",           // 4
    "display_formula",   // 5
    "doc_title",         // 6
    "figure_title",      // 7
    "footer",            // 8
    "footer_image",      // 9
    "footnote",          // 10
    "formula_number",    // 11
    "header",            // 12
    "header_image",      // 13
    "image",             // 14
    "inline_formula",    // 15
    "number",            // 16
    "paragraph_title",   // 17
    "reference",         // 18
    "reference_content", // 19
    "seal",              // 20
    "table",             // 21
    "text",              // 22
    "vertical_text",     // 23
    "vision_footnote",   // 24
];

/// Class id of the plain `text` class, used for synthetic fallback blocks.
pub const TEXT_CLASS_ID: usize = 22;

/// Class names navigable in rail mode unless the user configures otherwise.
/// Names that are not in the canonical table are dropped on conversion.
pub const DEFAULT_NAVIGABLE_CLASS_NAMES: [&str; 8] = [
    "abstract",
    "algorithm",
    "aside_text",
    "document_title",
    "footnote",
    "paragraph_title",
    "references",
    "text",
];

#[must_use]
pub fn class_name(id: usize) -> Option<&'static str> {
    CLASS_NAMES.get(id).copied()
}

#[must_use]
pub fn class_id(name: &str) -> Option<usize> {
    CLASS_NAMES.iter().position(|&c| c == name)
}

/// Convert a list of class names to ids, silently dropping unknown names.
#[must_use]
pub fn class_ids_by_name<'a, I>(names: I) -> HashSet<usize>
where
    I: IntoIterator<Item = &'a str>,
{
    names.into_iter().filter_map(class_id).collect()
}

#[must_use]
pub fn default_navigable_classes() -> HashSet<usize> {
    class_ids_by_name(DEFAULT_NAVIGABLE_CLASS_NAMES)
}
