//! Slug derivation for article titles.
//!
//! Spells `&` as `et` (French rules), then transliterates to ASCII with the
//! `slug` crate, which lower-cases and collapses every run of
//! non-alphanumeric characters into a single `-`.

/// Derives the URL slug for `title`. Returns an empty string when the title
/// holds nothing that transliterates to a letter or digit.
pub fn slugify(title: &str) -> String {
    ::slug::slugify(title.replace('&', " et "))
}
