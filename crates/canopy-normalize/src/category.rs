//! Category vocabularies.
//!
//! Each backend names its categories differently. A [`CategoryVocabulary`]
//! maps a backend's exact strings first; anything it doesn't know falls
//! through to keyword inference.

use crate::text::contains_term;
use canopy_core::Category;

/// Fixed mapping of one backend's category strings.
#[derive(Debug, Clone, Copy)]
pub struct CategoryVocabulary {
    entries: &'static [(&'static str, Category)],
}

impl CategoryVocabulary {
    /// Build a vocabulary from `(backend string, category)` pairs.
    ///
    /// Backend strings are compared case-insensitively.
    #[must_use]
    pub const fn new(entries: &'static [(&'static str, Category)]) -> Self {
        Self { entries }
    }

    /// Map a backend category string to a canonical category.
    #[must_use]
    pub fn map(&self, raw: &str) -> Category {
        let trimmed = raw.trim();
        self.entries
            .iter()
            .find(|(name, _)| name.eq_ignore_ascii_case(trimmed))
            .map_or_else(|| infer_category(trimmed), |(_, category)| *category)
    }
}

/// How a keyword is matched against the lowercased text.
#[derive(Clone, Copy)]
enum Match {
    Substring,
    Term,
}

// Order matters: pre-rolls before flower ("pre-roll flower"), vapes before
// concentrates ("live resin cart").
const KEYWORDS: &[(&str, Match, Category)] = &[
    ("pre-roll", Match::Substring, Category::PreRolls),
    ("preroll", Match::Substring, Category::PreRolls),
    ("pre roll", Match::Substring, Category::PreRolls),
    ("joint", Match::Substring, Category::PreRolls),
    ("blunt", Match::Substring, Category::PreRolls),
    ("vape", Match::Substring, Category::Vaporizers),
    ("vapor", Match::Substring, Category::Vaporizers),
    ("cartridge", Match::Substring, Category::Vaporizers),
    ("cart", Match::Term, Category::Vaporizers),
    ("carts", Match::Term, Category::Vaporizers),
    ("disposable", Match::Substring, Category::Vaporizers),
    ("pod", Match::Term, Category::Vaporizers),
    ("pods", Match::Term, Category::Vaporizers),
    ("pen", Match::Term, Category::Vaporizers),
    ("concentrate", Match::Substring, Category::Concentrates),
    ("extract", Match::Substring, Category::Concentrates),
    ("wax", Match::Term, Category::Concentrates),
    ("shatter", Match::Substring, Category::Concentrates),
    ("rosin", Match::Substring, Category::Concentrates),
    ("resin", Match::Substring, Category::Concentrates),
    ("badder", Match::Substring, Category::Concentrates),
    ("budder", Match::Substring, Category::Concentrates),
    ("crumble", Match::Substring, Category::Concentrates),
    ("diamonds", Match::Substring, Category::Concentrates),
    ("hash", Match::Term, Category::Concentrates),
    ("kief", Match::Substring, Category::Concentrates),
    ("dab", Match::Term, Category::Concentrates),
    ("edible", Match::Substring, Category::Edibles),
    ("gumm", Match::Substring, Category::Edibles),
    ("chocolate", Match::Substring, Category::Edibles),
    ("candy", Match::Substring, Category::Edibles),
    ("chew", Match::Substring, Category::Edibles),
    ("beverage", Match::Substring, Category::Edibles),
    ("drink", Match::Substring, Category::Edibles),
    ("cookie", Match::Substring, Category::Edibles),
    ("brownie", Match::Substring, Category::Edibles),
    ("mints", Match::Term, Category::Edibles),
    ("capsule", Match::Substring, Category::Edibles),
    ("tincture", Match::Substring, Category::Tinctures),
    ("sublingual", Match::Substring, Category::Tinctures),
    ("topical", Match::Substring, Category::Topicals),
    ("lotion", Match::Substring, Category::Topicals),
    ("balm", Match::Substring, Category::Topicals),
    ("salve", Match::Substring, Category::Topicals),
    ("transdermal", Match::Substring, Category::Topicals),
    ("patch", Match::Term, Category::Topicals),
    ("flower", Match::Substring, Category::Flower),
    ("bud", Match::Term, Category::Flower),
    ("buds", Match::Term, Category::Flower),
    ("indica", Match::Substring, Category::Flower),
    ("sativa", Match::Substring, Category::Flower),
    ("hybrid", Match::Substring, Category::Flower),
    ("shake", Match::Term, Category::Flower),
    ("smalls", Match::Term, Category::Flower),
    ("accessor", Match::Substring, Category::Accessories),
    ("gear", Match::Term, Category::Accessories),
    ("merch", Match::Substring, Category::Accessories),
    ("apparel", Match::Substring, Category::Accessories),
    ("battery", Match::Substring, Category::Accessories),
    ("grinder", Match::Substring, Category::Accessories),
    ("papers", Match::Term, Category::Accessories),
    ("lighter", Match::Substring, Category::Accessories),
];

/// Infer a canonical category from free text by keyword rules.
///
/// Returns [`Category::Other`] when nothing matches.
#[must_use]
pub fn infer_category(raw: &str) -> Category {
    let lower = raw.to_lowercase();
    if let Ok(exact) = raw.trim().parse::<Category>() {
        return exact;
    }

    KEYWORDS
        .iter()
        .find(|(keyword, mode, _)| match mode {
            Match::Substring => lower.contains(keyword),
            Match::Term => contains_term(&lower, keyword),
        })
        .map_or(Category::Other, |(_, _, category)| *category)
}
