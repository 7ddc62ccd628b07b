//! Category-directed size parsing.
//!
//! Sizes are read from free-text product names. Every parser is total: text
//! it cannot read yields [`SizeSpec::unknown`], never a guessed default.

use crate::text::{contains_term, format_amount};
use canopy_core::{Category, SizeSpec, SizeUnit, VapeForm};
use once_cell::sync::Lazy;
use regex::Regex;

const OUNCE_GRAMS: f64 = 28.0;

/// Vaporizer masses a bare gram amount may resolve to, milligrams.
const VAPE_MASSES: &[f64] = &[300.0, 500.0, 1000.0, 2000.0];

/// Flower aliases, grams.
const FLOWER_ALIASES: &[(&str, f64)] = &[
    ("1g", 1.0),
    ("1 g", 1.0),
    ("1 gram", 1.0),
    ("1gram", 1.0),
    ("one gram", 1.0),
    ("3.5g", 3.5),
    ("3.5 g", 3.5),
    ("3.5 gram", 3.5),
    ("3.5 grams", 3.5),
    ("eighth", 3.5),
    ("1/8", 3.5),
    ("1/8oz", 3.5),
    ("1/8 oz", 3.5),
    ("1/8th", 3.5),
    ("8th", 3.5),
    ("\u{215b}", 3.5),
    ("\u{215b}oz", 3.5),
    ("\u{215b} oz", 3.5),
    ("7g", 7.0),
    ("7 g", 7.0),
    ("7 grams", 7.0),
    ("quarter", 7.0),
    ("quarter oz", 7.0),
    ("quarter ounce", 7.0),
    ("q oz", 7.0),
    ("1/4", 7.0),
    ("1/4oz", 7.0),
    ("1/4 oz", 7.0),
    ("\u{bc}", 7.0),
    ("\u{bc}oz", 7.0),
    ("\u{bc} oz", 7.0),
    ("14g", 14.0),
    ("14 g", 14.0),
    ("14 grams", 14.0),
    ("half oz", 14.0),
    ("half ounce", 14.0),
    ("half o", 14.0),
    ("1/2", 14.0),
    ("1/2oz", 14.0),
    ("1/2 oz", 14.0),
    ("\u{bd}", 14.0),
    ("\u{bd}oz", 14.0),
    ("\u{bd} oz", 14.0),
    ("28g", 28.0),
    ("28 g", 28.0),
    ("28 grams", 28.0),
    ("one ounce", 28.0),
    ("an ounce", 28.0),
    ("full ounce", 28.0),
    ("1 ounce", 28.0),
    ("1oz", 28.0),
    ("1 oz", 28.0),
    ("zip", 28.0),
];

/// Vaporizer aliases, milligrams.
const VAPE_ALIASES: &[(&str, f64)] = &[
    ("300mg", 300.0),
    ("300 mg", 300.0),
    (".3g", 300.0),
    ("0.3g", 300.0),
    ("0.3 g", 300.0),
    (".3 g", 300.0),
    ("500mg", 500.0),
    ("500 mg", 500.0),
    (".5g", 500.0),
    ("0.5g", 500.0),
    ("0.5 g", 500.0),
    (".5 g", 500.0),
    ("1/2g", 500.0),
    ("1/2 g", 500.0),
    ("half gram", 500.0),
    ("half g", 500.0),
    ("1000mg", 1000.0),
    ("1000 mg", 1000.0),
    ("1g", 1000.0),
    ("1 g", 1000.0),
    ("1.0g", 1000.0),
    ("1 gram", 1000.0),
    ("1gram", 1000.0),
    ("full gram", 1000.0),
    ("2000mg", 2000.0),
    ("2000 mg", 2000.0),
    ("2g", 2000.0),
    ("2 g", 2000.0),
    ("2gram", 2000.0),
    ("2 gram", 2000.0),
    ("2 grams", 2000.0),
];

static FLOWER_BY_LENGTH: Lazy<Vec<(&'static str, f64)>> = Lazy::new(|| by_length(FLOWER_ALIASES));
static VAPE_BY_LENGTH: Lazy<Vec<(&'static str, f64)>> = Lazy::new(|| by_length(VAPE_ALIASES));

static GRAM_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d*\.?\d+)\s*(?:grams?|gr|g)\b").expect("gram regex is hardcoded and valid")
});

static GRAM_FRACTION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})\s*/\s*(\d{1,2})\s*(?:grams?|gr|g)\b")
        .expect("gram fraction regex is hardcoded and valid")
});

static OUNCE_FRACTION_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{1,2})\s*/\s*(\d{1,2})\s*(?:oz|ounces?)?").expect("fraction regex is hardcoded and valid")
});

static MILLIGRAM_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{3,4})\s*mg\b").expect("milligram regex is hardcoded and valid")
});

static EDIBLE_TOTAL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{2,4})\s*mg\b").expect("edible total regex is hardcoded and valid")
});

static DISPOSABLE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(?:disposables?|all[- ]in[- ]one|aio|pods?)\b")
        .expect("disposable regex is hardcoded and valid")
});

static PACK_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d+)\s*-?\s*(?:pk|packs?|ct|count|pcs?|pieces?|x)\b")
        .expect("pack regex is hardcoded and valid")
});

static PACK_SUFFIX_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\bx\s*(\d+)\b").expect("pack suffix regex is hardcoded and valid"));

fn by_length(aliases: &'static [(&'static str, f64)]) -> Vec<(&'static str, f64)> {
    let mut sorted = aliases.to_vec();
    // Stable sort keeps table order between aliases of equal length
    sorted.sort_by_key(|(alias, _)| std::cmp::Reverse(alias.chars().count()));
    sorted
}

fn match_alias(text: &str, aliases: &[(&'static str, f64)]) -> Option<f64> {
    aliases
        .iter()
        .find(|(alias, _)| contains_term(text, alias))
        .map(|(_, amount)| *amount)
}

fn positive(value: f64) -> Option<f64> {
    (value.is_finite() && value > 0.0).then_some(value)
}

fn first_number(pattern: &Regex, text: &str) -> Option<f64> {
    pattern
        .captures(text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok())
        .and_then(positive)
}

fn first_count(text: &str) -> Option<u32> {
    [&*PACK_PATTERN, &*PACK_SUFFIX_PATTERN]
        .into_iter()
        .find_map(|pattern| {
            pattern
                .captures(text)
                .and_then(|caps| caps.get(1))
                .and_then(|m| m.as_str().parse::<u32>().ok())
        })
        .filter(|count| *count > 0)
}

/// Parse a size for a listing name in the given category.
///
/// Flower and concentrates are measured in grams, vaporizers and edibles in
/// milligrams, pre-rolls in grams with a pack count. Other categories are
/// always unknown.
#[must_use]
pub fn normalize_size(name: &str, category: Category) -> SizeSpec {
    match category {
        Category::Flower | Category::Concentrates => parse_flower_size(name),
        Category::Vaporizers => parse_vape_size(name),
        Category::PreRolls => parse_preroll_size(name),
        Category::Edibles => parse_edible_size(name),
        _ => SizeSpec::unknown(SizeUnit::Grams),
    }
}

/// Parse a flower or concentrate weight.
#[must_use]
pub fn parse_flower_size(name: &str) -> SizeSpec {
    let text = name.to_lowercase();

    // "1/2g" is half a gram, not the "1/2" ounce alias or "2g"
    let grams = gram_fraction(&text)
        .or_else(|| match_alias(&text, &FLOWER_BY_LENGTH))
        .or_else(|| first_number(&GRAM_PATTERN, &text))
        .or_else(|| ounce_fraction(&text));

    match grams {
        Some(grams) => SizeSpec {
            magnitude: Some(grams),
            display: flower_display(grams),
            ..SizeSpec::unknown(SizeUnit::Grams)
        },
        None => SizeSpec::unknown(SizeUnit::Grams),
    }
}

fn gram_fraction(text: &str) -> Option<f64> {
    let caps = GRAM_FRACTION_PATTERN.captures(text)?;
    let numerator: f64 = caps.get(1)?.as_str().parse().ok()?;
    let denominator: f64 = caps.get(2)?.as_str().parse().ok()?;
    (numerator > 0.0 && numerator < denominator).then(|| numerator / denominator)
}

fn ounce_fraction(text: &str) -> Option<f64> {
    OUNCE_FRACTION_PATTERN.captures_iter(text).find_map(|caps| {
        let numerator: f64 = caps.get(1)?.as_str().parse().ok()?;
        let denominator: f64 = caps.get(2)?.as_str().parse().ok()?;
        // Only ounce subdivisions; "4/20" is a date, not a weight
        let is_subdivision = [2.0, 4.0, 8.0, 16.0].contains(&denominator);
        (is_subdivision && numerator > 0.0 && numerator < denominator)
            .then(|| numerator / denominator * OUNCE_GRAMS)
    })
}

fn flower_display(grams: f64) -> String {
    let fraction = [(3.5, "1/8oz"), (7.0, "1/4oz"), (14.0, "1/2oz"), (28.0, "1oz")]
        .iter()
        .find(|(weight, _)| (grams - weight).abs() < f64::EPSILON)
        .map(|(_, label)| *label);

    match fraction {
        Some(label) => format!("{}g ({label})", format_amount(grams)),
        None => format!("{}g", format_amount(grams)),
    }
}

/// Parse a vaporizer mass and form factor.
#[must_use]
pub fn parse_vape_size(name: &str) -> SizeSpec {
    let text = name.to_lowercase();

    let form = if DISPOSABLE_PATTERN.is_match(&text) {
        VapeForm::Disposable
    } else {
        VapeForm::Cartridge
    };
    let prefix = match form {
        VapeForm::Disposable => "Disp",
        VapeForm::Cartridge => "Cart",
    };

    let milligrams = match_alias(&text, &VAPE_BY_LENGTH)
        .or_else(|| first_number(&MILLIGRAM_PATTERN, &text))
        .or_else(|| {
            first_number(&GRAM_PATTERN, &text)
                .map(|g| (g * 1000.0).round())
                .filter(|mg| VAPE_MASSES.contains(mg))
        })
        .and_then(positive);

    match milligrams {
        Some(mg) => SizeSpec {
            magnitude: Some(mg),
            form_factor: Some(form),
            display: format!(
                "{prefix} {}mg ({}g)",
                format_amount(mg),
                format_amount(mg / 1000.0)
            ),
            ..SizeSpec::unknown(SizeUnit::Milligrams)
        },
        None => SizeSpec {
            form_factor: Some(form),
            ..SizeSpec::unknown(SizeUnit::Milligrams)
        },
    }
}

/// Parse a pre-roll pack count and per-joint weight.
#[must_use]
pub fn parse_preroll_size(name: &str) -> SizeSpec {
    let text = name.to_lowercase();

    let count = first_count(&text);
    let per_joint = first_number(&GRAM_PATTERN, &text).or_else(|| {
        if text.contains("half gram") {
            Some(0.5)
        } else if text.contains("full gram") {
            Some(1.0)
        } else {
            None
        }
    });

    let display = match (per_joint, count) {
        (Some(g), Some(n)) if n > 1 => format!("{}g ({n}pk)", format_amount(g)),
        (Some(g), _) => format!("{}g", format_amount(g)),
        (None, Some(n)) if n > 1 => format!("({n}pk)"),
        _ => return SizeSpec::unknown(SizeUnit::Grams),
    };

    SizeSpec {
        magnitude: per_joint
            .map(|g| g * f64::from(count.unwrap_or(1)))
            .and_then(positive),
        pack_count: count,
        per_unit: per_joint,
        display,
        ..SizeSpec::unknown(SizeUnit::Grams)
    }
}

/// Parse an edible total dose and piece count.
#[must_use]
pub fn parse_edible_size(name: &str) -> SizeSpec {
    let text = name.to_lowercase();

    let total = EDIBLE_TOTAL_PATTERN
        .captures(&text)
        .and_then(|caps| caps.get(1))
        .and_then(|m| m.as_str().parse::<u32>().ok())
        .filter(|mg| *mg > 0);
    let count = first_count(&text);

    match (total, count) {
        (Some(total), Some(count)) if count > 1 => {
            let per_piece = total / count;
            SizeSpec {
                magnitude: Some(f64::from(total)),
                pack_count: Some(count),
                per_unit: Some(f64::from(per_piece)),
                display: format!("{per_piece}mg x{count} ({total}mg)"),
                ..SizeSpec::unknown(SizeUnit::Milligrams)
            }
        }
        (Some(total), _) => SizeSpec {
            magnitude: Some(f64::from(total)),
            display: format!("{total}mg"),
            ..SizeSpec::unknown(SizeUnit::Milligrams)
        },
        (None, Some(count)) if count > 1 => SizeSpec {
            pack_count: Some(count),
            display: format!("({count}pk)"),
            ..SizeSpec::unknown(SizeUnit::Milligrams)
        },
        _ => SizeSpec::unknown(SizeUnit::Milligrams),
    }
}
