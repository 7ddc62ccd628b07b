//! Canonical listing records.

use crate::types::MenuType;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Canonical product category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    /// Cured flower
    Flower,
    /// Pre-rolled joints and blunts
    #[serde(rename = "Pre-Rolls")]
    PreRolls,
    /// Cartridges and disposable vaporizers
    Vaporizers,
    /// Extracts: wax, shatter, rosin, live resin
    Concentrates,
    /// Gummies, chocolates, beverages
    Edibles,
    /// Tinctures and oils
    Tinctures,
    /// Lotions, balms, patches
    Topicals,
    /// Hardware, apparel, merchandise
    Accessories,
    /// Anything the vocabulary does not recognise
    Other,
}

impl Category {
    /// All categories, in display order.
    pub const ALL: [Self; 9] = [
        Self::Flower,
        Self::PreRolls,
        Self::Vaporizers,
        Self::Concentrates,
        Self::Edibles,
        Self::Tinctures,
        Self::Topicals,
        Self::Accessories,
        Self::Other,
    ];

    /// Display name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Flower => "Flower",
            Self::PreRolls => "Pre-Rolls",
            Self::Vaporizers => "Vaporizers",
            Self::Concentrates => "Concentrates",
            Self::Edibles => "Edibles",
            Self::Tinctures => "Tinctures",
            Self::Topicals => "Topicals",
            Self::Accessories => "Accessories",
            Self::Other => "Other",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|category| category.as_str() == s)
            .ok_or_else(|| format!("unknown category '{s}'"))
    }
}

/// How a listing's fields were located in the raw payload.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Located through an explicit field map
    #[default]
    Mapped,
    /// Located by the recursive best-effort search
    Heuristic,
}

impl Confidence {
    /// Stable string form used in storage.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Mapped => "mapped",
            Self::Heuristic => "heuristic",
        }
    }
}

/// Unit of a [`SizeSpec`] magnitude.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SizeUnit {
    /// Grams
    Grams,
    /// Milligrams
    Milligrams,
}

impl SizeUnit {
    /// Unit suffix.
    #[must_use]
    pub fn suffix(&self) -> &'static str {
        match self {
            Self::Grams => "g",
            Self::Milligrams => "mg",
        }
    }
}

/// Vaporizer form factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VapeForm {
    /// Single-use, all-in-one device
    Disposable,
    /// Threaded cartridge
    Cartridge,
}

/// Normalized physical or potency size parsed from a listing name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SizeSpec {
    /// Total amount in `unit`; `None` when only a pack count is known
    pub magnitude: Option<f64>,
    /// Unit of `magnitude` and `per_unit`
    pub unit: SizeUnit,
    /// Number of pieces or joints in the package
    pub pack_count: Option<u32>,
    /// Amount per piece or joint
    pub per_unit: Option<f64>,
    /// Vaporizer form factor
    pub form_factor: Option<VapeForm>,
    /// Human display string
    pub display: String,
}

impl SizeSpec {
    /// An unparsed size.
    #[must_use]
    pub fn unknown(unit: SizeUnit) -> Self {
        Self {
            magnitude: None,
            unit,
            pack_count: None,
            per_unit: None,
            form_factor: None,
            display: "Unknown".to_string(),
        }
    }

    /// Whether no size information could be extracted.
    #[must_use]
    pub fn is_unknown(&self) -> bool {
        self.magnitude.is_none() && self.pack_count.is_none()
    }
}

/// The pipeline's output unit: one product observed at one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanonicalListing {
    /// Backend item id, unique within one run's output
    pub provider_item_id: String,
    /// Product name
    pub name: String,
    /// Brand name, empty when the backend does not report one
    pub brand: String,
    /// Canonical category
    pub category: Category,
    /// Backend subcategory
    pub subcategory: Option<String>,
    /// Regular price
    pub price: f64,
    /// Sale price when lower than the regular price
    pub discount_price: Option<f64>,
    /// Promotion text
    pub discount_text: Option<String>,
    /// Product description
    pub description: Option<String>,
    /// Parsed size, absent when unknown
    pub size_spec: Option<SizeSpec>,
    /// Menu the price belongs to
    pub menu_type: MenuType,
    /// How the fields were located
    pub confidence: Confidence,
    /// Raw backend record, kept for debugging
    pub raw_payload: serde_json::Value,
}
