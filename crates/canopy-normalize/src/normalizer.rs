//! Raw item to canonical listing.

use crate::{
    category::CategoryVocabulary,
    error::ParseError,
    fields::FieldMap,
    size::normalize_size,
    text::slugify,
};
use canopy_core::{CanonicalListing, Category, Confidence, MenuType};
use serde_json::Value;
use tracing::debug;

/// Converts one backend's raw items into canonical listings.
#[derive(Debug, Clone, Copy)]
pub struct Normalizer {
    fields: &'static FieldMap,
    vocabulary: &'static CategoryVocabulary,
    menu_type: MenuType,
    confidence: Confidence,
    name_ids: bool,
}

impl Normalizer {
    /// Create a normalizer for a field map and category vocabulary.
    #[must_use]
    pub fn new(
        fields: &'static FieldMap,
        vocabulary: &'static CategoryVocabulary,
        menu_type: MenuType,
    ) -> Self {
        Self {
            fields,
            vocabulary,
            menu_type,
            confidence: Confidence::Mapped,
            name_ids: false,
        }
    }

    /// Mark output as heuristic and derive ids from names when missing.
    #[must_use]
    pub fn heuristic(mut self) -> Self {
        self.confidence = Confidence::Heuristic;
        self.name_ids = true;
        self
    }

    /// Derive ids from names when missing, keeping the confidence as is.
    #[must_use]
    pub fn with_name_ids(mut self) -> Self {
        self.name_ids = true;
        self
    }

    /// Provider item id of a raw item.
    ///
    /// With name ids enabled, falls back to a slug of the name so scraped
    /// markup without ids still dedups stably.
    #[must_use]
    pub fn item_id(&self, raw: &Value) -> Option<String> {
        self.fields.item_id(raw).or_else(|| {
            if self.name_ids {
                FieldMap::first_text(raw, self.fields.name)
                    .map(|name| slugify(&name))
                    .filter(|slug| !slug.is_empty())
                    .map(|slug| format!("name-{slug}"))
            } else {
                None
            }
        })
    }

    /// Normalize a raw item.
    ///
    /// `category_hint` is the category of the page or loop the item came
    /// from, used when the item carries no category of its own.
    pub fn normalize(
        &self,
        raw: Value,
        category_hint: Option<&str>,
    ) -> Result<CanonicalListing, ParseError> {
        let fields = self.fields;

        let provider_item_id = self
            .item_id(&raw)
            .ok_or(ParseError::MissingField { field: "id" })?;
        let name = FieldMap::first_text(&raw, fields.name)
            .ok_or(ParseError::MissingField { field: "name" })?;

        let price = match FieldMap::first_price(&raw, fields.price) {
            Some(price) => price,
            None => {
                return Err(match FieldMap::first(&raw, fields.price) {
                    Some(value) => ParseError::InvalidValue {
                        field: "price",
                        value: value.to_string(),
                    },
                    None => ParseError::MissingField { field: "price" },
                })
            }
        };

        let raw_category = FieldMap::first_text(&raw, fields.category)
            .or_else(|| category_hint.map(ToString::to_string))
            .unwrap_or_default();
        let category = self.vocabulary.map(&raw_category);
        if category == Category::Other && !raw_category.is_empty() {
            debug!(item = %provider_item_id, category = %raw_category, "unmapped category");
        }

        // A "discount" at or above the regular price is not a discount
        let discount_price = FieldMap::first_price(&raw, fields.discount_price)
            .filter(|discount| *discount < price);

        let size = normalize_size(&name, category);

        Ok(CanonicalListing {
            provider_item_id,
            brand: FieldMap::first_text(&raw, fields.brand).unwrap_or_default(),
            category,
            subcategory: FieldMap::first_text(&raw, fields.subcategory),
            price,
            discount_price,
            discount_text: FieldMap::first_text(&raw, fields.discount_text),
            description: FieldMap::first_text(&raw, fields.description),
            size_spec: (!size.is_unknown()).then_some(size),
            menu_type: self.menu_type,
            confidence: self.confidence,
            name,
            raw_payload: raw,
        })
    }
}
