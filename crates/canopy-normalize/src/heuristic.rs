//! Best-effort search for product-like objects in arbitrary JSON.
//!
//! Only used as the last resort for generic storefronts, where nothing is
//! known about the payload shape. Listings built from these objects are
//! marked [`Confidence::Heuristic`](canopy_core::Confidence::Heuristic).

use crate::fields::FieldMap;
use serde_json::Value;

/// Maximum nesting depth searched.
pub const MAX_DEPTH: usize = 8;

const NAME_KEYS: &[&str] = &["name", "title", "productName"];
const PRICE_KEYS: &[&str] = &["price", "prices", "variants", "offers", "thcContent"];

/// Field map applied to objects found by [`find_product_like`].
pub const HEURISTIC_FIELDS: FieldMap = FieldMap {
    id: &["id", "_id", "productId", "sku", "objectID"],
    name: &["name", "title", "productName"],
    brand: &["brand", "vendor", "brandName"],
    category: &["category", "product_type", "type", "kind"],
    subcategory: &["subcategory"],
    price: &[
        "price",
        "prices.price",
        "variants[0].price",
        "offers.price",
        "offers[0].price",
    ],
    discount_price: &["sale_price", "special_price", "variants[0].sale_price"],
    discount_text: &[],
    description: &["description"],
};

/// Whether an object has a name and something price-like.
#[must_use]
pub fn looks_like_product(value: &Value) -> bool {
    let Some(map) = value.as_object() else {
        return false;
    };
    let has_name = NAME_KEYS
        .iter()
        .any(|key| map.get(*key).is_some_and(Value::is_string));
    let has_price = PRICE_KEYS
        .iter()
        .any(|key| map.get(*key).is_some_and(|v| !v.is_null()));
    has_name && has_price
}

/// Collect product-like objects, outermost first, without descending into a
/// match.
#[must_use]
pub fn find_product_like(root: &Value) -> Vec<&Value> {
    let mut found = Vec::new();
    collect(root, 0, &mut found);
    found
}

fn collect<'v>(value: &'v Value, depth: usize, found: &mut Vec<&'v Value>) {
    if depth > MAX_DEPTH {
        return;
    }
    if looks_like_product(value) {
        found.push(value);
        return;
    }
    match value {
        Value::Object(map) => {
            for child in map.values() {
                collect(child, depth + 1, found);
            }
        }
        Value::Array(items) => {
            for child in items {
                collect(child, depth + 1, found);
            }
        }
        _ => {}
    }
}
