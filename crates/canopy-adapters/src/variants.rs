//! Per-option variant expansion.
//!
//! Backends that list one product with several sized options (each with its
//! own price) are expanded into one raw item per option. Expanded items keep
//! every original field and gain `variantId`, `variantName`, `variantPrice`
//! and `variantSpecialPrice`, which the field maps read first.

use canopy_normalize::{lookup, FieldMap};
use serde_json::{Map, Value};

const OPTION_NAME_KEYS: &[&str] = &["name", "option", "weight", "unitSize", "size"];
const OPTION_PRICE_KEYS: &[&str] = &["price", "basePrice", "regularPrice", "unitPrice"];
const OPTION_SPECIAL_KEYS: &[&str] = &["discountPrice", "salePrice", "specialPrice", "special_price"];

/// Expand a product whose options are a list of names with parallel price
/// arrays, e.g. `Options: ["1g", "3.5g"]` and `recPrices: [12, 35]`.
///
/// Products without options, or without prices, come back as one item priced
/// from the first entry.
#[must_use]
pub fn expand_parallel(
    product: &Value,
    id: &str,
    name: &str,
    options_path: &str,
    prices: &[&str],
    specials: &[&str],
) -> Vec<Value> {
    let options = lookup(product, options_path)
        .and_then(Value::as_array)
        .filter(|options| !options.is_empty());
    let prices = first_array(product, prices);
    let specials = first_array(product, specials);

    match (options, prices) {
        (Some(options), Some(prices)) if !prices.is_empty() => options
            .iter()
            .enumerate()
            .map(|(i, option)| {
                let option = option.as_str().map(str::trim).unwrap_or_default();
                let variant_name = if option.is_empty() {
                    name.to_string()
                } else {
                    format!("{name} - {option}")
                };
                with_variant(
                    product,
                    format!("{id}_{i}"),
                    variant_name,
                    prices.get(i),
                    specials.and_then(|s| s.get(i)),
                )
            })
            .collect(),
        (_, prices) => vec![with_variant(
            product,
            id.to_string(),
            name.to_string(),
            prices.and_then(|p| p.first()),
            specials.and_then(|s| s.first()),
        )],
    }
}

/// Expand a product whose `variants` are objects carrying their own name and
/// price. A single variant is not expanded.
#[must_use]
pub fn expand_objects(product: &Value, id: &str, name: &str, variants_path: &str) -> Vec<Value> {
    let Some(variants) = lookup(product, variants_path).and_then(Value::as_array) else {
        return vec![product.clone()];
    };
    if variants.len() < 2 {
        return vec![product.clone()];
    }

    variants
        .iter()
        .enumerate()
        .map(|(i, variant)| {
            let option = FieldMap::first_text(variant, OPTION_NAME_KEYS);
            let variant_id = FieldMap::first_text(variant, &["id", "variantId"])
                .map_or_else(|| format!("{id}_{i}"), |vid| format!("{id}_{vid}"));
            let variant_name = match option {
                Some(option) => format!("{name} - {option}"),
                None => name.to_string(),
            };
            with_variant(
                product,
                variant_id,
                variant_name,
                FieldMap::first(variant, OPTION_PRICE_KEYS),
                FieldMap::first(variant, OPTION_SPECIAL_KEYS),
            )
        })
        .collect()
}

fn first_array<'v>(product: &'v Value, paths: &[&str]) -> Option<&'v Vec<Value>> {
    paths
        .iter()
        .filter_map(|path| lookup(product, path))
        .find_map(Value::as_array)
}

fn with_variant(
    product: &Value,
    id: String,
    name: String,
    price: Option<&Value>,
    special: Option<&Value>,
) -> Value {
    let mut item = match product {
        Value::Object(map) => map.clone(),
        other => {
            let mut map = Map::new();
            map.insert("value".to_string(), other.clone());
            map
        }
    };
    item.insert("variantId".to_string(), Value::String(id));
    item.insert("variantName".to_string(), Value::String(name));
    if let Some(price) = price.filter(|p| !p.is_null()) {
        item.insert("variantPrice".to_string(), price.clone());
    }
    if let Some(special) = special.filter(|s| !s.is_null()) {
        item.insert("variantSpecialPrice".to_string(), special.clone());
    }
    Value::Object(item)
}
