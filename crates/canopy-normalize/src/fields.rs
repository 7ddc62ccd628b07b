//! Field paths and per-backend field maps.
//!
//! A path is a dotted list of object keys where any key may be followed by
//! list indices: `variants[0].price`, `data.menu_items`, `prices.unit.price`.

use serde_json::Value;

/// Resolve a dotted path against a JSON value.
///
/// Returns `None` when any step is missing or the path is malformed.
#[must_use]
pub fn lookup<'v>(value: &'v Value, path: &str) -> Option<&'v Value> {
    let mut current = value;
    for segment in path.split('.') {
        let (key, rest) = match segment.find('[') {
            Some(open) => segment.split_at(open),
            None => (segment, ""),
        };

        if !key.is_empty() {
            current = current.get(key)?;
        }

        let mut rest = rest;
        while !rest.is_empty() {
            let inner = rest.strip_prefix('[')?;
            let close = inner.find(']')?;
            let index: usize = inner[..close].parse().ok()?;
            current = current.get(index)?;
            rest = &inner[close + 1..];
        }
    }
    Some(current)
}

/// Priority-ordered paths for each canonical listing field.
///
/// For every field the first path that resolves to a usable value wins.
#[derive(Debug, Clone, Copy)]
pub struct FieldMap {
    /// Provider item id
    pub id: &'static [&'static str],
    /// Product name
    pub name: &'static [&'static str],
    /// Brand name (string or object with a `name`)
    pub brand: &'static [&'static str],
    /// Backend category string
    pub category: &'static [&'static str],
    /// Backend subcategory string
    pub subcategory: &'static [&'static str],
    /// Regular price
    pub price: &'static [&'static str],
    /// Sale price
    pub discount_price: &'static [&'static str],
    /// Promotion text
    pub discount_text: &'static [&'static str],
    /// Description
    pub description: &'static [&'static str],
}

impl FieldMap {
    /// First path in `paths` that resolves to a non-null, non-empty value.
    #[must_use]
    pub fn first<'v>(raw: &'v Value, paths: &[&str]) -> Option<&'v Value> {
        paths
            .iter()
            .filter_map(|path| lookup(raw, path))
            .find(|value| !is_blank(value))
    }

    /// First path in `paths` that yields text.
    #[must_use]
    pub fn first_text(raw: &Value, paths: &[&str]) -> Option<String> {
        paths
            .iter()
            .filter_map(|path| lookup(raw, path))
            .find_map(as_text)
    }

    /// First path in `paths` that yields a positive price.
    #[must_use]
    pub fn first_price(raw: &Value, paths: &[&str]) -> Option<f64> {
        paths
            .iter()
            .filter_map(|path| lookup(raw, path))
            .find_map(as_price)
    }

    /// Provider item id of a raw item, if the map can find one.
    #[must_use]
    pub fn item_id(&self, raw: &Value) -> Option<String> {
        Self::first_text(raw, self.id)
    }
}

fn is_blank(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Coerce a value to trimmed, non-empty text.
///
/// Numbers are rendered, objects contribute their `name`.
#[must_use]
pub fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => {
            let trimmed = s.trim();
            (!trimmed.is_empty()).then(|| trimmed.to_string())
        }
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("name").and_then(as_text),
        _ => None,
    }
}

/// Coerce a value to a positive, finite price.
///
/// Accepts numbers and strings such as `"$12.50"` or `"1,299.00"`.
#[must_use]
pub fn as_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let cleaned: String = s
                .trim()
                .trim_start_matches('$')
                .chars()
                .filter(|c| *c != ',')
                .collect();
            cleaned.trim().parse::<f64>().ok()?
        }
        _ => return None,
    };
    (price.is_finite() && price > 0.0).then_some(price)
}
