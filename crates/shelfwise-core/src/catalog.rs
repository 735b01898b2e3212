//! Catalog and request-context types.
//!
//! Catalog items are supplied by the caller on every request and are never
//! mutated here. Fields this crate does not interpret (images, designer,
//! description, ...) are preserved in `extra` and echoed back unchanged.
//!
//! Storefronts send loosely typed catalogs (`null` ratings, numeric names),
//! so only the id is strict. An entry without a usable id is skipped; every
//! other malformed field reads as its default.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

/// A product (or dish) from the caller's live catalog.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CatalogItem {
    /// Unique identifier, matched against provider output
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,

    /// Display name
    #[serde(default, deserialize_with = "lenient_string")]
    pub name: String,

    /// Category used by the fallback tiers
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: String,

    /// Rating in [0, 5]
    #[serde(default, deserialize_with = "lenient_number")]
    pub rating: f64,

    /// Price, never negative
    #[serde(default, deserialize_with = "lenient_number")]
    pub price: f64,

    /// Every other field the caller sent
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl CatalogItem {
    /// Create an item with the fields the recommender reads.
    pub fn new(id: impl Into<String>, category: impl Into<String>, rating: f64, price: f64) -> Self {
        Self {
            id: id.into(),
            name: String::new(),
            category: category.into(),
            rating,
            price,
            extra: Map::new(),
        }
    }

    /// Read one caller-supplied entry. `None` (with a warning) when it has no
    /// usable id; `null` is quietly `None`.
    pub fn from_value(value: Value) -> Option<Self> {
        if value.is_null() {
            return None;
        }
        match serde_json::from_value::<CatalogItem>(value) {
            Ok(item) if !item.id.trim().is_empty() => Some(item),
            Ok(_) => {
                tracing::warn!("Skipping catalog entry with a blank id");
                None
            }
            Err(e) => {
                tracing::warn!(error = %e, "Skipping catalog entry without a usable id");
                None
            }
        }
    }

    /// Set the display name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Rating used for ranking. Non-finite ratings rank as zero.
    pub fn score(&self) -> f64 {
        if self.rating.is_finite() {
            self.rating
        } else {
            0.0
        }
    }

    /// Name for prompts and log lines, falling back to the id.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            &self.id
        } else {
            &self.name
        }
    }
}

/// Per-request shopping context.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RecommendationContext {
    /// Category the user is browsing
    #[serde(default)]
    pub current_category: Option<String>,

    /// Items in the cart
    #[serde(default)]
    pub cart_items: Vec<CatalogItem>,

    /// Items on the wishlist
    #[serde(default)]
    pub wishlist_items: Vec<CatalogItem>,

    /// Item currently being viewed
    #[serde(default)]
    pub selected_item: Option<CatalogItem>,
}

impl RecommendationContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.current_category = Some(category.into());
        self
    }

    pub fn with_cart(mut self, items: Vec<CatalogItem>) -> Self {
        self.cart_items = items;
        self
    }

    pub fn with_wishlist(mut self, items: Vec<CatalogItem>) -> Self {
        self.wishlist_items = items;
        self
    }

    pub fn with_selected(mut self, item: CatalogItem) -> Self {
        self.selected_item = Some(item);
        self
    }

    /// The browsing category, ignoring blank values.
    pub fn category(&self) -> Option<&str> {
        self.current_category
            .as_deref()
            .map(str::trim)
            .filter(|c| !c.is_empty())
    }
}

/// A catalog item placed in a result, with the provider's per-item reasoning
/// when the item came from the AI path.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RecommendedItem {
    #[serde(flatten)]
    pub item: CatalogItem,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reasoning: Option<String>,
}

impl RecommendedItem {
    pub fn plain(item: CatalogItem) -> Self {
        Self {
            item,
            reasoning: None,
        }
    }

    pub fn with_reasoning(item: CatalogItem, reasoning: impl Into<String>) -> Self {
        let reasoning = reasoning.into();
        Self {
            item,
            reasoning: (!reasoning.trim().is_empty()).then_some(reasoning),
        }
    }

    pub fn id(&self) -> &str {
        &self.item.id
    }
}

/// Accept ids sent either as JSON strings or numbers.
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, found {}",
            other
        ))),
    }
}

/// Strings as is, numbers as their text, anything else empty.
fn lenient_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => s,
        Value::Number(n) => n.to_string(),
        _ => String::new(),
    })
}

/// Numbers and numeric strings; anything else is zero.
fn lenient_number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let number = match Value::deserialize(deserializer)? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    Ok(number.filter(|n| n.is_finite()).unwrap_or_default())
}

/// A list of catalog entries. Unusable entries are skipped; a non-list is
/// empty.
pub(crate) fn lenient_items<'de, D>(deserializer: D) -> Result<Vec<CatalogItem>, D::Error>
where
    D: Deserializer<'de>,
{
    let entries = match Value::deserialize(deserializer)? {
        Value::Array(entries) => entries,
        Value::Null => Vec::new(),
        other => {
            tracing::warn!(found = %other, "Ignoring catalog list that is not an array");
            Vec::new()
        }
    };
    Ok(entries.into_iter().filter_map(CatalogItem::from_value).collect())
}

/// A single optional catalog entry.
pub(crate) fn lenient_item<'de, D>(deserializer: D) -> Result<Option<CatalogItem>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(CatalogItem::from_value(Value::deserialize(deserializer)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_preserves_unknown_fields() {
        let json = serde_json::json!({
            "id": "e31d",
            "name": "Denim Jacket",
            "category": "Clothing",
            "rating": 4.5,
            "price": 4650,
            "designer": "Louis Vuitton",
            "images": ["a.png", "b.png"]
        });

        let item: CatalogItem = serde_json::from_value(json).unwrap();
        assert_eq!(item.id, "e31d");
        assert_eq!(item.extra["designer"], "Louis Vuitton");

        let back = serde_json::to_value(&item).unwrap();
        assert_eq!(back["images"][1], "b.png");
        assert_eq!(back["category"], "Clothing");
    }

    #[test]
    fn test_numeric_id_is_accepted() {
        let item: CatalogItem =
            serde_json::from_value(serde_json::json!({"id": 42, "category": "Bags"})).unwrap();
        assert_eq!(item.id, "42");
        assert_eq!(item.rating, 0.0);
    }

    #[test]
    fn test_loose_fields_read_as_defaults() {
        let item: CatalogItem = serde_json::from_value(serde_json::json!({
            "id": "9",
            "name": null,
            "category": 12,
            "rating": null,
            "price": "19.5"
        }))
        .unwrap();

        assert_eq!(item.name, "");
        assert_eq!(item.category, "12");
        assert_eq!(item.rating, 0.0);
        assert_eq!(item.price, 19.5);
        assert_eq!(item.label(), "9");
    }

    #[test]
    fn test_entries_without_usable_id_are_skipped() {
        assert!(CatalogItem::from_value(serde_json::json!({"name": "No id"})).is_none());
        assert!(CatalogItem::from_value(serde_json::json!({"id": null})).is_none());
        assert!(CatalogItem::from_value(serde_json::json!({"id": "  "})).is_none());
        assert!(CatalogItem::from_value(serde_json::json!("just a string")).is_none());
        assert!(CatalogItem::from_value(serde_json::Value::Null).is_none());
        assert_eq!(CatalogItem::from_value(serde_json::json!({"id": 4})).unwrap().id, "4");
    }

    #[test]
    fn test_non_finite_rating_scores_zero() {
        let item = CatalogItem::new("1", "Bags", f64::NAN, 10.0);
        assert_eq!(item.score(), 0.0);
    }

    #[test]
    fn test_blank_category_is_ignored() {
        let context = RecommendationContext::new().with_category("   ");
        assert!(context.category().is_none());
    }

    #[test]
    fn test_recommended_item_serializes_flat() {
        let item = CatalogItem::new("7", "Shoes", 4.0, 120.0).with_name("Loafer");
        let value = serde_json::to_value(RecommendedItem::with_reasoning(item, "fits style")).unwrap();
        assert_eq!(value["id"], "7");
        assert_eq!(value["reasoning"], "fits style");

        let plain = serde_json::to_value(RecommendedItem::plain(CatalogItem::new("8", "Shoes", 3.0, 1.0)))
            .unwrap();
        assert!(plain.get("reasoning").is_none());
    }
}
