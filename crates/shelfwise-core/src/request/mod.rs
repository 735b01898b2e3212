//! Inbound request bodies.
//!
//! Only the required fields can get a request rejected. Optional fields that
//! are malformed read as their defaults: an odd `limit` or an unknown
//! `store_mode` should cost the caller a preference, not the answer.

mod schema;

pub use schema::{
    validate_interaction_body, validate_recommendation_body, RequestValidationError,
    INTERACTION_REQUIRED, RECOMMENDATION_REQUIRED,
};

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::catalog::{lenient_item, lenient_items, string_or_number, CatalogItem, RecommendationContext};

/// Storefront the request comes from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreMode {
    #[default]
    Fashion,
    Food,
}

impl StoreMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreMode::Fashion => "fashion",
            StoreMode::Food => "food",
        }
    }

    /// Case-insensitive name lookup.
    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_ascii_lowercase().as_str() {
            "fashion" => Some(StoreMode::Fashion),
            "food" => Some(StoreMode::Food),
            _ => None,
        }
    }
}

/// Body of `POST /recommendations`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationRequest {
    pub user_id: String,

    /// The live catalog for this request
    #[serde(deserialize_with = "lenient_items")]
    pub products: Vec<CatalogItem>,

    #[serde(default, deserialize_with = "lenient_text")]
    pub current_category: Option<String>,

    #[serde(default, deserialize_with = "lenient_items")]
    pub cart_items: Vec<CatalogItem>,

    #[serde(default, deserialize_with = "lenient_items")]
    pub wishlist_items: Vec<CatalogItem>,

    #[serde(default, deserialize_with = "lenient_item")]
    pub selected_product: Option<CatalogItem>,

    /// Unknown modes read as fashion
    #[serde(default, deserialize_with = "lenient_store_mode")]
    pub store_mode: StoreMode,

    /// Restaurants on offer (food mode); only names are used
    #[serde(default, deserialize_with = "lenient_list")]
    pub restaurants: Vec<Value>,

    #[serde(default, deserialize_with = "lenient_strings")]
    pub recent_searches: Vec<String>,

    /// Caller's preferred number of items. Negative counts read as 0; the
    /// runtime clamps into its allowed range.
    #[serde(default, deserialize_with = "lenient_limit")]
    pub limit: Option<usize>,
}

impl RecommendationRequest {
    /// Validate and deserialize a raw body.
    pub fn from_json(body: &Value) -> Result<Self, RequestValidationError> {
        validate_recommendation_body(body)?;
        serde_json::from_value(body.clone()).map_err(|e| RequestValidationError::InvalidBody {
            errors: vec![e.to_string()],
        })
    }

    /// The context the recommender works from.
    pub fn context(&self) -> RecommendationContext {
        RecommendationContext {
            current_category: self.current_category.clone(),
            cart_items: self.cart_items.clone(),
            wishlist_items: self.wishlist_items.clone(),
            selected_item: self.selected_product.clone(),
        }
    }

    /// Names of restaurants that have one.
    pub fn restaurant_names(&self) -> Vec<&str> {
        self.restaurants
            .iter()
            .filter_map(|r| r.get("name").and_then(Value::as_str))
            .collect()
    }
}

/// Body of `POST /recommendations/interaction`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InteractionRequest {
    pub user_id: String,

    #[serde(deserialize_with = "string_or_number")]
    pub product_id: String,

    /// What the user did, e.g. "clicked" or "added_to_cart"
    pub interaction_type: String,

    #[serde(default, deserialize_with = "lenient_text")]
    pub product_name: Option<String>,
}

impl InteractionRequest {
    /// Validate and deserialize a raw body.
    pub fn from_json(body: &Value) -> Result<Self, RequestValidationError> {
        validate_interaction_body(body)?;
        serde_json::from_value(body.clone()).map_err(|e| RequestValidationError::InvalidBody {
            errors: vec![e.to_string()],
        })
    }

    /// Memory text describing the interaction.
    pub fn memory_message(&self) -> String {
        let product = self
            .product_name
            .as_deref()
            .filter(|name| !name.trim().is_empty())
            .unwrap_or(self.product_id.as_str());
        format!(
            "User {} recommended product: {}",
            self.interaction_type, product
        )
    }
}

fn lenient_text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::String(s) => Some(s),
        _ => None,
    })
}

fn lenient_store_mode<'de, D>(deserializer: D) -> Result<StoreMode, D::Error>
where
    D: Deserializer<'de>,
{
    let mode = match Value::deserialize(deserializer)? {
        Value::String(name) => {
            let mode = StoreMode::parse(&name);
            if mode.is_none() {
                tracing::debug!(store_mode = %name, "Unknown store mode, using fashion");
            }
            mode
        }
        _ => None,
    };
    Ok(mode.unwrap_or_default())
}

fn lenient_list<'de, D>(deserializer: D) -> Result<Vec<Value>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Array(entries) => entries,
        _ => Vec::new(),
    })
}

fn lenient_strings<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(lenient_list(deserializer)?
        .into_iter()
        .filter_map(|entry| match entry {
            Value::String(s) => Some(s),
            _ => None,
        })
        .collect())
}

fn lenient_limit<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let limit = match Value::deserialize(deserializer)? {
        Value::Number(n) => match (n.as_u64(), n.as_f64()) {
            (Some(count), _) => Some(usize::try_from(count).unwrap_or(usize::MAX)),
            (None, Some(count)) if count.is_finite() => Some(count.max(0.0) as usize),
            _ => None,
        },
        Value::String(s) => s.trim().parse::<usize>().ok(),
        _ => None,
    };
    Ok(limit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_with_all_fields() {
        let body = json!({
            "user_id": "user_001",
            "store_mode": "food",
            "products": [{"id": "p1", "name": "Ramen", "category": "Noodles", "rating": 4.2, "price": 12}],
            "current_category": "Noodles",
            "cart_items": [{"id": "p2", "category": "Drinks"}],
            "wishlist_items": null,
            "selected_product": {"id": "p1", "category": "Noodles"},
            "restaurants": [{"name": "Ichiran"}, {"id": 9}],
            "recent_searches": ["spicy"],
            "limit": 8
        });

        let request = RecommendationRequest::from_json(&body).unwrap();
        assert_eq!(request.store_mode, StoreMode::Food);
        assert!(request.wishlist_items.is_empty());
        assert_eq!(request.restaurant_names(), vec!["Ichiran"]);
        assert_eq!(request.limit, Some(8));

        let context = request.context();
        assert_eq!(context.category(), Some("Noodles"));
        assert_eq!(context.selected_item.unwrap().id, "p1");
    }

    #[test]
    fn test_store_mode_defaults_to_fashion() {
        let body = json!({"user_id": "u", "products": [], "store_mode": null});
        let request = RecommendationRequest::from_json(&body).unwrap();
        assert_eq!(request.store_mode, StoreMode::Fashion);
    }

    #[test]
    fn test_loose_optional_fields_are_coerced() {
        let body = json!({
            "user_id": "u",
            "products": [
                {"id": "1", "rating": null, "price": null, "name": null, "category": null},
                {"name": "No id"},
                "junk",
                {"id": 2, "category": "Bags"}
            ],
            "current_category": 5,
            "cart_items": {"id": "x"},
            "selected_product": {"sku": "no-id"},
            "store_mode": "Food",
            "restaurants": "Ichiran",
            "recent_searches": ["boots", 7, null],
            "limit": 0
        });

        let request = RecommendationRequest::from_json(&body).unwrap();
        let ids: Vec<&str> = request.products.iter().map(|p| p.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(request.products[0].rating, 0.0);
        assert_eq!(request.current_category, None);
        assert!(request.cart_items.is_empty());
        assert!(request.selected_product.is_none());
        assert_eq!(request.store_mode, StoreMode::Food);
        assert!(request.restaurants.is_empty());
        assert_eq!(request.recent_searches, vec!["boots"]);
        assert_eq!(request.limit, Some(0));
    }

    #[test]
    fn test_unknown_store_mode_and_negative_limit() {
        let body = json!({"user_id": "u", "products": [], "store_mode": "groceries", "limit": -3});
        let request = RecommendationRequest::from_json(&body).unwrap();
        assert_eq!(request.store_mode, StoreMode::Fashion);
        assert_eq!(request.limit, Some(0));

        let body = json!({"user_id": "u", "products": [], "limit": "6"});
        assert_eq!(RecommendationRequest::from_json(&body).unwrap().limit, Some(6));
    }

    #[test]
    fn test_missing_products_rejected() {
        let err = RecommendationRequest::from_json(&json!({"user_id": "u"})).unwrap_err();
        assert_eq!(err.reason(), "missing_required_fields");
    }

    #[test]
    fn test_interaction_message_prefers_name() {
        let named = InteractionRequest::from_json(&json!({
            "user_id": "u", "product_id": 17, "interaction_type": "clicked", "product_name": "Tote"
        }))
        .unwrap();
        assert_eq!(named.product_id, "17");
        assert_eq!(named.memory_message(), "User clicked recommended product: Tote");

        let unnamed = InteractionRequest::from_json(&json!({
            "user_id": "u", "product_id": "p9", "interaction_type": "dismissed"
        }))
        .unwrap();
        assert_eq!(unnamed.memory_message(), "User dismissed recommended product: p9");
    }
}
