//! Prompts for the recommendation provider.
//!
//! The system prompt is fixed. The user prompt carries the shopper's context,
//! any remembered preferences, a bounded slice of the catalog, and the exact
//! JSON shape the extractor expects back.

use std::fmt::Write as _;

use shelfwise_core::{CatalogItem, RecommendationRequest};

use crate::providers::ChatMessage;

/// System prompt shared by every recommendation call.
pub const SYSTEM_PROMPT: &str = "You are an AI shopping assistant that provides personalized \
product recommendations. You analyze user context, preferences, and shopping behavior to \
suggest relevant products.";

/// Shown when the memory store had nothing (or failed).
pub const NO_MEMORY: &str = "No previous preferences found";

const RESPONSE_FORMAT: &str = r#"{
  "recommendations": [
    {
      "id": "product_id",
      "reasoning": "why this product fits the user"
    }
  ],
  "overall_reasoning": "explanation of recommendation strategy",
  "confidence": 0.85
}"#;

/// Everything that goes into one user prompt.
#[derive(Debug, Clone, Copy)]
pub struct PromptInput<'a> {
    pub request: &'a RecommendationRequest,

    /// Joined memory entries; empty when none
    pub memory_context: &'a str,

    /// Catalog items to list
    pub catalog_limit: usize,

    /// Number of items to ask for
    pub cap: usize,
}

/// Build the user prompt.
pub fn build_user_prompt(input: &PromptInput<'_>) -> String {
    let request = input.request;
    let mut prompt = String::with_capacity(2048);

    let selected = request
        .selected_product
        .as_ref()
        .map(CatalogItem::label)
        .unwrap_or("None");
    let category = request
        .current_category
        .as_deref()
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .unwrap_or("None");
    let memory = match input.memory_context.trim() {
        "" => NO_MEMORY,
        text => text,
    };

    // Writing to a String cannot fail.
    let _ = writeln!(prompt, "User Context:");
    let _ = writeln!(prompt, "- Store Mode: {}", request.store_mode.as_str());
    let _ = writeln!(prompt, "- Current Category: {}", category);
    let _ = writeln!(prompt, "- Selected Product: {}", selected);
    let _ = writeln!(prompt, "- Cart Items: {} items", request.cart_items.len());
    let _ = writeln!(prompt, "- Wishlist Items: {} items", request.wishlist_items.len());
    if !request.recent_searches.is_empty() {
        let _ = writeln!(prompt, "- Recent Searches: {}", request.recent_searches.join(", "));
    }
    let _ = writeln!(prompt, "- User Memory: {}", memory);

    let restaurants = request.restaurant_names();
    if !restaurants.is_empty() {
        let _ = writeln!(prompt, "- Available Restaurants: {}", restaurants.join(", "));
    }

    let _ = writeln!(
        prompt,
        "\nAvailable Products ({} total):",
        request.products.len()
    );
    for item in request.products.iter().take(input.catalog_limit) {
        let _ = writeln!(prompt, "{}", catalog_line(item));
    }

    let _ = write!(
        prompt,
        "\nPlease recommend {} products that would be most relevant to this user based on \
their context and preferences. Consider their shopping history, current selections, and \
store mode. Only use ids from the list above.\n\nRespond in this exact JSON format:\n{}",
        input.cap, RESPONSE_FORMAT
    );

    prompt
}

/// One catalog line: `- [id] name (category) - $price, rating r`.
fn catalog_line(item: &CatalogItem) -> String {
    format!(
        "- [{}] {} ({}) - ${:.2}, rating {:.1}",
        item.id,
        item.label(),
        item.category,
        item.price,
        item.score()
    )
}

/// System and user messages for one recommendation call.
pub fn build_messages(input: &PromptInput<'_>) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(SYSTEM_PROMPT),
        ChatMessage::user(build_user_prompt(input)),
    ]
}
