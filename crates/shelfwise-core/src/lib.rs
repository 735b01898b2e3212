//! # shelfwise-core
//!
//! Deterministic building blocks for Shelfwise recommendations.
//!
//! This crate answers two questions without touching the network:
//! - What should we show when the AI provider is unavailable?
//! - What did the AI provider actually say, given text that may be fenced,
//!   wrapped in prose, or cut off mid-object?
//!
//! ## Key Guarantees
//!
//! 1. **Deterministic**: the fallback recommender returns the same ordered
//!    items for the same catalog, context and cap
//! 2. **No I/O**: nothing here calls a provider, a store, or a clock other
//!    than stamping results
//! 3. **Never fails on a catalog**: an empty catalog is an empty result, not
//!    an error
//!
//! ## Example
//!
//! ```rust
//! use shelfwise_core::{CatalogItem, FallbackRecommender, RecommendationContext};
//!
//! let catalog = vec![
//!     CatalogItem::new("1", "Bags", 4.9, 320.0),
//!     CatalogItem::new("2", "Shoes", 4.1, 150.0),
//! ];
//! let context = RecommendationContext::new().with_category("Shoes");
//! let items = FallbackRecommender::new().recommend(&catalog, &context, 4);
//! assert_eq!(items[0].id, "2");
//! ```

pub mod catalog;
pub mod extract;
pub mod fallback;
pub mod request;
pub mod result;

// Re-export main types at crate root
pub use catalog::{CatalogItem, RecommendationContext, RecommendedItem};
pub use extract::{
    ExtractionError, ParsedRecommendations, ProviderRecommendation, ResponseExtractor,
};
pub use fallback::FallbackRecommender;
pub use request::{
    InteractionRequest, RecommendationRequest, RequestValidationError, StoreMode,
};
pub use result::{RecommendationResult, RecommendationSource};
