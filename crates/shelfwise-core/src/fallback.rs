//! Deterministic, network-free recommendations.
//!
//! Used whenever the remote provider is unconfigured, unavailable, or
//! returns nothing usable. Selection runs in priority tiers:
//!
//! 1. Similar to the selected item (same category, itself excluded), up to 2
//! 2. Complementary to the cart (any cart category), up to 1
//! 3. The category being browsed, up to the cap
//! 4. Highest rated of everything left, up to the cap
//!
//! An item chosen by an earlier tier is never chosen again. Within a tier
//! items are ranked by rating, highest first; equal ratings keep catalog
//! order, so identical inputs always give identical output.

use std::collections::HashSet;

use crate::catalog::{CatalogItem, RecommendationContext};

/// Items taken from the selected item's category.
pub const SIMILAR_LIMIT: usize = 2;

/// Items taken from the cart's categories.
pub const CART_LIMIT: usize = 1;

/// Tiered local recommender.
#[derive(Debug, Clone, Copy, Default)]
pub struct FallbackRecommender;

impl FallbackRecommender {
    pub fn new() -> Self {
        Self
    }

    /// Recommend up to `cap` items from `catalog`.
    ///
    /// Returns `min(cap, distinct ids in catalog)` items with no duplicate
    /// ids. An empty catalog yields an empty list, which is a valid result.
    pub fn recommend(
        &self,
        catalog: &[CatalogItem],
        context: &RecommendationContext,
        cap: usize,
    ) -> Vec<CatalogItem> {
        let mut selection = Selection::default();

        if let Some(selected) = context.selected_item.as_ref() {
            if !selected.category.is_empty() {
                let similar = ranked(catalog, |item| {
                    item.category == selected.category && item.id != selected.id
                });
                selection.take(similar, SIMILAR_LIMIT);
            }
        }

        if !context.cart_items.is_empty() {
            let cart_categories: HashSet<&str> = context
                .cart_items
                .iter()
                .map(|item| item.category.as_str())
                .filter(|category| !category.is_empty())
                .collect();
            let complementary = ranked(catalog, |item| {
                cart_categories.contains(item.category.as_str())
            });
            selection.take(complementary, CART_LIMIT);
        }

        if let Some(category) = context.category() {
            if selection.len() < cap {
                let in_category = ranked(catalog, |item| item.category == category);
                selection.take(in_category, cap - selection.len());
            }
        }

        if selection.len() < cap {
            selection.take(ranked(catalog, |_| true), cap - selection.len());
        }

        tracing::debug!(
            catalog = catalog.len(),
            selected = selection.len(),
            cap,
            "Fallback recommendation computed"
        );

        selection.into_items(cap)
    }

    /// Highest-rated items whose ids are not in `exclude`, at most `count`.
    ///
    /// This is tier 4 on its own; the orchestrator uses it to top up a short
    /// AI result.
    pub fn popularity_fill(
        &self,
        catalog: &[CatalogItem],
        exclude: &HashSet<&str>,
        count: usize,
    ) -> Vec<CatalogItem> {
        let mut selection = Selection::default();
        selection.seen.extend(exclude.iter().map(|id| id.to_string()));
        selection.take(ranked(catalog, |_| true), count);
        selection.into_items(count)
    }
}

/// Items matching `filter`, stable-sorted by rating descending.
fn ranked<'a, F>(catalog: &'a [CatalogItem], filter: F) -> Vec<&'a CatalogItem>
where
    F: Fn(&CatalogItem) -> bool,
{
    let mut items: Vec<&CatalogItem> = catalog.iter().filter(|item| filter(item)).collect();
    items.sort_by(|a, b| b.score().total_cmp(&a.score()));
    items
}

#[derive(Default)]
struct Selection<'a> {
    picked: Vec<&'a CatalogItem>,
    seen: HashSet<String>,
}

impl<'a> Selection<'a> {
    fn len(&self) -> usize {
        self.picked.len()
    }

    /// Take up to `quota` not-yet-seen items, in order.
    fn take(&mut self, candidates: Vec<&'a CatalogItem>, quota: usize) {
        let mut taken = 0;
        for item in candidates {
            if taken == quota {
                break;
            }
            if self.seen.insert(item.id.clone()) {
                self.picked.push(item);
                taken += 1;
            }
        }
    }

    fn into_items(self, cap: usize) -> Vec<CatalogItem> {
        self.picked.into_iter().take(cap).cloned().collect()
    }
}
