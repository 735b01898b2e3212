//! The uniform result envelope returned for every recommendation request.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::catalog::RecommendedItem;

/// Confidence used when the provider gives none.
pub const DEFAULT_AI_CONFIDENCE: f64 = 0.8;

/// Reasoning used when the provider gives none.
pub const DEFAULT_AI_REASONING: &str = "AI-powered personalized recommendations";

/// Which code path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationSource {
    /// The provider answered and at least one item matched the catalog
    Ai,

    /// The provider answered but nothing usable could be extracted
    SmartFallback,

    /// The provider failed, timed out, or the circuit was open
    SmartFallbackApiError,

    /// No provider is configured
    Fallback,
}

impl RecommendationSource {
    pub const fn as_str(&self) -> &'static str {
        match self {
            RecommendationSource::Ai => "ai",
            RecommendationSource::SmartFallback => "smart_fallback",
            RecommendationSource::SmartFallbackApiError => "smart_fallback_api_error",
            RecommendationSource::Fallback => "fallback",
        }
    }

    /// Fixed confidence for fallback paths. Hard errors score lower than a
    /// graceful fallback.
    pub const fn fallback_confidence(&self) -> Option<f64> {
        match self {
            RecommendationSource::Ai => None,
            RecommendationSource::SmartFallback => Some(0.7),
            RecommendationSource::SmartFallbackApiError => Some(0.6),
            RecommendationSource::Fallback => Some(0.5),
        }
    }

    /// Fixed, user-facing reasoning for fallback paths.
    pub const fn fallback_reasoning(&self) -> &'static str {
        match self {
            RecommendationSource::Ai => DEFAULT_AI_REASONING,
            RecommendationSource::SmartFallback => {
                "Smart recommendations based on your preferences and context"
            }
            RecommendationSource::SmartFallbackApiError => {
                "Smart recommendations based on your preferences (AI service temporarily unavailable)"
            }
            RecommendationSource::Fallback => {
                "Showing popular items (AI recommendations unavailable)"
            }
        }
    }

    pub const fn is_fallback(&self) -> bool {
        !matches!(self, RecommendationSource::Ai)
    }
}

impl std::fmt::Display for RecommendationSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of one recommendation request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecommendationResult {
    /// Ordered items, at most the request's cap
    pub items: Vec<RecommendedItem>,

    /// Human-readable explanation
    pub reasoning: String,

    /// Confidence in [0, 1]
    pub confidence: f64,

    /// Which path produced this result
    pub source: RecommendationSource,

    pub generated_at: DateTime<Utc>,
}

impl RecommendationResult {
    /// A result from one of the fallback paths.
    pub fn fallback(source: RecommendationSource, items: Vec<RecommendedItem>) -> Self {
        Self {
            items,
            reasoning: source.fallback_reasoning().to_string(),
            confidence: source.fallback_confidence().unwrap_or(DEFAULT_AI_CONFIDENCE),
            source,
            generated_at: Utc::now(),
        }
    }

    /// A result from the AI path, defaulting missing provider fields.
    pub fn ai(items: Vec<RecommendedItem>, reasoning: Option<String>, confidence: Option<f64>) -> Self {
        let confidence = confidence
            .filter(|c| c.is_finite())
            .map(|c| c.clamp(0.0, 1.0))
            .unwrap_or(DEFAULT_AI_CONFIDENCE);

        Self {
            items,
            reasoning: reasoning.unwrap_or_else(|| DEFAULT_AI_REASONING.to_string()),
            confidence,
            source: RecommendationSource::Ai,
            generated_at: Utc::now(),
        }
    }

    /// Ids in result order.
    pub fn ids(&self) -> Vec<&str> {
        self.items.iter().map(RecommendedItem::id).collect()
    }
}
