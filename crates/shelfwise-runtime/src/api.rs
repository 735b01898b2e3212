//! Transport-agnostic inbound handlers.
//!
//! Each handler takes a raw JSON body and returns a status code plus JSON
//! body, so any HTTP framework (or the CLI) can sit in front of them.
//!
//! - `handle_recommendations`: 200 on every outcome, fallback included;
//!   400 only when `user_id` or `products` is missing or mistyped
//! - `handle_interaction`: 200 whether or not the memory write worked
//! - `handle_status`: breaker snapshot and fallback mode

use std::time::Duration;

use serde_json::{json, Value as JsonValue};

use shelfwise_core::{InteractionRequest, RecommendationRequest, RequestValidationError};

use crate::orchestrator::RecommendationOrchestrator;
use crate::resilience::deadline_in;

/// Status code and JSON body of a handled request.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: JsonValue,
}

impl ApiResponse {
    pub fn ok(body: JsonValue) -> Self {
        Self { status: 200, body }
    }

    pub fn bad_request(err: &RequestValidationError) -> Self {
        let missing = match err {
            RequestValidationError::MissingFields { fields } => fields.clone(),
            _ => Vec::new(),
        };
        Self {
            status: 400,
            body: json!({
                "success": false,
                "error": err.to_string(),
                "reason": err.reason(),
                "missing_fields": missing,
            }),
        }
    }

    pub fn internal_error(message: &str) -> Self {
        Self {
            status: 500,
            body: json!({
                "success": false,
                "error": message,
            }),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status)
    }
}

/// `POST /recommendations`, bounded by the configured deadline.
pub async fn handle_recommendations(
    orchestrator: &RecommendationOrchestrator,
    body: &JsonValue,
) -> ApiResponse {
    let deadline = orchestrator.config().recommendations.deadline;
    handle_recommendations_within(orchestrator, body, deadline).await
}

/// `POST /recommendations` with an explicit time budget.
pub async fn handle_recommendations_within(
    orchestrator: &RecommendationOrchestrator,
    body: &JsonValue,
    budget: Duration,
) -> ApiResponse {
    let request = match RecommendationRequest::from_json(body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, reason = e.reason(), "Rejected recommendation request");
            return ApiResponse::bad_request(&e);
        }
    };

    let result = orchestrator
        .get_recommendations_until(&request, deadline_in(budget))
        .await;

    let recommendations = match serde_json::to_value(&result.items) {
        Ok(items) => items,
        Err(e) => {
            tracing::error!(error = %e, "Could not serialize recommendations");
            return ApiResponse::internal_error("Failed to encode recommendations");
        }
    };

    ApiResponse::ok(json!({
        "success": true,
        "recommendations": recommendations,
        "reasoning": result.reasoning,
        "confidence": result.confidence,
        "source": result.source.as_str(),
        "generated_at": result.generated_at.to_rfc3339(),
    }))
}

/// `POST /recommendations/interaction`.
pub async fn handle_interaction(
    orchestrator: &RecommendationOrchestrator,
    body: &JsonValue,
) -> ApiResponse {
    let request = match InteractionRequest::from_json(body) {
        Ok(request) => request,
        Err(e) => {
            tracing::warn!(error = %e, "Rejected interaction");
            return ApiResponse::bad_request(&e);
        }
    };

    let recorded = orchestrator.record_interaction(&request).await;
    ApiResponse::ok(json!({
        "success": true,
        "message": "Interaction saved successfully",
        "recorded": recorded,
    }))
}

/// `GET /api/status`.
pub fn handle_status(orchestrator: &RecommendationOrchestrator) -> ApiResponse {
    match serde_json::to_value(orchestrator.status()) {
        Ok(status) => ApiResponse::ok(status),
        Err(e) => {
            tracing::error!(error = %e, "Could not serialize status");
            ApiResponse::internal_error("Failed to encode status")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RuntimeConfig;

    fn orchestrator() -> RecommendationOrchestrator {
        RecommendationOrchestrator::new(None, None, RuntimeConfig::default())
    }

    #[tokio::test]
    async fn test_recommendations_ok_on_fallback() {
        let body = json!({
            "user_id": "user_001",
            "products": [
                {"id": "1", "name": "Tote", "category": "Bags", "rating": 4.1, "price": 50, "color": "red"},
                {"id": 2, "name": "Runner", "category": "Shoes", "rating": 4.6, "price": 80}
            ]
        });

        let response = handle_recommendations(&orchestrator(), &body).await;

        assert_eq!(response.status, 200);
        assert!(response.is_success());
        assert_eq!(response.body["success"], true);
        assert_eq!(response.body["source"], "fallback");
        assert_eq!(response.body["confidence"], 0.5);

        let items = response.body["recommendations"].as_array().unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0]["id"], "2");
        // Unknown catalog fields are echoed back.
        assert_eq!(items[1]["color"], "red");
        assert!(items[0].get("reasoning").is_none());
        assert!(response.body["generated_at"].is_string());
    }

    #[tokio::test]
    async fn test_recommendations_missing_fields() {
        let response = handle_recommendations(&orchestrator(), &json!({"products": []})).await;

        assert_eq!(response.status, 400);
        assert!(response.is_client_error());
        assert_eq!(response.body["success"], false);
        assert_eq!(response.body["reason"], "missing_required_fields");
        assert_eq!(response.body["missing_fields"], json!(["user_id"]));
        assert_eq!(response.body["error"], "Missing required fields: user_id");
    }

    #[tokio::test]
    async fn test_recommendations_invalid_body() {
        let body = json!({"user_id": "u", "products": "not-a-list"});
        let response = handle_recommendations(&orchestrator(), &body).await;

        assert_eq!(response.status, 400);
        assert_eq!(response.body["reason"], "invalid_body");
        assert_eq!(response.body["missing_fields"], json!([]));
    }

    #[tokio::test]
    async fn test_unbounded_budget_is_served() {
        let body = json!({"user_id": "u", "products": [{"id": "1", "category": "Bags"}]});
        let response = handle_recommendations_within(&orchestrator(), &body, Duration::MAX).await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body["recommendations"][0]["id"], "1");
    }

    async fn recommend(extra: JsonValue) -> ApiResponse {
        let mut body = json!({
            "user_id": "user_001",
            "products": [
                {"id": "1", "name": "Tote", "category": "Bags", "rating": 4.1, "price": 50},
                {"id": "2", "name": "Runner", "category": "Shoes", "rating": 4.6, "price": 80}
            ]
        });
        if let (Some(body), JsonValue::Object(extra)) = (body.as_object_mut(), extra) {
            body.extend(extra);
        }
        handle_recommendations(&orchestrator(), &body).await
    }

    #[tokio::test]
    async fn test_null_item_fields_are_served() {
        let response = recommend(json!({
            "products": [
                {"id": "1", "name": null, "category": null, "rating": null, "price": null},
                {"id": "2", "name": "Runner", "category": "Shoes", "rating": 4.6, "price": 80}
            ]
        }))
        .await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body["recommendations"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unknown_store_mode_is_served() {
        let response = recommend(json!({"store_mode": "Fashion"})).await;
        assert_eq!(response.status, 200);

        let response = recommend(json!({"store_mode": "groceries"})).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["source"], "fallback");
    }

    #[tokio::test]
    async fn test_out_of_range_limit_is_clamped() {
        let response = recommend(json!({"limit": 0})).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["recommendations"].as_array().unwrap().len(), 1);

        let response = recommend(json!({"limit": 500})).await;
        assert_eq!(response.status, 200);
        assert_eq!(response.body["recommendations"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_items_without_id_are_skipped() {
        let response = recommend(json!({
            "products": [
                {"name": "Mystery", "category": "Bags", "rating": 5.0},
                {"id": "2", "name": "Runner", "category": "Shoes", "rating": 4.6, "price": 80}
            ]
        }))
        .await;

        assert_eq!(response.status, 200);
        let items = response.body["recommendations"].as_array().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0]["id"], "2");
    }

    #[tokio::test]
    async fn test_interaction_acknowledged_without_memory() {
        let body = json!({"user_id": "u", "product_id": "7", "interaction_type": "clicked"});
        let response = handle_interaction(&orchestrator(), &body).await;

        assert_eq!(response.status, 200);
        assert_eq!(response.body["success"], true);
        assert_eq!(response.body["message"], "Interaction saved successfully");
        assert_eq!(response.body["recorded"], false);
    }

    #[tokio::test]
    async fn test_interaction_missing_fields() {
        let response = handle_interaction(&orchestrator(), &json!({"user_id": "u"})).await;

        assert_eq!(response.status, 400);
        assert_eq!(
            response.body["missing_fields"],
            json!(["product_id", "interaction_type"])
        );
    }

    #[test]
    fn test_status() {
        let response = handle_status(&orchestrator());

        assert_eq!(response.status, 200);
        assert_eq!(response.body["state"], "CLOSED");
        assert_eq!(response.body["fallback_mode"], true);
        assert_eq!(response.body["provider_configured"], false);
        assert!(response.body.get("provider").is_none());
    }
}
