//! JSON Schema validation for inbound request bodies.
//!
//! Bodies are validated against `schemas/*.schema.json` before they are
//! deserialized, so callers get every problem at once with a stable,
//! machine-readable reason. The schemas enforce the required fields only.

use std::sync::OnceLock;

use serde_json::Value;
use thiserror::Error;

const RECOMMENDATION_SCHEMA_JSON: &str =
    include_str!("../../../../schemas/recommendation_request.schema.json");

const INTERACTION_SCHEMA_JSON: &str =
    include_str!("../../../../schemas/interaction_request.schema.json");

static RECOMMENDATION_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();
static INTERACTION_SCHEMA: OnceLock<Result<jsonschema::Validator, String>> = OnceLock::new();

/// Fields a recommendation request cannot omit.
pub const RECOMMENDATION_REQUIRED: &[&str] = &["user_id", "products"];

/// Fields an interaction request cannot omit.
pub const INTERACTION_REQUIRED: &[&str] = &["user_id", "product_id", "interaction_type"];

/// Why an inbound body was rejected.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RequestValidationError {
    #[error("Missing required fields: {}", fields.join(", "))]
    MissingFields { fields: Vec<String> },

    #[error("Invalid request body: {}", errors.join("; "))]
    InvalidBody { errors: Vec<String> },

    #[error("Request schema unavailable: {0}")]
    SchemaUnavailable(String),
}

impl RequestValidationError {
    /// Stable reason code for API responses.
    pub fn reason(&self) -> &'static str {
        match self {
            RequestValidationError::MissingFields { .. } => "missing_required_fields",
            RequestValidationError::InvalidBody { .. } => "invalid_body",
            RequestValidationError::SchemaUnavailable(_) => "schema_unavailable",
        }
    }
}

fn compile(cell: &'static OnceLock<Result<jsonschema::Validator, String>>, source: &str)
    -> Result<&'static jsonschema::Validator, RequestValidationError>
{
    let result = cell.get_or_init(|| {
        let schema_value: Value = match serde_json::from_str(source) {
            Ok(v) => v,
            Err(e) => return Err(format!("Invalid schema JSON: {}", e)),
        };

        match jsonschema::options().build(&schema_value) {
            Ok(v) => Ok(v),
            Err(e) => Err(format!("Failed to compile schema: {}", e)),
        }
    });

    match result {
        Ok(v) => Ok(v),
        Err(e) => Err(RequestValidationError::SchemaUnavailable(e.clone())),
    }
}

/// Validate a `POST /recommendations` body.
pub fn validate_recommendation_body(body: &Value) -> Result<(), RequestValidationError> {
    validate(body, RECOMMENDATION_REQUIRED, &RECOMMENDATION_SCHEMA, RECOMMENDATION_SCHEMA_JSON)
}

/// Validate a `POST /recommendations/interaction` body.
pub fn validate_interaction_body(body: &Value) -> Result<(), RequestValidationError> {
    validate(body, INTERACTION_REQUIRED, &INTERACTION_SCHEMA, INTERACTION_SCHEMA_JSON)
}

fn validate(
    body: &Value,
    required: &[&str],
    cell: &'static OnceLock<Result<jsonschema::Validator, String>>,
    source: &str,
) -> Result<(), RequestValidationError> {
    // Missing, null and empty-string fields are all reported as missing.
    let missing: Vec<String> = required
        .iter()
        .filter(|field| match body.get(**field) {
            None | Some(Value::Null) => true,
            Some(Value::String(s)) => s.trim().is_empty(),
            Some(_) => false,
        })
        .map(|field| field.to_string())
        .collect();

    if !missing.is_empty() {
        return Err(RequestValidationError::MissingFields { fields: missing });
    }

    let validator = compile(cell, source)?;
    let errors: Vec<String> = validator
        .iter_errors(body)
        .map(|e| format!("{} at {}", e, e.instance_path))
        .collect();

    if errors.is_empty() {
        Ok(())
    } else {
        Err(RequestValidationError::InvalidBody { errors })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schemas_compile() {
        assert!(compile(&RECOMMENDATION_SCHEMA, RECOMMENDATION_SCHEMA_JSON).is_ok());
        assert!(compile(&INTERACTION_SCHEMA, INTERACTION_SCHEMA_JSON).is_ok());
    }

    #[test]
    fn test_minimal_recommendation_body() {
        let body = json!({"user_id": "user_001", "products": []});
        assert!(validate_recommendation_body(&body).is_ok());
    }

    #[test]
    fn test_missing_fields_are_listed() {
        let err = validate_recommendation_body(&json!({"user_id": ""})).unwrap_err();
        assert_eq!(
            err,
            RequestValidationError::MissingFields {
                fields: vec!["user_id".to_string(), "products".to_string()]
            }
        );
        assert_eq!(err.reason(), "missing_required_fields");
    }

    #[test]
    fn test_wrongly_typed_required_fields_are_invalid() {
        let body = json!({"user_id": 42, "products": {"id": "1"}});
        let err = validate_recommendation_body(&body).unwrap_err();
        match err {
            RequestValidationError::InvalidBody { errors } => assert_eq!(errors.len(), 2),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_optional_fields_are_not_enforced() {
        let body = json!({
            "user_id": "u1",
            "products": [{"id": "1", "rating": null}, {"name": "no id"}],
            "store_mode": "Fashion",
            "limit": 0,
            "recent_searches": "boots"
        });
        assert!(validate_recommendation_body(&body).is_ok());
    }

    #[test]
    fn test_nulls_allowed_for_optional_fields() {
        let body = json!({
            "user_id": "u1",
            "products": [{"id": 3, "category": "Bags"}],
            "current_category": null,
            "cart_items": null,
            "selected_product": null
        });
        assert!(validate_recommendation_body(&body).is_ok());
    }

    #[test]
    fn test_interaction_body() {
        let ok = json!({"user_id": "u1", "product_id": "p1", "interaction_type": "clicked"});
        assert!(validate_interaction_body(&ok).is_ok());

        let err = validate_interaction_body(&json!({"user_id": "u1", "product_id": "p1"})).unwrap_err();
        assert_eq!(
            err,
            RequestValidationError::MissingFields {
                fields: vec!["interaction_type".to_string()]
            }
        );
    }
}
