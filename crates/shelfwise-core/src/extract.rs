//! Recovery of structured recommendations from raw provider text.
//!
//! The provider is asked for
//! `{"recommendations": [{"id", "reasoning"}], "overall_reasoning", "confidence"}`
//! but routinely wraps it in code fences, adds prose around it, or stops
//! mid-object when it runs out of tokens. Extraction is strict JSON parsing
//! first, then a salvage of the complete objects at the head of the
//! recommendations array. Scanning is string-aware throughout, so brackets,
//! braces and fences inside reasoning text never move a boundary. Nothing
//! here evaluates the input; it is untrusted text.

use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use thiserror::Error;

/// Confidence assumed for salvaged output.
pub const SALVAGE_CONFIDENCE: f64 = 0.8;

/// Overall reasoning assumed for salvaged output.
pub const SALVAGE_REASONING: &str = "AI-powered recommendations";

/// Longest sample of offending text kept in an error.
pub const ERROR_SAMPLE_CHARS: usize = 200;

lazy_static! {
    /// Fence opening the text, with an optional language tag.
    static ref LEADING_FENCE: Regex = Regex::new(r"\A\s*```[A-Za-z0-9_+-]*").unwrap();

    /// Fence closing the text.
    static ref TRAILING_FENCE: Regex = Regex::new(r"```\s*\z").unwrap();

    /// Opening of the recommendations array.
    static ref RECOMMENDATIONS_START: Regex = Regex::new(r#""recommendations"\s*:\s*\["#).unwrap();
}

/// Errors from extraction. All of them route the request to fallback.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ExtractionError {
    #[error("Provider returned no text")]
    Empty,

    #[error("No JSON object in provider output: {sample}")]
    NoJsonObject { sample: String },

    #[error("Unrecoverable provider output ({reason}): {sample}")]
    Unrecoverable { reason: String, sample: String },
}

impl ExtractionError {
    /// Truncated offending text, for logs.
    pub fn sample(&self) -> &str {
        match self {
            ExtractionError::Empty => "",
            ExtractionError::NoJsonObject { sample } => sample,
            ExtractionError::Unrecoverable { sample, .. } => sample,
        }
    }
}

/// One recommended id with the provider's reasoning.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderRecommendation {
    pub id: String,
    pub reasoning: String,
}

/// Structured provider output.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRecommendations {
    /// Recommendations in provider order (may be empty)
    pub recommendations: Vec<ProviderRecommendation>,

    /// Provider's overall explanation, if it gave one
    pub overall_reasoning: Option<String>,

    /// Provider's confidence in [0, 1], if it gave a usable one
    pub confidence: Option<f64>,

    /// True when the envelope was rebuilt from fragments
    pub salvaged: bool,
}

/// Extracts recommendations from provider text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResponseExtractor;

impl ResponseExtractor {
    pub fn new() -> Self {
        Self
    }

    /// Parse `raw` into recommendations.
    ///
    /// A well-formed envelope with few (or zero) recommendations is a
    /// success; only text with nothing recoverable is an error.
    pub fn extract(&self, raw: &str) -> Result<ParsedRecommendations, ExtractionError> {
        let text = strip_fences(raw);

        if text.is_empty() {
            return Err(ExtractionError::Empty);
        }

        let Some(start) = text.find('{') else {
            return Err(ExtractionError::NoJsonObject {
                sample: truncate_sample(text),
            });
        };

        let mut candidates: Vec<&str> = Vec::with_capacity(2);
        if let Some(end) = matching_brace(text, start) {
            candidates.push(&text[start..=end]);
        }
        if let Some(last) = text.rfind('}') {
            if last > start && !candidates.contains(&&text[start..=last]) {
                candidates.push(&text[start..=last]);
            }
        }

        let mut last_error = String::from("no closing brace");
        for candidate in candidates {
            match serde_json::from_str::<Value>(candidate) {
                Ok(value) => match envelope_from_value(value) {
                    Ok(parsed) => return Ok(parsed),
                    Err(reason) => last_error = reason,
                },
                Err(e) => last_error = e.to_string(),
            }
        }

        match salvage(&text[start..]) {
            Some(parsed) => {
                tracing::debug!(
                    salvaged = parsed.recommendations.len(),
                    "Salvaged recommendations from truncated provider output"
                );
                Ok(parsed)
            }
            None => Err(ExtractionError::Unrecoverable {
                reason: last_error,
                sample: truncate_sample(text),
            }),
        }
    }
}

/// `raw` without the fence lines wrapping it. Fences elsewhere are left
/// alone; outside the JSON object they are skipped anyway.
fn strip_fences(raw: &str) -> &str {
    let mut text = raw;
    if let Some(fence) = LEADING_FENCE.find(text) {
        text = &text[fence.end()..];
    }
    if let Some(fence) = TRAILING_FENCE.find(text) {
        text = &text[..fence.start()];
    }
    text.trim()
}

/// Byte index of the `}` closing the object that opens at `start`.
///
/// Braces inside JSON strings are ignored.
fn matching_brace(text: &str, start: usize) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, byte) in text.as_bytes()[start..].iter().enumerate() {
        if in_string {
            match byte {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match byte {
            b'"' => in_string = true,
            b'{' => depth += 1,
            b'}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(start + offset);
                }
            }
            _ => {}
        }
    }
    None
}

fn envelope_from_value(value: Value) -> Result<ParsedRecommendations, String> {
    let Value::Object(map) = value else {
        return Err("top-level JSON is not an object".to_string());
    };

    let recommendations = match map.get("recommendations") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(entries)) => entries.iter().filter_map(recommendation_from_value).collect(),
        Some(_) => return Err("recommendations is not an array".to_string()),
    };

    let overall_reasoning = map
        .get("overall_reasoning")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string);

    let confidence = map.get("confidence").and_then(confidence_from_value);

    Ok(ParsedRecommendations {
        recommendations,
        overall_reasoning,
        confidence,
        salvaged: false,
    })
}

fn recommendation_from_value(value: &Value) -> Option<ProviderRecommendation> {
    let id = match value.get("id")? {
        Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let reasoning = value
        .get("reasoning")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    Some(ProviderRecommendation { id, reasoning })
}

fn confidence_from_value(value: &Value) -> Option<f64> {
    let raw = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    raw.is_finite().then(|| raw.clamp(0.0, 1.0))
}

/// Rebuild an envelope from the complete objects in the recommendations
/// array, stopping at its close or at the first unterminated element.
fn salvage(text: &str) -> Option<ParsedRecommendations> {
    let mut cursor = RECOMMENDATIONS_START.find(text)?.end();
    let mut recommendations = Vec::new();

    loop {
        let Some(offset) = text[cursor..].find(|c: char| !c.is_whitespace() && c != ',') else {
            break;
        };
        let start = cursor + offset;
        if text.as_bytes()[start] != b'{' {
            break;
        }
        let Some(end) = matching_brace(text, start) else {
            break;
        };
        if let Some(rec) = serde_json::from_str::<Value>(&text[start..=end])
            .ok()
            .as_ref()
            .and_then(recommendation_from_value)
        {
            recommendations.push(rec);
        }
        cursor = end + 1;
    }

    if recommendations.is_empty() {
        return None;
    }

    Some(ParsedRecommendations {
        recommendations,
        overall_reasoning: Some(SALVAGE_REASONING.to_string()),
        confidence: Some(SALVAGE_CONFIDENCE),
        salvaged: true,
    })
}

/// First [`ERROR_SAMPLE_CHARS`] characters of `text`.
pub fn truncate_sample(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(ERROR_SAMPLE_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn extract(raw: &str) -> Result<ParsedRecommendations, ExtractionError> {
        ResponseExtractor::new().extract(raw)
    }

    const PAYLOAD: &str = r#"{"recommendations":[{"id":"42","reasoning":"fits style"},{"id":"7","reasoning":"pairs with cart"}],"overall_reasoning":"match","confidence":0.9}"#;

    #[test]
    fn test_well_formed_payload() {
        let parsed = extract(PAYLOAD).unwrap();

        assert_eq!(parsed.recommendations.len(), 2);
        assert_eq!(parsed.recommendations[0].id, "42");
        assert_eq!(parsed.recommendations[1].reasoning, "pairs with cart");
        assert_eq!(parsed.overall_reasoning.as_deref(), Some("match"));
        assert_eq!(parsed.confidence, Some(0.9));
        assert!(!parsed.salvaged);
    }

    #[test]
    fn test_fenced_payload_matches_bare() {
        let fenced = format!("```json\n{PAYLOAD}\n```");
        let plain_fence = format!("```\n{PAYLOAD}\n```");

        assert_eq!(extract(&fenced).unwrap(), extract(PAYLOAD).unwrap());
        assert_eq!(extract(&plain_fence).unwrap(), extract(PAYLOAD).unwrap());
    }

    #[test]
    fn test_single_fenced_recommendation() {
        let raw = "```json\n{\"recommendations\":[{\"id\":\"42\",\"reasoning\":\"fits style\"}],\"overall_reasoning\":\"match\",\"confidence\":0.9}\n```";
        let parsed = extract(raw).unwrap();

        assert_eq!(parsed.recommendations.len(), 1);
        assert_eq!(parsed.recommendations[0].id, "42");
        assert_eq!(parsed.confidence, Some(0.9));
    }

    #[test]
    fn test_prose_around_json() {
        let raw = format!("Here are my picks for you:\n{PAYLOAD}\nEnjoy shopping!");
        let parsed = extract(&raw).unwrap();
        assert_eq!(parsed.recommendations.len(), 2);
    }

    #[test]
    fn test_truncated_payload_is_salvaged() {
        let raw = r#"{"recommendations":[{"id":"7","reasoning":"ok"},{"id":"9","reas"#;
        let parsed = extract(raw).unwrap();

        assert!(parsed.salvaged);
        assert_eq!(parsed.recommendations.len(), 1);
        assert_eq!(parsed.recommendations[0].id, "7");
        assert_eq!(parsed.confidence, Some(SALVAGE_CONFIDENCE));
        assert_eq!(parsed.overall_reasoning.as_deref(), Some(SALVAGE_REASONING));
    }

    #[test]
    fn test_truncated_after_array_close() {
        let raw = r#"{"recommendations":[{"id":"1","reasoning":"a"},{"id":"2","reasoning":"b"}],"overall_reasoning":"str"#;
        let parsed = extract(raw).unwrap();

        assert!(parsed.salvaged);
        let ids: Vec<&str> = parsed.recommendations.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
    }

    #[test]
    fn test_braces_inside_strings_do_not_confuse_matching() {
        let raw = r#"{"recommendations":[{"id":"3","reasoning":"use {curly} words"}],"confidence":0.6} trailing }"#;
        let parsed = extract(raw).unwrap();

        assert!(!parsed.salvaged);
        assert_eq!(parsed.recommendations[0].reasoning, "use {curly} words");
    }

    #[test]
    fn test_brackets_in_reasoning_do_not_stop_salvage() {
        let raw = r#"{"recommendations":[{"id":"1","reasoning":"pairs with [3] in your cart"},{"id":"2","reasoning":"b"},{"id":"3","rea"#;
        let parsed = extract(raw).unwrap();

        assert!(parsed.salvaged);
        let ids: Vec<&str> = parsed.recommendations.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(parsed.recommendations[0].reasoning, "pairs with [3] in your cart");
    }

    #[test]
    fn test_braces_in_reasoning_do_not_stop_salvage() {
        let raw = r#"{"recommendations":[{"id":"1","reasoning":"a"},{"id":"2","reasoning":"style {casual}"},{"id":"3","rea"#;
        let parsed = extract(raw).unwrap();

        let ids: Vec<&str> = parsed.recommendations.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["1", "2"]);
        assert_eq!(parsed.recommendations[1].reasoning, "style {casual}");
    }

    #[test]
    fn test_fences_inside_strings_are_kept() {
        let raw = "```json\n{\"recommendations\":[{\"id\":\"1\",\"reasoning\":\"wrap in ```code```\"}]}\n```";
        let parsed = extract(raw).unwrap();

        assert!(!parsed.salvaged);
        assert_eq!(parsed.recommendations[0].reasoning, "wrap in ```code```");
    }

    #[test]
    fn test_no_json_is_an_error() {
        let err = extract("Sorry, I cannot help with that.").unwrap_err();
        assert!(matches!(err, ExtractionError::NoJsonObject { .. }));
        assert!(err.sample().contains("Sorry"));
    }

    #[test]
    fn test_empty_text_is_an_error() {
        assert_eq!(extract("  ```json\n```  ").unwrap_err(), ExtractionError::Empty);
    }

    #[test]
    fn test_truncated_without_complete_object_is_an_error() {
        let err = extract(r#"{"recommendations":[{"id":"7","reas"#).unwrap_err();
        assert!(matches!(err, ExtractionError::Unrecoverable { .. }));
    }

    #[test]
    fn test_empty_recommendations_is_success() {
        let parsed = extract(r#"{"recommendations":[],"overall_reasoning":"nothing fits"}"#).unwrap();
        assert!(parsed.recommendations.is_empty());
        assert_eq!(parsed.confidence, None);
    }

    #[test]
    fn test_entries_without_id_are_skipped() {
        let parsed = extract(r#"{"recommendations":[{"reasoning":"no id"},{"id":5}]}"#).unwrap();
        assert_eq!(parsed.recommendations.len(), 1);
        assert_eq!(parsed.recommendations[0].id, "5");
        assert_eq!(parsed.recommendations[0].reasoning, "");
    }

    #[test]
    fn test_confidence_is_clamped_and_parsed() {
        let parsed = extract(r#"{"recommendations":[],"confidence":"1.7"}"#).unwrap();
        assert_eq!(parsed.confidence, Some(1.0));

        let parsed = extract(r#"{"recommendations":[],"confidence":"high"}"#).unwrap();
        assert_eq!(parsed.confidence, None);
    }

    #[test]
    fn test_non_array_recommendations_falls_back_to_salvage_and_fails() {
        let err = extract(r#"{"recommendations":"none"}"#).unwrap_err();
        assert!(matches!(err, ExtractionError::Unrecoverable { .. }));
    }

    #[test]
    fn test_sample_is_truncated() {
        let long = "x".repeat(500);
        let err = extract(&long).unwrap_err();
        assert_eq!(err.sample().chars().count(), ERROR_SAMPLE_CHARS + 3);
    }

    fn arb_recommendations() -> impl Strategy<Value = Vec<(String, String)>> {
        prop::collection::vec(
            ("[a-z0-9]{1,8}", "[a-zA-Z0-9 ,:\\[\\]{}\"\\\\`]{0,24}"),
            1..6,
        )
    }

    fn pairs(parsed: &ParsedRecommendations) -> Vec<(String, String)> {
        parsed
            .recommendations
            .iter()
            .map(|r| (r.id.clone(), r.reasoning.clone()))
            .collect()
    }

    proptest! {
        #[test]
        fn prop_payload_is_recovered_bare_and_fenced(items in arb_recommendations()) {
            let entries: Vec<Value> = items
                .iter()
                .map(|(id, reasoning)| json!({"id": id, "reasoning": reasoning}))
                .collect();
            let payload = json!({"recommendations": entries, "confidence": 0.8}).to_string();

            for raw in [
                payload.clone(),
                format!("```json\n{payload}\n```"),
                format!("```\n{payload}\n```"),
            ] {
                let parsed = extract(&raw).unwrap();
                prop_assert!(!parsed.salvaged);
                prop_assert_eq!(pairs(&parsed), items.clone());
            }
        }

        #[test]
        fn prop_every_complete_object_survives_truncation(items in arb_recommendations()) {
            let mut payload = String::from(r#"{"recommendations":["#);
            let mut ends = Vec::with_capacity(items.len());
            for (i, (id, reasoning)) in items.iter().enumerate() {
                if i > 0 {
                    payload.push(',');
                }
                payload.push_str(&json!({"id": id, "reasoning": reasoning}).to_string());
                ends.push(payload.len());
            }
            payload.push_str(r#"],"overall_reasoning":"done"}"#);

            for cut in ends[0]..payload.len() {
                let complete = ends.iter().filter(|&&end| end <= cut).count();
                let parsed = extract(&payload[..cut]).unwrap();

                prop_assert!(parsed.salvaged);
                prop_assert_eq!(pairs(&parsed), items[..complete].to_vec());
            }
        }
    }
}
