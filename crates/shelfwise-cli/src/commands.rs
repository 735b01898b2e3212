//! Subcommand implementations.

use std::io::Read;
use std::path::Path;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{json, Value as JsonValue};

use shelfwise_runtime::api::{self, ApiResponse};
use shelfwise_runtime::{ProviderRegistry, RecommendationOrchestrator, RuntimeConfig};

/// Load the runtime config, or defaults when no file is given.
pub fn load_config(path: Option<&Path>) -> Result<RuntimeConfig> {
    match path {
        Some(path) => {
            tracing::debug!(path = %path.display(), "Loading config");
            RuntimeConfig::from_yaml_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))
        }
        None => {
            tracing::debug!("No config file, using defaults");
            Ok(RuntimeConfig::default())
        }
    }
}

fn orchestrator(config: RuntimeConfig, registry: &ProviderRegistry) -> Result<RecommendationOrchestrator> {
    RecommendationOrchestrator::from_config(config, registry).context("Invalid runtime configuration")
}

fn read_body(path: &Path) -> Result<JsonValue> {
    let text = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("Failed to read request from stdin")?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read request file {}", path.display()))?
    };

    serde_json::from_str(&text).context("Request is not valid JSON")
}

/// 0 for 2xx, 2 for 4xx, 1 otherwise.
fn exit_status(response: &ApiResponse) -> u8 {
    if response.is_success() {
        0
    } else if response.is_client_error() {
        2
    } else {
        1
    }
}

fn print_json(value: &JsonValue) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub async fn recommend(
    config: RuntimeConfig,
    request: &Path,
    deadline: Option<Duration>,
    with_status: bool,
) -> Result<ExitCode> {
    let body = read_body(request)?;
    let orchestrator = orchestrator(config, &ProviderRegistry::with_defaults())?;

    let response = match deadline {
        Some(budget) => api::handle_recommendations_within(&orchestrator, &body, budget).await,
        None => api::handle_recommendations(&orchestrator, &body).await,
    };

    if with_status {
        let status = api::handle_status(&orchestrator);
        print_json(&json!({
            "response": response.body,
            "status": status.body,
        }))?;
    } else {
        print_json(&response.body)?;
    }

    Ok(ExitCode::from(exit_status(&response)))
}

pub async fn interaction(config: RuntimeConfig, request: &Path) -> Result<ExitCode> {
    let body = read_body(request)?;
    let orchestrator = orchestrator(config, &ProviderRegistry::with_defaults())?;

    let response = api::handle_interaction(&orchestrator, &body).await;
    print_json(&response.body)?;
    Ok(ExitCode::from(exit_status(&response)))
}

pub fn show_config(config: RuntimeConfig) -> Result<ExitCode> {
    let yaml = config.to_yaml().context("Failed to render config")?;
    let registry = ProviderRegistry::with_defaults();
    let orchestrator = orchestrator(config, &registry)?;
    let status = orchestrator.status();

    print!("{}", yaml);
    println!("---");
    println!("providers:");
    for (provider_type, description) in registry.providers() {
        println!("  {}: {}", provider_type, description);
    }
    println!("provider_configured: {}", status.provider_configured);
    println!("memory_configured: {}", status.memory_configured);
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let ok = ApiResponse::ok(json!({}));
        let bad = ApiResponse {
            status: 400,
            body: json!({}),
        };
        let err = ApiResponse::internal_error("boom");

        assert_eq!(exit_status(&ok), 0);
        assert_eq!(exit_status(&bad), 2);
        assert_eq!(exit_status(&err), 1);
    }

    #[test]
    fn test_default_config_without_file() {
        let config = load_config(None).unwrap();
        assert_eq!(config.recommendations.cap, 4);
    }

    #[test]
    fn test_missing_config_file_is_an_error() {
        assert!(load_config(Some(Path::new("/nonexistent/shelfwise.yaml"))).is_err());
    }
}
