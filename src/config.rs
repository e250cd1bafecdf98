//! Agent configuration
//!
//! Defaults are overridden by `ORDERPILOT_*` environment variables, which
//! the CLI in turn overrides with its flags.

use std::time::Duration;

use thiserror::Error;

/// Default Ollama endpoint
pub const DEFAULT_ORACLE_URL: &str = "http://localhost:11434";

/// Default MCP endpoint of the order service
pub const DEFAULT_MCP_URL: &str = "http://localhost:8050/mcp";

/// Default iteration budget per question
pub const DEFAULT_MAX_ITERATIONS: usize = 10;

/// Error type for configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid value for {key}: {value:?} ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Configuration for the agent controller
#[derive(Debug, Clone, PartialEq)]
pub struct AgentConfig {
    /// Model the oracle runs (e.g., "qwen3")
    pub model: String,
    /// Maximum number of decisions before stopping
    pub max_iterations: usize,
    /// Base URL of the Ollama-compatible oracle
    pub oracle_url: String,
    /// Bearer token for the oracle, if it needs one
    pub api_key: Option<String>,
    /// MCP endpoint of the capability provider
    pub mcp_url: String,
    /// Bound on each tool invocation
    pub tool_timeout: Option<Duration>,
    /// Bound on each oracle call
    pub oracle_timeout: Option<Duration>,
    /// Stream decisions and forward text chunks as they arrive
    pub stream: bool,
    /// Custom system prompt (uses default if None)
    pub system_prompt: Option<String>,
    /// OTLP collector endpoint; traces stay local when unset
    pub otlp_endpoint: Option<String>,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            model: "qwen3".to_string(),
            max_iterations: DEFAULT_MAX_ITERATIONS,
            oracle_url: DEFAULT_ORACLE_URL.to_string(),
            api_key: None,
            mcp_url: DEFAULT_MCP_URL.to_string(),
            tool_timeout: Some(Duration::from_secs(30)),
            oracle_timeout: Some(Duration::from_secs(120)),
            stream: false,
            system_prompt: None,
            otlp_endpoint: None,
        }
    }
}

impl AgentConfig {
    /// Defaults overridden by the process environment
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each key
    ///
    /// # Arguments
    /// * `lookup` - Returns the raw value of a variable, or None if unset
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        if let Some(model) = get("ORDERPILOT_MODEL") {
            config.model = model;
        }
        if let Some(raw) = get("ORDERPILOT_MAX_ITERATIONS") {
            config.max_iterations = parse_iterations("ORDERPILOT_MAX_ITERATIONS", &raw)?;
        }
        if let Some(url) = get("ORDERPILOT_ORACLE_URL") {
            config.oracle_url = url;
        }
        if let Some(key) = get("ORDERPILOT_API_KEY") {
            config.api_key = Some(key);
        }
        if let Some(url) = get("ORDERPILOT_MCP_URL") {
            config.mcp_url = url;
        }
        if let Some(raw) = get("ORDERPILOT_TOOL_TIMEOUT_SECS") {
            config.tool_timeout = parse_timeout("ORDERPILOT_TOOL_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = get("ORDERPILOT_ORACLE_TIMEOUT_SECS") {
            config.oracle_timeout = parse_timeout("ORDERPILOT_ORACLE_TIMEOUT_SECS", &raw)?;
        }
        if let Some(raw) = get("ORDERPILOT_STREAM") {
            config.stream = parse_bool("ORDERPILOT_STREAM", &raw)?;
        }
        if let Some(prompt) = get("ORDERPILOT_SYSTEM_PROMPT") {
            config.system_prompt = Some(prompt);
        }
        if let Some(endpoint) = get("ORDERPILOT_OTLP_ENDPOINT") {
            config.otlp_endpoint = Some(endpoint);
        }

        Ok(config)
    }
}

fn parse_iterations(key: &'static str, raw: &str) -> Result<usize, ConfigError> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err(invalid(key, raw, "must be at least 1")),
        Ok(n) => Ok(n),
        Err(e) => Err(invalid(key, raw, e)),
    }
}

/// Seconds; 0 disables the bound
fn parse_timeout(key: &'static str, raw: &str) -> Result<Option<Duration>, ConfigError> {
    let secs = raw.trim().parse::<u64>().map_err(|e| invalid(key, raw, e))?;
    Ok((secs > 0).then(|| Duration::from_secs(secs)))
}

fn parse_bool(key: &'static str, raw: &str) -> Result<bool, ConfigError> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(invalid(key, raw, "expected true or false")),
    }
}

fn invalid(key: &'static str, raw: &str, reason: impl ToString) -> ConfigError {
    ConfigError::InvalidValue {
        key,
        value: raw.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_empty_environment_gives_defaults() {
        let config = AgentConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, AgentConfig::default());
        assert_eq!(config.max_iterations, 10);
    }

    #[test]
    fn test_overrides() {
        let config = AgentConfig::from_lookup(lookup(&[
            ("ORDERPILOT_MODEL", "llama3.2"),
            ("ORDERPILOT_MAX_ITERATIONS", "4"),
            ("ORDERPILOT_TOOL_TIMEOUT_SECS", "0"),
            ("ORDERPILOT_STREAM", "yes"),
            ("ORDERPILOT_API_KEY", ""),
        ]))
        .unwrap();
        assert_eq!(config.model, "llama3.2");
        assert_eq!(config.max_iterations, 4);
        assert_eq!(config.tool_timeout, None);
        assert!(config.stream);
        assert_eq!(config.api_key, None);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = AgentConfig::from_lookup(lookup(&[("ORDERPILOT_MAX_ITERATIONS", "ten")])).unwrap_err();
        assert!(err.to_string().contains("ORDERPILOT_MAX_ITERATIONS"));

        assert!(AgentConfig::from_lookup(lookup(&[("ORDERPILOT_MAX_ITERATIONS", "0")])).is_err());
        assert!(AgentConfig::from_lookup(lookup(&[("ORDERPILOT_STREAM", "maybe")])).is_err());
    }
}
