//! Runtime settings
//!
//! Loaded from the process environment (and `.env` when present).

use crate::error::AssistantError;
use crate::Result;
use std::env;
use std::fmt;
use std::str::FromStr;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com";
pub const DEFAULT_CHAT_MODEL: &str = "gpt-4o";
pub const DEFAULT_TEMPERATURE: f32 = 0.6;
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
pub const DEFAULT_VECTOR_TABLE: &str = "book_vectors";
pub const DEFAULT_SERP_API_BASE_URL: &str = "https://serpapi.com";
pub const DEFAULT_RETRIEVAL_CONCURRENCY: usize = 4;
pub const DEFAULT_API_PORT: u16 = 8080;

#[derive(Clone)]
pub struct Settings {
    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub chat_model: String,
    pub temperature: f32,
    pub embedding_model: String,
    pub pg_connection_string: Option<String>,
    pub vector_table: String,
    pub serp_api_key: Option<String>,
    pub serp_api_base_url: String,
    pub retrieval_concurrency: usize,
    pub graph_tracing: bool,
    pub require_research_tool_call: bool,
    pub api_port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            openai_api_key: None,
            openai_base_url: DEFAULT_OPENAI_BASE_URL.to_string(),
            chat_model: DEFAULT_CHAT_MODEL.to_string(),
            temperature: DEFAULT_TEMPERATURE,
            embedding_model: DEFAULT_EMBEDDING_MODEL.to_string(),
            pg_connection_string: None,
            vector_table: DEFAULT_VECTOR_TABLE.to_string(),
            serp_api_key: None,
            serp_api_base_url: DEFAULT_SERP_API_BASE_URL.to_string(),
            retrieval_concurrency: DEFAULT_RETRIEVAL_CONCURRENCY,
            graph_tracing: true,
            require_research_tool_call: true,
            api_port: DEFAULT_API_PORT,
        }
    }
}

impl Settings {
    /// Load `.env` (if any) and read settings from the environment
    pub fn from_env() -> Result<Self> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let retrieval_concurrency: usize = parse_or(
            "RETRIEVAL_CONCURRENCY",
            non_empty("RETRIEVAL_CONCURRENCY"),
            defaults.retrieval_concurrency,
        )?;
        if retrieval_concurrency == 0 {
            return Err(AssistantError::Config(
                "RETRIEVAL_CONCURRENCY must be at least 1".to_string(),
            ));
        }

        Ok(Self {
            openai_api_key: non_empty("OPENAI_API_KEY"),
            openai_base_url: non_empty("OPENAI_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.openai_base_url),
            chat_model: non_empty("OPENAI_MODEL").unwrap_or(defaults.chat_model),
            temperature: parse_or(
                "OPENAI_TEMPERATURE",
                non_empty("OPENAI_TEMPERATURE"),
                defaults.temperature,
            )?,
            embedding_model: non_empty("OPENAI_EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            pg_connection_string: non_empty("PG_CONNECTION_STRING")
                .or_else(|| non_empty("DATABASE_URL")),
            vector_table: non_empty("VECTOR_TABLE").unwrap_or(defaults.vector_table),
            serp_api_key: non_empty("SERP_API_KEY"),
            serp_api_base_url: non_empty("SERP_API_BASE_URL")
                .map(|url| url.trim_end_matches('/').to_string())
                .unwrap_or(defaults.serp_api_base_url),
            retrieval_concurrency,
            graph_tracing: parse_or(
                "GRAPH_TRACING",
                non_empty("GRAPH_TRACING"),
                defaults.graph_tracing,
            )?,
            require_research_tool_call: parse_or(
                "REQUIRE_RESEARCH_TOOL_CALL",
                non_empty("REQUIRE_RESEARCH_TOOL_CALL"),
                defaults.require_research_tool_call,
            )?,
            api_port: parse_or(
                "PORT",
                non_empty("PORT").or_else(|| non_empty("API_PORT")),
                defaults.api_port,
            )?,
        })
    }

    /// Resolve the credential for a turn: caller-supplied first, then the configured default
    pub fn resolve_api_key(&self, supplied: Option<&str>) -> Result<String> {
        supplied
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .map(str::to_string)
            .or_else(|| self.openai_api_key.clone())
            .ok_or_else(|| {
                AssistantError::Config(
                    "no OpenAI API key supplied and OPENAI_API_KEY is not set".to_string(),
                )
            })
    }
}

fn parse_or<T: FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T> {
    match raw {
        Some(value) => value.trim().parse::<T>().map_err(|_| {
            AssistantError::Config(format!("{} has an invalid value: {}", key, value))
        }),
        None => Ok(default),
    }
}

impl fmt::Debug for Settings {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let redact = |v: &Option<String>| v.as_ref().map(|_| "<redacted>");
        f.debug_struct("Settings")
            .field("openai_api_key", &redact(&self.openai_api_key))
            .field("openai_base_url", &self.openai_base_url)
            .field("chat_model", &self.chat_model)
            .field("temperature", &self.temperature)
            .field("embedding_model", &self.embedding_model)
            .field("pg_connection_string", &redact(&self.pg_connection_string))
            .field("vector_table", &self.vector_table)
            .field("serp_api_key", &redact(&self.serp_api_key))
            .field("serp_api_base_url", &self.serp_api_base_url)
            .field("retrieval_concurrency", &self.retrieval_concurrency)
            .field("graph_tracing", &self.graph_tracing)
            .field("require_research_tool_call", &self.require_research_tool_call)
            .field("api_port", &self.api_port)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_when_environment_is_empty() {
        let settings = Settings::from_lookup(|_| None).unwrap();
        assert_eq!(settings.chat_model, "gpt-4o");
        assert_eq!(settings.embedding_model, "text-embedding-3-small");
        assert_eq!(settings.vector_table, "book_vectors");
        assert!(settings.graph_tracing);
        assert!(settings.require_research_tool_call);
        assert_eq!(settings.api_port, 8080);
        assert!(settings.pg_connection_string.is_none());
    }

    #[test]
    fn test_overrides_and_fallback_keys() {
        let settings = Settings::from_lookup(lookup_from(&[
            ("OPENAI_BASE_URL", "http://localhost:11434/"),
            ("DATABASE_URL", "postgres://localhost/db"),
            ("GRAPH_TRACING", "false"),
            ("API_PORT", "9000"),
            ("RETRIEVAL_CONCURRENCY", "2"),
        ]))
        .unwrap();

        assert_eq!(settings.openai_base_url, "http://localhost:11434");
        assert_eq!(
            settings.pg_connection_string.as_deref(),
            Some("postgres://localhost/db")
        );
        assert!(!settings.graph_tracing);
        assert_eq!(settings.api_port, 9000);
        assert_eq!(settings.retrieval_concurrency, 2);
    }

    #[test]
    fn test_invalid_values_are_config_errors() {
        let err = Settings::from_lookup(lookup_from(&[("OPENAI_TEMPERATURE", "warm")]))
            .unwrap_err();
        assert!(matches!(err, AssistantError::Config(_)));

        let err = Settings::from_lookup(lookup_from(&[("RETRIEVAL_CONCURRENCY", "0")]))
            .unwrap_err();
        assert!(matches!(err, AssistantError::Config(_)));
    }

    #[test]
    fn test_resolve_api_key_prefers_supplied() {
        let settings = Settings {
            openai_api_key: Some("sk-default".to_string()),
            ..Settings::default()
        };
        assert_eq!(settings.resolve_api_key(Some("sk-user")).unwrap(), "sk-user");
        assert_eq!(settings.resolve_api_key(Some("  ")).unwrap(), "sk-default");
        assert_eq!(settings.resolve_api_key(None).unwrap(), "sk-default");

        let bare = Settings::default();
        assert!(bare.resolve_api_key(None).is_err());
    }

    #[test]
    fn test_debug_redacts_credentials() {
        let settings = Settings {
            openai_api_key: Some("sk-secret".to_string()),
            serp_api_key: Some("serp-secret".to_string()),
            ..Settings::default()
        };
        let rendered = format!("{:?}", settings);
        assert!(!rendered.contains("sk-secret"));
        assert!(!rendered.contains("serp-secret"));
        assert!(rendered.contains("<redacted>"));
    }
}
