//! Callscope configuration
//!
//! One serde struct per concern, every field defaulted, loadable from TOML:
//!
//! ```toml
//! [session]
//! refresh_interval_secs = 600
//!
//! [routes]
//! sign_in = "/login"
//! ```

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// IO error reading the config file
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// TOML syntax or type error
    #[error("parse error: {0}")]
    Parse(#[from] toml::de::Error),

    /// Values are individually valid but inconsistent
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Top-level configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CallscopeConfig {
    pub session: SessionConfig,
    pub query: QueryConfig,
    pub directory: DirectoryConfig,
    pub context: ContextConfig,
    pub llm: LlmConfig,
    pub routes: RouteConfig,
    pub log: LogConfig,
}

impl CallscopeConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate configuration from a TOML file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    /// With session settings
    #[inline]
    #[must_use]
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.session = session;
        self
    }

    /// With query settings
    #[inline]
    #[must_use]
    pub fn with_query(mut self, query: QueryConfig) -> Self {
        self.query = query;
        self
    }

    /// With context settings
    #[inline]
    #[must_use]
    pub fn with_context(mut self, context: ContextConfig) -> Self {
        self.context = context;
        self
    }

    /// Reject inconsistent values
    pub fn validate(&self) -> Result<(), ConfigError> {
        let s = &self.session;
        if s.min_refresh_gap_secs > s.refresh_interval_secs {
            return Err(ConfigError::Invalid(format!(
                "session.min_refresh_gap_secs ({}) exceeds session.refresh_interval_secs ({})",
                s.min_refresh_gap_secs, s.refresh_interval_secs
            )));
        }
        if self.query.max_attempts == 0 {
            return Err(ConfigError::Invalid("query.max_attempts must be at least 1".into()));
        }
        if self.context.max_field_chars == 0 {
            return Err(ConfigError::Invalid("context.max_field_chars must be positive".into()));
        }
        let r = &self.routes;
        if !r.sign_in.starts_with('/') || !r.landing.starts_with('/') {
            return Err(ConfigError::Invalid("routes must be absolute paths".into()));
        }
        if r.is_protected(&r.sign_in) {
            return Err(ConfigError::Invalid(
                "routes.sign_in must not be a protected route".into(),
            ));
        }
        Ok(())
    }
}

/// Session lifecycle timings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// How often the watchdog wakes up on protected routes
    pub refresh_interval_secs: u64,
    /// Minimum time since the last refresh before another one is sent
    pub min_refresh_gap_secs: u64,
    /// Delay after entering a protected route before the first refresh
    pub settle_delay_ms: u64,
}

impl SessionConfig {
    #[must_use]
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }

    #[must_use]
    pub fn min_refresh_gap(&self) -> Duration {
        Duration::from_secs(self.min_refresh_gap_secs)
    }

    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 600,
            min_refresh_gap_secs: 480,
            settle_delay_ms: 500,
        }
    }
}

/// Retry policy for storage queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub factor: f64,
    pub jitter: f64,
    pub cap_ms: u64,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            factor: 2.0,
            jitter: 0.2,
            cap_ms: 4_000,
        }
    }
}

/// Account directory cache
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DirectoryConfig {
    pub cache_ttl_secs: u64,
    pub cache_capacity: u64,
}

impl Default for DirectoryConfig {
    fn default() -> Self {
        Self {
            cache_ttl_secs: 300,
            cache_capacity: 1_024,
        }
    }
}

/// AI context size limits
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextConfig {
    /// Upper bound for any single free-text field, in characters
    pub max_field_chars: usize,
    pub max_calls: usize,
    pub max_feedback: usize,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            max_field_chars: 280,
            max_calls: 20,
            max_feedback: 50,
        }
    }
}

/// Hosted LLM settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub base_url: String,
    /// Environment variable holding the API key
    pub api_key_env: String,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            model: "gpt-4o-mini".to_string(),
            temperature: 0.3,
            max_tokens: 800,
            base_url: "https://api.openai.com/v1/".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            timeout_secs: 30,
        }
    }
}

/// Route table used by the route guard
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RouteConfig {
    pub sign_in: String,
    pub landing: String,
    /// Path prefixes that require an authenticated session
    pub protected: Vec<String>,
}

impl RouteConfig {
    /// Whether `path` (query string ignored) falls under a protected prefix
    #[must_use]
    pub fn is_protected(&self, path: &str) -> bool {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        self.protected.iter().any(|prefix| {
            path == prefix
                || path
                    .strip_prefix(prefix.as_str())
                    .is_some_and(|rest| rest.starts_with('/'))
        })
    }
}

impl Default for RouteConfig {
    fn default() -> Self {
        Self {
            sign_in: "/login".to_string(),
            landing: "/".to_string(),
            protected: [
                "/dashboard",
                "/calls",
                "/chat",
                "/accounts",
                "/users",
                "/behaviors",
                "/prompts",
                "/contracts",
                "/settings",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

/// Log output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Filter used when `RUST_LOG` is unset
    pub filter: String,
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
            json: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = CallscopeConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.query.max_attempts, 3);
        assert_eq!(config.session.settle_delay(), Duration::from_millis(500));
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = CallscopeConfig::from_toml_str(
            r#"
            [session]
            settle_delay_ms = 750

            [routes]
            sign_in = "/signin"
            "#,
        )
        .unwrap();

        assert_eq!(config.session.settle_delay_ms, 750);
        assert_eq!(config.session.refresh_interval_secs, 600);
        assert_eq!(config.routes.sign_in, "/signin");
        assert_eq!(config.routes.landing, "/");
    }

    #[test]
    fn inconsistent_refresh_timings_rejected() {
        let result = CallscopeConfig::from_toml_str(
            r#"
            [session]
            refresh_interval_secs = 60
            min_refresh_gap_secs = 120
            "#,
        );
        assert!(matches!(result, Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[context]\nmax_field_chars = 64").unwrap();

        let config = CallscopeConfig::load(file.path()).unwrap();
        assert_eq!(config.context.max_field_chars, 64);
    }

    #[test]
    fn missing_file_reports_path() {
        let err = CallscopeConfig::load("/definitely/not/here.toml").unwrap_err();
        assert!(err.to_string().contains("/definitely/not/here.toml"));
    }

    #[test]
    fn protected_prefix_matching() {
        let routes = RouteConfig::default();
        assert!(routes.is_protected("/calls"));
        assert!(routes.is_protected("/calls/123?tab=feedback"));
        assert!(!routes.is_protected("/callsign"));
        assert!(!routes.is_protected("/login"));
        assert!(!routes.is_protected("/"));
    }
}
