//! Configuration management

use serde::{Deserialize, Serialize};
use stockctl_core::{Error, Result};

fn default_database_url() -> String {
    "sqlite:data/stockctl.db".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_true() -> bool {
    true
}

fn default_job_tick_ms() -> u64 {
    500
}

/// Application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Database URL
    #[serde(default = "default_database_url")]
    pub database_url: String,

    /// Address the HTTP server binds to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Token every mutating request must carry; unset disables the check
    #[serde(default)]
    pub csrf_token: Option<String>,

    /// Load sample records into empty tables on startup
    #[serde(default = "default_true")]
    pub seed_fixtures: bool,

    /// Progress tick of server-side jobs, in milliseconds
    #[serde(default = "default_job_tick_ms")]
    pub job_tick_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_url: default_database_url(),
            bind_addr: default_bind_addr(),
            csrf_token: None,
            seed_fixtures: true,
            job_tick_ms: default_job_tick_ms(),
        }
    }
}

impl Config {
    /// Load configuration from file or environment
    pub fn load(path: Option<&str>) -> Result<Self> {
        if let Some(p) = path {
            Self::load_from_file(p)
        } else {
            Self::load_from_env()
        }
    }

    /// Load from configuration file
    fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::ConfigError(format!("Failed to read config: {}", e)))?;

        Self::parse(&content)
    }

    fn parse(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load from environment variables
    fn load_from_env() -> Result<Self> {
        let defaults = Config::default();

        let job_tick_ms = match std::env::var("JOB_TICK_MS") {
            Ok(raw) => raw
                .parse()
                .map_err(|_| Error::ConfigError(format!("Invalid JOB_TICK_MS: {}", raw)))?,
            Err(_) => defaults.job_tick_ms,
        };

        Ok(Config {
            database_url: std::env::var("DATABASE_URL").unwrap_or(defaults.database_url),
            bind_addr: std::env::var("BIND_ADDR").unwrap_or(defaults.bind_addr),
            // Support file-based token (Docker/K8s secrets)
            csrf_token: get_secret("CSRF_TOKEN").filter(|t| !t.is_empty()),
            seed_fixtures: std::env::var("SEED_FIXTURES")
                .map(|v| parse_flag(&v))
                .unwrap_or(defaults.seed_fixtures),
            job_tick_ms,
        })
    }
}

fn parse_flag(value: &str) -> bool {
    !matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "0" | "false" | "no" | "off"
    )
}

/// Get secret from environment variable or file
///
/// Supports both direct environment variables and file-based secrets (Docker/Kubernetes pattern).
/// If `VAR_NAME` is not found, tries `VAR_NAME_FILE` which should point to a file containing the secret.
pub fn get_secret(var_name: &str) -> Option<String> {
    // Try environment variable first
    if let Ok(value) = std::env::var(var_name) {
        return Some(value);
    }

    // Try file-based secret (Docker secrets / Kubernetes)
    let file_var = format!("{}_FILE", var_name);
    if let Ok(path) = std::env::var(&file_var) {
        if let Ok(contents) = std::fs::read_to_string(&path) {
            return Some(contents.trim().to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_partial_toml() {
        let config = Config::parse(
            r#"
            database_url = "sqlite::memory:"
            csrf_token = "abc"
            "#,
        )
        .unwrap();
        assert_eq!(config.database_url, "sqlite::memory:");
        assert_eq!(config.csrf_token.as_deref(), Some("abc"));
        assert_eq!(config.bind_addr, "0.0.0.0:8080");
        assert!(config.seed_fixtures);
    }

    #[test]
    fn test_parse_rejects_bad_types() {
        assert!(Config::parse("seed_fixtures = \"maybe\"").is_err());
    }

    #[test]
    fn test_parse_flag() {
        assert!(parse_flag("true"));
        assert!(parse_flag("1"));
        assert!(!parse_flag("false"));
        assert!(!parse_flag(" OFF "));
    }

    #[test]
    fn test_secret_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "s3cret").unwrap();
        std::env::set_var("STOCKCTL_TEST_SECRET_FILE", file.path());

        assert_eq!(get_secret("STOCKCTL_TEST_SECRET").as_deref(), Some("s3cret"));
        assert_eq!(get_secret("STOCKCTL_TEST_MISSING"), None);
    }
}
