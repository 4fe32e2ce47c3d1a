use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::account::{ReferenceAccount, Taxonomy};

/// Main configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub tagspread: TagspreadConfig,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub propagation: PropagationConfig,
    pub taxonomy: TaxonomyConfig,
    #[serde(default)]
    pub reference_accounts: Vec<ReferenceAccount>,
}

/// Tagspread-specific configuration
#[derive(Debug, Clone, Deserialize)]
pub struct TagspreadConfig {
    pub db_path: PathBuf,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Social platform API configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_bearer_token_env")]
    pub bearer_token_env: String,
    #[serde(default = "default_max_retries")]
    pub max_retries: usize,
    #[serde(default = "default_page_size")]
    pub page_size: usize,
    /// First retry delay after a rate-limit response; doubles per retry
    #[serde(default = "default_rate_limit_backoff_secs")]
    pub rate_limit_backoff_secs: u64,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// Resolver LRU capacity; 0 disables caching
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            bearer_token_env: default_bearer_token_env(),
            max_retries: default_max_retries(),
            page_size: default_page_size(),
            rate_limit_backoff_secs: default_rate_limit_backoff_secs(),
            timeout_secs: default_timeout_secs(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

/// How many propagation hops a run performs
#[derive(Debug, Clone, Deserialize)]
pub struct PropagationConfig {
    #[serde(default = "default_passes")]
    pub passes: usize,
    /// Treat `passes` as an upper bound and stop at the first pass that changes nothing
    #[serde(default)]
    pub until_fixpoint: bool,
}

impl Default for PropagationConfig {
    fn default() -> Self {
        Self {
            passes: default_passes(),
            until_fixpoint: false,
        }
    }
}

/// Category taxonomy
#[derive(Debug, Clone, Deserialize)]
pub struct TaxonomyConfig {
    pub categories: Vec<String>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_base_url() -> String {
    "https://api.twitter.com/1.1".to_string()
}

fn default_bearer_token_env() -> String {
    "TWITTER_BEARER_TOKEN".to_string()
}

fn default_max_retries() -> usize {
    3
}

fn default_page_size() -> usize {
    5000
}

fn default_rate_limit_backoff_secs() -> u64 {
    60
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_cache_capacity() -> usize {
    1000
}

fn default_passes() -> usize {
    1
}

impl Config {
    /// Load configuration for commands that talk to the platform API
    ///
    /// Loads environment variables from .env file (if present) before loading config.
    /// Looks for config file in this order:
    /// 1. Path specified in TAGSPREAD_CONFIG environment variable
    /// 2. ./config.toml in current directory
    pub fn load() -> Result<Self> {
        let config = Self::load_offline()?;
        config.bearer_token()?;
        Ok(config)
    }

    /// Load configuration without requiring API credentials
    pub fn load_offline() -> Result<Self> {
        // .env is optional
        let _ = dotenv::dotenv();

        let config_path = std::env::var("TAGSPREAD_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config.toml"));

        Self::from_file(&config_path)
    }

    /// Parse and validate a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let config_str = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        Self::from_toml(&config_str)
    }

    pub fn from_toml(config_str: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(config_str).context("Failed to parse config.toml")?;
        config.validate()?;
        config.normalize_tags()?;
        Ok(config)
    }

    /// Validate configuration values
    fn validate(&self) -> Result<()> {
        let taxonomy = self.taxonomy()?;

        let handle_re = Regex::new(r"^@?[A-Za-z0-9_]{1,15}$").context("Invalid handle pattern")?;
        for reference in &self.reference_accounts {
            if !handle_re.is_match(&reference.handle) {
                anyhow::bail!(
                    "reference account handle is not a valid handle: {}",
                    reference.handle
                );
            }
            if reference.tags.is_empty() {
                anyhow::bail!("reference account {} has no tags", reference.handle);
            }
            taxonomy
                .validate_tags(&reference.tags)
                .with_context(|| format!("reference account {}", reference.handle))?;
        }

        if self.propagation.passes == 0 {
            anyhow::bail!("propagation.passes must be greater than 0");
        }

        if self.api.page_size == 0 || self.api.page_size > 5000 {
            anyhow::bail!("api.page_size must be between 1 and 5000");
        }

        if self.api.timeout_secs == 0 {
            anyhow::bail!("api.timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// Rewrite reference-account tags to the taxonomy's own category names
    fn normalize_tags(&mut self) -> Result<()> {
        let taxonomy = self.taxonomy()?;
        for reference in &mut self.reference_accounts {
            for tag in &mut reference.tags {
                let category = taxonomy
                    .category(tag)
                    .with_context(|| format!("unknown category '{}'", tag))?;
                *tag = category.as_str().to_string();
            }
        }
        Ok(())
    }

    /// The validated category taxonomy
    pub fn taxonomy(&self) -> Result<Taxonomy> {
        Taxonomy::new(&self.taxonomy.categories).context("Invalid [taxonomy] section")
    }

    /// Read the API bearer token from the configured environment variable
    pub fn bearer_token(&self) -> Result<String> {
        std::env::var(&self.api.bearer_token_env).with_context(|| {
            format!(
                "Environment variable {} not set. Set it in your .env file or as an environment variable with your API bearer token.",
                self.api.bearer_token_env
            )
        })
    }

    /// Get database path
    pub fn db_path(&self) -> &Path {
        &self.tagspread.db_path
    }
}
