//! Configuration management for fedx.
//!
//! Loads configuration from ${FEDX_HOME}/config.toml with sensible defaults.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::core::state::WorkerTemplate;
use crate::core::worker::DEFAULT_MAX_WORKER_TURNS;

/// Returns the default config template with comments.
fn default_config_template() -> &'static str {
    include_str!("../default_config.toml")
}

pub mod paths {
    //! Path resolution for fedx configuration.
    //!
    //! `FEDX_HOME` resolution order:
    //! 1. `FEDX_HOME` environment variable (if set)
    //! 2. ~/.config/fedx (default)
    //! 3. ./.fedx when no home directory can be determined

    use std::path::PathBuf;

    pub fn fedx_home() -> PathBuf {
        if let Ok(home) = std::env::var("FEDX_HOME")
            && !home.trim().is_empty()
        {
            return PathBuf::from(home);
        }

        dirs::home_dir().map_or_else(
            || PathBuf::from(".fedx"),
            |h| h.join(".config").join("fedx"),
        )
    }

    /// Returns the path to the config.toml file.
    pub fn config_path() -> PathBuf {
        fedx_home().join("config.toml")
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Model used by the master and by every worker
    pub model: String,

    /// Maximum tokens per completion
    pub max_tokens: u32,

    /// Shared workspace directory for worker file tools
    pub workspace: PathBuf,

    /// Per-delegation deadline in seconds (0 disables)
    pub delegation_timeout_secs: u64,

    /// Timeout for a single worker tool call in seconds (0 disables)
    pub tool_timeout_secs: u64,

    /// Completion round-trips a worker may take per task
    pub max_worker_turns: usize,

    /// Optional inline master prompt template
    pub master_system_prompt: Option<String>,

    /// Optional path to a file holding the master prompt template
    pub master_system_prompt_file: Option<String>,

    pub providers: ProvidersConfig,

    /// Extra worker templates; same-named entries replace built-ins.
    pub templates: Vec<WorkerTemplate>,

    pub logging: LoggingConfig,
}

impl Config {
    pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";
    const DEFAULT_MAX_TOKENS: u32 = 4096;
    const DEFAULT_WORKSPACE: &str = "workspace";
    const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 30;

    /// Loads configuration from the default config path.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        Self::load_from(&paths::config_path())
    }

    /// Loads configuration from a specific path.
    /// Returns defaults if file doesn't exist.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load_from(path: &Path) -> Result<Self> {
        if path.exists() {
            let contents = fs::read_to_string(path)
                .with_context(|| format!("Failed to read config from {}", path.display()))?;
            toml::from_str(&contents)
                .with_context(|| format!("Failed to parse config from {}", path.display()))
        } else {
            Ok(Config::default())
        }
    }

    /// Returns the master prompt override, preferring the file if both are set.
    ///
    /// # Errors
    /// Returns an error if `master_system_prompt_file` cannot be read.
    pub fn effective_master_prompt(&self) -> Result<Option<String>> {
        if let Some(path_str) = &self.master_system_prompt_file {
            let content = fs::read_to_string(path_str)
                .with_context(|| format!("Failed to read master prompt file: {path_str}"))?;
            let trimmed = content.trim();
            return Ok((!trimmed.is_empty()).then(|| trimmed.to_string()));
        }

        let trimmed = self.master_system_prompt.as_deref().unwrap_or("").trim();
        Ok((!trimmed.is_empty()).then(|| trimmed.to_string()))
    }

    pub fn tool_timeout(&self) -> Option<Duration> {
        (self.tool_timeout_secs > 0).then(|| Duration::from_secs(self.tool_timeout_secs))
    }

    pub fn delegation_timeout(&self) -> Option<Duration> {
        (self.delegation_timeout_secs > 0)
            .then(|| Duration::from_secs(self.delegation_timeout_secs))
    }

    /// Creates a default config file at the given path.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be written.
    pub fn init(path: &Path) -> Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists at {}", path.display());
        }

        Self::write_config(path, default_config_template())
    }

    /// Writes config content to a file, creating parent directories as needed.
    /// Uses atomic write (temp file + rename) to prevent corruption.
    fn write_config(path: &Path, content: &str) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create directory {}", parent.display()))?;
        }

        let tmp_path = path.with_extension("toml.tmp");
        fs::write(&tmp_path, content)
            .with_context(|| format!("Failed to write config to {}", tmp_path.display()))?;
        fs::rename(&tmp_path, path).with_context(|| {
            format!(
                "Failed to rename {} to {}",
                tmp_path.display(),
                path.display()
            )
        })?;

        Ok(())
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: Self::DEFAULT_MODEL.to_string(),
            max_tokens: Self::DEFAULT_MAX_TOKENS,
            workspace: PathBuf::from(Self::DEFAULT_WORKSPACE),
            delegation_timeout_secs: 0,
            tool_timeout_secs: Self::DEFAULT_TOOL_TIMEOUT_SECS,
            max_worker_turns: DEFAULT_MAX_WORKER_TURNS,
            master_system_prompt: None,
            master_system_prompt_file: None,
            providers: ProvidersConfig::default(),
            templates: Vec::new(),
            logging: LoggingConfig::default(),
        }
    }
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ProvidersConfig {
    pub anthropic: ProviderConfig,
}

/// Provider configuration entry.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    /// Optional API key (overrides environment variable).
    pub api_key: Option<String>,
    /// Optional API base URL (for proxies).
    pub base_url: Option<String>,
}

impl ProviderConfig {
    /// Returns the effective API key if set and non-empty.
    pub fn effective_api_key(&self) -> Option<&str> {
        self.api_key
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// Returns the effective base URL if set and non-empty.
    pub fn effective_base_url(&self) -> Option<&str> {
        self.base_url
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter directive used when `FEDX_LOG` is unset.
    pub level: String,
    /// Optional log file, written in addition to stderr.
    pub file: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            file: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempdir().unwrap();
        let config = Config::load_from(&dir.path().join("nonexistent.toml")).unwrap();

        assert_eq!(config.model, "claude-sonnet-4-20250514");
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.workspace, PathBuf::from("workspace"));
        assert_eq!(config.max_worker_turns, DEFAULT_MAX_WORKER_TURNS);
        assert_eq!(config.tool_timeout(), Some(Duration::from_secs(30)));
        assert_eq!(config.delegation_timeout(), None);
        assert!(config.templates.is_empty());
    }

    #[test]
    fn test_load_partial_config_merges_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            "model = \"claude-3-opus\"\ndelegation_timeout_secs = 90\n",
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.model, "claude-3-opus");
        assert_eq!(config.max_tokens, 4096);
        assert_eq!(config.delegation_timeout(), Some(Duration::from_secs(90)));
    }

    #[test]
    fn test_load_invalid_toml_reports_path() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "model = [").unwrap();

        let err = Config::load_from(&config_path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse config"));
    }

    #[test]
    fn test_templates_loaded_from_config() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
[[templates]]
name = "reviewer"
description = "Reviews files."
system_prompt = "You review code."
allowed_tools = ["read_file"]
"#,
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(config.templates.len(), 1);
        assert_eq!(config.templates[0].name, "reviewer");
        assert_eq!(config.templates[0].allowed_tools, vec!["read_file"]);
    }

    #[test]
    fn test_init_creates_config_with_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("subdir").join("config.toml");

        Config::init(&config_path).unwrap();

        let contents = fs::read_to_string(&config_path).unwrap();
        assert!(contents.contains("claude-sonnet-4-20250514"));
        assert!(contents.contains("# [[templates]]"));

        let parsed = Config::load_from(&config_path).unwrap();
        assert_eq!(parsed.model, Config::DEFAULT_MODEL);
        assert_eq!(parsed.logging.level, "warn");
    }

    #[test]
    fn test_init_fails_if_exists() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(&config_path, "").unwrap();

        assert!(Config::init(&config_path).is_err());
        assert_eq!(fs::read_to_string(&config_path).unwrap(), "");
    }

    #[test]
    fn test_master_prompt_file_wins_over_inline() {
        let dir = tempdir().unwrap();
        let prompt_file = dir.path().join("prompt.md");
        fs::write(&prompt_file, "file prompt\n").unwrap();

        let config = Config {
            master_system_prompt_file: Some(prompt_file.to_str().unwrap().to_string()),
            master_system_prompt: Some("inline prompt".to_string()),
            ..Default::default()
        };
        assert_eq!(
            config.effective_master_prompt().unwrap(),
            Some("file prompt".to_string())
        );

        let blank = Config {
            master_system_prompt: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(blank.effective_master_prompt().unwrap(), None);
    }

    #[test]
    fn test_zero_timeouts_disable() {
        let config = Config {
            tool_timeout_secs: 0,
            delegation_timeout_secs: 0,
            ..Default::default()
        };
        assert_eq!(config.tool_timeout(), None);
        assert_eq!(config.delegation_timeout(), None);
    }

    #[test]
    fn test_anthropic_provider_settings() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            "[providers.anthropic]\nbase_url = \"https://my-proxy.example.com\"\napi_key = \"  \"\n",
        )
        .unwrap();

        let config = Config::load_from(&config_path).unwrap();
        assert_eq!(
            config.providers.anthropic.effective_base_url(),
            Some("https://my-proxy.example.com")
        );
        assert_eq!(config.providers.anthropic.effective_api_key(), None);
    }
}
