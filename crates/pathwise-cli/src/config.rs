//! Configuration file management for pathwise.
//!
//! Provides a TOML-based config file at `~/.config/pathwise/config.toml` and a
//! resolution chain: CLI flag > env var > config file > default.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use pathwise_core::config::{ApiKey, CoreConfig, DEFAULT_PROVIDER, ProviderSettings};

// -----------------------------------------------------------------------
// Config file types
// -----------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub ai: AiSection,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<ProviderSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub google: Option<ProviderSection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ollama: Option<ProviderSection>,
    #[serde(default)]
    pub store: StoreSection,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct AiSection {
    /// Active provider name (google, openai, ollama).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_secs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hours_per_week: Option<u32>,
}

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct ProviderSection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StoreSection {
    /// Directory holding one `<roadmap-id>.json` per saved roadmap.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
}

impl ConfigFile {
    fn provider(&self, name: &str) -> Option<&ProviderSection> {
        match name {
            "openai" => self.openai.as_ref(),
            "google" => self.google.as_ref(),
            "ollama" => self.ollama.as_ref(),
            _ => None,
        }
    }

    /// Mutable section for a built-in provider, created on demand.
    pub fn provider_mut(&mut self, name: &str) -> Option<&mut ProviderSection> {
        let slot = match name {
            "openai" => &mut self.openai,
            "google" => &mut self.google,
            "ollama" => &mut self.ollama,
            _ => return None,
        };
        Some(slot.get_or_insert_with(ProviderSection::default))
    }
}

// -----------------------------------------------------------------------
// Paths
// -----------------------------------------------------------------------

/// Return the pathwise config directory.
///
/// Always uses XDG layout: `$XDG_CONFIG_HOME/pathwise` or
/// `~/.config/pathwise`, on every platform.
pub fn config_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CONFIG_HOME") {
        return PathBuf::from(xdg).join("pathwise");
    }
    home().join(".config").join("pathwise")
}

/// Return the path to the pathwise config file.
pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

/// Default roadmap directory: `$XDG_DATA_HOME/pathwise/roadmaps` or
/// `~/.local/share/pathwise/roadmaps`.
pub fn default_store_dir() -> PathBuf {
    let base = match std::env::var("XDG_DATA_HOME") {
        Ok(xdg) => PathBuf::from(xdg),
        Err(_) => home().join(".local").join("share"),
    };
    base.join("pathwise").join("roadmaps")
}

fn home() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("."))
}

// -----------------------------------------------------------------------
// Read / write
// -----------------------------------------------------------------------

/// Load and parse the config file. Returns an error if it does not exist.
pub fn load_config() -> Result<ConfigFile> {
    load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<ConfigFile> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config file at {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("failed to parse config file at {}", path.display()))
}

/// Serialize and write the config file, creating parent dirs as needed.
pub fn save_config(config: &ConfigFile) -> Result<()> {
    save_config_to(&config_path(), config)
}

/// Write `config` to `path` with 0600 permissions on Unix; it may hold API
/// keys.
pub fn save_config_to(path: &Path, config: &ConfigFile) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create config directory {}", dir.display()))?;
    }

    let contents = toml::to_string_pretty(config).context("failed to serialize config")?;
    std::fs::write(path, &contents)
        .with_context(|| format!("failed to write config file at {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let perms = std::fs::Permissions::from_mode(0o600);
        std::fs::set_permissions(path, perms)
            .with_context(|| format!("failed to set permissions on {}", path.display()))?;
    }

    Ok(())
}

// -----------------------------------------------------------------------
// Resolved config
// -----------------------------------------------------------------------

/// Built-in providers and their credential/model/endpoint env vars.
const PROVIDER_ENV: &[(&str, Option<&str>, &str, &str)] = &[
    ("openai", Some("OPENAI_API_KEY"), "OPENAI_MODEL", "OPENAI_BASE_URL"),
    ("google", Some("GOOGLE_API_KEY"), "GOOGLE_MODEL", "GOOGLE_BASE_URL"),
    ("ollama", None, "OLLAMA_MODEL", "OLLAMA_BASE_URL"),
];

/// Fully resolved configuration, ready for use.
#[derive(Debug)]
pub struct PathwiseConfig {
    pub core: CoreConfig,
    pub store_dir: PathBuf,
}

impl PathwiseConfig {
    /// Resolve configuration using the chain: CLI flag > env var > config
    /// file > default.
    ///
    /// - Provider: `cli_provider` > `PATHWISE_AI_PROVIDER` > `ai.provider` > `google`
    /// - Per provider: `<NAME>_API_KEY`, `<NAME>_MODEL`, `<NAME>_BASE_URL` >
    ///   `[<name>]` section > built-in defaults
    /// - Shared: `PATHWISE_AI_TIMEOUT` (seconds), `PATHWISE_AI_TEMPERATURE`,
    ///   `PATHWISE_AI_MAX_TOKENS`, `PATHWISE_HOURS_PER_WEEK` > `[ai]` section > defaults
    /// - Store: `PATHWISE_STORE_DIR` > `store.dir` > XDG data dir
    pub fn resolve(cli_provider: Option<&str>) -> Result<Self> {
        let file = if config_path().exists() {
            Some(load_config()?)
        } else {
            None
        };
        Self::resolve_with(cli_provider, file.as_ref())
    }

    pub fn resolve_with(cli_provider: Option<&str>, file: Option<&ConfigFile>) -> Result<Self> {
        let empty = ConfigFile::default();
        let file = file.unwrap_or(&empty);

        let active = cli_provider
            .map(str::to_string)
            .or_else(|| env("PATHWISE_AI_PROVIDER"))
            .or_else(|| file.ai.provider.clone())
            .unwrap_or_else(|| DEFAULT_PROVIDER.to_string());

        let timeout = match env("PATHWISE_AI_TIMEOUT") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u64>()
                    .with_context(|| format!("PATHWISE_AI_TIMEOUT must be whole seconds, got {raw:?}"))?,
            ),
            None => file.ai.timeout_secs,
        };
        let temperature = match env("PATHWISE_AI_TEMPERATURE") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<f32>()
                    .with_context(|| format!("PATHWISE_AI_TEMPERATURE must be a number, got {raw:?}"))?,
            ),
            None => file.ai.temperature,
        };
        let max_tokens = match env("PATHWISE_AI_MAX_TOKENS") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u32>()
                    .with_context(|| format!("PATHWISE_AI_MAX_TOKENS must be a whole number, got {raw:?}"))?,
            ),
            None => file.ai.max_tokens,
        };

        let hours_per_week = match env("PATHWISE_HOURS_PER_WEEK") {
            Some(raw) => Some(
                raw.trim()
                    .parse::<u32>()
                    .ok()
                    .filter(|hours| *hours > 0)
                    .with_context(|| {
                        format!("PATHWISE_HOURS_PER_WEEK must be a positive whole number, got {raw:?}")
                    })?,
            ),
            None => file.ai.hours_per_week,
        };

        let mut core = CoreConfig::default().with_active(&active.trim().to_lowercase());
        if let Some(hours) = hours_per_week {
            core.hours_per_week = hours;
        }

        for &(name, key_var, model_var, url_var) in PROVIDER_ENV {
            let section = file.provider(name).cloned().unwrap_or_default();
            let mut settings = ProviderSettings::defaults_for(name);

            let api_key = key_var.and_then(env).or(section.api_key);
            settings.api_key = api_key.map(ApiKey::new);
            if let Some(model) = env(model_var).or(section.model) {
                settings.model = model;
            }
            settings.base_url = env(url_var).or(section.base_url);
            if let Some(secs) = timeout {
                settings.timeout = Duration::from_secs(secs);
            }
            if let Some(temperature) = temperature {
                settings.temperature = temperature;
            }
            if let Some(max_tokens) = max_tokens {
                settings.max_output_tokens = max_tokens;
            }
            core = core.with_provider(name, settings);
        }

        let store_dir = env("PATHWISE_STORE_DIR")
            .map(PathBuf::from)
            .or_else(|| file.store.dir.clone())
            .unwrap_or_else(default_store_dir);

        Ok(Self { core, store_dir })
    }
}

/// Non-empty env var value.
fn env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}

// -----------------------------------------------------------------------
// Tests
// -----------------------------------------------------------------------
