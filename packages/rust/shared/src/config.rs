//! Application configuration for wgdigest.
//!
//! User config lives at `~/.wgdigest/wgdigest.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{Result, WgDigestError};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "wgdigest.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".wgdigest";

/// Placeholder substituted with the collection number in `source.listing_url`.
pub const COLLECTION_PLACEHOLDER: &str = "{collection}";

/// Placeholder substituted with the item identifier in `source.transcript_url`.
pub const ITEM_PLACEHOLDER: &str = "{item_id}";

// ---------------------------------------------------------------------------
// Config structs (matching wgdigest.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Where the cache and the published site live.
    #[serde(default)]
    pub paths: PathsConfig,

    /// Cache/manifest backend selection.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Session listing and transcript endpoints.
    #[serde(default)]
    pub source: SourceConfig,

    /// Generative model settings.
    #[serde(default)]
    pub generator: GeneratorConfig,
}

/// `[paths]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Root of the artifact cache (and manifests).
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,

    /// Root of the published Markdown document set.
    #[serde(default = "default_site_dir")]
    pub site_dir: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            cache_dir: default_cache_dir(),
            site_dir: default_site_dir(),
        }
    }
}

fn default_cache_dir() -> String {
    "var/cache".into()
}
fn default_site_dir() -> String {
    "var/site".into()
}

/// Which storage engine backs the artifact cache and manifests.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    /// One file per artifact, one `manifest.json` per collection.
    #[default]
    Fs,
    /// Embedded libSQL database under the cache directory.
    Libsql,
}

/// `[storage]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: StorageBackend,
}

/// `[source]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConfig {
    /// Page listing the recorded sessions of one collection.
    #[serde(default = "default_listing_url")]
    pub listing_url: String,

    /// Transcript location for one item.
    #[serde(default = "default_transcript_url")]
    pub transcript_url: String,

    /// HTTP timeout for listing and transcript requests.
    #[serde(default = "default_source_timeout")]
    pub timeout_secs: u64,

    /// User-Agent sent with listing and transcript requests.
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            listing_url: default_listing_url(),
            transcript_url: default_transcript_url(),
            timeout_secs: default_source_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

fn default_listing_url() -> String {
    "https://datatracker.ietf.org/meeting/{collection}/proceedings".into()
}
fn default_transcript_url() -> String {
    "https://meetecho-player.ietf.org/playout/transcripts/{item_id}.txt".into()
}
fn default_source_timeout() -> u64 {
    30
}
fn default_user_agent() -> String {
    concat!("wgdigest/", env!("CARGO_PKG_VERSION")).into()
}

impl SourceConfig {
    /// Listing URL for one collection.
    pub fn listing_url_for(&self, collection: crate::CollectionId) -> String {
        self.listing_url
            .replace(COLLECTION_PLACEHOLDER, &collection.to_string())
    }

    /// Transcript URL for one item.
    pub fn transcript_url_for(&self, item_id: &crate::ItemId) -> String {
        self.transcript_url.replace(ITEM_PLACEHOLDER, item_id.as_str())
    }
}

/// Generative backend, chosen per call through [`GeneratorConfig`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelBackend {
    #[default]
    OpenRouter,
    OpenAi,
    Ollama,
}

impl ModelBackend {
    /// API base used when `generator.api_base` is not set.
    pub fn default_api_base(&self) -> &'static str {
        match self {
            Self::OpenRouter => "https://openrouter.ai/api/v1",
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenRouter => "openrouter",
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
        }
    }
}

/// `[generator]` section. Passed explicitly on every generation call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratorConfig {
    #[serde(default)]
    pub backend: ModelBackend,

    /// Model identifier understood by the backend.
    #[serde(default = "default_model")]
    pub model: String,

    /// Override for the backend's API base URL.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_base: Option<String>,

    /// Name of the env var holding the API key (never store the key itself).
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,

    /// Transcripts longer than this are truncated before generation.
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,

    #[serde(default = "default_generator_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            backend: ModelBackend::default(),
            model: default_model(),
            api_base: None,
            api_key_env: default_api_key_env(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            max_input_chars: default_max_input_chars(),
            timeout_secs: default_generator_timeout(),
        }
    }
}

fn default_model() -> String {
    "moonshotai/kimi-k2.5".into()
}
fn default_api_key_env() -> String {
    "OPENROUTER_API_KEY".into()
}
fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    4096
}
fn default_max_input_chars() -> usize {
    120_000
}
fn default_generator_timeout() -> u64 {
    300
}

impl GeneratorConfig {
    /// Effective API base (configured override or the backend default).
    pub fn api_base(&self) -> &str {
        self.api_base
            .as_deref()
            .unwrap_or_else(|| self.backend.default_api_base())
            .trim_end_matches('/')
    }

    /// Read the API key from the configured env var.
    ///
    /// Ollama needs no key and always yields `Ok(None)`.
    pub fn api_key(&self) -> Result<Option<String>> {
        if self.backend == ModelBackend::Ollama {
            return Ok(None);
        }
        let var_name = &self.api_key_env;
        match std::env::var(var_name) {
            Ok(val) if !val.is_empty() => Ok(Some(val)),
            _ => Err(WgDigestError::config(format!(
                "API key for the {} backend not found. Set the {var_name} environment variable.",
                self.backend.as_str()
            ))),
        }
    }
}

impl AppConfig {
    /// Check values that would only fail later, mid-run.
    pub fn validate(&self) -> Result<()> {
        check_template(
            &self.source.listing_url,
            COLLECTION_PLACEHOLDER,
            "source.listing_url",
        )?;
        check_template(
            &self.source.transcript_url,
            ITEM_PLACEHOLDER,
            "source.transcript_url",
        )?;

        if let Some(base) = &self.generator.api_base {
            Url::parse(base).map_err(|e| {
                WgDigestError::config(format!("generator.api_base '{base}' is not a URL: {e}"))
            })?;
        }
        if !(0.0..=2.0).contains(&self.generator.temperature) {
            return Err(WgDigestError::config(format!(
                "generator.temperature must be within 0.0..=2.0, got {}",
                self.generator.temperature
            )));
        }
        if self.generator.max_input_chars == 0 {
            return Err(WgDigestError::config(
                "generator.max_input_chars must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Resolved cache root.
    pub fn cache_dir(&self) -> PathBuf {
        expand_home(&self.paths.cache_dir)
    }

    /// Resolved site root.
    pub fn site_dir(&self) -> PathBuf {
        expand_home(&self.paths.site_dir)
    }
}

/// A URL template must contain its placeholder and be a URL once filled in.
fn check_template(template: &str, placeholder: &str, field: &str) -> Result<()> {
    if !template.contains(placeholder) {
        return Err(WgDigestError::config(format!(
            "{field} must contain the {placeholder} placeholder"
        )));
    }
    Url::parse(&template.replace(placeholder, "0"))
        .map_err(|e| WgDigestError::config(format!("{field} is not a valid URL: {e}")))?;
    Ok(())
}

/// Expand a leading `~/` to the user's home directory.
pub fn expand_home(path: &str) -> PathBuf {
    match (path.strip_prefix("~/"), dirs::home_dir()) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.wgdigest/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| WgDigestError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.wgdigest/wgdigest.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| WgDigestError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        WgDigestError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    config.validate()?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    init_config_at(&config_file_path()?)
}

/// Write a default config file at `path`, creating parent directories.
pub fn init_config_at(path: &Path) -> Result<PathBuf> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| WgDigestError::io(dir, e))?;
    }

    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| WgDigestError::config(e.to_string()))?;

    std::fs::write(path, content).map_err(|e| WgDigestError::io(path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path.to_path_buf())
}

/// Check that the generator's API key env var is set and non-empty.
pub fn validate_api_key(config: &GeneratorConfig) -> Result<()> {
    config.api_key().map(|_| ())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CollectionId, ItemId};

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("cache_dir"));
        assert!(toml_str.contains("OPENROUTER_API_KEY"));
        assert!(toml_str.contains("backend = \"fs\""));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.generator.backend, ModelBackend::OpenRouter);
        assert_eq!(parsed.storage.backend, StorageBackend::Fs);
        assert!(parsed.validate().is_ok());
    }

    #[test]
    fn partial_config_fills_defaults() {
        let toml_str = r#"
[storage]
backend = "libsql"

[generator]
backend = "ollama"
model = "llama3.1"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.storage.backend, StorageBackend::Libsql);
        assert_eq!(config.generator.backend, ModelBackend::Ollama);
        assert_eq!(config.generator.api_base(), "http://localhost:11434");
        assert_eq!(config.paths.site_dir, "var/site");
        assert_eq!(config.source.timeout_secs, 30);
    }

    #[test]
    fn url_templates_are_filled() {
        let source = SourceConfig {
            listing_url: "https://example.com/meeting/{collection}/sessions".into(),
            transcript_url: "https://example.com/t/{item_id}.txt".into(),
            ..SourceConfig::default()
        };
        assert_eq!(
            source.listing_url_for(CollectionId(121)),
            "https://example.com/meeting/121/sessions"
        );
        assert_eq!(
            source.transcript_url_for(&ItemId::new("IETF121-QUIC-20241105-1300")),
            "https://example.com/t/IETF121-QUIC-20241105-1300.txt"
        );
    }

    #[test]
    fn validate_rejects_template_without_placeholder() {
        let mut config = AppConfig::default();
        config.source.transcript_url = "https://example.com/transcript.txt".into();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("{item_id}"));
    }

    #[test]
    fn validate_rejects_out_of_range_temperature() {
        let mut config = AppConfig::default();
        config.generator.temperature = 3.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn api_base_override_trims_trailing_slash() {
        let config = GeneratorConfig {
            api_base: Some("http://127.0.0.1:9999/v1/".into()),
            ..GeneratorConfig::default()
        };
        assert_eq!(config.api_base(), "http://127.0.0.1:9999/v1");
    }

    #[test]
    fn api_key_validation() {
        // Use a unique env var name to avoid interfering with other tests
        let config = GeneratorConfig {
            api_key_env: "WGD_TEST_NONEXISTENT_KEY_12345".into(),
            ..GeneratorConfig::default()
        };
        let result = validate_api_key(&config);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("API key"));

        let ollama = GeneratorConfig {
            backend: ModelBackend::Ollama,
            ..config
        };
        assert!(validate_api_key(&ollama).is_ok());
    }

    #[test]
    fn expand_home_leaves_relative_paths() {
        assert_eq!(expand_home("var/cache"), PathBuf::from("var/cache"));
        if let Some(home) = dirs::home_dir() {
            assert_eq!(expand_home("~/wg"), home.join("wg"));
        }
    }
}
