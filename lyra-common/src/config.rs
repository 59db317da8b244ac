//! Bootstrap configuration loading and root folder resolution
//!
//! Configuration sources, highest priority first:
//! 1. Command-line argument
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled defaults
//!
//! A missing TOML file is not an error: the service logs a warning and starts
//! with compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "LYRA_ROOT_FOLDER";

/// Environment variable overriding the provider API key
pub const API_KEY_ENV: &str = "LYRA_OPENAI_API_KEY";

/// Bootstrap configuration loaded from TOML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding the database and local media
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// HTTP server port
    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default)]
    pub logging: LoggingConfig,

    #[serde(default)]
    pub providers: ProvidersConfig,

    #[serde(default)]
    pub pipeline: PipelineConfig,

    #[serde(default)]
    pub search: SearchConfig,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub worker: WorkerConfig,
}

impl Default for TomlConfig {
    fn default() -> Self {
        Self {
            root_folder: None,
            port: default_port(),
            logging: LoggingConfig::default(),
            providers: ProvidersConfig::default(),
            pipeline: PipelineConfig::default(),
            search: SearchConfig::default(),
            storage: StorageConfig::default(),
            worker: WorkerConfig::default(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive when RUST_LOG is unset
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

/// AI provider settings (OpenAI-compatible HTTP API)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvidersConfig {
    #[serde(default = "default_provider_base_url")]
    pub base_url: String,

    /// API key; the environment variable takes precedence
    #[serde(default)]
    pub api_key: Option<String>,

    #[serde(default = "default_transcription_model")]
    pub transcription_model: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    /// Use the chat model to estimate per-line timing when a transcript has no segments
    #[serde(default = "default_true")]
    pub estimate_line_timing: bool,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            base_url: default_provider_base_url(),
            api_key: None,
            transcription_model: default_transcription_model(),
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
            estimate_line_timing: true,
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Transcription pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// First backoff delay between transcription attempts
    #[serde(default = "default_retry_base_ms")]
    pub retry_base_ms: u64,

    /// Upper bound for a single backoff delay
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,

    /// Total transcription attempts including the first
    #[serde(default = "default_retry_max_attempts")]
    pub retry_max_attempts: u32,

    /// Assumed track length when neither caller nor provider knows it
    #[serde(default = "default_duration_seconds")]
    pub default_duration_seconds: f64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            retry_base_ms: default_retry_base_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
            retry_max_attempts: default_retry_max_attempts(),
            default_duration_seconds: default_duration_seconds(),
        }
    }
}

/// Hybrid search settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    #[serde(default = "default_branch_timeout_ms")]
    pub branch_timeout_ms: u64,

    /// Vector neighbours fetched before merging
    #[serde(default = "default_vector_top_k")]
    pub vector_top_k: usize,

    /// Score given to songs found only by the lexical branch
    #[serde(default = "default_lexical_score")]
    pub lexical_score: f32,

    #[serde(default = "default_search_limit")]
    pub default_limit: usize,

    #[serde(default = "default_max_search_limit")]
    pub max_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            branch_timeout_ms: default_branch_timeout_ms(),
            vector_top_k: default_vector_top_k(),
            lexical_score: default_lexical_score(),
            default_limit: default_search_limit(),
            max_limit: default_max_search_limit(),
        }
    }
}

/// Object storage and upload saga settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Externally reachable base URL of this service (used in grant and public URLs)
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Secret used to sign write grants; generated per process when unset
    #[serde(default)]
    pub signing_secret: Option<String>,

    #[serde(default = "default_grant_ttl_secs")]
    pub grant_ttl_secs: u64,

    #[serde(default = "default_compensation_concurrency")]
    pub compensation_concurrency: usize,

    #[serde(default = "default_compensation_timeout_ms")]
    pub compensation_timeout_ms: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_base_url: default_public_base_url(),
            signing_secret: None,
            grant_ttl_secs: default_grant_ttl_secs(),
            compensation_concurrency: default_compensation_concurrency(),
            compensation_timeout_ms: default_compensation_timeout_ms(),
        }
    }
}

/// Background event worker settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_max_concurrent_runs")]
    pub max_concurrent_runs: usize,

    #[serde(default = "default_event_capacity")]
    pub event_capacity: usize,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_runs: default_max_concurrent_runs(),
            event_capacity: default_event_capacity(),
        }
    }
}

fn default_port() -> u16 {
    5780
}

fn default_log_level() -> String {
    "lyra_enrich=info,tower_http=info".to_string()
}

fn default_provider_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_transcription_model() -> String {
    "whisper-1".to_string()
}

fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_chat_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_retry_base_ms() -> u64 {
    800
}

fn default_retry_max_delay_ms() -> u64 {
    16_000
}

fn default_retry_max_attempts() -> u32 {
    5
}

fn default_duration_seconds() -> f64 {
    180.0
}

fn default_branch_timeout_ms() -> u64 {
    5_000
}

fn default_vector_top_k() -> usize {
    20
}

fn default_lexical_score() -> f32 {
    0.5
}

fn default_search_limit() -> usize {
    10
}

fn default_max_search_limit() -> usize {
    50
}

fn default_public_base_url() -> String {
    format!("http://127.0.0.1:{}", default_port())
}

fn default_grant_ttl_secs() -> u64 {
    3600
}

fn default_compensation_concurrency() -> usize {
    5
}

fn default_compensation_timeout_ms() -> u64 {
    10_000
}

fn default_max_concurrent_runs() -> usize {
    4
}

fn default_event_capacity() -> usize {
    256
}

/// Default TOML location: `<config dir>/lyra/lyra-enrich.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lyra").join("lyra-enrich.toml"))
}

/// OS-dependent default root folder
pub fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("lyra"))
        .unwrap_or_else(|| PathBuf::from("./lyra_data"))
}

/// Load the bootstrap TOML
///
/// Missing file → compiled defaults with a warning. An unreadable or
/// malformed file is a configuration error.
pub fn load_toml_config(path: Option<&Path>) -> Result<TomlConfig> {
    let path = match path.map(Path::to_path_buf).or_else(default_config_path) {
        Some(path) => path,
        None => {
            warn!("Could not determine config directory, using defaults");
            return Ok(TomlConfig::default());
        }
    };

    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, using defaults");
        return Ok(TomlConfig::default());
    }

    let content = std::fs::read_to_string(&path)
        .map_err(|e| Error::Config(format!("Read {} failed: {}", path.display(), e)))?;
    let config: TomlConfig = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse {} failed: {}", path.display(), e)))?;

    info!(path = %path.display(), "Loaded config file");
    Ok(config)
}

/// Resolve the root folder: CLI → environment → TOML → OS default
pub fn resolve_root_folder(cli_arg: Option<&Path>, toml: &TomlConfig) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// Resolve the provider API key: environment → TOML
///
/// Returns None when no non-blank key is configured.
pub fn resolve_api_key(toml: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(API_KEY_ENV).ok().filter(|k| is_valid_key(k));
    let toml_key = toml.providers.api_key.clone().filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!("Provider API key found in environment and TOML; using environment");
    }

    env_key.or(toml_key)
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
