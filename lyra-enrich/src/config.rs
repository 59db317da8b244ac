//! Service wiring for lyra-enrich
//!
//! Resolves file locations, secrets and provider clients from the bootstrap
//! [`TomlConfig`]. Priority for the provider API key is ENV → TOML; without a
//! key the service still starts, but every provider call fails permanently
//! (lexical search, uploads and deletes keep working).

use async_trait::async_trait;
use lyra_common::config::{resolve_api_key, TomlConfig};
use lyra_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::models::TimedText;
use crate::services::{
    Embedder, LineTimingEstimator, OpenAiClient, Transcriber, Transcript,
};

const DATABASE_FILE: &str = "lyra.db";
const MEDIA_DIR: &str = "media";

/// sqlite database location under the root folder
pub fn database_path(root_folder: &Path) -> PathBuf {
    root_folder.join(DATABASE_FILE)
}

/// Object storage directory under the root folder
pub fn media_root(root_folder: &Path) -> PathBuf {
    root_folder.join(MEDIA_DIR)
}

/// Grant signing secret: TOML when set, otherwise a per-process random value
///
/// A per-process secret invalidates outstanding grants on restart.
pub fn resolve_signing_secret(toml: &TomlConfig) -> String {
    match toml.storage.signing_secret.as_deref().map(str::trim) {
        Some(secret) if !secret.is_empty() => secret.to_string(),
        _ => {
            info!("No storage.signing_secret configured, generating one for this process");
            format!("{}{}", uuid::Uuid::new_v4().simple(), uuid::Uuid::new_v4().simple())
        }
    }
}

/// Provider collaborators resolved from configuration
#[derive(Clone)]
pub struct ProviderSet {
    pub transcriber: Arc<dyn Transcriber>,
    pub embedder: Arc<dyn Embedder>,
    pub estimator: Option<Arc<dyn LineTimingEstimator>>,
}

/// Build provider clients, degrading to [`UnconfiguredProvider`] without an API key
pub fn build_providers(toml: &TomlConfig) -> Result<ProviderSet> {
    match resolve_api_key(toml) {
        Some(api_key) => {
            let client = Arc::new(OpenAiClient::new(&toml.providers, api_key)?);
            info!(
                base_url = %toml.providers.base_url,
                transcription_model = %toml.providers.transcription_model,
                embedding_model = %toml.providers.embedding_model,
                "AI provider client configured"
            );

            let estimator: Option<Arc<dyn LineTimingEstimator>> =
                if toml.providers.estimate_line_timing {
                    Some(client.clone())
                } else {
                    None
                };

            Ok(ProviderSet {
                transcriber: client.clone(),
                embedder: client,
                estimator,
            })
        }
        None => {
            warn!(
                "No provider API key configured (set {} or providers.api_key); \
                 transcription and embeddings are disabled",
                lyra_common::config::API_KEY_ENV
            );
            let unconfigured = Arc::new(UnconfiguredProvider);
            Ok(ProviderSet {
                transcriber: unconfigured.clone(),
                embedder: unconfigured,
                estimator: None,
            })
        }
    }
}

/// Stand-in used when no API key is available; every call fails permanently
pub struct UnconfiguredProvider;

impl UnconfiguredProvider {
    fn error() -> Error {
        Error::Provider("no provider API key configured".into())
    }
}

#[async_trait]
impl Transcriber for UnconfiguredProvider {
    async fn transcribe(&self, _audio: Vec<u8>) -> Result<Transcript> {
        Err(Self::error())
    }
}

#[async_trait]
impl Embedder for UnconfiguredProvider {
    async fn embed(&self, _text: &str) -> Result<Vec<f32>> {
        Err(Self::error())
    }
}

#[async_trait]
impl LineTimingEstimator for UnconfiguredProvider {
    async fn estimate(&self, _lines: &[String], _duration: f64) -> Result<Vec<TimedText>> {
        Err(Self::error())
    }
}
