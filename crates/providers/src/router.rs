//! Backend selection: builds the configured provider.
//!
//! One `reqwest::Client` is created per process and handed to the provider;
//! agent rebuilds reuse the same `Arc<dyn Provider>` and its connection pool.

use std::sync::Arc;
use std::time::Duration;
use slothtop_config::{BackendConfig, BackendKind};
use slothtop_core::error::ProviderError;
use slothtop_core::provider::Provider;
use tracing::info;
use crate::ollama::OllamaProvider;
use crate::openai_compat::OpenAiCompatProvider;

/// Build the shared HTTP client with the backend's request timeout.
pub fn http_client(timeout_secs: u64) -> Result<reqwest::Client, ProviderError> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| ProviderError::NotConfigured(format!("HTTP client: {e}")))
}

/// Build the provider described by `config`.
pub fn build_from_config(config: &BackendConfig) -> Result<Arc<dyn Provider>, ProviderError> {
    let client = http_client(config.timeout_secs)?;

    let provider: Arc<dyn Provider> = match config.kind {
        BackendKind::Ollama => Arc::new(OllamaProvider::new(&config.base_url, client)),
        BackendKind::OpenAi => Arc::new(OpenAiCompatProvider::new(
            "openai",
            &config.base_url,
            config.api_key.clone().unwrap_or_default(),
            client,
        )),
    };

    info!(backend = provider.name(), url = %config.base_url, "Model backend configured");
    Ok(provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_ollama_by_default() {
        let provider = build_from_config(&BackendConfig::default()).unwrap();
        assert_eq!(provider.name(), "ollama");
    }

    #[test]
    fn builds_openai_compat() {
        let config = BackendConfig {
            kind: BackendKind::OpenAi,
            base_url: "https://api.example.com/v1".into(),
            api_key: Some("sk-test".into()),
            ..BackendConfig::default()
        };
        let provider = build_from_config(&config).unwrap();
        assert_eq!(provider.name(), "openai");
    }
}
