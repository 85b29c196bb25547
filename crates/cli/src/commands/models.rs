//! `slothtop models`: list models installed on the backend.

use slothtop_config::RuntimeConfig;
use slothtop_core::provider::model_matches;

pub async fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = RuntimeConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let current = slothtop_config::SettingsStore::open(config.settings_path())
        .load()
        .map(|s| s.model)
        .ok();
    let provider = slothtop_providers::build_from_config(&config.backend)?;

    if !provider.health_check().await.unwrap_or(false) {
        return Err(format!("Backend '{}' at {} is not reachable", provider.name(), config.backend.base_url).into());
    }
    let models = provider.list_models().await?;

    println!("Models on {} ({})", provider.name(), config.backend.base_url);
    println!();
    if models.is_empty() {
        println!("  The backend does not list its models.");
        return Ok(());
    }
    for m in &models {
        let active = current
            .as_deref()
            .is_some_and(|c| model_matches(std::slice::from_ref(m), c));
        println!("  {} {m}", if active { "*" } else { " " });
    }
    Ok(())
}
