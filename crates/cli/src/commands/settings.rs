//! `slothtop settings`: inspect and edit the agent settings file.

use slothtop_config::{RuntimeConfig, SettingField, SettingsStore};

fn store() -> Result<SettingsStore, Box<dyn std::error::Error>> {
    let config = RuntimeConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    Ok(SettingsStore::init(config.settings_path())?)
}

pub fn show() -> Result<(), Box<dyn std::error::Error>> {
    let store = store()?;
    let settings = store.load()?;

    println!("Slothtop Settings");
    println!("=================");
    println!();
    println!("  File: {}", store.path().display());
    println!();
    for field in SettingField::ALL {
        println!("  {:<18} {}", field.as_str(), settings.get(field));
    }
    Ok(())
}

pub fn get(field: &str) -> Result<(), Box<dyn std::error::Error>> {
    let field: SettingField = field.parse()?;
    let settings = store()?.load()?;
    match settings.get(field) {
        serde_json::Value::String(s) => println!("{s}"),
        other => println!("{other}"),
    }
    Ok(())
}

pub fn set(field: &str, value: &str) -> Result<(), Box<dyn std::error::Error>> {
    let settings = store()?.set_from_str(field, value)?;
    let field: SettingField = field.parse()?;
    println!("  {} = {}", field.as_str(), settings.get(field));
    Ok(())
}

pub fn path() -> Result<(), Box<dyn std::error::Error>> {
    let config = RuntimeConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    println!("{}", config.settings_path().display());
    Ok(())
}

pub fn init() -> Result<(), Box<dyn std::error::Error>> {
    let config = RuntimeConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let path = config.settings_path();
    let existed = path.exists();
    SettingsStore::init(&path)?;
    if existed {
        println!("  Settings already exist at {}", path.display());
    } else {
        println!("  Wrote default settings to {}", path.display());
    }
    Ok(())
}
