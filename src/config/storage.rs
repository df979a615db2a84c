use crate::config::schema::AppConfig;
use crate::error::{FlowError, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Get the configuration file path based on platform
pub fn get_config_path() -> PathBuf {
    let config_dir = if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|p| p.join("com.flowrunner.app"))
            .unwrap_or_else(|| PathBuf::from("."))
    } else {
        dirs::config_dir()
            .map(|p| p.join("flowrunner"))
            .unwrap_or_else(|| PathBuf::from("."))
    };

    config_dir.join("config.toml")
}

/// Load configuration from the default location, creating it if missing
pub fn load_config() -> Result<AppConfig> {
    load_config_from(&get_config_path())
}

/// Load configuration from `path`, writing defaults there when the file does not exist
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    if !path.exists() {
        tracing::info!("Config file not found at {:?}, creating default", path);
        let config = AppConfig::default();
        save_config_to(&config, path)?;
        return Ok(config);
    }

    let content = fs::read_to_string(path).map_err(|e| {
        FlowError::Config(format!("Failed to read config from {:?}: {}", path, e))
    })?;

    let config: AppConfig = toml::from_str(&content)?;
    crate::config::validate_config(&config)?;

    tracing::info!("Loaded config from {:?}", path);
    Ok(config)
}

/// Save configuration to the default location
pub fn save_config(config: &AppConfig) -> Result<()> {
    save_config_to(config, &get_config_path())
}

pub fn save_config_to(config: &AppConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| {
            FlowError::Config(format!(
                "Failed to create config directory {:?}: {}",
                parent, e
            ))
        })?;
    }

    let content = toml::to_string_pretty(config)?;

    fs::write(path, content).map_err(|e| {
        FlowError::Config(format!("Failed to write config to {:?}: {}", path, e))
    })?;

    tracing::info!("Saved config to {:?}", path);
    Ok(())
}
