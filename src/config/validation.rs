use crate::config::schema::AppConfig;
use crate::error::{FlowError, Result};
use std::path::Path;

/// Validate Chrome executable path
pub fn validate_chrome_path(path: &Path) -> Result<()> {
    if !path.exists() {
        return Err(FlowError::Validation(format!(
            "Chrome executable not found at {:?}",
            path
        )));
    }

    if !path.is_file() {
        return Err(FlowError::Validation(format!(
            "Chrome path {:?} is not a file",
            path
        )));
    }

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = path.metadata().map_err(|e| {
            FlowError::Validation(format!("Cannot read Chrome file metadata: {}", e))
        })?;
        if metadata.permissions().mode() & 0o111 == 0 {
            return Err(FlowError::Validation(format!(
                "Chrome executable {:?} is not executable",
                path
            )));
        }
    }

    Ok(())
}

/// Validate configuration values that would otherwise stall or break a run
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let run = &config.run;
    if run.default_timeout_secs == 0 {
        return Err(FlowError::Validation(
            "run.default_timeout_secs must be greater than 0".to_string(),
        ));
    }
    if run.picker_timeout_secs == 0 {
        return Err(FlowError::Validation(
            "run.picker_timeout_secs must be greater than 0".to_string(),
        ));
    }
    if run.poll_interval_ms == 0 {
        return Err(FlowError::Validation(
            "run.poll_interval_ms must be greater than 0".to_string(),
        ));
    }

    if config.api.enabled && config.api.port == 0 {
        return Err(FlowError::Validation(
            "api.port must be set when the API is enabled".to_string(),
        ));
    }

    if let (Some(w), Some(h)) = (config.browser.viewport_width, config.browser.viewport_height) {
        if w == 0 || h == 0 {
            return Err(FlowError::Validation(format!(
                "Invalid viewport size {}x{}",
                w, h
            )));
        }
    }

    if let Some(key) = &config.api.api_key {
        if key.trim().is_empty() {
            return Err(FlowError::Validation(
                "api.api_key cannot be blank; remove it to disable auth".to_string(),
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_default_config_is_valid() {
        assert!(validate_config(&AppConfig::default()).is_ok());
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let mut config = AppConfig::default();
        config.run.default_timeout_secs = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_zero_viewport_rejected() {
        let mut config = AppConfig::default();
        config.browser.viewport_width = Some(0);
        config.browser.viewport_height = Some(600);
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_blank_api_key_rejected() {
        let mut config = AppConfig::default();
        config.api.api_key = Some("  ".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_missing_chrome_path() {
        let path = PathBuf::from("/definitely/not/here/chrome");
        assert!(validate_chrome_path(&path).is_err());
    }
}
