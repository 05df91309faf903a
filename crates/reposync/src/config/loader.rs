use std::path::Path;

use crate::config::schema::EngineConfig;
use crate::error::ConfigError;

pub fn load_config<P: AsRef<Path>>(path: P) -> Result<EngineConfig, ConfigError> {
    let path = path.as_ref();
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
        path: path.to_path_buf(),
        source: e,
    })?;

    load_config_from_str(&content)
}

pub fn load_config_from_str(content: &str) -> Result<EngineConfig, ConfigError> {
    let config: EngineConfig = serde_json::from_str(content)?;

    validate_config(&config)?;

    Ok(config)
}

fn validate_config(config: &EngineConfig) -> Result<(), ConfigError> {
    if config.classifier.max_file_size == 0 {
        return Err(ConfigError::Validation {
            message: "classifier.max_file_size must be greater than 0".to_string(),
        });
    }

    if config.recovery.stale_job_max_age_minutes <= 0 {
        return Err(ConfigError::Validation {
            message: format!(
                "recovery.stale_job_max_age_minutes must be positive, got {}",
                config.recovery.stale_job_max_age_minutes
            ),
        });
    }

    if config.recovery.reconcile_interval_secs == 0 {
        return Err(ConfigError::Validation {
            message: "recovery.reconcile_interval_secs must be greater than 0".to_string(),
        });
    }

    if config.worker.idle_poll_millis == 0 {
        return Err(ConfigError::Validation {
            message: "worker.idle_poll_millis must be greater than 0".to_string(),
        });
    }

    if config.default_job.max_files == Some(0) {
        return Err(ConfigError::Validation {
            message: "default_job.maxFiles must be omitted or greater than 0".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_empty_object_uses_defaults() {
        let config = load_config_from_str("{}").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.classifier.max_file_size, 1024 * 1024);
        assert_eq!(config.recovery.stale_job_max_age_minutes, 60);
        assert_eq!(config.recovery.reconcile_interval_secs, 300);
        assert_eq!(config.worker.idle_poll_millis, 500);
        assert!(config.database_path.is_none());
    }

    #[test]
    fn test_load_full_config() {
        let json = r#"{
            "database_path": "/var/lib/reposync/ledger.db",
            "classifier": { "max_file_size": 2048 },
            "recovery": { "stale_job_max_age_minutes": 30 },
            "default_job": { "maxFiles": 500, "skipContent": true }
        }"#;
        let config = load_config_from_str(json).unwrap();
        assert_eq!(config.classifier.max_file_size, 2048);
        assert_eq!(config.recovery.stale_job_max_age_minutes, 30);
        assert_eq!(config.recovery.reconcile_interval_secs, 300);
        assert_eq!(config.default_job.max_files, Some(500));
        assert!(config.default_job.skip_content);
    }

    #[test]
    fn test_invalid_json() {
        let result = load_config_from_str("{ not json");
        assert!(matches!(result, Err(ConfigError::ParseJson(_))));
    }

    #[test]
    fn test_validation_rejects_zero_values() {
        let result = load_config_from_str(r#"{ "classifier": { "max_file_size": 0 } }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));

        let result = load_config_from_str(r#"{ "recovery": { "stale_job_max_age_minutes": -5 } }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));

        let result = load_config_from_str(r#"{ "default_job": { "maxFiles": 0 } }"#);
        assert!(matches!(result, Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "worker": {{ "idle_poll_millis": 50 }} }}"#).unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.worker.idle_poll_millis, 50);
    }

    #[test]
    fn test_missing_file() {
        let result = load_config("/nonexistent/reposync.json");
        assert!(matches!(result, Err(ConfigError::ReadFile { .. })));
    }
}
