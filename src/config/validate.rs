// src/config/validate.rs

use std::collections::HashSet;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::{AutosignError, Result};

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = AutosignError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw))
    }
}

/// Load-time checks. Step parameters are not checked here;
/// a malformed step fails when it is dispatched.
pub fn validate_config(cfg: &RawConfigFile) -> Result<()> {
    validate_raw_config(cfg)
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    validate_settings(cfg)?;
    validate_lifecycle(cfg)?;
    validate_tasks(cfg)?;
    Ok(())
}

fn validate_settings(cfg: &RawConfigFile) -> Result<()> {
    let s = &cfg.settings;

    if s.poll_interval_ms == 0 {
        return Err(AutosignError::ConfigError(
            "[settings].poll_interval_ms must be >= 1 (got 0)".to_string(),
        ));
    }

    if !(0.0..=1.0).contains(&s.recognition_threshold) {
        return Err(AutosignError::ConfigError(format!(
            "[settings].recognition_threshold must be within 0.0..=1.0 (got {})",
            s.recognition_threshold
        )));
    }

    Ok(())
}

fn validate_lifecycle(cfg: &RawConfigFile) -> Result<()> {
    let l = &cfg.lifecycle;

    if l.enabled && l.return_retries == 0 {
        return Err(AutosignError::ConfigError(
            "[lifecycle].return_retries must be >= 1 when lifecycle is enabled".to_string(),
        ));
    }

    if l.enabled && l.host_package.trim().is_empty() {
        return Err(AutosignError::ConfigError(
            "[lifecycle].host_package must not be empty when lifecycle is enabled".to_string(),
        ));
    }

    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    let mut seen = HashSet::new();

    for task in cfg.task.iter() {
        if !seen.insert(task.id) {
            return Err(AutosignError::ConfigError(format!(
                "duplicate task id {} ('{}')",
                task.id, task.name
            )));
        }
        if task.name.trim().is_empty() {
            return Err(AutosignError::ConfigError(format!(
                "task {} has an empty name",
                task.id
            )));
        }
        if task.package.trim().is_empty() {
            return Err(AutosignError::ConfigError(format!(
                "task {} ('{}') has an empty package",
                task.id, task.name
            )));
        }
    }

    Ok(())
}
