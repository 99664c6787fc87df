use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::config::schema::{Settings, WorkerFlavor};
use crate::error::ConfigError;

pub const ENV_TYPST: &str = "TYP2DOCX_TYPST";
pub const ENV_PANDOC: &str = "TYP2DOCX_PANDOC";
pub const ENV_MERGE_SCRIPT: &str = "TYP2DOCX_MERGE_SCRIPT";
pub const ENV_CALLBACK_TIMEOUT: &str = "TYP2DOCX_CALLBACK_TIMEOUT_SECS";
pub const ENV_EXPORT_TIMEOUT: &str = "TYP2DOCX_EXPORT_TIMEOUT_SECS";
pub const ENV_EXTRACT_WORKER: &str = "TYP2DOCX_EXTRACT_WORKER";

/// Loads settings from the process environment.
pub fn load_settings() -> Result<Settings, ConfigError> {
    load_settings_with(|name| std::env::var(name).ok())
}

/// Loads settings through `lookup`, applying overrides on top of the defaults.
/// Empty values are treated as unset.
pub fn load_settings_with<F>(lookup: F) -> Result<Settings, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
    let mut settings = Settings::default();

    if let Some(typst) = get(ENV_TYPST) {
        settings.typst = PathBuf::from(typst);
    }
    if let Some(pandoc) = get(ENV_PANDOC) {
        settings.pandoc = PathBuf::from(pandoc);
    }
    if let Some(script) = get(ENV_MERGE_SCRIPT) {
        settings.merge_script = Some(PathBuf::from(script));
    }
    if let Some(value) = get(ENV_CALLBACK_TIMEOUT) {
        settings.callback_timeout = parse_secs(ENV_CALLBACK_TIMEOUT, &value)?;
    }
    if let Some(value) = get(ENV_EXPORT_TIMEOUT) {
        settings.export_timeout = parse_secs(ENV_EXPORT_TIMEOUT, &value)?;
    }
    if let Some(value) = get(ENV_EXTRACT_WORKER) {
        settings.extract_worker = WorkerFlavor::from_str(&value)?;
    }

    Ok(settings)
}

fn parse_secs(name: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .trim()
        .parse::<u64>()
        .ok()
        .filter(|secs| *secs > 0)
        .map(Duration::from_secs)
        .ok_or_else(|| ConfigError::InvalidEnv {
            name: name.to_string(),
            value: value.to_string(),
            expected: "positive number of seconds".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_defaults_without_overrides() {
        let settings = load_settings_with(lookup(&[])).unwrap();
        assert_eq!(settings.typst, PathBuf::from("typst"));
        assert_eq!(settings.pandoc, PathBuf::from("pandoc"));
        assert_eq!(settings.callback_timeout, Duration::from_secs(120));
        assert_eq!(settings.extract_worker, WorkerFlavor::Thread);
    }

    #[test]
    fn test_overrides_applied() {
        let settings = load_settings_with(lookup(&[
            (ENV_TYPST, "/usr/local/bin/typst"),
            (ENV_CALLBACK_TIMEOUT, "30"),
            (ENV_EXTRACT_WORKER, "process"),
        ]))
        .unwrap();
        assert_eq!(settings.typst, PathBuf::from("/usr/local/bin/typst"));
        assert_eq!(settings.callback_timeout, Duration::from_secs(30));
        assert_eq!(settings.extract_worker, WorkerFlavor::Process);
    }

    #[test]
    fn test_empty_value_ignored() {
        let settings = load_settings_with(lookup(&[(ENV_PANDOC, "  ")])).unwrap();
        assert_eq!(settings.pandoc, PathBuf::from("pandoc"));
    }

    #[test]
    fn test_invalid_timeout_rejected() {
        let result = load_settings_with(lookup(&[(ENV_EXPORT_TIMEOUT, "soon")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));

        let result = load_settings_with(lookup(&[(ENV_EXPORT_TIMEOUT, "0")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
    }

    #[test]
    fn test_invalid_worker_flavor_rejected() {
        let result = load_settings_with(lookup(&[(ENV_EXTRACT_WORKER, "fiber")]));
        assert!(matches!(result, Err(ConfigError::InvalidEnv { .. })));
    }
}
