//! Layered configuration loader.
//!
//! Reads from the configuration directory:
//! - `config.json` - Main configuration
//! - `secrets.json` - Credentials (bot token), same layout as `config.json`
//!
//! Files are deep-merged as JSON before deserialization, so `secrets.json`
//! only needs to carry the keys it overrides.

use serde_json::Value;
use std::fs;
use std::path::Path;

use crate::error::{Error, Result, ResultExt};

/// Configuration file names, lowest priority first.
pub const CONFIG_FILES: &[&str] = &["config.json", "secrets.json"];

/// Load a JSON file and return its contents as a Value.
/// Returns None if file doesn't exist.
fn load_json_file(path: &Path) -> Result<Option<Value>> {
    if !path.exists() {
        return Ok(None);
    }

    let content =
        fs::read_to_string(path).context(format!("Failed to read {}", path.display()))?;

    let value: Value =
        serde_json::from_str(&content).context(format!("Failed to parse {}", path.display()))?;

    if !value.is_object() {
        return Err(Error::Config(format!(
            "{} must contain a JSON object",
            path.display()
        )));
    }

    Ok(Some(value))
}

/// Deep merge two JSON values.
/// Source values override target values, with object merging at each level.
pub fn merge_json(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, source_value) in source_map {
                match target_map.get_mut(&key) {
                    Some(target_value) => {
                        merge_json(target_value, source_value);
                    }
                    None => {
                        target_map.insert(key, source_value);
                    }
                }
            }
        }
        (target, source) => {
            *target = source;
        }
    }
}

/// Load and merge every configuration file in `dir`.
///
/// Missing files are skipped; an empty object is returned when none exist.
pub fn load_modular_config(dir: &Path) -> Result<Value> {
    let mut config = Value::Object(Default::default());

    tracing::debug!("Loading config from {}", dir.display());

    for name in CONFIG_FILES {
        if let Some(layer) = load_json_file(&dir.join(name))? {
            merge_json(&mut config, layer);
            tracing::debug!("Loaded {name}");
        }
    }

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_json_nested() {
        let mut target = json!({
            "channels": { "telegram": { "enabled": true, "allowed_users": ["*"] } }
        });
        merge_json(
            &mut target,
            json!({ "channels": { "telegram": { "bot_token": "secret" } } }),
        );
        assert_eq!(target["channels"]["telegram"]["enabled"], true);
        assert_eq!(target["channels"]["telegram"]["bot_token"], "secret");
        assert_eq!(target["channels"]["telegram"]["allowed_users"][0], "*");
    }

    #[test]
    fn test_merge_json_scalar_override() {
        let mut target = json!({ "extraction": { "max_file_bytes": 10 } });
        merge_json(&mut target, json!({ "extraction": { "max_file_bytes": 20 } }));
        assert_eq!(target["extraction"]["max_file_bytes"], 20);
    }

    #[test]
    fn test_load_empty_dir() {
        let dir = tempfile::tempdir().unwrap();
        let value = load_modular_config(dir.path()).unwrap();
        assert_eq!(value, json!({}));
    }

    #[test]
    fn test_load_config_and_secrets() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join("config.json"),
            r#"{"channels": {"telegram": {"allowed_users": ["alice"]}}}"#,
        )
        .unwrap();
        fs::write(
            dir.path().join("secrets.json"),
            r#"{"channels": {"telegram": {"bot_token": "123:abc"}}}"#,
        )
        .unwrap();

        let value = load_modular_config(dir.path()).unwrap();
        assert_eq!(value["channels"]["telegram"]["allowed_users"][0], "alice");
        assert_eq!(value["channels"]["telegram"]["bot_token"], "123:abc");
    }

    #[test]
    fn test_invalid_json_reports_file() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), "{ not json").unwrap();

        let err = load_modular_config(dir.path()).unwrap_err();
        assert!(err.to_string().contains("config.json"));
    }

    #[test]
    fn test_non_object_rejected() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("config.json"), "[1, 2]").unwrap();

        let err = load_modular_config(dir.path()).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }
}
