//! Config file discovery and layered loading.
//!
//! Implements the `load()` algorithm:
//! 1. Parse `defaults.toml` → base
//! 2. Merge `~/.conduit/config.toml` (user)
//! 3. Merge the explicit `--config` file, if any
//! 4. Apply `CONDUIT_*` env var fallbacks for fields no file set
//! 5. Deserialize merged tree → `Config`
//! 6. Resolve the default socket path
//! 7. Validate

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::env::{apply_env_fallbacks, collect_leaf_paths};
use crate::error::{ConfigError, ConfigResult};
use crate::types::{Config, DEFAULT_SOCKET_NAME};
use crate::validate;

/// Embedded default configuration.
const DEFAULTS_TOML: &str = include_str!("defaults.toml");

/// Directory under the user's home holding Conduit state.
const CONDUIT_DIR: &str = ".conduit";

/// Maximum allowed config file size (1 MB).
const MAX_CONFIG_FILE_SIZE: u64 = 1_048_576;

/// Load the host configuration from the process environment.
///
/// `explicit` is a file passed on the command line; unlike the user file it
/// must exist. `conduit_home` replaces `~/.conduit` for discovery and for
/// the default socket path.
///
/// # Errors
///
/// Returns a [`ConfigError`] if any config file is unreadable or malformed,
/// an env var is invalid, or the merged configuration fails validation.
pub fn load(explicit: Option<&Path>, conduit_home: Option<&Path>) -> ConfigResult<Config> {
    let env_vars: HashMap<String, String> = std::env::vars().collect();
    load_with_env(explicit, conduit_home, &env_vars)
}

/// [`load`] with an explicit environment, for tests and embedding.
///
/// # Errors
///
/// See [`load`].
pub fn load_with_env<S: std::hash::BuildHasher>(
    explicit: Option<&Path>,
    conduit_home: Option<&Path>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<Config> {
    let home = match conduit_home {
        Some(h) => h.to_path_buf(),
        None => home_directory()?.join(CONDUIT_DIR),
    };

    // 1. Embedded defaults.
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let mut file_set = HashSet::new();

    // 2. User config.
    let user_path = home.join("config.toml");
    if let Some(overlay) = try_load_file(&user_path)? {
        collect_leaf_paths(&overlay, "", &mut file_set);
        deep_merge(&mut merged, &overlay);
        info!(path = %user_path.display(), "loaded user config");
    }

    // 3. Explicit config.
    if let Some(path) = explicit {
        let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
            path: path.display().to_string(),
            source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
        })?;
        collect_leaf_paths(&overlay, "", &mut file_set);
        deep_merge(&mut merged, &overlay);
        info!(path = %path.display(), "loaded config");
    }

    // 4. Env fallbacks.
    let env_count = apply_env_fallbacks(&mut merged, &file_set, env_vars)?;
    if env_count > 0 {
        debug!(count = env_count, "applied environment variable fallbacks");
    }

    // 5. Deserialize.
    let mut config: Config =
        merged
            .try_into()
            .map_err(|e: toml::de::Error| ConfigError::ParseError {
                path: "<merged config>".to_owned(),
                source: e,
            })?;

    // 6. Default socket location.
    if config.server.socket_path.is_none() {
        config.server.socket_path = Some(home.join(DEFAULT_SOCKET_NAME));
    }

    // 7. Validate.
    validate::validate(&config)?;
    Ok(config)
}

/// Load a config from a specific file path on top of the defaults, with no
/// user layer and no env fallbacks.
///
/// # Errors
///
/// Returns a [`ConfigError`] if the file cannot be read, parsed or validated.
pub fn load_file(path: &Path) -> ConfigResult<Config> {
    let mut merged: toml::Value =
        toml::from_str(DEFAULTS_TOML).map_err(|e| ConfigError::ParseError {
            path: "<embedded defaults>".to_owned(),
            source: e,
        })?;
    let overlay = try_load_file(path)?.ok_or_else(|| ConfigError::ReadError {
        path: path.display().to_string(),
        source: std::io::Error::new(std::io::ErrorKind::NotFound, "file not found"),
    })?;
    deep_merge(&mut merged, &overlay);

    let config: Config = merged
        .try_into()
        .map_err(|e: toml::de::Error| ConfigError::ParseError {
            path: path.display().to_string(),
            source: e,
        })?;
    validate::validate(&config)?;
    Ok(config)
}

/// Recursively deep-merge `overlay` into `base`.
///
/// - Tables merge recursively per-field.
/// - Scalars and arrays from the overlay **replace** the base value.
fn deep_merge(base: &mut toml::Value, overlay: &toml::Value) {
    match (base, overlay) {
        (toml::Value::Table(base_table), toml::Value::Table(overlay_table)) => {
            for (key, overlay_val) in overlay_table {
                if let Some(base_val) = base_table.get_mut(key) {
                    deep_merge(base_val, overlay_val);
                } else {
                    base_table.insert(key.clone(), overlay_val.clone());
                }
            }
        },
        (base, overlay) => {
            *base = overlay.clone();
        },
    }
}

/// Try to load a file, returning `None` if the file doesn't exist.
fn try_load_file(path: &Path) -> ConfigResult<Option<toml::Value>> {
    let content = match std::fs::read_to_string(path) {
        Ok(c) => c,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "config file not found, skipping");
            return Ok(None);
        },
        Err(e) => {
            return Err(ConfigError::ReadError {
                path: path.display().to_string(),
                source: e,
            });
        },
    };

    if content.len() as u64 > MAX_CONFIG_FILE_SIZE {
        return Err(ConfigError::ValidationError {
            field: path.display().to_string(),
            message: format!(
                "config file is {} bytes, exceeding the {} byte limit",
                content.len(),
                MAX_CONFIG_FILE_SIZE
            ),
        });
    }

    let value: toml::Value = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
        path: path.display().to_string(),
        source: e,
    })?;

    Ok(Some(value))
}

/// Determine the user's home directory.
fn home_directory() -> ConfigResult<PathBuf> {
    directories::BaseDirs::new()
        .map(|d| d.home_dir().to_path_buf())
        .ok_or(ConfigError::NoHomeDir)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn no_env() -> HashMap<String, String> {
        HashMap::new()
    }

    #[test]
    fn test_defaults_deserialize_to_config() {
        let config: Config = toml::from_str(DEFAULTS_TOML).unwrap();
        assert_eq!(config.server.max_frame_bytes, 10 * 1024 * 1024);
        assert_eq!(config.timeouts.skill_call_secs, 30);
        assert_eq!(config.timeouts.chat_request_secs, 120);
        assert_eq!(config.llm.max_tool_rounds, 8);
        assert!(config.llm.system_prompt.is_some());
        assert_eq!(config.logging.format, "pretty");
    }

    #[test]
    fn test_load_without_files() {
        let home = tempfile::tempdir().unwrap();
        let config = load_with_env(None, Some(home.path()), &no_env()).unwrap();
        assert_eq!(
            config.server.socket_path(),
            home.path().join(DEFAULT_SOCKET_NAME)
        );
        assert_eq!(config.logging.level, "info");
    }

    #[test]
    fn test_layers_and_env_precedence() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(
            home.path().join("config.toml"),
            "[logging]\nlevel = \"warn\"\n\n[timeouts]\nskill_call_secs = 5\n",
        )
        .unwrap();

        let explicit = home.path().join("override.toml");
        std::fs::write(&explicit, "[timeouts]\nskill_call_secs = 7\n").unwrap();

        let env: HashMap<String, String> = [
            ("CONDUIT_LOG_LEVEL", "trace"),
            ("CONDUIT_CHAT_REQUEST_SECS", "60"),
        ]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();

        let config = load_with_env(Some(&explicit), Some(home.path()), &env).unwrap();
        // File beats env; explicit beats user; env fills what files left unset.
        assert_eq!(config.logging.level, "warn");
        assert_eq!(config.timeouts.skill_call_secs, 7);
        assert_eq!(config.timeouts.chat_request_secs, 60);
        assert_eq!(config.timeouts.handshake_secs, 10);
    }

    #[test]
    fn test_missing_explicit_file_is_an_error() {
        let home = tempfile::tempdir().unwrap();
        let missing = home.path().join("nope.toml");
        let err = load_with_env(Some(&missing), Some(home.path()), &no_env()).unwrap_err();
        assert!(matches!(err, ConfigError::ReadError { .. }));
    }

    #[test]
    fn test_malformed_file() {
        let home = tempfile::tempdir().unwrap();
        std::fs::write(home.path().join("config.toml"), "[server\n").unwrap();
        let err = load_with_env(None, Some(home.path()), &no_env()).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError { .. }));
    }

    #[test]
    fn test_load_file_validates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "[timeouts]\nskill_call_secs = 0\n").unwrap();
        assert!(matches!(
            load_file(&path),
            Err(ConfigError::ValidationError { .. })
        ));
    }

    #[test]
    fn test_providers_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("llm.toml");
        std::fs::write(
            &path,
            r#"
            [llm]
            default_provider = "local"

            [[llm.providers]]
            name = "local"
            base_url = "http://localhost:1234/v1"
            model = "qwen2.5"
            "#,
        )
        .unwrap();

        let config = load_file(&path).unwrap();
        let provider = config.llm.provider("local").unwrap();
        assert_eq!(provider.model, "qwen2.5");
        assert_eq!(provider.max_tokens, 4096);
        assert!(provider.api_key.is_none());
    }
}
