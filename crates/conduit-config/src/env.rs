//! Environment variable fallbacks.
//!
//! Env vars are **fallback**, not override: they only apply to fields that
//! no config file set. The embedded defaults do not count as "set".

use std::collections::{HashMap, HashSet};

use tracing::debug;

use crate::error::{ConfigError, ConfigResult};

#[derive(Clone, Copy)]
enum EnvKind {
    Str,
    Int,
}

/// Mapping from environment variable name to config field path.
struct EnvMapping {
    var_name: &'static str,
    field_path: &'static str,
    kind: EnvKind,
}

const ENV_MAPPINGS: &[EnvMapping] = &[
    EnvMapping {
        var_name: "CONDUIT_SOCKET_PATH",
        field_path: "server.socket_path",
        kind: EnvKind::Str,
    },
    EnvMapping {
        var_name: "CONDUIT_LOG_LEVEL",
        field_path: "logging.level",
        kind: EnvKind::Str,
    },
    EnvMapping {
        var_name: "CONDUIT_LOG_FORMAT",
        field_path: "logging.format",
        kind: EnvKind::Str,
    },
    EnvMapping {
        var_name: "CONDUIT_HANDSHAKE_SECS",
        field_path: "timeouts.handshake_secs",
        kind: EnvKind::Int,
    },
    EnvMapping {
        var_name: "CONDUIT_SKILL_CALL_SECS",
        field_path: "timeouts.skill_call_secs",
        kind: EnvKind::Int,
    },
    EnvMapping {
        var_name: "CONDUIT_CHAT_REQUEST_SECS",
        field_path: "timeouts.chat_request_secs",
        kind: EnvKind::Int,
    },
    EnvMapping {
        var_name: "CONDUIT_LLM_PROVIDER",
        field_path: "llm.default_provider",
        kind: EnvKind::Str,
    },
];

/// API key variables, tried in order, for providers with no `api_key`.
const API_KEY_VARS: &[&str] = &["CONDUIT_LLM_API_KEY", "OPENAI_API_KEY"];

/// Collect the dotted paths of every leaf in `val` into `out`.
pub(crate) fn collect_leaf_paths(val: &toml::Value, prefix: &str, out: &mut HashSet<String>) {
    if let toml::Value::Table(table) = val {
        for (key, child) in table {
            let path = if prefix.is_empty() {
                key.clone()
            } else {
                format!("{prefix}.{key}")
            };
            collect_leaf_paths(child, &path, out);
        }
    } else {
        out.insert(prefix.to_owned());
    }
}

/// Apply env fallbacks for fields not in `file_set`.
///
/// Returns the number of env vars applied.
///
/// # Errors
///
/// Returns [`ConfigError::EnvError`] when an integer field gets a value that
/// does not parse.
pub(crate) fn apply_env_fallbacks<S: std::hash::BuildHasher>(
    merged: &mut toml::Value,
    file_set: &HashSet<String>,
    env_vars: &HashMap<String, String, S>,
) -> ConfigResult<usize> {
    let mut count: usize = 0;

    for mapping in ENV_MAPPINGS {
        if file_set.contains(mapping.field_path) {
            continue;
        }
        let Some(raw) = env_vars.get(mapping.var_name) else {
            continue;
        };

        let value = match mapping.kind {
            EnvKind::Str => toml::Value::String(raw.clone()),
            EnvKind::Int => raw
                .trim()
                .parse::<i64>()
                .map(toml::Value::Integer)
                .map_err(|e| ConfigError::EnvError {
                    var_name: mapping.var_name.to_string(),
                    message: format!("expected an integer: {e}"),
                })?,
        };

        debug!(
            var = mapping.var_name,
            field = mapping.field_path,
            "applying env var fallback"
        );
        set_field(merged, mapping.field_path, value);
        count = count.saturating_add(1);
    }

    if let Some(key) = API_KEY_VARS.iter().find_map(|var| env_vars.get(*var)) {
        count = count.saturating_add(apply_api_key(merged, key));
    }

    Ok(count)
}

/// Fill `api_key` on every provider table that lacks one.
fn apply_api_key(merged: &mut toml::Value, key: &str) -> usize {
    let Some(providers) = merged
        .get_mut("llm")
        .and_then(|llm| llm.get_mut("providers"))
        .and_then(toml::Value::as_array_mut)
    else {
        return 0;
    };

    let mut applied: usize = 0;
    for provider in providers.iter_mut().filter_map(toml::Value::as_table_mut) {
        if !provider.contains_key("api_key") {
            provider.insert("api_key".into(), toml::Value::String(key.to_string()));
            applied = applied.saturating_add(1);
        }
    }
    applied
}

/// Set a dotted path, creating intermediate tables as needed.
fn set_field(root: &mut toml::Value, path: &str, value: toml::Value) {
    let mut current = root;
    let mut segments = path.split('.').peekable();

    while let Some(segment) = segments.next() {
        let Some(table) = current.as_table_mut() else {
            return;
        };
        if segments.peek().is_none() {
            table.insert(segment.to_owned(), value);
            return;
        }
        current = table
            .entry(segment.to_owned())
            .or_insert_with(|| toml::Value::Table(toml::map::Map::new()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_env_applies_to_unset_fields() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"info\"\n").unwrap();
        let count = apply_env_fallbacks(
            &mut merged,
            &HashSet::new(),
            &env(&[("CONDUIT_LOG_LEVEL", "debug"), ("CONDUIT_SKILL_CALL_SECS", "5")]),
        )
        .unwrap();

        assert_eq!(count, 2);
        assert_eq!(merged["logging"]["level"].as_str(), Some("debug"));
        assert_eq!(merged["timeouts"]["skill_call_secs"].as_integer(), Some(5));
    }

    #[test]
    fn test_env_does_not_override_file_values() {
        let mut merged: toml::Value = toml::from_str("[logging]\nlevel = \"warn\"\n").unwrap();
        let mut file_set = HashSet::new();
        collect_leaf_paths(&merged.clone(), "", &mut file_set);

        let count = apply_env_fallbacks(
            &mut merged,
            &file_set,
            &env(&[("CONDUIT_LOG_LEVEL", "debug")]),
        )
        .unwrap();
        assert_eq!(count, 0);
        assert_eq!(merged["logging"]["level"].as_str(), Some("warn"));
    }

    #[test]
    fn test_bad_integer_is_an_error() {
        let mut merged = toml::Value::Table(toml::map::Map::new());
        let err = apply_env_fallbacks(
            &mut merged,
            &HashSet::new(),
            &env(&[("CONDUIT_HANDSHAKE_SECS", "soon")]),
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::EnvError { .. }));
    }

    #[test]
    fn test_api_key_fills_missing_provider_keys() {
        let mut merged: toml::Value = toml::from_str(
            r#"
            [[llm.providers]]
            name = "openai"
            [[llm.providers]]
            name = "local"
            api_key = "explicit"
            "#,
        )
        .unwrap();
        let count = apply_env_fallbacks(
            &mut merged,
            &HashSet::new(),
            &env(&[("OPENAI_API_KEY", "sk-env")]),
        )
        .unwrap();
        assert_eq!(count, 1);
        assert_eq!(merged["llm"]["providers"][0]["api_key"].as_str(), Some("sk-env"));
        assert_eq!(merged["llm"]["providers"][1]["api_key"].as_str(), Some("explicit"));
    }
}
