use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde_json::{Map, Value};

use super::paths::AppPaths;
use super::settings::Settings;
use super::validation::validate_settings;
use crate::core::errors::RagError;

const REDACT_PLACEHOLDER: &str = "****";

const SENSITIVE_PATTERNS: [&str; 8] = [
    "api_key",
    "secret",
    "password",
    "_token",
    "token_",
    "credential",
    "private_key",
    "bearer",
];

const SENSITIVE_WHITELIST: [&str; 2] = ["max_tokens", "tokens"];

#[derive(Debug, Clone, Copy)]
enum EnvKind {
    Text,
    Integer,
    Float,
    List,
}

/// Environment variables that override `config.yml`, with the settings path
/// each one lands on.
const ENV_OVERRIDES: [(&str, &[&str], EnvKind); 24] = [
    ("MEDIASSIST_HOST", &["server", "host"], EnvKind::Text),
    ("PORT", &["server", "port"], EnvKind::Integer),
    ("MEDIASSIST_CORS_ORIGINS", &["server", "cors_allowed_origins"], EnvKind::List),
    ("MEDIASSIST_MIN_PAGE_CHARS", &["documents", "min_page_chars"], EnvKind::Integer),
    ("MEDIASSIST_PARALLEL_FILES", &["documents", "parallel_files"], EnvKind::Integer),
    ("MEDIASSIST_CHUNK_SIZE", &["chunking", "chunk_size"], EnvKind::Integer),
    ("MEDIASSIST_CHUNK_OVERLAP", &["chunking", "chunk_overlap"], EnvKind::Integer),
    ("MEDIASSIST_EMBEDDING_PROVIDER", &["embedding", "provider"], EnvKind::Text),
    ("MEDIASSIST_EMBEDDING_MODEL", &["embedding", "model"], EnvKind::Text),
    ("MEDIASSIST_EMBEDDING_DIMENSION", &["embedding", "dimension"], EnvKind::Integer),
    ("MEDIASSIST_EMBEDDING_BASE_URL", &["embedding", "base_url"], EnvKind::Text),
    ("MEDIASSIST_EMBEDDING_API_KEY", &["embedding", "api_key"], EnvKind::Text),
    ("MEDIASSIST_COLLECTION", &["index", "collection_name"], EnvKind::Text),
    ("MEDIASSIST_DISTANCE", &["index", "distance"], EnvKind::Text),
    ("MEDIASSIST_TOP_K", &["retrieval", "top_k"], EnvKind::Integer),
    ("MEDIASSIST_MIN_SCORE", &["retrieval", "min_score"], EnvKind::Float),
    ("MEDIASSIST_LLM_BACKEND", &["generation", "backend"], EnvKind::Text),
    ("OLLAMA_BASE_URL", &["generation", "ollama_base_url"], EnvKind::Text),
    ("OLLAMA_MODEL", &["generation", "ollama_model"], EnvKind::Text),
    ("OPENAI_BASE_URL", &["generation", "openai_base_url"], EnvKind::Text),
    ("OPENAI_MODEL", &["generation", "openai_model"], EnvKind::Text),
    ("OPENAI_API_KEY", &["generation", "openai_api_key"], EnvKind::Text),
    ("MEDIASSIST_LLM_TEMPERATURE", &["generation", "temperature"], EnvKind::Float),
    ("MEDIASSIST_LLM_TIMEOUT_SECS", &["generation", "timeout_secs"], EnvKind::Integer),
];

#[derive(Clone)]
pub struct ConfigService {
    paths: Arc<AppPaths>,
}

impl ConfigService {
    pub fn new(paths: Arc<AppPaths>) -> Self {
        Self { paths }
    }

    pub fn config_path(&self) -> PathBuf {
        if let Ok(path) = env::var("MEDIASSIST_CONFIG_PATH") {
            return PathBuf::from(path);
        }

        self.paths.data_dir.join("config.yml")
    }

    /// Loads `config.yml`, applies the process environment on top and
    /// validates the result.
    pub fn load_settings(&self) -> Result<Settings, RagError> {
        let file_config = load_yaml_file(&self.config_path());
        let overlay = env_overlay(env::vars());
        settings_from_layers(&file_config, &overlay)
    }

    pub fn redact_sensitive_values(&self, value: &Value) -> Value {
        redact_sensitive_values(value)
    }
}

pub fn settings_from_layers(base: &Value, overlay: &Value) -> Result<Settings, RagError> {
    let merged = deep_merge(base, overlay);
    let settings: Settings = serde_json::from_value(merged)
        .map_err(|e| RagError::Config(format!("Invalid config: {}", e)))?;
    validate_settings(&settings)?;
    Ok(settings)
}

fn load_yaml_file(path: &Path) -> Value {
    if !path.exists() {
        return Value::Object(Map::new());
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_yaml::from_str::<Value>(&contents) {
            Ok(value @ Value::Object(_)) => value,
            Ok(_) => Value::Object(Map::new()),
            Err(err) => {
                tracing::warn!("Ignoring unparsable config file {}: {}", path.display(), err);
                Value::Object(Map::new())
            }
        },
        Err(_) => Value::Object(Map::new()),
    }
}

fn env_overlay<I>(vars: I) -> Value
where
    I: IntoIterator<Item = (String, String)>,
{
    let vars: Vec<(String, String)> = vars.into_iter().collect();
    let mut overlay = Value::Object(Map::new());

    for (name, path, kind) in ENV_OVERRIDES {
        let Some((_, raw)) = vars.iter().find(|(key, _)| key == name) else {
            continue;
        };
        let raw = raw.trim();
        if raw.is_empty() {
            continue;
        }
        let value = match kind {
            EnvKind::Text => Value::String(raw.to_string()),
            EnvKind::Integer => match raw.parse::<u64>() {
                Ok(number) => Value::from(number),
                Err(_) => {
                    tracing::warn!("Ignoring {}={}: expected an integer", name, raw);
                    continue;
                }
            },
            EnvKind::Float => match raw.parse::<f64>() {
                Ok(number) => Value::from(number),
                Err(_) => {
                    tracing::warn!("Ignoring {}={}: expected a number", name, raw);
                    continue;
                }
            },
            EnvKind::List => Value::Array(
                raw.split(',')
                    .map(str::trim)
                    .filter(|item| !item.is_empty())
                    .map(|item| Value::String(item.to_string()))
                    .collect(),
            ),
        };
        ensure_object_path(&mut overlay, path, value);
    }

    overlay
}

fn ensure_object_path(config: &mut Value, path: &[&str], value: Value) {
    if path.is_empty() {
        return;
    }

    let mut current = config;
    for (index, key) in path.iter().enumerate() {
        if index == path.len() - 1 {
            if let Some(map) = current.as_object_mut() {
                map.insert(key.to_string(), value);
            }
            return;
        }

        if !current.get(*key).map(|v| v.is_object()).unwrap_or(false) {
            let Some(map) = current.as_object_mut() else {
                return;
            };
            map.insert((*key).to_string(), Value::Object(Map::new()));
        }

        let Some(next) = current.get_mut(*key) else {
            return;
        };
        current = next;
    }
}

fn deep_merge(base: &Value, override_value: &Value) -> Value {
    match (base, override_value) {
        (Value::Object(base_map), Value::Object(override_map)) => {
            let mut merged: Map<String, Value> = base_map.clone();
            for (key, value) in override_map {
                let merged_value = match merged.get(key) {
                    Some(existing) => deep_merge(existing, value),
                    None => value.clone(),
                };
                merged.insert(key.clone(), merged_value);
            }
            Value::Object(merged)
        }
        _ => override_value.clone(),
    }
}

fn redact_sensitive_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut redacted = Map::new();
            for (key, val) in map {
                if is_sensitive_key(key) && !val.is_null() {
                    redacted.insert(key.clone(), Value::String(REDACT_PLACEHOLDER.to_string()));
                } else {
                    redacted.insert(key.clone(), redact_sensitive_values(val));
                }
            }
            Value::Object(redacted)
        }
        Value::Array(items) => Value::Array(items.iter().map(redact_sensitive_values).collect()),
        _ => value.clone(),
    }
}

fn is_sensitive_key(key: &str) -> bool {
    let key_lower = key.to_lowercase();
    if SENSITIVE_WHITELIST
        .iter()
        .any(|allowed| *allowed == key_lower)
    {
        return false;
    }
    SENSITIVE_PATTERNS
        .iter()
        .any(|pattern| key_lower.contains(pattern))
}
