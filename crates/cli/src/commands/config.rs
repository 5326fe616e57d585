use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use huddle_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

use crate::commands::CommandResult;

/// One reported setting: dotted key, rendered value and the env vars that can
/// set it, first match wins.
struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return CommandResult::text(2, format!("config validation failed: {error}")),
    };

    CommandResult::text(0, render(&config, detect_config_path().as_deref()))
}

pub fn render(config: &AppConfig, config_file_path: Option<&Path>) -> String {
    let config_file_doc = load_config_file_doc(config_file_path);

    let mut lines =
        vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(config) {
        let source = field_source(&field, config_file_doc.as_ref(), config_file_path);
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }
    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field {
            key: "database.url",
            value: config.database.url.clone(),
            env_keys: &["HUDDLE_DATABASE_URL"],
        },
        Field {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_keys: &["HUDDLE_DATABASE_MAX_CONNECTIONS"],
        },
        Field {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_keys: &["HUDDLE_DATABASE_TIMEOUT_SECS"],
        },
        Field {
            key: "llm.provider",
            value: config.llm.provider.as_str().to_string(),
            env_keys: &["HUDDLE_LLM_PROVIDER"],
        },
        Field {
            key: "llm.model",
            value: config.llm.model.clone(),
            env_keys: &["HUDDLE_LLM_MODEL"],
        },
        Field {
            key: "llm.base_url",
            value: config.llm.base_url.clone().unwrap_or_else(|| "<provider default>".to_string()),
            env_keys: &["HUDDLE_LLM_BASE_URL"],
        },
        Field {
            key: "llm.api_key",
            value: redact_key(config.llm.api_key.as_ref().map(|key| key.expose_secret())),
            env_keys: &["HUDDLE_LLM_API_KEY", "GEMINI_API_KEY"],
        },
        Field {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["HUDDLE_SERVER_BIND_ADDRESS"],
        },
        Field {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["HUDDLE_SERVER_PORT"],
        },
        Field {
            key: "analysis.window_size",
            value: config.analysis.window_size.to_string(),
            env_keys: &["HUDDLE_ANALYSIS_WINDOW_SIZE"],
        },
        Field {
            key: "analysis.messages_limit",
            value: config.analysis.messages_limit.to_string(),
            env_keys: &["HUDDLE_ANALYSIS_MESSAGES_LIMIT"],
        },
        Field {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["HUDDLE_LOGGING_LEVEL", "HUDDLE_LOG_LEVEL"],
        },
        Field {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_lowercase(),
            env_keys: &["HUDDLE_LOGGING_FORMAT", "HUDDLE_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("huddle.toml"), PathBuf::from("config/huddle.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    field: &Field,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) =
        field.env_keys.iter().find(|key| env::var(key).is_ok_and(|value| !value.trim().is_empty()))
    {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, field.key) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps the last four characters of long keys so operators can tell keys apart.
fn redact_key(key: Option<&str>) -> String {
    let Some(key) = key.map(str::trim) else {
        return "<unset>".to_string();
    };
    if key.is_empty() {
        return "<empty>".to_string();
    }

    let chars: Vec<char> = key.chars().collect();
    if chars.len() < 12 {
        return "<redacted>".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}
