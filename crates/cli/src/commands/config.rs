use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crmdesk_core::config::{AppConfig, LoadOptions};
use secrecy::{ExposeSecret, SecretString};
use toml::Value;

/// One rendered setting: dotted key, display value, env vars that can set it.
struct Setting {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for setting in settings(&config) {
        let source = field_source(
            setting.key,
            setting.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(setting.key, &setting.value, source));
    }

    lines.join("\n")
}

fn settings(config: &AppConfig) -> Vec<Setting> {
    vec![
        Setting {
            key: "database.url",
            value: config.database.url.clone(),
            env_keys: &["CRMDESK_DATABASE_URL"],
        },
        Setting {
            key: "database.max_connections",
            value: config.database.max_connections.to_string(),
            env_keys: &["CRMDESK_DATABASE_MAX_CONNECTIONS"],
        },
        Setting {
            key: "database.timeout_secs",
            value: config.database.timeout_secs.to_string(),
            env_keys: &["CRMDESK_DATABASE_TIMEOUT_SECS"],
        },
        Setting {
            key: "llm.api_key",
            value: redact_key(config.llm.api_key.as_ref()),
            env_keys: &["CRMDESK_LLM_API_KEY", "ANTHROPIC_API_KEY"],
        },
        Setting {
            key: "llm.base_url",
            value: config.llm.base_url.clone(),
            env_keys: &["CRMDESK_LLM_BASE_URL"],
        },
        Setting {
            key: "llm.model",
            value: config.llm.model.clone(),
            env_keys: &["CRMDESK_LLM_MODEL"],
        },
        Setting {
            key: "llm.max_tokens",
            value: config.llm.max_tokens.to_string(),
            env_keys: &["CRMDESK_LLM_MAX_TOKENS"],
        },
        Setting {
            key: "llm.timeout_secs",
            value: config.llm.timeout_secs.to_string(),
            env_keys: &["CRMDESK_LLM_TIMEOUT_SECS"],
        },
        Setting {
            key: "server.bind_address",
            value: config.server.bind_address.clone(),
            env_keys: &["CRMDESK_SERVER_BIND_ADDRESS"],
        },
        Setting {
            key: "server.port",
            value: config.server.port.to_string(),
            env_keys: &["CRMDESK_SERVER_PORT"],
        },
        Setting {
            key: "server.graceful_shutdown_secs",
            value: config.server.graceful_shutdown_secs.to_string(),
            env_keys: &["CRMDESK_SERVER_GRACEFUL_SHUTDOWN_SECS"],
        },
        Setting {
            key: "agent.max_rounds",
            value: config.agent.max_rounds.to_string(),
            env_keys: &["CRMDESK_AGENT_MAX_ROUNDS"],
        },
        Setting {
            key: "agent.event_buffer",
            value: config.agent.event_buffer.to_string(),
            env_keys: &["CRMDESK_AGENT_EVENT_BUFFER"],
        },
        Setting {
            key: "logging.level",
            value: config.logging.level.clone(),
            env_keys: &["CRMDESK_LOGGING_LEVEL", "CRMDESK_LOG_LEVEL"],
        },
        Setting {
            key: "logging.format",
            value: format!("{:?}", config.logging.format).to_ascii_lowercase(),
            env_keys: &["CRMDESK_LOGGING_FORMAT", "CRMDESK_LOG_FORMAT"],
        },
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("crmdesk.toml"), PathBuf::from("config/crmdesk.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_keys: &[&str],
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_keys.iter().find(|key| env::var_os(key).is_some()) {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
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

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact_key(key: Option<&SecretString>) -> String {
    let Some(key) = key else {
        return "<unset>".to_string();
    };
    let trimmed = key.expose_secret().trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    if let Some((prefix, _)) = trimmed.split_once('-') {
        return format!("{prefix}-***");
    }

    "<redacted>".to_string()
}
