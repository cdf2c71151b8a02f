use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use assistant_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());
    let source = |key_path: &str, env_keys: &[&str]| {
        field_source(key_path, env_keys, config_file_doc.as_ref(), config_file_path.as_deref())
    };

    let knowledge_base = &config.knowledge_base;
    let endpoint_key = redact_key(knowledge_base.endpoint_key.expose_secret());
    let rows: [(&str, String, &[&str]); 10] = [
        ("knowledge_base.id", knowledge_base.id.clone(), &["ASSISTANT_KB_ID"]),
        ("knowledge_base.host", knowledge_base.host.clone(), &["ASSISTANT_KB_HOST"]),
        ("knowledge_base.endpoint_key", endpoint_key, &["ASSISTANT_KB_ENDPOINT_KEY"]),
        ("knowledge_base.top", knowledge_base.top.to_string(), &["ASSISTANT_KB_TOP"]),
        (
            "knowledge_base.score_threshold",
            knowledge_base.score_threshold.to_string(),
            &["ASSISTANT_KB_SCORE_THRESHOLD"],
        ),
        (
            "knowledge_base.timeout_secs",
            knowledge_base.timeout_secs.to_string(),
            &["ASSISTANT_KB_TIMEOUT_SECS"],
        ),
        (
            "telemetry.log_personal_information",
            config.telemetry.log_personal_information.to_string(),
            &["ASSISTANT_TELEMETRY_LOG_PERSONAL_INFORMATION"],
        ),
        (
            "telemetry.emission_timeout_ms",
            config.telemetry.emission_timeout_ms.to_string(),
            &["ASSISTANT_TELEMETRY_EMISSION_TIMEOUT_MS"],
        ),
        (
            "logging.level",
            config.logging.level.clone(),
            &["ASSISTANT_LOGGING_LEVEL", "ASSISTANT_LOG_LEVEL"],
        ),
        (
            "logging.format",
            format!("{:?}", config.logging.format),
            &["ASSISTANT_LOGGING_FORMAT", "ASSISTANT_LOG_FORMAT"],
        ),
    ];

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    lines.extend(
        rows.iter().map(|(key, value, env_keys)| render_line(key, value, source(*key, *env_keys))),
    );
    lines.join("\n")
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("assistant.toml"), PathBuf::from("config/assistant.toml")]
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

/// Keeps the last four characters so operators can tell keys apart.
fn redact_key(key: &str) -> String {
    let trimmed = key.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }

    let chars: Vec<char> = trimmed.chars().collect();
    if chars.len() <= 8 {
        return "<redacted>".to_string();
    }

    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("***{tail}")
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_key};

    #[test]
    fn short_keys_are_fully_redacted() {
        assert_eq!(redact_key(""), "<empty>");
        assert_eq!(redact_key("abc123"), "<redacted>");
    }

    #[test]
    fn long_keys_keep_only_a_suffix() {
        assert_eq!(redact_key("0f3c2b1a-9d8e-4c7b-a6f5-e4d3c2b1a0ff"), "***a0ff");
    }

    #[test]
    fn nested_paths_are_found_in_config_documents() {
        let doc: Value = "[knowledge_base]\nid = \"kb1\"\n".parse().expect("toml");
        assert!(contains_path(&doc, "knowledge_base.id"));
        assert!(!contains_path(&doc, "knowledge_base.host"));
        assert!(!contains_path(&doc, "logging.level"));
    }
}
