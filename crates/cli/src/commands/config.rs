use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use pizzabot_core::config::{AppConfig, LoadOptions};
use secrecy::SecretString;
use toml::Value;

use crate::commands::{load_config, CommandResult};

struct Field {
    key: &'static str,
    value: String,
    env_keys: &'static [&'static str],
}

impl Field {
    fn new(key: &'static str, value: impl ToString, env_keys: &'static [&'static str]) -> Self {
        Self { key, value: value.to_string(), env_keys }
    }
}

pub fn run(options: &LoadOptions) -> CommandResult {
    let config = match load_config("config", options) {
        Ok(config) => config,
        Err(failure) => return failure,
    };

    let config_file_path = detect_config_path(options.config_path.as_deref());
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec![
        "effective config (source precedence: overrides > env > file > default):".to_string(),
    ];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_keys,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(render_line(field.key, &field.value, source));
    }

    CommandResult::text(lines.join("\n"))
}

fn fields(config: &AppConfig) -> Vec<Field> {
    vec![
        Field::new("database.url", &config.database.url, &["PIZZABOT_DATABASE_URL"]),
        Field::new(
            "database.max_connections",
            config.database.max_connections,
            &["PIZZABOT_DATABASE_MAX_CONNECTIONS"],
        ),
        Field::new("llm.provider", config.llm.provider.as_str(), &["PIZZABOT_LLM_PROVIDER"]),
        Field::new("llm.model", &config.llm.model, &["PIZZABOT_LLM_MODEL"]),
        Field::new(
            "llm.embedding_model",
            &config.llm.embedding_model,
            &["PIZZABOT_LLM_EMBEDDING_MODEL"],
        ),
        Field::new(
            "llm.base_url",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
            &["PIZZABOT_LLM_BASE_URL"],
        ),
        Field::new(
            "llm.api_key",
            redact(config.llm.api_key.as_ref()),
            &["PIZZABOT_LLM_API_KEY", "OPENAI_API_KEY"],
        ),
        Field::new("llm.timeout_secs", config.llm.timeout_secs, &["PIZZABOT_LLM_TIMEOUT_SECS"]),
        Field::new("llm.max_retries", config.llm.max_retries, &["PIZZABOT_LLM_MAX_RETRIES"]),
        Field::new(
            "server.bind_address",
            &config.server.bind_address,
            &["PIZZABOT_SERVER_BIND_ADDRESS"],
        ),
        Field::new("server.port", config.server.port, &["PIZZABOT_SERVER_PORT"]),
        Field::new(
            "server.static_dir",
            display(&config.server.static_dir),
            &["PIZZABOT_SERVER_STATIC_DIR"],
        ),
        Field::new("restaurant.name", &config.restaurant.name, &["PIZZABOT_RESTAURANT_NAME"]),
        Field::new("data.menu_path", display(&config.data.menu_path), &["PIZZABOT_DATA_MENU_PATH"]),
        Field::new(
            "data.knowledge_base_path",
            display(&config.data.knowledge_base_path),
            &["PIZZABOT_DATA_KNOWLEDGE_BASE_PATH"],
        ),
        Field::new(
            "data.documents_dir",
            display(&config.data.documents_dir),
            &["PIZZABOT_DATA_DOCUMENTS_DIR"],
        ),
        Field::new(
            "dialogue.intent_strategy",
            config.dialogue.intent_strategy.as_str(),
            &["PIZZABOT_DIALOGUE_INTENT_STRATEGY"],
        ),
        Field::new(
            "dialogue.fuzzy_threshold",
            config.dialogue.fuzzy_threshold,
            &["PIZZABOT_DIALOGUE_FUZZY_THRESHOLD"],
        ),
        Field::new(
            "dialogue.session_ttl_secs",
            config.dialogue.session_ttl_secs,
            &["PIZZABOT_DIALOGUE_SESSION_TTL_SECS"],
        ),
        Field::new(
            "journal.orders_path",
            display(&config.journal.orders_path),
            &["PIZZABOT_JOURNAL_ORDERS_PATH"],
        ),
        Field::new(
            "journal.chat_path",
            display(&config.journal.chat_path),
            &["PIZZABOT_JOURNAL_CHAT_PATH"],
        ),
        Field::new(
            "payments.webhook_secret",
            redact(config.payments.webhook_secret.as_ref()),
            &["PIZZABOT_PAYMENTS_WEBHOOK_SECRET"],
        ),
        Field::new(
            "payments.tolerance_secs",
            config.payments.tolerance_secs,
            &["PIZZABOT_PAYMENTS_TOLERANCE_SECS"],
        ),
        Field::new(
            "whatsapp.verify_token",
            redact(config.whatsapp.verify_token.as_ref()),
            &["PIZZABOT_WHATSAPP_VERIFY_TOKEN"],
        ),
        Field::new(
            "logging.level",
            &config.logging.level,
            &["PIZZABOT_LOGGING_LEVEL", "PIZZABOT_LOG_LEVEL"],
        ),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format).to_lowercase(),
            &["PIZZABOT_LOGGING_FORMAT", "PIZZABOT_LOG_FORMAT"],
        ),
    ]
}

fn display(path: &Path) -> String {
    path.display().to_string()
}

fn detect_config_path(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return path.exists().then(|| path.to_path_buf());
    }
    [PathBuf::from("pizzabot.toml"), PathBuf::from("config/pizzabot.toml")]
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

fn redact(secret: Option<&SecretString>) -> &'static str {
    if secret.is_some() {
        "<redacted>"
    } else {
        "<unset>"
    }
}
