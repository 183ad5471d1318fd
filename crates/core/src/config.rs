use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub restaurant: RestaurantConfig,
    pub data: DataConfig,
    pub dialogue: DialogueConfig,
    pub journal: JournalConfig,
    pub payments: PaymentsConfig,
    pub whatsapp: WhatsAppConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub embedding_model: String,
    pub timeout_secs: u64,
    pub max_retries: u32,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub static_dir: PathBuf,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestaurantConfig {
    pub name: String,
    pub address: String,
    pub hours: String,
    pub phone: String,
}

#[derive(Clone, Debug)]
pub struct DataConfig {
    pub menu_path: PathBuf,
    pub knowledge_base_path: PathBuf,
    pub documents_dir: PathBuf,
}

#[derive(Clone, Debug)]
pub struct DialogueConfig {
    pub intent_strategy: IntentStrategy,
    pub fuzzy_threshold: f64,
    pub intent_history_turns: usize,
    pub fallback_history_turns: usize,
    pub retrieval_history_turns: usize,
    pub retrieval_top_k: usize,
    pub session_ttl_secs: u64,
}

#[derive(Clone, Debug)]
pub struct JournalConfig {
    pub orders_path: PathBuf,
    pub chat_path: PathBuf,
}

#[derive(Clone, Debug)]
pub struct PaymentsConfig {
    pub webhook_secret: Option<SecretString>,
    pub tolerance_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WhatsAppConfig {
    pub verify_token: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    #[serde(rename = "openai")]
    OpenAi,
    Ollama,
    Disabled,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentStrategy {
    Rules,
    Model,
    Hybrid,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub intent_strategy: Option<IntentStrategy>,
    pub menu_path: Option<PathBuf>,
    pub knowledge_base_path: Option<PathBuf>,
    pub server_port: Option<u16>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for RestaurantConfig {
    fn default() -> Self {
        Self {
            name: "Pizzeria Da Mario".to_string(),
            address: "Via Roma 123, Milano".to_string(),
            hours: "11:00 - 23:00".to_string(),
            phone: "+39 02 1234567".to_string(),
        }
    }
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            intent_strategy: IntentStrategy::Rules,
            fuzzy_threshold: 0.55,
            intent_history_turns: 6,
            fallback_history_turns: 6,
            retrieval_history_turns: 10,
            retrieval_top_k: 3,
            session_ttl_secs: 60 * 60 * 24,
        }
    }
}

impl DialogueConfig {
    /// Idle time after which a stored session reads as new. Capped at
    /// roughly ten years.
    pub fn session_ttl(&self) -> chrono::Duration {
        const MAX_TTL_SECS: i64 = 10 * 365 * 24 * 60 * 60;
        let secs = i64::try_from(self.session_ttl_secs).unwrap_or(MAX_TTL_SECS);
        chrono::Duration::seconds(secs.min(MAX_TTL_SECS))
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://pizzabot.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            llm: LlmConfig {
                provider: LlmProvider::Disabled,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                embedding_model: "text-embedding-3-small".to_string(),
                timeout_secs: 20,
                max_retries: 2,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 5000,
                static_dir: PathBuf::from("static"),
            },
            restaurant: RestaurantConfig::default(),
            data: DataConfig {
                menu_path: PathBuf::from("data/menu.json"),
                knowledge_base_path: PathBuf::from("data/italian_kb.json"),
                documents_dir: PathBuf::from("data/kb_docs"),
            },
            dialogue: DialogueConfig::default(),
            journal: JournalConfig {
                orders_path: PathBuf::from("logs/orders.jsonl"),
                chat_path: PathBuf::from("logs/chat.jsonl"),
            },
            payments: PaymentsConfig { webhook_secret: None, tolerance_secs: 300 },
            whatsapp: WhatsAppConfig { verify_token: None },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl LlmProvider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Ollama => "ollama",
            Self::Disabled => "disabled",
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "openai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            "disabled" | "none" => Ok(Self::Disabled),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected openai|ollama|disabled)"
            ))),
        }
    }
}

impl IntentStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Rules => "rules",
            Self::Model => "model",
            Self::Hybrid => "hybrid",
        }
    }
}

impl std::str::FromStr for IntentStrategy {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules" => Ok(Self::Rules),
            "model" => Ok(Self::Model),
            "hybrid" => Ok(Self::Hybrid),
            other => Err(ConfigError::Validation(format!(
                "unsupported intent strategy `{other}` (expected rules|model|hybrid)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("pizzabot.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(llm_api_key_value) = llm.api_key {
                self.llm.api_key = Some(secret_value(llm_api_key_value));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(embedding_model) = llm.embedding_model {
                self.llm.embedding_model = embedding_model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
            if let Some(max_retries) = llm.max_retries {
                self.llm.max_retries = max_retries;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(static_dir) = server.static_dir {
                self.server.static_dir = static_dir;
            }
        }

        if let Some(restaurant) = patch.restaurant {
            if let Some(name) = restaurant.name {
                self.restaurant.name = name;
            }
            if let Some(address) = restaurant.address {
                self.restaurant.address = address;
            }
            if let Some(hours) = restaurant.hours {
                self.restaurant.hours = hours;
            }
            if let Some(phone) = restaurant.phone {
                self.restaurant.phone = phone;
            }
        }

        if let Some(data) = patch.data {
            if let Some(menu_path) = data.menu_path {
                self.data.menu_path = menu_path;
            }
            if let Some(knowledge_base_path) = data.knowledge_base_path {
                self.data.knowledge_base_path = knowledge_base_path;
            }
            if let Some(documents_dir) = data.documents_dir {
                self.data.documents_dir = documents_dir;
            }
        }

        if let Some(dialogue) = patch.dialogue {
            if let Some(intent_strategy) = dialogue.intent_strategy {
                self.dialogue.intent_strategy = intent_strategy;
            }
            if let Some(fuzzy_threshold) = dialogue.fuzzy_threshold {
                self.dialogue.fuzzy_threshold = fuzzy_threshold;
            }
            if let Some(turns) = dialogue.intent_history_turns {
                self.dialogue.intent_history_turns = turns;
            }
            if let Some(turns) = dialogue.fallback_history_turns {
                self.dialogue.fallback_history_turns = turns;
            }
            if let Some(turns) = dialogue.retrieval_history_turns {
                self.dialogue.retrieval_history_turns = turns;
            }
            if let Some(top_k) = dialogue.retrieval_top_k {
                self.dialogue.retrieval_top_k = top_k;
            }
            if let Some(session_ttl_secs) = dialogue.session_ttl_secs {
                self.dialogue.session_ttl_secs = session_ttl_secs;
            }
        }

        if let Some(journal) = patch.journal {
            if let Some(orders_path) = journal.orders_path {
                self.journal.orders_path = orders_path;
            }
            if let Some(chat_path) = journal.chat_path {
                self.journal.chat_path = chat_path;
            }
        }

        if let Some(payments) = patch.payments {
            if let Some(webhook_secret_value) = payments.webhook_secret {
                self.payments.webhook_secret = Some(secret_value(webhook_secret_value));
            }
            if let Some(tolerance_secs) = payments.tolerance_secs {
                self.payments.tolerance_secs = tolerance_secs;
            }
        }

        if let Some(whatsapp) = patch.whatsapp {
            if let Some(verify_token_value) = whatsapp.verify_token {
                self.whatsapp.verify_token = Some(secret_value(verify_token_value));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("PIZZABOT_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("PIZZABOT_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_u32("PIZZABOT_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("PIZZABOT_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("PIZZABOT_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("PIZZABOT_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        // OPENAI_API_KEY is the variable most deployments already export.
        let api_key = read_env("PIZZABOT_LLM_API_KEY").or_else(|| read_env("OPENAI_API_KEY"));
        if let Some(value) = api_key {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("PIZZABOT_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("PIZZABOT_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("PIZZABOT_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = value;
        }
        if let Some(value) = read_env("PIZZABOT_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("PIZZABOT_LLM_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("PIZZABOT_LLM_MAX_RETRIES") {
            self.llm.max_retries = parse_u32("PIZZABOT_LLM_MAX_RETRIES", &value)?;
        }

        if let Some(value) = read_env("PIZZABOT_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("PIZZABOT_SERVER_PORT") {
            self.server.port = parse_u16("PIZZABOT_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("PIZZABOT_SERVER_STATIC_DIR") {
            self.server.static_dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("PIZZABOT_RESTAURANT_NAME") {
            self.restaurant.name = value;
        }

        if let Some(value) = read_env("PIZZABOT_DATA_MENU_PATH") {
            self.data.menu_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("PIZZABOT_DATA_KNOWLEDGE_BASE_PATH") {
            self.data.knowledge_base_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("PIZZABOT_DATA_DOCUMENTS_DIR") {
            self.data.documents_dir = PathBuf::from(value);
        }

        if let Some(value) = read_env("PIZZABOT_DIALOGUE_INTENT_STRATEGY") {
            self.dialogue.intent_strategy = value.parse()?;
        }
        if let Some(value) = read_env("PIZZABOT_DIALOGUE_FUZZY_THRESHOLD") {
            self.dialogue.fuzzy_threshold = parse_f64("PIZZABOT_DIALOGUE_FUZZY_THRESHOLD", &value)?;
        }
        if let Some(value) = read_env("PIZZABOT_DIALOGUE_SESSION_TTL_SECS") {
            self.dialogue.session_ttl_secs =
                parse_u64("PIZZABOT_DIALOGUE_SESSION_TTL_SECS", &value)?;
        }

        if let Some(value) = read_env("PIZZABOT_JOURNAL_ORDERS_PATH") {
            self.journal.orders_path = PathBuf::from(value);
        }
        if let Some(value) = read_env("PIZZABOT_JOURNAL_CHAT_PATH") {
            self.journal.chat_path = PathBuf::from(value);
        }

        let webhook_secret = read_env("PIZZABOT_PAYMENTS_WEBHOOK_SECRET")
            .or_else(|| read_env("STRIPE_WEBHOOK_SECRET"));
        if let Some(value) = webhook_secret {
            self.payments.webhook_secret = Some(secret_value(value));
        }
        if let Some(value) = read_env("PIZZABOT_PAYMENTS_TOLERANCE_SECS") {
            self.payments.tolerance_secs = parse_u64("PIZZABOT_PAYMENTS_TOLERANCE_SECS", &value)?;
        }

        if let Some(value) = read_env("PIZZABOT_WHATSAPP_VERIFY_TOKEN") {
            self.whatsapp.verify_token = Some(secret_value(value));
        }

        let log_level =
            read_env("PIZZABOT_LOGGING_LEVEL").or_else(|| read_env("PIZZABOT_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("PIZZABOT_LOGGING_FORMAT").or_else(|| read_env("PIZZABOT_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(intent_strategy) = overrides.intent_strategy {
            self.dialogue.intent_strategy = intent_strategy;
        }
        if let Some(menu_path) = overrides.menu_path {
            self.data.menu_path = menu_path;
        }
        if let Some(knowledge_base_path) = overrides.knowledge_base_path {
            self.data.knowledge_base_path = knowledge_base_path;
        }
        if let Some(server_port) = overrides.server_port {
            self.server.port = server_port;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_restaurant(&self.restaurant)?;
        validate_dialogue(&self.dialogue, &self.llm)?;
        validate_payments(&self.payments)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("pizzabot.toml"), PathBuf::from("config/pizzabot.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    if llm.max_retries > 10 {
        return Err(ConfigError::Validation("llm.max_retries must be at most 10".to_string()));
    }

    match llm.provider {
        LlmProvider::OpenAi => {
            let missing = llm
                .api_key
                .as_ref()
                .map(|value| value.expose_secret().trim().is_empty())
                .unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider (or export OPENAI_API_KEY)"
                        .to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
        LlmProvider::Disabled => return Ok(()),
    }

    if llm.model.trim().is_empty() {
        return Err(ConfigError::Validation("llm.model must not be empty".to_string()));
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.bind_address.trim().is_empty() {
        return Err(ConfigError::Validation("server.bind_address must not be empty".to_string()));
    }

    Ok(())
}

fn validate_restaurant(restaurant: &RestaurantConfig) -> Result<(), ConfigError> {
    if restaurant.name.trim().is_empty() {
        return Err(ConfigError::Validation("restaurant.name must not be empty".to_string()));
    }
    Ok(())
}

fn validate_dialogue(dialogue: &DialogueConfig, llm: &LlmConfig) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&dialogue.fuzzy_threshold) {
        return Err(ConfigError::Validation(
            "dialogue.fuzzy_threshold must be in range 0.0..=1.0".to_string(),
        ));
    }

    if dialogue.retrieval_top_k == 0 {
        return Err(ConfigError::Validation(
            "dialogue.retrieval_top_k must be greater than zero".to_string(),
        ));
    }

    if dialogue.session_ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "dialogue.session_ttl_secs must be greater than zero".to_string(),
        ));
    }

    if dialogue.intent_strategy != IntentStrategy::Rules && llm.provider == LlmProvider::Disabled
    {
        return Err(ConfigError::Validation(format!(
            "dialogue.intent_strategy `{}` needs an llm provider (llm.provider is disabled)",
            dialogue.intent_strategy.as_str()
        )));
    }

    Ok(())
}

fn validate_payments(payments: &PaymentsConfig) -> Result<(), ConfigError> {
    if payments.tolerance_secs == 0 {
        return Err(ConfigError::Validation(
            "payments.tolerance_secs must be greater than zero".to_string(),
        ));
    }
    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_f64(key: &str, value: &str) -> Result<f64, ConfigError> {
    value.parse::<f64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    restaurant: Option<RestaurantPatch>,
    data: Option<DataPatch>,
    dialogue: Option<DialoguePatch>,
    journal: Option<JournalPatch>,
    payments: Option<PaymentsPatch>,
    whatsapp: Option<WhatsAppPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    embedding_model: Option<String>,
    timeout_secs: Option<u64>,
    max_retries: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    static_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct RestaurantPatch {
    name: Option<String>,
    address: Option<String>,
    hours: Option<String>,
    phone: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct DataPatch {
    menu_path: Option<PathBuf>,
    knowledge_base_path: Option<PathBuf>,
    documents_dir: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct DialoguePatch {
    intent_strategy: Option<IntentStrategy>,
    fuzzy_threshold: Option<f64>,
    intent_history_turns: Option<usize>,
    fallback_history_turns: Option<usize>,
    retrieval_history_turns: Option<usize>,
    retrieval_top_k: Option<usize>,
    session_ttl_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct JournalPatch {
    orders_path: Option<PathBuf>,
    chat_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct PaymentsPatch {
    webhook_secret: Option<String>,
    tolerance_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WhatsAppPatch {
    verify_token: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}
