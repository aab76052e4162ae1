//! Configuration for the expense ledger

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Main ledger configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Document store configuration
    #[serde(default)]
    pub database: DatabaseConfig,
    /// Gemini API configuration
    #[serde(default)]
    pub gemini: GeminiConfig,
    /// Receipt ingestion configuration
    #[serde(default)]
    pub ingestion: IngestionConfig,
}

impl Config {
    /// Load from a TOML file, then apply environment overrides. A missing
    /// file is not an error; defaults are used instead.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut config: Self = if path.exists() {
            let raw = std::fs::read_to_string(path)?;
            toml::from_str(&raw)
                .map_err(|e| Error::config(format!("invalid config file {}: {e}", path.display())))?
        } else {
            Self::default()
        };
        config.apply_env();
        Ok(config)
    }

    /// Defaults plus environment overrides, no file involved.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    fn apply_env(&mut self) {
        if let Ok(url) = std::env::var("DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(name) = std::env::var("DATABASE_NAME") {
            self.database.name = name;
        }
        if let Ok(coll) = std::env::var("COLLECTION_USERS") {
            self.database.users_collection = coll;
        }
        if let Ok(coll) = std::env::var("COLLECTION_EXPENSES") {
            self.database.expenses_collection = coll;
        }
        if let Ok(coll) = std::env::var("COLLECTION_TRANSACTIONS") {
            self.database.transactions_collection = coll;
        }
        // Both key names are in circulation in existing deployments.
        if let Ok(key) =
            std::env::var("GOOGLE_API_KEY").or_else(|_| std::env::var("GEMINI_API_KEY"))
        {
            self.gemini.api_key = Some(key);
        }
    }
}

/// Document store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Connection URL
    #[serde(default = "default_database_url")]
    pub url: String,
    /// Database name
    #[serde(default = "default_database_name")]
    pub name: String,
    /// Users collection name
    #[serde(default = "default_users_collection")]
    pub users_collection: String,
    /// Expenses collection name
    #[serde(default = "default_expenses_collection")]
    pub expenses_collection: String,
    /// Transactions collection name
    #[serde(default = "default_transactions_collection")]
    pub transactions_collection: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            name: default_database_name(),
            users_collection: default_users_collection(),
            expenses_collection: default_expenses_collection(),
            transactions_collection: default_transactions_collection(),
        }
    }
}

fn default_database_url() -> String {
    "mongodb://localhost:27017".to_string()
}

fn default_database_name() -> String {
    "expense_manager".to_string()
}

fn default_users_collection() -> String {
    "users".to_string()
}

fn default_expenses_collection() -> String {
    "expenses".to_string()
}

fn default_transactions_collection() -> String {
    "transactions".to_string()
}

/// Gemini API configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiConfig {
    /// API key; operations requiring the model fail without it
    #[serde(default)]
    pub api_key: Option<String>,
    /// REST API base URL
    #[serde(default = "default_gemini_base_url")]
    pub base_url: String,
    /// Multimodal model for image content
    #[serde(default = "default_vision_model")]
    pub vision_model: String,
    /// Faster text-only model
    #[serde(default = "default_text_model")]
    pub text_model: String,
    /// Streaming model for the spending advisor
    #[serde(default = "default_advisor_model")]
    pub advisor_model: String,
    /// Request timeout in seconds
    #[serde(default = "default_gemini_timeout")]
    pub timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: default_gemini_base_url(),
            vision_model: default_vision_model(),
            text_model: default_text_model(),
            advisor_model: default_advisor_model(),
            timeout_secs: default_gemini_timeout(),
        }
    }
}

impl GeminiConfig {
    /// The configured API key, or a configuration error naming the variable
    /// to set.
    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key
            .as_deref()
            .filter(|key| !key.is_empty())
            .ok_or_else(|| Error::config("GOOGLE_API_KEY is not set"))
    }
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta".to_string()
}

fn default_vision_model() -> String {
    "models/gemini-1.5-pro-latest".to_string()
}

fn default_text_model() -> String {
    "models/gemini-1.5-flash-latest".to_string()
}

fn default_advisor_model() -> String {
    "models/gemini-2.5-flash".to_string()
}

fn default_gemini_timeout() -> u64 {
    120
}

/// Receipt ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Upload extensions accepted by the coordinator
    #[serde(default = "default_allowed_extensions")]
    pub allowed_extensions: Vec<String>,
    /// Title used when the model extracts none
    #[serde(default = "default_title")]
    pub default_title: String,
    /// Category used when the model extracts none
    #[serde(default = "default_category")]
    pub default_category: String,
    /// Description used when the model extracts none
    #[serde(default = "default_description")]
    pub default_description: String,
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            allowed_extensions: default_allowed_extensions(),
            default_title: default_title(),
            default_category: default_category(),
            default_description: default_description(),
        }
    }
}

impl IngestionConfig {
    /// Whether an extension (without the dot) is accepted for upload.
    pub fn allows(&self, extension: &str) -> bool {
        let extension = extension.to_lowercase();
        self.allowed_extensions.iter().any(|e| *e == extension)
    }
}

fn default_allowed_extensions() -> Vec<String> {
    ["png", "jpg", "jpeg", "pdf", "txt"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_title() -> String {
    "Receipt Expense".to_string()
}

fn default_category() -> String {
    "Miscellaneous".to_string()
}

fn default_description() -> String {
    "Expense from uploaded receipt".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_complete() {
        let config = Config::default();
        assert_eq!(config.database.url, "mongodb://localhost:27017");
        assert_eq!(config.database.expenses_collection, "expenses");
        assert_eq!(config.gemini.vision_model, "models/gemini-1.5-pro-latest");
        assert_eq!(config.gemini.text_model, "models/gemini-1.5-flash-latest");
        assert!(config.ingestion.allows("pdf"));
        assert!(config.ingestion.allows("JPG"));
        assert!(!config.ingestion.allows("docx"));
    }

    #[test]
    fn partial_toml_fills_in_defaults() {
        let config: Config = toml::from_str(
            r#"
            [database]
            name = "expenses_test"

            [gemini]
            api_key = "test-key"
            "#,
        )
        .unwrap();
        assert_eq!(config.database.name, "expenses_test");
        assert_eq!(config.database.url, "mongodb://localhost:27017");
        assert_eq!(config.gemini.require_api_key().unwrap(), "test-key");
        assert_eq!(config.ingestion.default_title, "Receipt Expense");
    }

    #[test]
    fn missing_api_key_is_a_config_error() {
        let config = GeminiConfig::default();
        assert!(config.require_api_key().is_err());

        let config = GeminiConfig {
            api_key: Some(String::new()),
            ..GeminiConfig::default()
        };
        assert!(config.require_api_key().is_err());
    }

    #[test]
    fn load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(dir.path().join("absent.toml")).unwrap();
        assert_eq!(config.database.name, "expense_manager");
    }
}
