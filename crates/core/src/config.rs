//! Configuration management for Tadabbur.
//!
//! This module handles loading and merging configuration from multiple sources:
//! - Built-in defaults
//! - Config file (`tadabbur.yaml` in the workspace)
//! - Environment variables
//! - Command-line flags
//!
//! The workspace is the data directory holding the corpus files, the
//! persisted indices and the history database. Relative paths in the
//! config file are resolved against it.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Default config file name, looked up in the workspace.
pub const CONFIG_FILE_NAME: &str = "tadabbur.yaml";

/// Environment variable holding the Gemini API key by default.
pub const DEFAULT_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace (data directory)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Generation provider ("gemini" or "ollama")
    pub provider: String,

    /// Generation model identifier
    pub model: String,

    /// Explicit API key for the generation provider
    pub api_key: Option<String>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Emit logs as JSON lines
    pub log_json: bool,

    /// LLM provider configurations
    pub llm: Option<LlmConfig>,

    /// Embedding model settings
    pub embedding: EmbeddingSettings,

    /// Corpus file locations
    pub corpora: CorporaConfig,

    /// HTTP server settings
    pub server: ServerConfig,

    /// Daily quota settings
    pub quota: QuotaConfig,

    /// Chat history settings
    pub history: HistoryConfig,

    /// Directory of prompt overrides
    pub prompts_dir: Option<PathBuf>,
}

/// LLM configuration from the config file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(rename = "activeProvider")]
    pub active_provider: String,

    pub providers: HashMap<String, ProviderConfig>,
}

/// Provider-specific configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ProviderConfig {
    Gemini {
        #[serde(rename = "apiKeyEnv")]
        api_key_env: String,
        model: String,
        endpoint: Option<String>,
    },
    Ollama {
        endpoint: String,
        model: String,
        timeout: Option<u64>,
    },
}

/// Embedding model settings.
///
/// The same model must have produced the stored corpus embeddings,
/// otherwise distances between queries and documents are meaningless.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EmbeddingSettings {
    /// Provider name: "ollama" or "mock"
    pub provider: String,

    /// Model identifier
    pub model: String,

    /// Embedding vector dimensions
    pub dimensions: usize,

    /// Provider endpoint
    pub endpoint: Option<String>,

    /// Request timeout in seconds
    #[serde(default = "default_embedding_timeout")]
    pub timeout_secs: u64,
}

fn default_embedding_timeout() -> u64 {
    30
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "multilingual-e5-base".to_string(),
            dimensions: 768,
            endpoint: None,
            timeout_secs: default_embedding_timeout(),
        }
    }
}

/// Locations of the persisted index and metadata file for both corpora.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CorporaConfig {
    pub quran_index: PathBuf,
    pub quran_data: PathBuf,
    pub hadith_index: PathBuf,
    pub hadith_data: PathBuf,
}

impl Default for CorporaConfig {
    fn default() -> Self {
        Self {
            quran_index: PathBuf::from("quran_flat.index"),
            quran_data: PathBuf::from("quran_indexed.json"),
            hadith_index: PathBuf::from("hadith_flat.index"),
            hadith_data: PathBuf::from("hadith_indexed.json"),
        }
    }
}

/// HTTP server settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8000".to_string(),
        }
    }
}

/// Daily quota settings.
///
/// A limit of `-1` means unlimited.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct QuotaConfig {
    /// Limit applied to users without a known plan
    pub daily_limit: i64,

    /// Plan name -> daily limit
    pub plans: HashMap<String, i64>,

    /// User -> plan name
    #[serde(default)]
    pub users: HashMap<String, String>,
}

impl Default for QuotaConfig {
    fn default() -> Self {
        let mut plans = HashMap::new();
        plans.insert("free".to_string(), 5);
        plans.insert("mensuel".to_string(), 100);
        plans.insert("max".to_string(), -1);

        Self {
            daily_limit: 5,
            plans,
            users: HashMap::new(),
        }
    }
}

/// Chat history settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct HistoryConfig {
    pub path: PathBuf,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("history.sqlite"),
        }
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct ConfigFile {
    llm: Option<LlmConfig>,
    embedding: Option<EmbeddingSettings>,
    corpora: Option<CorporaConfig>,
    server: Option<ServerConfig>,
    quota: Option<QuotaConfig>,
    history: Option<HistoryConfig>,
    prompts: Option<PromptsConfig>,
    logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct PromptsConfig {
    dir: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
    json: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            provider: "gemini".to_string(),
            model: "gemini-2.0-flash".to_string(),
            api_key: None,
            log_level: None,
            verbose: false,
            no_color: false,
            log_json: false,
            llm: None,
            embedding: EmbeddingSettings::default(),
            corpora: CorporaConfig::default(),
            server: ServerConfig::default(),
            quota: QuotaConfig::default(),
            history: HistoryConfig::default(),
            prompts_dir: None,
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file and environment variables.
    ///
    /// Environment variables:
    /// - `TADABBUR_WORKSPACE`: Override workspace path
    /// - `TADABBUR_CONFIG`: Path to config file
    /// - `TADABBUR_PROVIDER`: Generation provider
    /// - `TADABBUR_MODEL`: Generation model identifier
    /// - `TADABBUR_API_KEY`: API key (takes precedence over `apiKeyEnv`)
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    ///
    /// # Example
    /// ```no_run
    /// use tadabbur_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        let mut config = Self::default();

        if let Ok(workspace) = std::env::var("TADABBUR_WORKSPACE") {
            config.workspace = PathBuf::from(workspace);
        }

        if let Ok(config_file) = std::env::var("TADABBUR_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        if !config.workspace.exists() {
            return Err(AppError::Config(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = config
            .config_file
            .clone()
            .unwrap_or_else(|| config.workspace.join(CONFIG_FILE_NAME));

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        }

        // Environment variables override the config file
        if let Ok(provider) = std::env::var("TADABBUR_PROVIDER") {
            config.provider = provider;
        }

        if let Ok(model) = std::env::var("TADABBUR_MODEL") {
            config.model = model;
        }

        config.api_key = std::env::var("TADABBUR_API_KEY").ok();

        if let Ok(level) = std::env::var("RUST_LOG") {
            config.log_level = Some(level);
        }

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        Ok(self.clone().merge(config_file))
    }

    fn merge(mut self, file: ConfigFile) -> Self {
        if let Some(logging) = file.logging {
            if let Some(level) = logging.level {
                self.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                self.no_color = !color;
            }
            if let Some(json) = logging.json {
                self.log_json = json;
            }
        }

        if let Some(llm) = file.llm {
            self.provider = llm.active_provider.clone();

            if let Some(provider_config) = llm.providers.get(&llm.active_provider) {
                self.model = provider_config.model().to_string();
            }

            self.llm = Some(llm);
        }

        if let Some(embedding) = file.embedding {
            self.embedding = embedding;
        }
        if let Some(corpora) = file.corpora {
            self.corpora = corpora;
        }
        if let Some(server) = file.server {
            self.server = server;
        }
        if let Some(quota) = file.quota {
            self.quota = quota;
        }
        if let Some(history) = file.history {
            self.history = history;
        }
        if let Some(dir) = file.prompts.and_then(|p| p.dir) {
            self.prompts_dir = Some(dir);
        }

        self
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over the environment and the config file.
    #[allow(clippy::too_many_arguments)]
    pub fn with_overrides(
        mut self,
        workspace: Option<PathBuf>,
        config_file: Option<PathBuf>,
        provider: Option<String>,
        model: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(workspace) = workspace {
            self.workspace = workspace;
        }

        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
        }

        if let Some(provider) = provider {
            self.provider = provider;
        }

        if let Some(model) = model {
            self.model = model;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Resolve a path from the config against the workspace.
    pub fn resolve_path(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.workspace.join(path)
        }
    }

    /// Absolute path of the chat history database.
    pub fn history_path(&self) -> PathBuf {
        self.resolve_path(&self.history.path)
    }

    /// Absolute path of the prompt override directory, if configured.
    pub fn prompts_path(&self) -> Option<PathBuf> {
        self.prompts_dir.as_deref().map(|p| self.resolve_path(p))
    }

    /// Get the configuration for a provider.
    pub fn get_provider_config(&self, provider: &str) -> Option<ProviderConfig> {
        self.llm
            .as_ref()
            .and_then(|llm| llm.providers.get(provider).cloned())
    }

    /// Endpoint override for a provider, if configured.
    pub fn provider_endpoint(&self, provider: &str) -> Option<String> {
        match self.get_provider_config(provider)? {
            ProviderConfig::Gemini { endpoint, .. } => endpoint,
            ProviderConfig::Ollama { endpoint, .. } => Some(endpoint),
        }
    }

    /// Resolve the API key for a provider.
    ///
    /// Empty values and the literal `none` count as unset, which leaves
    /// the generation side unconfigured rather than failing.
    pub fn resolve_api_key(&self, provider: &str) -> Option<String> {
        let usable = |key: &str| !key.trim().is_empty() && !key.eq_ignore_ascii_case("none");

        if let Some(ref key) = self.api_key {
            if usable(key) {
                return Some(key.clone());
            }
        }

        let env_var = match self.get_provider_config(provider) {
            Some(ProviderConfig::Gemini { api_key_env, .. }) => api_key_env,
            Some(ProviderConfig::Ollama { .. }) => return None,
            None if provider == "gemini" => DEFAULT_API_KEY_ENV.to_string(),
            None => return None,
        };

        std::env::var(&env_var).ok().filter(|key| usable(key))
    }

    /// Validate configuration.
    pub fn validate(&self) -> AppResult<()> {
        let known_providers = ["gemini", "ollama"];

        if !known_providers.contains(&self.provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                known_providers.join(", ")
            )));
        }

        if self.embedding.dimensions == 0 {
            return Err(AppError::Config(
                "Embedding dimensions must be greater than zero".to_string(),
            ));
        }

        if self.quota.daily_limit < -1 {
            return Err(AppError::Config(format!(
                "Invalid daily limit {} (use -1 for unlimited)",
                self.quota.daily_limit
            )));
        }

        Ok(())
    }
}

impl ProviderConfig {
    /// Get the model name for this provider.
    pub fn model(&self) -> &str {
        match self {
            Self::Gemini { model, .. } => model,
            Self::Ollama { model, .. } => model,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.provider, "gemini");
        assert_eq!(config.embedding.dimensions, 768);
        assert_eq!(config.quota.daily_limit, 5);
        assert_eq!(config.quota.plans.get("max"), Some(&-1));
        assert!(!config.verbose);
    }

    #[test]
    fn test_with_overrides() {
        let config = AppConfig::default();
        let overridden = config.with_overrides(
            None,
            None,
            Some("ollama".to_string()),
            Some("llama3.2".to_string()),
            None,
            true,
            false,
        );

        assert_eq!(overridden.provider, "ollama");
        assert_eq!(overridden.model, "llama3.2");
        assert!(overridden.verbose);
        assert_eq!(overridden.log_level, Some("debug".to_string()));
    }

    #[test]
    fn test_merge_yaml() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            r#"
llm:
  activeProvider: ollama
  providers:
    ollama:
      endpoint: http://localhost:11434
      model: llama3.2
embedding:
  provider: mock
  model: trigram-v1
  dimensions: 64
corpora:
  quranIndex: idx/quran.index
  quranData: data/quran.json
  hadithIndex: idx/hadith.index
  hadithData: data/hadith.json
logging:
  level: debug
  json: true
"#,
        )
        .unwrap();

        let config = AppConfig {
            workspace: temp.path().to_path_buf(),
            ..AppConfig::default()
        };
        let merged = config.merge_yaml(&path).unwrap();

        assert_eq!(merged.provider, "ollama");
        assert_eq!(merged.model, "llama3.2");
        assert_eq!(merged.embedding.provider, "mock");
        assert_eq!(merged.embedding.dimensions, 64);
        assert_eq!(merged.log_level.as_deref(), Some("debug"));
        assert!(merged.log_json);
        assert_eq!(
            merged.resolve_path(&merged.corpora.quran_data),
            temp.path().join("data/quran.json")
        );
        assert_eq!(
            merged.provider_endpoint("ollama").as_deref(),
            Some("http://localhost:11434")
        );
    }

    #[test]
    fn test_resolve_api_key_ignores_placeholder() {
        let config = AppConfig {
            api_key: Some("None".to_string()),
            provider: "ollama".to_string(),
            ..AppConfig::default()
        };
        assert_eq!(config.resolve_api_key("ollama"), None);

        let config = AppConfig {
            api_key: Some("secret".to_string()),
            ..AppConfig::default()
        };
        assert_eq!(config.resolve_api_key("gemini").as_deref(), Some("secret"));
    }

    #[test]
    fn test_validate_unknown_provider() {
        let config = AppConfig {
            provider: "unknown".to_string(),
            ..AppConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_default() {
        assert!(AppConfig::default().validate().is_ok());
    }
}
