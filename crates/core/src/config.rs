//! Configuration management for ragline.
//!
//! Settings are layered, later sources winning:
//! - built-in defaults
//! - a YAML file (`.ragline/config.yaml` in the workspace, or `RAGLINE_CONFIG`)
//! - `RAGLINE_*` environment variables
//! - command-line flags
//!
//! [`AppConfig::validate`] rejects inconsistent settings with
//! [`AppError::InvalidConfig`] before any component is built.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use crate::error::{AppError, AppResult};
use crate::retry::RetryPolicy;

/// Name of the per-workspace state directory.
pub const DATA_DIR: &str = ".ragline";

const KNOWN_LLM_PROVIDERS: &[&str] = &["ollama", "openai"];
const KNOWN_EMBEDDING_PROVIDERS: &[&str] = &["ollama", "hashed"];

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the workspace root (contains .ragline/)
    pub workspace: PathBuf,

    /// Optional config file path
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    pub llm: LlmSettings,
    pub embedding: EmbeddingSettings,
    pub index: IndexSettings,
    pub rag: RagSettings,
}

/// Language model used for answer generation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct LlmSettings {
    /// "ollama" or "openai" (any OpenAI-compatible endpoint)
    pub provider: String,
    pub model: String,
    pub endpoint: Option<String>,
    /// Environment variable holding the API key, when the provider needs one
    #[serde(alias = "api_key_env")]
    pub api_key_env: Option<String>,
    pub temperature: f32,
    #[serde(alias = "max_tokens")]
    pub max_tokens: u32,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "qwen2.5:1.5b".to_string(),
            endpoint: None,
            api_key_env: None,
            temperature: 0.3,
            max_tokens: 1000,
        }
    }
}

/// Embedding model runtime.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct EmbeddingSettings {
    /// "ollama" or "hashed"
    pub provider: String,
    pub model: String,
    pub endpoint: Option<String>,
    /// Texts per provider call
    #[serde(alias = "batch_size")]
    pub batch_size: usize,
    /// Batches in flight at once
    pub concurrency: usize,
    /// Longer inputs are truncated (with a warning) before encoding
    #[serde(alias = "max_input_chars")]
    pub max_input_chars: usize,
    #[serde(alias = "request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: "ollama".to_string(),
            model: "nomic-embed-text".to_string(),
            endpoint: None,
            batch_size: 32,
            concurrency: 4,
            max_input_chars: 8192,
            request_timeout_seconds: 30,
        }
    }
}

/// Storage backend for embedding records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexBackend {
    /// In-process map, lost on exit
    Memory,
    /// LanceDB tables on local disk
    Lancedb,
}

impl FromStr for IndexBackend {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "lancedb" | "lance" => Ok(Self::Lancedb),
            other => Err(AppError::InvalidConfig(format!(
                "Unknown index backend: {}. Supported: memory, lancedb",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct IndexSettings {
    pub backend: IndexBackend,
    /// Database location; defaults to `.ragline/index` in the workspace
    pub uri: Option<String>,
    pub collection: String,
    /// Bound on a single index call
    #[serde(alias = "request_timeout_seconds")]
    pub request_timeout_seconds: u64,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self {
            backend: IndexBackend::Lancedb,
            uri: None,
            collection: "documents".to_string(),
            request_timeout_seconds: 30,
        }
    }
}

impl IndexSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

/// Similarity used to score a stored vector against a query vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityMetric {
    Cosine,
    InnerProduct,
}

impl SimilarityMetric {
    /// Higher is more similar for both metrics.
    pub fn score(&self, a: &[f32], b: &[f32]) -> f32 {
        if a.len() != b.len() {
            return 0.0;
        }

        let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
        match self {
            Self::InnerProduct => dot,
            Self::Cosine => {
                let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
                let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
                if norm_a == 0.0 || norm_b == 0.0 {
                    0.0
                } else {
                    dot / (norm_a * norm_b)
                }
            }
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Cosine => "cosine",
            Self::InnerProduct => "inner_product",
        }
    }
}

impl FromStr for SimilarityMetric {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "cosine" => Ok(Self::Cosine),
            "inner_product" | "ip" | "dot" => Ok(Self::InnerProduct),
            other => Err(AppError::InvalidConfig(format!(
                "Unknown similarity metric: {}. Supported: cosine, inner_product",
                other
            ))),
        }
    }
}

/// Unit in which the context budget is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BudgetUnit {
    Chars,
    Tokens,
}

/// Retrieval and generation knobs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase", deny_unknown_fields)]
pub struct RagSettings {
    /// Maximum chunk length in characters
    #[serde(alias = "chunk_size")]
    pub chunk_size: usize,
    /// Characters shared by consecutive chunks
    #[serde(alias = "chunk_overlap")]
    pub chunk_overlap: usize,
    #[serde(alias = "embedding_dimension")]
    pub embedding_dimension: usize,
    #[serde(alias = "top_k")]
    pub top_k: usize,
    #[serde(alias = "context_budget")]
    pub context_budget: usize,
    #[serde(alias = "budget_unit")]
    pub budget_unit: BudgetUnit,
    #[serde(alias = "similarity_metric")]
    pub similarity_metric: SimilarityMetric,
    /// Candidates fetched per requested result before dedupe
    #[serde(alias = "overfetch_factor")]
    pub overfetch_factor: usize,
    /// Hits scoring below this are dropped during ranking
    #[serde(alias = "min_score")]
    pub min_score: Option<f32>,
    /// Best scores below this make the prompt ask for a cautious answer
    #[serde(alias = "confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(alias = "llm_timeout_seconds")]
    pub llm_timeout_seconds: u64,
    /// Attempts for index and embedding calls
    #[serde(alias = "max_retries")]
    pub max_retries: u32,
    #[serde(alias = "retry_initial_delay_ms")]
    pub retry_initial_delay_ms: u64,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            embedding_dimension: 768,
            top_k: 3,
            context_budget: 4000,
            budget_unit: BudgetUnit::Chars,
            similarity_metric: SimilarityMetric::Cosine,
            overfetch_factor: 2,
            min_score: None,
            confidence_threshold: 0.30,
            llm_timeout_seconds: 60,
            max_retries: 3,
            retry_initial_delay_ms: 200,
        }
    }
}

impl RagSettings {
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm_timeout_seconds)
    }

    /// Policy for index and embedding calls.
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.max_retries,
            Duration::from_millis(self.retry_initial_delay_ms),
        )
    }
}

/// Full configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
struct ConfigFile {
    workspace: Option<WorkspaceConfig>,
    logging: Option<LoggingConfig>,
    llm: Option<LlmSettings>,
    embedding: Option<EmbeddingSettings>,
    index: Option<IndexSettings>,
    rag: Option<RagSettings>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct WorkspaceConfig {
    path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct LoggingConfig {
    level: Option<String>,
    color: Option<bool>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            workspace: std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
            config_file: None,
            log_level: None,
            verbose: false,
            no_color: false,
            llm: LlmSettings::default(),
            embedding: EmbeddingSettings::default(),
            index: IndexSettings::default(),
            rag: RagSettings::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, the config file and the environment.
    ///
    /// Environment variables:
    /// - `RAGLINE_WORKSPACE`, `RAGLINE_CONFIG`
    /// - `RAGLINE_LLM_PROVIDER`, `RAGLINE_LLM_MODEL`, `RAGLINE_LLM_ENDPOINT`
    /// - `RAGLINE_EMBEDDING_PROVIDER`, `RAGLINE_EMBEDDING_MODEL`, `RAGLINE_EMBEDDING_ENDPOINT`
    /// - `RAGLINE_INDEX_BACKEND`, `RAGLINE_INDEX_URI`, `RAGLINE_COLLECTION`
    /// - `RUST_LOG`, `NO_COLOR`
    ///
    /// # Example
    /// ```no_run
    /// use ragline_core::config::AppConfig;
    ///
    /// let config = AppConfig::load().expect("Failed to load config");
    /// println!("Workspace: {:?}", config.workspace);
    /// ```
    pub fn load() -> AppResult<Self> {
        Self::load_with(None, None)
    }

    /// Like [`AppConfig::load`], with an explicit workspace and config file
    /// taking precedence over the environment.
    pub fn load_with(workspace: Option<PathBuf>, config_file: Option<PathBuf>) -> AppResult<Self> {
        let mut config = Self::default();

        if let Some(workspace) = workspace.or_else(|| env_path("RAGLINE_WORKSPACE")) {
            config.workspace = workspace;
        }
        config.config_file = config_file.or_else(|| env_path("RAGLINE_CONFIG"));

        if !config.workspace.exists() {
            return Err(AppError::InvalidConfig(format!(
                "Workspace directory does not exist: {:?}",
                config.workspace
            )));
        }

        let config_path = match config.config_file {
            Some(ref cf) => cf.clone(),
            None => config.data_dir().join("config.yaml"),
        };

        if config_path.exists() {
            config = config.merge_yaml(&config_path)?;
        } else if config.config_file.is_some() {
            return Err(AppError::InvalidConfig(format!(
                "Config file not found: {:?}",
                config_path
            )));
        }

        config.apply_env()?;
        Ok(config)
    }

    /// Merge a YAML configuration file into this config.
    fn merge_yaml(&self, path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::InvalidConfig(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let config_file: ConfigFile = serde_yaml::from_str(&contents).map_err(|e| {
            AppError::InvalidConfig(format!("Failed to parse config file {:?}: {}", path, e))
        })?;

        let mut result = self.clone();

        if let Some(path) = config_file.workspace.and_then(|ws| ws.path) {
            result.workspace = PathBuf::from(path);
        }

        if let Some(logging) = config_file.logging {
            if let Some(level) = logging.level {
                result.log_level = Some(level);
            }
            if let Some(color) = logging.color {
                result.no_color = !color;
            }
        }

        if let Some(llm) = config_file.llm {
            result.llm = llm;
        }
        if let Some(embedding) = config_file.embedding {
            result.embedding = embedding;
        }
        if let Some(index) = config_file.index {
            result.index = index;
        }
        if let Some(rag) = config_file.rag {
            result.rag = rag;
        }

        tracing::debug!("Merged config file {:?}", path);
        Ok(result)
    }

    /// Environment variables override YAML config.
    fn apply_env(&mut self) -> AppResult<()> {
        if let Ok(provider) = std::env::var("RAGLINE_LLM_PROVIDER") {
            self.llm.provider = provider;
        }
        if let Ok(model) = std::env::var("RAGLINE_LLM_MODEL") {
            self.llm.model = model;
        }
        if let Ok(endpoint) = std::env::var("RAGLINE_LLM_ENDPOINT") {
            self.llm.endpoint = Some(endpoint);
        }
        if let Ok(provider) = std::env::var("RAGLINE_EMBEDDING_PROVIDER") {
            self.embedding.provider = provider;
        }
        if let Ok(model) = std::env::var("RAGLINE_EMBEDDING_MODEL") {
            self.embedding.model = model;
        }
        if let Ok(endpoint) = std::env::var("RAGLINE_EMBEDDING_ENDPOINT") {
            self.embedding.endpoint = Some(endpoint);
        }
        if let Ok(backend) = std::env::var("RAGLINE_INDEX_BACKEND") {
            self.index.backend = backend.parse()?;
        }
        if let Ok(uri) = std::env::var("RAGLINE_INDEX_URI") {
            self.index.uri = Some(uri);
        }
        if let Ok(collection) = std::env::var("RAGLINE_COLLECTION") {
            self.index.collection = collection;
        }

        if let Ok(level) = std::env::var("RUST_LOG") {
            self.log_level = Some(level);
        }
        if std::env::var("NO_COLOR").is_ok() {
            self.no_color = true;
        }

        Ok(())
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables and
    /// the config file.
    pub fn with_overrides(
        mut self,
        provider: Option<String>,
        model: Option<String>,
        collection: Option<String>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
    ) -> Self {
        if let Some(provider) = provider {
            self.llm.provider = provider;
        }

        if let Some(model) = model {
            self.llm.model = model;
        }

        if let Some(collection) = collection {
            self.index.collection = collection;
        }

        if let Some(log_level) = log_level {
            self.log_level = Some(log_level);
        }

        if verbose {
            self.verbose = true;
            // Verbose mode implies debug logging
            if self.log_level.is_none() {
                self.log_level = Some("debug".to_string());
            }
        }

        if no_color {
            self.no_color = true;
        }

        self
    }

    /// Path to the .ragline directory.
    pub fn data_dir(&self) -> PathBuf {
        self.workspace.join(DATA_DIR)
    }

    /// Ensure the .ragline directory exists.
    pub fn ensure_data_dir(&self) -> AppResult<()> {
        let data_dir = self.data_dir();
        if !data_dir.exists() {
            std::fs::create_dir_all(&data_dir).map_err(|e| {
                AppError::InvalidConfig(format!("Failed to create {} directory: {}", DATA_DIR, e))
            })?;
        }
        Ok(())
    }

    /// Location of the vector database.
    pub fn index_uri(&self) -> String {
        match self.index.uri {
            Some(ref uri) => uri.clone(),
            None => self.data_dir().join("index").to_string_lossy().to_string(),
        }
    }

    /// Resolve the LLM API key from the configured environment variable.
    pub fn resolve_api_key(&self) -> Option<String> {
        self.llm
            .api_key_env
            .as_deref()
            .and_then(|var| std::env::var(var).ok())
    }

    /// Validate settings before any component is built.
    pub fn validate(&self) -> AppResult<()> {
        let rag = &self.rag;

        if rag.chunk_size == 0 {
            return Err(AppError::InvalidConfig(
                "chunk_size must be greater than zero".to_string(),
            ));
        }
        if rag.chunk_overlap >= rag.chunk_size {
            return Err(AppError::InvalidConfig(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                rag.chunk_overlap, rag.chunk_size
            )));
        }
        if rag.embedding_dimension == 0 {
            return Err(AppError::InvalidConfig(
                "embedding_dimension must be greater than zero".to_string(),
            ));
        }
        if rag.top_k == 0 {
            return Err(AppError::InvalidConfig(
                "top_k must be greater than zero".to_string(),
            ));
        }
        if rag.context_budget == 0 {
            return Err(AppError::InvalidConfig(
                "context_budget must be greater than zero".to_string(),
            ));
        }
        if rag.overfetch_factor == 0 {
            return Err(AppError::InvalidConfig(
                "overfetch_factor must be at least 1".to_string(),
            ));
        }
        if rag.llm_timeout_seconds == 0 {
            return Err(AppError::InvalidConfig(
                "llm_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if rag.max_retries == 0 {
            return Err(AppError::InvalidConfig(
                "max_retries must be at least 1".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&rag.confidence_threshold) {
            return Err(AppError::InvalidConfig(format!(
                "confidence_threshold must be within [0, 1], got {}",
                rag.confidence_threshold
            )));
        }

        if self.embedding.batch_size == 0 || self.embedding.concurrency == 0 {
            return Err(AppError::InvalidConfig(
                "embedding batch_size and concurrency must be greater than zero".to_string(),
            ));
        }
        if self.embedding.max_input_chars == 0 {
            return Err(AppError::InvalidConfig(
                "embedding max_input_chars must be greater than zero".to_string(),
            ));
        }

        check_known("LLM provider", &self.llm.provider, KNOWN_LLM_PROVIDERS)?;
        check_known(
            "embedding provider",
            &self.embedding.provider,
            KNOWN_EMBEDDING_PROVIDERS,
        )?;

        if self.index.request_timeout_seconds == 0 {
            return Err(AppError::InvalidConfig(
                "index request_timeout_seconds must be greater than zero".to_string(),
            ));
        }
        if self.index.collection.trim().is_empty() {
            return Err(AppError::InvalidConfig(
                "collection name cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

fn env_path(var: &str) -> Option<PathBuf> {
    std::env::var(var).ok().map(PathBuf::from)
}

fn check_known(what: &str, value: &str, known: &[&str]) -> AppResult<()> {
    if known.contains(&value.to_lowercase().as_str()) {
        Ok(())
    } else {
        Err(AppError::InvalidConfig(format!(
            "Unknown {}: {}. Supported: {}",
            what,
            value,
            known.join(", ")
        )))
    }
}
