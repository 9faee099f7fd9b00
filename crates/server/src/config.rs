use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use stepwise_core::llm::{LlmClient, OpenAiCompatClient, OpenAiCompatConfig};
use stepwise_core::storage::{DefinitionStore, RedbStore};
use stepwise_core::workflow::WorkflowEngine;
use stepwise_core::EngineConfig;
use tokio::sync::Mutex;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(skip)]
    pub data_dir: PathBuf,

    #[serde(default)]
    pub storage: StorageConfig,

    #[serde(default)]
    pub llm: OpenAiCompatConfig,

    #[serde(default)]
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_index_file")]
    pub index_file: String,
}

fn default_index_file() -> String {
    "stepwise.redb".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            index_file: default_index_file(),
        }
    }
}

impl ServerConfig {
    pub fn load(config_path: &Path, data_dir: PathBuf) -> Result<Self> {
        std::fs::create_dir_all(&data_dir).context("Failed to create data directory")?;

        let mut config: Self = if config_path.exists() {
            let content = std::fs::read_to_string(config_path)
                .context("Failed to read configuration file")?;
            Self::parse(&content)?
        } else {
            tracing::info!("Configuration file not found, using defaults");
            Self::default()
        };

        config.data_dir = data_dir;

        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse configuration file")?;
        config.engine.validate().context("Invalid configuration file")?;
        Ok(config)
    }

    /// Get the index file path
    pub fn index_path(&self) -> PathBuf {
        self.data_dir.join(&self.storage.index_file)
    }
}

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub definitions: Arc<dyn DefinitionStore>,
    pub engine: Arc<WorkflowEngine>,
    /// Serializes read-modify-write edits of workflow definitions
    pub edit_lock: Arc<Mutex<()>>,
}

impl AppState {
    pub fn new(config: &ServerConfig) -> Result<Self> {
        if config.llm.api_key.is_none() {
            tracing::warn!("No LLM API key configured; calls to the generation service will be rejected");
        }

        let store = Arc::new(
            RedbStore::new(config.index_path()).context("Failed to create index store")?,
        );
        let llm = Arc::new(
            OpenAiCompatClient::new(&config.llm).context("Failed to create LLM client")?,
        );

        Ok(Self::from_parts(store, llm, &config.engine))
    }

    pub fn from_parts(store: Arc<RedbStore>, llm: Arc<dyn LlmClient>, engine_config: &EngineConfig) -> Self {
        let engine = Arc::new(WorkflowEngine::new(store.clone(), store.clone(), llm, engine_config));

        Self {
            definitions: store,
            engine,
            edit_lock: Arc::new(Mutex::new(())),
        }
    }
}
