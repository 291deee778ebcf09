//! Configuration management for the Pinecone target.
//!
//! Two layers of configuration exist:
//! - `AppConfig`: process-level settings (config path, logging, dry run)
//!   taken from environment variables and command-line flags.
//! - `SinkConfig`: the target settings read from the Singer config file
//!   (JSON, or YAML by extension), with `PINECONE_*` environment overrides.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};

use crate::error::{AppError, AppResult};

/// Providers understood by the gateway factory.
pub const KNOWN_PROVIDERS: [&str; 2] = ["pinecone", "memory"];

/// Main application configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Path to the target config file
    pub config_file: Option<PathBuf>,

    /// Log level override
    pub log_level: Option<String>,

    /// Verbose mode (enables debug logging)
    pub verbose: bool,

    /// Disable colored output
    pub no_color: bool,

    /// Write to the in-memory store instead of Pinecone
    pub dry_run: bool,
}

impl AppConfig {
    /// Load configuration from environment variables.
    ///
    /// Environment variables:
    /// - `TARGET_PINECONE_CONFIG`: Path to config file
    /// - `RUST_LOG`: Log level
    /// - `NO_COLOR`: Disable colored output
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Ok(config_file) = std::env::var("TARGET_PINECONE_CONFIG") {
            config.config_file = Some(PathBuf::from(config_file));
        }

        config.log_level = std::env::var("RUST_LOG").ok();

        if std::env::var("NO_COLOR").is_ok() {
            config.no_color = true;
        }

        config
    }

    /// Apply CLI overrides to the configuration.
    ///
    /// Command-line flags take precedence over environment variables.
    pub fn with_overrides(
        mut self,
        config_file: Option<PathBuf>,
        log_level: Option<String>,
        verbose: bool,
        no_color: bool,
        dry_run: bool,
    ) -> Self {
        if let Some(config_file) = config_file {
            self.config_file = Some(config_file);
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

        if dry_run {
            self.dry_run = true;
        }

        self
    }

    /// Load the target settings from the configured file.
    pub fn sink_config(&self) -> AppResult<SinkConfig> {
        let path = self.config_file.as_ref().ok_or_else(|| {
            AppError::Config("No config file given (use --config)".to_string())
        })?;

        let mut sink = SinkConfig::from_file(path)?;
        sink.apply_env(|key| std::env::var(key).ok());

        if self.dry_run {
            sink.provider = "memory".to_string();
        }

        sink.validate()?;
        Ok(sink)
    }
}

/// How an existing index is treated at the start of a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LoadMethod {
    /// Reuse the index and its contents as-is.
    #[default]
    #[serde(alias = "upsert")]
    Append,
    /// Recreate a non-empty index before writing.
    Overwrite,
}

impl LoadMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::Overwrite => "overwrite",
        }
    }
}

impl fmt::Display for LoadMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Target settings, one field per recognized config key.
#[derive(Clone, Serialize, Deserialize)]
pub struct SinkConfig {
    /// Vector store API key
    #[serde(default)]
    pub api_key: String,

    /// Target index identifier
    #[serde(default)]
    pub index_name: String,

    /// Pinecone environment (region/deployment), e.g. "us-west1-gcp"
    #[serde(default)]
    pub environment: Option<String>,

    /// Input field holding the document text
    #[serde(default = "default_text_property")]
    pub document_text_property: String,

    /// Input field holding the embedding vector
    #[serde(default = "default_embeddings_property")]
    pub embeddings_property: String,

    /// Input field holding the metadata mapping
    #[serde(default = "default_metadata_property")]
    pub metadata_property: String,

    /// Metadata key under which the document text is stored
    #[serde(default = "default_text_property")]
    pub pinecone_metadata_text_key: String,

    /// Dimension used only when a new index is created
    #[serde(default = "default_dimensions")]
    pub dimensions: u32,

    /// Recreation policy for existing indexes
    #[serde(default)]
    pub load_method: LoadMethod,

    /// Gateway implementation ("pinecone" or "memory")
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Control-plane base URL override
    #[serde(default)]
    pub controller_url: Option<String>,

    /// Namespace passed through on upsert
    #[serde(default)]
    pub namespace: Option<String>,
}

fn default_text_property() -> String {
    "text".to_string()
}

fn default_embeddings_property() -> String {
    "embeddings".to_string()
}

fn default_metadata_property() -> String {
    "metadata".to_string()
}

fn default_dimensions() -> u32 {
    1536
}

fn default_provider() -> String {
    "pinecone".to_string()
}

impl Default for SinkConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            index_name: String::new(),
            environment: None,
            document_text_property: default_text_property(),
            embeddings_property: default_embeddings_property(),
            metadata_property: default_metadata_property(),
            pinecone_metadata_text_key: default_text_property(),
            dimensions: default_dimensions(),
            load_method: LoadMethod::default(),
            provider: default_provider(),
            controller_url: None,
            namespace: None,
        }
    }
}

impl fmt::Debug for SinkConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SinkConfig")
            .field("api_key", &"<redacted>")
            .field("index_name", &self.index_name)
            .field("environment", &self.environment)
            .field("document_text_property", &self.document_text_property)
            .field("embeddings_property", &self.embeddings_property)
            .field("metadata_property", &self.metadata_property)
            .field(
                "pinecone_metadata_text_key",
                &self.pinecone_metadata_text_key,
            )
            .field("dimensions", &self.dimensions)
            .field("load_method", &self.load_method)
            .field("provider", &self.provider)
            .field("controller_url", &self.controller_url)
            .field("namespace", &self.namespace)
            .finish()
    }
}

impl SinkConfig {
    /// Read settings from a JSON or YAML file.
    ///
    /// Files ending in `.yaml` or `.yml` are parsed as YAML, everything
    /// else as JSON (the Singer convention).
    pub fn from_file(path: &Path) -> AppResult<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            AppError::Config(format!("Failed to read config file {:?}: {}", path, e))
        })?;

        let is_yaml = matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml") | Some("yml")
        );

        let config = if is_yaml {
            serde_yaml::from_str(&contents).map_err(|e| {
                AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        } else {
            serde_json::from_str(&contents).map_err(|e| {
                AppError::Config(format!("Failed to parse config file {:?}: {}", path, e))
            })?
        };

        tracing::debug!("Loaded target config from {:?}", path);
        Ok(config)
    }

    /// Apply `PINECONE_*` overrides using the given variable lookup.
    ///
    /// - `PINECONE_API_KEY`
    /// - `PINECONE_ENVIRONMENT`
    /// - `PINECONE_INDEX_NAME`
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(api_key) = lookup("PINECONE_API_KEY") {
            self.api_key = api_key;
        }

        if let Some(environment) = lookup("PINECONE_ENVIRONMENT") {
            self.environment = Some(environment);
        }

        if let Some(index_name) = lookup("PINECONE_INDEX_NAME") {
            self.index_name = index_name;
        }
    }

    /// Control-plane base URL: the explicit override, else derived from the environment.
    pub fn controller_url(&self) -> Option<String> {
        self.controller_url
            .as_ref()
            .map(|url| url.trim_end_matches('/').to_string())
            .or_else(|| {
                self.environment
                    .as_ref()
                    .map(|env| format!("https://controller.{}.pinecone.io", env))
            })
    }

    /// Provider name as matched everywhere: trimmed and lowercased.
    pub fn provider_name(&self) -> String {
        self.provider.trim().to_lowercase()
    }

    /// Validate the settings before any vector-store call is made.
    pub fn validate(&self) -> AppResult<()> {
        let provider = self.provider_name();
        if !KNOWN_PROVIDERS.contains(&provider.as_str()) {
            return Err(AppError::Config(format!(
                "Unknown provider: {}. Supported: {}",
                self.provider,
                KNOWN_PROVIDERS.join(", ")
            )));
        }

        if self.index_name.trim().is_empty() {
            return Err(AppError::Config("index_name is required".to_string()));
        }

        if self.dimensions == 0 {
            return Err(AppError::Config(
                "dimensions must be a positive integer".to_string(),
            ));
        }

        let properties = [
            ("document_text_property", &self.document_text_property),
            ("embeddings_property", &self.embeddings_property),
            ("metadata_property", &self.metadata_property),
            ("pinecone_metadata_text_key", &self.pinecone_metadata_text_key),
        ];
        for (key, value) in properties {
            if value.is_empty() {
                return Err(AppError::Config(format!("{} must not be empty", key)));
            }
        }

        if provider == "pinecone" {
            if self.api_key.is_empty() {
                return Err(AppError::Config("api_key is required".to_string()));
            }
            if self.controller_url().is_none() {
                return Err(AppError::Config(
                    "environment is required when controller_url is not set".to_string(),
                ));
            }
        }

        Ok(())
    }
}
