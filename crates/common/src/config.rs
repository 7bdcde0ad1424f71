use crate::error::DocRefineError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Environment variable prefix, e.g. `DOCREFINE_LLM_MODEL`
pub const ENV_PREFIX: &str = "DOCREFINE";

/// Config file base name looked up in the working directory
pub const CONFIG_FILE_NAME: &str = "docrefine";

/// DocRefine application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Ollama API base URL
    pub ollama_base_url: String,

    /// Model used for the initial and refine steps
    pub llm_model: String,

    /// Sampling temperature
    pub temperature: f32,

    /// Top-p sampling
    pub top_p: f32,

    /// Maximum tokens to generate per step
    pub num_predict: i32,

    /// Receive generations as an NDJSON stream
    pub stream: bool,

    /// HTTP timeout for a single model call
    pub request_timeout_secs: u64,

    /// Attempts per model call before the error is surfaced
    pub max_retries: u32,

    /// Approximate chunk size (tokens) when splitting input files
    pub chunk_tokens: usize,

    /// Overlap between consecutive chunks (tokens)
    pub chunk_overlap: usize,

    /// Log directory
    pub log_dir: PathBuf,

    /// Log level
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ollama_base_url: "http://localhost:11434".to_string(),
            llm_model: "llama3.2:latest".to_string(),
            temperature: 0.3,
            top_p: 0.9,
            num_predict: 1000,
            stream: false,
            request_timeout_secs: 300,
            max_retries: 3,
            chunk_tokens: 2000,
            chunk_overlap: 200,
            log_dir: PathBuf::from("./log"),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `docrefine.toml` (if present),
    /// `.env` and `DOCREFINE_*` environment variables, in that order
    pub fn load() -> Result<Self, DocRefineError> {
        Self::load_from(None)
    }

    /// Same as [`AppConfig::load`], with an explicit config file that must exist
    pub fn load_from(path: Option<&Path>) -> Result<Self, DocRefineError> {
        // Load .env file (ignore if not exists)
        let _ = dotenv::dotenv();

        Self::load_with_env(path, std::env::vars().collect())
    }

    /// Layer defaults, the config file and `env` (instead of the process
    /// environment). Only `DOCREFINE_*` keys of `env` are read.
    pub fn load_with_env(path: Option<&Path>, env: HashMap<String, String>) -> Result<Self, DocRefineError> {
        let file_source = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(CONFIG_FILE_NAME).required(false),
        };

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(file_source)
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .try_parsing(true)
                    .source(Some(env)),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;

        Ok(config)
    }

    /// Get log file path
    pub fn get_log_path(&self, filename: &str) -> PathBuf {
        self.log_dir.join(filename)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), DocRefineError> {
        if self.llm_model.trim().is_empty() {
            return Err(DocRefineError::config("LLM model name cannot be empty"));
        }

        if !self.ollama_base_url.starts_with("http://")
            && !self.ollama_base_url.starts_with("https://") {
            return Err(DocRefineError::config(
                "Ollama base URL must start with http:// or https://"
            ));
        }

        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(DocRefineError::config(format!(
                "Temperature must be between 0.0 and 2.0, got {}",
                self.temperature
            )));
        }

        if self.chunk_tokens == 0 {
            return Err(DocRefineError::config("Chunk size cannot be 0"));
        }

        if self.chunk_overlap >= self.chunk_tokens {
            return Err(DocRefineError::config(format!(
                "Chunk overlap ({}) must be smaller than chunk size ({})",
                self.chunk_overlap, self.chunk_tokens
            )));
        }

        if self.max_retries == 0 {
            return Err(DocRefineError::config("max_retries must be at least 1"));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.ollama_base_url, "http://localhost:11434");
        assert_eq!(config.chunk_tokens, 2000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_get_log_path() {
        let config = AppConfig::default();
        assert_eq!(config.get_log_path("docrefine.log"), PathBuf::from("./log/docrefine.log"));
    }

    #[test]
    fn test_validate() {
        let mut invalid = AppConfig::default();
        invalid.llm_model = String::new();
        assert!(invalid.validate().is_err());

        let mut invalid = AppConfig::default();
        invalid.ollama_base_url = "localhost:11434".to_string();
        assert!(invalid.validate().is_err());

        let mut invalid = AppConfig::default();
        invalid.chunk_overlap = invalid.chunk_tokens;
        assert!(invalid.validate().is_err());

        let mut invalid = AppConfig::default();
        invalid.temperature = 3.5;
        assert!(invalid.validate().is_err());
    }

    fn env(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docrefine.toml");
        std::fs::write(&path, "llm_model = \"gemma2\"\nchunk_tokens = 500\nchunk_overlap = 50\n").unwrap();

        let config = AppConfig::load_with_env(Some(&path), HashMap::new()).unwrap();
        assert_eq!(config.llm_model, "gemma2");
        assert_eq!(config.chunk_tokens, 500);
        assert_eq!(config.chunk_overlap, 50);
        // untouched keys keep their defaults
        assert_eq!(config.max_retries, 3);
        assert!(!config.stream);
    }

    #[test]
    fn test_env_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docrefine.toml");
        std::fs::write(&path, "llm_model = \"gemma2\"\n").unwrap();

        let config = AppConfig::load_with_env(
            Some(&path),
            env(&[
                ("DOCREFINE_LLM_MODEL", "qwen2.5"),
                ("DOCREFINE_MAX_RETRIES", "5"),
                ("DOCREFINE_STREAM", "true"),
                ("OTHER_LLM_MODEL", "ignored"),
            ]),
        )
        .unwrap();
        assert_eq!(config.llm_model, "qwen2.5");
        assert_eq!(config.max_retries, 5);
        assert!(config.stream);
    }

    #[test]
    fn test_invalid_env_value_fails_validation() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("docrefine.toml");
        std::fs::write(&path, "").unwrap();

        let err = AppConfig::load_with_env(Some(&path), env(&[("DOCREFINE_TEMPERATURE", "3.5")])).unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn test_load_from_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("does-not-exist.toml");
        let err = AppConfig::load_with_env(Some(&path), HashMap::new()).unwrap_err();
        assert!(err.is_configuration());
    }
}
