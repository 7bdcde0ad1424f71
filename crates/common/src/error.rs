/// DocRefine error types
#[derive(Debug, thiserror::Error)]
pub enum DocRefineError {
    /// Chain or application configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Prompt template parse or format error
    #[error("Template error: {0}")]
    Template(String),

    /// Language model call failed
    #[error("LLM error: {0}")]
    Llm(String),

    /// Network/HTTP error
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// A refine run was started without any documents
    #[error("Invalid input: at least one document is required")]
    EmptyDocuments,

    /// A refine run was cancelled before it finished
    #[error("Refine run cancelled")]
    Cancelled,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// General error (anyhow integration)
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl DocRefineError {
    /// Create config error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Create template error
    pub fn template<S: Into<String>>(msg: S) -> Self {
        Self::Template(msg.into())
    }

    /// Create LLM error
    pub fn llm<S: Into<String>>(msg: S) -> Self {
        Self::Llm(msg.into())
    }

    /// Create network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create invalid input error
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Whether the error was raised while validating a chain or config,
    /// before any model call could happen
    pub fn is_configuration(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

impl From<config::ConfigError> for DocRefineError {
    fn from(err: config::ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}
