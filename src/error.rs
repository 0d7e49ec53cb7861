use thiserror::Error;

pub type Result<T> = std::result::Result<T, ChatError>;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("tool `{0}` not found")]
    ToolNotFound(String),

    #[error("tool `{0}` is already registered")]
    DuplicateTool(String),

    #[error("tool `{name}` invocation failed: {source}")]
    ToolInvocation {
        name: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Transient failure reaching the hosted model. The client retries these
    /// internally; surfacing here means the retry budget is exhausted.
    #[error("language model unavailable: {0}")]
    ModelUnavailable(String),

    #[error("language model error: {0}")]
    LanguageModel(String),

    #[error("model kept requesting tools after {rounds} rounds")]
    ToolLoopExceeded { rounds: usize },

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
