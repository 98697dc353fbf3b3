use thiserror::Error;

/// Errors that prevent a run from starting or finishing as a whole.
/// These propagate to the process boundary; no per-object work continues
/// after one of them is raised.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("listing container {container} failed: {details}")]
    Listing { container: String, details: String },

    #[error("checkpoint unreadable: {0}")]
    CheckpointLoad(std::io::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Errors scoped to a single object. The runner contains these at the
/// per-object loop iteration; the object stays out of the checkpoint set
/// and is retried by the next run.
#[derive(Debug, Error)]
pub enum ObjectError {
    #[error("credential issuance failed: {0}")]
    Credential(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("analysis service reported failure: {message}")]
    AnalysisFailed { message: String },

    #[error("analysis did not reach a terminal state within {timeout_secs}s")]
    AnalysisTimeout { timeout_secs: u64 },

    #[error("malformed response from analysis service: {details}")]
    MalformedResponse { details: String },

    #[error("result output failed: {0}")]
    Sink(std::io::Error),

    #[error("checkpoint append failed after successful analysis: {0}")]
    Checkpoint(std::io::Error),
}

impl ObjectError {
    /// Stable kind label used in logs and run summaries so operators can
    /// tell a retryable analysis failure from a checkpoint write that
    /// dropped an analysis that actually succeeded.
    pub fn kind(&self) -> &'static str {
        match self {
            ObjectError::Credential(_) => "credential",
            ObjectError::Transport(_) => "transport",
            ObjectError::AnalysisFailed { .. } => "analysis-failed",
            ObjectError::AnalysisTimeout { .. } => "analysis-timeout",
            ObjectError::MalformedResponse { .. } => "malformed-response",
            ObjectError::Sink(_) => "sink",
            ObjectError::Checkpoint(_) => "checkpoint",
        }
    }
}

impl From<reqwest::Error> for ObjectError {
    fn from(error: reqwest::Error) -> Self {
        ObjectError::Transport(error.to_string())
    }
}

pub type Result<T, E = RunError> = std::result::Result<T, E>;
