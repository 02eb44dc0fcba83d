use thiserror::Error;

/// Central error type for copipe pipelines
#[derive(Error, Debug)]
pub enum CopipeError {
    // ============================================================================
    // Stage Lifecycle Errors
    // ============================================================================
    #[error("Stage '{stage}' is closed and cannot accept items")]
    ClosedStage { stage: String },

    #[error("Stage '{stage}' received an item while already processing one (cycle in topology)")]
    ReentrantSend { stage: String },

    #[error("Stage '{stage}' failed: {message}")]
    Stage { stage: String, message: String },

    // ============================================================================
    // Record Assembly Errors
    // ============================================================================
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    // ============================================================================
    // Fan-out Errors
    // ============================================================================
    #[error("Fan-out delivery failed for {} target(s): {}", .failures.len(), describe_failures(.failures))]
    FanOut { failures: Vec<(String, String)> },

    // ============================================================================
    // Source Errors
    // ============================================================================
    #[error("Markup error: {0}")]
    Markup(String),

    // ============================================================================
    // Generic/System Errors
    // ============================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Builder pattern validation error
    #[error("Builder error: {0}")]
    BuilderError(String),
}

impl CopipeError {
    /// Failure raised from inside a stage's own logic
    pub fn stage(stage: impl Into<String>, message: impl Into<String>) -> Self {
        CopipeError::Stage {
            stage: stage.into(),
            message: message.into(),
        }
    }
}

fn describe_failures(failures: &[(String, String)]) -> String {
    failures
        .iter()
        .map(|(target, message)| format!("{} ({})", target, message))
        .collect::<Vec<_>>()
        .join(", ")
}

impl From<quick_xml::Error> for CopipeError {
    fn from(err: quick_xml::Error) -> Self {
        CopipeError::Markup(err.to_string())
    }
}

// Helper type alias for Results
pub type CopipeResult<T> = Result<T, CopipeError>;
