use thiserror::Error;

/// Failures detected before the orchestration loop starts. Reported
/// immediately, never retried.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum PreconditionError {
    #[error("no dataset loaded")]
    NoDatasetLoaded,
    #[error("question cannot be empty")]
    EmptyQuestion,
}

/// Error taxonomy at the orchestrator boundary. Tool-level and forecasting
/// failures never surface here; they resolve to textual tool results so the
/// loop can keep going.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum AgentError {
    #[error(transparent)]
    Precondition(#[from] PreconditionError),
    #[error("generation backend error: {0}")]
    Backend(String),
    #[error("guardrail violation ({category}): {message}")]
    Guardrail { category: String, message: String },
    #[error("internal error: {0}")]
    Internal(String),
}

impl AgentError {
    /// Bounded, user-safe rendering. The full error is for logs; this is what
    /// goes back in the answer payload.
    pub fn user_message(&self) -> String {
        match self {
            Self::Precondition(PreconditionError::NoDatasetLoaded) => {
                "No dataset loaded. Please upload data first.".to_string()
            }
            Self::Precondition(PreconditionError::EmptyQuestion) => {
                "Question required".to_string()
            }
            Self::Backend(detail) => format!("Error: {detail}"),
            Self::Guardrail { message, .. } => message.clone(),
            Self::Internal(_) => "An unexpected internal error occurred.".to_string(),
        }
    }
}
