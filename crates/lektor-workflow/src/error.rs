use lektor_common::api::ApiError;
use lektor_common::error::CommonError;

use crate::busy::Operation;
use crate::config::FallbackMessages;
use crate::state::Stage;

#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// A transition precondition is unmet. Nothing was sent and nothing changed.
    #[error("{0}")]
    Validation(String),

    #[error("cannot {action} while in stage {stage}")]
    InvalidTransition { action: &'static str, stage: Stage },

    /// The backend call failed. `message` is the server's detail or a generic fallback.
    #[error("{operation} failed: {message}")]
    Transport { operation: Operation, message: String },

    /// The same operation is already in flight; the call was a no-op.
    #[error("{0} is already in progress")]
    Busy(Operation),

    /// The workflow moved on while the request was in flight; its result was discarded.
    #[error("{0} result discarded: the workflow moved to another stage")]
    Superseded(Operation),

    #[error("config error: {0}")]
    Config(String),

    #[error(transparent)]
    Common(#[from] CommonError),
}

impl WorkflowError {
    /// Transport error carrying the server's detail, or the configured generic message.
    pub fn from_api(operation: Operation, err: &ApiError, messages: &FallbackMessages) -> Self {
        let message = err
            .detail()
            .map(str::to_string)
            .unwrap_or_else(|| messages.for_operation(operation).to_string());
        WorkflowError::Transport { operation, message }
    }
}
