/// Error types shared across the lektor crates.
///
/// These cover local document handling that both the workflow core and the MCP surface
/// rely on. HTTP failures live in [`crate::api::ApiError`]; workflow-level errors are
/// defined in `lektor-workflow` and wrap `CommonError` via `#[from]`.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("failed to read document {path}: {source}")]
    DocumentRead {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("document path has no file name: {0}")]
    MissingFileName(String),

    #[error("document is empty: {0}")]
    EmptyDocument(String),
}
