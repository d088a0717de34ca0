use std::fmt;
use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Deserializer, Serialize};

use crate::error::CommonError;

/// A file picked by the user: either the paper under review or a guideline source
/// document handed to the extraction service.
#[derive(Clone, PartialEq, Eq)]
pub struct DocumentFile {
    /// File name as sent in the multipart part, e.g. "paper.pdf"
    pub name: String,
    /// MIME type guessed from the file extension
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl DocumentFile {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let name = name.into();
        let content_type = content_type_for(&name).to_string();
        Self {
            name,
            content_type,
            bytes,
        }
    }

    /// Read a document from disk. Empty files are rejected; the services downstream
    /// cannot do anything useful with them.
    pub async fn from_path(path: &Path) -> Result<Self, CommonError> {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| CommonError::MissingFileName(path.display().to_string()))?;
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|source| CommonError::DocumentRead {
                path: path.display().to_string(),
                source,
            })?;
        if bytes.is_empty() {
            return Err(CommonError::EmptyDocument(path.display().to_string()));
        }
        Ok(Self::new(name, bytes))
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Debug for DocumentFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentFile")
            .field("name", &self.name)
            .field("content_type", &self.content_type)
            .field("len", &self.len())
            .finish()
    }
}

fn content_type_for(name: &str) -> &'static str {
    let ext = Path::new(name)
        .extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "pdf" => "application/pdf",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "txt" | "md" | "yaml" | "yml" => "text/plain",
        _ => "application/octet-stream",
    }
}

/// Source handed to `POST /extract-rules`. Exactly one of the two is ever sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExtractionInput {
    Text(String),
    File(DocumentFile),
}

impl ExtractionInput {
    /// Value of the `type` discriminator field.
    pub fn kind(&self) -> &'static str {
        match self {
            ExtractionInput::Text(_) => "text",
            ExtractionInput::File(_) => "file",
        }
    }
}

/// Fields of a `POST /analyze` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalyzeRequest {
    pub document: DocumentFile,
    pub rules_yaml: String,
    /// Criterion name, or the "All criteria" sentinel verbatim.
    pub criterion: String,
    pub language: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ExtractRulesResponse {
    pub rules: String,
    #[serde(default)]
    pub journal_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeResponse {
    pub report: String,
}

/// One entry of `GET /guidelines`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct GuidelineSummary {
    #[serde(deserialize_with = "string_or_number")]
    #[schemars(with = "String")]
    pub id: String,
    pub name: String,
    pub filename: String,
    #[serde(default)]
    pub date: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GuidelineContent {
    pub content: String,
}

/// Error envelope of the review API. `detail` is usually a string, but request
/// validation failures carry a structured array instead.
#[derive(Debug, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: Option<serde_json::Value>,
}

impl ErrorBody {
    pub fn message(&self) -> Option<String> {
        match &self.detail {
            Some(serde_json::Value::String(s)) if !s.trim().is_empty() => Some(s.trim().to_string()),
            _ => None,
        }
    }
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(s) => Ok(s),
        serde_json::Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {other}"
        ))),
    }
}
