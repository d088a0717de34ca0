use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::model::GuidelineSummary;

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SetRulesSourceParams {
    /// Free-text journal guidelines (or a URL the extraction service can fetch).
    pub text: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SetGuidelineFileParams {
    /// Path of a guideline document (PDF, DOCX or text) on the local filesystem.
    pub path: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct EditRulesParams {
    /// Complete replacement for the current YAML rules text.
    pub rules_yaml: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SelectCriterionParams {
    /// Criterion name exactly as listed in `workflow_status`, or "All criteria".
    pub criterion: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SetLanguageParams {
    /// Report language code, e.g. "hu", "en" or "de".
    pub language: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SetTargetDocumentParams {
    /// Path of the paper to review. Omit to clear the current selection.
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct SaveGuidelineParams {
    /// Name to store the current rules under.
    pub name: String,
}

#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct LoadGuidelineParams {
    /// Guideline id or filename as returned by `list_guidelines`.
    pub id: String,
}

#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct GuidelineListResponse {
    pub guidelines: Vec<GuidelineSummary>,
    /// Set when the refresh failed and `guidelines` is the previously cached list.
    pub warning: Option<String>,
}
