use schemars::JsonSchema;
use serde::Serialize;

use lektor_common::model::GuidelineSummary;

use crate::busy::BusyFlags;
use crate::criteria::{Criterion, ALL_CRITERIA};
use crate::state::{GuidelineSource, Stage, WorkflowState};

/// Read-only view of a session, shaped for a presentation layer.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct WorkflowSnapshot {
    pub stage: Stage,
    pub stage_number: u8,
    /// "text", "file" or absent.
    pub rules_source_kind: Option<String>,
    pub guideline_file: Option<String>,
    pub display_name: Option<String>,
    pub rules_yaml: String,
    pub criteria: CriteriaView,
    pub selected_criterion: String,
    pub analysis_label: String,
    pub language: String,
    pub available_languages: Vec<String>,
    pub target_document: Option<String>,
    pub report: String,
    pub busy: BusyFlags,
    pub saved_guidelines: Vec<GuidelineSummary>,
}

/// Criteria grouped the way the selection list shows them: sentinel, then
/// document-specific, then system criteria.
#[derive(Debug, Clone, Serialize, JsonSchema)]
pub struct CriteriaView {
    pub all: String,
    pub extracted: Vec<Criterion>,
    pub system: Vec<Criterion>,
    pub used_fallback: bool,
}

impl WorkflowSnapshot {
    pub fn capture(
        state: &WorkflowState,
        languages: &[String],
        saved_guidelines: Vec<GuidelineSummary>,
        repository_busy: BusyFlags,
    ) -> Self {
        let (rules_source_kind, guideline_file) = match state.guideline_source() {
            Some(GuidelineSource::Text(_)) => (Some("text".to_string()), None),
            Some(GuidelineSource::File(file)) => {
                (Some("file".to_string()), Some(file.name.clone()))
            }
            None => (None, None),
        };

        Self {
            stage: state.stage(),
            stage_number: state.stage().number(),
            rules_source_kind,
            guideline_file,
            display_name: state.rules().display_name.clone(),
            rules_yaml: state.rules().text.clone(),
            criteria: CriteriaView {
                all: ALL_CRITERIA.to_string(),
                extracted: state.criteria().extracted().cloned().collect(),
                system: state.criteria().system().cloned().collect(),
                used_fallback: state.criteria().used_fallback(),
            },
            selected_criterion: state.selected_criterion().to_string(),
            analysis_label: state.analysis_label(),
            language: state.language().to_string(),
            available_languages: languages.to_vec(),
            target_document: state.target_document().map(|d| d.name.clone()),
            report: state.report().to_string(),
            busy: state.busy().merged(repository_busy),
            saved_guidelines,
        }
    }
}
