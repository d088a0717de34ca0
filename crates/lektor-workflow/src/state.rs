/// The three-stage review workflow: define rules, configure the analysis, review the report.
///
/// `WorkflowState` is a plain owned record. Every transition validates its preconditions
/// first and only then mutates, so a refused transition leaves the state exactly as it was.
///
/// Two counters track what an in-flight request was built from. The source epoch moves
/// whenever the rules source or the stage changes; the setup epoch moves whenever the
/// rules, selection, target document, language or stage change. A result is applied only
/// if the counter it was requested under has not moved.
use std::fmt;

use schemars::JsonSchema;
use serde::Serialize;
use tracing::debug;

use lektor_common::model::{AnalyzeRequest, DocumentFile, ExtractionInput};

use crate::busy::{BusyFlags, Operation, Tracked};
use crate::config::{CriteriaCatalog, WorkflowConfig};
use crate::criteria::{CriterionSet, ALL_CRITERIA};
use crate::error::WorkflowError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DefineRules,
    ConfigureAnalysis,
    ReviewReport,
}

impl Stage {
    pub fn number(self) -> u8 {
        match self {
            Stage::DefineRules => 1,
            Stage::ConfigureAnalysis => 2,
            Stage::ReviewReport => 3,
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::DefineRules => "define rules",
            Stage::ConfigureAnalysis => "configure analysis",
            Stage::ReviewReport => "review report",
        };
        write!(f, "{} ({name})", self.number())
    }
}

/// Rules text plus the journal it belongs to. Always replaced as a whole.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RulesDocument {
    pub text: String,
    pub display_name: Option<String>,
}

impl RulesDocument {
    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Where the rules come from. Text and file are mutually exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuidelineSource {
    Text(String),
    File(DocumentFile),
}

#[derive(Debug, Clone)]
pub struct WorkflowState {
    stage: Stage,
    target_document: Option<DocumentFile>,
    guideline_source: Option<GuidelineSource>,
    rules: RulesDocument,
    criteria: CriterionSet,
    selected_criterion: String,
    report: String,
    language: String,
    busy: BusyFlags,
    source_epoch: u64,
    setup_epoch: u64,
}

impl Tracked for WorkflowState {
    fn busy_mut(&mut self) -> &mut BusyFlags {
        &mut self.busy
    }
}

impl WorkflowState {
    pub fn new(config: &WorkflowConfig) -> Self {
        Self {
            stage: Stage::DefineRules,
            target_document: None,
            guideline_source: None,
            rules: RulesDocument::default(),
            criteria: CriterionSet::default(),
            selected_criterion: ALL_CRITERIA.to_string(),
            report: String::new(),
            language: config.default_language.clone(),
            busy: BusyFlags::default(),
            source_epoch: 0,
            setup_epoch: 0,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn target_document(&self) -> Option<&DocumentFile> {
        self.target_document.as_ref()
    }

    pub fn guideline_source(&self) -> Option<&GuidelineSource> {
        self.guideline_source.as_ref()
    }

    pub fn rules(&self) -> &RulesDocument {
        &self.rules
    }

    pub fn criteria(&self) -> &CriterionSet {
        &self.criteria
    }

    pub fn selected_criterion(&self) -> &str {
        &self.selected_criterion
    }

    pub fn report(&self) -> &str {
        &self.report
    }

    pub fn language(&self) -> &str {
        &self.language
    }

    /// Extraction and analysis flags. The guideline store flags live in the repository.
    pub fn busy(&self) -> BusyFlags {
        self.busy
    }

    pub fn source_epoch(&self) -> u64 {
        self.source_epoch
    }

    pub fn setup_epoch(&self) -> u64 {
        self.setup_epoch
    }

    /// Caption of the run button: a full review for the sentinel, otherwise the criterion.
    pub fn analysis_label(&self) -> String {
        if self.selected_criterion == ALL_CRITERIA {
            "Full review".to_string()
        } else {
            format!("Analysis: {}", self.selected_criterion)
        }
    }

    // --- stage 1 input ---

    /// Replace the free-text rules source. Clears any guideline file; blank text clears both.
    pub fn set_rules_source(&mut self, text: String) -> Result<(), WorkflowError> {
        self.require(Stage::DefineRules, "edit the rules source")?;
        self.guideline_source = if text.trim().is_empty() {
            None
        } else {
            Some(GuidelineSource::Text(text))
        };
        self.source_epoch += 1;
        Ok(())
    }

    /// Use an uploaded guideline document as the rules source. Clears any free text.
    pub fn set_guideline_file(&mut self, file: DocumentFile) -> Result<(), WorkflowError> {
        self.require(Stage::DefineRules, "choose a guideline file")?;
        if file.is_empty() {
            return Err(WorkflowError::Validation(format!(
                "guideline file {} is empty",
                file.name
            )));
        }
        self.guideline_source = Some(GuidelineSource::File(file));
        self.source_epoch += 1;
        Ok(())
    }

    /// Request payload for rule extraction. Only valid in stage 1 with a source present.
    pub fn extraction_input(&self) -> Result<ExtractionInput, WorkflowError> {
        self.require(Stage::DefineRules, "extract rules")?;
        match &self.guideline_source {
            Some(GuidelineSource::Text(text)) => Ok(ExtractionInput::Text(text.clone())),
            Some(GuidelineSource::File(file)) => Ok(ExtractionInput::File(file.clone())),
            None => Err(WorkflowError::Validation(
                "enter the journal guidelines or choose a guideline file first".to_string(),
            )),
        }
    }

    /// 1 → 2 after a successful extraction requested under `source_epoch`.
    pub fn apply_extraction(
        &mut self,
        rules: String,
        journal_name: Option<String>,
        catalog: &CriteriaCatalog,
        source_epoch: u64,
    ) -> Result<(), WorkflowError> {
        if source_epoch != self.source_epoch {
            return Err(WorkflowError::Superseded(Operation::Extract));
        }
        self.require(Stage::DefineRules, "apply extracted rules")?;
        let display_name = journal_name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| catalog.default_display_name.clone());
        self.enter_configure(
            RulesDocument {
                text: rules,
                display_name: Some(display_name),
            },
            catalog,
        );
        Ok(())
    }

    /// 1 → 2 without extraction, using the placeholder rules.
    pub fn skip_to_default(&mut self, catalog: &CriteriaCatalog) -> Result<(), WorkflowError> {
        self.require(Stage::DefineRules, "skip to the default rules")?;
        self.enter_configure(
            RulesDocument {
                text: catalog.placeholder_rules.clone(),
                display_name: Some(catalog.default_display_name.clone()),
            },
            catalog,
        );
        Ok(())
    }

    /// 1|2 → 2 with a guideline loaded from the store.
    pub fn apply_loaded_guideline(
        &mut self,
        name: String,
        content: String,
        catalog: &CriteriaCatalog,
    ) -> Result<(), WorkflowError> {
        if self.stage == Stage::ReviewReport {
            return Err(WorkflowError::InvalidTransition {
                action: "load a guideline",
                stage: self.stage,
            });
        }
        self.enter_configure(
            RulesDocument {
                text: content,
                display_name: Some(name),
            },
            catalog,
        );
        Ok(())
    }

    // --- stage 2 ---

    pub fn set_target_document(
        &mut self,
        document: Option<DocumentFile>,
    ) -> Result<(), WorkflowError> {
        if self.stage == Stage::ReviewReport {
            return Err(WorkflowError::InvalidTransition {
                action: "change the target document",
                stage: self.stage,
            });
        }
        if let Some(doc) = &document {
            if doc.is_empty() {
                return Err(WorkflowError::Validation(format!(
                    "document {} is empty",
                    doc.name
                )));
            }
        }
        self.target_document = document;
        self.setup_epoch += 1;
        Ok(())
    }

    pub fn set_language(
        &mut self,
        language: &str,
        config: &WorkflowConfig,
    ) -> Result<(), WorkflowError> {
        if self.stage == Stage::ReviewReport {
            return Err(WorkflowError::InvalidTransition {
                action: "change the report language",
                stage: self.stage,
            });
        }
        let language = language.trim();
        if !config.supports_language(language) {
            return Err(WorkflowError::Validation(format!(
                "unsupported report language {language:?}; expected one of {:?}",
                config.languages
            )));
        }
        self.language = language.to_string();
        self.setup_epoch += 1;
        Ok(())
    }

    pub fn select_criterion(&mut self, name: &str) -> Result<(), WorkflowError> {
        self.require(Stage::ConfigureAnalysis, "select a criterion")?;
        if !self.criteria.contains(name) {
            return Err(WorkflowError::Validation(format!(
                "unknown criterion {name:?}"
            )));
        }
        self.selected_criterion = name.to_string();
        self.setup_epoch += 1;
        Ok(())
    }

    /// Manual edit of the rules text. Criteria are re-derived on every edit.
    pub fn edit_rules(
        &mut self,
        text: String,
        catalog: &CriteriaCatalog,
    ) -> Result<(), WorkflowError> {
        self.require(Stage::ConfigureAnalysis, "edit the rules")?;
        self.rules = RulesDocument {
            text,
            display_name: self.rules.display_name.take(),
        };
        self.criteria = CriterionSet::derive(&self.rules.text, catalog);
        self.repair_selection();
        self.setup_epoch += 1;
        Ok(())
    }

    /// 2 → 1. Rules, source and target document are kept for further editing.
    pub fn back(&mut self) -> Result<(), WorkflowError> {
        self.require(Stage::ConfigureAnalysis, "go back")?;
        self.set_stage(Stage::DefineRules);
        Ok(())
    }

    /// Validate stage 2 preconditions, drop any stale report and build the request.
    pub fn begin_analysis(&mut self) -> Result<AnalyzeRequest, WorkflowError> {
        self.require(Stage::ConfigureAnalysis, "analyze the paper")?;
        let document = self.target_document.clone().ok_or_else(|| {
            WorkflowError::Validation("choose the paper to analyze first".to_string())
        })?;
        if self.rules.is_empty() {
            return Err(WorkflowError::Validation(
                "the rules document is empty".to_string(),
            ));
        }

        self.repair_selection();
        self.report.clear();
        Ok(AnalyzeRequest {
            document,
            rules_yaml: self.rules.text.clone(),
            criterion: self.selected_criterion.clone(),
            language: self.language.clone(),
        })
    }

    /// 2 → 3 with the report for a request built under `setup_epoch`.
    pub fn apply_report(
        &mut self,
        report: String,
        setup_epoch: u64,
    ) -> Result<(), WorkflowError> {
        if setup_epoch != self.setup_epoch {
            return Err(WorkflowError::Superseded(Operation::Analyze));
        }
        self.require(Stage::ConfigureAnalysis, "show the report")?;
        self.report = report;
        self.set_stage(Stage::ReviewReport);
        Ok(())
    }

    // --- stage 3 ---

    /// 3 → 1. Clears the report and target document; the rules stay.
    pub fn new_analysis(&mut self) -> Result<(), WorkflowError> {
        self.require(Stage::ReviewReport, "start a new analysis")?;
        self.report.clear();
        self.target_document = None;
        self.set_stage(Stage::DefineRules);
        Ok(())
    }

    /// Fall back to the sentinel when the selected name left the criterion set.
    pub fn repair_selection(&mut self) {
        if !self.criteria.contains(&self.selected_criterion) {
            debug!(
                previous = %self.selected_criterion,
                "selected criterion no longer offered, falling back to all criteria"
            );
            self.selected_criterion = ALL_CRITERIA.to_string();
        }
    }

    fn enter_configure(&mut self, rules: RulesDocument, catalog: &CriteriaCatalog) {
        self.criteria = CriterionSet::derive(&rules.text, catalog);
        self.rules = rules;
        self.selected_criterion = ALL_CRITERIA.to_string();
        self.set_stage(Stage::ConfigureAnalysis);
    }

    fn set_stage(&mut self, stage: Stage) {
        self.stage = stage;
        self.source_epoch += 1;
        self.setup_epoch += 1;
    }

    fn require(&self, stage: Stage, action: &'static str) -> Result<(), WorkflowError> {
        if self.stage != stage {
            return Err(WorkflowError::InvalidTransition {
                action,
                stage: self.stage,
            });
        }
        Ok(())
    }
}
