/// Drives one review session.
///
/// The orchestrator exclusively owns the session's [`WorkflowState`]. Synchronous
/// transitions lock it briefly; asynchronous operations check-and-set their busy flag,
/// build the request under the lock, release it while awaiting the backend, and apply
/// the result under the lock again. The lock is never held across an await point.
///
/// A result is applied only if nothing it was built from changed while it was in flight;
/// otherwise it is discarded as superseded. Dropping an in-flight operation's future
/// cancels it: nothing is applied and the busy flag is released by its guard.
use std::sync::{Arc, Mutex};

use tracing::{info, warn};

use lektor_common::model::{DocumentFile, GuidelineSummary};

use crate::backend::ReviewBackend;
use crate::busy::{lock, InFlight, Operation};
use crate::config::WorkflowConfig;
use crate::error::WorkflowError;
use crate::repository::GuidelineRepository;
use crate::snapshot::WorkflowSnapshot;
use crate::state::{Stage, WorkflowState};

pub struct Orchestrator<B> {
    backend: Arc<B>,
    config: WorkflowConfig,
    state: Mutex<WorkflowState>,
    repository: GuidelineRepository<B>,
}

impl<B: ReviewBackend> Orchestrator<B> {
    pub fn new(backend: Arc<B>, config: WorkflowConfig) -> Self {
        let state = Mutex::new(WorkflowState::new(&config));
        let repository = GuidelineRepository::new(Arc::clone(&backend), config.messages.clone());
        Self {
            backend,
            config,
            state,
            repository,
        }
    }

    pub fn config(&self) -> &WorkflowConfig {
        &self.config
    }

    pub fn repository(&self) -> &GuidelineRepository<B> {
        &self.repository
    }

    pub fn snapshot(&self) -> WorkflowSnapshot {
        let saved = self.repository.cached();
        let repository_busy = self.repository.busy();
        let state = lock(&self.state);
        WorkflowSnapshot::capture(&state, &self.config.languages, saved, repository_busy)
    }

    /// Run `f` against the state under the lock.
    pub fn inspect<R>(&self, f: impl FnOnce(&WorkflowState) -> R) -> R {
        f(&lock(&self.state))
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut WorkflowState) -> R) -> R {
        f(&mut lock(&self.state))
    }

    // --- synchronous transitions ---

    pub fn set_rules_source(&self, text: String) -> Result<(), WorkflowError> {
        let chars = text.chars().count();
        self.with_state(|s| s.set_rules_source(text))?;
        info!(chars, "rules source updated");
        Ok(())
    }

    pub fn set_guideline_file(&self, file: DocumentFile) -> Result<(), WorkflowError> {
        let (name, bytes) = (file.name.clone(), file.len());
        self.with_state(|s| s.set_guideline_file(file))?;
        info!(file = %name, bytes, "guideline file selected");
        Ok(())
    }

    pub fn set_target_document(&self, document: Option<DocumentFile>) -> Result<(), WorkflowError> {
        let name = document.as_ref().map(|d| d.name.clone());
        let bytes = document.as_ref().map_or(0, DocumentFile::len);
        self.with_state(|s| s.set_target_document(document))?;
        info!(document = ?name, bytes, "target document updated");
        Ok(())
    }

    pub fn set_language(&self, language: &str) -> Result<(), WorkflowError> {
        self.with_state(|s| s.set_language(language, &self.config))?;
        info!(language = %language.trim(), "report language set");
        Ok(())
    }

    pub fn select_criterion(&self, name: &str) -> Result<(), WorkflowError> {
        self.with_state(|s| s.select_criterion(name))?;
        info!(criterion = %name, "criterion selected");
        Ok(())
    }

    pub fn edit_rules(&self, text: String) -> Result<(), WorkflowError> {
        let criteria = self.with_state(|s| {
            s.edit_rules(text, &self.config.catalog)?;
            Ok::<_, WorkflowError>(s.criteria().entries().len())
        })?;
        info!(criteria, "rules edited");
        Ok(())
    }

    pub fn skip_to_default(&self) -> Result<(), WorkflowError> {
        self.with_state(|s| s.skip_to_default(&self.config.catalog))?;
        info!("skipped extraction, using default rules");
        Ok(())
    }

    pub fn back(&self) -> Result<(), WorkflowError> {
        self.with_state(|s| s.back())?;
        info!("returned to rule definition");
        Ok(())
    }

    pub fn new_analysis(&self) -> Result<(), WorkflowError> {
        self.with_state(|s| s.new_analysis())?;
        info!("report closed, starting a new analysis");
        Ok(())
    }

    // --- asynchronous operations ---

    /// Send the rules source to the extraction service and enter stage 2 on success.
    pub async fn extract_rules(&self) -> Result<(), WorkflowError> {
        let _flight = InFlight::claim(&self.state, Operation::Extract)?;
        let (input, epoch) = self.with_state(|s| {
            let input = s.extraction_input()?;
            Ok::<_, WorkflowError>((input, s.source_epoch()))
        })?;
        info!(kind = input.kind(), "extracting rules");

        let response = match self.backend.extract_rules(&input).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "rule extraction failed");
                return Err(WorkflowError::from_api(
                    Operation::Extract,
                    &e,
                    &self.config.messages,
                ));
            }
        };

        self.with_state(|s| {
            s.apply_extraction(
                response.rules,
                response.journal_name,
                &self.config.catalog,
                epoch,
            )
        })
        .map_err(|e| superseded(Operation::Extract, e))?;
        let criteria = self.inspect(|s| s.criteria().entries().len());
        info!(criteria, "rules extracted");
        Ok(())
    }

    /// Send the paper for analysis and enter stage 3 with the report on success.
    pub async fn analyze_paper(&self) -> Result<(), WorkflowError> {
        let _flight = InFlight::claim(&self.state, Operation::Analyze)?;
        let (request, epoch) = self.with_state(|s| {
            let request = s.begin_analysis()?;
            Ok::<_, WorkflowError>((request, s.setup_epoch()))
        })?;
        info!(
            document = %request.document.name,
            criterion = %request.criterion,
            language = %request.language,
            "analyzing paper"
        );

        let response = match self.backend.analyze(&request).await {
            Ok(response) => response,
            Err(e) => {
                warn!(error = %e, "paper analysis failed");
                return Err(WorkflowError::from_api(
                    Operation::Analyze,
                    &e,
                    &self.config.messages,
                ));
            }
        };

        self.with_state(|s| s.apply_report(response.report, epoch))
            .map_err(|e| superseded(Operation::Analyze, e))?;
        info!("report ready");
        Ok(())
    }

    pub async fn list_guidelines(&self) -> Result<Vec<GuidelineSummary>, WorkflowError> {
        self.repository.list().await
    }

    /// Save the current rules text under `name`.
    pub async fn save_guideline(&self, name: &str) -> Result<(), WorkflowError> {
        let content = self.inspect(|s| s.rules().text.clone());
        self.repository.save(name, &content).await
    }

    /// Load a stored guideline, derive its criteria and enter stage 2.
    pub async fn load_guideline(&self, key: &str) -> Result<(), WorkflowError> {
        let stage = self.inspect(|s| s.stage());
        if stage == Stage::ReviewReport {
            return Err(WorkflowError::InvalidTransition {
                action: "load a guideline",
                stage,
            });
        }

        let loaded = self.repository.load(key).await?;
        let name = loaded.name.clone();
        self.with_state(|s| {
            s.apply_loaded_guideline(loaded.name, loaded.content, &self.config.catalog)
        })
        .map_err(|e| superseded(Operation::LoadGuideline, e))?;
        info!(name = %name, "guideline applied");
        Ok(())
    }
}

fn superseded(operation: Operation, err: WorkflowError) -> WorkflowError {
    match err {
        WorkflowError::InvalidTransition { stage, .. } => {
            warn!(%operation, stage = %stage, "discarding result, workflow moved on");
            WorkflowError::Superseded(operation)
        }
        WorkflowError::Superseded(_) => {
            warn!(%operation, "discarding result, session changed while it was in flight");
            WorkflowError::Superseded(operation)
        }
        other => other,
    }
}
