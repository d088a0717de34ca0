//! Scripted in-process backend for workflow tests.
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use lektor_common::api::{ApiError, StatusCode};
use lektor_common::model::{
    AnalyzeRequest, AnalyzeResponse, ExtractRulesResponse, ExtractionInput, GuidelineContent,
    GuidelineSummary,
};

use crate::backend::ReviewBackend;
use crate::busy::Operation;

pub(crate) fn server_error(detail: &str) -> ApiError {
    ApiError::Upstream {
        status: StatusCode::INTERNAL_SERVER_ERROR,
        detail: detail.to_string(),
    }
}

pub(crate) fn bare_error() -> ApiError {
    ApiError::UpstreamBody {
        status: StatusCode::BAD_GATEWAY,
        body: "<html>bad gateway</html>".to_string(),
    }
}

#[derive(Default)]
pub(crate) struct FakeBackend {
    pub extract_responses: Mutex<VecDeque<Result<ExtractRulesResponse, ApiError>>>,
    pub analyze_responses: Mutex<VecDeque<Result<AnalyzeResponse, ApiError>>>,
    pub extract_inputs: Mutex<Vec<ExtractionInput>>,
    pub analyze_requests: Mutex<Vec<AnalyzeRequest>>,
    /// Stored guidelines as (summary, content).
    pub store: Mutex<Vec<(GuidelineSummary, String)>>,
    pub fail_list: AtomicBool,
    pub fail_save: AtomicBool,
    pub list_calls: AtomicUsize,
    pub save_calls: AtomicUsize,
    /// Calls of these operations park on `release` after signalling `entered`.
    pub gated: Mutex<Vec<Operation>>,
    pub entered: Notify,
    pub release: Notify,
}

impl FakeBackend {
    pub fn with_extraction(self, result: Result<ExtractRulesResponse, ApiError>) -> Self {
        self.extract_responses
            .lock()
            .expect("fake lock")
            .push_back(result);
        self
    }

    pub fn with_analysis(self, result: Result<AnalyzeResponse, ApiError>) -> Self {
        self.analyze_responses
            .lock()
            .expect("fake lock")
            .push_back(result);
        self
    }

    pub fn with_stored(self, id: &str, name: &str, content: &str) -> Self {
        self.store.lock().expect("fake lock").push((
            GuidelineSummary {
                id: id.to_string(),
                name: name.to_string(),
                filename: format!("{id}.yaml"),
                date: Some("2026-10-01".to_string()),
            },
            content.to_string(),
        ));
        self
    }

    pub fn gated(self, operation: Operation) -> Self {
        self.gated.lock().expect("fake lock").push(operation);
        self
    }

    async fn gate(&self, operation: Operation) {
        let held = self.gated.lock().expect("fake lock").contains(&operation);
        if held {
            self.entered.notify_one();
            self.release.notified().await;
        }
    }
}

pub(crate) fn rules(text: &str, journal: Option<&str>) -> ExtractRulesResponse {
    ExtractRulesResponse {
        rules: text.to_string(),
        journal_name: journal.map(str::to_string),
    }
}

#[async_trait]
impl ReviewBackend for FakeBackend {
    async fn extract_rules(
        &self,
        input: &ExtractionInput,
    ) -> Result<ExtractRulesResponse, ApiError> {
        self.extract_inputs
            .lock()
            .expect("fake lock")
            .push(input.clone());
        self.gate(Operation::Extract).await;
        self.extract_responses
            .lock()
            .expect("fake lock")
            .pop_front()
            .unwrap_or_else(|| Err(bare_error()))
    }

    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, ApiError> {
        self.analyze_requests
            .lock()
            .expect("fake lock")
            .push(request.clone());
        self.gate(Operation::Analyze).await;
        self.analyze_responses
            .lock()
            .expect("fake lock")
            .pop_front()
            .unwrap_or_else(|| Err(bare_error()))
    }

    async fn list_guidelines(&self) -> Result<Vec<GuidelineSummary>, ApiError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.gate(Operation::ListGuidelines).await;
        if self.fail_list.load(Ordering::SeqCst) {
            return Err(server_error("guideline store offline"));
        }
        Ok(self
            .store
            .lock()
            .expect("fake lock")
            .iter()
            .map(|(summary, _)| summary.clone())
            .collect())
    }

    async fn get_guideline(&self, filename: &str) -> Result<GuidelineContent, ApiError> {
        self.gate(Operation::LoadGuideline).await;
        self.store
            .lock()
            .expect("fake lock")
            .iter()
            .find(|(summary, _)| summary.filename == filename)
            .map(|(_, content)| GuidelineContent {
                content: content.clone(),
            })
            .ok_or_else(|| ApiError::Upstream {
                status: StatusCode::NOT_FOUND,
                detail: format!("no guideline named {filename}"),
            })
    }

    async fn save_guideline(&self, name: &str, content: &str) -> Result<(), ApiError> {
        let n = self.save_calls.fetch_add(1, Ordering::SeqCst) + 1;
        self.gate(Operation::SaveGuideline).await;
        if self.fail_save.load(Ordering::SeqCst) {
            return Err(bare_error());
        }
        self.store.lock().expect("fake lock").push((
            GuidelineSummary {
                id: format!("saved-{n}"),
                name: name.to_string(),
                filename: format!("saved-{n}.yaml"),
                date: Some("2026-10-17".to_string()),
            },
            content.to_string(),
        ));
        Ok(())
    }
}
