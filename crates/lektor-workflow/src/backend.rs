use async_trait::async_trait;

use lektor_common::api::{ApiError, ReviewApiClient};
use lektor_common::model::{
    AnalyzeRequest, AnalyzeResponse, ExtractRulesResponse, ExtractionInput, GuidelineContent,
    GuidelineSummary,
};

/// The external services the workflow talks to: rule extraction, paper analysis and the
/// guideline store. [`ReviewApiClient`] is the HTTP implementation.
#[async_trait]
pub trait ReviewBackend: Send + Sync {
    async fn extract_rules(&self, input: &ExtractionInput)
        -> Result<ExtractRulesResponse, ApiError>;

    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, ApiError>;

    async fn list_guidelines(&self) -> Result<Vec<GuidelineSummary>, ApiError>;

    async fn get_guideline(&self, filename: &str) -> Result<GuidelineContent, ApiError>;

    async fn save_guideline(&self, name: &str, content: &str) -> Result<(), ApiError>;
}

#[async_trait]
impl ReviewBackend for ReviewApiClient {
    async fn extract_rules(
        &self,
        input: &ExtractionInput,
    ) -> Result<ExtractRulesResponse, ApiError> {
        ReviewApiClient::extract_rules(self, input).await
    }

    async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, ApiError> {
        ReviewApiClient::analyze(self, request).await
    }

    async fn list_guidelines(&self) -> Result<Vec<GuidelineSummary>, ApiError> {
        ReviewApiClient::list_guidelines(self).await
    }

    async fn get_guideline(&self, filename: &str) -> Result<GuidelineContent, ApiError> {
        ReviewApiClient::get_guideline(self, filename).await
    }

    async fn save_guideline(&self, name: &str, content: &str) -> Result<(), ApiError> {
        ReviewApiClient::save_guideline(self, name, content).await
    }
}
