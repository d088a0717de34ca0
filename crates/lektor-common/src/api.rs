use std::time::{Duration, SystemTime, UNIX_EPOCH};

use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::Url;
use serde::Deserialize;
use tracing::{debug, warn};

pub use reqwest::StatusCode;

use crate::model::{
    AnalyzeRequest, AnalyzeResponse, DocumentFile, ErrorBody, ExtractRulesResponse,
    ExtractionInput, GuidelineContent, GuidelineSummary,
};

#[derive(Clone, Debug)]
pub struct ReviewApiConfig {
    pub base_url: String,
    pub timeout: Duration,
    /// Retries for idempotent GETs only. POSTs are sent exactly once.
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub max_error_body_bytes: usize,
}

impl Default for ReviewApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
            timeout: Duration::from_secs(300),
            max_retries: 2,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_millis(5_000),
            max_error_body_bytes: 8 * 1024,
        }
    }
}

impl ReviewApiConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let base_url = std::env::var("LEKTOR_API_URL").unwrap_or(defaults.base_url);

        let timeout = std::env::var("LEKTOR_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);

        let max_retries = std::env::var("LEKTOR_MAX_RETRIES")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(defaults.max_retries);

        let initial_backoff = std::env::var("LEKTOR_RETRY_INITIAL_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.initial_backoff);

        let max_backoff = std::env::var("LEKTOR_RETRY_MAX_MS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_millis)
            .unwrap_or(defaults.max_backoff);

        let max_error_body_bytes = std::env::var("LEKTOR_MAX_ERROR_BODY_BYTES")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(defaults.max_error_body_bytes);

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
            max_retries,
            initial_backoff,
            max_backoff,
            max_error_body_bytes,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("invalid response JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    #[error("invalid request URL: {0}")]
    InvalidUrl(String),

    #[error("server returned error: status={status} detail={detail}")]
    Upstream { status: StatusCode, detail: String },

    #[error("server returned error without detail: status={status} body={body}")]
    UpstreamBody { status: StatusCode, body: String },
}

impl ApiError {
    /// Human-readable message supplied by the server, if it sent one.
    pub fn detail(&self) -> Option<&str> {
        match self {
            ApiError::Upstream { detail, .. } => Some(detail),
            _ => None,
        }
    }
}

/// HTTP client for the review backend (rule extraction, paper analysis, guideline store).
#[derive(Clone)]
pub struct ReviewApiClient {
    config: ReviewApiConfig,
    http: reqwest::Client,
}

impl ReviewApiClient {
    pub fn new(config: ReviewApiConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .user_agent("lektor/workflow")
            .build()?;
        Ok(Self { config, http })
    }

    pub fn config(&self) -> &ReviewApiConfig {
        &self.config
    }

    /// `POST /extract-rules`
    pub async fn extract_rules(
        &self,
        input: &ExtractionInput,
    ) -> Result<ExtractRulesResponse, ApiError> {
        let url = self.endpoint(&["extract-rules"])?;
        let form = Form::new().text("type", input.kind());
        let form = match input {
            ExtractionInput::Text(source) => form.text("source", source.clone()),
            ExtractionInput::File(file) => form.part("file", file_part(file)?),
        };
        debug!(kind = input.kind(), "sending extraction request");
        let resp = self
            .http
            .post(url)
            .timeout(self.config.timeout)
            .multipart(form)
            .send()
            .await?;
        Self::parse_json_response(resp, self.config.max_error_body_bytes).await
    }

    /// `POST /analyze`
    pub async fn analyze(&self, request: &AnalyzeRequest) -> Result<AnalyzeResponse, ApiError> {
        let url = self.endpoint(&["analyze"])?;
        let form = Form::new()
            .part("file", file_part(&request.document)?)
            .text("rules_yaml", request.rules_yaml.clone())
            .text("criterion", request.criterion.clone())
            .text("language", request.language.clone());
        debug!(
            document = %request.document.name,
            criterion = %request.criterion,
            language = %request.language,
            "sending analysis request"
        );
        let resp = self
            .http
            .post(url)
            .timeout(self.config.timeout)
            .multipart(form)
            .send()
            .await?;
        Self::parse_json_response(resp, self.config.max_error_body_bytes).await
    }

    /// `GET /guidelines`
    pub async fn list_guidelines(&self) -> Result<Vec<GuidelineSummary>, ApiError> {
        let url = self.endpoint(&["guidelines"])?;
        self.request_with_retry(|| {
            let url = url.clone();
            async move {
                let resp = self
                    .http
                    .get(url)
                    .timeout(self.config.timeout)
                    .send()
                    .await?;
                Self::parse_json_response(resp, self.config.max_error_body_bytes).await
            }
        })
        .await
    }

    /// `GET /guideline/{filename}`
    pub async fn get_guideline(&self, filename: &str) -> Result<GuidelineContent, ApiError> {
        let url = self.endpoint(&["guideline", filename])?;
        self.request_with_retry(|| {
            let url = url.clone();
            async move {
                let resp = self
                    .http
                    .get(url)
                    .timeout(self.config.timeout)
                    .send()
                    .await?;
                Self::parse_json_response(resp, self.config.max_error_body_bytes).await
            }
        })
        .await
    }

    /// `POST /save-guideline`. The response body carries nothing the client needs.
    pub async fn save_guideline(&self, name: &str, content: &str) -> Result<(), ApiError> {
        let url = self.endpoint(&["save-guideline"])?;
        let form = Form::new()
            .text("name", name.to_string())
            .text("content", content.to_string());
        let resp = self
            .http
            .post(url)
            .timeout(self.config.timeout)
            .multipart(form)
            .send()
            .await?;
        if resp.status().is_success() {
            return Ok(());
        }
        Err(Self::to_upstream_error(resp, self.config.max_error_body_bytes).await)
    }

    /// Join path segments onto the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = Url::parse(&self.config.base_url)
            .map_err(|e| ApiError::InvalidUrl(format!("{}: {e}", self.config.base_url)))?;
        url.path_segments_mut()
            .map_err(|_| ApiError::InvalidUrl(format!("{} cannot be a base", self.config.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn parse_json_response<T: for<'de> Deserialize<'de>>(
        resp: reqwest::Response,
        max_error_body_bytes: usize,
    ) -> Result<T, ApiError> {
        if resp.status().is_success() {
            let body = resp.bytes().await?;
            let json = serde_json::from_slice::<T>(&body)?;
            return Ok(json);
        }
        Err(Self::to_upstream_error(resp, max_error_body_bytes).await)
    }

    async fn to_upstream_error(resp: reqwest::Response, max_error_body_bytes: usize) -> ApiError {
        let status = resp.status();
        let body = read_limited_text(resp, max_error_body_bytes).await;
        if let Some(detail) = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|parsed| parsed.message())
        {
            return ApiError::Upstream { status, detail };
        }
        ApiError::UpstreamBody { status, body }
    }

    async fn request_with_retry<T, Fut, F>(&self, mut f: F) -> Result<T, ApiError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ApiError>>,
    {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(v) => return Ok(v),
                Err(e) => {
                    if attempt > self.config.max_retries || !should_retry(&e) {
                        return Err(e);
                    }
                    let delay = backoff_delay(
                        self.config.initial_backoff,
                        self.config.max_backoff,
                        attempt - 1,
                    );
                    warn!(
                        attempt,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "review api request failed, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}

fn file_part(file: &DocumentFile) -> Result<Part, ApiError> {
    Ok(Part::bytes(file.bytes.clone())
        .file_name(file.name.clone())
        .mime_str(&file.content_type)?)
}

fn should_retry(err: &ApiError) -> bool {
    match err {
        ApiError::Request(e) => e.is_timeout() || e.is_connect(),
        ApiError::Upstream { status, .. } | ApiError::UpstreamBody { status, .. } => {
            *status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
        }
        ApiError::InvalidJson(_) | ApiError::InvalidUrl(_) => false,
    }
}

fn backoff_delay(initial: Duration, max: Duration, exponent: u32) -> Duration {
    let mult = 1u128.checked_shl(exponent).unwrap_or(u128::MAX);
    let base_ms = initial.as_millis().saturating_mul(mult);
    let capped_ms = std::cmp::min(base_ms, max.as_millis()) as u64;
    let jitter_cap = std::cmp::max(1, capped_ms / 4);
    Duration::from_millis(capped_ms.saturating_add(pseudo_jitter_ms(jitter_cap)))
}

fn pseudo_jitter_ms(max_inclusive: u64) -> u64 {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_else(|_| Duration::from_secs(0));
    (now.subsec_nanos() as u64) % (max_inclusive + 1)
}

async fn read_limited_text(resp: reqwest::Response, max_bytes: usize) -> String {
    let mut stream = resp.bytes_stream();
    let mut buf: Vec<u8> = Vec::new();
    while let Some(next) = stream.next().await {
        match next {
            Ok(chunk) => {
                let room = max_bytes.saturating_sub(buf.len());
                buf.extend_from_slice(&chunk[..chunk.len().min(room)]);
                if buf.len() >= max_bytes {
                    break;
                }
            }
            Err(e) => {
                warn!(error = %e, "failed to read error body");
                if buf.is_empty() {
                    return "<failed to read error body>".to_string();
                }
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).to_string()
}
