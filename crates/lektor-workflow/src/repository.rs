/// Client for the external guideline store.
///
/// Keeps an in-memory copy of the last successfully fetched guideline list. A failed
/// refresh never clears it. Every fetch takes a ticket when it starts, and a result is
/// only applied if no newer fetch has already been applied, so overlapping refreshes
/// cannot reinstate an older list.
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use lektor_common::model::GuidelineSummary;

use crate::backend::ReviewBackend;
use crate::busy::{lock, BusyFlags, InFlight, Operation, Tracked};
use crate::config::FallbackMessages;
use crate::error::WorkflowError;

/// Content of a guideline fetched from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedGuideline {
    pub name: String,
    pub content: String,
}

#[derive(Debug, Default)]
struct RepositoryState {
    cache: Vec<GuidelineSummary>,
    busy: BusyFlags,
    issued: u64,
    applied: u64,
}

impl Tracked for RepositoryState {
    fn busy_mut(&mut self) -> &mut BusyFlags {
        &mut self.busy
    }
}

pub struct GuidelineRepository<B> {
    backend: Arc<B>,
    messages: FallbackMessages,
    state: Mutex<RepositoryState>,
}

impl<B: ReviewBackend> GuidelineRepository<B> {
    pub fn new(backend: Arc<B>, messages: FallbackMessages) -> Self {
        Self {
            backend,
            messages,
            state: Mutex::new(RepositoryState::default()),
        }
    }

    /// The last successfully fetched list.
    pub fn cached(&self) -> Vec<GuidelineSummary> {
        lock(&self.state).cache.clone()
    }

    pub fn busy(&self) -> BusyFlags {
        lock(&self.state).busy
    }

    /// Refresh the cached list from the store.
    ///
    /// On failure the cache is left as it was and the error is returned for display;
    /// callers treat it as a warning.
    pub async fn list(&self) -> Result<Vec<GuidelineSummary>, WorkflowError> {
        let _flight = InFlight::claim(&self.state, Operation::ListGuidelines)?;
        self.fetch().await
    }

    /// Persist `content` under `name`, then refresh the list so the new entry shows up.
    ///
    /// A failed refresh after a successful save is logged but does not fail the save.
    pub async fn save(&self, name: &str, content: &str) -> Result<(), WorkflowError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(WorkflowError::Validation(
                "guideline name must not be empty".to_string(),
            ));
        }
        if content.trim().is_empty() {
            return Err(WorkflowError::Validation(
                "there are no rules to save".to_string(),
            ));
        }

        let _flight = InFlight::claim(&self.state, Operation::SaveGuideline)?;

        if let Err(e) = self.backend.save_guideline(name, content).await {
            warn!(error = %e, name, "guideline save failed");
            return Err(WorkflowError::from_api(
                Operation::SaveGuideline,
                &e,
                &self.messages,
            ));
        }
        info!(name, "guideline saved");

        if let Err(e) = self.fetch().await {
            warn!(error = %e, "guideline list refresh after save failed");
        }
        Ok(())
    }

    /// Fetch a guideline's content. `key` may be the record id or its filename; keys not
    /// in the cached list are sent to the store as a filename.
    pub async fn load(&self, key: &str) -> Result<LoadedGuideline, WorkflowError> {
        let key = key.trim();
        if key.is_empty() {
            return Err(WorkflowError::Validation(
                "choose a guideline to load".to_string(),
            ));
        }

        let _flight = InFlight::claim(&self.state, Operation::LoadGuideline)?;

        let (filename, name) = self.resolve(key);
        match self.backend.get_guideline(&filename).await {
            Ok(found) => {
                info!(filename = %filename, name = %name, "guideline loaded");
                Ok(LoadedGuideline {
                    name,
                    content: found.content,
                })
            }
            Err(e) => {
                warn!(error = %e, filename = %filename, "guideline load failed");
                Err(WorkflowError::from_api(
                    Operation::LoadGuideline,
                    &e,
                    &self.messages,
                ))
            }
        }
    }

    fn resolve(&self, key: &str) -> (String, String) {
        let state = lock(&self.state);
        state
            .cache
            .iter()
            .find(|g| g.id == key || g.filename == key)
            .map(|g| (g.filename.clone(), g.name.clone()))
            .unwrap_or_else(|| (key.to_string(), key.to_string()))
    }

    async fn fetch(&self) -> Result<Vec<GuidelineSummary>, WorkflowError> {
        let ticket = {
            let mut state = lock(&self.state);
            state.issued += 1;
            state.issued
        };

        match self.backend.list_guidelines().await {
            Ok(list) => {
                let mut state = lock(&self.state);
                if ticket > state.applied {
                    state.applied = ticket;
                    state.cache = list.clone();
                    debug!(count = list.len(), "guideline list refreshed");
                } else {
                    debug!(ticket, applied = state.applied, "discarding outdated guideline list");
                }
                Ok(state.cache.clone())
            }
            Err(e) => {
                warn!(error = %e, "guideline list refresh failed, keeping cached list");
                Err(WorkflowError::from_api(
                    Operation::ListGuidelines,
                    &e,
                    &self.messages,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::testing::FakeBackend;

    fn repository(backend: FakeBackend) -> (Arc<FakeBackend>, GuidelineRepository<FakeBackend>) {
        let backend = Arc::new(backend);
        let repo = GuidelineRepository::new(Arc::clone(&backend), FallbackMessages::default());
        (backend, repo)
    }

    #[tokio::test]
    async fn save_refreshes_the_list() {
        let (backend, repo) = repository(FakeBackend::default());
        assert!(repo.list().await.expect("empty list").is_empty());

        repo.save("Arboni", "- \"Novelty\"").await.expect("save succeeds");

        let cached = repo.cached();
        assert_eq!(cached.len(), 1);
        assert_eq!(cached[0].name, "Arboni");
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 2);
        assert!(!repo.busy().saving_guideline);
    }

    #[tokio::test]
    async fn failed_list_keeps_previous_cache() {
        let (backend, repo) = repository(FakeBackend::default().with_stored("1", "Arboni", "x"));
        repo.list().await.expect("first list");

        backend.fail_list.store(true, Ordering::SeqCst);
        let err = repo.list().await.expect_err("store offline");
        assert!(matches!(
            err,
            WorkflowError::Transport { operation: Operation::ListGuidelines, ref message }
                if message == "guideline store offline"
        ));
        assert_eq!(repo.cached().len(), 1);
        assert!(!repo.busy().listing_guidelines);
    }

    #[tokio::test]
    async fn save_validates_before_sending() {
        let (backend, repo) = repository(FakeBackend::default());
        assert!(matches!(
            repo.save("  ", "rules").await,
            Err(WorkflowError::Validation(_))
        ));
        assert!(matches!(
            repo.save("Arboni", "\n").await,
            Err(WorkflowError::Validation(_))
        ));
        assert_eq!(backend.save_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_save_uses_fallback_message_and_clears_flag() {
        let (backend, repo) = repository(FakeBackend::default());
        backend.fail_save.store(true, Ordering::SeqCst);

        let err = repo.save("Arboni", "rules").await.expect_err("save fails");
        assert!(matches!(
            err,
            WorkflowError::Transport { ref message, .. }
                if message == &FallbackMessages::default().save
        ));
        assert!(!repo.busy().saving_guideline);
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn save_succeeds_even_if_refresh_fails() {
        let (backend, repo) = repository(FakeBackend::default());
        backend.fail_list.store(true, Ordering::SeqCst);
        repo.save("Arboni", "rules").await.expect("save itself succeeded");
        assert!(repo.cached().is_empty());
    }

    #[tokio::test]
    async fn second_save_while_saving_is_a_no_op() {
        let (backend, repo) =
            repository(FakeBackend::default().gated(Operation::SaveGuideline));

        let first = repo.save("Arboni", "- \"Novelty\"");
        let second = async {
            backend.entered.notified().await;
            assert!(repo.busy().saving_guideline);
            let result = repo.save("Arboni", "- \"Novelty\"").await;
            backend.release.notify_one();
            result
        };
        let (first, second) = tokio::join!(first, second);

        first.expect("first save succeeds");
        assert!(matches!(second, Err(WorkflowError::Busy(Operation::SaveGuideline))));
        assert_eq!(backend.save_calls.load(Ordering::SeqCst), 1);
        assert_eq!(repo.cached().len(), 1);
        assert!(!repo.busy().saving_guideline);
    }

    #[tokio::test]
    async fn second_list_while_listing_is_a_no_op() {
        let (backend, repo) = repository(
            FakeBackend::default()
                .with_stored("1", "Arboni", "x")
                .gated(Operation::ListGuidelines),
        );

        let first = repo.list();
        let second = async {
            backend.entered.notified().await;
            let result = repo.list().await;
            backend.release.notify_one();
            result
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.expect("first list succeeds").len(), 1);
        assert!(matches!(second, Err(WorkflowError::Busy(Operation::ListGuidelines))));
        assert_eq!(backend.list_calls.load(Ordering::SeqCst), 1);
        assert!(!repo.busy().listing_guidelines);
    }

    #[tokio::test]
    async fn second_load_while_loading_is_a_no_op() {
        let (backend, repo) = repository(
            FakeBackend::default()
                .with_stored("7", "Elsevier", "- \"Figures\"")
                .gated(Operation::LoadGuideline),
        );

        let first = repo.load("7.yaml");
        let second = async {
            backend.entered.notified().await;
            assert!(repo.busy().loading_guideline);
            let result = repo.load("7.yaml").await;
            backend.release.notify_one();
            result
        };
        let (first, second) = tokio::join!(first, second);

        assert_eq!(first.expect("first load succeeds").content, "- \"Figures\"");
        assert!(matches!(second, Err(WorkflowError::Busy(Operation::LoadGuideline))));
        assert!(!repo.busy().loading_guideline);
    }

    #[tokio::test]
    async fn load_resolves_id_through_cache() {
        let (_backend, repo) =
            repository(FakeBackend::default().with_stored("7", "Elsevier", "- \"Figures\""));
        repo.list().await.expect("list");

        let loaded = repo.load("7").await.expect("known id");
        assert_eq!(loaded.name, "Elsevier");
        assert_eq!(loaded.content, "- \"Figures\"");

        let by_filename = repo.load("7.yaml").await.expect("known filename");
        assert_eq!(by_filename.name, "Elsevier");
    }

    #[tokio::test]
    async fn load_of_unknown_key_reports_server_detail() {
        let (_backend, repo) = repository(FakeBackend::default());
        let err = repo.load("missing.yaml").await.expect_err("not stored");
        assert!(matches!(
            err,
            WorkflowError::Transport { operation: Operation::LoadGuideline, ref message }
                if message.contains("missing.yaml")
        ));
        assert!(!repo.busy().loading_guideline);
    }
}
