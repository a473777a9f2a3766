//! Bounded-parallel section generation.
//!
//! Tasks run through the cached providers with at most `max_concurrency` in
//! flight. A task's failure, timeout or panic becomes that task's outcome and
//! never cancels its siblings.

use std::collections::{BTreeMap, HashSet};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use folio_core::{
    BatchResult, BatchSettings, FolioResult, GeneratedSection, GenerationTask,
    SectionId, TaskOutcome, TaskState, UpstreamError, ValidationError,
};
use folio_llm::cached::{CachedProviders, OP_GENERATE_SECTION};
use folio_storage::VersionStore;
use futures_util::{stream, FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::telemetry::metrics;

/// Per-call switches for a batch run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchOptions {
    /// Append each generated section as a new version of its document.
    #[serde(default)]
    pub persist_versions: bool,
    /// Fail the whole batch if any task fails. Nothing is persisted then.
    #[serde(default)]
    pub require_all: bool,
}

#[derive(Clone)]
pub struct BatchOrchestrator {
    providers: CachedProviders,
    versions: Arc<VersionStore>,
    settings: BatchSettings,
}

impl std::fmt::Debug for BatchOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchOrchestrator")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

fn advance(section_id: &SectionId, state: &mut TaskState, next: TaskState) {
    debug_assert!(state.can_transition_to(next), "{:?} -> {:?}", state, next);
    debug!(section_id = %section_id, from = ?state, to = ?next, "Task state changed");
    *state = next;
}

impl BatchOrchestrator {
    pub fn new(
        providers: CachedProviders,
        versions: Arc<VersionStore>,
        settings: BatchSettings,
    ) -> Self {
        Self {
            providers,
            versions,
            settings,
        }
    }

    pub fn settings(&self) -> &BatchSettings {
        &self.settings
    }

    /// Best-effort run: one outcome per task, no error for task failures.
    pub async fn run_batch(&self, tasks: Vec<GenerationTask>) -> FolioResult<BatchResult> {
        self.run_batch_with(tasks, BatchOptions::default()).await
    }

    pub async fn run_batch_with(
        &self,
        tasks: Vec<GenerationTask>,
        options: BatchOptions,
    ) -> FolioResult<BatchResult> {
        self.validate(&tasks)?;

        let total = tasks.len();
        let started = Instant::now();
        info!(
            tasks = total,
            max_concurrency = self.settings.max_concurrency,
            persist_versions = options.persist_versions,
            "Batch started"
        );

        // Each in-flight future owns its task and a handle to the orchestrator,
        // so the whole batch future stays `Send` for the HTTP handler.
        let outcomes: BTreeMap<SectionId, TaskOutcome> = stream::iter(tasks.clone())
            .map(|task| {
                let orchestrator = self.clone();
                async move {
                    let outcome = orchestrator.run_task(&task).await;
                    (task.section_id, outcome)
                }
            })
            .buffer_unordered(self.settings.max_concurrency.max(1))
            .collect()
            .await;
        let mut result = BatchResult::from_outcomes(outcomes);

        if options.require_all && !result.is_complete_success() {
            warn!(
                failed = result.failed,
                total,
                "Batch incomplete, discarding results"
            );
            return Err(UpstreamError::BatchIncomplete {
                failed: result.failed,
                total,
            }
            .into());
        }

        if options.persist_versions {
            result = self.persist(&tasks, result).await;
        }

        info!(
            succeeded = result.succeeded,
            failed = result.failed,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Batch finished"
        );
        Ok(result)
    }

    fn validate(&self, tasks: &[GenerationTask]) -> FolioResult<()> {
        if tasks.is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "tasks".to_string(),
            }
            .into());
        }
        if tasks.len() > self.settings.max_tasks {
            return Err(ValidationError::TooLong {
                field: "tasks".to_string(),
                max: self.settings.max_tasks,
                actual: tasks.len(),
            }
            .into());
        }

        let mut seen = HashSet::with_capacity(tasks.len());
        for task in tasks {
            if task.section_id.is_blank() {
                return Err(ValidationError::RequiredFieldMissing {
                    field: "section_id".to_string(),
                }
                .into());
            }
            if !seen.insert(&task.section_id) {
                return Err(ValidationError::InvalidValue {
                    field: "section_id".to_string(),
                    reason: format!("duplicate section id '{}'", task.section_id.as_str()),
                }
                .into());
            }
        }
        Ok(())
    }

    async fn run_task(&self, task: &GenerationTask) -> TaskOutcome {
        let mut state = TaskState::Pending;
        advance(&task.section_id, &mut state, TaskState::Running);
        let started = Instant::now();
        let retry = &self.settings.retry;

        let mut attempts = 0u32;
        let outcome = loop {
            attempts += 1;
            match self.attempt(task).await {
                Ok(section) => {
                    break TaskOutcome::Succeeded {
                        section,
                        version_number: None,
                        attempts,
                    }
                }
                Err(e) if e.is_transient() && attempts <= retry.max_retries => {
                    let backoff = retry.backoff_for(attempts - 1);
                    warn!(
                        section_id = %task.section_id,
                        attempt = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Task attempt failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                }
                Err(e) => {
                    warn!(
                        section_id = %task.section_id,
                        attempts,
                        error = %e,
                        "Task failed"
                    );
                    break TaskOutcome::failed(&e, attempts);
                }
            }
        };

        advance(&task.section_id, &mut state, outcome.state());
        if let Some(metrics) = metrics() {
            metrics.record_batch_task(outcome.is_success(), started.elapsed().as_secs_f64());
        }
        outcome
    }

    /// One timed attempt. A panic in the provider is caught and reported.
    async fn attempt(&self, task: &GenerationTask) -> FolioResult<GeneratedSection> {
        let call = AssertUnwindSafe(self.providers.generate_section(task)).catch_unwind();
        match tokio::time::timeout(self.settings.task_timeout, call).await {
            Err(_) => Err(UpstreamError::Timeout {
                operation: OP_GENERATE_SECTION.to_string(),
                timeout_ms: self.settings.task_timeout.as_millis() as u64,
            }
            .into()),
            Ok(Err(_panic)) => Err(UpstreamError::Aborted {
                operation: OP_GENERATE_SECTION.to_string(),
            }
            .into()),
            Ok(Ok(read)) => read.map(|read| read.into_value()),
        }
    }

    /// Append successful sections as versions, in section order.
    ///
    /// A failed append turns that section's outcome into a failure.
    async fn persist(&self, tasks: &[GenerationTask], result: BatchResult) -> BatchResult {
        let documents: BTreeMap<&SectionId, _> = tasks
            .iter()
            .map(|task| (&task.section_id, task.document_id))
            .collect();

        let mut outcomes = BTreeMap::new();
        for (section_id, outcome) in result.outcomes {
            let outcome = match (outcome, documents.get(&section_id)) {
                (
                    TaskOutcome::Succeeded {
                        section, attempts, ..
                    },
                    Some(&document_id),
                ) => match self
                    .versions
                    .append_version(document_id, section.content.clone())
                    .await
                {
                    Ok(version) => {
                        if let Some(metrics) = metrics() {
                            metrics.record_version_append(true);
                        }
                        TaskOutcome::Succeeded {
                            section,
                            version_number: Some(version.version_number),
                            attempts,
                        }
                    }
                    Err(e) => {
                        if let Some(metrics) = metrics() {
                            metrics.record_version_append(false);
                        }
                        warn!(section_id = %section_id, error = %e, "Persisting section failed");
                        TaskOutcome::failed(&e, attempts)
                    }
                },
                (outcome, _) => outcome,
            };
            outcomes.insert(section_id, outcome);
        }
        BatchResult::from_outcomes(outcomes)
    }
}

/// Convenience for callers that only want the failure, if any.
pub fn first_failure(result: &BatchResult) -> Option<(&SectionId, &str)> {
    result.outcomes.iter().find_map(|(id, outcome)| match outcome {
        TaskOutcome::Failed { message, .. } => Some((id, message.as_str())),
        TaskOutcome::Succeeded { .. } => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use folio_core::{DocumentId, EntityIdType, FolioError, ManualClock, RetryConfig, VersionSettings};
    use folio_llm::{GenerationPrompt, ProviderRegistry, TextGenerator};
    use folio_storage::{CacheConfig, ComputeCache, InMemoryKeyValueStore, InMemoryRecordStore};
    use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
    use std::time::Duration;

    /// Fails titles containing "fail", panics on "panic", sleeps on "slow",
    /// and fails the first `flaky` calls for titles containing "flaky".
    #[derive(Default)]
    struct TestGenerator {
        calls: AtomicUsize,
        flaky: AtomicU32,
        in_flight: AtomicUsize,
        max_in_flight: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for TestGenerator {
        async fn generate(&self, prompt: &GenerationPrompt) -> FolioResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_in_flight.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(10)).await;
            self.in_flight.fetch_sub(1, Ordering::SeqCst);

            let title = prompt.title.as_str();
            if title.contains("panic") {
                panic!("generator exploded");
            }
            if title.contains("slow") {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            if title.contains("flaky") && self.flaky.load(Ordering::SeqCst) > 0 {
                self.flaky.fetch_sub(1, Ordering::SeqCst);
                return Err(UpstreamError::RequestFailed {
                    provider: "test".to_string(),
                    reason: "flaky".to_string(),
                }
                .into());
            }
            if title.contains("fail") {
                return Err(UpstreamError::InvalidResponse {
                    provider: "test".to_string(),
                    reason: "refused".to_string(),
                }
                .into());
            }
            Ok(format!("text for {}", title))
        }

        fn provider_id(&self) -> &str {
            "test"
        }
    }

    fn settings() -> BatchSettings {
        BatchSettings {
            max_concurrency: 2,
            max_tasks: 8,
            task_timeout: Duration::from_millis(500),
            retry: RetryConfig {
                max_retries: 2,
                initial_backoff: Duration::from_millis(1),
                max_backoff: Duration::from_millis(5),
                backoff_multiplier: 2.0,
            },
        }
    }

    fn orchestrator(generator: Arc<TestGenerator>) -> (BatchOrchestrator, Arc<VersionStore>) {
        let clock = Arc::new(ManualClock::starting_now());
        let kv = Arc::new(InMemoryKeyValueStore::new(clock.clone()));
        let mut registry = ProviderRegistry::new();
        registry.register_text_generator(generator);
        let providers = CachedProviders::new(
            Arc::new(registry),
            ComputeCache::new(kv, clock.clone(), CacheConfig::default()),
            Default::default(),
        );
        let versions = Arc::new(VersionStore::new(
            Arc::new(InMemoryRecordStore::new()),
            clock,
            VersionSettings::default(),
        ));
        (
            BatchOrchestrator::new(providers, versions.clone(), settings()),
            versions,
        )
    }

    fn task(document_id: DocumentId, id: &str, title: &str) -> GenerationTask {
        GenerationTask {
            document_id,
            section_id: SectionId::new(id),
            title: title.to_string(),
            context: String::new(),
        }
    }

    #[test]
    fn test_batch_future_is_send() {
        fn assert_send<T: Send>(_: T) {}
        let (batch, _) = orchestrator(Arc::new(TestGenerator::default()));
        let doc = DocumentId::now_v7();
        assert_send(batch.run_batch_with(vec![task(doc, "s1", "Intro")], BatchOptions::default()));
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let (batch, _) = orchestrator(Arc::new(TestGenerator::default()));
        let doc = DocumentId::now_v7();
        let tasks = vec![
            task(doc, "s1", "Intro"),
            task(doc, "s2", "Method"),
            task(doc, "s3", "will fail"),
            task(doc, "s4", "Results"),
            task(doc, "s5", "Discussion"),
        ];
        let result = batch.run_batch(tasks).await.unwrap();
        assert_eq!(result.total(), 5);
        assert_eq!(result.succeeded, 4);
        assert_eq!(result.failed, 1);
        assert!(!result.get(&SectionId::new("s3")).unwrap().is_success());
        assert_eq!(first_failure(&result).unwrap().0, &SectionId::new("s3"));
    }

    #[tokio::test]
    async fn test_concurrency_is_bounded() {
        let generator = Arc::new(TestGenerator::default());
        let (batch, _) = orchestrator(generator.clone());
        let doc = DocumentId::now_v7();
        let tasks = (0..6)
            .map(|i| task(doc, &format!("s{}", i), &format!("Section {}", i)))
            .collect();
        batch.run_batch(tasks).await.unwrap();
        assert!(generator.max_in_flight.load(Ordering::SeqCst) <= 2);
        assert_eq!(generator.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_panic_and_timeout_become_failures() {
        let (batch, _) = orchestrator(Arc::new(TestGenerator::default()));
        let doc = DocumentId::now_v7();
        let result = batch
            .run_batch(vec![
                task(doc, "a", "panic here"),
                task(doc, "b", "slow section"),
                task(doc, "c", "fine"),
            ])
            .await
            .unwrap();
        assert_eq!(result.succeeded, 1);
        match result.get(&SectionId::new("a")).unwrap() {
            TaskOutcome::Failed { code, .. } => assert_eq!(code, "UPSTREAM_FAILED"),
            other => panic!("expected failure, got {:?}", other),
        }
        match result.get(&SectionId::new("b")).unwrap() {
            TaskOutcome::Failed { code, attempts, .. } => {
                assert_eq!(code, "TIMEOUT");
                assert_eq!(*attempts, 3);
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let generator = Arc::new(TestGenerator::default());
        generator.flaky.store(2, Ordering::SeqCst);
        let (batch, _) = orchestrator(generator);
        let result = batch
            .run_batch(vec![task(DocumentId::now_v7(), "s", "flaky section")])
            .await
            .unwrap();
        match result.get(&SectionId::new("s")).unwrap() {
            TaskOutcome::Succeeded { attempts, .. } => assert_eq!(*attempts, 3),
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permanent_failures_are_not_retried() {
        let generator = Arc::new(TestGenerator::default());
        let (batch, _) = orchestrator(generator.clone());
        batch
            .run_batch(vec![task(DocumentId::now_v7(), "s", "fail")])
            .await
            .unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_require_all() {
        let (batch, versions) = orchestrator(Arc::new(TestGenerator::default()));
        let doc = DocumentId::now_v7();
        let err = batch
            .run_batch_with(
                vec![task(doc, "a", "ok"), task(doc, "b", "fail")],
                BatchOptions {
                    persist_versions: true,
                    require_all: true,
                },
            )
            .await
            .unwrap_err();
        assert_eq!(
            err,
            FolioError::Upstream(UpstreamError::BatchIncomplete { failed: 1, total: 2 })
        );
        assert!(versions.latest(doc).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_persist_versions() {
        let (batch, versions) = orchestrator(Arc::new(TestGenerator::default()));
        let doc = DocumentId::now_v7();
        let result = batch
            .run_batch_with(
                vec![task(doc, "a", "First"), task(doc, "b", "Second")],
                BatchOptions {
                    persist_versions: true,
                    require_all: false,
                },
            )
            .await
            .unwrap();
        let numbers: Vec<_> = result
            .outcomes
            .values()
            .filter_map(|o| match o {
                TaskOutcome::Succeeded { version_number, .. } => *version_number,
                TaskOutcome::Failed { .. } => None,
            })
            .collect();
        assert_eq!(numbers, vec![1, 2]);
        assert_eq!(versions.list_versions(doc).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_validation() {
        let (batch, _) = orchestrator(Arc::new(TestGenerator::default()));
        let doc = DocumentId::now_v7();
        assert!(batch.run_batch(vec![]).await.is_err());
        assert!(batch
            .run_batch(vec![task(doc, "a", "x"), task(doc, "a", "y")])
            .await
            .is_err());
        assert!(batch.run_batch(vec![task(doc, "  ", "x")]).await.is_err());
        let too_many = (0..9).map(|i| task(doc, &i.to_string(), "x")).collect();
        assert!(matches!(
            batch.run_batch(too_many).await,
            Err(FolioError::Validation(ValidationError::TooLong { .. }))
        ));
    }

    #[tokio::test]
    async fn test_repeated_task_served_from_cache() {
        let generator = Arc::new(TestGenerator::default());
        let (batch, _) = orchestrator(generator.clone());
        let doc = DocumentId::now_v7();
        batch.run_batch(vec![task(doc, "a", "Same")]).await.unwrap();
        batch.run_batch(vec![task(doc, "a", "Same")]).await.unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 1);
    }
}
