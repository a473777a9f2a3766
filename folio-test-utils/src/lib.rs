//! FOLIO Test Utilities
//!
//! Shared test infrastructure for the FOLIO workspace:
//! - Fake backends and providers with scripted failures
//! - Proptest generators for identifiers and requests
//! - Fixtures for common scenarios
//! - Assertions for FOLIO error categories

pub use folio_core::{
    DocumentId, EntityIdType, FolioConfig, FolioError, FolioResult, GenerationTask, ManualClock,
    SectionId, StorageError, SubjectId, ThrottleError, Timestamp, UpstreamError,
};

use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use folio_llm::{GenerationPrompt, TextGenerator};
use folio_storage::{KeyValueStore, WindowCount};

// ============================================================================
// FAKE BACKENDS
// ============================================================================

/// Key-value store whose every operation fails as unavailable.
#[derive(Debug, Clone, Default)]
pub struct FailingKeyValueStore;

fn unavailable() -> FolioError {
    StorageError::Unavailable {
        reason: "backend offline".to_string(),
    }
    .into()
}

#[async_trait]
impl KeyValueStore for FailingKeyValueStore {
    async fn get(&self, _key: &str) -> FolioResult<Option<Vec<u8>>> {
        Err(unavailable())
    }

    async fn set(&self, _key: &str, _value: Vec<u8>, _ttl: Duration) -> FolioResult<()> {
        Err(unavailable())
    }

    async fn delete(&self, _key: &str) -> FolioResult<bool> {
        Err(unavailable())
    }

    async fn increment_window(&self, _key: &str, _window: Duration) -> FolioResult<WindowCount> {
        Err(unavailable())
    }
}

// ============================================================================
// FAKE PROVIDERS
// ============================================================================

/// Generator that echoes the title and counts calls.
#[derive(Debug, Default)]
pub struct CountingGenerator {
    calls: AtomicUsize,
}

impl CountingGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for CountingGenerator {
    async fn generate(&self, prompt: &GenerationPrompt) -> FolioResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(format!("Generated text for {}", prompt.title))
    }

    fn provider_id(&self) -> &str {
        "counting"
    }
}

/// Generator with scripted failures.
///
/// Titles in `fail_titles` always fail with a non-transient error. The first
/// `transient_failures` calls fail with a transient error regardless of
/// title.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    fail_titles: HashSet<String>,
    transient_failures: AtomicU32,
    calls: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_titles<I, S>(mut self, titles: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.fail_titles = titles.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_transient_failures(self, count: u32) -> Self {
        self.transient_failures.store(count, Ordering::SeqCst);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextGenerator for ScriptedGenerator {
    async fn generate(&self, prompt: &GenerationPrompt) -> FolioResult<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let transient = self
            .transient_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if transient {
            return Err(UpstreamError::RequestFailed {
                provider: "scripted".to_string(),
                reason: "transient failure".to_string(),
            }
            .into());
        }
        if self.fail_titles.contains(&prompt.title) {
            return Err(UpstreamError::InvalidResponse {
                provider: "scripted".to_string(),
                reason: format!("refused '{}'", prompt.title),
            }
            .into());
        }
        Ok(format!("Generated text for {}", prompt.title))
    }

    fn provider_id(&self) -> &str {
        "scripted"
    }
}

/// Generator that sleeps before answering.
#[derive(Debug, Clone)]
pub struct SlowGenerator {
    delay: Duration,
}

impl SlowGenerator {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }
}

#[async_trait]
impl TextGenerator for SlowGenerator {
    async fn generate(&self, prompt: &GenerationPrompt) -> FolioResult<String> {
        tokio::time::sleep(self.delay).await;
        Ok(format!("Slow text for {}", prompt.title))
    }

    fn provider_id(&self) -> &str {
        "slow"
    }
}

/// Generator that panics on every call.
#[derive(Debug, Clone, Default)]
pub struct PanickingGenerator;

#[async_trait]
impl TextGenerator for PanickingGenerator {
    async fn generate(&self, prompt: &GenerationPrompt) -> FolioResult<String> {
        panic!("generator panicked on '{}'", prompt.title);
    }

    fn provider_id(&self) -> &str {
        "panicking"
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for FOLIO identifiers and inputs.

    use super::*;
    use proptest::prelude::*;
    use uuid::Uuid;

    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    pub fn arb_document_id() -> impl Strategy<Value = DocumentId> {
        arb_uuid().prop_map(DocumentId::new)
    }

    pub fn arb_subject_id() -> impl Strategy<Value = SubjectId> {
        arb_uuid().prop_map(SubjectId::new)
    }

    pub fn arb_section_id() -> impl Strategy<Value = SectionId> {
        "[a-z][a-z0-9-]{0,15}".prop_map(SectionId::new)
    }

    /// Syntactically valid email addresses, lowercase.
    pub fn arb_email() -> impl Strategy<Value = String> {
        ("[a-z][a-z0-9.]{0,11}", "[a-z]{2,10}", "[a-z]{2,4}")
            .prop_map(|(local, domain, tld)| format!("{}@{}.{}", local, domain, tld))
    }

    /// Passwords inside the default accepted length range.
    pub fn arb_password() -> impl Strategy<Value = String> {
        "[A-Za-z0-9!@#%^&*]{8,64}"
    }

    pub fn arb_timestamp() -> impl Strategy<Value = Timestamp> {
        (1_600_000_000i64..2_000_000_000i64).prop_map(|secs| {
            chrono::DateTime::from_timestamp(secs, 0).unwrap_or_default()
        })
    }

    /// Between 1 and `max` tasks for one document with distinct section ids.
    pub fn arb_generation_tasks(
        document_id: DocumentId,
        max: usize,
    ) -> impl Strategy<Value = Vec<GenerationTask>> {
        proptest::collection::btree_set(arb_section_id(), 1..=max.max(1)).prop_map(
            move |ids| {
                ids.into_iter()
                    .map(|section_id| GenerationTask {
                        document_id,
                        title: format!("Section {}", section_id),
                        section_id,
                        context: String::new(),
                    })
                    .collect()
            },
        )
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built fixtures for common testing scenarios.

    use super::*;
    use folio_core::RetryConfig;

    /// Production defaults with fast batch retries and timeouts.
    pub fn fast_config() -> FolioConfig {
        let mut config = FolioConfig::default();
        config.batch.task_timeout = Duration::from_millis(500);
        config.batch.retry = RetryConfig {
            max_retries: 2,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            backoff_multiplier: 2.0,
        };
        config
    }

    /// A manual clock at a fixed, readable instant.
    pub fn fixed_clock() -> ManualClock {
        let start = chrono::DateTime::from_timestamp(1_750_000_000, 0).unwrap_or_default();
        ManualClock::new(start)
    }

    pub fn task(document_id: DocumentId, section_id: &str, title: &str) -> GenerationTask {
        GenerationTask {
            document_id,
            section_id: SectionId::new(section_id),
            title: title.to_string(),
            context: String::new(),
        }
    }

    /// Tasks `s1..=sN` titled `Section 1..=N`.
    pub fn numbered_tasks(document_id: DocumentId, count: usize) -> Vec<GenerationTask> {
        (1..=count)
            .map(|i| task(document_id, &format!("s{}", i), &format!("Section {}", i)))
            .collect()
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for FOLIO error categories.

    use super::*;
    use folio_core::{ExpiredError, NotFoundError};

    /// Assert the result was throttled, returning the retry hint.
    #[track_caller]
    pub fn assert_throttled<T: std::fmt::Debug>(result: &FolioResult<T>) -> u64 {
        match result {
            Err(FolioError::Throttled(err)) => err.retry_after_secs(),
            other => panic!("Expected throttling, got {:?}", other),
        }
    }

    /// Assert a token was rejected (unknown, consumed or expired).
    #[track_caller]
    pub fn assert_token_rejected<T: std::fmt::Debug>(result: &FolioResult<T>) {
        assert!(
            matches!(
                result,
                Err(FolioError::NotFound(NotFoundError::Token))
                    | Err(FolioError::Expired(ExpiredError::Token { .. }))
            ),
            "Expected token rejection, got {:?}",
            result
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_transient_then_success() {
        let generator = ScriptedGenerator::new().with_transient_failures(1);
        let prompt = GenerationPrompt {
            title: "Intro".to_string(),
            context: String::new(),
        };
        let first = generator.generate(&prompt).await.unwrap_err();
        assert!(first.is_transient());
        assert!(generator.generate(&prompt).await.is_ok());
        assert_eq!(generator.calls(), 2);
    }

    #[tokio::test]
    async fn test_scripted_title_failure_is_permanent() {
        let generator = ScriptedGenerator::new().failing_titles(["Bad"]);
        let prompt = GenerationPrompt {
            title: "Bad".to_string(),
            context: String::new(),
        };
        assert!(!generator.generate(&prompt).await.unwrap_err().is_transient());
    }

    #[tokio::test]
    async fn test_failing_store() {
        assert!(FailingKeyValueStore.get("k").await.is_err());
    }
}
