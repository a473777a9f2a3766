//! FOLIO LLM - External Compute Providers
//!
//! Provider-agnostic traits for the external computations the platform
//! depends on: section generation, literature search, bibliographic metadata
//! lookup and text similarity scoring. Concrete providers are user-supplied;
//! every provider call is treated as slow and fallible.

use async_trait::async_trait;
use folio_core::{FolioResult, GenerationTask, UpstreamError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

pub mod cached;
pub mod mock;
pub mod similarity;

pub use cached::{CachedProviders, ProviderTtls};
pub use mock::{MockLiteratureSearch, MockMetadataResolver, MockTextGenerator};
pub use similarity::ShingleSimilarityScorer;

// ============================================================================
// TEXT GENERATION
// ============================================================================

/// Input to a text generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationPrompt {
    pub title: String,
    pub context: String,
}

impl GenerationPrompt {
    pub fn for_task(task: &GenerationTask) -> Self {
        Self {
            title: task.title.clone(),
            context: task.context.clone(),
        }
    }
}

/// Trait for text generation providers.
/// Implementations must be thread-safe (Send + Sync).
///
/// # Example
/// ```ignore
/// struct HostedModel { /* ... */ }
///
/// #[async_trait]
/// impl TextGenerator for HostedModel {
///     async fn generate(&self, prompt: &GenerationPrompt) -> FolioResult<String> {
///         // Call the model API
///     }
///     fn provider_id(&self) -> &str { "hosted-model" }
/// }
/// ```
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate the body of one section.
    ///
    /// # Returns
    /// * `Ok(String)` - Generated text
    /// * `Err(FolioError::Upstream)` - If the provider fails
    async fn generate(&self, prompt: &GenerationPrompt) -> FolioResult<String>;

    /// Identifier used in logs and error messages.
    fn provider_id(&self) -> &str;
}

// ============================================================================
// LITERATURE SEARCH
// ============================================================================

/// One search hit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiteratureRecord {
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub venue: Option<String>,
    pub abstract_text: Option<String>,
}

#[async_trait]
pub trait LiteratureSearch: Send + Sync {
    /// Return up to `limit` records relevant to `query`.
    async fn search(&self, query: &str, limit: usize) -> FolioResult<Vec<LiteratureRecord>>;

    fn provider_id(&self) -> &str;
}

// ============================================================================
// BIBLIOGRAPHIC METADATA
// ============================================================================

/// Citation metadata for a DOI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BibliographicRecord {
    pub doi: String,
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub container_title: Option<String>,
    pub publisher: Option<String>,
    pub url: Option<String>,
}

#[async_trait]
pub trait MetadataResolver: Send + Sync {
    /// Resolve a canonical DOI. `Ok(None)` means the registry has no record.
    async fn resolve(&self, doi: &str) -> FolioResult<Option<BibliographicRecord>>;

    fn provider_id(&self) -> &str;
}

// ============================================================================
// SIMILARITY SCORING
// ============================================================================

/// A reference text to compare against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceText {
    pub label: String,
    pub text: String,
}

/// Overlap with one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceMatch {
    pub label: String,
    /// In `[0, 1]`.
    pub score: f64,
}

/// Result of scoring a candidate text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimilarityReport {
    /// Highest per-source score, in `[0, 1]`.
    pub score: f64,
    /// Per-source scores, highest first.
    pub matches: Vec<SourceMatch>,
    pub scorer: String,
}

#[async_trait]
pub trait SimilarityScorer: Send + Sync {
    async fn score(&self, candidate: &str, sources: &[SourceText]) -> FolioResult<SimilarityReport>;

    fn scorer_id(&self) -> &str;
}

// ============================================================================
// PROVIDER REGISTRY
// ============================================================================

/// Registry for external compute providers.
/// Providers must be explicitly registered - no auto-discovery.
///
/// # Example
/// ```ignore
/// let mut registry = ProviderRegistry::new();
/// registry.register_text_generator(Arc::new(my_generator));
///
/// let text = registry.text_generator()?.generate(&prompt).await?;
/// ```
#[derive(Default)]
pub struct ProviderRegistry {
    text_generator: Option<Arc<dyn TextGenerator>>,
    literature_search: Option<Arc<dyn LiteratureSearch>>,
    metadata_resolver: Option<Arc<dyn MetadataResolver>>,
    similarity_scorer: Option<Arc<dyn SimilarityScorer>>,
}

fn not_configured(capability: &str) -> folio_core::FolioError {
    UpstreamError::ProviderNotConfigured {
        capability: capability.to_string(),
    }
    .into()
}

impl ProviderRegistry {
    /// Create a new empty provider registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with only the built-in similarity scorer.
    pub fn with_default_scorer() -> Self {
        let mut registry = Self::new();
        registry.register_similarity_scorer(Arc::new(ShingleSimilarityScorer::default()));
        registry
    }

    /// Replaces any previously registered text generator.
    pub fn register_text_generator(&mut self, provider: Arc<dyn TextGenerator>) {
        self.text_generator = Some(provider);
    }

    pub fn register_literature_search(&mut self, provider: Arc<dyn LiteratureSearch>) {
        self.literature_search = Some(provider);
    }

    pub fn register_metadata_resolver(&mut self, provider: Arc<dyn MetadataResolver>) {
        self.metadata_resolver = Some(provider);
    }

    pub fn register_similarity_scorer(&mut self, provider: Arc<dyn SimilarityScorer>) {
        self.similarity_scorer = Some(provider);
    }

    /// # Returns
    /// * `Err(FolioError::Upstream(UpstreamError::ProviderNotConfigured))` - If no provider registered
    pub fn text_generator(&self) -> FolioResult<Arc<dyn TextGenerator>> {
        self.text_generator
            .clone()
            .ok_or_else(|| not_configured("text generation"))
    }

    pub fn literature_search(&self) -> FolioResult<Arc<dyn LiteratureSearch>> {
        self.literature_search
            .clone()
            .ok_or_else(|| not_configured("literature search"))
    }

    pub fn metadata_resolver(&self) -> FolioResult<Arc<dyn MetadataResolver>> {
        self.metadata_resolver
            .clone()
            .ok_or_else(|| not_configured("metadata lookup"))
    }

    pub fn similarity_scorer(&self) -> FolioResult<Arc<dyn SimilarityScorer>> {
        self.similarity_scorer
            .clone()
            .ok_or_else(|| not_configured("similarity scoring"))
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field(
                "text_generator",
                &self.text_generator.as_ref().map(|p| p.provider_id().to_string()),
            )
            .field(
                "literature_search",
                &self.literature_search.as_ref().map(|p| p.provider_id().to_string()),
            )
            .field(
                "metadata_resolver",
                &self.metadata_resolver.as_ref().map(|p| p.provider_id().to_string()),
            )
            .field(
                "similarity_scorer",
                &self.similarity_scorer.as_ref().map(|p| p.scorer_id().to_string()),
            )
            .finish()
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use folio_core::FolioError;

    #[test]
    fn test_empty_registry_reports_missing_capability() {
        let registry = ProviderRegistry::new();
        let err = registry.text_generator().err().unwrap();
        assert_eq!(
            err,
            FolioError::Upstream(UpstreamError::ProviderNotConfigured {
                capability: "text generation".to_string()
            })
        );
        assert!(registry.similarity_scorer().is_err());
    }

    #[test]
    fn test_default_scorer_registered() {
        let registry = ProviderRegistry::with_default_scorer();
        assert_eq!(registry.similarity_scorer().unwrap().scorer_id(), "shingle-3");
        assert!(format!("{:?}", registry).contains("shingle-3"));
    }
}
