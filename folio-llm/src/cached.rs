//! Provider calls routed through the compute cache.
//!
//! Each capability has its own operation name and TTL; inputs are
//! canonicalized into the cache key so trivially different requests reuse
//! the same result.

use std::sync::Arc;
use std::time::Duration;

use folio_core::{
    canonicalize_identifier, CacheSettings, FolioResult, GeneratedSection, GenerationTask,
    UpstreamError, ValidationError,
};
use folio_storage::{CacheKey, CacheRead, ComputeCache};
use tracing::debug;

use crate::{
    BibliographicRecord, GenerationPrompt, LiteratureRecord, ProviderRegistry, SimilarityReport,
    SourceText,
};

pub const OP_GENERATE_SECTION: &str = "generate-section";
pub const OP_LITERATURE_SEARCH: &str = "literature-search";
pub const OP_DOI_METADATA: &str = "doi-metadata";
pub const OP_SIMILARITY: &str = "similarity";

/// Largest page of search results a caller may request.
pub const MAX_SEARCH_LIMIT: usize = 100;

/// Cache lifetimes per capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderTtls {
    pub generation: Duration,
    pub search: Duration,
    pub metadata: Duration,
    pub similarity: Duration,
}

impl From<&CacheSettings> for ProviderTtls {
    fn from(settings: &CacheSettings) -> Self {
        Self {
            generation: settings.generation_ttl,
            search: settings.search_ttl,
            metadata: settings.metadata_ttl,
            similarity: settings.similarity_ttl,
        }
    }
}

impl Default for ProviderTtls {
    fn default() -> Self {
        Self::from(&CacheSettings::default())
    }
}

/// Registry access with memoization.
#[derive(Debug, Clone)]
pub struct CachedProviders {
    registry: Arc<ProviderRegistry>,
    cache: ComputeCache,
    ttls: ProviderTtls,
}

impl CachedProviders {
    pub fn new(registry: Arc<ProviderRegistry>, cache: ComputeCache, ttls: ProviderTtls) -> Self {
        Self {
            registry,
            cache,
            ttls,
        }
    }

    pub fn registry(&self) -> &ProviderRegistry {
        &self.registry
    }

    /// The underlying cache, for memoizing other computations such as
    /// dashboard aggregates.
    pub fn cache(&self) -> &ComputeCache {
        &self.cache
    }

    /// Generate one section. Repeating the same task returns the stored text.
    pub async fn generate_section(
        &self,
        task: &GenerationTask,
    ) -> FolioResult<CacheRead<GeneratedSection>> {
        if task.title.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "title".to_string(),
            }
            .into());
        }
        let document_id = task.document_id.to_string();
        let key = CacheKey::from_parts(
            OP_GENERATE_SECTION,
            [
                document_id.as_str(),
                task.section_id.as_str(),
                task.title.as_str(),
                task.context.as_str(),
            ],
        );
        let registry = self.registry.clone();
        let prompt = GenerationPrompt::for_task(task);
        let section_id = task.section_id.clone();
        let title = task.title.clone();

        let read = self
            .cache
            .fetch(&key, self.ttls.generation, move || async move {
                let generator = registry.text_generator()?;
                let content = generator.generate(&prompt).await?;
                if content.trim().is_empty() {
                    return Err(UpstreamError::InvalidResponse {
                        provider: generator.provider_id().to_string(),
                        reason: "empty generation".to_string(),
                    }
                    .into());
                }
                Ok(GeneratedSection {
                    section_id,
                    title,
                    content,
                })
            })
            .await?;
        debug!(
            section_id = %task.section_id,
            cache_hit = read.was_cache_hit(),
            "section generation resolved"
        );
        Ok(read)
    }

    pub async fn search_literature(
        &self,
        query: &str,
        limit: usize,
    ) -> FolioResult<Vec<LiteratureRecord>> {
        if query.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "query".to_string(),
            }
            .into());
        }
        if limit == 0 || limit > MAX_SEARCH_LIMIT {
            return Err(ValidationError::InvalidValue {
                field: "limit".to_string(),
                reason: format!("limit must be between 1 and {}", MAX_SEARCH_LIMIT),
            }
            .into());
        }
        let limit_part = limit.to_string();
        let key = CacheKey::from_parts(OP_LITERATURE_SEARCH, [query, limit_part.as_str()]);
        let registry = self.registry.clone();
        let query = query.trim().to_string();

        self.cache
            .get_or_compute(&key, self.ttls.search, move || async move {
                let search = registry.literature_search()?;
                let mut records = search.search(&query, limit).await?;
                records.truncate(limit);
                Ok(records)
            })
            .await
    }

    /// Resolve DOI metadata. Resolver URLs and `doi:` prefixes are accepted.
    pub async fn resolve_doi(&self, doi: &str) -> FolioResult<Option<BibliographicRecord>> {
        let canonical = canonicalize_identifier(doi);
        if !canonical.starts_with("10.") || !canonical.contains('/') {
            return Err(ValidationError::InvalidValue {
                field: "doi".to_string(),
                reason: "expected a DOI of the form 10.<prefix>/<suffix>".to_string(),
            }
            .into());
        }
        let key = CacheKey::from_identifier(OP_DOI_METADATA, &canonical);
        let registry = self.registry.clone();

        self.cache
            .get_or_compute(&key, self.ttls.metadata, move || async move {
                let resolver = registry.metadata_resolver()?;
                resolver.resolve(&canonical).await
            })
            .await
    }

    /// Score a candidate text against reference sources.
    pub async fn score_similarity(
        &self,
        candidate: &str,
        sources: &[SourceText],
    ) -> FolioResult<SimilarityReport> {
        if candidate.trim().is_empty() {
            return Err(ValidationError::RequiredFieldMissing {
                field: "text".to_string(),
            }
            .into());
        }
        let parts = std::iter::once(candidate).chain(
            sources
                .iter()
                .flat_map(|s| [s.label.as_str(), s.text.as_str()]),
        );
        let key = CacheKey::from_parts(OP_SIMILARITY, parts);
        let registry = self.registry.clone();
        let candidate = candidate.to_string();
        let sources = sources.to_vec();

        self.cache
            .get_or_compute(&key, self.ttls.similarity, move || async move {
                let scorer = registry.similarity_scorer()?;
                scorer.score(&candidate, &sources).await
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MockLiteratureSearch, MockTextGenerator, ShingleSimilarityScorer, TextGenerator};
    use async_trait::async_trait;
    use folio_core::{
        Clock, DocumentId, EntityIdType, FolioError, ManualClock, SectionId,
    };
    use folio_storage::{CacheConfig, InMemoryKeyValueStore};
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingGenerator {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl TextGenerator for CountingGenerator {
        async fn generate(&self, prompt: &GenerationPrompt) -> FolioResult<String> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(format!("{} #{}", prompt.title, n))
        }

        fn provider_id(&self) -> &str {
            "counting"
        }
    }

    fn providers(registry: ProviderRegistry) -> CachedProviders {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::starting_now());
        let store = Arc::new(InMemoryKeyValueStore::new(clock.clone()));
        let cache = ComputeCache::new(store, clock, CacheConfig::new());
        CachedProviders::new(Arc::new(registry), cache, ProviderTtls::default())
    }

    fn task(section: &str, title: &str) -> GenerationTask {
        GenerationTask {
            document_id: DocumentId::nil(),
            section_id: SectionId::from(section),
            title: title.to_string(),
            context: String::new(),
        }
    }

    #[tokio::test]
    async fn test_generation_is_memoized_per_task() {
        let generator = Arc::new(CountingGenerator::default());
        let mut registry = ProviderRegistry::new();
        registry.register_text_generator(generator.clone());
        let providers = providers(registry);

        let first = providers.generate_section(&task("intro", "Introduction")).await.unwrap();
        let again = providers
            .generate_section(&task("intro", "  introduction "))
            .await
            .unwrap();
        assert!(!first.was_cache_hit());
        assert!(again.was_cache_hit());
        assert_eq!(first.value().content, again.value().content);

        providers.generate_section(&task("methods", "Methods")).await.unwrap();
        assert_eq!(generator.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_provider_is_not_cached() {
        let providers = providers(ProviderRegistry::new());
        let err = providers
            .generate_section(&task("intro", "Introduction"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            FolioError::Upstream(UpstreamError::ProviderNotConfigured { .. })
        ));
        assert_eq!(providers.cache().stats().computes, 0);
    }

    #[tokio::test]
    async fn test_blank_title_rejected() {
        let mut registry = ProviderRegistry::new();
        registry.register_text_generator(Arc::new(MockTextGenerator::new()));
        let err = providers(registry)
            .generate_section(&task("intro", "  "))
            .await
            .unwrap_err();
        assert!(matches!(err, FolioError::Validation(_)));
    }

    #[tokio::test]
    async fn test_search_validates_limit_and_caches() {
        let mut registry = ProviderRegistry::new();
        registry.register_literature_search(Arc::new(MockLiteratureSearch));
        let providers = providers(registry);

        assert!(providers.search_literature("q", 0).await.is_err());
        assert!(providers.search_literature("  ", 5).await.is_err());

        let records = providers.search_literature("Protein Folding", 2).await.unwrap();
        assert_eq!(records.len(), 2);
        providers.search_literature("protein  folding", 2).await.unwrap();
        assert_eq!(providers.cache().stats().hits, 1);
    }

    #[tokio::test]
    async fn test_doi_validation() {
        let providers = providers(ProviderRegistry::new());
        let err = providers.resolve_doi("not-a-doi").await.unwrap_err();
        assert!(matches!(err, FolioError::Validation(_)));
    }

    #[tokio::test]
    async fn test_similarity_uses_default_scorer() {
        let mut registry = ProviderRegistry::new();
        registry.register_similarity_scorer(Arc::new(ShingleSimilarityScorer::default()));
        let providers = providers(registry);
        let report = providers
            .score_similarity(
                "the cat sat on the mat",
                &[SourceText {
                    label: "a".to_string(),
                    text: "the cat sat on the mat today".to_string(),
                }],
            )
            .await
            .unwrap();
        assert_eq!(report.score, 1.0);
    }
}
