//! Deterministic providers for development and tests.

use std::collections::HashMap;

use async_trait::async_trait;
use folio_core::{canonicalize_identifier, FolioResult};

use crate::{
    BibliographicRecord, GenerationPrompt, LiteratureRecord, LiteratureSearch, MetadataResolver,
    TextGenerator,
};

/// Mock text generator.
/// Produces a short templated section from the prompt.
#[derive(Debug, Clone)]
pub struct MockTextGenerator {
    id: String,
}

impl MockTextGenerator {
    pub fn new() -> Self {
        Self {
            id: "mock-generator".to_string(),
        }
    }
}

impl Default for MockTextGenerator {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TextGenerator for MockTextGenerator {
    async fn generate(&self, prompt: &GenerationPrompt) -> FolioResult<String> {
        let guidance = if prompt.context.trim().is_empty() {
            "No additional guidance was provided.".to_string()
        } else {
            format!("Guided by: {}", prompt.context.trim())
        };
        Ok(format!("## {}\n\n{}", prompt.title.trim(), guidance))
    }

    fn provider_id(&self) -> &str {
        &self.id
    }
}

/// Mock literature search.
/// Returns `limit` synthetic records derived from the query.
#[derive(Debug, Clone, Default)]
pub struct MockLiteratureSearch;

#[async_trait]
impl LiteratureSearch for MockLiteratureSearch {
    async fn search(&self, query: &str, limit: usize) -> FolioResult<Vec<LiteratureRecord>> {
        let topic = query.trim();
        Ok((1..=limit)
            .map(|n| LiteratureRecord {
                title: format!("{}: a survey, part {}", topic, n),
                authors: vec![format!("Author {}", n)],
                year: Some(2020 + (n % 5) as i32),
                doi: Some(format!("10.5555/mock.{}", n)),
                venue: Some("Journal of Mock Studies".to_string()),
                abstract_text: None,
            })
            .collect())
    }

    fn provider_id(&self) -> &str {
        "mock-search"
    }
}

/// Mock metadata resolver over a fixed table.
#[derive(Debug, Clone, Default)]
pub struct MockMetadataResolver {
    records: HashMap<String, BibliographicRecord>,
}

impl MockMetadataResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record, keyed by its canonical DOI.
    pub fn with_record(mut self, record: BibliographicRecord) -> Self {
        self.records
            .insert(canonicalize_identifier(&record.doi), record);
        self
    }
}

#[async_trait]
impl MetadataResolver for MockMetadataResolver {
    async fn resolve(&self, doi: &str) -> FolioResult<Option<BibliographicRecord>> {
        Ok(self.records.get(&canonicalize_identifier(doi)).cloned())
    }

    fn provider_id(&self) -> &str {
        "mock-metadata"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_generator_uses_title_and_context() {
        let text = MockTextGenerator::new()
            .generate(&GenerationPrompt {
                title: "Methods".to_string(),
                context: "survey design".to_string(),
            })
            .await
            .unwrap();
        assert!(text.starts_with("## Methods"));
        assert!(text.contains("survey design"));
    }

    #[tokio::test]
    async fn test_mock_search_honours_limit() {
        let records = MockLiteratureSearch.search("ontology", 3).await.unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].title.starts_with("ontology"));
    }

    #[tokio::test]
    async fn test_mock_resolver_matches_canonical_doi() {
        let resolver = MockMetadataResolver::new().with_record(BibliographicRecord {
            doi: "10.1000/ABC".to_string(),
            title: "A Paper".to_string(),
            authors: vec![],
            year: Some(2021),
            container_title: None,
            publisher: None,
            url: None,
        });
        assert!(resolver
            .resolve("https://doi.org/10.1000/abc")
            .await
            .unwrap()
            .is_some());
        assert!(resolver.resolve("10.1000/other").await.unwrap().is_none());
    }
}
