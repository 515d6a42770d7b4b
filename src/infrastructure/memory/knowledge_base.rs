//! Keyword-ranked knowledge base.
//!
//! Score is the fraction of query terms (longer than three characters) that
//! appear in a document's title or body.

use async_trait::async_trait;
use std::collections::HashSet;
use tokio::sync::RwLock;

use crate::domain::errors::StoreError;
use crate::domain::models::Resource;
use crate::domain::ports::KnowledgeProvider;

const EXCERPT_CHARS: usize = 200;

/// A searchable document.
#[derive(Debug, Clone)]
pub struct KnowledgeDocument {
    pub id: String,
    pub kind: String,
    pub title: String,
    pub content: String,
    pub url: Option<String>,
}

impl KnowledgeDocument {
    pub fn article(id: impl Into<String>, title: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: "article".to_string(),
            title: title.into(),
            content: content.into(),
            url: None,
        }
    }

    #[must_use]
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    fn excerpt(&self) -> String {
        self.content.chars().take(EXCERPT_CHARS).collect()
    }
}

fn terms(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| w.chars().count() > 3)
        .map(str::to_lowercase)
        .collect()
}

#[derive(Default)]
pub struct InMemoryKnowledgeBase {
    documents: RwLock<Vec<KnowledgeDocument>>,
}

impl InMemoryKnowledgeBase {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_documents(documents: Vec<KnowledgeDocument>) -> Self {
        Self {
            documents: RwLock::new(documents),
        }
    }

    pub async fn add(&self, document: KnowledgeDocument) {
        self.documents.write().await.push(document);
    }
}

#[async_trait]
impl KnowledgeProvider for InMemoryKnowledgeBase {
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Resource>, StoreError> {
        let query_terms = terms(query);
        if query_terms.is_empty() || limit == 0 {
            return Ok(Vec::new());
        }

        let documents = self.documents.read().await;
        let mut scored: Vec<(f64, &KnowledgeDocument)> = documents
            .iter()
            .filter_map(|doc| {
                let doc_terms = terms(&format!("{} {}", doc.title, doc.content));
                let hits = query_terms.intersection(&doc_terms).count();
                #[allow(clippy::cast_precision_loss)]
                let score = hits as f64 / query_terms.len() as f64;
                (hits > 0).then_some((score, doc))
            })
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(score, doc)| Resource {
                id: doc.id.clone(),
                kind: doc.kind.clone(),
                title: doc.title.clone(),
                url: doc.url.clone(),
                excerpt: Some(doc.excerpt()),
                relevance_score: Some(score),
            })
            .collect())
    }
}
