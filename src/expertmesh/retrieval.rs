//! Knowledge retrieval seam.
//!
//! Workers may consult a [`ContextRetriever`] before answering; whatever text it returns is
//! appended to the worker's system prompt. An empty string means "nothing relevant" and is not
//! an error.

use crate::expertmesh::error::RetrievalError;
use async_trait::async_trait;

#[async_trait]
pub trait ContextRetriever: Send + Sync {
    async fn retrieve_context(&self, query: &str) -> Result<String, RetrievalError>;
}

/// Retriever that never finds anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopRetriever;

#[async_trait]
impl ContextRetriever for NoopRetriever {
    async fn retrieve_context(&self, _query: &str) -> Result<String, RetrievalError> {
        Ok(String::new())
    }
}

/// Retriever backed by a fixed list of passages; returns the ones sharing a word with the query.
///
/// Handy for demos and tests where a vector store would be overkill.
#[derive(Debug, Clone, Default)]
pub struct StaticRetriever {
    passages: Vec<String>,
}

impl StaticRetriever {
    pub fn new<I, S>(passages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            passages: passages.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ContextRetriever for StaticRetriever {
    async fn retrieve_context(&self, query: &str) -> Result<String, RetrievalError> {
        let terms: Vec<String> = query
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| w.chars().count() > 3)
            .map(str::to_lowercase)
            .collect();

        let hits: Vec<&str> = self
            .passages
            .iter()
            .filter(|p| {
                let lower = p.to_lowercase();
                terms.iter().any(|t| lower.contains(t.as_str()))
            })
            .map(String::as_str)
            .collect();

        Ok(hits.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_returns_empty() {
        assert_eq!(NoopRetriever.retrieve_context("anything").await.unwrap(), "");
    }

    #[tokio::test]
    async fn test_static_retriever_matches_terms() {
        let retriever = StaticRetriever::new(vec![
            "Sourdough needs a mature starter.",
            "Tomatoes like full sun.",
        ]);
        let context = retriever
            .retrieve_context("How old should my starter be?")
            .await
            .unwrap();
        assert_eq!(context, "Sourdough needs a mature starter.");
        assert_eq!(retriever.retrieve_context("zzz").await.unwrap(), "");
    }
}
