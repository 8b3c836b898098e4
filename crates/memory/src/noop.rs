//! No-op similarity index: disables semantic memory entirely.

use async_trait::async_trait;
use lysai_core::{EpisodeId, LearningContext, SemanticMatch, SimilarityIndex};

/// A similarity index that stores nothing and never matches.
pub struct NoopIndex;

#[async_trait]
impl SimilarityIndex for NoopIndex {
    fn name(&self) -> &str { "none" }

    async fn add(&self, _episode_id: EpisodeId, _question: &str, _insight: Option<&str>) {}

    async fn search_similar_questions(&self, _query: &str, _limit: usize) -> Vec<SemanticMatch> {
        Vec::new()
    }

    async fn search_similar_insights(&self, _query: &str, _limit: usize) -> Vec<SemanticMatch> {
        Vec::new()
    }

    async fn get_learning_context(&self, _question: &str) -> LearningContext {
        LearningContext::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn never_matches() {
        let index = NoopIndex;
        index.add(EpisodeId(1), "top actors", Some("insight")).await;
        assert!(index.search_similar_questions("top actors", 5).await.is_empty());
        assert!(index.get_learning_context("top actors").await.is_empty());
    }
}
