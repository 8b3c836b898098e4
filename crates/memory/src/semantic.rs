//! The similarity index: two vector collections over past runs.
//!
//! Questions are indexed as `question_{id}`, insights as `insight_{id}`.
//! Matches are resolved back to their episodes through the episode store;
//! entries whose episode no longer exists are dropped.
//!
//! Nothing here fails a run. Embedding or storage problems are logged and
//! read as "no matches".

use crate::collection::{
    CollectionEntry, CollectionHit, INSIGHTS_COLLECTION, QUESTIONS_COLLECTION, VectorCollection,
};
use crate::in_memory::InMemoryCollection;
use crate::sqlite::{SqliteCollection, SqliteEpisodeStore};
use async_trait::async_trait;
use lysai_core::error::MemoryError;
use lysai_core::{
    ContentType, Embedder, EpisodeId, EpisodeStore, InsightHint, LearningContext, PatternHint,
    SemanticMatch, SimilarityIndex,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Patterns must be more similar than this to be offered.
pub const PATTERN_SIMILARITY_THRESHOLD: f32 = 0.3;
/// Insights must be more similar than this to be offered.
pub const INSIGHT_SIMILARITY_THRESHOLD: f32 = 0.2;
/// At most this many patterns and this many insights per learning context.
pub const LEARNING_CONTEXT_CAP: usize = 3;

/// Entry counts per collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub questions: usize,
    pub insights: usize,
    pub total: usize,
}

pub struct SemanticIndex {
    store: Arc<dyn EpisodeStore>,
    embedder: Arc<dyn Embedder>,
    questions: Arc<dyn VectorCollection>,
    insights: Arc<dyn VectorCollection>,
}

impl SemanticIndex {
    pub fn new(
        store: Arc<dyn EpisodeStore>,
        embedder: Arc<dyn Embedder>,
        questions: Arc<dyn VectorCollection>,
        insights: Arc<dyn VectorCollection>,
    ) -> Self {
        Self {
            store,
            embedder,
            questions,
            insights,
        }
    }

    /// Index backed by in-process collections.
    pub fn in_memory(store: Arc<dyn EpisodeStore>, embedder: Arc<dyn Embedder>) -> Self {
        Self::new(
            store,
            embedder,
            Arc::new(InMemoryCollection::new(QUESTIONS_COLLECTION)),
            Arc::new(InMemoryCollection::new(INSIGHTS_COLLECTION)),
        )
    }

    /// Index persisted next to the episodes in the same database.
    pub async fn sqlite(
        store: Arc<SqliteEpisodeStore>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Self, MemoryError> {
        let questions = SqliteCollection::new(store.pool(), QUESTIONS_COLLECTION).await?;
        let insights = SqliteCollection::new(store.pool(), INSIGHTS_COLLECTION).await?;
        Ok(Self::new(
            store,
            embedder,
            Arc::new(questions),
            Arc::new(insights),
        ))
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>, MemoryError> {
        self.embedder
            .embed(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| MemoryError::EmbeddingFailed("empty embedding batch".into()))
    }

    async fn try_add(
        &self,
        episode_id: EpisodeId,
        question: &str,
        insight: Option<&str>,
    ) -> Result<(), MemoryError> {
        if !question.trim().is_empty() {
            let embedding = self.embed_one(question).await?;
            self.questions
                .upsert(CollectionEntry {
                    id: format!("question_{episode_id}"),
                    episode_id,
                    document: question.to_string(),
                    embedding,
                })
                .await?;
        }

        if let Some(insight) = insight.filter(|i| !i.trim().is_empty()) {
            let embedding = self.embed_one(insight).await?;
            self.insights
                .upsert(CollectionEntry {
                    id: format!("insight_{episode_id}"),
                    episode_id,
                    document: insight.to_string(),
                    embedding,
                })
                .await?;
        }
        Ok(())
    }

    async fn search(
        &self,
        collection: &dyn VectorCollection,
        content_type: ContentType,
        query: &str,
        limit: usize,
    ) -> Vec<SemanticMatch> {
        if query.trim().is_empty() || limit == 0 {
            return Vec::new();
        }

        let hits: Vec<CollectionHit> = match self.embed_one(query).await {
            Ok(embedding) => match collection.query(&embedding, limit).await {
                Ok(hits) => hits,
                Err(e) => {
                    warn!(collection = collection.name(), "Similarity query failed: {e}");
                    return Vec::new();
                }
            },
            Err(e) => {
                warn!("Query embedding failed: {e}");
                return Vec::new();
            }
        };

        let mut matches = Vec::with_capacity(hits.len());
        for hit in hits {
            match self.store.get_episode(hit.episode_id).await {
                Ok(Some(episode)) => matches.push(SemanticMatch {
                    episode_id: hit.episode_id,
                    episode,
                    distance: hit.distance,
                    similarity: (1.0 - hit.distance).max(0.0),
                    content_type,
                }),
                Ok(None) => {
                    debug!(episode_id = %hit.episode_id, "Dropping match for vanished episode");
                }
                Err(e) => {
                    warn!(episode_id = %hit.episode_id, "Episode lookup failed: {e}");
                }
            }
        }
        matches
    }

    /// Index up to `limit` recent successful episodes. Returns how many were added.
    pub async fn populate_from_existing(&self, limit: usize) -> usize {
        let episodes = match self.store.recent_successes(limit).await {
            Ok(episodes) => episodes,
            Err(e) => {
                warn!("Could not read episodes for indexing: {e}");
                return 0;
            }
        };

        let mut added = 0;
        for episode in &episodes {
            match self
                .try_add(episode.id, &episode.question, episode.insight.as_deref())
                .await
            {
                Ok(()) => added += 1,
                Err(e) => warn!(episode_id = %episode.id, "Indexing failed: {e}"),
            }
        }
        info!(added, "Similarity index populated from existing episodes");
        added
    }

    pub async fn stats(&self) -> IndexStats {
        let questions = self.questions.count().await.unwrap_or_else(|e| {
            warn!("Question count failed: {e}");
            0
        });
        let insights = self.insights.count().await.unwrap_or_else(|e| {
            warn!("Insight count failed: {e}");
            0
        });
        IndexStats {
            questions,
            insights,
            total: questions + insights,
        }
    }
}

#[async_trait]
impl SimilarityIndex for SemanticIndex {
    fn name(&self) -> &str {
        "semantic"
    }

    async fn add(&self, episode_id: EpisodeId, question: &str, insight: Option<&str>) {
        match self.try_add(episode_id, question, insight).await {
            Ok(()) => debug!(episode_id = %episode_id, "Indexed episode"),
            Err(e) => warn!(episode_id = %episode_id, "Failed to index episode: {e}"),
        }
    }

    async fn search_similar_questions(&self, query: &str, limit: usize) -> Vec<SemanticMatch> {
        self.search(self.questions.as_ref(), ContentType::Question, query, limit)
            .await
    }

    async fn search_similar_insights(&self, query: &str, limit: usize) -> Vec<SemanticMatch> {
        self.search(self.insights.as_ref(), ContentType::Insight, query, limit)
            .await
    }

    async fn get_learning_context(&self, question: &str) -> LearningContext {
        let similar_patterns = self
            .search_similar_questions(question, LEARNING_CONTEXT_CAP * 2)
            .await
            .into_iter()
            .filter(|m| {
                m.episode.is_success()
                    && m.episode.has_sql()
                    && m.similarity > PATTERN_SIMILARITY_THRESHOLD
            })
            .take(LEARNING_CONTEXT_CAP)
            .map(|m| PatternHint {
                episode_id: m.episode_id,
                question: m.episode.question,
                sql: m.episode.sql,
                similarity: m.similarity,
                outcome: m.episode.outcome,
            })
            .collect();

        let relevant_insights = self
            .search_similar_insights(question, LEARNING_CONTEXT_CAP)
            .await
            .into_iter()
            .filter(|m| m.episode.has_insight() && m.similarity > INSIGHT_SIMILARITY_THRESHOLD)
            .take(LEARNING_CONTEXT_CAP)
            .map(|m| InsightHint {
                episode_id: m.episode_id,
                insight: m.episode.insight.unwrap_or_default(),
                original_question: m.episode.question,
                similarity: m.similarity,
            })
            .collect();

        LearningContext {
            similar_patterns,
            relevant_insights,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashingEmbedder;
    use crate::in_memory::InMemoryEpisodeStore;
    use lysai_core::{EpisodeUpdate, Outcome};

    /// Embeds by keyword: texts sharing a listed keyword point the same way.
    struct KeywordEmbedder;

    #[async_trait]
    impl Embedder for KeywordEmbedder {
        fn name(&self) -> &str {
            "keyword"
        }

        async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
            Ok(texts
                .iter()
                .map(|t| {
                    let t = t.to_lowercase();
                    vec![
                        if t.contains("actor") { 1.0 } else { 0.0 },
                        if t.contains("revenue") { 1.0 } else { 0.0 },
                        if t.contains("category") { 1.0 } else { 0.0 },
                        0.01,
                    ]
                })
                .collect())
        }
    }

    struct FailingEmbedder;

    #[async_trait]
    impl Embedder for FailingEmbedder {
        fn name(&self) -> &str {
            "failing"
        }

        async fn embed(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, MemoryError> {
            Err(MemoryError::EmbeddingFailed("offline".into()))
        }
    }

    async fn successful_episode(
        store: &InMemoryEpisodeStore,
        question: &str,
        sql: Option<&str>,
        insight: Option<&str>,
    ) -> EpisodeId {
        let id = store.log_episode(question, &[], sql).await.unwrap();
        let mut update = EpisodeUpdate::new().outcome(Outcome::Success);
        if let Some(insight) = insight {
            update = update.insight(insight);
        }
        store.update_episode(id, update).await.unwrap();
        id
    }

    fn index(store: Arc<InMemoryEpisodeStore>, embedder: Arc<dyn Embedder>) -> SemanticIndex {
        SemanticIndex::in_memory(store, embedder)
    }

    #[tokio::test]
    async fn empty_index_gives_empty_context() {
        let store = Arc::new(InMemoryEpisodeStore::new());
        let index = index(store, Arc::new(KeywordEmbedder));
        let ctx = index.get_learning_context("top actors").await;
        assert!(ctx.is_empty());
    }

    #[tokio::test]
    async fn similar_pattern_and_insight_surface() {
        let store = Arc::new(InMemoryEpisodeStore::new());
        let id = successful_episode(
            &store,
            "List top 5 actors",
            Some("SELECT actor_id FROM film_actor"),
            Some("GINA DEGENERES leads with 42 films"),
        )
        .await;
        let index = index(store.clone(), Arc::new(KeywordEmbedder));
        index
            .add(id, "List top 5 actors", Some("Top actor GINA DEGENERES leads with 42 films"))
            .await;

        let ctx = index.get_learning_context("Who are the most prolific actors?").await;
        assert_eq!(ctx.similar_patterns.len(), 1);
        let pattern = &ctx.similar_patterns[0];
        assert_eq!(pattern.episode_id, id);
        assert_eq!(pattern.sql.as_deref(), Some("SELECT actor_id FROM film_actor"));
        assert!(pattern.similarity > 0.9);

        assert_eq!(ctx.relevant_insights.len(), 1);
        assert_eq!(ctx.relevant_insights[0].original_question, "List top 5 actors");
        assert_eq!(
            ctx.relevant_insights[0].insight,
            "GINA DEGENERES leads with 42 films"
        );
    }

    #[tokio::test]
    async fn unsuccessful_or_sql_less_patterns_excluded() {
        let store = Arc::new(InMemoryEpisodeStore::new());
        let failed = store
            .log_episode("actors query", &[], Some("SELECT bad"))
            .await
            .unwrap();
        store
            .update_episode(failed, EpisodeUpdate::new().outcome(Outcome::Error))
            .await
            .unwrap();
        let no_sql = successful_episode(&store, "actors list", None, None).await;

        let index = index(store.clone(), Arc::new(KeywordEmbedder));
        index.add(failed, "actors query", None).await;
        index.add(no_sql, "actors list", None).await;

        let ctx = index.get_learning_context("actors").await;
        assert!(ctx.similar_patterns.is_empty());
    }

    #[tokio::test]
    async fn dissimilar_patterns_below_threshold_excluded() {
        let store = Arc::new(InMemoryEpisodeStore::new());
        let id = successful_episode(&store, "monthly revenue", Some("SELECT 1"), None).await;
        let index = index(store.clone(), Arc::new(KeywordEmbedder));
        index.add(id, "monthly revenue", None).await;

        // Orthogonal apart from the tiny shared component
        let ctx = index.get_learning_context("top actors").await;
        assert!(ctx.similar_patterns.is_empty());
    }

    #[tokio::test]
    async fn patterns_capped_at_three() {
        let store = Arc::new(InMemoryEpisodeStore::new());
        let index = index(store.clone(), Arc::new(KeywordEmbedder));
        for i in 0..5 {
            let question = format!("actors question {i}");
            let id = successful_episode(&store, &question, Some("SELECT 1"), None).await;
            index.add(id, &question, None).await;
        }

        let ctx = index.get_learning_context("actors").await;
        assert_eq!(ctx.similar_patterns.len(), 3);
    }

    #[tokio::test]
    async fn vanished_episodes_dropped() {
        let store = Arc::new(InMemoryEpisodeStore::new());
        let index = index(store.clone(), Arc::new(KeywordEmbedder));
        index.add(EpisodeId(77), "actors ghost", None).await;

        assert!(index.search_similar_questions("actors", 5).await.is_empty());
        assert_eq!(index.stats().await.questions, 1);
    }

    #[tokio::test]
    async fn similarity_clamped_to_unit_range() {
        let store = Arc::new(InMemoryEpisodeStore::new());
        let id = successful_episode(&store, "actors", Some("SELECT 1"), None).await;
        let index = index(store.clone(), Arc::new(HashingEmbedder::default()));
        index.add(id, "actors", None).await;

        for m in index.search_similar_questions("revenue by store", 5).await {
            assert!((0.0..=1.0).contains(&m.similarity));
            assert_eq!(m.content_type, ContentType::Question);
        }
    }

    #[tokio::test]
    async fn re_adding_replaces_entries() {
        let store = Arc::new(InMemoryEpisodeStore::new());
        let id = successful_episode(&store, "actors", Some("SELECT 1"), Some("first")).await;
        let index = index(store.clone(), Arc::new(KeywordEmbedder));
        index.add(id, "actors", None).await;
        index.add(id, "actors", Some("category insight")).await;

        let stats = index.stats().await;
        assert_eq!(
            stats,
            IndexStats {
                questions: 1,
                insights: 1,
                total: 2
            }
        );
    }

    #[tokio::test]
    async fn embedding_failure_degrades_to_empty() {
        let store = Arc::new(InMemoryEpisodeStore::new());
        let id = successful_episode(&store, "actors", Some("SELECT 1"), None).await;
        let index = index(store.clone(), Arc::new(FailingEmbedder));

        index.add(id, "actors", None).await;
        assert_eq!(index.stats().await.total, 0);
        assert!(index.get_learning_context("actors").await.is_empty());
    }

    #[tokio::test]
    async fn populate_indexes_recent_successes() {
        let store = Arc::new(InMemoryEpisodeStore::new());
        successful_episode(&store, "actors a", Some("SELECT 1"), Some("category insight")).await;
        successful_episode(&store, "revenue b", Some("SELECT 2"), None).await;
        store.log_episode("pending", &[], None).await.unwrap();

        let index = index(store.clone(), Arc::new(KeywordEmbedder));
        assert_eq!(index.populate_from_existing(100).await, 2);

        let stats = index.stats().await;
        assert_eq!(stats.questions, 2);
        assert_eq!(stats.insights, 1);
    }

    #[tokio::test]
    async fn sqlite_backed_index_round_trip() {
        let store = Arc::new(SqliteEpisodeStore::new("sqlite::memory:").await.unwrap());
        let id = store
            .log_episode("top actors", &[], Some("SELECT actor_id FROM film_actor"))
            .await
            .unwrap();
        store
            .update_episode(id, EpisodeUpdate::new().outcome(Outcome::Success))
            .await
            .unwrap();

        let index = SemanticIndex::sqlite(store.clone(), Arc::new(KeywordEmbedder))
            .await
            .unwrap();
        index.add(id, "top actors", None).await;

        let ctx = index.get_learning_context("actors ranking").await;
        assert_eq!(ctx.similar_patterns.len(), 1);
        assert_eq!(ctx.similar_patterns[0].episode_id, id);
    }
}
