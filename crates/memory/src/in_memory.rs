//! In-memory backends: useful for testing and ephemeral sessions.

use crate::collection::{CollectionEntry, CollectionHit, VectorCollection};
use crate::vector;
use async_trait::async_trait;
use chrono::Utc;
use lysai_core::error::MemoryError;
use lysai_core::{Episode, EpisodeId, EpisodeStore, EpisodeUpdate};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// An episode store that keeps episodes in a Vec.
/// Useful for testing and runs where persistence isn't needed.
pub struct InMemoryEpisodeStore {
    episodes: Arc<RwLock<Vec<Episode>>>,
}

impl InMemoryEpisodeStore {
    pub fn new() -> Self {
        Self {
            episodes: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Keyword relevance: how many query terms appear in the episode text.
    fn relevance(episode: &Episode, terms: &[String]) -> usize {
        let haystack = format!(
            "{} {} {}",
            episode.question,
            episode.sql.as_deref().unwrap_or_default(),
            episode.insight.as_deref().unwrap_or_default()
        )
        .to_lowercase();
        terms.iter().filter(|t| haystack.contains(t.as_str())).count()
    }
}

impl Default for InMemoryEpisodeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EpisodeStore for InMemoryEpisodeStore {
    fn name(&self) -> &str {
        "in_memory"
    }

    async fn log_episode(
        &self,
        question: &str,
        plan: &[String],
        sql: Option<&str>,
    ) -> Result<EpisodeId, MemoryError> {
        let mut episodes = self.episodes.write().await;
        let id = EpisodeId(episodes.last().map_or(1, |e| e.id.0 + 1));
        episodes.push(Episode {
            id,
            timestamp: Utc::now(),
            question: question.to_string(),
            plan: plan.to_vec(),
            sql: sql.map(str::to_string),
            rows: None,
            outcome: None,
            error: None,
            insight: None,
        });
        Ok(id)
    }

    async fn update_episode(&self, id: EpisodeId, update: EpisodeUpdate) -> Result<(), MemoryError> {
        if update.is_empty() {
            return Ok(());
        }
        let mut episodes = self.episodes.write().await;
        let episode = episodes
            .iter_mut()
            .find(|e| e.id == id)
            .ok_or(MemoryError::NotFound(id.0))?;
        update.apply_to(episode);
        Ok(())
    }

    async fn search_similar(&self, query: &str, limit: usize) -> Result<Vec<Episode>, MemoryError> {
        let terms: Vec<String> = query
            .split_whitespace()
            .map(|w| {
                w.chars()
                    .filter(|c| c.is_alphanumeric() || *c == '_')
                    .collect::<String>()
                    .to_lowercase()
            })
            .filter(|w| !w.is_empty())
            .collect();
        if terms.is_empty() {
            return Ok(Vec::new());
        }

        let episodes = self.episodes.read().await;
        let mut scored: Vec<(usize, &Episode)> = episodes
            .iter()
            .map(|e| (Self::relevance(e, &terms), e))
            .filter(|(score, _)| *score > 0)
            .collect();

        scored.sort_by(|a, b| b.0.cmp(&a.0).then(b.1.id.cmp(&a.1.id)));
        Ok(scored
            .into_iter()
            .take(limit)
            .map(|(_, e)| e.clone())
            .collect())
    }

    async fn recent_successes(&self, limit: usize) -> Result<Vec<Episode>, MemoryError> {
        let episodes = self.episodes.read().await;
        Ok(episodes
            .iter()
            .rev()
            .filter(|e| e.is_success() && e.sql.is_some())
            .take(limit)
            .cloned()
            .collect())
    }

    async fn get_episode(&self, id: EpisodeId) -> Result<Option<Episode>, MemoryError> {
        let episodes = self.episodes.read().await;
        Ok(episodes.iter().find(|e| e.id == id).cloned())
    }
}

/// A vector collection kept in a HashMap.
pub struct InMemoryCollection {
    name: String,
    entries: Arc<RwLock<HashMap<String, CollectionEntry>>>,
}

impl InMemoryCollection {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

#[async_trait]
impl VectorCollection for InMemoryCollection {
    fn name(&self) -> &str {
        &self.name
    }

    async fn upsert(&self, entry: CollectionEntry) -> Result<(), MemoryError> {
        self.entries.write().await.insert(entry.id.clone(), entry);
        Ok(())
    }

    async fn query(&self, embedding: &[f32], limit: usize) -> Result<Vec<CollectionHit>, MemoryError> {
        let entries = self.entries.read().await;
        Ok(vector::nearest(entries.values(), embedding, limit))
    }

    async fn count(&self) -> Result<usize, MemoryError> {
        Ok(self.entries.read().await.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lysai_core::Outcome;

    #[tokio::test]
    async fn log_then_get_returns_inputs() {
        let store = InMemoryEpisodeStore::new();
        let plan = vec!["join actor and film_actor".to_string(), "rank".to_string()];
        let id = store
            .log_episode("List top actors", &plan, Some("SELECT 1"))
            .await
            .unwrap();

        let ep = store.get_episode(id).await.unwrap().unwrap();
        assert_eq!(ep.question, "List top actors");
        assert_eq!(ep.plan, plan);
        assert_eq!(ep.sql.as_deref(), Some("SELECT 1"));
        assert!(ep.outcome.is_none());
    }

    #[tokio::test]
    async fn update_merges_fields() {
        let store = InMemoryEpisodeStore::new();
        let id = store.log_episode("q", &[], Some("SELECT 1")).await.unwrap();
        store
            .update_episode(id, EpisodeUpdate::new().insight("x"))
            .await
            .unwrap();

        let ep = store.get_episode(id).await.unwrap().unwrap();
        assert_eq!(ep.insight.as_deref(), Some("x"));
        assert_eq!(ep.question, "q");
        assert_eq!(ep.sql.as_deref(), Some("SELECT 1"));
    }

    #[tokio::test]
    async fn update_missing_episode_is_not_found() {
        let store = InMemoryEpisodeStore::new();
        let err = store
            .update_episode(EpisodeId(99), EpisodeUpdate::new().sql("SELECT 1"))
            .await
            .unwrap_err();
        assert!(matches!(err, MemoryError::NotFound(99)));
    }

    #[tokio::test]
    async fn empty_store_reads_are_empty() {
        let store = InMemoryEpisodeStore::new();
        assert!(store.search_similar("actors", 5).await.unwrap().is_empty());
        assert!(store.recent_successes(5).await.unwrap().is_empty());
        assert!(store.get_episode(EpisodeId(1)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn recent_successes_newest_first_with_sql() {
        let store = InMemoryEpisodeStore::new();
        let a = store.log_episode("a", &[], Some("SELECT a")).await.unwrap();
        let b = store.log_episode("b", &[], None).await.unwrap();
        let c = store.log_episode("c", &[], Some("SELECT c")).await.unwrap();
        for id in [a, b, c] {
            store
                .update_episode(id, EpisodeUpdate::new().outcome(Outcome::Success))
                .await
                .unwrap();
        }

        let recent = store.recent_successes(5).await.unwrap();
        let ids: Vec<_> = recent.iter().map(|e| e.id).collect();
        assert_eq!(ids, vec![c, a]);
    }

    #[tokio::test]
    async fn keyword_search_ranks_by_term_hits() {
        let store = InMemoryEpisodeStore::new();
        store.log_episode("List top actors", &[], None).await.unwrap();
        let best = store
            .log_episode("Top actors by film count", &[], Some("SELECT actor_id FROM film_actor"))
            .await
            .unwrap();
        store.log_episode("Revenue by store", &[], None).await.unwrap();

        let results = store.search_similar("actors film", 5).await.unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].id, best);
    }

    #[tokio::test]
    async fn collection_upsert_replaces_by_id() {
        let collection = InMemoryCollection::new("episode_questions");
        for embedding in [vec![1.0, 0.0], vec![0.0, 1.0]] {
            collection
                .upsert(CollectionEntry {
                    id: "question_1".into(),
                    episode_id: EpisodeId(1),
                    document: "q".into(),
                    embedding,
                })
                .await
                .unwrap();
        }
        assert_eq!(collection.count().await.unwrap(), 1);

        let hits = collection.query(&[0.0, 1.0], 5).await.unwrap();
        assert!(hits[0].distance.abs() < 1e-6);
    }
}
