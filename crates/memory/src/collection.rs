//! Vector collections: the storage under the similarity index.
//!
//! A collection holds `(id, episode_id, document, embedding)` entries and
//! answers nearest-neighbour queries with cosine distances. The similarity
//! index keeps two of them: one over questions, one over insights.

use async_trait::async_trait;
use lysai_core::error::MemoryError;
use lysai_core::EpisodeId;

/// Collection holding past questions.
pub const QUESTIONS_COLLECTION: &str = "episode_questions";
/// Collection holding past insights.
pub const INSIGHTS_COLLECTION: &str = "episode_insights";

/// One stored entry.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionEntry {
    /// Entry id, e.g. `question_42`; re-adding the same id replaces it
    pub id: String,
    pub episode_id: EpisodeId,
    pub document: String,
    pub embedding: Vec<f32>,
}

/// A query result.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionHit {
    pub episode_id: EpisodeId,
    pub document: String,
    /// Cosine distance (lower = closer)
    pub distance: f32,
}

#[async_trait]
pub trait VectorCollection: Send + Sync {
    fn name(&self) -> &str;

    /// Insert or replace an entry by id.
    async fn upsert(&self, entry: CollectionEntry) -> Result<(), MemoryError>;

    /// Nearest entries to `embedding`, closest first.
    async fn query(&self, embedding: &[f32], limit: usize)
    -> Result<Vec<CollectionHit>, MemoryError>;

    async fn count(&self) -> Result<usize, MemoryError>;
}
