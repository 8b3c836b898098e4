//! Episodic memory types and the two memory-tier traits.
//!
//! - [`EpisodeStore`]: durable log of one record per run, with keyword search
//! - [`SimilarityIndex`]: vector lookup over past questions and insights,
//!   used to assemble [`LearningContext`] before each decision
//! - [`Embedder`]: turns text into vectors for the similarity index

use crate::error::MemoryError;
use crate::state::Row;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a stored episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EpisodeId(pub i64);

impl fmt::Display for EpisodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Error,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::Error => "error",
        }
    }

    /// Parse a stored tag. Unknown tags read as unset.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "success" => Some(Outcome::Success),
            "error" => Some(Outcome::Error),
            _ => None,
        }
    }
}

/// One durable record of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub id: EpisodeId,
    pub timestamp: DateTime<Utc>,
    pub question: String,
    /// Plan snapshot; empty when never set or unreadable
    #[serde(default)]
    pub plan: Vec<String>,
    pub sql: Option<String>,
    /// Rows snapshot; `None` when unreadable
    pub rows: Option<Vec<Row>>,
    pub outcome: Option<Outcome>,
    pub error: Option<String>,
    pub insight: Option<String>,
}

impl Episode {
    pub fn is_success(&self) -> bool {
        self.outcome == Some(Outcome::Success)
    }

    pub fn has_sql(&self) -> bool {
        self.sql.as_deref().is_some_and(|s| !s.trim().is_empty())
    }

    pub fn has_insight(&self) -> bool {
        self.insight.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

/// A partial update to an episode. Unset fields are left untouched.
///
/// `error` is doubly optional: `Some(None)` clears a stored error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EpisodeUpdate {
    pub plan: Option<Vec<String>>,
    pub sql: Option<String>,
    pub rows: Option<Vec<Row>>,
    pub outcome: Option<Outcome>,
    pub error: Option<Option<String>>,
    pub insight: Option<String>,
}

impl EpisodeUpdate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plan(mut self, plan: Vec<String>) -> Self {
        self.plan = Some(plan);
        self
    }

    pub fn sql(mut self, sql: impl Into<String>) -> Self {
        self.sql = Some(sql.into());
        self
    }

    pub fn rows(mut self, rows: Vec<Row>) -> Self {
        self.rows = Some(rows);
        self
    }

    pub fn outcome(mut self, outcome: Outcome) -> Self {
        self.outcome = Some(outcome);
        self
    }

    pub fn error(mut self, error: Option<String>) -> Self {
        self.error = Some(error);
        self
    }

    pub fn insight(mut self, insight: impl Into<String>) -> Self {
        self.insight = Some(insight.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Merge this update into an episode in place.
    pub fn apply_to(&self, episode: &mut Episode) {
        if let Some(plan) = &self.plan {
            episode.plan = plan.clone();
        }
        if let Some(sql) = &self.sql {
            episode.sql = Some(sql.clone());
        }
        if let Some(rows) = &self.rows {
            episode.rows = Some(rows.clone());
        }
        if let Some(outcome) = self.outcome {
            episode.outcome = Some(outcome);
        }
        if let Some(error) = &self.error {
            episode.error = error.clone();
        }
        if let Some(insight) = &self.insight {
            episode.insight = Some(insight.clone());
        }
    }
}

/// Which similarity collection a match came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContentType {
    Question,
    Insight,
}

impl ContentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Question => "question",
            ContentType::Insight => "insight",
        }
    }
}

/// A query-time match from the similarity index, resolved to its episode.
/// Never persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SemanticMatch {
    pub episode_id: EpisodeId,
    pub episode: Episode,
    /// Raw distance from the index (lower = closer)
    pub distance: f32,
    /// `max(0, 1 - distance)`, in [0, 1]
    pub similarity: f32,
    pub content_type: ContentType,
}

/// A similar successful past run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternHint {
    pub episode_id: EpisodeId,
    pub question: String,
    pub sql: Option<String>,
    pub similarity: f32,
    pub outcome: Option<Outcome>,
}

/// An insight from a past run that looks relevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsightHint {
    pub episode_id: EpisodeId,
    pub insight: String,
    pub original_question: String,
    pub similarity: f32,
}

/// What memory contributes to one decision.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LearningContext {
    pub similar_patterns: Vec<PatternHint>,
    pub relevant_insights: Vec<InsightHint>,
}

impl LearningContext {
    pub fn is_empty(&self) -> bool {
        self.similar_patterns.is_empty() && self.relevant_insights.is_empty()
    }
}

/// Durable per-run log.
#[async_trait]
pub trait EpisodeStore: Send + Sync {
    fn name(&self) -> &str;

    /// Create an episode and return its id.
    async fn log_episode(
        &self,
        question: &str,
        plan: &[String],
        sql: Option<&str>,
    ) -> std::result::Result<EpisodeId, MemoryError>;

    /// Patch the named fields of an episode, leaving the rest as stored.
    async fn update_episode(
        &self,
        id: EpisodeId,
        update: EpisodeUpdate,
    ) -> std::result::Result<(), MemoryError>;

    /// Keyword search over question, sql and insight text, best first.
    /// Returns an empty list when nothing is indexed yet.
    async fn search_similar(
        &self,
        query: &str,
        limit: usize,
    ) -> std::result::Result<Vec<Episode>, MemoryError>;

    /// Most recent successful episodes that have sql, newest first.
    async fn recent_successes(&self, limit: usize)
    -> std::result::Result<Vec<Episode>, MemoryError>;

    /// Fetch one episode; `Ok(None)` when it does not exist.
    async fn get_episode(&self, id: EpisodeId)
    -> std::result::Result<Option<Episode>, MemoryError>;
}

/// Vector similarity over past questions and insights.
///
/// Every operation is best effort: an unavailable index degrades to empty
/// results and never fails a run.
#[async_trait]
pub trait SimilarityIndex: Send + Sync {
    fn name(&self) -> &str;

    /// Index an episode's question and insight (whichever are non-empty).
    async fn add(&self, episode_id: EpisodeId, question: &str, insight: Option<&str>);

    async fn search_similar_questions(&self, query: &str, limit: usize) -> Vec<SemanticMatch>;

    async fn search_similar_insights(&self, query: &str, limit: usize) -> Vec<SemanticMatch>;

    /// Similar successful patterns and relevant insights for a question.
    async fn get_learning_context(&self, question: &str) -> LearningContext;
}

/// Text embedding backend.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn name(&self) -> &str;

    async fn embed(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, MemoryError>;
}
