//! Episodic memory for LysAI.
//!
//! Two tiers:
//! - [`SqliteEpisodeStore`] / [`InMemoryEpisodeStore`]: the per-run episode log
//! - [`SemanticIndex`]: vector similarity over past questions and insights,
//!   backed by SQLite or in-process collections
//!
//! [`NoopIndex`] turns the similarity tier off.

pub mod collection;
pub mod embedding;
pub mod in_memory;
pub mod noop;
pub mod semantic;
pub mod sqlite;
pub mod vector;

pub use collection::{CollectionEntry, CollectionHit, VectorCollection};
pub use embedding::{HashingEmbedder, ProviderEmbedder};
pub use in_memory::{InMemoryCollection, InMemoryEpisodeStore};
pub use noop::NoopIndex;
pub use semantic::{IndexStats, SemanticIndex};
pub use sqlite::{SqliteCollection, SqliteEpisodeStore};
pub use vector::{cosine_distance, cosine_similarity};
