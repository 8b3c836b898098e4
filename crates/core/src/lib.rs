//! # LysAI Core
//!
//! Domain types, traits, and error definitions for the LysAI analysis
//! pipeline. This crate has **zero framework dependencies**: it defines the
//! domain model that all other crates implement against.
//!
//! ## Design Philosophy
//!
//! Every collaborator of the decision loop is a trait here:
//! - [`Provider`]: a raw reasoning backend (chat completion, embeddings)
//! - [`Oracle`]: the adapter the policy engine and stages talk to
//! - [`EpisodeStore`] / [`SimilarityIndex`]: the two memory tiers
//! - [`ToolServer`]: the remote tool server the stages call
//! - [`Stage`]: one pipeline stage operating on the [`RunState`]
//!
//! Implementations live in their respective crates and are injected as
//! `Arc<dyn Trait>` handles; nothing here holds global state.

pub mod action;
pub mod episode;
pub mod error;
pub mod labels;
pub mod message;
pub mod oracle;
pub mod provider;
pub mod stage;
pub mod state;
pub mod tool;

// Re-export key types at crate root for ergonomics
pub use action::{Action, UnknownAction};
pub use episode::{
    ContentType, Embedder, Episode, EpisodeId, EpisodeStore, EpisodeUpdate, InsightHint,
    LearningContext, Outcome, PatternHint, SemanticMatch, SimilarityIndex,
};
pub use error::{MemoryError, OracleError, ProviderError, ToolError};
pub use message::{Message, Role};
pub use oracle::{Oracle, OracleRequest, OracleResponse};
pub use provider::{Provider, ProviderRequest, ProviderResponse};
pub use stage::Stage;
pub use state::{
    ContextUsed, DecisionSource, HistoryEntry, OrchestratorEvent, Row, RunError, RunState,
    STATE_INDICATORS, plan_from_value,
};
pub use tool::{ToolDescriptor, ToolServer};
