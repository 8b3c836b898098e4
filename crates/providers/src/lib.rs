//! Reasoning backends and the oracle adapter stack for LysAI.
//!
//! Raw backends implement `lysai_core::Provider`; everything the pipeline
//! talks to implements `lysai_core::Oracle`. The router assembles retry,
//! failover and the heuristic responder from configuration.

pub mod failover;
pub mod heuristic;
pub mod openai_compat;
pub mod retry;
pub mod router;

pub use failover::FailoverOracle;
pub use heuristic::HeuristicResponder;
pub use openai_compat::OpenAiCompatProvider;
pub use retry::RetryingOracle;
pub use router::{build_oracle, build_provider};
