//! The LysAI decision loop.
//!
//! Each iteration runs **guards → policy → stage**:
//!
//! 1. **Guards** end the run when the step budget is spent and break out
//!    of repeated decisions with a forced next step
//! 2. **Policy**: the oracle picks the next action from the rendered run
//!    state and learning context; the fallback tree stands in when the
//!    oracle fails or answers with something unreadable
//! 3. **Stage**: the chosen action's stage mutates the run state
//!
//! The runner repeats until DONE and keeps the episodic store and the
//! similarity index up to date along the way.

pub mod context;
pub mod decision;
pub mod fallback;
pub mod guards;
pub mod policy;
pub mod runner;
pub mod stages;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use decision::{ParsedDecision, parse_decision};
pub use fallback::{fallback_decision, fallback_decision_with};
pub use guards::{Guards, force_progression};
pub use policy::{PolicyEngine, mandatory_step};
pub use runner::{PipelineRunner, RunResult};
pub use stages::StageSet;
