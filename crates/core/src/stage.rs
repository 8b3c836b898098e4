//! Stage trait: one unit of pipeline work selected by an action.

use crate::action::Action;
use crate::state::RunState;
use async_trait::async_trait;

/// A pipeline stage.
///
/// Stages never fail past their own boundary: internal failures are
/// written to `state.error`. A stage appends at most one descriptive
/// record to the history.
#[async_trait]
pub trait Stage: Send + Sync {
    /// The action that dispatches to this stage.
    fn action(&self) -> Action;

    async fn run(&self, state: &mut RunState);
}
