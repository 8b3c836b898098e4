//! The pipeline runner: decide, dispatch, remember, repeat until DONE.

use crate::policy::PolicyEngine;
use crate::stages::StageSet;
use lysai_config::AppConfig;
use lysai_core::{
    Action, EpisodeId, EpisodeStore, EpisodeUpdate, Oracle, Outcome, RunError, RunState,
    SimilarityIndex, ToolServer,
};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What a finished run produced.
#[derive(Debug, Clone)]
pub struct RunResult {
    pub state: RunState,
    pub outcome: Outcome,
}

impl RunResult {
    pub fn episode_id(&self) -> Option<EpisodeId> {
        self.state.episode_id()
    }

    pub fn insight(&self) -> Option<&str> {
        self.state.insight()
    }

    pub fn report_path(&self) -> Option<&str> {
        self.state.report_path()
    }

    pub fn is_success(&self) -> bool {
        self.outcome == Outcome::Success
    }
}

pub struct PipelineRunner {
    policy: PolicyEngine,
    stages: StageSet,
    store: Arc<dyn EpisodeStore>,
    index: Arc<dyn SimilarityIndex>,
    max_steps: u32,
}

impl PipelineRunner {
    pub fn new(
        policy: PolicyEngine,
        stages: StageSet,
        store: Arc<dyn EpisodeStore>,
        index: Arc<dyn SimilarityIndex>,
    ) -> Self {
        Self {
            policy,
            stages,
            store,
            index,
            max_steps: 10,
        }
    }

    /// Wire the policy engine and the standard stages from configuration.
    pub fn from_config(
        config: &AppConfig,
        oracle: Arc<dyn Oracle>,
        tools: Arc<dyn ToolServer>,
        store: Arc<dyn EpisodeStore>,
        index: Arc<dyn SimilarityIndex>,
    ) -> Self {
        let policy = PolicyEngine::from_config(oracle.clone(), index.clone(), &config.orchestrator);
        let stages = StageSet::standard(oracle, tools, index.clone());
        Self::new(policy, stages, store, index).with_max_steps(config.orchestrator.max_steps)
    }

    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Answer one question. Always terminates: the policy engine's circuit
    /// breaker ends the run once the step budget is spent.
    pub async fn run(&self, question: &str) -> RunResult {
        let mut state = RunState::new(question, self.max_steps);
        info!(question, max_steps = self.max_steps, "Run starting");

        loop {
            let action = self.policy.decide(&mut state).await;
            if action.is_terminal() {
                break;
            }

            let Some(stage) = self.stages.get(action) else {
                warn!(action = %action, "No stage registered for action");
                state.set_error(RunError::failure(format!("no stage registered for {action}")));
                continue;
            };

            if action == Action::Execute {
                self.ensure_episode(&mut state).await;
            }

            debug!(action = %action, step = state.step(), "Dispatching stage");
            stage.run(&mut state).await;

            match action {
                Action::Execute | Action::Reflect => self.sync_query(&state).await,
                Action::Summarize => self.sync_insight(&state).await,
                _ => {}
            }
        }

        let outcome = self.finalize(&state).await;
        info!(
            outcome = outcome.as_str(),
            steps = state.step(),
            episode = ?state.episode_id(),
            "Run finished"
        );
        RunResult { state, outcome }
    }

    /// Log the episode the first time a query is about to run.
    async fn ensure_episode(&self, state: &mut RunState) {
        if state.episode_id().is_some() {
            return;
        }
        match self
            .store
            .log_episode(state.question(), &state.plan, state.sql.as_deref())
            .await
        {
            Ok(id) => {
                debug!(episode = %id, "Episode logged");
                state.assign_episode(id);
            }
            Err(e) => warn!(error = %e, "Failed to log episode"),
        }
    }

    async fn update(&self, id: EpisodeId, update: EpisodeUpdate) {
        if let Err(e) = self.store.update_episode(id, update).await {
            warn!(episode = %id, error = %e, "Failed to update episode");
        }
    }

    async fn sync_query(&self, state: &RunState) {
        let Some(id) = state.episode_id() else {
            return;
        };
        let mut update = EpisodeUpdate::new()
            .plan(state.plan.clone())
            .error(state.real_error().map(str::to_string));
        if let Some(sql) = &state.sql {
            update = update.sql(sql.clone());
        }
        if let Some(rows) = &state.rows {
            update = update.rows(rows.clone());
        }
        self.update(id, update).await;
    }

    async fn sync_insight(&self, state: &RunState) {
        let (Some(id), Some(insight)) = (state.episode_id(), state.insight()) else {
            return;
        };
        self.update(id, EpisodeUpdate::new().insight(insight)).await;
    }

    async fn finalize(&self, state: &RunState) -> Outcome {
        let error = state.real_error();
        let outcome = if error.is_none() && (state.has_rows() || state.has_insight()) {
            Outcome::Success
        } else {
            Outcome::Error
        };

        if let Some(id) = state.episode_id() {
            let update = EpisodeUpdate::new()
                .outcome(outcome)
                .error(error.map(str::to_string));
            self.update(id, update).await;
            if outcome == Outcome::Success {
                self.index.add(id, state.question(), state.insight()).await;
            }
        }
        outcome
    }
}
