//! Validation runs.
//!
//! A [`ValidationRunner`] wires one selected model, the Docker sandbox and the
//! agent roster into a single conversation, then records exactly one
//! [`ValidationOutcome`]. [`ValidationRunner::run_batch`] repeats that for a
//! list of models, strictly one at a time.
//!
//! # Architecture
//!
//! ```text
//! candidates → ModelSelector → ModelConnection ─┐
//!                                              ├→ ConversationController → ResultRecorder
//! instance → ValidationTarget → task prompt ───┘          │
//!                                                    ToolRegistry → SandboxExecutor
//! ```
//!
//! # Example
//!
//! ```ignore
//! use swe_validate::runner::{AgentMode, RunnerConfig, ValidationRunner};
//!
//! let runner = ValidationRunner::new(RunnerConfig::new(AgentMode::Team));
//! let connection = selector.select(&candidates).await?;
//! let outcome = runner.run_one(&target, &connection, sandbox).await?;
//! println!("{} ({})", outcome.status, outcome.model);
//! ```

pub mod config;
pub mod direct;

pub use config::{AgentMode, RunnerConfig, TEAM_LABEL};
pub use direct::{install_and_test_script, save_failure_logs, validate_direct, DirectOutcome};

use std::sync::Arc;

use tracing::{error, info};

use crate::conversation::{
    one_agent_roster, one_agent_task, team_roster, team_task, ConversationController,
    TerminationCondition, ValidationTarget,
};
use crate::error::ValidateError;
use crate::llm::{candidates_from_ids, ModelCandidate, ModelConnection, ModelSelector};
use crate::recorder::{ResultRecorder, ValidationOutcome};
use crate::sandbox::SandboxExecutor;
use crate::tools::{RunContext, ToolRegistry};

/// One sub-run of a batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPlan {
    /// Explicitly requested model; `None` means automatic selection.
    pub model: Option<String>,
    pub candidates: Vec<ModelCandidate>,
}

impl RunPlan {
    pub fn fixed(model: impl Into<String>) -> Self {
        let model = model.into();
        Self {
            candidates: candidates_from_ids([model.as_str()]),
            model: Some(model),
        }
    }

    pub fn auto(candidates: Vec<ModelCandidate>) -> Self {
        Self {
            model: None,
            candidates,
        }
    }

    fn label(&self) -> &str {
        self.model.as_deref().unwrap_or("(auto)")
    }
}

/// One plan per listed model, or a single automatic plan when none are listed.
pub fn batch_plans(models: &[String], auto: Vec<ModelCandidate>) -> Vec<RunPlan> {
    if models.is_empty() {
        vec![RunPlan::auto(auto)]
    } else {
        models.iter().map(RunPlan::fixed).collect()
    }
}

/// Results of a batch.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub outcomes: Vec<ValidationOutcome>,
    /// Sub-runs that produced no outcome, by plan label.
    pub failures: Vec<(String, ValidateError)>,
}

impl BatchReport {
    /// Process exit code: 0 when every sub-run produced an outcome.
    pub fn exit_code(&self) -> u8 {
        if self.failures.is_empty() {
            0
        } else {
            1
        }
    }
}

/// Runs validation conversations and records their outcomes.
pub struct ValidationRunner {
    config: RunnerConfig,
    recorder: ResultRecorder,
    registry: ToolRegistry,
}

impl ValidationRunner {
    pub fn new(config: RunnerConfig) -> Self {
        let recorder = ResultRecorder::new(config.results_path.clone());
        Self {
            config,
            recorder,
            registry: ToolRegistry::with_validation_tools(),
        }
    }

    pub fn config(&self) -> &RunnerConfig {
        &self.config
    }

    pub fn recorder(&self) -> &ResultRecorder {
        &self.recorder
    }

    fn controller(&self, connection: &ModelConnection) -> Result<ConversationController, ValidateError> {
        let cap = self.config.turn_cap();
        let (agents, termination) = match self.config.mode {
            AgentMode::One => (
                one_agent_roster(&self.registry),
                TerminationCondition::one_agent(cap),
            ),
            AgentMode::Team => (team_roster(&self.registry), TerminationCondition::team(cap)),
        };
        let native =
            self.config.native_tools && connection.candidate().capabilities.function_calling;

        Ok(ConversationController::new(agents, termination, connection.chat_model())?
            .with_native_tools(native))
    }

    /// Run one conversation for `target` and record its outcome.
    ///
    /// Once the conversation starts an outcome is always recorded, whatever
    /// the model or the sandbox did.
    pub async fn run_one(
        &self,
        target: &ValidationTarget,
        connection: &ModelConnection,
        sandbox: Arc<dyn SandboxExecutor>,
    ) -> Result<ValidationOutcome, ValidateError> {
        let controller = self.controller(connection)?;
        let task = match self.config.mode {
            AgentMode::One => one_agent_task(target),
            AgentMode::Team => team_task(target),
        };

        info!(
            model = %connection.model_id(),
            mode = %self.config.mode,
            repo = %target.repo_url,
            max_turns = self.config.turn_cap(),
            "Starting validation run"
        );

        let outcome = ValidationOutcome::begin(target, connection.model_id())
            .with_team(self.config.mode.team_label());
        let mut ctx = RunContext::new(sandbox);
        let result = controller.run(&task, &mut ctx).await;

        let outcome = outcome.finish(result.messages(), ctx.last_test_tail(), connection.usage());
        info!(
            status = %outcome.status,
            messages = outcome.messages,
            elapsed_sec = outcome.elapsed_sec,
            tokens = outcome.tokens.total,
            stop_reason = %result.stop_reason,
            "Validation run finished"
        );

        self.recorder.record(&outcome).await;
        Ok(outcome)
    }

    /// Select a model from `plan` and run once.
    pub async fn run_plan(
        &self,
        target: &ValidationTarget,
        selector: &ModelSelector,
        plan: &RunPlan,
        sandbox: Arc<dyn SandboxExecutor>,
    ) -> Result<ValidationOutcome, ValidateError> {
        info!(model = %plan.label(), mode = %self.config.mode, "Starting sub-run");
        let connection = selector.select(&plan.candidates).await?;
        self.run_one(target, &connection, sandbox).await
    }

    /// Run every plan in order. A failed sub-run does not stop the batch.
    pub async fn run_batch(
        &self,
        target: &ValidationTarget,
        selector: &ModelSelector,
        plans: &[RunPlan],
        sandbox: Arc<dyn SandboxExecutor>,
    ) -> BatchReport {
        let mut report = BatchReport::default();
        for plan in plans {
            match self.run_plan(target, selector, plan, sandbox.clone()).await {
                Ok(outcome) => report.outcomes.push(outcome),
                Err(e) => {
                    error!(model = %plan.label(), error = %e, "Sub-run failed");
                    report.failures.push((plan.label().to_string(), e));
                }
            }
        }
        report
    }
}
