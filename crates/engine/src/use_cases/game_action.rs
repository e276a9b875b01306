//! Transactional validate-then-execute engine.
//!
//! Every state-changing game command is a [`GameAction`]. [`GameActionService::run`]
//! opens a transaction, validates, and either rolls back with the rule
//! violation or executes and commits. A failure anywhere after `begin` rolls
//! the transaction back, so a partially applied action is never visible.

use std::sync::Arc;

use async_trait::async_trait;
use hexworld_domain::{DomainError, RuleViolation};

use crate::infrastructure::ports::{RepoError, WorldStore, WorldTx};

/// Result of the validation phase.
#[derive(Debug, Clone, PartialEq)]
pub enum Validation<P> {
    /// Passed; the plan carries whatever validation loaded for execution
    Valid(P),
    Rejected(RuleViolation),
}

/// Result of a whole action run.
#[derive(Debug, Clone, PartialEq)]
pub enum ActionOutcome<T> {
    Applied(T),
    /// Validation failed; nothing was written
    Rejected(RuleViolation),
}

/// System failures. Rule violations are never errors.
#[derive(Debug, thiserror::Error)]
pub enum ActionError {
    #[error(transparent)]
    Repo(#[from] RepoError),

    /// State changed between validation and execution
    #[error("Integrity check failed: {0}")]
    Integrity(String),

    #[error(transparent)]
    Domain(#[from] DomainError),
}

#[async_trait]
pub trait GameAction: Send + Sync {
    type Plan: Send;
    type Output: Send;

    fn name(&self) -> &'static str;

    async fn validate(&self, tx: &mut dyn WorldTx) -> Result<Validation<Self::Plan>, ActionError>;

    /// Perform every mutation. Anything that may have changed since
    /// validation is re-checked here.
    async fn execute(
        &self,
        tx: &mut dyn WorldTx,
        plan: Self::Plan,
    ) -> Result<Self::Output, ActionError>;
}

#[derive(Clone)]
pub struct GameActionService {
    store: Arc<dyn WorldStore>,
}

impl GameActionService {
    pub fn new(store: Arc<dyn WorldStore>) -> Self {
        Self { store }
    }

    pub async fn run<A: GameAction>(
        &self,
        action: &A,
    ) -> Result<ActionOutcome<A::Output>, ActionError> {
        let mut tx = self.store.begin().await?;

        let plan = match action.validate(tx.as_mut()).await {
            Ok(Validation::Valid(plan)) => plan,
            Ok(Validation::Rejected(violation)) => {
                tx.rollback().await?;
                tracing::debug!(action = action.name(), reason = %violation, "Action rejected");
                return Ok(ActionOutcome::Rejected(violation));
            }
            Err(e) => {
                rollback_after_failure(tx, action.name()).await;
                return Err(e);
            }
        };

        match action.execute(tx.as_mut(), plan).await {
            Ok(output) => {
                tx.commit().await?;
                Ok(ActionOutcome::Applied(output))
            }
            Err(e) => {
                tracing::warn!(action = action.name(), error = %e, "Action execution failed, rolling back");
                rollback_after_failure(tx, action.name()).await;
                Err(e)
            }
        }
    }
}

async fn rollback_after_failure(tx: Box<dyn WorldTx>, action: &'static str) {
    if let Err(e) = tx.rollback().await {
        tracing::error!(action, error = %e, "Rollback failed");
    }
}
