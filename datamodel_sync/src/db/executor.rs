//! Plan execution
//!
//! Applies a [`SyncPlan`] phase by phase. The first failing statement stops
//! the run; the caller rolls back every module transaction.

use async_trait::async_trait;

use crate::db::connection::ModuleRegistry;
use crate::error::{Error, Result};
use crate::schema::diff::{ChangeKind, Phase, SyncPlan};
use crate::schema::generator::generate_statement_sql;
use crate::schema::types::SchemaSnapshot;

/// Runs SQL against a module
#[async_trait]
pub trait StatementExecutor: Send {
    async fn execute(&mut self, module_name: &str, sql: &str) -> Result<()>;
}

#[async_trait]
impl StatementExecutor for ModuleRegistry {
    async fn execute(&mut self, module_name: &str, sql: &str) -> Result<()> {
        let module = self
            .module_mut(module_name)
            .ok_or_else(|| Error::IntegrityError(format!("Module '{}' is not connected", module_name)))?;
        module.execute(sql).await
    }
}

/// The databases a run works on: transactions around a snapshot and the plan
#[async_trait]
pub trait SyncTarget: StatementExecutor {
    /// Fail unless every module can hold transactional, constrained tables
    async fn check_storage_engines(&mut self) -> Result<()>;

    async fn begin_all(&mut self) -> Result<()>;

    /// Read every module's live schema through its open transaction
    async fn snapshot(&mut self) -> Result<SchemaSnapshot>;

    async fn commit_all(&mut self) -> Result<()>;

    /// Roll back whatever is still open. Never fails; problems are logged.
    async fn rollback_all(&mut self);
}

#[async_trait]
impl SyncTarget for ModuleRegistry {
    async fn check_storage_engines(&mut self) -> Result<()> {
        ModuleRegistry::check_storage_engines(self).await
    }

    async fn begin_all(&mut self) -> Result<()> {
        ModuleRegistry::begin_all(self).await
    }

    async fn snapshot(&mut self) -> Result<SchemaSnapshot> {
        crate::schema::analyzer::snapshot(self).await
    }

    async fn commit_all(&mut self) -> Result<()> {
        ModuleRegistry::commit_all(self).await
    }

    async fn rollback_all(&mut self) {
        ModuleRegistry::rollback_all(self).await
    }
}

/// Logs statements instead of running them
#[derive(Debug, Default)]
pub struct DryRunExecutor {
    pub statements: Vec<(String, String)>,
}

#[async_trait]
impl StatementExecutor for DryRunExecutor {
    async fn execute(&mut self, module_name: &str, sql: &str) -> Result<()> {
        tracing::info!(module = %module_name, sql = %sql, "Statement (dry run)");
        self.statements.push((module_name.to_string(), sql.to_string()));
        Ok(())
    }
}

/// What one phase changed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PhaseSummary {
    pub phase: Phase,
    pub added: usize,
    pub removed: usize,
    pub modified: usize,
}

impl PhaseSummary {
    pub fn total(&self) -> usize {
        self.added + self.removed + self.modified
    }
}

/// Execute every statement of `plan` in order
pub async fn apply_plan<E>(plan: &SyncPlan, executor: &mut E) -> Result<Vec<PhaseSummary>>
where
    E: StatementExecutor + ?Sized,
{
    let mut summaries = Vec::with_capacity(plan.phases.len());

    for phase_plan in &plan.phases {
        tracing::info!(phase = %phase_plan.phase, statements = phase_plan.statements.len(), "Starting phase");

        for statement in &phase_plan.statements {
            let sql = generate_statement_sql(statement);
            tracing::debug!(module = %statement.module_name, sql = %sql, "Executing statement");

            if let Err(e) = executor.execute(&statement.module_name, &sql).await {
                tracing::error!(
                    phase = %phase_plan.phase,
                    module = %statement.module_name,
                    error = %e,
                    "Statement failed"
                );
                return Err(e);
            }
        }

        let counts = phase_plan.counts();
        let summary = PhaseSummary {
            phase: phase_plan.phase,
            added: counts.get(&ChangeKind::Added).copied().unwrap_or(0),
            removed: counts.get(&ChangeKind::Removed).copied().unwrap_or(0),
            modified: counts.get(&ChangeKind::Modified).copied().unwrap_or(0),
        };

        tracing::info!(
            phase = %summary.phase,
            added = summary.added,
            removed = summary.removed,
            modified = summary.modified,
            "Phase complete"
        );

        summaries.push(summary);
    }

    Ok(summaries)
}
