//! datamodel_sync: declarative schema synchronization for MySQL
//!
//! Reconciles a hand-authored data model (entities, attributes, indexes and
//! relationships) against the live schema of one or more database modules
//! and applies the DDL needed to make them match, all or nothing.
//!
//! ```no_run
//! # async fn run() -> datamodel_sync::Result<()> {
//! let options = datamodel_sync::SyncOptions::load("dx.toml")?;
//! let report = datamodel_sync::sync_database(&options, false).await?;
//! println!("{} statement(s) applied", report.statement_count());
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod db;
pub mod error;
pub mod hooks;
pub mod model;
pub mod schema;
pub mod utils;

use chrono::{DateTime, Utc};

// Re-export main types for easier access
pub use config::{CaseImplementation, Config, SyncOptions};
pub use db::{ModuleRegistry, PhaseSummary, StatementExecutor, SyncTarget};
pub use error::{Error, Result};
pub use hooks::{CommandHook, PostSyncHook};
pub use model::{CasedDataModel, DataModel};
pub use schema::{LineReader, SyncPlan, TableRemoval, TerminalLineReader};

use crate::db::{apply_plan, check_module_references, DryRunExecutor};
use crate::model::normalize_case;
use crate::schema::{confirm_removal, plan_sync, removal_candidates};

/// Everything one sync run works with. Built at the start of a run and
/// dropped at its end.
pub struct SyncContext<T = ModuleRegistry> {
    pub data_model: DataModel,
    pub cased_model: CasedDataModel,
    pub case: CaseImplementation,
    pub registry: T,
}

/// The outcome of a successful run
#[derive(Debug, Clone)]
pub struct SyncReport {
    pub plan: SyncPlan,
    pub phases: Vec<PhaseSummary>,
    pub dry_run: bool,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl SyncReport {
    pub fn statement_count(&self) -> usize {
        self.plan.statement_count()
    }
}

impl<T: SyncTarget> SyncContext<T> {
    pub fn new(data_model: DataModel, case: CaseImplementation, registry: T) -> Self {
        let cased_model = normalize_case(&data_model, case);
        Self {
            data_model,
            cased_model,
            case,
            registry,
        }
    }

    /// Run the whole sync against the registry: all modules commit and the
    /// hooks run, or every module is rolled back and the error returned.
    pub async fn sync(
        &mut self,
        skip_user_prompts: bool,
        dry_run: bool,
        reader: &mut (dyn LineReader + Send),
        hooks: &[Box<dyn PostSyncHook>],
    ) -> Result<SyncReport> {
        let started_at = Utc::now();

        let (plan, phases) = match self.run(skip_user_prompts, dry_run, reader).await {
            Ok(outcome) => outcome,
            Err(e) => {
                tracing::error!(error = %e, "Sync failed, rolling back all modules");
                self.registry.rollback_all().await;
                return Err(e);
            }
        };

        if !dry_run {
            tracing::info!(statements = plan.statement_count(), "Database sync completed successfully");
            hooks::run_hooks(hooks).await?;
        }

        Ok(SyncReport {
            plan,
            phases,
            dry_run,
            started_at,
            finished_at: Utc::now(),
        })
    }

    /// Snapshot, confirm, plan and apply. Leaves transactions open on error
    /// so the caller can roll them back.
    async fn run(
        &mut self,
        skip_user_prompts: bool,
        dry_run: bool,
        reader: &mut (dyn LineReader + Send),
    ) -> Result<(SyncPlan, Vec<PhaseSummary>)> {
        self.registry.check_storage_engines().await?;
        self.registry.begin_all().await?;

        let snapshot = self.registry.snapshot().await?;
        let live_tables = snapshot.tables().count();
        tracing::info!(
            found = live_tables,
            expected = self.cased_model.entities.len(),
            "Existing tables read"
        );

        let candidates = removal_candidates(&snapshot, &self.cased_model);
        let removal = confirm_removal(&candidates, skip_user_prompts, reader)?;

        let plan = plan_sync(&snapshot, &self.cased_model, &removal);
        if plan.is_empty() {
            tracing::info!("Database schema is already in sync with the data model");
        }

        let phases = if dry_run {
            let phases = apply_plan(&plan, &mut DryRunExecutor::default()).await?;
            self.registry.rollback_all().await;
            tracing::info!(statements = plan.statement_count(), "Dry run complete, nothing was changed");
            phases
        } else {
            let phases = apply_plan(&plan, &mut self.registry).await?;
            self.registry.commit_all().await?;
            phases
        };

        Ok((plan, phases))
    }
}

impl SyncContext<ModuleRegistry> {
    pub async fn close(self) {
        self.registry.close().await;
    }
}

/// Synchronize the database with `options.data_model`, prompting on the
/// terminal before removing tables unless `skip_user_prompts` is set
pub async fn sync_database(options: &SyncOptions, skip_user_prompts: bool) -> Result<SyncReport> {
    let hooks = CommandHook::from_config(&options.hooks);
    run_sync(options, skip_user_prompts, &mut TerminalLineReader, &hooks).await
}

/// [`sync_database`] with the prompt source and post-sync hooks supplied by the caller
pub async fn run_sync(
    options: &SyncOptions,
    skip_user_prompts: bool,
    reader: &mut (dyn LineReader + Send),
    hooks: &[Box<dyn PostSyncHook>],
) -> Result<SyncReport> {
    let dry_run = options.dx_config.dry_run;

    tracing::info!(
        case = %options.case_implementation(),
        entities = options.data_model.entities.len(),
        modules = options.database_config.modules.len(),
        dry_run,
        "Initializing"
    );

    check_module_references(&options.data_model, &options.database_config)?;
    let registry = ModuleRegistry::connect(&options.database_config).await?;

    let mut context = SyncContext::new(options.data_model.clone(), options.case_implementation(), registry);
    let report = context.sync(skip_user_prompts, dry_run, reader, hooks).await;
    context.close().await;

    report
}
