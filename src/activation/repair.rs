//! Batch repair of persisted activation flags.
//!
//! Rules and the stored `stored_mode` flag drift apart whenever a rule is
//! added or removed without touching the flag. Readers never trust the flag
//! (see [`Module::effective_mode`]), but other systems reading the store
//! directly do, so the job recomputes every flag and writes back the ones
//! that differ, inside one transaction.

use serde::Serialize;
use tracing::{info, warn};

use super::{ActivationMode, Module};
use crate::store::{ModuleStore, StoreResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModeChange {
    pub module_id: String,
    pub from: ActivationMode,
    pub to: ActivationMode,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RepairReport {
    pub examined: usize,
    pub changes: Vec<ModeChange>,
    pub committed: bool,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ModeRepair {
    dry_run: bool,
}

impl ModeRepair {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute the report but roll the transaction back instead of committing.
    pub fn dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Changes needed to bring `modules` in line with their rules.
    pub fn plan(modules: &[Module]) -> Vec<ModeChange> {
        modules
            .iter()
            .filter_map(|module| {
                let from = module.stored_mode();
                let to = module.effective_mode();
                (from != to).then(|| ModeChange {
                    module_id: module.id.clone(),
                    from,
                    to,
                })
            })
            .collect()
    }

    /// Run the repair as one read-modify-write transaction.
    ///
    /// Any failure rolls the transaction back and is returned; a dry run
    /// always rolls back. Running twice in a row yields no changes the
    /// second time.
    #[tracing::instrument(level = "info", skip(self, store), fields(dry_run = self.dry_run))]
    pub fn run<S: ModuleStore + ?Sized>(&self, store: &mut S) -> StoreResult<RepairReport> {
        store.begin()?;

        let staged = Self::stage(store);
        let report = match staged {
            Ok(report) => report,
            Err(e) => {
                Self::abandon(store);
                return Err(e);
            }
        };

        if self.dry_run || report.changes.is_empty() {
            store.rollback()?;
        } else if let Err(e) = store.commit() {
            Self::abandon(store);
            return Err(e);
        }

        let committed = !self.dry_run && !report.changes.is_empty();
        info!(
            examined = report.examined,
            changed = report.changes.len(),
            committed,
            "activation mode repair finished"
        );
        Ok(RepairReport {
            committed,
            ..report
        })
    }

    fn stage<S: ModuleStore + ?Sized>(store: &mut S) -> StoreResult<RepairReport> {
        let modules = store.list_modules()?;
        let changes = Self::plan(&modules);
        for change in &changes {
            info!(
                module = %change.module_id,
                from = %change.from,
                to = %change.to,
                "stored activation mode drifted from rules"
            );
            store.set_stored_mode(&change.module_id, change.to)?;
        }
        Ok(RepairReport {
            examined: modules.len(),
            changes,
            committed: false,
        })
    }

    fn abandon<S: ModuleStore + ?Sized>(store: &mut S) {
        if let Err(e) = store.rollback() {
            warn!(error = %e, "rollback after failed repair did not complete");
        }
    }
}
