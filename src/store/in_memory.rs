use super::{ModuleStore, Staging, StoreResult};
use crate::activation::{ActivationMode, Module};

/// Module store held entirely in memory.
#[derive(Debug, Default)]
pub struct InMemoryModuleStore {
    committed: Vec<Module>,
    staging: Staging,
}

impl InMemoryModuleStore {
    pub fn new(modules: Vec<Module>) -> Self {
        Self {
            committed: modules,
            staging: Staging::default(),
        }
    }

    /// Committed state, ignoring any open transaction.
    pub fn committed(&self) -> &[Module] {
        &self.committed
    }
}

impl ModuleStore for InMemoryModuleStore {
    fn begin(&mut self) -> StoreResult<()> {
        self.staging.open(self.committed.clone())
    }

    fn list_modules(&self) -> StoreResult<Vec<Module>> {
        Ok(self.staging.view().unwrap_or(&self.committed).clone())
    }

    fn set_stored_mode(&mut self, module_id: &str, mode: ActivationMode) -> StoreResult<()> {
        self.staging.set_stored_mode(module_id, mode)
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.committed = self.staging.take()?;
        Ok(())
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.staging.take().map(|_| ())
    }
}
