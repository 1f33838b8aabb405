//! Module persistence.
//!
//! The rule engine itself never touches storage. The one exception is the
//! mode repair job, which has to read every module and write corrected
//! flags back as a single transaction. [`ModuleStore`] is the seam it
//! talks to; two backends are provided:
//!
//! - [`InMemoryModuleStore`]: for tests and for callers that hold modules in memory
//! - [`JsonFileModuleStore`]: a JSON array of module records on disk, replaced
//!   atomically on commit
//!
//! Concurrent repair runs against the same store are the caller's to
//! serialize; a store only guarantees that one transaction is open at a time
//! per handle.

mod in_memory;
mod json_file;

pub use in_memory::InMemoryModuleStore;
pub use json_file::JsonFileModuleStore;

use thiserror::Error;

use crate::activation::{ActivationMode, Module};

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("A transaction is already open")]
    TransactionActive,

    #[error("No transaction is open")]
    NoTransaction,

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Transactional access to persisted module records.
///
/// Writes made between [`begin`](Self::begin) and [`commit`](Self::commit)
/// are staged and visible to [`list_modules`](Self::list_modules) on the same
/// handle; [`rollback`](Self::rollback) discards them.
pub trait ModuleStore {
    fn begin(&mut self) -> StoreResult<()>;

    fn list_modules(&self) -> StoreResult<Vec<Module>>;

    fn set_stored_mode(&mut self, module_id: &str, mode: ActivationMode) -> StoreResult<()>;

    fn commit(&mut self) -> StoreResult<()>;

    fn rollback(&mut self) -> StoreResult<()>;
}

/// Staged copy of the module list shared by both backends.
#[derive(Debug, Default)]
struct Staging {
    modules: Option<Vec<Module>>,
}

impl Staging {
    fn open(&mut self, snapshot: Vec<Module>) -> StoreResult<()> {
        if self.modules.is_some() {
            return Err(StoreError::TransactionActive);
        }
        self.modules = Some(snapshot);
        Ok(())
    }

    fn set_stored_mode(&mut self, module_id: &str, mode: ActivationMode) -> StoreResult<()> {
        let modules = self.modules.as_mut().ok_or(StoreError::NoTransaction)?;
        let module = modules
            .iter_mut()
            .find(|module| module.id == module_id)
            .ok_or_else(|| StoreError::ModuleNotFound(module_id.to_string()))?;
        module.set_stored_mode(mode);
        Ok(())
    }

    fn take(&mut self) -> StoreResult<Vec<Module>> {
        self.modules.take().ok_or(StoreError::NoTransaction)
    }

    fn view(&self) -> Option<&Vec<Module>> {
        self.modules.as_ref()
    }
}
