use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_json::Value;
use tempfile::NamedTempFile;
use tracing::debug;

use super::{ModuleStore, Staging, StoreError, StoreResult};
use crate::activation::{ActivationMode, Module};

/// Module store backed by one JSON file holding an array of module records.
///
/// The file is read at `begin` and, on `commit`, rewritten through a
/// temporary file in the same directory that is then renamed over the
/// original, so readers never observe a half-written catalogue.
///
/// Records are written back as they were read, with only `stored_mode`
/// replaced: rules keep their authored spelling and fields the module model
/// does not know about are preserved.
#[derive(Debug)]
pub struct JsonFileModuleStore {
    path: PathBuf,
    staging: Staging,
    records: Option<Vec<Value>>,
}

impl JsonFileModuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            staging: Staging::default(),
            records: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_records(&self) -> StoreResult<Vec<Value>> {
        let content = fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn decode(records: &[Value]) -> StoreResult<Vec<Module>> {
        records
            .iter()
            .map(|record| Ok(Module::deserialize(record)?))
            .collect()
    }

    fn write(&self, records: &[Value]) -> StoreResult<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let mut temp_file = NamedTempFile::new_in(dir)?;
        serde_json::to_writer_pretty(&mut temp_file, records)?;
        temp_file.write_all(b"\n")?;
        temp_file.as_file().sync_all()?;
        temp_file
            .persist(&self.path)
            .map_err(|e| StoreError::Storage(format!("Failed to replace {}: {}", self.path.display(), e)))?;
        debug!(path = %self.path.display(), modules = records.len(), "module catalogue written");
        Ok(())
    }
}

impl ModuleStore for JsonFileModuleStore {
    fn begin(&mut self) -> StoreResult<()> {
        let records = self.read_records()?;
        let snapshot = Self::decode(&records)?;
        self.staging.open(snapshot)?;
        self.records = Some(records);
        Ok(())
    }

    fn list_modules(&self) -> StoreResult<Vec<Module>> {
        match self.staging.view() {
            Some(modules) => Ok(modules.clone()),
            None => Self::decode(&self.read_records()?),
        }
    }

    fn set_stored_mode(&mut self, module_id: &str, mode: ActivationMode) -> StoreResult<()> {
        self.staging.set_stored_mode(module_id, mode)?;
        let record = self
            .records
            .as_mut()
            .and_then(|records| {
                records
                    .iter_mut()
                    .find(|record| record.get("id").and_then(Value::as_str) == Some(module_id))
            })
            .and_then(Value::as_object_mut)
            .ok_or_else(|| StoreError::ModuleNotFound(module_id.to_string()))?;
        record.insert("stored_mode".to_string(), serde_json::to_value(mode)?);
        Ok(())
    }

    fn commit(&mut self) -> StoreResult<()> {
        self.staging.take()?;
        let records = self.records.take().ok_or(StoreError::NoTransaction)?;
        self.write(&records)
    }

    fn rollback(&mut self) -> StoreResult<()> {
        self.records = None;
        self.staging.take().map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::RuleNode;
    use serde_json::json;

    #[test]
    fn test_commit_rewrites_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modules.json");
        fs::write(
            &path,
            json!([{"id": "a", "stored_mode": "llm"}, {"id": "b"}]).to_string(),
        )
        .unwrap();

        let mut store = JsonFileModuleStore::new(&path);
        store.begin().unwrap();
        store.set_stored_mode("b", ActivationMode::Deterministic).unwrap();
        store.commit().unwrap();

        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written[1]["stored_mode"], json!("deterministic"));
        assert_eq!(written[0]["stored_mode"], json!("llm"));
    }

    #[test]
    fn test_rules_survive_rewrite() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modules.json");
        let broken = json!({"type": "condition", "variable": "x", "operator": "like"});
        let module = Module::new("a")
            .with_primary_rule(RuleNode::equals("has_contract", true))
            .with_doctype_rule("inicial", RuleNode::from_json(&broken));
        fs::write(&path, serde_json::to_string(&vec![module.clone()]).unwrap()).unwrap();

        let mut store = JsonFileModuleStore::new(&path);
        store.begin().unwrap();
        store.commit().unwrap();

        let reloaded = store.list_modules().unwrap();
        assert_eq!(reloaded, vec![module]);
        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw[0]["per_doctype_rules"]["inicial"], broken);
    }

    #[test]
    fn test_commit_keeps_records_verbatim() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modules.json");
        let original = json!([{
            "id": "m",
            "title": "Dano moral",
            "text": "Texto do argumento",
            "primary_rule": {"type": "condition", "variable": "n", "operator": "gt", "value": 1},
            "stored_mode": "llm"
        }]);
        fs::write(&path, original.to_string()).unwrap();

        let mut store = JsonFileModuleStore::new(&path);
        store.begin().unwrap();
        store.set_stored_mode("m", ActivationMode::Deterministic).unwrap();
        store.commit().unwrap();

        let mut expected = original.clone();
        expected[0]["stored_mode"] = json!("deterministic");
        let written: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(written, expected);
    }

    #[test]
    fn test_missing_file_fails_begin() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileModuleStore::new(dir.path().join("absent.json"));
        assert!(matches!(store.begin(), Err(StoreError::Io(_))));
    }
}
