//! On-disk workflow store — one JSON file per workflow definition.
//!
//! Writes are atomic (`*.tmp` + rename). Names are validated as safe single
//! path components before touching the filesystem; a hostile name never
//! reaches `Path::join`.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use talon_core::error::WorkflowError;
use talon_security::is_safe_component;

use crate::model::WorkflowDef;

/// Stores workflow definitions as JSON files in a directory.
pub struct WorkflowStore {
    dir: PathBuf,
}

impl WorkflowStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, name: &str) -> PathBuf {
        self.dir.join(format!("{name}.json"))
    }

    /// Persist a workflow definition atomically.
    ///
    /// Returns the path written. Fails with `InvalidName` when the workflow
    /// name is not a safe path component.
    pub fn save(&self, wf: &WorkflowDef) -> Result<PathBuf, WorkflowError> {
        if !is_safe_component(&wf.name) {
            return Err(WorkflowError::InvalidName(wf.name.clone()));
        }

        std::fs::create_dir_all(&self.dir)
            .map_err(|e| WorkflowError::Storage(format!("create {}: {e}", self.dir.display())))?;

        let path = self.path_for(&wf.name);
        let tmp = self.dir.join(format!("{}.json.tmp", wf.name));
        let content = serde_json::to_string_pretty(wf)
            .map_err(|e| WorkflowError::Storage(format!("serialize '{}': {e}", wf.name)))?;

        std::fs::write(&tmp, content)
            .map_err(|e| WorkflowError::Storage(format!("write {}: {e}", tmp.display())))?;
        std::fs::rename(&tmp, &path)
            .map_err(|e| WorkflowError::Storage(format!("rename {}: {e}", path.display())))?;

        debug!(workflow = %wf.name, path = %path.display(), "Saved workflow");
        Ok(path)
    }

    /// Load a workflow by name.
    ///
    /// Returns `None` for missing files, unparseable content, and unsafe
    /// names.
    pub fn load(&self, name: &str) -> Option<WorkflowDef> {
        if !is_safe_component(name) {
            return None;
        }
        let path = self.path_for(name);
        let content = std::fs::read_to_string(&path).ok()?;
        match serde_json::from_str(&content) {
            Ok(wf) => Some(wf),
            Err(e) => {
                warn!(workflow = %name, error = %e, "Failed to parse workflow file");
                None
            }
        }
    }

    /// List stored workflow names in lexicographic order.
    pub fn list(&self) -> Vec<String> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(_) => return Vec::new(),
        };

        let mut names: Vec<String> = entries
            .flatten()
            .filter_map(|entry| {
                let file_name = entry.file_name().into_string().ok()?;
                file_name.strip_suffix(".json").map(str::to_string)
            })
            .collect();
        names.sort();
        names
    }

    /// Delete a workflow file. Returns true iff a file was removed.
    pub fn delete(&self, name: &str) -> bool {
        if !is_safe_component(name) {
            return false;
        }
        std::fs::remove_file(self.path_for(name)).is_ok()
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::StepDef;

    fn sample(name: &str) -> WorkflowDef {
        WorkflowDef {
            name: name.into(),
            description: "sample".into(),
            steps: vec![StepDef {
                name: "only".into(),
                prompt: "do the thing".into(),
                profile: "default".into(),
                depends_on: vec![],
                timeout_seconds: 300,
            }],
        }
    }

    #[test]
    fn save_then_load_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());

        let wf = sample("pipeline");
        let path = store.save(&wf).unwrap();
        assert!(path.ends_with("pipeline.json"));

        let loaded = store.load("pipeline").unwrap();
        assert_eq!(loaded.name, "pipeline");
        assert_eq!(loaded.steps.len(), 1);
        assert_eq!(loaded.steps[0].prompt, "do the thing");
    }

    #[test]
    fn save_is_byte_stable() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());
        let wf = sample("stable");

        store.save(&wf).unwrap();
        let first = std::fs::read(dir.path().join("stable.json")).unwrap();
        store.save(&wf).unwrap();
        let second = std::fs::read(dir.path().join("stable.json")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn save_leaves_no_tmp_file() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());
        store.save(&sample("clean")).unwrap();

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .flatten()
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn unsafe_names_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());

        for name in ["../escape", "a/b", ".hidden", "..", ""] {
            let err = store.save(&sample(name)).unwrap_err();
            assert!(matches!(err, WorkflowError::InvalidName(_)), "name: {name}");
            assert!(store.load(name).is_none());
            assert!(!store.delete(name));
        }
    }

    #[test]
    fn load_missing_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());
        assert!(store.load("ghost").is_none());
    }

    #[test]
    fn load_corrupt_returns_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());
        std::fs::write(dir.path().join("broken.json"), "{not json").unwrap();
        assert!(store.load("broken").is_none());
    }

    #[test]
    fn list_is_sorted() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());
        store.save(&sample("zeta")).unwrap();
        store.save(&sample("alpha")).unwrap();
        store.save(&sample("mid")).unwrap();
        assert_eq!(store.list(), vec!["alpha", "mid", "zeta"]);
    }

    #[test]
    fn list_missing_dir_is_empty() {
        let store = WorkflowStore::new("/nonexistent/talon-test-store");
        assert!(store.list().is_empty());
    }

    #[test]
    fn delete_returns_whether_removed() {
        let dir = tempfile::tempdir().unwrap();
        let store = WorkflowStore::new(dir.path());
        store.save(&sample("gone")).unwrap();
        assert!(store.delete("gone"));
        assert!(!store.delete("gone"));
    }
}
