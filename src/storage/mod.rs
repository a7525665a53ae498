//! `StateStore`: the durable per-workflow directory, using a temp-file +
//! `fs::rename` pattern for every write under a workflow's state directory.
//!
//! Layout, relative to `base_dir`:
//! ```text
//! <name>/state.json
//! <name>/plan.json
//! <name>/plan.md
//! <name>/phases/<PHASE>.json
//! <name>/phases/<PHASE>_raw_<attempt>.txt
//! <name>/phases/<PHASE>_prompt_<attempt>.txt
//! ```

use async_trait::async_trait;
use regex::Regex;
use serde::{de::DeserializeOwned, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use crate::error::{
    helpers::{invalid_name, state_already_exists, state_not_found},
    WorkflowError,
};
use crate::state::{Phase, WorkflowConfigSnapshot, WorkflowInfo, WorkflowState, WorkflowType};

fn name_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9._-]+$").unwrap())
}

/// Invariant (i): `name` is unique within a base directory and matches
/// `^[A-Za-z0-9._-]+$` — this also keeps a crafted name like `../../etc`
/// from escaping `base_dir`.
fn validate_name(name: &str) -> Result<(), WorkflowError> {
    if name.is_empty() || !name_pattern().is_match(name) {
        return Err(invalid_name(name));
    }
    Ok(())
}

#[async_trait]
pub trait StateStore: Send + Sync {
    async fn init_state(
        &self,
        name: &str,
        description: &str,
        workflow_type: WorkflowType,
        config_snapshot: WorkflowConfigSnapshot,
    ) -> Result<WorkflowState, WorkflowError>;

    async fn load_state(&self, name: &str) -> Result<WorkflowState, WorkflowError>;
    async fn save_state(&self, state: &WorkflowState) -> Result<(), WorkflowError>;
    async fn workflow_exists(&self, name: &str) -> bool;
    async fn list_workflows(&self) -> Result<Vec<WorkflowInfo>, WorkflowError>;
    async fn delete_workflow(&self, name: &str) -> Result<(), WorkflowError>;

    async fn save_plan(&self, name: &str, plan: &crate::state::Plan) -> Result<(), WorkflowError>;
    async fn load_plan(&self, name: &str) -> Result<crate::state::Plan, WorkflowError>;
    async fn save_plan_markdown(&self, name: &str, markdown: &str) -> Result<(), WorkflowError>;

    /// Object-safe core: phase output travels as `serde_json::Value`. Use
    /// [`StateStoreExt::save_phase_output`] / `load_phase_output` for the
    /// typed convenience wrappers.
    async fn save_phase_output_value(
        &self,
        name: &str,
        phase: Phase,
        value: serde_json::Value,
    ) -> Result<(), WorkflowError>;
    async fn load_phase_output_value(
        &self,
        name: &str,
        phase: Phase,
    ) -> Result<serde_json::Value, WorkflowError>;

    async fn save_raw_output(
        &self,
        name: &str,
        phase: Phase,
        attempt: u32,
        text: &str,
    ) -> Result<PathBuf, WorkflowError>;

    async fn save_prompt(
        &self,
        name: &str,
        phase: Phase,
        attempt: u32,
        text: &str,
    ) -> Result<PathBuf, WorkflowError>;
}

/// Typed convenience wrappers over the object-safe `StateStore` core,
/// blanket-implemented so callers holding `Arc<dyn StateStore>` still get
/// ergonomic `save_phase_output::<ImplementationSummary>(...)` calls.
#[async_trait]
pub trait StateStoreExt {
    async fn save_phase_output<T: Serialize + Send + Sync>(
        &self,
        name: &str,
        phase: Phase,
        value: &T,
    ) -> Result<(), WorkflowError>;

    async fn load_phase_output<T: DeserializeOwned>(
        &self,
        name: &str,
        phase: Phase,
    ) -> Result<T, WorkflowError>;
}

#[async_trait]
impl<S: StateStore + ?Sized> StateStoreExt for S {
    async fn save_phase_output<T: Serialize + Send + Sync>(
        &self,
        name: &str,
        phase: Phase,
        value: &T,
    ) -> Result<(), WorkflowError> {
        let json = serde_json::to_value(value)?;
        self.save_phase_output_value(name, phase, json).await
    }

    async fn load_phase_output<T: DeserializeOwned>(
        &self,
        name: &str,
        phase: Phase,
    ) -> Result<T, WorkflowError> {
        let json = self.load_phase_output_value(name, phase).await?;
        Ok(serde_json::from_value(json)?)
    }
}

pub struct FileStateStore {
    base_dir: PathBuf,
}

impl FileStateStore {
    pub fn new(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    fn workflow_dir(&self, name: &str) -> PathBuf {
        self.base_dir.join(name)
    }

    fn state_path(&self, name: &str) -> PathBuf {
        self.workflow_dir(name).join("state.json")
    }

    fn phases_dir(&self, name: &str) -> PathBuf {
        self.workflow_dir(name).join("phases")
    }

    /// Write-temp-then-rename within the same directory, so a reader never
    /// observes a partially written file.
    fn write_atomic(&self, path: &Path, content: &str) -> Result<(), WorkflowError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension(format!(
            "{}.tmp",
            path.extension().and_then(|e| e.to_str()).unwrap_or("tmp")
        ));
        std::fs::write(&tmp_path, content)?;
        std::fs::rename(&tmp_path, path)?;
        Ok(())
    }

    fn read_json<T: DeserializeOwned>(&self, path: &Path) -> Result<T, WorkflowError> {
        let content = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn write_json<T: Serialize>(&self, path: &Path, value: &T) -> Result<(), WorkflowError> {
        let content = serde_json::to_string_pretty(value)?;
        self.write_atomic(path, &content)
    }
}

#[async_trait]
impl StateStore for FileStateStore {
    async fn init_state(
        &self,
        name: &str,
        description: &str,
        workflow_type: WorkflowType,
        config_snapshot: WorkflowConfigSnapshot,
    ) -> Result<WorkflowState, WorkflowError> {
        validate_name(name)?;
        if self.workflow_exists(name).await {
            return Err(state_already_exists(name));
        }
        let state = WorkflowState::new(name, description, workflow_type, config_snapshot);
        self.save_state(&state).await?;
        Ok(state)
    }

    async fn load_state(&self, name: &str) -> Result<WorkflowState, WorkflowError> {
        validate_name(name)?;
        let path = self.state_path(name);
        if !path.exists() {
            return Err(state_not_found(name));
        }
        self.read_json(&path)
    }

    async fn save_state(&self, state: &WorkflowState) -> Result<(), WorkflowError> {
        validate_name(&state.name)?;
        let mut state = state.clone();
        state.updated_at = chrono::Utc::now();
        self.write_json(&self.state_path(&state.name), &state)
    }

    async fn workflow_exists(&self, name: &str) -> bool {
        validate_name(name).is_ok() && self.state_path(name).exists()
    }

    async fn list_workflows(&self) -> Result<Vec<WorkflowInfo>, WorkflowError> {
        if !self.base_dir.exists() {
            return Ok(Vec::new());
        }
        let mut infos = Vec::new();
        for entry in std::fs::read_dir(&self.base_dir)? {
            let entry = entry?;
            if !entry.file_type()?.is_dir() {
                continue;
            }
            let Some(name) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if let Ok(state) = self.load_state(&name).await {
                infos.push(WorkflowInfo::from(&state));
            }
        }
        infos.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(infos)
    }

    async fn delete_workflow(&self, name: &str) -> Result<(), WorkflowError> {
        validate_name(name)?;
        let dir = self.workflow_dir(name);
        if dir.exists() {
            std::fs::remove_dir_all(&dir)?;
        }
        Ok(())
    }

    async fn save_plan(&self, name: &str, plan: &crate::state::Plan) -> Result<(), WorkflowError> {
        validate_name(name)?;
        self.write_json(&self.workflow_dir(name).join("plan.json"), plan)
    }

    async fn load_plan(&self, name: &str) -> Result<crate::state::Plan, WorkflowError> {
        validate_name(name)?;
        self.read_json(&self.workflow_dir(name).join("plan.json"))
    }

    async fn save_plan_markdown(&self, name: &str, markdown: &str) -> Result<(), WorkflowError> {
        validate_name(name)?;
        self.write_atomic(&self.workflow_dir(name).join("plan.md"), markdown)
    }

    async fn save_phase_output_value(
        &self,
        name: &str,
        phase: Phase,
        value: serde_json::Value,
    ) -> Result<(), WorkflowError> {
        validate_name(name)?;
        let path = self.phases_dir(name).join(format!("{}.json", phase.as_str()));
        self.write_json(&path, &value)
    }

    async fn load_phase_output_value(
        &self,
        name: &str,
        phase: Phase,
    ) -> Result<serde_json::Value, WorkflowError> {
        validate_name(name)?;
        let path = self.phases_dir(name).join(format!("{}.json", phase.as_str()));
        self.read_json(&path)
    }

    async fn save_raw_output(
        &self,
        name: &str,
        phase: Phase,
        attempt: u32,
        text: &str,
    ) -> Result<PathBuf, WorkflowError> {
        validate_name(name)?;
        let path = self
            .phases_dir(name)
            .join(format!("{}_raw_{attempt}.txt", phase.as_str()));
        self.write_atomic(&path, text)?;
        Ok(path)
    }

    async fn save_prompt(
        &self,
        name: &str,
        phase: Phase,
        attempt: u32,
        text: &str,
    ) -> Result<PathBuf, WorkflowError> {
        validate_name(name)?;
        let path = self
            .phases_dir(name)
            .join(format!("{}_prompt_{attempt}.txt", phase.as_str()));
        self.write_atomic(&path, text)?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::WorkflowConfigSnapshot;

    fn snapshot() -> WorkflowConfigSnapshot {
        WorkflowConfigSnapshot {
            split_threshold_lines: 100,
            split_threshold_files: 10,
            split_pr_enabled: true,
            ci_fix_max_attempts: 3,
            max_attempts: 3,
        }
    }

    fn store() -> (FileStateStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (FileStateStore::new(dir.path().to_path_buf()), dir)
    }

    #[tokio::test]
    async fn init_state_fails_if_exists() {
        let (store, _dir) = store();
        store
            .init_state("demo", "desc", WorkflowType::Feature, snapshot())
            .await
            .unwrap();
        let second = store
            .init_state("demo", "desc", WorkflowType::Feature, snapshot())
            .await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn save_then_load_round_trips_byte_identical_shape() {
        let (store, _dir) = store();
        let state = store
            .init_state("demo", "desc", WorkflowType::Feature, snapshot())
            .await
            .unwrap();
        let loaded = store.load_state("demo").await.unwrap();
        assert_eq!(loaded.name, state.name);
        assert_eq!(loaded.current_phase, state.current_phase);
        assert_eq!(loaded.description, state.description);
    }

    #[tokio::test]
    async fn rejects_names_escaping_base_dir() {
        let (store, _dir) = store();
        assert!(store.load_state("../../etc/passwd").await.is_err());
        assert!(store
            .init_state("../evil", "d", WorkflowType::Feature, snapshot())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn phase_output_round_trips() {
        let (store, _dir) = store();
        store
            .init_state("demo", "desc", WorkflowType::Feature, snapshot())
            .await
            .unwrap();
        let summary = crate::state::ImplementationSummary {
            files_changed: vec!["a.rs".to_string()],
            lines_added: 10,
            lines_removed: 2,
            tests_added: 1,
            summary: "did stuff".to_string(),
            next_steps: vec![],
        };
        store
            .save_phase_output("demo", Phase::Implementation, &summary)
            .await
            .unwrap();
        let loaded: crate::state::ImplementationSummary = store
            .load_phase_output("demo", Phase::Implementation)
            .await
            .unwrap();
        assert_eq!(loaded.files_changed, summary.files_changed);
        assert_eq!(loaded.lines_added, summary.lines_added);
    }

    #[tokio::test]
    async fn list_workflows_reflects_init_and_delete() {
        let (store, _dir) = store();
        store
            .init_state("alpha", "d", WorkflowType::Feature, snapshot())
            .await
            .unwrap();
        store
            .init_state("beta", "d", WorkflowType::Fix, snapshot())
            .await
            .unwrap();
        let list = store.list_workflows().await.unwrap();
        assert_eq!(list.len(), 2);
        store.delete_workflow("alpha").await.unwrap();
        let list = store.list_workflows().await.unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].name, "beta");
    }
}
