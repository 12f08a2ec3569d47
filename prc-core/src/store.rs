//! Persistence of execution records.
//!
//! Stores always receive the full merged trees and overwrite wholesale.

use crate::error::StoreError;
use crate::timeline;
use async_trait::async_trait;
use prc_schemas::{
    execution::{ExecutionRecord, ProgressUpdate},
    template::ProcessTemplate,
    tree::Tree,
};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;

type Result<T> = std::result::Result<T, StoreError>;

#[async_trait]
pub trait ExecutionStore: Send + Sync {
    async fn load(&self, execution_id: &str) -> Result<ExecutionRecord>;
    async fn save_progress(&self, execution_id: &str, update: &ProgressUpdate) -> Result<()>;
}

/// Recomputes the read-model counters from the record's own trees.
pub fn refresh_counters(record: &mut ExecutionRecord) {
    let steps = timeline::build_timeline(&record.template, &record.progress, &record.timing);
    record.counters = timeline::counters(&steps);
}

fn new_record(execution_id: &str, template: ProcessTemplate) -> ExecutionRecord {
    let mut record = ExecutionRecord {
        execution_id: execution_id.to_string(),
        template,
        progress: Tree::new(),
        timing: Tree::new(),
        counters: Default::default(),
    };
    refresh_counters(&mut record);
    record
}

/// In-process store. Failures can be injected for the next N saves.
#[derive(Default)]
pub struct MemoryStore {
    records: RwLock<HashMap<String, ExecutionRecord>>,
    saves: AtomicUsize,
    failing_saves: AtomicUsize,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_execution(
        &self,
        execution_id: &str,
        template: ProcessTemplate,
    ) -> Result<()> {
        let mut records = self.records.write().await;
        if records.contains_key(execution_id) {
            return Err(StoreError::AlreadyExists(execution_id.to_string()));
        }
        records.insert(execution_id.to_string(), new_record(execution_id, template));
        Ok(())
    }

    pub async fn get(&self, execution_id: &str) -> Option<ExecutionRecord> {
        self.records.read().await.get(execution_id).cloned()
    }

    /// Number of successful saves so far.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }

    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl ExecutionStore for MemoryStore {
    async fn load(&self, execution_id: &str) -> Result<ExecutionRecord> {
        self.get(execution_id)
            .await
            .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))
    }

    async fn save_progress(&self, execution_id: &str, update: &ProgressUpdate) -> Result<()> {
        let injected = self
            .failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if injected {
            return Err(StoreError::Unavailable("injected failure".to_string()));
        }

        let mut records = self.records.write().await;
        let record = records
            .get_mut(execution_id)
            .ok_or_else(|| StoreError::NotFound(execution_id.to_string()))?;
        record.progress = update.progress.clone();
        record.timing = update.timing.clone();
        refresh_counters(record);
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// One pretty-printed JSON file per execution under a directory.
pub struct JsonFileStore {
    dir: PathBuf,
}

impl JsonFileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, execution_id: &str) -> PathBuf {
        self.dir.join(format!("{}.json", execution_id))
    }

    pub async fn create_execution(
        &self,
        execution_id: &str,
        template: ProcessTemplate,
    ) -> Result<ExecutionRecord> {
        let path = self.path_for(execution_id);
        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Err(StoreError::AlreadyExists(execution_id.to_string()));
        }
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| StoreError::FileIO(self.dir.display().to_string(), e))?;
        let record = new_record(execution_id, template);
        write_atomic(&path, &record).await?;
        tracing::info!(execution_id, path = %path.display(), "created execution");
        Ok(record)
    }

    async fn read(&self, execution_id: &str) -> Result<ExecutionRecord> {
        let path = self.path_for(execution_id);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(StoreError::NotFound(execution_id.to_string()))
            }
            Err(e) => return Err(StoreError::FileIO(path.display().to_string(), e)),
        };
        serde_json::from_str(&content)
            .map_err(|e| StoreError::JsonParsing(path.display().to_string(), e))
    }
}

async fn write_atomic(path: &Path, record: &ExecutionRecord) -> Result<()> {
    let display = path.display().to_string();
    let json = serde_json::to_string_pretty(record)
        .map_err(|e| StoreError::JsonParsing(display.clone(), e))?;
    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| StoreError::FileIO(tmp.display().to_string(), e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| StoreError::FileIO(display, e))
}

#[async_trait]
impl ExecutionStore for JsonFileStore {
    async fn load(&self, execution_id: &str) -> Result<ExecutionRecord> {
        let mut record = self.read(execution_id).await?;
        refresh_counters(&mut record);
        Ok(record)
    }

    async fn save_progress(&self, execution_id: &str, update: &ProgressUpdate) -> Result<()> {
        let mut record = self.read(execution_id).await?;
        record.progress = update.progress.clone();
        record.timing = update.timing.clone();
        refresh_counters(&mut record);
        write_atomic(&self.path_for(execution_id), &record).await?;
        tracing::debug!(execution_id, counters = ?record.counters, "saved progress");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prc_schemas::{
        environment::Measurement,
        material::MaterialCode,
        template::{RawMaterialLine, RawMaterialsSpec, StepPayload, TemplateStep},
        tree::{Key, Node, Value},
    };

    fn template() -> ProcessTemplate {
        ProcessTemplate {
            template_id: "PRC-1".into(),
            name: "Hull".into(),
            revision: Some("A".into()),
            steps: vec![TemplateStep {
                id: 1,
                sequence: 0,
                title: "Raw materials".into(),
                payload: StepPayload::RawMaterials(RawMaterialsSpec {
                    lines: vec![RawMaterialLine {
                        id: 7,
                        material_code: MaterialCode::Resin,
                        name: "Resin".into(),
                        planned_quantity: Measurement { value: 4.0, unit: "kg".into() },
                        requires_batch_number: false,
                    }],
                }),
            }],
        }
    }

    fn filled() -> ProgressUpdate {
        ProgressUpdate {
            progress: Tree::singleton(&[Key::Id(1)], Key::Id(7), Node::Leaf(Value::Number(4.2))),
            timing: Tree::new(),
        }
    }

    #[tokio::test]
    async fn file_store_round_trips_and_recounts() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        let created = store.create_execution("EX-1", template()).await.unwrap();
        assert_eq!(created.counters.total_steps, 1);
        assert_eq!(created.counters.steps_completed, 0);

        store.save_progress("EX-1", &filled()).await.unwrap();
        let loaded = store.load("EX-1").await.unwrap();
        assert_eq!(loaded.progress, filled().progress);
        assert_eq!(loaded.counters.steps_completed, 1);
        assert!(!store.path_for("EX-1").with_extension("json.tmp").exists());

        assert!(matches!(
            store.create_execution("EX-1", template()).await,
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn missing_execution_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path());
        assert!(matches!(store.load("nope").await, Err(StoreError::NotFound(_))));
        assert!(matches!(
            MemoryStore::new().load("nope").await,
            Err(StoreError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_one_save_at_a_time() {
        let store = MemoryStore::new();
        store.create_execution("EX-2", template()).await.unwrap();
        store.fail_next_saves(1);

        assert!(matches!(
            store.save_progress("EX-2", &filled()).await,
            Err(StoreError::Unavailable(_))
        ));
        assert_eq!(store.save_count(), 0);

        store.save_progress("EX-2", &filled()).await.unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.get("EX-2").await.unwrap().counters.steps_completed, 1);
    }
}
