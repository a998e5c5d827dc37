//! Persistence seam for per-target state.
//!
//! The engine never keeps process-wide state of its own. Everything that must
//! outlive one run (flags, forced build file, chosen binary, last outcome)
//! goes through [`BuildStore`].

use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;

use crate::core::{BuildConfig, JobOutcome};
use crate::error::StoreError;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TargetRecord {
    pub config: BuildConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_file: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub binary_path: Option<PathBuf>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub repo_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_outcome: Option<JobOutcome>,
}

pub trait BuildStore: Send + Sync {
    fn load(&self, repo_id: &str) -> Result<Option<TargetRecord>, StoreError>;

    fn save(&self, repo_id: &str, record: &TargetRecord) -> Result<(), StoreError>;

    fn save_config(&self, repo_id: &str, config: &BuildConfig) -> Result<(), StoreError> {
        let mut record = self.load(repo_id)?.unwrap_or_default();
        record.config = config.clone();
        self.save(repo_id, &record)
    }

    fn record_binary(&self, repo_id: &str, path: &Path) -> Result<(), StoreError> {
        let mut record = self.load(repo_id)?.unwrap_or_default();
        record.binary_path = Some(path.to_path_buf());
        self.save(repo_id, &record)
    }

    fn record_outcome(&self, repo_id: &str, outcome: &JobOutcome) -> Result<(), StoreError> {
        let mut record = self.load(repo_id)?.unwrap_or_default();
        record.last_outcome = Some(outcome.clone());
        self.save(repo_id, &record)
    }
}

#[derive(Default)]
pub struct MemoryStore {
    records: Arc<RwLock<HashMap<String, TargetRecord>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(self, repo_id: &str, record: TargetRecord) -> Self {
        self.records.write().insert(repo_id.to_string(), record);
        self
    }
}

impl Clone for MemoryStore {
    fn clone(&self) -> Self {
        Self {
            records: self.records.clone(),
        }
    }
}

impl BuildStore for MemoryStore {
    fn load(&self, repo_id: &str) -> Result<Option<TargetRecord>, StoreError> {
        Ok(self.records.read().get(repo_id).cloned())
    }

    fn save(&self, repo_id: &str, record: &TargetRecord) -> Result<(), StoreError> {
        self.records
            .write()
            .insert(repo_id.to_string(), record.clone());
        Ok(())
    }
}

/// All targets in one JSON document, rewritten through a temp file and rename.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    fn read_all(&self) -> Result<BTreeMap<String, TargetRecord>, StoreError> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let text = fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            path: self.path.clone(),
            source,
        })?;
        if text.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&text)?)
    }

    fn write_all(&self, records: &BTreeMap<String, TargetRecord>) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: self.path.clone(),
            source,
        };
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(io_err)?;
        }
        let tmp = self.path.with_extension("json.tmp");
        let body = serde_json::to_string_pretty(records)?;
        fs::write(&tmp, body).map_err(io_err)?;
        fs::rename(&tmp, &self.path).map_err(io_err)?;
        debug!(path = %self.path.display(), targets = records.len(), "Store written");
        Ok(())
    }
}

impl BuildStore for JsonFileStore {
    fn load(&self, repo_id: &str) -> Result<Option<TargetRecord>, StoreError> {
        let _guard = self.lock.lock();
        Ok(self.read_all()?.remove(repo_id))
    }

    fn save(&self, repo_id: &str, record: &TargetRecord) -> Result<(), StoreError> {
        let _guard = self.lock.lock();
        let mut records = self.read_all()?;
        records.insert(repo_id.to_string(), record.clone());
        self.write_all(&records)
    }
}
