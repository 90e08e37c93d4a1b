use std::{
    collections::BTreeMap,
    fs,
    path::{Path, PathBuf},
    sync::Mutex,
};

use anyhow::anyhow;
use tracing::debug;

/// Durable string storage for persisted timeline state.
pub trait StateStore: std::fmt::Debug + Send + Sync {
    fn put(&self, key: &str, value: &str) -> anyhow::Result<()>;
    fn get(&self, key: &str) -> anyhow::Result<Option<String>>;
}

#[derive(Debug, Default)]
pub struct MemoryStateStore {
    values: Mutex<BTreeMap<String, String>>,
}

impl StateStore for MemoryStateStore {
    fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        self.values
            .lock()
            .map_err(|_| anyhow!("state store lock poisoned"))?
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        Ok(self
            .values
            .lock()
            .map_err(|_| anyhow!("state store lock poisoned"))?
            .get(key)
            .cloned())
    }
}

/// Keeps every key in a single JSON object on disk.
#[derive(Debug)]
pub struct JsonFileStateStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStateStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_all(&self) -> crate::Result<BTreeMap<String, String>> {
        if !self.path.exists() {
            return Ok(BTreeMap::new());
        }
        let contents = fs::read_to_string(&self.path)?;
        if contents.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        Ok(serde_json::from_str(&contents)?)
    }

    fn write_all(&self, values: &BTreeMap<String, String>) -> crate::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, serde_json::to_string_pretty(values)?)?;
        debug!("Saved {} state entries to {:?}", values.len(), self.path);
        Ok(())
    }
}

impl StateStore for JsonFileStateStore {
    fn put(&self, key: &str, value: &str) -> anyhow::Result<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("state file lock poisoned"))?;
        let mut values = self.read_all()?;
        values.insert(key.to_owned(), value.to_owned());
        self.write_all(&values)?;
        Ok(())
    }

    fn get(&self, key: &str) -> anyhow::Result<Option<String>> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| anyhow!("state file lock poisoned"))?;
        Ok(self.read_all()?.remove(key))
    }
}
