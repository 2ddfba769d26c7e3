use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::Mutex,
};

use log::error;

use crate::prelude::*;
use waymark_core::KeyValueStore;

/// Key-value store persisted as a pretty-printed JSON object, one file per
/// store.
///
/// Every write goes straight to disk. The trait keeps writes infallible, so
/// a failed write is logged and the in-memory copy stays authoritative.
pub struct JsonStore {
    path: PathBuf,
    values: Mutex<BTreeMap<String, String>>,
}

impl JsonStore {
    /// A missing file opens as an empty store; an unreadable or corrupt one
    /// is an error, never silently replaced.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let values = match std::fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw)
                .with_context(|| format!("Failed to parse store file {}", path.display()))?,
            Err(why) if why.kind() == std::io::ErrorKind::NotFound => BTreeMap::new(),
            Err(why) => {
                return Err(why)
                    .with_context(|| format!("Failed to read store file {}", path.display()));
            }
        };
        Ok(Self {
            path,
            values: Mutex::new(values),
        })
    }

    fn save(&self, values: &BTreeMap<String, String>) {
        let encoded = serde_json::to_string_pretty(values).expect("Failed to encode store");
        if let Err(why) = std::fs::write(&self.path, encoded) {
            error!("couldn't write store file {}: {why}", self.path.display());
        }
    }
}

impl KeyValueStore for JsonStore {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .lock()
            .expect("Failed to lock store")
            .get(key)
            .cloned()
    }

    fn set(&self, key: &str, value: &str) {
        let mut values = self.values.lock().expect("Failed to lock store");
        values.insert(key.to_owned(), value.to_owned());
        self.save(&values);
    }
}
