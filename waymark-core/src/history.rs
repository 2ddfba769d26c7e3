use std::sync::Arc;

use log::warn;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{position::Position, store::KeyValueStore};

/// One row of the travel log. The timestamp is rendered up front so the log
/// never re-interprets a fix after the fact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub latitude: f64,
    pub longitude: f64,
    pub timestamp: String,
}

impl LogEntry {
    pub fn from_position(position: &Position) -> Self {
        Self {
            latitude: position.latitude,
            longitude: position.longitude,
            timestamp: position.timestamp_iso(),
        }
    }
}

/// Result of wiping the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    /// Entries were removed, count included.
    Cleared(usize),
    /// There was nothing to clear. Not an error.
    AlreadyEmpty,
}

/// Append-only log of every position the tracker recorded.
///
/// Entries are never deduplicated: a provider re-reporting the same
/// coordinates produces another row. Optionally mirrored into a
/// [KeyValueStore] so the trail survives restarts.
pub struct LocationLog<S: KeyValueStore> {
    entries: Mutex<Vec<LogEntry>>,
    persistence: Option<(Arc<S>, String)>,
}

impl<S: KeyValueStore> LocationLog<S> {
    /// Log that lives and dies with the process.
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
            persistence: None,
        }
    }

    /// Log mirrored into `store` under `key`, seeded from whatever is
    /// already persisted there.
    pub fn persisted(store: Arc<S>, key: &str) -> Self {
        let entries = store
            .get(key)
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default();
        Self {
            entries: Mutex::new(entries),
            persistence: Some((store, key.to_string())),
        }
    }

    pub async fn append(&self, entry: LogEntry) {
        let mut entries = self.entries.lock().await;
        entries.push(entry);
        self.save(&entries);
    }

    /// Remove every entry, reporting how many there were.
    pub async fn clear(&self) -> ClearOutcome {
        let mut entries = self.entries.lock().await;
        if entries.is_empty() {
            return ClearOutcome::AlreadyEmpty;
        }
        let cleared = entries.len();
        entries.clear();
        self.save(&entries);
        ClearOutcome::Cleared(cleared)
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    pub async fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().await.clone()
    }

    /// Render the log as `latitude,longitude,timestamp` rows under a header,
    /// every row newline-terminated, in insertion order.
    pub async fn to_csv(&self) -> String {
        let entries = self.entries.lock().await;
        let mut csv = String::from("latitude,longitude,timestamp\n");
        for entry in entries.iter() {
            csv.push_str(&format!(
                "{},{},{}\n",
                entry.latitude, entry.longitude, entry.timestamp
            ));
        }
        csv
    }

    fn save(&self, entries: &[LogEntry]) {
        if let Some((store, key)) = &self.persistence {
            match serde_json::to_string(entries) {
                Ok(raw) => store.set(key, &raw),
                Err(why) => warn!("Failed to persist the travel log: {why}"),
            }
        }
    }
}
