use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::category::GarmentCategory;

pub const MAX_HISTORY_RECORDS: usize = 30;

/// One saved try-on. Field names follow the browser front end's storage
/// layout so both can read the same file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRecord {
    pub id: i64,
    pub timestamp: i64,
    pub person_image: String,
    pub garment_image: String,
    pub result_image: String,
    #[serde(default)]
    pub category: GarmentCategory,
}

impl HistoryRecord {
    pub fn new(
        person_image: impl Into<String>,
        garment_image: impl Into<String>,
        result_image: impl Into<String>,
        category: GarmentCategory,
    ) -> Self {
        let now = Utc::now().timestamp_millis();
        Self {
            id: now,
            timestamp: now,
            person_image: person_image.into(),
            garment_image: garment_image.into(),
            result_image: result_image.into(),
            category,
        }
    }
}

/// Newest-first list of saved try-ons, capped at [`MAX_HISTORY_RECORDS`].
#[derive(Debug, Clone)]
pub struct HistoryStore {
    path: PathBuf,
    records: Vec<HistoryRecord>,
}

impl HistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            records: Vec::new(),
        }
    }

    /// Missing or unreadable files load as an empty history; rows that fail
    /// to parse are skipped.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let mut store = Self::new(path);
        let Some(rows) = read_json(&store.path).and_then(|value| match value {
            Value::Array(rows) => Some(rows),
            _ => None,
        }) else {
            return store;
        };
        store.records = rows
            .into_iter()
            .filter_map(|row| serde_json::from_value::<HistoryRecord>(row).ok())
            .take(MAX_HISTORY_RECORDS)
            .collect();
        store
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn records(&self) -> &[HistoryRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: HistoryRecord) -> anyhow::Result<()> {
        self.records.insert(0, record);
        self.records.truncate(MAX_HISTORY_RECORDS);
        self.flush()
    }

    pub fn flush(&self) -> anyhow::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&self.path, serde_json::to_string_pretty(&self.records)?)?;
        Ok(())
    }
}

fn read_json(path: &Path) -> Option<Value> {
    let raw = std::fs::read_to_string(path).ok()?;
    serde_json::from_str(&raw).ok()
}
