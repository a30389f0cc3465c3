use std::fmt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use anyhow::Context;
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub type EventPayload = Map<String, Value>;

/// Keys stamped by the writer. Payload entries with these names are dropped.
pub const RESERVED_EVENT_KEYS: [&str; 3] = ["type", "session_id", "ts"];

/// Every kind of line a session log can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionEvent {
    SessionStarted,
    ImageSelected,
    ImageCleared,
    CategoryChanged,
    SynthesisStarted,
    SynthesisSucceeded,
    SynthesisFailed,
    ResultSaved,
}

impl SessionEvent {
    pub const ALL: [SessionEvent; 8] = [
        SessionEvent::SessionStarted,
        SessionEvent::ImageSelected,
        SessionEvent::ImageCleared,
        SessionEvent::CategoryChanged,
        SessionEvent::SynthesisStarted,
        SessionEvent::SynthesisSucceeded,
        SessionEvent::SynthesisFailed,
        SessionEvent::ResultSaved,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::SessionStarted => "session_started",
            Self::ImageSelected => "image_selected",
            Self::ImageCleared => "image_cleared",
            Self::CategoryChanged => "category_changed",
            Self::SynthesisStarted => "synthesis_started",
            Self::SynthesisSucceeded => "synthesis_succeeded",
            Self::SynthesisFailed => "synthesis_failed",
            Self::ResultSaved => "result_saved",
        }
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed line of a session log.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LoggedEvent {
    #[serde(rename = "type")]
    pub event: SessionEvent,
    pub session_id: String,
    pub ts: String,
    #[serde(flatten)]
    pub payload: EventPayload,
}

/// Appends session events to `events.jsonl`, one compact object per line.
///
/// The file is opened on the first emit and the handle is kept for the
/// session. Clones share it.
#[derive(Debug, Clone)]
pub struct EventWriter {
    inner: Arc<EventWriterInner>,
}

#[derive(Debug)]
struct EventWriterInner {
    path: PathBuf,
    session_id: String,
    file: Mutex<Option<File>>,
}

impl EventWriter {
    pub fn new(path: impl Into<PathBuf>, session_id: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventWriterInner {
                path: path.into(),
                session_id: session_id.into(),
                file: Mutex::new(None),
            }),
        }
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn session_id(&self) -> &str {
        &self.inner.session_id
    }

    /// Writes `event` stamped with the session id and a UTC timestamp, and
    /// returns the object as written.
    pub fn emit(&self, event: SessionEvent, payload: EventPayload) -> anyhow::Result<Value> {
        let mut record = Map::new();
        record.insert("type".to_string(), Value::String(event.as_str().to_string()));
        record.insert(
            "session_id".to_string(),
            Value::String(self.inner.session_id.clone()),
        );
        record.insert(
            "ts".to_string(),
            Value::String(Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)),
        );
        for (key, value) in payload {
            if !RESERVED_EVENT_KEYS.contains(&key.as_str()) {
                record.insert(key, value);
            }
        }

        let mut line = serde_json::to_vec(&record)?;
        line.push(b'\n');

        let mut slot = self
            .inner
            .file
            .lock()
            .map_err(|_| anyhow::anyhow!("event log lock poisoned"))?;
        let file = match slot.as_mut() {
            Some(file) => file,
            None => slot.insert(self.open()?),
        };
        file.write_all(&line)
            .with_context(|| format!("failed to append to {}", self.inner.path.display()))?;

        Ok(Value::Object(record))
    }

    fn open(&self) -> anyhow::Result<File> {
        if let Some(parent) = self.inner.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.inner.path)
            .with_context(|| format!("failed to open {}", self.inner.path.display()))
    }
}

/// Reads a session log, skipping lines that are not well-formed events.
pub fn read_events(path: &Path) -> anyhow::Result<Vec<LoggedEvent>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(raw
        .lines()
        .filter_map(|line| serde_json::from_str::<LoggedEvent>(line).ok())
        .collect())
}
