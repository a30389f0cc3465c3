pub mod classify;
pub mod config;
pub mod error;
pub mod normalizer;
pub mod present;
pub mod progress;
pub mod proxy;
pub mod session;
pub mod synthesis;

#[cfg(test)]
mod test_support;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{bail, Context};
use reqwest::blocking::Client as HttpClient;
use serde_json::{json, Map, Value};
use tryon_contracts::{EventWriter, GarmentCategory, HistoryRecord, HistoryStore, SessionEvent};

pub use classify::{classify_result_image, SynthesisResult};
pub use config::TryOnConfig;
pub use error::{Result, TryOnError};
pub use normalizer::{EncodedImage, ImageNormalizer, ImageSource};
pub use present::SavedResult;
pub use progress::{
    ProgressReporter, ProgressSink, ProgressUpdate, PROGRESS_COMPLETE, PROGRESS_STEPS,
};
pub use proxy::RemoteImageFetcher;
pub use session::{ImageSlot, SessionState};
pub use synthesis::{SynthesisClient, SynthesisOrchestrator, SynthesisRequest};

/// One interactive try-on session: selected inputs, the synthesis pipeline,
/// the event log and the optional saved history.
pub struct TryOnEngine {
    config: TryOnConfig,
    session_id: String,
    events: EventWriter,
    state: SessionState,
    normalizer: ImageNormalizer,
    fetcher: RemoteImageFetcher,
    orchestrator: SynthesisOrchestrator,
    http: HttpClient,
    history: Option<HistoryStore>,
}

impl TryOnEngine {
    pub fn new(
        config: TryOnConfig,
        events_path: impl Into<PathBuf>,
        sink: Arc<dyn ProgressSink>,
    ) -> anyhow::Result<Self> {
        let http = HttpClient::builder()
            .build()
            .context("failed to build http client")?;
        Self::with_http_client(config, events_path, sink, http)
    }

    pub fn with_http_client(
        config: TryOnConfig,
        events_path: impl Into<PathBuf>,
        sink: Arc<dyn ProgressSink>,
        http: HttpClient,
    ) -> anyhow::Result<Self> {
        let normalizer = ImageNormalizer::new(config.max_image_size, config.jpeg_quality)?;
        let session_id = uuid::Uuid::new_v4().to_string();
        let events = EventWriter::new(events_path.into(), session_id.clone());
        let fetcher =
            RemoteImageFetcher::with_client(config.fetch_image_endpoint(), http.clone());
        let orchestrator = SynthesisOrchestrator::new(
            SynthesisClient::with_client(config.synthesis_endpoint(), http.clone()),
            ProgressReporter::new(sink, config.progress_interval),
        )
        .with_events(events.clone());
        let history = config.history_path.as_deref().map(HistoryStore::load);

        events.emit(
            SessionEvent::SessionStarted,
            map_object(json!({
                "api_base_url": config.api_base_url,
                "max_image_size": config.max_image_size,
                "jpeg_quality": config.jpeg_quality,
                "request_timeout_ms": config.request_timeout.as_millis() as u64,
            })),
        )?;
        tracing::info!(session_id = %session_id, api = %config.api_base_url, "try-on session started");

        Ok(Self {
            config,
            session_id,
            events,
            state: SessionState::new(),
            normalizer,
            fetcher,
            orchestrator,
            http,
            history,
        })
    }

    pub fn config(&self) -> &TryOnConfig {
        &self.config
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn events_path(&self) -> &Path {
        self.events.path()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn history(&self) -> Option<&HistoryStore> {
        self.history.as_ref()
    }

    /// Normalizes `source` into `slot`. A failed decode leaves the slot as it
    /// was.
    pub fn select_image(&mut self, slot: ImageSlot, source: ImageSource<'_>) -> Result<EncodedImage> {
        let image = self.normalizer.normalize(source)?;
        self.record_selection(slot, source.kind(), &image);
        self.state.set_image(slot, image.clone());
        Ok(image)
    }

    /// Fetches `url` through the image proxy and normalizes it into `slot`.
    pub fn select_image_url(&mut self, slot: ImageSlot, url: &str) -> Result<EncodedImage> {
        let raw = self.fetcher.fetch_remote_image(url)?;
        let image = self.normalizer.normalize(ImageSource::Bytes(&raw))?;
        self.record_selection(slot, "remote_url", &image);
        self.state.set_image(slot, image.clone());
        Ok(image)
    }

    pub fn clear_image(&mut self, slot: ImageSlot) {
        self.state.clear_image(slot);
        self.emit(SessionEvent::ImageCleared, json!({ "slot": slot.as_str() }));
    }

    pub fn set_category(&mut self, category: GarmentCategory) {
        if self.state.category() == category {
            return;
        }
        self.state.set_category(category);
        self.emit(SessionEvent::CategoryChanged, json!({ "category": category.as_str() }));
    }

    pub fn try_on(&mut self) -> Result<SynthesisResult> {
        self.orchestrator
            .run_synthesis(&mut self.state, self.config.request_timeout)
    }

    /// Forgets the last result so the same inputs can be submitted again.
    pub fn retry(&mut self) {
        self.state.clear_result();
    }

    /// Writes the last result to `path` and records it in the history.
    pub fn save_result(&mut self, path: &Path) -> anyhow::Result<SavedResult> {
        let Some(result) = self.state.last_result().cloned() else {
            bail!("there is no result to save yet");
        };
        let saved = present::save_result(&self.http, &result, path)?;

        if let Some(history) = self.history.as_mut() {
            let (Some(person), Some(garment)) =
                (self.state.person_image(), self.state.garment_image())
            else {
                bail!("inputs were cleared before the result was saved");
            };
            history
                .push(HistoryRecord::new(
                    person.to_data_url(),
                    garment.to_data_url(),
                    result.as_str(),
                    self.state.category(),
                ))
                .with_context(|| {
                    format!("failed to update history at {}", history.path().display())
                })?;
        }

        self.emit(
            SessionEvent::ResultSaved,
            json!({
                "path": saved.path.to_string_lossy(),
                "bytes": saved.bytes,
                "result_kind": if result.is_remote() { "remote_url" } else { "inline" },
                "history_len": self.history.as_ref().map(HistoryStore::len),
            }),
        );
        Ok(saved)
    }

    fn record_selection(&self, slot: ImageSlot, source: &str, image: &EncodedImage) {
        tracing::info!(
            slot = %slot,
            source,
            width = image.width(),
            height = image.height(),
            "image selected"
        );
        self.emit(
            SessionEvent::ImageSelected,
            json!({
                "slot": slot.as_str(),
                "source": source,
                "width": image.width(),
                "height": image.height(),
                "bytes": image.len(),
                "fingerprint": image.fingerprint(),
            }),
        );
    }

    fn emit(&self, event: SessionEvent, payload: Value) {
        if let Err(err) = self.events.emit(event, map_object(payload)) {
            tracing::warn!(event = %event, error = %err, "failed to record session event");
        }
    }
}

pub(crate) fn map_object(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap_or_default()
}
