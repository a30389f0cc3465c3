use std::time::{Duration, Instant};

use reqwest::blocking::Client as HttpClient;
use serde_json::json;
use tryon_contracts::{
    ApiErrorBody, EventWriter, GarmentCategory, SessionEvent, SynthesisPayload,
    SynthesisResponse,
};

use crate::classify::{classify_result_image, SynthesisResult};
use crate::error::{Result, TryOnError};
use crate::map_object;
use crate::normalizer::EncodedImage;
use crate::progress::ProgressReporter;
use crate::session::{ImageSlot, SessionState};

/// Snapshot of the inputs for one synthesis call.
#[derive(Debug, Clone, PartialEq)]
pub struct SynthesisRequest {
    pub person_image: EncodedImage,
    pub garment_image: EncodedImage,
    pub category: GarmentCategory,
}

impl SynthesisRequest {
    pub fn from_state(state: &SessionState) -> Result<Self> {
        let person_image = state
            .person_image()
            .cloned()
            .ok_or(TryOnError::MissingInput(ImageSlot::Person))?;
        let garment_image = state
            .garment_image()
            .cloned()
            .ok_or(TryOnError::MissingInput(ImageSlot::Garment))?;
        Ok(Self {
            person_image,
            garment_image,
            category: state.category(),
        })
    }

    pub fn to_payload(&self) -> SynthesisPayload {
        SynthesisPayload {
            person_image: self.person_image.to_data_url(),
            garment_image: self.garment_image.to_data_url(),
            category: self.category,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SynthesisClient {
    endpoint: String,
    http: HttpClient,
}

impl SynthesisClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self::with_client(endpoint, HttpClient::new())
    }

    pub fn with_client(endpoint: impl Into<String>, http: HttpClient) -> Self {
        Self {
            endpoint: endpoint.into(),
            http,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Posts one request and classifies the answer. `timeout` bounds the
    /// whole exchange, body included.
    pub fn submit(&self, request: &SynthesisRequest, timeout: Duration) -> Result<SynthesisResult> {
        let response = self
            .http
            .post(&self.endpoint)
            .timeout(timeout)
            .json(&request.to_payload())
            .send()
            .map_err(|err| TryOnError::from_transport(err, Some(timeout)))?;
        let status = response.status();
        let body = response
            .text()
            .map_err(|err| TryOnError::from_transport(err, Some(timeout)))?;

        if !status.is_success() {
            let message = ApiErrorBody::parse(&body)
                .and_then(|parsed| parsed.message())
                .unwrap_or_else(|| format!("API error: {}", status.as_u16()));
            return Err(TryOnError::Api { message });
        }

        let parsed: SynthesisResponse = serde_json::from_str(&body)
            .map_err(|err| TryOnError::api(format!("invalid response payload: {err}")))?;
        if !parsed.success {
            return Err(TryOnError::api(
                parsed
                    .error
                    .map(|text| text.trim().to_string())
                    .filter(|text| !text.is_empty())
                    .unwrap_or_else(|| "try-on failed".to_string()),
            ));
        }
        classify_result_image(parsed.result_image.as_deref())
    }
}

/// Holds the in-flight flag for one admitted request. Dropping it stops the
/// progress ticker and releases the flag, on every exit path. A request that
/// stored a result also reports the final 100% step.
struct InFlight<'a> {
    state: &'a mut SessionState,
    progress: &'a mut ProgressReporter,
    completed: bool,
}

impl<'a> InFlight<'a> {
    fn begin(state: &'a mut SessionState, progress: &'a mut ProgressReporter) -> Self {
        progress.start();
        Self {
            state,
            progress,
            completed: false,
        }
    }

    fn complete(&mut self, result: SynthesisResult) {
        self.state.set_result(result);
        self.completed = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.completed {
            self.progress.finish();
        } else {
            self.progress.stop();
        }
        self.state.end_request();
    }
}

/// Runs synthesis requests against a session, one at a time.
pub struct SynthesisOrchestrator {
    client: SynthesisClient,
    progress: ProgressReporter,
    events: Option<EventWriter>,
}

impl SynthesisOrchestrator {
    pub fn new(client: SynthesisClient, progress: ProgressReporter) -> Self {
        Self {
            client,
            progress,
            events: None,
        }
    }

    pub fn with_events(mut self, events: EventWriter) -> Self {
        self.events = Some(events);
        self
    }

    pub fn client(&self) -> &SynthesisClient {
        &self.client
    }

    /// Submits the session's current inputs and stores the result.
    ///
    /// Missing inputs are rejected before admission. A request arriving while
    /// another is in flight gets [`TryOnError::AlreadyInFlight`] and leaves the
    /// session untouched.
    pub fn run_synthesis(
        &mut self,
        state: &mut SessionState,
        timeout: Duration,
    ) -> Result<SynthesisResult> {
        let request = SynthesisRequest::from_state(state)?;
        if !state.try_begin_request() {
            tracing::debug!("synthesis ignored; a request is already in flight");
            return Err(TryOnError::AlreadyInFlight);
        }
        let mut flight = InFlight::begin(state, &mut self.progress);

        record(
            self.events.as_ref(),
            SessionEvent::SynthesisStarted,
            json!({
                "category": request.category.as_str(),
                "person_image": request.person_image.fingerprint(),
                "garment_image": request.garment_image.fingerprint(),
                "timeout_ms": timeout.as_millis() as u64,
            }),
        );
        tracing::info!(
            endpoint = %self.client.endpoint(),
            category = %request.category,
            "submitting try-on request"
        );

        let started = Instant::now();
        let outcome = self.client.submit(&request, timeout);
        if let Ok(result) = &outcome {
            flight.complete(result.clone());
        }
        drop(flight);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &outcome {
            Ok(result) => {
                tracing::info!(elapsed_ms, result = %result, "try-on succeeded");
                record(
                    self.events.as_ref(),
                    SessionEvent::SynthesisSucceeded,
                    json!({
                        "result_kind": if result.is_remote() { "remote_url" } else { "inline" },
                        "elapsed_ms": elapsed_ms,
                    }),
                );
            }
            Err(err) => {
                tracing::warn!(elapsed_ms, error = %err, "try-on failed");
                record(
                    self.events.as_ref(),
                    SessionEvent::SynthesisFailed,
                    json!({
                        "error_kind": err.kind(),
                        "error": err.to_string(),
                        "elapsed_ms": elapsed_ms,
                    }),
                );
            }
        }
        outcome
    }
}

fn record(events: Option<&EventWriter>, event: SessionEvent, payload: serde_json::Value) {
    let Some(events) = events else {
        return;
    };
    if let Err(err) = events.emit(event, map_object(payload)) {
        tracing::warn!(event = %event, error = %err, "failed to record session event");
    }
}
