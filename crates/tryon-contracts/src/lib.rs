pub mod category;
pub mod events;
pub mod history;
pub mod wire;

pub use category::GarmentCategory;
pub use events::{read_events, EventPayload, EventWriter, LoggedEvent, SessionEvent};
pub use history::{HistoryRecord, HistoryStore, MAX_HISTORY_RECORDS};
pub use wire::{ApiErrorBody, SynthesisPayload, SynthesisResponse};
