use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::category::GarmentCategory;

/// JSON body of `POST /api/pwa/virtual-tryon`. Images travel as data URIs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesisPayload {
    pub person_image: String,
    pub garment_image: String,
    pub category: GarmentCategory,
}

/// Body of a 2xx synthesis response.
///
/// A missing `success` flag counts as failure.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct SynthesisResponse {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub result_image: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Optional body of a non-2xx response.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ApiErrorBody {
    #[serde(default)]
    pub detail: Option<Value>,
}

impl ApiErrorBody {
    /// Parses a raw body, returning `None` when it is not a JSON object.
    pub fn parse(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }

    /// Human-readable detail. Structured details (validation error lists) are
    /// rendered as compact JSON.
    pub fn message(&self) -> Option<String> {
        match self.detail.as_ref()? {
            Value::Null => None,
            Value::String(text) => Some(text.trim().to_string()).filter(|text| !text.is_empty()),
            other => Some(other.to_string()),
        }
    }
}
