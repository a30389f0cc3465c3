use std::fmt;

use crate::error::{Result, TryOnError};

/// Prefix prepended to a bare base64 payload.
pub const BARE_PAYLOAD_PREFIX: &str = "data:image/jpeg;base64,";

/// What the synthesis backend handed back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SynthesisResult {
    RemoteUrl(String),
    InlineEncodedImage(String),
}

impl SynthesisResult {
    pub fn as_str(&self) -> &str {
        match self {
            Self::RemoteUrl(url) => url,
            Self::InlineEncodedImage(data_url) => data_url,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, Self::RemoteUrl(_))
    }

    pub fn into_string(self) -> String {
        match self {
            Self::RemoteUrl(value) | Self::InlineEncodedImage(value) => value,
        }
    }
}

impl fmt::Display for SynthesisResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RemoteUrl(url) => write!(f, "{url}"),
            Self::InlineEncodedImage(data_url) => {
                let head: String = data_url.chars().take(32).collect();
                write!(f, "{head}… ({} chars)", data_url.len())
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    RemoteUrl,
    DataUrl,
    BarePayload,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassificationRule {
    pub shape: ResultShape,
    /// Any of these prefixes selects the rule. An empty prefix matches anything.
    pub prefixes: &'static [&'static str],
}

impl ClassificationRule {
    pub fn matches(&self, raw: &str) -> bool {
        self.prefixes.iter().any(|prefix| raw.starts_with(prefix))
    }
}

/// Evaluated top to bottom; the first match wins.
pub const CLASSIFICATION_RULES: [ClassificationRule; 3] = [
    ClassificationRule {
        shape: ResultShape::RemoteUrl,
        prefixes: &["http://", "https://"],
    },
    ClassificationRule {
        shape: ResultShape::DataUrl,
        prefixes: &["data:"],
    },
    ClassificationRule {
        shape: ResultShape::BarePayload,
        prefixes: &[""],
    },
];

pub fn result_shape(raw: &str) -> ResultShape {
    CLASSIFICATION_RULES
        .iter()
        .find(|rule| rule.matches(raw))
        .map(|rule| rule.shape)
        .unwrap_or(ResultShape::BarePayload)
}

/// Classifies the `result_image` response field.
///
/// A bare payload is assumed to be base64 JPEG; it is not validated.
pub fn classify_result_image(raw: Option<&str>) -> Result<SynthesisResult> {
    let Some(raw) = raw.filter(|value| !value.is_empty()) else {
        return Err(TryOnError::MissingResult);
    };
    Ok(match result_shape(raw) {
        ResultShape::RemoteUrl => SynthesisResult::RemoteUrl(raw.to_string()),
        ResultShape::DataUrl => SynthesisResult::InlineEncodedImage(raw.to_string()),
        ResultShape::BarePayload => {
            SynthesisResult::InlineEncodedImage(format!("{BARE_PAYLOAD_PREFIX}{raw}"))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_remote_urls() {
        assert_eq!(
            classify_result_image(Some("https://x/y.jpg")).ok(),
            Some(SynthesisResult::RemoteUrl("https://x/y.jpg".to_string()))
        );
        assert_eq!(
            classify_result_image(Some("http://cdn.local/r.png")).ok(),
            Some(SynthesisResult::RemoteUrl("http://cdn.local/r.png".to_string()))
        );
    }

    #[test]
    fn keeps_data_urls_as_is() {
        assert_eq!(
            classify_result_image(Some("data:image/png;base64,AAA=")).ok(),
            Some(SynthesisResult::InlineEncodedImage(
                "data:image/png;base64,AAA=".to_string()
            ))
        );
    }

    #[test]
    fn wraps_bare_payload_without_validating_it() {
        assert_eq!(
            classify_result_image(Some("AAA=")).ok(),
            Some(SynthesisResult::InlineEncodedImage(
                "data:image/jpeg;base64,AAA=".to_string()
            ))
        );
        assert_eq!(
            classify_result_image(Some("not base64 at all!")).ok(),
            Some(SynthesisResult::InlineEncodedImage(
                "data:image/jpeg;base64,not base64 at all!".to_string()
            ))
        );
    }

    #[test]
    fn absent_or_empty_is_missing_result() {
        assert!(matches!(
            classify_result_image(None),
            Err(TryOnError::MissingResult)
        ));
        assert!(matches!(
            classify_result_image(Some("")),
            Err(TryOnError::MissingResult)
        ));
    }

    #[test]
    fn rule_order_is_url_then_data_then_fallback() {
        let shapes: Vec<ResultShape> = CLASSIFICATION_RULES.iter().map(|rule| rule.shape).collect();
        assert_eq!(
            shapes,
            vec![
                ResultShape::RemoteUrl,
                ResultShape::DataUrl,
                ResultShape::BarePayload
            ]
        );
        // The fallback rule matches everything, so it has to stay last.
        assert!(CLASSIFICATION_RULES[2].matches("https://x"));
        assert_eq!(result_shape("httpx"), ResultShape::BarePayload);
        assert_eq!(result_shape("data:"), ResultShape::DataUrl);
    }

    #[test]
    fn display_elides_inline_payloads() {
        let inline = SynthesisResult::InlineEncodedImage(format!(
            "{BARE_PAYLOAD_PREFIX}{}",
            "A".repeat(200)
        ));
        let shown = inline.to_string();
        assert!(shown.starts_with("data:image/jpeg;base64,AAAAAAAAA…"));
        assert!(shown.ends_with("(223 chars)"));
        assert!(!inline.is_remote());
        assert_eq!(inline.as_str().len(), 223);
    }
}
