use reqwest::blocking::Client as HttpClient;

use crate::error::{Result, TryOnError};

pub const ALLOWED_URL_SCHEMES: [&str; 2] = ["http://", "https://"];

/// Trims `url` and checks it against [`ALLOWED_URL_SCHEMES`].
pub fn validate_remote_url(url: &str) -> Result<&str> {
    let trimmed = url.trim();
    if trimmed.is_empty()
        || !ALLOWED_URL_SCHEMES
            .iter()
            .any(|scheme| trimmed.starts_with(scheme))
    {
        return Err(TryOnError::InvalidUrl {
            url: trimmed.to_string(),
        });
    }
    Ok(trimmed)
}

/// Pulls remote images through the backend's same-origin relay, which
/// fetches the target server-side and streams the bytes back.
#[derive(Debug, Clone)]
pub struct RemoteImageFetcher {
    endpoint: String,
    http: HttpClient,
}

impl RemoteImageFetcher {
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

    /// `GET <endpoint>?url=<target>`; the raw bytes still need normalizing.
    pub fn fetch_remote_image(&self, url: &str) -> Result<Vec<u8>> {
        let target = validate_remote_url(url)?;
        tracing::info!(url = %target, proxy = %self.endpoint, "fetching remote image");

        let response = self
            .http
            .get(&self.endpoint)
            .query(&[("url", target)])
            .send()
            .map_err(|err| TryOnError::from_transport(err, None))?;
        let status = response.status();
        if !status.is_success() {
            tracing::warn!(url = %target, status = %status, "image proxy rejected request");
            return Err(TryOnError::Fetch {
                status: status.as_u16(),
            });
        }
        let bytes = response
            .bytes()
            .map_err(|err| TryOnError::from_transport(err, None))?;
        Ok(bytes.to_vec())
    }
}
