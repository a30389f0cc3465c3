use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use reqwest::blocking::Client as HttpClient;

use crate::classify::SynthesisResult;
use crate::error::{Result, TryOnError};
use crate::normalizer::parse_data_url;

/// A result written to disk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedResult {
    pub path: PathBuf,
    pub bytes: usize,
    pub mime_type: Option<String>,
}

/// Turns a [`SynthesisResult`] into image bytes.
///
/// Inline results are decoded locally. Remote results are downloaded directly
/// from the URL the backend returned.
pub fn resolve_result_image(
    http: &HttpClient,
    result: &SynthesisResult,
) -> Result<(Option<String>, Vec<u8>)> {
    match result {
        SynthesisResult::InlineEncodedImage(data_url) => {
            let (mime_type, bytes) = parse_data_url(data_url)?;
            Ok((Some(mime_type), bytes))
        }
        SynthesisResult::RemoteUrl(url) => {
            let response = http
                .get(url)
                .send()
                .map_err(|err| TryOnError::from_transport(err, None))?;
            let status = response.status();
            if !status.is_success() {
                return Err(TryOnError::Fetch {
                    status: status.as_u16(),
                });
            }
            let mime_type = response
                .headers()
                .get(reqwest::header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .map(|value| value.split(';').next().unwrap_or(value).trim().to_string())
                .filter(|value| !value.is_empty());
            let bytes = response
                .bytes()
                .map_err(|err| TryOnError::from_transport(err, None))?;
            Ok((mime_type, bytes.to_vec()))
        }
    }
}

/// Writes `result` to `path`, creating parent directories.
pub fn save_result(
    http: &HttpClient,
    result: &SynthesisResult,
    path: &Path,
) -> anyhow::Result<SavedResult> {
    let (mime_type, bytes) = resolve_result_image(http, result)?;
    if bytes.is_empty() {
        anyhow::bail!("result image is empty");
    }
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    fs::write(path, &bytes).with_context(|| format!("failed to write {}", path.display()))?;
    tracing::info!(path = %path.display(), bytes = bytes.len(), "saved try-on result");
    Ok(SavedResult {
        path: path.to_path_buf(),
        bytes: bytes.len(),
        mime_type,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::classify_result_image;
    use crate::test_support::{http_client, StubServer};

    #[test]
    fn saves_inline_result_without_network() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("out").join("result.jpg");
        let result = classify_result_image(Some("AAECAw=="))?;

        let saved = save_result(&http_client(), &result, &path)?;
        assert_eq!(saved.bytes, 4);
        assert_eq!(saved.mime_type.as_deref(), Some("image/jpeg"));
        assert_eq!(fs::read(&path)?, vec![0, 1, 2, 3]);
        Ok(())
    }

    #[test]
    fn downloads_remote_result() -> anyhow::Result<()> {
        let server = StubServer::respond(200, "image/png", vec![9_u8, 8, 7]);
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("result.png");
        let result = SynthesisResult::RemoteUrl(server.url("/results/abc.png"));

        let saved = save_result(&http_client(), &result, &path)?;
        assert_eq!(saved.mime_type.as_deref(), Some("image/png"));
        assert_eq!(fs::read(&path)?, vec![9, 8, 7]);

        let request = server
            .received()
            .ok_or_else(|| anyhow::anyhow!("stub saw no request"))?;
        assert!(request.request_line().starts_with("GET /results/abc.png "));
        Ok(())
    }

    #[test]
    fn remote_failure_keeps_fetch_taxonomy() -> anyhow::Result<()> {
        let server = StubServer::respond(403, "text/plain", "expired");
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("result.jpg");
        let result = SynthesisResult::RemoteUrl(server.url("/results/gone.jpg"));

        let err = match save_result(&http_client(), &result, &path) {
            Ok(saved) => anyhow::bail!("unexpected save: {saved:?}"),
            Err(err) => err,
        };
        assert!(matches!(
            err.downcast_ref::<TryOnError>(),
            Some(TryOnError::Fetch { status: 403 })
        ));
        assert!(!path.exists());
        Ok(())
    }

    #[test]
    fn undecodable_inline_result_is_decode_error() {
        let result = SynthesisResult::InlineEncodedImage("data:image/jpeg;base64,@@".to_string());
        assert!(matches!(
            resolve_result_image(&http_client(), &result),
            Err(TryOnError::Decode(_))
        ));
    }
}
