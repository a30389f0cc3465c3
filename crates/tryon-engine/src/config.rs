use std::env;
use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use url::{Host, Url};

use crate::normalizer::{DEFAULT_JPEG_QUALITY, DEFAULT_MAX_DIMENSION};

pub const PRODUCTION_BACKEND: &str = "https://web-production-22c96.up.railway.app";
pub const LOCAL_BACKEND: &str = "http://localhost:8000";
/// Hosts under this suffix are packaged deployments of the front end.
pub const PACKAGED_APP_HOST_SUFFIX: &str = ".vercel.app";
pub const DEFAULT_APP_ORIGIN: &str = "http://localhost";

pub const SYNTHESIS_PATH: &str = "/api/pwa/virtual-tryon";
pub const FETCH_IMAGE_PATH: &str = "/api/fetch-image";

pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 120_000;
pub const DEFAULT_PROGRESS_INTERVAL_MS: u64 = 500;

/// Inclusive bounds applied to every source of these settings.
pub const MAX_IMAGE_SIZE_RANGE: (u32, u32) = (64, 8192);
pub const JPEG_QUALITY_RANGE: (f32, f32) = (0.05, 1.0);
pub const REQUEST_TIMEOUT_MS_RANGE: (u64, u64) = (1_000, 600_000);
pub const PROGRESS_INTERVAL_MS_RANGE: (u64, u64) = (50, 5_000);

/// Static settings for one session, read once at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct TryOnConfig {
    pub api_base_url: String,
    pub max_image_size: u32,
    pub jpeg_quality: f32,
    pub request_timeout: Duration,
    pub progress_interval: Duration,
    pub history_path: Option<PathBuf>,
}

impl Default for TryOnConfig {
    fn default() -> Self {
        Self {
            api_base_url: LOCAL_BACKEND.to_string(),
            max_image_size: DEFAULT_MAX_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            progress_interval: Duration::from_millis(DEFAULT_PROGRESS_INTERVAL_MS),
            history_path: None,
        }
    }
}

impl TryOnConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(non_empty_env)
    }

    /// Builds a config from `lookup`, falling back to defaults for missing or
    /// malformed values and clamping the rest.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let api_base_url = lookup("API_BASE_URL")
            .map(|value| value.trim().trim_end_matches('/').to_string())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| {
                resolve_api_base(
                    lookup("APP_ORIGIN")
                        .as_deref()
                        .unwrap_or(DEFAULT_APP_ORIGIN),
                )
            });
        let max_image_size = lookup("MAX_IMAGE_SIZE")
            .and_then(|value| value.trim().parse::<u32>().ok())
            .map(clamp_max_image_size)
            .unwrap_or(defaults.max_image_size);
        let jpeg_quality = lookup("JPEG_QUALITY")
            .and_then(|value| value.trim().parse::<f32>().ok())
            .and_then(clamp_jpeg_quality)
            .unwrap_or(defaults.jpeg_quality);
        let request_timeout = lookup("REQUEST_TIMEOUT_MS")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(clamp_request_timeout)
            .unwrap_or(defaults.request_timeout);
        let progress_interval = lookup("PROGRESS_INTERVAL_MS")
            .and_then(|value| value.trim().parse::<u64>().ok())
            .map(clamp_progress_interval)
            .unwrap_or(defaults.progress_interval);
        let history_path = lookup("TRYON_HISTORY_PATH").map(PathBuf::from);

        Self {
            api_base_url,
            max_image_size,
            jpeg_quality,
            request_timeout,
            progress_interval,
            history_path,
        }
    }

    pub fn set_max_image_size(&mut self, max_image_size: u32) {
        self.max_image_size = clamp_max_image_size(max_image_size);
    }

    /// Non-finite values keep the current quality.
    pub fn set_jpeg_quality(&mut self, quality: f32) {
        if let Some(quality) = clamp_jpeg_quality(quality) {
            self.jpeg_quality = quality;
        }
    }

    pub fn set_request_timeout_ms(&mut self, timeout_ms: u64) {
        self.request_timeout = clamp_request_timeout(timeout_ms);
    }

    pub fn set_progress_interval_ms(&mut self, interval_ms: u64) {
        self.progress_interval = clamp_progress_interval(interval_ms);
    }

    pub fn synthesis_endpoint(&self) -> String {
        format!("{}{SYNTHESIS_PATH}", self.api_base_url)
    }

    pub fn fetch_image_endpoint(&self) -> String {
        format!("{}{FETCH_IMAGE_PATH}", self.api_base_url)
    }
}

/// Picks the backend for a front end served from `origin`.
///
/// Packaged-app hosts use the production backend, loopback hosts the local
/// one, and any other host is assumed to serve the API itself.
pub fn resolve_api_base(origin: &str) -> String {
    let Ok(parsed) = Url::parse(origin.trim()) else {
        tracing::warn!(origin, "unparseable app origin; using local backend");
        return LOCAL_BACKEND.to_string();
    };
    match parsed.host() {
        Some(Host::Domain(domain)) if domain.eq_ignore_ascii_case("localhost") => {
            LOCAL_BACKEND.to_string()
        }
        Some(Host::Domain(domain))
            if domain
                .to_ascii_lowercase()
                .ends_with(PACKAGED_APP_HOST_SUFFIX) =>
        {
            PRODUCTION_BACKEND.to_string()
        }
        Some(Host::Ipv4(ip)) if IpAddr::V4(ip).is_loopback() => LOCAL_BACKEND.to_string(),
        Some(Host::Ipv6(ip)) if IpAddr::V6(ip).is_loopback() => LOCAL_BACKEND.to_string(),
        Some(_) => parsed.origin().ascii_serialization(),
        None => LOCAL_BACKEND.to_string(),
    }
}

pub fn clamp_max_image_size(value: u32) -> u32 {
    value.clamp(MAX_IMAGE_SIZE_RANGE.0, MAX_IMAGE_SIZE_RANGE.1)
}

pub fn clamp_jpeg_quality(value: f32) -> Option<f32> {
    value
        .is_finite()
        .then(|| value.clamp(JPEG_QUALITY_RANGE.0, JPEG_QUALITY_RANGE.1))
}

pub fn clamp_request_timeout(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(REQUEST_TIMEOUT_MS_RANGE.0, REQUEST_TIMEOUT_MS_RANGE.1))
}

pub fn clamp_progress_interval(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(PROGRESS_INTERVAL_MS_RANGE.0, PROGRESS_INTERVAL_MS_RANGE.1))
}

pub(crate) fn non_empty_env(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::time::Duration;

    use super::*;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn resolves_backend_by_host_class() {
        assert_eq!(resolve_api_base("https://iburba.vercel.app"), PRODUCTION_BACKEND);
        assert_eq!(
            resolve_api_base("https://preview-123.IBURBA.Vercel.App/fitting.html"),
            PRODUCTION_BACKEND
        );
        assert_eq!(resolve_api_base("http://localhost:3000"), LOCAL_BACKEND);
        assert_eq!(resolve_api_base("http://127.0.0.1:5500"), LOCAL_BACKEND);
        assert_eq!(resolve_api_base("http://[::1]:8080"), LOCAL_BACKEND);
        assert_eq!(
            resolve_api_base("https://fit.example.com/app/index.html"),
            "https://fit.example.com"
        );
        assert_eq!(
            resolve_api_base("http://fit.example.com:8443/"),
            "http://fit.example.com:8443"
        );
        assert_eq!(resolve_api_base("not a url"), LOCAL_BACKEND);
    }

    #[test]
    fn defaults_when_nothing_is_set() {
        let config = TryOnConfig::from_lookup(|_| None);
        assert_eq!(config, TryOnConfig::default());
        assert_eq!(config.max_image_size, 2000);
        assert_eq!(config.jpeg_quality, 0.85);
        assert_eq!(config.request_timeout, Duration::from_millis(120_000));
        assert_eq!(
            config.synthesis_endpoint(),
            "http://localhost:8000/api/pwa/virtual-tryon"
        );
        assert_eq!(
            config.fetch_image_endpoint(),
            "http://localhost:8000/api/fetch-image"
        );
    }

    #[test]
    fn explicit_base_url_wins_over_origin() {
        let config = TryOnConfig::from_lookup(lookup_from(&[
            ("API_BASE_URL", "https://api.example.com/"),
            ("APP_ORIGIN", "https://iburba.vercel.app"),
        ]));
        assert_eq!(config.api_base_url, "https://api.example.com");

        let config =
            TryOnConfig::from_lookup(lookup_from(&[("APP_ORIGIN", "https://iburba.vercel.app")]));
        assert_eq!(config.api_base_url, PRODUCTION_BACKEND);
    }

    #[test]
    fn numeric_values_are_parsed_clamped_or_defaulted() {
        let config = TryOnConfig::from_lookup(lookup_from(&[
            ("MAX_IMAGE_SIZE", "1024"),
            ("JPEG_QUALITY", "7"),
            ("REQUEST_TIMEOUT_MS", "5"),
            ("PROGRESS_INTERVAL_MS", "abc"),
            ("TRYON_HISTORY_PATH", "/tmp/history.json"),
        ]));
        assert_eq!(config.max_image_size, 1024);
        assert_eq!(config.jpeg_quality, 1.0);
        assert_eq!(config.request_timeout, Duration::from_millis(1_000));
        assert_eq!(config.progress_interval, Duration::from_millis(500));
        assert_eq!(
            config.history_path.as_deref(),
            Some(std::path::Path::new("/tmp/history.json"))
        );

        let config = TryOnConfig::from_lookup(lookup_from(&[("JPEG_QUALITY", "NaN")]));
        assert_eq!(config.jpeg_quality, 0.85);
    }

    #[test]
    fn setters_apply_the_same_bounds_as_the_environment() {
        let mut config = TryOnConfig::default();
        config.set_max_image_size(0);
        config.set_jpeg_quality(5.0);
        config.set_request_timeout_ms(0);
        config.set_progress_interval_ms(1_000_000);

        let from_env = TryOnConfig::from_lookup(lookup_from(&[
            ("MAX_IMAGE_SIZE", "0"),
            ("JPEG_QUALITY", "5"),
            ("REQUEST_TIMEOUT_MS", "0"),
            ("PROGRESS_INTERVAL_MS", "1000000"),
        ]));
        assert_eq!(config, from_env);
        assert_eq!(config.max_image_size, 64);
        assert_eq!(config.jpeg_quality, 1.0);
        assert_eq!(config.request_timeout, Duration::from_millis(1_000));
        assert_eq!(config.progress_interval, Duration::from_millis(5_000));

        config.set_jpeg_quality(f32::NAN);
        assert_eq!(config.jpeg_quality, 1.0);
    }
}
