use std::fmt;
use std::io::Cursor;
use std::path::Path;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::metadata::Orientation;
use image::{DynamicImage, ImageDecoder, ImageReader, RgbaImage};
use sha2::{Digest, Sha256};

use crate::error::{Result, TryOnError};

pub const DEFAULT_MAX_DIMENSION: u32 = 2000;
pub const DEFAULT_JPEG_QUALITY: f32 = 0.85;
pub const JPEG_MIME: &str = "image/jpeg";

/// Compressed image bytes tagged with their media type.
///
/// The payload is shared and never mutated; producing a different image means
/// producing a new value.
#[derive(Clone, PartialEq, Eq)]
pub struct EncodedImage {
    bytes: Arc<[u8]>,
    mime_type: String,
    width: u32,
    height: u32,
}

impl EncodedImage {
    pub(crate) fn new(bytes: Vec<u8>, mime_type: impl Into<String>, width: u32, height: u32) -> Self {
        Self {
            bytes: bytes.into(),
            mime_type: mime_type.into(),
            width,
            height,
        }
    }

    /// Wraps an existing `data:<mime>;base64,<payload>` URI without
    /// re-encoding it. The payload must decode as an image.
    pub fn from_data_url(raw: &str) -> Result<Self> {
        let (mime_type, bytes) = parse_data_url(raw)?;
        let (width, height) = ImageReader::new(Cursor::new(bytes.as_slice()))
            .with_guessed_format()
            .map_err(|err| TryOnError::Decode(format!("failed to guess format: {err}")))?
            .into_dimensions()
            .map_err(|err| TryOnError::Decode(err.to_string()))?;
        Ok(Self::new(bytes, mime_type, width, height))
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn mime_type(&self) -> &str {
        &self.mime_type
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime_type, BASE64.encode(&self.bytes))
    }

    /// SHA-256 of the encoded bytes, hex encoded.
    pub fn fingerprint(&self) -> String {
        hex::encode(Sha256::digest(&self.bytes))
    }
}

impl fmt::Debug for EncodedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedImage")
            .field("mime_type", &self.mime_type)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("len", &self.bytes.len())
            .finish()
    }
}

/// Where a raw image comes from before normalization.
#[derive(Debug, Clone, Copy)]
pub enum ImageSource<'a> {
    /// Encoded bytes of any supported format (an upload or a proxied fetch).
    Bytes(&'a [u8]),
    File(&'a Path),
    /// `data:<mime>;base64,<payload>` URI.
    DataUrl(&'a str),
    /// A raw camera frame.
    Frame(&'a RgbaImage),
}

impl ImageSource<'_> {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Bytes(_) => "bytes",
            Self::File(_) => "file",
            Self::DataUrl(_) => "data_url",
            Self::Frame(_) => "camera_frame",
        }
    }

    fn decode(self) -> Result<DynamicImage> {
        match self {
            Self::Bytes(bytes) => decode_image(bytes),
            Self::File(path) => {
                let bytes = std::fs::read(path).map_err(|err| {
                    TryOnError::Decode(format!("failed reading {}: {err}", path.display()))
                })?;
                decode_image(&bytes)
            }
            Self::DataUrl(raw) => {
                let (_, bytes) = parse_data_url(raw)?;
                decode_image(&bytes)
            }
            Self::Frame(frame) => {
                if frame.width() == 0 || frame.height() == 0 {
                    return Err(TryOnError::Decode("camera frame is empty".to_string()));
                }
                Ok(DynamicImage::ImageRgba8(frame.clone()))
            }
        }
    }
}

/// Bounds and re-encodes input images.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImageNormalizer {
    max_dimension: u32,
    quality: f32,
}

impl Default for ImageNormalizer {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            quality: DEFAULT_JPEG_QUALITY,
        }
    }
}

impl ImageNormalizer {
    /// `quality` is a fraction in `(0, 1]`.
    pub fn new(max_dimension: u32, quality: f32) -> Result<Self> {
        if max_dimension == 0 {
            return Err(TryOnError::Config(
                "max image dimension must be at least 1".to_string(),
            ));
        }
        if !(quality > 0.0 && quality <= 1.0) {
            return Err(TryOnError::Config(format!(
                "jpeg quality must be in (0, 1], got {quality}"
            )));
        }
        Ok(Self {
            max_dimension,
            quality,
        })
    }

    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    pub fn quality(&self) -> f32 {
        self.quality
    }

    pub fn normalize(&self, source: ImageSource<'_>) -> Result<EncodedImage> {
        let img = source.decode()?;
        let (src_w, src_h) = (img.width(), img.height());
        let (dst_w, dst_h) = bounded_dimensions(src_w, src_h, self.max_dimension);

        let img = if (dst_w, dst_h) != (src_w, src_h) {
            img.resize_exact(dst_w, dst_h, FilterType::Lanczos3)
        } else {
            img
        };

        let bytes = encode_jpeg(&img, jpeg_quality_percent(self.quality))?;
        tracing::debug!(
            src_w,
            src_h,
            dst_w,
            dst_h,
            bytes = bytes.len(),
            "normalized image"
        );
        Ok(EncodedImage::new(bytes, JPEG_MIME, dst_w, dst_h))
    }
}

/// Decodes `source`, caps its larger side at `max_dimension` and re-encodes it
/// as JPEG at `quality` (a fraction in `(0, 1]`).
pub fn normalize(source: &[u8], max_dimension: u32, quality: f32) -> Result<EncodedImage> {
    ImageNormalizer::new(max_dimension, quality)?.normalize(ImageSource::Bytes(source))
}

/// Target size for a `src_w`×`src_h` image under a `max_dimension` cap.
///
/// Never upscales. When scaling, the larger side becomes exactly
/// `max_dimension` and the other side is rounded, with a 1px floor.
pub fn bounded_dimensions(src_w: u32, src_h: u32, max_dimension: u32) -> (u32, u32) {
    if src_w.max(src_h) <= max_dimension {
        return (src_w, src_h);
    }
    let scale_other = |other: u32, larger: u32| {
        ((other as f64 * max_dimension as f64) / larger as f64)
            .round()
            .max(1.0) as u32
    };
    if src_w > src_h {
        (max_dimension, scale_other(src_h, src_w))
    } else {
        (scale_other(src_w, src_h), max_dimension)
    }
}

/// Splits a base64 data URI into its media type and decoded payload.
pub fn parse_data_url(raw: &str) -> Result<(String, Vec<u8>)> {
    let rest = raw
        .trim()
        .strip_prefix("data:")
        .ok_or_else(|| TryOnError::Decode("not a data url".to_string()))?;
    let (header, payload) = rest
        .split_once(',')
        .ok_or_else(|| TryOnError::Decode("data url has no payload".to_string()))?;
    let Some(mime_type) = header.strip_suffix(";base64") else {
        return Err(TryOnError::Decode(
            "only base64 data urls are supported".to_string(),
        ));
    };
    let mime_type = if mime_type.is_empty() {
        "application/octet-stream"
    } else {
        mime_type
    };
    let bytes = BASE64
        .decode(payload.trim())
        .map_err(|err| TryOnError::Decode(format!("invalid base64 payload: {err}")))?;
    Ok((mime_type.to_string(), bytes))
}

/// Decodes `bytes` and rotates the pixels upright per the EXIF Orientation
/// tag, so dimensions match what a viewer displays.
fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    if bytes.is_empty() {
        return Err(TryOnError::Decode("image data is empty".to_string()));
    }
    let mut decoder = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|err| TryOnError::Decode(format!("failed to guess format: {err}")))?
        .into_decoder()
        .map_err(|err| TryOnError::Decode(err.to_string()))?;
    let orientation = decoder.orientation().unwrap_or_else(|err| {
        tracing::debug!(error = %err, "unreadable exif orientation; keeping pixel order");
        Orientation::NoTransforms
    });
    let mut img =
        DynamicImage::from_decoder(decoder).map_err(|err| TryOnError::Decode(err.to_string()))?;
    if orientation != Orientation::NoTransforms {
        tracing::debug!(?orientation, "applying exif orientation");
        img.apply_orientation(orientation);
    }
    Ok(img)
}

fn encode_jpeg(img: &DynamicImage, quality: u8) -> Result<Vec<u8>> {
    let mut buf = Cursor::new(Vec::new());
    let encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    img.to_rgb8()
        .write_with_encoder(encoder)
        .map_err(|err| TryOnError::Decode(format!("jpeg encode failed: {err}")))?;
    Ok(buf.into_inner())
}

fn jpeg_quality_percent(quality: f32) -> u8 {
    (quality * 100.0).round().clamp(1.0, 100.0) as u8
}
