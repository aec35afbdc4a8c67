//! Listing image intake: validation, compression and ordering before upload.
//!
//! Files are decoded with the `image` crate, downscaled to fit
//! [`CompressionSettings::max_dimension`] and re-encoded as JPEG, lowering
//! quality until the result fits [`CompressionSettings::max_bytes`].
//! Decoding and encoding run on the blocking pool.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, ImageEncoder};
use serde::Serialize;
use thiserror::Error;

/// Maximum number of images per listing.
pub const MAX_IMAGES: usize = 10;

/// Errors for a single image.
#[derive(Debug, Error)]
pub enum ImageError {
    #[error("not an image ({0})")]
    NotAnImage(String),

    #[error("could not read image: {0}")]
    Decode(String),

    #[error("could not encode image: {0}")]
    Encode(String),

    #[error("image is still {bytes} bytes at the lowest quality")]
    TooLarge { bytes: usize },

    #[error("compression task failed: {0}")]
    Task(String),
}

/// Compression limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressionSettings {
    /// Longest edge after resizing, in pixels.
    pub max_dimension: u32,
    /// Largest accepted encoded size.
    pub max_bytes: usize,
    pub initial_quality: u8,
    pub min_quality: u8,
    pub quality_step: u8,
}

impl Default for CompressionSettings {
    fn default() -> Self {
        Self {
            max_dimension: 1920,
            max_bytes: 1024 * 1024,
            initial_quality: 85,
            min_quality: 40,
            quality_step: 10,
        }
    }
}

/// A file as received from the upload form.
#[derive(Debug, Clone)]
pub struct IncomingImage {
    pub file_name: String,
    pub content_type: Option<String>,
    pub bytes: Vec<u8>,
}

impl IncomingImage {
    /// Declared image MIME type, or an image extension when the browser
    /// sent no useful type.
    #[must_use]
    pub fn looks_like_image(&self) -> bool {
        match self.content_type.as_deref() {
            Some(ct) if ct.starts_with("image/") => true,
            Some(ct) if !ct.is_empty() && ct != "application/octet-stream" => false,
            _ => {
                let ext = self
                    .file_name
                    .rsplit_once('.')
                    .map(|(_, ext)| ext.to_ascii_lowercase())
                    .unwrap_or_default();
                matches!(
                    ext.as_str(),
                    "jpg" | "jpeg" | "png" | "webp" | "gif" | "bmp"
                )
            }
        }
    }
}

/// A compressed image waiting to be uploaded.
#[derive(Debug, Clone, Serialize)]
pub struct PendingImage {
    /// Stable id within the batch, used for reordering and removal.
    pub id: u32,
    pub file_name: String,
    pub width: u32,
    pub height: u32,
    pub original_size: usize,
    pub compressed_size: usize,
    #[serde(skip)]
    pub jpeg: Vec<u8>,
}

/// A file that was not admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImageFailure {
    pub file_name: String,
    pub reason: String,
}

/// Outcome of [`ImageBatch::accept`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct AcceptReport {
    pub accepted: usize,
    /// Files beyond the remaining capacity, never inspected.
    pub rejected_over_limit: usize,
    pub failures: Vec<ImageFailure>,
}

impl AcceptReport {
    /// Warning shown to the seller, if anything was left out.
    #[must_use]
    pub fn warning(&self) -> Option<String> {
        let mut parts = Vec::new();
        if self.rejected_over_limit > 0 {
            parts.push(format!(
                "Limite de {MAX_IMAGES} imagens por anúncio: {} arquivo(s) ignorado(s).",
                self.rejected_over_limit
            ));
        }
        for failure in &self.failures {
            parts.push(format!(
                "Não foi possível processar {}.",
                failure.file_name
            ));
        }
        (!parts.is_empty()).then(|| parts.join(" "))
    }
}

/// Ordered images for one listing. The first image is the primary one.
#[derive(Debug, Clone, Default)]
pub struct ImageBatch {
    images: Vec<PendingImage>,
    next_id: u32,
    settings: CompressionSettings,
}

impl ImageBatch {
    #[must_use]
    pub fn new(settings: CompressionSettings) -> Self {
        Self {
            images: Vec::new(),
            next_id: 0,
            settings,
        }
    }

    #[must_use]
    pub fn images(&self) -> &[PendingImage] {
        &self.images
    }

    #[must_use]
    pub fn into_images(self) -> Vec<PendingImage> {
        self.images
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.images.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.images.is_empty()
    }

    #[must_use]
    pub fn remaining_capacity(&self) -> usize {
        MAX_IMAGES.saturating_sub(self.images.len())
    }

    /// Admit files up to the remaining capacity. Files past the capacity are
    /// counted and skipped; files inside it that are not images or fail to
    /// compress are reported and skipped while the rest proceed.
    pub async fn accept(&mut self, files: Vec<IncomingImage>) -> AcceptReport {
        let slots = self.remaining_capacity();
        let mut report = AcceptReport {
            rejected_over_limit: files.len().saturating_sub(slots),
            ..AcceptReport::default()
        };
        if report.rejected_over_limit > 0 {
            tracing::warn!(
                selected = files.len(),
                slots,
                "Image selection exceeds listing limit"
            );
        }

        for file in files.into_iter().take(slots) {
            let file_name = file.file_name.clone();
            match prepare(file, self.settings).await {
                Ok(compressed) => {
                    self.images.push(PendingImage {
                        id: self.next_id,
                        file_name,
                        width: compressed.width,
                        height: compressed.height,
                        original_size: compressed.original_size,
                        compressed_size: compressed.jpeg.len(),
                        jpeg: compressed.jpeg,
                    });
                    self.next_id += 1;
                    report.accepted += 1;
                }
                Err(err) => {
                    tracing::warn!(file = %file_name, error = %err, "Image rejected");
                    report.failures.push(ImageFailure {
                        file_name,
                        reason: err.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Remove an image. Returns whether it was present.
    pub fn remove(&mut self, id: u32) -> bool {
        let before = self.images.len();
        self.images.retain(|img| img.id != id);
        self.images.len() != before
    }

    /// Move an image to `to_index` (clamped to the end), shifting the others.
    /// Moving to index 0 makes it the primary image.
    pub fn move_image(&mut self, id: u32, to_index: usize) -> bool {
        let Some(from) = self.images.iter().position(|img| img.id == id) else {
            return false;
        };
        let image = self.images.remove(from);
        let to = to_index.min(self.images.len());
        self.images.insert(to, image);
        true
    }
}

#[derive(Debug)]
struct Compressed {
    jpeg: Vec<u8>,
    width: u32,
    height: u32,
    original_size: usize,
}

async fn prepare(
    file: IncomingImage,
    settings: CompressionSettings,
) -> Result<Compressed, ImageError> {
    if !file.looks_like_image() {
        return Err(ImageError::NotAnImage(
            file.content_type
                .unwrap_or_else(|| "tipo desconhecido".to_string()),
        ));
    }

    tokio::task::spawn_blocking(move || compress(&file.bytes, &settings))
        .await
        .map_err(|e| ImageError::Task(e.to_string()))?
}

/// Decode, downscale and re-encode as JPEG within the size budget.
fn compress(bytes: &[u8], settings: &CompressionSettings) -> Result<Compressed, ImageError> {
    let img = image::load_from_memory(bytes).map_err(|e| ImageError::Decode(e.to_string()))?;

    let (width, height) = fit_within(img.width(), img.height(), settings.max_dimension);
    let img = if (width, height) == (img.width(), img.height()) {
        img
    } else {
        img.resize_exact(width, height, FilterType::Triangle)
    };
    let rgb = img.to_rgb8();

    let mut quality = settings.initial_quality;
    loop {
        let mut buffer = Cursor::new(Vec::new());
        JpegEncoder::new_with_quality(&mut buffer, quality)
            .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
            .map_err(|e| ImageError::Encode(e.to_string()))?;
        let jpeg = buffer.into_inner();

        if jpeg.len() <= settings.max_bytes {
            tracing::debug!(
                original = bytes.len(),
                compressed = jpeg.len(),
                quality,
                width,
                height,
                "Image compressed"
            );
            return Ok(Compressed {
                jpeg,
                width,
                height,
                original_size: bytes.len(),
            });
        }

        let Some(next) = next_quality(quality, settings) else {
            return Err(ImageError::TooLarge { bytes: jpeg.len() });
        };
        quality = next;
    }
}

/// The next quality to try after `quality` was too large, ending on
/// `min_quality` itself. `None` once the floor has been tried.
fn next_quality(quality: u8, settings: &CompressionSettings) -> Option<u8> {
    if quality <= settings.min_quality || settings.quality_step == 0 {
        return None;
    }
    Some(
        quality
            .saturating_sub(settings.quality_step)
            .max(settings.min_quality),
    )
}

/// Scale `(width, height)` down so the longer edge is at most `max`,
/// keeping the aspect ratio. Smaller images are left alone.
#[must_use]
pub fn fit_within(width: u32, height: u32, max: u32) -> (u32, u32) {
    if width <= max && height <= max {
        return (width, height);
    }
    let scale = |edge: u32, longest: u32| -> u32 {
        let scaled = u64::from(edge) * u64::from(max) / u64::from(longest);
        u32::try_from(scaled).unwrap_or(max).max(1)
    };
    if width >= height {
        (max, scale(height, width))
    } else {
        (scale(width, height), max)
    }
}
