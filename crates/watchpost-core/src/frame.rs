//! Immutable video frames and their JPEG encodings

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::RgbImage;
use std::path::Path;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("frame has no pixels")]
    Empty,

    #[error("image codec error: {0}")]
    Codec(#[from] image::ImageError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// One decoded frame.
///
/// Pixels are never mutated after capture, so clones share the buffer and a
/// reader's copy cannot observe later writes.
#[derive(Debug, Clone)]
pub struct Frame {
    image: Arc<RgbImage>,
    captured_at: DateTime<Utc>,
    sequence: u64,
}

impl Frame {
    pub fn new(image: RgbImage, sequence: u64) -> Self {
        Self {
            image: Arc::new(image),
            captured_at: Utc::now(),
            sequence,
        }
    }

    /// Decode an encoded image (JPEG, PNG) into a frame
    pub fn decode(bytes: &[u8], sequence: u64) -> Result<Self, FrameError> {
        let image = image::load_from_memory(bytes)?.to_rgb8();
        if image.width() == 0 || image.height() == 0 {
            return Err(FrameError::Empty);
        }
        Ok(Self::new(image, sequence))
    }

    /// Renumber, sharing the pixels
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn image(&self) -> &RgbImage {
        &self.image
    }

    pub fn captured_at(&self) -> DateTime<Utc> {
        self.captured_at
    }

    pub fn sequence(&self) -> u64 {
        self.sequence
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    /// Encode as JPEG, resizing first when `size` differs from the frame
    pub fn to_jpeg(&self, size: Option<(u32, u32)>, quality: u8) -> Result<Vec<u8>, FrameError> {
        let (width, height) = self.dimensions();
        if width == 0 || height == 0 {
            return Err(FrameError::Empty);
        }

        let mut bytes = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut bytes, quality.clamp(1, 100));
        match size {
            Some((w, h)) if (w, h) != (width, height) && w > 0 && h > 0 => {
                let resized = image::imageops::resize(&*self.image, w, h, FilterType::Triangle);
                encoder.encode_image(&resized)?;
            }
            _ => encoder.encode_image(&*self.image)?,
        }
        Ok(bytes)
    }

    /// `data:image/jpeg;base64,...` URL for multimodal requests
    pub fn to_data_url(&self, size: Option<(u32, u32)>, quality: u8) -> Result<String, FrameError> {
        let bytes = self.to_jpeg(size, quality)?;
        Ok(format!("data:image/jpeg;base64,{}", BASE64.encode(bytes)))
    }

    /// Write a full-resolution JPEG snapshot
    pub fn save_jpeg(&self, path: &Path, quality: u8) -> Result<(), FrameError> {
        let bytes = self.to_jpeg(None, quality)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, bytes)?;
        Ok(())
    }
}
