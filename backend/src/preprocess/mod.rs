//! Turns base64 image payloads into normalized clip tensors.
//!
//! A still frame is laid out the way the video encoder expects a clip:
//! `[C, H, W]` here, replicated to `[1, C, T, H, W]` by the engine.

pub mod config;

use base64::Engine as _;
use base64::alphabet;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use image::{DynamicImage, RgbImage, imageops};
use ndarray::Array3;

pub use config::TransformConfig;

const PAYLOAD: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, thiserror::Error)]
pub enum PreprocessError {
    #[error("image payload is empty")]
    Empty,
    #[error("image payload is not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("decoded image is {size} bytes, limit is {limit}")]
    TooLarge { size: usize, limit: usize },
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("image has degenerate dimensions {width}x{height}")]
    Degenerate { width: u32, height: u32 },
}

/// One preprocessed frame plus the temporal length it stands for.
#[derive(Debug, Clone, PartialEq)]
pub struct Clip {
    /// Normalized pixels in `[C, H, W]` order.
    pub frame: Array3<f32>,
    pub num_frames: usize,
}

impl Clip {
    pub fn channels(&self) -> usize {
        self.frame.shape()[0]
    }

    pub fn height(&self) -> usize {
        self.frame.shape()[1]
    }

    pub fn width(&self) -> usize {
        self.frame.shape()[2]
    }

    /// Shape of the batched video tensor fed to the encoder.
    pub fn video_shape(&self) -> [usize; 5] {
        [1, self.channels(), self.num_frames, self.height(), self.width()]
    }
}

#[derive(Debug, Clone)]
pub struct FramePreprocessor {
    config: TransformConfig,
    max_image_bytes: usize,
}

impl FramePreprocessor {
    pub fn new(config: TransformConfig, max_image_bytes: usize) -> Self {
        Self {
            config,
            max_image_bytes,
        }
    }

    pub fn config(&self) -> &TransformConfig {
        &self.config
    }

    pub fn prepare(&self, image_data: &str) -> Result<Clip, PreprocessError> {
        let bytes = self.decode_base64(image_data)?;
        let image = decode_image(&bytes)?;
        self.process_image(&image)
    }

    /// Decodes a base64 payload, tolerating a `data:` URL prefix and missing padding.
    pub fn decode_base64(&self, image_data: &str) -> Result<Vec<u8>, PreprocessError> {
        let payload = strip_data_url(image_data.trim());
        if payload.is_empty() {
            return Err(PreprocessError::Empty);
        }
        // Upper bound on the decoded length, checked before allocating.
        let estimate = payload.len() / 4 * 3;
        if estimate > self.max_image_bytes + 2 {
            return Err(PreprocessError::TooLarge {
                size: estimate,
                limit: self.max_image_bytes,
            });
        }
        let bytes = PAYLOAD.decode(payload)?;
        if bytes.len() > self.max_image_bytes {
            return Err(PreprocessError::TooLarge {
                size: bytes.len(),
                limit: self.max_image_bytes,
            });
        }
        Ok(bytes)
    }

    pub fn process_image(&self, image: &DynamicImage) -> Result<Clip, PreprocessError> {
        let (width, height) = (image.width(), image.height());
        if width == 0 || height == 0 {
            return Err(PreprocessError::Degenerate { width, height });
        }
        let frame = self.crop_and_resize(&image.to_rgb8());
        Ok(Clip {
            frame: self.normalize(&frame),
            num_frames: self.config.frames(),
        })
    }

    /// Same region as "resize short side, then center crop", computed on the
    /// source so extreme aspect ratios never allocate a huge intermediate.
    fn crop_and_resize(&self, rgb: &RgbImage) -> RgbImage {
        let size = self.config.image.size;
        let (width, height) = rgb.dimensions();
        let short = width.min(height) as f32;
        let scale = size as f32 / self.config.resize_short_side().max(size) as f32;
        let side = ((short * scale).round() as u32).clamp(1, width.min(height));
        let x = (width - side) / 2;
        let y = (height - side) / 2;
        let region = imageops::crop_imm(rgb, x, y, side, side).to_image();
        if side == size {
            region
        } else {
            imageops::resize(&region, size, size, self.config.image.resize_method.filter())
        }
    }

    fn normalize(&self, rgb: &RgbImage) -> Array3<f32> {
        let (width, height) = rgb.dimensions();
        let mean = self.config.normalization.mean;
        let std = self.config.normalization.std;
        Array3::from_shape_fn((3, height as usize, width as usize), |(c, y, x)| {
            let value = rgb.get_pixel(x as u32, y as u32)[c] as f32 / 255.0;
            (value - mean[c]) / std[c]
        })
    }
}

pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage, PreprocessError> {
    let image = image::load_from_memory(bytes)?;
    if image.width() == 0 || image.height() == 0 {
        return Err(PreprocessError::Degenerate {
            width: image.width(),
            height: image.height(),
        });
    }
    Ok(image)
}

fn strip_data_url(payload: &str) -> &str {
    if payload.starts_with("data:") {
        payload.split_once(',').map(|(_, data)| data).unwrap_or("")
    } else {
        payload
    }
}
