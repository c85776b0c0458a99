use image::imageops::FilterType;
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::config::{ConfigError, ImageSettings};

pub const IMAGENET_DEFAULT_MEAN: [f32; 3] = [0.485, 0.456, 0.406];
pub const IMAGENET_DEFAULT_STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Evaluation transform of the pretrained encoder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransformConfig {
    #[serde(default)]
    pub image: ImageConfig,
    #[serde(default)]
    pub normalization: NormalizationConfig,
    #[serde(default)]
    pub frames_per_clip: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageConfig {
    pub size: u32,
    /// Short side is resized to `size * resize_ratio` before the center crop.
    pub resize_ratio: f32,
    pub resize_method: ResizeMethod,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            size: 256,
            resize_ratio: 256.0 / 224.0,
            resize_method: ResizeMethod::Bilinear,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizationConfig {
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl Default for NormalizationConfig {
    fn default() -> Self {
        Self {
            mean: IMAGENET_DEFAULT_MEAN,
            std: IMAGENET_DEFAULT_STD,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResizeMethod {
    Nearest,
    Bilinear,
    Bicubic,
    Lanczos,
}

impl ResizeMethod {
    pub fn filter(self) -> FilterType {
        match self {
            ResizeMethod::Nearest => FilterType::Nearest,
            ResizeMethod::Bilinear => FilterType::Triangle,
            ResizeMethod::Bicubic => FilterType::CatmullRom,
            ResizeMethod::Lanczos => FilterType::Lanczos3,
        }
    }
}

impl TransformConfig {
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let config: TransformConfig =
            serde_yaml::from_str(raw).map_err(|e| ConfigError::Preprocess(e.to_string()))?;
        config.check()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::Preprocess(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&raw)
    }

    /// Environment settings win unless a YAML file is configured, which then
    /// overrides size and frame count as well.
    pub fn resolve(settings: &ImageSettings) -> Result<Self, ConfigError> {
        match &settings.preprocess_config {
            Some(path) => {
                let mut config = Self::load(path)?;
                config.frames_per_clip.get_or_insert(settings.frames_per_clip);
                Ok(config)
            }
            None => Ok(Self {
                image: ImageConfig {
                    size: settings.image_size,
                    ..ImageConfig::default()
                },
                normalization: NormalizationConfig::default(),
                frames_per_clip: Some(settings.frames_per_clip),
            }),
        }
    }

    pub fn frames(&self) -> usize {
        self.frames_per_clip.unwrap_or(64)
    }

    pub fn resize_short_side(&self) -> u32 {
        (self.image.size as f32 * self.image.resize_ratio) as u32
    }

    fn check(&self) -> Result<(), ConfigError> {
        if self.image.size == 0 {
            return Err(ConfigError::Preprocess("image.size must be positive".into()));
        }
        if self.image.resize_ratio < 1.0 {
            return Err(ConfigError::Preprocess(
                "image.resize_ratio must be at least 1.0".into(),
            ));
        }
        if self.normalization.std.iter().any(|s| *s <= 0.0) {
            return Err(ConfigError::Preprocess(
                "normalization.std entries must be positive".into(),
            ));
        }
        if self.frames_per_clip == Some(0) {
            return Err(ConfigError::Preprocess("frames_per_clip must be positive".into()));
        }
        Ok(())
    }
}

impl Default for TransformConfig {
    fn default() -> Self {
        Self {
            image: ImageConfig::default(),
            normalization: NormalizationConfig::default(),
            frames_per_clip: Some(64),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_short_side_matches_eval_transform() {
        assert_eq!(TransformConfig::default().resize_short_side(), 292);
    }

    #[test]
    fn yaml_overrides_and_defaults() {
        let config = TransformConfig::from_yaml(
            r#"
image:
  size: 224
  resize_ratio: 1.0
  resize_method: bicubic
frames_per_clip: 16
"#,
        )
        .unwrap();
        assert_eq!(config.image.size, 224);
        assert_eq!(config.image.resize_method, ResizeMethod::Bicubic);
        assert_eq!(config.normalization.mean, IMAGENET_DEFAULT_MEAN);
        assert_eq!(config.frames(), 16);
    }

    #[test]
    fn invalid_yaml_values_are_config_errors() {
        let err = TransformConfig::from_yaml(
            "normalization:\n  mean: [0.5, 0.5, 0.5]\n  std: [0.5, 0.0, 0.5]\n",
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Preprocess(_)));
        assert!(TransformConfig::from_yaml("image: [1, 2]").is_err());
    }
}
