#![allow(dead_code)]

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use image::{ImageBuffer, ImageFormat, Rgb, RgbImage};
use shared::ModelInfo;
use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use vjepa_backend::config::Deployment;
use vjepa_backend::model::{
    Classification, InferenceEngine, LabelMap, LoadedModel, ModelError, cosine_similarity,
};
use vjepa_backend::preprocess::config::ImageConfig;
use vjepa_backend::preprocess::{Clip, FramePreprocessor, TransformConfig};
use vjepa_backend::service::{AnalysisService, IntentionPolicy};

pub const NUM_CLASSES: usize = 4;
pub const LABELS: &str = r#"{"0": "Pushing something", "1": "Pulling something", "2": "Lifting something", "3": "Dropping something"}"#;

#[derive(Clone, Copy)]
pub enum Behavior {
    /// Puts 0.85 on a class picked from mean clip brightness.
    Confident,
    Fail,
    Sleep(Duration),
}

/// Deterministic engine standing in for the TorchScript modules.
pub struct StubEngine {
    behavior: Behavior,
    calls: Arc<AtomicUsize>,
}

impl StubEngine {
    pub fn new(behavior: Behavior) -> (Self, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        (
            Self {
                behavior,
                calls: calls.clone(),
            },
            calls,
        )
    }
}

impl InferenceEngine for StubEngine {
    fn classify(&self, clip: &Clip, goal: Option<&Clip>) -> Result<Classification, ModelError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match self.behavior {
            Behavior::Fail => return Err(ModelError::Forward("CUDA out of memory".into())),
            Behavior::Sleep(delay) => std::thread::sleep(delay),
            Behavior::Confident => {}
        }

        let mean = clip.frame.mean().unwrap_or(0.0);
        let winner = (mean.abs() * 10.0) as usize % NUM_CLASSES;
        let rest = 0.15 / (NUM_CLASSES - 1) as f32;
        let probabilities = (0..NUM_CLASSES)
            .map(|i| if i == winner { 0.85 } else { rest })
            .collect();
        let goal_similarity = goal.map(|goal| {
            cosine_similarity(
                clip.frame.as_slice().unwrap_or_default(),
                goal.frame.as_slice().unwrap_or_default(),
            )
        });
        Ok(Classification {
            probabilities,
            goal_similarity,
        })
    }

    fn info(&self) -> ModelInfo {
        ModelInfo {
            model_name: "stub".into(),
            encoder_path: "models/stub.pt".into(),
            classifier_path: "models/stub-classifier.pt".into(),
            device: "cpu".into(),
            backend: "stub".into(),
            num_classes: NUM_CLASSES,
            num_class_names: 0,
            frames_per_clip: 2,
            image_size: 32,
        }
    }
}

pub fn loaded(behavior: Behavior) -> (LoadedModel, Arc<AtomicUsize>) {
    let (engine, calls) = StubEngine::new(behavior);
    let labels = LabelMap::from_json(LABELS, NUM_CLASSES).unwrap();
    (LoadedModel::new(Box::new(engine), labels, 3), calls)
}

pub fn preprocessor(max_image_bytes: usize) -> FramePreprocessor {
    let config = TransformConfig {
        image: ImageConfig {
            size: 32,
            ..ImageConfig::default()
        },
        frames_per_clip: Some(2),
        ..TransformConfig::default()
    };
    FramePreprocessor::new(config, max_image_bytes)
}

pub fn service(model: vjepa_backend::model::ModelHandle, timeout: Duration) -> AnalysisService {
    AnalysisService::new(
        model,
        preprocessor(1 << 20),
        IntentionPolicy::new(0.5),
        timeout,
        Deployment::Container,
    )
}

pub fn gradient(width: u32, height: u32, seed: u8) -> RgbImage {
    ImageBuffer::from_fn(width, height, |x, y| {
        Rgb([
            (x as u8).wrapping_add(seed),
            (y as u8).wrapping_mul(2),
            seed,
        ])
    })
}

pub fn encode(image: &RgbImage, format: ImageFormat) -> String {
    let mut bytes = Cursor::new(Vec::new());
    image.write_to(&mut bytes, format).unwrap();
    STANDARD.encode(bytes.into_inner())
}

pub fn jpeg_b64(width: u32, height: u32, seed: u8) -> String {
    encode(&gradient(width, height, seed), ImageFormat::Jpeg)
}

pub fn png_b64(width: u32, height: u32, seed: u8) -> String {
    encode(&gradient(width, height, seed), ImageFormat::Png)
}
