pub mod labels;
#[cfg(feature = "torch")]
pub mod torch;

use shared::ModelInfo;
use std::sync::{Arc, OnceLock};

use crate::config::Settings;
use crate::preprocess::Clip;

pub use labels::LabelMap;

#[derive(Debug, thiserror::Error)]
pub enum ModelError {
    #[error("failed to load {artifact}: {reason}")]
    Load { artifact: String, reason: String },
    #[error("class names: {0}")]
    Labels(String),
    #[error("forward pass failed: {0}")]
    Forward(String),
    #[error("unexpected output shape: {0}")]
    Shape(String),
    #[error("this build has no inference backend; rebuild with `--features torch`")]
    BackendUnavailable,
}

/// Output of one forward pass over the encoder and classifier head.
#[derive(Debug, Clone, PartialEq)]
pub struct Classification {
    /// Softmax distribution over the label set.
    pub probabilities: Vec<f32>,
    /// Cosine similarity of pooled embeddings, present when a goal clip was given.
    pub goal_similarity: Option<f32>,
}

/// Encoder plus classifier head. Weights are read-only once loaded.
pub trait InferenceEngine: Send + Sync {
    fn classify(&self, clip: &Clip, goal: Option<&Clip>) -> Result<Classification, ModelError>;

    fn info(&self) -> ModelInfo;
}

pub struct LoadedModel {
    engine: Box<dyn InferenceEngine>,
    labels: LabelMap,
    top_k: usize,
}

impl LoadedModel {
    pub fn new(engine: Box<dyn InferenceEngine>, labels: LabelMap, top_k: usize) -> Self {
        Self {
            engine,
            labels,
            top_k,
        }
    }

    pub fn engine(&self) -> &dyn InferenceEngine {
        self.engine.as_ref()
    }

    pub fn labels(&self) -> &LabelMap {
        &self.labels
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    pub fn info(&self) -> ModelInfo {
        let mut info = self.engine.info();
        info.num_class_names = self.labels.len();
        info
    }
}

/// Readiness-guarded slot for the process-wide model.
#[derive(Clone, Default)]
pub struct ModelHandle {
    slot: Arc<OnceLock<Arc<LoadedModel>>>,
}

impl ModelHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ready(model: LoadedModel) -> Self {
        let handle = Self::new();
        handle.install(model);
        handle
    }

    /// First install wins; later calls are ignored and return false.
    pub fn install(&self, model: LoadedModel) -> bool {
        self.slot.set(Arc::new(model)).is_ok()
    }

    pub fn get(&self) -> Option<Arc<LoadedModel>> {
        self.slot.get().cloned()
    }

    pub fn is_loaded(&self) -> bool {
        self.slot.get().is_some()
    }
}

/// Loads labels, encoder and classifier head as configured. Blocking.
pub fn load(settings: &Settings) -> Result<LoadedModel, ModelError> {
    let labels = LabelMap::load(&settings.model.class_names_path, settings.model.num_classes)?;
    let engine = load_engine(settings)?;
    Ok(LoadedModel::new(engine, labels, settings.model.top_k))
}

#[cfg(feature = "torch")]
fn load_engine(settings: &Settings) -> Result<Box<dyn InferenceEngine>, ModelError> {
    Ok(Box::new(torch::TorchEngine::load(settings)?))
}

#[cfg(not(feature = "torch"))]
fn load_engine(_settings: &Settings) -> Result<Box<dyn InferenceEngine>, ModelError> {
    Err(ModelError::BackendUnavailable)
}

/// Cosine similarity of two equally sized vectors, 0 when either is all zeros.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        0.0
    } else {
        dot / (na * nb)
    }
}
