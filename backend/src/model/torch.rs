use shared::ModelInfo;
use std::path::Path;
use std::sync::Mutex;
use tch::{CModule, Device, Kind, Tensor};

use super::{Classification, InferenceEngine, ModelError, cosine_similarity};
use crate::config::{DeviceTarget, Settings};
use crate::preprocess::Clip;

/// TorchScript exports of the V-JEPA-2 encoder and its attentive classifier head.
pub struct TorchEngine {
    encoder: Mutex<CModule>,
    classifier: Mutex<CModule>,
    device: Device,
    batch_size: usize,
    num_classes: usize,
    info: ModelInfo,
}

impl TorchEngine {
    pub fn load(settings: &Settings) -> Result<Self, ModelError> {
        let device = resolve_device(settings.model.device);
        log::info!(
            "Loading encoder {} from {} on {:?}",
            settings.model.model_name,
            settings.model.model_path.display(),
            device
        );
        let encoder = load_module(&settings.model.model_path, device)?;
        log::info!(
            "Loading classifier head from {}",
            settings.model.classifier_path.display()
        );
        let classifier = load_module(&settings.model.classifier_path, device)?;

        let info = ModelInfo {
            model_name: settings.model.model_name.clone(),
            encoder_path: settings.model.model_path.display().to_string(),
            classifier_path: settings.model.classifier_path.display().to_string(),
            device: format!("{:?}", device),
            backend: "torchscript".to_string(),
            num_classes: settings.model.num_classes,
            num_class_names: 0,
            frames_per_clip: settings.image.frames_per_clip,
            image_size: settings.image.image_size,
        };

        Ok(Self {
            encoder: Mutex::new(encoder),
            classifier: Mutex::new(classifier),
            device,
            batch_size: settings.model.batch_size,
            num_classes: settings.model.num_classes,
            info,
        })
    }

    fn video_tensor(&self, clip: &Clip) -> Result<Tensor, ModelError> {
        let frame = clip
            .frame
            .as_standard_layout()
            .as_slice()
            .map(Tensor::from_slice)
            .ok_or_else(|| ModelError::Shape("frame is not contiguous".into()))?;
        let [_, c, t, h, w] = clip.video_shape().map(|d| d as i64);
        Ok(frame
            .view([1, c, 1, h, w])
            .repeat([1, 1, t, 1, 1])
            .to_device(self.device))
    }

    fn encode(&self, input: &Tensor) -> Result<Tensor, ModelError> {
        let encoder = self
            .encoder
            .lock()
            .map_err(|_| ModelError::Forward("encoder lock poisoned".into()))?;
        encoder
            .forward_ts(&[input])
            .map_err(|e| ModelError::Forward(e.to_string()))
    }

    fn classify_embedding(&self, embedding: &Tensor) -> Result<Vec<f32>, ModelError> {
        let classifier = self
            .classifier
            .lock()
            .map_err(|_| ModelError::Forward("classifier lock poisoned".into()))?;
        let logits = classifier
            .forward_ts(&[embedding])
            .map_err(|e| ModelError::Forward(e.to_string()))?;
        let size = logits.size();
        if size.last().copied() != Some(self.num_classes as i64) {
            return Err(ModelError::Shape(format!(
                "classifier returned {:?}, expected {} classes",
                size, self.num_classes
            )));
        }
        let probs = logits
            .softmax(-1, Kind::Float)
            .narrow(0, 0, 1)
            .flatten(0, -1)
            .to_device(Device::Cpu);
        Vec::<f32>::try_from(&probs).map_err(|e| ModelError::Forward(e.to_string()))
    }
}

impl InferenceEngine for TorchEngine {
    fn classify(&self, clip: &Clip, goal: Option<&Clip>) -> Result<Classification, ModelError> {
        tch::no_grad(|| {
            let input = self.video_tensor(clip)?;
            let (embedding, goal_embedding) = match goal {
                Some(goal) if self.batch_size >= 2 => {
                    let batch = Tensor::cat(&[input, self.video_tensor(goal)?], 0);
                    let out = self.encode(&batch)?;
                    (out.narrow(0, 0, 1), Some(out.narrow(0, 1, 1)))
                }
                Some(goal) => {
                    let out = self.encode(&input)?;
                    let goal_out = self.encode(&self.video_tensor(goal)?)?;
                    (out, Some(goal_out))
                }
                None => (self.encode(&input)?, None),
            };

            let probabilities = self.classify_embedding(&embedding)?;
            let goal_similarity = match goal_embedding {
                Some(goal_embedding) => Some(cosine_similarity(
                    &pooled(&embedding)?,
                    &pooled(&goal_embedding)?,
                )),
                None => None,
            };

            Ok(Classification {
                probabilities,
                goal_similarity,
            })
        })
    }

    fn info(&self) -> ModelInfo {
        self.info.clone()
    }
}

fn load_module(path: &Path, device: Device) -> Result<CModule, ModelError> {
    let mut module = CModule::load_on_device(path, device).map_err(|e| ModelError::Load {
        artifact: path.display().to_string(),
        reason: e.to_string(),
    })?;
    module.set_eval();
    Ok(module)
}

/// Mean over patch tokens: `[1, N, D]` -> `D` values.
fn pooled(embedding: &Tensor) -> Result<Vec<f32>, ModelError> {
    let pooled = match embedding.dim() {
        3 => embedding.mean_dim([1i64].as_slice(), false, Kind::Float),
        2 => embedding.to_kind(Kind::Float),
        _ => {
            return Err(ModelError::Shape(format!(
                "encoder returned {:?}",
                embedding.size()
            )));
        }
    };
    let flat = pooled.flatten(0, -1).to_device(Device::Cpu);
    Vec::<f32>::try_from(&flat).map_err(|e| ModelError::Forward(e.to_string()))
}

fn resolve_device(target: DeviceTarget) -> Device {
    match target {
        DeviceTarget::Cpu => Device::Cpu,
        DeviceTarget::Mps => Device::Mps,
        DeviceTarget::Auto => Device::cuda_if_available(),
        DeviceTarget::Cuda(idx) => {
            if tch::Cuda::is_available() && (idx as i64) < tch::Cuda::device_count() {
                Device::Cuda(idx)
            } else {
                log::warn!("CUDA device {} is not available, falling back to CPU", idx);
                Device::Cpu
            }
        }
    }
}
