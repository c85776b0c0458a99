//! Request pipeline shared by every deployment adapter:
//! validate, preprocess, infer, format.

use chrono::Utc;
use shared::{
    AnalysisRequest, AnalysisResponse, HealthStatus, ModelInfo, PredictionItem, RootInfo,
    ServiceStatus,
};
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{self, CachedPrediction, ResultCache};
use crate::config::{Deployment, Settings};
use crate::error::ApiError;
use crate::model::ModelHandle;
use crate::monitoring::ErrorReporter;
use crate::preprocess::{FramePreprocessor, TransformConfig};

pub const API_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Maps a ranked prediction to the intention fields of the response.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IntentionPolicy {
    pub threshold: f32,
}

impl IntentionPolicy {
    pub fn new(threshold: f32) -> Self {
        Self { threshold }
    }

    pub fn has_intention(&self, confidence: f32) -> bool {
        confidence > self.threshold
    }

    pub fn format(
        &self,
        top_predictions: Vec<PredictionItem>,
        goal_similarity: Option<f32>,
    ) -> Result<AnalysisResponse, ApiError> {
        let top = top_predictions
            .first()
            .cloned()
            .ok_or_else(|| ApiError::Inference("classifier produced no classes".into()))?;
        let confidence = top.confidence.clamp(0.0, 1.0);
        let has_intention = self.has_intention(confidence);
        let intention_type = match (has_intention, goal_similarity) {
            (false, _) => "none",
            (true, Some(_)) => "goal_directed",
            (true, None) => "visual_action",
        };
        let description = match goal_similarity {
            Some(similarity) => format!(
                "V-JEPA-2 predicted action: {} (goal similarity {:.2})",
                top.action, similarity
            ),
            None => format!("V-JEPA-2 predicted action: {}", top.action),
        };

        Ok(AnalysisResponse {
            predicted_action: top.action,
            confidence,
            has_intention,
            intention_type: intention_type.to_string(),
            description,
            timestamp: Utc::now(),
            top_predictions,
            goal_similarity,
            success: true,
        })
    }
}

#[derive(Clone)]
pub struct AnalysisService {
    model: ModelHandle,
    preprocessor: Arc<FramePreprocessor>,
    policy: IntentionPolicy,
    timeout: Duration,
    deployment: Deployment,
    cache: Option<Arc<dyn ResultCache>>,
    reporter: Option<ErrorReporter>,
}

impl AnalysisService {
    pub fn new(
        model: ModelHandle,
        preprocessor: FramePreprocessor,
        policy: IntentionPolicy,
        timeout: Duration,
        deployment: Deployment,
    ) -> Self {
        Self {
            model,
            preprocessor: Arc::new(preprocessor),
            policy,
            timeout,
            deployment,
            cache: None,
            reporter: None,
        }
    }

    /// Wires the optional cache and monitoring sink; both degrade to disabled
    /// with a warning when they cannot be set up.
    pub async fn from_settings(
        settings: &Settings,
        model: ModelHandle,
        deployment: Deployment,
    ) -> Result<Self, crate::config::ConfigError> {
        let transform = TransformConfig::resolve(&settings.image)?;
        let preprocessor = FramePreprocessor::new(transform, settings.image.max_image_bytes);
        let mut service = Self::new(
            model,
            preprocessor,
            IntentionPolicy::new(settings.intention_threshold),
            settings.server.request_timeout,
            deployment,
        );

        if let Some(url) = &settings.cache_url {
            match cache::connect(url, settings.cache_ttl).await {
                Ok(cache) => {
                    log::info!("Result cache enabled ({})", cache.backend());
                    service = service.with_cache(cache);
                }
                Err(e) => log::warn!("Result cache disabled: {}", e),
            }
        }
        if let Some(dsn) = &settings.monitoring_dsn {
            match ErrorReporter::new(dsn, deployment.as_str()) {
                Ok(reporter) => {
                    log::info!("Error monitoring enabled");
                    service = service.with_reporter(reporter);
                }
                Err(e) => log::warn!("Error monitoring disabled: {}", e),
            }
        }
        Ok(service)
    }

    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn with_reporter(mut self, reporter: ErrorReporter) -> Self {
        self.reporter = Some(reporter);
        self
    }

    pub fn model(&self) -> &ModelHandle {
        &self.model
    }

    pub fn deployment(&self) -> Deployment {
        self.deployment
    }

    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResponse, ApiError> {
        let result = self.run(request).await;
        if let Err(err) = &result {
            if err.status().is_server_error() {
                log::error!("Analysis failed: {}", err);
                if let Some(reporter) = &self.reporter {
                    reporter.report(err, "analyze");
                }
            } else {
                log::info!("Rejected analysis request: {}", err);
            }
        }
        result
    }

    async fn run(&self, request: AnalysisRequest) -> Result<AnalysisResponse, ApiError> {
        let key = self
            .cache
            .as_ref()
            .map(|_| cache::cache_key(&request.image_data, request.goal_image.as_deref()));
        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            match cache.get(key).await {
                Ok(Some(hit)) => {
                    log::debug!("Cache hit for {}", key);
                    return self.policy.format(hit.top_predictions, hit.goal_similarity);
                }
                Ok(None) => {}
                Err(e) => log::warn!("Cache lookup failed: {}", e),
            }
        }

        let preprocessor = self.preprocessor.clone();
        let model = self.model.clone();
        let job = tokio::task::spawn_blocking(move || {
            let clip = preprocessor.prepare(&request.image_data)?;
            let goal = request
                .goal_image
                .as_deref()
                .map(|goal| preprocessor.prepare(goal))
                .transpose()?;

            let model = model.get().ok_or(ApiError::ModelNotLoaded)?;
            let classification = model.engine().classify(&clip, goal.as_ref())?;
            let top_predictions = model
                .labels()
                .rank(&classification.probabilities, model.top_k())?;
            Ok::<_, ApiError>(CachedPrediction {
                top_predictions,
                goal_similarity: classification.goal_similarity,
            })
        });

        let prediction = match tokio::time::timeout(self.timeout, job).await {
            Err(_) => return Err(ApiError::Timeout(self.timeout)),
            Ok(Err(join_error)) => return Err(ApiError::Inference(join_error.to_string())),
            Ok(Ok(result)) => result?,
        };

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Err(e) = cache.put(key, &prediction).await {
                log::warn!("Cache store failed: {}", e);
            }
        }

        self.policy
            .format(prediction.top_predictions, prediction.goal_similarity)
    }

    pub fn health(&self) -> HealthStatus {
        let loaded = self.model.get();
        HealthStatus {
            status: if loaded.is_some() {
                ServiceStatus::Healthy
            } else {
                ServiceStatus::Unhealthy
            },
            model_loaded: loaded.is_some(),
            timestamp: Utc::now(),
            deployment: self.deployment.as_str().to_string(),
            model_info: loaded.map(|model| model.info()),
        }
    }

    pub fn model_info(&self) -> Result<ModelInfo, ApiError> {
        self.model
            .get()
            .map(|model| model.info())
            .ok_or(ApiError::ModelNotLoaded)
    }

    pub fn root(&self) -> RootInfo {
        RootInfo {
            message: "V-JEPA-2 API".to_string(),
            version: API_VERSION.to_string(),
            health: "/api/v1/health".to_string(),
            deployment: self.deployment.as_str().to_string(),
        }
    }
}
