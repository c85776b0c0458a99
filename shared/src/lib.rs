use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum_macros::{Display, EnumString};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AnalysisRequest {
    pub image_data: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_image: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct PredictionItem {
    pub action: String,
    pub confidence: f32,
    pub class_id: usize,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct AnalysisResponse {
    pub predicted_action: String,
    pub confidence: f32,
    pub has_intention: bool,
    pub intention_type: String,
    pub description: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub top_predictions: Vec<PredictionItem>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub goal_similarity: Option<f32>,
    pub success: bool,
}

#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ServiceStatus {
    Healthy,
    Unhealthy,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModelInfo {
    pub model_name: String,
    pub encoder_path: String,
    pub classifier_path: String,
    pub device: String,
    pub backend: String,
    pub num_classes: usize,
    pub num_class_names: usize,
    pub frames_per_clip: usize,
    pub image_size: u32,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct HealthStatus {
    pub status: ServiceStatus,
    pub model_loaded: bool,
    pub timestamp: DateTime<Utc>,
    pub deployment: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_info: Option<ModelInfo>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ErrorResponse {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RootInfo {
    pub message: String,
    pub version: String,
    pub health: String,
    pub deployment: String,
}
