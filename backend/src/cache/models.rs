use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use shared::PredictionItem;

/// Model output worth reusing for an identical payload. Timestamps are not cached.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CachedPrediction {
    pub top_predictions: Vec<PredictionItem>,
    pub goal_similarity: Option<f32>,
}

/// Stable key over the raw payloads, so two identical requests share an entry.
pub fn cache_key(image_data: &str, goal_image: Option<&str>) -> String {
    let mut hasher = Sha256::new();
    hasher.update(image_data.as_bytes());
    if let Some(goal) = goal_image {
        hasher.update([0u8]);
        hasher.update(goal.as_bytes());
    }
    format!("vjepa2:analysis:{}", hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_depends_on_goal() {
        let plain = cache_key("abc", None);
        assert_eq!(plain, cache_key("abc", None));
        assert_ne!(plain, cache_key("abc", Some("def")));
        assert!(plain.starts_with("vjepa2:analysis:"));
        assert_eq!(plain.len(), "vjepa2:analysis:".len() + 64);
    }
}
