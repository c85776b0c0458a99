use serde::Deserialize;
use shared::PredictionItem;
use std::collections::HashMap;
use std::path::Path;

use super::ModelError;

#[derive(Deserialize)]
#[serde(untagged)]
enum LabelFile {
    Indexed(HashMap<String, String>),
    Ordered(Vec<String>),
}

/// Class index to action name. Indices without a name render as `action_<i>`.
#[derive(Debug, Clone)]
pub struct LabelMap {
    names: HashMap<usize, String>,
    num_classes: usize,
}

impl LabelMap {
    pub fn fallback(num_classes: usize) -> Self {
        Self {
            names: HashMap::new(),
            num_classes,
        }
    }

    pub fn from_json(raw: &str, num_classes: usize) -> Result<Self, ModelError> {
        let file: LabelFile =
            serde_json::from_str(raw).map_err(|e| ModelError::Labels(e.to_string()))?;
        let mut names = HashMap::new();
        match file {
            LabelFile::Indexed(map) => {
                for (idx, name) in map {
                    let idx: usize = idx
                        .trim()
                        .parse()
                        .map_err(|_| ModelError::Labels(format!("non-numeric class id '{}'", idx)))?;
                    if idx >= num_classes {
                        return Err(ModelError::Labels(format!(
                            "class id {} out of range for {} classes",
                            idx, num_classes
                        )));
                    }
                    names.insert(idx, name);
                }
            }
            LabelFile::Ordered(list) => {
                if list.len() > num_classes {
                    return Err(ModelError::Labels(format!(
                        "{} names for {} classes",
                        list.len(),
                        num_classes
                    )));
                }
                names.extend(list.into_iter().enumerate());
            }
        }
        Ok(Self { names, num_classes })
    }

    /// Missing file degrades to generated names; a malformed one is an error.
    pub fn load(path: &Path, num_classes: usize) -> Result<Self, ModelError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => {
                let labels = Self::from_json(&raw, num_classes)?;
                log::info!(
                    "Loaded {} class names from {}",
                    labels.len(),
                    path.display()
                );
                Ok(labels)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::warn!(
                    "Class names file {} not found, using default mapping",
                    path.display()
                );
                Ok(Self::fallback(num_classes))
            }
            Err(e) => Err(ModelError::Labels(format!("{}: {}", path.display(), e))),
        }
    }

    pub fn name(&self, idx: usize) -> String {
        self.names
            .get(&idx)
            .cloned()
            .unwrap_or_else(|| format!("action_{}", idx))
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// Highest-probability classes first. Ties keep the lower class id first.
    pub fn rank(&self, probabilities: &[f32], top_k: usize) -> Result<Vec<PredictionItem>, ModelError> {
        if probabilities.len() != self.num_classes {
            return Err(ModelError::Shape(format!(
                "{} scores for {} classes",
                probabilities.len(),
                self.num_classes
            )));
        }
        let scores: Vec<f32> = probabilities.iter().copied().map(sanitize).collect();
        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|a, b| scores[*b].total_cmp(&scores[*a]).then_with(|| a.cmp(b)));
        Ok(order
            .into_iter()
            .take(top_k.max(1))
            .map(|idx| PredictionItem {
                action: self.name(idx),
                confidence: scores[idx],
                class_id: idx,
            })
            .collect())
    }
}

fn sanitize(p: f32) -> f32 {
    if p.is_nan() { 0.0 } else { p.clamp(0.0, 1.0) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indexed_and_ordered_files() {
        let indexed = LabelMap::from_json(r#"{"0": "Pushing something", "2": "Reaching"}"#, 3).unwrap();
        assert_eq!(indexed.name(2), "Reaching");
        assert_eq!(indexed.name(1), "action_1");

        let ordered = LabelMap::from_json(r#"["a", "b"]"#, 2).unwrap();
        assert_eq!(ordered.name(1), "b");
        assert_eq!(ordered.len(), 2);
    }

    #[test]
    fn bad_class_ids_are_errors() {
        assert!(LabelMap::from_json(r#"{"first": "a"}"#, 1).is_err());
        assert!(LabelMap::from_json("42", 1).is_err());
    }

    #[test]
    fn names_beyond_the_class_count_are_rejected() {
        let err = LabelMap::from_json(r#"{"0": "a", "5": "b"}"#, 3).unwrap_err();
        assert!(matches!(err, ModelError::Labels(_)));
        assert!(LabelMap::from_json(r#"["a", "b", "c"]"#, 2).is_err());
        assert_eq!(LabelMap::from_json(r#"["a"]"#, 2).unwrap().len(), 1);
    }

    #[test]
    fn rank_rejects_a_mismatched_head() {
        let labels = LabelMap::fallback(4);
        let err = labels.rank(&[0.5, 0.5], 3).unwrap_err();
        assert!(matches!(err, ModelError::Shape(_)));
        assert!(labels.rank(&[0.1; 5], 3).is_err());
    }

    #[test]
    fn missing_file_falls_back() {
        let labels = LabelMap::load(Path::new("/nonexistent/classes.json"), 174).unwrap();
        assert!(labels.is_empty());
        assert_eq!(labels.num_classes(), 174);
        assert_eq!(labels.name(173), "action_173");
    }

    #[test]
    fn rank_orders_by_probability() {
        let labels = LabelMap::from_json(r#"["drop", "lift", "push", "pull"]"#, 4).unwrap();
        let ranked = labels.rank(&[0.1, 0.6, 0.1, 0.2], 3).unwrap();
        let ids: Vec<usize> = ranked.iter().map(|p| p.class_id).collect();
        assert_eq!(ids, vec![1, 3, 0]);
        assert_eq!(ranked[0].action, "lift");
        assert_eq!(ranked[0].confidence, 0.6);
    }

    #[test]
    fn rank_sanitizes_scores() {
        let ranked = LabelMap::fallback(2).rank(&[f32::NAN, 1.2], 5).unwrap();
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[0].confidence, 1.0);
        assert_eq!(ranked[1].confidence, 0.0);
    }
}
