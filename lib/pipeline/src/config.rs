use serde::{Deserialize, Serialize};
use solescope_core::{Error, Result};

/// Tunables for [`crate::PredictionPipeline`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Minimum positive-prompt probability for an image to count as a
    /// sneaker. Inclusive.
    pub gate_threshold: f32,
    /// Classification confidence below which the result is flagged for
    /// manual review.
    pub low_confidence_threshold: f32,
    /// Number of similar items returned.
    pub top_k: usize,
    /// Raw candidates per requested item when searching an augmented index.
    pub augmentation_fanout: usize,
    /// Average the embeddings of augmented query variants.
    pub query_augmentation: bool,
    /// Build missing indices with augmented reference embeddings.
    pub index_augmentation: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            gate_threshold: 0.741,
            low_confidence_threshold: 0.45,
            top_k: 5,
            augmentation_fanout: 10,
            query_augmentation: true,
            index_augmentation: false,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.gate_threshold) {
            return Err(Error::InvalidConfig(format!(
                "gate_threshold must be within [0, 1], got {}",
                self.gate_threshold
            )));
        }
        if !(0.0..=1.0).contains(&self.low_confidence_threshold) {
            return Err(Error::InvalidConfig(format!(
                "low_confidence_threshold must be within [0, 1], got {}",
                self.low_confidence_threshold
            )));
        }
        if self.top_k == 0 {
            return Err(Error::InvalidConfig("top_k must be positive".to_string()));
        }
        if self.augmentation_fanout == 0 {
            return Err(Error::InvalidConfig(
                "augmentation_fanout must be positive".to_string(),
            ));
        }
        Ok(())
    }
}
