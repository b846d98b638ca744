use image::DynamicImage;
use serde::{Deserialize, Serialize};
use solescope_core::{Error, ImageEncoder, Result};
use std::sync::Arc;

/// Prompts whose probability mass counts towards "this is a sneaker".
pub const POSITIVE_PROMPTS: [&str; 4] = [
    "a photo of a sneaker",
    "a photo of athletic shoes",
    "a photo of running shoes",
    "a photo of sports footwear",
];

pub const NEGATIVE_PROMPTS: [&str; 6] = [
    "not a shoe",
    "random object",
    "a photo of clothing",
    "a photo of a vehicle",
    "a photo of an animal",
    "a photo of food",
];

const HIGH_ACCEPT: f32 = 0.85;
const HIGH_REJECT: f32 = 0.30;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GateConfidence {
    High,
    Medium,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateResult {
    pub is_sneaker: bool,
    pub probability: f32,
    pub confidence: GateConfidence,
}

/// Zero-shot "is this a sneaker" check.
pub struct GateDecisionEngine {
    encoder: Arc<dyn ImageEncoder>,
    threshold: f32,
}

impl GateDecisionEngine {
    pub fn new(encoder: Arc<dyn ImageEncoder>, threshold: f32) -> Self {
        Self { encoder, threshold }
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    pub fn assess(&self, image: &DynamicImage) -> Result<GateResult> {
        let prompts: Vec<&str> = POSITIVE_PROMPTS
            .iter()
            .chain(NEGATIVE_PROMPTS.iter())
            .copied()
            .collect();
        let probs = self.encoder.compare_texts(image, &prompts)?;
        if probs.len() != prompts.len() {
            return Err(Error::Model(format!(
                "expected {} prompt probabilities, got {}",
                prompts.len(),
                probs.len()
            )));
        }
        let probability: f32 = probs[..POSITIVE_PROMPTS.len()].iter().sum();
        if !probability.is_finite() {
            return Err(Error::Model("non-finite gate probability".to_string()));
        }
        Ok(self.decide(probability.clamp(0.0, 1.0)))
    }

    /// Threshold and label a positive-prompt probability.
    pub fn decide(&self, probability: f32) -> GateResult {
        let is_sneaker = probability >= self.threshold;
        let confidence = match is_sneaker {
            true if probability >= HIGH_ACCEPT => GateConfidence::High,
            false if probability <= HIGH_REJECT => GateConfidence::High,
            _ => GateConfidence::Medium,
        };
        GateResult {
            is_sneaker,
            probability,
            confidence,
        }
    }
}
