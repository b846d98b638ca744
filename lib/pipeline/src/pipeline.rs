use chrono::Utc;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use solescope_core::{
    AugmentStrength, AugmentationSampler, CatalogStore, Classification, FeatureRow,
    ImageClassifier, ImageEncoder, PriceRegressor, Result, Vector,
};
use solescope_similarity::{SimilarItem, SimilarityRanker};
use solescope_storage::{IndexCache, InventorySnapshot, InventoryStore};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;
use crate::features::FeatureResolver;
use crate::gate::{GateDecisionEngine, GateResult};
use crate::stage::Stage;

/// Collaborators a pipeline needs. Everything is loaded before the first
/// request; the pipeline holds no other state.
#[derive(Clone)]
pub struct PipelineServices {
    pub encoder: Arc<dyn ImageEncoder>,
    pub classifier: Arc<dyn ImageClassifier>,
    pub regressor: Arc<dyn PriceRegressor>,
    pub catalog: Arc<dyn CatalogStore>,
    pub cache: Arc<IndexCache>,
    pub inventory: Arc<InventoryStore>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum PredictionResponse {
    /// The gate decided the image is not a sneaker.
    Rejected { gate: GateResult },
    Completed(Box<CompletedPrediction>),
}

impl PredictionResponse {
    pub fn gate(&self) -> &GateResult {
        match self {
            PredictionResponse::Rejected { gate } => gate,
            PredictionResponse::Completed(c) => &c.gate,
        }
    }

    pub fn completed(&self) -> Option<&CompletedPrediction> {
        match self {
            PredictionResponse::Rejected { .. } => None,
            PredictionResponse::Completed(c) => Some(c),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletedPrediction {
    pub gate: GateResult,
    pub classification: ClassificationSummary,
    pub similar: Stage<Vec<SimilarItem>>,
    pub price: Stage<PriceEstimate>,
    pub product: ProductSummary,
    pub inventory: Stage<InventorySnapshot>,
    pub decision: Decision,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationSummary {
    pub category_label: String,
    pub brand: String,
    pub model: String,
    pub confidence: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceEstimate {
    pub slug_used: String,
    pub features: FeatureRow,
    /// Rounded to cents.
    pub predicted_price: f64,
}

/// Catalog product data merged over the classifier's brand/model guess.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSummary {
    pub category_label: String,
    pub brand: String,
    pub model: String,
    pub product_name: Option<String>,
    pub retail_price_usd: Option<f64>,
    pub lowest_price_usd: Option<f64>,
    pub release_date: Option<String>,
    pub url: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionStatus {
    Ok,
    LowConfidence,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecisionAction {
    Continue,
    ManualCheck,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Decision {
    pub status: DecisionStatus,
    pub decision: DecisionAction,
}

impl Decision {
    /// Depends on classification confidence only.
    pub fn from_confidence(confidence: f32, low_confidence_threshold: f32) -> Self {
        if confidence < low_confidence_threshold {
            Decision {
                status: DecisionStatus::LowConfidence,
                decision: DecisionAction::ManualCheck,
            }
        } else {
            Decision {
                status: DecisionStatus::Ok,
                decision: DecisionAction::Continue,
            }
        }
    }
}

/// Runs one image through gate, classify, search, price, product merge,
/// inventory lookup and decision, in that order.
///
/// Gate and classification failures fail the request. Search, price and
/// inventory failures are recorded in the response and the request
/// completes.
pub struct PredictionPipeline {
    gate: GateDecisionEngine,
    services: PipelineServices,
    features: FeatureResolver,
    ranker: SimilarityRanker,
    sampler: AugmentationSampler,
    config: PipelineConfig,
}

impl PredictionPipeline {
    pub fn new(services: PipelineServices, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            gate: GateDecisionEngine::new(Arc::clone(&services.encoder), config.gate_threshold),
            features: FeatureResolver::new(Arc::clone(&services.catalog)),
            services,
            ranker: SimilarityRanker::new(),
            sampler: AugmentationSampler::new(),
            config,
        })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<IndexCache> {
        &self.services.cache
    }

    pub fn inventory(&self) -> &Arc<InventoryStore> {
        &self.services.inventory
    }

    pub fn predict(&self, image: &DynamicImage) -> Result<PredictionResponse> {
        let gate = self.gate.assess(image)?;
        if !gate.is_sneaker {
            info!(probability = gate.probability, "Image rejected by gate");
            return Ok(PredictionResponse::Rejected { gate });
        }

        let classification = self.services.classifier.classify(image)?;
        let category = classification.category_label.clone();
        debug!(category = %category, confidence = classification.confidence, "Classified");

        let similar = Stage::from_result("search", self.search(image, &category));
        let price = Stage::from_result("price", self.price(&category));
        let product = self.product(&classification);
        let inventory = Stage::from_result(
            "inventory",
            self.services.inventory.find(Some(category.as_str()), None),
        );
        let decision = Decision::from_confidence(
            classification.confidence,
            self.config.low_confidence_threshold,
        );

        for failure in [similar.failure(), price.failure(), inventory.failure()]
            .into_iter()
            .flatten()
        {
            warn!(
                stage = %failure.stage,
                code = %failure.code,
                category = %category,
                "{}",
                failure.message
            );
        }

        let (brand, model) = classification.brand_and_model();
        Ok(PredictionResponse::Completed(Box::new(CompletedPrediction {
            gate,
            classification: ClassificationSummary {
                category_label: category,
                brand,
                model,
                confidence: classification.confidence,
            },
            similar,
            price,
            product,
            inventory,
            decision,
        })))
    }

    /// Embedding used to query the category index. With query augmentation
    /// this is the mean of the unit embeddings of every medium-strength
    /// variant, left at whatever length the mean has.
    pub fn query_embedding(&self, image: &DynamicImage) -> Result<Vector> {
        if !self.config.query_augmentation {
            return self.services.encoder.embed(image)?.normalized();
        }
        let embeddings = self
            .sampler
            .augment(image, AugmentStrength::Medium)
            .iter()
            .map(|variant| self.services.encoder.embed(variant)?.normalized())
            .collect::<Result<Vec<_>>>()?;
        Vector::mean(&embeddings)
    }

    fn search(&self, image: &DynamicImage, category: &str) -> Result<Vec<SimilarItem>> {
        let index = self.services.cache.get_with(
            category,
            false,
            self.config.index_augmentation,
        )?;
        let query = self.query_embedding(image)?;

        let raw_k = if index.is_augmented() {
            self.config.top_k * self.config.augmentation_fanout
        } else {
            self.config.top_k
        };
        let hits = index.search(&query, raw_k)?;
        Ok(self
            .ranker
            .rank(hits, self.config.top_k)
            .into_iter()
            .map(SimilarItem::from)
            .collect())
    }

    fn price(&self, category: &str) -> Result<PriceEstimate> {
        let slug = self.features.representative_slug(category)?;
        let features = self.features.resolve(&slug, Utc::now())?;
        let price = self.services.regressor.predict(&features)?;
        Ok(PriceEstimate {
            slug_used: slug,
            features,
            predicted_price: (price * 100.0).round() / 100.0,
        })
    }

    fn product(&self, classification: &Classification) -> ProductSummary {
        let info = self
            .services
            .catalog
            .category_record(&classification.category_label);
        let (brand, model) = classification.brand_and_model();
        ProductSummary {
            category_label: classification.category_label.clone(),
            brand: info.brand.unwrap_or(brand),
            model: info.silhouette.unwrap_or(model),
            product_name: info.product_name,
            retail_price_usd: info.retail_price_usd,
            lowest_price_usd: info.lowest_price_usd,
            release_date: info.release_date,
            url: info.url,
        }
    }
}
