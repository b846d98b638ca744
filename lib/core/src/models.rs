//! Contracts for the external collaborators the prediction pipeline talks
//! to, and the values that cross those boundaries.
//!
//! Implementations live elsewhere: the HTTP inference client in
//! `solescope-pipeline`, the JSON catalog in `solescope-storage`, and
//! in-process fakes in tests. All methods are blocking.

use image::DynamicImage;
use serde::{Deserialize, Serialize};

use crate::{Result, Vector};

/// Embedding model with zero-shot text comparison.
pub trait ImageEncoder: Send + Sync {
    /// Embed an image. Output has a fixed dimension for a given model.
    fn embed(&self, image: &DynamicImage) -> Result<Vector>;

    /// Probability distribution of `image` over `prompts`, in prompt order.
    fn compare_texts(&self, image: &DynamicImage, prompts: &[&str]) -> Result<Vec<f32>>;
}

pub trait ImageClassifier: Send + Sync {
    fn classify(&self, image: &DynamicImage) -> Result<Classification>;
}

pub trait PriceRegressor: Send + Sync {
    fn predict(&self, features: &FeatureRow) -> Result<f64>;
}

/// Read-only product catalog.
pub trait CatalogStore: Send + Sync {
    /// Catalog row for one instance key (slug).
    fn instance(&self, slug: &str) -> Result<CatalogInstance>;

    /// Representative product record for a category. Returns an all-empty
    /// record when the category is unknown.
    fn category_record(&self, category: &str) -> ProductInfo;

    /// Every instance key belonging to `category`, in no particular order.
    fn instance_keys(&self, category: &str) -> Vec<String>;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category_label: String,
    pub confidence: f32,
    #[serde(default)]
    pub brand_guess: Option<String>,
    #[serde(default)]
    pub model_guess: Option<String>,
}

impl Classification {
    /// Brand and model, falling back to the split category label for
    /// whichever guess is missing.
    pub fn brand_and_model(&self) -> (String, String) {
        let (brand, model) = split_brand_model(&self.category_label);
        (
            self.brand_guess.clone().unwrap_or(brand),
            self.model_guess.clone().unwrap_or(model),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogInstance {
    pub slug: String,
    pub category_label: String,
    pub brand: Option<String>,
    pub silhouette: Option<String>,
    pub retail_price_usd: Option<f64>,
    pub release_date: Option<String>,
}

/// Input row for the price regressor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub category_label: String,
    pub brand: Option<String>,
    pub silhouette: Option<String>,
    pub retail_price_usd: Option<f64>,
    /// Years since release, `None` when the date is missing or unparseable.
    pub release_age_years: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProductInfo {
    pub product_name: Option<String>,
    pub brand: Option<String>,
    pub retail_price_usd: Option<f64>,
    pub lowest_price_usd: Option<f64>,
    pub silhouette: Option<String>,
    pub release_date: Option<String>,
    pub url: Option<String>,
}

/// `"adidas_samba"` -> `("Adidas", "Samba")`,
/// `"nike_air_force_1"` -> `("Nike", "Air Force 1")`.
pub fn split_brand_model(category_label: &str) -> (String, String) {
    let mut parts = category_label.split('_').filter(|p| !p.is_empty());
    let brand = parts.next().map(capitalize).unwrap_or_default();
    let model = parts.map(capitalize).collect::<Vec<_>>().join(" ");
    (brand, model)
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first
            .to_uppercase()
            .chain(chars.flat_map(char::to_lowercase))
            .collect(),
        None => String::new(),
    }
}
