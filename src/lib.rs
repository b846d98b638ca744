//! # SoleScope
//!
//! A sneaker recognition service: decide whether a photo shows a sneaker,
//! classify the model, find visually similar reference images within the
//! predicted category, estimate a resale price and check stock.
//!
//! ## Quick Start
//!
//! ### As a Server
//!
//! ```bash
//! solescope --reference-root ./reference --catalog ./catalog.json \
//!     --model-url http://127.0.0.1:8500/ --http-port 8080
//! ```
//!
//! ### As a Library
//!
//! ```rust
//! use solescope::prelude::*;
//!
//! let raw = vec![
//!     ("adidas_samba/og-white/1.jpg".to_string(), 0.90),
//!     ("adidas_samba/og-black/2.jpg".to_string(), 0.80),
//!     ("adidas_samba/og-white/1.jpg".to_string(), 0.95),
//! ];
//! let ranked = SimilarityRanker::new().rank(raw, 2);
//! assert_eq!(ranked[0], ("adidas_samba/og-white/1.jpg".to_string(), 0.95));
//! ```
//!
//! ## Crate Structure
//!
//! - `solescope-core` - Vectors, category indices, augmentation, model contracts
//! - `solescope-similarity` - Hit ranking and enrichment
//! - `solescope-storage` - Snapshots, reference library, index cache, catalog, inventory
//! - `solescope-pipeline` - Gate, feature resolution, prediction pipeline, model client
//! - `solescope-api` - REST API

// Re-export core types
pub use solescope_core::{
    AugmentStrength, AugmentationSampler, CatalogStore, CategoryIndex, Classification, Error,
    FeatureRow, ImageClassifier, ImageEncoder, PriceRegressor, ProductInfo, Result, Vector,
};

pub use solescope_similarity::{SimilarItem, SimilarityRanker};

// Re-export storage
pub use solescope_storage::{
    CacheOptions, IndexCache, InventoryStore, InventoryUpsert, JsonCatalog, ReferenceLibrary,
    SnapshotStore,
};

pub use solescope_pipeline::{
    GateDecisionEngine, PipelineConfig, PipelineServices, PredictionPipeline, PredictionResponse,
    RemoteModels,
};

// Re-export API
pub use solescope_api::RestApi;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::{
        AugmentStrength, AugmentationSampler, CacheOptions, CatalogStore, CategoryIndex,
        Classification, Error, FeatureRow, GateDecisionEngine, ImageClassifier, ImageEncoder,
        IndexCache, InventoryStore, InventoryUpsert, JsonCatalog, PipelineConfig,
        PipelineServices, PredictionPipeline, PredictionResponse, PriceRegressor, ProductInfo,
        ReferenceLibrary, RemoteModels, RestApi, Result, SimilarItem, SimilarityRanker,
        SnapshotStore, Vector,
    };
}
