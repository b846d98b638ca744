//! # SoleScope Pipeline
//!
//! The request-time half of SoleScope: decide whether an upload is a
//! sneaker, classify it, find similar reference images, estimate a price
//! and check stock.
//!
//! [`PredictionPipeline`] is built from explicitly constructed
//! collaborators ([`PipelineServices`]); [`RemoteModels`] implements the
//! model contracts over HTTP.

pub mod config;
pub mod features;
pub mod gate;
pub mod pipeline;
pub mod remote;
pub mod stage;

pub use config::PipelineConfig;
pub use features::{release_age, FeatureResolver};
pub use gate::{GateConfidence, GateDecisionEngine, GateResult, NEGATIVE_PROMPTS, POSITIVE_PROMPTS};
pub use pipeline::{
    ClassificationSummary, CompletedPrediction, Decision, DecisionAction, DecisionStatus,
    PipelineServices, PredictionPipeline, PredictionResponse, PriceEstimate, ProductSummary,
};
pub use remote::RemoteModels;
pub use stage::{SoftFailure, Stage};
