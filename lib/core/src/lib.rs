//! # SoleScope Core
//!
//! Core library for the SoleScope sneaker recognition service.
//!
//! This crate provides the fundamental data structures and contracts:
//!
//! - [`Vector`] - Dense embedding vector with dot/norm kernels
//! - [`CategoryIndex`] - Immutable flat inner-product index for one category
//! - [`AugmentationSampler`] - Tiered image perturbations
//! - [`ImageEncoder`], [`ImageClassifier`], [`PriceRegressor`], [`CatalogStore`] -
//!   collaborator contracts
//!
//! ## Example
//!
//! ```rust
//! use solescope_core::{CategoryIndex, Vector};
//!
//! let mut builder = CategoryIndex::builder("adidas_samba");
//! builder.push("adidas_samba/og-white/1.jpg", Vector::new(vec![1.0, 0.0, 0.0])).unwrap();
//! builder.push("adidas_samba/og-black/1.jpg", Vector::new(vec![0.0, 2.0, 0.0])).unwrap();
//! let index = builder.finish(false).unwrap();
//!
//! let hits = index.search(&Vector::new(vec![1.0, 0.1, 0.0]), 1).unwrap();
//! assert_eq!(hits[0].0, "adidas_samba/og-white/1.jpg");
//! ```

pub mod augment;
pub mod error;
pub mod index;
pub mod models;
pub mod vector;

pub use augment::{AugmentStrength, AugmentationSampler};
pub use error::{Error, Result};
pub use index::{CategoryIndex, CategoryIndexBuilder};
pub use models::{
    split_brand_model, CatalogInstance, CatalogStore, Classification, FeatureRow, ImageClassifier,
    ImageEncoder, PriceRegressor, ProductInfo,
};
pub use vector::Vector;
