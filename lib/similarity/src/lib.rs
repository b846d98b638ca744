//! # SoleScope Similarity
//!
//! Turns raw nearest-neighbour hits into the ranked list shown to clients.
//!
//! ## Example
//!
//! ```rust
//! use solescope_similarity::{SimilarityRanker, SimilarItem};
//!
//! let raw = vec![
//!     ("nike_dunk/panda/1.jpg".to_string(), 0.90),
//!     ("nike_dunk/panda/1.jpg".to_string(), 0.95),
//!     ("nike_dunk/grey-fog/2.jpg".to_string(), 0.80),
//! ];
//! let ranked = SimilarityRanker::new().rank(raw, 5);
//! assert_eq!(ranked.len(), 2);
//!
//! let items: Vec<SimilarItem> = ranked.into_iter().map(SimilarItem::from).collect();
//! assert_eq!(items[0].slug.as_deref(), Some("panda"));
//! ```

pub mod item;
pub mod rerank;

pub use item::SimilarItem;
pub use rerank::{rank, Hit, SimilarityRanker};
