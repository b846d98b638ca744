//! # SoleScope Storage
//!
//! Everything that touches disk: the reference image tree, per-category
//! index snapshots, the index cache built on both, the product catalog and
//! the LMDB inventory.

pub mod cache;
pub mod catalog;
pub mod inventory;
pub mod library;
pub mod snapshot;

pub use cache::{validate_label, CacheOptions, IndexCache};
pub use catalog::{CatalogRow, JsonCatalog};
pub use inventory::{
    Blob, InventoryRecord, InventorySnapshot, InventoryStore, InventoryUpsert, UpsertOutcome,
    UpsertStatus,
};
pub use library::{ReferenceImage, ReferenceLibrary, REFERENCE_EXTENSIONS};
pub use snapshot::SnapshotStore;
