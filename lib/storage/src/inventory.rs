// LMDB-backed inventory records and image blobs
use chrono::{DateTime, Utc};
use heed::types::{Bytes, Str};
use heed::{Database, DatabaseFlags, Env, EnvOpenOptions};
use serde::{Deserialize, Serialize};
use solescope_core::{Error, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

const DB_INVENTORY: &str = "inventory";
const DB_BLOBS: &str = "blobs";
const DB_BY_CATEGORY: &str = "by_category";

/// One stocked product, keyed by slug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryRecord {
    pub slug: String,
    pub category_label: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub product_name: Option<String>,
    pub product_type: Option<String>,
    pub quantity: u64,
    pub price_predicted: Option<f64>,
    pub price_modified: Option<f64>,
    pub image_blob_ref: Option<String>,
    pub date_added: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Image bytes attached to an upsert.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Blob {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Request to add stock for a slug. `None` fields leave the stored value
/// untouched on update.
#[derive(Debug, Clone, Default)]
pub struct InventoryUpsert {
    pub slug: String,
    pub category_label: Option<String>,
    pub brand: Option<String>,
    pub model: Option<String>,
    pub product_name: Option<String>,
    pub product_type: Option<String>,
    /// Added to the stored quantity.
    pub quantity: u64,
    pub price_predicted: Option<f64>,
    pub price_modified: Option<f64>,
    /// Replace the stored quantity with `quantity` instead of adding to it.
    pub reset_quantity: bool,
    pub image: Option<Blob>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpsertStatus {
    Inserted,
    Updated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpsertOutcome {
    pub status: UpsertStatus,
    pub quantity: u64,
    /// Reference of the blob attached by this call, if any.
    pub blob_ref: Option<String>,
}

/// Result of an inventory lookup. Absence is a normal answer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventorySnapshot {
    pub exists: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub record: Option<InventoryRecord>,
}

impl InventorySnapshot {
    pub fn missing() -> Self {
        Self {
            exists: false,
            record: None,
        }
    }

    fn found(record: InventoryRecord) -> Self {
        Self {
            exists: true,
            record: Some(record),
        }
    }
}

pub struct InventoryStore {
    env: Arc<Env>,
    records_db: Database<Str, Bytes>,
    blobs_db: Database<Str, Bytes>,
    /// category label -> slugs, duplicates sorted, so the first value is the
    /// smallest slug
    category_db: Database<Str, Str>,
}

fn storage_err(e: heed::Error) -> Error {
    Error::Storage(e.to_string())
}

impl InventoryStore {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        std::fs::create_dir_all(&path)?;

        let env = Arc::new(unsafe {
            EnvOpenOptions::new()
                .map_size(4 * 1024 * 1024 * 1024) // 4GB
                .max_dbs(4)
                .open(path.as_ref())
                .map_err(storage_err)?
        });

        let mut wtxn = env.write_txn().map_err(storage_err)?;
        let records_db = env
            .create_database::<Str, Bytes>(&mut wtxn, Some(DB_INVENTORY))
            .map_err(storage_err)?;
        let blobs_db = env
            .create_database::<Str, Bytes>(&mut wtxn, Some(DB_BLOBS))
            .map_err(storage_err)?;
        let category_db = env
            .database_options()
            .types::<Str, Str>()
            .name(DB_BY_CATEGORY)
            .flags(DatabaseFlags::DUP_SORT)
            .create(&mut wtxn)
            .map_err(storage_err)?;

        // environments written before the category index existed
        if category_db.is_empty(&wtxn).map_err(storage_err)? {
            let mut pairs = Vec::new();
            for entry in records_db.iter(&wtxn).map_err(storage_err)? {
                let (slug, bytes) = entry.map_err(storage_err)?;
                let record: InventoryRecord = serde_json::from_slice(bytes)?;
                if let Some(category) = record.category_label {
                    pairs.push((category, slug.to_string()));
                }
            }
            for (category, slug) in &pairs {
                category_db
                    .put(&mut wtxn, category, slug)
                    .map_err(storage_err)?;
            }
        }
        wtxn.commit().map_err(storage_err)?;

        Ok(Self {
            env,
            records_db,
            blobs_db,
            category_db,
        })
    }

    /// Insert or merge a record.
    ///
    /// The read-modify-write happens inside one LMDB write transaction, and
    /// LMDB admits a single writer at a time, so concurrent upserts to the
    /// same slug never lose an increment.
    pub fn upsert(&self, request: InventoryUpsert) -> Result<UpsertOutcome> {
        let slug = request.slug.trim().to_string();
        if slug.is_empty() {
            return Err(Error::Validation("slug is required".to_string()));
        }

        let now = Utc::now();
        let mut wtxn = self.env.write_txn().map_err(storage_err)?;

        let blob_ref = match &request.image {
            Some(blob) => {
                let blob_ref = Uuid::new_v4().to_string();
                let bytes = bincode::serialize(blob)
                    .map_err(|e| Error::Serialization(e.to_string()))?;
                self.blobs_db
                    .put(&mut wtxn, &blob_ref, &bytes)
                    .map_err(storage_err)?;
                Some(blob_ref)
            }
            None => None,
        };

        let existing = match self.records_db.get(&wtxn, &slug).map_err(storage_err)? {
            Some(bytes) => Some(serde_json::from_slice::<InventoryRecord>(bytes)?),
            None => None,
        };

        let previous_category = existing.as_ref().and_then(|r| r.category_label.clone());
        let (status, record) = match existing {
            Some(prev) => {
                let quantity = if request.reset_quantity {
                    request.quantity
                } else {
                    prev.quantity.saturating_add(request.quantity)
                };
                let record = InventoryRecord {
                    slug: slug.clone(),
                    category_label: request.category_label.or(prev.category_label),
                    brand: request.brand.or(prev.brand),
                    model: request.model.or(prev.model),
                    product_name: request.product_name.or(prev.product_name),
                    product_type: request.product_type.or(prev.product_type),
                    quantity,
                    price_predicted: request.price_predicted.or(prev.price_predicted),
                    price_modified: request.price_modified.or(prev.price_modified),
                    image_blob_ref: blob_ref.clone().or(prev.image_blob_ref),
                    date_added: prev.date_added,
                    updated_at: now,
                };
                (UpsertStatus::Updated, record)
            }
            None => {
                let record = InventoryRecord {
                    slug: slug.clone(),
                    product_name: request.product_name.or_else(|| request.model.clone()),
                    product_type: request
                        .product_type
                        .or_else(|| request.category_label.clone()),
                    category_label: request.category_label,
                    brand: request.brand,
                    model: request.model,
                    quantity: request.quantity,
                    price_predicted: request.price_predicted,
                    price_modified: request.price_modified,
                    image_blob_ref: blob_ref.clone(),
                    date_added: now,
                    updated_at: now,
                };
                (UpsertStatus::Inserted, record)
            }
        };

        if let Some(old) = &previous_category {
            if record.category_label.as_ref() != Some(old) {
                self.category_db
                    .delete_one_duplicate(&mut wtxn, old, &slug)
                    .map_err(storage_err)?;
            }
        }
        if let Some(category) = &record.category_label {
            self.category_db
                .put(&mut wtxn, category, &slug)
                .map_err(storage_err)?;
        }

        let bytes = serde_json::to_vec(&record)?;
        self.records_db
            .put(&mut wtxn, &slug, &bytes)
            .map_err(storage_err)?;
        wtxn.commit().map_err(storage_err)?;

        debug!(slug = %slug, ?status, quantity = record.quantity, "Inventory upsert");
        Ok(UpsertOutcome {
            status,
            quantity: record.quantity,
            blob_ref,
        })
    }

    pub fn get(&self, slug: &str) -> Result<Option<InventoryRecord>> {
        let rtxn = self.env.read_txn().map_err(storage_err)?;
        match self.records_db.get(&rtxn, slug).map_err(storage_err)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(bytes)?)),
            None => Ok(None),
        }
    }

    /// Look up by slug when given, else the first record (in slug order)
    /// carrying `category`. With neither, nothing matches.
    pub fn find(&self, category: Option<&str>, slug: Option<&str>) -> Result<InventorySnapshot> {
        if let Some(slug) = slug {
            let found = self
                .get(slug)?
                .filter(|r| category.map_or(true, |c| r.category_label.as_deref() == Some(c)));
            return Ok(found.map_or_else(InventorySnapshot::missing, InventorySnapshot::found));
        }
        let Some(category) = category else {
            return Ok(InventorySnapshot::missing());
        };

        let rtxn = self.env.read_txn().map_err(storage_err)?;
        let first = self
            .category_db
            .get(&rtxn, category)
            .map_err(storage_err)?;
        let Some(slug) = first else {
            return Ok(InventorySnapshot::missing());
        };
        match self.records_db.get(&rtxn, slug).map_err(storage_err)? {
            Some(bytes) => Ok(InventorySnapshot::found(serde_json::from_slice(bytes)?)),
            None => Ok(InventorySnapshot::missing()),
        }
    }

    /// All records in slug order.
    pub fn list(&self) -> Result<Vec<InventoryRecord>> {
        let rtxn = self.env.read_txn().map_err(storage_err)?;
        let mut records = Vec::new();
        for entry in self.records_db.iter(&rtxn).map_err(storage_err)? {
            let (_, bytes) = entry.map_err(storage_err)?;
            records.push(serde_json::from_slice(bytes)?);
        }
        Ok(records)
    }

    pub fn blob(&self, blob_ref: &str) -> Result<Blob> {
        let rtxn = self.env.read_txn().map_err(storage_err)?;
        let bytes = self
            .blobs_db
            .get(&rtxn, blob_ref)
            .map_err(storage_err)?
            .ok_or_else(|| Error::NotFound(format!("blob {}", blob_ref)))?;
        bincode::deserialize(bytes).map_err(|e| Error::Serialization(e.to_string()))
    }

    pub fn blob_count(&self) -> Result<u64> {
        let rtxn = self.env.read_txn().map_err(storage_err)?;
        self.blobs_db.len(&rtxn).map_err(storage_err)
    }
}
