use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use solescope_core::{CatalogInstance, CatalogStore, Error, ProductInfo, Result};
use std::path::Path;
use tracing::info;

/// One row of the scraped product catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogRow {
    pub slug: String,
    pub class_name: String,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub silhouette: Option<String>,
    #[serde(default)]
    pub retail_price_usd: Option<f64>,
    #[serde(default)]
    pub lowest_price_usd: Option<f64>,
    #[serde(default)]
    pub release_date: Option<String>,
    #[serde(default)]
    pub product_url: Option<String>,
}

/// In-memory catalog read from a JSON array of [`CatalogRow`]s.
///
/// Row order is kept: the representative record of a category is its
/// first row in the file.
#[derive(Debug, Clone, Default)]
pub struct JsonCatalog {
    rows: Vec<CatalogRow>,
    by_slug: AHashMap<String, usize>,
}

impl JsonCatalog {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let data = std::fs::read(path).map_err(|e| {
            Error::InvalidConfig(format!("cannot read catalog {}: {}", path.display(), e))
        })?;
        let rows: Vec<CatalogRow> = serde_json::from_slice(&data).map_err(|e| {
            Error::InvalidConfig(format!("cannot parse catalog {}: {}", path.display(), e))
        })?;
        let catalog = Self::from_rows(rows);
        info!(rows = catalog.len(), path = %path.display(), "Catalog loaded");
        Ok(catalog)
    }

    /// Later rows with an already seen slug are ignored.
    pub fn from_rows(rows: Vec<CatalogRow>) -> Self {
        let mut by_slug = AHashMap::with_capacity(rows.len());
        for (i, row) in rows.iter().enumerate() {
            by_slug.entry(row.slug.clone()).or_insert(i);
        }
        Self { rows, by_slug }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

impl CatalogStore for JsonCatalog {
    fn instance(&self, slug: &str) -> Result<CatalogInstance> {
        let row = self
            .by_slug
            .get(slug)
            .map(|&i| &self.rows[i])
            .ok_or_else(|| Error::NotFound(format!("catalog slug {}", slug)))?;
        Ok(CatalogInstance {
            slug: row.slug.clone(),
            category_label: row.class_name.clone(),
            brand: row.brand.clone(),
            silhouette: row.silhouette.clone(),
            retail_price_usd: row.retail_price_usd,
            release_date: row.release_date.clone(),
        })
    }

    fn category_record(&self, category: &str) -> ProductInfo {
        self.rows
            .iter()
            .find(|r| r.class_name == category)
            .map(|r| ProductInfo {
                product_name: r.title.clone(),
                brand: r.brand.clone(),
                retail_price_usd: r.retail_price_usd,
                lowest_price_usd: r.lowest_price_usd,
                silhouette: r.silhouette.clone(),
                release_date: r.release_date.clone(),
                url: r.product_url.clone(),
            })
            .unwrap_or_default()
    }

    fn instance_keys(&self, category: &str) -> Vec<String> {
        self.rows
            .iter()
            .filter(|r| r.class_name == category)
            .map(|r| r.slug.clone())
            .collect()
    }
}
