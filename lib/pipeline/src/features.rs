use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use solescope_core::{CatalogStore, Error, FeatureRow, Result};
use std::sync::Arc;

const DAYS_PER_YEAR: f64 = 365.25;

/// Builds price-regressor inputs from the catalog.
pub struct FeatureResolver {
    catalog: Arc<dyn CatalogStore>,
}

impl FeatureResolver {
    pub fn new(catalog: Arc<dyn CatalogStore>) -> Self {
        Self { catalog }
    }

    /// The instance key used to price a category: the lexicographically
    /// smallest key the catalog holds for it, so repeated predictions for
    /// one category always price the same instance.
    pub fn representative_slug(&self, category: &str) -> Result<String> {
        self.catalog
            .instance_keys(category)
            .into_iter()
            .min()
            .ok_or_else(|| Error::NotFound(format!("no catalog instances for {}", category)))
    }

    pub fn resolve(&self, slug: &str, now: DateTime<Utc>) -> Result<FeatureRow> {
        let instance = self.catalog.instance(slug)?;
        let release_age_years = instance
            .release_date
            .as_deref()
            .and_then(|date| release_age(date, now));
        Ok(FeatureRow {
            category_label: instance.category_label,
            brand: instance.brand,
            silhouette: instance.silhouette,
            retail_price_usd: instance.retail_price_usd,
            release_age_years,
        })
    }
}

/// Years between `release_date` and `now`.
///
/// Accepts `M/D/YYYY` first, then ISO 8601 dates and date-times. Anything
/// else yields `None`. Whole days are counted, so the age moves in steps of
/// one day.
pub fn release_age(release_date: &str, now: DateTime<Utc>) -> Option<f64> {
    let released = parse_release_date(release_date.trim())?;
    let days = now.naive_utc().signed_duration_since(released).num_days();
    Some(days as f64 / DAYS_PER_YEAR)
}

fn parse_release_date(s: &str) -> Option<NaiveDateTime> {
    if s.is_empty() {
        return None;
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%m/%d/%Y") {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    DateTime::parse_from_rfc3339(s)
        .ok()
        .map(|dt| dt.naive_utc())
}
