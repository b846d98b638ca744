use parking_lot::{Mutex, RwLock};
use rayon::prelude::*;
use solescope_core::{
    AugmentStrength, AugmentationSampler, CategoryIndex, Error, ImageEncoder, Result, Vector,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::library::{ReferenceImage, ReferenceLibrary};
use crate::snapshot::SnapshotStore;

/// One in-flight load or build. Whoever ends up initializing the cell does
/// the kind of work its creator asked for.
struct BuildSlot {
    forced: bool,
    cell: OnceLock<Result<Arc<CategoryIndex>>>,
}

impl BuildSlot {
    fn new(forced: bool) -> Arc<Self> {
        Arc::new(Self {
            forced,
            cell: OnceLock::new(),
        })
    }
}

/// Build-time settings for [`IndexCache`].
#[derive(Debug, Clone)]
pub struct CacheOptions {
    /// Upper bound on embeddings per reference image in an augmented build,
    /// original included.
    pub augment_per_image: usize,
    pub build_strength: AugmentStrength,
}

impl Default for CacheOptions {
    fn default() -> Self {
        Self {
            augment_per_image: 5,
            build_strength: AugmentStrength::Medium,
        }
    }
}

/// Process-wide cache of category indices backed by on-disk snapshots.
///
/// Lookup order is memory, then snapshot, then a build from the reference
/// library. At most one load or build runs per category at a time: callers
/// that miss while another caller is already working on the same category
/// block until it finishes and receive the same result, error included.
/// Failed builds are not remembered, so a later call retries.
pub struct IndexCache {
    indices: RwLock<HashMap<String, Arc<CategoryIndex>>>,
    in_flight: Mutex<HashMap<String, Arc<BuildSlot>>>,
    snapshots: SnapshotStore,
    library: ReferenceLibrary,
    encoder: Arc<dyn ImageEncoder>,
    sampler: AugmentationSampler,
    options: CacheOptions,
    builds: AtomicU64,
}

impl IndexCache {
    pub fn new(
        snapshots: SnapshotStore,
        library: ReferenceLibrary,
        encoder: Arc<dyn ImageEncoder>,
        options: CacheOptions,
    ) -> Self {
        Self {
            indices: RwLock::new(HashMap::new()),
            in_flight: Mutex::new(HashMap::new()),
            snapshots,
            library,
            encoder,
            sampler: AugmentationSampler::new(),
            options,
            builds: AtomicU64::new(0),
        }
    }

    pub fn library(&self) -> &ReferenceLibrary {
        &self.library
    }

    pub fn options(&self) -> &CacheOptions {
        &self.options
    }

    /// Number of builds from reference images since construction. Snapshot
    /// loads and memory hits are not counted.
    pub fn build_count(&self) -> u64 {
        self.builds.load(Ordering::Acquire)
    }

    pub fn get(&self, category: &str) -> Result<Arc<CategoryIndex>> {
        self.get_with(category, false, false)
    }

    /// Fetch the index for `category`.
    ///
    /// With `force_rebuild` the memory entry and snapshot are ignored and the
    /// index is rebuilt. A forced rebuild never joins work that was already
    /// in flight when it was requested: it waits for that work to finish and
    /// then builds on its own. Plain lookups arriving during a rebuild share
    /// its result. `augment` only affects builds; an index already cached is
    /// returned as is.
    pub fn get_with(
        &self,
        category: &str,
        force_rebuild: bool,
        augment: bool,
    ) -> Result<Arc<CategoryIndex>> {
        validate_label(category)?;

        if force_rebuild {
            let slot = self.claim_rebuild(category, augment);
            return self.run(category, &slot, augment);
        }

        if let Some(index) = self.cached(category) {
            return Ok(index);
        }

        let slot = {
            let mut in_flight = self.in_flight.lock();
            in_flight
                .entry(category.to_string())
                .or_insert_with(|| BuildSlot::new(false))
                .clone()
        };
        self.run(category, &slot, augment)
    }

    /// Install a fresh rebuild slot once nothing else is in flight for
    /// `category`.
    fn claim_rebuild(&self, category: &str, augment: bool) -> Arc<BuildSlot> {
        loop {
            let pending = {
                let mut in_flight = self.in_flight.lock();
                match in_flight.get(category) {
                    Some(slot) => Arc::clone(slot),
                    None => {
                        let slot = BuildSlot::new(true);
                        in_flight.insert(category.to_string(), Arc::clone(&slot));
                        return slot;
                    }
                }
            };
            debug!(category, "Rebuild waiting for in-flight work");
            let _ = self.run(category, &pending, augment);
        }
    }

    fn run(
        &self,
        category: &str,
        slot: &Arc<BuildSlot>,
        augment: bool,
    ) -> Result<Arc<CategoryIndex>> {
        let result = slot
            .cell
            .get_or_init(|| self.load_or_build(category, slot.forced, augment))
            .clone();

        let mut in_flight = self.in_flight.lock();
        if in_flight
            .get(category)
            .is_some_and(|current| Arc::ptr_eq(current, slot))
        {
            in_flight.remove(category);
        }
        result
    }

    pub fn cached(&self, category: &str) -> Option<Arc<CategoryIndex>> {
        self.indices.read().get(category).cloned()
    }

    /// Categories currently held in memory, sorted.
    pub fn categories(&self) -> Vec<String> {
        let mut names: Vec<String> = self.indices.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Drop the in-memory entry and the snapshot for `category`.
    pub fn invalidate(&self, category: &str) -> Result<()> {
        validate_label(category)?;
        self.indices.write().remove(category);
        self.snapshots.remove(category)?;
        Ok(())
    }

    fn load_or_build(
        &self,
        category: &str,
        force_rebuild: bool,
        augment: bool,
    ) -> Result<Arc<CategoryIndex>> {
        if !force_rebuild {
            // a caller that finished just before this cell was created may
            // already have populated memory
            if let Some(index) = self.cached(category) {
                return Ok(index);
            }
            if let Some(index) = self.snapshots.load(category)? {
                info!(category, entries = index.len(), "Loaded index snapshot");
                return Ok(self.publish(index));
            }
        }

        let index = self.build(category, augment)?;
        if let Err(e) = self.snapshots.save(&index) {
            warn!(category, error = %e, "Failed to persist index snapshot");
        }
        Ok(self.publish(index))
    }

    fn publish(&self, index: CategoryIndex) -> Arc<CategoryIndex> {
        let index = Arc::new(index);
        self.indices
            .write()
            .insert(index.category().to_string(), Arc::clone(&index));
        index
    }

    fn build(&self, category: &str, augment: bool) -> Result<CategoryIndex> {
        self.builds.fetch_add(1, Ordering::AcqRel);
        let started = Instant::now();

        let images = self.library.images(category)?;
        if images.is_empty() {
            warn!(category, "No reference images found");
            return Err(Error::EmptyCategory(category.to_string()));
        }

        let embedded: Vec<(String, Vec<Vector>)> = images
            .par_iter()
            .map(|reference| (reference.source_ref.clone(), self.embed_reference(reference, augment)))
            .collect();

        let mut builder = CategoryIndex::builder(category);
        for (source_ref, vectors) in embedded {
            for vector in vectors {
                if let Err(e) = builder.push(source_ref.as_str(), vector) {
                    warn!(category, source_ref = %source_ref, error = %e, "Skipping embedding");
                }
            }
        }
        let index = builder.finish(augment)?;

        info!(
            category,
            images = images.len(),
            entries = index.len(),
            augmented = augment,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Built category index"
        );
        Ok(index)
    }

    /// Embeddings for one reference image. Unreadable images and failed
    /// embeddings are logged and yield nothing.
    fn embed_reference(&self, reference: &ReferenceImage, augment: bool) -> Vec<Vector> {
        let decoded = match image::open(&reference.path) {
            Ok(decoded) => decoded,
            Err(e) => {
                warn!(source_ref = %reference.source_ref, error = %e, "Skipping unreadable reference image");
                return Vec::new();
            }
        };

        let variants = if augment {
            self.sampler
                .augment(&decoded, self.options.build_strength)
                .into_iter()
                .take(self.options.augment_per_image.max(1))
                .collect()
        } else {
            vec![decoded]
        };

        variants
            .iter()
            .filter_map(|variant| match self.encoder.embed(variant) {
                Ok(v) => Some(v),
                Err(e) => {
                    debug!(source_ref = %reference.source_ref, error = %e, "Embedding failed");
                    None
                }
            })
            .collect()
    }
}

/// A category label names a single directory and a single snapshot file.
pub fn validate_label(category: &str) -> Result<()> {
    let bad = category.is_empty()
        || category == "."
        || category == ".."
        || category.contains(&['/', '\\', '\0'][..]);
    if bad {
        return Err(Error::InvalidCategory(category.to_string()));
    }
    Ok(())
}
