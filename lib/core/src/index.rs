use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

use crate::vector::{dot_product, UNIT_NORM_TOLERANCE};
use crate::{Error, Result, Vector};

/// Flat inner-product index over the reference embeddings of one category.
///
/// Vectors are stored row-major in a single buffer and are unit length, so
/// the inner product equals cosine similarity. `source_refs[i]` identifies
/// the image that produced row `i`; with augmentation several rows share
/// one ref.
///
/// An index is only ever produced by [`CategoryIndexBuilder::finish`] or by
/// deserializing a snapshot followed by [`CategoryIndex::validate`]; it has
/// no mutating methods.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CategoryIndex {
    category: String,
    dim: usize,
    vectors: Vec<f32>,
    source_refs: Vec<String>,
    augmented: bool,
    built_at: DateTime<Utc>,
}

impl CategoryIndex {
    pub fn builder(category: impl Into<String>) -> CategoryIndexBuilder {
        CategoryIndexBuilder {
            category: category.into(),
            dim: None,
            vectors: Vec::new(),
            source_refs: Vec::new(),
        }
    }

    pub fn category(&self) -> &str {
        &self.category
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn len(&self) -> usize {
        self.source_refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_refs.is_empty()
    }

    /// Number of distinct source images.
    pub fn unique_sources(&self) -> usize {
        let mut refs: Vec<&str> = self.source_refs.iter().map(String::as_str).collect();
        refs.sort_unstable();
        refs.dedup();
        refs.len()
    }

    /// Whether several rows may share a source ref.
    pub fn is_augmented(&self) -> bool {
        self.augmented
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn source_refs(&self) -> &[String] {
        &self.source_refs
    }

    pub fn vector(&self, i: usize) -> Option<&[f32]> {
        if i >= self.len() {
            return None;
        }
        Some(&self.vectors[i * self.dim..(i + 1) * self.dim])
    }

    pub fn vectors(&self) -> impl Iterator<Item = &[f32]> {
        self.vectors.chunks_exact(self.dim.max(1))
    }

    /// Exhaustive inner-product search returning up to `k` `(source_ref,
    /// score)` pairs, best first. Equal scores keep insertion order.
    pub fn search(&self, query: &Vector, k: usize) -> Result<Vec<(String, f32)>> {
        if query.dim() != self.dim {
            return Err(Error::InvalidDimension {
                expected: self.dim,
                actual: query.dim(),
            });
        }
        if k == 0 || self.is_empty() {
            return Ok(Vec::new());
        }

        let q = query.as_slice();
        let mut scored: Vec<(usize, f32)> = self
            .vectors()
            .enumerate()
            .map(|(i, row)| (i, dot_product(row, q)))
            .collect();

        scored.sort_by(|a, b| descending(a.1, b.1));
        scored.truncate(k);

        Ok(scored
            .into_iter()
            .map(|(i, score)| (self.source_refs[i].clone(), score))
            .collect())
    }

    /// Check the structural invariants: one ref per row, at least one row,
    /// every row unit length. Used on snapshots read back from disk.
    pub fn validate(&self) -> Result<()> {
        if self.dim == 0 {
            return Err(Error::InvalidVector("index has zero dimension".to_string()));
        }
        if self.vectors.len() != self.dim * self.source_refs.len() {
            return Err(Error::InvalidVector(format!(
                "{} floats do not match {} refs of dimension {}",
                self.vectors.len(),
                self.source_refs.len(),
                self.dim
            )));
        }
        if self.is_empty() {
            return Err(Error::EmptyCategory(self.category.clone()));
        }
        for (i, row) in self.vectors().enumerate() {
            let n = dot_product(row, row).sqrt();
            if !n.is_finite() || (n - 1.0).abs() > UNIT_NORM_TOLERANCE {
                return Err(Error::InvalidVector(format!("row {} has norm {}", i, n)));
            }
        }
        Ok(())
    }
}

/// Append-only accumulator for a single index build.
pub struct CategoryIndexBuilder {
    category: String,
    dim: Option<usize>,
    vectors: Vec<f32>,
    source_refs: Vec<String>,
}

impl CategoryIndexBuilder {
    /// Normalize `vector` and append it. The first vector fixes the
    /// dimension of the index.
    pub fn push(&mut self, source_ref: impl Into<String>, vector: Vector) -> Result<()> {
        let expected = *self.dim.get_or_insert(vector.dim());
        if vector.dim() != expected {
            return Err(Error::InvalidDimension {
                expected,
                actual: vector.dim(),
            });
        }
        let unit = vector.normalized()?;
        self.vectors.extend_from_slice(unit.as_slice());
        self.source_refs.push(source_ref.into());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.source_refs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.source_refs.is_empty()
    }

    /// Seal the index. Fails with [`Error::EmptyCategory`] when nothing was
    /// pushed.
    pub fn finish(self, augmented: bool) -> Result<CategoryIndex> {
        let dim = match self.dim {
            Some(dim) if !self.source_refs.is_empty() => dim,
            _ => return Err(Error::EmptyCategory(self.category)),
        };
        Ok(CategoryIndex {
            category: self.category,
            dim,
            vectors: self.vectors,
            source_refs: self.source_refs,
            augmented,
            built_at: Utc::now(),
        })
    }
}

/// Best score first, NaN last.
fn descending(a: f32, b: f32) -> Ordering {
    let key = |x: f32| if x.is_nan() { f32::NEG_INFINITY } else { x };
    key(b).total_cmp(&key(a))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(rows: &[(&str, Vec<f32>)]) -> CategoryIndex {
        let mut builder = CategoryIndex::builder("nike_dunk");
        for (r, v) in rows {
            builder.push(*r, Vector::new(v.clone())).unwrap();
        }
        builder.finish(false).unwrap()
    }

    #[test]
    fn test_rows_are_normalized_and_parallel() {
        let index = build(&[("a.jpg", vec![3.0, 4.0]), ("b.jpg", vec![0.0, 2.0])]);
        assert_eq!(index.len(), 2);
        assert_eq!(index.source_refs().len(), index.vectors().count());
        for row in index.vectors() {
            assert!((dot_product(row, row).sqrt() - 1.0).abs() < 1e-5);
        }
        index.validate().unwrap();
    }

    #[test]
    fn test_search_orders_by_inner_product() {
        let index = build(&[
            ("a.jpg", vec![1.0, 0.0]),
            ("b.jpg", vec![0.0, 1.0]),
            ("c.jpg", vec![1.0, 1.0]),
        ]);
        let hits = index.search(&Vector::new(vec![1.0, 0.0]), 2).unwrap();
        assert_eq!(hits[0].0, "a.jpg");
        assert!((hits[0].1 - 1.0).abs() < 1e-6);
        assert_eq!(hits[1].0, "c.jpg");
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_search_k_larger_than_index() {
        let index = build(&[("a.jpg", vec![1.0, 0.0])]);
        let hits = index.search(&Vector::new(vec![0.5, 0.5]), 50).unwrap();
        assert_eq!(hits.len(), 1);
    }

    #[test]
    fn test_search_dimension_mismatch() {
        let index = build(&[("a.jpg", vec![1.0, 0.0])]);
        let err = index.search(&Vector::new(vec![1.0, 0.0, 0.0]), 1).unwrap_err();
        assert_eq!(err, Error::InvalidDimension { expected: 2, actual: 3 });
    }

    #[test]
    fn test_validate_rejects_nan_rows() {
        let mut index = build(&[("a.jpg", vec![1.0, 0.0]), ("b.jpg", vec![0.0, 1.0])]);
        index.validate().unwrap();
        index.vectors[2] = f32::NAN;
        index.vectors[3] = f32::NAN;
        assert!(matches!(index.validate(), Err(Error::InvalidVector(_))));
    }

    #[test]
    fn test_search_with_nan_query_does_not_panic() {
        let index = build(&[("a.jpg", vec![1.0, 0.0]), ("b.jpg", vec![0.0, 1.0])]);
        let hits = index.search(&Vector::new(vec![f32::NAN, 1.0]), 2).unwrap();
        assert_eq!(hits.len(), 2);
    }

    #[test]
    fn test_empty_builder_fails() {
        let err = CategoryIndex::builder("empty").finish(false).unwrap_err();
        assert_eq!(err, Error::EmptyCategory("empty".to_string()));
    }

    #[test]
    fn test_builder_rejects_mixed_dimensions() {
        let mut builder = CategoryIndex::builder("x");
        builder.push("a", Vector::new(vec![1.0, 0.0])).unwrap();
        assert!(builder.push("b", Vector::new(vec![1.0, 0.0, 0.0])).is_err());
        assert_eq!(builder.len(), 1);
    }

    #[test]
    fn test_unique_sources_with_shared_refs() {
        let mut builder = CategoryIndex::builder("x");
        builder.push("a", Vector::new(vec![1.0, 0.0])).unwrap();
        builder.push("a", Vector::new(vec![0.9, 0.1])).unwrap();
        builder.push("b", Vector::new(vec![0.0, 1.0])).unwrap();
        let index = builder.finish(true).unwrap();
        assert_eq!(index.len(), 3);
        assert_eq!(index.unique_sources(), 2);
        assert!(index.is_augmented());
    }
}
