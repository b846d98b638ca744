use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Tolerance used when checking that a stored vector has unit length.
pub const UNIT_NORM_TOLERANCE: f32 = 1e-5;

/// Dot product with two accumulators for better pipelining.
/// Slices of different lengths yield 0.0.
#[inline]
pub fn dot_product(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() {
        return 0.0;
    }

    let mut dot0 = 0.0f32;
    let mut dot1 = 0.0f32;

    let chunks = a.chunks_exact(8);
    let remainder = chunks.remainder().len();
    for (x, y) in chunks.zip(b.chunks_exact(8)) {
        dot0 += x[0] * y[0] + x[1] * y[1] + x[2] * y[2] + x[3] * y[3];
        dot1 += x[4] * y[4] + x[5] * y[5] + x[6] * y[6] + x[7] * y[7];
    }

    for i in (a.len() - remainder)..a.len() {
        dot0 += a[i] * b[i];
    }

    dot0 + dot1
}

#[inline]
pub fn norm(v: &[f32]) -> f32 {
    dot_product(v, v).sqrt()
}

/// A dense embedding vector
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Vector {
    data: Vec<f32>,
}

impl Vector {
    #[inline]
    #[must_use]
    pub fn new(data: Vec<f32>) -> Self {
        Self { data }
    }

    #[inline]
    #[must_use]
    pub fn from_slice(data: &[f32]) -> Self {
        Self {
            data: data.to_vec(),
        }
    }

    #[inline]
    #[must_use]
    pub fn dim(&self) -> usize {
        self.data.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    #[inline]
    pub fn into_inner(self) -> Vec<f32> {
        self.data
    }

    #[inline]
    pub fn norm(&self) -> f32 {
        norm(&self.data)
    }

    #[inline]
    pub fn dot(&self, other: &Vector) -> f32 {
        dot_product(&self.data, &other.data)
    }

    /// Whether the vector has L2 norm within [`UNIT_NORM_TOLERANCE`] of 1.
    pub fn is_unit(&self) -> bool {
        (self.norm() - 1.0).abs() <= UNIT_NORM_TOLERANCE
    }

    /// Scale to unit length. Zero, empty and non-finite vectors cannot be
    /// normalized and are rejected.
    pub fn normalize(&mut self) -> Result<()> {
        let n = self.norm();
        if !n.is_finite() || n <= f32::EPSILON {
            return Err(Error::InvalidVector(format!(
                "cannot normalize vector with norm {}",
                n
            )));
        }
        let inv = 1.0 / n;
        for x in &mut self.data {
            *x *= inv;
        }
        Ok(())
    }

    pub fn normalized(&self) -> Result<Self> {
        let mut v = self.clone();
        v.normalize()?;
        Ok(v)
    }

    /// Component-wise mean. The result is not rescaled to unit length.
    pub fn mean(vectors: &[Vector]) -> Result<Vector> {
        let first = vectors
            .first()
            .ok_or_else(|| Error::InvalidVector("mean of zero vectors".to_string()))?;
        let dim = first.dim();
        let mut acc = vec![0.0f32; dim];
        for v in vectors {
            if v.dim() != dim {
                return Err(Error::InvalidDimension {
                    expected: dim,
                    actual: v.dim(),
                });
            }
            for (a, x) in acc.iter_mut().zip(v.as_slice()) {
                *a += x;
            }
        }
        let count = vectors.len() as f32;
        for a in &mut acc {
            *a /= count;
        }
        Ok(Vector::new(acc))
    }
}

impl From<Vec<f32>> for Vector {
    fn from(data: Vec<f32>) -> Self {
        Vector::new(data)
    }
}
