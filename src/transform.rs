//! Asymmetric embedding that turns inner product ranking into a tree-friendly
//! similarity ranking.
//!
//! Dataset rows are rescaled so the largest norm is 1 and get `m` extra
//! coordinates derived from their rescaled norm. Queries keep their scale and
//! get `m` zeros, so the extra coordinates never contribute to a query score
//! but still pull dataset vectors of different norms apart during clustering.

use serde::{Deserialize, Serialize};

use crate::math::{l2_norm_sqr, scale};
use crate::matrix::FloatMatrix;
use crate::HkmError;

/// How the appended dataset coordinates are derived from the rescaled norm `r`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Augmentation {
    /// Every extra coordinate is `0.5 - r^2`.
    #[default]
    Repeated,
    /// Extra coordinate `j` is `0.5 - r^(2^(j+1))`.
    PowerSeries,
}

impl Augmentation {
    fn fill(self, extras: &mut [f32], norm: f32) {
        match self {
            Augmentation::Repeated => extras.fill(0.5 - norm * norm),
            Augmentation::PowerSeries => {
                let mut power = norm;
                for value in extras.iter_mut() {
                    power *= power;
                    *value = 0.5 - power;
                }
            }
        }
    }
}

/// The dataset/query embedding pair for a fixed number of extra coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MipsTransform {
    extra_dims: usize,
    augmentation: Augmentation,
}

impl MipsTransform {
    pub fn new(extra_dims: usize, augmentation: Augmentation) -> Self {
        Self {
            extra_dims,
            augmentation,
        }
    }

    pub fn extra_dims(&self) -> usize {
        self.extra_dims
    }

    pub fn augmentation(&self) -> Augmentation {
        self.augmentation
    }

    /// Length of an embedded vector for inputs of length `dim`.
    pub fn embedded_dim(&self, dim: usize) -> usize {
        dim + self.extra_dims
    }

    /// Embed the dataset side.
    ///
    /// With `m = 0` the rows are returned unchanged. A dataset whose largest
    /// norm is zero is left unscaled.
    pub fn embed_dataset(&self, vectors: &FloatMatrix) -> Result<FloatMatrix, HkmError> {
        if self.extra_dims == 0 {
            return Ok(vectors.clone());
        }
        if vectors.is_empty() {
            return Err(HkmError::EmptyMatrix);
        }

        let dim = vectors.dim();
        let mut embedded = FloatMatrix::zeros(vectors.rows(), self.embedded_dim(dim));
        let mut max_norm = 0.0f32;
        for (idx, vector) in vectors.iter_rows().enumerate() {
            embedded.row_mut(idx)[..dim].copy_from_slice(vector);
            max_norm = max_norm.max(l2_norm_sqr(vector).sqrt());
        }

        let inv = if max_norm > 0.0 { 1.0 / max_norm } else { 1.0 };
        for idx in 0..embedded.rows() {
            let row = embedded.row_mut(idx);
            let (coords, extras) = row.split_at_mut(dim);
            scale(coords, inv);
            let norm = l2_norm_sqr(coords).sqrt();
            self.augmentation.fill(extras, norm);
        }

        Ok(embedded)
    }

    /// Embed a batch of queries: coordinates copied, extras zero, no scaling.
    pub fn embed_queries(&self, queries: &FloatMatrix) -> FloatMatrix {
        if self.extra_dims == 0 {
            return queries.clone();
        }
        let mut embedded = FloatMatrix::zeros(queries.rows(), self.embedded_dim(queries.dim()));
        for (idx, query) in queries.iter_rows().enumerate() {
            embedded.row_mut(idx)[..query.len()].copy_from_slice(query);
        }
        embedded
    }

    /// Embed a single query.
    pub fn embed_query(&self, query: &[f32]) -> Vec<f32> {
        let mut embedded = Vec::with_capacity(self.embedded_dim(query.len()));
        embedded.extend_from_slice(query);
        embedded.resize(self.embedded_dim(query.len()), 0.0);
        embedded
    }
}

/// Embed dataset vectors with `m` repeated extra coordinates.
pub fn embed_dataset(vectors: &FloatMatrix, m: usize) -> Result<FloatMatrix, HkmError> {
    MipsTransform::new(m, Augmentation::Repeated).embed_dataset(vectors)
}

/// Embed query vectors with `m` zero coordinates.
pub fn embed_query(queries: &FloatMatrix, m: usize) -> FloatMatrix {
    MipsTransform::new(m, Augmentation::Repeated).embed_queries(queries)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> FloatMatrix {
        FloatMatrix::from_rows(&[vec![3.0, 4.0], vec![0.0, 1.0], vec![-1.5, 2.0]]).unwrap()
    }

    #[test]
    fn dataset_rows_are_rescaled_to_unit_max_norm() {
        let embedded = embed_dataset(&sample(), 2).unwrap();
        assert_eq!(embedded.dim(), 4);
        // Largest row had norm 5.
        assert!((embedded.row(0)[0] - 0.6).abs() < 1e-6);
        assert!((embedded.row(0)[1] - 0.8).abs() < 1e-6);
        // r = 1 for the largest row, so extras are 0.5 - 1.
        assert!((embedded.row(0)[2] + 0.5).abs() < 1e-6);
        assert_eq!(embedded.row(0)[2], embedded.row(0)[3]);
        // r = 0.2 for the second row.
        assert!((embedded.row(1)[2] - (0.5 - 0.04)).abs() < 1e-6);
    }

    #[test]
    fn power_series_squares_per_coordinate() {
        let transform = MipsTransform::new(3, Augmentation::PowerSeries);
        let embedded = transform.embed_dataset(&sample()).unwrap();
        let extras = &embedded.row(1)[2..];
        let r = 0.2f32;
        assert!((extras[0] - (0.5 - r.powi(2))).abs() < 1e-6);
        assert!((extras[1] - (0.5 - r.powi(4))).abs() < 1e-6);
        assert!((extras[2] - (0.5 - r.powi(8))).abs() < 1e-6);
    }

    #[test]
    fn queries_are_zero_padded_without_scaling() {
        let embedded = embed_query(&sample(), 2);
        assert_eq!(embedded.row(0), &[3.0f32, 4.0, 0.0, 0.0][..]);
        let single = MipsTransform::new(2, Augmentation::Repeated).embed_query(&[1.0, -1.0]);
        assert_eq!(single, vec![1.0, -1.0, 0.0, 0.0]);
    }

    #[test]
    fn empty_dataset_is_rejected() {
        assert_eq!(
            embed_dataset(&FloatMatrix::new(3), 1),
            Err(HkmError::EmptyMatrix)
        );
    }

    #[test]
    fn all_zero_dataset_is_left_unscaled() {
        let zeros = FloatMatrix::zeros(3, 2);
        let embedded = embed_dataset(&zeros, 1).unwrap();
        assert!(embedded.as_slice().iter().all(|v| v.is_finite()));
        assert_eq!(embedded.row(2), &[0.0f32, 0.0, 0.5][..]);
    }
}
