use serde::{Deserialize, Serialize};

use crate::transform::Augmentation;
use crate::HkmError;

/// K-means settings used for every layer of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansParams {
    /// Upper bound on Lloyd iterations per layer.
    pub max_iter: usize,
    /// Base seed; each layer derives its own seed from it.
    pub seed: u64,
}

impl Default for KMeansParams {
    fn default() -> Self {
        Self {
            max_iter: 25,
            seed: 0x5eed_c0ffee,
        }
    }
}

/// Build-time configuration of a [`ClusterIndex`](crate::ClusterIndex).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Number of coordinates appended by the MIPS embedding (`m`).
    pub extra_dims: usize,
    /// Number of clustering layers (`L`).
    pub layer_count: usize,
    /// How the appended coordinates are filled on the dataset side.
    pub augmentation: Augmentation,
    pub kmeans: KMeansParams,
}

impl IndexConfig {
    pub fn new(extra_dims: usize, layer_count: usize) -> Self {
        Self {
            extra_dims,
            layer_count,
            ..Self::default()
        }
    }

    pub fn with_augmentation(mut self, augmentation: Augmentation) -> Self {
        self.augmentation = augmentation;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.kmeans.seed = seed;
        self
    }

    pub fn with_max_iter(mut self, max_iter: usize) -> Self {
        self.kmeans.max_iter = max_iter;
        self
    }

    pub fn validate(&self) -> Result<(), HkmError> {
        if self.layer_count == 0 {
            return Err(HkmError::InvalidConfig("layer_count must be at least 1"));
        }
        if self.kmeans.max_iter == 0 {
            return Err(HkmError::InvalidConfig("kmeans.max_iter must be positive"));
        }
        Ok(())
    }
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            extra_dims: 1,
            layer_count: 2,
            augmentation: Augmentation::default(),
            kmeans: KMeansParams::default(),
        }
    }
}

/// Per-query search parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchParams {
    /// Number of results per query (`k`).
    pub top_k: usize,
    /// Centroids kept per layer while descending the tree.
    pub opened_trees: usize,
}

impl SearchParams {
    pub fn new(top_k: usize, opened_trees: usize) -> Self {
        Self {
            top_k,
            opened_trees,
        }
    }

    /// Keep every centroid at every layer; the traversal then reaches the whole dataset.
    pub fn exhaustive(top_k: usize) -> Self {
        Self {
            top_k,
            opened_trees: usize::MAX,
        }
    }

    pub fn validate(&self) -> Result<(), HkmError> {
        if self.opened_trees == 0 {
            return Err(HkmError::InvalidConfig("opened_trees must be at least 1"));
        }
        Ok(())
    }
}
