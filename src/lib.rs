//! Hierarchical k-means tree for approximate maximum inner product search.
//!
//! Dataset vectors are embedded into an augmented space where inner product
//! ranking behaves like similarity ranking, clustered into a cascade of
//! k-means layers, and queried by a beam search that descends from the
//! coarsest layer to the dataset itself.

pub mod config;
pub mod index;
pub mod io;
pub mod matrix;
pub mod search;
pub mod transform;
pub mod tree;

mod kmeans;
mod math;

pub use config::{IndexConfig, KMeansParams, SearchParams};
pub use index::{ClusterIndex, IndexHandle, QueryResults, SearchResult, SENTINEL_LABEL};
pub use matrix::FloatMatrix;
pub use search::SearchStats;
pub use transform::Augmentation;
pub use tree::{layer_schedule, ClusterTree, Layer, LayerPlan};


/// Broad category of an [`HkmError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Vector lengths disagree, or a matrix has no rows where rows are required.
    Dimension,
    /// Parameters are out of range or the dataset cannot support the layer schedule.
    Configuration,
    /// The operation does not fit the index lifecycle (query before build, double build).
    State,
}

/// Errors that can occur when building or querying the index.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum HkmError {
    /// Returned when the length of an input vector does not match the expected one.
    #[error("dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },
    /// Returned when a norm or maximum is requested over a matrix with no rows.
    #[error("matrix has no rows")]
    EmptyMatrix,
    /// Returned when an invalid configuration is supplied.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// Returned when the layer schedule leaves a layer without clusters.
    #[error("layer {layer} has no clusters: {points} points with cluster size {cluster_size}")]
    EmptyLayer {
        layer: usize,
        points: usize,
        cluster_size: usize,
    },
    /// Returned when k-means is asked for more clusters than it has points.
    #[error("layer {layer} requests {requested} clusters from {points} points")]
    ClusterCount {
        layer: usize,
        requested: usize,
        points: usize,
    },
    /// Returned when the index is queried before it has been built.
    #[error("index not built; call `build` first")]
    NotBuilt,
    /// Returned when `build` is called on an index that already holds data.
    #[error("index already built; call `reset` before rebuilding")]
    AlreadyBuilt,
}

impl HkmError {
    /// Category of this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            HkmError::DimensionMismatch { .. } | HkmError::EmptyMatrix => ErrorKind::Dimension,
            HkmError::InvalidConfig(_)
            | HkmError::EmptyLayer { .. }
            | HkmError::ClusterCount { .. } => ErrorKind::Configuration,
            HkmError::NotBuilt | HkmError::AlreadyBuilt => ErrorKind::State,
        }
    }
}
