use std::sync::Arc;

use rayon::prelude::*;
use tracing::{debug, info};

use crate::config::{IndexConfig, SearchParams};
use crate::matrix::FloatMatrix;
use crate::search::BeamSearch;
use crate::transform::MipsTransform;
use crate::tree::{ClusterTree, Layer};
use crate::HkmError;

pub use crate::search::{SearchResult, SearchStats};

/// Label written into result slots that have no hit.
pub const SENTINEL_LABEL: i64 = -1;

/// Score written next to [`SENTINEL_LABEL`].
pub const SENTINEL_SCORE: f32 = f32::NEG_INFINITY;

/// An immutable, fully built index.
///
/// Owns a copy of the dataset, its embedded form and the cluster tree. Share
/// it between threads through an [`Arc`]; searching never mutates it.
#[derive(Debug, Clone)]
pub struct ClusterIndex {
    config: IndexConfig,
    transform: MipsTransform,
    original: FloatMatrix,
    embedded: FloatMatrix,
    tree: ClusterTree,
}

impl ClusterIndex {
    /// Embed `vectors` and build the cluster tree over them.
    pub fn build(vectors: &FloatMatrix, config: &IndexConfig) -> Result<Self, HkmError> {
        config.validate()?;
        if vectors.is_empty() {
            return Err(HkmError::EmptyMatrix);
        }
        if vectors.dim() == 0 {
            return Err(HkmError::InvalidConfig(
                "vectors must have at least one dimension",
            ));
        }

        info!(
            vectors = vectors.rows(),
            dim = vectors.dim(),
            extra_dims = config.extra_dims,
            layers = config.layer_count,
            "building index"
        );

        let transform = MipsTransform::new(config.extra_dims, config.augmentation);
        let original = vectors.clone();
        let embedded = transform.embed_dataset(&original)?;
        let tree = ClusterTree::build(&embedded, config.layer_count, &config.kmeans)?;

        Ok(Self {
            config: *config,
            transform,
            original,
            embedded,
            tree,
        })
    }

    /// Number of stored vectors.
    pub fn len(&self) -> usize {
        self.original.rows()
    }

    pub fn is_empty(&self) -> bool {
        self.original.is_empty()
    }

    /// Length of the vectors the index was built from.
    pub fn dim(&self) -> usize {
        self.original.dim()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    /// Dataset vectors after the MIPS embedding.
    pub fn embedded(&self) -> &FloatMatrix {
        &self.embedded
    }

    pub fn tree(&self) -> &ClusterTree {
        &self.tree
    }

    /// Layers from finest to coarsest.
    pub fn layers(&self) -> &[Layer] {
        self.tree.layers()
    }

    /// Search for the vectors with the largest inner product with `query`.
    ///
    /// Returns at most `params.top_k` hits, best first; fewer when the beam
    /// reaches fewer rows.
    pub fn search(
        &self,
        query: &[f32],
        params: SearchParams,
    ) -> Result<Vec<SearchResult>, HkmError> {
        self.check_query_dim(query.len())?;
        let embedded_query = self.transform.embed_query(query);
        BeamSearch::new(&self.tree, &self.original).search(&embedded_query, query, params)
    }

    /// Same as [`search`](Self::search), also returning traversal counters.
    pub fn search_with_stats(
        &self,
        query: &[f32],
        params: SearchParams,
    ) -> Result<(Vec<SearchResult>, SearchStats), HkmError> {
        self.check_query_dim(query.len())?;
        let embedded_query = self.transform.embed_query(query);
        BeamSearch::new(&self.tree, &self.original).search_with_stats(
            &embedded_query,
            query,
            params,
        )
    }

    /// Answer a batch of queries; rows are searched in parallel.
    ///
    /// The output has exactly `params.top_k` slots per query. Slots without a
    /// hit hold [`SENTINEL_LABEL`] and [`SENTINEL_SCORE`] and always come
    /// after the real hits.
    pub fn query(
        &self,
        queries: &FloatMatrix,
        params: SearchParams,
    ) -> Result<QueryResults, HkmError> {
        params.validate()?;
        self.check_query_dim(queries.dim())?;
        if queries.is_empty() {
            return Ok(QueryResults::empty(params.top_k));
        }

        let embedded = self.transform.embed_queries(queries);
        let retriever = BeamSearch::new(&self.tree, &self.original);
        let hits = (0..queries.rows())
            .into_par_iter()
            .map(|row| retriever.search(embedded.row(row), queries.row(row), params))
            .collect::<Result<Vec<_>, HkmError>>()?;

        debug!(
            queries = queries.rows(),
            top_k = params.top_k,
            opened_trees = params.opened_trees,
            "answered query batch"
        );
        Ok(QueryResults::from_hits(&hits, params.top_k))
    }

    fn check_query_dim(&self, got: usize) -> Result<(), HkmError> {
        if got != self.dim() {
            return Err(HkmError::DimensionMismatch {
                expected: self.dim(),
                got,
            });
        }
        Ok(())
    }
}

/// Dense `queries × top_k` label and score matrices.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResults {
    queries: usize,
    top_k: usize,
    labels: Vec<i64>,
    scores: Vec<f32>,
}

impl QueryResults {
    fn empty(top_k: usize) -> Self {
        Self {
            queries: 0,
            top_k,
            labels: Vec::new(),
            scores: Vec::new(),
        }
    }

    fn from_hits(hits: &[Vec<SearchResult>], top_k: usize) -> Self {
        let mut labels = vec![SENTINEL_LABEL; hits.len() * top_k];
        let mut scores = vec![SENTINEL_SCORE; hits.len() * top_k];
        for (row, row_hits) in hits.iter().enumerate() {
            for (slot, hit) in row_hits.iter().take(top_k).enumerate() {
                labels[row * top_k + slot] = hit.id as i64;
                scores[row * top_k + slot] = hit.score;
            }
        }
        Self {
            queries: hits.len(),
            top_k,
            labels,
            scores,
        }
    }

    /// Number of query rows.
    pub fn num_queries(&self) -> usize {
        self.queries
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }

    /// Labels of query `row`, best first, padded with [`SENTINEL_LABEL`].
    pub fn labels(&self, row: usize) -> &[i64] {
        &self.labels[row * self.top_k..(row + 1) * self.top_k]
    }

    /// Scores of query `row`; only meaningful where the label is not the sentinel.
    pub fn scores(&self, row: usize) -> &[f32] {
        &self.scores[row * self.top_k..(row + 1) * self.top_k]
    }

    /// Real hits of query `row`, best first.
    pub fn hits(&self, row: usize) -> impl Iterator<Item = SearchResult> + '_ {
        self.labels(row)
            .iter()
            .zip(self.scores(row))
            .take_while(|(label, _)| **label != SENTINEL_LABEL)
            .map(|(&label, &score)| SearchResult {
                id: label as usize,
                score,
            })
    }

    /// Flat row-major label matrix.
    pub fn label_matrix(&self) -> &[i64] {
        &self.labels
    }

    /// Flat row-major score matrix.
    pub fn score_matrix(&self) -> &[f32] {
        &self.scores
    }
}

/// Build/reset/query lifecycle around a shared [`ClusterIndex`] snapshot.
///
/// `build` refuses to overwrite an existing snapshot; call `reset` first.
/// Readers that took a [`snapshot`](Self::snapshot) keep a consistent view
/// across a later `reset` or rebuild.
#[derive(Debug, Clone)]
pub struct IndexHandle {
    config: IndexConfig,
    opened_trees: usize,
    snapshot: Option<Arc<ClusterIndex>>,
}

impl IndexHandle {
    pub fn new(config: IndexConfig, opened_trees: usize) -> Result<Self, HkmError> {
        config.validate()?;
        SearchParams::new(1, opened_trees).validate()?;
        Ok(Self {
            config,
            opened_trees,
            snapshot: None,
        })
    }

    /// Build the index over `vectors`. Nothing changes if the build fails.
    pub fn build(&mut self, vectors: &FloatMatrix) -> Result<(), HkmError> {
        if self.snapshot.is_some() {
            return Err(HkmError::AlreadyBuilt);
        }
        let index = ClusterIndex::build(vectors, &self.config)?;
        self.snapshot = Some(Arc::new(index));
        Ok(())
    }

    /// Drop the current snapshot.
    pub fn reset(&mut self) {
        if self.snapshot.take().is_some() {
            debug!("index reset");
        }
    }

    pub fn is_built(&self) -> bool {
        self.snapshot.is_some()
    }

    /// Shared reference to the current snapshot, if built.
    pub fn snapshot(&self) -> Option<Arc<ClusterIndex>> {
        self.snapshot.clone()
    }

    pub fn config(&self) -> &IndexConfig {
        &self.config
    }

    pub fn opened_trees(&self) -> usize {
        self.opened_trees
    }

    /// Change the beam width used by later queries.
    pub fn set_opened_trees(&mut self, opened_trees: usize) -> Result<(), HkmError> {
        SearchParams::new(1, opened_trees).validate()?;
        self.opened_trees = opened_trees;
        Ok(())
    }

    /// Query the current snapshot for the top `k` vectors per row.
    pub fn query(&self, queries: &FloatMatrix, k: usize) -> Result<QueryResults, HkmError> {
        let index = self.snapshot.as_ref().ok_or(HkmError::NotBuilt)?;
        index.query(queries, SearchParams::new(k, self.opened_trees))
    }
}
