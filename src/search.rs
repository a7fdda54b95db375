use std::cmp::Ordering;

use crate::config::SearchParams;
use crate::math::dot;
use crate::matrix::FloatMatrix;
use crate::tree::ClusterTree;
use crate::HkmError;

/// Result entry returned by a search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    /// Row of the dataset the index was built from.
    pub id: usize,
    /// True inner product between the query and that row.
    pub score: f32,
}

/// Counters collected while descending the tree for one query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SearchStats {
    /// Centroids scored at each visited layer, coarsest first.
    pub scored_per_layer: Vec<usize>,
    /// Dataset rows reached after the finest layer.
    pub final_candidates: usize,
}

impl SearchStats {
    /// Total inner products evaluated, centroids and dataset rows together.
    pub fn total_scored(&self) -> usize {
        self.scored_per_layer.iter().sum::<usize>() + self.final_candidates
    }
}

/// Descends a [`ClusterTree`] keeping the best `opened_trees` centroids per layer.
#[derive(Debug, Clone, Copy)]
pub struct BeamSearch<'a> {
    tree: &'a ClusterTree,
    dataset: &'a FloatMatrix,
}

impl<'a> BeamSearch<'a> {
    /// `dataset` holds the original, unembedded vectors the tree was built from.
    pub fn new(tree: &'a ClusterTree, dataset: &'a FloatMatrix) -> Self {
        Self { tree, dataset }
    }

    /// Rank up to `params.top_k` dataset rows for one query, best first.
    ///
    /// `embedded_query` steers the descent; `query` is the original vector used
    /// to score the rows that survive it.
    pub fn search(
        &self,
        embedded_query: &[f32],
        query: &[f32],
        params: SearchParams,
    ) -> Result<Vec<SearchResult>, HkmError> {
        self.search_internal(embedded_query, query, params, None)
    }

    /// Same as [`search`](Self::search), also reporting traversal counters.
    pub fn search_with_stats(
        &self,
        embedded_query: &[f32],
        query: &[f32],
        params: SearchParams,
    ) -> Result<(Vec<SearchResult>, SearchStats), HkmError> {
        let mut stats = SearchStats::default();
        let results = self.search_internal(embedded_query, query, params, Some(&mut stats))?;
        Ok((results, stats))
    }

    fn search_internal(
        &self,
        embedded_query: &[f32],
        query: &[f32],
        params: SearchParams,
        mut stats: Option<&mut SearchStats>,
    ) -> Result<Vec<SearchResult>, HkmError> {
        params.validate()?;
        let coarsest = self.tree.coarsest().ok_or(HkmError::NotBuilt)?;
        let embedded_dim = coarsest.centroids().dim();
        if embedded_query.len() != embedded_dim {
            return Err(HkmError::DimensionMismatch {
                expected: embedded_dim,
                got: embedded_query.len(),
            });
        }
        if query.len() != self.dataset.dim() {
            return Err(HkmError::DimensionMismatch {
                expected: self.dataset.dim(),
                got: query.len(),
            });
        }
        if params.top_k == 0 {
            return Ok(Vec::new());
        }

        let mut candidates: Vec<usize> = (0..coarsest.cluster_count()).collect();
        let mut scored: Vec<(usize, f32)> = Vec::new();

        for layer in self.tree.layers().iter().rev() {
            scored.clear();
            scored.extend(
                candidates
                    .iter()
                    .map(|&cid| (cid, dot(embedded_query, layer.centroids().row(cid)))),
            );
            if let Some(stats) = stats.as_deref_mut() {
                stats.scored_per_layer.push(scored.len());
            }

            retain_best(&mut scored, params.opened_trees);

            candidates.clear();
            for &(cid, _) in &scored {
                candidates.extend_from_slice(layer.children(cid));
            }
        }

        let mut results: Vec<SearchResult> = candidates
            .iter()
            .map(|&id| SearchResult {
                id,
                score: dot(query, self.dataset.row(id)),
            })
            .collect();
        if let Some(stats) = stats.as_deref_mut() {
            stats.final_candidates = results.len();
        }

        results.sort_by(|a, b| by_score_desc(&(a.id, a.score), &(b.id, b.score)));
        results.truncate(params.top_k);
        Ok(results)
    }
}

/// Higher score first; lower id first among equal scores.
fn by_score_desc(a: &(usize, f32), b: &(usize, f32)) -> Ordering {
    b.1.total_cmp(&a.1).then_with(|| a.0.cmp(&b.0))
}

/// Keep the `keep` best entries without sorting the whole slice.
fn retain_best(scored: &mut Vec<(usize, f32)>, keep: usize) {
    if scored.len() > keep {
        scored.select_nth_unstable_by(keep - 1, by_score_desc);
        scored.truncate(keep);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retain_best_keeps_highest_scores() {
        let mut scored = vec![(0, 0.1), (1, 0.9), (2, -0.5), (3, 0.7), (4, 0.3)];
        retain_best(&mut scored, 2);
        let mut ids: Vec<usize> = scored.iter().map(|&(id, _)| id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![1, 3]);
    }

    #[test]
    fn retain_best_breaks_ties_by_lower_index() {
        let mut scored = vec![(5, 1.0), (2, 1.0), (9, 1.0), (1, 0.0)];
        retain_best(&mut scored, 2);
        let mut ids: Vec<usize> = scored.iter().map(|&(id, _)| id).collect();
        ids.sort_unstable();
        assert_eq!(ids, vec![2, 5]);
    }

    #[test]
    fn retain_best_is_noop_when_under_width() {
        let mut scored = vec![(0, 0.5), (1, 0.25)];
        retain_best(&mut scored, 4);
        assert_eq!(scored.len(), 2);
    }
}
