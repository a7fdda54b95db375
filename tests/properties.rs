//! Property-based tests for the hierarchical k-means index.
//!
//! These tests check invariants that should hold for any dataset:
//! - Layers partition their inputs
//! - A beam that keeps every centroid finds the exact inner product argmax
//! - Result rows are padded with sentinels only after real hits
//! - The embedding without extra coordinates is the identity

use hkmeans_mips::transform::{embed_dataset, embed_query};
use hkmeans_mips::{ClusterIndex, FloatMatrix, IndexConfig, SearchParams, SENTINEL_LABEL};
use proptest::prelude::*;

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

prop_compose! {
    fn arb_matrix(max_rows: usize, dim: usize)
        (rows in 1..=max_rows)
        (data in prop::collection::vec(-10.0f32..10.0, rows * dim)) -> FloatMatrix {
        FloatMatrix::from_flat(data, dim).expect("matrix")
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn layers_partition_inputs(
        data in arb_matrix(120, 4),
        layer_count in 1usize..4,
        extra_dims in 0usize..3,
        seed in any::<u64>(),
    ) {
        let config = IndexConfig::new(extra_dims, layer_count).with_seed(seed);
        let index = ClusterIndex::build(&data, &config).expect("build");
        let mut expected_inputs = data.rows();
        for layer in index.layers() {
            prop_assert!(layer.check_partition());
            prop_assert_eq!(layer.input_len(), expected_inputs);
            expected_inputs = layer.cluster_count();
        }
    }

    #[test]
    fn exhaustive_beam_finds_argmax(
        data in arb_matrix(80, 3),
        query in prop::collection::vec(-5.0f32..5.0, 3),
        layer_count in 1usize..4,
    ) {
        let index = ClusterIndex::build(&data, &IndexConfig::new(2, layer_count)).expect("build");
        let results = index.search(&query, SearchParams::exhaustive(1)).expect("search");
        let best = data
            .iter_rows()
            .map(|row| dot(&query, row))
            .fold(f32::NEG_INFINITY, f32::max);
        prop_assert_eq!(results.len(), 1);
        prop_assert!((results[0].score - best).abs() <= 1e-3 * best.abs().max(1.0));
    }

    #[test]
    fn sentinels_trail_real_hits(
        data in arb_matrix(60, 2),
        queries in arb_matrix(4, 2),
        top_k in 1usize..20,
        opened_trees in 1usize..4,
    ) {
        let index = ClusterIndex::build(&data, &IndexConfig::new(1, 2)).expect("build");
        let results = index
            .query(&queries, SearchParams::new(top_k, opened_trees))
            .expect("query");
        for row in 0..results.num_queries() {
            let labels = results.labels(row);
            let found = labels.iter().take_while(|&&l| l != SENTINEL_LABEL).count();
            prop_assert!(labels[found..].iter().all(|&l| l == SENTINEL_LABEL));
            prop_assert!(labels[..found].iter().all(|&l| (l as usize) < data.rows()));
        }
    }

    #[test]
    fn zero_extra_dims_is_identity(data in arb_matrix(30, 5)) {
        prop_assert_eq!(embed_dataset(&data, 0).expect("embed"), data.clone());
        prop_assert_eq!(embed_query(&data, 0), data);
    }
}
