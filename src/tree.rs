//! Cascading k-means layers.
//!
//! Layer 0 clusters the embedded dataset, every later layer clusters the
//! centroids of the layer before it. Cluster sizes grow geometrically with
//! the layer index, so the last layer is the coarsest and is where a search
//! starts.

use rand::prelude::*;
use tracing::{debug, info};

use crate::config::KMeansParams;
use crate::kmeans::{run_kmeans, KMeansResult};
use crate::matrix::FloatMatrix;
use crate::HkmError;

/// Planned shape of one layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LayerPlan {
    /// Target number of inputs per cluster.
    pub cluster_size: usize,
    /// Number of centroids the layer will hold.
    pub cluster_count: usize,
}

/// Compute the cluster schedule for `points` vectors and `layer_count` layers.
///
/// Layer `i` uses `cluster_size = floor(points^((i+1)/(L+1)))` and
/// `cluster_count = floor(points / cluster_size)`.
pub fn layer_schedule(points: usize, layer_count: usize) -> Result<Vec<LayerPlan>, HkmError> {
    if layer_count == 0 {
        return Err(HkmError::InvalidConfig("layer_count must be at least 1"));
    }
    if points == 0 {
        return Err(HkmError::EmptyMatrix);
    }

    let mut plans = Vec::with_capacity(layer_count);
    for layer in 0..layer_count {
        let cluster_size = floor_root_power(points, layer + 1, layer_count + 1);
        let cluster_count = points / cluster_size;
        if cluster_count == 0 {
            return Err(HkmError::EmptyLayer {
                layer,
                points,
                cluster_size,
            });
        }
        plans.push(LayerPlan {
            cluster_size,
            cluster_count,
        });
    }
    Ok(plans)
}

/// `floor(n^(num/den))`, corrected for float rounding near integers.
fn floor_root_power(n: usize, num: usize, den: usize) -> usize {
    let approx = (n as f64).powf(num as f64 / den as f64).floor() as usize;

    // Some(true) when s^den <= n^num; None when the exact check overflows.
    let fits = |s: usize| -> Option<bool> {
        let lhs = (s as u128).checked_pow(u32::try_from(den).ok()?)?;
        let rhs = (n as u128).checked_pow(u32::try_from(num).ok()?)?;
        Some(lhs <= rhs)
    };

    let mut size = approx.max(1);
    while fits(size + 1) == Some(true) {
        size += 1;
    }
    while size > 1 && fits(size) == Some(false) {
        size -= 1;
    }
    size
}

/// One frozen level of the tree.
#[derive(Debug, Clone)]
pub struct Layer {
    centroids: FloatMatrix,
    assignments: Vec<usize>,
    children: Vec<Vec<usize>>,
}

impl Layer {
    fn from_kmeans(result: KMeansResult) -> Self {
        let KMeansResult {
            centroids,
            assignments,
        } = result;
        let mut children = vec![Vec::new(); centroids.rows()];
        for (idx, &cluster) in assignments.iter().enumerate() {
            children[cluster].push(idx);
        }
        Self {
            centroids,
            assignments,
            children,
        }
    }

    pub fn cluster_count(&self) -> usize {
        self.centroids.rows()
    }

    pub fn centroids(&self) -> &FloatMatrix {
        &self.centroids
    }

    /// Centroid index of every input point of this layer.
    pub fn assignments(&self) -> &[usize] {
        &self.assignments
    }

    /// Input indices assigned to centroid `cluster`, ascending.
    pub fn children(&self, cluster: usize) -> &[usize] {
        &self.children[cluster]
    }

    /// Number of input points this layer was built over.
    pub fn input_len(&self) -> usize {
        self.assignments.len()
    }

    /// True when the child buckets partition `0..input_len()` and agree with
    /// the assignments.
    pub fn check_partition(&self) -> bool {
        let mut seen = vec![false; self.input_len()];
        for (cluster, bucket) in self.children.iter().enumerate() {
            for &idx in bucket {
                if idx >= seen.len() || seen[idx] || self.assignments[idx] != cluster {
                    return false;
                }
                seen[idx] = true;
            }
        }
        seen.into_iter().all(|s| s)
    }
}

/// Ordered, immutable sequence of layers; index 0 is the finest.
#[derive(Debug, Clone)]
pub struct ClusterTree {
    layers: Vec<Layer>,
}

impl ClusterTree {
    /// Build `layer_count` layers over `points`.
    pub fn build(
        points: &FloatMatrix,
        layer_count: usize,
        params: &KMeansParams,
    ) -> Result<Self, HkmError> {
        let plans = layer_schedule(points.rows(), layer_count)?;
        let mut layers: Vec<Layer> = Vec::with_capacity(plans.len());

        for (layer_id, plan) in plans.iter().enumerate() {
            let input = match layers.last() {
                Some(previous) => previous.centroids(),
                None => points,
            };
            if plan.cluster_count > input.rows() {
                return Err(HkmError::ClusterCount {
                    layer: layer_id,
                    requested: plan.cluster_count,
                    points: input.rows(),
                });
            }

            debug!(
                layer = layer_id,
                inputs = input.rows(),
                clusters = plan.cluster_count,
                cluster_size = plan.cluster_size,
                "clustering layer"
            );
            let mut rng = StdRng::seed_from_u64(params.seed.wrapping_add(layer_id as u64));
            let result = run_kmeans(input, plan.cluster_count, params.max_iter, &mut rng)?;
            let layer = Layer::from_kmeans(result);
            debug_assert!(layer.check_partition());
            layers.push(layer);
        }

        info!(
            points = points.rows(),
            layers = layers.len(),
            coarsest = layers.last().map_or(0, Layer::cluster_count),
            "cluster tree built"
        );
        Ok(Self { layers })
    }

    /// Layers from finest (index 0) to coarsest.
    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// The layer a search starts from.
    pub fn coarsest(&self) -> Option<&Layer> {
        self.layers.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn schedule_grows_cluster_size_per_layer() {
        let plans = layer_schedule(1000, 2).unwrap();
        assert_eq!(
            plans,
            vec![
                LayerPlan {
                    cluster_size: 10,
                    cluster_count: 100
                },
                LayerPlan {
                    cluster_size: 100,
                    cluster_count: 10
                },
            ]
        );
    }

    #[test]
    fn schedule_corrects_float_rounding() {
        // 64^(1/3) evaluates to 3.9999... in floating point.
        let plans = layer_schedule(64, 2).unwrap();
        assert_eq!(plans[0].cluster_size, 4);
        assert_eq!(plans[0].cluster_count, 16);
        assert_eq!(plans[1].cluster_size, 16);
        assert_eq!(plans[1].cluster_count, 4);
    }

    #[test]
    fn schedule_rejects_zero_layers() {
        assert!(matches!(
            layer_schedule(10, 0),
            Err(HkmError::InvalidConfig(_))
        ));
    }

    #[test]
    fn clustering_failures_surface_as_configuration_errors() {
        let too_many = HkmError::ClusterCount {
            layer: 1,
            requested: 8,
            points: 4,
        };
        assert_eq!(too_many.kind(), ErrorKind::Configuration);

        let points = FloatMatrix::from_rows(&[vec![1.0, 0.0], vec![0.0, 1.0]]).unwrap();
        let params = KMeansParams::default();
        let err = ClusterTree::build(&points, 0, &params).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let mut rng = StdRng::seed_from_u64(params.seed);
        let err = run_kmeans(&points, 3, params.max_iter, &mut rng).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn single_point_gets_single_cluster_per_layer() {
        let plans = layer_schedule(1, 3).unwrap();
        assert!(plans.iter().all(|p| p.cluster_count == 1));
    }
}
