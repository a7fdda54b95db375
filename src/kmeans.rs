use rand::prelude::*;

use crate::math::l2_distance_sqr;
use crate::matrix::FloatMatrix;
use crate::HkmError;

#[derive(Debug, Clone)]
pub struct KMeansResult {
    pub centroids: FloatMatrix,
    pub assignments: Vec<usize>,
}

/// Run Lloyd's k-means with k-means++ initialisation.
///
/// Single-threaded; the result depends only on `data`, `k`, `max_iter` and
/// the state of `rng`. Clusters that lose all members are reseeded from a
/// random point and may end up with no assignments.
pub fn run_kmeans(
    data: &FloatMatrix,
    k: usize,
    max_iter: usize,
    rng: &mut StdRng,
) -> Result<KMeansResult, HkmError> {
    if data.is_empty() {
        return Err(HkmError::EmptyMatrix);
    }
    if k == 0 {
        return Err(HkmError::InvalidConfig("k must be positive"));
    }
    if k > data.rows() {
        return Err(HkmError::InvalidConfig(
            "k cannot exceed the number of points",
        ));
    }

    let mut centroids = initialise_plus_plus(data, k, rng)?;
    let mut assignments = vec![usize::MAX; data.rows()];

    let mut converged = false;
    for _ in 0..max_iter.max(1) {
        if assign_points(data, &centroids, &mut assignments) == 0 {
            converged = true;
            break;
        }
        recompute_centroids(data, &assignments, &mut centroids, rng);
    }

    // Assignments must point at the returned centroids, not the previous ones.
    if !converged {
        assign_points(data, &centroids, &mut assignments);
    }

    Ok(KMeansResult {
        centroids,
        assignments,
    })
}

fn initialise_plus_plus(
    data: &FloatMatrix,
    k: usize,
    rng: &mut StdRng,
) -> Result<FloatMatrix, HkmError> {
    let n = data.rows();
    let mut centroids = FloatMatrix::with_capacity(k, data.dim());
    let mut chosen = vec![false; n];

    let first = rng.gen_range(0..n);
    centroids.push_row(data.row(first))?;
    chosen[first] = true;

    // Squared distance from each point to its closest chosen centroid so far.
    let mut distances: Vec<f64> = data
        .iter_rows()
        .map(|v| l2_distance_sqr(v, data.row(first)) as f64)
        .collect();

    while centroids.rows() < k {
        let dist_sum: f64 = distances.iter().sum();
        let next_idx = if dist_sum <= f64::EPSILON {
            // Remaining points coincide with chosen centroids; take unchosen ones in order.
            (0..n).find(|i| !chosen[*i]).unwrap_or(first)
        } else {
            let mut target = rng.gen::<f64>() * dist_sum;
            let mut picked = n - 1;
            for (idx, weight) in distances.iter().enumerate() {
                target -= *weight;
                if target <= 0.0 {
                    picked = idx;
                    break;
                }
            }
            if chosen[picked] {
                (0..n).find(|i| !chosen[*i]).unwrap_or(picked)
            } else {
                picked
            }
        };

        centroids.push_row(data.row(next_idx))?;
        chosen[next_idx] = true;

        let newest = data.row(next_idx);
        for (dist, vector) in distances.iter_mut().zip(data.iter_rows()) {
            let candidate = l2_distance_sqr(vector, newest) as f64;
            if candidate < *dist {
                *dist = candidate;
            }
        }
    }

    Ok(centroids)
}

/// Move every point to its nearest centroid; returns how many moved.
fn assign_points(
    data: &FloatMatrix,
    centroids: &FloatMatrix,
    assignments: &mut [usize],
) -> usize {
    let mut changed = 0usize;
    for (vector, assignment) in data.iter_rows().zip(assignments.iter_mut()) {
        let (best_cluster, _) = nearest_centroid(vector, centroids);
        if *assignment != best_cluster {
            *assignment = best_cluster;
            changed += 1;
        }
    }
    changed
}

fn nearest_centroid(vector: &[f32], centroids: &FloatMatrix) -> (usize, f32) {
    let mut best_cluster = 0usize;
    let mut best_distance = f32::MAX;
    for (cid, centroid) in centroids.iter_rows().enumerate() {
        let dist = l2_distance_sqr(vector, centroid);
        if dist < best_distance {
            best_distance = dist;
            best_cluster = cid;
        }
    }
    (best_cluster, best_distance)
}

fn recompute_centroids(
    data: &FloatMatrix,
    assignments: &[usize],
    centroids: &mut FloatMatrix,
    rng: &mut StdRng,
) {
    let k = centroids.rows();
    let dim = centroids.dim();
    let mut sums = vec![0.0f64; k * dim];
    let mut counts = vec![0usize; k];

    for (vector, &cluster) in data.iter_rows().zip(assignments.iter()) {
        counts[cluster] += 1;
        let cluster_sum = &mut sums[cluster * dim..(cluster + 1) * dim];
        for (sum, value) in cluster_sum.iter_mut().zip(vector.iter()) {
            *sum += *value as f64;
        }
    }

    for cid in 0..k {
        let centroid = centroids.row_mut(cid);
        if counts[cid] == 0 {
            let idx = rng.gen_range(0..data.rows());
            centroid.copy_from_slice(data.row(idx));
        } else {
            let inv = 1.0f64 / counts[cid] as f64;
            for (dst, sum) in centroid.iter_mut().zip(&sums[cid * dim..(cid + 1) * dim]) {
                *dst = (*sum * inv) as f32;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_more_clusters_than_points() {
        let data = FloatMatrix::from_rows(&[vec![0.0, 1.0], vec![1.0, 0.0]]).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        assert!(matches!(
            run_kmeans(&data, 3, 10, &mut rng),
            Err(HkmError::InvalidConfig(_))
        ));
    }

    #[test]
    fn one_cluster_per_point_uses_every_point() {
        let data =
            FloatMatrix::from_rows(&[vec![0.0, 0.0], vec![5.0, 5.0], vec![-5.0, 5.0]]).unwrap();
        let mut rng = StdRng::seed_from_u64(11);
        let result = run_kmeans(&data, 3, 10, &mut rng).unwrap();
        let mut assigned = result.assignments.clone();
        assigned.sort_unstable();
        assert_eq!(assigned, vec![0, 1, 2]);
    }

    #[test]
    fn truncated_runs_assign_points_to_returned_centroids() {
        let mut rng = StdRng::seed_from_u64(21);
        let data: Vec<f32> = (0..400 * 6).map(|_| rng.gen::<f32>() * 4.0 - 2.0).collect();
        let data = FloatMatrix::from_flat(data, 6).unwrap();
        for max_iter in 1..=3 {
            let mut rng = StdRng::seed_from_u64(max_iter as u64);
            let result = run_kmeans(&data, 20, max_iter, &mut rng).unwrap();
            for (vector, &assigned) in data.iter_rows().zip(&result.assignments) {
                let (nearest, _) = nearest_centroid(vector, &result.centroids);
                assert_eq!(assigned, nearest, "max_iter {max_iter}");
            }
        }
    }

    #[test]
    fn too_many_clusters_is_a_configuration_error() {
        let data = FloatMatrix::from_rows(&[vec![0.0, 1.0]]).unwrap();
        let mut rng = StdRng::seed_from_u64(4);
        let err = run_kmeans(&data, 2, 5, &mut rng).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Configuration);
    }

    #[test]
    fn identical_points_do_not_stall_seeding() {
        let data = FloatMatrix::from_rows(&vec![vec![1.0, 1.0]; 5]).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let result = run_kmeans(&data, 4, 10, &mut rng).unwrap();
        assert_eq!(result.centroids.rows(), 4);
        assert!(result.assignments.iter().all(|&a| a < 4));
    }
}
