//! Partitioning of sessions into temporal clusters.
//!
//! The engine only ever sees [`FeatureVector`]s. [`ClusterFitter`] is the seam
//! for swapping algorithms; [`KMeansFitter`] is the one implementation.

use crate::error::{Error, Result};
use crate::features::FeatureVector;
use log::{debug, info, warn};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};

pub const DEFAULT_CLUSTER_COUNT: usize = 50;

/// Hard assignment of every input point to one of `k` clusters.
#[derive(Debug, Clone, PartialEq)]
pub struct Clustering {
    /// Cluster index per input point, in input order.
    pub assignments: Vec<usize>,
    pub centroids: Vec<FeatureVector>,
    /// Within-cluster sum of squared distances.
    pub inertia: f64,
    pub iterations: usize,
    pub converged: bool,
}

impl Clustering {
    #[must_use]
    pub fn k(&self) -> usize {
        self.centroids.len()
    }

    #[must_use]
    pub fn sizes(&self) -> Vec<usize> {
        cluster_sizes(&self.assignments, self.k())
    }

    /// Indices of the input points assigned to `cluster`.
    pub fn members(&self, cluster: usize) -> impl Iterator<Item = usize> + '_ {
        self.assignments
            .iter()
            .enumerate()
            .filter(move |(_, &c)| c == cluster)
            .map(|(i, _)| i)
    }
}

/// Something that can partition feature vectors into `k` groups.
pub trait ClusterFitter: Send + Sync {
    /// Partition `points` into exactly `k` clusters.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if `k` is zero or exceeds the number
    /// of distinct points.
    fn fit(&self, points: &[FeatureVector], k: usize) -> Result<Clustering>;
}

/// Tunables for [`KMeansFitter`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct KMeansConfig {
    pub seed: u64,
    /// Independent restarts; the lowest inertia wins.
    pub n_init: usize,
    pub max_iterations: usize,
}

impl Default for KMeansConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            n_init: 10,
            max_iterations: 300,
        }
    }
}

impl KMeansConfig {
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] for zero restarts or iterations.
    pub fn validate(&self) -> Result<()> {
        if self.n_init == 0 {
            return Err(Error::configuration("k-means needs at least one restart"));
        }
        if self.max_iterations == 0 {
            return Err(Error::configuration("k-means needs at least one iteration"));
        }
        Ok(())
    }
}

/// Lloyd's k-means with k-means++ seeding.
#[derive(Debug, Clone, Default)]
pub struct KMeansFitter {
    config: KMeansConfig,
}

impl KMeansFitter {
    #[must_use]
    pub fn new(config: KMeansConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub fn config(&self) -> &KMeansConfig {
        &self.config
    }
}

impl ClusterFitter for KMeansFitter {
    fn fit(&self, points: &[FeatureVector], k: usize) -> Result<Clustering> {
        self.config.validate()?;
        validate_k(points, k)?;

        let config = self.config;
        let runs = (0..config.n_init)
            .into_par_iter()
            .map(|run| {
                // Per-restart seeds keep results independent of thread scheduling.
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(run as u64));
                run_once(points, k, config.max_iterations, &mut rng)
            })
            .collect::<Vec<_>>();

        // `min_by` keeps the first of equal elements, so ties go to the earliest restart.
        let best = runs
            .into_iter()
            .min_by(|a, b| a.inertia.total_cmp(&b.inertia))
            .ok_or_else(|| Error::configuration("k-means produced no runs"))?;

        if best.converged {
            debug!("k-means converged after {} iterations", best.iterations);
        } else {
            warn!(
                "k-means did not converge within {} iterations, keeping the best iterate",
                config.max_iterations
            );
        }
        info!(
            "Clustered {} sessions into {} clusters (inertia {:.3})",
            points.len(),
            k,
            best.inertia
        );

        Ok(best)
    }
}

/// Number of bit-distinct points.
#[must_use]
pub fn distinct_points(points: &[FeatureVector]) -> usize {
    points.iter().map(FeatureVector::bits).collect::<HashSet<_>>().len()
}

fn validate_k(points: &[FeatureVector], k: usize) -> Result<()> {
    if k == 0 {
        return Err(Error::configuration("number of clusters must be positive"));
    }
    let distinct = distinct_points(points);
    if k > distinct {
        return Err(Error::configuration(format!(
            "cannot form {k} clusters from {distinct} distinct sessions"
        )));
    }
    Ok(())
}

fn run_once(points: &[FeatureVector], k: usize, max_iterations: usize, rng: &mut StdRng) -> Clustering {
    let mut centroids = seed_centroids(points, k, rng);
    // Sentinel so the first pass always counts as a change.
    let mut assignments = vec![usize::MAX; points.len()];
    let mut iterations = 0;
    let mut converged = false;

    while iterations < max_iterations {
        iterations += 1;

        let next = points
            .iter()
            .map(|point| nearest_centroid(point, &centroids))
            .collect::<Vec<_>>();
        let mut changed = next != assignments;
        assignments = next;

        let mut counts = cluster_sizes(&assignments, k);
        if relocate_empty_clusters(points, &mut assignments, &mut counts, &centroids) {
            changed = true;
        }

        centroids = compute_centroids(points, &assignments, &counts, &centroids);

        if !changed {
            converged = true;
            break;
        }
    }

    let inertia = points
        .iter()
        .zip(&assignments)
        .map(|(point, &cluster)| point.distance_sq(&centroids[cluster]))
        .sum();

    Clustering {
        assignments,
        centroids,
        inertia,
        iterations,
        converged,
    }
}

/// k-means++: each further centroid is drawn with probability proportional
/// to its squared distance from the closest centroid chosen so far.
fn seed_centroids(points: &[FeatureVector], k: usize, rng: &mut StdRng) -> Vec<FeatureVector> {
    let mut centroids = Vec::with_capacity(k);
    centroids.push(points[rng.gen_range(0..points.len())]);

    let mut closest = points
        .iter()
        .map(|point| point.distance_sq(&centroids[0]))
        .collect::<Vec<_>>();

    while centroids.len() < k {
        let Ok(weights) = WeightedIndex::new(&closest) else {
            // Only reachable with fewer distinct points than k; empty
            // clusters get relocated later.
            centroids.push(points[0]);
            continue;
        };
        let chosen = points[weights.sample(rng)];
        centroids.push(chosen);
        for (distance, point) in closest.iter_mut().zip(points) {
            *distance = distance.min(point.distance_sq(&chosen));
        }
    }

    centroids
}

/// Index of the closest centroid; ties go to the lowest index.
fn nearest_centroid(point: &FeatureVector, centroids: &[FeatureVector]) -> usize {
    let mut best = 0;
    let mut best_distance = f64::INFINITY;
    for (index, centroid) in centroids.iter().enumerate() {
        let distance = point.distance_sq(centroid);
        if distance < best_distance {
            best_distance = distance;
            best = index;
        }
    }
    best
}

fn cluster_sizes(assignments: &[usize], k: usize) -> Vec<usize> {
    let mut counts = vec![0; k];
    for &cluster in assignments {
        if cluster < k {
            counts[cluster] += 1;
        }
    }
    counts
}

/// Give every empty cluster the point lying farthest from its centroid,
/// taken from a cluster that can spare it.
fn relocate_empty_clusters(
    points: &[FeatureVector],
    assignments: &mut [usize],
    counts: &mut [usize],
    centroids: &[FeatureVector],
) -> bool {
    let mut moved = false;

    for empty in 0..counts.len() {
        if counts[empty] > 0 {
            continue;
        }

        let donor = assignments
            .iter()
            .enumerate()
            .filter(|(_, &cluster)| counts[cluster] > 1)
            .map(|(index, &cluster)| (index, points[index].distance_sq(&centroids[cluster])))
            .filter(|(_, distance)| *distance > 0.0)
            .max_by(|a, b| a.1.total_cmp(&b.1).then_with(|| b.0.cmp(&a.0)));

        if let Some((index, _)) = donor {
            counts[assignments[index]] -= 1;
            assignments[index] = empty;
            counts[empty] = 1;
            moved = true;
        }
    }

    moved
}

fn compute_centroids(
    points: &[FeatureVector],
    assignments: &[usize],
    counts: &[usize],
    previous: &[FeatureVector],
) -> Vec<FeatureVector> {
    let mut sums = vec![[0.0f64; 4]; counts.len()];
    for (point, &cluster) in points.iter().zip(assignments) {
        for (sum, value) in sums[cluster].iter_mut().zip(point.as_array()) {
            *sum += value;
        }
    }

    sums.into_iter()
        .zip(counts)
        .zip(previous)
        .map(|((sum, &count), &old)| {
            if count == 0 {
                old
            } else {
                #[allow(clippy::cast_precision_loss)]
                let count = count as f64;
                FeatureVector::from_array(sum.map(|s| s / count))
            }
        })
        .collect()
}

/// Mean silhouette coefficient over all points.
///
/// Points in singleton clusters contribute 0. Returns `None` when fewer than
/// two clusters are populated or the inputs disagree in length. Identical
/// points are grouped first, so the cost is quadratic in distinct points
/// rather than in sessions.
#[must_use]
pub fn silhouette_score(points: &[FeatureVector], assignments: &[usize], k: usize) -> Option<f64> {
    if points.is_empty() || points.len() != assignments.len() || k < 2 {
        return None;
    }
    let sizes = cluster_sizes(assignments, k);
    if sizes.iter().filter(|&&size| size > 0).count() < 2 {
        return None;
    }

    let mut grouped: BTreeMap<(usize, [u64; 4]), (FeatureVector, usize)> = BTreeMap::new();
    for (point, &cluster) in points.iter().zip(assignments) {
        grouped
            .entry((cluster, point.bits()))
            .or_insert((*point, 0))
            .1 += 1;
    }
    let groups = grouped
        .into_iter()
        .map(|((cluster, _), (point, weight))| (point, cluster, weight))
        .collect::<Vec<_>>();

    #[allow(clippy::cast_precision_loss)]
    let contributions = groups
        .par_iter()
        .map(|(point, cluster, weight)| {
            if sizes[*cluster] <= 1 {
                return 0.0;
            }

            let mut sums = vec![0.0; k];
            for (other, other_cluster, other_weight) in &groups {
                sums[*other_cluster] += *other_weight as f64 * point.distance(other);
            }

            let a = sums[*cluster] / (sizes[*cluster] - 1) as f64;
            let b = (0..k)
                .filter(|&c| c != *cluster && sizes[c] > 0)
                .map(|c| sums[c] / sizes[c] as f64)
                .fold(f64::INFINITY, f64::min);

            let denominator = a.max(b);
            let coefficient = if denominator > 0.0 { (b - a) / denominator } else { 0.0 };
            coefficient * *weight as f64
        })
        .collect::<Vec<_>>();

    #[allow(clippy::cast_precision_loss)]
    let score = contributions.iter().sum::<f64>() / points.len() as f64;
    Some(score)
}
