//! K-Means segmentation over standardized age and total spending

use crate::config::ClusterConfig;
use crate::error::SegmentError;
use crate::features::{FeatureColumns, FeatureMatrix};
use crate::scaling::{FeatureScaler, Normalization};
use ndarray::{array, Array1, Array2, ArrayView1, ArrayView2};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use std::collections::BTreeMap;
use std::time::Instant;

/// Cluster label per customer plus the Davies-Bouldin score of the partition
#[derive(Debug, Clone, PartialEq)]
pub struct ClusterAssignment {
    pub labels: BTreeMap<String, usize>,
    /// Davies-Bouldin index, lower is better
    pub score: f64,
    /// Customers left out for a null age
    pub excluded: Vec<String>,
}

/// Fitted K-Means model
#[derive(Debug, Clone)]
pub struct KMeansModel {
    /// Number of clusters
    pub n_clusters: usize,
    /// Customer ids in row order of `features`
    pub customer_ids: Vec<String>,
    /// (age, total_spending) rows as clustered, imputed ages included
    pub raw_features: Array2<f64>,
    /// Cluster assignments for training data
    pub labels: Array1<usize>,
    /// Cluster centroids in standardized space
    pub centroids: Array2<f64>,
    /// Within-cluster sum of squares (inertia)
    pub inertia: f64,
    /// Assign/update iterations run
    pub n_iterations: usize,
    pub assignment: ClusterAssignment,
    scaler: FeatureScaler,
}

impl KMeansModel {
    /// Predict the cluster of a new customer from raw age and total spending
    pub fn predict(&self, age: f64, total_spending: f64) -> usize {
        let point = self.scaler.transform_row(&array![age, total_spending].view());
        nearest_centroid(&point.view(), &self.centroids.view())
    }

    /// Get cluster sizes
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        for &label in self.labels.iter() {
            sizes[label] += 1;
        }
        sizes
    }

    pub fn davies_bouldin(&self) -> f64 {
        self.assignment.score
    }

    pub fn label_of(&self, customer_id: &str) -> Option<usize> {
        self.assignment.labels.get(customer_id).copied()
    }
}

/// Fit K-Means on the (age, total_spending) projection of `features`.
///
/// Both columns are z-scored before clustering. Customers with a null age
/// follow `config.missing_age`.
pub fn fit_kmeans(features: &FeatureMatrix, config: &ClusterConfig) -> crate::Result<KMeansModel> {
    config.validate()?;

    let dense = features.to_dense(FeatureColumns::AgeSpending, config.missing_age)?;

    if dense.values.nrows() < config.k {
        return Err(SegmentError::InsufficientData(format!(
            "Number of customers ({}) must be at least equal to number of clusters ({})",
            dense.values.nrows(),
            config.k
        )));
    }

    let (scaler, standardized) =
        FeatureScaler::fit_transform(Normalization::ZScore, &dense.values.view());

    let start = Instant::now();
    let result = run_kmeans(&standardized.view(), config);
    log::info!(
        "K-Means with {} clusters finished after {} iterations in {:.3}s",
        config.k,
        result.n_iterations,
        start.elapsed().as_secs_f64()
    );

    let inertia = compute_inertia(&standardized.view(), &result.labels, &result.centroids.view());
    let score = davies_bouldin_score(&standardized.view(), &result.labels, config.k)?;

    let labels_by_id = dense
        .customer_ids
        .iter()
        .cloned()
        .zip(result.labels.iter().copied())
        .collect();

    Ok(KMeansModel {
        n_clusters: config.k,
        customer_ids: dense.customer_ids,
        raw_features: dense.values,
        labels: result.labels,
        centroids: result.centroids,
        inertia,
        n_iterations: result.n_iterations,
        assignment: ClusterAssignment {
            labels: labels_by_id,
            score,
            excluded: dense.excluded,
        },
        scaler,
    })
}

struct KMeansResult {
    centroids: Array2<f64>,
    labels: Array1<usize>,
    n_iterations: usize,
}

/// Lloyd iterations until assignments stop changing or `max_iters` is hit
fn run_kmeans(data: &ArrayView2<f64>, config: &ClusterConfig) -> KMeansResult {
    let n_samples = data.nrows();
    let n_features = data.ncols();
    let k = config.k;

    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let mut centroids = initialize_centroids(data, k, &mut rng);
    let mut labels: Array1<usize> = Array1::zeros(n_samples);
    let mut n_iterations = 0;
    let mut converged = false;

    for iteration in 0..config.max_iters {
        n_iterations = iteration + 1;

        let changed = assign_labels(data, &centroids.view(), &mut labels) || iteration == 0;
        if !changed {
            log::debug!("Assignments stable after {} iterations", iteration + 1);
            converged = true;
            break;
        }

        let mut sums: Array2<f64> = Array2::zeros((k, n_features));
        let mut counts = vec![0usize; k];
        for (point, &label) in data.outer_iter().zip(labels.iter()) {
            let mut sum = sums.row_mut(label);
            sum += &point;
            counts[label] += 1;
        }

        for (cluster, &count) in counts.iter().enumerate() {
            if count > 0 {
                let mean = &sums.row(cluster) / count as f64;
                centroids.row_mut(cluster).assign(&mean);
            } else {
                // Re-seed an empty cluster from a random data point
                let idx = rng.gen_range(0..n_samples);
                centroids.row_mut(cluster).assign(&data.row(idx));
                log::debug!("Re-seeded empty cluster {cluster} from row {idx}");
            }
        }
    }

    // Labels must refer to the centroids that are returned
    if !converged {
        log::warn!(
            "K-Means stopped at max_iters={} before assignments stabilized",
            config.max_iters
        );
        assign_labels(data, &centroids.view(), &mut labels);
    }

    KMeansResult {
        centroids,
        labels,
        n_iterations,
    }
}

/// k-means++ seeding: the first centroid is drawn uniformly, each further
/// one with probability proportional to its squared distance from the
/// nearest centroid chosen so far
fn initialize_centroids(data: &ArrayView2<f64>, k: usize, rng: &mut ChaCha8Rng) -> Array2<f64> {
    let n_samples = data.nrows();
    let mut centroids = Array2::zeros((k, data.ncols()));

    let first = rng.gen_range(0..n_samples);
    centroids.row_mut(0).assign(&data.row(first));
    let mut closest: Vec<f64> = data
        .outer_iter()
        .map(|point| squared_distance(&point, &data.row(first)))
        .collect();

    for centroid_idx in 1..k {
        let total: f64 = closest.iter().sum();
        let chosen = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = closest
                .iter()
                .rposition(|&d| d > 0.0)
                .unwrap_or(n_samples - 1);
            for (i, &d) in closest.iter().enumerate() {
                if target < d {
                    chosen = i;
                    break;
                }
                target -= d;
            }
            chosen
        } else {
            rng.gen_range(0..n_samples)
        };

        centroids.row_mut(centroid_idx).assign(&data.row(chosen));
        for (i, point) in data.outer_iter().enumerate() {
            let d = squared_distance(&point, &centroids.row(centroid_idx));
            closest[i] = closest[i].min(d);
        }
    }

    centroids
}

/// Assign every point to its nearest centroid; true if any label changed
fn assign_labels(
    data: &ArrayView2<f64>,
    centroids: &ArrayView2<f64>,
    labels: &mut Array1<usize>,
) -> bool {
    let mut changed = false;
    for (point, label) in data.outer_iter().zip(labels.iter_mut()) {
        let nearest = nearest_centroid(&point, centroids);
        if nearest != *label {
            *label = nearest;
            changed = true;
        }
    }
    changed
}

/// Index of the closest centroid; the lowest index wins ties
fn nearest_centroid(point: &ArrayView1<f64>, centroids: &ArrayView2<f64>) -> usize {
    let mut min_distance = f64::INFINITY;
    let mut closest_cluster = 0;

    for (cluster_idx, centroid) in centroids.outer_iter().enumerate() {
        let distance = squared_distance(point, &centroid);
        if distance < min_distance {
            min_distance = distance;
            closest_cluster = cluster_idx;
        }
    }

    closest_cluster
}

/// Compute within-cluster sum of squares (inertia)
fn compute_inertia(
    data: &ArrayView2<f64>,
    labels: &Array1<usize>,
    centroids: &ArrayView2<f64>,
) -> f64 {
    data.outer_iter()
        .zip(labels.iter())
        .map(|(point, &cluster)| squared_distance(&point, &centroids.row(cluster)))
        .sum()
}

/// Davies-Bouldin index of a labelling.
///
/// For every non-empty cluster the worst ratio `(s_i + s_j) / d(c_i, c_j)`
/// over the other clusters is taken, where `s` is the mean distance of the
/// members to their centroid; the index is the mean of those worst ratios.
/// Coincident centroids contribute 0.
pub fn davies_bouldin_score(
    data: &ArrayView2<f64>,
    labels: &Array1<usize>,
    n_clusters: usize,
) -> crate::Result<f64> {
    let n_features = data.ncols();
    let mut sums: Array2<f64> = Array2::zeros((n_clusters, n_features));
    let mut counts = vec![0usize; n_clusters];

    for (point, &label) in data.outer_iter().zip(labels.iter()) {
        let mut sum = sums.row_mut(label);
        sum += &point;
        counts[label] += 1;
    }

    let populated: Vec<usize> = (0..n_clusters).filter(|&c| counts[c] > 0).collect();
    if populated.len() < 2 {
        return Err(SegmentError::InsufficientData(format!(
            "Davies-Bouldin index needs at least 2 non-empty clusters, got {}",
            populated.len()
        )));
    }

    let mut centroids = sums;
    for (mut centroid, &count) in centroids.outer_iter_mut().zip(counts.iter()) {
        if count > 0 {
            centroid /= count as f64;
        }
    }

    let mut scatter = vec![0.0f64; n_clusters];
    for (point, &label) in data.outer_iter().zip(labels.iter()) {
        scatter[label] += squared_distance(&point, &centroids.row(label)).sqrt();
    }
    for &c in &populated {
        scatter[c] /= counts[c] as f64;
    }

    let mut total = 0.0;
    for &i in &populated {
        let worst = populated
            .iter()
            .filter(|&&j| j != i)
            .map(|&j| {
                let separation = squared_distance(&centroids.row(i), &centroids.row(j)).sqrt();
                if separation > 0.0 {
                    (scatter[i] + scatter[j]) / separation
                } else {
                    0.0
                }
            })
            .fold(0.0f64, f64::max);
        total += worst;
    }

    Ok(total / populated.len() as f64)
}

fn squared_distance(a: &ArrayView1<f64>, b: &ArrayView1<f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y).powi(2)).sum()
}
