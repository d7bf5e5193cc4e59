//! Style clustering.
//!
//! Tracks with a complete feature vector are standardized, projected onto
//! their leading principal axes and partitioned with k-means. Every call
//! fits its own scaler, projection and centroids; nothing carries over
//! between calls.

use log::debug;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{ClusterError, ClusterResult};
use crate::models::{ClusterSummary, FeatureColumn, PipelineConfig, SampleTrack, Track};

pub const DEFAULT_SEED: u64 = 42;
pub const DEFAULT_RESTARTS: usize = 10;
const MAX_ITERATIONS: usize = 300;
const RELATIVE_TOLERANCE: f64 = 1e-4;
const SAMPLE_TRACK_COUNT: usize = 3;

/// Groups tracks into music-style clusters
pub struct StyleClusterer {
    feature_columns: Vec<FeatureColumn>,
    max_components: usize,
    restarts: usize,
    seed: u64,
}

impl StyleClusterer {
    pub fn new(feature_columns: Vec<FeatureColumn>, max_components: usize) -> Self {
        Self {
            feature_columns,
            max_components,
            restarts: DEFAULT_RESTARTS,
            seed: DEFAULT_SEED,
        }
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.feature_columns.clone(), config.pca_components)
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Feature vector for a track, `None` if any configured feature is missing
    pub fn feature_vector(&self, track: &Track) -> Option<Vec<f64>> {
        self.feature_columns
            .iter()
            .map(|column| column.value(track))
            .collect()
    }

    /// Partition tracks into `k` style clusters.
    ///
    /// Tracks missing any configured feature are left out of the result.
    /// The returned tracks are ordered by cluster ID, then by input order;
    /// summaries are ordered by cluster ID.
    pub fn cluster(&self, tracks: Vec<Track>, k: usize) -> ClusterResult<(Vec<Track>, Vec<ClusterSummary>)> {
        let total = tracks.len();
        let (eligible, rows): (Vec<Track>, Vec<Vec<f64>>) = tracks
            .into_iter()
            .filter_map(|track| self.feature_vector(&track).map(|row| (track, row)))
            .unzip();

        if rows.is_empty() {
            return Err(ClusterError::InsufficientData);
        }
        if k == 0 || k > rows.len() {
            return Err(ClusterError::InvalidClusterCount {
                requested: k,
                available: rows.len(),
            });
        }
        debug!(
            "Clustering {} of {} tracks on {} features",
            rows.len(),
            total,
            self.feature_columns.len()
        );

        let scaled = standardize(&rows);
        let components = self
            .max_components
            .min(rows.len())
            .min(self.feature_columns.len())
            .max(1);
        let projected = project(&scaled, components);
        let labels = kmeans(&projected, k, self.restarts, self.seed);

        let mut labeled: Vec<Track> = eligible
            .into_iter()
            .zip(labels)
            .map(|(mut track, label)| {
                track.cluster = Some(label);
                track
            })
            .collect();
        // Stable sort keeps input order within each cluster
        labeled.sort_by_key(|track| track.cluster);

        let mut summaries = Vec::new();
        for cluster_id in 0..k {
            let members: Vec<&Track> = labeled
                .iter()
                .filter(|track| track.cluster == Some(cluster_id))
                .collect();
            if !members.is_empty() {
                summaries.push(self.summarize(cluster_id, &members));
            }
        }

        Ok((labeled, summaries))
    }

    fn summarize(&self, cluster_id: usize, members: &[&Track]) -> ClusterSummary {
        let avg_features = self
            .feature_columns
            .iter()
            .map(|column| {
                let values: Vec<f64> = members.iter().filter_map(|t| column.value(t)).collect();
                (*column, mean(&values).unwrap_or(0.0))
            })
            .collect();

        let popularities: Vec<f64> = members.iter().filter_map(|t| t.popularity).map(f64::from).collect();
        let durations: Vec<f64> = members.iter().filter_map(|t| t.duration_ms).map(f64::from).collect();
        let energies: Vec<f64> = members.iter().filter_map(|t| t.name_energy).collect();
        let years: Vec<i32> = members.iter().filter_map(|t| t.release_year).collect();
        let mean_year = mean(&years.iter().map(|y| f64::from(*y)).collect::<Vec<_>>());

        let avg_popularity = mean(&popularities);
        let style_description = describe_style(&StyleProfile {
            popularity: avg_popularity,
            release_year: mean_year,
            name_energy: mean(&energies),
            duration_ms: mean(&durations),
        });

        ClusterSummary {
            cluster_id,
            size: members.len(),
            style_description,
            avg_features,
            sample_tracks: members
                .iter()
                .take(SAMPLE_TRACK_COUNT)
                .map(|t| SampleTrack {
                    name: t.name.clone(),
                    artist: t.artist.clone(),
                })
                .collect(),
            avg_popularity,
            total_duration_min: durations.iter().sum::<f64>() / 60_000.0,
            era_start: years.iter().min().copied(),
            era_end: years.iter().max().copied(),
        }
    }
}

/// Cluster-level averages the style label is built from
#[derive(Debug, Clone, Default)]
pub struct StyleProfile {
    pub popularity: Option<f64>,
    pub release_year: Option<f64>,
    pub name_energy: Option<f64>,
    pub duration_ms: Option<f64>,
}

/// Assemble a style label from popularity, era, energy and length, in that
/// order. "Mixed style" when nothing stands out.
pub fn describe_style(profile: &StyleProfile) -> String {
    let mut elements = Vec::new();

    match profile.popularity {
        Some(p) if p > 70.0 => elements.push("Mainstream"),
        Some(p) if p < 40.0 => elements.push("Underground"),
        _ => {}
    }

    match profile.release_year {
        Some(y) if y >= 2015.0 => elements.push("modern"),
        Some(y) if y < 2000.0 => elements.push("retro"),
        Some(_) => elements.push("2000s-era"),
        None => {}
    }

    match profile.name_energy {
        Some(e) if e > 0.6 => elements.push("high-energy"),
        Some(e) if e < 0.4 => elements.push("mellow"),
        _ => {}
    }

    match profile.duration_ms {
        Some(d) if d > 300_000.0 => elements.push("extended"),
        Some(d) if d < 180_000.0 => elements.push("short"),
        _ => {}
    }

    if elements.is_empty() {
        "Mixed style".to_string()
    } else {
        elements.join(" ")
    }
}

fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        None
    } else {
        Some(values.iter().sum::<f64>() / values.len() as f64)
    }
}

/// Scale every column to zero mean and unit variance.
/// Constant columns become all zeros.
pub fn standardize(rows: &[Vec<f64>]) -> Vec<Vec<f64>> {
    let n = rows.len() as f64;
    let dims = rows.first().map_or(0, Vec::len);

    let means: Vec<f64> = (0..dims)
        .map(|j| rows.iter().map(|r| r[j]).sum::<f64>() / n)
        .collect();
    let stds: Vec<f64> = (0..dims)
        .map(|j| {
            let variance = rows.iter().map(|r| (r[j] - means[j]).powi(2)).sum::<f64>() / n;
            let std = variance.sqrt();
            if std > f64::EPSILON {
                std
            } else {
                1.0
            }
        })
        .collect();

    rows.iter()
        .map(|r| (0..dims).map(|j| (r[j] - means[j]) / stds[j]).collect())
        .collect()
}

/// Project centered rows onto their `components` leading principal axes
pub fn project(rows: &[Vec<f64>], components: usize) -> Vec<Vec<f64>> {
    let dims = rows.first().map_or(0, Vec::len);
    let denominator = (rows.len().max(2) - 1) as f64;

    let mut covariance = vec![vec![0.0; dims]; dims];
    for row in rows {
        for i in 0..dims {
            for j in 0..dims {
                covariance[i][j] += row[i] * row[j];
            }
        }
    }
    for row in covariance.iter_mut() {
        for value in row.iter_mut() {
            *value /= denominator;
        }
    }

    let (eigenvalues, eigenvectors) = symmetric_eigen(covariance);

    let mut order: Vec<usize> = (0..dims).collect();
    order.sort_by(|&a, &b| eigenvalues[b].total_cmp(&eigenvalues[a]));
    let axes: Vec<usize> = order.into_iter().take(components.min(dims)).collect();

    rows.iter()
        .map(|row| {
            axes.iter()
                .map(|&axis| (0..dims).map(|j| row[j] * eigenvectors[j][axis]).sum())
                .collect()
        })
        .collect()
}

/// Eigen-decomposition of a symmetric matrix by cyclic Jacobi rotations.
///
/// Returns the eigenvalues and a matrix whose columns are the matching unit
/// eigenvectors, each signed so its largest component is positive.
pub fn symmetric_eigen(mut a: Vec<Vec<f64>>) -> (Vec<f64>, Vec<Vec<f64>>) {
    let n = a.len();
    let mut v = vec![vec![0.0; n]; n];
    for (i, row) in v.iter_mut().enumerate() {
        row[i] = 1.0;
    }

    for _sweep in 0..100 {
        let off_diagonal: f64 = (0..n)
            .flat_map(|p| ((p + 1)..n).map(move |q| (p, q)))
            .map(|(p, q)| a[p][q] * a[p][q])
            .sum();
        if off_diagonal < 1e-22 {
            break;
        }

        for p in 0..n {
            for q in (p + 1)..n {
                if a[p][q].abs() < f64::MIN_POSITIVE {
                    continue;
                }
                let theta = (a[q][q] - a[p][p]) / (2.0 * a[p][q]);
                let sign = if theta >= 0.0 { 1.0 } else { -1.0 };
                let t = sign / (theta.abs() + (theta * theta + 1.0).sqrt());
                let c = 1.0 / (t * t + 1.0).sqrt();
                let s = t * c;

                for k in 0..n {
                    let (akp, akq) = (a[k][p], a[k][q]);
                    a[k][p] = c * akp - s * akq;
                    a[k][q] = s * akp + c * akq;
                }
                for k in 0..n {
                    let (apk, aqk) = (a[p][k], a[q][k]);
                    a[p][k] = c * apk - s * aqk;
                    a[q][k] = s * apk + c * aqk;
                }
                for row in v.iter_mut() {
                    let (vkp, vkq) = (row[p], row[q]);
                    row[p] = c * vkp - s * vkq;
                    row[q] = s * vkp + c * vkq;
                }
            }
        }
    }

    for col in 0..n {
        let dominant = (0..n)
            .max_by(|&i, &j| v[i][col].abs().total_cmp(&v[j][col].abs()))
            .unwrap_or(0);
        if v[dominant][col] < 0.0 {
            for row in v.iter_mut() {
                row[col] = -row[col];
            }
        }
    }

    let eigenvalues = (0..n).map(|i| a[i][i]).collect();
    (eigenvalues, v)
}

fn squared_distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| (x - y).powi(2)).sum()
}

fn nearest(point: &[f64], centroids: &[Vec<f64>]) -> (usize, f64) {
    let mut best = (0, f64::INFINITY);
    for (index, centroid) in centroids.iter().enumerate() {
        let distance = squared_distance(point, centroid);
        if distance < best.1 {
            best = (index, distance);
        }
    }
    best
}

/// k-means++ seeding
fn initial_centroids(points: &[Vec<f64>], k: usize, rng: &mut StdRng) -> Vec<Vec<f64>> {
    let mut centroids = vec![points[rng.gen_range(0..points.len())].clone()];

    while centroids.len() < k {
        let distances: Vec<f64> = points.iter().map(|p| nearest(p, &centroids).1).collect();
        let total: f64 = distances.iter().sum();

        let next = if total > 0.0 {
            let mut target = rng.gen::<f64>() * total;
            let mut chosen = points.len() - 1;
            for (index, distance) in distances.iter().enumerate() {
                if target < *distance {
                    chosen = index;
                    break;
                }
                target -= distance;
            }
            chosen
        } else {
            rng.gen_range(0..points.len())
        };
        centroids.push(points[next].clone());
    }

    centroids
}

/// Lloyd iterations from the given centroids; returns labels and inertia
fn lloyd(points: &[Vec<f64>], mut centroids: Vec<Vec<f64>>, tolerance: f64) -> (Vec<usize>, f64) {
    let k = centroids.len();
    let dims = points[0].len();
    let mut labels = vec![0; points.len()];

    for _ in 0..MAX_ITERATIONS {
        let mut distances = vec![0.0; points.len()];
        for (i, point) in points.iter().enumerate() {
            let (label, distance) = nearest(point, &centroids);
            labels[i] = label;
            distances[i] = distance;
        }

        let mut sums = vec![vec![0.0; dims]; k];
        let mut counts = vec![0usize; k];
        for (point, &label) in points.iter().zip(&labels) {
            counts[label] += 1;
            for (sum, value) in sums[label].iter_mut().zip(point) {
                *sum += value;
            }
        }

        let mut updated: Vec<Vec<f64>> = sums
            .into_iter()
            .zip(&counts)
            .map(|(sum, &count)| {
                if count > 0 {
                    sum.into_iter().map(|s| s / count as f64).collect()
                } else {
                    Vec::new()
                }
            })
            .collect();

        // Empty clusters take over the point that is worst served
        for cluster in 0..k {
            if counts[cluster] == 0 {
                let farthest = (0..points.len())
                    .max_by(|&a, &b| distances[a].total_cmp(&distances[b]))
                    .unwrap_or(0);
                distances[farthest] = 0.0;
                updated[cluster] = points[farthest].clone();
            }
        }

        let shift: f64 = centroids
            .iter()
            .zip(&updated)
            .map(|(old, new)| squared_distance(old, new))
            .sum();
        centroids = updated;
        if shift <= tolerance {
            break;
        }
    }

    let mut inertia = 0.0;
    for (i, point) in points.iter().enumerate() {
        let (label, distance) = nearest(point, &centroids);
        labels[i] = label;
        inertia += distance;
    }
    (labels, inertia)
}

/// Seeded k-means with restarts, keeping the lowest-inertia labelling.
/// Callers guarantee `1 <= k <= points.len()`.
pub fn kmeans(points: &[Vec<f64>], k: usize, restarts: usize, seed: u64) -> Vec<usize> {
    let dims = points[0].len();
    let n = points.len() as f64;
    let mean_variance = if dims == 0 {
        0.0
    } else {
        (0..dims)
            .map(|j| {
                let m = points.iter().map(|p| p[j]).sum::<f64>() / n;
                points.iter().map(|p| (p[j] - m).powi(2)).sum::<f64>() / n
            })
            .sum::<f64>()
            / dims as f64
    };
    let tolerance = RELATIVE_TOLERANCE * mean_variance;

    let mut rng = StdRng::seed_from_u64(seed);
    let mut best: Option<(Vec<usize>, f64)> = None;

    for _ in 0..restarts.max(1) {
        let centroids = initial_centroids(points, k, &mut rng);
        let (labels, inertia) = lloyd(points, centroids, tolerance);
        if best.as_ref().map_or(true, |(_, best_inertia)| inertia < *best_inertia) {
            best = Some((labels, inertia));
        }
    }

    best.map(|(labels, _)| labels).unwrap_or_else(|| vec![0; points.len()])
}
