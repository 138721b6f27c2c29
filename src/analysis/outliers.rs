//! Isolation-forest outlier rejection (Liu, Ting & Zhou, 2008).
//!
//! Anomalous rows are isolated by fewer random splits than typical rows; a
//! row is rejected when its ensemble-averaged path length falls in the
//! shortest `contamination` fraction.

use log::{debug, info};
use nalgebra::DMatrix;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;

use crate::data::model::NumericMatrix;
use crate::error::DataProcessingError;

const EULER_GAMMA: f64 = 0.577_215_664_901_532_9;

/// Average path length of an unsuccessful BST search over `n` points.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * ((n - 1.0).ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

#[derive(Debug, Clone)]
enum Node {
    Leaf {
        size: usize,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

#[derive(Debug, Clone)]
struct IsolationTree {
    root: Node,
}

impl IsolationTree {
    fn build(data: &DMatrix<f64>, rows: Vec<usize>, height_limit: usize, rng: &mut Pcg64) -> Self {
        IsolationTree {
            root: grow(data, rows, 0, height_limit, rng),
        }
    }

    fn path_length(&self, x: &[f64]) -> f64 {
        let mut node = &self.root;
        let mut depth = 0.0;
        loop {
            match node {
                Node::Leaf { size } => return depth + average_path_length(*size),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    node = if x[*feature] <= *threshold { left } else { right };
                    depth += 1.0;
                }
            }
        }
    }
}

fn grow(
    data: &DMatrix<f64>,
    rows: Vec<usize>,
    depth: usize,
    height_limit: usize,
    rng: &mut Pcg64,
) -> Node {
    if depth >= height_limit || rows.len() <= 1 {
        return Node::Leaf { size: rows.len() };
    }

    // Only features that still vary inside this node can split it.
    let candidates: Vec<(usize, f64, f64)> = (0..data.ncols())
        .filter_map(|f| {
            let (lo, hi) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
                let v = data[(r, f)];
                (lo.min(v), hi.max(v))
            });
            (lo < hi).then_some((f, lo, hi))
        })
        .collect();
    if candidates.is_empty() {
        return Node::Leaf { size: rows.len() };
    }

    let (feature, lo, hi) = candidates[rng.random_range(0..candidates.len())];
    let span = hi - lo;
    let threshold = if span.is_finite() {
        lo + rng.random::<f64>() * span
    } else {
        // Range wider than f64::MAX.
        lo / 2.0 + hi / 2.0
    };
    let (left, right): (Vec<usize>, Vec<usize>) =
        rows.into_iter().partition(|&r| data[(r, feature)] <= threshold);

    Node::Split {
        feature,
        threshold,
        left: Box::new(grow(data, left, depth + 1, height_limit, rng)),
        right: Box::new(grow(data, right, depth + 1, height_limit, rng)),
    }
}

/// Seeded ensemble of isolation trees.
#[derive(Debug, Clone)]
pub struct IsolationForest {
    n_estimators: usize,
    max_samples: usize,
    contamination: f64,
    seed: u64,
    trees: Vec<IsolationTree>,
    sample_size: usize,
    offset: f64,
}

impl Default for IsolationForest {
    fn default() -> Self {
        Self::new()
    }
}

impl IsolationForest {
    pub fn new() -> Self {
        IsolationForest {
            n_estimators: 100,
            max_samples: 256,
            contamination: 0.05,
            seed: 42,
            trees: Vec::new(),
            sample_size: 0,
            offset: f64::NEG_INFINITY,
        }
    }

    pub fn with_n_estimators(mut self, n: usize) -> Self {
        self.n_estimators = n.max(1);
        self
    }

    pub fn with_max_samples(mut self, n: usize) -> Self {
        self.max_samples = n.max(1);
        self
    }

    pub fn with_contamination(mut self, contamination: f64) -> Self {
        self.contamination = contamination;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Grow the ensemble and set the decision offset from the training rows.
    pub fn fit(&mut self, data: &DMatrix<f64>) {
        let n = data.nrows();
        let mut rng = Pcg64::seed_from_u64(self.seed);
        self.sample_size = self.max_samples.min(n);
        let height_limit = (self.sample_size.max(2) as f64).log2().ceil() as usize;

        self.trees = (0..self.n_estimators)
            .map(|_| {
                let rows = index::sample(&mut rng, n, self.sample_size).into_vec();
                IsolationTree::build(data, rows, height_limit, &mut rng)
            })
            .collect();

        let scores = self.score_samples(data);
        self.offset = percentile(&scores, self.contamination);
        debug!(
            "Isolation forest: {} trees, {} samples per tree, offset {:.4}",
            self.trees.len(),
            self.sample_size,
            self.offset
        );
    }

    /// Negated anomaly score per row, in [-1, 0]; lower is more anomalous.
    pub fn score_samples(&self, data: &DMatrix<f64>) -> Vec<f64> {
        let norm = average_path_length(self.sample_size).max(f64::MIN_POSITIVE);
        (0..data.nrows())
            .map(|r| {
                let x: Vec<f64> = data.row(r).iter().copied().collect();
                let mean_depth = self.trees.iter().map(|t| t.path_length(&x)).sum::<f64>()
                    / self.trees.len() as f64;
                -(2f64.powf(-mean_depth / norm))
            })
            .collect()
    }

    /// `true` for inliers.
    pub fn predict(&self, data: &DMatrix<f64>) -> Vec<bool> {
        self.score_samples(data)
            .into_iter()
            .map(|s| s >= self.offset)
            .collect()
    }
}

/// Linear-interpolated quantile `q` in [0, 1].
fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return f64::NEG_INFINITY;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Rows kept by the outlier filter and how many were rejected.
#[derive(Debug, Clone, PartialEq)]
pub struct FilteredMatrix {
    pub matrix: NumericMatrix,
    pub removed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutlierOptions {
    pub contamination: f64,
    pub n_estimators: usize,
    pub max_samples: usize,
    pub seed: u64,
}

impl Default for OutlierOptions {
    fn default() -> Self {
        OutlierOptions {
            contamination: 0.05,
            n_estimators: 100,
            max_samples: 256,
            seed: 42,
        }
    }
}

/// Drop anomalous rows. The column set never changes.
///
/// Matrices with no rows, a single row, or at most one column are returned
/// unchanged.
pub fn filter_outliers(
    matrix: NumericMatrix,
    options: &OutlierOptions,
) -> Result<FilteredMatrix, DataProcessingError> {
    let (rows, cols) = matrix.shape();
    if rows < 2 || cols <= 1 {
        debug!("Skipping outlier filter for a {rows}x{cols} matrix");
        return Ok(FilteredMatrix { matrix, removed: 0 });
    }

    let mut forest = IsolationForest::new()
        .with_n_estimators(options.n_estimators)
        .with_max_samples(options.max_samples)
        .with_contamination(options.contamination)
        .with_seed(options.seed);
    forest.fit(&matrix.data);

    let keep: Vec<usize> = forest
        .predict(&matrix.data)
        .into_iter()
        .enumerate()
        .filter_map(|(i, inlier)| inlier.then_some(i))
        .collect();
    if keep.is_empty() {
        return Err(DataProcessingError::AllRowsRemoved {
            rows,
            contamination: options.contamination,
        });
    }

    let removed = rows - keep.len();
    info!("Removed {removed} outliers (kept {})", keep.len());
    Ok(FilteredMatrix {
        matrix: matrix.select_rows(&keep),
        removed,
    })
}
