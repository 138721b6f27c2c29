use log::{debug, info};
use nalgebra::DMatrix;
use serde::Serialize;

use crate::data::model::NumericMatrix;
use crate::error::PcaCalculationError;

// ---------------------------------------------------------------------------
// Loadings with an explicit orientation tag
// ---------------------------------------------------------------------------

/// Physical layout of a loadings matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Orientation {
    /// Rows are variables, columns are components.
    VariableMajor,
    /// Rows are components, columns are variables.
    ComponentMajor,
}

impl Orientation {
    pub fn flipped(self) -> Self {
        match self {
            Orientation::VariableMajor => Orientation::ComponentMajor,
            Orientation::ComponentMajor => Orientation::VariableMajor,
        }
    }

    /// Orientation of an untagged `rows × cols` matrix over `n_variables`
    /// variables. The variable count decides whenever it matches exactly one
    /// axis; otherwise a matrix with fewer rows than columns is taken to be
    /// component-major.
    pub fn infer(rows: usize, cols: usize, n_variables: usize) -> Self {
        match (rows == n_variables, cols == n_variables) {
            (true, false) => Orientation::VariableMajor,
            (false, true) => Orientation::ComponentMajor,
            _ if rows < cols => Orientation::ComponentMajor,
            _ => Orientation::VariableMajor,
        }
    }
}

/// Loadings matrix carrying its own orientation and axis labels.
#[derive(Debug, Clone, PartialEq)]
pub struct Loadings {
    pub matrix: DMatrix<f64>,
    pub orientation: Orientation,
    pub variables: Vec<String>,
    pub components: Vec<String>,
}

impl Loadings {
    pub fn variable_major(matrix: DMatrix<f64>, variables: Vec<String>) -> Self {
        let components = component_labels(matrix.ncols());
        Loadings {
            matrix,
            orientation: Orientation::VariableMajor,
            variables,
            components,
        }
    }

    /// Tag a bare matrix using [`Orientation::infer`].
    pub fn from_unlabelled(matrix: DMatrix<f64>, variables: Vec<String>) -> Self {
        let orientation = Orientation::infer(matrix.nrows(), matrix.ncols(), variables.len());
        let n_components = match orientation {
            Orientation::VariableMajor => matrix.ncols(),
            Orientation::ComponentMajor => matrix.nrows(),
        };
        Loadings {
            matrix,
            orientation,
            variables,
            components: component_labels(n_components),
        }
    }

    pub fn n_variables(&self) -> usize {
        self.variables.len()
    }

    pub fn n_components(&self) -> usize {
        self.components.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matrix.is_empty()
    }

    /// Loading of `variable` on `component`, whatever the layout.
    pub fn get(&self, variable: usize, component: usize) -> f64 {
        match self.orientation {
            Orientation::VariableMajor => self.matrix[(variable, component)],
            Orientation::ComponentMajor => self.matrix[(component, variable)],
        }
    }

    pub fn transposed(&self) -> Self {
        Loadings {
            matrix: self.matrix.transpose(),
            orientation: self.orientation.flipped(),
            variables: self.variables.clone(),
            components: self.components.clone(),
        }
    }

    pub fn to_variable_major(&self) -> Self {
        match self.orientation {
            Orientation::VariableMajor => self.clone(),
            Orientation::ComponentMajor => self.transposed(),
        }
    }

    pub fn to_orientation(&self, orientation: Orientation) -> Self {
        if self.orientation == orientation {
            self.clone()
        } else {
            self.transposed()
        }
    }
}

fn component_labels(n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("PC{i}")).collect()
}

// ---------------------------------------------------------------------------
// Principal component analysis
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DecompositionOptions {
    /// Cumulative explained variance the retained components must reach.
    pub variance_threshold: f64,
    /// Fail when fewer components than this are retained.
    pub min_components: usize,
}

impl Default for DecompositionOptions {
    fn default() -> Self {
        DecompositionOptions {
            variance_threshold: 0.80,
            min_components: 1,
        }
    }
}

/// Outcome of a PCA fit on standardized columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Decomposition {
    /// Components needed to reach the variance threshold.
    pub n_components: usize,
    /// One ratio per computed component, not only the retained ones.
    pub explained_variance_ratio: Vec<f64>,
    pub cumulative_variance: Vec<f64>,
    /// Variables × retained components.
    pub loadings: Loadings,
    /// Samples × retained components.
    pub scores: DMatrix<f64>,
}

/// 1-based number of components whose cumulative variance first reaches
/// `threshold`; every component when it is never reached.
pub fn components_for_threshold(cumulative: &[f64], threshold: f64) -> usize {
    const TOLERANCE: f64 = 1e-12;
    cumulative
        .iter()
        .position(|&c| c + TOLERANCE >= threshold)
        .map_or(cumulative.len(), |i| i + 1)
}

/// Fit a PCA on `matrix` after scaling each column to zero mean and unit
/// variance.
///
/// The solver is a symmetric eigendecomposition of the correlation matrix,
/// which has no random initialisation; eigenvector signs are fixed so the
/// largest-magnitude loading of each component is positive.
pub fn fit(
    matrix: &NumericMatrix,
    options: &DecompositionOptions,
) -> Result<Decomposition, PcaCalculationError> {
    let (n, p) = matrix.shape();
    if n < 2 {
        return Err(PcaCalculationError::InsufficientSamples { samples: n });
    }
    if p == 0 {
        return Err(PcaCalculationError::NoFeatures);
    }
    if let Some(i) = matrix.data.iter().position(|v| !v.is_finite()) {
        // column-major storage
        return Err(PcaCalculationError::NonFiniteInput {
            row: i % n,
            column: matrix.columns[i / n].clone(),
        });
    }

    let z = standardize(&matrix.data);
    let cov = (z.transpose() * &z) / (n - 1) as f64;
    if cov.iter().any(|v| !v.is_finite()) {
        return Err(PcaCalculationError::Decomposition(
            "correlation matrix has non-finite entries".to_string(),
        ));
    }
    let eigen = cov.symmetric_eigen();

    let mut order: Vec<usize> = (0..p).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));

    let eigenvalues: Vec<f64> = order.iter().map(|&i| eigen.eigenvalues[i].max(0.0)).collect();
    let total: f64 = eigenvalues.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        return Err(PcaCalculationError::Decomposition(
            "the standardized data has zero total variance".to_string(),
        ));
    }

    let k = n.min(p);
    let explained_variance_ratio: Vec<f64> = eigenvalues[..k].iter().map(|l| l / total).collect();
    let cumulative_variance: Vec<f64> = explained_variance_ratio
        .iter()
        .scan(0.0, |acc, r| {
            *acc += r;
            Some(acc.min(1.0))
        })
        .collect();

    let n_components = components_for_threshold(&cumulative_variance, options.variance_threshold);
    debug!("Explained variance ratio: {explained_variance_ratio:?}");
    info!(
        "Retained {n_components} of {k} components for {:.0}% variance",
        options.variance_threshold * 100.0
    );
    if n_components < options.min_components {
        return Err(PcaCalculationError::TooFewComponents {
            found: n_components,
            required: options.min_components,
        });
    }

    let mut vectors = DMatrix::<f64>::zeros(p, n_components);
    for (j, &src) in order.iter().take(n_components).enumerate() {
        let mut column = eigen.eigenvectors.column(src).into_owned();
        let pivot = column
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .unwrap_or(0.0);
        if pivot < 0.0 {
            column.neg_mut();
        }
        vectors.set_column(j, &column);
    }
    let scores = &z * &vectors;

    Ok(Decomposition {
        n_components,
        explained_variance_ratio,
        cumulative_variance,
        loadings: Loadings::variable_major(vectors, matrix.columns.clone()),
        scores,
    })
}

/// Zero mean, unit (population) variance per column. Constant columns are
/// centred only. Each column is first divided by its largest magnitude,
/// which leaves the result unchanged but keeps huge values from overflowing.
fn standardize(data: &DMatrix<f64>) -> DMatrix<f64> {
    let n = data.nrows() as f64;
    let mut z = data.clone();
    for mut col in z.column_iter_mut() {
        let max_abs = col.iter().fold(0.0_f64, |a, v| a.max(v.abs()));
        if max_abs > 0.0 {
            col.apply(|v| *v /= max_abs);
        }
        let mean = col.sum() / n;
        let var = col.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        let scale = if var > 0.0 { var.sqrt() } else { 1.0 };
        col.apply(|v| *v = (*v - mean) / scale);
    }
    z
}

// ---------------------------------------------------------------------------
// Diagnostic output
// ---------------------------------------------------------------------------

/// A matrix with row and column labels, serialized row by row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelledMatrix {
    pub rows: Vec<String>,
    pub columns: Vec<String>,
    pub values: Vec<Vec<f64>>,
}

impl LabelledMatrix {
    fn new(rows: Vec<String>, columns: Vec<String>, m: &DMatrix<f64>) -> Self {
        let values = m.row_iter().map(|r| r.iter().copied().collect()).collect();
        LabelledMatrix {
            rows,
            columns,
            values,
        }
    }
}

/// Decomposition results as handed to report rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DecompositionDiagnostic {
    pub explained_variance_ratio: Vec<f64>,
    pub cumulative_variance: Vec<f64>,
    pub n_components: usize,
    /// Component-major: one row per retained component.
    pub loadings: LabelledMatrix,
    pub pca_scores: Vec<Vec<f64>>,
}

impl DecompositionDiagnostic {
    /// `loadings` may differ from `decomposition.loadings` after rotation.
    pub fn new(decomposition: &Decomposition, loadings: &Loadings) -> Self {
        let cm = loadings.to_orientation(Orientation::ComponentMajor);
        DecompositionDiagnostic {
            explained_variance_ratio: decomposition.explained_variance_ratio.clone(),
            cumulative_variance: decomposition.cumulative_variance.clone(),
            n_components: decomposition.n_components,
            loadings: LabelledMatrix::new(cm.components.clone(), cm.variables.clone(), &cm.matrix),
            pca_scores: decomposition
                .scores
                .row_iter()
                .map(|r| r.iter().copied().collect())
                .collect(),
        }
    }
}
