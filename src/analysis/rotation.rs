//! Varimax and promax rotation of retained loadings.
//!
//! Both work on a variables × components matrix with Kaiser row
//! normalization; callers pass tagged [`Loadings`] and get the same layout
//! back.

use log::debug;
use nalgebra::DMatrix;

use super::decomposition::Loadings;
use crate::config::RotationMethod;
use crate::error::RotationError;

const MAX_ITER: usize = 500;
const TOLERANCE: f64 = 1e-5;
const PROMAX_POWER: i32 = 4;

/// Rotate `loadings` with `method`. `RotationMethod::None` returns a copy.
///
/// The result keeps the input's orientation and labels.
pub fn rotate(loadings: &Loadings, method: RotationMethod) -> Result<Loadings, RotationError> {
    if method == RotationMethod::None {
        return Ok(loadings.clone());
    }
    if loadings.is_empty() {
        return Err(RotationError::EmptyLoadings);
    }
    if loadings.matrix.iter().all(|&v| v == 0.0) {
        return Err(RotationError::AllZeroLoadings);
    }
    if loadings.n_components() < 2 {
        return Err(RotationError::TooFewComponents(loadings.n_components()));
    }

    let vm = loadings.to_variable_major();
    debug!("Applying {method} rotation to shape {:?}", vm.matrix.shape());
    let rotated = match method {
        RotationMethod::Varimax => varimax(&vm.matrix)?,
        RotationMethod::Promax => promax(&vm.matrix)?,
        RotationMethod::None => vm.matrix.clone(),
    };
    if let Some(i) = rotated.iter().position(|v| !v.is_finite()) {
        return Err(RotationError::Degenerate(i % rotated.nrows()));
    }

    let rotated = Loadings {
        matrix: rotated,
        ..vm
    };
    Ok(rotated.to_orientation(loadings.orientation))
}

/// Row norms for Kaiser normalization; all-zero rows keep a norm of 1.
fn row_norms(x: &DMatrix<f64>) -> Vec<f64> {
    x.row_iter()
        .map(|r| {
            let norm = r.norm();
            if norm > 0.0 {
                norm
            } else {
                1.0
            }
        })
        .collect()
}

fn scale_rows(x: &DMatrix<f64>, factors: &[f64], divide: bool) -> DMatrix<f64> {
    DMatrix::from_fn(x.nrows(), x.ncols(), |r, c| {
        if divide {
            x[(r, c)] / factors[r]
        } else {
            x[(r, c)] * factors[r]
        }
    })
}

/// Orthogonal varimax rotation (Kaiser normalized).
pub fn varimax(loadings: &DMatrix<f64>) -> Result<DMatrix<f64>, RotationError> {
    let (x, _) = varimax_with_rotation(loadings)?;
    Ok(x)
}

fn varimax_with_rotation(
    loadings: &DMatrix<f64>,
) -> Result<(DMatrix<f64>, DMatrix<f64>), RotationError> {
    let (n_rows, n_cols) = loadings.shape();
    let norms = row_norms(loadings);
    let x = scale_rows(loadings, &norms, true);

    let mut rotation = DMatrix::<f64>::identity(n_cols, n_cols);
    let mut d = 0.0;
    let mut converged = false;
    for iter in 0..MAX_ITER {
        let old_d = d;
        let basis = &x * &rotation;
        let column_ss: Vec<f64> = basis
            .column_iter()
            .map(|c| c.iter().map(|v| v * v).sum())
            .collect();
        let target = DMatrix::from_fn(n_rows, n_cols, |r, c| {
            let b = basis[(r, c)];
            b.powi(3) - b * column_ss[c] / n_rows as f64
        });
        let transformed = x.transpose() * target;
        let svd = transformed
            .try_svd(true, true, f64::EPSILON, 0)
            .ok_or(RotationError::NotConverged(iter))?;
        let (Some(u), Some(v_t)) = (svd.u, svd.v_t) else {
            return Err(RotationError::NotConverged(iter));
        };
        rotation = u * v_t;
        d = svd.singular_values.sum();
        if old_d != 0.0 && d / old_d < 1.0 + TOLERANCE {
            debug!("Varimax converged after {} iterations", iter + 1);
            converged = true;
            break;
        }
    }
    if !converged {
        return Err(RotationError::NotConverged(MAX_ITER));
    }

    let rotated = scale_rows(&(&x * &rotation), &norms, false);
    Ok((rotated, rotation))
}

/// Oblique promax rotation: varimax followed by a power target fit.
pub fn promax(loadings: &DMatrix<f64>) -> Result<DMatrix<f64>, RotationError> {
    let norms = row_norms(loadings);
    let weights = scale_rows(loadings, &norms, true);
    let (x, _) = varimax_with_rotation(&weights)?;

    let target = x.map(|v| v * v.abs().powi(PROMAX_POWER - 1));
    let xtx_inv = (x.transpose() * &x)
        .try_inverse()
        .ok_or(RotationError::Singular)?;
    let coef = xtx_inv * x.transpose() * target;

    let scale_inv = (coef.transpose() * &coef)
        .try_inverse()
        .ok_or(RotationError::Singular)?;
    let scale = DMatrix::from_diagonal(&scale_inv.diagonal().map(f64::sqrt));
    let coef = coef * scale;

    let z = &x * coef;
    Ok(scale_rows(&z, &norms, false))
}
