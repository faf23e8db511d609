//! Amplified-parameter test between Jacobians at two max lengths.

use crate::error::{Error, Result};
use ndarray::{Array1, ArrayBase, Data, Ix2};
use ndarray_linalg::SVD;
use tracing::{trace, warn};

/// Singular values below this magnitude at the shorter length are ignored.
pub const SINGULAR_VALUE_FLOOR: f64 = 0.1;

/// Singular values of `m` in descending order. Non-finite input is rejected
/// before it reaches LAPACK.
pub fn singular_values<S>(m: &ArrayBase<S, Ix2>) -> Result<Array1<f64>>
where
    S: Data<Elem = f64>,
{
    if m.is_empty() {
        return Ok(Array1::zeros((0,)));
    }
    if !m.iter().all(|x| x.is_finite()) {
        return Err(Error::NonFinite(m.dim()));
    }
    let (_, s, _) = m.svd(false, false)?;
    let mut s = s.to_vec();
    s.sort_unstable_by(|a, b| b.total_cmp(a));
    Ok(Array1::from_vec(s))
}

/// Counts parameters amplified between max lengths `l0 < l1`.
///
/// Singular values of `m0` and `m1` are paired by rank; the pair counts when
/// `|s0| > 0.1` and `(s1 / s0) / (l1 / l0) > tol`.
pub fn amplified_count_checked<S0, S1>(
    m0: &ArrayBase<S0, Ix2>,
    m1: &ArrayBase<S1, Ix2>,
    l0: usize,
    l1: usize,
    tol: f64,
) -> Result<usize>
where
    S0: Data<Elem = f64>,
    S1: Data<Elem = f64>,
{
    let l_ratio = l1 as f64 / l0 as f64;
    let s0 = singular_values(m0)?;
    let s1 = singular_values(m1)?;

    trace!(
        shape0 = ?m0.shape(),
        shape1 = ?m1.shape(),
        l0,
        l1,
        tol,
        "amplified parameter test"
    );
    let count = s0
        .iter()
        .zip(s1.iter())
        .enumerate()
        .filter(|(i, (v0, v1))| {
            let ratio = (*v1 / *v0) / l_ratio;
            let amplified = v0.abs() > SINGULAR_VALUE_FLOOR && ratio > tol;
            trace!(index = i, sv0 = v0, sv1 = v1, ratio, amplified);
            amplified
        })
        .count();
    Ok(count)
}

/// As [`amplified_count_checked`], but an SVD failure counts as no amplified parameters.
pub fn amplified_count<S0, S1>(
    m0: &ArrayBase<S0, Ix2>,
    m1: &ArrayBase<S1, Ix2>,
    l0: usize,
    l1: usize,
    tol: f64,
) -> usize
where
    S0: Data<Elem = f64>,
    S1: Data<Elem = f64>,
{
    amplified_count_checked(m0, m1, l0, l1, tol).unwrap_or_else(|e| {
        warn!(error = %e, "SVD failed, treating as zero amplified parameters");
        0
    })
}
