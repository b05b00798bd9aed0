use linfa::Float;
use linfa_linalg::cholesky::*;
use linfa_linalg::triangular::*;
use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::errors::{GpError, Result};

/// Jitter ladder climbed when the Gram matrix fails to factorize.
pub(crate) const JITTER_LADDER: [f64; 4] = [1e-10, 1e-8, 1e-6, 1e-4];

/// Cholesky factorization with a jitter ladder: on failure, `eps * I` is
/// added to the diagonal for increasing `eps` until the factorization
/// succeeds or the ladder is exhausted.
pub(crate) fn cholesky_with_jitter<F: Float>(k: &Array2<F>) -> Result<Array2<F>> {
    if let Ok(l) = k.cholesky() {
        return Ok(l);
    }
    for eps in JITTER_LADDER {
        let mut jittered = k.to_owned();
        jittered
            .diag_mut()
            .mapv_inplace(|v| v + F::cast(eps));
        if let Ok(l) = jittered.cholesky() {
            log::debug!("Gram matrix factorized with jitter {eps:e}");
            return Ok(l);
        }
    }
    Err(GpError::NonPositiveDefinite {
        max_jitter: JITTER_LADDER[JITTER_LADDER.len() - 1],
    })
}

/// Solve `L x = b` for a lower-triangular `L` and a vector `b`.
pub(crate) fn solve_lower_vec<F: Float>(l: &ArrayView2<F>, b: &Array1<F>) -> Result<Array1<F>> {
    let rhs = b.view().insert_axis(Axis(1)).to_owned();
    let sol = l.solve_triangular(&rhs, UPLO::Lower)?;
    Ok(sol.remove_axis(Axis(1)))
}

/// Solve `L L^T x = b` through two triangular back-solves; `K^{-1}` is
/// never formed.
pub(crate) fn cholesky_solve_vec<F: Float>(l: &ArrayView2<F>, b: &Array1<F>) -> Result<Array1<F>> {
    let rhs = b.view().insert_axis(Axis(1)).to_owned();
    let fwd = l.solve_triangular(&rhs, UPLO::Lower)?;
    let sol = l.t().solve_triangular_into(fwd, UPLO::Upper)?;
    Ok(sol.remove_axis(Axis(1)))
}

/// Solve `L L^T X = B` for a matrix right-hand side.
pub(crate) fn cholesky_solve_mat<F: Float>(l: &ArrayView2<F>, b: &Array2<F>) -> Result<Array2<F>> {
    let fwd = l.solve_triangular(b, UPLO::Lower)?;
    Ok(l.t().solve_triangular_into(fwd, UPLO::Upper)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn test_cholesky_solve_vec() {
        let k = array![[4., 2.], [2., 3.]];
        let l = cholesky_with_jitter(&k).unwrap();
        assert_abs_diff_eq!(l.dot(&l.t()), k, epsilon = 1e-12);

        let b = array![1., 2.];
        let x = cholesky_solve_vec(&l.view(), &b).unwrap();
        assert_abs_diff_eq!(k.dot(&x), b, epsilon = 1e-12);
    }

    #[test]
    fn test_jitter_ladder_rescues_semidefinite() {
        // rank-one matrix, singular without jitter
        let k = array![[1., 1.], [1., 1.]];
        let l = cholesky_with_jitter(&k).unwrap();
        assert_abs_diff_eq!(l.dot(&l.t()), k, epsilon = 1e-3);
    }

    #[test]
    fn test_solve_lower_vec() {
        let l = array![[2., 0.], [1., 3.]];
        let b = array![2., 7.];
        let x = solve_lower_vec(&l.view(), &b).unwrap();
        assert_abs_diff_eq!(x, array![1., 2.], epsilon = 1e-12);
    }
}
