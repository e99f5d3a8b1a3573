use nalgebra::{DMatrix, DVector};

use crate::types::*;

/// Gauss-Newton normal equations `hessian * z = bias`.
///
/// The Hessian is accumulated on its upper triangle only; call `symmetrize`
/// before `solve`.
#[derive(Clone, Debug)]
pub struct NormalEquation<const N: usize> {
    pub hessian: SMatrix<N, N>,
    pub bias: SVector<N>,
}

impl<const N: usize> Default for NormalEquation<N> {
    fn default() -> Self {
        Self { hessian: SMatrix::zeros(), bias: SVector::zeros() }
    }
}

impl<const N: usize> NormalEquation<N> {
    pub fn reset(&mut self) {
        self.hessian.fill(0.0);
        self.bias.fill(0.0);
    }

    pub fn reset_bias(&mut self) {
        self.bias.fill(0.0);
    }

    /// Add one residual: upper triangle of `J * J^T` to the Hessian, `-J * r` to the bias.
    #[inline]
    pub fn accumulate(&mut self, jacobian: &SVector<N>, residual: Float) {
        self.accumulate_hessian(jacobian);
        self.accumulate_bias(jacobian, residual);
    }

    #[inline]
    pub fn accumulate_hessian(&mut self, jacobian: &SVector<N>) {
        for i in 0..N {
            for j in i..N {
                self.hessian[(i, j)] += jacobian[i] * jacobian[j];
            }
        }
    }

    #[inline]
    pub fn accumulate_bias(&mut self, jacobian: &SVector<N>, residual: Float) {
        self.bias.axpy(-residual, jacobian, 1.0);
    }

    /// Mirror the upper triangle into the lower one.
    pub fn symmetrize(&mut self) {
        for i in 0..N {
            for j in (i + 1)..N {
                self.hessian[(j, i)] = self.hessian[(i, j)];
            }
        }
    }

    /// Solve for the increment.
    ///
    /// Positive definite systems go through Cholesky. Semidefinite ones fall back to the
    /// SVD pseudo-inverse, which leaves unobservable directions at zero. Non-finite
    /// inputs give a NaN increment.
    pub fn solve(&self) -> SVector<N> {
        let nan = SVector::<N>::from_element(Float::NAN);
        if !self.hessian.iter().chain(self.bias.iter()).all(|v| v.is_finite()) {
            return nan;
        }

        if let Some(cholesky) = self.hessian.cholesky() {
            return cholesky.solve(&self.bias);
        }

        // The SVD runs on a dynamic copy; it is not available for a generic `Const<N>`.
        let hessian = DMatrix::<Float>::from_iterator(N, N, self.hessian.iter().cloned());
        let bias = DVector::<Float>::from_iterator(N, self.bias.iter().cloned());
        let Some(svd) = hessian.try_svd(true, true, Float::EPSILON, 200) else {
            return nan;
        };
        let largest = svd.singular_values.max();
        let eps = largest * Float::EPSILON * (N as Float);
        match svd.solve(&bias, eps) {
            Ok(z) => SVector::<N>::from_iterator(z.iter().cloned()),
            Err(_) => nan,
        }
    }
}
