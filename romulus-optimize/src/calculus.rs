use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};

/// Default step size for finite-difference Jacobian approximation.
pub const DEFAULT_FD_STEP: f64 = 1e-6;

/// The residual of a (small, dense) nonlinear algebraic system `F(x) = 0`.
///
/// Implementors fix their dimensions at construction time: `inputs()` is the
/// number of unknowns and `values()` the number of residual equations.
/// `residual` must be a pure function of `x` and whatever parameters were
/// bound to the implementor before the solve; it must not mutate external
/// state.
pub trait ResidualFunction {
    /// Number of unknowns.
    fn inputs(&self) -> usize;

    /// Number of residual equations.
    fn values(&self) -> usize;

    /// Evaluates `F(x)` into `out`.
    ///
    /// # Panics
    ///
    /// Implementations may panic if `x.len() != self.inputs()` or
    /// `out.len() != self.values()`.
    fn residual(&self, x: &DVectorView<f64>, out: &mut DVectorViewMut<f64>);

    /// Evaluates the Jacobian `J_ij = dF_i/dx_j` into `out`, which has shape
    /// `(values(), inputs())`.
    ///
    /// The default implementation approximates the Jacobian with central
    /// finite differences of `residual`.
    fn jacobian(&self, x: &DVectorView<f64>, out: &mut DMatrixViewMut<f64>) {
        approximate_jacobian_into(self, x, out, DEFAULT_FD_STEP);
    }
}

impl<F> ResidualFunction for &F
where
    F: ResidualFunction + ?Sized,
{
    fn inputs(&self) -> usize {
        F::inputs(self)
    }

    fn values(&self) -> usize {
        F::values(self)
    }

    fn residual(&self, x: &DVectorView<f64>, out: &mut DVectorViewMut<f64>) {
        F::residual(self, x, out)
    }

    fn jacobian(&self, x: &DVectorView<f64>, out: &mut DMatrixViewMut<f64>) {
        F::jacobian(self, x, out)
    }
}

/// Approximates the Jacobian of `f` evaluated at `x` using central finite
/// differences with resolution `h`.
pub fn approximate_jacobian<F>(f: &F, x: &DVector<f64>, h: f64) -> DMatrix<f64>
where
    F: ResidualFunction + ?Sized,
{
    let mut result = DMatrix::zeros(f.values(), x.len());
    approximate_jacobian_into(f, &DVectorView::from(x), &mut DMatrixViewMut::from(&mut result), h);
    result
}

/// Approximates the Jacobian of `f` evaluated at `x` using central finite
/// differences with resolution `h`, storing the result in `jacobian`.
///
/// # Panics
///
/// Panics if `jacobian` does not have shape `(f.values(), x.len())`.
pub fn approximate_jacobian_into<F>(
    f: &F,
    x: &DVectorView<f64>,
    jacobian: &mut DMatrixViewMut<f64>,
    h: f64,
) where
    F: ResidualFunction + ?Sized,
{
    let out_dim = f.values();
    let in_dim = x.len();
    assert_eq!(jacobian.nrows(), out_dim);
    assert_eq!(jacobian.ncols(), in_dim);

    // Perturbed evaluation points x+ = x + h e_j and x- = x - h e_j,
    // where e_j is the j-th standard basis vector
    let mut x_plus = x.clone_owned();
    let mut x_minus = x.clone_owned();

    let mut f_plus = DVector::zeros(out_dim);
    let mut f_minus = DVector::zeros(out_dim);

    for j in 0..in_dim {
        let x_j = x[j];
        x_plus[j] = x_j + h;
        x_minus[j] = x_j - h;

        f.residual(&DVectorView::from(&x_plus), &mut DVectorViewMut::from(&mut f_plus));
        f.residual(&DVectorView::from(&x_minus), &mut DVectorViewMut::from(&mut f_minus));

        // jacobian[.., j] := (f+ - f-) / 2h
        let mut column_j = jacobian.column_mut(j);
        column_j.copy_from(&f_plus);
        column_j -= &f_minus;
        column_j /= 2.0 * h;

        x_plus[j] = x_j;
        x_minus[j] = x_j;
    }
}
