use matrixcompare::assert_matrix_eq;
use nalgebra::{DMatrix, DMatrixViewMut, DVector, DVectorView, DVectorViewMut};
use romulus_optimize::calculus::*;

struct SimpleTwoDimensionalPolynomial;

impl ResidualFunction for SimpleTwoDimensionalPolynomial {
    fn inputs(&self) -> usize {
        2
    }

    fn values(&self) -> usize {
        2
    }

    fn residual(&self, x: &DVectorView<f64>, out: &mut DVectorViewMut<f64>) {
        assert_eq!(x.len(), 2);
        assert_eq!(out.len(), 2);
        let (x1, x2) = (x[0], x[1]);
        out[0] = x1 * x2 + 3.0;
        out[1] = x1 * x1 + x2 * x2 + x1 + 5.0;
    }
}

#[test]
fn approximate_jacobian_simple_function() {
    let x = DVector::from_column_slice(&[3.0, 4.0]);
    let j = approximate_jacobian(&SimpleTwoDimensionalPolynomial, &x, 1e-6);

    // J = [   x2           x1 ]
    //     [ 2*x1 + 1     2*x2 ]
    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(2, 2,
                                           &[4.0, 3.0,
                                             7.0, 8.0]);

    assert_matrix_eq!(j, expected, comp = abs, tol = 1e-6);
}

#[test]
fn default_jacobian_uses_central_differences() {
    let f = SimpleTwoDimensionalPolynomial;
    let x = DVector::from_column_slice(&[-1.5, 0.25]);

    let mut j = DMatrix::zeros(2, 2);
    f.jacobian(&DVectorView::from(&x), &mut DMatrixViewMut::from(&mut j));

    let expected = approximate_jacobian(&f, &x, DEFAULT_FD_STEP);
    assert_matrix_eq!(j, expected, comp = abs, tol = 1e-14);
}

#[test]
fn approximate_jacobian_rectangular_system() {
    struct Rectangular;

    impl ResidualFunction for Rectangular {
        fn inputs(&self) -> usize {
            2
        }

        fn values(&self) -> usize {
            3
        }

        fn residual(&self, x: &DVectorView<f64>, out: &mut DVectorViewMut<f64>) {
            let (x1, x2) = (x[0], x[1]);
            out[0] = x1 + 2.0 * x2;
            out[1] = x1 * x2;
            out[2] = x2 * x2;
        }
    }

    let x = DVector::from_column_slice(&[2.0, -3.0]);
    let j = approximate_jacobian(&Rectangular, &x, 1e-6);

    #[rustfmt::skip]
    let expected = DMatrix::from_row_slice(3, 2,
                                           &[ 1.0,  2.0,
                                             -3.0,  2.0,
                                              0.0, -6.0]);

    assert_matrix_eq!(j, expected, comp = abs, tol = 1e-6);
}
