//! Dense rank-3 tensors for reduced trilinear operators.

use nalgebra::{DMatrix, DVector};
use std::ops::{Index, IndexMut};

/// A dense rank-3 tensor stored column-major (first index fastest).
///
/// This is the in-memory form of a reduced trilinear operator: for a
/// convection tensor `C`, `C[[k, i, j]]` holds the projection of the
/// nonlinear interaction of trial modes `i` and `j` onto test mode `k`. The
/// storage order matches the persisted layout, so save/load round trips are
/// plain buffer copies.
#[derive(Debug, Clone, PartialEq)]
pub struct DenseTensor3 {
    dims: [usize; 3],
    data: Vec<f64>,
}

impl DenseTensor3 {
    pub fn zeros(d0: usize, d1: usize, d2: usize) -> Self {
        Self {
            dims: [d0, d1, d2],
            data: vec![0.0; d0 * d1 * d2],
        }
    }

    pub fn from_fn(d0: usize, d1: usize, d2: usize, mut f: impl FnMut(usize, usize, usize) -> f64) -> Self {
        let mut tensor = Self::zeros(d0, d1, d2);
        for k in 0..d2 {
            for j in 0..d1 {
                for i in 0..d0 {
                    tensor[[i, j, k]] = f(i, j, k);
                }
            }
        }
        tensor
    }

    /// Rebuilds a tensor from its dimensions and a column-major buffer, as
    /// read back from persistent storage.
    ///
    /// # Panics
    ///
    /// Panics if the buffer length does not match the dimensions.
    pub fn from_raw(dims: [usize; 3], data: Vec<f64>) -> Self {
        assert_eq!(
            data.len(),
            dims[0] * dims[1] * dims[2],
            "tensor buffer length does not match its dimensions"
        );
        Self { dims, data }
    }

    pub fn dims(&self) -> [usize; 3] {
        self.dims
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// The flattened column-major buffer.
    pub fn as_slice(&self) -> &[f64] {
        &self.data
    }

    fn offset(&self, index: [usize; 3]) -> usize {
        let [i, j, k] = index;
        let [d0, d1, d2] = self.dims;
        assert!(i < d0 && j < d1 && k < d2, "tensor index {:?} out of bounds {:?}", index, self.dims);
        i + d0 * (j + d1 * k)
    }

    /// The `(d1 x d2)` matrix obtained by fixing the first index at `k`.
    ///
    /// This is the slice contracted against the reduced coefficients in the
    /// online residual evaluation.
    pub fn slice(&self, k: usize) -> DMatrix<f64> {
        let [_, d1, d2] = self.dims;
        DMatrix::from_fn(d1, d2, |a, b| self[[k, a, b]])
    }

    /// The bilinear form `x^T . slice(k) . y` without materializing the slice.
    ///
    /// # Panics
    ///
    /// Panics if `x` or `y` do not match the trailing tensor dimensions.
    pub fn bilinear(&self, k: usize, x: &DVector<f64>, y: &DVector<f64>) -> f64 {
        let [_, d1, d2] = self.dims;
        assert_eq!(x.len(), d1, "left vector length does not match tensor dimension 1");
        assert_eq!(y.len(), d2, "right vector length does not match tensor dimension 2");
        let mut sum = 0.0;
        for b in 0..d2 {
            let y_b = y[b];
            if y_b == 0.0 {
                continue;
            }
            for a in 0..d1 {
                sum += x[a] * self[[k, a, b]] * y_b;
            }
        }
        sum
    }

    /// Largest absolute entrywise difference against another tensor of the
    /// same dimensions.
    pub fn max_abs_diff(&self, other: &DenseTensor3) -> f64 {
        assert_eq!(self.dims, other.dims, "tensor dimensions do not match");
        self.data
            .iter()
            .zip(&other.data)
            .map(|(a, b)| (a - b).abs())
            .fold(0.0, f64::max)
    }
}

impl Index<[usize; 3]> for DenseTensor3 {
    type Output = f64;

    fn index(&self, index: [usize; 3]) -> &f64 {
        &self.data[self.offset(index)]
    }
}

impl IndexMut<[usize; 3]> for DenseTensor3 {
    fn index_mut(&mut self, index: [usize; 3]) -> &mut f64 {
        let offset = self.offset(index);
        &mut self.data[offset]
    }
}
