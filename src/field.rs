//! Snapshot fields over a fixed finite-volume discretization.
//!
//! The discretization itself (mesh, flux schemes, boundary condition
//! evaluation) is an external collaborator; this module only models what the
//! reduction core needs from it: a named degree-of-freedom container split
//! into an interior region and an ordered list of boundary patches, plus the
//! cell-volume weights that define the discrete L² inner product.

use crate::parallel::Communicator;
use nalgebra::DVector;

/// Cell-volume weights of the discretization, one entry per interior DOF.
///
/// POD bases are orthonormal with respect to the volume-weighted inner
/// product, so all projections go through these weights rather than plain
/// Euclidean dot products.
#[derive(Debug, Clone, PartialEq)]
pub struct CellVolumes(DVector<f64>);

impl CellVolumes {
    pub fn new(volumes: DVector<f64>) -> Self {
        assert!(
            volumes.iter().all(|&v| v > 0.0),
            "cell volumes must be strictly positive"
        );
        Self(volumes)
    }

    /// Uniform mesh with `cells` cells of size `h`.
    pub fn uniform(cells: usize, h: f64) -> Self {
        Self::new(DVector::from_element(cells, h))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.len() == 0
    }

    pub fn as_vector(&self) -> &DVector<f64> {
        &self.0
    }
}

/// A named field snapshot: interior DOF values plus one value vector per
/// boundary patch.
///
/// Patch order is significant and shared by every field of the same
/// discretization; two fields are shape-compatible when their interior and
/// per-patch DOF counts agree.
#[derive(Debug, Clone, PartialEq)]
pub struct FvField {
    name: String,
    interior: DVector<f64>,
    boundary: Vec<DVector<f64>>,
}

impl FvField {
    pub fn new(name: impl Into<String>, interior: DVector<f64>, boundary: Vec<DVector<f64>>) -> Self {
        Self {
            name: name.into(),
            interior,
            boundary,
        }
    }

    /// Builds a field of the same shape as `self` from raw coefficient
    /// buffers. This is the reconstruction contract of the discretization
    /// collaborator.
    ///
    /// # Panics
    ///
    /// Panics if the buffers do not match the shape of `self`.
    pub fn like(&self, name: impl Into<String>, interior: DVector<f64>, boundary: Vec<DVector<f64>>) -> Self {
        assert_eq!(
            interior.len(),
            self.interior.len(),
            "interior buffer length does not match the template field"
        );
        assert_eq!(
            boundary.len(),
            self.boundary.len(),
            "boundary patch count does not match the template field"
        );
        for (p, (new, old)) in boundary.iter().zip(&self.boundary).enumerate() {
            assert_eq!(new.len(), old.len(), "patch {} DOF count does not match the template field", p);
        }
        Self::new(name, interior, boundary)
    }

    /// A zero field with the same shape as `self`.
    pub fn zeros_like(&self, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            interior: DVector::zeros(self.interior.len()),
            boundary: self.boundary.iter().map(|p| DVector::zeros(p.len())).collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn rename(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn interior(&self) -> &DVector<f64> {
        &self.interior
    }

    pub fn boundary(&self) -> &[DVector<f64>] {
        &self.boundary
    }

    pub fn patch(&self, p: usize) -> &DVector<f64> {
        &self.boundary[p]
    }

    /// Number of interior DOFs.
    pub fn dofs(&self) -> usize {
        self.interior.len()
    }

    pub fn patch_count(&self) -> usize {
        self.boundary.len()
    }

    pub fn same_shape(&self, other: &FvField) -> bool {
        self.dofs() == other.dofs()
            && self.patch_count() == other.patch_count()
            && self
                .boundary
                .iter()
                .zip(&other.boundary)
                .all(|(a, b)| a.len() == b.len())
    }

    /// `self += alpha * other`, interior and boundary patches alike.
    ///
    /// # Panics
    ///
    /// Panics if the fields are not shape-compatible.
    pub fn axpy(&mut self, alpha: f64, other: &FvField) {
        assert!(self.same_shape(other), "cannot combine fields of different shapes");
        self.interior.axpy(alpha, &other.interior, 1.0);
        for (mine, theirs) in self.boundary.iter_mut().zip(&other.boundary) {
            mine.axpy(alpha, theirs, 1.0);
        }
    }

    /// Scales all values of the field (interior and boundary) by `alpha`.
    pub fn scale(&mut self, alpha: f64) {
        self.interior *= alpha;
        for patch in &mut self.boundary {
            *patch *= alpha;
        }
    }

    /// Volume-weighted discrete L² inner product over the interior.
    ///
    /// # Panics
    ///
    /// Panics if the fields or the volume weights have mismatched lengths.
    pub fn l2_inner(&self, other: &FvField, volumes: &CellVolumes) -> f64 {
        weighted_dot(&self.interior, volumes.as_vector(), &other.interior)
    }

    /// Volume-weighted discrete L² norm over the interior.
    pub fn l2_norm(&self, volumes: &CellVolumes) -> f64 {
        self.l2_inner(self, volumes).sqrt()
    }

    /// Plain (unweighted) Frobenius contraction over the interior, used for
    /// tensor-valued fields whose values already carry the volume weighting.
    pub fn frobenius_inner(&self, other: &FvField) -> f64 {
        assert_eq!(self.dofs(), other.dofs(), "field DOF counts do not match");
        self.interior.dot(&other.interior)
    }
}

/// `sum_c a_c * w_c * b_c` with length checks.
pub(crate) fn weighted_dot(a: &DVector<f64>, w: &DVector<f64>, b: &DVector<f64>) -> f64 {
    assert_eq!(a.len(), w.len(), "volume weight length does not match field DOF count");
    assert_eq!(a.len(), b.len(), "field DOF counts do not match");
    let mut sum = 0.0;
    for c in 0..a.len() {
        sum += a[c] * w[c] * b[c];
    }
    sum
}

/// Volume-weighted inner product gathered across all mesh partitions.
///
/// Each partition contributes its local interior sum; the communicator's
/// collective sum-reduction produces the global value. With a
/// [`SerialCommunicator`](crate::parallel::SerialCommunicator) this reduces
/// to [`FvField::l2_inner`].
pub fn distributed_l2_inner(
    comm: &impl Communicator,
    a: &FvField,
    b: &FvField,
    volumes: &CellVolumes,
) -> f64 {
    comm.sum_scalar(a.l2_inner(b, volumes))
}

/// Relative L² error `|a - b| / |b|` of two shape-compatible fields.
pub fn relative_l2_error(a: &FvField, b: &FvField, volumes: &CellVolumes) -> f64 {
    let mut diff = a.clone();
    diff.axpy(-1.0, b);
    diff.l2_norm(volumes) / b.l2_norm(volumes)
}
