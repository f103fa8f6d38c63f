//! The POD basis container.
//!
//! [`Modes`] owns an ordered list of basis fields (POD ordering by
//! decreasing singular value is insertion order) together with a lazily
//! rebuilt flattened representation: one dense `(dofs x n_modes)` matrix for
//! the interior and one per boundary patch. The flattened matrices are what
//! every projection and reconstruction works on; the field list is the
//! source of truth and the cache is invalidated whenever a mode is appended.

use crate::field::{weighted_dot, CellVolumes, FvField};
use nalgebra::{DMatrix, DVector};
use nalgebra_sparse::CsrMatrix;

/// Projection type for full-order linear systems.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    /// Test and trial with the stored basis: `V^T A V`, `V^T b`.
    Galerkin,
    /// Test with the operator image of the basis `W = A V` for stability on
    /// non-symmetric, convection-dominated operators: `W^T A V`, `W^T b`.
    PetrovGalerkin,
}

/// Inner product / test-space choice for projecting a single field.
#[derive(Debug, Clone, Copy)]
pub enum FieldProjection<'a> {
    /// Volume-weighted discrete L² inner product (the default; POD bases
    /// are orthonormal in this product).
    L2(&'a CellVolumes),
    /// Unweighted Frobenius contraction, for tensor-like fields.
    Frobenius,
    /// Test against the operator image of the basis; requires the assembled
    /// full-order operator.
    PetrovGalerkin {
        operator: &'a CsrMatrix<f64>,
        volumes: &'a CellVolumes,
    },
}

/// An ordered, indexed collection of basis fields with cached flattened
/// matrices.
#[derive(Debug, Clone, Default)]
pub struct Modes {
    fields: Vec<FvField>,
    // One matrix per region: interior first, then each boundary patch. The
    // column count always equals fields.len() when present.
    flattened: Option<Vec<DMatrix<f64>>>,
}

impl Modes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a basis from an ordered list of shape-compatible fields.
    ///
    /// # Panics
    ///
    /// Panics if the fields do not all share the same shape.
    pub fn from_fields(fields: Vec<FvField>) -> Self {
        let mut modes = Self::new();
        for field in fields {
            modes.push(field);
        }
        modes
    }

    /// Appends a mode, invalidating the flattened cache.
    ///
    /// # Panics
    ///
    /// Panics if the field's shape differs from the stored modes.
    pub fn push(&mut self, field: FvField) {
        if let Some(first) = self.fields.first() {
            assert!(
                first.same_shape(&field),
                "appended mode does not match the shape of the stored basis"
            );
        }
        self.fields.push(field);
        self.flattened = None;
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field(&self, index: usize) -> &FvField {
        &self.fields[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &FvField> {
        self.fields.iter()
    }

    /// Number of interior DOFs of the basis fields.
    pub fn dofs(&self) -> usize {
        self.fields.first().map_or(0, FvField::dofs)
    }

    fn ensure_flattened(&mut self) {
        if self.flattened.is_some() {
            return;
        }
        let n = self.fields.len();
        assert!(n > 0, "cannot flatten an empty basis");
        let template = &self.fields[0];
        let mut matrices = Vec::with_capacity(1 + template.patch_count());
        matrices.push(DMatrix::from_fn(template.dofs(), n, |i, j| self.fields[j].interior()[i]));
        for p in 0..template.patch_count() {
            let patch_dofs = template.patch(p).len();
            matrices.push(DMatrix::from_fn(patch_dofs, n, |i, j| self.fields[j].patch(p)[i]));
        }
        self.flattened = Some(matrices);
    }

    /// The flattened matrix representation: index 0 is the interior, index
    /// `p + 1` the values on boundary patch `p`; each matrix has shape
    /// `(region DOFs x n_modes)`.
    ///
    /// Idempotent and side-effect-free on the mode list; the cache is
    /// rebuilt at most once between mode insertions.
    pub fn flattened_matrices(&mut self) -> &[DMatrix<f64>] {
        self.ensure_flattened();
        self.flattened.as_deref().unwrap()
    }

    fn resolve_mode_count(&self, requested: Option<usize>) -> usize {
        let n = requested.unwrap_or_else(|| self.len());
        assert!(
            n >= 1 && n <= self.len(),
            "requested {} modes but the basis stores {}",
            n,
            self.len()
        );
        n
    }

    /// The leading `n` columns of the interior flattened matrix.
    fn interior_basis(&mut self, n: usize) -> DMatrix<f64> {
        self.ensure_flattened();
        self.flattened.as_ref().unwrap()[0].columns(0, n).clone_owned()
    }

    /// Projects a full-order linear system onto the first `n_modes` basis
    /// vectors, returning the reduced matrix and reduced source term.
    ///
    /// # Panics
    ///
    /// Panics if `n_modes` exceeds the stored mode count or the system
    /// dimensions do not match the basis DOF count.
    pub fn project_system(
        &mut self,
        matrix: &CsrMatrix<f64>,
        source: &DVector<f64>,
        n_modes: Option<usize>,
        kind: ProjectionKind,
    ) -> (DMatrix<f64>, DVector<f64>) {
        let n = self.resolve_mode_count(n_modes);
        assert_eq!(
            matrix.nrows(),
            self.dofs(),
            "system matrix dimension does not match the basis DOF count"
        );
        assert_eq!(
            source.len(),
            self.dofs(),
            "source vector length does not match the basis DOF count"
        );
        let v = self.interior_basis(n);
        let av: DMatrix<f64> = matrix * &v;
        match kind {
            ProjectionKind::Galerkin => {
                let reduced_matrix = v.transpose() * &av;
                let reduced_source = v.transpose() * source;
                (reduced_matrix, reduced_source)
            }
            ProjectionKind::PetrovGalerkin => {
                // The operator image of the trial basis serves as test basis.
                let reduced_matrix = av.transpose() * &av;
                let reduced_source = av.transpose() * source;
                (reduced_matrix, reduced_source)
            }
        }
    }

    /// Projects a single snapshot onto the first `n_modes` basis vectors,
    /// returning the coefficient vector.
    ///
    /// # Panics
    ///
    /// Panics if `n_modes` exceeds the stored mode count or the field shape
    /// does not match the basis.
    pub fn project_field(
        &mut self,
        field: &FvField,
        n_modes: Option<usize>,
        projection: FieldProjection,
    ) -> DVector<f64> {
        let n = self.resolve_mode_count(n_modes);
        assert_eq!(
            field.dofs(),
            self.dofs(),
            "snapshot DOF count does not match the basis"
        );
        let v = self.interior_basis(n);
        match projection {
            FieldProjection::L2(volumes) => {
                let weighted = field.interior().component_mul(volumes.as_vector());
                v.transpose() * weighted
            }
            FieldProjection::Frobenius => v.transpose() * field.interior(),
            FieldProjection::PetrovGalerkin { operator, volumes } => {
                let w: DMatrix<f64> = operator * &v;
                let weighted = field.interior().component_mul(volumes.as_vector());
                w.transpose() * weighted
            }
        }
    }

    /// Projects a snapshot and immediately reconstructs it: the best
    /// rank-`n_modes` approximation of `field` in the basis. Used for
    /// a-priori truncation-error studies.
    pub fn project_snapshot(
        &mut self,
        field: &FvField,
        n_modes: Option<usize>,
        projection: FieldProjection,
    ) -> FvField {
        let coefficients = self.project_field(field, n_modes, projection);
        self.reconstruct_single(field, &coefficients, field.name())
    }

    /// Batch form of [`Modes::project_snapshot`] under the volume-weighted
    /// L² inner product.
    pub fn project_snapshots(
        &mut self,
        snapshots: &[FvField],
        n_modes: Option<usize>,
        volumes: &CellVolumes,
    ) -> Vec<FvField> {
        snapshots
            .iter()
            .map(|s| self.project_snapshot(s, n_modes, FieldProjection::L2(volumes)))
            .collect()
    }

    /// Batch snapshot projection with one external cell-volume field per
    /// snapshot, for training sets where the volumes differ between
    /// snapshots (moving meshes, multi-mesh sampling).
    ///
    /// # Panics
    ///
    /// Panics if the number of volume fields differs from the number of
    /// snapshots.
    pub fn project_snapshots_weighted(
        &mut self,
        snapshots: &[FvField],
        volumes: &[CellVolumes],
        n_modes: Option<usize>,
    ) -> Vec<FvField> {
        assert_eq!(
            snapshots.len(),
            volumes.len(),
            "need exactly one cell-volume field per snapshot"
        );
        snapshots
            .iter()
            .zip(volumes)
            .map(|(s, vol)| self.project_snapshot(s, n_modes, FieldProjection::L2(vol)))
            .collect()
    }

    /// Reconstructs one field per coefficient column: values equal
    /// `Basis * coefficients`, interior and boundary patches alike. Fields
    /// are named `<name><index>`.
    ///
    /// # Panics
    ///
    /// Panics if the coefficient row count exceeds the stored mode count or
    /// the template shape does not match the basis.
    pub fn reconstruct(&mut self, template: &FvField, coefficients: &DMatrix<f64>, name: &str) -> Vec<FvField> {
        (0..coefficients.ncols())
            .map(|c| {
                let column = coefficients.column(c).clone_owned();
                self.reconstruct_single(template, &column, &format!("{}{}", name, c))
            })
            .collect()
    }

    /// Reconstructs a single field from a coefficient vector.
    pub fn reconstruct_single(&mut self, template: &FvField, coefficients: &DVector<f64>, name: &str) -> FvField {
        let n = self.resolve_mode_count(Some(coefficients.len()));
        assert!(
            template.same_shape(self.field(0)),
            "template field shape does not match the basis"
        );
        self.ensure_flattened();
        let matrices = self.flattened.as_ref().unwrap();
        let interior = matrices[0].columns(0, n) * coefficients;
        let boundary = (1..matrices.len())
            .map(|p| matrices[p].columns(0, n) * coefficients)
            .collect();
        template.like(name, interior, boundary)
    }

    /// Volume-weighted Gramian `G_ij = <mode_i, mode_j>` of the leading
    /// `n_modes` modes; the identity for an orthonormal basis.
    pub fn gramian(&mut self, n_modes: Option<usize>, volumes: &CellVolumes) -> DMatrix<f64> {
        let n = self.resolve_mode_count(n_modes);
        self.ensure_flattened();
        let interior = &self.flattened.as_ref().unwrap()[0];
        DMatrix::from_fn(n, n, |i, j| {
            weighted_dot(
                &interior.column(i).clone_owned(),
                volumes.as_vector(),
                &interior.column(j).clone_owned(),
            )
        })
    }
}

impl std::ops::Index<usize> for Modes {
    type Output = FvField;

    fn index(&self, index: usize) -> &FvField {
        &self.fields[index]
    }
}
