//! Reduced-problem orchestration.
//!
//! A reduced flow model composes the pieces of the offline→online pipeline:
//! POD bases per physical field, a bundle of cached reduced operators, a
//! boundary-condition enforcement strategy, and the Newton scaffolding that
//! drives the online solve. Physics variants are a tagged union of residual
//! evaluators over a shared operator bundle, not an inheritance chain; the
//! enforcement strategy is a per-instance runtime configuration.

use crate::field::FvField;
use crate::modes::Modes;
use crate::storage;
use crate::tensor::DenseTensor3;
use log::{info, warn};
use nalgebra::{DMatrix, DVector, DVectorView, DVectorViewMut};
use romulus_optimize::calculus::ResidualFunction;
use romulus_optimize::newton::{newton, NewtonError, NewtonOutcome, NewtonSettings};
use std::path::Path;

/// How inhomogeneous boundary conditions enter the reduced system.
#[derive(Debug, Clone, PartialEq)]
pub enum BcEnforcement {
    /// A lifting field absorbs the inhomogeneity offline; online, the
    /// leading coefficients are pinned to the prescribed values exactly.
    Lifting,
    /// A quadratic penalty term with per-condition weights drives the
    /// boundary residual toward zero without eliminating it exactly.
    Penalty { weights: DVector<f64> },
}

/// The cached reduced operators of a velocity/pressure problem.
///
/// Assembled once offline for a fixed basis/mesh pair and immutable
/// afterwards; persisted through [`save`](ReducedOperators::save) and
/// reloaded read-only with [`load`](ReducedOperators::load).
#[derive(Debug, Clone, PartialEq)]
pub struct ReducedOperators {
    /// Velocity mass matrix `M` (`n_u x n_u`).
    pub mass: DMatrix<f64>,
    /// Diffusion matrix `B` (`n_u x n_u`).
    pub diffusion: DMatrix<f64>,
    /// Pressure-gradient coupling `K` (`n_u x n_p`).
    pub pressure_grad: DMatrix<f64>,
    /// Divergence coupling `P` (`n_p x n_u`).
    pub divergence: DMatrix<f64>,
    /// Convection tensor `C` (`n_u x n_u x n_u`).
    pub convection: DenseTensor3,
    /// Per-condition boundary value vectors used by the penalty method.
    pub bc_vectors: Vec<DVector<f64>>,
    /// Per-condition boundary matrices used by the penalty method.
    pub bc_matrices: Vec<DMatrix<f64>>,
}

impl ReducedOperators {
    pub fn n_velocity(&self) -> usize {
        self.diffusion.nrows()
    }

    pub fn n_pressure(&self) -> usize {
        self.pressure_grad.ncols()
    }

    /// Number of parametrized boundary conditions.
    pub fn n_boundary_conditions(&self) -> usize {
        self.bc_vectors.len()
    }

    /// Checks the mutual dimension consistency of the bundle.
    ///
    /// # Panics
    ///
    /// Panics with a descriptive message on any mismatch; mixed-up cache
    /// files would otherwise produce silently wrong numerics.
    pub fn validate(&self) {
        let n_u = self.n_velocity();
        let n_p = self.n_pressure();
        assert_eq!(self.diffusion.ncols(), n_u, "diffusion matrix is not square");
        assert_eq!(self.mass.shape(), (n_u, n_u), "mass matrix shape does not match the velocity space");
        assert_eq!(
            self.pressure_grad.nrows(),
            n_u,
            "pressure-gradient rows do not match the velocity space"
        );
        assert_eq!(
            self.divergence.shape(),
            (n_p, n_u),
            "divergence shape does not match the velocity/pressure spaces"
        );
        assert_eq!(
            self.convection.dims(),
            [n_u, n_u, n_u],
            "convection tensor dimensions do not match the velocity space"
        );
        assert_eq!(
            self.bc_vectors.len(),
            self.bc_matrices.len(),
            "boundary vectors and matrices must come in pairs"
        );
        // More conditions than velocity modes would make lifting rows spill
        // into the continuity block.
        assert!(
            self.bc_vectors.len() <= n_u,
            "parametrized boundary-condition count exceeds the velocity mode count"
        );
        for (l, (vec, mat)) in self.bc_vectors.iter().zip(&self.bc_matrices).enumerate() {
            assert_eq!(vec.len(), n_u, "boundary vector {} does not match the velocity space", l);
            assert_eq!(mat.shape(), (n_u, n_u), "boundary matrix {} does not match the velocity space", l);
        }
    }

    /// Persists the bundle under `directory`.
    pub fn save(&self, directory: impl AsRef<Path>) -> eyre::Result<()> {
        let directory = directory.as_ref();
        storage::save_dense_matrix(&self.mass, directory, "mass")?;
        storage::save_dense_matrix(&self.diffusion, directory, "diffusion")?;
        storage::save_dense_matrix(&self.pressure_grad, directory, "pressure_grad")?;
        storage::save_dense_matrix(&self.divergence, directory, "divergence")?;
        storage::save_tensor(&self.convection, directory, "convection")?;
        let bc_vectors: Vec<DMatrix<f64>> = self
            .bc_vectors
            .iter()
            .map(|v| DMatrix::from_column_slice(v.len(), 1, v.as_slice()))
            .collect();
        storage::save_dense_matrix_list(&bc_vectors, directory, "bc_vec")?;
        storage::save_dense_matrix_list(&self.bc_matrices, directory, "bc_mat")?;
        Ok(())
    }

    /// Loads a bundle persisted by [`save`](ReducedOperators::save) with
    /// `n_bc` parametrized boundary conditions.
    ///
    /// The boundary-condition count is declared by the caller because cache
    /// files carry no self-describing metadata; a mismatch surfaces as a
    /// missing-artifact hard stop or a validation panic.
    ///
    /// # Panics
    ///
    /// Panics if any artifact is missing ("rerun the offline stage") or the
    /// loaded bundle is dimensionally inconsistent.
    pub fn load(directory: impl AsRef<Path>, n_bc: usize) -> Self {
        let directory = directory.as_ref();
        let bc_vectors = (0..n_bc)
            .map(|l| {
                let m = storage::load_dense_matrix(directory, &format!("bc_vec{}", l));
                m.column(0).clone_owned()
            })
            .collect();
        let bc_matrices = (0..n_bc)
            .map(|l| storage::load_dense_matrix(directory, &format!("bc_mat{}", l)))
            .collect();
        let operators = Self {
            mass: storage::load_dense_matrix(directory, "mass"),
            diffusion: storage::load_dense_matrix(directory, "diffusion"),
            pressure_grad: storage::load_dense_matrix(directory, "pressure_grad"),
            divergence: storage::load_dense_matrix(directory, "divergence"),
            convection: storage::load_tensor(directory, "convection"),
            bc_vectors,
            bc_matrices,
        };
        operators.validate();
        operators
    }
}

/// The steady momentum/continuity residual in reduced coordinates.
///
/// For velocity coefficients `a` and pressure coefficients `b`, the
/// momentum rows read `nu B a - a^T C_i a - K b` plus the active
/// boundary-condition terms; the continuity rows read `P a`. Under the
/// lifting strategy the leading rows pin the lifted coefficients to the
/// prescribed boundary values instead.
#[derive(Debug)]
pub struct SteadyFlowResidual<'a> {
    operators: &'a ReducedOperators,
    enforcement: &'a BcEnforcement,
    nu: f64,
    bc_values: DVector<f64>,
}

impl<'a> SteadyFlowResidual<'a> {
    /// # Panics
    ///
    /// Panics if the boundary-value vector length does not match the
    /// declared parametrized-BC count of the operator bundle, or if that
    /// count exceeds the velocity mode count.
    pub fn new(
        operators: &'a ReducedOperators,
        enforcement: &'a BcEnforcement,
        nu: f64,
        bc_values: DVector<f64>,
    ) -> Self {
        assert_eq!(
            bc_values.len(),
            operators.n_boundary_conditions(),
            "boundary value vector length does not match the declared parametrized-BC count"
        );
        assert!(
            bc_values.len() <= operators.n_velocity(),
            "parametrized boundary-condition count exceeds the velocity mode count"
        );
        if let BcEnforcement::Penalty { weights } = enforcement {
            assert_eq!(
                weights.len(),
                operators.n_boundary_conditions(),
                "penalty weight count does not match the declared parametrized-BC count"
            );
        }
        Self {
            operators,
            enforcement,
            nu,
            bc_values,
        }
    }

    fn momentum_and_continuity(&self, x: &DVectorView<f64>, out: &mut DVectorViewMut<f64>) {
        let ops = self.operators;
        let n_u = ops.n_velocity();
        let n_p = ops.n_pressure();
        let a = x.rows(0, n_u).clone_owned();
        let b = x.rows(n_u, n_p).clone_owned();

        let momentum = &ops.diffusion * &a * self.nu;
        let pressure_gradient = &ops.pressure_grad * &b;
        let continuity = &ops.divergence * &a;

        for i in 0..n_u {
            out[i] = momentum[i] - ops.convection.bilinear(i, &a, &a) - pressure_gradient[i];
        }

        if let BcEnforcement::Penalty { weights } = self.enforcement {
            for l in 0..ops.n_boundary_conditions() {
                let mismatch = &ops.bc_vectors[l] * self.bc_values[l] - &ops.bc_matrices[l] * &a;
                for i in 0..n_u {
                    out[i] += weights[l] * mismatch[i];
                }
            }
        }

        for j in 0..n_p {
            out[n_u + j] = continuity[j];
        }
    }

    fn lifting_rows(&self, x: &DVectorView<f64>, out: &mut DVectorViewMut<f64>) {
        if matches!(self.enforcement, BcEnforcement::Lifting) {
            for j in 0..self.bc_values.len() {
                out[j] = x[j] - self.bc_values[j];
            }
        }
    }
}

/// An implicit-Euler step residual wrapping the steady evaluator: the
/// momentum rows gain `-M (a - a_prev) / dt`.
#[derive(Debug)]
pub struct UnsteadyFlowResidual<'a> {
    steady: SteadyFlowResidual<'a>,
    dt: f64,
    previous: DVector<f64>,
}

impl<'a> UnsteadyFlowResidual<'a> {
    /// # Panics
    ///
    /// Panics if `dt <= 0` or the previous-iterate length does not match
    /// the reduced unknown count.
    pub fn new(steady: SteadyFlowResidual<'a>, dt: f64, previous: DVector<f64>) -> Self {
        assert!(dt > 0.0, "timestep must be positive");
        assert_eq!(
            previous.len(),
            steady.operators.n_velocity() + steady.operators.n_pressure(),
            "previous iterate length does not match the reduced unknown count"
        );
        Self { steady, dt, previous }
    }
}

/// The physics-tagged residual variants a reduced flow model can solve,
/// selected at construction of each online solve.
#[derive(Debug)]
pub enum FlowResidual<'a> {
    Steady(SteadyFlowResidual<'a>),
    Unsteady(UnsteadyFlowResidual<'a>),
}

impl FlowResidual<'_> {
    fn operators(&self) -> &ReducedOperators {
        match self {
            FlowResidual::Steady(steady) => steady.operators,
            FlowResidual::Unsteady(unsteady) => unsteady.steady.operators,
        }
    }
}

impl ResidualFunction for FlowResidual<'_> {
    fn inputs(&self) -> usize {
        let ops = self.operators();
        ops.n_velocity() + ops.n_pressure()
    }

    fn values(&self) -> usize {
        self.inputs()
    }

    fn residual(&self, x: &DVectorView<f64>, out: &mut DVectorViewMut<f64>) {
        assert_eq!(x.len(), self.inputs(), "unknown vector length does not match the reduced system");
        assert_eq!(out.len(), self.values(), "residual buffer length does not match the reduced system");
        match self {
            FlowResidual::Steady(steady) => {
                steady.momentum_and_continuity(x, out);
                steady.lifting_rows(x, out);
            }
            FlowResidual::Unsteady(unsteady) => {
                let steady = &unsteady.steady;
                steady.momentum_and_continuity(x, out);
                let ops = steady.operators;
                let n_u = ops.n_velocity();
                let da = (x.rows(0, n_u) - unsteady.previous.rows(0, n_u)) / unsteady.dt;
                let inertia = &ops.mass * da;
                for i in 0..n_u {
                    out[i] -= inertia[i];
                }
                steady.lifting_rows(x, out);
            }
        }
    }
}

/// The online coefficient history: one reduced unknown vector per solve or
/// timestep, append-only during solves and cleared when a new model is
/// built.
#[derive(Debug, Clone, Default)]
pub struct OnlineTrace {
    samples: Vec<DVector<f64>>,
}

impl OnlineTrace {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn sample(&self, index: usize) -> &DVector<f64> {
        &self.samples[index]
    }

    pub fn iter(&self) -> impl Iterator<Item = &DVector<f64>> {
        self.samples.iter()
    }

    /// Extracts rows `offset..offset + rows` of every `every`-th sample as
    /// the columns of a coefficient matrix, ready for reconstruction.
    ///
    /// # Panics
    ///
    /// Panics if `every == 0` or the requested row range exceeds the sample
    /// length.
    pub fn coefficient_matrix(&self, offset: usize, rows: usize, every: usize) -> DMatrix<f64> {
        assert!(every >= 1, "sampling stride must be at least 1");
        let selected: Vec<&DVector<f64>> = self.samples.iter().step_by(every).collect();
        let mut matrix = DMatrix::zeros(rows, selected.len());
        for (c, sample) in selected.iter().enumerate() {
            assert!(
                offset + rows <= sample.len(),
                "requested coefficient rows exceed the traced unknown count"
            );
            matrix.column_mut(c).copy_from(&sample.rows(offset, rows));
        }
        matrix
    }
}

/// A reduced velocity/pressure problem wired for online evaluation.
pub struct ReducedFlowModel {
    velocity_modes: Modes,
    pressure_modes: Modes,
    operators: ReducedOperators,
    enforcement: BcEnforcement,
    nu: f64,
    settings: NewtonSettings,
    trace: OnlineTrace,
    solve_count: usize,
}

impl ReducedFlowModel {
    /// Builds a model from its offline artifacts. The online trace starts
    /// empty.
    ///
    /// # Panics
    ///
    /// Panics if the operator bundle is inconsistent or the mode counts do
    /// not match the operator dimensions.
    pub fn new(
        velocity_modes: Modes,
        pressure_modes: Modes,
        operators: ReducedOperators,
        enforcement: BcEnforcement,
        nu: f64,
    ) -> Self {
        operators.validate();
        assert_eq!(
            velocity_modes.len(),
            operators.n_velocity(),
            "velocity mode count does not match the operator bundle"
        );
        assert_eq!(
            pressure_modes.len(),
            operators.n_pressure(),
            "pressure mode count does not match the operator bundle"
        );
        Self {
            velocity_modes,
            pressure_modes,
            operators,
            enforcement,
            nu,
            settings: NewtonSettings::default(),
            trace: OnlineTrace::default(),
            solve_count: 0,
        }
    }

    pub fn operators(&self) -> &ReducedOperators {
        &self.operators
    }

    pub fn trace(&self) -> &OnlineTrace {
        &self.trace
    }

    pub fn settings(&self) -> NewtonSettings {
        self.settings
    }

    pub fn set_settings(&mut self, settings: NewtonSettings) {
        self.settings = settings;
    }

    pub fn boundary_condition_count(&self) -> usize {
        self.operators.n_boundary_conditions()
    }

    fn initial_guess(&self, bc_values: &DVector<f64>) -> DVector<f64> {
        let mut y = DVector::zeros(self.operators.n_velocity() + self.operators.n_pressure());
        if matches!(self.enforcement, BcEnforcement::Lifting) {
            for j in 0..bc_values.len() {
                y[j] = bc_values[j];
            }
        }
        y
    }

    fn report(&self, outcome: &NewtonOutcome) {
        if outcome.converged {
            info!(
                "online solve {}: |F(x)| = {:e} in {} iterations",
                self.solve_count, outcome.residual_norm, outcome.iterations
            );
        } else {
            warn!(
                "online solve {}: stalled at |F(x)| = {:e} after {} iterations, keeping best iterate",
                self.solve_count, outcome.residual_norm, outcome.iterations
            );
        }
    }

    /// Solves the steady reduced problem for the given boundary values and
    /// appends the iterate to the online trace.
    ///
    /// Non-convergence within the iteration budget is reported, not fatal:
    /// the best iterate is kept and the outcome carries the final residual
    /// norm for the caller to judge.
    ///
    /// # Panics
    ///
    /// Panics if the boundary-value vector length does not match the
    /// declared parametrized-BC count.
    pub fn solve_online(&mut self, bc_values: &DVector<f64>) -> Result<NewtonOutcome, NewtonError> {
        let mut y = self.initial_guess(bc_values);
        self.solve_count += 1;
        let residual = FlowResidual::Steady(SteadyFlowResidual::new(
            &self.operators,
            &self.enforcement,
            self.nu,
            bc_values.clone(),
        ));
        let outcome = newton(&residual, &mut y, &self.settings)?;
        self.report(&outcome);
        self.trace.samples.push(y);
        Ok(outcome)
    }

    /// Advances the unsteady reduced problem by `steps` implicit-Euler
    /// steps of size `dt`, starting from the last traced iterate (or the
    /// lifted initial guess when the trace is empty), appending every step.
    pub fn solve_online_transient(
        &mut self,
        bc_values: &DVector<f64>,
        dt: f64,
        steps: usize,
    ) -> Result<Vec<NewtonOutcome>, NewtonError> {
        let mut previous = self
            .trace
            .samples
            .last()
            .cloned()
            .unwrap_or_else(|| self.initial_guess(bc_values));
        let mut outcomes = Vec::with_capacity(steps);
        for _ in 0..steps {
            let mut y = previous.clone();
            self.solve_count += 1;
            let steady = SteadyFlowResidual::new(&self.operators, &self.enforcement, self.nu, bc_values.clone());
            let residual = FlowResidual::Unsteady(UnsteadyFlowResidual::new(steady, dt, previous.clone()));
            let outcome = newton(&residual, &mut y, &self.settings)?;
            self.report(&outcome);
            self.trace.samples.push(y.clone());
            previous = y;
            outcomes.push(outcome);
        }
        Ok(outcomes)
    }

    /// Reconstructs the traced velocity coefficients into full-order
    /// fields, one per `every`-th trace sample.
    pub fn reconstruct_velocity(&mut self, template: &FvField, name: &str, every: usize) -> Vec<FvField> {
        let coefficients = self.trace.coefficient_matrix(0, self.operators.n_velocity(), every);
        self.velocity_modes.reconstruct(template, &coefficients, name)
    }

    /// Reconstructs the traced pressure coefficients into full-order
    /// fields, one per `every`-th trace sample.
    pub fn reconstruct_pressure(&mut self, template: &FvField, name: &str, every: usize) -> Vec<FvField> {
        let n_u = self.operators.n_velocity();
        let coefficients = self.trace.coefficient_matrix(n_u, self.operators.n_pressure(), every);
        self.pressure_modes.reconstruct(template, &coefficients, name)
    }

    /// Persists the full online trace as a single coefficient matrix, one
    /// column per sample.
    pub fn save_trace(&self, directory: impl AsRef<Path>, name: &str) -> eyre::Result<()> {
        let rows = self.operators.n_velocity() + self.operators.n_pressure();
        let matrix = self.trace.coefficient_matrix(0, rows, 1);
        storage::save_dense_matrix(&matrix, directory, name)
    }
}
