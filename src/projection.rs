//! Reduced rank-3 tensor assembly for trilinear operator terms.
//!
//! Convection (`u · ∇u`) and eddy-viscosity-weighted diffusion enter the
//! reduced system as rank-3 tensors `T[k][i][j] = <test_k, N(trial_i,
//! trial_j)>` that are assembled once offline and contracted against the
//! reduced coefficients online. Assembly cost is `O(modes² x mesh)`
//! operator evaluations either way; the policy only decides whether the
//! evaluated fields are materialized all at once or streamed through a
//! single reusable buffer.

use crate::field::{weighted_dot, CellVolumes, FvField};
use crate::modes::Modes;
use crate::tensor::DenseTensor3;
use log::debug;
use nalgebra::DVector;

/// A discretized bilinear operator `N(u, v)` evaluated on interior DOFs.
///
/// Implementors are supplied by the discretization collaborator (e.g. the
/// assembled convection operator); the reduction core only contracts the
/// result against test modes.
pub trait TrilinearForm {
    /// Evaluates `N(u, v)` into `out`, one value per interior DOF.
    fn apply(&self, u: &FvField, v: &FvField, out: &mut DVector<f64>);
}

impl<F> TrilinearForm for F
where
    F: Fn(&FvField, &FvField, &mut DVector<f64>),
{
    fn apply(&self, u: &FvField, v: &FvField, out: &mut DVector<f64>) {
        self(u, v, out)
    }
}

/// Memory/CPU trade-off for tensor assembly. Both policies produce
/// numerically identical tensors (up to summation order); the choice is the
/// caller's, never a behavioral difference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssemblyPolicy {
    /// Materialize all `N(i, j)` evaluations before projecting. Fast, but
    /// memory scales as `O(modes² x mesh)`.
    Direct,
    /// Re-evaluate per `(i, j)` pair into one cached buffer, projecting
    /// immediately. Required for large mode counts or large meshes.
    Streaming,
}

/// Assembles the reduced trilinear tensor
/// `T[k][i][j] = <test_k, N(trial_i, trial_j)>` under the volume-weighted
/// L² inner product.
///
/// The first tensor dimension ranges over the test modes, the trailing two
/// over the trial modes (which include any supremizer enrichment the caller
/// appended to the trial basis).
///
/// # Panics
///
/// Panics if either basis is empty or the bases disagree on the DOF count.
pub fn reduced_trilinear_tensor(
    test: &Modes,
    trial: &Modes,
    form: &impl TrilinearForm,
    volumes: &CellVolumes,
    policy: AssemblyPolicy,
) -> DenseTensor3 {
    assert!(!test.is_empty() && !trial.is_empty(), "cannot assemble a tensor from an empty basis");
    assert_eq!(
        test.dofs(),
        trial.dofs(),
        "test and trial bases live on different discretizations"
    );

    let n_test = test.len();
    let n_trial = trial.len();
    let dofs = trial.dofs();
    debug!(
        "assembling {}x{}x{} reduced tensor ({:?})",
        n_test, n_trial, n_trial, policy
    );

    let mut tensor = DenseTensor3::zeros(n_test, n_trial, n_trial);
    match policy {
        AssemblyPolicy::Direct => {
            // All pairwise evaluations are kept alive at once.
            let mut evaluated = Vec::with_capacity(n_trial * n_trial);
            for i in 0..n_trial {
                for j in 0..n_trial {
                    let mut out = DVector::zeros(dofs);
                    form.apply(trial.field(i), trial.field(j), &mut out);
                    evaluated.push(out);
                }
            }
            for k in 0..n_test {
                for i in 0..n_trial {
                    for j in 0..n_trial {
                        tensor[[k, i, j]] = weighted_dot(
                            test.field(k).interior(),
                            volumes.as_vector(),
                            &evaluated[i * n_trial + j],
                        );
                    }
                }
            }
        }
        AssemblyPolicy::Streaming => {
            let mut buffer = DVector::zeros(dofs);
            for i in 0..n_trial {
                for j in 0..n_trial {
                    form.apply(trial.field(i), trial.field(j), &mut buffer);
                    for k in 0..n_test {
                        tensor[[k, i, j]] =
                            weighted_dot(test.field(k).interior(), volumes.as_vector(), &buffer);
                    }
                }
            }
        }
    }
    tensor
}
