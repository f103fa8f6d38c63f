//! POD basis construction by the method of snapshots.

use crate::field::{CellVolumes, FvField};
use crate::modes::Modes;
use log::debug;
use nalgebra::{DMatrix, DVector};

/// Computes the leading `n_modes` POD modes of a snapshot set under the
/// volume-weighted L² inner product, together with the full correlation
/// eigenvalue spectrum sorted in decreasing order.
///
/// The correlation matrix `C_ij = <s_i, s_j>` is diagonalized; each mode is
/// the corresponding eigenvector combination of the snapshots,
/// re-orthogonalized against the modes accepted so far and normalized to
/// unit weighted norm, so the returned basis is orthonormal in the weighted
/// inner product even when the snapshot set is rank deficient. Modes are
/// named `<name>0..<name>{n_modes-1}` in order of decreasing eigenvalue.
///
/// # Panics
///
/// Panics if the snapshot set is empty, `n_modes` exceeds the snapshot
/// count, or a requested mode has numerically vanished energy.
pub fn pod_modes(
    snapshots: &[FvField],
    volumes: &CellVolumes,
    n_modes: usize,
    name: &str,
) -> (Modes, DVector<f64>) {
    assert!(!snapshots.is_empty(), "cannot compute POD modes of an empty snapshot set");
    let n_snap = snapshots.len();
    assert!(
        n_modes >= 1 && n_modes <= n_snap,
        "requested {} modes from {} snapshots",
        n_modes,
        n_snap
    );

    let correlation = DMatrix::from_fn(n_snap, n_snap, |i, j| snapshots[i].l2_inner(&snapshots[j], volumes));
    let eigen = correlation.symmetric_eigen();

    // Decreasing eigenvalue order; the eigensolver makes no ordering promise.
    let mut order: Vec<usize> = (0..n_snap).collect();
    order.sort_by(|&a, &b| eigen.eigenvalues[b].partial_cmp(&eigen.eigenvalues[a]).unwrap());

    let eigenvalues = DVector::from_fn(n_snap, |r, _| eigen.eigenvalues[order[r]]);
    debug!("POD eigenvalues: {:?}", eigenvalues.as_slice());

    let mut modes = Modes::new();
    for m in 0..n_modes {
        let weights = eigen.eigenvectors.column(order[m]);
        let mut mode = snapshots[0].zeros_like(format!("{}{}", name, m));
        for (snapshot, &w) in snapshots.iter().zip(weights.iter()) {
            mode.axpy(w, snapshot);
        }
        // Eigenvectors past the numerical rank of the snapshot set carry
        // rounding noise and arrive far from orthogonal; deflate against the
        // accepted modes (twice, to absorb cancellation) before normalizing.
        for _ in 0..2 {
            for accepted in modes.iter() {
                let overlap = mode.l2_inner(accepted, volumes);
                mode.axpy(-overlap, accepted);
            }
        }
        let norm = mode.l2_norm(volumes);
        assert!(
            norm > 0.0,
            "POD mode {} has vanished energy; request fewer modes",
            m
        );
        mode.scale(1.0 / norm);
        modes.push(mode);
    }
    (modes, eigenvalues)
}

/// Cumulative fraction of snapshot energy captured by the leading modes:
/// entry `k` is `sum(lambda_0..=lambda_k) / sum(lambda)`.
pub fn cumulative_energy(eigenvalues: &DVector<f64>) -> DVector<f64> {
    let total: f64 = eigenvalues.iter().sum();
    assert!(total > 0.0, "snapshot set carries no energy");
    let mut running = 0.0;
    DVector::from_fn(eigenvalues.len(), |k, _| {
        running += eigenvalues[k];
        running / total
    })
}
