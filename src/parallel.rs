//! Explicit execution context for distributed-memory decomposition.
//!
//! The core is single-threaded; the only concurrency concern is that the
//! underlying discretization may be split across mesh partitions. Instead of
//! mutable global process state, the partition configuration is an explicit
//! value threaded through the code, and temporarily running "as if single
//! partition" is a scoped operation whose restoration is guaranteed by
//! `Drop`, including on panic paths.

use log::debug;
use nalgebra::DVector;

/// The partition configuration a computation runs under.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionContext {
    partitions: usize,
    rank: usize,
}

impl ExecutionContext {
    /// # Panics
    ///
    /// Panics if `partitions == 0` or `rank >= partitions`.
    pub fn new(partitions: usize, rank: usize) -> Self {
        assert!(partitions >= 1, "there must be at least one partition");
        assert!(rank < partitions, "rank {} out of range for {} partitions", rank, partitions);
        Self { partitions, rank }
    }

    /// The single-partition configuration.
    pub fn serial() -> Self {
        Self::new(1, 0)
    }

    pub fn partitions(&self) -> usize {
        self.partitions
    }

    pub fn rank(&self) -> usize {
        self.rank
    }

    pub fn is_root(&self) -> bool {
        self.rank == 0
    }
}

/// Collective operations supplied by the parallel-decomposition collaborator.
///
/// All operations are collective and blocking: every partition participates,
/// and the reduced value is identical on every partition afterwards. The
/// in-process [`SerialCommunicator`] makes them identities.
pub trait Communicator {
    fn context(&self) -> ExecutionContext;

    /// Global sum of a per-partition scalar contribution.
    fn sum_scalar(&self, local: f64) -> f64;

    /// Entrywise global sum of a per-partition vector contribution.
    fn sum_vector(&self, local: &mut DVector<f64>);

    /// Concatenates per-partition boundary-patch values into the global,
    /// partition-ordered patch vector.
    fn concat_patch(&self, local: &DVector<f64>) -> DVector<f64>;
}

/// The trivial communicator of an undecomposed (single-partition) run.
#[derive(Debug, Clone, Copy, Default)]
pub struct SerialCommunicator;

impl Communicator for SerialCommunicator {
    fn context(&self) -> ExecutionContext {
        ExecutionContext::serial()
    }

    fn sum_scalar(&self, local: f64) -> f64 {
        local
    }

    fn sum_vector(&self, _local: &mut DVector<f64>) {}

    fn concat_patch(&self, local: &DVector<f64>) -> DVector<f64> {
        local.clone()
    }
}

/// Scoped suspension of the multi-partition configuration.
///
/// While the section is alive the context reports a single logical worker;
/// dropping it restores the saved configuration on every exit path,
/// including unwinding.
#[derive(Debug)]
pub struct GlobalSection<'a> {
    context: &'a mut ExecutionContext,
    saved: ExecutionContext,
}

impl<'a> GlobalSection<'a> {
    pub fn enter(context: &'a mut ExecutionContext) -> Self {
        let saved = *context;
        debug!("entering global section, suspending {} partitions", saved.partitions());
        *context = ExecutionContext::serial();
        Self { context, saved }
    }

    /// The configuration in effect inside the section.
    pub fn context(&self) -> ExecutionContext {
        *self.context
    }
}

impl Drop for GlobalSection<'_> {
    fn drop(&mut self) {
        *self.context = self.saved;
        debug!("left global section, restored {} partitions", self.saved.partitions());
    }
}
