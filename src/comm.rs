//! Message passing between the host and the block workers.
//!
//! [Communicator] is the small set of primitives the tracking runtime needs:
//! barrier, broadcast, all-gather, variable all-gather and a rendezvous
//! point-to-point channel for host commands. Payloads are [Pod] values moved as raw
//! bytes, so every transport sees the same fixed layout.
//!
//! Collectives block until every member of the communicator has entered them.
//! All members must call them in the same order.
mod local;
#[cfg(feature = "mpi")]
mod mpi_comm;

use bytemuck::Pod;

pub use local::LocalComm;
#[cfg(feature = "mpi")]
pub use mpi_comm::MpiComm;

use crate::error::CommError;

/// Tags of point-to-point messages.
#[repr(i32)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum Tag {
    /// Carries a command for the worker loop.
    Router = 1,
    /// Carries the timestep the workers advance to.
    SyncTimestep = 2,
}

/// Primitives of a process group.
pub trait Communicator {
    /// Rank of this process within the group.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Block until all processes reached the barrier.
    fn barrier(&self) -> Result<(), CommError>;

    /// Copy `buf` on `root` into `buf` on every process.
    fn broadcast_into<T: Pod>(&self, root: usize, buf: &mut [T]) -> Result<(), CommError>;

    /// Gather one value from every process into `out`, ordered by rank.
    ///
    /// `out` must have `size()` elements, otherwise [CommError::BufferLength] is returned.
    fn all_gather_into<T: Pod>(&self, value: &T, out: &mut [T]) -> Result<(), CommError>;

    /// Gather a variable number of values from every process.
    ///
    /// The contribution of rank `r` has `counts[r]` elements and lands at `out[displs[r]..]`.
    /// A layout that does not fit `local` or `out` is rejected before anything is sent.
    fn all_gather_varcount_into<T: Pod>(
        &self,
        local: &[T],
        out: &mut [T],
        counts: &[i32],
        displs: &[i32],
    ) -> Result<(), CommError>;

    /// Send a value and return only once `dest` received it.
    fn synchronous_send(&self, dest: usize, tag: Tag, value: i32) -> Result<(), CommError>;

    /// Receive the next value with `tag` from `source`.
    fn receive(&self, source: usize, tag: Tag) -> Result<i32, CommError>;
}

/// The communicators a process takes part in.
pub struct ProcessGroups<C> {
    /// Host and all workers.
    pub world: C,
    /// Workers only, ranked densely by block id. `None` on the host.
    pub workers: Option<C>,
}

/// Fail unless a buffer of `actual` elements has the `expected` length.
pub(crate) fn check_len(expected: usize, actual: usize) -> Result<(), CommError> {
    if expected != actual {
        return Err(CommError::BufferLength { expected, actual });
    }
    Ok(())
}

/// Check a variable gather layout on `rank` and return the output range of every rank.
pub(crate) fn partition_ranges(
    rank: usize,
    size: usize,
    local_len: usize,
    out_len: usize,
    counts: &[i32],
    displs: &[i32],
) -> Result<Vec<std::ops::Range<usize>>, CommError> {
    check_len(size, counts.len())?;
    check_len(size, displs.len())?;

    let ranges = counts
        .iter()
        .zip(displs)
        .enumerate()
        .map(|(r, (&count, &displ))| {
            match (usize::try_from(count), usize::try_from(displ)) {
                (Ok(count), Ok(displ)) => Ok(displ..displ + count),
                _ => Err(CommError::NegativePartition { rank: r }),
            }
        })
        .collect::<Result<Vec<_>, _>>()?;

    check_len(ranges[rank].len(), local_len)?;
    if let Some(end) = ranges.iter().map(|range| range.end).max() {
        if end > out_len {
            return Err(CommError::BufferLength {
                expected: end,
                actual: out_len,
            });
        }
    }
    Ok(ranges)
}
