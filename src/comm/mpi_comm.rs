//! Transport over MPI.
//!
//! Payloads travel as `u8` buffers so that any [Pod] type can be exchanged
//! without an MPI datatype of its own. MPI offers no timeouts, a dead peer blocks.

use bytemuck::Pod;
use mpi::{
    datatype::PartitionMut,
    topology::{Color, SimpleCommunicator},
    traits::{Communicator as MpiCommunicator, CommunicatorCollectives, Destination, Root, Source},
};

use super::{check_len, partition_ranges, Communicator, ProcessGroups, Tag};
use crate::{constants::HOST_RANK, error::CommError};

/// An MPI communicator.
pub struct MpiComm {
    comm: SimpleCommunicator,
}

impl MpiComm {
    /// Wrap an MPI communicator.
    pub fn new(comm: SimpleCommunicator) -> Self {
        Self { comm }
    }

    /// Split `world` into the host and the worker group.
    ///
    /// Every process of `world` must call this. Workers keep their relative order, so
    /// world rank `r` becomes worker rank `r - 1`.
    pub fn process_groups(world: SimpleCommunicator) -> ProcessGroups<MpiComm> {
        let is_host = world.rank() as usize == HOST_RANK;
        let color = if is_host {
            Color::undefined()
        } else {
            Color::with_value(1)
        };
        let workers = world.split_by_color(color).map(MpiComm::new);

        ProcessGroups {
            world: MpiComm::new(world),
            workers,
        }
    }

    fn check_rank(&self, rank: usize) -> Result<(), CommError> {
        let size = self.size();
        if rank < size {
            Ok(())
        } else {
            Err(CommError::InvalidRank { rank, size })
        }
    }
}

impl Communicator for MpiComm {
    fn rank(&self) -> usize {
        self.comm.rank() as usize
    }

    fn size(&self) -> usize {
        self.comm.size() as usize
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.comm.barrier();
        Ok(())
    }

    fn broadcast_into<T: Pod>(&self, root: usize, buf: &mut [T]) -> Result<(), CommError> {
        self.check_rank(root)?;
        let bytes: &mut [u8] = bytemuck::cast_slice_mut(buf);
        self.comm
            .process_at_rank(root as i32)
            .broadcast_into(bytes);
        Ok(())
    }

    fn all_gather_into<T: Pod>(&self, value: &T, out: &mut [T]) -> Result<(), CommError> {
        check_len(self.size(), out.len())?;
        let send: &[u8] = bytemuck::bytes_of(value);
        let recv: &mut [u8] = bytemuck::cast_slice_mut(out);
        self.comm.all_gather_into(send, recv);
        Ok(())
    }

    fn all_gather_varcount_into<T: Pod>(
        &self,
        local: &[T],
        out: &mut [T],
        counts: &[i32],
        displs: &[i32],
    ) -> Result<(), CommError> {
        partition_ranges(
            self.rank(),
            self.size(),
            local.len(),
            out.len(),
            counts,
            displs,
        )?;

        let width = std::mem::size_of::<T>() as i32;
        let byte_counts = counts.iter().map(|c| c * width).collect::<Vec<_>>();
        let byte_displs = displs.iter().map(|d| d * width).collect::<Vec<_>>();

        let send: &[u8] = bytemuck::cast_slice(local);
        let recv: &mut [u8] = bytemuck::cast_slice_mut(out);
        let mut partition = PartitionMut::new(recv, byte_counts, &byte_displs[..]);

        self.comm.all_gather_varcount_into(send, &mut partition);
        Ok(())
    }

    fn synchronous_send(&self, dest: usize, tag: Tag, value: i32) -> Result<(), CommError> {
        self.check_rank(dest)?;
        self.comm
            .process_at_rank(dest as i32)
            .synchronous_send_with_tag(&value, tag as i32);
        Ok(())
    }

    fn receive(&self, source: usize, tag: Tag) -> Result<i32, CommError> {
        self.check_rank(source)?;
        let (value, _status) = self
            .comm
            .process_at_rank(source as i32)
            .receive_with_tag::<i32>(tag as i32);
        Ok(value)
    }
}
