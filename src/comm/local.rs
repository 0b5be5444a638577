//! In-process transport over crossbeam channels.
//!
//! Each ordered pair of ranks owns two channels: an unbounded one carrying
//! collective payloads and a zero-capacity one carrying point-to-point messages, so
//! that a send only completes once the receiver took the message.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::time::Duration;

use bytemuck::Pod;
use crossbeam_channel::{
    bounded, unbounded, Receiver, RecvTimeoutError, SendTimeoutError, Sender,
};
use itertools::{iproduct, izip};

use super::{check_len, partition_ranges, Communicator, ProcessGroups, Tag};
use crate::{constants::HOST_RANK, error::CommError};

#[derive(Debug)]
struct Envelope {
    tag: Tag,
    value: i32,
}

/// One member of an in-process communicator.
pub struct LocalComm {
    rank: usize,
    size: usize,
    timeout: Option<Duration>,
    collective_tx: Vec<Sender<Vec<u8>>>,
    collective_rx: Vec<Receiver<Vec<u8>>>,
    p2p_tx: Vec<Sender<Envelope>>,
    p2p_rx: Vec<Receiver<Envelope>>,
    pending: RefCell<Vec<VecDeque<Envelope>>>,
}

impl LocalComm {
    /// Create a communicator with `size` members, one per thread.
    ///
    /// With a `timeout`, every blocking operation fails with [CommError::Timeout]
    /// once it waited that long for a peer.
    pub fn group(size: usize, timeout: Option<Duration>) -> Vec<LocalComm> {
        let mut collective_tx = (0..size).map(|_| Vec::with_capacity(size)).collect::<Vec<_>>();
        let mut collective_rx = (0..size).map(|_| Vec::with_capacity(size)).collect::<Vec<_>>();
        let mut p2p_tx = (0..size).map(|_| Vec::with_capacity(size)).collect::<Vec<_>>();
        let mut p2p_rx = (0..size).map(|_| Vec::with_capacity(size)).collect::<Vec<_>>();

        // Senders are indexed by destination, receivers by source.
        for (from, to) in iproduct!(0..size, 0..size) {
            let (tx, rx) = unbounded();
            collective_tx[from].push(tx);
            collective_rx[to].push(rx);

            let (tx, rx) = bounded(0);
            p2p_tx[from].push(tx);
            p2p_rx[to].push(rx);
        }

        izip!(collective_tx, collective_rx, p2p_tx, p2p_rx)
            .enumerate()
            .map(
                |(rank, (collective_tx, collective_rx, p2p_tx, p2p_rx))| LocalComm {
                    rank,
                    size,
                    timeout,
                    collective_tx,
                    collective_rx,
                    p2p_tx,
                    p2p_rx,
                    pending: RefCell::new((0..size).map(|_| VecDeque::new()).collect()),
                },
            )
            .collect()
    }

    /// Create the process groups of a host and `nworkers` workers.
    ///
    /// Entry `r` belongs to world rank `r`. Worker ranks are world ranks shifted down by one.
    pub fn universe(nworkers: usize, timeout: Option<Duration>) -> Vec<ProcessGroups<LocalComm>> {
        let world = LocalComm::group(nworkers + 1, timeout);
        let mut workers = LocalComm::group(nworkers, timeout).into_iter();

        world
            .into_iter()
            .map(|world| {
                let workers = if world.rank() == HOST_RANK {
                    None
                } else {
                    workers.next()
                };
                ProcessGroups { world, workers }
            })
            .collect()
    }

    fn check_rank(&self, rank: usize) -> Result<(), CommError> {
        if rank < self.size {
            Ok(())
        } else {
            Err(CommError::InvalidRank {
                rank,
                size: self.size,
            })
        }
    }

    fn peers(&self) -> impl Iterator<Item = usize> {
        let rank = self.rank;
        (0..self.size).filter(move |&peer| peer != rank)
    }

    fn send_bytes(&self, peer: usize, bytes: Vec<u8>) -> Result<(), CommError> {
        self.collective_tx[peer]
            .send(bytes)
            .map_err(|_| CommError::Disconnected { peer })
    }

    fn send_to_peers(&self, bytes: &[u8]) -> Result<(), CommError> {
        for peer in self.peers() {
            self.send_bytes(peer, bytes.to_vec())?;
        }
        Ok(())
    }

    fn recv_bytes(&self, peer: usize, expected: Option<usize>) -> Result<Vec<u8>, CommError> {
        let bytes = recv_with_timeout(&self.collective_rx[peer], self.timeout, peer)?;
        match expected {
            Some(expected) if expected != bytes.len() => Err(CommError::SizeMismatch {
                peer,
                expected,
                actual: bytes.len(),
            }),
            _ => Ok(bytes),
        }
    }
}

fn recv_with_timeout<T>(
    rx: &Receiver<T>,
    timeout: Option<Duration>,
    peer: usize,
) -> Result<T, CommError> {
    match timeout {
        Some(timeout) => rx.recv_timeout(timeout).map_err(|err| match err {
            RecvTimeoutError::Timeout => CommError::Timeout { peer },
            RecvTimeoutError::Disconnected => CommError::Disconnected { peer },
        }),
        None => rx.recv().map_err(|_| CommError::Disconnected { peer }),
    }
}

impl Communicator for LocalComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn barrier(&self) -> Result<(), CommError> {
        self.send_to_peers(&[])?;
        for peer in self.peers() {
            self.recv_bytes(peer, Some(0))?;
        }
        Ok(())
    }

    fn broadcast_into<T: Pod>(&self, root: usize, buf: &mut [T]) -> Result<(), CommError> {
        self.check_rank(root)?;

        if self.rank == root {
            return self.send_to_peers(bytemuck::cast_slice(buf));
        }

        let bytes = self.recv_bytes(root, Some(std::mem::size_of_val(buf)))?;
        bytemuck::cast_slice_mut::<T, u8>(buf).copy_from_slice(&bytes);
        Ok(())
    }

    fn all_gather_into<T: Pod>(&self, value: &T, out: &mut [T]) -> Result<(), CommError> {
        check_len(self.size, out.len())?;

        self.send_to_peers(bytemuck::bytes_of(value))?;

        out[self.rank] = *value;
        for peer in self.peers() {
            let bytes = self.recv_bytes(peer, Some(std::mem::size_of::<T>()))?;
            out[peer] = bytemuck::pod_read_unaligned(&bytes);
        }
        Ok(())
    }

    fn all_gather_varcount_into<T: Pod>(
        &self,
        local: &[T],
        out: &mut [T],
        counts: &[i32],
        displs: &[i32],
    ) -> Result<(), CommError> {
        let ranges = partition_ranges(
            self.rank,
            self.size,
            local.len(),
            out.len(),
            counts,
            displs,
        )?;

        self.send_to_peers(bytemuck::cast_slice(local))?;

        for (rank, range) in ranges.into_iter().enumerate() {
            if rank == self.rank {
                out[range].copy_from_slice(local);
                continue;
            }
            let bytes = self.recv_bytes(rank, Some(range.len() * std::mem::size_of::<T>()))?;
            bytemuck::cast_slice_mut::<T, u8>(&mut out[range]).copy_from_slice(&bytes);
        }
        Ok(())
    }

    fn synchronous_send(&self, dest: usize, tag: Tag, value: i32) -> Result<(), CommError> {
        self.check_rank(dest)?;

        let envelope = Envelope { tag, value };
        let tx = &self.p2p_tx[dest];
        match self.timeout {
            Some(timeout) => tx.send_timeout(envelope, timeout).map_err(|err| match err {
                SendTimeoutError::Timeout(_) => CommError::Timeout { peer: dest },
                SendTimeoutError::Disconnected(_) => CommError::Disconnected { peer: dest },
            }),
            None => tx
                .send(envelope)
                .map_err(|_| CommError::Disconnected { peer: dest }),
        }
    }

    fn receive(&self, source: usize, tag: Tag) -> Result<i32, CommError> {
        self.check_rank(source)?;

        let mut pending = self.pending.borrow_mut();
        let queue = &mut pending[source];
        if let Some(position) = queue.iter().position(|envelope| envelope.tag == tag) {
            if let Some(envelope) = queue.remove(position) {
                return Ok(envelope.value);
            }
        }

        loop {
            let envelope = recv_with_timeout(&self.p2p_rx[source], self.timeout, source)?;
            if envelope.tag == tag {
                return Ok(envelope.value);
            }
            queue.push_back(envelope);
        }
    }
}

#[cfg(test)]
mod test {
    use std::thread;
    use std::time::Duration;

    use super::LocalComm;
    use crate::{
        comm::{Communicator, Tag},
        error::CommError,
    };

    fn run_group<F, R>(size: usize, f: F) -> Vec<R>
    where
        F: Fn(LocalComm) -> R + Send + Sync + Copy + 'static,
        R: Send + 'static,
    {
        let handles = LocalComm::group(size, Some(Duration::from_secs(10)))
            .into_iter()
            .map(|comm| thread::spawn(move || f(comm)))
            .collect::<Vec<_>>();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    }

    #[test]
    fn test_all_gather() {
        let results = run_group(4, |comm| {
            let mut out = vec![0i32; comm.size()];
            comm.all_gather_into(&(10 * comm.rank() as i32), &mut out)
                .unwrap();
            out
        });

        for out in results {
            assert_eq!(vec![0, 10, 20, 30], out);
        }
    }

    #[test]
    fn test_all_gather_varcount() {
        let results = run_group(3, |comm| {
            let rank = comm.rank() as i32;
            let local = vec![rank; comm.rank() + 1];
            let counts = [1, 2, 3];
            let displs = [0, 1, 3];
            let mut out = vec![-1; 6];
            comm.all_gather_varcount_into(&local, &mut out, &counts, &displs)
                .unwrap();
            comm.barrier().unwrap();
            out
        });

        for out in results {
            assert_eq!(vec![0, 1, 1, 2, 2, 2], out);
        }
    }

    #[test]
    fn test_gather_rejects_bad_buffers() {
        let mut group = LocalComm::group(3, None);
        let comm = group.remove(1);

        let mut out = vec![0i32; 2];
        assert_eq!(
            Err(CommError::BufferLength {
                expected: 3,
                actual: 2
            }),
            comm.all_gather_into(&4, &mut out)
        );

        let local = [1, 1];
        let mut out = vec![0i32; 4];
        assert_eq!(
            Err(CommError::BufferLength {
                expected: 5,
                actual: 4
            }),
            comm.all_gather_varcount_into(&local, &mut out, &[1, 2, 2], &[0, 1, 3])
        );
        assert_eq!(
            Err(CommError::BufferLength {
                expected: 3,
                actual: 2
            }),
            comm.all_gather_varcount_into(&local, &mut out, &[1, 2], &[0, 1])
        );
        assert_eq!(
            Err(CommError::BufferLength {
                expected: 1,
                actual: 2
            }),
            comm.all_gather_varcount_into(&local, &mut out, &[2, 1, 1], &[0, 2, 3])
        );
        assert_eq!(
            Err(CommError::NegativePartition { rank: 2 }),
            comm.all_gather_varcount_into(&local, &mut out, &[1, 2, 1], &[0, 1, -1])
        );
    }

    #[test]
    fn test_broadcast() {
        let results = run_group(3, |comm| {
            let mut buf = if comm.rank() == 1 {
                vec![1.5f32, 2.5]
            } else {
                vec![0.0; 2]
            };
            comm.broadcast_into(1, &mut buf).unwrap();
            buf
        });

        for buf in results {
            assert_eq!(vec![1.5, 2.5], buf);
        }
    }

    #[test]
    fn test_receive_buffers_other_tags() {
        let results = run_group(2, |comm| {
            if comm.rank() == 0 {
                comm.synchronous_send(1, Tag::SyncTimestep, 7).unwrap();
                comm.synchronous_send(1, Tag::Router, 3).unwrap();
                None
            } else {
                let router = comm.receive(0, Tag::Router).unwrap();
                let timestep = comm.receive(0, Tag::SyncTimestep).unwrap();
                Some((router, timestep))
            }
        });

        assert_eq!(Some((3, 7)), results[1]);
    }

    #[test]
    fn test_timeout() {
        let mut group = LocalComm::group(2, Some(Duration::from_millis(20)));
        let comm = group.remove(0);

        assert_eq!(
            Err(CommError::Timeout { peer: 1 }),
            comm.receive(1, Tag::Router)
        );
        assert_eq!(
            Err(CommError::InvalidRank { rank: 5, size: 2 }),
            comm.synchronous_send(5, Tag::Router, 0)
        );
    }

    #[test]
    fn test_disconnected_peer() {
        let mut group = LocalComm::group(2, None);
        let comm = group.remove(0);
        drop(group);

        assert_eq!(Err(CommError::Disconnected { peer: 1 }), comm.barrier());
    }

    #[test]
    fn test_universe() {
        let universe = LocalComm::universe(3, None);

        assert_eq!(4, universe.len());
        assert!(universe[0].workers.is_none());
        for (rank, groups) in universe.iter().enumerate().skip(1) {
            assert_eq!(rank, groups.world.rank());
            let workers = groups.workers.as_ref().unwrap();
            assert_eq!(rank - 1, workers.rank());
            assert_eq!(3, workers.size());
        }
    }
}
