//! Utility routines.

use bytemuck::Pod;
use num::traits::Zero;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use crate::{comm::Communicator, error::CommError};

/// Gather array to all processes.
///
/// The result is the concatenation of all local arrays, ordered by rank, and is
/// identical on every process.
pub fn gather_to_all<T: Pod, C: Communicator>(arr: &[T], comm: &C) -> Result<Vec<T>, CommError> {
    // First we need to broadcast the individual sizes on each process.
    let local_len = arr.len() as i32;
    let mut sizes = vec![0_i32; comm.size()];
    comm.all_gather_into(&local_len, &mut sizes)?;

    let recv_len = sizes.iter().sum::<i32>() as usize;
    let recv_displs = displacements(&sizes);

    let mut recvbuffer = vec![T::zeroed(); recv_len];
    comm.all_gather_varcount_into(arr, &mut recvbuffer, &sizes, &recv_displs)?;

    Ok(recvbuffer)
}

/// Get a seeded rng
pub fn seeded_rng(seed: usize) -> ChaCha8Rng {
    ChaCha8Rng::seed_from_u64(seed as u64)
}

/// Compute displacements from a vector of counts.
///
/// This is useful for varcount operations. Let
/// count [ 3, 4, 5]. Then the corresponding displacements are
/// [0, 3, 7]. Note that the last element `5` is ignored.
pub fn displacements<T: Zero + Copy>(counts: &[T]) -> Vec<T> {
    counts
        .iter()
        .scan(T::zero(), |acc, &x| {
            let tmp = *acc;
            *acc = *acc + x;
            Some(tmp)
        })
        .collect()
}

#[cfg(test)]
mod test {
    use std::thread;

    use super::{displacements, gather_to_all};
    use crate::comm::{Communicator, LocalComm};

    #[test]
    fn test_displacements() {
        assert_eq!(vec![0, 3, 7], displacements(&[3, 4, 5]));
        assert_eq!(vec![0usize, 0, 2], displacements(&[0usize, 2, 1]));
        assert!(displacements::<i32>(&[]).is_empty());
    }

    #[test]
    fn test_gather_to_all() {
        let handles = LocalComm::group(3, None)
            .into_iter()
            .map(|comm| {
                thread::spawn(move || {
                    // Rank r contributes r copies of r.
                    let local = vec![comm.rank() as u64; comm.rank()];
                    gather_to_all(&local, &comm).unwrap()
                })
            })
            .collect::<Vec<_>>();

        for handle in handles {
            assert_eq!(vec![1, 2, 2], handle.join().unwrap());
        }
    }
}
