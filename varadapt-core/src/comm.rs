//! Collective communication between cooperating processes.
//!
//! The estimators never hold a communicator; one is passed into every
//! operation that needs the group. [`Communicator::all_reduce`] is the only
//! collective used by the crate and it is blocking: every rank in the group
//! has to call it in the same logical step or the others wait forever. No
//! timeout or cancellation is provided.

use crate::errors::{AdaptError, AdaptResult};
use std::sync::{Arc, Barrier, Mutex, MutexGuard, PoisonError};

/// User-defined reduction operator: folds `incoming` into `acc`.
///
/// Must be associative. Implementations are free to apply it in any pairing
/// order, so results may differ in the last bits between group layouts.
pub type ReduceFn = fn(incoming: &[f64], acc: &mut [f64]);

/// A fixed-size group of cooperating processes.
pub trait Communicator {
    /// Identity of this process within the group, in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Blocking all-reduce of a fixed-length payload.
    ///
    /// Every rank receives the same reduced payload.
    fn all_reduce(&self, payload: &[f64], op: ReduceFn) -> AdaptResult<Vec<f64>>;
}

/// The trivial group containing only the calling process.
#[derive(Debug, Clone, Copy, Default)]
pub struct SelfCommunicator;

impl Communicator for SelfCommunicator {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_reduce(&self, payload: &[f64], _op: ReduceFn) -> AdaptResult<Vec<f64>> {
        Ok(payload.to_vec())
    }
}

#[derive(Debug)]
struct Group {
    slots: Mutex<Vec<Vec<f64>>>,
    barrier: Barrier,
}

impl Group {
    fn slots(&self) -> MutexGuard<'_, Vec<Vec<f64>>> {
        // Slots are plain data; a panic elsewhere cannot leave them half-written
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// One rank of an in-process group whose members run on separate threads.
///
/// Create the whole group with [`ThreadCommunicator::group`] and move each
/// member to its own thread. Contributions are folded in rank order, so all
/// ranks observe a bit-identical result.
#[derive(Debug)]
pub struct ThreadCommunicator {
    rank: usize,
    size: usize,
    group: Arc<Group>,
}

impl ThreadCommunicator {
    /// Create `size` connected communicators, one per rank.
    pub fn group(size: usize) -> AdaptResult<Vec<Self>> {
        if size == 0 {
            return Err(AdaptError::InvalidConfiguration(
                "a communicator group needs at least one rank".to_string(),
            ));
        }

        let group = Arc::new(Group {
            slots: Mutex::new(vec![Vec::new(); size]),
            barrier: Barrier::new(size),
        });
        Ok((0..size)
            .map(|rank| Self {
                rank,
                size,
                group: Arc::clone(&group),
            })
            .collect())
    }
}

impl Communicator for ThreadCommunicator {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.size
    }

    fn all_reduce(&self, payload: &[f64], op: ReduceFn) -> AdaptResult<Vec<f64>> {
        self.group.slots()[self.rank] = payload.to_vec();
        self.group.barrier.wait();

        let reduced = fold_in_rank_order(&self.group.slots(), op);

        // No rank may publish its next contribution before everyone has read this one
        self.group.barrier.wait();
        reduced
    }
}

fn fold_in_rank_order(contributions: &[Vec<f64>], op: ReduceFn) -> AdaptResult<Vec<f64>> {
    let (first, rest) = contributions
        .split_first()
        .ok_or_else(|| AdaptError::Communication("empty communicator group".to_string()))?;

    let mut acc = first.clone();
    for (offset, contribution) in rest.iter().enumerate() {
        if contribution.len() != acc.len() {
            return Err(AdaptError::Communication(format!(
                "rank {} contributed {} values but rank 0 contributed {}",
                offset + 1,
                contribution.len(),
                acc.len()
            )));
        }
        op(contribution, &mut acc);
    }
    Ok(acc)
}
