/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares the collective communication trait plus the single-process and thread worlds.
//
// Created on: 20 Jul 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Collective communication.
//!
//! The solver needs exactly three collectives on the world communicator: an
//! all-gather of one integer, an all-gather of variable-size byte buffers
//! and an all-to-all of byte buffers. [`Collective`] captures that surface
//! so the solver is independent of the transport. [`SelfComm`] is the
//! trivial single-process world; [`ThreadComm`] runs several ranks as
//! threads of one process, which is how the integration tests exercise real
//! exchanges; the `mpi` feature adds an MPI-backed world for clusters.
//!
//! A failed collective poisons the whole gravity step. There is no partial
//! progress and no retry, the error simply propagates to the driver.

use std::fmt;
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::Duration;

/// Errors raised by a collective exchange.
#[derive(Debug)]
pub enum CommError {
    /// A participating rank stopped responding (panicked thread, poisoned
    /// world, or a timeout waiting on the rendezvous).
    Disconnected,

    /// A buffer size disagreed with the negotiated counts.
    CountMismatch {
        rank: usize,
        expected: usize,
        actual: usize,
    },
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CommError::Disconnected => write!(f, "collective aborted: a rank left the world"),
            CommError::CountMismatch {
                rank,
                expected,
                actual,
            } => write!(
                f,
                "collective count mismatch at rank {rank}: expected {expected} bytes, got {actual}"
            ),
        }
    }
}

impl std::error::Error for CommError {}

/// The collective operations consumed by the gravity solver.
///
/// All three calls are collective: every rank of the world must invoke them
/// in the same order. Buffers are opaque bytes; receive layouts are
/// contiguous per source rank, in ascending rank order.
pub trait Collective {
    /// This process's rank in `0..size()`.
    fn rank(&self) -> usize;

    /// Number of processes in the world.
    fn size(&self) -> usize;

    /// Gathers one integer from every rank, in rank order.
    fn all_gather(&self, value: usize) -> Result<Vec<usize>, CommError>;

    /// Gathers a variable-size buffer from every rank. `recv_counts[r]` is
    /// the byte count rank `r` contributes; the result concatenates the
    /// contributions in rank order.
    fn all_gatherv(&self, send: &[u8], recv_counts: &[usize]) -> Result<Vec<u8>, CommError>;

    /// Scatters `send` to the world: rank `d` receives the contiguous slice
    /// of length `send_counts[d]` at offset `sum(send_counts[..d])`. The
    /// result concatenates the pieces received from every rank, of lengths
    /// `recv_counts`, in rank order.
    fn all_to_allv(
        &self,
        send: &[u8],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Result<Vec<u8>, CommError>;
}

fn check_counts(rank: usize, expected: usize, actual: usize) -> Result<(), CommError> {
    if expected != actual {
        return Err(CommError::CountMismatch {
            rank,
            expected,
            actual,
        });
    }
    Ok(())
}

/// The one-process world. Every collective is a local copy.
#[derive(Debug, Default)]
pub struct SelfComm;

impl Collective for SelfComm {
    fn rank(&self) -> usize {
        0
    }

    fn size(&self) -> usize {
        1
    }

    fn all_gather(&self, value: usize) -> Result<Vec<usize>, CommError> {
        Ok(vec![value])
    }

    fn all_gatherv(&self, send: &[u8], recv_counts: &[usize]) -> Result<Vec<u8>, CommError> {
        check_counts(0, recv_counts[0], send.len())?;
        Ok(send.to_vec())
    }

    fn all_to_allv(
        &self,
        send: &[u8],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Result<Vec<u8>, CommError> {
        check_counts(0, send_counts[0], send.len())?;
        check_counts(0, recv_counts[0], send.len())?;
        Ok(send.to_vec())
    }
}

/// How long a rank waits at a rendezvous before declaring the world dead.
const RENDEZVOUS_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone, Copy, PartialEq)]
enum Phase {
    Deposit,
    Collect,
}

struct MailboxState {
    phase: Phase,
    deposited: usize,
    collected: usize,
    /// `slots[src][dst]` holds the piece rank `src` addressed to rank `dst`.
    slots: Vec<Vec<Option<Vec<u8>>>>,
}

struct Mailbox {
    size: usize,
    state: Mutex<MailboxState>,
    rendezvous: Condvar,
}

/// An in-process world of `size` ranks, one per thread.
///
/// Each collective is a full rendezvous on a shared mailbox: every rank
/// deposits one piece per destination, and once all have arrived every rank
/// collects the pieces addressed to it. The mailbox resets itself after
/// each round, so a world can run any number of collectives. A thread that
/// never shows up times the round out and fails the step on the surviving
/// ranks rather than hanging them.
pub struct ThreadComm {
    rank: usize,
    shared: Arc<Mailbox>,
}

impl ThreadComm {
    /// Creates the handles of a `size`-rank world, indexed by rank.
    pub fn world(size: usize) -> Vec<ThreadComm> {
        assert!(size > 0, "a world needs at least one rank");
        let shared = Arc::new(Mailbox {
            size,
            state: Mutex::new(MailboxState {
                phase: Phase::Deposit,
                deposited: 0,
                collected: 0,
                slots: (0..size)
                    .map(|_| (0..size).map(|_| None).collect())
                    .collect(),
            }),
            rendezvous: Condvar::new(),
        });
        log::debug!("thread world of {size} ranks created");
        (0..size)
            .map(|rank| ThreadComm {
                rank,
                shared: Arc::clone(&shared),
            })
            .collect()
    }

    fn wait_while<'a>(
        &self,
        mut guard: MutexGuard<'a, MailboxState>,
        blocked: Phase,
    ) -> Result<MutexGuard<'a, MailboxState>, CommError> {
        while guard.phase == blocked {
            let (next, timeout) = self
                .shared
                .rendezvous
                .wait_timeout(guard, RENDEZVOUS_TIMEOUT)
                .map_err(|_| CommError::Disconnected)?;
            guard = next;
            if timeout.timed_out() && guard.phase == blocked {
                return Err(CommError::Disconnected);
            }
        }
        Ok(guard)
    }

    /// One rendezvous: delivers `pieces[d]` to rank `d`, returns the pieces
    /// addressed to this rank in ascending source-rank order.
    fn round_trip(&self, pieces: Vec<Vec<u8>>) -> Result<Vec<Vec<u8>>, CommError> {
        let size = self.shared.size;
        debug_assert_eq!(pieces.len(), size);

        let guard = self
            .shared
            .state
            .lock()
            .map_err(|_| CommError::Disconnected)?;
        // A rank can race ahead into the next round while others still
        // collect the previous one; hold it at the door until the mailbox
        // has been emptied.
        let mut state = self.wait_while(guard, Phase::Collect)?;

        state.slots[self.rank] = pieces.into_iter().map(Some).collect();
        state.deposited += 1;
        if state.deposited == size {
            state.phase = Phase::Collect;
            self.shared.rendezvous.notify_all();
        } else {
            state = self.wait_while(state, Phase::Deposit)?;
        }

        let mut received = Vec::with_capacity(size);
        for src in 0..size {
            received.push(state.slots[src][self.rank].take().ok_or(CommError::Disconnected)?);
        }

        state.collected += 1;
        if state.collected == size {
            state.deposited = 0;
            state.collected = 0;
            state.phase = Phase::Deposit;
            self.shared.rendezvous.notify_all();
        }
        Ok(received)
    }
}

impl Collective for ThreadComm {
    fn rank(&self) -> usize {
        self.rank
    }

    fn size(&self) -> usize {
        self.shared.size
    }

    fn all_gather(&self, value: usize) -> Result<Vec<usize>, CommError> {
        let bytes = (value as u64).to_le_bytes().to_vec();
        let received = self.round_trip(vec![bytes; self.size()])?;
        received
            .into_iter()
            .map(|piece| {
                let raw: [u8; 8] = piece.try_into().map_err(|_| CommError::Disconnected)?;
                Ok(u64::from_le_bytes(raw) as usize)
            })
            .collect()
    }

    fn all_gatherv(&self, send: &[u8], recv_counts: &[usize]) -> Result<Vec<u8>, CommError> {
        let received = self.round_trip(vec![send.to_vec(); self.size()])?;
        let mut out = Vec::with_capacity(recv_counts.iter().sum());
        for (src, piece) in received.into_iter().enumerate() {
            check_counts(src, recv_counts[src], piece.len())?;
            out.extend_from_slice(&piece);
        }
        Ok(out)
    }

    fn all_to_allv(
        &self,
        send: &[u8],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Result<Vec<u8>, CommError> {
        check_counts(self.rank, send_counts.iter().sum(), send.len())?;

        let mut pieces = Vec::with_capacity(self.size());
        let mut offset = 0;
        for &count in send_counts {
            pieces.push(send[offset..offset + count].to_vec());
            offset += count;
        }

        let received = self.round_trip(pieces)?;
        let mut out = Vec::with_capacity(recv_counts.iter().sum());
        for (src, piece) in received.into_iter().enumerate() {
            check_counts(src, recv_counts[src], piece.len())?;
            out.extend_from_slice(&piece);
        }
        Ok(out)
    }
}
