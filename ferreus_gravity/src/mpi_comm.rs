/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the collective trait over an MPI world communicator.
//
// Created on: 20 Jul 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! MPI-backed world, available with the `mpi` cargo feature.
//!
//! ```ignore
//! let (universe, _threading) =
//!     mpi::initialize_with_threading(mpi::Threading::Multiple).unwrap();
//! let comm = MpiComm::new(universe.world());
//! let mut solver = FmmGravity::new(comm);
//! ```
//!
//! MPI's default error handler aborts the job on a failed collective, which
//! matches the step's no-partial-progress failure model; the `Result`
//! surface of [`Collective`] therefore never carries a transport error here.

use mpi::datatype::{Partition, PartitionMut};
use mpi::topology::SimpleCommunicator;
use mpi::traits::{Communicator, CommunicatorCollectives};
use mpi::Count;

use crate::comm::{Collective, CommError};

/// A [`Collective`] world over an MPI communicator.
pub struct MpiComm {
    world: SimpleCommunicator,
}

impl MpiComm {
    pub fn new(world: SimpleCommunicator) -> Self {
        Self { world }
    }
}

fn displacements(counts: &[Count]) -> Vec<Count> {
    let mut displs = Vec::with_capacity(counts.len());
    let mut offset: Count = 0;
    for &count in counts {
        displs.push(offset);
        offset += count;
    }
    displs
}

impl Collective for MpiComm {
    fn rank(&self) -> usize {
        self.world.rank() as usize
    }

    fn size(&self) -> usize {
        self.world.size() as usize
    }

    fn all_gather(&self, value: usize) -> Result<Vec<usize>, CommError> {
        let mut gathered = vec![0 as Count; self.size()];
        self.world.all_gather_into(&(value as Count), &mut gathered[..]);
        Ok(gathered.into_iter().map(|v| v as usize).collect())
    }

    fn all_gatherv(&self, send: &[u8], recv_counts: &[usize]) -> Result<Vec<u8>, CommError> {
        let counts: Vec<Count> = recv_counts.iter().map(|&c| c as Count).collect();
        let displs = displacements(&counts);

        let mut recv = vec![0u8; recv_counts.iter().sum()];
        let mut partition = PartitionMut::new(&mut recv[..], &counts[..], &displs[..]);
        self.world.all_gather_varcount_into(send, &mut partition);
        Ok(recv)
    }

    fn all_to_allv(
        &self,
        send: &[u8],
        send_counts: &[usize],
        recv_counts: &[usize],
    ) -> Result<Vec<u8>, CommError> {
        let send_counts: Vec<Count> = send_counts.iter().map(|&c| c as Count).collect();
        let send_displs = displacements(&send_counts);
        let recv_counts_mpi: Vec<Count> = recv_counts.iter().map(|&c| c as Count).collect();
        let recv_displs = displacements(&recv_counts_mpi);

        let partition_send = Partition::new(send, &send_counts[..], &send_displs[..]);
        let mut recv = vec![0u8; recv_counts.iter().sum()];
        let mut partition_recv =
            PartitionMut::new(&mut recv[..], &recv_counts_mpi[..], &recv_displs[..]);
        self.world
            .all_to_all_varcount_into(&partition_send, &mut partition_recv);
        Ok(recv)
    }
}
