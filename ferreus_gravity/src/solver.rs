/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the three-phase distributed gravity step over local trees.
//
// Created on: 20 Jul 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! The distributed gravity step.
//!
//! Each participating process owns a spatial subset of the simulation and a
//! local tree over it. One step computes, for every locally owned body, the
//! gravitational acceleration due to all mass in the world:
//!
//! 1. [`FmmGravity::select_and_scatter`] publishes every rank's frontier
//!    cells to every rank (one all-gather of sizes, one variable all-gather
//!    of cells).
//! 2. [`FmmGravity::compute`] accumulates, in parallel over the catalog,
//!    the far field of the local tree onto every cell in the world.
//! 3. [`FmmGravity::gather_and_apply`] routes each cell's contributions
//!    back to its owner (one all-to-all), reduces them in ascending rank
//!    order and pushes the result down to the particles.
//!
//! All three are collectives: every rank must call them, in order. The only
//! state carried between phases is the per-rank cell counts pairing the
//! scatter with its gather; the solver is stateless across steps.

use std::fmt;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::comm::{Collective, CommError};
use crate::frontier::{select_frontier, FrontierCell, FRONTIER_CELL_BYTES};
use crate::traits::{ParticleStore, SpatialTree};
use crate::traversal::{intra_cell_direct_sum, sink_descent, source_walk};

/// Tuning parameters of a gravity step.
#[derive(Clone, Copy, Debug, Serialize, Deserialize)]
pub struct GravityParams {
    /// Frontier resolution: a subtree lighter than this is published as a
    /// single cell. Larger values mean fewer, coarser cells and less
    /// traffic; smaller values mean more cells and a sharper far field.
    pub max_cell_mass: f64,

    /// Multipole opening angle in `(0, 1]`. Smaller angles open more
    /// branches and increase accuracy.
    pub opening_angle: f64,
}

impl Default for GravityParams {
    fn default() -> Self {
        Self {
            max_cell_mass: 1.0,
            opening_angle: 0.5,
        }
    }
}

impl GravityParams {
    /// Checks the parameter ranges. Runs at the start of a step; a bad
    /// configuration never reaches a collective.
    pub fn validate(&self) -> Result<(), GravityError> {
        check_max_cell_mass(self.max_cell_mass)?;
        check_opening_angle(self.opening_angle)
    }
}

fn check_max_cell_mass(max_cell_mass: f64) -> Result<(), GravityError> {
    if !max_cell_mass.is_finite() || max_cell_mass <= 0.0 {
        return Err(GravityError::Config {
            message: format!("max_cell_mass must be positive and finite, got {max_cell_mass}"),
        });
    }
    Ok(())
}

fn check_opening_angle(opening_angle: f64) -> Result<(), GravityError> {
    if !opening_angle.is_finite() || opening_angle <= 0.0 || opening_angle > 1.0 {
        return Err(GravityError::Config {
            message: format!("opening_angle must lie in (0, 1], got {opening_angle}"),
        });
    }
    Ok(())
}

/// Errors that can abort a gravity step.
///
/// There is no local recovery: any of these poisons the step on this rank
/// and, through the stalled collectives, on every other rank. The driver
/// decides whether the simulation survives.
#[derive(Debug)]
pub enum GravityError {
    /// A tuning parameter was out of range, or the step primitives were
    /// invoked out of order.
    Config { message: String },

    /// A collective exchange failed.
    Collective(CommError),

    /// Exchanged data contradicted itself: mismatched cell metadata during
    /// reduction, or a returned cell whose branch no longer resolves.
    /// Indicates a bug, not a recoverable condition.
    Invariant { message: String },
}

impl fmt::Display for GravityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GravityError::Config { message } => write!(f, "gravity configuration: {message}"),
            GravityError::Collective(err) => write!(f, "gravity collective failed: {err}"),
            GravityError::Invariant { message } => {
                write!(f, "gravity invariant violated: {message}")
            }
        }
    }
}

impl std::error::Error for GravityError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            GravityError::Collective(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CommError> for GravityError {
    fn from(err: CommError) -> Self {
        GravityError::Collective(err)
    }
}

/// The distributed FMM gravity solver.
///
/// Generic over the collective transport; see [`crate::comm`] for the
/// available worlds.
pub struct FmmGravity<C: Collective> {
    comm: C,
    /// Every rank's frontier cells, concatenated in rank order.
    catalog: Vec<FrontierCell>,
    /// Cells per rank in the catalog. Non-empty exactly between a scatter
    /// and its gather.
    counts: Vec<usize>,
}

impl<C: Collective> FmmGravity<C> {
    pub fn new(comm: C) -> Self {
        Self {
            comm,
            catalog: Vec::new(),
            counts: Vec::new(),
        }
    }

    /// The world this solver runs in.
    pub fn comm(&self) -> &C {
        &self.comm
    }

    /// The scattered catalog: every rank's cells in rank order. Empty
    /// outside a step.
    pub fn catalog(&self) -> &[FrontierCell] {
        &self.catalog
    }

    /// Cells contributed per rank, indexed by rank. Empty outside a step.
    pub fn frontier_counts(&self) -> &[usize] {
        &self.counts
    }

    /// Runs a full gravity step: scatter, compute, gather.
    pub fn step<T, S>(
        &mut self,
        tree: &T,
        store: &mut S,
        params: &GravityParams,
    ) -> Result<(), GravityError>
    where
        T: SpatialTree + Sync,
        S: ParticleStore + Sync,
    {
        params.validate()?;
        self.select_and_scatter(tree, params.max_cell_mass)?;
        self.compute(tree, store, params.opening_angle)?;
        self.gather_and_apply(tree, store)
    }

    /// Phase one: selects the local frontier and publishes it to the world.
    ///
    /// Afterwards every rank holds the same catalog of cells, and this
    /// rank's own cells sit in it unmodified and in submission order, which
    /// the gather relies on to route contributions home.
    pub fn select_and_scatter<T: SpatialTree>(
        &mut self,
        tree: &T,
        max_cell_mass: f64,
    ) -> Result<(), GravityError> {
        check_max_cell_mass(max_cell_mass)?;

        let cells = select_frontier(tree, max_cell_mass);
        let counts = self.comm.all_gather(cells.len())?;
        let byte_counts: Vec<usize> = counts.iter().map(|&n| n * FRONTIER_CELL_BYTES).collect();

        let send: &[u8] = bytemuck::cast_slice(&cells);
        let received = self.comm.all_gatherv(send, &byte_counts)?;

        // The owner's slice of the catalog must be byte-identical to what
        // it submitted.
        let rank = self.comm.rank();
        let offset: usize = byte_counts[..rank].iter().sum();
        if received[offset..offset + byte_counts[rank]] != *send {
            return Err(GravityError::Invariant {
                message: format!("rank {rank}: scattered catalog reordered this rank's cells"),
            });
        }

        log::debug!(
            "gravity scatter: rank {rank} published {} cells, catalog holds {}",
            cells.len(),
            counts.iter().sum::<usize>()
        );

        self.catalog = bytemuck::pod_collect_to_vec(&received);
        self.counts = counts;
        Ok(())
    }

    /// Phase two: accumulates the far field of the local tree onto every
    /// cell of the catalog.
    ///
    /// Cells are independent sinks, so the loop runs data-parallel across
    /// the catalog; each iteration writes only its own cell's tensors.
    pub fn compute<T, S>(
        &mut self,
        tree: &T,
        store: &S,
        opening_angle: f64,
    ) -> Result<(), GravityError>
    where
        T: SpatialTree + Sync,
        S: ParticleStore + Sync,
    {
        check_opening_angle(opening_angle)?;
        self.check_step_in_progress("compute")?;

        self.catalog
            .par_iter_mut()
            .for_each(|cell| source_walk(tree, store, tree.root(), cell, opening_angle));
        Ok(())
    }

    /// Phase three: routes every cell's accumulated tensors back to its
    /// owner, reduces the per-rank contributions and applies the result to
    /// the particles under each owned cell.
    pub fn gather_and_apply<T, S>(&mut self, tree: &T, store: &mut S) -> Result<(), GravityError>
    where
        T: SpatialTree,
        S: ParticleStore,
    {
        self.check_step_in_progress("gather_and_apply")?;

        let rank = self.comm.rank();
        let size = self.comm.size();
        let mine = self.counts[rank];

        // Each rank slices the catalog it computed on back to the cell
        // owners; the send layout is exactly the scatter layout, and every
        // peer returns this rank's cells in the order it published them.
        let send: &[u8] = bytemuck::cast_slice(&self.catalog);
        let send_counts: Vec<usize> = self
            .counts
            .iter()
            .map(|&n| n * FRONTIER_CELL_BYTES)
            .collect();
        let recv_counts = vec![mine * FRONTIER_CELL_BYTES; size];
        let received = self.comm.all_to_allv(send, &send_counts, &recv_counts)?;
        let mut chunks: Vec<FrontierCell> = bytemuck::pod_collect_to_vec(&received);

        // Element-wise reduction into the first chunk, ascending rank order
        // so the floating-point summation order is independent of arrival.
        for peer in 1..size {
            let (own_chunk, peer_chunks) = chunks.split_at_mut(peer * mine);
            for slot in 0..mine {
                let own = &mut own_chunk[slot];
                let contribution = &peer_chunks[slot];
                if !own.same_slot(contribution) {
                    return Err(GravityError::Invariant {
                        message: format!(
                            "rank {rank}: slot {slot} returned by rank {peer} does not match cell {}",
                            own.id
                        ),
                    });
                }
                own.fc += contribution.fc;
                for k in 0..9 {
                    own.dfcdr[k] += contribution.dfcdr[k];
                }
                for k in 0..27 {
                    own.dfcdrdr[k] += contribution.dfcdrdr[k];
                    debug_assert!(
                        own.dfcdrdr[k].is_finite(),
                        "non-finite Hessian after reduction"
                    );
                }
            }
        }

        // Push each reduced expansion down to the bodies under its branch,
        // then settle the cell's internal interactions exactly.
        for slot in 0..mine {
            let cell = chunks[slot];
            let sink = tree.find(cell.id).ok_or_else(|| GravityError::Invariant {
                message: format!("rank {rank}: cell {} no longer resolves to a branch", cell.id),
            })?;

            let mut touched = Vec::new();
            sink_descent(tree, store, sink, &cell, &mut touched);
            debug_assert!(
                !touched.is_empty(),
                "frontier cell {} covers no local bodies",
                cell.id
            );
            intra_cell_direct_sum(store, &touched);
        }

        // Step complete; drop the paired scatter state.
        self.catalog.clear();
        self.counts.clear();
        Ok(())
    }

    fn check_step_in_progress(&self, phase: &str) -> Result<(), GravityError> {
        if self.counts.len() != self.comm.size() {
            return Err(GravityError::Config {
                message: format!("{phase} invoked without a preceding select_and_scatter"),
            });
        }
        Ok(())
    }
}
