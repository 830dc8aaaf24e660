/////////////////////////////////////////////////////////////////////////////////////////////
//
// Exposes the public API for the distributed FMM gravity crate.
//
// Created on: 20 Jul 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! # Distributed Fast Multipole Method gravity
//!
//! This crate computes self-gravity for particle simulations whose bodies
//! are spread across many processes, each owning a local spatial tree. For
//! every locally owned body it accumulates the gravitational acceleration
//! due to *all* bodies in the world, in **O(N log N)** work and with
//! bounded, frontier-sized communication, instead of the O(N²) all-pairs
//! sum.
//!
//! One gravity step runs three collective phases:
//!
//! 1. **Scatter** - each rank selects the *frontier* of its tree (the
//!    shallowest branches lighter than a mass threshold) and publishes
//!    those cells to every rank.
//! 2. **Compute** - each rank walks its local tree once per catalogued
//!    cell, in parallel across cells, accumulating force, Jacobian and
//!    Hessian tensors under a multipole acceptance criterion.
//! 3. **Gather** - contributions are routed back to the owning ranks,
//!    reduced deterministically, and carried down to the particles with a
//!    second-order Taylor evaluation plus an exact intra-cell pair sum.
//!
//! The solver is transport- and storage-agnostic: trees, particle data and
//! collectives are consumed through small traits. [`MassOctree`] and
//! [`BodySet`] provide ready-made implementations of the data side, and
//! three worlds cover the transport side ([`SelfComm`], [`ThreadComm`] and,
//! with the `mpi` feature, an MPI-backed world).
//!
//! # Features:
//! - Frontier selection adapted to mass clustering, not tree depth
//! - Quadrupole-order far-field state (force, Jacobian, Hessian)
//! - Deterministic reduction independent of message arrival order
//! - Data-parallel far-field computation via `rayon`
//! - Optional MPI transport (`mpi` cargo feature) for clusters
//!
//! # Example
//!
//! ```
//! use ferreus_gravity::{
//!     BodySet, FmmGravity, GravityParams, MassOctree, ParticleStore, Point, SelfComm,
//! };
//!
//! // Two unit masses one unit apart.
//! let mut bodies = BodySet::new();
//! bodies.push(Point::new(0.0, 0.0, 0.0), 1.0);
//! bodies.push(Point::new(1.0, 0.0, 0.0), 1.0);
//!
//! // A local tree over the bodies; in a real simulation the domain
//! // decomposition owns this.
//! let tree = MassOctree::build(&bodies, 1, 0);
//!
//! // A single-process world; swap in ThreadComm or the MPI world for a
//! // multi-rank run.
//! let mut solver = FmmGravity::new(SelfComm);
//!
//! let params = GravityParams {
//!     max_cell_mass: 1.0,
//!     opening_angle: 0.5,
//! };
//! solver.step(&tree, &mut bodies, &params).unwrap();
//!
//! // Newton, as expected: the pair attracts with unit acceleration.
//! assert!((bodies.acceleration(0) - Point::new(1.0, 0.0, 0.0)).norm() < 1e-12);
//! assert!((bodies.acceleration(1) - Point::new(-1.0, 0.0, 0.0)).norm() < 1e-12);
//! ```
//!
//! # References
//!
//! 1. Barnes, J., & Hut, P. (1986). *A hierarchical O(N log N)
//!    force-calculation algorithm.* Nature, **324**, 446-449.
//! 2. Greengard, L., & Rokhlin, V. (1987). *A fast algorithm for particle
//!    simulations.* Journal of Computational Physics, **73**(2), 325-348.
//! 3. Warren, M. S., & Salmon, J. K. (1993). *A parallel hashed oct-tree
//!    N-body algorithm.* Proceedings of Supercomputing '93, 12-21.

pub mod comm;
pub mod frontier;
pub mod geometry;
pub mod kernels;
pub mod octree;
pub mod solver;
pub mod traits;

mod traversal;

#[cfg(feature = "mpi")]
pub mod mpi_comm;

#[doc(inline)]
pub use {
    comm::{Collective, CommError, SelfComm, ThreadComm},
    frontier::{select_frontier, FrontierCell},
    geometry::Point,
    octree::{BodySet, MassOctree},
    solver::{FmmGravity, GravityError, GravityParams},
    traits::{Branch, BranchId, ParticleStore, SpatialTree, NUM_OCTANTS},
};

#[cfg(feature = "mpi")]
#[doc(inline)]
pub use mpi_comm::MpiComm;
