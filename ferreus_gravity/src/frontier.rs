/////////////////////////////////////////////////////////////////////////////////////////////
//
// Defines the frontier transport record and the mass-threshold frontier selection.
//
// Created on: 20 Jul 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Frontier selection.
//!
//! The frontier of a local tree is the shallowest set of branches whose
//! subtree masses are each below a resolution threshold (or which are
//! leaves). Together they account for every unit of locally owned mass, and
//! they are the records a process publishes to its peers: each peer computes
//! the far field of its own mass onto these cells, and the reduced result is
//! pushed back down to the particles underneath.

use bytemuck::{Pod, Zeroable};

use crate::geometry::Point;
use crate::traits::{Branch, BranchId, SpatialTree, NUM_OCTANTS};

/// Per-branch record exchanged between processes during a gravity step.
///
/// The geometry fields identify the cell on its owning process; the tensor
/// fields start zeroed and accumulate the far-field expansion while the
/// record visits the other processes. The layout is `repr(C)` with no
/// padding, so a slice of cells travels as a plain byte buffer between
/// processes of a homogeneous cluster.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct FrontierCell {
    /// Centre of mass of the branch.
    pub position: Point,
    /// Minimum corner of the branch's bounding box.
    pub bmin: Point,
    /// Maximum corner of the branch's bounding box.
    pub bmax: Point,
    /// Accumulated acceleration field at `position`.
    pub fc: Point,
    /// Accumulated field Jacobian, row-major 3x3.
    pub dfcdr: [f64; 9],
    /// Accumulated field Hessian, row-major 3x3x3.
    pub dfcdrdr: [f64; 27],
    /// Identifier resolving the branch on the owning process.
    pub id: BranchId,
}

/// Size in bytes of one frontier cell on the wire.
pub const FRONTIER_CELL_BYTES: usize = std::mem::size_of::<FrontierCell>();

impl FrontierCell {
    /// Builds the transport record for a branch, with zeroed tensor fields.
    pub fn new(position: Point, bmin: Point, bmax: Point, id: BranchId) -> Self {
        Self {
            position,
            bmin,
            bmax,
            fc: Point::zeros(),
            dfcdr: [0.0; 9],
            dfcdrdr: [0.0; 27],
            id,
        }
    }

    /// Whether the identifying fields of two records agree. The reduction
    /// requires every peer to return a cell with untouched geometry.
    pub fn same_slot(&self, other: &Self) -> bool {
        self.id == other.id
            && self.position == other.position
            && self.bmin == other.bmin
            && self.bmax == other.bmax
    }
}

/// Collects the frontier of a local tree.
///
/// Pre-order traversal from the root: zero-mass branches (non-local
/// placeholders) are skipped outright, a leaf or a branch lighter than
/// `max_cell_mass` is emitted, and anything heavier is opened. The fixed
/// child order makes the output deterministic for a given tree, which the
/// exchange relies on to pair scattered cells with gathered contributions.
///
/// An empty or fully non-local tree yields an empty frontier.
pub fn select_frontier<T: SpatialTree>(tree: &T, max_cell_mass: f64) -> Vec<FrontierCell> {
    let mut cells = Vec::new();
    collect(tree, tree.root(), max_cell_mass, &mut cells);
    cells
}

fn collect<T: SpatialTree>(
    tree: &T,
    branch: &T::Branch,
    max_cell_mass: f64,
    cells: &mut Vec<FrontierCell>,
) {
    if branch.mass() == 0.0 {
        return;
    }
    if branch.is_leaf() || branch.mass() < max_cell_mass {
        cells.push(FrontierCell::new(
            branch.position(),
            branch.bmin(),
            branch.bmax(),
            branch.id(),
        ));
        return;
    }
    for octant in 0..NUM_OCTANTS {
        if let Some(child) = tree.child(branch, octant) {
            collect(tree, child, max_cell_mass, cells);
        }
    }
}
