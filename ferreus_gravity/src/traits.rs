/////////////////////////////////////////////////////////////////////////////////////////////
//
// Declares the capability traits through which the solver consumes trees and particle data.
//
// Created on: 20 Jul 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use crate::geometry::Point;

/// Stable identifier of a tree branch.
///
/// Identifiers must be unique across all processes participating in a
/// gravity step, and must remain resolvable on the owning process for the
/// duration of the step.
pub type BranchId = u64;

/// Number of children of an internal octree branch.
pub const NUM_OCTANTS: usize = 8;

/// A node of the spatial tree consumed by the solver.
///
/// Branches carry the aggregate state of their subtree: total mass and the
/// mass-weighted centre of mass. A branch whose subtree holds no locally
/// owned mass reports `mass() == 0.0` and is skipped by every traversal.
pub trait Branch {
    /// Identifier of this branch, unique across processes.
    fn id(&self) -> BranchId;

    /// Centre of mass of the subtree rooted at this branch.
    fn position(&self) -> Point;

    /// Total locally owned mass of the subtree. Zero marks a non-local
    /// placeholder branch.
    fn mass(&self) -> f64;

    /// Minimum corner of the branch's axis-aligned bounding box.
    fn bmin(&self) -> Point;

    /// Maximum corner of the branch's axis-aligned bounding box.
    fn bmax(&self) -> Point;

    /// Whether this branch is a leaf.
    fn is_leaf(&self) -> bool;

    /// Particle-store handles of the bodies resident in this leaf.
    ///
    /// Empty for internal branches.
    fn body_indices(&self) -> &[usize];
}

/// Read access to a local spatial tree.
///
/// The solver never mutates the tree; it only walks it. Any octree exposing
/// a root, indexed children and identifier lookup satisfies the contract.
/// [`MassOctree`](crate::octree::MassOctree) is a ready-made implementation.
pub trait SpatialTree {
    type Branch: Branch;

    /// The root branch. Always present, even for an empty tree.
    fn root(&self) -> &Self::Branch;

    /// Child of `branch` in octant `octant` (in `0..NUM_OCTANTS`), if present.
    fn child(&self, branch: &Self::Branch, octant: usize) -> Option<&Self::Branch>;

    /// Resolves a branch identifier previously obtained from this tree.
    fn find(&self, id: BranchId) -> Option<&Self::Branch>;
}

/// Access to the particle data referenced by tree leaves.
///
/// The solver reads position, mass and locality, and updates accelerations
/// additively. Indices are the handles reported by [`Branch::body_indices`].
pub trait ParticleStore {
    fn position(&self, index: usize) -> Point;

    fn mass(&self, index: usize) -> f64;

    /// Whether the body is owned by this process. Ghost bodies mirrored from
    /// a neighbour are read during traversal filters but never accelerated.
    fn is_local(&self, index: usize) -> bool;

    fn acceleration(&self, index: usize) -> Point;

    fn set_acceleration(&mut self, index: usize, acceleration: Point);
}
