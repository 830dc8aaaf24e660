/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the source-tree far-field walk and the sink descent onto particles.
//
// Created on: 20 Jul 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Tree traversals of a gravity step.
//!
//! The *source walk* runs on every rank for every frontier cell in the
//! world: it descends this rank's local tree and accumulates the far field
//! of the local mass onto the cell's expansion tensors, opening branches
//! that fail the acceptance criterion. The *sink descent* runs only on the
//! cell's owner after the reduction: it carries the expansion down the
//! cell's subtree and evaluates it at every local body. Mass inside the
//! sink cell is excluded from the walk and settled exactly by a direct
//! pair sum over the cell's own bodies.

use crate::frontier::FrontierCell;
use crate::geometry::{same_box, strictly_contains, strictly_inside};
use crate::kernels::{accumulate_point_mass, direct_acceleration, mac_accepts, taylor_field};
use crate::traits::{Branch, ParticleStore, SpatialTree, NUM_OCTANTS};

/// Accumulates the far field of the local tree onto one sink cell.
///
/// Skip rules, applied in order at each source branch:
/// * the sink's own branch (identity is a peer-side anomaly, logged and
///   dropped),
/// * zero-mass placeholder branches,
/// * a branch covering exactly the sink's region,
/// * a branch strictly inside the sink's region (its mass belongs to the
///   owner's intra-cell pair sum, counting it here would double it).
///
/// A surviving branch that passes the acceptance criterion contributes as a
/// point mass at its centre of mass. A leaf that fails it contributes its
/// locally owned bodies one by one, except bodies strictly inside the sink
/// region. Anything else is opened.
pub(crate) fn source_walk<T, S>(
    tree: &T,
    store: &S,
    source: &T::Branch,
    sink: &mut FrontierCell,
    opening_angle: f64,
) where
    T: SpatialTree,
    S: ParticleStore,
{
    if source.id() == sink.id {
        log::warn!("sink cell {} walked its own branch", sink.id);
        return;
    }
    if source.mass() == 0.0 {
        return;
    }
    if same_box(&sink.bmin, &sink.bmax, &source.bmin(), &source.bmax()) {
        return;
    }
    if strictly_contains(&sink.bmin, &sink.bmax, &source.bmin(), &source.bmax()) {
        return;
    }

    if mac_accepts(
        &sink.position,
        &source.bmin(),
        &source.bmax(),
        &source.position(),
        opening_angle,
    ) {
        accumulate_point_mass(
            &sink.position,
            &source.position(),
            source.mass(),
            &mut sink.fc,
            &mut sink.dfcdr,
            &mut sink.dfcdrdr,
        );
    } else if source.is_leaf() {
        for &body in source.body_indices() {
            if !store.is_local(body) {
                continue;
            }
            let position = store.position(body);
            if strictly_inside(&position, &sink.bmin, &sink.bmax) {
                continue;
            }
            accumulate_point_mass(
                &sink.position,
                &position,
                store.mass(body),
                &mut sink.fc,
                &mut sink.dfcdr,
                &mut sink.dfcdrdr,
            );
        }
    } else {
        for octant in 0..NUM_OCTANTS {
            if let Some(child) = tree.child(source, octant) {
                source_walk(tree, store, child, sink, opening_angle);
            }
        }
    }
}

/// Carries a reduced expansion down the sink's subtree and evaluates it at
/// every locally owned body, updating accelerations in place. The handles
/// of the touched bodies are collected for the caller's intra-cell pair
/// sum.
pub(crate) fn sink_descent<T, S>(
    tree: &T,
    store: &mut S,
    branch: &T::Branch,
    cell: &FrontierCell,
    touched: &mut Vec<usize>,
) where
    T: SpatialTree,
    S: ParticleStore,
{
    if branch.mass() <= 0.0 {
        return;
    }
    if branch.is_leaf() {
        for &body in branch.body_indices() {
            if !store.is_local(body) {
                continue;
            }
            let delta = store.position(body) - cell.position;
            let gravity = taylor_field(&delta, &cell.fc, &cell.dfcdr, &cell.dfcdrdr);
            store.set_acceleration(body, store.acceleration(body) + gravity);
            touched.push(body);
        }
    } else {
        for octant in 0..NUM_OCTANTS {
            if let Some(child) = tree.child(branch, octant) {
                sink_descent(tree, store, child, cell, touched);
            }
        }
    }
}

/// Direct Newtonian sum over the bodies of one sink cell.
///
/// The source walk leaves out all mass inside the sink region, so the
/// short-range interactions among the cell's own bodies are settled here,
/// exactly. Coincident pairs contribute nothing.
pub(crate) fn intra_cell_direct_sum<S: ParticleStore>(store: &mut S, bodies: &[usize]) {
    for &sink in bodies {
        let sink_position = store.position(sink);
        let mut gravity = crate::geometry::Point::zeros();
        for &source in bodies {
            let source_position = store.position(source);
            if (sink_position - source_position).norm() > 0.0 {
                gravity += direct_acceleration(&sink_position, &source_position, store.mass(source));
            }
        }
        store.set_acceleration(sink, store.acceleration(sink) + gravity);
    }
}
