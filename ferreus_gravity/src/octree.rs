/////////////////////////////////////////////////////////////////////////////////////////////
//
// Provides a reference mass octree and particle store implementing the consumed traits.
//
// Created on: 20 Jul 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Reference spatial structures.
//!
//! Production drivers bring their own tree and particle storage; the solver
//! only sees them through the traits in [`crate::traits`]. This module
//! supplies a compact implementation of both sides of that seam, used by
//! the crate's tests, documentation examples and small standalone runs:
//! [`BodySet`], a structure-of-arrays particle store, and [`MassOctree`],
//! an octree with bottom-up mass and centre-of-mass aggregation.
//!
//! Ghost bodies (mirrored from a neighbouring process) may be inserted with
//! [`BodySet::push_ghost`]; they shape the tree but carry no locally owned
//! mass, so subtrees holding only ghosts become the zero-mass placeholder
//! branches that every traversal skips.

use std::collections::HashMap;

use crate::geometry::Point;
use crate::traits::{Branch, BranchId, ParticleStore, SpatialTree, NUM_OCTANTS};

/// Structure-of-arrays body storage.
#[derive(Debug, Default, Clone)]
pub struct BodySet {
    positions: Vec<Point>,
    masses: Vec<f64>,
    accelerations: Vec<Point>,
    locality: Vec<bool>,
}

impl BodySet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a locally owned body and returns its handle.
    pub fn push(&mut self, position: Point, mass: f64) -> usize {
        self.push_with_locality(position, mass, true)
    }

    /// Appends a ghost body mirrored from another process. Ghosts shape the
    /// tree but are never accelerated and never contribute local mass.
    pub fn push_ghost(&mut self, position: Point, mass: f64) -> usize {
        self.push_with_locality(position, mass, false)
    }

    fn push_with_locality(&mut self, position: Point, mass: f64, local: bool) -> usize {
        self.positions.push(position);
        self.masses.push(mass);
        self.accelerations.push(Point::zeros());
        self.locality.push(local);
        self.positions.len() - 1
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Clears all accelerations, typically between gravity steps.
    pub fn zero_accelerations(&mut self) {
        self.accelerations.fill(Point::zeros());
    }
}

impl ParticleStore for BodySet {
    fn position(&self, index: usize) -> Point {
        self.positions[index]
    }

    fn mass(&self, index: usize) -> f64 {
        self.masses[index]
    }

    fn is_local(&self, index: usize) -> bool {
        self.locality[index]
    }

    fn acceleration(&self, index: usize) -> Point {
        self.accelerations[index]
    }

    fn set_acceleration(&mut self, index: usize, acceleration: Point) {
        self.accelerations[index] = acceleration;
    }
}

/// Subdivision stops here even if a leaf stays overfull; protects against
/// coincident bodies.
const MAX_DEPTH: usize = 24;

#[derive(Debug)]
pub struct OctreeNode {
    id: BranchId,
    position: Point,
    mass: f64,
    bmin: Point,
    bmax: Point,
    children: [Option<usize>; NUM_OCTANTS],
    bodies: Vec<usize>,
    leaf: bool,
}

impl Branch for OctreeNode {
    fn id(&self) -> BranchId {
        self.id
    }

    fn position(&self) -> Point {
        self.position
    }

    fn mass(&self) -> f64 {
        self.mass
    }

    fn bmin(&self) -> Point {
        self.bmin
    }

    fn bmax(&self) -> Point {
        self.bmax
    }

    fn is_leaf(&self) -> bool {
        self.leaf
    }

    fn body_indices(&self) -> &[usize] {
        &self.bodies
    }
}

/// An octree over a [`BodySet`] with aggregate mass and centre of mass per
/// branch.
///
/// The root covers a cube around all bodies; regions are split while they
/// hold more than `max_bodies_per_leaf` bodies. Only octants that actually
/// contain bodies materialise as children. Branch identifiers embed
/// `id_salt` in the high bits, so trees built with distinct salts (one per
/// process rank) never collide.
#[derive(Debug)]
pub struct MassOctree {
    nodes: Vec<OctreeNode>,
    index: HashMap<BranchId, usize>,
}

impl MassOctree {
    pub fn build(bodies: &BodySet, max_bodies_per_leaf: usize, id_salt: u64) -> Self {
        assert!(max_bodies_per_leaf > 0, "leaf capacity must be positive");

        let (bmin, bmax) = bounding_cube(bodies);
        let mut nodes = Vec::new();
        let all: Vec<usize> = (0..bodies.len()).collect();
        build_node(&mut nodes, bodies, all, bmin, bmax, 0, max_bodies_per_leaf);
        aggregate(&mut nodes, bodies, 0);

        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter_mut().enumerate() {
            node.id = (id_salt << 32) | i as u64;
            index.insert(node.id, i);
        }

        Self { nodes, index }
    }

    /// Number of branches in the tree.
    pub fn num_branches(&self) -> usize {
        self.nodes.len()
    }
}

impl SpatialTree for MassOctree {
    type Branch = OctreeNode;

    fn root(&self) -> &OctreeNode {
        &self.nodes[0]
    }

    fn child(&self, branch: &OctreeNode, octant: usize) -> Option<&OctreeNode> {
        branch.children[octant].map(|i| &self.nodes[i])
    }

    fn find(&self, id: BranchId) -> Option<&OctreeNode> {
        self.index.get(&id).map(|&i| &self.nodes[i])
    }
}

/// Cube enclosing every body, padded to a unit-ish box for degenerate sets.
fn bounding_cube(bodies: &BodySet) -> (Point, Point) {
    if bodies.is_empty() {
        return (Point::new(-0.5, -0.5, -0.5), Point::new(0.5, 0.5, 0.5));
    }

    let mut min = Point::from_element(f64::INFINITY);
    let mut max = Point::from_element(f64::NEG_INFINITY);
    for i in 0..bodies.len() {
        let p = bodies.position(i);
        for axis in 0..3 {
            min[axis] = min[axis].min(p[axis]);
            max[axis] = max[axis].max(p[axis]);
        }
    }

    let centre = 0.5 * (min + max);
    let mut half = (max - min).amax() * 0.5;
    if half == 0.0 {
        half = 0.5;
    }
    let extent = Point::from_element(half);
    (centre - extent, centre + extent)
}

fn octant_of(position: &Point, centre: &Point) -> usize {
    let mut octant = 0;
    if position.x >= centre.x {
        octant |= 1;
    }
    if position.y >= centre.y {
        octant |= 2;
    }
    if position.z >= centre.z {
        octant |= 4;
    }
    octant
}

fn octant_box(bmin: &Point, bmax: &Point, octant: usize) -> (Point, Point) {
    let centre = 0.5 * (bmin + bmax);
    let mut min = *bmin;
    let mut max = *bmax;

    if octant & 1 == 0 {
        max.x = centre.x;
    } else {
        min.x = centre.x;
    }
    if octant & 2 == 0 {
        max.y = centre.y;
    } else {
        min.y = centre.y;
    }
    if octant & 4 == 0 {
        max.z = centre.z;
    } else {
        min.z = centre.z;
    }
    (min, max)
}

fn build_node(
    nodes: &mut Vec<OctreeNode>,
    bodies: &BodySet,
    indices: Vec<usize>,
    bmin: Point,
    bmax: Point,
    depth: usize,
    max_bodies_per_leaf: usize,
) -> usize {
    let index = nodes.len();
    nodes.push(OctreeNode {
        id: 0,
        position: Point::zeros(),
        mass: 0.0,
        bmin,
        bmax,
        children: [None; NUM_OCTANTS],
        bodies: Vec::new(),
        leaf: true,
    });

    if indices.len() <= max_bodies_per_leaf || depth >= MAX_DEPTH {
        nodes[index].bodies = indices;
        return index;
    }

    let centre = 0.5 * (bmin + bmax);
    let mut buckets: [Vec<usize>; NUM_OCTANTS] = Default::default();
    for body in indices {
        buckets[octant_of(&bodies.position(body), &centre)].push(body);
    }

    nodes[index].leaf = false;
    for (octant, bucket) in buckets.into_iter().enumerate() {
        if bucket.is_empty() {
            continue;
        }
        let (cmin, cmax) = octant_box(&bmin, &bmax, octant);
        let child = build_node(nodes, bodies, bucket, cmin, cmax, depth + 1, max_bodies_per_leaf);
        nodes[index].children[octant] = Some(child);
    }
    index
}

/// Bottom-up mass and centre-of-mass pass. Only locally owned bodies
/// contribute, so ghost-only subtrees end up as zero-mass placeholders.
fn aggregate(nodes: &mut Vec<OctreeNode>, bodies: &BodySet, index: usize) {
    let mut mass = 0.0;
    let mut weighted = Point::zeros();

    if nodes[index].leaf {
        for &body in &nodes[index].bodies {
            if !bodies.is_local(body) {
                continue;
            }
            mass += bodies.mass(body);
            weighted += bodies.mass(body) * bodies.position(body);
        }
    } else {
        let children = nodes[index].children;
        for child in children.into_iter().flatten() {
            aggregate(nodes, bodies, child);
            if nodes[child].mass > 0.0 {
                mass += nodes[child].mass;
                weighted += nodes[child].mass * nodes[child].position;
            }
        }
    }

    nodes[index].mass = mass;
    if mass > 0.0 {
        nodes[index].position = weighted / mass;
    }
}
