/////////////////////////////////////////////////////////////////////////////////////////////
//
// Provides the point alias and axis-aligned box predicates used by the tree traversals.
//
// Created on: 20 Jul 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use nalgebra::Vector3;

/// A position, force or acceleration in three dimensions.
pub type Point = Vector3<f64>;

/// Euclidean length of a box diagonal.
#[inline(always)]
pub fn box_diagonal(bmin: &Point, bmax: &Point) -> f64 {
    (bmax - bmin).norm()
}

/// Whether `p` lies strictly inside the open box `(bmin, bmax)`.
///
/// Points exactly on a face are treated as outside, so each body is handled
/// by exactly one of the near-field paths.
#[inline(always)]
pub fn strictly_inside(p: &Point, bmin: &Point, bmax: &Point) -> bool {
    p.x > bmin.x && p.y > bmin.y && p.z > bmin.z && p.x < bmax.x && p.y < bmax.y && p.z < bmax.z
}

/// Whether the box `(inner_min, inner_max)` lies strictly inside
/// `(outer_min, outer_max)`, with no shared faces.
#[inline(always)]
pub fn strictly_contains(
    outer_min: &Point,
    outer_max: &Point,
    inner_min: &Point,
    inner_max: &Point,
) -> bool {
    outer_min.x < inner_min.x
        && outer_min.y < inner_min.y
        && outer_min.z < inner_min.z
        && outer_max.x > inner_max.x
        && outer_max.y > inner_max.y
        && outer_max.z > inner_max.z
}

/// Whether two boxes describe the same region.
#[inline(always)]
pub fn same_box(a_min: &Point, a_max: &Point, b_min: &Point, b_max: &Point) -> bool {
    a_min == b_min && a_max == b_max
}

/// Whether two closed boxes overlap in all three axes.
#[inline(always)]
pub fn boxes_overlap(a_min: &Point, a_max: &Point, b_min: &Point, b_max: &Point) -> bool {
    a_min.x <= b_max.x
        && a_max.x >= b_min.x
        && a_min.y <= b_max.y
        && a_max.y >= b_min.y
        && a_min.z <= b_max.z
        && a_max.z >= b_min.z
}
