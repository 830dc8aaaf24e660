/////////////////////////////////////////////////////////////////////////////////////////////
//
// Implements the monopole gravity kernel, its spatial derivatives and the Taylor evaluation.
//
// Created on: 20 Jul 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

//! Point-mass interaction kernel.
//!
//! A far-field source is summarised as a point mass at its centre of mass.
//! Its contribution onto a sink expansion centre is accumulated as three
//! tensors: the acceleration field itself, its Jacobian and its Hessian,
//! all evaluated at the sink position. The sink later pushes this state down
//! to individual bodies with a second-order Taylor evaluation, so nearby
//! bodies inside one sink cell share a single far-field computation.

use crate::geometry::{box_diagonal, Point};

/// Multipole acceptance criterion.
///
/// A source region is far enough from the sink to be summarised by its
/// centre of mass when the ratio of its box diagonal to the sink distance is
/// below the opening angle. Smaller angles force deeper descents and higher
/// accuracy.
#[inline(always)]
pub fn mac_accepts(
    sink_position: &Point,
    source_bmin: &Point,
    source_bmax: &Point,
    source_position: &Point,
    opening_angle: f64,
) -> bool {
    let diagonal = box_diagonal(source_bmin, source_bmax);
    let distance = (sink_position - source_position).norm();
    diagonal / distance < opening_angle
}

/// Accumulates the contribution of a point mass onto a sink expansion.
///
/// With `r = sink - source`, `d = |r|` and `m` the source mass, adds the
/// acceleration `-m r / d^3` to `fc`, its spatial derivative to `jacobian`
/// (row-major 3x3) and the third-order coefficient to `hessian` (row-major
/// 3x3x3). `d > 0` is a precondition; the traversal filters exclude exact
/// self-interaction before this kernel is reached.
pub fn accumulate_point_mass(
    sink_position: &Point,
    source_position: &Point,
    source_mass: f64,
    fc: &mut Point,
    jacobian: &mut [f64; 9],
    hessian: &mut [f64; 27],
) {
    let delta = sink_position - source_position;
    let distance = delta.norm();
    debug_assert!(distance > 0.0, "coincident sink and source");

    let d2 = distance * distance;
    let jacobian_coeff = -source_mass / (d2 * distance);

    *fc += jacobian_coeff * delta;

    for i in 0..3 {
        for j in 0..3 {
            let kronecker = if i == j { 1.0 } else { 0.0 };
            jacobian[i * 3 + j] += jacobian_coeff * (kronecker - 3.0 * delta[i] * delta[j] / d2);
            debug_assert!(jacobian[i * 3 + j].is_finite(), "non-finite Jacobian entry");
        }
    }

    let hessian_coeff = -3.0 * source_mass / (d2 * d2 * distance);
    for i in 0..3 {
        for j in 0..3 {
            for k in 0..3 {
                let mut first_term = 0.0;
                if i == j {
                    first_term += delta[k];
                }
                if j == k {
                    first_term += delta[i];
                }
                if k == i {
                    first_term += delta[j];
                }
                if !(i == j && j == k) {
                    first_term *= 3.0;
                }
                hessian[i * 9 + j * 3 + k] += hessian_coeff * first_term
                    + hessian_coeff * (-5.0 / d2) * delta[i] * delta[j] * delta[k];
            }
        }
    }
}

/// Evaluates the accumulated far field at a displacement `delta` from the
/// expansion centre:
///
/// `a = fc + J delta + 1/2 delta^T H delta`
///
/// where the Hessian contraction is taken per output component.
pub fn taylor_field(delta: &Point, fc: &Point, jacobian: &[f64; 9], hessian: &[f64; 27]) -> Point {
    let mut acceleration = *fc;

    for i in 0..3 {
        for j in 0..3 {
            acceleration[i] += jacobian[i * 3 + j] * delta[j];
        }
    }

    for i in 0..3 {
        let mut quadratic = 0.0;
        for j in 0..3 {
            for k in 0..3 {
                quadratic += hessian[i * 9 + j * 3 + k] * delta[j] * delta[k];
            }
        }
        acceleration[i] += 0.5 * quadratic;
    }

    acceleration
}

/// Direct Newtonian acceleration of a source body on a sink body,
/// `-m (p_sink - p_source) / d^3`. Used by the near-field pair sums.
#[inline(always)]
pub fn direct_acceleration(sink_position: &Point, source_position: &Point, source_mass: f64) -> Point {
    let delta = sink_position - source_position;
    let distance = delta.norm();
    -source_mass / (distance * distance * distance) * delta
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zero_expansion() -> (Point, [f64; 9], [f64; 27]) {
        (Point::zeros(), [0.0; 9], [0.0; 27])
    }

    #[test]
    fn unit_pair_acceleration() {
        let (mut fc, mut jacobian, mut hessian) = zero_expansion();
        let sink = Point::new(0.0, 0.0, 0.0);
        let source = Point::new(1.0, 0.0, 0.0);

        accumulate_point_mass(&sink, &source, 1.0, &mut fc, &mut jacobian, &mut hessian);

        // Unit masses one unit apart attract with unit magnitude.
        assert!((fc - Point::new(1.0, 0.0, 0.0)).norm() < 1e-15);
    }

    #[test]
    fn forces_on_a_pair_cancel() {
        let a = Point::new(-0.3, 0.7, 2.0);
        let b = Point::new(1.1, -0.4, 0.5);
        let mass_a = 2.0;
        let mass_b = 3.0;

        let (mut fc_a, mut j_a, mut h_a) = zero_expansion();
        let (mut fc_b, mut j_b, mut h_b) = zero_expansion();
        accumulate_point_mass(&a, &b, mass_b, &mut fc_a, &mut j_a, &mut h_a);
        accumulate_point_mass(&b, &a, mass_a, &mut fc_b, &mut j_b, &mut h_b);

        // fc is an acceleration, so momentum balance needs the mass weights.
        let residual = mass_a * fc_a + mass_b * fc_b;
        assert!(residual.norm() < 1e-14);
    }

    #[test]
    fn jacobian_is_symmetric_and_traceless() {
        let (mut fc, mut jacobian, mut hessian) = zero_expansion();
        let sink = Point::new(0.4, -1.2, 0.9);
        let source = Point::new(-2.0, 0.3, 1.7);

        accumulate_point_mass(&sink, &source, 1.5, &mut fc, &mut jacobian, &mut hessian);

        for i in 0..3 {
            for j in 0..3 {
                assert!((jacobian[i * 3 + j] - jacobian[j * 3 + i]).abs() < 1e-14);
            }
        }
        let trace = jacobian[0] + jacobian[4] + jacobian[8];
        assert!(trace.abs() < 1e-14, "gravity field divergence must vanish, got {trace}");
    }

    #[test]
    fn jacobian_matches_finite_differences_of_the_field() {
        let source = Point::new(0.0, 0.0, 0.0);
        let sink = Point::new(2.0, -1.0, 1.5);
        let mass = 2.5;
        let step = 1e-6;

        let (mut fc, mut jacobian, mut hessian) = zero_expansion();
        accumulate_point_mass(&sink, &source, mass, &mut fc, &mut jacobian, &mut hessian);

        for j in 0..3 {
            let mut forward = sink;
            let mut backward = sink;
            forward[j] += step;
            backward[j] -= step;

            let (mut fc_f, mut jf, mut hf) = zero_expansion();
            let (mut fc_b, mut jb, mut hb) = zero_expansion();
            accumulate_point_mass(&forward, &source, mass, &mut fc_f, &mut jf, &mut hf);
            accumulate_point_mass(&backward, &source, mass, &mut fc_b, &mut jb, &mut hb);

            for i in 0..3 {
                let numeric = (fc_f[i] - fc_b[i]) / (2.0 * step);
                assert!(
                    (jacobian[i * 3 + j] - numeric).abs() < 1e-6,
                    "dF{i}/dr{j}: analytic {} vs numeric {}",
                    jacobian[i * 3 + j],
                    numeric
                );
            }
        }
    }

    #[test]
    fn hessian_is_symmetric_in_the_contraction_indices() {
        let (mut fc, mut jacobian, mut hessian) = zero_expansion();
        let sink = Point::new(1.0, 2.0, -0.5);
        let source = Point::new(-0.7, 0.1, 0.8);

        accumulate_point_mass(&sink, &source, 0.8, &mut fc, &mut jacobian, &mut hessian);

        for i in 0..3 {
            for j in 0..3 {
                for k in 0..3 {
                    let a = hessian[i * 9 + j * 3 + k];
                    let b = hessian[i * 9 + k * 3 + j];
                    assert!((a - b).abs() < 1e-14);
                }
            }
        }
    }

    #[test]
    fn taylor_field_reduces_to_fc_at_the_centre() {
        let (mut fc, mut jacobian, mut hessian) = zero_expansion();
        accumulate_point_mass(
            &Point::new(1.0, 1.0, 1.0),
            &Point::new(4.0, 1.0, 1.0),
            2.0,
            &mut fc,
            &mut jacobian,
            &mut hessian,
        );

        let at_centre = taylor_field(&Point::zeros(), &fc, &jacobian, &hessian);
        assert!((at_centre - fc).norm() < 1e-15);
    }

    #[test]
    fn taylor_expansion_beats_the_bare_monopole() {
        // Far source, modest displacement from the expansion centre. The
        // expanded field must track the exact field better than the centre
        // value alone.
        let source = Point::new(0.0, 0.0, 0.0);
        let centre = Point::new(10.0, 0.0, 0.0);
        let mass = 1.0;

        let (mut fc, mut jacobian, mut hessian) = zero_expansion();
        accumulate_point_mass(&centre, &source, mass, &mut fc, &mut jacobian, &mut hessian);

        let delta = Point::new(0.1, 0.05, -0.08);
        let body = centre + delta;

        let exact = direct_acceleration(&body, &source, mass);
        let expanded = taylor_field(&delta, &fc, &jacobian, &hessian);

        let monopole_error = (fc - exact).norm();
        let expansion_error = (expanded - exact).norm();
        assert!(
            expansion_error < monopole_error / 3.0,
            "expansion error {expansion_error} vs monopole error {monopole_error}"
        );
    }

    #[test]
    fn mac_opens_near_boxes_and_accepts_far_ones() {
        let bmin = Point::new(0.0, 0.0, 0.0);
        let bmax = Point::new(1.0, 1.0, 1.0);
        let com = Point::new(0.5, 0.5, 0.5);

        let near_sink = Point::new(1.5, 0.5, 0.5);
        let far_sink = Point::new(50.0, 0.5, 0.5);

        assert!(!mac_accepts(&near_sink, &bmin, &bmax, &com, 0.5));
        assert!(mac_accepts(&far_sink, &bmin, &bmax, &com, 0.5));

        // A vanishing opening angle rejects everything.
        assert!(!mac_accepts(&far_sink, &bmin, &bmax, &com, 1e-12));
    }
}
