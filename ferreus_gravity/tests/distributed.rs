/////////////////////////////////////////////////////////////////////////////////////////////
//
// End-to-end gravity steps across multi-rank in-process worlds.
//
// Created on: 20 Jul 2026     Author: Daniel Owen
//
// Copyright (c) 2026, Maptek Pty Ltd. All rights reserved. Licensed under the MIT License.
//
/////////////////////////////////////////////////////////////////////////////////////////////

use std::sync::Mutex;
use std::thread;

use ferreus_gravity::{
    BodySet, Collective, FmmGravity, GravityParams, MassOctree, ParticleStore, Point, SelfComm,
    ThreadComm,
};

/// Runs one closure per rank of a thread world and returns the results in
/// rank order.
fn run_world<R, F>(size: usize, body: F) -> Vec<R>
where
    R: Send,
    F: Fn(ThreadComm) -> R + Send + Sync,
{
    let mut handles = ThreadComm::world(size);
    let results: Mutex<Vec<Option<R>>> = Mutex::new((0..size).map(|_| None).collect());

    thread::scope(|scope| {
        for comm in handles.drain(..) {
            let results = &results;
            let body = &body;
            scope.spawn(move || {
                let rank = comm.rank();
                let outcome = body(comm);
                results.lock().unwrap()[rank] = Some(outcome);
            });
        }
    });

    results
        .into_inner()
        .unwrap()
        .into_iter()
        .map(|slot| slot.expect("rank completed"))
        .collect()
}

/// All-pairs Newtonian reference over the full world of bodies.
fn direct_reference(positions: &[Point], masses: &[f64]) -> Vec<Point> {
    let mut accelerations = vec![Point::zeros(); positions.len()];
    for i in 0..positions.len() {
        for j in 0..positions.len() {
            let delta = positions[i] - positions[j];
            let distance = delta.norm();
            if distance > 0.0 {
                accelerations[i] += -masses[j] / (distance * distance * distance) * delta;
            }
        }
    }
    accelerations
}

/// One rank's share of a partitioned world: its bodies plus the global
/// index of each.
fn partition(
    positions: &[Point],
    masses: &[f64],
    rank: usize,
    owner_of: impl Fn(&Point) -> usize,
) -> (BodySet, Vec<usize>) {
    let mut bodies = BodySet::new();
    let mut globals = Vec::new();
    for (global, position) in positions.iter().enumerate() {
        if owner_of(position) == rank {
            bodies.push(*position, masses[global]);
            globals.push(global);
        }
    }
    (bodies, globals)
}

#[test]
fn two_ranks_two_bodies_balance_momentum() {
    let positions = [Point::new(0.0, 0.0, 0.0), Point::new(1.0, 0.0, 0.0)];
    let masses = [2.0, 3.0];
    let params = GravityParams {
        max_cell_mass: 1.0,
        opening_angle: 0.5,
    };

    let results = run_world(2, |comm| {
        let rank = comm.rank();
        let (mut bodies, globals) =
            partition(&positions, &masses, rank, |p| usize::from(p.x > 0.5));

        let tree = MassOctree::build(&bodies, 1, rank as u64);
        let mut solver = FmmGravity::new(comm);
        solver.step(&tree, &mut bodies, &params).unwrap();

        (globals, bodies.acceleration(0))
    });

    assert_eq!(results[0].0, vec![0]);
    assert_eq!(results[1].0, vec![1]);

    let a0 = results[0].1;
    let a1 = results[1].1;
    // The lighter body feels the stronger pull, and momentum balances.
    assert!((a0 - Point::new(3.0, 0.0, 0.0)).norm() < 1e-12);
    assert!((a1 - Point::new(-2.0, 0.0, 0.0)).norm() < 1e-12);
    assert!((masses[0] * a0 + masses[1] * a1).norm() < 1e-12);
}

#[test]
fn collinear_triplet_receives_the_remote_contribution() {
    // Two bodies on rank 0, one far body on rank 1. The middle body's pull
    // is dominated by its close neighbour, corrected by the remote mass
    // arriving through the exchanged frontier.
    let positions = [
        Point::new(0.0, 0.0, 0.0),
        Point::new(1.0, 0.0, 0.0),
        Point::new(10.0, 0.0, 0.0),
    ];
    let masses = [1.0, 1.0, 1.0];
    let params = GravityParams {
        max_cell_mass: 1.0,
        opening_angle: 0.5,
    };

    let results = run_world(2, |comm| {
        let rank = comm.rank();
        let (mut bodies, globals) =
            partition(&positions, &masses, rank, |p| usize::from(p.x > 5.0));

        let tree = MassOctree::build(&bodies, 1, rank as u64);
        let mut solver = FmmGravity::new(comm);
        solver.step(&tree, &mut bodies, &params).unwrap();

        let accelerations: Vec<Point> = (0..bodies.len()).map(|i| bodies.acceleration(i)).collect();
        (globals, accelerations)
    });

    assert_eq!(results[0].0, vec![0, 1]);
    assert_eq!(results[1].0, vec![2]);

    let middle = results[0].1[1];
    let expected_x = -1.0 + 1.0 / 81.0;
    assert!(
        (middle.x - expected_x).abs() < 1e-12,
        "middle body a_x = {}, expected {expected_x}",
        middle.x
    );
    assert!(middle.y.abs() < 1e-12 && middle.z.abs() < 1e-12);

    // Momentum balance across the whole world.
    let mut net = Point::zeros();
    net += results[0].1[0] + results[0].1[1] + results[1].1[0];
    assert!(net.norm() < 1e-12);
}

#[test]
fn uniform_grid_split_across_two_ranks_matches_the_direct_sum() {
    // An 8x8x8 unit-mass lattice partitioned at x = 3.5.
    let mut positions = Vec::new();
    for x in 0..8 {
        for y in 0..8 {
            for z in 0..8 {
                positions.push(Point::new(x as f64, y as f64, z as f64));
            }
        }
    }
    let masses = vec![1.0; positions.len()];
    let reference = direct_reference(&positions, &masses);

    let params = GravityParams {
        max_cell_mass: 4.0,
        opening_angle: 0.5,
    };

    let results = run_world(2, |comm| {
        let rank = comm.rank();
        let (mut bodies, globals) =
            partition(&positions, &masses, rank, |p| usize::from(p.x > 3.5));

        let tree = MassOctree::build(&bodies, 1, rank as u64);
        let mut solver = FmmGravity::new(comm);

        solver.select_and_scatter(&tree, params.max_cell_mass).unwrap();
        let counts = solver.frontier_counts().to_vec();
        solver.compute(&tree, &bodies, params.opening_angle).unwrap();
        solver.gather_and_apply(&tree, &mut bodies).unwrap();

        let accelerations: Vec<Point> = (0..bodies.len()).map(|i| bodies.acceleration(i)).collect();
        (globals, accelerations, counts)
    });

    // Both ranks agreed on a non-empty frontier from each.
    for (_, _, counts) in &results {
        assert_eq!(counts.len(), 2);
        assert!(counts.iter().all(|&n| n > 0));
        assert_eq!(counts, &results[0].2);
    }

    // Every body's acceleration lands within 1% of the all-pairs answer.
    for (globals, accelerations, _) in &results {
        for (local, &global) in globals.iter().enumerate() {
            let error = (accelerations[local] - reference[global]).norm();
            let magnitude = reference[global].norm();
            assert!(
                error <= 0.01 * magnitude,
                "body {global}: |a| = {magnitude}, error = {error}"
            );
        }
    }
}

#[test]
fn ghost_placeholder_branches_leave_results_untouched() {
    // The same bodies, with and without ghost bodies occupying an otherwise
    // empty octant. Ghost subtrees carry zero mass, so every traversal
    // skips them and the accelerations must come out bit-identical.
    let locals = [
        Point::new(2.0, -2.0, -2.0),
        Point::new(-2.0, 2.0, -2.0),
        Point::new(-2.0, -2.0, 2.0),
        Point::new(-2.0, -2.0, -2.0),
        Point::new(-1.8, -1.9, -2.0),
        Point::new(-1.5, -2.0, -1.7),
    ];
    // Strictly inside the locals' bounds, and in the all-positive octant
    // where no local body ever lands.
    let ghosts = [Point::new(1.0, 1.0, 1.0), Point::new(0.5, 1.5, 0.9)];

    let params = GravityParams {
        max_cell_mass: 2.0,
        opening_angle: 0.5,
    };

    let run = |with_ghosts: bool| -> Vec<Point> {
        let mut bodies = BodySet::new();
        for p in &locals {
            bodies.push(*p, 1.0);
        }
        if with_ghosts {
            for p in &ghosts {
                bodies.push_ghost(*p, 4.0);
            }
        }
        let tree = MassOctree::build(&bodies, 1, 0);
        let mut solver = FmmGravity::new(SelfComm);
        solver.step(&tree, &mut bodies, &params).unwrap();
        (0..locals.len()).map(|i| bodies.acceleration(i)).collect()
    };

    let pruned = run(false);
    let with_placeholders = run(true);
    assert_eq!(pruned, with_placeholders);
}

#[test]
fn repeated_steps_reproduce_accelerations_across_ranks() {
    let mut positions = Vec::new();
    for x in 0..4 {
        for y in 0..4 {
            for z in 0..4 {
                positions.push(Point::new(x as f64 * 1.5, y as f64, z as f64));
            }
        }
    }
    let masses = vec![1.0; positions.len()];
    let params = GravityParams {
        max_cell_mass: 3.0,
        opening_angle: 0.5,
    };

    let results = run_world(2, |comm| {
        let rank = comm.rank();
        let (mut bodies, _globals) =
            partition(&positions, &masses, rank, |p| usize::from(p.x > 2.25));

        let tree = MassOctree::build(&bodies, 2, rank as u64);
        let mut solver = FmmGravity::new(comm);

        solver.step(&tree, &mut bodies, &params).unwrap();
        let first: Vec<Point> = (0..bodies.len()).map(|i| bodies.acceleration(i)).collect();

        bodies.zero_accelerations();
        solver.step(&tree, &mut bodies, &params).unwrap();
        let second: Vec<Point> = (0..bodies.len()).map(|i| bodies.acceleration(i)).collect();

        (first, second)
    });

    for (first, second) in results {
        assert_eq!(first, second);
    }
}

#[test]
fn every_rank_holds_the_same_catalog_after_the_scatter() {
    let positions = [
        Point::new(0.0, 0.0, 0.0),
        Point::new(1.0, 0.5, 0.0),
        Point::new(6.0, 0.0, 1.0),
        Point::new(7.0, 1.0, 0.0),
        Point::new(6.5, 0.2, 0.8),
    ];
    let masses = [1.0, 2.0, 1.0, 1.5, 0.5];

    let results = run_world(2, |comm| {
        let rank = comm.rank();
        let (mut bodies, _globals) =
            partition(&positions, &masses, rank, |p| usize::from(p.x > 3.0));

        let tree = MassOctree::build(&bodies, 1, rank as u64);
        let mut solver = FmmGravity::new(comm);
        solver.select_and_scatter(&tree, 2.0).unwrap();

        let snapshot: Vec<_> = solver
            .catalog()
            .iter()
            .map(|cell| (cell.id, cell.position, cell.bmin, cell.bmax))
            .collect();

        // Everyone still has to finish the step together.
        solver.compute(&tree, &bodies, 0.5).unwrap();
        solver.gather_and_apply(&tree, &mut bodies).unwrap();

        snapshot
    });

    assert!(!results[0].is_empty());
    assert_eq!(results[0], results[1]);
}
