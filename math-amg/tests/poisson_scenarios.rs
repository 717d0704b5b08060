//! End-to-end AMG scenarios
//!
//! Model problems with known multigrid behaviour: 1-D and 2-D Poisson,
//! aggressive coarsening, the identity, a single unknown and a matrix with a
//! decoupled zero row.

use approx::assert_relative_eq;
use math_audio_amg::amg::PointType;
use math_audio_amg::{AmgHierarchy, AmgParam, CsrMatrix, CycleType, amg_solve, mg_cycle};
use ndarray::Array1;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn laplacian_1d(n: usize) -> CsrMatrix<f64> {
    let mut triplets = Vec::new();
    for i in 0..n {
        triplets.push((i, i, 2.0));
        if i > 0 {
            triplets.push((i, i - 1, -1.0));
        }
        if i + 1 < n {
            triplets.push((i, i + 1, -1.0));
        }
    }
    CsrMatrix::from_triplets(n, n, triplets)
}

fn laplacian_2d(m: usize) -> CsrMatrix<f64> {
    let mut triplets = Vec::new();
    for row in 0..m {
        for col in 0..m {
            let i = row * m + col;
            triplets.push((i, i, 4.0));
            if row > 0 {
                triplets.push((i, i - m, -1.0));
            }
            if row + 1 < m {
                triplets.push((i, i + m, -1.0));
            }
            if col > 0 {
                triplets.push((i, i - 1, -1.0));
            }
            if col + 1 < m {
                triplets.push((i, i + 1, -1.0));
            }
        }
    }
    let n = m * m;
    CsrMatrix::from_triplets(n, n, triplets)
}

fn residual_norm(a: &CsrMatrix<f64>, b: &[f64], x: &[f64]) -> f64 {
    let mut r = vec![0.0; a.num_rows];
    a.residual_into(b, x, &mut r);
    r.iter().map(|v| v * v).sum::<f64>().sqrt()
}

/// Load `b` and `x` into the finest level of `h`.
fn load(h: &mut AmgHierarchy<f64>, b: &[f64], x: &[f64]) {
    h.rhs_mut().copy_from_slice(b);
    h.solution_mut().copy_from_slice(x);
}

#[test]
fn test_1d_poisson_single_v_cycle() {
    let n = 1023;
    let a = laplacian_1d(n);
    let param = AmgParam::default();
    let mut h = AmgHierarchy::build(a.clone(), &param).unwrap();
    assert!(h.num_levels() >= 2, "levels {:?}", h.level_sizes());

    let mut rng = StdRng::seed_from_u64(7);
    let x0: Vec<f64> = (0..n).map(|_| rng.random_range(-1.0..1.0)).collect();
    let b = vec![0.0; n];
    load(&mut h, &b, &x0);

    let r0 = residual_norm(&a, &b, &x0);
    mg_cycle(&mut h, &param, 0).unwrap();
    let r1 = residual_norm(&a, &b, h.solution());
    assert!(r1 <= 0.2 * r0, "ratio {}", r1 / r0);
}

#[test]
fn test_2d_poisson_convergence_factor() {
    let m = 127;
    let a = laplacian_2d(m);
    let n = a.num_rows;
    let param = AmgParam::default();
    let mut h = AmgHierarchy::build(a.clone(), &param).unwrap();

    let sizes = h.level_sizes();
    assert!(sizes.len() >= 3, "levels {sizes:?}");
    assert!(sizes.len() <= param.max_levels);
    assert!(sizes.windows(2).all(|w| w[0] > w[1]), "levels {sizes:?}");
    assert!(*sizes.last().unwrap() <= param.coarse_dof);
    assert!(h.operator_complexity() <= 2.5, "{}", h.operator_complexity());
    assert!(h.grid_complexity() < 2.0);

    let b = vec![1.0; n];
    load(&mut h, &b, &vec![0.0; n]);
    let r0 = residual_norm(&a, &b, h.solution());
    let mut previous = r0;
    let cycles = 5;
    for k in 0..cycles {
        mg_cycle(&mut h, &param, 0).unwrap();
        let current = residual_norm(&a, &b, h.solution());
        if k > 0 {
            assert!(current <= 0.2 * previous, "cycle {k}: {}", current / previous);
        }
        previous = current;
    }
    let factor = (previous / r0).powf(1.0 / cycles as f64);
    assert!(factor <= 0.2, "average factor {factor}");
}

#[test]
fn test_hierarchy_shapes_and_interpolation_rows() {
    let a = laplacian_2d(40);
    let param = AmgParam {
        coarse_dof: 50,
        ..AmgParam::default()
    };
    let h = AmgHierarchy::build(a, &param).unwrap();
    assert!(h.num_levels() >= 3);

    for l in 0..h.num_levels() - 1 {
        let level = h.level(l).unwrap();
        let coarse = h.level(l + 1).unwrap();
        let t = h.transfer(l).unwrap();
        assert_eq!(level.a.num_rows, level.a.num_cols);
        assert_eq!(t.p.num_rows, level.a.num_rows);
        assert_eq!(t.r.num_cols, level.a.num_rows);
        assert_eq!(t.p.num_cols, coarse.a.num_rows);
        assert_eq!(t.r.num_rows, coarse.a.num_rows);

        for (i, &mark) in level.cfmark.iter().enumerate() {
            if mark == PointType::Coarse {
                let entries: Vec<(usize, f64)> = t.p.row_entries(i).collect();
                assert_eq!(entries.len(), 1, "C-row {i} on level {l}");
                assert_relative_eq!(entries[0].1, 1.0);
            }
        }
    }
}

#[test]
fn test_zero_rhs_stays_zero() {
    let a = laplacian_2d(31);
    let n = a.num_rows;
    let param = AmgParam {
        coarse_dof: 50,
        ..AmgParam::default()
    };
    let mut h = AmgHierarchy::build(a, &param).unwrap();
    load(&mut h, &vec![0.0; n], &vec![0.0; n]);
    mg_cycle(&mut h, &param, 0).unwrap();
    assert!(h.solution().iter().all(|v| v.abs() < 1e-14));
}

#[test]
fn test_identity_is_single_level() {
    let n = 100;
    let param = AmgParam {
        coarse_dof: 10,
        ..AmgParam::default()
    };
    let mut h = AmgHierarchy::build(CsrMatrix::identity(n), &param).unwrap();
    assert_eq!(h.num_levels(), 1);
    assert_eq!(h.diagnostics().coarse_solver, "cg");

    let mut rng = StdRng::seed_from_u64(11);
    let b = Array1::from_iter((0..n).map(|_| rng.random_range(-2.0..2.0)));
    let mut x = Array1::zeros(n);
    let solution = amg_solve(&mut h, &param, &b, &mut x).unwrap();
    assert!(solution.converged);
    assert_eq!(solution.iterations, 1);
    for i in 0..n {
        assert_relative_eq!(x[i], b[i], epsilon = 1e-10);
    }
}

#[test]
fn test_aggressive_coarsening_2d() {
    let a = laplacian_2d(63);
    let n0 = a.num_rows;

    let classical = AmgHierarchy::build(a.clone(), &AmgParam::classical()).unwrap();
    let n1_classical = classical.level_sizes()[1];
    assert!(n1_classical * 3 > n0, "classical n1 = {n1_classical}");

    let param = AmgParam::aggressive();
    let mut h = AmgHierarchy::build(a, &param).unwrap();
    let sizes = h.level_sizes();
    let n1 = sizes[1];
    assert!(n1 * 5 < n0, "aggressive n1 = {n1}");
    assert!(n1 * 12 > n0, "aggressive n1 = {n1}");
    assert!(sizes.windows(2).all(|w| w[0] > w[1]), "levels {sizes:?}");

    let fine_coarse = h
        .level(0)
        .unwrap()
        .cfmark
        .iter()
        .filter(|&&m| m == PointType::Coarse)
        .count();
    assert_eq!(fine_coarse, n1);

    let b = Array1::from_elem(n0, 1.0);
    let mut x = Array1::zeros(n0);
    let solution = amg_solve(&mut h, &param, &b, &mut x).unwrap();
    assert!(solution.converged, "{solution:?}");
    assert!(solution.iterations < 60, "{solution:?}");
}

#[test]
fn test_single_unknown() {
    let a = CsrMatrix::from_triplets(1, 1, vec![(0, 0, 2.0)]);
    let param = AmgParam::default();
    let mut h = AmgHierarchy::build(a, &param).unwrap();
    assert_eq!(h.num_levels(), 1);

    let b = Array1::from_elem(1, 1.0);
    let mut x = Array1::zeros(1);
    let solution = amg_solve(&mut h, &param, &b, &mut x).unwrap();
    assert!(solution.converged);
    assert_eq!(solution.iterations, 1);
    assert_relative_eq!(x[0], 0.5, epsilon = 1e-12);
}

#[test]
fn test_zero_row_is_isolated_and_untouched() {
    let n = 301;
    let k = 150;
    let mut triplets = Vec::new();
    for i in (0..n).filter(|&i| i != k) {
        triplets.push((i, i, 2.0));
        if i > 0 && i - 1 != k {
            triplets.push((i, i - 1, -1.0));
        }
        if i + 1 < n && i + 1 != k {
            triplets.push((i, i + 1, -1.0));
        }
    }
    let a = CsrMatrix::from_triplets(n, n, triplets);
    assert_eq!(a.row_nnz(k), 0);

    let param = AmgParam {
        coarse_dof: 50,
        ..AmgParam::default()
    };
    let mut h = AmgHierarchy::build(a.clone(), &param).unwrap();
    assert!(h.num_levels() >= 2);
    assert_eq!(h.level(0).unwrap().cfmark[k], PointType::Isolated);
    assert_eq!(h.transfer(0).unwrap().p.row_nnz(k), 0);

    let mut b = vec![1.0; n];
    b[k] = 0.0;
    let mut x0 = vec![0.0; n];
    x0[k] = 3.0;
    load(&mut h, &b, &x0);

    let r0 = residual_norm(&a, &b, &x0);
    for _ in 0..3 {
        mg_cycle(&mut h, &param, 0).unwrap();
    }
    assert_eq!(h.solution()[k], 3.0);
    let r3 = residual_norm(&a, &b, h.solution());
    assert!(r3 < 1e-3 * r0, "ratio {}", r3 / r0);
}

#[test]
fn test_every_cycle_solves_2d_poisson() {
    let a = laplacian_2d(31);
    let n = a.num_rows;
    let b = Array1::from_elem(n, 1.0);

    for cycle_type in [
        CycleType::V,
        CycleType::W,
        CycleType::Amli,
        CycleType::NonlinearAmli,
        CycleType::K,
    ] {
        let param = AmgParam {
            coarse_dof: 50,
            cycle_type,
            ..AmgParam::default()
        };
        let mut h = AmgHierarchy::build(a.clone(), &param).unwrap();
        let mut x = Array1::zeros(n);
        let solution = amg_solve(&mut h, &param, &b, &mut x).unwrap();
        assert!(solution.converged, "{cycle_type:?}: {solution:?}");
        assert!(solution.iterations <= 30, "{cycle_type:?}: {solution:?}");

        let r = a.residual(&b, &x);
        let rel = r.dot(&r).sqrt() / b.dot(&b).sqrt();
        assert!(rel <= 1e-8, "{cycle_type:?}: {rel}");
    }
}
