//! AMG on the Poisson model problem
//!
//! Assembles the 1-D or 2-D finite difference Laplacian, builds the
//! hierarchy and solves with repeated cycles or AMG-preconditioned CG.
//!
//! Usage:
//!     cargo run --bin amg-poisson --release -- --dim 2 --size 255 --cycle w

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Context;
use clap::{Parser, ValueEnum};
use math_audio_amg::parallel::{is_parallel_available, num_threads};
use math_audio_amg::{
    AmgDiagnostics, AmgHierarchy, AmgParam, AmgPreconditioner, CgConfig, CoarseningType,
    CsrMatrix, CycleType, InterpolationType, SmootherType, amg_solve, pcg,
};
use ndarray::Array1;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "amg-poisson")]
#[command(about = "Classical AMG on the finite difference Poisson problem")]
struct Args {
    /// Spatial dimension of the grid (1 or 2)
    #[arg(short, long, default_value = "2")]
    dim: usize,

    /// Interior points per direction
    #[arg(short = 'n', long, default_value = "127")]
    size: usize,

    /// JSON parameter file; command line options override it
    #[arg(short, long)]
    param: Option<PathBuf>,

    /// Multigrid cycle
    #[arg(short, long)]
    cycle: Option<CliCycle>,

    /// C/F splitting
    #[arg(long)]
    coarsening: Option<CliCoarsening>,

    /// Interpolation weights
    #[arg(short, long)]
    interpolation: Option<CliInterpolation>,

    /// Relaxation method
    #[arg(short, long)]
    smoother: Option<CliSmoother>,

    /// Coarsest level size
    #[arg(long)]
    coarse_dof: Option<usize>,

    /// Relative residual target
    #[arg(short, long, default_value = "1e-8")]
    tolerance: f64,

    /// Use AMG as a preconditioner for CG instead of a stand-alone solver
    #[arg(long)]
    pcg: bool,

    /// Verbosity passed to the solver (0, 1, 2, 4, 8)
    #[arg(long, default_value = "1")]
    print_level: u8,

    /// Write the report to this JSON file instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliCycle {
    V,
    W,
    Amli,
    NonlinearAmli,
    K,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliCoarsening {
    Classical,
    Aggressive,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliInterpolation {
    Direct,
    Regular,
    Standard,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum CliSmoother {
    Jacobi,
    Gs,
    Sgs,
    Sor,
    Ssor,
    Polynomial,
    L1Jacobi,
}

#[derive(Debug, Serialize)]
struct Report {
    problem: String,
    dofs: usize,
    threads: usize,
    method: String,
    diagnostics: AmgDiagnostics,
    iterations: usize,
    relative_residual: f64,
    converged: bool,
    solve_time_ms: f64,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let args = Args::parse();
    let param = build_param(&args)?;

    let a = match args.dim {
        1 => laplacian_1d(args.size),
        2 => laplacian_2d(args.size),
        d => anyhow::bail!("dimension must be 1 or 2, got {d}"),
    };
    let n = a.num_rows;
    let problem = format!("poisson-{}d {}^{}", args.dim, args.size, args.dim);
    log::info!("{problem}: {n} unknowns, {} nonzeros", a.nnz());
    if is_parallel_available() {
        log::info!("Row-parallel kernels on {} threads", num_threads());
    }

    let b = Array1::from_elem(n, 1.0);
    let start = Instant::now();
    let report = if args.pcg {
        let precond = AmgPreconditioner::from_csr(&a, param.clone())?;
        let config = CgConfig {
            max_iterations: param.maxit,
            tolerance: param.solve_tol,
            print_interval: 0,
        };
        let solution = pcg(&a, &precond, &b, &config);
        Report {
            problem,
            dofs: n,
            threads: num_threads(),
            method: format!("pcg + amg {:?}", param.cycle_type),
            diagnostics: precond.diagnostics().clone(),
            iterations: solution.iterations,
            relative_residual: solution.residual,
            converged: solution.converged,
            solve_time_ms: start.elapsed().as_secs_f64() * 1000.0,
        }
    } else {
        let mut hierarchy = AmgHierarchy::build(a, &param)?;
        let mut x = Array1::zeros(n);
        let solve_start = Instant::now();
        let solution = amg_solve(&mut hierarchy, &param, &b, &mut x)?;
        Report {
            problem,
            dofs: n,
            threads: num_threads(),
            method: format!("amg {:?}", param.cycle_type),
            diagnostics: hierarchy.diagnostics(),
            iterations: solution.iterations,
            relative_residual: solution.residual,
            converged: solution.converged,
            solve_time_ms: solve_start.elapsed().as_secs_f64() * 1000.0,
        }
    };

    let json = serde_json::to_string_pretty(&report)?;
    match &args.output {
        Some(path) => std::fs::write(path, json)
            .with_context(|| format!("writing report to {}", path.display()))?,
        None => println!("{json}"),
    }
    Ok(())
}

fn build_param(args: &Args) -> anyhow::Result<AmgParam> {
    let mut param = match &args.param {
        Some(path) => AmgParam::from_file(path)
            .with_context(|| format!("loading parameters from {}", path.display()))?,
        None => AmgParam::default(),
    };

    if let Some(cycle) = args.cycle {
        param.cycle_type = match cycle {
            CliCycle::V => CycleType::V,
            CliCycle::W => CycleType::W,
            CliCycle::Amli => CycleType::Amli,
            CliCycle::NonlinearAmli => CycleType::NonlinearAmli,
            CliCycle::K => CycleType::K,
        };
    }
    if let Some(coarsening) = args.coarsening {
        param.coarsening_type = match coarsening {
            CliCoarsening::Classical => CoarseningType::Classical,
            CliCoarsening::Aggressive => CoarseningType::Aggressive,
        };
    }
    if let Some(interpolation) = args.interpolation {
        param.interpolation_type = match interpolation {
            CliInterpolation::Direct => InterpolationType::Direct,
            CliInterpolation::Regular => InterpolationType::Regular,
            CliInterpolation::Standard => InterpolationType::Standard,
        };
    }
    if let Some(smoother) = args.smoother {
        param.smoother = match smoother {
            CliSmoother::Jacobi => SmootherType::Jacobi,
            CliSmoother::Gs => SmootherType::GaussSeidel,
            CliSmoother::Sgs => SmootherType::SymmetricGaussSeidel,
            CliSmoother::Sor => SmootherType::Sor,
            CliSmoother::Ssor => SmootherType::Ssor,
            CliSmoother::Polynomial => SmootherType::Polynomial,
            CliSmoother::L1Jacobi => SmootherType::L1Jacobi,
        };
    }
    if let Some(coarse_dof) = args.coarse_dof {
        param.coarse_dof = coarse_dof;
    }
    param.solve_tol = args.tolerance;
    param.print_level = args.print_level;
    param.validate()?;
    Ok(param)
}

fn laplacian_1d(n: usize) -> CsrMatrix<f64> {
    let mut triplets = Vec::with_capacity(3 * n);
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
    let n = m * m;
    let mut triplets = Vec::with_capacity(5 * n);
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
    CsrMatrix::from_triplets(n, n, triplets)
}
