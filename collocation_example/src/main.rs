use std::f64::consts::FRAC_PI_2;

use anyhow::Context;
use collocation_example::prelude::*;

const MAX_SOLVER_ITERS: u64 = 50;

fn load_config() -> anyhow::Result<TranscriptionConfig> {
    match std::env::args().nth(1) {
        Some(path) => {
            let text = std::fs::read_to_string(&path).with_context(|| format!("reading config file {path}"))?;
            TranscriptionConfig::from_toml_str(&text).with_context(|| format!("parsing config file {path}"))
        }
        None => Ok(TranscriptionConfig::default()),
    }
}

fn run_decay(config: &TranscriptionConfig) -> anyhow::Result<()> {
    let decay = ExponentialDecay { rate: 2.0 };
    let (x0, tf) = (1.0, 1.5);
    let mut phase = decay_phase(decay, x0, tf, vec![-1.0, 1.0], vec![4], config.clone());
    phase.initialize()?;

    let boundary = InitialValueBoundary::new(0.0, tf, &[x0]);
    let passes = solve_with_mesh_refinement(&mut phase, &boundary, MAX_SOLVER_ITERS)?;

    println!("\n======= exponential decay =======");
    for (i, pass) in passes.iter().enumerate() {
        println!(
            "  pass {i}: {} intervals, {} decision vars, {} solver iters, max |residual| {:.3e}, max rel error {:.3e}",
            pass.num_mesh_intervals,
            pass.num_decision_vars,
            pass.run.iterations,
            pass.run.max_residual,
            pass.refinement.max_rel_error()
        );
    }
    phase.print_mesh();
    let x_final = phase.decision_vector()?.last_state_vector()?[0];
    println!(
        "  x(tf) = {x_final:.10}, exact {:.10}",
        decay.exact_state(x0, tf)
    );
    println!(
        "  cost = {:.10}, exact {:.10}",
        phase.cost_function()?,
        decay.exact_cost(x0, tf)
    );
    Ok(())
}

fn run_steering(config: &TranscriptionConfig) -> anyhow::Result<()> {
    let tf = 1.0;
    let steering = LinearSteering {
        gravity: 9.81,
        omega: FRAC_PI_2 / tf,
    };
    let mut phase = steering_phase(steering, tf, vec![-1.0, 0.0, 1.0], vec![8, 8], config.clone());
    phase.initialize()?;
    phase.configure_scaling()?;

    let boundary = InitialValueBoundary::new(0.0, tf, &[0.0, 0.0, 0.0]);
    let run = solve_feasibility(&mut phase, &boundary, MAX_SOLVER_ITERS)?;

    println!("\n======= linear steering =======");
    println!(
        "  {} after {} iterations, max |residual| {:.3e}",
        run.solver_name, run.iterations, run.max_residual
    );
    phase.print_decision_vector()?;
    let final_state = phase.decision_vector()?.last_state_vector()?;
    let exact = steering.exact_state(tf);
    for (name, (got, want)) in ["x", "y", "v"].iter().zip(final_state.iter().zip(exact.iter())) {
        println!("  {name}(tf) = {got:.10}, exact {want:.10}");
    }

    let refinement = phase.refine_mesh(false)?;
    println!(
        "  mesh error estimate {:.3e} (refine: {})",
        refinement.max_rel_error(),
        refinement.is_mesh_refined
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    let config = load_config()?;
    run_decay(&config)?;
    run_steering(&config)?;
    Ok(())
}
