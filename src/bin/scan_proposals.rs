use clap::{Parser, ValueEnum};
use humantime::format_duration;
use log::{debug, info};
use mcinv_param::model::load_model_txt;
use mcinv_param::para::ProposalPolicy;
use pretty_env_logger;
use rayon::prelude::*;
use std::process::ExitCode;
use std::time::Instant;
use std::{error::Error, path::PathBuf};

#[derive(Parser, Debug)]
#[command(
    author,
    about = "Draw trial models around a group spec and report how many pass the physical acceptance checks",
    long_about = None,
    version = env!("MCINV_PARAM_VERSION")
)]
struct Cli {
    /// Path to the group-spec text file
    model_path: PathBuf,

    /// Number of trial models to draw
    #[clap(short, long, default_value = "1000")]
    count: usize,

    /// Proposal policy
    #[clap(short, long, default_value = "uniform")]
    policy: PolicyKind,

    /// Inclusive group index range for the monotonic-velocity check (e.g. "0 2")
    #[clap(short, long, value_delimiter = ' ', num_args = 2)]
    monotonic_range: Option<Vec<isize>>,

    /// Inclusive group index range for the positive-gradient check (e.g. "1 2")
    #[clap(short, long, value_delimiter = ' ', num_args = 2)]
    gradient_range: Option<Vec<isize>>,
}

#[derive(ValueEnum, Clone, Copy, Debug, Default)]
enum PolicyKind {
    #[default]
    Uniform,
    Gaussian,
}

fn entrypoint() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let base_model = load_model_txt(&cli.model_path)?;
    let mut base_params = base_model.parameter_layout();
    base_model.update_params(&mut base_params)?;

    let nmod = base_model.group_count() as isize;
    let monotonic = cli
        .monotonic_range
        .as_ref()
        .map(|r| (r[0], r[1]))
        .unwrap_or((0, nmod - 1));
    let gradient = cli
        .gradient_range
        .as_ref()
        .map(|r| (r[0], r[1]))
        .unwrap_or((1, nmod - 1));
    let policy = match cli.policy {
        PolicyKind::Uniform => ProposalPolicy::Uniform,
        PolicyKind::Gaussian => ProposalPolicy::Gaussian,
    };

    info!(
        "scanning {} {:?} proposals over {} parameters",
        cli.count,
        cli.policy,
        base_params.len()
    );
    let now = Instant::now();

    // Each worker perturbs its own model/parameter pair; nothing is shared.
    let accepted: usize = (0..cli.count)
        .into_par_iter()
        .map_init(rand::rng, |rng, trial| {
            let mut params = base_params.clone();
            let mut model = base_model.clone();
            if let Err(e) = params.propose(policy, rng) {
                debug!("trial {}: proposal abandoned: {}", trial, e);
                return 0usize;
            }
            if model.apply_params(&params).is_err() {
                return 0;
            }
            match model.is_valid(monotonic, gradient) {
                Ok(true) => match model.expand() {
                    Ok(_) => 1,
                    Err(e) => {
                        debug!("trial {}: expansion failed: {}", trial, e);
                        0
                    }
                },
                _ => 0,
            }
        })
        .sum();

    info!("scan took {}", format_duration(now.elapsed()));
    println!(
        "accepted {} of {} proposals ({:.1}%)",
        accepted,
        cli.count,
        100. * accepted as f64 / cli.count.max(1) as f64
    );
    Ok(())
}

fn main() -> ExitCode {
    match entrypoint() {
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
        Ok(_) => ExitCode::SUCCESS,
    }
}
