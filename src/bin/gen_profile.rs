use clap::{Parser, ValueEnum};
use mcinv_param::model::load_model_txt;
use mcinv_param::LayeredProfile;
use pretty_env_logger;
use std::process::ExitCode;
use std::{error::Error, path::PathBuf};

#[derive(Parser, Debug)]
#[command(
    author,
    about = "Expand a grouped 1-D model spec into the dense layered profile handed to the forward solver",
    long_about = None,
    version = env!("MCINV_PARAM_VERSION")
)]
struct Cli {
    /// Path to the group-spec text file
    model_path: PathBuf,

    /// Output file path (prints to stdout when omitted)
    #[clap(short, long)]
    output_filepath: Option<PathBuf>,

    /// Output format
    #[clap(short, long, default_value = "table")]
    format: OutputFormat,

    /// Inclusive group index range for the monotonic-velocity check (e.g. "0 2")
    #[clap(short, long, value_delimiter = ' ', num_args = 2)]
    monotonic_range: Option<Vec<isize>>,

    /// Inclusive group index range for the positive-gradient check (e.g. "1 2")
    #[clap(short, long, value_delimiter = ' ', num_args = 2)]
    gradient_range: Option<Vec<isize>>,

    /// Skip the physical acceptance checks
    #[clap(long, action)]
    no_validate: bool,
}

#[derive(ValueEnum, Clone, Debug, Default)]
enum OutputFormat {
    #[default]
    Table,
    Csv,
}

fn entrypoint() -> Result<(), Box<dyn Error>> {
    pretty_env_logger::init();
    let cli = Cli::parse();

    let mut model = load_model_txt(&cli.model_path)?;
    let nmod = model.group_count() as isize;
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

    if !cli.no_validate && !model.is_valid(monotonic, gradient)? {
        return Err("model violates the velocity monotonicity constraints".into());
    }

    let profile = model.expand()?;
    let rendered = match cli.format {
        OutputFormat::Table => format!("{}", profile),
        OutputFormat::Csv => format_csv_output(&profile)?,
    };
    match &cli.output_filepath {
        Some(path) => {
            std::fs::write(path, rendered)?;
            println!("Wrote {}", path.display());
        }
        None => print!("{}", rendered),
    }
    Ok(())
}

fn format_csv_output(profile: &LayeredProfile) -> Result<String, Box<dyn Error>> {
    let mut writer = csv::Writer::from_writer(vec![]);
    writer.write_record(["depth", "thickness", "vs", "vp", "rho", "qs", "qp"])?;
    for k in 0..profile.layer_count() {
        writer.write_record(&[
            format!("{:.6}", profile.depth()[k]),
            format!("{:.6}", profile.thicknesses()[k]),
            format!("{:.6}", profile.vs()[k]),
            format!("{:.6}", profile.vp()[k]),
            format!("{:.6}", profile.rho()[k]),
            format!("{:.6}", profile.qs()[k]),
            format!("{:.6}", profile.qp()[k]),
        ])?;
    }
    Ok(String::from_utf8(writer.into_inner()?)?)
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
