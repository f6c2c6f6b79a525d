use std::io;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use log::info;

use segtherm::sim::thermal::SimulationSetup;
use segtherm::{ThermalConfig, integrate, read_obj, write_trajectory_csv};

#[derive(Parser, Debug)]
#[command(name = "segtherm")]
#[command(version)]
#[command(about = "Transient heat exchange between the segments of a mesh", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print exposed segment areas and the contact area matrix
    Areas {
        #[command(flatten)]
        input: Input,
    },
    /// Integrate the temperatures over the configured time grid
    Run {
        #[command(flatten)]
        input: Input,

        /// CSV output file (stdout when omitted)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Solve for the stationary temperatures, starting from the initial state
    Equilibrium {
        #[command(flatten)]
        input: Input,
    },
}

#[derive(clap::Args, Debug)]
struct Input {
    /// Segmented mesh (Wavefront OBJ)
    #[arg(short, long)]
    mesh: PathBuf,

    /// Thermal configuration (JSON)
    #[arg(short, long)]
    config: PathBuf,
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Areas { input } => {
            let setup = load(&input)?;
            println!("segment,area");
            for (label, area) in setup.labels.iter().zip(&setup.areas.segment_areas) {
                println!("{label},{area}");
            }
            println!();
            println!("contact matrix");
            for row in &setup.areas.contact_matrix {
                let row: Vec<String> = row.iter().map(|v| v.to_string()).collect();
                println!("{}", row.join(","));
            }
        }
        Command::Run { input, output } => {
            let setup = load(&input)?;
            let trajectory = integrate(
                &setup.model,
                &setup.initial_temperature,
                &setup.time_grid,
                setup.integrator,
            )
            .context("integration failed")?;
            let labels: Vec<&str> = setup.labels.iter().map(String::as_str).collect();
            match output {
                Some(path) => {
                    write_trajectory_csv(&path, &trajectory, &labels)?;
                    info!("Trajectory written to {}", path.display());
                }
                None => trajectory.write_csv(io::stdout().lock(), &labels)?,
            }
        }
        Command::Equilibrium { input } => {
            let setup = load(&input)?;
            let temperatures = setup
                .model
                .equilibrium(&setup.initial_temperature, setup.equilibrium)
                .context("equilibrium search failed")?;
            println!("segment,temperature");
            for (label, t) in setup.labels.iter().zip(&temperatures) {
                println!("{label},{t}");
            }
        }
    }
    Ok(())
}

fn load(input: &Input) -> Result<SimulationSetup> {
    let mesh = read_obj(&input.mesh).with_context(|| describe("load mesh", &input.mesh))?;
    let config =
        ThermalConfig::from_file(&input.config).with_context(|| describe("load config", &input.config))?;
    let setup = config
        .prepare(&mesh)
        .with_context(|| describe("prepare simulation for", &input.mesh))?;
    Ok(setup)
}

fn describe(action: &str, path: &Path) -> String {
    format!("{action} {}", path.display())
}
