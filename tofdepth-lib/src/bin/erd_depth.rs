use std::path::PathBuf;
use std::process;

use clap::Parser;
use env_logger::Env;
use log::{error, info};

use tofdepth::events::MAX_EVENTS;
use tofdepth::{
    DepthSetup, IsotopeTable, OutputProfile, Reconstructor, StoppingTable, TofDepthError,
    load_events,
};

#[derive(Parser)]
#[command(name = "erd_depth")]
#[command(about = "Depth profiles from ToF-ERDA event lists", long_about = None)]
struct Cli {
    /// Prefix of the written profile files
    #[arg(default_value = "depth")]
    prefix: String,

    /// Setup file
    #[arg(default_value = "erd_depth.in")]
    setup: PathBuf,

    /// Event list, `-` for standard input
    #[arg(default_value = "-")]
    events: PathBuf,

    /// Isotope mass table
    #[arg(long, value_name = "FILE", env = "TOFDEPTH_MASSES", default_value = "masses.dat")]
    masses: PathBuf,

    /// List of stopping data files
    #[arg(long, value_name = "FILE", env = "TOFDEPTH_STOPPINGS", default_value = "stoppings.txt")]
    stoppings: PathBuf,

    /// Events read at most
    #[arg(long, default_value_t = MAX_EVENTS)]
    max_events: usize,

    /// Stop iterating once the beam energy table changes less than this
    /// (relative to the beam energy)
    #[arg(long, value_name = "TOL")]
    converge: Option<f64>,
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    if let Err(err) = run(&cli) {
        error!("{err}");
        process::exit(err.exit_code());
    }
}

fn run(cli: &Cli) -> Result<(), TofDepthError> {
    let masses = IsotopeTable::load(&cli.masses)?;
    let mut setup = DepthSetup::load(&cli.setup, &masses)?;
    if cli.converge.is_some() {
        setup.convergence = cli.converge;
    }

    let events = load_events(&cli.events, setup.detector_angle, cli.max_events)?;
    let mut reconstructor = Reconstructor::new(setup, events)?;

    let z_max = reconstructor.census().elements().last().copied().unwrap_or(1);
    let mut table = StoppingTable::from_settings(z_max, &cli.stoppings)?;
    reconstructor.load_stopping(&mut table)?;
    reconstructor.run()?;

    let profile = OutputProfile::new(reconstructor.setup(), reconstructor.events());
    let written = profile.write_files(&cli.prefix, reconstructor.census(), &masses)?;
    for path in &written {
        info!("wrote {}", path.display());
    }
    Ok(())
}
