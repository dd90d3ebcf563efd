//! Build a network from its definition and write the initial snapshot

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, ValueHint};
use stratum_chords::io::write_json;
use stratum_chords::layers::params::save_param_table;
use stratum_chords::{ChordError, Network};

#[derive(Parser)]
#[command(author, version, about = "Initialize network parameters from a definition file")]
struct Cli {
    /// Network definition JSON (`{"layers": [...]}`)
    #[arg(value_hint = ValueHint::FilePath)]
    definition_file: PathBuf,

    /// Output snapshot (`"layer/param"` -> tensor)
    #[arg(value_hint = ValueHint::FilePath)]
    param_file: PathBuf,

    /// Optional output for the layer descriptors
    #[arg(long = "descriptor_file", value_hint = ValueHint::FilePath)]
    descriptor_file: Option<PathBuf>,

    /// Seed for parameter initialization
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let network = match Network::from_definition_file(&cli.definition_file, cli.seed) {
        Ok(network) => network,
        Err(ChordError::MissingInputFile(path)) => {
            eprintln!("File does not exist: {}", path);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    let params = network.param_values();
    save_param_table(&cli.param_file, &params)?;
    log::info!(
        "Wrote {} parameters of {} layers to {}",
        params.len(),
        network.layers().len(),
        cli.param_file.display()
    );

    if let Some(path) = &cli.descriptor_file {
        write_json(path, &network.descriptors())?;
        log::info!("Wrote layer descriptors to {}", path.display());
    }
    Ok(())
}
