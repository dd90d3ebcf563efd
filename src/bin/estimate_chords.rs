//! Decode a stash of posteriorgrams and write the estimation histograms

use std::error::Error;
use std::path::PathBuf;

use clap::{Parser, ValueHint};
use stratum_chords::io::write_json;
use stratum_chords::{estimate_chords, ChordError, EstimationMap};

#[derive(Parser)]
#[command(author, version, about = "Aggregate decoded chord classes by ground-truth label")]
struct Cli {
    /// Stash of posterior records (JSON object: key -> record)
    #[arg(value_hint = ValueHint::FilePath)]
    posterior_file: PathBuf,

    /// Validation statistics JSON holding `best_config.penalty`
    #[arg(value_hint = ValueHint::FilePath)]
    validation_file: PathBuf,

    /// Output JSON file for the estimations
    #[arg(value_hint = ValueHint::FilePath)]
    estimation_file: PathBuf,

    /// Decoding strategy: mle, medfilt_mle or viterbi
    #[arg(long, default_value = "viterbi")]
    strategy: String,

    /// Write one estimation map per record instead of the merged map
    #[arg(long)]
    per_record: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let estimates = match estimate_chords(&cli.posterior_file, &cli.validation_file, &cli.strategy) {
        Ok(estimates) => estimates,
        Err(ChordError::MissingInputFile(path)) => {
            eprintln!("File does not exist: {}", path);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    if !estimates.skipped.is_empty() {
        log::warn!("Skipped {} records", estimates.skipped.len());
    }

    if cli.per_record {
        write_json(&cli.estimation_file, &estimates.per_record)?;
    } else {
        let merged = estimates.merged.unwrap_or_else(|| EstimationMap::new(0));
        write_json(&cli.estimation_file, &merged)?;
    }
    log::info!("Wrote estimations to {}", cli.estimation_file.display());
    Ok(())
}
