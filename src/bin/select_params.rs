//! Sweep parameter snapshots on held validation batches and keep the best

use std::error::Error;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, ValueHint};
use stratum_chords::io::copy_file;
use stratum_chords::{select_param_file, ChordError, Metric, SelectionConfig};

#[derive(Parser)]
#[command(author, version, about = "Pick the best network snapshot by validation score")]
struct Cli {
    /// Stash of validation records (`cqt` + `chord_idx`)
    #[arg(value_hint = ValueHint::FilePath)]
    data_file: PathBuf,

    /// Network definition JSON
    #[arg(value_hint = ValueHint::FilePath)]
    transform_file: PathBuf,

    /// Text file listing one snapshot path per line
    #[arg(value_hint = ValueHint::FilePath)]
    param_textlist: PathBuf,

    /// Destination for the chosen snapshot
    #[arg(value_hint = ValueHint::FilePath)]
    param_file: PathBuf,

    /// Number of validation minibatches
    #[arg(long = "num_obs", default_value_t = 100)]
    num_obs: usize,

    /// Number of sorted snapshots to skip
    #[arg(long = "start_idx", default_value_t = 0)]
    start_idx: usize,

    /// Score to rank by: precision, recall or f1
    #[arg(long, default_value = "recall")]
    metric: Metric,

    /// Hann window length for score smoothing
    #[arg(long = "filter_len", default_value_t = 5)]
    filter_len: usize,

    /// Seed for validation sampling and network construction
    #[arg(long, default_value_t = 0)]
    seed: u64,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let stop = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&stop);
    ctrlc::set_handler(move || {
        log::warn!("Interrupted, finishing with the snapshots scored so far");
        handler_flag.store(true, Ordering::SeqCst);
    })?;

    let config = SelectionConfig {
        metric: cli.metric,
        filter_len: cli.filter_len,
        start_idx: cli.start_idx,
        num_obs: cli.num_obs,
        seed: cli.seed,
        ..SelectionConfig::default()
    };

    let selection = match select_param_file(
        &cli.data_file,
        &cli.transform_file,
        &cli.param_textlist,
        &config,
        &stop,
    ) {
        Ok(selection) => selection,
        Err(ChordError::MissingInputFile(path)) => {
            eprintln!("File does not exist: {}", path);
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    log::info!(
        "Best snapshot {} of {}: {}",
        selection.index,
        selection.candidates.len(),
        selection.chosen.display()
    );
    copy_file(&selection.chosen, &cli.param_file)?;
    log::info!("Copied to {}", cli.param_file.display());
    Ok(())
}
