use clap::Parser;
use kidfit::config::PipelineConfig;
use kidfit::diagnostics::Diagnostic;
use kidfit::error::KidfitError;
use kidfit::fitting::common::fitstruct::{FitValue, FitWindow, SweepRecord};
use kidfit::pipeline::{par_process_resonators, ResonatorInput, ResonatorOutput};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

pub type BinResult<T, E = Box<dyn std::error::Error + Send + Sync>> = Result<T, E>;

fn main() {
    if let Err(e) = bin_main() {
        eprintln!("error: {e}");
        if let Some(e) = e.source() {
            eprintln!("error: {e}");
        }
        std::process::exit(1);
    }
}

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Sweep files with whitespace-separated columns: frequency (Hz), I, Q
    #[arg(required = true)]
    infiles: Vec<PathBuf>,

    /// JSON file with pipeline settings; unnamed settings keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Write the results here instead of stdout
    #[arg(short, long)]
    outfile: Option<PathBuf>,
}

#[derive(Serialize)]
struct Report<'a> {
    kid_id: usize,
    file: &'a Path,
    enabled: bool,
    reason: Option<String>,
    window: Option<FitWindow>,
    params: Option<Vec<(&'static str, FitValue)>>,
    reduced_chi_squared: Option<f64>,
    diagnostics: &'a [Diagnostic],
}

impl<'a> Report<'a> {
    fn new(file: &'a Path, output: &'a ResonatorOutput) -> Report<'a> {
        let params = output.state.params();
        Report {
            kid_id: output.kid_id,
            file,
            enabled: output.state.is_enabled(),
            reason: output.state.reason().map(|e| e.to_string()),
            window: output.state.window(),
            params: params.map(|p| p.named().to_vec()),
            reduced_chi_squared: params.map(|p| p.reduced_chi_squared),
            diagnostics: output.diagnostics.entries(),
        }
    }
}

/// Reads a three-column sweep file; blank lines and lines starting with `#` are skipped
fn read_sweep(path: &Path) -> Result<SweepRecord, KidfitError> {
    let contents = std::fs::read_to_string(path)
        .map_err(|e| KidfitError::InvalidInput(format!("{}: {e}", path.display())))?;
    let (mut freq, mut i, mut q) = (vec![], vec![], vec![]);
    for (lineno, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let values = line
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|e| {
                KidfitError::InvalidInput(format!("{}:{}: {e}", path.display(), lineno + 1))
            })?;
        match values[..] {
            [f, re, im] => {
                freq.push(f);
                i.push(re);
                q.push(im);
            }
            _ => Err(KidfitError::InvalidInput(format!(
                "{}:{}: expected 3 columns, found {}",
                path.display(),
                lineno + 1,
                values.len()
            )))?,
        }
    }
    Ok(SweepRecord::from_hz(&freq, i, q)?)
}

fn bin_main() -> BinResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let config: PipelineConfig = match &args.config {
        Some(path) => serde_json::from_str(&std::fs::read_to_string(path)?)?,
        None => PipelineConfig::default(),
    };

    let mut inputs = vec![];
    for (kid_id, path) in args.infiles.iter().enumerate() {
        inputs.push(ResonatorInput {
            kid_id,
            sweep: read_sweep(path)?,
            readout: None,
            blind_tones: None,
        });
    }

    // Fit the sweeps!
    let outputs = par_process_resonators(&inputs, &config);
    let enabled = outputs.iter().filter(|out| out.state.is_enabled()).count();
    tracing::info!("{enabled} of {} resonators enabled", outputs.len());

    let reports: Vec<Report> = args
        .infiles
        .iter()
        .zip(outputs.iter())
        .map(|(path, output)| Report::new(path, output))
        .collect();
    let json = serde_json::to_string_pretty(&reports)?;
    match &args.outfile {
        Some(path) => std::fs::write(path, json)?,
        None => println!("{json}"),
    }
    Ok(())
}
