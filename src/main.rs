use std::collections::BTreeMap;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;

use rtrace::{DataRow, Document, StepperConfig, Timeline};

/// Steps a saved document and prints the data tables of its tracks as YAML.
#[derive(Parser, Debug)]
#[command(name = "rtrace")]
struct Args {
    /// Scenario (saved document) to load
    #[arg(default_value = "scenarios/two_body.yaml")]
    scenario: PathBuf,

    /// Frame to step to; defaults to the last frame of the clip
    #[arg(short, long)]
    frame: Option<usize>,

    /// Stepper configuration overriding the scenario's
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Only print this track
    #[arg(short, long)]
    track: Option<String>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();

    let mut doc = Document::from_yaml_file(&args.scenario)
        .with_context(|| format!("failed to load {}", args.scenario.display()))?;
    if let Some(path) = &args.config {
        let config = StepperConfig::from_yaml_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?;
        doc.set_config(config)?;
    }
    let frame = args.frame.unwrap_or_else(|| doc.clip().last_frame());
    doc.set_frame(frame)?;
    info!("stepped to frame {}", frame);

    let mut tables: BTreeMap<String, Vec<DataRow>> = BTreeMap::new();
    for (id, track) in doc.tracks().iter().enumerate() {
        if args.track.as_deref().is_some_and(|name| name != track.name()) {
            continue;
        }
        tables.insert(track.name().to_string(), doc.data_table(id)?);
    }
    if let Some(name) = &args.track {
        anyhow::ensure!(!tables.is_empty(), "no track named '{}'", name);
    }
    print!("{}", serde_yaml::to_string(&tables)?);
    Ok(())
}
