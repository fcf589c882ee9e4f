//! CLI Command Implementations
//!
//! Thin glue between the argument structs and the library: load the store
//! and configuration, run the pipeline, write the result.

use std::path::Path;

use anyhow::{bail, Context, Result};
use log::{info, warn};

use super::{DesignArg, ProcessArgs, StoreArgs, TreatArgs};
use crate::dsp::{ChannelSelection, NotchDesign, DEFAULT_BAND_STOP_ORDER};
use crate::engine::{calculate_rms_db, read_wav, write_wav, SampleBuffer, WavFormat};
use crate::params::{persist, ParameterStore};
use crate::pipeline::{PipelineConfig, PipelineMode, RunReport, TreatmentPipeline};

/// Build a parameter store from definitions, overrides and `--set` values
///
/// Later sources win: built-in or file defaults, then the overrides file,
/// then each `--set` in order.
pub fn load_store(args: &StoreArgs) -> Result<ParameterStore> {
    let mut store = match &args.definitions {
        Some(path) => {
            let definitions = persist::load_definitions(path)
                .with_context(|| format!("loading parameter definitions {}", path.display()))?;
            ParameterStore::new(definitions)
        }
        None => ParameterStore::builtin(),
    };

    if let Some(path) = &args.overrides {
        let overrides = persist::load_overrides(path)
            .with_context(|| format!("loading overrides {}", path.display()))?;
        store
            .apply_overrides(&overrides)
            .with_context(|| format!("applying overrides from {}", path.display()))?;
    }

    for (name, value) in &args.set {
        store
            .set(name, *value)
            .with_context(|| format!("--set {}={}", name, value))?;
    }

    Ok(store)
}

fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    match path {
        Some(path) => PipelineConfig::load(path)
            .with_context(|| format!("loading pipeline configuration {}", path.display())),
        None => Ok(PipelineConfig::default()),
    }
}

/// Render the ladder treatment of one file
pub fn process(args: &ProcessArgs) -> Result<()> {
    let store = load_store(&args.store)?;

    if let Some(path) = &args.save_overrides {
        persist::save_overrides(store.overrides(), path)
            .with_context(|| format!("saving overrides to {}", path.display()))?;
        println!("Overrides saved: {}", path.display());
    }

    let mut config = load_config(args.config.as_deref())?;
    if !matches!(config.mode, PipelineMode::Ladder) {
        warn!("'process' always renders the ladder; use 'treat' for segment mixes");
        config.mode = PipelineMode::Ladder;
    }
    if let Some(design) = args.design {
        config.design = match design {
            DesignArg::Q => NotchDesign::QFactor,
            DesignArg::Band => NotchDesign::BandEdges {
                order: DEFAULT_BAND_STOP_ORDER,
            },
        };
    }
    if args.random_channels {
        config.channels = ChannelSelection::Random { seed: args.seed };
    }

    render(store, config, &args.input, &args.output, args.bit_depth)
}

/// Render the segment mix of several treatments
pub fn treat(args: &TreatArgs) -> Result<()> {
    let store = load_store(&args.store)?;
    let mut config = load_config(args.config.as_deref())?;
    if matches!(config.mode, PipelineMode::Ladder) {
        info!("No segment recipes configured, using the default rotation");
        config.mode = PipelineMode::default_segments();
    }

    render(store, config, &args.input, &args.output, args.bit_depth)
}

fn render(
    store: ParameterStore,
    config: PipelineConfig,
    input: &Path,
    output: &Path,
    bit_depth: u16,
) -> Result<()> {
    if !matches!(bit_depth, 16 | 24 | 32) {
        bail!("unsupported bit depth {} (use 16, 24 or 32)", bit_depth);
    }
    let format = WavFormat::new(bit_depth);
    let buffer =
        read_wav(input).with_context(|| format!("reading input {}", input.display()))?;

    println!("=== Notchladder ===");
    println!("Input: {}", input.display());
    println!(
        "  {} frames at {} Hz ({:.1} s)",
        buffer.frames(),
        buffer.sample_rate,
        buffer.duration_secs()
    );

    let mut pipeline = TreatmentPipeline::new(store, config);
    pipeline.set_input(buffer).context("binding input")?;
    let report = pipeline.execute().context("rendering treatment")?;

    let rendered = pipeline
        .take_output()
        .context("pipeline finished without output")?;
    write_wav(&rendered, output, format)
        .with_context(|| format!("writing output {}", output.display()))?;

    print_report(&report);
    println!("Output RMS: {:.1} dBFS", mean_rms_db(&rendered));
    println!("Output saved to: {}", output.display());
    Ok(())
}

fn mean_rms_db(buffer: &SampleBuffer) -> f32 {
    let levels: Vec<f32> = buffer.samples.iter().map(|ch| calculate_rms_db(ch)).collect();
    levels.iter().sum::<f32>() / levels.len().max(1) as f32
}

fn print_report(report: &RunReport) {
    println!("Windows: {} ({} degraded)", report.windows, report.degraded_windows);
    if report.segments > 0 {
        println!("Segments: {}", report.segments);
    }
    if report.silent {
        println!("Output is silent, normalization skipped");
    } else {
        println!("Normalization gain: {:.3}", report.gain);
    }
}

/// Print every parameter with its resolved value
pub fn show_params(lang: Option<&str>, args: &StoreArgs) -> Result<()> {
    let mut store = load_store(args)?;
    if let Some(lang) = lang {
        store.set_language(lang).with_context(|| {
            format!(
                "available languages: {}",
                store.supported_languages().join(", ")
            )
        })?;
    }

    println!("Parameters ({}):", store.language());
    println!("{:-<72}", "");
    for param in store.info() {
        let marker = if param.overridden { "*" } else { " " };
        let unit = param.unit.as_deref().unwrap_or("");
        println!(
            "{}{:<18} {:>10} {:<5} {}",
            marker, param.name, param.value, unit, param.description
        );
    }
    println!("{:-<72}", "");
    println!("* overridden");
    Ok(())
}
