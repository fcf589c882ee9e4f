//! CLI Module
//!
//! Command-line interface for rendering treatments and inspecting
//! parameters.

pub mod commands;

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Notchladder - stepped-notch tinnitus treatment renderer
#[derive(Parser, Debug)]
#[command(name = "notchladder-cli")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Render the ladder treatment of a WAV file
    #[command(name = "process")]
    Process(ProcessArgs),

    /// Render the segment mix of several treatments
    #[command(name = "treat")]
    Treat(TreatArgs),

    /// List parameters with their current values
    #[command(name = "params")]
    Params {
        /// Description language
        #[arg(short, long)]
        lang: Option<String>,

        #[command(flatten)]
        store: StoreArgs,
    },
}

/// Where parameter values come from
#[derive(Args, Debug, Clone, Default)]
pub struct StoreArgs {
    /// Parameter definitions file (built-in defaults when omitted)
    #[arg(long = "params", value_name = "FILE")]
    pub definitions: Option<PathBuf>,

    /// Parameter overrides file
    #[arg(long, value_name = "FILE")]
    pub overrides: Option<PathBuf>,

    /// Override a parameter (repeatable)
    #[arg(long = "set", value_name = "KEY=VALUE", value_parser = parse_assignment)]
    pub set: Vec<(String, f64)>,
}

#[derive(Args, Debug)]
pub struct ProcessArgs {
    /// Input WAV file
    pub input: PathBuf,

    /// Output WAV file
    pub output: PathBuf,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Pipeline configuration file
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Notch design (overrides the configuration file)
    #[arg(long, value_enum)]
    pub design: Option<DesignArg>,

    /// Pick the beep channel at random instead of alternating
    #[arg(long)]
    pub random_channels: bool,

    /// Seed for random channel selection
    #[arg(long, default_value_t = 0)]
    pub seed: u64,

    /// Output bit depth (16, 24 or 32 for float)
    #[arg(long, default_value_t = 24)]
    pub bit_depth: u16,

    /// Write the effective overrides to this file
    #[arg(long, value_name = "FILE")]
    pub save_overrides: Option<PathBuf>,
}

#[derive(Args, Debug)]
pub struct TreatArgs {
    /// Input WAV file
    pub input: PathBuf,

    /// Output WAV file
    pub output: PathBuf,

    #[command(flatten)]
    pub store: StoreArgs,

    /// Pipeline configuration with the segment recipes
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Output bit depth (16, 24 or 32 for float)
    #[arg(long, default_value_t = 24)]
    pub bit_depth: u16,
}

/// Notch design selectable from the command line
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum DesignArg {
    /// IIR notch with Q-factor
    Q,
    /// Butterworth band-stop between band edges
    Band,
}

/// Parse `key=value` into a parameter assignment
pub fn parse_assignment(s: &str) -> Result<(String, f64), String> {
    let (key, value) = s
        .split_once('=')
        .ok_or_else(|| format!("expected KEY=VALUE, got '{}'", s))?;
    let value: f64 = value
        .trim()
        .parse()
        .map_err(|_| format!("'{}' is not a number", value.trim()))?;
    Ok((key.trim().to_string(), value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment() {
        assert_eq!(
            parse_assignment("bandwidth=250").unwrap(),
            ("bandwidth".to_string(), 250.0)
        );
        assert_eq!(
            parse_assignment(" q_factor = 12.5 ").unwrap(),
            ("q_factor".to_string(), 12.5)
        );
        assert!(parse_assignment("bandwidth").is_err());
        assert!(parse_assignment("bandwidth=wide").is_err());
    }

    #[test]
    fn test_process_arguments() {
        let cli = Cli::parse_from([
            "notchladder-cli",
            "-v",
            "process",
            "in.wav",
            "out.wav",
            "--set",
            "start_freq=9000",
            "--set",
            "end_freq=10000",
            "--design",
            "band",
            "--random-channels",
            "--seed",
            "7",
        ]);
        assert!(cli.verbose);
        match cli.command {
            Some(Commands::Process(args)) => {
                assert_eq!(args.store.set.len(), 2);
                assert_eq!(args.design, Some(DesignArg::Band));
                assert!(args.random_channels);
                assert_eq!(args.seed, 7);
                assert_eq!(args.bit_depth, 24);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_params_arguments() {
        let cli = Cli::parse_from(["notchladder-cli", "params", "--lang", "nl"]);
        match cli.command {
            Some(Commands::Params { lang, store }) => {
                assert_eq!(lang.as_deref(), Some("nl"));
                assert!(store.definitions.is_none());
            }
            other => panic!("unexpected command {:?}", other),
        }
    }
}
