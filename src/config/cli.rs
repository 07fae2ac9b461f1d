//! CLI argument parsing
//!
//! # Usage
//!
//! ```bash
//! fitloop train experiment.yaml
//! fitloop train experiment.yaml --epochs 10 --train-batch-size 32
//! fitloop validate experiment.yaml
//! fitloop info experiment.yaml --format json
//! ```

use super::schema::ExperimentSpec;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

/// fitloop: declarative image-classification experiments
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "fitloop")]
#[command(version)]
#[command(about = "Run image-classification experiments described in YAML")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable debug logging
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    pub verbose: bool,

    /// Log errors only
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Run an experiment
    Train(TrainArgs),

    /// Validate an experiment file without running it
    Validate(ValidateArgs),

    /// Display the resolved experiment settings
    Info(InfoArgs),
}

/// Arguments for the train command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct TrainArgs {
    /// Path to YAML experiment file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Override number of epochs
    #[arg(short, long)]
    pub epochs: Option<usize>,

    /// Override training batch size
    #[arg(long)]
    pub train_batch_size: Option<usize>,

    /// Override validation batch size
    #[arg(long)]
    pub valid_batch_size: Option<usize>,

    /// Override device (cpu, cuda, cuda:N)
    #[arg(long)]
    pub device: Option<String>,

    /// Override precision mode (fp32, fp16, bf16)
    #[arg(long)]
    pub precision: Option<String>,

    /// Override early-stopping patience
    #[arg(long)]
    pub patience: Option<usize>,

    /// Random seed for reproducibility
    #[arg(long)]
    pub seed: Option<u64>,

    /// Dry run (validate config but don't train)
    #[arg(long)]
    pub dry_run: bool,
}

/// Arguments for the validate command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct ValidateArgs {
    /// Path to YAML experiment file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Also check that the dataset files exist
    #[arg(short, long)]
    pub detailed: bool,
}

/// Arguments for the info command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct InfoArgs {
    /// Path to YAML experiment file
    #[arg(value_name = "CONFIG")]
    pub config: PathBuf,

    /// Output format (text, json, yaml)
    #[arg(short, long, default_value = "text")]
    pub format: OutputFormat,
}

/// Output format for `info`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
    Yaml,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "yaml" => Ok(OutputFormat::Yaml),
            _ => Err(format!(
                "Unknown output format: {s}. Use text, json, or yaml"
            )),
        }
    }
}

/// Parse CLI arguments from a string slice (for testing)
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Apply command-line overrides to an experiment description
pub fn apply_overrides(spec: &mut ExperimentSpec, args: &TrainArgs) {
    if let Some(epochs) = args.epochs {
        spec.epochs = epochs;
    }
    if let Some(bs) = args.train_batch_size {
        spec.train_batch_size = bs;
    }
    if let Some(bs) = args.valid_batch_size {
        spec.valid_batch_size = bs;
    }
    if let Some(device) = &args.device {
        spec.device = device.clone();
    }
    if let Some(precision) = &args.precision {
        spec.precision_mode = precision.clone();
    }
    if let Some(patience) = args.patience {
        spec.patience = patience;
    }
    if let Some(seed) = args.seed {
        spec.seed = seed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_train_command() {
        let cli = parse_args(["fitloop", "train", "experiment.yaml"]).unwrap();
        match cli.command {
            Command::Train(args) => {
                assert_eq!(args.config, PathBuf::from("experiment.yaml"));
                assert!(!args.dry_run);
                assert!(args.epochs.is_none());
            }
            _ => panic!("Expected Train command"),
        }
    }

    #[test]
    fn test_parse_train_with_overrides() {
        let cli = parse_args([
            "fitloop",
            "train",
            "experiment.yaml",
            "--epochs",
            "10",
            "--train-batch-size",
            "32",
            "--valid-batch-size",
            "16",
            "--device",
            "cpu",
            "--precision",
            "bf16",
            "--patience",
            "5",
            "--seed",
            "7",
            "--dry-run",
        ])
        .unwrap();

        match cli.command {
            Command::Train(args) => {
                assert_eq!(args.epochs, Some(10));
                assert_eq!(args.train_batch_size, Some(32));
                assert_eq!(args.valid_batch_size, Some(16));
                assert_eq!(args.device.as_deref(), Some("cpu"));
                assert_eq!(args.precision.as_deref(), Some("bf16"));
                assert_eq!(args.patience, Some(5));
                assert_eq!(args.seed, Some(7));
                assert!(args.dry_run);
            }
            _ => panic!("Expected Train command"),
        }
    }

    #[test]
    fn test_apply_overrides() {
        let mut spec: ExperimentSpec = serde_yaml::from_str("input_path: data\n").unwrap();
        let args = TrainArgs {
            config: PathBuf::from("x.yaml"),
            epochs: Some(1),
            train_batch_size: Some(8),
            valid_batch_size: None,
            device: None,
            precision: Some("fp16".into()),
            patience: Some(0),
            seed: None,
            dry_run: false,
        };
        apply_overrides(&mut spec, &args);
        assert_eq!(spec.epochs, 1);
        assert_eq!(spec.train_batch_size, 8);
        assert_eq!(spec.valid_batch_size, 64);
        assert_eq!(spec.precision_mode, "fp16");
        assert_eq!(spec.patience, 0);
        assert_eq!(spec.seed, 42);
    }

    #[test]
    fn test_parse_info_json_format() {
        let cli = parse_args(["fitloop", "info", "e.yaml", "--format", "json"]).unwrap();
        match cli.command {
            Command::Info(args) => assert_eq!(args.format, OutputFormat::Json),
            _ => panic!("Expected Info command"),
        }
    }

    #[test]
    fn test_parse_validate_detailed() {
        let cli = parse_args(["fitloop", "validate", "e.yaml", "-d"]).unwrap();
        match cli.command {
            Command::Validate(args) => assert!(args.detailed),
            _ => panic!("Expected Validate command"),
        }
    }

    #[test]
    fn test_global_verbose_flag() {
        let cli = parse_args(["fitloop", "-v", "validate", "e.yaml"]).unwrap();
        assert!(cli.verbose);
        assert!(!cli.quiet);
    }

    #[test]
    fn test_verbose_and_quiet_conflict() {
        assert!(parse_args(["fitloop", "-v", "-q", "validate", "e.yaml"]).is_err());
    }

    #[test]
    fn test_missing_config_file_argument() {
        assert!(parse_args(["fitloop", "train"]).is_err());
    }

    #[test]
    fn test_output_format_from_str() {
        assert_eq!("JSON".parse::<OutputFormat>(), Ok(OutputFormat::Json));
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
