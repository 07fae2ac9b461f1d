//! fitloop CLI
//!
//! # Usage
//!
//! ```bash
//! # Run an experiment
//! fitloop train experiment.yaml
//!
//! # Run with overrides
//! fitloop train experiment.yaml --epochs 10 --precision fp16
//!
//! # Validate an experiment file
//! fitloop validate experiment.yaml
//!
//! # Show resolved settings
//! fitloop info experiment.yaml --format yaml
//! ```

use clap::Parser;
use fitloop::config::{
    apply_overrides, check_paths, load_config, run_experiment, validate_config, Cli, Command,
    InfoArgs, OutputFormat, TrainArgs, ValidateArgs,
};
use fitloop::Error;
use std::process::ExitCode;
use tracing::info;
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let default_level = if cli.quiet {
        "error"
    } else if cli.verbose {
        "debug"
    } else {
        "info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let result = match cli.command {
        Command::Train(args) => run_train(args),
        Command::Validate(args) => run_validate(args),
        Command::Info(args) => run_info(args),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run_train(args: TrainArgs) -> Result<(), Error> {
    info!("fitloop: running {}", args.config.display());
    let mut spec = load_config(&args.config)?;
    apply_overrides(&mut spec, &args);
    validate_config(&spec).map_err(|e| Error::Config(format!("Invalid override: {e}")))?;

    if args.dry_run {
        check_paths(&spec)?;
        info!(
            epochs = spec.epochs,
            train_batch_size = spec.train_batch_size,
            valid_batch_size = spec.valid_batch_size,
            device = %spec.device,
            precision = %spec.precision_mode,
            "Dry run - config validated successfully"
        );
        return Ok(());
    }

    let report = run_experiment(&spec)?;
    let ctx = &report.context;
    println!(
        "Trained {} for {} epoch(s), {} steps, {:.2?}",
        spec.model_name,
        ctx.epochs_completed(),
        ctx.global_step,
        ctx.elapsed
    );
    if let Some(loss) = ctx.valid_loss {
        println!("  valid_loss: {loss:.4}");
    }
    for (name, value) in &ctx.valid_metrics {
        println!("  valid_{name}: {value:.4}");
    }
    match &report.checkpoint {
        Some(path) => println!("  best checkpoint: {}", path.display()),
        None => println!("  no checkpoint written"),
    }
    Ok(())
}

fn run_validate(args: ValidateArgs) -> Result<(), Error> {
    let spec = load_config(&args.config)?;
    if args.detailed {
        check_paths(&spec)?;
    }
    println!("{}: valid", args.config.display());
    Ok(())
}

fn run_info(args: InfoArgs) -> Result<(), Error> {
    let spec = load_config(&args.config)?;
    match args.format {
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&spec)
                .map_err(|e| Error::Serialization(e.to_string()))?;
            println!("{json}");
        }
        OutputFormat::Yaml => {
            let yaml =
                serde_yaml::to_string(&spec).map_err(|e| Error::Serialization(e.to_string()))?;
            print!("{yaml}");
        }
        OutputFormat::Text => {
            println!("Experiment: {}", spec.model_name);
            println!("  input:      {}", spec.input_path.display());
            println!("  checkpoint: {}", spec.checkpoint_path().display());
            println!(
                "  batches:    train {} / valid {}",
                spec.train_batch_size, spec.valid_batch_size
            );
            println!("  image:      {0}x{1}x{1}", spec.channels, spec.image_size);
            println!("  epochs:     {}", spec.epochs);
            println!("  device:     {} ({})", spec.device, spec.precision_mode);
            println!(
                "  early stop: {} ({}), patience {}",
                spec.monitor, spec.mode, spec.patience
            );
            if let Some(clip) = spec.grad_clip {
                println!("  grad clip:  {clip}");
            }
            if let Some(pruning) = &spec.pruning {
                println!(
                    "  pruning:    {} every {} epoch(s)",
                    pruning.amount, pruning.every
                );
            }
        }
    }
    Ok(())
}
