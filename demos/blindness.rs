//! End-to-end experiment on a synthetic retina-grading dataset
//!
//! Writes small 8-bit images whose brightness depends on the grade, a
//! `trainLabels.csv` manifest, then runs `demos/blindness.yaml` against them.
//!
//! ```bash
//! cargo run --example blindness
//! ```

use fitloop::config::{parse_config, run_experiment};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::fmt::Write as _;
use std::fs;
use std::path::Path;

const IMAGE_SIZE: usize = 16;
const CHANNELS: usize = 3;
const GRADES: usize = 3;
const SAMPLES: usize = 90;

fn write_dataset(root: &Path) -> fitloop::Result<()> {
    let images = root.join("trainImages");
    fs::create_dir_all(&images)?;
    let mut rng = StdRng::seed_from_u64(0);
    let mut manifest = String::from("image,level\n");

    for i in 0..SAMPLES {
        let grade = i % GRADES;
        let base = 60.0 + 60.0 * grade as f32;
        let pixels: Vec<u8> = (0..CHANNELS * IMAGE_SIZE * IMAGE_SIZE)
            .map(|_| (base + rng.random_range(-40.0..40.0f32)).clamp(0.0, 255.0) as u8)
            .collect();
        let name = format!("{i:04}_left");
        fs::write(images.join(format!("{name}.u8")), pixels)?;
        let _ = writeln!(manifest, "{name},{grade}");
    }
    fs::write(root.join("trainLabels.csv"), manifest)?;
    Ok(())
}

fn main() -> fitloop::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let root = std::env::temp_dir().join("fitloop-blindness");
    write_dataset(&root)?;

    let template = include_str!("blindness.yaml");
    let yaml = format!(
        "input_path: {}\nmodel_path: {}\n{template}",
        root.display(),
        root.join("models").display()
    );
    let spec = parse_config(&yaml)?;
    let report = run_experiment(&spec)?;

    println!("classes: {:?}", report.classes);
    println!(
        "parameters: {} total, {} trainable",
        report.parameters.total, report.parameters.trainable
    );
    for summary in &report.context.history {
        println!(
            "epoch {}: train_loss {:.4} valid_loss {:.4} valid_accuracy {:.3}",
            summary.epoch,
            summary.train_loss.unwrap_or(f64::NAN),
            summary.valid_loss.unwrap_or(f64::NAN),
            summary
                .valid_metrics
                .get("accuracy")
                .copied()
                .unwrap_or(f64::NAN)
        );
    }
    if let Some(path) = &report.checkpoint {
        println!("best checkpoint: {}", path.display());
    }
    Ok(())
}
