//! Per-epoch loss curves rendered as a text chart

use super::{CallbackAction, CallbackHooks};
use crate::model::Model;
use crate::train::RunContext;
use crate::Result;
use std::fmt::Write as _;
use std::fs;
use std::path::PathBuf;
use tracing::info;

const TRAIN_MARK: char = '*';
const VALID_MARK: char = 'o';

/// Keeps the train/valid loss of every epoch and plots them
///
/// The chart is logged after each epoch. With [`PlotLoss::with_csv`] the
/// curves are also written as `epoch,train_loss,valid_loss` when training
/// ends.
#[derive(Debug, Clone)]
pub struct PlotLoss {
    train: Vec<Option<f64>>,
    valid: Vec<Option<f64>>,
    height: usize,
    csv_path: Option<PathBuf>,
}

impl Default for PlotLoss {
    fn default() -> Self {
        Self::new()
    }
}

impl PlotLoss {
    pub fn new() -> Self {
        Self {
            train: Vec::new(),
            valid: Vec::new(),
            height: 10,
            csv_path: None,
        }
    }

    pub fn with_height(mut self, rows: usize) -> Self {
        self.height = rows.max(2);
        self
    }

    pub fn with_csv(mut self, path: impl Into<PathBuf>) -> Self {
        self.csv_path = Some(path.into());
        self
    }

    pub fn train_losses(&self) -> &[Option<f64>] {
        &self.train
    }

    pub fn valid_losses(&self) -> &[Option<f64>] {
        &self.valid
    }

    /// Render both curves, one column per epoch
    pub fn render(&self) -> String {
        let values: Vec<f64> = self
            .train
            .iter()
            .chain(&self.valid)
            .flatten()
            .copied()
            .filter(|v| v.is_finite())
            .collect();
        if values.is_empty() {
            return String::from("(no losses recorded)\n");
        }
        let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
        let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        let span = if hi > lo { hi - lo } else { 1.0 };
        let rows = self.height;
        let row_of = |v: f64| (((hi - v) / span) * (rows - 1) as f64).round() as usize;

        let epochs = self.train.len();
        let mut grid = vec![vec![' '; epochs * 2]; rows];
        for (e, (t, v)) in self.train.iter().zip(&self.valid).enumerate() {
            if let Some(v) = v.filter(|x| x.is_finite()) {
                grid[row_of(v)][e * 2] = VALID_MARK;
            }
            if let Some(t) = t.filter(|x| x.is_finite()) {
                grid[row_of(t)][e * 2] = TRAIN_MARK;
            }
        }

        let mut out = String::new();
        for (r, line) in grid.iter().enumerate() {
            let label = hi - span * r as f64 / (rows - 1) as f64;
            let line: String = line.iter().collect();
            let _ = writeln!(out, "{label:>10.4} |{}", line.trim_end());
        }
        let _ = writeln!(out, "{:>10} +{}", "", "-".repeat(epochs * 2));
        let _ = writeln!(out, "{:>12}{TRAIN_MARK} train  {VALID_MARK} valid", "");
        out
    }

    fn to_csv(&self) -> String {
        let fmt = |v: &Option<f64>| v.map(|x| x.to_string()).unwrap_or_default();
        let mut out = String::from("epoch,train_loss,valid_loss\n");
        for (e, (t, v)) in self.train.iter().zip(&self.valid).enumerate() {
            let _ = writeln!(out, "{e},{},{}", fmt(t), fmt(v));
        }
        out
    }
}

impl CallbackHooks for PlotLoss {
    fn name(&self) -> &str {
        "PlotLoss"
    }

    fn on_train_begin(&mut self, _ctx: &RunContext) -> Result<()> {
        self.train.clear();
        self.valid.clear();
        Ok(())
    }

    fn on_epoch_end(&mut self, ctx: &RunContext, _model: &mut dyn Model) -> Result<CallbackAction> {
        self.train.push(ctx.train_loss);
        self.valid.push(ctx.valid_loss);
        info!("Loss after epoch {}:\n{}", ctx.epoch, self.render());
        Ok(CallbackAction::Continue)
    }

    fn on_train_end(&mut self, _ctx: &RunContext) -> Result<()> {
        if let Some(path) = &self.csv_path {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, self.to_csv())?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GlobalAvgPool, ImageClassifier};
    use tempfile::TempDir;

    fn run(plot: &mut PlotLoss, losses: &[(f64, Option<f64>)]) {
        let mut model = ImageClassifier::new(Box::new(GlobalAvgPool::new(2, 1, 1)), 2, 0);
        plot.on_train_begin(&RunContext::default()).unwrap();
        for (epoch, &(t, v)) in losses.iter().enumerate() {
            let mut ctx = RunContext::new(losses.len());
            ctx.epoch = epoch;
            ctx.train_loss = Some(t);
            ctx.valid_loss = v;
            plot.on_epoch_end(&ctx, &mut model).unwrap();
        }
    }

    #[test]
    fn test_render_marks_extremes() {
        let mut plot = PlotLoss::new().with_height(5);
        run(&mut plot, &[(2.0, Some(1.5)), (1.0, Some(1.2))]);
        let chart = plot.render();
        let lines: Vec<&str> = chart.lines().collect();

        // top row holds the maximum, bottom row the minimum
        assert!(lines[0].starts_with("    2.0000"));
        assert!(lines[0].contains('*'));
        assert!(lines[4].starts_with("    1.0000"));
        assert!(lines[4].contains('*'));
        assert!(chart.contains('o'));
    }

    #[test]
    fn test_render_empty() {
        assert_eq!(PlotLoss::new().render(), "(no losses recorded)\n");
    }

    #[test]
    fn test_csv_written_at_train_end() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("plots").join("loss.csv");
        let mut plot = PlotLoss::new().with_csv(&path);
        run(&mut plot, &[(1.0, Some(0.5)), (0.75, None)]);
        plot.on_train_end(&RunContext::default()).unwrap();

        let csv = std::fs::read_to_string(&path).unwrap();
        assert_eq!(csv, "epoch,train_loss,valid_loss\n0,1,0.5\n1,0.75,\n");
    }
}
