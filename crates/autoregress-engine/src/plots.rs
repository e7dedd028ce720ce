//! PNG diagnostics rendered into each run's `plots/` directory.
//!
//! Rendering is best effort: callers log a warning on failure and continue,
//! because a run without plots is still a valid run.

use std::path::Path;

use anyhow::{Context, Result, anyhow};
use plotters::prelude::*;

use crate::metrics::ModelScore;

const BAR_SIZE: (u32, u32) = (920, 470);
const SQUARE_SIZE: (u32, u32) = (540, 540);
const WIDE_SIZE: (u32, u32) = (660, 420);
const HIST_BINS: usize = 30;

const ACCENT: RGBColor = RGBColor(0xfb, 0x71, 0x85);
const POINT: RGBColor = RGBColor(0x3b, 0x82, 0xf6);

/// Render the training diagnostics: candidate comparison plus parity,
/// residual and residual-distribution plots for the winning model.
pub fn render_training_plots(
    plots_dir: &Path,
    scores: &[(String, ModelScore)],
    best_name: &str,
    y_true: &[f64],
    y_pred: &[f64],
) -> Result<()> {
    let r2s: Vec<(String, f64)> = scores.iter().map(|(n, s)| (n.clone(), s.r2)).collect();
    model_comparison_plot(&plots_dir.join("model_comparison_r2.png"), &r2s)?;
    parity_plot(
        &plots_dir.join("best_parity.png"),
        y_true,
        y_pred,
        &format!("Parity Plot (Best: {best_name})"),
    )?;
    residuals_plot(
        &plots_dir.join("best_residuals.png"),
        y_true,
        y_pred,
        &format!("Residuals vs Predicted (Best: {best_name})"),
    )?;
    let residuals: Vec<f64> = y_true.iter().zip(y_pred).map(|(t, p)| t - p).collect();
    histogram_plot(
        &plots_dir.join("best_residual_distribution.png"),
        &residuals,
        &format!("Residual Distribution (Best: {best_name})"),
        "Residual",
    )?;
    Ok(())
}

/// Render the evaluation diagnostics. Without a target only the prediction
/// distribution is drawn.
pub fn render_evaluation_plots(
    plots_dir: &Path,
    y_true: Option<&[f64]>,
    y_pred: &[f64],
) -> Result<()> {
    if let Some(y_true) = y_true {
        parity_plot(
            &plots_dir.join("parity.png"),
            y_true,
            y_pred,
            "Parity Plot (True vs Predicted)",
        )?;
        residuals_plot(
            &plots_dir.join("residuals.png"),
            y_true,
            y_pred,
            "Residuals vs Predicted",
        )?;
        let residuals: Vec<f64> = y_true.iter().zip(y_pred).map(|(t, p)| t - p).collect();
        histogram_plot(
            &plots_dir.join("residual_distribution.png"),
            &residuals,
            "Residual Distribution",
            "Residual",
        )?;
    }
    histogram_plot(
        &plots_dir.join("pred_distribution.png"),
        y_pred,
        "Prediction Distribution",
        "Predicted",
    )
}

fn model_comparison_plot(path: &Path, r2s: &[(String, f64)]) -> Result<()> {
    if r2s.is_empty() {
        return Err(anyhow!("no scores to plot"));
    }
    let root = BitMapBackend::new(path, BAR_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("{e}"))?;

    let min_r2 = r2s.iter().map(|(_, v)| *v).fold(f64::INFINITY, f64::min);
    let y_min = (-1.0_f64).min(min_r2 - 0.05);

    let mut chart = ChartBuilder::on(&root)
        .caption("Model Comparison (R²)", ("sans-serif", 22))
        .margin(12)
        .x_label_area_size(48)
        .y_label_area_size(56)
        .build_cartesian_2d(0f64..r2s.len() as f64, y_min..1.0f64)
        .map_err(|e| anyhow!("{e}"))?;

    let names: Vec<String> = r2s.iter().map(|(n, _)| n.clone()).collect();
    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_labels(r2s.len())
        .x_label_formatter(&|x| {
            names
                .get(x.floor() as usize)
                .cloned()
                .unwrap_or_default()
        })
        .y_desc("R²")
        .draw()
        .map_err(|e| anyhow!("{e}"))?;

    chart
        .draw_series(r2s.iter().enumerate().map(|(i, (_, v))| {
            let base = v.min(0.0).max(y_min);
            let top = v.max(0.0);
            Rectangle::new(
                [(i as f64 + 0.15, base), (i as f64 + 0.85, top)],
                POINT.filled(),
            )
        }))
        .map_err(|e| anyhow!("{e}"))?;

    root.present().context("writing comparison plot")
}

fn parity_plot(path: &Path, y_true: &[f64], y_pred: &[f64], title: &str) -> Result<()> {
    let (mn, mx) = bounds(y_true.iter().chain(y_pred))?;
    let root = BitMapBackend::new(path, SQUARE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("{e}"))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(12)
        .x_label_area_size(44)
        .y_label_area_size(56)
        .build_cartesian_2d(mn..mx, mn..mx)
        .map_err(|e| anyhow!("{e}"))?;
    chart
        .configure_mesh()
        .x_desc("True")
        .y_desc("Predicted")
        .draw()
        .map_err(|e| anyhow!("{e}"))?;

    chart
        .draw_series(
            y_true
                .iter()
                .zip(y_pred)
                .map(|(t, p)| Circle::new((*t, *p), 3, POINT.mix(0.7).filled())),
        )
        .map_err(|e| anyhow!("{e}"))?;
    chart
        .draw_series(LineSeries::new([(mn, mn), (mx, mx)], ACCENT.stroke_width(2)))
        .map_err(|e| anyhow!("{e}"))?;

    root.present().context("writing parity plot")
}

fn residuals_plot(path: &Path, y_true: &[f64], y_pred: &[f64], title: &str) -> Result<()> {
    let residuals: Vec<f64> = y_true.iter().zip(y_pred).map(|(t, p)| t - p).collect();
    let (x_min, x_max) = bounds(y_pred.iter())?;
    let (r_min, r_max) = bounds(residuals.iter())?;
    let pad = ((r_max - r_min) * 0.05).max(1e-9);

    let root = BitMapBackend::new(path, WIDE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("{e}"))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(12)
        .x_label_area_size(44)
        .y_label_area_size(56)
        .build_cartesian_2d(x_min..x_max, (r_min - pad)..(r_max + pad))
        .map_err(|e| anyhow!("{e}"))?;
    chart
        .configure_mesh()
        .x_desc("Predicted")
        .y_desc("Residual")
        .draw()
        .map_err(|e| anyhow!("{e}"))?;

    chart
        .draw_series(
            y_pred
                .iter()
                .zip(&residuals)
                .map(|(p, r)| Circle::new((*p, *r), 3, POINT.mix(0.7).filled())),
        )
        .map_err(|e| anyhow!("{e}"))?;
    chart
        .draw_series(LineSeries::new(
            [(x_min, 0.0), (x_max, 0.0)],
            ACCENT.stroke_width(2),
        ))
        .map_err(|e| anyhow!("{e}"))?;

    root.present().context("writing residuals plot")
}

fn histogram_plot(path: &Path, values: &[f64], title: &str, x_label: &str) -> Result<()> {
    let (mn, mx) = bounds(values.iter())?;
    let span = (mx - mn).max(1e-9);
    let width = span / HIST_BINS as f64;
    let mut counts = vec![0usize; HIST_BINS];
    for v in values {
        let bin = (((v - mn) / width) as usize).min(HIST_BINS - 1);
        counts[bin] += 1;
    }
    let max_count = counts.iter().copied().max().unwrap_or(1).max(1);

    let root = BitMapBackend::new(path, WIDE_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("{e}"))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 20))
        .margin(12)
        .x_label_area_size(44)
        .y_label_area_size(56)
        .build_cartesian_2d(mn..(mn + span), 0usize..(max_count + 1))
        .map_err(|e| anyhow!("{e}"))?;
    chart
        .configure_mesh()
        .x_desc(x_label)
        .y_desc("Count")
        .draw()
        .map_err(|e| anyhow!("{e}"))?;

    chart
        .draw_series(counts.iter().enumerate().map(|(i, c)| {
            let x0 = mn + i as f64 * width;
            Rectangle::new([(x0, 0), (x0 + width, *c)], POINT.mix(0.8).filled())
        }))
        .map_err(|e| anyhow!("{e}"))?;

    root.present().context("writing histogram plot")
}

fn bounds<'a>(values: impl Iterator<Item = &'a f64>) -> Result<(f64, f64)> {
    let mut mn = f64::INFINITY;
    let mut mx = f64::NEG_INFINITY;
    for v in values {
        mn = mn.min(*v);
        mx = mx.max(*v);
    }
    if !mn.is_finite() || !mx.is_finite() {
        return Err(anyhow!("no finite values to plot"));
    }
    if mn == mx {
        // Degenerate range; widen so the axis builder accepts it.
        mn -= 0.5;
        mx += 0.5;
    }
    Ok((mn, mx))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn score(r2: f64) -> ModelScore {
        ModelScore {
            r2,
            mae: 1.0,
            rmse: 1.0,
            seconds: 0.1,
        }
    }

    #[test]
    fn test_training_plots_render() {
        let dir = tempfile::tempdir().unwrap();
        let scores = vec![
            ("Linear Regression".to_string(), score(0.9)),
            ("Ridge Regression".to_string(), score(0.85)),
        ];
        let y_true: Vec<f64> = (0..40).map(|i| i as f64).collect();
        let y_pred: Vec<f64> = y_true.iter().map(|v| v + 0.5).collect();
        render_training_plots(dir.path(), &scores, "Linear Regression", &y_true, &y_pred).unwrap();

        for name in [
            "model_comparison_r2.png",
            "best_parity.png",
            "best_residuals.png",
            "best_residual_distribution.png",
        ] {
            assert!(dir.path().join(name).is_file(), "{name} missing");
        }
    }

    #[test]
    fn test_evaluation_plots_without_target() {
        let dir = tempfile::tempdir().unwrap();
        let y_pred: Vec<f64> = (0..30).map(|i| (i % 7) as f64).collect();
        render_evaluation_plots(dir.path(), None, &y_pred).unwrap();
        assert!(dir.path().join("pred_distribution.png").is_file());
        assert!(!dir.path().join("parity.png").exists());
    }

    #[test]
    fn test_constant_values_still_render() {
        let dir = tempfile::tempdir().unwrap();
        let y_pred = vec![5.0; 10];
        render_evaluation_plots(dir.path(), None, &y_pred).unwrap();
    }
}
