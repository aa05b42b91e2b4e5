// ============================================================
// Layer 6 — Reporter
// ============================================================
// One trend plot per metric over iterations 0..K:
//
//   • mean per iteration with ± std error bars
//   • horizontal line at the iteration-0 (baseline) mean
//   • least-squares polynomial trend of degree min(3, points - 1)
//
// Output (under <run_dir>/plots/):
//   <metric>_trend.csv   always
//   <metric>.png         with the `plotters` feature (on by default)
//
// Trend fit: least squares on the Vandermonde matrix, solved by SVD.

use anyhow::{Context, Result};
use nalgebra::{DMatrix, DVector};
use std::{
    fs,
    io::Write,
    path::{Path, PathBuf},
};

use crate::domain::history::{History, Metric};

/// Highest polynomial degree used for trend lines
pub const TREND_DEGREE: usize = 3;

/// Least-squares polynomial fit. Returns coefficients lowest power first.
///
/// The degree is lowered to `xs.len() - 1` when there are too few
/// points; an empty input yields no coefficients.
pub fn polyfit(xs: &[f64], ys: &[f64], degree: usize) -> Vec<f64> {
    let n = xs.len().min(ys.len());
    if n == 0 {
        return Vec::new();
    }
    let terms = degree.min(n - 1) + 1;
    if !xs[..n].iter().chain(&ys[..n]).all(|v| v.is_finite()) {
        tracing::warn!("Trend fit skipped: series has non-finite values");
        return vec![f64::NAN; terms];
    }

    let vandermonde = DMatrix::from_fn(n, terms, |row, col| xs[row].powi(col as i32));
    let y = DVector::from_column_slice(&ys[..n]);

    match vandermonde.svd(true, true).solve(&y, 1e-12) {
        Ok(coeffs) => coeffs.iter().copied().collect(),
        Err(e) => {
            tracing::warn!("Trend fit failed: {e}");
            vec![0.0; terms]
        }
    }
}

/// Evaluate a polynomial (lowest power first) at `x`.
pub fn polyval(coeffs: &[f64], x: f64) -> f64 {
    coeffs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Everything drawn for one metric.
#[derive(Debug, Clone, PartialEq)]
pub struct TrendSeries {
    pub metric: Metric,
    pub iterations: Vec<f64>,
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
    pub baseline: f64,
    pub fitted: Vec<f64>,
}

impl TrendSeries {
    pub fn from_history(history: &History, metric: Metric) -> Self {
        let iterations: Vec<f64> = history.iterations().iter().map(|&i| i as f64).collect();
        let series = history.series(metric);
        let means: Vec<f64> = series.iter().map(|s| s.mean).collect();
        let stds: Vec<f64> = series.iter().map(|s| s.std).collect();
        let coeffs = polyfit(&iterations, &means, TREND_DEGREE);
        let fitted = iterations.iter().map(|&x| polyval(&coeffs, x)).collect();
        Self {
            metric,
            baseline: history.baseline(metric).map(|s| s.mean).unwrap_or(f64::NAN),
            iterations,
            means,
            stds,
            fitted,
        }
    }
}

pub struct Reporter {
    plots_dir: PathBuf,
}

impl Reporter {
    pub fn new(run_dir: impl AsRef<Path>) -> Self {
        Self {
            plots_dir: run_dir.as_ref().join("plots"),
        }
    }

    /// Write every metric's trend; returns the files produced.
    pub fn render(&self, history: &History) -> Result<Vec<PathBuf>> {
        fs::create_dir_all(&self.plots_dir)
            .with_context(|| format!("Cannot create '{}'", self.plots_dir.display()))?;
        if history.is_empty() {
            tracing::warn!("History is empty, nothing to plot");
            return Ok(Vec::new());
        }

        let mut written = Vec::new();
        for metric in Metric::ALL {
            let series = TrendSeries::from_history(history, metric);
            written.push(self.write_trend_csv(&series)?);
            if let Some(png) = self.draw_png(&series)? {
                written.push(png);
            }
        }
        tracing::info!("Rendered {} plot files into '{}'", written.len(), self.plots_dir.display());
        Ok(written)
    }

    fn write_trend_csv(&self, s: &TrendSeries) -> Result<PathBuf> {
        let path = self.plots_dir.join(format!("{}_trend.csv", s.metric.key()));
        let mut f = fs::File::create(&path)
            .with_context(|| format!("Cannot create '{}'", path.display()))?;
        writeln!(f, "iteration,mean,std,baseline,fitted")?;
        for i in 0..s.iterations.len() {
            writeln!(
                f,
                "{},{:.6},{:.6},{:.6},{:.6}",
                s.iterations[i], s.means[i], s.stds[i], s.baseline, s.fitted[i]
            )?;
        }
        Ok(path)
    }

    #[cfg(feature = "plotters")]
    fn draw_png(&self, s: &TrendSeries) -> Result<Option<PathBuf>> {
        let path = self.plots_dir.join(format!("{}.png", s.metric.key()));
        match draw_trend(s, &path) {
            Ok(()) => Ok(Some(path)),
            Err(e) => {
                tracing::warn!("Cannot draw '{}': {e}", path.display());
                Ok(None)
            }
        }
    }

    /// Stub when plotters feature is disabled.
    #[cfg(not(feature = "plotters"))]
    fn draw_png(&self, s: &TrendSeries) -> Result<Option<PathBuf>> {
        tracing::warn!(
            "PNG for '{}' skipped: built without the plotters feature",
            s.metric.key()
        );
        Ok(None)
    }
}

#[cfg(feature = "plotters")]
fn draw_trend(s: &TrendSeries, path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    use plotters::prelude::*;

    let root = BitMapBackend::new(path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let x_max = s.iterations.last().copied().unwrap_or(0.0).max(1.0);
    let (lo, hi) = s
        .means
        .iter()
        .zip(&s.stds)
        .flat_map(|(m, d)| [m - d, m + d])
        .chain(s.fitted.iter().copied())
        .chain(std::iter::once(s.baseline))
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    let pad = ((hi - lo) * 0.1).max(1e-3);

    let mut chart = ChartBuilder::on(&root)
        .caption(format!("{} across APE iterations", s.metric.label()), ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(35)
        .y_label_area_size(55)
        .build_cartesian_2d(-0.5..(x_max + 0.5), (lo - pad)..(hi + pad))?;

    chart
        .configure_mesh()
        .x_desc("Iteration")
        .y_desc(s.metric.label())
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            vec![(-0.5, s.baseline), (x_max + 0.5, s.baseline)],
            &RGBColor(128, 128, 128).mix(0.6),
        ))?
        .label("Baseline")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RGBColor(128, 128, 128)));

    chart.draw_series(s.iterations.iter().zip(s.means.iter().zip(&s.stds)).map(|(&x, (&m, &d))| {
        ErrorBar::new_vertical(x, m - d, m, m + d, BLUE.filled(), 8)
    }))?;

    chart
        .draw_series(LineSeries::new(
            s.iterations.iter().copied().zip(s.means.iter().copied()),
            &BLUE,
        ))?
        .label("Mean ± std")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLUE));

    chart
        .draw_series(LineSeries::new(
            s.iterations.iter().copied().zip(s.fitted.iter().copied()),
            &RED.mix(0.8),
        ))?
        .label("Polynomial trend")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    Ok(())
}
