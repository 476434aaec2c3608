//! PNG line charts for trends and retention, drawn with plotters.
//!
//! Text (captions, axis labels) needs a TrueType font. One is looked up once
//! per process; without it the charts are still drawn, just unlabeled.

use std::error::Error;
use std::path::Path;
use std::sync::OnceLock;

use plotters::prelude::*;
use plotters::style::FontStyle;
use tracing::{debug, warn};

use crate::error::{PipelineError, PipelineResult};
use crate::models::{RegionTrends, RetentionSeries, TrendSeries};
use crate::report::{self, period_label};

type DrawResult<T> = Result<T, Box<dyn Error>>;

const FONT_ENV: &str = "DONATION_PULSE_FONT";
const FONT_CANDIDATES: [&str; 4] = [
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
];

const PANEL_SIZE: (u32, u32) = (640, 480);
const RETENTION_SIZE: (u32, u32) = (960, 540);

/// A chart written to disk, captioned for delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chart {
    pub file_name: String,
    pub title: String,
}

/// Registers a system font for chart text. Returns whether labels can be drawn.
pub fn labels_available() -> bool {
    static AVAILABLE: OnceLock<bool> = OnceLock::new();
    *AVAILABLE.get_or_init(|| {
        let configured = std::env::var(FONT_ENV).ok();
        let candidates = configured.iter().map(String::as_str).chain(FONT_CANDIDATES);
        for path in candidates {
            let Ok(bytes) = std::fs::read(path) else {
                continue;
            };
            let bytes: &'static [u8] = Box::leak(bytes.into_boxed_slice());
            if plotters::style::register_font("sans-serif", FontStyle::Normal, bytes).is_ok() {
                debug!(font = path, "registered chart font");
                return true;
            }
        }
        warn!("no usable font found (set {FONT_ENV}); charts will have no labels");
        false
    })
}

pub fn trend_chart_name(region: &str) -> String {
    format!("trends_{}.png", report::region_slug(region))
}

pub const RETENTION_CHART: &str = "retention.png";

/// One image with the daily, monthly and yearly views side by side.
pub fn render_trend_chart(dir: &Path, trends: &RegionTrends, labels: bool) -> PipelineResult<Chart> {
    let chart = Chart {
        file_name: trend_chart_name(&trends.region),
        title: report::trend_title(&trends.region),
    };
    draw_trends(&dir.join(&chart.file_name), trends, labels)
        .map_err(|err| PipelineError::Chart(format!("{}: {err}", chart.file_name)))?;
    Ok(chart)
}

pub fn render_retention_chart(
    dir: &Path,
    series: &RetentionSeries,
    labels: bool,
) -> PipelineResult<Chart> {
    let chart = Chart {
        file_name: RETENTION_CHART.to_string(),
        title: report::retention_title().to_string(),
    };
    draw_retention(&dir.join(&chart.file_name), series, labels)
        .map_err(|err| PipelineError::Chart(format!("{}: {err}", chart.file_name)))?;
    Ok(chart)
}

fn draw_trends(path: &Path, trends: &RegionTrends, labels: bool) -> DrawResult<()> {
    let root = BitMapBackend::new(path, (PANEL_SIZE.0 * 3, PANEL_SIZE.1)).into_drawing_area();
    root.fill(&WHITE)?;
    let root = if labels {
        root.titled(&report::trend_title(&trends.region), ("sans-serif", 32))?
    } else {
        root
    };

    let panels = root.split_evenly((1, 3));
    let views = [
        (&trends.daily, "Daily (current month)", &RED),
        (&trends.monthly, "Monthly (past 12 months)", &BLUE),
        (&trends.yearly, "Yearly (completed years)", &GREEN),
    ];
    for (panel, (series, caption, color)) in panels.iter().zip(views) {
        draw_trend_panel(panel, series, caption, color, labels)?;
    }

    root.present()?;
    Ok(())
}

fn draw_trend_panel(
    area: &DrawingArea<BitMapBackend, plotters::coord::Shift>,
    series: &TrendSeries,
    caption: &str,
    color: &RGBColor,
    labels: bool,
) -> DrawResult<()> {
    let max = series.points.iter().map(|p| p.total).max().unwrap_or(0) as f64;
    let x_max = series.points.len().max(2) - 1;

    let mut builder = ChartBuilder::on(area);
    builder.margin(10);
    if labels {
        builder
            .caption(caption, ("sans-serif", 22))
            .x_label_area_size(40)
            .y_label_area_size(60);
    }
    let mut chart = builder.build_cartesian_2d(0..x_max, 0f64..(max * 1.1).max(1.0))?;

    if labels {
        let points = &series.points;
        let granularity = series.granularity;
        chart
            .configure_mesh()
            .x_labels(points.len().clamp(2, 7))
            .x_label_formatter(&|index| {
                points
                    .get(*index)
                    .map(|p| period_label(granularity, p.period_start))
                    .unwrap_or_default()
            })
            .y_desc("Donations")
            .draw()?;
    }

    chart.draw_series(LineSeries::new(
        series
            .points
            .iter()
            .enumerate()
            .map(|(index, point)| (index, point.total as f64)),
        color,
    ))?;
    Ok(())
}

fn draw_retention(path: &Path, series: &RetentionSeries, labels: bool) -> DrawResult<()> {
    let root = BitMapBackend::new(path, RETENTION_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let first = series.points.first().map(|p| p.year()).unwrap_or(0);
    let last = series.points.last().map(|p| p.year()).unwrap_or(first);

    let mut builder = ChartBuilder::on(&root);
    builder.margin(10);
    if labels {
        builder
            .caption(report::retention_title(), ("sans-serif", 30))
            .x_label_area_size(40)
            .y_label_area_size(60);
    }
    let mut chart = builder.build_cartesian_2d(first..last.max(first + 1), 0f64..100f64)?;

    if labels {
        chart
            .configure_mesh()
            .x_desc("Year")
            .y_desc("Retention (%)")
            .draw()?;
    }

    // Undefined years break the line instead of being drawn as 0%.
    let mut segment: Vec<(i32, f64)> = Vec::new();
    for point in &series.points {
        match point.rate() {
            Ok(rate) => segment.push((point.year(), rate * 100.0)),
            Err(_) => {
                draw_segment(&mut chart, std::mem::take(&mut segment))?;
            }
        }
    }
    draw_segment(&mut chart, segment)?;

    root.present()?;
    Ok(())
}

fn draw_segment(
    chart: &mut ChartContext<
        BitMapBackend,
        Cartesian2d<plotters::coord::types::RangedCoordi32, plotters::coord::types::RangedCoordf64>,
    >,
    segment: Vec<(i32, f64)>,
) -> DrawResult<()> {
    if segment.is_empty() {
        return Ok(());
    }
    chart.draw_series(
        segment
            .iter()
            .map(|&(year, rate)| Circle::new((year, rate), 4, BLUE.filled())),
    )?;
    chart.draw_series(LineSeries::new(segment, &BLUE))?;
    Ok(())
}
