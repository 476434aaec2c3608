use std::fmt::Write;
use std::path::{Path, PathBuf};

use chrono::NaiveDate;

use crate::models::{
    Granularity, RegionTrends, RetentionPoint, RetentionSeries, RowRejection, TrendSeries,
};

const BAR_WIDTH: usize = 30;

/// A rendered report ready to be written or delivered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub file_name: String,
    pub title: String,
    pub body: String,
}

impl Artifact {
    pub fn write_to(&self, dir: &Path) -> std::io::Result<PathBuf> {
        let path = dir.join(&self.file_name);
        std::fs::write(&path, &self.body)?;
        Ok(path)
    }
}

/// File-name-safe form of a region, e.g. `W.P. Kuala Lumpur` -> `wp_kuala_lumpur`.
pub fn region_slug(region: &str) -> String {
    let mut slug = String::new();
    for ch in region.chars() {
        if ch.is_alphanumeric() {
            slug.extend(ch.to_lowercase());
        } else if ch.is_whitespace() && !slug.ends_with('_') {
            slug.push('_');
        }
    }
    slug.trim_matches('_').to_string()
}

pub fn trend_title(region: &str) -> String {
    format!("{region} Blood Donation Trends")
}

pub fn retention_title() -> &'static str {
    "Yearly Donor Retention Rate"
}

fn bar(value: f64, max: f64) -> String {
    if max <= 0.0 || value <= 0.0 {
        return String::new();
    }
    let width = ((value / max) * BAR_WIDTH as f64).round() as usize;
    "#".repeat(width.clamp(1, BAR_WIDTH))
}

pub(crate) fn period_label(granularity: Granularity, period_start: NaiveDate) -> String {
    match granularity {
        Granularity::Daily => period_start.format("%Y-%m-%d").to_string(),
        Granularity::Monthly => period_start.format("%Y-%m").to_string(),
        Granularity::Yearly => period_start.format("%Y").to_string(),
    }
}

fn write_series(output: &mut String, series: &TrendSeries, heading: &str) {
    let _ = writeln!(output, "## {} {}", series.granularity.label(), heading);

    if series.is_empty() {
        let _ = writeln!(output, "No donations recorded for {}.", series.region);
        let _ = writeln!(output);
        return;
    }

    let max = series.points.iter().map(|p| p.total).max().unwrap_or(0) as f64;
    let _ = writeln!(output, "| Period | Donations | |");
    let _ = writeln!(output, "|---|---:|---|");
    for point in &series.points {
        let _ = writeln!(
            output,
            "| {} | {} | {} |",
            period_label(series.granularity, point.period_start),
            point.total,
            bar(point.total as f64, max)
        );
    }
    let _ = writeln!(output, "Total: {}", series.total());
    let _ = writeln!(output);
}

pub fn build_trend_report(trends: &RegionTrends) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {}", trend_title(&trends.region));
    let _ = writeln!(output, "As of {}", trends.as_of);
    let _ = writeln!(output);
    write_series(&mut output, &trends.daily, "(current month)");
    write_series(&mut output, &trends.monthly, "(past 12 months)");
    write_series(&mut output, &trends.yearly, "(completed years)");

    output
}

pub fn build_retention_report(series: &RetentionSeries) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# {}", retention_title());
    let _ = writeln!(output);

    if series.points.is_empty() {
        let _ = writeln!(output, "Not enough years of visits to measure retention.");
        return output;
    }

    let _ = writeln!(output, "| Year | Retained | Cohort | Rate | |");
    let _ = writeln!(output, "|---|---:|---:|---:|---|");
    for point in &series.points {
        match point {
            RetentionPoint::Defined {
                year,
                retained,
                cohort,
                rate,
            } => {
                let _ = writeln!(
                    output,
                    "| {} | {} | {} | {:.1}% | {} |",
                    year,
                    retained,
                    cohort,
                    rate * 100.0,
                    bar(*rate, 1.0)
                );
            }
            RetentionPoint::Undefined { .. } => {
                let _ = writeln!(output, "| {} | - | 0 | no data | |", point.year());
            }
        }
    }

    output
}

pub fn build_data_quality_report(rejections: &[RowRejection]) -> String {
    let mut output = String::new();

    let _ = writeln!(output, "# Data Quality");
    let _ = writeln!(output);

    if rejections.is_empty() {
        let _ = writeln!(output, "All rows accepted.");
        return output;
    }

    let _ = writeln!(output, "{} rows rejected.", rejections.len());
    let _ = writeln!(output);
    for rejection in rejections {
        let _ = writeln!(output, "- {}", rejection);
    }

    output
}

pub fn trend_artifact(trends: &RegionTrends) -> Artifact {
    Artifact {
        file_name: format!("trends_{}.md", region_slug(&trends.region)),
        title: trend_title(&trends.region),
        body: build_trend_report(trends),
    }
}

pub fn retention_artifact(series: &RetentionSeries) -> Artifact {
    Artifact {
        file_name: "retention.md".to_string(),
        title: retention_title().to_string(),
        body: build_retention_report(series),
    }
}

pub fn data_quality_artifact(rejections: &[RowRejection]) -> Artifact {
    Artifact {
        file_name: "data_quality.md".to_string(),
        title: "Data Quality".to_string(),
        body: build_data_quality_report(rejections),
    }
}
