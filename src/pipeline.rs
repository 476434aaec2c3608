use std::path::Path;

use chrono::NaiveDate;
use tracing::{debug, info, warn};

use crate::charts::{self, Chart};
use crate::config::Settings;
use crate::delivery::{Attachment, TelegramConfig, TelegramSink};
use crate::error::{PipelineError, PipelineResult};
use crate::models::{RegionTrends, RetentionSeries, RowRejection};
use crate::publish;
use crate::report::{self, Artifact};
use crate::retention;
use crate::source;
use crate::store::{self, RawTable};
use crate::trends;

/// Complete results of one run. Only built once every series is computed.
#[derive(Debug, Clone)]
pub struct RunOutput {
    pub as_of: NaiveDate,
    pub trends: Vec<RegionTrends>,
    pub retention: RetentionSeries,
    pub rejections: Vec<RowRejection>,
}

impl RunOutput {
    /// Trend reports in region order, then retention, then data quality.
    pub fn artifacts(&self) -> Vec<Artifact> {
        let mut artifacts: Vec<Artifact> = self.trends.iter().map(report::trend_artifact).collect();
        artifacts.push(report::retention_artifact(&self.retention));
        artifacts.push(report::data_quality_artifact(&self.rejections));
        artifacts
    }

    /// Writes every chart and Markdown artifact into `dir`. Returns the
    /// charts in delivery order and the number of files written.
    pub fn render(&self, dir: &Path, labels: bool) -> PipelineResult<(Vec<Chart>, usize)> {
        let mut charts = Vec::with_capacity(self.trends.len() + 1);
        for trends in &self.trends {
            charts.push(charts::render_trend_chart(dir, trends, labels)?);
        }
        charts.push(charts::render_retention_chart(dir, &self.retention, labels)?);

        let artifacts = self.artifacts();
        for artifact in &artifacts {
            artifact.write_to(dir)?;
        }

        let written = charts.len() + artifacts.len();
        Ok((charts, written))
    }

    /// Trend charts in region order, then retention, then the data-quality
    /// report when any row was rejected.
    pub fn attachments(&self, dir: &Path, charts: &[Chart]) -> Vec<Attachment> {
        let mut attachments: Vec<Attachment> = charts
            .iter()
            .map(|chart| Attachment::photo(dir.join(&chart.file_name), &chart.title))
            .collect();
        if !self.rejections.is_empty() {
            let report = report::data_quality_artifact(&self.rejections);
            attachments.push(Attachment::document(dir.join(&report.file_name), &report.title));
        }
        attachments
    }
}

/// Validates both tables and derives every series for `as_of`.
pub fn run(
    donations: &RawTable,
    visits: &RawTable,
    regions: &[String],
    as_of: NaiveDate,
) -> PipelineResult<RunOutput> {
    let donations = store::load_donations(donations)?;
    let visits = store::load_visits(visits)?;

    let trends = trends::trends_for_regions(&donations.records, regions, as_of)?;
    let retention = retention::retention_series(&visits.records);

    let mut rejections = donations.rejections;
    rejections.extend(visits.rejections);

    Ok(RunOutput {
        as_of,
        trends,
        retention,
        rejections,
    })
}

/// Fetches both datasets and runs the analytics for `as_of`.
pub async fn compute(
    client: &reqwest::Client,
    settings: &Settings,
    as_of: NaiveDate,
) -> PipelineResult<RunOutput> {
    let donations = source::fetch_table(client, &settings.donations).await?;
    let visits = source::fetch_table(client, &settings.visits).await?;

    let output = run(&donations, &visits, &settings.regions, as_of)?;
    for rejection in &output.rejections {
        debug!("{}", PipelineError::RowRejected(rejection.clone()));
    }
    if !output.rejections.is_empty() {
        warn!(
            rejected = output.rejections.len(),
            "some rows were rejected; see data_quality.md"
        );
    }

    Ok(output)
}

/// Full pipeline: fetch, compute, publish the charts and reports, and send
/// them when `telegram` is given. Returns the number of files published.
pub async fn execute(
    client: &reqwest::Client,
    settings: &Settings,
    telegram: Option<&TelegramConfig>,
    as_of: NaiveDate,
) -> anyhow::Result<usize> {
    let output = compute(client, settings, as_of).await?;
    let labels = charts::labels_available();

    let (charts, written) =
        publish::publish(&settings.out_dir, |dir| Ok(output.render(dir, labels)?))?;
    info!(
        as_of = %output.as_of,
        files = written,
        out_dir = %settings.out_dir.display(),
        "published reports"
    );

    if let Some(telegram) = telegram {
        let sink = TelegramSink::new(client.clone(), telegram.clone());
        let sent = sink
            .send_all(&output.attachments(&settings.out_dir, &charts))
            .await?;
        info!(sent, "delivered reports to Telegram");
    }

    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::AttachmentKind;
    use crate::models::RetentionPoint;

    fn table(dataset: &str, columns: &[&str], rows: &[&[&str]]) -> RawTable {
        let mut table = RawTable::new(dataset, columns.iter().map(|c| c.to_string()).collect());
        table.rows = rows
            .iter()
            .map(|row| row.iter().map(|c| c.to_string()).collect())
            .collect();
        table
    }

    fn sample_donations() -> RawTable {
        table(
            store::DONATIONS_DATASET,
            &["date", "state", "daily"],
            &[
                &["2022-12-30", "Melaka", "8"],
                &["2023-01-01", "Melaka", "5"],
                &["2023-01-02", "Melaka", "3"],
                &["2023-01-02", "Perak", "9"],
                &["not-a-date", "Perak", "1"],
            ],
        )
    }

    fn sample_visits() -> RawTable {
        table(
            store::VISITS_DATASET,
            &["donor_id", "visit_date"],
            &[
                &["A", "2021-02-01"],
                &["B", "2021-05-01"],
                &["A", "2022-03-01"],
                &["C", "2022-04-01"],
                &["", "2022-04-02"],
            ],
        )
    }

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn run_derives_all_series() {
        let regions = vec!["Melaka".to_string(), "Sabah".to_string()];
        let output = run(&sample_donations(), &sample_visits(), &regions, date(2023, 1, 2)).unwrap();

        assert_eq!(output.trends.len(), 2);
        let melaka = &output.trends[0];
        assert_eq!(melaka.daily.total(), 8);
        assert_eq!(melaka.yearly.total(), 8);
        assert!(output.trends[1].daily.is_empty());

        assert_eq!(
            output.retention.points,
            vec![RetentionPoint::Defined {
                year: 2022,
                retained: 1,
                cohort: 2,
                rate: 0.5,
            }]
        );

        let rejected: Vec<_> = output
            .rejections
            .iter()
            .map(|r| (r.dataset.as_str(), r.row))
            .collect();
        assert_eq!(rejected, vec![("donations", 5), ("visits", 5)]);
    }

    #[test]
    fn run_is_idempotent() {
        let regions = vec!["Melaka".to_string()];
        let first = run(&sample_donations(), &sample_visits(), &regions, date(2023, 1, 2)).unwrap();
        let second = run(&sample_donations(), &sample_visits(), &regions, date(2023, 1, 2)).unwrap();
        assert_eq!(first.trends, second.trends);
        assert_eq!(first.retention, second.retention);
        assert_eq!(first.artifacts(), second.artifacts());
    }

    #[test]
    fn unavailable_dataset_aborts_the_run() {
        let broken = table(store::VISITS_DATASET, &["donor"], &[&["A"]]);
        let err = run(&sample_donations(), &broken, &[], date(2023, 1, 2)).unwrap_err();
        assert!(matches!(err, PipelineError::DataUnavailable { .. }));
    }

    #[test]
    fn artifacts_are_ordered_trends_then_retention() {
        let regions = vec!["Perak".to_string(), "Melaka".to_string()];
        let output = run(&sample_donations(), &sample_visits(), &regions, date(2023, 1, 2)).unwrap();
        let names: Vec<_> = output
            .artifacts()
            .into_iter()
            .map(|artifact| artifact.file_name)
            .collect();
        assert_eq!(
            names,
            vec![
                "trends_perak.md",
                "trends_melaka.md",
                "retention.md",
                "data_quality.md"
            ]
        );
    }

    #[test]
    fn render_writes_charts_and_reports() {
        let regions = vec!["Melaka".to_string()];
        let output = run(&sample_donations(), &sample_visits(), &regions, date(2023, 1, 2)).unwrap();
        let dir = tempfile::tempdir().unwrap();

        let (charts, written) = output.render(dir.path(), false).unwrap();
        assert_eq!(written, 5);
        let names: Vec<_> = charts.iter().map(|c| c.file_name.as_str()).collect();
        assert_eq!(names, vec!["trends_melaka.png", "retention.png"]);
        for name in ["trends_melaka.png", "retention.png", "trends_melaka.md", "retention.md", "data_quality.md"] {
            assert!(dir.path().join(name).is_file(), "{name} missing");
        }
    }

    #[test]
    fn attachments_send_charts_then_rejections() {
        let regions = vec!["Perak".to_string(), "Melaka".to_string()];
        let output = run(&sample_donations(), &sample_visits(), &regions, date(2023, 1, 2)).unwrap();
        let dir = tempfile::tempdir().unwrap();
        let (charts, _) = output.render(dir.path(), false).unwrap();

        let attachments = output.attachments(dir.path(), &charts);
        let sent: Vec<_> = attachments
            .iter()
            .map(|a| (a.kind, a.path.file_name().unwrap().to_string_lossy().into_owned()))
            .collect();
        assert_eq!(
            sent,
            vec![
                (AttachmentKind::Photo, "trends_perak.png".to_string()),
                (AttachmentKind::Photo, "trends_melaka.png".to_string()),
                (AttachmentKind::Photo, "retention.png".to_string()),
                (AttachmentKind::Document, "data_quality.md".to_string()),
            ]
        );
        assert_eq!(attachments[0].caption, "Perak Blood Donation Trends");

        let clean = RunOutput {
            rejections: Vec::new(),
            ..output
        };
        let kinds: Vec<_> = clean
            .attachments(dir.path(), &charts)
            .iter()
            .map(|a| a.kind)
            .collect();
        assert_eq!(kinds, vec![AttachmentKind::Photo; 3]);
    }
}
