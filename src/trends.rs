use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate};
use tracing::debug;

use crate::dates;
use crate::error::PipelineResult;
use crate::models::{DonationRecord, Granularity, RegionTrends, TrendPoint, TrendSeries};

/// Months of history shown before the reference month in the monthly view.
pub const MONTHLY_LOOKBACK: u32 = 12;

/// Sums `daily` per date for one region. Duplicate rows for a date are added.
pub fn daily_totals(records: &[DonationRecord], region: &str) -> BTreeMap<NaiveDate, u64> {
    let mut totals = BTreeMap::new();

    for record in records.iter().filter(|record| record.region == region) {
        let entry = totals.entry(record.date).or_insert(0u64);
        *entry = add_count(*entry, record.daily);
    }

    totals
}

pub fn daily_view(
    records: &[DonationRecord],
    region: &str,
    as_of: NaiveDate,
) -> PipelineResult<TrendSeries> {
    let start = dates::month_start(as_of)?;
    let totals = daily_totals(records, region);
    if totals.is_empty() {
        return Ok(TrendSeries::empty(Granularity::Daily, region));
    }

    Ok(TrendSeries {
        granularity: Granularity::Daily,
        region: region.to_string(),
        points: zero_filled(&totals, start, as_of),
    })
}

pub fn monthly_view(
    records: &[DonationRecord],
    region: &str,
    as_of: NaiveDate,
) -> PipelineResult<TrendSeries> {
    let start = dates::months_before(dates::month_start(as_of)?, MONTHLY_LOOKBACK)?;
    let totals = daily_totals(records, region);
    if totals.is_empty() {
        return Ok(TrendSeries::empty(Granularity::Monthly, region));
    }

    let mut months: BTreeMap<NaiveDate, u64> = BTreeMap::new();
    for day in zero_filled(&totals, start, as_of) {
        let entry = months.entry(dates::month_start(day.period_start)?).or_insert(0);
        *entry = add_count(*entry, day.total);
    }

    Ok(TrendSeries {
        granularity: Granularity::Monthly,
        region: region.to_string(),
        points: into_points(months),
    })
}

/// Completed years only: the reference year is still in progress.
pub fn yearly_view(
    records: &[DonationRecord],
    region: &str,
    as_of: NaiveDate,
) -> PipelineResult<TrendSeries> {
    let current_year = as_of.year();
    let mut years: BTreeMap<NaiveDate, u64> = BTreeMap::new();

    for (date, total) in daily_totals(records, region) {
        if date.year() >= current_year {
            continue;
        }
        let entry = years.entry(dates::year_start(date.year())?).or_insert(0);
        *entry = add_count(*entry, total);
    }

    Ok(TrendSeries {
        granularity: Granularity::Yearly,
        region: region.to_string(),
        points: into_points(years),
    })
}

pub fn region_trends(
    records: &[DonationRecord],
    region: &str,
    as_of: NaiveDate,
) -> PipelineResult<RegionTrends> {
    let trends = RegionTrends {
        region: region.to_string(),
        as_of,
        daily: daily_view(records, region, as_of)?,
        monthly: monthly_view(records, region, as_of)?,
        yearly: yearly_view(records, region, as_of)?,
    };

    debug!(
        region,
        daily_points = trends.daily.points.len(),
        monthly_points = trends.monthly.points.len(),
        yearly_points = trends.yearly.points.len(),
        "aggregated region trends"
    );

    Ok(trends)
}

/// Trends for each region of interest, in the order given.
pub fn trends_for_regions(
    records: &[DonationRecord],
    regions: &[String],
    as_of: NaiveDate,
) -> PipelineResult<Vec<RegionTrends>> {
    // Reject an unrepresentable window before touching any region.
    dates::months_before(dates::month_start(as_of)?, MONTHLY_LOOKBACK)?;

    regions
        .iter()
        .map(|region| region_trends(records, region, as_of))
        .collect()
}

fn zero_filled(
    totals: &BTreeMap<NaiveDate, u64>,
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<TrendPoint> {
    dates::days_between(start, end)
        .map(|day| TrendPoint {
            period_start: day,
            total: totals.get(&day).copied().unwrap_or(0),
        })
        .collect()
}

fn into_points(buckets: BTreeMap<NaiveDate, u64>) -> Vec<TrendPoint> {
    buckets
        .into_iter()
        .map(|(period_start, total)| TrendPoint {
            period_start,
            total,
        })
        .collect()
}

fn add_count(total: u64, count: u64) -> u64 {
    total
        .checked_add(count)
        .unwrap_or_else(|| panic!("donation count overflow adding {count} to {total}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn donation(y: i32, m: u32, d: u32, region: &str, daily: u64) -> DonationRecord {
        DonationRecord {
            date: date(y, m, d),
            region: region.to_string(),
            daily,
        }
    }

    fn point(y: i32, m: u32, d: u32, total: u64) -> TrendPoint {
        TrendPoint {
            period_start: date(y, m, d),
            total,
        }
    }

    fn sample_records() -> Vec<DonationRecord> {
        vec![
            donation(2021, 6, 1, "Johor", 40),
            donation(2022, 3, 15, "Johor", 25),
            donation(2022, 3, 15, "Johor", 5),
            donation(2023, 2, 28, "Johor", 11),
            donation(2023, 12, 31, "Johor", 9),
            donation(2024, 1, 1, "Johor", 7),
            donation(2024, 1, 2, "Johor", 3),
            donation(2024, 2, 1, "Johor", 4),
            donation(2024, 2, 3, "Johor", 6),
            donation(2024, 2, 3, "Kedah", 100),
            donation(2024, 2, 10, "Johor", 50),
        ]
    }

    #[test]
    fn daily_view_matches_two_day_scenario() {
        let records = vec![
            donation(2023, 1, 1, "X", 5),
            donation(2023, 1, 2, "X", 3),
        ];
        let series = daily_view(&records, "X", date(2023, 1, 2)).unwrap();
        assert_eq!(series.granularity, Granularity::Daily);
        assert_eq!(series.points, vec![point(2023, 1, 1, 5), point(2023, 1, 2, 3)]);
    }

    #[test]
    fn daily_view_zero_fills_and_stops_at_reference_date() {
        let series = daily_view(&sample_records(), "Johor", date(2024, 2, 5)).unwrap();
        assert_eq!(
            series.points,
            vec![
                point(2024, 2, 1, 4),
                point(2024, 2, 2, 0),
                point(2024, 2, 3, 6),
                point(2024, 2, 4, 0),
                point(2024, 2, 5, 0),
            ]
        );
    }

    #[test]
    fn duplicate_rows_are_summed() {
        let totals = daily_totals(&sample_records(), "Johor");
        assert_eq!(totals.get(&date(2022, 3, 15)), Some(&30));
    }

    #[test]
    fn monthly_view_covers_thirteen_months() {
        let series = monthly_view(&sample_records(), "Johor", date(2024, 2, 5)).unwrap();
        assert_eq!(series.points.len(), 13);
        assert_eq!(series.points.first().unwrap().period_start, date(2023, 2, 1));
        assert_eq!(series.points.last().unwrap().period_start, date(2024, 2, 1));
        assert_eq!(series.points[0], point(2023, 2, 1, 11));
        assert_eq!(series.points[10], point(2023, 12, 1, 9));
        assert_eq!(series.points[11], point(2024, 1, 1, 10));
        // The Feb 10 row is after the reference date.
        assert_eq!(series.points[12], point(2024, 2, 1, 10));
        assert!(series.points[1..10].iter().all(|p| p.total == 0));
    }

    #[test]
    fn daily_and_monthly_views_agree_on_the_reference_month() {
        let as_of = date(2024, 2, 29);
        let records = sample_records();
        let daily = daily_view(&records, "Johor", as_of).unwrap();
        let monthly = monthly_view(&records, "Johor", as_of).unwrap();
        assert_eq!(daily.points.len(), 29);
        assert_eq!(daily.total(), monthly.points.last().unwrap().total);
        assert_eq!(daily.total(), 60);
    }

    #[test]
    fn monthly_totals_equal_sums_of_daily_buckets() {
        let records = sample_records();
        let as_of = date(2024, 2, 29);
        let monthly = monthly_view(&records, "Johor", as_of).unwrap();
        for month in &monthly.points {
            let next = month
                .period_start
                .checked_add_months(chrono::Months::new(1))
                .unwrap();
            let in_month: u64 = records
                .iter()
                .filter(|r| r.region == "Johor" && r.date >= month.period_start && r.date < next)
                .map(|r| r.daily)
                .sum();
            assert_eq!(month.total, in_month, "month {}", month.period_start);
        }
    }

    #[test]
    fn yearly_view_excludes_reference_year() {
        let series = yearly_view(&sample_records(), "Johor", date(2024, 2, 5)).unwrap();
        assert_eq!(
            series.points,
            vec![
                point(2021, 1, 1, 40),
                point(2022, 1, 1, 30),
                point(2023, 1, 1, 20),
            ]
        );

        for year in 2020..=2026 {
            let series = yearly_view(&sample_records(), "Johor", date(year, 6, 1)).unwrap();
            assert!(series.points.iter().all(|p| p.period_start.year() < year));
        }
    }

    #[test]
    fn region_match_is_exact() {
        let records = vec![
            donation(2024, 2, 1, "Pulau Pinang", 8),
            donation(2024, 2, 1, "pulau pinang", 1000),
        ];
        let series = daily_view(&records, "Pulau Pinang", date(2024, 2, 1)).unwrap();
        assert_eq!(series.points, vec![point(2024, 2, 1, 8)]);
    }

    #[test]
    fn missing_region_yields_empty_series() {
        let trends = region_trends(&sample_records(), "Sabah", date(2024, 2, 5)).unwrap();
        assert_eq!(trends.region, "Sabah");
        assert!(trends.daily.is_empty());
        assert!(trends.monthly.is_empty());
        assert!(trends.yearly.is_empty());
    }

    #[test]
    fn trends_follow_region_order() {
        let regions = vec!["Kedah".to_string(), "Johor".to_string()];
        let trends = trends_for_regions(&sample_records(), &regions, date(2024, 2, 5)).unwrap();
        let names: Vec<_> = trends.iter().map(|t| t.region.as_str()).collect();
        assert_eq!(names, vec!["Kedah", "Johor"]);
        assert_eq!(trends[0].daily.total(), 100);
    }

    #[test]
    fn unrepresentable_window_is_an_invalid_date() {
        let as_of = NaiveDate::MIN;
        let result = trends_for_regions(&sample_records(), &["Johor".to_string()], as_of);
        assert!(matches!(
            result,
            Err(crate::error::PipelineError::InvalidDate(_))
        ));
    }
}
