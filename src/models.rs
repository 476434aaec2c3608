use std::fmt;

use chrono::NaiveDate;
use serde::Serialize;

use crate::error::{PipelineError, PipelineResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DonationRecord {
    pub date: NaiveDate,
    pub region: String,
    pub daily: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VisitRecord {
    pub visit_date: NaiveDate,
    pub donor_id: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Daily,
    Monthly,
    Yearly,
}

impl Granularity {
    pub fn label(self) -> &'static str {
        match self {
            Granularity::Daily => "Daily",
            Granularity::Monthly => "Monthly",
            Granularity::Yearly => "Yearly",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrendPoint {
    pub period_start: NaiveDate,
    pub total: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrendSeries {
    pub granularity: Granularity,
    pub region: String,
    pub points: Vec<TrendPoint>,
}

impl TrendSeries {
    pub fn empty(granularity: Granularity, region: &str) -> Self {
        TrendSeries {
            granularity,
            region: region.to_string(),
            points: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn total(&self) -> u64 {
        self.points.iter().map(|point| point.total).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegionTrends {
    pub region: String,
    pub as_of: NaiveDate,
    pub daily: TrendSeries,
    pub monthly: TrendSeries,
    pub yearly: TrendSeries,
}

/// One evaluated year of the retention series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum RetentionPoint {
    Defined {
        year: i32,
        retained: usize,
        cohort: usize,
        rate: f64,
    },
    /// The prior year's cohort was empty.
    Undefined { year: i32 },
}

impl RetentionPoint {
    pub fn year(&self) -> i32 {
        match self {
            RetentionPoint::Defined { year, .. } | RetentionPoint::Undefined { year } => *year,
        }
    }

    pub fn rate(&self) -> PipelineResult<f64> {
        match self {
            RetentionPoint::Defined { rate, .. } => Ok(*rate),
            RetentionPoint::Undefined { year } => {
                Err(PipelineError::UndefinedRetention { year: *year })
            }
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetentionSeries {
    pub points: Vec<RetentionPoint>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RowRejection {
    pub dataset: String,
    pub row: usize,
    pub reason: String,
}

impl fmt::Display for RowRejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} row {}: {}", self.dataset, self.row, self.reason)
    }
}

/// Records accepted from one dataset, plus the rows that were turned away.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub records: Vec<T>,
    pub rejections: Vec<RowRejection>,
}
