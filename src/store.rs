//! Record store: turns untyped tables from a data source into validated
//! donation and visit records.
//!
//! Malformed rows are rejected one by one and reported back with the accepted
//! records. Only a table that is unusable as a whole (missing a required
//! column, or with no acceptable rows at all) fails the load.

use std::collections::HashSet;

use tracing::debug;

use crate::dates;
use crate::error::{PipelineError, PipelineResult};
use crate::models::{DonationRecord, Loaded, RowRejection, VisitRecord};

pub const DONATIONS_DATASET: &str = "donations";
pub const VISITS_DATASET: &str = "visits";

/// Untyped rows as delivered by a data source. Every row holds one string
/// cell per column; absent cells are empty strings. Rows the source could not
/// decode at all are kept out of `rows` and listed in `rejections` under
/// their original 1-based row number.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawTable {
    pub dataset: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
    pub rejections: Vec<RowRejection>,
}

impl RawTable {
    pub fn new(dataset: &str, columns: Vec<String>) -> Self {
        RawTable {
            dataset: dataset.to_string(),
            columns,
            rows: Vec::new(),
            rejections: Vec::new(),
        }
    }

    pub fn reject(&mut self, row: usize, reason: String) {
        self.rejections.push(RowRejection {
            dataset: self.dataset.clone(),
            row,
            reason,
        });
    }

    pub fn column_index(&self, name: &str) -> PipelineResult<usize> {
        self.columns
            .iter()
            .position(|column| column.trim() == name)
            .ok_or_else(|| {
                PipelineError::unavailable(&self.dataset, format!("missing column '{name}'"))
            })
    }
}

fn cell(row: &[String], index: usize) -> &str {
    row.get(index).map(|value| value.trim()).unwrap_or("")
}

pub fn load_donations(table: &RawTable) -> PipelineResult<Loaded<DonationRecord>> {
    let date_idx = table.column_index("date")?;
    let state_idx = table.column_index("state")?;
    let daily_idx = table.column_index("daily")?;

    load_rows(table, |row| {
        let date = dates::parse_date(cell(row, date_idx)).map_err(|err| err.to_string())?;
        let region = cell(row, state_idx);
        if region.is_empty() {
            return Err("empty state".to_string());
        }
        let raw_daily = cell(row, daily_idx);
        let daily = raw_daily
            .parse::<u64>()
            .map_err(|_| format!("daily count '{raw_daily}' is not a non-negative integer"))?;

        Ok(DonationRecord {
            date,
            region: region.to_string(),
            daily,
        })
    })
}

pub fn load_visits(table: &RawTable) -> PipelineResult<Loaded<VisitRecord>> {
    let date_idx = table.column_index("visit_date")?;
    let donor_idx = table.column_index("donor_id")?;

    load_rows(table, |row| {
        let visit_date = dates::parse_date(cell(row, date_idx)).map_err(|err| err.to_string())?;
        let donor_id = cell(row, donor_idx);
        if donor_id.is_empty() {
            return Err("empty donor_id".to_string());
        }

        Ok(VisitRecord {
            visit_date,
            donor_id: donor_id.to_string(),
        })
    })
}

fn load_rows<T>(
    table: &RawTable,
    parse: impl Fn(&[String]) -> Result<T, String>,
) -> PipelineResult<Loaded<T>> {
    let mut records = Vec::with_capacity(table.rows.len());
    let mut rejections = table.rejections.clone();
    let skipped: HashSet<usize> = table.rejections.iter().map(|r| r.row).collect();

    let mut number = 0;
    for row in &table.rows {
        number += 1;
        while skipped.contains(&number) {
            number += 1;
        }
        match parse(row) {
            Ok(record) => records.push(record),
            Err(reason) => rejections.push(RowRejection {
                dataset: table.dataset.clone(),
                row: number,
                reason,
            }),
        }
    }
    rejections.sort_by_key(|rejection| rejection.row);

    if records.is_empty() && !rejections.is_empty() {
        return Err(PipelineError::unavailable(
            &table.dataset,
            format!("all {} rows rejected", rejections.len()),
        ));
    }

    debug!(
        dataset = %table.dataset,
        accepted = records.len(),
        rejected = rejections.len(),
        "validated rows"
    );

    Ok(Loaded {
        records,
        rejections,
    })
}
