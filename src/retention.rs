use std::collections::{BTreeMap, HashSet};

use chrono::Datelike;
use tracing::debug;

use crate::models::{RetentionPoint, RetentionSeries, VisitRecord};

/// Distinct donors with at least one visit in each calendar year.
pub fn cohorts_by_year(visits: &[VisitRecord]) -> BTreeMap<i32, HashSet<&str>> {
    let mut cohorts: BTreeMap<i32, HashSet<&str>> = BTreeMap::new();

    for visit in visits {
        cohorts
            .entry(visit.visit_date.year())
            .or_default()
            .insert(visit.donor_id.as_str());
    }

    cohorts
}

/// Year-over-year retention for every year after the first one with visits.
///
/// A year whose predecessor had no active donors is reported as
/// [`RetentionPoint::Undefined`] instead of a rate.
pub fn retention_series(visits: &[VisitRecord]) -> RetentionSeries {
    let cohorts = cohorts_by_year(visits);
    let (first_year, last_year) = match (cohorts.keys().next(), cohorts.keys().next_back()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return RetentionSeries::default(),
    };

    let empty = HashSet::new();
    let points = ((first_year + 1)..=last_year)
        .map(|year| {
            let previous = cohorts.get(&(year - 1)).unwrap_or(&empty);
            let current = cohorts.get(&year).unwrap_or(&empty);
            retention_point(year, previous, current)
        })
        .collect::<Vec<_>>();

    debug!(
        first_year,
        last_year,
        points = points.len(),
        "computed donor retention"
    );

    RetentionSeries { points }
}

fn retention_point(year: i32, previous: &HashSet<&str>, current: &HashSet<&str>) -> RetentionPoint {
    if previous.is_empty() {
        return RetentionPoint::Undefined { year };
    }

    let retained = previous.intersection(current).count();
    RetentionPoint::Defined {
        year,
        retained,
        cohort: previous.len(),
        rate: retained as f64 / previous.len() as f64,
    }
}
