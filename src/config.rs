use std::path::PathBuf;

use anyhow::Context;
use chrono::NaiveTime;

use crate::source::{DatasetLocation, SourceFormat};
use crate::store::{DONATIONS_DATASET, VISITS_DATASET};

pub const DEFAULT_DONATIONS_URL: &str =
    "https://raw.githubusercontent.com/MoH-Malaysia/data-darah-public/main/donations_state.csv";
pub const DEFAULT_VISITS_URL: &str = "https://dub.sh/ds-data-granular";
pub const DEFAULT_SCHEDULE: &str = "10:30";
pub const DEFAULT_OUT_DIR: &str = "reports";

pub const DEFAULT_REGIONS: [&str; 14] = [
    "Malaysia",
    "Johor",
    "Kedah",
    "Kelantan",
    "Melaka",
    "Negeri Sembilan",
    "Pahang",
    "Perak",
    "Pulau Pinang",
    "Sabah",
    "Sarawak",
    "Selangor",
    "Terengganu",
    "W.P. Kuala Lumpur",
];

/// Everything one pipeline run needs besides the reference date.
#[derive(Debug, Clone)]
pub struct Settings {
    pub donations: DatasetLocation,
    pub visits: DatasetLocation,
    pub regions: Vec<String>,
    pub out_dir: PathBuf,
}

impl Settings {
    pub fn new(
        donations: &str,
        donations_format: Option<SourceFormat>,
        visits: &str,
        visits_format: Option<SourceFormat>,
        regions: Vec<String>,
        out_dir: PathBuf,
    ) -> anyhow::Result<Self> {
        let regions = if regions.is_empty() {
            DEFAULT_REGIONS.iter().map(|region| region.to_string()).collect()
        } else {
            regions
        };

        // The default visits link is a short URL with no file extension.
        let visits_format = visits_format
            .or_else(|| (visits == DEFAULT_VISITS_URL).then_some(SourceFormat::Parquet));

        Ok(Settings {
            donations: DatasetLocation::new(DONATIONS_DATASET, donations, donations_format)?,
            visits: DatasetLocation::new(VISITS_DATASET, visits, visits_format)?,
            regions,
            out_dir,
        })
    }
}

pub fn parse_schedule_time(raw: &str) -> anyhow::Result<NaiveTime> {
    NaiveTime::parse_from_str(raw.trim(), "%H:%M")
        .with_context(|| format!("schedule time '{raw}' must look like HH:MM"))
}
