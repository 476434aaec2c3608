use std::path::Path;

use bytes::Bytes;
use chrono::{DateTime, NaiveDate};
use parquet::basic::{LogicalType, TimeUnit};
use parquet::file::reader::{FileReader, SerializedFileReader};
use parquet::record::Field;
use parquet::schema::types::ColumnDescriptor;
use tracing::{debug, info};

use crate::error::{PipelineError, PipelineResult};
use crate::store::RawTable;

/// Days from 0001-01-01 to the Unix epoch, for Parquet DATE columns.
const UNIX_EPOCH_DAYS_FROM_CE: i32 = 719_163;

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum SourceFormat {
    Csv,
    Parquet,
}

impl SourceFormat {
    pub fn infer(location: &str) -> Option<Self> {
        let path = location.split(['?', '#']).next().unwrap_or(location);
        let extension = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match extension.as_str() {
            "csv" => Some(SourceFormat::Csv),
            "parquet" => Some(SourceFormat::Parquet),
            _ => None,
        }
    }
}

/// Where one logical dataset comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetLocation {
    pub dataset: String,
    pub location: String,
    pub format: SourceFormat,
}

impl DatasetLocation {
    pub fn new(
        dataset: &str,
        location: &str,
        format: Option<SourceFormat>,
    ) -> PipelineResult<Self> {
        let format = format.or_else(|| SourceFormat::infer(location)).ok_or_else(|| {
            PipelineError::unavailable(
                dataset,
                format!("cannot infer format of '{location}'; pass it explicitly"),
            )
        })?;

        Ok(DatasetLocation {
            dataset: dataset.to_string(),
            location: location.to_string(),
            format,
        })
    }

    fn is_remote(&self) -> bool {
        self.location.starts_with("http://") || self.location.starts_with("https://")
    }
}

/// Fetches and decodes one dataset. Any failure here means the dataset is
/// unavailable for this run.
pub async fn fetch_table(
    client: &reqwest::Client,
    source: &DatasetLocation,
) -> PipelineResult<RawTable> {
    let payload = fetch_bytes(client, source)
        .await
        .map_err(|err| PipelineError::unavailable(&source.dataset, err))?;

    info!(
        dataset = %source.dataset,
        location = %source.location,
        bytes = payload.len(),
        "fetched dataset"
    );

    decode_table(&source.dataset, source.format, payload)
        .map_err(|err| PipelineError::unavailable(&source.dataset, err))
}

async fn fetch_bytes(
    client: &reqwest::Client,
    source: &DatasetLocation,
) -> PipelineResult<Bytes> {
    if source.is_remote() {
        let response = client
            .get(&source.location)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?)
    } else {
        Ok(Bytes::from(tokio::fs::read(&source.location).await?))
    }
}

pub fn decode_table(
    dataset: &str,
    format: SourceFormat,
    payload: Bytes,
) -> PipelineResult<RawTable> {
    let table = match format {
        SourceFormat::Csv => decode_csv(dataset, &payload)?,
        SourceFormat::Parquet => decode_parquet(dataset, payload)?,
    };

    debug!(
        dataset,
        columns = table.columns.len(),
        rows = table.rows.len(),
        "decoded table"
    );

    Ok(table)
}

fn decode_csv(dataset: &str, payload: &[u8]) -> PipelineResult<RawTable> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(payload);

    let columns = reader.headers()?.iter().map(str::to_string).collect();
    let mut table = RawTable::new(dataset, columns);

    for (index, result) in reader.byte_records().enumerate() {
        let record = result?;
        let cells: Result<Vec<String>, _> = record
            .iter()
            .map(|field| std::str::from_utf8(field).map(str::to_string))
            .collect();

        match cells {
            Ok(cells) => table.rows.push(cells),
            Err(err) => table.reject(index + 1, format!("invalid UTF-8: {err}")),
        }
    }

    Ok(table)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimestampUnit {
    Millis,
    Micros,
    Nanos,
}

fn timestamp_unit(column: &ColumnDescriptor) -> Option<TimestampUnit> {
    match column.logical_type()? {
        LogicalType::Timestamp { unit, .. } => Some(match unit {
            TimeUnit::MILLIS(_) => TimestampUnit::Millis,
            TimeUnit::MICROS(_) => TimestampUnit::Micros,
            TimeUnit::NANOS(_) => TimestampUnit::Nanos,
        }),
        _ => None,
    }
}

fn decode_parquet(dataset: &str, payload: Bytes) -> PipelineResult<RawTable> {
    let reader = SerializedFileReader::new(payload)?;
    let schema = reader.metadata().file_metadata().schema_descr_ptr();
    let columns: Vec<String> = schema
        .root_schema()
        .get_fields()
        .iter()
        .map(|field| field.name().to_string())
        .collect();
    let units: Vec<Option<TimestampUnit>> = columns
        .iter()
        .map(|name| {
            schema
                .columns()
                .iter()
                .find(|column| column.name() == name)
                .and_then(|column| timestamp_unit(column))
        })
        .collect();

    let mut table = RawTable::new(dataset, columns);
    for row in reader.get_row_iter(None)? {
        let row = row?;
        let mut cells = vec![String::new(); table.columns.len()];
        for (name, field) in row.get_column_iter() {
            if let Some(index) = table.columns.iter().position(|column| column == name) {
                cells[index] = field_to_string(field, units[index]);
            }
        }
        table.rows.push(cells);
    }

    Ok(table)
}

fn timestamp_to_string(value: i64, unit: TimestampUnit) -> String {
    let stamp = match unit {
        TimestampUnit::Millis => DateTime::from_timestamp_millis(value),
        TimestampUnit::Micros => DateTime::from_timestamp_micros(value),
        TimestampUnit::Nanos => Some(DateTime::from_timestamp_nanos(value)),
    };
    stamp
        .map(|stamp| stamp.naive_utc().to_string())
        .unwrap_or_default()
}

/// Renders one Parquet cell as text. INT64 timestamps without a matching
/// converted type (NANOS in particular) arrive as `Long` and are resolved
/// through the column's logical type.
fn field_to_string(field: &Field, unit: Option<TimestampUnit>) -> String {
    match (field, unit) {
        (Field::Null, _) => String::new(),
        (Field::Str(value), _) => value.clone(),
        (Field::Date(days), _) => days
            .checked_add(UNIX_EPOCH_DAYS_FROM_CE)
            .and_then(NaiveDate::from_num_days_from_ce_opt)
            .map(|date| date.to_string())
            .unwrap_or_default(),
        (Field::TimestampMillis(millis), _) => timestamp_to_string(*millis, TimestampUnit::Millis),
        (Field::TimestampMicros(micros), _) => timestamp_to_string(*micros, TimestampUnit::Micros),
        (Field::Long(value), Some(unit)) => timestamp_to_string(*value, unit),
        (other, _) => other.to_string(),
    }
}
