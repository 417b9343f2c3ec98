//! Positional parsing of the weekly sentinel-site CSV.
//!
//! The feed has no machine-readable column names. Its layout is a fixed
//! five-line header followed by one row per region, with each disease taking
//! a pair of columns (count, per-sentinel rate). Columns are located by
//! offset below. The publisher has so far only ever appended columns (the
//! COVID-19 pair arrived in May 2023); if earlier columns are ever reordered
//! these offsets will silently read the wrong disease. There is nothing in
//! the file to detect that with.

use crate::error::MapError;
use crate::types::{Disease, DiseaseSeries, SurveillanceReport, SurveillanceRow};
use anyhow::Result;
use csv::{ReaderBuilder, StringRecord, Trim};
use std::collections::HashSet;
use tracing::{debug, warn};

const HEADER_LINES: usize = 5;
const PERIOD_LINE: usize = 1;
const DISEASE_LINE: usize = 2;

const PERIOD_FIELD: usize = 0;
const REGION_FIELD: usize = 0;

const INFLUENZA_NAME_FIELD: usize = 1;
const INFLUENZA_VALUE_FIELD: usize = 2;

const COVID_NAME_FIELD: usize = 37;
const COVID_VALUE_FIELD: usize = 38;

/// Placeholder the feed uses when a region reported nothing.
const MISSING: &str = "-";

/// Display names and period taken from the header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedHeader {
    pub period: String,
    pub influenza_name: String,
    /// `None` for feeds older than the COVID-19 columns.
    pub covid_name: Option<String>,
}

pub fn parse_report<S: AsRef<str>>(lines: &[S]) -> Result<SurveillanceReport> {
    if lines.len() < HEADER_LINES {
        return Err(MapError::TruncatedHeader {
            expected: HEADER_LINES,
            found: lines.len(),
        }
        .into());
    }
    let header = parse_header(&lines[..HEADER_LINES])?;
    let body = &lines[HEADER_LINES..];

    let influenza = extract_series(
        body,
        Disease::Influenza,
        &header.influenza_name,
        &header.period,
        INFLUENZA_VALUE_FIELD,
    )?;

    let covid = match &header.covid_name {
        Some(name) => Some(extract_series(
            body,
            Disease::Covid19,
            name,
            &header.period,
            COVID_VALUE_FIELD,
        )?),
        None => {
            debug!("header has no COVID-19 column");
            None
        }
    };

    Ok(SurveillanceReport {
        period: header.period,
        influenza,
        covid,
    })
}

pub fn parse_header<S: AsRef<str>>(lines: &[S]) -> Result<FeedHeader> {
    if lines.len() < HEADER_LINES {
        return Err(MapError::TruncatedHeader {
            expected: HEADER_LINES,
            found: lines.len(),
        }
        .into());
    }

    let period_row = split_line(lines[PERIOD_LINE].as_ref())?;
    let period = field(&period_row, PERIOD_FIELD).unwrap_or_default().to_string();

    let diseases = split_line(lines[DISEASE_LINE].as_ref())?;
    let influenza_name = field(&diseases, INFLUENZA_NAME_FIELD)
        .unwrap_or_default()
        .to_string();
    let covid_name = field(&diseases, COVID_NAME_FIELD).map(str::to_string);

    Ok(FeedHeader {
        period,
        influenza_name,
        covid_name,
    })
}

/// Collects `(region, value)` pairs from the data rows for one disease column.
///
/// Rows are skipped, not zero-filled, when the value is absent, empty, the
/// `-` placeholder, or not a finite number. A region seen twice keeps its first row.
pub fn extract_series<S: AsRef<str>>(
    body: &[S],
    disease: Disease,
    name: &str,
    period: &str,
    value_field: usize,
) -> Result<DiseaseSeries> {
    let mut rows = Vec::new();
    let mut seen = HashSet::new();

    for record in read_records(body)? {
        let region = match field(&record, REGION_FIELD) {
            Some(r) if !r.is_empty() => r,
            _ => continue,
        };
        let raw = match field(&record, value_field) {
            Some(v) if !v.is_empty() && v != MISSING => v,
            _ => continue,
        };
        let value: f64 = match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => v,
            _ => {
                warn!("{}: ignoring unusable {} value {:?}", region, disease, raw);
                continue;
            }
        };
        if !seen.insert(region.to_string()) {
            warn!("{}: duplicate {} row ignored", region, disease);
            continue;
        }
        rows.push(SurveillanceRow {
            region: region.to_string(),
            value,
        });
    }

    debug!("{} rows for {}", rows.len(), disease);
    Ok(DiseaseSeries {
        disease,
        name: name.to_string(),
        period: period.to_string(),
        rows,
    })
}

fn field(record: &StringRecord, index: usize) -> Option<&str> {
    record.get(index)
}

fn reader_builder() -> ReaderBuilder {
    let mut builder = ReaderBuilder::new();
    builder.has_headers(false).flexible(true).trim(Trim::All);
    builder
}

fn split_line(line: &str) -> Result<StringRecord> {
    let mut rdr = reader_builder().from_reader(line.as_bytes());
    match rdr.records().next() {
        Some(record) => Ok(record?),
        None => Ok(StringRecord::new()),
    }
}

fn read_records<S: AsRef<str>>(body: &[S]) -> Result<Vec<StringRecord>> {
    let mut text = String::new();
    for line in body {
        text.push_str(line.as_ref());
        text.push('\n');
    }
    let mut rdr = reader_builder().from_reader(text.as_bytes());
    let mut records = Vec::new();
    for result in rdr.records() {
        records.push(result?);
    }
    Ok(records)
}
