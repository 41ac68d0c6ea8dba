// RailCheck - Persisted runs
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! Tabular persistence of measurement runs.
//!
//! Runs are stored as CSV with one row per sample:
//!
//! ```text
//! timestamp,pk_position,vitesse,hauteur_catenaire,deport_catenaire,ecartement_voie,defaut_type,defaut_position
//! 2024-01-15 08:00:00.1000,3.889,140,5.52,-0.07,1435.2,,
//! 2024-01-15 08:00:00.2000,7.778,140,5.47,0.13,1431.9,rail_fissure,42.117
//! ```
//!
//! Timestamps are written with four fractional digits (100 µs resolution),
//! which keeps sub-decisecond sampling intervals distinct. Files carrying
//! one fractional digit, or none, are read back unchanged.
//!
//! An empty `defaut_type` means no defect. Reading is streaming: a
//! [`RecordReader`] yields one record at a time and holds nothing but the
//! current row, so files of any size are analyzed in a single pass. The file
//! handle is released when the iterator is dropped, on every exit path.

use crate::error::{RailError, RecordError, Result};
use crate::record::{Defect, DefectType, MeasurementRecord};
use chrono::{NaiveDateTime, Timelike};
use std::borrow::Borrow;
use std::fs::{self, File};
use std::io::{Read, Write};
use std::path::Path;
use tracing::{debug, warn};

/// Column names, in write order.
pub const COLUMNS: [&str; 8] = [
    "timestamp",
    "pk_position",
    "vitesse",
    "hauteur_catenaire",
    "deport_catenaire",
    "ecartement_voie",
    "defaut_type",
    "defaut_position",
];

const DATE_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";
/// Accepts any number of fractional digits, or none.
const PARSE_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

/// `YYYY-MM-DD HH:MM:SS.ffff`
pub fn format_timestamp(timestamp: &NaiveDateTime) -> String {
    let tenth_millis = (timestamp.nanosecond() / 100_000).min(9_999);
    format!("{}.{:04}", timestamp.format(DATE_TIME_FORMAT), tenth_millis)
}

/// Fixed-point formatting without a `-0.00` artifact.
fn fixed(value: f64, decimals: usize) -> String {
    format!("{:.*}", decimals, value + 0.0)
}

/// Writes records to CSV, header first.
pub struct RecordWriter<W: Write> {
    writer: csv::Writer<W>,
    written: usize,
}

impl RecordWriter<File> {
    /// Create (or truncate) a file, creating parent directories.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        debug!("Writing measurement file {}", path.display());
        Self::new(File::create(path)?)
    }
}

impl<W: Write> RecordWriter<W> {
    /// Wrap a sink and write the header row.
    pub fn new(inner: W) -> Result<Self> {
        let mut writer = csv::Writer::from_writer(inner);
        writer.write_record(COLUMNS).map_err(csv_error)?;
        Ok(Self { writer, written: 0 })
    }

    /// Append one record.
    pub fn write(&mut self, record: &MeasurementRecord) -> Result<()> {
        let (defect_type, defect_position) = match &record.defect {
            Some(defect) => (defect.defect_type.as_str(), fixed(defect.position_m, 3)),
            None => ("", String::new()),
        };
        let timestamp = format_timestamp(&record.timestamp);
        let position = fixed(record.position_m, 3);
        let speed = fixed(record.speed_kmh, 0);
        let height = fixed(record.catenary_height_m, 2);
        let deviation = fixed(record.lateral_deviation_m, 2);
        let gauge = fixed(record.gauge_mm, 1);
        let row: [&str; 8] = [
            &timestamp,
            &position,
            &speed,
            &height,
            &deviation,
            &gauge,
            defect_type,
            &defect_position,
        ];
        self.writer.write_record(row).map_err(csv_error)?;
        self.written += 1;
        Ok(())
    }

    /// Rows written so far, header excluded.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush and hand back the sink.
    pub fn finish(self) -> Result<W> {
        self.writer
            .into_inner()
            .map_err(|e| RailError::Io(e.into_error()))
    }
}

/// Write a whole run to `path`. Returns the number of rows written.
pub fn write_run<I>(path: impl AsRef<Path>, records: I) -> Result<usize>
where
    I: IntoIterator,
    I::Item: Borrow<MeasurementRecord>,
{
    let mut writer = RecordWriter::create(path)?;
    for record in records {
        writer.write(record.borrow())?;
    }
    let written = writer.written();
    writer.finish()?;
    Ok(written)
}

/// Position of each required column in the header.
#[derive(Debug, Clone, Copy)]
struct ColumnIndex {
    timestamp: usize,
    position: usize,
    speed: usize,
    height: usize,
    deviation: usize,
    gauge: usize,
    defect_type: usize,
    defect_position: usize,
}

impl ColumnIndex {
    fn resolve(headers: &csv::StringRecord) -> std::result::Result<Self, RecordError> {
        let find = |name: &'static str| {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or(RecordError::MissingColumn(name))
        };
        Ok(Self {
            timestamp: find("timestamp")?,
            position: find("pk_position")?,
            speed: find("vitesse")?,
            height: find("hauteur_catenaire")?,
            deviation: find("deport_catenaire")?,
            gauge: find("ecartement_voie")?,
            defect_type: find("defaut_type")?,
            defect_position: find("defaut_position")?,
        })
    }
}

/// Streaming CSV reader of persisted runs.
pub struct RecordReader<R: Read> {
    reader: csv::Reader<R>,
    columns: ColumnIndex,
    strict: bool,
}

impl RecordReader<File> {
    /// Open a persisted run.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        debug!("Opening measurement file {}", path.display());
        Self::from_reader(File::open(path)?)
    }
}

impl<R: Read> RecordReader<R> {
    /// Read the header and locate the required columns.
    pub fn from_reader(inner: R) -> Result<Self> {
        let mut reader = csv::Reader::from_reader(inner);
        let headers = reader.headers().map_err(csv_error)?;
        let columns = ColumnIndex::resolve(headers)?;
        Ok(Self {
            reader,
            columns,
            strict: false,
        })
    }

    /// Also reject records whose values are outside the ranges a recording
    /// car produces (see [`MeasurementRecord::validate`]).
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Consume the reader as a record stream.
    pub fn records(self) -> Records<R> {
        Records {
            rows: self.reader.into_records(),
            columns: self.columns,
            strict: self.strict,
        }
    }
}

impl<R: Read> IntoIterator for RecordReader<R> {
    type Item = Result<MeasurementRecord>;
    type IntoIter = Records<R>;

    fn into_iter(self) -> Self::IntoIter {
        self.records()
    }
}

/// Iterator over the records of a persisted run.
pub struct Records<R: Read> {
    rows: csv::StringRecordsIntoIter<R>,
    columns: ColumnIndex,
    strict: bool,
}

impl<R: Read> Iterator for Records<R> {
    type Item = Result<MeasurementRecord>;

    fn next(&mut self) -> Option<Self::Item> {
        let row = self.rows.next()?;
        Some(
            row.map_err(csv_error)
                .and_then(|row| parse_row(&row, &self.columns, self.strict)),
        )
    }
}

/// Open a persisted run as a record stream.
pub fn open_run(path: impl AsRef<Path>) -> Result<Records<File>> {
    Ok(RecordReader::open(path)?.records())
}

/// Number of data rows in a persisted run, without parsing them.
pub fn count_records(path: impl AsRef<Path>) -> Result<usize> {
    let mut reader = csv::Reader::from_path(path).map_err(csv_error)?;
    let mut count = 0;
    for row in reader.byte_records() {
        row.map_err(csv_error)?;
        count += 1;
    }
    Ok(count)
}

fn parse_row(
    row: &csv::StringRecord,
    columns: &ColumnIndex,
    strict: bool,
) -> Result<MeasurementRecord> {
    let line = row.position().map(|p| p.line()).unwrap_or(0);
    let field = |index: usize| row.get(index).unwrap_or("");
    let number = |index: usize, column: &'static str| parse_number(line, column, field(index));

    let raw_timestamp = field(columns.timestamp);
    let timestamp = NaiveDateTime::parse_from_str(raw_timestamp.trim(), PARSE_FORMAT).map_err(
        |_| RecordError::InvalidField {
            line,
            column: "timestamp",
            value: raw_timestamp.to_string(),
        },
    )?;

    let defect = match field(columns.defect_type) {
        "" => None,
        token => {
            let defect_type = DefectType::from_token(token);
            if !defect_type.is_known() {
                warn!("Unrecognized defect type {:?} at line {}", token, line);
            }
            let position_m = number(columns.defect_position, "defaut_position")?;
            Some(Defect::new(defect_type, position_m))
        }
    };

    let record = MeasurementRecord {
        timestamp,
        position_m: number(columns.position, "pk_position")?,
        speed_kmh: number(columns.speed, "vitesse")?,
        catenary_height_m: number(columns.height, "hauteur_catenaire")?,
        lateral_deviation_m: number(columns.deviation, "deport_catenaire")?,
        gauge_mm: number(columns.gauge, "ecartement_voie")?,
        defect,
    };

    if strict {
        record.validate()?;
    }
    Ok(record)
}

fn parse_number(line: u64, column: &'static str, raw: &str) -> std::result::Result<f64, RecordError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| RecordError::InvalidField {
            line,
            column,
            value: raw.to_string(),
        })
}

fn csv_error(err: csv::Error) -> RailError {
    let line = err.position().map(|p| p.line()).unwrap_or(0);
    let message = err.to_string();
    match err.into_kind() {
        csv::ErrorKind::Io(e) => RailError::Io(e),
        _ => RecordError::Csv { line, message }.into(),
    }
}
