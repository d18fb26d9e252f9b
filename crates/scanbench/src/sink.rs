use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, TimeZone};

use crate::error::BenchmarkError;
use crate::record::{TrialRecord, COLUMNS};

/// Destination of trial records.
pub trait RecordSink {
    /// Persist one record.
    fn write(&mut self, record: &TrialRecord) -> Result<(), BenchmarkError>;
}

impl RecordSink for Vec<TrialRecord> {
    fn write(&mut self, record: &TrialRecord) -> Result<(), BenchmarkError> {
        self.push(record.clone());
        Ok(())
    }
}

/// Comma separated result log with one header row and one row per record.
///
/// Every row is flushed as soon as it is written, so an interrupted run leaves every completed
/// trial on disk.
#[derive(Debug)]
pub struct CsvResultSink {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl CsvResultSink {
    /// File name of a log started at `started_at`.
    pub fn file_name<Tz: TimeZone>(started_at: &DateTime<Tz>) -> String
    where
        Tz::Offset: std::fmt::Display,
    {
        format!(
            "scan_matching_benchmark_{}.csv",
            started_at.format("%m-%d-%Y_%H-%M-%S")
        )
    }

    /// Create a log in `dir` named after `started_at`.
    pub fn create<Tz: TimeZone>(dir: impl AsRef<Path>, started_at: &DateTime<Tz>) -> Result<Self, BenchmarkError>
    where
        Tz::Offset: std::fmt::Display,
    {
        Self::open(dir.as_ref().join(Self::file_name(started_at)))
    }

    /// Create, or truncate, the log at `path` and write the header row.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, BenchmarkError> {
        let path = path.into();
        let file = File::create(&path).map_err(|source| BenchmarkError::Io {
            path: path.clone(),
            source,
        })?;

        let mut sink = Self {
            path,
            writer: BufWriter::new(file),
        };
        sink.write_line(&COLUMNS.join(","))?;
        log::info!("writing results to {}", sink.path.display());
        Ok(sink)
    }

    /// Location of the log.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Flush and close the log, returning its location.
    pub fn close(mut self) -> Result<PathBuf, BenchmarkError> {
        self.writer.flush().map_err(|source| BenchmarkError::Io {
            path: self.path.clone(),
            source,
        })?;
        Ok(self.path)
    }

    fn write_line(&mut self, line: &str) -> Result<(), BenchmarkError> {
        writeln!(self.writer, "{line}")
            .and_then(|_| self.writer.flush())
            .map_err(|source| BenchmarkError::Io {
                path: self.path.clone(),
                source,
            })
    }
}

impl RecordSink for CsvResultSink {
    fn write(&mut self, record: &TrialRecord) -> Result<(), BenchmarkError> {
        self.write_line(&record.to_csv_row())
    }
}
