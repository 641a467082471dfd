use super::ReferenceError;
use crate::workflows::inventory::domain::Row;
use serde_json::Value;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Persisted reference dataset: a pretty-printed JSON array of records.
///
/// Appends read the whole collection, push the record, and replace the file
/// through a temporary sibling and an atomic rename, so a failed write leaves
/// the previous dataset in place. Concurrent writers are not coordinated.
#[derive(Debug, Clone)]
pub struct ReferenceStore {
    path: PathBuf,
}

impl ReferenceStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Current records, or an empty collection when the file does not exist.
    pub fn load(&self) -> Result<Vec<Value>, ReferenceError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(source) => {
                return Err(ReferenceError::Io {
                    path: self.path.clone(),
                    source,
                })
            }
        };

        let value: Value = serde_json::from_str(&contents)?;
        match value {
            Value::Array(records) => Ok(records),
            _ => Err(ReferenceError::Shape("top-level value is not an array".into())),
        }
    }

    /// Appends one record. Nulls are stored as empty strings and dates as text.
    pub fn append(&self, record: &Row) -> Result<(), ReferenceError> {
        let mut records = self.load()?;
        records.push(Value::Object(record.to_json_object(true)));
        self.replace(&records)
    }

    /// Appends each `(row index, row)` independently; one failure does not
    /// prevent the remaining rows from being written.
    pub fn append_many<'a, I>(&self, rows: I, product_field: &str) -> AppendReport
    where
        I: IntoIterator<Item = (usize, &'a Row)>,
    {
        let mut report = AppendReport::default();
        for (row, record) in rows {
            match self.append(record) {
                Ok(()) => report.added += 1,
                Err(err) => {
                    let product_key = record.product_key(product_field);
                    warn!(row, product = %product_key, error = %err, "failed to add reference");
                    report.failures.push(AppendFailure {
                        row,
                        product_key,
                        error: err.to_string(),
                    });
                }
            }
        }

        info!(
            path = %self.path.display(),
            added = report.added,
            failed = report.failures.len(),
            "reference dataset updated"
        );
        report
    }

    fn replace(&self, records: &[Value]) -> Result<(), ReferenceError> {
        let io_error = |source: std::io::Error| ReferenceError::Io {
            path: self.path.clone(),
            source,
        };
        let directory = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };

        let temp = NamedTempFile::new_in(directory).map_err(io_error)?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            serde_json::to_writer_pretty(&mut writer, records)?;
            writer.write_all(b"\n").map_err(io_error)?;
            writer.flush().map_err(io_error)?;
        }
        temp.as_file().sync_all().map_err(io_error)?;
        temp.persist(&self.path).map_err(|err| io_error(err.error))?;
        Ok(())
    }
}

/// Outcome of a bulk append.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AppendReport {
    pub added: usize,
    pub failures: Vec<AppendFailure>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AppendFailure {
    pub row: usize,
    pub product_key: String,
    pub error: String,
}
