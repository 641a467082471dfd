use super::ReferenceError;
use crate::workflows::inventory::domain::{CellValue, Row};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;
use tracing::{info, warn};

/// Column holding the stored total score of a reference record.
pub const SCORE_FIELD: &str = "Score total";
/// Column holding the stored category label of a reference record.
pub const CATEGORY_FIELD: &str = "Catégorie";

/// A previously scored product as persisted in the reference dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct ReferenceRecord {
    pub attributes: Row,
}

impl ReferenceRecord {
    /// Stored score, when present and numeric.
    pub fn stored_score(&self) -> Option<f64> {
        self.attributes
            .get(SCORE_FIELD)
            .value()
            .and_then(|value| value.as_number().ok())
            .filter(|score| score.is_finite())
    }

    /// Raw stored category label, when present and non-blank.
    pub fn stored_category_label(&self) -> Option<String> {
        self.attributes
            .get(CATEGORY_FIELD)
            .value()
            .map(CellValue::to_string)
            .filter(|label| !label.trim().is_empty())
    }
}

/// Product key → reference record, built once and read-only afterwards.
#[derive(Debug, Clone, Default)]
pub struct ReferenceIndex {
    product_field: String,
    records: HashMap<String, ReferenceRecord>,
    duplicate_keys: Vec<String>,
    skipped: usize,
}

impl ReferenceIndex {
    pub fn from_path<P: AsRef<Path>>(
        path: P,
        product_field: &str,
    ) -> Result<Self, ReferenceError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| ReferenceError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let index = Self::from_reader(std::io::BufReader::new(file), product_field)?;
        info!(
            path = %path.display(),
            products = index.len(),
            duplicates = index.duplicate_keys.len(),
            skipped = index.skipped,
            "reference index built"
        );
        Ok(index)
    }

    pub fn from_reader<R: Read>(reader: R, product_field: &str) -> Result<Self, ReferenceError> {
        let value: Value = serde_json::from_reader(reader)?;
        let Value::Array(items) = value else {
            return Err(ReferenceError::Shape("top-level value is not an array".into()));
        };

        let mut rows = Vec::with_capacity(items.len());
        for (position, item) in items.iter().enumerate() {
            match item {
                Value::Object(object) => rows.push(Row::from_json_object(object)),
                _ => {
                    return Err(ReferenceError::Shape(format!(
                        "element {position} is not an object"
                    )))
                }
            }
        }

        Ok(Self::from_records(rows, product_field))
    }

    /// Later records win when a product key appears more than once.
    pub fn from_records(rows: Vec<Row>, product_field: &str) -> Self {
        let mut index = Self {
            product_field: product_field.to_string(),
            ..Self::default()
        };

        for attributes in rows {
            let key = attributes.product_key(product_field);
            if key.is_empty() {
                index.skipped += 1;
                continue;
            }
            if index
                .records
                .insert(key.clone(), ReferenceRecord { attributes })
                .is_some()
            {
                index.duplicate_keys.push(key);
            }
        }

        if index.skipped > 0 {
            warn!(
                skipped = index.skipped,
                field = %product_field,
                "reference records without a product key were ignored"
            );
        }
        if !index.duplicate_keys.is_empty() {
            warn!(
                duplicates = index.duplicate_keys.len(),
                first = %index.duplicate_keys[0],
                "duplicate product keys in reference dataset, keeping the last record"
            );
        }

        index
    }

    pub fn product_field(&self) -> &str {
        &self.product_field
    }

    pub fn get(&self, product_key: &str) -> Option<&ReferenceRecord> {
        self.records.get(product_key.trim())
    }

    pub fn contains(&self, product_key: &str) -> bool {
        self.records.contains_key(product_key.trim())
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Positions of rows whose non-blank product key is not indexed. Only the
    /// first row of each such product is reported.
    pub fn missing_rows(&self, rows: &[Row]) -> Vec<usize> {
        let mut seen = HashSet::new();
        rows.iter()
            .enumerate()
            .filter(|(_, row)| {
                let key = row.product_key(&self.product_field);
                !key.is_empty() && !self.records.contains_key(&key) && seen.insert(key)
            })
            .map(|(position, _)| position)
            .collect()
    }

    /// Keys that were overwritten while building, once per extra occurrence.
    pub fn duplicate_keys(&self) -> &[String] {
        &self.duplicate_keys
    }

    pub fn skipped_records(&self) -> usize {
        self.skipped
    }
}
