//! Row adapters for the command line: read already-normalized rows from JSON
//! or CSV files and write enriched records back out.

use super::domain::{Cell, CellValue, Row, ScoredRecord, SCORING_COLUMNS};
use serde_json::Value;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid CSV data: {0}")]
    Csv(#[from] csv::Error),
    #[error("invalid JSON data: {0}")]
    Json(#[from] serde_json::Error),
    #[error("rows must be a JSON array of objects ({0})")]
    Shape(String),
    #[error("unsupported file format for {0} (expected .json or .csv)")]
    UnsupportedFormat(PathBuf),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowFormat {
    Json,
    Csv,
}

impl RowFormat {
    pub fn from_path(path: &Path) -> Result<Self, IngestError> {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(str::to_ascii_lowercase);
        match extension.as_deref() {
            Some("json") => Ok(Self::Json),
            Some("csv") => Ok(Self::Csv),
            _ => Err(IngestError::UnsupportedFormat(path.to_path_buf())),
        }
    }
}

pub fn read_rows_from_path(path: &Path) -> Result<Vec<Row>, IngestError> {
    let format = RowFormat::from_path(path)?;
    let file = std::fs::File::open(path).map_err(|source| IngestError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let reader = std::io::BufReader::new(file);
    match format {
        RowFormat::Json => read_json_rows(reader),
        RowFormat::Csv => read_csv_rows(reader),
    }
}

pub fn read_json_rows<R: Read>(reader: R) -> Result<Vec<Row>, IngestError> {
    let value: Value = serde_json::from_reader(reader)?;
    let Value::Array(items) = value else {
        return Err(IngestError::Shape("top-level value is not an array".into()));
    };

    items
        .iter()
        .enumerate()
        .map(|(position, item)| match item {
            Value::Object(object) => Ok(Row::from_json_object(object)),
            _ => Err(IngestError::Shape(format!("row {position} is not an object"))),
        })
        .collect()
}

/// Empty cells become nulls and plain numbers become numeric cells. Values
/// with leading zeros such as product codes stay text.
pub fn read_csv_rows<R: Read>(reader: R) -> Result<Vec<Row>, IngestError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = csv_reader.headers()?.clone();
    let mut rows = Vec::new();

    for record in csv_reader.records() {
        let record = record?;
        let mut row = Row::new();
        for (header, raw) in headers.iter().zip(record.iter()) {
            row.set(header, infer_cell(raw));
        }
        rows.push(row);
    }

    Ok(rows)
}

fn infer_cell(raw: &str) -> Cell {
    if raw.is_empty() {
        return Cell::Null;
    }
    let bytes = raw.as_bytes();
    let leading_zero = bytes.len() > 1 && bytes[0] == b'0' && bytes[1] != b'.';
    match raw.parse::<f64>() {
        Ok(number) if !leading_zero && number.is_finite() => {
            Cell::from(CellValue::Number(number))
        }
        _ => Cell::Value(CellValue::text(raw)),
    }
}

pub fn write_json_records<W: Write>(
    writer: W,
    records: &[ScoredRecord],
) -> Result<(), IngestError> {
    serde_json::to_writer_pretty(writer, records)?;
    Ok(())
}

/// Attribute columns in first-seen order, followed by the scoring columns.
pub fn write_csv_records<W: Write>(
    writer: W,
    records: &[ScoredRecord],
) -> Result<(), IngestError> {
    let mut columns: Vec<&str> = Vec::new();
    for column in records.iter().flat_map(|record| record.attributes.columns()) {
        if !SCORING_COLUMNS.iter().any(|name| *name == column) && !columns.contains(&column) {
            columns.push(column);
        }
    }

    let mut csv_writer = csv::Writer::from_writer(writer);
    let mut header = columns.clone();
    header.extend(SCORING_COLUMNS);
    csv_writer.write_record(&header)?;

    for record in records {
        let mut line: Vec<String> = columns
            .iter()
            .map(|column| {
                record
                    .attributes
                    .get(column)
                    .value()
                    .map(CellValue::to_string)
                    .unwrap_or_default()
            })
            .collect();
        line.push(record.score.to_string());
        line.push(record.category.label().to_string());
        line.push(record.status.label().to_string());
        line.push(record.score_source.label().to_string());
        csv_writer.write_record(&line)?;
    }

    csv_writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workflows::inventory::domain::{Category, InventoryStatus, Presence, ScoreSource};

    #[test]
    fn csv_cells_are_typed() {
        let csv = "Produit,UC,Prix Pièce,Type d'emballage,Code\n\
P-1, 150 ,,GV,00420\n";
        let rows = read_csv_rows(csv.as_bytes()).expect("csv parses");

        assert_eq!(rows.len(), 1);
        let row = &rows[0];
        assert!(matches!(row.get("UC"), Presence::Present(CellValue::Number(n)) if *n == 150.0));
        assert_eq!(row.get("Prix Pièce"), Presence::Null);
        assert!(matches!(
            row.get("Code"),
            Presence::Present(CellValue::Text(code)) if code == "00420"
        ));
    }

    #[test]
    fn json_rows_must_be_objects() {
        let rows = read_json_rows(r#"[{"Produit": "P-1", "UC": null}]"#.as_bytes())
            .expect("json parses");
        assert_eq!(rows[0].get("UC"), Presence::Null);

        let error = read_json_rows("[1, 2]".as_bytes()).expect_err("numbers are not rows");
        assert!(matches!(error, IngestError::Shape(_)));
    }

    #[test]
    fn format_follows_extension() {
        assert_eq!(
            RowFormat::from_path(Path::new("rows.CSV")).expect("csv"),
            RowFormat::Csv
        );
        assert!(RowFormat::from_path(Path::new("rows.xlsx")).is_err());
    }

    #[test]
    fn csv_output_appends_scoring_columns() {
        let record = ScoredRecord {
            product_key: "P-1".to_string(),
            attributes: Row::new().with("Produit", "P-1").with("UC", 150.0),
            score: 10.0,
            category: Category::Low,
            status: InventoryStatus::Urgent,
            score_source: ScoreSource::Computed,
        };
        let mut buffer = Vec::new();
        write_csv_records(&mut buffer, &[record]).expect("csv written");

        let text = String::from_utf8(buffer).expect("utf8");
        assert_eq!(
            text,
            "Produit,UC,score,category,status,score_source\nP-1,150,10,Bas,Urgent,computed\n"
        );
    }

    #[test]
    fn csv_round_trip_keeps_input_column_order() {
        let rows = read_csv_rows("Produit,UC,Alpha,status\nP-1,5,x,Urgent\n".as_bytes())
            .expect("csv parses");
        let record = ScoredRecord {
            product_key: "P-1".to_string(),
            attributes: rows[0].clone(),
            score: 17.0,
            category: Category::High,
            status: InventoryStatus::Safe,
            score_source: ScoreSource::Computed,
        };
        let mut buffer = Vec::new();
        write_csv_records(&mut buffer, &[record]).expect("csv written");

        let text = String::from_utf8(buffer).expect("utf8");
        assert_eq!(
            text,
            "Produit,UC,Alpha,score,category,status,score_source\nP-1,5,x,17,Haut,Safe,computed\n"
        );
    }

    #[test]
    fn json_output_flattens_attributes() {
        let record = ScoredRecord {
            product_key: "P-1".to_string(),
            attributes: Row::new().with("Produit", "P-1"),
            score: 18.0,
            category: Category::High,
            status: InventoryStatus::Safe,
            score_source: ScoreSource::Reference,
        };
        let mut buffer = Vec::new();
        write_json_records(&mut buffer, &[record]).expect("json written");

        let value: Value = serde_json::from_slice(&buffer).expect("valid json");
        assert_eq!(
            value,
            serde_json::json!([{
                "Produit": "P-1",
                "score": 18.0,
                "category": "Haut",
                "status": "Safe",
                "score_source": "reference"
            }])
        );
    }
}
