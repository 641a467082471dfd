use chrono::{NaiveDate, NaiveDateTime};
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::fmt;

/// Scores at or above this value are `High` risk and `Safe` stock.
pub const HIGH_SCORE_THRESHOLD: f64 = 16.0;
/// Lower bound of the `Medium` category.
pub const MEDIUM_SCORE_THRESHOLD: f64 = 13.0;
/// Scores at or below this value need an urgent inventory check.
pub const URGENT_SCORE_CEILING: f64 = 10.0;

/// A single typed cell of an imported product row.
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Number(f64),
    Text(String),
    Bool(bool),
    Date(NaiveDate),
    DateTime(NaiveDateTime),
}

impl CellValue {
    pub fn text(value: impl Into<String>) -> Self {
        Self::Text(value.into())
    }

    /// Numeric view used by threshold conditions. Text is accepted when it
    /// parses as a number once trimmed.
    pub fn as_number(&self) -> Result<f64, ComparisonError> {
        match self {
            CellValue::Number(value) => Ok(*value),
            CellValue::Bool(flag) => Ok(if *flag { 1.0 } else { 0.0 }),
            CellValue::Text(raw) => raw.trim().parse::<f64>().map_err(|_| ComparisonError {
                value: raw.clone(),
            }),
            CellValue::Date(_) | CellValue::DateTime(_) => Err(ComparisonError {
                value: self.to_string(),
            }),
        }
    }

    fn to_json(&self) -> Value {
        match self {
            CellValue::Number(value) => number_to_json(*value),
            CellValue::Bool(flag) => Value::Bool(*flag),
            CellValue::Text(_) | CellValue::Date(_) | CellValue::DateTime(_) => {
                Value::String(self.to_string())
            }
        }
    }

    fn from_json(value: &Value) -> Cell {
        match value {
            Value::Null => Cell::Null,
            Value::Bool(flag) => Cell::Value(CellValue::Bool(*flag)),
            Value::Number(number) => match number.as_f64() {
                Some(value) => Cell::from(CellValue::Number(value)),
                None => Cell::Value(CellValue::Text(number.to_string())),
            },
            Value::String(text) => Cell::Value(CellValue::Text(text.clone())),
            other => Cell::Value(CellValue::Text(other.to_string())),
        }
    }
}

/// Textual form used for equality conditions and persistence. Dates render
/// as `YYYY-MM-DD`, timestamps as `YYYY-MM-DD HH:MM:SS`.
impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Number(value) if is_whole(*value) => write!(f, "{}", *value as i64),
            CellValue::Number(value) => write!(f, "{value}"),
            CellValue::Text(text) => f.write_str(text),
            CellValue::Bool(flag) => write!(f, "{flag}"),
            CellValue::Date(date) => write!(f, "{}", date.format("%Y-%m-%d")),
            CellValue::DateTime(stamp) => write!(f, "{}", stamp.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

impl From<f64> for CellValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for CellValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<NaiveDate> for CellValue {
    fn from(value: NaiveDate) -> Self {
        Self::Date(value)
    }
}

fn is_whole(value: f64) -> bool {
    value.is_finite() && value.fract() == 0.0 && value.abs() < 9.0e15
}

fn number_to_json(value: f64) -> Value {
    if is_whole(value) {
        Value::Number(Number::from(value as i64))
    } else {
        Number::from_f64(value)
            .map(Value::Number)
            .unwrap_or(Value::Null)
    }
}

/// Raised when a threshold condition meets a value with no numeric reading.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("value '{value}' cannot be compared numerically")]
pub struct ComparisonError {
    pub value: String,
}

/// A row cell: either explicitly null or carrying a value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    Null,
    Value(CellValue),
}

impl From<CellValue> for Cell {
    fn from(value: CellValue) -> Self {
        match value {
            CellValue::Number(number) if number.is_nan() => Cell::Null,
            other => Cell::Value(other),
        }
    }
}

/// Result of looking a column up in a [`Row`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Presence<'a> {
    Absent,
    Null,
    Present(&'a CellValue),
}

impl<'a> Presence<'a> {
    pub fn value(self) -> Option<&'a CellValue> {
        match self {
            Presence::Present(value) => Some(value),
            Presence::Absent | Presence::Null => None,
        }
    }

    pub fn is_missing(self) -> bool {
        self.value().is_none()
    }
}

/// One imported product row, keyed by canonical column name. Columns keep
/// the order they were first inserted in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    cells: Vec<(String, Cell)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: impl Into<String>, value: impl Into<CellValue>) -> Self {
        self.insert(column, value);
        self
    }

    pub fn with_null(mut self, column: impl Into<String>) -> Self {
        self.set(column, Cell::Null);
        self
    }

    pub fn insert(&mut self, column: impl Into<String>, value: impl Into<CellValue>) {
        self.set(column, Cell::from(value.into()));
    }

    /// Replaces the cell in place when the column exists, appends otherwise.
    pub fn set(&mut self, column: impl Into<String>, cell: Cell) {
        let column = column.into();
        match self.cells.iter_mut().find(|(name, _)| *name == column) {
            Some((_, slot)) => *slot = cell,
            None => self.cells.push((column, cell)),
        }
    }

    pub fn remove(&mut self, column: &str) -> Option<Cell> {
        let position = self.cells.iter().position(|(name, _)| name == column)?;
        Some(self.cells.remove(position).1)
    }

    pub fn get(&self, column: &str) -> Presence<'_> {
        match self.cells.iter().find(|(name, _)| name == column) {
            None => Presence::Absent,
            Some((_, Cell::Null)) => Presence::Null,
            Some((_, Cell::Value(value))) => Presence::Present(value),
        }
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(column, _)| column.as_str())
    }

    pub fn null_count(&self) -> usize {
        self.cells
            .iter()
            .filter(|(_, cell)| matches!(cell, Cell::Null))
            .count()
    }

    /// Trimmed textual product key, empty when the column is missing.
    pub fn product_key(&self, product_field: &str) -> String {
        self.get(product_field)
            .value()
            .map(|value| value.to_string().trim().to_string())
            .unwrap_or_default()
    }

    pub fn from_json_object(object: &Map<String, Value>) -> Self {
        let mut row = Self::new();
        for (column, value) in object {
            row.set(column.as_str(), CellValue::from_json(value));
        }
        row
    }

    /// JSON object view. Nulls become empty strings when `blank_nulls` is set,
    /// which is how records are persisted to the reference store.
    pub fn to_json_object(&self, blank_nulls: bool) -> Map<String, Value> {
        self.cells
            .iter()
            .map(|(column, cell)| {
                let value = match cell {
                    Cell::Null if blank_nulls => Value::String(String::new()),
                    Cell::Null => Value::Null,
                    Cell::Value(value) => value.to_json(),
                };
                (column.clone(), value)
            })
            .collect()
    }
}

impl Serialize for Row {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (column, cell) in &self.cells {
            match cell {
                Cell::Null => map.serialize_entry(column, &Value::Null)?,
                Cell::Value(value) => map.serialize_entry(column, &value.to_json())?,
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Row {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let object = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Row::from_json_object(&object))
    }
}

/// Coarse risk tier derived from a total score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    High,
    Medium,
    Low,
    Unweighted,
}

impl Category {
    pub const fn ordered() -> [Self; 4] {
        [Self::High, Self::Medium, Self::Low, Self::Unweighted]
    }

    pub fn from_score(score: f64) -> Self {
        if score >= HIGH_SCORE_THRESHOLD {
            Self::High
        } else if score >= MEDIUM_SCORE_THRESHOLD {
            Self::Medium
        } else if score > 0.0 {
            Self::Low
        } else {
            Self::Unweighted
        }
    }

    /// Label stored in the reference dataset.
    pub const fn label(self) -> &'static str {
        match self {
            Self::High => "Haut",
            Self::Medium => "Moyen",
            Self::Low => "Bas",
            Self::Unweighted => "Non pondéré",
        }
    }

    /// Accepts the stored labels as well as their English names.
    pub fn parse_label(raw: &str) -> Option<Self> {
        match raw.trim().to_lowercase().as_str() {
            "haut" | "high" => Some(Self::High),
            "moyen" | "medium" => Some(Self::Medium),
            "bas" | "low" => Some(Self::Low),
            "non pondéré" | "non pondere" | "unweighted" => Some(Self::Unweighted),
            _ => None,
        }
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.label())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Category::parse_label(&raw)
            .ok_or_else(|| serde::de::Error::custom(format!("unknown category '{raw}'")))
    }
}

/// Operational urgency tier, independent of [`Category`] thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InventoryStatus {
    Urgent,
    Normal,
    Safe,
}

impl InventoryStatus {
    pub fn from_score(score: f64) -> Self {
        if score <= URGENT_SCORE_CEILING {
            Self::Urgent
        } else if score < HIGH_SCORE_THRESHOLD {
            Self::Normal
        } else {
            Self::Safe
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Urgent => "Urgent",
            Self::Normal => "Normal",
            Self::Safe => "Safe",
        }
    }
}

/// Where a record's score came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScoreSource {
    Reference,
    Computed,
}

impl ScoreSource {
    pub const fn label(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Computed => "computed",
        }
    }
}

/// Columns appended to every enriched row. Input columns with these names
/// are dropped so each appears once in the output.
pub const SCORING_COLUMNS: [&str; 4] = ["score", "category", "status", "score_source"];

/// A product row carrying its score, category and inventory status.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredRecord {
    #[serde(skip)]
    pub product_key: String,
    #[serde(flatten)]
    pub attributes: Row,
    pub score: f64,
    pub category: Category,
    pub status: InventoryStatus,
    pub score_source: ScoreSource,
}

impl ScoredRecord {
    /// Status is always derived from `score`.
    pub fn new(
        product_key: String,
        mut attributes: Row,
        score: f64,
        category: Category,
        score_source: ScoreSource,
    ) -> Self {
        for column in SCORING_COLUMNS {
            attributes.remove(column);
        }
        Self {
            product_key,
            attributes,
            score,
            category,
            status: InventoryStatus::from_score(score),
            score_source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn category_and_status_boundaries() {
        assert_eq!(Category::from_score(16.0), Category::High);
        assert_eq!(InventoryStatus::from_score(16.0), InventoryStatus::Safe);
        assert_eq!(Category::from_score(15.99), Category::Medium);
        assert_eq!(InventoryStatus::from_score(15.99), InventoryStatus::Normal);
        assert_eq!(Category::from_score(13.0), Category::Medium);
        assert_eq!(InventoryStatus::from_score(10.0), InventoryStatus::Urgent);
        assert_eq!(Category::from_score(10.01), Category::Low);
        assert_eq!(InventoryStatus::from_score(10.01), InventoryStatus::Normal);
        assert_eq!(Category::from_score(0.0), Category::Unweighted);
        assert_eq!(Category::from_score(-3.5), Category::Unweighted);
    }

    #[test]
    fn category_labels_parse_in_both_languages() {
        for category in Category::ordered() {
            assert_eq!(Category::parse_label(category.label()), Some(category));
        }
        assert_eq!(Category::parse_label(" HIGH "), Some(Category::High));
        assert_eq!(Category::parse_label("critique"), None);
    }

    #[test]
    fn row_distinguishes_absent_from_null() {
        let row = Row::new().with("UC", 150.0).with_null("Prix Pièce");

        assert!(matches!(row.get("UC"), Presence::Present(CellValue::Number(n)) if *n == 150.0));
        assert_eq!(row.get("Prix Pièce"), Presence::Null);
        assert_eq!(row.get("Rebut"), Presence::Absent);
        assert!(row.get("Prix Pièce").is_missing());
        assert_eq!(row.null_count(), 1);
    }

    #[test]
    fn nan_numbers_are_stored_as_null() {
        let row = Row::new().with("Prix Pièce", f64::NAN);
        assert_eq!(row.get("Prix Pièce"), Presence::Null);
    }

    #[test]
    fn json_round_trip_keeps_types() {
        let source = json!({
            "Produit": " P-100 ",
            "UC": 150,
            "Prix Pièce": 2.5,
            "Pièces en suspicion de vol": "Non",
            "Rebut": null
        });
        let row: Row = serde_json::from_value(source).expect("row deserializes");

        assert_eq!(row.product_key("Produit"), "P-100");
        assert_eq!(row.get("Rebut"), Presence::Null);

        let rendered = serde_json::to_value(&row).expect("row serializes");
        assert_eq!(rendered["UC"], json!(150));
        assert_eq!(rendered["Prix Pièce"], json!(2.5));
        assert_eq!(rendered["Rebut"], Value::Null);
    }

    #[test]
    fn dates_render_as_text_when_persisted() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 5).expect("valid date");
        let row = Row::new().with("Date du dernier RI", date).with_null("Rebut");

        let object = row.to_json_object(true);
        assert_eq!(object["Date du dernier RI"], json!("2024-03-05"));
        assert_eq!(object["Rebut"], json!(""));
    }

    #[test]
    fn text_numbers_compare_numerically() {
        assert_eq!(CellValue::text(" 42 ").as_number(), Ok(42.0));
        assert!(CellValue::text("GV").as_number().is_err());
        assert_eq!(CellValue::Number(150.0).to_string(), "150");
        assert_eq!(CellValue::Number(2.5).to_string(), "2.5");
    }

    #[test]
    fn columns_keep_insertion_order() {
        let mut row = Row::new()
            .with("Produit", "P-1")
            .with("UC", 5.0)
            .with("Alpha", "x");
        row.insert("UC", 6.0);

        assert_eq!(row.columns().collect::<Vec<_>>(), ["Produit", "UC", "Alpha"]);
        let rendered = serde_json::to_string(&row).expect("row serializes");
        assert_eq!(rendered, r#"{"Produit":"P-1","UC":6,"Alpha":"x"}"#);
    }

    #[test]
    fn scored_record_replaces_stale_scoring_columns() {
        let row = Row::new()
            .with("Produit", "P-1")
            .with("score", 3.0)
            .with("status", "Urgent")
            .with("UC", 40.0);

        let record = ScoredRecord::new(
            "P-1".to_string(),
            row,
            18.0,
            Category::High,
            ScoreSource::Computed,
        );

        assert_eq!(record.status, InventoryStatus::Safe);
        assert_eq!(record.attributes.columns().collect::<Vec<_>>(), ["Produit", "UC"]);
        let rendered = serde_json::to_string(&record).expect("record serializes");
        assert_eq!(
            rendered,
            r#"{"Produit":"P-1","UC":40,"score":18.0,"category":"Haut","status":"Safe","score_source":"computed"}"#
        );
    }
}
