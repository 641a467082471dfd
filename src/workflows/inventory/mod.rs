//! Inventory risk scoring: condition parsing, the criteria catalog, the
//! scoring engine, reference-data enrichment and the reference store.

pub mod catalog;
pub mod condition;
pub mod domain;
pub mod engine;
pub mod enrichment;
pub mod ingest;
pub mod reference;

pub use catalog::{CatalogError, CriteriaCatalog, Criterion, CriterionDefinition, Specification};
pub use condition::{Condition, ConditionError};
pub use domain::{
    Category, Cell, CellValue, ComparisonError, InventoryStatus, Presence, Row, ScoreSource,
    ScoredRecord, SCORING_COLUMNS,
};
pub use engine::{CriterionContribution, ScoreOutcome, ScoringEngine, DEFAULT_DATE_CRITERION};
pub use enrichment::{BatchSummary, InventoryEnricher, BACKFILL_COLUMNS};
pub use ingest::IngestError;
pub use reference::{
    AppendFailure, AppendReport, ReferenceError, ReferenceIndex, ReferenceRecord, ReferenceStore,
};
