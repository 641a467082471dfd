use super::domain::{Category, Row, ScoreSource, ScoredRecord};
use super::engine::ScoringEngine;
use super::reference::ReferenceIndex;
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::{debug, info, warn};

/// Attributes copied from the reference record when a row lacks them.
pub const BACKFILL_COLUMNS: [&str; 6] = [
    "Type d'emballage",
    "Flux Pièce",
    "Date du dernier RI",
    "Prix Pièce",
    "ECV/COR",
    "UC",
];

/// Scores batches of rows against the reference index and the criteria
/// catalog. Holds no per-batch state, so rows are independent of each other.
#[derive(Debug, Clone)]
pub struct InventoryEnricher {
    engine: ScoringEngine,
    index: ReferenceIndex,
}

impl InventoryEnricher {
    pub fn new(engine: ScoringEngine, index: ReferenceIndex) -> Self {
        Self { engine, index }
    }

    pub fn engine(&self) -> &ScoringEngine {
        &self.engine
    }

    fn product_field(&self) -> &str {
        self.index.product_field()
    }

    /// Reuses stored scores for known products and computes the rest.
    pub fn enrich(&self, rows: &[Row]) -> Vec<ScoredRecord> {
        let records: Vec<_> = rows
            .iter()
            .enumerate()
            .map(|(position, row)| self.enrich_row(position, row))
            .collect();
        log_batch("reference", &records);
        records
    }

    pub fn enrich_row(&self, position: usize, row: &Row) -> ScoredRecord {
        let product_key = row.product_key(self.product_field());

        let (score, category, score_source) = match self.index.get(&product_key) {
            Some(reference) => {
                let score = reference.stored_score().unwrap_or(0.0);
                let category = match reference.stored_category_label() {
                    None => Category::Unweighted,
                    Some(label) => Category::parse_label(&label).unwrap_or_else(|| {
                        warn!(
                            row = position,
                            product = %product_key,
                            category = %label,
                            "unknown stored category, treating as unweighted"
                        );
                        Category::Unweighted
                    }),
                };
                if category != Category::from_score(score) {
                    debug!(
                        row = position,
                        product = %product_key,
                        score,
                        stored = category.label(),
                        "stored category disagrees with stored score"
                    );
                }
                (score, category, ScoreSource::Reference)
            }
            None => {
                let outcome = self.engine.score(row);
                (outcome.score, outcome.category, ScoreSource::Computed)
            }
        };

        debug!(row = position, product = %product_key, score, ?score_source, "row scored");

        ScoredRecord::new(product_key, row.clone(), score, category, score_source)
    }

    /// Fills [`BACKFILL_COLUMNS`] from the reference record, then recomputes
    /// every row's score with the engine.
    pub fn enrich_with_backfill(&self, rows: &[Row]) -> Vec<ScoredRecord> {
        let records: Vec<_> = rows
            .iter()
            .enumerate()
            .map(|(position, row)| {
                let (enriched, filled) = self.backfill(row);
                if !filled.is_empty() {
                    debug!(row = position, columns = ?filled, "backfilled from reference");
                }
                let outcome = self.engine.score(&enriched);
                ScoredRecord::new(
                    enriched.product_key(self.product_field()),
                    enriched,
                    outcome.score,
                    outcome.category,
                    ScoreSource::Computed,
                )
            })
            .collect();
        log_batch("backfill", &records);
        records
    }

    /// Copy of `row` with missing backfill columns taken from the reference
    /// record, and the names of the columns that were filled. Present values
    /// are never overwritten and blank reference values are not copied.
    pub fn backfill(&self, row: &Row) -> (Row, Vec<&'static str>) {
        let mut enriched = row.clone();
        let mut filled = Vec::new();

        let Some(reference) = self.index.get(&row.product_key(self.product_field())) else {
            return (enriched, filled);
        };

        for column in BACKFILL_COLUMNS {
            if !row.get(column).is_missing() {
                continue;
            }
            if let Some(value) = reference.attributes.get(column).value() {
                if value.to_string().trim().is_empty() {
                    continue;
                }
                enriched.insert(column, value.clone());
                filled.push(column);
            }
        }

        (enriched, filled)
    }

    /// See [`ReferenceIndex::missing_rows`].
    pub fn missing_references(&self, rows: &[Row]) -> Vec<usize> {
        self.index.missing_rows(rows)
    }

    pub fn summarize(&self, rows: &[Row], records: &[ScoredRecord]) -> BatchSummary {
        let mut by_category: BTreeMap<Category, usize> =
            Category::ordered().into_iter().map(|c| (c, 0)).collect();
        let mut by_status: BTreeMap<&'static str, usize> = BTreeMap::new();
        for record in records {
            *by_category.entry(record.category).or_default() += 1;
            *by_status.entry(record.status.label()).or_default() += 1;
        }

        BatchSummary {
            total: records.len(),
            reused: records
                .iter()
                .filter(|record| record.score_source == ScoreSource::Reference)
                .count(),
            computed: records
                .iter()
                .filter(|record| record.score_source == ScoreSource::Computed)
                .count(),
            missing_references: self.missing_references(rows).len(),
            null_cells: rows.iter().map(Row::null_count).sum(),
            by_category,
            by_status,
        }
    }
}

fn log_batch(flow: &'static str, records: &[ScoredRecord]) {
    let reused = records
        .iter()
        .filter(|record| record.score_source == ScoreSource::Reference)
        .count();
    info!(
        flow,
        rows = records.len(),
        reused,
        computed = records.len() - reused,
        "batch enriched"
    );
}

/// Headline figures for an enriched batch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchSummary {
    pub total: usize,
    pub reused: usize,
    pub computed: usize,
    pub missing_references: usize,
    pub null_cells: usize,
    pub by_category: BTreeMap<Category, usize>,
    pub by_status: BTreeMap<&'static str, usize>,
}
