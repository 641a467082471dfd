use super::catalog::{CriteriaCatalog, Criterion, SpecificationFailure};
use super::domain::{Category, CellValue, InventoryStatus, Presence, Row};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde::Serialize;
use tracing::{debug, warn};

/// Criterion whose values are dates, scored as days elapsed until the
/// evaluation date.
pub const DEFAULT_DATE_CRITERION: &str = "Date du dernier RI";

/// Stateless scorer applying the criteria catalog to a row.
#[derive(Debug, Clone)]
pub struct ScoringEngine {
    catalog: CriteriaCatalog,
    date_criterion: String,
    evaluation_date: NaiveDate,
}

impl ScoringEngine {
    pub fn new(catalog: CriteriaCatalog, evaluation_date: NaiveDate) -> Self {
        Self {
            catalog,
            date_criterion: DEFAULT_DATE_CRITERION.to_string(),
            evaluation_date,
        }
    }

    pub fn with_date_criterion(mut self, name: impl Into<String>) -> Self {
        self.date_criterion = name.into();
        self
    }

    pub fn score(&self, row: &Row) -> ScoreOutcome {
        let mut contributions = Vec::with_capacity(self.catalog.len());
        let mut trace = Vec::with_capacity(self.catalog.len() + 1);
        let mut total = 0.0;

        for criterion in self.catalog.criteria() {
            let contribution = match row.get(&criterion.name) {
                Presence::Present(value) => self.evaluate(criterion, value, &mut trace),
                Presence::Absent | Presence::Null => {
                    trace.push(format!(
                        "Critère: {} not found or NaN in row.",
                        criterion.name
                    ));
                    CriterionContribution::missing(&criterion.name)
                }
            };
            total += contribution.contribution;
            contributions.push(contribution);
        }

        let score = round_score(total);
        trace.push(format!("Total Score: {score}"));
        for line in &trace {
            debug!("{line}");
        }

        ScoreOutcome {
            score,
            category: Category::from_score(score),
            status: InventoryStatus::from_score(score),
            contributions,
            trace,
        }
    }

    fn evaluate(
        &self,
        criterion: &Criterion,
        raw: &CellValue,
        trace: &mut Vec<String>,
    ) -> CriterionContribution {
        let value = if criterion.name == self.date_criterion {
            match days_since(raw, self.evaluation_date) {
                Some(days) => CellValue::Number(days as f64),
                None => {
                    warn!(
                        criterion = %criterion.name,
                        value = %raw,
                        "failed to parse date, using 0 days"
                    );
                    trace.push(format!(
                        "Failed to parse date for '{}': {}",
                        criterion.name, raw
                    ));
                    CellValue::Number(0.0)
                }
            }
        } else {
            raw.clone()
        };

        let mut matched = None;
        for spec in &criterion.specifications {
            match spec.evaluate(&value) {
                Ok(true) => {
                    matched = Some(spec);
                    break;
                }
                Ok(false) => {}
                Err(SpecificationFailure::Parse(_)) => {}
                Err(SpecificationFailure::Comparison(err)) => {
                    debug!(
                        criterion = %criterion.name,
                        specification = %spec.text,
                        error = %err,
                        "specification skipped"
                    );
                }
            }
        }

        let (weight, coefficient, note) = match matched {
            Some(spec) => (
                spec.weight,
                criterion.coefficient,
                format!("matched '{}'", spec.text),
            ),
            None => (0.0, 0.0, "no specification matched".to_string()),
        };
        let contribution = weight * coefficient;

        trace.push(format!(
            "Critère: {}, Value: {}, Pondération: {}, Coefficient: {}, Contribution: {}",
            criterion.name, value, weight, coefficient, contribution
        ));

        CriterionContribution {
            criterion: criterion.name.clone(),
            value: Some(value),
            matched: matched.map(|spec| spec.text.clone()),
            weight,
            coefficient,
            contribution,
            note,
        }
    }
}

/// Rounds to two decimals, the precision scores are reported with.
pub fn round_score(total: f64) -> f64 {
    (total * 100.0).round() / 100.0
}

/// Whole days from `value` to midnight of `today`, floored like a calendar
/// difference. `None` when the value is not a recognisable date.
pub fn days_since(value: &CellValue, today: NaiveDate) -> Option<i64> {
    let stamp = match value {
        CellValue::Date(date) => date.and_hms_opt(0, 0, 0)?,
        CellValue::DateTime(stamp) => *stamp,
        CellValue::Text(raw) => parse_datetime(raw)?,
        CellValue::Number(_) | CellValue::Bool(_) => return None,
    };
    let elapsed = today.and_hms_opt(0, 0, 0)? - stamp;
    Some(elapsed.num_seconds().div_euclid(86_400))
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(dt) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(dt.naive_utc());
    }

    for format in ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%d/%m/%Y %H:%M:%S"] {
        if let Ok(stamp) = NaiveDateTime::parse_from_str(trimmed, format) {
            return Some(stamp);
        }
    }

    for format in ["%Y-%m-%d", "%d/%m/%Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(trimmed, format) {
            return date.and_hms_opt(0, 0, 0);
        }
    }

    None
}

/// Total score with its tiers and the audit trail that produced it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoreOutcome {
    pub score: f64,
    pub category: Category,
    pub status: InventoryStatus,
    pub contributions: Vec<CriterionContribution>,
    #[serde(skip)]
    pub trace: Vec<String>,
}

/// What one criterion added to a row's score.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CriterionContribution {
    pub criterion: String,
    #[serde(skip_serializing_if = "Option::is_none", serialize_with = "value_text")]
    pub value: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<String>,
    pub weight: f64,
    pub coefficient: f64,
    pub contribution: f64,
    pub note: String,
}

impl CriterionContribution {
    fn missing(criterion: &str) -> Self {
        Self {
            criterion: criterion.to_string(),
            value: None,
            matched: None,
            weight: 0.0,
            coefficient: 0.0,
            contribution: 0.0,
            note: "missing value".to_string(),
        }
    }
}

fn value_text<S: serde::Serializer>(
    value: &Option<CellValue>,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    match value {
        Some(value) => serializer.serialize_str(&value.to_string()),
        None => serializer.serialize_none(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 30).expect("valid date")
    }

    fn uc_engine() -> ScoringEngine {
        let catalog = CriteriaCatalog::new(vec![Criterion::new("UC", 2.0)
            .with_specification(">=100", 5.0)
            .with_specification("<100", 1.0)]);
        ScoringEngine::new(catalog, today())
    }

    fn inventory_engine() -> ScoringEngine {
        let catalog = CriteriaCatalog::new(vec![
            Criterion::new(DEFAULT_DATE_CRITERION, 2.0)
                .with_specification("<30", 1.0)
                .with_specification("30 à 180 Jours", 3.0)
                .with_specification(">180", 5.0),
            Criterion::new("Type d'emballage", 1.0)
                .with_specification("GV", 2.0)
                .with_specification("PV", 1.0),
            Criterion::new("Prix Pièce", 1.5)
                .with_specification("<10", 1.0)
                .with_specification(">=10 & <100", 2.0)
                .with_specification(">=100", 4.0),
        ]);
        ScoringEngine::new(catalog, today())
    }

    #[test]
    fn single_criterion_scores_weight_times_coefficient() {
        let outcome = uc_engine().score(&Row::new().with("UC", 150.0));

        assert_eq!(outcome.score, 10.0);
        assert_eq!(outcome.category, Category::Low);
        assert_eq!(outcome.status, InventoryStatus::Urgent);
        assert_eq!(outcome.contributions.len(), 1);
        assert_eq!(outcome.contributions[0].matched.as_deref(), Some(">=100"));
    }

    #[test]
    fn first_matching_specification_wins() {
        let catalog = CriteriaCatalog::new(vec![Criterion::new("UC", 1.0)
            .with_specification(">=10", 2.0)
            .with_specification(">=100", 7.0)]);
        let engine = ScoringEngine::new(catalog, today());

        assert_eq!(engine.score(&Row::new().with("UC", 500.0)).score, 2.0);
    }

    #[test]
    fn combines_all_criteria() {
        let row = Row::new()
            .with(
                DEFAULT_DATE_CRITERION,
                NaiveDate::from_ymd_opt(2024, 12, 1).expect("valid date"),
            )
            .with("Type d'emballage", " gv ")
            .with("Prix Pièce", 12.5);

        let outcome = inventory_engine().score(&row);

        // 211 days -> 5 * 2, GV -> 2 * 1, 12.5 -> 2 * 1.5
        assert_eq!(outcome.score, 15.0);
        assert_eq!(outcome.category, Category::Medium);
        assert_eq!(outcome.status, InventoryStatus::Normal);
    }

    #[test]
    fn missing_and_null_values_contribute_nothing() {
        let row = Row::new().with_null("Prix Pièce").with("Type d'emballage", "PV");

        let outcome = inventory_engine().score(&row);

        assert_eq!(outcome.score, 1.0);
        assert!(outcome
            .trace
            .iter()
            .any(|line| line.contains("Prix Pièce not found or NaN")));
        assert!(outcome
            .trace
            .iter()
            .any(|line| line.contains(&format!("{DEFAULT_DATE_CRITERION} not found"))));
    }

    #[test]
    fn unparseable_date_counts_as_zero_days() {
        let row = Row::new().with(DEFAULT_DATE_CRITERION, "bientôt");

        let outcome = inventory_engine().score(&row);

        // zero days falls into "<30"
        assert_eq!(outcome.score, 2.0);
        assert!(outcome
            .trace
            .iter()
            .any(|line| line.starts_with("Failed to parse date")));
    }

    #[test]
    fn text_dates_are_converted_to_day_deltas() {
        assert_eq!(days_since(&CellValue::text("2025-06-01"), today()), Some(29));
        assert_eq!(days_since(&CellValue::text("01/06/2025"), today()), Some(29));
        assert_eq!(
            days_since(&CellValue::text("2025-06-29 18:00:00"), today()),
            Some(0)
        );
        assert_eq!(
            days_since(&CellValue::text("2025-07-01T06:00:00Z"), today()),
            Some(-2)
        );
        assert_eq!(days_since(&CellValue::Number(45000.0), today()), None);
    }

    #[test]
    fn comparison_failures_fall_through_to_later_specifications() {
        let catalog = CriteriaCatalog::new(vec![Criterion::new("ECV/COR", 1.0)
            .with_specification(">=2", 3.0)
            .with_specification("COR", 6.0)]);
        let engine = ScoringEngine::new(catalog, today());

        assert_eq!(engine.score(&Row::new().with("ECV/COR", "cor")).score, 6.0);
    }

    #[test]
    fn scores_round_to_two_decimals() {
        let catalog = CriteriaCatalog::new(vec![
            Criterion::new("A", 0.333).with_specification(">=0", 1.0),
            Criterion::new("B", 0.333).with_specification(">=0", 1.0),
        ]);
        let engine = ScoringEngine::new(catalog, today());

        assert_eq!(
            engine
                .score(&Row::new().with("A", 1.0).with("B", 1.0))
                .score,
            0.67
        );
    }

    #[test]
    fn scoring_is_deterministic() {
        let engine = inventory_engine();
        let row = Row::new()
            .with(DEFAULT_DATE_CRITERION, "2025-01-15")
            .with("Prix Pièce", 250.0);

        let first = engine.score(&row);
        let second = engine.score(&row);
        assert_eq!(first, second);
    }
}
