use super::condition::{Condition, ConditionError};
use super::domain::{CellValue, ComparisonError};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::HashSet;
use std::io::Read;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Criterion entry as written in the criteria configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionDefinition {
    #[serde(rename = "Critère")]
    pub name: String,
    #[serde(rename = "Coefficient")]
    pub coefficient: f64,
    #[serde(rename = "Spécifications", default)]
    pub specifications: Vec<SpecificationDefinition>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpecificationDefinition {
    #[serde(rename = "Spécification", deserialize_with = "condition_text")]
    pub condition: String,
    #[serde(rename = "Pondération")]
    pub weight: f64,
}

/// Conditions are usually strings, but bare numbers appear in hand-edited files.
fn condition_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(text) => Ok(text),
        serde_json::Value::Number(number) => Ok(number.to_string()),
        serde_json::Value::Bool(flag) => Ok(flag.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "specification must be text, got {other}"
        ))),
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read criteria file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid criteria configuration: {0}")]
    Json(#[from] serde_json::Error),
}

/// A compiled condition/weight pair.
#[derive(Debug, Clone, PartialEq)]
pub struct Specification {
    pub text: String,
    pub weight: f64,
    condition: Result<Condition, ConditionError>,
}

/// Why a specification could not be evaluated against a value.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum SpecificationFailure {
    #[error(transparent)]
    Parse(#[from] ConditionError),
    #[error(transparent)]
    Comparison(#[from] ComparisonError),
}

impl Specification {
    pub fn new(text: impl Into<String>, weight: f64) -> Self {
        let text = text.into();
        let condition = Condition::compile(&text);
        Self {
            text,
            weight,
            condition,
        }
    }

    pub fn condition(&self) -> Result<&Condition, &ConditionError> {
        self.condition.as_ref()
    }

    pub fn evaluate(&self, value: &CellValue) -> Result<bool, SpecificationFailure> {
        let condition = self.condition.as_ref().map_err(|err| err.clone())?;
        Ok(condition.matches(value)?)
    }
}

/// A named, weighted risk dimension.
#[derive(Debug, Clone, PartialEq)]
pub struct Criterion {
    pub name: String,
    pub coefficient: f64,
    pub specifications: Vec<Specification>,
}

impl Criterion {
    pub fn new(name: impl Into<String>, coefficient: f64) -> Self {
        Self {
            name: name.into(),
            coefficient,
            specifications: Vec::new(),
        }
    }

    pub fn with_specification(mut self, condition: &str, weight: f64) -> Self {
        self.specifications.push(Specification::new(condition, weight));
        self
    }

    fn from_definition(definition: CriterionDefinition) -> Self {
        Self {
            name: definition.name.trim().to_string(),
            coefficient: definition.coefficient,
            specifications: definition
                .specifications
                .into_iter()
                .map(|spec| Specification::new(spec.condition, spec.weight))
                .collect(),
        }
    }
}

/// Immutable, ordered table of criteria loaded once at startup.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CriteriaCatalog {
    criteria: Vec<Criterion>,
}

impl CriteriaCatalog {
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, CatalogError> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let catalog = Self::from_reader(file)?;
        info!(
            path = %path.display(),
            criteria = catalog.len(),
            "criteria catalog loaded"
        );
        Ok(catalog)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, CatalogError> {
        let definitions: Vec<CriterionDefinition> = serde_json::from_reader(reader)?;
        Ok(Self::from_definitions(definitions))
    }

    pub fn from_definitions(definitions: Vec<CriterionDefinition>) -> Self {
        Self::new(
            definitions
                .into_iter()
                .map(Criterion::from_definition)
                .collect(),
        )
    }

    pub fn new(criteria: Vec<Criterion>) -> Self {
        let mut seen = HashSet::new();
        for criterion in &criteria {
            if !seen.insert(criterion.name.as_str()) {
                warn!(criterion = %criterion.name, "criterion defined more than once");
            }
            for spec in &criterion.specifications {
                if let Err(err) = spec.condition() {
                    warn!(
                        criterion = %criterion.name,
                        specification = %spec.text,
                        error = %err,
                        "specification can never match"
                    );
                }
            }
        }

        Self { criteria }
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }

    pub fn get(&self, name: &str) -> Option<&Criterion> {
        self.criteria.iter().find(|criterion| criterion.name == name)
    }

    pub fn len(&self) -> usize {
        self.criteria.len()
    }

    pub fn is_empty(&self) -> bool {
        self.criteria.is_empty()
    }

    /// Specifications whose condition failed to compile, as `(criterion, text)`.
    pub fn invalid_specifications(&self) -> Vec<(&str, &str)> {
        self.criteria
            .iter()
            .flat_map(|criterion| {
                criterion
                    .specifications
                    .iter()
                    .filter(|spec| spec.condition().is_err())
                    .map(move |spec| (criterion.name.as_str(), spec.text.as_str()))
            })
            .collect()
    }
}
