mod index;
mod store;

pub use index::{ReferenceIndex, ReferenceRecord, CATEGORY_FIELD, SCORE_FIELD};
pub use store::{AppendFailure, AppendReport, ReferenceStore};

use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum ReferenceError {
    #[error("failed to access reference dataset {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid reference dataset: {0}")]
    Json(#[from] serde_json::Error),
    #[error("reference dataset must be a JSON array of objects ({0})")]
    Shape(String),
}
