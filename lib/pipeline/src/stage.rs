use serde::{Deserialize, Serialize};
use solescope_core::Error;

/// Outcome of a best-effort pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage<T> {
    Ok(T),
    Failed(SoftFailure),
}

/// Why a best-effort stage produced nothing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SoftFailure {
    pub stage: String,
    pub code: String,
    pub message: String,
}

impl<T> Stage<T> {
    pub fn from_result(stage: &str, result: solescope_core::Result<T>) -> Self {
        match result {
            Ok(value) => Stage::Ok(value),
            Err(e) => Stage::Failed(SoftFailure::new(stage, &e)),
        }
    }

    pub fn ok(&self) -> Option<&T> {
        match self {
            Stage::Ok(value) => Some(value),
            Stage::Failed(_) => None,
        }
    }

    pub fn failure(&self) -> Option<&SoftFailure> {
        match self {
            Stage::Ok(_) => None,
            Stage::Failed(f) => Some(f),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Stage::Ok(_))
    }
}

impl SoftFailure {
    pub fn new(stage: &str, error: &Error) -> Self {
        Self {
            stage: stage.to_string(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}
