use std::fmt;

use serde::Serialize;

use crate::error::KiraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    SampleAccession,
    SeriesLookup,
    SeriesRelation,
    SeriesSamples,
    RunLookup,
    ReadCount,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::SampleAccession => "sample-accession",
            Stage::SeriesLookup => "series-lookup",
            Stage::SeriesRelation => "series-relation",
            Stage::SeriesSamples => "series-samples",
            Stage::RunLookup => "run-lookup",
            Stage::ReadCount => "read-count",
        };
        write!(f, "{name}")
    }
}

/// A lookup that failed after retries. The affected fields stay empty; the batch continues.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub stage: Stage,
    pub item: String,
    pub message: String,
}

impl ItemFailure {
    pub fn new(stage: Stage, item: impl fmt::Display, err: &KiraError) -> Self {
        let failure = Self {
            stage,
            item: item.to_string(),
            message: err.to_string(),
        };
        tracing::warn!(stage = %failure.stage, item = %failure.item, error = %failure.message, "lookup failed");
        failure
    }
}
