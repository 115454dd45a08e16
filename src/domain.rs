use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::KiraError;

pub const MAX_READ_FILES: usize = 3;

fn split_prefix_digits<'a>(value: &'a str, prefixes: &[&str]) -> Option<(&'a str, &'a str)> {
    prefixes.iter().find_map(|prefix| {
        let rest = value.strip_prefix(prefix)?;
        (!rest.is_empty() && rest.chars().all(|ch| ch.is_ascii_digit()))
            .then(|| (&value[..prefix.len()], rest))
    })
}

/// Sample-level GEO accession (`GSM...`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SampleAccession(String);

impl SampleAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SampleAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SampleAccession {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        if split_prefix_digits(&normalized, &["GSM"]).is_none() {
            return Err(KiraError::InvalidSampleAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SeriesAccession(String);

impl SeriesAccession {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SeriesAccession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for SeriesAccession {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        if split_prefix_digits(&normalized, &["GSE"]).is_none() {
            return Err(KiraError::InvalidSeriesAccession(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Sequence-archive run accession (SRR, ERR or DRR).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RunId {
    type Err = KiraError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_uppercase();
        if split_prefix_digits(&normalized, &["SRR", "ERR", "DRR"]).is_none() {
            return Err(KiraError::InvalidRunId(value.to_string()));
        }
        Ok(Self(normalized))
    }
}

/// Expected raw read file names for R1..R3; unused slots stay `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadFiles(pub [Option<String>; MAX_READ_FILES]);

impl ReadFiles {
    pub fn slot(&self, index: usize) -> Option<&str> {
        self.0.get(index).and_then(|value| value.as_deref())
    }

    pub fn is_empty(&self) -> bool {
        self.0.iter().all(Option::is_none)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRecord {
    pub repository_accession: String,
    pub expsample_id: String,
    pub subject_id: String,
    pub biosample_id: String,
    pub experiment_id: String,
    pub gender: Option<String>,
    pub age_min: Option<String>,
    pub age_max: Option<String>,
    pub age_unit: Option<String>,
    pub series_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub platform_id: Option<String>,
    pub read_files: ReadFiles,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesRecord {
    pub series_id: SeriesAccession,
    pub is_superseries: bool,
    pub overall_design: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunAccession {
    pub run_id: RunId,
    pub parent_sample_accession: SampleAccession,
    pub read_file_count: u8,
    pub inferred_filenames: Vec<String>,
}

impl RunAccession {
    /// Builds `{run_id}_{n}` for n in 1..=read_count. Names are never discovered by listing.
    pub fn new(
        run_id: RunId,
        parent_sample_accession: SampleAccession,
        read_count: u32,
    ) -> Result<Self, KiraError> {
        if read_count == 0 || read_count as usize > MAX_READ_FILES {
            return Err(KiraError::InvalidReadCount {
                run: run_id.to_string(),
                count: read_count,
            });
        }
        let inferred_filenames = (1..=read_count)
            .map(|n| format!("{}_{n}", run_id.as_str()))
            .collect();
        Ok(Self {
            run_id,
            parent_sample_accession,
            read_file_count: read_count as u8,
            inferred_filenames,
        })
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_sample_accession() {
        let acc: SampleAccession = " gsm1234 ".parse().unwrap();
        assert_eq!(acc.as_str(), "GSM1234");
        let err = "GSE1234".parse::<SampleAccession>().unwrap_err();
        assert_matches!(err, KiraError::InvalidSampleAccession(_));
    }

    #[test]
    fn parse_run_id_prefixes() {
        assert!("SRR014966".parse::<RunId>().is_ok());
        assert!("ERR123".parse::<RunId>().is_ok());
        assert!("DRR9".parse::<RunId>().is_ok());
        assert!("SRX123".parse::<RunId>().is_err());
        assert!("SRR".parse::<RunId>().is_err());
    }

    #[test]
    fn run_accession_filenames() {
        let run = RunAccession::new(
            "SRR100".parse().unwrap(),
            "GSM1".parse().unwrap(),
            3,
        )
        .unwrap();
        assert_eq!(run.inferred_filenames, vec!["SRR100_1", "SRR100_2", "SRR100_3"]);
    }

    #[test]
    fn run_accession_rejects_out_of_range_count() {
        let err = RunAccession::new("SRR100".parse().unwrap(), "GSM1".parse().unwrap(), 4)
            .unwrap_err();
        assert_matches!(err, KiraError::InvalidReadCount { count: 4, .. });
    }
}
