//! Joins study-metadata exports into one record per repository sample accession.
//!
//! The chain is expsample -> experiment, expsample -> biosample (through the link table),
//! biosample -> subject, subject -> arm link. Every hop is an inner join: a sample whose chain
//! does not fully resolve is dropped instead of being partially populated.

use std::collections::{HashMap, HashSet};

use regex::Regex;
use serde::Serialize;

use crate::domain::SampleRecord;
use crate::error::KiraError;
use crate::table::{StudyTableSource, Table};

pub const SUBJECT_TABLE: &str = "subject";
pub const BIOSAMPLE_TABLE: &str = "biosample";
pub const EXPSAMPLE_TABLE: &str = "expsample";
pub const EXPERIMENT_TABLE: &str = "experiment";
pub const ARM_SUBJECT_TABLE: &str = "arm_2_subject";
pub const EXPSAMPLE_BIOSAMPLE_TABLE: &str = "expsample_2_biosample";
pub const REPOSITORY_TABLE: &str = "expsample_public_repository";

pub const DEFAULT_SAMPLE_PATTERN: &str = r"^GSM\d+$";

#[derive(Debug, Clone, Default, Serialize)]
pub struct JoinStats {
    pub repository_links: usize,
    pub unresolved: usize,
    pub off_pattern: usize,
    pub duplicates: usize,
}

#[derive(Debug, Clone)]
pub struct JoinedSamples {
    pub records: Vec<SampleRecord>,
    pub stats: JoinStats,
}

#[derive(Debug, Clone)]
struct ArmLink {
    age_min: Option<String>,
    age_max: Option<String>,
    age_unit: Option<String>,
}

pub struct JoinEngine {
    sample_pattern: Regex,
}

impl Default for JoinEngine {
    fn default() -> Self {
        Self {
            sample_pattern: Regex::new(DEFAULT_SAMPLE_PATTERN).expect("valid default pattern"),
        }
    }
}

impl JoinEngine {
    pub fn new(sample_pattern: Regex) -> Self {
        Self { sample_pattern }
    }

    pub fn join(&self, source: &dyn StudyTableSource) -> Result<JoinedSamples, KiraError> {
        let repository = source.read_table(REPOSITORY_TABLE)?;
        if repository.is_empty() {
            return Err(KiraError::NoRepositoryData {
                table: REPOSITORY_TABLE.to_string(),
            });
        }

        let experiments = key_set(&source.read_table(EXPERIMENT_TABLE)?, "EXPERIMENT_ACCESSION")?;
        let expsample_experiment = pairs(
            &source.read_table(EXPSAMPLE_TABLE)?,
            "EXPSAMPLE_ACCESSION",
            "EXPERIMENT_ACCESSION",
        )?
        .into_iter()
        .filter(|(_, experiment)| experiments.contains(experiment))
        .collect::<HashMap<_, _>>();
        let expsample_biosamples = group(pairs(
            &source.read_table(EXPSAMPLE_BIOSAMPLE_TABLE)?,
            "EXPSAMPLE_ACCESSION",
            "BIOSAMPLE_ACCESSION",
        )?);
        let biosample_subject = pairs(
            &source.read_table(BIOSAMPLE_TABLE)?,
            "BIOSAMPLE_ACCESSION",
            "SUBJECT_ACCESSION",
        )?
        .into_iter()
        .collect::<HashMap<_, _>>();
        let subjects = subject_genders(&source.read_table(SUBJECT_TABLE)?)?;
        let arm_links = arm_links(&source.read_table(ARM_SUBJECT_TABLE)?)?;

        let expsample_col = repository.column("EXPSAMPLE_ACCESSION")?;
        let accession_col = repository.column("REPOSITORY_ACCESSION")?;

        let mut stats = JoinStats {
            repository_links: repository.rows.len(),
            ..JoinStats::default()
        };
        let mut joined = Vec::new();
        for row in &repository.rows {
            let (Some(expsample), Some(accession)) = (
                repository.cell(row, expsample_col),
                repository.cell(row, accession_col),
            ) else {
                stats.unresolved += 1;
                continue;
            };
            let before = joined.len();
            let Some(experiment) = expsample_experiment.get(expsample) else {
                stats.unresolved += 1;
                continue;
            };
            for biosample in expsample_biosamples.get(expsample).into_iter().flatten() {
                let Some(subject) = biosample_subject.get(biosample) else {
                    continue;
                };
                let Some(gender) = subjects.get(subject) else {
                    continue;
                };
                for arm in arm_links.get(subject).into_iter().flatten() {
                    joined.push(SampleRecord {
                        repository_accession: accession.to_string(),
                        expsample_id: expsample.to_string(),
                        subject_id: subject.clone(),
                        biosample_id: biosample.clone(),
                        experiment_id: experiment.clone(),
                        gender: gender.clone(),
                        age_min: arm.age_min.clone(),
                        age_max: arm.age_max.clone(),
                        age_unit: arm.age_unit.clone(),
                        ..SampleRecord::default()
                    });
                }
            }
            if joined.len() == before {
                stats.unresolved += 1;
            }
        }

        let mut seen = HashSet::new();
        let mut records = Vec::with_capacity(joined.len());
        for record in joined {
            if !self.sample_pattern.is_match(&record.repository_accession) {
                stats.off_pattern += 1;
                continue;
            }
            if !seen.insert(record.repository_accession.clone()) {
                stats.duplicates += 1;
                continue;
            }
            records.push(record);
        }

        if stats.unresolved > 0 {
            tracing::warn!(
                count = stats.unresolved,
                "repository links dropped: foreign key chain did not resolve"
            );
        }
        tracing::info!(
            records = records.len(),
            off_pattern = stats.off_pattern,
            duplicates = stats.duplicates,
            "joined study tables"
        );
        Ok(JoinedSamples { records, stats })
    }
}

fn key_set(table: &Table, column: &str) -> Result<HashSet<String>, KiraError> {
    let index = table.column(column)?;
    Ok(table
        .rows
        .iter()
        .filter_map(|row| table.cell(row, index).map(str::to_string))
        .collect())
}

fn pairs(table: &Table, left: &str, right: &str) -> Result<Vec<(String, String)>, KiraError> {
    let left = table.column(left)?;
    let right = table.column(right)?;
    Ok(table
        .rows
        .iter()
        .filter_map(|row| {
            let key = table.cell(row, left)?;
            let value = table.cell(row, right)?;
            Some((key.to_string(), value.to_string()))
        })
        .collect())
}

fn group(pairs: Vec<(String, String)>) -> HashMap<String, Vec<String>> {
    let mut grouped: HashMap<String, Vec<String>> = HashMap::new();
    for (key, value) in pairs {
        let values = grouped.entry(key).or_default();
        if !values.contains(&value) {
            values.push(value);
        }
    }
    grouped
}

fn subject_genders(table: &Table) -> Result<HashMap<String, Option<String>>, KiraError> {
    let subject = table.column("SUBJECT_ACCESSION")?;
    let gender = table.column("GENDER")?;
    Ok(table
        .rows
        .iter()
        .filter_map(|row| {
            let key = table.cell(row, subject)?;
            Some((key.to_string(), table.cell(row, gender).map(str::to_string)))
        })
        .collect())
}

fn arm_links(table: &Table) -> Result<HashMap<String, Vec<ArmLink>>, KiraError> {
    let subject = table.column("SUBJECT_ACCESSION")?;
    let age_min = table.column("MIN_SUBJECT_AGE")?;
    let age_max = table.column("MAX_SUBJECT_AGE")?;
    let age_unit = table.column("AGE_UNIT")?;
    let mut links: HashMap<String, Vec<ArmLink>> = HashMap::new();
    for row in &table.rows {
        let Some(key) = table.cell(row, subject) else {
            continue;
        };
        links.entry(key.to_string()).or_default().push(ArmLink {
            age_min: table.cell(row, age_min).map(str::to_string),
            age_max: table.cell(row, age_max).map(str::to_string),
            age_unit: table.cell(row, age_unit).map(str::to_string),
        });
    }
    Ok(links)
}
