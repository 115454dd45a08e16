//! Sample records keyed by `repository_accession`, enriched by explicit merge steps.
//!
//! The first batch of an enrichment pass is merged with left-join semantics: every record is
//! kept, matches get the new columns, unmatched records get them cleared. Every later batch is a
//! patch: matched records get non-empty values overwritten, nothing else changes and no rows are
//! added.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::domain::{ReadFiles, SampleRecord};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    LeftJoin,
    Patch,
}

pub trait Enrichment {
    fn key(&self) -> &str;
    /// Overwrites this enrichment's columns on `record`.
    fn assign(&self, record: &mut SampleRecord);
    /// Overwrites only the columns this enrichment has values for.
    fn patch(&self, record: &mut SampleRecord);
    /// Resets this enrichment's columns to empty.
    fn clear(record: &mut SampleRecord);
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesAnnotation {
    pub repository_accession: String,
    pub series_id: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub platform_id: Option<String>,
}

impl Enrichment for SeriesAnnotation {
    fn key(&self) -> &str {
        &self.repository_accession
    }

    fn assign(&self, record: &mut SampleRecord) {
        record.series_id = self.series_id.clone();
        record.title = self.title.clone();
        record.description = self.description.clone();
        record.platform_id = self.platform_id.clone();
    }

    fn patch(&self, record: &mut SampleRecord) {
        patch_field(&mut record.series_id, &self.series_id);
        patch_field(&mut record.title, &self.title);
        patch_field(&mut record.description, &self.description);
        patch_field(&mut record.platform_id, &self.platform_id);
    }

    fn clear(record: &mut SampleRecord) {
        record.series_id = None;
        record.title = None;
        record.description = None;
        record.platform_id = None;
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileAnnotation {
    pub repository_accession: String,
    pub read_files: ReadFiles,
}

impl Enrichment for FileAnnotation {
    fn key(&self) -> &str {
        &self.repository_accession
    }

    fn assign(&self, record: &mut SampleRecord) {
        record.read_files = self.read_files.clone();
    }

    fn patch(&self, record: &mut SampleRecord) {
        for (slot, update) in record.read_files.0.iter_mut().zip(&self.read_files.0) {
            patch_field(slot, update);
        }
    }

    fn clear(record: &mut SampleRecord) {
        record.read_files = ReadFiles::default();
    }
}

fn patch_field(target: &mut Option<String>, update: &Option<String>) {
    if let Some(value) = update {
        *target = Some(value.clone());
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct MergeStats {
    pub matched: usize,
    pub unmatched_updates: usize,
    pub duplicate_updates: usize,
}

#[derive(Debug, Clone, Default)]
pub struct SampleTable {
    records: Vec<SampleRecord>,
    index: HashMap<String, usize>,
}

impl SampleTable {
    /// Later records with an already-seen accession are dropped, not merged.
    pub fn from_records(records: Vec<SampleRecord>) -> Self {
        let mut table = Self::default();
        for record in records {
            if table.index.contains_key(&record.repository_accession) {
                tracing::warn!(accession = %record.repository_accession, "dropping duplicate sample record");
                continue;
            }
            table
                .index
                .insert(record.repository_accession.clone(), table.records.len());
            table.records.push(record);
        }
        table
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn get(&self, accession: &str) -> Option<&SampleRecord> {
        self.index.get(accession).map(|&i| &self.records[i])
    }

    pub fn records(&self) -> &[SampleRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<SampleRecord> {
        self.records
    }

    pub fn accessions(&self) -> impl Iterator<Item = &str> {
        self.records.iter().map(|r| r.repository_accession.as_str())
    }

    pub fn merge<E: Enrichment>(&mut self, updates: &[E], strategy: MergeStrategy) -> MergeStats {
        let mut stats = MergeStats::default();
        let mut seen = HashSet::new();
        let mut matched = vec![false; self.records.len()];
        for update in updates {
            if !seen.insert(update.key()) {
                stats.duplicate_updates += 1;
                continue;
            }
            let Some(&position) = self.index.get(update.key()) else {
                stats.unmatched_updates += 1;
                continue;
            };
            let record = &mut self.records[position];
            match strategy {
                MergeStrategy::LeftJoin => update.assign(record),
                MergeStrategy::Patch => update.patch(record),
            }
            matched[position] = true;
            stats.matched += 1;
        }
        if strategy == MergeStrategy::LeftJoin {
            for (record, hit) in self.records.iter_mut().zip(matched) {
                if !hit {
                    E::clear(record);
                }
            }
        }
        if stats.duplicate_updates > 0 {
            tracing::warn!(count = stats.duplicate_updates, "ignored duplicate updates");
        }
        stats
    }

    /// Folds per-series batches in order: the first as a left join, the rest as patches.
    pub fn fold<E, I>(&mut self, batches: I) -> Vec<MergeStats>
    where
        E: Enrichment,
        I: IntoIterator<Item = Vec<E>>,
    {
        batches
            .into_iter()
            .enumerate()
            .map(|(i, batch)| {
                let strategy = if i == 0 {
                    MergeStrategy::LeftJoin
                } else {
                    MergeStrategy::Patch
                };
                self.merge(&batch, strategy)
            })
            .collect()
    }
}
