use std::collections::BTreeSet;

use serde::Serialize;

use crate::domain::{SampleAccession, SeriesAccession, SeriesRecord};
use crate::error::KiraError;
use crate::merge::SeriesAnnotation;
use crate::report::{ItemFailure, Stage};
use crate::retry::RetryPolicy;

/// Relation text of a series that lists its constituent sub-series.
pub const SUPERSERIES_MARKER: &str = "SuperSeries of";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SeriesRelation {
    pub relation_text: Option<String>,
    pub overall_design: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeriesSample {
    pub accession: SampleAccession,
    pub title: Option<String>,
    pub description: Option<String>,
    pub platform_id: Option<String>,
}

pub trait SampleMetadataLookup: Send + Sync {
    /// All series a sample belongs to. Empty when the sample lists none.
    fn get_series_for_sample(
        &self,
        accession: &SampleAccession,
    ) -> Result<Vec<SeriesAccession>, KiraError>;
    fn get_series_relation(&self, series: &SeriesAccession) -> Result<SeriesRelation, KiraError>;
    fn get_series_samples(&self, series: &SeriesAccession) -> Result<Vec<SeriesSample>, KiraError>;
}

pub fn is_superseries(relation_text: Option<&str>) -> bool {
    relation_text
        .map(|text| text.trim_start().starts_with(SUPERSERIES_MARKER))
        .unwrap_or(false)
}

#[derive(Debug, Clone, Default)]
pub struct SeriesResolution {
    pub series: BTreeSet<SeriesAccession>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SeriesFilter {
    pub kept: BTreeSet<SeriesAccession>,
    pub records: Vec<SeriesRecord>,
    pub failures: Vec<ItemFailure>,
}

impl SeriesFilter {
    pub fn superseries(&self) -> impl Iterator<Item = &SeriesRecord> {
        self.records.iter().filter(|record| record.is_superseries)
    }
}

pub struct SeriesDeduplicator<'a, M: SampleMetadataLookup> {
    lookup: &'a M,
    retry: RetryPolicy,
}

impl<'a, M: SampleMetadataLookup> SeriesDeduplicator<'a, M> {
    pub fn new(lookup: &'a M, retry: RetryPolicy) -> Self {
        Self { lookup, retry }
    }

    pub fn resolve_series<'s, I>(&self, sample_accessions: I) -> SeriesResolution
    where
        I: IntoIterator<Item = &'s SampleAccession>,
    {
        let mut resolution = SeriesResolution::default();
        for accession in sample_accessions {
            match self.retry.run("series-for-sample", || {
                self.lookup.get_series_for_sample(accession)
            }) {
                Ok(series) => {
                    if series.is_empty() {
                        tracing::debug!(sample = %accession, "sample lists no series");
                    }
                    resolution.series.extend(series);
                }
                Err(err) => resolution
                    .failures
                    .push(ItemFailure::new(Stage::SeriesLookup, accession, &err)),
            }
        }
        tracing::info!(series = resolution.series.len(), "resolved series");
        resolution
    }

    /// Drops superseries. A series whose relation cannot be fetched is kept and reported.
    pub fn filter_superseries(&self, series: &BTreeSet<SeriesAccession>) -> SeriesFilter {
        let mut filter = SeriesFilter::default();
        for id in series {
            let relation = match self
                .retry
                .run("series-relation", || self.lookup.get_series_relation(id))
            {
                Ok(relation) => relation,
                Err(err) => {
                    filter
                        .failures
                        .push(ItemFailure::new(Stage::SeriesRelation, id, &err));
                    SeriesRelation::default()
                }
            };
            let record = SeriesRecord {
                series_id: id.clone(),
                is_superseries: is_superseries(relation.relation_text.as_deref()),
                overall_design: relation.overall_design,
            };
            if record.is_superseries {
                tracing::info!(series = %id, "dropping superseries");
            } else {
                filter.kept.insert(id.clone());
            }
            filter.records.push(record);
        }
        filter
    }
}

pub fn series_annotations(series: &SeriesAccession, samples: &[SeriesSample]) -> Vec<SeriesAnnotation> {
    samples
        .iter()
        .map(|sample| SeriesAnnotation {
            repository_accession: sample.accession.to_string(),
            series_id: Some(series.to_string()),
            title: sample.title.clone(),
            description: sample.description.clone(),
            platform_id: sample.platform_id.clone(),
        })
        .collect()
}
