use std::collections::BTreeSet;
use std::path::Path;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::ResolvedConfig;
use crate::domain::{SampleAccession, SeriesRecord};
use crate::error::KiraError;
use crate::files::{FileMapper, SequenceArchiveLookup};
use crate::join::{JoinEngine, JoinStats};
use crate::matrix::{CanonicalMatrix, IndexRule, MatrixNormalizer, RawMatrix};
use crate::merge::{FileAnnotation, MergeStats, SampleTable, SeriesAnnotation};
use crate::report::{ItemFailure, Stage};
use crate::series::{SampleMetadataLookup, SeriesDeduplicator, series_annotations};
use crate::table::StudyTableSource;

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchReport {
    pub generated_at: String,
    pub records: usize,
    pub join: JoinStats,
    pub series: Vec<SeriesRecord>,
    pub processed_series: Vec<String>,
    pub runs: usize,
    pub series_merges: Vec<MergeStats>,
    pub file_merges: Vec<MergeStats>,
    pub failures: Vec<ItemFailure>,
}

impl BatchReport {
    pub fn superseries(&self) -> impl Iterator<Item = &SeriesRecord> {
        self.series.iter().filter(|s| s.is_superseries)
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub table: SampleTable,
    pub report: BatchReport,
}

pub struct App<M: SampleMetadataLookup, S: SequenceArchiveLookup> {
    metadata: M,
    archive: S,
    config: ResolvedConfig,
}

impl<M: SampleMetadataLookup, S: SequenceArchiveLookup> App<M, S> {
    pub fn new(metadata: M, archive: S, config: ResolvedConfig) -> Self {
        Self {
            metadata,
            archive,
            config,
        }
    }

    pub fn metadata(&self) -> &M {
        &self.metadata
    }

    pub fn archive(&self) -> &S {
        &self.archive
    }

    /// Join, series resolution, then file mapping. Stages run strictly in order; only
    /// per-sample archive lookups inside one series run concurrently.
    pub fn reconcile(
        &self,
        source: &dyn StudyTableSource,
        sink: &dyn ProgressSink,
    ) -> Result<Reconciliation, KiraError> {
        let start = Instant::now();
        sink.event(ProgressEvent {
            message: "phase=Join; joining study tables".to_string(),
            elapsed: None,
        });
        let joined = JoinEngine::new(self.config.sample_pattern.clone()).join(source)?;
        let mut table = SampleTable::from_records(joined.records);
        let mut failures = Vec::new();

        let mut accessions = BTreeSet::new();
        for raw in table.accessions() {
            match raw.parse::<SampleAccession>() {
                Ok(accession) => {
                    accessions.insert(accession);
                }
                Err(err) => failures.push(ItemFailure::new(Stage::SampleAccession, raw, &err)),
            }
        }

        sink.event(ProgressEvent {
            message: format!("phase=Series; resolving series for {} samples", accessions.len()),
            elapsed: Some(start.elapsed()),
        });
        let dedup = SeriesDeduplicator::new(&self.metadata, self.config.retry);
        let resolution = dedup.resolve_series(&accessions);
        failures.extend(resolution.failures);
        let filter = dedup.filter_superseries(&resolution.series);
        failures.extend(filter.failures);

        let mapper = FileMapper::new(&self.archive, self.config.retry, self.config.concurrency)
            .restrict_to(accessions.clone());
        let mut series_batches: Vec<Vec<SeriesAnnotation>> = Vec::new();
        let mut file_batches: Vec<Vec<FileAnnotation>> = Vec::new();
        let mut processed_series = Vec::new();
        let mut runs = 0;
        for series in &filter.kept {
            sink.event(ProgressEvent {
                message: format!("phase=Files; mapping read files for {series}"),
                elapsed: Some(start.elapsed()),
            });
            let files = match mapper.map_files(&self.metadata, series) {
                Ok(files) => files,
                Err(err @ KiraError::Filesystem(_)) => return Err(err),
                Err(err) => {
                    failures.push(ItemFailure::new(Stage::SeriesSamples, series, &err));
                    continue;
                }
            };
            runs += files.runs.len();
            failures.extend(files.failures);
            series_batches.push(series_annotations(series, &files.samples));
            file_batches.push(files.annotations);
            processed_series.push(series.to_string());
        }

        sink.event(ProgressEvent {
            message: "phase=Merge; folding series results".to_string(),
            elapsed: Some(start.elapsed()),
        });
        let series_merges = table.fold(series_batches);
        let file_merges = table.fold(file_batches);

        if !failures.is_empty() {
            tracing::warn!(count = failures.len(), "batch finished with per-item failures");
        }
        tracing::info!(
            records = table.len(),
            series = processed_series.len(),
            runs,
            "reconciliation finished"
        );

        let report = BatchReport {
            generated_at: chrono::Utc::now().to_rfc3339(),
            records: table.len(),
            join: joined.stats,
            series: filter.records,
            processed_series,
            runs,
            series_merges,
            file_merges,
            failures,
        };
        Ok(Reconciliation { table, report })
    }
}

/// Reads and normalizes one downloaded count matrix.
pub fn normalize_matrix_file(
    path: &Path,
    config: &ResolvedConfig,
) -> Result<(CanonicalMatrix, IndexRule), KiraError> {
    let raw = RawMatrix::read_path(path)?;
    let normalizer =
        MatrixNormalizer::new(config.gene_id_pattern.clone(), config.symbol_terms.clone());
    let (matrix, rule) = normalizer.normalize_with_rule(raw)?;
    tracing::info!(
        path = %path.display(),
        rows = matrix.n_rows(),
        columns = matrix.columns.len(),
        rule = ?rule,
        "normalized matrix"
    );
    Ok((matrix, rule))
}
