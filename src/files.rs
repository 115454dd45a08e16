use std::collections::{BTreeSet, HashMap};
use std::sync::Mutex;

use rayon::prelude::*;
use serde::Serialize;

use crate::domain::{MAX_READ_FILES, ReadFiles, RunAccession, RunId, SampleAccession, SeriesAccession};
use crate::error::KiraError;
use crate::merge::FileAnnotation;
use crate::report::{ItemFailure, Stage};
use crate::retry::RetryPolicy;
use crate::series::{SampleMetadataLookup, SeriesSample};

/// Upper bound on concurrent archive lookups.
pub const MAX_CONCURRENCY: usize = 4;

/// Separates per-run names inside one `R{n}_file` slot when a sample has several runs.
pub const RUN_SEPARATOR: char = ';';

pub trait SequenceArchiveLookup: Send + Sync {
    /// Runs linked to a sample; empty when the sample has no released archive record.
    fn get_runs_for_sample(&self, accession: &SampleAccession) -> Result<Vec<RunId>, KiraError>;
    /// Declared reads per spot for a run.
    fn get_read_count(&self, run: &RunId) -> Result<u32, KiraError>;
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SeriesFiles {
    /// Every sample the series lists, in or out of scope.
    #[serde(skip)]
    pub samples: Vec<SeriesSample>,
    #[serde(skip)]
    pub annotations: Vec<FileAnnotation>,
    pub runs: Vec<RunAccession>,
    pub failures: Vec<ItemFailure>,
}

#[derive(Debug, Default)]
struct SampleFiles {
    annotation: Option<FileAnnotation>,
    runs: Vec<RunAccession>,
    failures: Vec<ItemFailure>,
}

/// Maps samples to expected read file names. Each sample is looked up in the archive at
/// most once per mapper; a sample seen again in a later series reuses its annotation and
/// contributes no runs or failures a second time.
pub struct FileMapper<'a, S: SequenceArchiveLookup> {
    archive: &'a S,
    retry: RetryPolicy,
    concurrency: usize,
    scope: Option<BTreeSet<SampleAccession>>,
    mapped: Mutex<HashMap<SampleAccession, Option<FileAnnotation>>>,
}

impl<'a, S: SequenceArchiveLookup> FileMapper<'a, S> {
    pub fn new(archive: &'a S, retry: RetryPolicy, concurrency: usize) -> Self {
        Self {
            archive,
            retry,
            concurrency: concurrency.clamp(1, MAX_CONCURRENCY),
            scope: None,
            mapped: Mutex::new(HashMap::new()),
        }
    }

    /// Limits `map_files` to these samples; other series members are not looked up.
    pub fn restrict_to(mut self, samples: BTreeSet<SampleAccession>) -> Self {
        self.scope = Some(samples);
        self
    }

    /// Looks up the samples of `series` and maps each in-scope one to its expected read files.
    pub fn map_files<M: SampleMetadataLookup>(
        &self,
        metadata: &M,
        series: &SeriesAccession,
    ) -> Result<SeriesFiles, KiraError> {
        let samples = self
            .retry
            .run("series-samples", || metadata.get_series_samples(series))?;
        let accessions = samples
            .iter()
            .map(|sample| sample.accession.clone())
            .filter(|accession| {
                self.scope
                    .as_ref()
                    .is_none_or(|scope| scope.contains(accession))
            })
            .collect::<Vec<_>>();
        let mut output = self.map_samples(series, &accessions)?;
        output.samples = samples;
        Ok(output)
    }

    pub fn map_samples(
        &self,
        series: &SeriesAccession,
        samples: &[SampleAccession],
    ) -> Result<SeriesFiles, KiraError> {
        let per_sample = if self.concurrency == 1 {
            samples.iter().map(|s| self.map_cached(s)).collect::<Vec<_>>()
        } else {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(self.concurrency)
                .build()
                .map_err(|err| KiraError::Filesystem(format!("worker pool: {err}")))?;
            pool.install(|| samples.par_iter().map(|s| self.map_cached(s)).collect())
        };

        let mut output = SeriesFiles::default();
        for sample in per_sample {
            output.annotations.extend(sample.annotation);
            output.runs.extend(sample.runs);
            output.failures.extend(sample.failures);
        }
        tracing::info!(
            series = %series,
            samples = samples.len(),
            mapped = output.annotations.len(),
            runs = output.runs.len(),
            "mapped read files"
        );
        Ok(output)
    }

    fn map_cached(&self, sample: &SampleAccession) -> SampleFiles {
        let cached = self
            .mapped
            .lock()
            .ok()
            .and_then(|mapped| mapped.get(sample).cloned());
        if let Some(annotation) = cached {
            tracing::debug!(sample = %sample, "read files already mapped");
            return SampleFiles {
                annotation,
                ..SampleFiles::default()
            };
        }
        let files = self.map_sample(sample);
        if let Ok(mut mapped) = self.mapped.lock() {
            mapped.insert(sample.clone(), files.annotation.clone());
        }
        files
    }

    fn map_sample(&self, sample: &SampleAccession) -> SampleFiles {
        let mut out = SampleFiles::default();
        let run_ids = match self
            .retry
            .run("runs-for-sample", || self.archive.get_runs_for_sample(sample))
        {
            Ok(runs) => runs,
            Err(err) => {
                out.failures.push(ItemFailure::new(Stage::RunLookup, sample, &err));
                return out;
            }
        };
        if run_ids.is_empty() {
            tracing::debug!(sample = %sample, "no released archive record");
            return out;
        }

        for run_id in run_ids {
            let count = match self
                .retry
                .run("read-count", || self.archive.get_read_count(&run_id))
            {
                Ok(count) => count,
                Err(err) => {
                    out.failures.push(ItemFailure::new(Stage::ReadCount, &run_id, &err));
                    continue;
                }
            };
            match RunAccession::new(run_id.clone(), sample.clone(), count) {
                Ok(run) => out.runs.push(run),
                Err(err) => out.failures.push(ItemFailure::new(Stage::ReadCount, &run_id, &err)),
            }
        }

        if !out.runs.is_empty() {
            out.annotation = Some(FileAnnotation {
                repository_accession: sample.to_string(),
                read_files: read_files(&out.runs),
            });
        }
        out
    }
}

/// Slot `n` holds `{run_id}_{n+1}` of every run with more than `n` reads, in run order.
pub fn read_files(runs: &[RunAccession]) -> ReadFiles {
    let mut files = ReadFiles::default();
    for (slot, value) in files.0.iter_mut().enumerate().take(MAX_READ_FILES) {
        let names = runs
            .iter()
            .filter_map(|run| run.inferred_filenames.get(slot).map(String::as_str))
            .collect::<Vec<_>>();
        if !names.is_empty() {
            *value = Some(names.join(&RUN_SEPARATOR.to_string()));
        }
    }
    files
}

/// Recovers every run accession named in one `R{n}_file` slot value.
pub fn run_ids_from_slot(value: &str) -> Vec<RunId> {
    value
        .split(RUN_SEPARATOR)
        .filter(|part| !part.trim().is_empty())
        .filter_map(run_id_from_filename)
        .collect()
}

/// Recovers the run accession from a `{run_id}_{n}` file name.
pub fn run_id_from_filename(filename: &str) -> Option<RunId> {
    let (run, read) = filename.trim().rsplit_once('_')?;
    let read: usize = read.parse().ok()?;
    if !(1..=MAX_READ_FILES).contains(&read) {
        return None;
    }
    run.parse().ok()
}
