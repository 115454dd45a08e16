use std::io::{self, Write};

use camino::Utf8Path;
use serde::Serialize;
use tempfile::NamedTempFile;

use crate::app::{BatchReport, ProgressEvent, ProgressSink};
use crate::domain::{MAX_READ_FILES, SampleRecord};
use crate::error::KiraError;

/// Column order of the sample table handed to download orchestration.
pub const SAMPLE_COLUMNS: [&str; 16] = [
    "REPOSITORY_ACCESSION",
    "EXPSAMPLE_ACCESSION",
    "SUBJECT_ACCESSION",
    "BIOSAMPLE_ACCESSION",
    "EXPERIMENT_ACCESSION",
    "GENDER",
    "MIN_SUBJECT_AGE",
    "MAX_SUBJECT_AGE",
    "AGE_UNIT",
    "series_id",
    "title",
    "description",
    "platform_id",
    "R1_file",
    "R2_file",
    "R3_file",
];

#[derive(Debug, Clone, Copy)]
pub enum OutputMode {
    Text,
    Json,
}

pub fn write_samples<W: Write>(records: &[SampleRecord], writer: W) -> Result<(), KiraError> {
    let write_err = |err: csv::Error| KiraError::Filesystem(err.to_string());
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .from_writer(writer);
    writer.write_record(SAMPLE_COLUMNS).map_err(write_err)?;
    for record in records {
        let opt = |value: &Option<String>| value.clone().unwrap_or_default();
        let mut row = vec![
            record.repository_accession.clone(),
            record.expsample_id.clone(),
            record.subject_id.clone(),
            record.biosample_id.clone(),
            record.experiment_id.clone(),
            opt(&record.gender),
            opt(&record.age_min),
            opt(&record.age_max),
            opt(&record.age_unit),
            opt(&record.series_id),
            opt(&record.title),
            opt(&record.description),
            opt(&record.platform_id),
        ];
        for slot in 0..MAX_READ_FILES {
            row.push(record.read_files.slot(slot).unwrap_or_default().to_string());
        }
        writer.write_record(&row).map_err(write_err)?;
    }
    writer
        .flush()
        .map_err(|err| KiraError::Filesystem(err.to_string()))
}

/// Writes through a temp file in the destination directory, then renames into place.
pub fn write_atomic<F>(path: &Utf8Path, write: F) -> Result<(), KiraError>
where
    F: FnOnce(&mut NamedTempFile) -> Result<(), KiraError>,
{
    let parent = path
        .parent()
        .filter(|p| !p.as_str().is_empty())
        .unwrap_or(Utf8Path::new("."));
    std::fs::create_dir_all(parent.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    let mut file = NamedTempFile::new_in(parent.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    write(&mut file)?;
    file.persist(path.as_std_path())
        .map_err(|err| KiraError::Filesystem(err.to_string()))?;
    Ok(())
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &BatchReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

/// Forwards progress events to the log.
pub struct LogSink;

impl ProgressSink for LogSink {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => tracing::info!(elapsed_ms = elapsed.as_millis() as u64, "{}", event.message),
            None => tracing::info!("{}", event.message),
        }
    }
}

pub struct TextOutput;

impl TextOutput {
    pub fn print_report(report: &BatchReport, output: &Utf8Path) {
        println!("samples written: {} -> {output}", report.records);
        println!(
            "series processed: {} ({} superseries dropped)",
            report.processed_series.len(),
            report.superseries().count()
        );
        println!("runs mapped: {}", report.runs);
        if report.failures.is_empty() {
            println!("failures: 0");
            return;
        }
        println!("failures: {}", report.failures.len());
        for failure in &report.failures {
            println!("  [{}] {}: {}", failure.stage, failure.item, failure.message);
        }
    }
}
