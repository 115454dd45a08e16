use assert_matches::assert_matches;
use regex::Regex;

use kira_sample_reconciler::error::KiraError;
use kira_sample_reconciler::join::{JoinEngine, REPOSITORY_TABLE};
use kira_sample_reconciler::table::{DirTableSource, MemoryTableSource, StudyTableSource, Table};

#[test]
fn join_keeps_only_fully_resolved_samples() {
    let source = DirTableSource::new("tests/fixtures/study");
    let joined = JoinEngine::default().join(&source).unwrap();

    let accessions = joined
        .records
        .iter()
        .map(|r| r.repository_accession.as_str())
        .collect::<Vec<_>>();
    assert_eq!(accessions, vec!["GSM1001", "GSM1002", "GSM1004"]);
    // ES3 has no arm link, ES5 no experiment, ES6 no biosample.
    assert_eq!(joined.stats.unresolved, 3);

    let first = &joined.records[0];
    assert_eq!(first.expsample_id, "ES1");
    assert_eq!(first.biosample_id, "BS1");
    assert_eq!(first.subject_id, "SUB1");
    assert_eq!(first.experiment_id, "EXP1");
    assert_eq!(first.gender.as_deref(), Some("Female"));
    assert_eq!(first.age_min.as_deref(), Some("30"));
    assert_eq!(first.age_unit.as_deref(), Some("Years"));
    assert!(first.series_id.is_none());
    assert!(first.read_files.is_empty());
}

#[test]
fn join_filters_archive_accessions_and_duplicates() {
    let source = DirTableSource::new("tests/fixtures/study");
    let joined = JoinEngine::default().join(&source).unwrap();

    assert!(
        joined
            .records
            .iter()
            .all(|r| r.repository_accession.starts_with("GSM"))
    );
    // SUB1 sits in two arms, so each of its samples joins twice.
    assert_eq!(joined.stats.duplicates, 2);
    assert_eq!(joined.stats.off_pattern, 2);
    let mut accessions = joined
        .records
        .iter()
        .map(|r| r.repository_accession.clone())
        .collect::<Vec<_>>();
    accessions.dedup();
    assert_eq!(accessions.len(), joined.records.len());
}

#[test]
fn empty_repository_table_is_fatal() {
    let source = DirTableSource::new("tests/fixtures/study_empty");
    let err = JoinEngine::default().join(&source).unwrap_err();
    assert_matches!(err, KiraError::NoRepositoryData { table } if table == REPOSITORY_TABLE);
}

#[test]
fn missing_table_is_reported() {
    let source = DirTableSource::new("tests/fixtures/does-not-exist");
    let err = JoinEngine::default().join(&source).unwrap_err();
    assert_matches!(err, KiraError::MissingTable(_));
}

fn minimal_source(repository: Table) -> MemoryTableSource {
    let mut source = MemoryTableSource::new();
    source.insert(repository);
    source.insert(Table::new("experiment", &["EXPERIMENT_ACCESSION"]).with_row(&["EXP1"]));
    source.insert(
        Table::new("expsample", &["EXPSAMPLE_ACCESSION", "EXPERIMENT_ACCESSION"])
            .with_row(&["ES1", "EXP1"]),
    );
    source.insert(
        Table::new(
            "expsample_2_biosample",
            &["EXPSAMPLE_ACCESSION", "BIOSAMPLE_ACCESSION"],
        )
        .with_row(&["ES1", "BS1"]),
    );
    source.insert(
        Table::new("biosample", &["BIOSAMPLE_ACCESSION", "SUBJECT_ACCESSION"])
            .with_row(&["BS1", "SUB1"]),
    );
    source.insert(Table::new("subject", &["SUBJECT_ACCESSION", "GENDER"]).with_row(&["SUB1", ""]));
    source.insert(
        Table::new(
            "arm_2_subject",
            &["SUBJECT_ACCESSION", "MIN_SUBJECT_AGE", "MAX_SUBJECT_AGE", "AGE_UNIT"],
        )
        .with_row(&["SUB1", "", "", ""]),
    );
    source
}

#[test]
fn custom_sample_pattern_and_empty_cells() {
    let repository = Table::new(
        REPOSITORY_TABLE,
        &["EXPSAMPLE_ACCESSION", "REPOSITORY_ACCESSION"],
    )
    .with_row(&["ES1", "SAMN0001"]);
    let source = minimal_source(repository);

    let geo_only = JoinEngine::default().join(&source).unwrap();
    assert!(geo_only.records.is_empty());
    assert_eq!(geo_only.stats.off_pattern, 1);

    let engine = JoinEngine::new(Regex::new(r"^SAMN\d+$").unwrap());
    let joined = engine.join(&source).unwrap();
    assert_eq!(joined.records.len(), 1);
    assert!(joined.records[0].gender.is_none());
    assert!(joined.records[0].age_min.is_none());
}

#[test]
fn missing_column_is_reported() {
    let repository = Table::new(REPOSITORY_TABLE, &["EXPSAMPLE_ACCESSION", "ACCESSION"])
        .with_row(&["ES1", "GSM1"]);
    let source = minimal_source(repository);
    let err = JoinEngine::default().join(&source).unwrap_err();
    assert_matches!(err, KiraError::MissingColumn { column, .. } if column == "REPOSITORY_ACCESSION");
}

#[test]
fn dir_source_reads_tab_delimited_tables() {
    let source = DirTableSource::new("tests/fixtures/study");
    let table = source.read_table("subject").unwrap();
    assert_eq!(table.headers, vec!["SUBJECT_ACCESSION", "GENDER", "SPECIES"]);
    assert_eq!(table.rows.len(), 3);
    assert_eq!(table.column("gender").unwrap(), 1);
}
