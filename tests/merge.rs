use kira_sample_reconciler::domain::{ReadFiles, SampleRecord};
use kira_sample_reconciler::merge::{
    FileAnnotation, MergeStrategy, SampleTable, SeriesAnnotation,
};

fn record(accession: &str) -> SampleRecord {
    SampleRecord {
        repository_accession: accession.to_string(),
        subject_id: format!("SUB-{accession}"),
        ..SampleRecord::default()
    }
}

fn files(accession: &str, names: [Option<&str>; 3]) -> FileAnnotation {
    FileAnnotation {
        repository_accession: accession.to_string(),
        read_files: ReadFiles(names.map(|n| n.map(str::to_string))),
    }
}

fn slots(table: &SampleTable, accession: &str) -> Vec<Option<String>> {
    table.get(accession).unwrap().read_files.0.to_vec()
}

#[test]
fn later_series_patch_earlier_results() {
    let mut table = SampleTable::from_records(vec![record("GSM1"), record("GSM2")]);
    let s1 = vec![files("GSM1", [Some("A"), Some("B"), None])];
    let s2 = vec![files("GSM1", [Some("C"), Some("D"), None])];

    let stats = table.fold(vec![s1, s2]);

    assert_eq!(stats.len(), 2);
    assert_eq!(table.len(), 2);
    assert_eq!(
        slots(&table, "GSM1"),
        vec![Some("C".to_string()), Some("D".to_string()), None]
    );
    assert_eq!(
        table
            .records()
            .iter()
            .filter(|r| r.repository_accession == "GSM1")
            .count(),
        1
    );
}

#[test]
fn patch_fills_without_clearing() {
    let mut table = SampleTable::from_records(vec![record("GSM1"), record("GSM2")]);
    table.merge(&[files("GSM1", [Some("A"), Some("B"), Some("X")])], MergeStrategy::LeftJoin);
    let stats = table.merge(
        &[
            files("GSM1", [Some("C"), None, None]),
            files("GSM2", [Some("E"), None, None]),
            files("GSM9", [Some("Z"), None, None]),
        ],
        MergeStrategy::Patch,
    );

    assert_eq!(stats.matched, 2);
    assert_eq!(stats.unmatched_updates, 1);
    assert_eq!(
        slots(&table, "GSM1"),
        vec![Some("C".to_string()), Some("B".to_string()), Some("X".to_string())]
    );
    assert_eq!(slots(&table, "GSM2")[0].as_deref(), Some("E"));
    assert!(table.get("GSM9").is_none());
}

#[test]
fn left_join_keeps_every_record_and_clears_unmatched() {
    let mut table = SampleTable::from_records(vec![record("GSM1"), record("GSM2")]);
    table.merge(
        &[SeriesAnnotation {
            repository_accession: "GSM2".to_string(),
            series_id: Some("GSE5".to_string()),
            title: Some("old".to_string()),
            ..SeriesAnnotation::default()
        }],
        MergeStrategy::Patch,
    );

    let stats = table.merge(
        &[SeriesAnnotation {
            repository_accession: "GSM1".to_string(),
            series_id: Some("GSE1".to_string()),
            title: Some("donor 1".to_string()),
            description: None,
            platform_id: Some("GPL1".to_string()),
        }],
        MergeStrategy::LeftJoin,
    );

    assert_eq!(stats.matched, 1);
    assert_eq!(table.len(), 2);
    let first = table.get("GSM1").unwrap();
    assert_eq!(first.series_id.as_deref(), Some("GSE1"));
    assert_eq!(first.platform_id.as_deref(), Some("GPL1"));
    assert_eq!(first.subject_id, "SUB-GSM1");
    let second = table.get("GSM2").unwrap();
    assert!(second.series_id.is_none());
    assert!(second.title.is_none());
}

#[test]
fn duplicate_updates_and_records_are_dropped() {
    let mut table =
        SampleTable::from_records(vec![record("GSM1"), record("GSM1"), record("GSM2")]);
    assert_eq!(table.len(), 2);

    let stats = table.merge(
        &[
            files("GSM1", [Some("A"), None, None]),
            files("GSM1", [Some("B"), None, None]),
        ],
        MergeStrategy::LeftJoin,
    );
    assert_eq!(stats.duplicate_updates, 1);
    assert_eq!(slots(&table, "GSM1")[0].as_deref(), Some("A"));
}
