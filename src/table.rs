use std::collections::BTreeMap;
use std::fs::File;

use camino::Utf8PathBuf;

use crate::error::KiraError;

/// A named table of string cells. Empty cells read back as `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Table {
    pub name: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(name: &str, headers: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            headers: headers.iter().map(|h| h.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    pub fn with_row(mut self, row: &[&str]) -> Self {
        self.rows.push(row.iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column(&self, name: &str) -> Result<usize, KiraError> {
        self.headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(name))
            .ok_or_else(|| KiraError::MissingColumn {
                table: self.name.clone(),
                column: name.to_string(),
            })
    }

    pub fn cell<'a>(&self, row: &'a [String], index: usize) -> Option<&'a str> {
        row.get(index)
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
    }
}

pub trait StudyTableSource {
    fn read_table(&self, table_name: &str) -> Result<Table, KiraError>;
}

/// Reads `<dir>/<table_name>.txt` tab-delimited study exports.
#[derive(Debug, Clone)]
pub struct DirTableSource {
    root: Utf8PathBuf,
}

impl DirTableSource {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn table_path(&self, table_name: &str) -> Utf8PathBuf {
        self.root.join(format!("{table_name}.txt"))
    }
}

impl StudyTableSource for DirTableSource {
    fn read_table(&self, table_name: &str) -> Result<Table, KiraError> {
        let path = self.table_path(table_name);
        if !path.as_std_path().exists() {
            return Err(KiraError::MissingTable(path.to_string()));
        }
        let file = File::open(path.as_std_path())
            .map_err(|err| KiraError::Filesystem(format!("open {path}: {err}")))?;
        let parse_err = |err: csv::Error| KiraError::TableParse {
            table: table_name.to_string(),
            message: err.to_string(),
        };
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .quoting(false)
            .flexible(true)
            .from_reader(file);
        let headers = reader
            .headers()
            .map_err(parse_err)?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        let mut rows = Vec::new();
        for record in reader.records() {
            let record = record.map_err(parse_err)?;
            rows.push(record.iter().map(|v| v.to_string()).collect());
        }
        tracing::debug!(table = table_name, rows = rows.len(), "read study table");
        Ok(Table {
            name: table_name.to_string(),
            headers,
            rows,
        })
    }
}

/// In-memory table set, used when tables are already loaded.
#[derive(Debug, Clone, Default)]
pub struct MemoryTableSource {
    tables: BTreeMap<String, Table>,
}

impl MemoryTableSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }
}

impl StudyTableSource for MemoryTableSource {
    fn read_table(&self, table_name: &str) -> Result<Table, KiraError> {
        self.tables
            .get(table_name)
            .cloned()
            .ok_or_else(|| KiraError::MissingTable(table_name.to_string()))
    }
}
