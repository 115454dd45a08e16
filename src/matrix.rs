//! Count-matrix normalization: numeric columns only, one identifier column as the row index.

use std::collections::{HashMap, HashSet};
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::Path;

use flate2::read::GzDecoder;
use regex::Regex;
use serde::Serialize;

use crate::error::KiraError;

/// Feature length column emitted by featureCounts-style outputs; never a sample.
pub const LENGTH_COLUMN: &str = "Length";
pub const DEFAULT_GENE_ID_PATTERN: &str = r"^ENS[A-Z]*G\d+(\.\d+)?$";
pub const DEFAULT_SYMBOL_TERMS: [&str; 2] = ["gene", "symbol"];

const MISSING: [&str; 4] = ["NA", "NaN", "nan", "N/A"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawColumn {
    pub name: String,
    pub values: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMatrix {
    pub columns: Vec<RawColumn>,
}

impl RawMatrix {
    pub fn from_columns(columns: Vec<(&str, Vec<&str>)>) -> Self {
        Self {
            columns: columns
                .into_iter()
                .map(|(name, values)| RawColumn {
                    name: name.to_string(),
                    values: values.into_iter().map(str::to_string).collect(),
                })
                .collect(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.columns.first().map(|c| c.values.len()).unwrap_or(0)
    }

    /// Reads a delimited matrix. `.csv` is comma-separated, anything else tab-separated;
    /// a trailing `.gz` is decompressed. A header one cell shorter than the rows gets an
    /// unnamed first column, as written by R's `write.table`.
    pub fn read_path(path: &Path) -> Result<Self, KiraError> {
        let file = File::open(path)
            .map_err(|err| KiraError::Filesystem(format!("open {}: {err}", path.display())))?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();
        let (reader, stem): (Box<dyn Read>, &str) = match name.strip_suffix(".gz") {
            Some(stem) => (Box::new(GzDecoder::new(BufReader::new(file))), stem),
            None => (Box::new(BufReader::new(file)), name.as_str()),
        };
        let delimiter = if stem.ends_with(".csv") { b',' } else { b'\t' };
        Self::read(reader, delimiter)
    }

    pub fn read<R: Read>(reader: R, delimiter: u8) -> Result<Self, KiraError> {
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(delimiter)
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);
        let mut records = reader.records();
        let mut header = match records.next() {
            Some(record) => record
                .map_err(|err| KiraError::MatrixParse(err.to_string()))?
                .iter()
                .map(|h| h.trim().to_string())
                .collect::<Vec<_>>(),
            None => return Ok(Self::default()),
        };
        let mut rows = Vec::new();
        for record in records {
            let record = record.map_err(|err| KiraError::MatrixParse(err.to_string()))?;
            rows.push(record.iter().map(str::to_string).collect::<Vec<_>>());
        }
        if let Some(first) = rows.first() {
            if first.len() == header.len() + 1 {
                header.insert(0, String::new());
            }
        }
        let mut columns = header
            .into_iter()
            .map(|name| RawColumn {
                name,
                values: Vec::with_capacity(rows.len()),
            })
            .collect::<Vec<_>>();
        for (line, row) in rows.into_iter().enumerate() {
            if row.len() != columns.len() {
                return Err(KiraError::MatrixParse(format!(
                    "row {} has {} fields, expected {}",
                    line + 2,
                    row.len(),
                    columns.len()
                )));
            }
            for (column, value) in columns.iter_mut().zip(row) {
                column.values.push(value);
            }
        }
        Ok(Self { columns })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NumericColumn {
    pub name: String,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CanonicalMatrix {
    pub index_name: Option<String>,
    /// Row labels; `None` when the input had no identifier column.
    pub index: Option<Vec<String>>,
    pub columns: Vec<NumericColumn>,
}

impl CanonicalMatrix {
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    pub fn n_rows(&self) -> usize {
        self.columns
            .first()
            .map(|c| c.values.len())
            .or_else(|| self.index.as_ref().map(Vec::len))
            .unwrap_or(0)
    }

    pub fn write_tsv<W: Write>(&self, writer: W) -> Result<(), KiraError> {
        let write_err = |err: csv::Error| KiraError::Filesystem(err.to_string());
        let mut writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .from_writer(writer);
        let mut header = Vec::with_capacity(self.columns.len() + 1);
        if self.index.is_some() {
            header.push(self.index_name.clone().unwrap_or_default());
        }
        header.extend(self.columns.iter().map(|c| c.name.clone()));
        writer.write_record(&header).map_err(write_err)?;
        for row in 0..self.n_rows() {
            let mut record = Vec::with_capacity(header.len());
            if let Some(index) = &self.index {
                record.push(index[row].clone());
            }
            for column in &self.columns {
                let value = column.values[row];
                record.push(if value.is_nan() {
                    "NA".to_string()
                } else {
                    value.to_string()
                });
            }
            writer.write_record(&record).map_err(write_err)?;
        }
        writer
            .flush()
            .map_err(|err| KiraError::Filesystem(err.to_string()))
    }
}

/// Which rule promoted the identifier column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexRule {
    None,
    SoleText,
    GeneIdValues,
    SymbolName,
}

pub struct MatrixNormalizer {
    gene_id_pattern: Regex,
    symbol_terms: Vec<String>,
}

impl Default for MatrixNormalizer {
    fn default() -> Self {
        Self {
            gene_id_pattern: Regex::new(DEFAULT_GENE_ID_PATTERN).expect("valid gene id pattern"),
            symbol_terms: DEFAULT_SYMBOL_TERMS.iter().map(|t| t.to_string()).collect(),
        }
    }
}

impl MatrixNormalizer {
    pub fn new(gene_id_pattern: Regex, symbol_terms: Vec<String>) -> Self {
        Self {
            gene_id_pattern,
            symbol_terms: symbol_terms.into_iter().map(|t| t.to_lowercase()).collect(),
        }
    }

    pub fn normalize(&self, raw: RawMatrix) -> Result<CanonicalMatrix, KiraError> {
        self.normalize_with_rule(raw).map(|(matrix, _)| matrix)
    }

    pub fn normalize_with_rule(
        &self,
        raw: RawMatrix,
    ) -> Result<(CanonicalMatrix, IndexRule), KiraError> {
        let mut numeric = Vec::new();
        let mut text = Vec::new();
        for column in raw.columns {
            match parse_numeric(&column.values) {
                Some(values) => {
                    if column.name == LENGTH_COLUMN {
                        tracing::debug!("dropping Length column");
                        continue;
                    }
                    numeric.push(NumericColumn {
                        name: column.name,
                        values,
                    });
                }
                None => text.push(column),
            }
        }

        let (index, rule) = match text.len() {
            0 => (None, IndexRule::None),
            1 => (text.pop(), IndexRule::SoleText),
            _ => {
                if let Some(pos) = text.iter().position(|c| self.holds_gene_ids(c)) {
                    (Some(text.swap_remove(pos)), IndexRule::GeneIdValues)
                } else if let Some(pos) = text.iter().position(|c| self.is_symbol_name(&c.name)) {
                    let mut column = text.swap_remove(pos);
                    column.values = make_unique(&column.values);
                    (Some(column), IndexRule::SymbolName)
                } else {
                    return Err(KiraError::UnresolvableIdentifier {
                        columns: text.into_iter().map(|c| c.name).collect(),
                    });
                }
            }
        };
        if !text.is_empty() {
            tracing::debug!(
                dropped = text.len(),
                "dropping non-numeric columns besides the identifier"
            );
        }

        let matrix = CanonicalMatrix {
            index_name: index.as_ref().map(|c| c.name.clone()),
            index: index.map(|c| c.values),
            columns: numeric,
        };
        Ok((matrix, rule))
    }

    fn holds_gene_ids(&self, column: &RawColumn) -> bool {
        let mut present = column
            .values
            .iter()
            .map(|v| v.trim())
            .filter(|v| !is_missing(v))
            .peekable();
        present.peek().is_some() && present.all(|v| self.gene_id_pattern.is_match(v))
    }

    fn is_symbol_name(&self, name: &str) -> bool {
        let name = name.to_lowercase();
        self.symbol_terms.iter().any(|term| name.contains(term.as_str()))
    }
}

fn is_missing(value: &str) -> bool {
    value.is_empty() || MISSING.contains(&value)
}

/// `Some` when every non-missing value parses as a number.
fn parse_numeric(values: &[String]) -> Option<Vec<f64>> {
    values
        .iter()
        .map(|v| {
            let v = v.trim();
            if is_missing(v) {
                Some(f64::NAN)
            } else {
                v.parse::<f64>().ok()
            }
        })
        .collect()
}

/// Suffixes repeats with `.1`, `.2`, ... skipping names already taken.
pub fn make_unique(values: &[String]) -> Vec<String> {
    let mut taken = values.iter().cloned().collect::<HashSet<_>>();
    let mut first_seen = HashSet::new();
    let mut counters: HashMap<&str, usize> = HashMap::new();
    let mut out = Vec::with_capacity(values.len());
    for value in values {
        if first_seen.insert(value.as_str()) {
            out.push(value.clone());
            continue;
        }
        let counter = counters.entry(value.as_str()).or_insert(0);
        let candidate = loop {
            *counter += 1;
            let candidate = format!("{value}.{counter}");
            if !taken.contains(&candidate) {
                break candidate;
            }
        };
        taken.insert(candidate.clone());
        out.push(candidate);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn make_unique_suffixes_repeats() {
        let out = make_unique(&strings(&["A", "B", "A", "A", "A.1"]));
        assert_eq!(out, strings(&["A", "B", "A.2", "A.3", "A.1"]));
    }

    #[test]
    fn numeric_detection_allows_missing() {
        assert!(parse_numeric(&strings(&["1", "NA", "", "2.5"])).is_some());
        assert!(parse_numeric(&strings(&["1", "x"])).is_none());
    }

    #[test]
    fn read_headerless_rowname_column() {
        let text = "s1\ts2\nENSG01\t1\t2\nENSG02\t3\t4\n";
        let raw = RawMatrix::read(text.as_bytes(), b'\t').unwrap();
        assert_eq!(raw.columns.len(), 3);
        assert_eq!(raw.columns[0].name, "");
        assert_eq!(raw.columns[0].values, strings(&["ENSG01", "ENSG02"]));
    }
}
