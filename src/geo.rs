use crate::domain::{SampleAccession, SeriesAccession};
use crate::error::KiraError;
use crate::ncbi::{GEO_TEXT_BASE, NcbiHttp};
use crate::series::{SUPERSERIES_MARKER, SampleMetadataLookup, SeriesRelation, SeriesSample};

/// One `^ENTITY = accession` block of a GEO text record with its `!Key = value` lines.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GeoRecord {
    pub entity: String,
    pub accession: String,
    pub fields: Vec<(String, String)>,
}

impl GeoRecord {
    pub fn values<'a>(&'a self, key: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.fields
            .iter()
            .filter(move |(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn first(&self, key: &str) -> Option<String> {
        self.values(key).next().map(str::to_string)
    }

    /// Repeated lines joined with a space.
    pub fn joined(&self, key: &str) -> Option<String> {
        let values = self.values(key).collect::<Vec<_>>();
        (!values.is_empty()).then(|| values.join(" "))
    }
}

pub fn parse_records(text: &str) -> Vec<GeoRecord> {
    let mut records = Vec::new();
    let mut current: Option<GeoRecord> = None;
    for line in text.lines() {
        if let Some(rest) = line.strip_prefix('^') {
            if let Some(record) = current.take() {
                records.push(record);
            }
            let (entity, accession) = rest.split_once('=').unwrap_or((rest, ""));
            current = Some(GeoRecord {
                entity: entity.trim().to_uppercase(),
                accession: accession.trim().to_string(),
                fields: Vec::new(),
            });
        } else if let Some(rest) = line.strip_prefix('!') {
            let Some(record) = current.as_mut() else {
                continue;
            };
            if let Some((key, value)) = rest.split_once('=') {
                let value = value.trim();
                if !value.is_empty() {
                    record.fields.push((key.trim().to_string(), value.to_string()));
                }
            }
        }
    }
    records.extend(current);
    records
}

pub fn parse_sample_series(text: &str) -> Vec<SeriesAccession> {
    let mut series = parse_records(text)
        .iter()
        .filter(|record| record.entity == "SAMPLE")
        .flat_map(|record| {
            record
                .values("Sample_series_id")
                .filter_map(|value| value.parse().ok())
                .collect::<Vec<SeriesAccession>>()
        })
        .collect::<Vec<_>>();
    series.sort();
    series.dedup();
    series
}

/// Prefers a relation line carrying the superseries marker, else the first relation line.
pub fn parse_series_relation(text: &str) -> SeriesRelation {
    let records = parse_records(text);
    let Some(series) = records.iter().find(|record| record.entity == "SERIES") else {
        return SeriesRelation::default();
    };
    let relation_text = series
        .values("Series_relation")
        .find(|value| value.starts_with(SUPERSERIES_MARKER))
        .or_else(|| series.values("Series_relation").next())
        .map(str::to_string);
    SeriesRelation {
        relation_text,
        overall_design: series.joined("Series_overall_design"),
    }
}

pub fn parse_series_samples(text: &str) -> Vec<SeriesSample> {
    parse_records(text)
        .into_iter()
        .filter(|record| record.entity == "SAMPLE")
        .filter_map(|record| {
            let accession = record.accession.parse().ok()?;
            Some(SeriesSample {
                accession,
                title: record.first("Sample_title"),
                description: record.joined("Sample_description"),
                platform_id: record.first("Sample_platform_id"),
            })
        })
        .collect()
}

#[derive(Clone)]
pub struct GeoHttpClient {
    http: NcbiHttp,
}

impl GeoHttpClient {
    pub fn new(http: NcbiHttp) -> Self {
        Self { http }
    }

    fn fetch_text(&self, acc: &str, target: &str) -> Result<String, KiraError> {
        self.http
            .get_text(
                GEO_TEXT_BASE,
                &[("acc", acc), ("targ", target), ("form", "text"), ("view", "quick")],
            )
            .map_err(|err| match err {
                KiraError::NcbiStatus { status, message } => KiraError::GeoStatus { status, message },
                KiraError::NcbiHttp(message) => KiraError::GeoHttp(message),
                other => other,
            })
    }
}

impl SampleMetadataLookup for GeoHttpClient {
    fn get_series_for_sample(
        &self,
        accession: &SampleAccession,
    ) -> Result<Vec<SeriesAccession>, KiraError> {
        let text = self.fetch_text(accession.as_str(), "self")?;
        Ok(parse_sample_series(&text))
    }

    fn get_series_relation(&self, series: &SeriesAccession) -> Result<SeriesRelation, KiraError> {
        let text = self.fetch_text(series.as_str(), "self")?;
        Ok(parse_series_relation(&text))
    }

    fn get_series_samples(&self, series: &SeriesAccession) -> Result<Vec<SeriesSample>, KiraError> {
        let text = self.fetch_text(series.as_str(), "gsm")?;
        Ok(parse_series_samples(&text))
    }
}
