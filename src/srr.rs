use regex::Regex;
use serde_json::Value;

use crate::domain::{RunId, SampleAccession};
use crate::error::KiraError;
use crate::files::SequenceArchiveLookup;
use crate::ncbi::{EUTILS_BASE, NcbiHttp};

/// SRA lookups over E-utilities: runs via esearch + esummary, read counts from the
/// `nreads` attribute of the run's `Statistics` element.
#[derive(Clone)]
pub struct SraHttpClient {
    http: NcbiHttp,
}

impl SraHttpClient {
    pub fn new(http: NcbiHttp) -> Self {
        Self { http }
    }
}

impl SequenceArchiveLookup for SraHttpClient {
    fn get_runs_for_sample(&self, accession: &SampleAccession) -> Result<Vec<RunId>, KiraError> {
        let ids = self.http.esearch_ids("sra", accession.as_str())?;
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let id_list = ids.join(",");
        let payload = self.http.get_json(
            &format!("{EUTILS_BASE}/esummary.fcgi"),
            &[("db", "sra"), ("id", id_list.as_str()), ("retmode", "json")],
        )?;
        Ok(esummary_runs(&payload))
    }

    fn get_read_count(&self, run: &RunId) -> Result<u32, KiraError> {
        let ids = self
            .http
            .esearch_ids("sra", &format!("{}[Accession]", run.as_str()))?;
        let Some(uid) = ids.first() else {
            return Err(KiraError::UpstreamParse(format!("no SRA record for {run}")));
        };
        let xml = self.http.get_text(
            &format!("{EUTILS_BASE}/efetch.fcgi"),
            &[("db", "sra"), ("id", uid.as_str()), ("retmode", "xml")],
        )?;
        parse_read_count(&xml, run)
    }
}

/// Run accessions embedded in the `runs` XML fragment of each esummary result.
pub fn esummary_runs(payload: &Value) -> Vec<RunId> {
    let run_re = Regex::new(r#"acc="([SED]RR\d+)""#).unwrap();
    let mut runs = Vec::new();
    if let Some(uids) = payload["result"]["uids"].as_array() {
        for uid in uids.iter().filter_map(Value::as_str) {
            if let Some(runs_xml) = payload["result"][uid]["runs"].as_str() {
                for cap in run_re.captures_iter(runs_xml) {
                    if let Some(run) = cap.get(1).and_then(|m| m.as_str().parse().ok()) {
                        runs.push(run);
                    }
                }
            }
        }
    }
    runs.sort();
    runs.dedup();
    runs
}

/// Reads `nreads` from the `<RUN accession="...">` block for `run`, and only from that block.
pub fn parse_read_count(xml: &str, run: &RunId) -> Result<u32, KiraError> {
    let missing = || KiraError::UpstreamParse(format!("no read count declared for {run}"));
    let block_start = xml
        .find(&format!(r#"accession="{}""#, run.as_str()))
        .ok_or_else(missing)?;
    let block = &xml[block_start..];
    let block = block.find("</RUN>").map_or(block, |end| &block[..end]);
    let nreads_re = Regex::new(r#"<Statistics[^>]*\bnreads="(\d+)""#).unwrap();
    nreads_re
        .captures(block)
        .and_then(|cap| cap.get(1))
        .and_then(|m| m.as_str().parse().ok())
        .ok_or_else(missing)
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn runs_from_esummary() {
        let payload: Value = serde_json::from_str(
            r#"{"result":{"uids":["9"],"9":{"runs":"<Run acc=\"SRR2\" total_spots=\"1\"/><Run acc=\"SRR1\"/>"}}}"#,
        )
        .unwrap();
        let runs = esummary_runs(&payload);
        assert_eq!(
            runs.iter().map(|r| r.as_str()).collect::<Vec<_>>(),
            vec!["SRR1", "SRR2"]
        );
    }

    #[test]
    fn read_count_for_run_block() {
        let run: RunId = "SRR2".parse().unwrap();
        let xml = r#"<RUN_SET><RUN accession="SRR1"><Statistics nreads="1" nspots="5"/></RUN>
<RUN accession="SRR2"><Statistics nreads="2" nspots="7"/></RUN></RUN_SET>"#;
        assert_eq!(parse_read_count(xml, &run).unwrap(), 2);
    }

    #[test]
    fn read_count_missing() {
        let run: RunId = "SRR2".parse().unwrap();
        assert!(parse_read_count("<RUN_SET/>", &run).is_err());
    }

    #[test]
    fn read_count_of_other_run_is_not_used() {
        let run: RunId = "SRR9".parse().unwrap();
        let xml = r#"<RUN accession="SRR1"><Statistics nreads="3"/></RUN>"#;
        assert_matches!(parse_read_count(xml, &run), Err(KiraError::UpstreamParse(_)));
    }

    #[test]
    fn read_count_stays_inside_run_block() {
        let run: RunId = "SRR1".parse().unwrap();
        let xml = r#"<RUN_SET><RUN accession="SRR1"><Statistics nspots="5"/></RUN>
<RUN accession="SRR2"><Statistics nreads="2"/></RUN></RUN_SET>"#;
        assert!(parse_read_count(xml, &run).is_err());
    }
}
