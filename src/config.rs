use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::KiraError;
use crate::files::MAX_CONCURRENCY;
use crate::join::DEFAULT_SAMPLE_PATTERN;
use crate::matrix::{DEFAULT_GENE_ID_PATTERN, DEFAULT_SYMBOL_TERMS};
use crate::retry::{DEFAULT_BASE_DELAY_MS, DEFAULT_MAX_ATTEMPTS, RetryPolicy};

pub const DEFAULT_CONFIG_FILE: &str = "kira-sr.json";
pub const DEFAULT_OUTPUT: &str = "samples.tsv";

/// A configured sample pattern may narrow GEO sample accessions, never replace them.
pub const SAMPLE_PATTERN_PREFIX: &str = "^GSM";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DisambiguationPolicy {
    #[default]
    First,
    Second,
    Prompt,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub study_dir: Option<Utf8PathBuf>,
    #[serde(default)]
    pub output: Option<Utf8PathBuf>,
    #[serde(default)]
    pub sample_pattern: Option<String>,
    #[serde(default)]
    pub concurrency: Option<usize>,
    #[serde(default)]
    pub retry: Option<RetryConfig>,
    #[serde(default)]
    pub disambiguation: Option<DisambiguationPolicy>,
    #[serde(default)]
    pub symbol_terms: Option<Vec<String>>,
    #[serde(default)]
    pub gene_id_pattern: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct RetryConfig {
    #[serde(default)]
    pub max_attempts: Option<u32>,
    #[serde(default)]
    pub base_delay_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub study_dir: Option<Utf8PathBuf>,
    pub output: Utf8PathBuf,
    pub sample_pattern: Regex,
    pub concurrency: usize,
    pub retry: RetryPolicy,
    pub disambiguation: DisambiguationPolicy,
    pub symbol_terms: Vec<String>,
    pub gene_id_pattern: Regex,
}

impl Default for ResolvedConfig {
    fn default() -> Self {
        ConfigLoader::resolve_config(Config::default()).expect("default config resolves")
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, KiraError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| KiraError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| KiraError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, KiraError> {
        let compile = |pattern: Option<String>, default: &str| {
            let pattern = pattern.unwrap_or_else(|| default.to_string());
            Regex::new(&pattern).map_err(|err| KiraError::ConfigParse(format!("{pattern}: {err}")))
        };
        let retry = config.retry.unwrap_or_default();
        let sample_pattern = compile(config.sample_pattern, DEFAULT_SAMPLE_PATTERN)?;
        if !sample_pattern.as_str().starts_with(SAMPLE_PATTERN_PREFIX) {
            return Err(KiraError::ConfigParse(format!(
                "sample_pattern `{}` must start with `{SAMPLE_PATTERN_PREFIX}`; only GEO sample accessions are reconciled",
                sample_pattern.as_str()
            )));
        }

        Ok(ResolvedConfig {
            schema_version: config.schema_version.unwrap_or(1),
            study_dir: config.study_dir,
            output: config
                .output
                .unwrap_or_else(|| Utf8PathBuf::from(DEFAULT_OUTPUT)),
            sample_pattern,
            concurrency: config.concurrency.unwrap_or(1).clamp(1, MAX_CONCURRENCY),
            retry: RetryPolicy::new(
                retry.max_attempts.unwrap_or(DEFAULT_MAX_ATTEMPTS),
                Duration::from_millis(retry.base_delay_ms.unwrap_or(DEFAULT_BASE_DELAY_MS)),
            ),
            disambiguation: config.disambiguation.unwrap_or_default(),
            symbol_terms: config
                .symbol_terms
                .unwrap_or_else(|| DEFAULT_SYMBOL_TERMS.iter().map(|t| t.to_string()).collect()),
            gene_id_pattern: compile(config.gene_id_pattern, DEFAULT_GENE_ID_PATTERN)?,
        })
    }
}
