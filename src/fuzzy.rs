//! Longest-common-substring matching of free-text labels against candidate labels.
//!
//! Exactly one best candidate is a match. Exactly two tied best candidates go to a
//! [`Disambiguator`]. No candidates, three or more ties, or a best score of zero are
//! [`MatchOutcome::NoMatch`]. A zero score is never a match, even when only one candidate
//! is present.

use std::io::{BufRead, Write};
use std::sync::Mutex;

use serde::Serialize;

use crate::error::KiraError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MatchOutcome {
    /// Index into the original candidate sequence, nulls included.
    Matched(usize),
    NoMatch,
}

impl MatchOutcome {
    pub fn index(self) -> Option<usize> {
        match self {
            MatchOutcome::Matched(index) => Some(index),
            MatchOutcome::NoMatch => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Choice {
    First,
    Second,
}

pub trait Disambiguator {
    fn resolve(&self, query: &str, option_a: &str, option_b: &str) -> Result<Choice, KiraError>;
}

/// Non-interactive policy: always the earlier candidate.
#[derive(Debug, Clone, Copy, Default)]
pub struct FirstOption;

impl Disambiguator for FirstOption {
    fn resolve(&self, _query: &str, _a: &str, _b: &str) -> Result<Choice, KiraError> {
        Ok(Choice::First)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SecondOption;

impl Disambiguator for SecondOption {
    fn resolve(&self, _query: &str, _a: &str, _b: &str) -> Result<Choice, KiraError> {
        Ok(Choice::Second)
    }
}

/// Asks a person to pick. Blocks until a valid answer is read.
pub struct PromptDisambiguator<R: BufRead, W: Write> {
    io: Mutex<(R, W)>,
}

impl<R: BufRead, W: Write> PromptDisambiguator<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self {
            io: Mutex::new((input, output)),
        }
    }
}

impl PromptDisambiguator<std::io::StdinLock<'static>, std::io::Stderr> {
    pub fn stdio() -> Self {
        Self::new(std::io::stdin().lock(), std::io::stderr())
    }
}

impl<R: BufRead, W: Write> Disambiguator for PromptDisambiguator<R, W> {
    fn resolve(&self, query: &str, option_a: &str, option_b: &str) -> Result<Choice, KiraError> {
        let mut guard = self
            .io
            .lock()
            .map_err(|_| KiraError::Prompt("prompt lock poisoned".to_string()))?;
        let (input, output) = &mut *guard;
        let io_err = |err: std::io::Error| KiraError::Prompt(err.to_string());
        writeln!(output, "Ambiguous match for \"{query}\":").map_err(io_err)?;
        writeln!(output, "  [1] {option_a}").map_err(io_err)?;
        writeln!(output, "  [2] {option_b}").map_err(io_err)?;
        loop {
            write!(output, "Choose 1 or 2: ").map_err(io_err)?;
            output.flush().map_err(io_err)?;
            let mut line = String::new();
            if input.read_line(&mut line).map_err(io_err)? == 0 {
                return Err(KiraError::Prompt("input closed before a choice was made".to_string()));
            }
            match line.trim() {
                "1" => return Ok(Choice::First),
                "2" => return Ok(Choice::Second),
                _ => writeln!(output, "Please answer 1 or 2.").map_err(io_err)?,
            }
        }
    }
}

/// Length of the longest common substring, in characters.
pub fn lcs_len(a: &str, b: &str) -> usize {
    let a = a.chars().collect::<Vec<_>>();
    let b = b.chars().collect::<Vec<_>>();
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    let mut best = 0;
    for ca in &a {
        for (j, cb) in b.iter().enumerate() {
            curr[j + 1] = if ca == cb { prev[j] + 1 } else { 0 };
            best = best.max(curr[j + 1]);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    best
}

pub struct LabelMatcher<D: Disambiguator> {
    disambiguator: D,
}

impl Default for LabelMatcher<FirstOption> {
    fn default() -> Self {
        Self::new(FirstOption)
    }
}

impl<D: Disambiguator> LabelMatcher<D> {
    pub fn new(disambiguator: D) -> Self {
        Self { disambiguator }
    }

    pub fn match_label<S: AsRef<str>>(
        &self,
        query: &str,
        candidates: &[Option<S>],
    ) -> Result<MatchOutcome, KiraError> {
        let scored = candidates
            .iter()
            .enumerate()
            .filter_map(|(i, label)| label.as_ref().map(|l| (i, lcs_len(query, l.as_ref()))))
            .collect::<Vec<_>>();
        let Some(best) = scored.iter().map(|&(_, score)| score).max() else {
            return Ok(MatchOutcome::NoMatch);
        };
        if best == 0 {
            return Ok(MatchOutcome::NoMatch);
        }
        let tied = scored
            .iter()
            .filter(|&&(_, score)| score == best)
            .map(|&(i, _)| i)
            .collect::<Vec<_>>();
        match tied.as_slice() {
            [only] => Ok(MatchOutcome::Matched(*only)),
            [a, b] => {
                let label = |i: usize| candidates[i].as_ref().map(|l| l.as_ref()).unwrap_or_default();
                let choice = self.disambiguator.resolve(query, label(*a), label(*b))?;
                Ok(MatchOutcome::Matched(match choice {
                    Choice::First => *a,
                    Choice::Second => *b,
                }))
            }
            _ => {
                tracing::debug!(query, ties = tied.len(), "label match too ambiguous");
                Ok(MatchOutcome::NoMatch)
            }
        }
    }
}

/// Ordered (accession, label) pairs forming the universe for one matching operation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CandidateLabelSet {
    entries: Vec<(String, Option<String>)>,
}

impl CandidateLabelSet {
    pub fn new(entries: Vec<(String, Option<String>)>) -> Self {
        Self { entries }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn labels(&self) -> Vec<Option<&str>> {
        self.entries.iter().map(|(_, label)| label.as_deref()).collect()
    }

    /// Accession of the matched label, or `None` when unmatched.
    pub fn match_accession<D: Disambiguator>(
        &self,
        matcher: &LabelMatcher<D>,
        query: &str,
    ) -> Result<Option<&str>, KiraError> {
        let outcome = matcher.match_label(query, &self.labels())?;
        Ok(outcome
            .index()
            .and_then(|i| self.entries.get(i))
            .map(|(accession, _)| accession.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lcs_lengths() {
        assert_eq!(lcs_len("abcdef", "zcdez"), 3);
        assert_eq!(lcs_len("", "abc"), 0);
        assert_eq!(lcs_len("abc", "xyz"), 0);
        assert_eq!(lcs_len("sampleA", "sampleA_v1"), 7);
    }
}
