use std::io::Cursor;
use std::sync::Mutex;

use assert_matches::assert_matches;

use kira_sample_reconciler::error::KiraError;
use kira_sample_reconciler::fuzzy::{
    CandidateLabelSet, Choice, Disambiguator, FirstOption, LabelMatcher, MatchOutcome,
    PromptDisambiguator, SecondOption,
};

#[derive(Default)]
struct Recording {
    calls: Mutex<Vec<(String, String, String)>>,
}

impl Disambiguator for &Recording {
    fn resolve(&self, query: &str, option_a: &str, option_b: &str) -> Result<Choice, KiraError> {
        self.calls.lock().unwrap().push((
            query.to_string(),
            option_a.to_string(),
            option_b.to_string(),
        ));
        Ok(Choice::Second)
    }
}

fn labels(values: &[Option<&str>]) -> Vec<Option<String>> {
    values.iter().map(|v| v.map(str::to_string)).collect()
}

#[test]
fn unambiguous_longest_match_wins() {
    let candidates = labels(&[Some("human PBMC donor 1 rep"), Some("mouse liver")]);
    let outcome = LabelMatcher::default()
        .match_label("human PBMC donor 1", &candidates)
        .unwrap();
    assert_eq!(outcome, MatchOutcome::Matched(0));
}

#[test]
fn two_way_tie_goes_to_disambiguator() {
    let recording = Recording::default();
    let candidates = labels(&[Some("sampleA_v1"), Some("sampleA_v2")]);
    let outcome = LabelMatcher::new(&recording)
        .match_label("sampleA", &candidates)
        .unwrap();

    assert_eq!(outcome, MatchOutcome::Matched(1));
    let calls = recording.calls.lock().unwrap();
    assert_eq!(
        *calls,
        vec![(
            "sampleA".to_string(),
            "sampleA_v1".to_string(),
            "sampleA_v2".to_string()
        )]
    );
}

#[test]
fn automated_policies_are_deterministic() {
    let candidates = labels(&[Some("sampleA_v1"), None, Some("sampleA_v2")]);
    let first = LabelMatcher::new(FirstOption)
        .match_label("sampleA", &candidates)
        .unwrap();
    let second = LabelMatcher::new(SecondOption)
        .match_label("sampleA", &candidates)
        .unwrap();
    // Indices refer to the original sequence, missing labels included.
    assert_eq!(first, MatchOutcome::Matched(0));
    assert_eq!(second, MatchOutcome::Matched(2));
}

#[test]
fn missing_and_unrelated_candidates_do_not_match() {
    let matcher = LabelMatcher::default();
    assert_eq!(
        matcher.match_label("x", &labels(&[None, None])).unwrap(),
        MatchOutcome::NoMatch
    );
    assert_eq!(
        matcher.match_label("x", &Vec::<Option<String>>::new()).unwrap(),
        MatchOutcome::NoMatch
    );
    assert_eq!(
        matcher.match_label("abc", &labels(&[Some("xyz")])).unwrap(),
        MatchOutcome::NoMatch
    );
}

#[test]
fn lone_candidate_without_overlap_is_no_match() {
    let candidates = labels(&[Some("kidney")]);
    let outcome = LabelMatcher::default()
        .match_label("PBMC", &candidates)
        .unwrap();
    assert_eq!(outcome, MatchOutcome::NoMatch);
}

#[test]
fn three_way_tie_is_no_match() {
    let recording = Recording::default();
    let candidates = labels(&[Some("rep_1"), Some("rep_2"), Some("rep_3")]);
    let outcome = LabelMatcher::new(&recording)
        .match_label("rep", &candidates)
        .unwrap();
    assert_eq!(outcome, MatchOutcome::NoMatch);
    assert!(recording.calls.lock().unwrap().is_empty());
}

#[test]
fn scoring_is_order_independent_without_ties() {
    let forward = labels(&[Some("liver tumor"), Some("liver"), Some("kidney")]);
    let reverse = labels(&[Some("kidney"), Some("liver"), Some("liver tumor")]);
    let matcher = LabelMatcher::default();
    let a = matcher.match_label("liver tumor 3", &forward).unwrap();
    let b = matcher.match_label("liver tumor 3", &reverse).unwrap();
    assert_eq!(forward[a.index().unwrap()], reverse[b.index().unwrap()]);
}

#[test]
fn prompt_reads_until_valid_choice() {
    let input = Cursor::new("x\n3\n2\n");
    let mut output = Vec::new();
    let choice = PromptDisambiguator::new(input, &mut output)
        .resolve("q", "a", "b")
        .unwrap();
    assert_eq!(choice, Choice::Second);

    let transcript = String::from_utf8(output).unwrap();
    assert!(transcript.contains("[1] a"));
    assert!(transcript.contains("[2] b"));
    assert_eq!(transcript.matches("Choose 1 or 2: ").count(), 3);
}

#[test]
fn prompt_fails_on_closed_input() {
    let err = PromptDisambiguator::new(Cursor::new(""), Vec::new())
        .resolve("q", "a", "b")
        .unwrap_err();
    assert_matches!(err, KiraError::Prompt(_));
}

#[test]
fn candidate_set_returns_accession() {
    let set = CandidateLabelSet::new(vec![
        ("GSM1".to_string(), Some("PBMC day 0".to_string())),
        ("GSM2".to_string(), None),
        ("GSM3".to_string(), Some("PBMC day 28 booster".to_string())),
    ]);
    assert_eq!(set.len(), 3);
    let matcher = LabelMatcher::default();
    assert_eq!(
        set.match_accession(&matcher, "day 28 booster").unwrap(),
        Some("GSM3")
    );
    assert_eq!(set.match_accession(&matcher, "zzz").unwrap(), None);
}
