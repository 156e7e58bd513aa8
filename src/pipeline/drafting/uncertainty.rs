use super::types::EditSet;

/// Confidence thresholds shared by the applier and the completeness check.
pub mod confidence_thresholds {
    /// Below this: finding is annotated as low confidence
    pub const LOW: f32 = 0.50;

    /// Score of a finding carrying no hedging cue
    pub const DEFAULT: f32 = 0.95;
}

/// Hedging phrase → upper bound on confidence. Matched as case-insensitive
/// substrings; the lowest matching bound wins.
pub const HEDGING_MARKERS: &[(&str, f32)] = &[
    ("podría", 0.60),
    ("posible", 0.65),
    ("probable", 0.70),
    ("sugiere", 0.75),
    ("compatible", 0.80),
    ("compatible con", 0.80),
    ("parece", 0.65),
    ("posiblemente", 0.60),
    ("al parecer", 0.65),
    ("could", 0.60),
    ("possible", 0.65),
    ("possibly", 0.60),
    ("probably", 0.70),
    ("suggest", 0.75),
    ("compatible with", 0.80),
    ("appears", 0.65),
];

/// Number of leading words used as the score key.
const KEY_WORDS: usize = 3;

/// Score every finding in `add_findings` from its hedging cues and write the
/// result into `confidence_scores`.
///
/// Keys are the first three words of the finding, so two findings sharing
/// those words overwrite each other's score. Keys already present in the
/// model's scores are overwritten in place.
pub fn analyze_uncertainty(raw_text: &str, mut edits: EditSet) -> EditSet {
    tracing::debug!(
        raw_len = raw_text.len(),
        findings = edits.add_findings.len(),
        "Scoring finding confidence"
    );

    for finding in &edits.add_findings {
        let key = finding_key(finding);
        if key.is_empty() {
            continue;
        }
        edits.confidence_scores.insert(key, score_finding(finding));
    }

    edits
}

/// Confidence of a single finding: [`confidence_thresholds::DEFAULT`] lowered
/// to the smallest bound among the hedging phrases it contains.
pub fn score_finding(finding: &str) -> f32 {
    let lower = finding.to_lowercase();
    HEDGING_MARKERS
        .iter()
        .filter(|(phrase, _)| lower.contains(phrase))
        .map(|(_, bound)| *bound)
        .fold(confidence_thresholds::DEFAULT, f32::min)
}

fn finding_key(finding: &str) -> String {
    finding
        .split_whitespace()
        .take(KEY_WORDS)
        .collect::<Vec<_>>()
        .join(" ")
}
