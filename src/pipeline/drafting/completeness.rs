use super::types::EditSet;
use super::uncertainty::confidence_thresholds;

/// More unevaluable components than this ⇒ the image is limiting.
pub const MAX_LESIOMETRO_MISSING: usize = 3;

/// More low-confidence scores than this ⇒ flag.
pub const MAX_LOW_CONFIDENCE: usize = 2;

/// A differential with at most this many entries is too narrow.
pub const MIN_DDX_EXCLUSIVE: usize = 1;

pub const SECTION_TITLE: &str = "📊 ANÁLISIS DE COMPLETITUD";

const RULE_WIDTH: usize = 70;

/// Structural flags on a model answer. Empty when the answer is complete.
pub fn completeness_flags(edits: &EditSet) -> Vec<&'static str> {
    let mut flags = Vec::new();

    if edits.lesiometro_missing.len() > MAX_LESIOMETRO_MISSING {
        flags.push("⚠️ Muchos componentes del LESIÓMETRO no evaluables - imagen limitante");
    }

    if edits.confidence_scores.count_below(confidence_thresholds::LOW) > MAX_LOW_CONFIDENCE {
        flags.push("⚠️ Múltiples hallazgos con baja confianza (<50%)");
    }

    if edits.ddx().len() <= MIN_DDX_EXCLUSIVE {
        flags.push("💡 Diferencial muy breve - considera más opciones");
    }

    flags
}

/// Append the advisory completeness section when any flag fires. With no
/// flags the report is returned unchanged.
pub fn check_completeness(report: String, edits: &EditSet) -> String {
    let flags = completeness_flags(edits);
    if flags.is_empty() {
        return report;
    }

    tracing::debug!(flags = flags.len(), "Completeness flags raised");

    let rule = "=".repeat(RULE_WIDTH);
    let mut out = report;
    out.push_str(&format!(
        "\n\n{rule}\n{SECTION_TITLE}\n{rule}\n{}\n{rule}",
        flags.join("\n")
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::drafting::types::{Conclusion, ConclusionBlock};

    fn with_ddx(ddx: &[&str]) -> EditSet {
        EditSet {
            conclusion: Conclusion::Structured(ConclusionBlock {
                ddx: ddx.iter().map(|s| s.to_string()).collect(),
                ..ConclusionBlock::default()
            }),
            ..EditSet::default()
        }
    }

    #[test]
    fn complete_answer_appends_nothing() {
        let edits = with_ddx(&["Hematoma epidural", "Hematoma subdural"]);
        assert_eq!(check_completeness("Informe".into(), &edits), "Informe");
    }

    #[test]
    fn narrow_differential_is_flagged() {
        let out = check_completeness("Informe".into(), &with_ddx(&["Neumonía"]));
        assert!(out.starts_with("Informe\n\n"));
        assert!(out.contains(SECTION_TITLE));
        assert!(out.contains("Diferencial muy breve"));
    }

    #[test]
    fn text_conclusion_counts_as_empty_differential() {
        let edits = EditSet {
            conclusion: Conclusion::Text("Sin alteraciones".into()),
            ..EditSet::default()
        };
        assert_eq!(completeness_flags(&edits).len(), 1);
    }

    #[test]
    fn lesiometro_threshold_is_exclusive() {
        let mut edits = with_ddx(&["a", "b"]);
        edits.lesiometro_missing = vec!["1".into(), "2".into(), "3".into()];
        assert!(completeness_flags(&edits).is_empty());
        edits.lesiometro_missing.push("4".into());
        assert_eq!(
            completeness_flags(&edits),
            vec!["⚠️ Muchos componentes del LESIÓMETRO no evaluables - imagen limitante"]
        );
    }

    #[test]
    fn three_low_scores_are_flagged() {
        let mut edits = with_ddx(&["a", "b"]);
        edits.confidence_scores.insert("x", 0.2);
        edits.confidence_scores.insert("y", 0.4);
        assert!(completeness_flags(&edits).is_empty());
        edits.confidence_scores.insert("z", 0.49);
        assert!(completeness_flags(&edits)[0].contains("baja confianza"));
    }

    #[test]
    fn section_is_framed_by_rules() {
        let out = check_completeness(String::new(), &EditSet::default());
        let rule = "=".repeat(70);
        assert_eq!(out.matches(&rule).count(), 3);
        assert!(out.ends_with(&rule));
    }
}
