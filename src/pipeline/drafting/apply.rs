use std::collections::HashSet;

use super::schema::parse_edit_set;
use super::sections::{is_conclusion_header, is_findings_header, is_section_boundary};
use super::types::{Conclusion, ConclusionBlock, ConfidenceScores, EditSet};
use super::uncertainty::confidence_thresholds;
use super::EditSetError;

/// Marker appended to inserted findings whose confidence is below
/// [`confidence_thresholds::LOW`].
pub const LOW_CONFIDENCE_LABEL: &str = "BAJA CONFIANZA";

/// Header written when the template has no conclusion section of its own.
const APPENDED_CONCLUSION_HEADER: &str = "CONCLUSIÓN:";

/// Decode `edits_json` and apply it to `template_text`.
///
/// Decode and shape errors are returned untouched; this function never tries
/// to repair its input.
pub fn apply_edits_json(template_text: &str, edits_json: &str) -> Result<String, EditSetError> {
    let edits = parse_edit_set(edits_json)?;
    Ok(apply_edits(template_text, &edits))
}

/// Apply a validated edit set to a template.
///
/// Fixed order: remove → replace → add findings → conclusion. Pure and
/// deterministic. Re-applying the same edit set is a no-op for remove and
/// replace once their targets are gone.
pub fn apply_edits(template_text: &str, edits: &EditSet) -> String {
    let trailing_newline = template_text.ends_with('\n');
    let mut lines: Vec<String> = template_text.lines().map(str::to_string).collect();

    remove_lines(&mut lines, &edits.remove);
    replace_lines(&mut lines, edits);
    insert_findings(&mut lines, &edits.add_findings, &edits.confidence_scores);

    let conclusion = render_conclusion(&edits.conclusion, &edits.lesiometro_missing);
    if !conclusion.is_empty() {
        replace_conclusion(&mut lines, conclusion);
    }

    let mut out = lines.join("\n");
    if trailing_newline {
        out.push('\n');
    }
    out
}

/// Exact-line removal on trimmed content. Blank entries are ignored so an
/// empty string in `remove` cannot strip the template's spacing.
fn remove_lines(lines: &mut Vec<String>, remove: &[String]) {
    let targets: HashSet<&str> = remove
        .iter()
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .collect();
    if targets.is_empty() {
        return;
    }
    lines.retain(|line| !targets.contains(line.trim()));
}

/// Every rule is matched against the line state as it was before the first
/// rule ran; a later matching rule overwrites an earlier one. `to` is written
/// verbatim.
fn replace_lines(lines: &mut [String], edits: &EditSet) {
    let original: Vec<String> = lines.to_vec();
    for rule in &edits.replace {
        let from = rule.from.trim();
        if from.is_empty() || rule.to.trim().is_empty() {
            continue;
        }
        for (idx, line) in original.iter().enumerate() {
            if line.trim() == from {
                lines[idx] = rule.to.clone();
            }
        }
    }
}

fn insert_findings(lines: &mut Vec<String>, findings: &[String], scores: &ConfidenceScores) {
    let annotated: Vec<String> = findings
        .iter()
        .map(|f| f.trim())
        .filter(|f| !f.is_empty())
        .map(|f| annotate_finding(f, scores))
        .collect();
    if annotated.is_empty() {
        return;
    }

    match lines.iter().position(|l| is_findings_header(l)) {
        Some(idx) => {
            lines.splice(idx + 1..idx + 1, annotated);
        }
        None => {
            tracing::debug!(
                count = annotated.len(),
                "No findings header in template, appending findings at the end"
            );
            lines.push(String::new());
            lines.extend(annotated);
        }
    }
}

/// Append the low-confidence marker when the first matching score is below
/// the threshold. Findings without a matching score are left as they are.
pub fn annotate_finding(finding: &str, scores: &ConfidenceScores) -> String {
    let confidence = scores.lookup_for_finding(finding).unwrap_or(1.0);
    if confidence < confidence_thresholds::LOW {
        format!(
            "{finding} [⚠️ {LOW_CONFIDENCE_LABEL}: {:.0}%]",
            confidence * 100.0
        )
    } else {
        finding.to_string()
    }
}

/// Replace the body of the first conclusion section (up to the next section
/// header) with `block`. Without a conclusion header the block is appended
/// under a new one.
fn replace_conclusion(lines: &mut Vec<String>, block: String) {
    match lines.iter().position(|l| is_conclusion_header(l)) {
        Some(idx) => {
            let end = lines[idx + 1..]
                .iter()
                .position(|l| is_section_boundary(l))
                .map(|p| idx + 1 + p)
                .unwrap_or(lines.len());
            lines.splice(idx + 1..end, std::iter::once(block));
        }
        None => {
            tracing::debug!("No conclusion header in template, appending conclusion");
            lines.push(String::new());
            lines.push(APPENDED_CONCLUSION_HEADER.to_string());
            lines.push(block);
        }
    }
}

/// Render the conclusion text: structured blocks via
/// [`format_conclusion_block`] (with the top-level unevaluable list merged in
/// when the block has none), plain text verbatim, absent as empty.
pub fn render_conclusion(conclusion: &Conclusion, lesiometro_missing: &[String]) -> String {
    match conclusion {
        Conclusion::Absent => String::new(),
        Conclusion::Text(text) => text.trim().to_string(),
        Conclusion::Structured(block) => {
            if block.lesiometro_missing.is_some() {
                format_conclusion_block(block)
            } else {
                let merged = ConclusionBlock {
                    lesiometro_missing: Some(lesiometro_missing.to_vec()),
                    ..block.clone()
                };
                format_conclusion_block(&merged)
            }
        }
    }
}

/// Positive findings → impression → differential → recommendations →
/// unevaluable components. Empty lists produce no heading.
pub fn format_conclusion_block(block: &ConclusionBlock) -> String {
    let missing = block.lesiometro_missing.as_deref().unwrap_or(&[]);
    let sections: [(&str, &[String]); 5] = [
        ("Hallazgos positivos:", &block.positives),
        ("Impresión:", &block.impression),
        ("Diagnósticos probables (diferencial):", &block.ddx),
        ("Sugerencias:", &block.recommendations),
        (
            "Elementos del LESIÓMETRO no caracterizables en la imagen aportada:",
            missing,
        ),
    ];

    let mut out: Vec<String> = Vec::new();
    for (heading, items) in sections {
        let items: Vec<&str> = items
            .iter()
            .map(|s| s.trim())
            .filter(|s| !s.is_empty())
            .collect();
        if items.is_empty() {
            continue;
        }
        out.push(heading.to_string());
        out.extend(items.into_iter().map(|item| format!("- {item}")));
    }

    out.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::drafting::types::ReplaceRule;

    fn edits_from(json: &str) -> EditSet {
        parse_edit_set(json).unwrap()
    }

    #[test]
    fn remove_drops_exact_lines() {
        let out = apply_edits_json(
            "Línea 1\nLínea 2\nLínea 3",
            r#"{"remove": ["Línea 2"], "replace": [], "add_findings": []}"#,
        )
        .unwrap();
        assert_eq!(out, "Línea 1\nLínea 3");
    }

    #[test]
    fn remove_trims_line_boundaries() {
        let out = apply_edits_json("  Línea con espacios  \nOtra", r#"{"remove": ["Línea con espacios "]}"#)
            .unwrap();
        assert_eq!(out, "Otra");
    }

    #[test]
    fn remove_and_replace_are_case_sensitive() {
        let out = apply_edits_json(
            "Línea Exacta\nOtra Línea",
            r#"{"remove": ["línea exacta"], "replace": [{"from": "otra línea", "to": "X"}]}"#,
        )
        .unwrap();
        assert_eq!(out, "Línea Exacta\nOtra Línea");
    }

    #[test]
    fn blank_remove_entry_keeps_blank_lines() {
        let out = apply_edits_json("A\n\nB", r#"{"remove": ["", "   "]}"#).unwrap();
        assert_eq!(out, "A\n\nB");
    }

    #[test]
    fn replace_writes_target_verbatim() {
        let out = apply_edits_json(
            "Línea original\nOtra línea",
            r#"{"replace": [{"from": " Línea original ", "to": "  Línea modificada"}]}"#,
        )
        .unwrap();
        assert_eq!(out, "  Línea modificada\nOtra línea");
    }

    #[test]
    fn replace_rules_match_the_original_line_state() {
        let edits = EditSet {
            replace: vec![
                ReplaceRule { from: "A".into(), to: "B".into() },
                ReplaceRule { from: "B".into(), to: "C".into() },
            ],
            ..EditSet::default()
        };
        // "A" becomes "B" and stays "B": the second rule only sees lines that
        // were "B" before any rule ran.
        assert_eq!(apply_edits("A\nB", &edits), "B\nC");
    }

    #[test]
    fn later_rule_wins_on_same_line() {
        let edits = EditSet {
            replace: vec![
                ReplaceRule { from: "A".into(), to: "first".into() },
                ReplaceRule { from: "A".into(), to: "second".into() },
            ],
            ..EditSet::default()
        };
        assert_eq!(apply_edits("A", &edits), "second");
    }

    #[test]
    fn replace_skips_empty_sides() {
        let out = apply_edits_json("A\nB", r#"{"replace": [{"from": "", "to": "X"}, {"from": "A", "to": "  "}]}"#)
            .unwrap();
        assert_eq!(out, "A\nB");
    }

    #[test]
    fn findings_inserted_directly_after_header() {
        let out = apply_edits_json("HALLAZGOS:\n\nCONCLUSIÓN:", r#"{"add_findings": ["X"]}"#).unwrap();
        let lines: Vec<&str> = out.lines().collect();
        assert_eq!(lines[0], "HALLAZGOS:");
        assert_eq!(lines[1], "X");
    }

    #[test]
    fn findings_keep_list_order_before_existing_content() {
        let out = apply_edits_json(
            "HALLAZGOS:\n- Hallazgo previo\n\nCONCLUSIÓN:",
            r#"{"add_findings": ["Nuevo 1", "  Nuevo 2  ", ""]}"#,
        )
        .unwrap();
        assert_eq!(out, "HALLAZGOS:\nNuevo 1\nNuevo 2\n- Hallazgo previo\n\nCONCLUSIÓN:");
    }

    #[test]
    fn findings_appended_when_header_missing() {
        let out = apply_edits_json("Plantilla sin secciones", r#"{"add_findings": ["Quiste simple"]}"#)
            .unwrap();
        assert_eq!(out, "Plantilla sin secciones\n\nQuiste simple");
    }

    #[test]
    fn low_confidence_findings_are_annotated() {
        let out = apply_edits_json(
            "HALLAZGOS:\n\nCONCLUSIÓN:",
            r#"{"add_findings": ["Hallazgo incierto"], "confidence_scores": {"incierto": 0.3}}"#,
        )
        .unwrap();
        assert!(out.contains("Hallazgo incierto [⚠️ BAJA CONFIANZA: 30%]"));
    }

    #[test]
    fn threshold_score_is_not_annotated() {
        let mut scores = ConfidenceScores::new();
        scores.insert("nódulo", 0.5);
        assert_eq!(annotate_finding("Nódulo de 4 mm", &scores), "Nódulo de 4 mm");
    }

    #[test]
    fn conclusion_body_replaced_up_to_next_section() {
        let template = "HALLAZGOS:\n\nCONCLUSIÓN:\nTexto previo\nMás texto\nFIRMA:\nDr. X";
        let out = apply_edits_json(
            template,
            r#"{"conclusion": {"positives": ["Derrame pleural"], "ddx": ["Insuficiencia cardiaca", "Neumonía"]}}"#,
        )
        .unwrap();
        assert_eq!(
            out,
            "HALLAZGOS:\n\nCONCLUSIÓN:\nHallazgos positivos:\n- Derrame pleural\n\
             Diagnósticos probables (diferencial):\n- Insuficiencia cardiaca\n- Neumonía\nFIRMA:\nDr. X"
        );
    }

    #[test]
    fn template_section_named_like_a_subheading_survives() {
        let template = "HALLAZGOS:\n\nCONCLUSIÓN:\nTexto previo\nSugerencias:\nControl en 6 meses";
        let out = apply_edits_json(template, r#"{"conclusion": {"positives": ["Nódulo"]}}"#).unwrap();
        assert_eq!(
            out,
            "HALLAZGOS:\n\nCONCLUSIÓN:\nHallazgos positivos:\n- Nódulo\nSugerencias:\nControl en 6 meses"
        );
    }

    #[test]
    fn plain_text_conclusion_used_verbatim() {
        let out = apply_edits_json("CONCLUSIÓN:\nviejo", r#"{"conclusion": "  Estudio sin alteraciones.  "}"#)
            .unwrap();
        assert_eq!(out, "CONCLUSIÓN:\nEstudio sin alteraciones.");
    }

    #[test]
    fn absent_conclusion_leaves_section_untouched() {
        let template = "CONCLUSIÓN:\nTexto de plantilla";
        assert_eq!(apply_edits(template, &EditSet::default()), template);
    }

    #[test]
    fn empty_structured_conclusion_leaves_section_untouched() {
        let template = "HALLAZGOS:\n\nCONCLUSIÓN:\n";
        assert_eq!(apply_edits(template, &EditSet::fallback_skeleton()), template);
    }

    #[test]
    fn top_level_lesiometro_is_merged_into_conclusion() {
        let edits = edits_from(
            r#"{"lesiometro_missing": ["Realce post-contraste"], "conclusion": {"impression": ["Proceso inflamatorio"]}}"#,
        );
        let rendered = render_conclusion(&edits.conclusion, &edits.lesiometro_missing);
        assert_eq!(
            rendered,
            "Impresión:\n- Proceso inflamatorio\n\
             Elementos del LESIÓMETRO no caracterizables en la imagen aportada:\n- Realce post-contraste"
        );
    }

    #[test]
    fn conclusion_level_lesiometro_takes_precedence() {
        let edits = edits_from(
            r#"{"lesiometro_missing": ["global"], "conclusion": {"lesiometro_missing": ["local"]}}"#,
        );
        let rendered = render_conclusion(&edits.conclusion, &edits.lesiometro_missing);
        assert!(rendered.contains("- local"));
        assert!(!rendered.contains("global"));
    }

    #[test]
    fn lesiometro_without_conclusion_is_not_rendered() {
        let edits = edits_from(r#"{"lesiometro_missing": ["realce"]}"#);
        assert_eq!(render_conclusion(&edits.conclusion, &edits.lesiometro_missing), "");
    }

    #[test]
    fn conclusion_block_rendering_order() {
        let block = ConclusionBlock {
            positives: vec!["p".into()],
            impression: vec!["i".into()],
            ddx: vec!["d".into()],
            recommendations: vec!["r".into()],
            lesiometro_missing: Some(vec!["m".into()]),
        };
        let out = format_conclusion_block(&block);
        let headings: Vec<&str> = out.lines().filter(|l| l.ends_with(':')).collect();
        assert_eq!(
            headings,
            vec![
                "Hallazgos positivos:",
                "Impresión:",
                "Diagnósticos probables (diferencial):",
                "Sugerencias:",
                "Elementos del LESIÓMETRO no caracterizables en la imagen aportada:",
            ]
        );
    }

    #[test]
    fn conclusion_appended_when_header_missing() {
        let out = apply_edits_json("HALLAZGOS:", r#"{"conclusion": "Normal."}"#).unwrap();
        assert_eq!(out, "HALLAZGOS:\n\nCONCLUSIÓN:\nNormal.");
    }

    #[test]
    fn scenario_remove_add_and_conclude() {
        let out = apply_edits_json(
            "HALLAZGOS:\nold\n\nCONCLUSIÓN:",
            r#"{"remove":["old"],"add_findings":["new finding"],"conclusion":{"positives":["new finding"]}}"#,
        )
        .unwrap();
        let (findings, conclusion) = out.split_once("CONCLUSIÓN:").unwrap();
        assert_eq!(findings.matches("new finding").count(), 1);
        assert!(conclusion.contains("Hallazgos positivos:\n- new finding"));
        assert!(!out.lines().any(|l| l == "old"));
    }

    #[test]
    fn reapplying_is_idempotent_for_remove_and_replace() {
        let edits = edits_from(
            r#"{"remove": ["Sin hallazgos"], "replace": [{"from": "Ventrículos normales", "to": "Ventrículos comprimidos"}],
                "conclusion": {"positives": ["Hematoma"]}}"#,
        );
        let template = "HALLAZGOS:\nSin hallazgos\nVentrículos normales\n\nCONCLUSIÓN:\n";
        let once = apply_edits(template, &edits);
        let twice = apply_edits(&once, &edits);
        assert_eq!(once, twice);
    }

    #[test]
    fn trailing_newline_is_preserved() {
        assert_eq!(apply_edits("A\nB\n", &EditSet::default()), "A\nB\n");
        assert_eq!(apply_edits("A\nB", &EditSet::default()), "A\nB");
    }

    #[test]
    fn invalid_json_surfaces_decode_error() {
        let result = apply_edits_json("Plantilla", "JSON inválido {");
        assert!(matches!(result, Err(EditSetError::JsonDecode(_))));
    }
}
