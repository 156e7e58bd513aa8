//! Rule-based audit of an assembled report.
//!
//! Eight independent checks run in a fixed order. The result is appended as
//! a read-only section; prior content is never touched. With no flags an
//! explicit "no flags" line is appended, so the section is always present.

pub mod keywords;
pub mod types;

pub use keywords::*;
pub use types::*;

use crate::pipeline::drafting::apply::LOW_CONFIDENCE_LABEL;
use crate::pipeline::drafting::sections::{is_conclusion_header, is_findings_header};

pub const SECTION_TITLE: &str = "🔍 AUDITORÍA INTERNA (AUTO-VALIDACIÓN)";
pub const NO_FLAGS_NOTICE: &str = "✅ AUDITORÍA: Sin flags detectados.";

const RULE_WIDTH: usize = 70;

pub mod thresholds {
    /// Findings text at or below this many chars counts as no findings.
    pub const MIN_FINDINGS_CHARS: usize = 10;
    /// Conclusions shorter than this are too brief when findings exist.
    pub const MIN_CONCLUSION_CHARS: usize = 20;
}

const PRIOR_STUDY_TERMS: &[&str] = &["previo", "prior"];
const DIFFERENTIAL_TERMS: &[&str] = &["diagnóstico", "probable", "diferencial", "differential"];
const LIMITATION_TERMS: &[&str] = &["limitación", "calidad", "limitation", "quality"];

// ═══════════════════════════════════════════
// Section extraction
// ═══════════════════════════════════════════

/// A line opening an appended advisory section.
fn is_rule_line(line: &str) -> bool {
    line.trim_start().starts_with("=====")
}

/// Text after the first ':' of a header line.
fn header_remainder(line: &str) -> &str {
    line.split_once(':').map(|(_, rest)| rest).unwrap_or("")
}

/// Body of the first findings section, up to the conclusion header.
pub fn findings_text(report: &str) -> Option<String> {
    let mut lines = report.lines();
    let header = lines.by_ref().find(|l| is_findings_header(l))?;

    let mut body = vec![header_remainder(header)];
    body.extend(lines.take_while(|l| !is_conclusion_header(l) && !is_rule_line(l)));
    Some(body.join("\n").trim().to_string())
}

/// Body of the last conclusion section, up to any appended advisory section.
pub fn conclusion_text(report: &str) -> Option<String> {
    let lines: Vec<&str> = report.lines().collect();
    let start = lines.iter().rposition(|l| is_conclusion_header(l))?;

    let mut body = vec![header_remainder(lines[start])];
    body.extend(lines[start + 1..].iter().copied().take_while(|l| !is_rule_line(l)));
    Some(body.join("\n").trim().to_string())
}

fn contains_any(haystack: &str, terms: &[&str]) -> bool {
    terms.iter().any(|t| haystack.contains(t))
}

// ═══════════════════════════════════════════
// Checks
// ═══════════════════════════════════════════

fn flag(check: AuditCheck, severity: Severity, message: &'static str) -> AuditFlag {
    AuditFlag {
        check,
        severity,
        message,
    }
}

/// Evaluate every check against `report`, in report order.
///
/// `had_additions` marks reports whose edit set inserted findings; such a
/// report counts as having findings even when the template lacks a
/// recognizable findings header.
pub fn audit_flags(report: &str, _template_text: &str, had_additions: bool) -> Vec<AuditFlag> {
    let lower = report.to_lowercase();
    let has_findings = had_additions
        || findings_text(report)
            .map(|f| f.chars().count() > thresholds::MIN_FINDINGS_CHARS)
            .unwrap_or(false);
    let conclusion = conclusion_text(report).unwrap_or_default();
    let conclusion_lower = conclusion.to_lowercase();

    let hits = scan_language(report);
    let has_category = |c: LanguageCategory| hits.iter().any(|h| h.category == c);

    let mut flags = Vec::new();

    if has_findings && conclusion.chars().count() < thresholds::MIN_CONCLUSION_CHARS {
        flags.push(flag(
            AuditCheck::ConclusionTooShort,
            Severity::Warning,
            "⚠️ AUDITORÍA: Hallazgos descritos pero conclusión muy breve",
        ));
    }

    if has_findings && !contains_any(&lower, PRIOR_STUDY_TERMS) {
        flags.push(flag(
            AuditCheck::MissingPriorComparison,
            Severity::Warning,
            "⚠️ AUDITORÍA: Menciona 'comparación con previos' si aplica",
        ));
    }

    if has_category(LanguageCategory::Definitive) {
        flags.push(flag(
            AuditCheck::DefinitiveLanguage,
            Severity::Safety,
            "⚠️ AUDITORÍA: Lenguaje muy definitivo. Usa: 'compatible con', 'sugiere', 'probable'",
        ));
    }

    if has_findings && !has_measurement(report) {
        flags.push(flag(
            AuditCheck::MissingMeasurements,
            Severity::Suggestion,
            "💡 AUDITORÍA: Incluye medidas específicas (mm/cm) si aplica",
        ));
    }

    if has_category(LanguageCategory::Treatment) {
        flags.push(flag(
            AuditCheck::TreatmentLanguage,
            Severity::Safety,
            "❌ AUDITORÍA: Detectado lenguaje de tratamiento (fuera de alcance)",
        ));
    }

    if has_findings && !contains_any(&conclusion_lower, DIFFERENTIAL_TERMS) {
        flags.push(flag(
            AuditCheck::MissingDifferential,
            Severity::Suggestion,
            "💡 AUDITORÍA: Incluye un diferencial diagnóstico breve",
        ));
    }

    if has_findings && !contains_any(&lower, LIMITATION_TERMS) {
        flags.push(flag(
            AuditCheck::MissingLimitations,
            Severity::Suggestion,
            "💡 AUDITORÍA: Menciona limitaciones técnicas si las hay",
        ));
    }

    if report.contains(&format!("[⚠️ {LOW_CONFIDENCE_LABEL}")) {
        flags.push(flag(
            AuditCheck::LowConfidenceMarked,
            Severity::Warning,
            "⚠️ AUDITORÍA: Hallazgos de baja confianza marcados - revisar criterios de inclusión",
        ));
    }

    if !hits.is_empty() {
        tracing::debug!(
            hits = hits.len(),
            first = %hits[0].reason,
            "Audit: unsafe language detected"
        );
    }

    flags
}

/// Append the audit section to `report`.
pub fn audit_report(report: String, template_text: &str, had_additions: bool) -> String {
    let flags = audit_flags(&report, template_text, had_additions);
    let safety = flags.iter().filter(|f| f.is_safety()).count();
    tracing::info!(flags = flags.len(), safety, "Audit complete");

    let mut out = report;
    if flags.is_empty() {
        out.push_str("\n\n");
        out.push_str(NO_FLAGS_NOTICE);
        return out;
    }

    let rule = "=".repeat(RULE_WIDTH);
    let lines: Vec<&str> = flags.iter().map(|f| f.message).collect();
    out.push_str(&format!(
        "\n\n{rule}\n{SECTION_TITLE}\n{rule}\n{}\n{rule}",
        lines.join("\n")
    ));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN: &str = "TÉCNICA:\nTC craneal sin contraste. Calidad diagnóstica adecuada.\n\n\
        HALLAZGOS:\nColección extraaxial frontal derecha de 12 mm de espesor.\n\
        Sin estudio previo para comparación.\n\n\
        CONCLUSIÓN:\nColección extraaxial frontal derecha. Diagnósticos probables: hematoma subdural.";

    fn checks(report: &str, had_additions: bool) -> Vec<AuditCheck> {
        audit_flags(report, "", had_additions)
            .into_iter()
            .map(|f| f.check)
            .collect()
    }

    #[test]
    fn clean_report_gets_no_flags_notice() {
        let out = audit_report(CLEAN.to_string(), "", true);
        assert!(out.starts_with(CLEAN));
        assert!(out.ends_with(&format!("\n\n{NO_FLAGS_NOTICE}")));
        assert!(!out.contains(SECTION_TITLE));
    }

    #[test]
    fn findings_without_support_raise_every_omission_in_order() {
        let report = "HALLAZGOS:\nOpacidad en lóbulo inferior derecho.\n\nCONCLUSIÓN:\nOpacidad.";
        assert_eq!(
            checks(report, false),
            vec![
                AuditCheck::ConclusionTooShort,
                AuditCheck::MissingPriorComparison,
                AuditCheck::MissingMeasurements,
                AuditCheck::MissingDifferential,
                AuditCheck::MissingLimitations,
            ]
        );
    }

    #[test]
    fn empty_findings_skip_findings_dependent_checks() {
        assert!(checks("HALLAZGOS:\n\nCONCLUSIÓN:\nNormal.", false).is_empty());
    }

    #[test]
    fn additions_count_as_findings() {
        let report = "Informe sin cabeceras.";
        assert!(checks(report, false).is_empty());
        assert!(checks(report, true).contains(&AuditCheck::ConclusionTooShort));
    }

    #[test]
    fn biopsy_always_raises_safety_flag() {
        let full = format!("{CLEAN}\nValorar biopsia.");
        for report in ["Se recomienda biopsia.", "Recommend biopsy.", full.as_str()] {
            let flags = audit_flags(report, "", false);
            assert!(
                flags
                    .iter()
                    .any(|f| f.check == AuditCheck::TreatmentLanguage && f.is_safety()),
                "{report}"
            );
        }
    }

    #[test]
    fn definitive_language_is_safety() {
        let flags = audit_flags("CONCLUSIÓN:\nSe diagnostica neumonía.", "", false);
        assert_eq!(flags.len(), 1);
        assert_eq!(flags[0].check, AuditCheck::DefinitiveLanguage);
        assert_eq!(flags[0].severity, Severity::Safety);
    }

    #[test]
    fn low_confidence_marker_is_reported() {
        let report = format!("{CLEAN}\n- Nódulo dudoso [⚠️ {LOW_CONFIDENCE_LABEL}: 40%]");
        assert_eq!(checks(&report, true), vec![AuditCheck::LowConfidenceMarked]);
    }

    #[test]
    fn completeness_section_is_not_part_of_conclusion() {
        let report = "HALLAZGOS:\nOpacidad en lóbulo inferior derecho.\n\nCONCLUSIÓN:\nOpacidad.\n\n\
            ======================================================================\n\
            📊 ANÁLISIS DE COMPLETITUD\n\
            💡 Diferencial muy breve - considera más opciones, diagnóstico probable";
        assert_eq!(conclusion_text(report).as_deref(), Some("Opacidad."));
        assert!(checks(report, false).contains(&AuditCheck::MissingDifferential));
    }

    #[test]
    fn flagged_report_is_framed() {
        let out = audit_report("Valorar cirugía.".to_string(), "", false);
        let rule = "=".repeat(70);
        assert_eq!(
            out,
            format!(
                "Valorar cirugía.\n\n{rule}\n{SECTION_TITLE}\n{rule}\n\
                 ❌ AUDITORÍA: Detectado lenguaje de tratamiento (fuera de alcance)\n{rule}"
            )
        );
    }

    #[test]
    fn section_text_helpers() {
        assert_eq!(
            findings_text("HALLAZGOS: inline\nsegunda\nCONCLUSIÓN:\nx").as_deref(),
            Some("inline\nsegunda")
        );
        assert_eq!(conclusion_text("sin conclusión"), None);
        assert_eq!(
            conclusion_text("CONCLUSIÓN: a\nCONCLUSIÓN:\nfinal").as_deref(),
            Some("final")
        );
    }
}
