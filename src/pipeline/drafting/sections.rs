// Section-header detection shared by the applier and the audit.
// Templates are Spanish; the English headers are accepted as aliases.

/// Headers that open the findings section.
pub const FINDINGS_HEADERS: &[&str] = &["HALLAZGOS", "FINDINGS"];

/// Headers that open the conclusion section.
pub const CONCLUSION_HEADERS: &[&str] = &["CONCLUSIÓN", "CONCLUSION"];

/// Sub-headings emitted by the conclusion renderer.
pub const CONCLUSION_SUBHEADINGS: &[&str] = &[
    "Hallazgos positivos:",
    "Impresión:",
    "Diagnósticos probables (diferencial):",
    "Sugerencias:",
    "Elementos del LESIÓMETRO no caracterizables en la imagen aportada:",
];

fn starts_with_any(line: &str, headers: &[&str]) -> bool {
    let upper = line.trim().to_uppercase();
    headers.iter().any(|h| upper.starts_with(h))
}

/// The renderer's own "Hallazgos positivos:" sub-heading does not count.
pub fn is_findings_header(line: &str) -> bool {
    starts_with_any(line, FINDINGS_HEADERS) && !CONCLUSION_SUBHEADINGS.contains(&line.trim())
}

pub fn is_conclusion_header(line: &str) -> bool {
    starts_with_any(line, CONCLUSION_HEADERS)
}

/// A line that ends a section body: any trimmed line ending in ':'.
/// Template sections named like a renderer sub-heading are boundaries too.
pub fn is_section_boundary(line: &str) -> bool {
    line.trim().ends_with(':')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn findings_header_is_case_insensitive() {
        assert!(is_findings_header("HALLAZGOS:"));
        assert!(is_findings_header("  hallazgos:"));
        assert!(is_findings_header("Findings:"));
        assert!(!is_findings_header("Sin hallazgos relevantes"));
        assert!(!is_findings_header("Hallazgos positivos:"));
    }

    #[test]
    fn conclusion_header_handles_accented_lowercase() {
        assert!(is_conclusion_header("conclusión:"));
        assert!(is_conclusion_header("CONCLUSIÓN:"));
        assert!(is_conclusion_header("Conclusion:"));
        assert!(!is_conclusion_header("En conclusión"));
    }

    #[test]
    fn any_colon_terminated_line_is_a_boundary() {
        assert!(is_section_boundary("RECOMENDACIONES:"));
        assert!(is_section_boundary("  Sugerencias:  "));
        assert!(is_section_boundary("Impresión:"));
        assert!(!is_section_boundary("- hallazgo"));
    }
}
