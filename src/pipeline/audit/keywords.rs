use std::sync::LazyLock;

use regex::Regex;

use super::types::{KeywordHit, LanguageCategory};

/// A compiled pattern with its category.
struct AuditPattern {
    regex: Regex,
    category: LanguageCategory,
    description: &'static str,
}

/// Definitive diagnostic statements. A draft may only suggest.
static DEFINITIVE_PATTERNS: LazyLock<Vec<AuditPattern>> = LazyLock::new(|| {
    vec![
        pattern(
            r"(?i)\bes\b\s+\w+\s+(?:tumor|cáncer|neoplasia|malignidad)",
            LanguageCategory::Definitive,
            "Assertion: 'es un tumor/cáncer'",
        ),
        pattern(
            r"(?i)\bdiagnóstico\s+de\b",
            LanguageCategory::Definitive,
            "Diagnosis statement: 'diagnóstico de'",
        ),
        pattern(
            r"(?i)\bse\s+diagnostica\b",
            LanguageCategory::Definitive,
            "Diagnosis statement: 'se diagnostica'",
        ),
        pattern(
            r"(?i)\bconfirmad[oa]\b",
            LanguageCategory::Definitive,
            "Certainty claim: 'confirmado'",
        ),
        pattern(
            r"(?i)\bis\s+(?:a|an)\s+(?:\w+\s+)?(?:tumou?r|cancer|neoplasm|malignancy)\b",
            LanguageCategory::Definitive,
            "Assertion: 'is a tumor/cancer'",
        ),
        pattern(
            r"(?i)\bdiagnosis\s+of\b",
            LanguageCategory::Definitive,
            "Diagnosis statement: 'diagnosis of'",
        ),
        pattern(
            r"(?i)\bconfirmed\b",
            LanguageCategory::Definitive,
            "Certainty claim: 'confirmed'",
        ),
    ]
});

/// Treatment recommendations, outside the scope of a descriptive report.
static TREATMENT_PATTERNS: LazyLock<Vec<AuditPattern>> = LazyLock::new(|| {
    vec![
        pattern(r"(?i)\btratar\b", LanguageCategory::Treatment, "Treatment verb: 'tratar'"),
        pattern(r"(?i)\bcirugía\b", LanguageCategory::Treatment, "Procedure: 'cirugía'"),
        pattern(r"(?i)\bretinol\b", LanguageCategory::Treatment, "Drug: 'retinol'"),
        pattern(r"(?i)\bquimio", LanguageCategory::Treatment, "Therapy: 'quimio…'"),
        pattern(r"(?i)\bbiops", LanguageCategory::Treatment, "Procedure: 'biopsia/biopsy'"),
        pattern(r"(?i)\bsurgery\b", LanguageCategory::Treatment, "Procedure: 'surgery'"),
        pattern(r"(?i)\bchemo", LanguageCategory::Treatment, "Therapy: 'chemo…'"),
    ]
});

/// A number followed by a unit or a dimension separator.
static MEASUREMENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\d+\s*(?:mm|cm|x)").expect("Invalid measurement regex"));

fn pattern(regex_str: &str, category: LanguageCategory, description: &'static str) -> AuditPattern {
    AuditPattern {
        regex: Regex::new(regex_str).expect("Invalid audit regex pattern"),
        category,
        description,
    }
}

/// Every definitive and treatment phrase in `text`, in pattern order.
pub fn scan_language(text: &str) -> Vec<KeywordHit> {
    let mut hits = Vec::new();
    for patterns in [&*DEFINITIVE_PATTERNS, &*TREATMENT_PATTERNS] {
        for ap in patterns {
            for mat in ap.regex.find_iter(text) {
                hits.push(KeywordHit {
                    category: ap.category,
                    matched_text: mat.as_str().to_string(),
                    offset: mat.start(),
                    reason: ap.description,
                });
            }
        }
    }
    hits
}

pub fn has_measurement(text: &str) -> bool {
    MEASUREMENT.is_match(text)
}
