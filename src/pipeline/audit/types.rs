use serde::Serialize;

/// Which rule raised an audit flag. Declaration order is report order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditCheck {
    ConclusionTooShort,
    MissingPriorComparison,
    DefinitiveLanguage,
    MissingMeasurements,
    TreatmentLanguage,
    MissingDifferential,
    MissingLimitations,
    LowConfidenceMarked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Clinically unsafe wording; must be fixed before sign-off.
    Safety,
    Warning,
    Suggestion,
}

/// One advisory line appended to the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuditFlag {
    pub check: AuditCheck,
    pub severity: Severity,
    pub message: &'static str,
}

impl AuditFlag {
    pub fn is_safety(&self) -> bool {
        self.severity == Severity::Safety
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LanguageCategory {
    Definitive,
    Treatment,
}

/// A phrase matched by the language scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeywordHit {
    pub category: LanguageCategory,
    pub matched_text: String,
    /// Byte offset in the scanned text.
    pub offset: usize,
    pub reason: &'static str,
}
