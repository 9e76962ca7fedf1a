use crate::Location;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Default number of errors stored in a [`ValidationReport`].
pub const MAX_ERRORS: usize = 50;

/// Diagnostic severity.
///
/// Errors mean the document should not be delivered; warnings are reported
/// but delivery may proceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

/// Diagnostic category, determined by error code range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorCategory {
    Identifier,
    Type,
    Lookup,
    Flow,
    Reference,
}

/// Numeric diagnostic code (E100–E599).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ErrorCode(pub u16);

impl ErrorCode {
    // ── Identifier errors (E100–E199) ──
    pub const DUPLICATE_IDENTIFIER: Self = Self(100);
    pub const RESERVED_IDENTIFIER: Self = Self(101);

    // ── Type errors (E200–E299) ──
    pub const TYPE_MISMATCH: Self = Self(200);
    pub const INVALID_DEFAULT_VALUE: Self = Self(201);
    pub const MISSING_BASE_TYPE: Self = Self(202);

    // ── Lookup table errors (E300–E399) ──
    pub const LOOKUP_NOT_SINGLE: Self = Self(300);
    pub const MATCH_TABLE_NOT_INTEGER: Self = Self(301);
    pub const LOOKUP_TARGET_TYPE: Self = Self(302);
    pub const INTERPOLATION_ORDER: Self = Self(303);
    pub const DUPLICATE_SOURCE_VALUE: Self = Self(304);
    pub const MISSING_LOOKUP_TABLE: Self = Self(305);

    // ── Item flow errors (E400–E499) ──
    pub const UNKNOWN_BRANCH_TARGET: Self = Self(400);
    pub const BACKWARD_JUMP: Self = Self(401);
    pub const JUMP_INTO_CHILD: Self = Self(402);
    pub const INVALID_JUMP_SCOPE: Self = Self(403);
    pub const INVALID_SPECIAL_TARGET: Self = Self(404);
    pub const IGNORED_JUMP: Self = Self(405);
    pub const INVALID_TIME_LIMIT: Self = Self(406);
    pub const EMPTY_TEST_PART: Self = Self(407);
    pub const EMPTY_SECTION: Self = Self(408);
    pub const MISPLACED_CONTROL: Self = Self(409);

    // ── Reference errors (E500–E599) ──
    pub const UNDECLARED_VARIABLE: Self = Self(500);
    pub const DOTTED_REFERENCE_IN_ITEM: Self = Self(501);
    pub const UNKNOWN_ITEM_REF: Self = Self(502);
    pub const UNDECLARED_ITEM_VARIABLE: Self = Self(503);
    pub const UNDECLARED_OUTCOME: Self = Self(504);
    pub const UNRESOLVED_ITEM: Self = Self(505);

    /// Get the category for this error code.
    pub fn category(self) -> ErrorCategory {
        match self.0 {
            100..=199 => ErrorCategory::Identifier,
            200..=299 => ErrorCategory::Type,
            300..=399 => ErrorCategory::Lookup,
            400..=499 => ErrorCategory::Flow,
            _ => ErrorCategory::Reference,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E{}", self.0)
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier => write!(f, "identifier"),
            Self::Type => write!(f, "type"),
            Self::Lookup => write!(f, "lookup"),
            Self::Flow => write!(f, "flow"),
            Self::Reference => write!(f, "reference"),
        }
    }
}

/// A structured content-authoring diagnostic.
///
/// Hosts render these; they must not parse free-form strings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub code: ErrorCode,
    pub severity: Severity,
    /// Derived from `code`.
    pub category: ErrorCategory,
    pub message: String,
    /// Path of the offending node.
    pub location: Location,
    /// Optional fix suggestion.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl Diagnostic {
    /// Create an error diagnostic.
    pub fn error(code: ErrorCode, message: impl Into<String>, location: Location) -> Self {
        Self {
            code,
            severity: Severity::Error,
            category: code.category(),
            message: message.into(),
            location,
            suggestion: None,
        }
    }

    /// Create a warning diagnostic.
    pub fn warning(code: ErrorCode, message: impl Into<String>, location: Location) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message, location)
        }
    }

    /// Attach a fix suggestion.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} [{}] {}",
            self.location, self.code, self.category, self.message
        )
    }
}

/// The full error/warning report produced by one validation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ValidationReport {
    pub errors: Vec<Diagnostic>,
    pub warnings: Vec<Diagnostic>,
    pub total_errors: usize,
    pub total_warnings: usize,
    #[serde(skip, default = "default_max_errors")]
    max_errors: usize,
}

fn default_max_errors() -> usize {
    MAX_ERRORS
}

impl ValidationReport {
    /// Create an empty report storing at most [`MAX_ERRORS`] errors.
    pub fn empty() -> Self {
        Self::with_max_errors(MAX_ERRORS)
    }

    /// Create an empty report storing at most `max_errors` errors.
    pub fn with_max_errors(max_errors: usize) -> Self {
        Self {
            errors: Vec::new(),
            warnings: Vec::new(),
            total_errors: 0,
            total_warnings: 0,
            max_errors,
        }
    }

    pub fn has_errors(&self) -> bool {
        self.total_errors > 0
    }

    /// No errors and no warnings.
    pub fn is_clean(&self) -> bool {
        self.total_errors == 0 && self.total_warnings == 0
    }

    /// Add an error, respecting the stored-error limit.
    pub fn push_error(&mut self, error: Diagnostic) {
        if self.errors.len() < self.max_errors {
            self.errors.push(error);
        }
        self.total_errors += 1;
    }

    pub fn push_warning(&mut self, warning: Diagnostic) {
        self.warnings.push(warning);
        self.total_warnings += 1;
    }

    /// Route a diagnostic by its severity.
    pub fn push(&mut self, diagnostic: Diagnostic) {
        match diagnostic.severity {
            Severity::Error => self.push_error(diagnostic),
            Severity::Warning => self.push_warning(diagnostic),
        }
    }

    /// All stored diagnostics (errors first) carrying `code`.
    pub fn with_code(&self, code: ErrorCode) -> Vec<&Diagnostic> {
        self.errors
            .iter()
            .chain(self.warnings.iter())
            .filter(|d| d.code == code)
            .collect()
    }
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for d in self.errors.iter().chain(self.warnings.iter()) {
            writeln!(f, "{d}")?;
        }
        write!(
            f,
            "{} error(s), {} warning(s)",
            self.total_errors, self.total_warnings
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc() -> Location {
        Location::root("assessmentTest", "T").child("testPart", "P1")
    }

    #[test]
    fn test_error_code_category() {
        assert_eq!(
            ErrorCode::DUPLICATE_IDENTIFIER.category(),
            ErrorCategory::Identifier
        );
        assert_eq!(ErrorCode::TYPE_MISMATCH.category(), ErrorCategory::Type);
        assert_eq!(
            ErrorCode::MATCH_TABLE_NOT_INTEGER.category(),
            ErrorCategory::Lookup
        );
        assert_eq!(ErrorCode::BACKWARD_JUMP.category(), ErrorCategory::Flow);
        assert_eq!(
            ErrorCode::UNDECLARED_VARIABLE.category(),
            ErrorCategory::Reference
        );
    }

    #[test]
    fn test_error_code_display() {
        assert_eq!(format!("{}", ErrorCode::DUPLICATE_IDENTIFIER), "E100");
        assert_eq!(format!("{}", ErrorCode::UNKNOWN_BRANCH_TARGET), "E400");
    }

    #[test]
    fn test_diagnostic_creation() {
        let d = Diagnostic::error(ErrorCode::DUPLICATE_IDENTIFIER, "Duplicate identifier: Q1", loc());
        assert_eq!(d.severity, Severity::Error);
        assert_eq!(d.category, ErrorCategory::Identifier);
        let w = Diagnostic::warning(ErrorCode::EMPTY_SECTION, "Empty section", loc());
        assert_eq!(w.severity, Severity::Warning);
        assert_eq!(w.category, ErrorCategory::Flow);
    }

    #[test]
    fn test_diagnostic_with_suggestion() {
        let d = Diagnostic::error(ErrorCode::RESERVED_IDENTIFIER, "Reserved", loc())
            .with_suggestion("Rename the section");
        assert_eq!(d.suggestion.as_deref(), Some("Rename the section"));
    }

    #[test]
    fn test_diagnostic_json_serialization() {
        let d = Diagnostic::error(ErrorCode::TYPE_MISMATCH, "Type mismatch", loc());
        let json = serde_json::to_string(&d).unwrap();
        assert!(json.contains("\"code\":200"));
        assert!(json.contains("\"severity\":\"error\""));
        assert!(json.contains("\"location\":\"assessmentTest[T]/testPart[P1]\""));
        assert!(!json.contains("suggestion"));
        let back: Diagnostic = serde_json::from_str(&json).unwrap();
        assert_eq!(back, d);
    }

    #[test]
    fn test_report_max_limit() {
        let mut report = ValidationReport::with_max_errors(3);
        for i in 0..5 {
            report.push_error(Diagnostic::error(
                ErrorCode::DUPLICATE_IDENTIFIER,
                format!("Error {i}"),
                loc(),
            ));
        }
        assert_eq!(report.errors.len(), 3);
        assert_eq!(report.total_errors, 5);
        assert!(report.has_errors());
    }

    #[test]
    fn test_report_routes_by_severity() {
        let mut report = ValidationReport::empty();
        assert!(report.is_clean());
        report.push(Diagnostic::warning(ErrorCode::INTERPOLATION_ORDER, "unsorted", loc()));
        assert!(!report.has_errors());
        assert!(!report.is_clean());
        report.push(Diagnostic::error(ErrorCode::BACKWARD_JUMP, "back", loc()));
        assert_eq!(report.total_errors, 1);
        assert_eq!(report.total_warnings, 1);
        assert_eq!(report.with_code(ErrorCode::BACKWARD_JUMP).len(), 1);
    }

    #[test]
    fn test_report_json_output() {
        let mut report = ValidationReport::empty();
        report.push_error(Diagnostic::error(ErrorCode::TYPE_MISMATCH, "Type mismatch", loc()));
        let json = serde_json::to_string(&report).unwrap();
        assert!(json.contains("\"total_errors\":1"));
        assert!(json.contains("\"total_warnings\":0"));
        assert!(!json.contains("max_errors"));
    }
}
