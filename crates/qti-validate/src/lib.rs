//! QTI validation engine.
//!
//! One pre-order pass over a test or item document that collects every
//! authoring defect into a [`ValidationReport`] instead of failing on the
//! first one.
//!
//! ```text
//! AssessmentTest / AssessmentItem → Validator → ValidationReport { errors, warnings }
//! ```

pub mod checker;
pub mod infer;

pub use checker::{ItemCatalog, Validator};
pub use infer::{assignable, infer_base_type};

use qti_types::{AssessmentItem, AssessmentTest, ValidationReport, MAX_ERRORS};

/// A document to validate.
#[derive(Clone, Copy)]
pub enum Document<'a> {
    Test(&'a AssessmentTest),
    Item(&'a AssessmentItem),
}

/// Validate one document with the default error cap.
pub fn validate(document: Document<'_>) -> ValidationReport {
    match document {
        Document::Test(test) => validate_test(test, None, MAX_ERRORS),
        Document::Item(item) => validate_item(item, MAX_ERRORS),
    }
}

/// Validate a test; `items`, when given, enables checks against the
/// resolved items' declarations.
pub fn validate_test(
    test: &AssessmentTest,
    items: Option<&dyn ItemCatalog>,
    max_errors: usize,
) -> ValidationReport {
    let mut validator = Validator::new(max_errors);
    if let Some(items) = items {
        validator = validator.with_items(items);
    }
    validator.check_test(test);
    validator.finish()
}

pub fn validate_item(item: &AssessmentItem, max_errors: usize) -> ValidationReport {
    let mut validator = Validator::new(max_errors);
    validator.check_item(item);
    validator.finish()
}
