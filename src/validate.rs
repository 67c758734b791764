//! Field-level validation for inbound book and transaction payloads.
//!
//! Every check returns a structured [`ValidationReport`] listing each
//! offending field, so the HTTP layer can echo them back verbatim.

use std::fmt;

use serde::Serialize;

use crate::{
    book::{BookDraft, BookPatch},
    transaction::TransactionDraft,
};

/// Upper bound on title and author length, in characters.
pub const MAX_SHORT_TEXT: usize = 255;

/// A single rejected field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Wire name of the field.
    pub field: &'static str,
    /// Human-readable reason.
    pub message: String,
}

/// Accumulated validation failures; empty means valid.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    /// Failures in the order they were found.
    pub errors: Vec<FieldError>,
}

impl ValidationReport {
    /// Report with a single failure.
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut report = Self::default();
        report.push(field, message);
        report
    }

    /// Records a failure for `field`.
    pub fn push(&mut self, field: &'static str, message: impl Into<String>) {
        self.errors.push(FieldError {
            field,
            message: message.into(),
        });
    }

    /// True when no failures were recorded.
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Converts into `Err(self)` when any failure was recorded.
    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for err in &self.errors {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{}: {}", err.field, err.message)?;
            first = false;
        }
        Ok(())
    }
}

/// Validates a create payload.
pub fn validate_draft(draft: &BookDraft) -> Result<(), ValidationReport> {
    let mut report = ValidationReport::default();
    check_short_text(&mut report, "title", &draft.title);
    check_short_text(&mut report, "author", &draft.author);
    check_isbn(&mut report, &draft.isbn);
    check_not_blank(&mut report, "description", &draft.description);
    report.into_result()
}

/// Validates the fields present in an update payload.
pub fn validate_patch(patch: &BookPatch) -> Result<(), ValidationReport> {
    let mut report = ValidationReport::default();
    if let Some(title) = &patch.title {
        check_short_text(&mut report, "title", title);
    }
    if let Some(author) = &patch.author {
        check_short_text(&mut report, "author", author);
    }
    if let Some(isbn) = &patch.isbn {
        check_isbn(&mut report, isbn);
    }
    if let Some(description) = &patch.description {
        check_not_blank(&mut report, "description", description);
    }
    report.into_result()
}

/// Validates a manually recorded transaction.
pub fn validate_transaction(draft: &TransactionDraft) -> Result<(), ValidationReport> {
    let mut report = ValidationReport::default();
    if let Some(user_id) = &draft.user_id {
        check_not_blank(&mut report, "userId", user_id);
    }
    if let Some(notes) = &draft.notes {
        check_not_blank(&mut report, "notes", notes);
    }
    report.into_result()
}

/// Validates the patron id supplied to a check-out.
pub fn validate_user_id(user_id: &str) -> Result<(), ValidationReport> {
    let mut report = ValidationReport::default();
    check_not_blank(&mut report, "userId", user_id);
    report.into_result()
}

/// True when `raw` is a checksum-valid ISBN-10 or ISBN-13.
///
/// Spaces and hyphens are ignored.
pub fn is_valid_isbn(raw: &str) -> bool {
    let compact: Vec<char> = raw.chars().filter(|c| *c != '-' && *c != ' ').collect();
    match compact.len() {
        10 => is_valid_isbn10(&compact),
        13 => is_valid_isbn13(&compact),
        _ => false,
    }
}

fn is_valid_isbn10(chars: &[char]) -> bool {
    let mut sum = 0u32;
    for (i, c) in chars.iter().enumerate() {
        let value = match c.to_digit(10) {
            Some(d) => d,
            None if *c == 'X' && i == 9 => 10,
            None => return false,
        };
        sum += value * (10 - i as u32);
    }
    sum % 11 == 0
}

fn is_valid_isbn13(chars: &[char]) -> bool {
    let mut sum = 0u32;
    for (i, c) in chars.iter().enumerate() {
        let Some(d) = c.to_digit(10) else {
            return false;
        };
        sum += if i % 2 == 0 { d } else { d * 3 };
    }
    sum % 10 == 0
}

fn check_not_blank(report: &mut ValidationReport, field: &'static str, value: &str) -> bool {
    if value.trim().is_empty() {
        report.push(field, format!("{field} should not be empty"));
        return false;
    }
    true
}

fn check_short_text(report: &mut ValidationReport, field: &'static str, value: &str) {
    if check_not_blank(report, field, value) && value.chars().count() > MAX_SHORT_TEXT {
        report.push(
            field,
            format!("{field} must be shorter than or equal to {MAX_SHORT_TEXT} characters"),
        );
    }
}

fn check_isbn(report: &mut ValidationReport, isbn: &str) {
    if check_not_blank(report, "isbn", isbn) && !is_valid_isbn(isbn) {
        report.push("isbn", "isbn must be an ISBN");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft() -> BookDraft {
        BookDraft {
            title: "T".to_string(),
            author: "A".to_string(),
            isbn: "978-3-16-148410-0".to_string(),
            description: "D".to_string(),
        }
    }

    #[test]
    fn accepts_isbn13_and_isbn10() {
        assert!(is_valid_isbn("978-3-16-148410-0"));
        assert!(is_valid_isbn("9780306406157"));
        assert!(is_valid_isbn("0-306-40615-2"));
        assert!(is_valid_isbn("0 8044 2957 X"));
    }

    #[test]
    fn rejects_bad_checksum_and_shape() {
        assert!(!is_valid_isbn("978-3-16-148410-1"));
        assert!(!is_valid_isbn("0-306-40615-3"));
        assert!(!is_valid_isbn("X306406152"));
        assert!(!is_valid_isbn("12345"));
        assert!(!is_valid_isbn(""));
    }

    #[test]
    fn valid_draft_passes() {
        assert_eq!(validate_draft(&draft()), Ok(()));
    }

    #[test]
    fn draft_reports_every_bad_field() {
        let bad = BookDraft {
            title: "  ".to_string(),
            author: "a".repeat(MAX_SHORT_TEXT + 1),
            isbn: "not-an-isbn".to_string(),
            description: String::new(),
        };
        let report = validate_draft(&bad).unwrap_err();
        let fields: Vec<_> = report.errors.iter().map(|e| e.field).collect();
        assert_eq!(fields, vec!["title", "author", "isbn", "description"]);
    }

    #[test]
    fn patch_only_checks_present_fields() {
        assert_eq!(validate_patch(&BookPatch::default()), Ok(()));

        let patch = BookPatch {
            isbn: Some("123".to_string()),
            ..BookPatch::default()
        };
        let report = validate_patch(&patch).unwrap_err();
        assert_eq!(report.to_string(), "isbn: isbn must be an ISBN");
    }
}
