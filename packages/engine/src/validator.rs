//! Structural validation of extracted citations
//!
//! Deterministic and side-effect free: the same citation and cache always
//! produce the same [`ValidationResult`], so validation runs unconditionally
//! before any costly verification step.

use tracing::debug;

use crate::cache::FileCache;
use crate::types::{ExtractedCitation, FailureType, StructuralError, ValidationResult};

/// Check that a citation points at existing, textual lines.
///
/// Checks run in order and stop at the first failure:
/// file present, range well-formed, `start_line >= 1`, `end_line >= start_line`,
/// `end_line <= line_count`, file not binary.
pub fn validate_citation(extracted: &ExtractedCitation, cache: &dyn FileCache) -> ValidationResult {
    let citation = &extracted.citation;

    let failure = |failure_type: FailureType, message: String| {
        debug!(citation = %extracted.raw, %failure_type, %message, "citation invalid");
        ValidationResult {
            extracted: extracted.clone(),
            valid: false,
            error: Some(StructuralError {
                failure_type,
                message,
            }),
            cited_content: None,
        }
    };

    let Some(file) = cache.get(&citation.file_path) else {
        return failure(
            FailureType::InvalidFile,
            format!("File not found in cache: {}", citation.file_path),
        );
    };

    if let Some(problem) = &extracted.malformed {
        return failure(
            FailureType::InvalidRange,
            format!("Malformed citation {}: {problem}", extracted.raw),
        );
    }

    if citation.start_line < 1 {
        return failure(
            FailureType::InvalidRange,
            format!(
                "Start line {} is not positive (lines are 1-indexed)",
                citation.start_line
            ),
        );
    }

    if citation.end_line < citation.start_line {
        return failure(
            FailureType::InvalidRange,
            format!(
                "End line {} is before start line {}",
                citation.end_line, citation.start_line
            ),
        );
    }

    if citation.end_line > file.line_count {
        return failure(
            FailureType::InvalidRange,
            format!(
                "End line {} out of range (file has {} lines)",
                citation.end_line, file.line_count
            ),
        );
    }

    if file.is_binary {
        return failure(
            FailureType::BinaryFile,
            format!("File is binary: {}", citation.file_path),
        );
    }

    let Some(content) = file.slice(citation.start_line, citation.end_line) else {
        return failure(
            FailureType::InvalidRange,
            format!(
                "Lines {}-{} unavailable in {}",
                citation.start_line, citation.end_line, citation.file_path
            ),
        );
    };

    ValidationResult {
        extracted: extracted.clone(),
        valid: true,
        error: None,
        cited_content: Some(content),
    }
}

/// Validate a batch of citations, preserving order.
pub fn validate_all(extracted: &[ExtractedCitation], cache: &dyn FileCache) -> Vec<ValidationResult> {
    extracted
        .iter()
        .map(|e| validate_citation(e, cache))
        .collect()
}
