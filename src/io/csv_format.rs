//! CSV format handling for import files and failure reports
//!
//! This module centralizes all CSV format concerns, providing:
//! - `RowConverter`, shared by the sync and async readers, turning header and
//!   row cells into `CandidateRecord`s
//! - `parse_csv` for in-memory input
//! - `write_failures_csv` for the per-record failure report
//!
//! All functions are pure (no file I/O) for easy testing.

use crate::types::{CandidateRecord, EntityType, FieldMap, ImportError, ImportOutcome};
use csv::{ReaderBuilder, Trim, Writer};
use serde_json::Value;
use std::io::Write;

/// Maps CSV rows onto the header of one input
///
/// Positions are 1-based and count only the rows that produce a candidate, so
/// blank rows never shift the numbering an administrator sees.
#[derive(Debug, Clone)]
pub struct RowConverter {
    entity_type: EntityType,
    headers: Vec<String>,
    next_position: usize,
}

impl RowConverter {
    /// Build a converter from the header cells
    ///
    /// # Errors
    ///
    /// `ImportError::Parse` when the header is missing or has no named column.
    pub fn new<'a>(
        entity_type: EntityType,
        headers: impl IntoIterator<Item = &'a str>,
    ) -> Result<Self, ImportError> {
        let headers: Vec<String> = headers.into_iter().map(|h| h.trim().to_string()).collect();
        if headers.iter().all(|h| h.is_empty()) {
            return Err(ImportError::parse("CSV input is empty or has no header row"));
        }

        Ok(Self {
            entity_type,
            headers,
            next_position: 1,
        })
    }

    pub fn headers(&self) -> &[String] {
        &self.headers
    }

    /// Convert one row
    ///
    /// Returns `None` for a row whose cells are all empty. A row with a different
    /// column count than the header becomes an unparsable candidate; the caller
    /// keeps reading the rows after it.
    pub fn convert<'a>(
        &mut self,
        cells: impl IntoIterator<Item = &'a str>,
    ) -> Option<CandidateRecord> {
        let cells: Vec<&str> = cells.into_iter().map(str::trim).collect();
        if cells.iter().all(|c| c.is_empty()) {
            return None;
        }

        let position = self.take_position();
        let fields: FieldMap = self
            .headers
            .iter()
            .zip(cells.iter())
            .filter(|(header, cell)| !header.is_empty() && !cell.is_empty())
            .map(|(header, cell)| (header.clone(), Value::String(cell.to_string())))
            .collect();

        if cells.len() != self.headers.len() {
            return Some(CandidateRecord::unparsable(
                position,
                self.entity_type,
                fields,
                format!(
                    "expected {} columns, found {}",
                    self.headers.len(),
                    cells.len()
                ),
            ));
        }

        Some(CandidateRecord::new(position, self.entity_type, fields))
    }

    /// A row the CSV reader itself could not decode
    pub fn unreadable(&mut self, message: impl Into<String>) -> CandidateRecord {
        let position = self.take_position();
        CandidateRecord::unparsable(position, self.entity_type, FieldMap::new(), message)
    }

    fn take_position(&mut self) -> usize {
        let position = self.next_position;
        self.next_position += 1;
        position
    }
}

/// Parse CSV text into candidate records of one entity type
pub fn parse_csv(
    input: &str,
    entity_type: EntityType,
) -> Result<Vec<CandidateRecord>, ImportError> {
    let mut reader = ReaderBuilder::new()
        .flexible(true)
        .trim(Trim::All)
        .from_reader(input.as_bytes());

    let headers = reader.headers()?.clone();
    let mut converter = RowConverter::new(entity_type, headers.iter())?;

    let mut candidates = Vec::new();
    for row in reader.records() {
        match row {
            Ok(row) => candidates.extend(converter.convert(row.iter())),
            Err(e) => candidates.push(converter.unreadable(e.to_string())),
        }
    }

    Ok(candidates)
}

/// Write the failed records of an outcome as CSV
///
/// One row per error with columns: position, field, message, input. The raw
/// input is written as compact JSON. Rows are ordered by position.
pub fn write_failures_csv(
    outcome: &ImportOutcome,
    output: &mut dyn Write,
) -> Result<(), ImportError> {
    let write_failed = |e: csv::Error| ImportError::Io {
        message: format!("Failed to write failure report: {}", e),
    };
    let mut writer = Writer::from_writer(output);

    writer
        .write_record(["position", "field", "message", "input"])
        .map_err(write_failed)?;

    for failure in &outcome.failed {
        let input = serde_json::to_string(&failure.input).map_err(|e| ImportError::Serialization {
            message: e.to_string(),
        })?;
        for error in &failure.errors {
            writer
                .write_record([
                    failure.position.to_string().as_str(),
                    error.field.as_deref().unwrap_or(""),
                    error.message.as_str(),
                    input.as_str(),
                ])
                .map_err(write_failed)?;
        }
    }

    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;
    use uuid::Uuid;

    #[test]
    fn test_parse_csv_maps_header_to_cells() {
        let input = " lesson_id , title ,skill\nllm-01, Tokens ,LLMs\nllm-02,Context,LLMs\n";
        let candidates = parse_csv(input, EntityType::Lesson).unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(candidates[0].position, 1);
        assert_eq!(candidates[0].fields.get("title"), Some(&json!("Tokens")));
        assert_eq!(candidates[1].position, 2);
        assert_eq!(candidates[1].fields.get("lesson_id"), Some(&json!("llm-02")));
        assert!(candidates.iter().all(|c| c.parse_issue.is_none()));
    }

    #[test]
    fn test_parse_csv_skips_blank_rows_and_omits_empty_cells() {
        let input = "title,description\nRust 101,\n,\n\nGo 101,Intro\n";
        let candidates = parse_csv(input, EntityType::Course).unwrap();

        assert_eq!(candidates.len(), 2);
        assert!(!candidates[0].fields.contains_key("description"));
        assert_eq!(candidates[1].position, 2);
    }

    #[test]
    fn test_parse_csv_column_mismatch_is_isolated() {
        let input = "email,course_id\na@example.com,c-1,extra\nb@example.com,c-1\n";
        let candidates = parse_csv(input, EntityType::Enrollment).unwrap();

        assert_eq!(candidates.len(), 2);
        assert_eq!(
            candidates[0].parse_issue.as_deref(),
            Some("expected 2 columns, found 3")
        );
        assert!(candidates[1].parse_issue.is_none());
    }

    #[rstest]
    #[case::empty("")]
    #[case::blank_header(",,\n")]
    fn test_parse_csv_without_header_fails(#[case] input: &str) {
        let err = parse_csv(input, EntityType::Course).unwrap_err();
        assert!(matches!(err, ImportError::Parse { .. }));
        assert!(err.is_run_level());
    }

    #[test]
    fn test_parse_csv_header_only_yields_no_records() {
        let candidates = parse_csv("title,description\n", EntityType::Course).unwrap();
        assert!(candidates.is_empty());
    }

    #[test]
    fn test_write_failures_csv() {
        let mut outcome = ImportOutcome::new(Uuid::nil(), EntityType::Enrollment, 2, false);
        outcome.record_failed(
            2,
            None,
            json!({"email": "ghost@example.com"}),
            &ImportError::unknown_user("ghost@example.com"),
        );

        let mut output = Vec::new();
        write_failures_csv(&outcome, &mut output).unwrap();
        let text = String::from_utf8(output).unwrap();

        let mut lines = text.lines();
        assert_eq!(lines.next(), Some("position,field,message,input"));
        let row = lines.next().unwrap();
        assert!(row.starts_with("2,"));
        assert!(row.contains("No user found with email ghost@example.com"));
        assert!(row.contains(r#""{""email"":""ghost@example.com""}""#));
        assert_eq!(lines.next(), None);
    }
}
