//! JSON import envelopes
//!
//! An envelope is `{ "type": ..., "data": [...] | {...}, "options": {...} }`.
//! `data` may hold a single object; every element becomes one candidate record
//! of the envelope's type.

use crate::types::{CandidateRecord, EntityType, FieldMap, ImportError, PolicyOverrides};
use serde::Deserialize;
use serde_json::Value;

#[derive(Debug, Deserialize)]
struct RawEnvelope {
    #[serde(rename = "type")]
    entity_type: Option<String>,
    data: Option<Value>,
    #[serde(default)]
    options: Option<PolicyOverrides>,
}

/// A parsed JSON import request
#[derive(Debug, Clone, PartialEq)]
pub struct ImportEnvelope {
    pub entity_type: EntityType,
    pub records: Vec<CandidateRecord>,
    pub options: PolicyOverrides,
}

/// Parse a JSON envelope
///
/// # Errors
///
/// `ImportError::Parse` when the text is not well-formed JSON, when `type` or
/// `data` is missing, when `type` is not a known entity type, or when `data` is
/// neither an array nor an object. A non-object element inside `data` does not
/// fail the run; it becomes an unparsable candidate.
pub fn parse_envelope(input: &str) -> Result<ImportEnvelope, ImportError> {
    let raw: RawEnvelope = serde_json::from_str(input)?;

    let entity_type: EntityType = raw
        .entity_type
        .ok_or_else(|| ImportError::parse("import envelope is missing 'type'"))?
        .parse()
        .map_err(ImportError::parse)?;

    let elements = match raw.data {
        Some(Value::Array(elements)) => elements,
        Some(Value::Object(object)) => vec![Value::Object(object)],
        Some(Value::Null) | None => {
            return Err(ImportError::parse("import envelope is missing 'data'"))
        }
        Some(_) => {
            return Err(ImportError::parse(
                "'data' must be an array of records or a single record object",
            ))
        }
    };

    let records = elements
        .into_iter()
        .enumerate()
        .map(|(index, element)| to_candidate(index + 1, entity_type, element))
        .collect();

    Ok(ImportEnvelope {
        entity_type,
        records,
        options: raw.options.unwrap_or_default(),
    })
}

fn to_candidate(position: usize, entity_type: EntityType, element: Value) -> CandidateRecord {
    match element {
        Value::Object(fields) => CandidateRecord::new(position, entity_type, fields),
        other => {
            let mut fields = FieldMap::new();
            fields.insert("value".to_string(), other);
            let issue = "record is not a JSON object";
            CandidateRecord::unparsable(position, entity_type, fields, issue)
        }
    }
}
