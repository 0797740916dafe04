//! I/O module
//!
//! Handles import file parsing and report output.
//!
//! # Components
//!
//! - `csv_format` - CSV row conversion, in-memory CSV parsing, failure reports
//! - `async_reader` - Asynchronous CSV reader with batch reading interface
//! - `json_format` - JSON import envelopes

pub mod async_reader;
pub mod csv_format;
pub mod json_format;

pub use async_reader::AsyncCsvReader;
pub use csv_format::{parse_csv, write_failures_csv, RowConverter};
pub use json_format::{parse_envelope, ImportEnvelope};
