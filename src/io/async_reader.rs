//! Asynchronous CSV reader with batch interface
//!
//! Streams candidate records from any `AsyncRead` (a tokio file wrapped with
//! `tokio_util::compat`, or an in-memory cursor in tests).
//!
//! # Design
//!
//! The AsyncCsvReader uses:
//! - csv-async for streaming CSV parsing
//! - the same `RowConverter` as the in-memory parser, so both paths number and
//!   flag rows identically
//! - Batch reading, so a caller can bound how many rows it holds at once
//!
//! # Architecture
//!
//! ```text
//! AsyncRead → csv_async::AsyncReader → AsyncCsvReader → Batches of CandidateRecords
//!                                           ↓
//!                                   csv_format::RowConverter
//! ```

use crate::io::csv_format::RowConverter;
use crate::types::{CandidateRecord, EntityType, ImportError};
use csv_async::AsyncReaderBuilder;
use futures::io::AsyncRead;
use futures::stream::StreamExt;
use tracing::debug;

/// Asynchronous CSV reader
///
/// The header is read when the reader is opened; rows are converted lazily.
pub struct AsyncCsvReader<R: AsyncRead + Unpin + Send> {
    csv_reader: csv_async::AsyncReader<R>,
    converter: RowConverter,
}

impl<R: AsyncRead + Unpin + Send + 'static> AsyncCsvReader<R> {
    /// Open a reader and consume the header row
    ///
    /// # Errors
    ///
    /// `ImportError::Parse` for empty input or an unreadable header.
    pub async fn open(reader: R, entity_type: EntityType) -> Result<Self, ImportError> {
        let mut csv_reader = AsyncReaderBuilder::new()
            .flexible(true)
            .trim(csv_async::Trim::All)
            .create_reader(reader);

        let headers = csv_reader.headers().await?.clone();
        let converter = RowConverter::new(entity_type, headers.iter())?;
        debug!(columns = converter.headers().len(), "Read CSV header");

        Ok(Self {
            csv_reader,
            converter,
        })
    }

    /// Read up to `batch_size` candidate records
    ///
    /// All-empty rows are skipped without counting toward the batch. Rows the
    /// reader cannot decode come back as unparsable candidates. Returns an empty
    /// vector once the input is exhausted.
    pub async fn read_batch(&mut self, batch_size: usize) -> Vec<CandidateRecord> {
        let mut batch = Vec::with_capacity(batch_size);
        let mut records = self.csv_reader.records();

        while batch.len() < batch_size {
            match records.next().await {
                Some(Ok(row)) => batch.extend(self.converter.convert(row.iter())),
                Some(Err(e)) => batch.push(self.converter.unreadable(e.to_string())),
                None => break,
            }
        }

        batch
    }

    /// Read every remaining record, `batch_size` rows at a time
    pub async fn read_all(&mut self, batch_size: usize) -> Vec<CandidateRecord> {
        let batch_size = batch_size.max(1);
        let mut candidates = Vec::new();
        loop {
            let batch = self.read_batch(batch_size).await;
            if batch.is_empty() {
                break;
            }
            candidates.extend(batch);
        }
        candidates
    }
}
