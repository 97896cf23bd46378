//! Lazy record cursors.
//!
//! A [`RecordCursor`] yields the records of one collection without loading
//! the whole table. It keeps its connection (or a lease on a transaction's
//! connection) until it is exhausted, closed, or dropped.

use std::any::Any;

use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{BackendError, StorageError, StorageResult};
use crate::types::Record;

/// Lazily yields the records of a collection.
///
/// Errors surface on the `next` call that hit them; after an error or the
/// last record the cursor yields `Ok(None)` and has already released its
/// connection.
pub struct RecordCursor {
    rows: BoxStream<'static, StorageResult<Record>>,
    // Declared after `rows` so the stream is dropped before the connection it reads from.
    lease: Option<Box<dyn Any + Send>>,
    producer: Option<JoinHandle<()>>,
    finished: bool,
}

impl std::fmt::Debug for RecordCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordCursor")
            .field("finished", &self.finished)
            .field("has_lease", &self.lease.is_some())
            .field("has_producer", &self.producer.is_some())
            .finish()
    }
}

impl RecordCursor {
    /// Wraps an async row stream that borrows from `lease`.
    ///
    /// The lease (a pooled client, a lock guard) is held until the stream
    /// ends, then dropped.
    pub fn from_stream<L>(rows: BoxStream<'static, StorageResult<Record>>, lease: L) -> Self
    where
        L: Any + Send,
    {
        Self {
            rows,
            lease: Some(Box::new(lease)),
            producer: None,
            finished: false,
        }
    }

    /// Wraps the receiving side of a blocking producer task.
    ///
    /// The producer owns the connection and stops when the receiver is
    /// dropped; [`close`](Self::close) waits for it to finish.
    pub fn from_channel(
        mut receiver: mpsc::Receiver<StorageResult<Record>>,
        producer: JoinHandle<()>,
    ) -> Self {
        let rows = stream::poll_fn(move |cx| receiver.poll_recv(cx)).boxed();
        Self {
            rows,
            lease: None,
            producer: Some(producer),
            finished: false,
        }
    }

    /// A cursor with no records.
    pub fn empty() -> Self {
        Self {
            rows: stream::empty().boxed(),
            lease: None,
            producer: None,
            finished: true,
        }
    }

    /// Returns the next record, or `None` once the collection is exhausted.
    pub async fn next(&mut self) -> StorageResult<Option<Record>> {
        if self.finished {
            return Ok(None);
        }
        match self.rows.next().await {
            Some(Ok(record)) => Ok(Some(record)),
            Some(Err(err)) => {
                self.release();
                Err(err)
            }
            None => {
                self.release();
                Ok(None)
            }
        }
    }

    /// Drains the remaining records into a vector.
    pub async fn collect(mut self) -> StorageResult<Vec<Record>> {
        let mut records = Vec::new();
        while let Some(record) = self.next().await? {
            records.push(record);
        }
        self.close().await?;
        Ok(records)
    }

    /// Returns true once the cursor has released its connection.
    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// Stops the cursor and waits until its connection is released.
    pub async fn close(mut self) -> StorageResult<()> {
        self.release();
        if let Some(producer) = self.producer.take() {
            producer.await.map_err(|e| {
                StorageError::Backend(BackendError::Internal {
                    backend_name: "cursor".to_string(),
                    message: format!("record producer failed: {}", e),
                    source: None,
                })
            })?;
        }
        Ok(())
    }

    fn release(&mut self) {
        self.finished = true;
        self.rows = stream::empty().boxed();
        self.lease = None;
    }
}
