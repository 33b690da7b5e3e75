//! A submitter that prints records instead of sending them.
//!
//! Each record becomes one line, `<partition key>\t<payload>`. Every record is
//! reported accepted.

use std::io::Write;

use async_trait::async_trait;

use super::{Error, Submit, SubmissionResult};
use crate::record::Record;

/// Writes batches to `W` rather than the service.
#[derive(Debug)]
pub struct DryRun<W> {
    writer: W,
}

impl<W> DryRun<W>
where
    W: Write + Send,
{
    /// Create a new [`DryRun`] writing to `writer`.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Recover the underlying writer.
    #[must_use]
    pub fn into_inner(self) -> W {
        self.writer
    }
}

#[async_trait]
impl<W> Submit for DryRun<W>
where
    W: Write + Send,
{
    async fn submit(
        &mut self,
        _stream_name: &str,
        batch: Vec<Record>,
    ) -> Result<SubmissionResult, Error> {
        for record in &batch {
            self.writer.write_all(record.partition_key.as_bytes())?;
            self.writer.write_all(b"\t")?;
            self.writer.write_all(&record.data)?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(SubmissionResult::all_accepted(batch.len()))
    }
}
