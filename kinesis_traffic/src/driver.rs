//! The driver loop.
//!
//! ## Metrics
//!
//! `batches_sent`: Total batches the service answered
//! `records_sent`: Total records submitted
//! `record_failure`: Records the service reported as failed
//! `bytes_written`: Total bytes submitted, payloads plus partition keys
//! `request_failure`: `PutRecords` calls that failed outright
//!
//! The loop is strictly sequential: batch `i` is built, submitted and
//! reported before batch `i + 1` is built. The only pause is the fixed
//! interval after each batch. The first failed call ends the run.

use std::{io::Write, num::NonZeroU32};

use metrics::counter;
use tokio::time::{Duration, sleep};
use tracing::{debug, info, warn};

use crate::{
    config::Config,
    record::{batch_billed_len, build_batch_with_filler},
    submit::{self, Submit, SubmissionResult},
};

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Driver`].
pub enum Error {
    /// A `PutRecords` call failed, see [`crate::submit::Error`].
    #[error("Batch {iteration} failed: {source}")]
    Submit {
        /// One-based index of the batch that failed
        iteration: u32,
        /// Underlying submission error
        #[source]
        source: submit::Error,
    },
    /// Progress could not be written.
    #[error("Failed to write progress: {0}")]
    Io(#[from] std::io::Error),
}

/// Totals for a completed run.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    /// Batches submitted
    pub batches: u32,
    /// Records submitted across all batches
    pub records_submitted: u64,
    /// Records the service reported as failed
    pub records_failed: u64,
}

/// Drives a [`Submit`] implementation through a configured number of
/// batches, writing one progress line per batch to `W`.
#[derive(Debug)]
pub struct Driver<S, W> {
    stream_name: String,
    iterations: NonZeroU32,
    batch_size: NonZeroU32,
    record_size: usize,
    filler: u8,
    interval: Duration,
    submitter: S,
    progress: W,
    metric_labels: Vec<(String, String)>,
}

impl<S, W> Driver<S, W>
where
    S: Submit + Send,
    W: Write,
{
    /// Create a new [`Driver`] instance
    #[must_use]
    pub fn new(config: &Config, submitter: S, progress: W) -> Self {
        let metric_labels = vec![
            ("component".to_string(), "generator".to_string()),
            ("component_name".to_string(), "kinesis".to_string()),
            ("stream".to_string(), config.stream_name.clone()),
        ];

        Self {
            stream_name: config.stream_name.clone(),
            iterations: config.iterations,
            batch_size: config.batch_size,
            record_size: config.record_size_bytes(),
            filler: config.filler_byte(),
            interval: config.interval(),
            submitter,
            progress,
            metric_labels,
        }
    }

    /// Run [`Driver`] through every iteration.
    ///
    /// # Errors
    ///
    /// Returns the first submission error, after which no further batch is
    /// attempted. Also fails if the progress line cannot be written. The
    /// error is not logged here, callers report it.
    pub async fn run(&mut self) -> Result<Summary, Error> {
        info!(
            stream = %self.stream_name,
            iterations = self.iterations.get(),
            batch_size = self.batch_size.get(),
            record_size = self.record_size,
            "starting traffic run"
        );

        let mut summary = Summary::default();
        for iteration in 1..=self.iterations.get() {
            let batch = build_batch_with_filler(self.batch_size, self.record_size, self.filler);
            let submitted = batch.len();
            let bytes = batch_billed_len(&batch);

            let result = match self.submitter.submit(&self.stream_name, batch).await {
                Ok(result) => result,
                Err(source) => {
                    counter!("request_failure", &self.metric_labels).increment(1);
                    return Err(Error::Submit { iteration, source });
                }
            };

            writeln!(self.progress, "Put {submitted} records")?;
            self.progress.flush()?;

            self.observe(iteration, &result, bytes);
            summary.batches += 1;
            summary.records_submitted += submitted as u64;
            summary.records_failed += result.failed() as u64;

            sleep(self.interval).await;
        }

        info!(
            batches = summary.batches,
            records_submitted = summary.records_submitted,
            records_failed = summary.records_failed,
            "traffic run complete"
        );
        Ok(summary)
    }

    /// Consume the driver, returning the submitter and progress sink.
    #[must_use]
    pub fn into_inner(self) -> (S, W) {
        (self.submitter, self.progress)
    }

    fn observe(&self, iteration: u32, result: &SubmissionResult, bytes: usize) {
        let labels = &self.metric_labels;
        counter!("batches_sent", labels).increment(1);
        counter!("records_sent", labels).increment(result.submitted() as u64);
        counter!("bytes_written", labels).increment(bytes as u64);

        if result.failed() == 0 {
            debug!(iteration, "batch fully accepted");
            return;
        }
        // Partial failures are not retried and do not stop the run.
        counter!("record_failure", labels).increment(result.failed() as u64);
        warn!(
            iteration,
            failed = result.failed(),
            accepted = result.accepted(),
            error_codes = ?result.error_codes(),
            "service rejected records"
        );
    }
}
