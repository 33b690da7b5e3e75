//! Batch submitters
//!
//! A submitter is responsible for handing one batch of records to the
//! ingestion service in a single call. Every submitter works the same way: the
//! batch is consumed, the call is made exactly once and the per-record
//! outcome is reported back as a [`SubmissionResult`]. Nothing is retried. A
//! service that accepts only part of a batch still counts as a completed
//! submission, it is up to the caller to look at [`SubmissionResult::failed`].

use async_trait::async_trait;

use crate::record::Record;

pub mod dry_run;
pub mod kinesis;

pub use dry_run::DryRun;
pub use kinesis::Kinesis;

#[derive(thiserror::Error, Debug)]
/// Errors produced by [`Submit`] implementations.
pub enum Error {
    /// The `PutRecords` call itself failed. Nothing in the batch was written.
    #[error("PutRecords to stream {stream} failed: {source}")]
    PutRecords {
        /// Target stream
        stream: String,
        /// Underlying service error
        #[source]
        source: Box<aws_sdk_kinesis::Error>,
    },
    /// A request entry could not be built from a record.
    #[error("Failed to build request entry: {0}")]
    Build(#[from] aws_sdk_kinesis::error::BuildError),
    /// Wrapper around [`std::io::Error`].
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The fate of one record within a submitted batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecordOutcome {
    /// The service stored the record
    Accepted {
        /// Shard the record landed on, unknown for dry runs
        shard_id: Option<String>,
        /// Sequence number assigned by the shard, unknown for dry runs
        sequence_number: Option<String>,
    },
    /// The service refused the record, the rest of the batch may still have
    /// been written
    Rejected {
        /// Service error code, for instance
        /// `ProvisionedThroughputExceededException`
        error_code: String,
        /// Human readable detail
        error_message: String,
    },
}

impl RecordOutcome {
    /// Whether the record was stored.
    #[must_use]
    pub fn is_accepted(&self) -> bool {
        matches!(self, Self::Accepted { .. })
    }
}

/// Result of one batch submission.
///
/// Callers are free to ignore this. The driver logs and counts failures but
/// never acts on them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionResult {
    outcomes: Vec<RecordOutcome>,
    failed: usize,
}

impl SubmissionResult {
    /// Build a result from per-record outcomes, in request order.
    ///
    /// The service reports a failure count alongside the outcomes. When it is
    /// absent the count is derived from the outcomes.
    #[must_use]
    pub fn from_outcomes(outcomes: Vec<RecordOutcome>, reported_failed: Option<usize>) -> Self {
        let failed = reported_failed
            .unwrap_or_else(|| outcomes.iter().filter(|o| !o.is_accepted()).count());
        Self { outcomes, failed }
    }

    /// A result in which all `submitted` records were accepted without shard
    /// detail.
    #[must_use]
    pub fn all_accepted(submitted: usize) -> Self {
        let outcomes = (0..submitted)
            .map(|_| RecordOutcome::Accepted {
                shard_id: None,
                sequence_number: None,
            })
            .collect();
        Self {
            outcomes,
            failed: 0,
        }
    }

    /// Number of records sent in the call.
    #[must_use]
    pub fn submitted(&self) -> usize {
        self.outcomes.len()
    }

    /// Number of records the service reported as failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Number of records the service stored.
    #[must_use]
    pub fn accepted(&self) -> usize {
        self.submitted().saturating_sub(self.failed)
    }

    /// Per-record outcomes, in request order.
    #[must_use]
    pub fn outcomes(&self) -> &[RecordOutcome] {
        &self.outcomes
    }

    /// Distinct error codes among rejected records, in order of first
    /// appearance.
    #[must_use]
    pub fn error_codes(&self) -> Vec<&str> {
        let mut codes: Vec<&str> = Vec::new();
        for outcome in &self.outcomes {
            if let RecordOutcome::Rejected { error_code, .. } = outcome
                && !codes.contains(&error_code.as_str())
            {
                codes.push(error_code);
            }
        }
        codes
    }
}

#[async_trait]
/// Hands a batch of records to the ingestion service.
pub trait Submit {
    /// Submit `batch` to `stream_name` in a single call.
    ///
    /// # Errors
    ///
    /// Returns an error if the call as a whole fails. Records rejected
    /// individually are reported through the returned [`SubmissionResult`]
    /// instead.
    async fn submit(
        &mut self,
        stream_name: &str,
        batch: Vec<Record>,
    ) -> Result<SubmissionResult, Error>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rejected(code: &str) -> RecordOutcome {
        RecordOutcome::Rejected {
            error_code: code.to_string(),
            error_message: "nope".to_string(),
        }
    }

    fn accepted(shard: &str, seq: &str) -> RecordOutcome {
        RecordOutcome::Accepted {
            shard_id: Some(shard.to_string()),
            sequence_number: Some(seq.to_string()),
        }
    }

    #[test]
    fn all_accepted_has_no_failures() {
        let result = SubmissionResult::all_accepted(4);
        assert_eq!(result.submitted(), 4);
        assert_eq!(result.failed(), 0);
        assert_eq!(result.accepted(), 4);
        assert!(result.error_codes().is_empty());
    }

    #[test]
    fn reported_failure_count_wins() {
        let outcomes = vec![accepted("shardId-000000000000", "1"), rejected("InternalFailure")];
        let result = SubmissionResult::from_outcomes(outcomes, Some(1));
        assert_eq!(result.submitted(), 2);
        assert_eq!(result.failed(), 1);
        assert_eq!(result.accepted(), 1);
    }

    #[test]
    fn failure_count_derived_when_unreported() {
        let outcomes = vec![
            rejected("ProvisionedThroughputExceededException"),
            accepted("shardId-000000000001", "2"),
            rejected("ProvisionedThroughputExceededException"),
            rejected("InternalFailure"),
        ];
        let result = SubmissionResult::from_outcomes(outcomes, None);
        assert_eq!(result.failed(), 3);
        assert_eq!(
            result.error_codes(),
            vec!["ProvisionedThroughputExceededException", "InternalFailure"]
        );
    }
}
