//! The [Kinesis](https://aws.amazon.com/kinesis/data-streams/) speaking
//! submitter.
//!
//! One client is built at startup and reused for every batch. Credentials are
//! resolved through the usual AWS provider chain.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, ConfigLoader, retry::RetryConfig};
use aws_sdk_kinesis::{
    Client,
    config::Region,
    primitives::Blob,
    types::{PutRecordsRequestEntry, PutRecordsResultEntry},
};
use tracing::debug;

use super::{Error, RecordOutcome, Submit, SubmissionResult};
use crate::record::Record;

/// Submits batches with the `PutRecords` API.
#[derive(Debug, Clone)]
pub struct Kinesis {
    client: Client,
}

impl Kinesis {
    /// Create a new [`Kinesis`] submitter for streams in `region`.
    ///
    /// When `endpoint_url` is set requests go there instead of the regional
    /// endpoint. The SDK's own retries are disabled: a failed call fails the
    /// submission on the first attempt.
    pub async fn new(region: &str, endpoint_url: Option<&str>) -> Self {
        let sdk_config = config_loader(region, endpoint_url).load().await;
        Self::from_client(Client::new(&sdk_config))
    }

    /// Wrap an already configured client.
    #[must_use]
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Submit for Kinesis {
    async fn submit(
        &mut self,
        stream_name: &str,
        batch: Vec<Record>,
    ) -> Result<SubmissionResult, Error> {
        let entries = batch
            .into_iter()
            .map(request_entry)
            .collect::<Result<Vec<_>, _>>()?;

        let output = self
            .client
            .put_records()
            .stream_name(stream_name)
            .set_records(Some(entries))
            .send()
            .await
            .map_err(|source| Error::PutRecords {
                stream: stream_name.to_string(),
                source: Box::new(aws_sdk_kinesis::Error::from(source)),
            })?;

        Ok(submission_result(
            output.records(),
            output.failed_record_count(),
        ))
    }
}

fn config_loader(region: &str, endpoint_url: Option<&str>) -> ConfigLoader {
    let mut loader = aws_config::defaults(BehaviorVersion::latest())
        .region(Region::new(region.to_string()))
        .retry_config(RetryConfig::disabled());
    if let Some(url) = endpoint_url {
        debug!("Overriding Kinesis endpoint with {url}");
        loader = loader.endpoint_url(url);
    }
    loader
}

fn request_entry(record: Record) -> Result<PutRecordsRequestEntry, Error> {
    let entry = PutRecordsRequestEntry::builder()
        .partition_key(record.partition_key)
        .data(Blob::new(record.data.to_vec()))
        .build()?;
    Ok(entry)
}

fn submission_result(
    entries: &[PutRecordsResultEntry],
    failed_record_count: Option<i32>,
) -> SubmissionResult {
    let outcomes = entries.iter().map(record_outcome).collect();
    let reported_failed = failed_record_count.and_then(|n| usize::try_from(n).ok());
    SubmissionResult::from_outcomes(outcomes, reported_failed)
}

fn record_outcome(entry: &PutRecordsResultEntry) -> RecordOutcome {
    match entry.error_code() {
        Some(code) => RecordOutcome::Rejected {
            error_code: code.to_string(),
            error_message: entry.error_message().unwrap_or_default().to_string(),
        },
        None => RecordOutcome::Accepted {
            shard_id: entry.shard_id().map(str::to_string),
            sequence_number: entry.sequence_number().map(str::to_string),
        },
    }
}

#[cfg(test)]
mod tests {
    use std::{
        num::NonZeroU32,
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
    };

    use aws_sdk_kinesis::config::Credentials;
    use tokio::{
        io::{AsyncReadExt, AsyncWriteExt},
        net::{TcpListener, TcpStream},
    };

    use super::*;
    use crate::record::build_batch;

    const INTERNAL_FAILURE: &str = r#"{"__type":"InternalFailure","message":"We encountered an internal error"}"#;

    /// Read one HTTP request off `stream`, headers and body.
    async fn read_request(stream: &mut TcpStream) -> std::io::Result<()> {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        loop {
            let n = stream.read(&mut chunk).await?;
            if n == 0 {
                return Err(std::io::ErrorKind::UnexpectedEof.into());
            }
            buf.extend_from_slice(&chunk[..n]);
            let Some(header_end) = buf.windows(4).position(|w| w == b"\r\n\r\n") else {
                continue;
            };
            let headers = String::from_utf8_lossy(&buf[..header_end]).to_ascii_lowercase();
            let content_length = headers
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|value| value.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= header_end + 4 + content_length {
                return Ok(());
            }
        }
    }

    /// Answer every request with HTTP 500, counting requests.
    async fn failing_endpoint() -> (String, Arc<AtomicUsize>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        tokio::spawn(async move {
            while let Ok((mut stream, _)) = listener.accept().await {
                if read_request(&mut stream).await.is_err() {
                    continue;
                }
                counter.fetch_add(1, Ordering::SeqCst);
                let response = format!(
                    "HTTP/1.1 500 Internal Server Error\r\n\
                     Content-Type: application/x-amz-json-1.1\r\n\
                     Content-Length: {}\r\n\
                     Connection: close\r\n\r\n{INTERNAL_FAILURE}",
                    INTERNAL_FAILURE.len()
                );
                let _ = stream.write_all(response.as_bytes()).await;
                let _ = stream.shutdown().await;
            }
        });
        (format!("http://{addr}"), hits)
    }

    fn accepted_entry(shard: &str, seq: &str) -> PutRecordsResultEntry {
        PutRecordsResultEntry::builder()
            .shard_id(shard)
            .sequence_number(seq)
            .build()
    }

    fn throttled_entry() -> PutRecordsResultEntry {
        PutRecordsResultEntry::builder()
            .error_code("ProvisionedThroughputExceededException")
            .error_message("Rate exceeded for shard shardId-000000000001")
            .build()
    }

    #[test]
    fn request_entries_carry_key_and_payload() {
        let batch = build_batch(NonZeroU32::new(2).unwrap(), 3);
        let entries = batch
            .into_iter()
            .map(request_entry)
            .collect::<Result<Vec<_>, _>>()
            .unwrap();
        let expected: Vec<PutRecordsRequestEntry> = ["1", "2"]
            .into_iter()
            .map(|key| {
                PutRecordsRequestEntry::builder()
                    .partition_key(key)
                    .data(Blob::new(b"yyy".to_vec()))
                    .build()
                    .unwrap()
            })
            .collect();
        assert_eq!(entries, expected);
    }

    #[tokio::test]
    async fn failed_call_is_not_retried() {
        let (endpoint, hits) = failing_endpoint().await;
        let sdk_config = config_loader("us-east-1", Some(&endpoint))
            .credentials_provider(Credentials::new("AKIDEXAMPLE", "secret", None, None, "test"))
            .load()
            .await;
        let mut kinesis = Kinesis::from_client(Client::new(&sdk_config));

        let batch = build_batch(NonZeroU32::new(1).unwrap(), 8);
        let err = kinesis.submit("MetricsTest", batch).await.unwrap_err();

        assert!(matches!(err, Error::PutRecords { ref stream, .. } if stream == "MetricsTest"));
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn partial_failure_is_reported_not_raised() {
        let entries = vec![
            accepted_entry("shardId-000000000000", "49590338271490256608559692538361571095921575989136588898"),
            throttled_entry(),
            accepted_entry("shardId-000000000000", "49590338271490256608559692540925702759324208523137515618"),
        ];
        let result = submission_result(&entries, Some(1));
        assert_eq!(result.submitted(), 3);
        assert_eq!(result.failed(), 1);
        assert_eq!(result.accepted(), 2);
        assert_eq!(
            result.error_codes(),
            vec!["ProvisionedThroughputExceededException"]
        );
        assert_eq!(
            result.outcomes()[0],
            RecordOutcome::Accepted {
                shard_id: Some("shardId-000000000000".to_string()),
                sequence_number: Some(
                    "49590338271490256608559692538361571095921575989136588898".to_string()
                ),
            }
        );
    }

    #[test]
    fn negative_failure_count_falls_back_to_outcomes() {
        let entries = vec![throttled_entry(), throttled_entry()];
        let result = submission_result(&entries, Some(-1));
        assert_eq!(result.failed(), 2);
    }
}
