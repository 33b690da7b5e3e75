//! Construction of synthetic record batches.
//!
//! Every batch is built fresh for its iteration. The payload content does not
//! matter to the experiment, only its size, so all records of a batch share a
//! single immutable buffer of filler bytes.

use std::num::NonZeroU32;

use bytes::Bytes;

/// The byte used to fill payloads unless configured otherwise.
pub const DEFAULT_FILLER: u8 = b'y';

/// A single unit of streamed data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Record {
    /// Key the service uses to route this record to a shard
    pub partition_key: String,
    /// The record body
    pub data: Bytes,
}

impl Record {
    /// Number of bytes this record counts against the service's request
    /// limits: the payload plus the partition key.
    #[must_use]
    pub fn billed_len(&self) -> usize {
        self.data.len() + self.partition_key.len()
    }
}

/// Build a batch of `count` records with payloads of `size` bytes.
///
/// The i-th record, counting from one, has partition key `i`. Payloads are
/// filled with [`DEFAULT_FILLER`].
#[must_use]
pub fn build_batch(count: NonZeroU32, size: usize) -> Vec<Record> {
    build_batch_with_filler(count, size, DEFAULT_FILLER)
}

/// As [`build_batch`] but with a caller supplied filler byte.
#[must_use]
pub fn build_batch_with_filler(count: NonZeroU32, size: usize, filler: u8) -> Vec<Record> {
    let data = Bytes::from(vec![filler; size]);
    (1..=count.get())
        .map(|i| Record {
            partition_key: i.to_string(),
            data: data.clone(),
        })
        .collect()
}

/// Total bytes a batch counts against the `PutRecords` request limit.
#[must_use]
pub fn batch_billed_len(batch: &[Record]) -> usize {
    batch.iter().map(Record::billed_len).sum()
}
