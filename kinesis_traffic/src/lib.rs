//! The kinesis-traffic load generation tool.
//!
//! This library supports the kinesis-traffic binary found elsewhere in this
//! project. A run builds batches of fixed-size records, submits each batch to
//! a Kinesis data stream with a single `PutRecords` call and pauses briefly
//! between batches. Nothing is retried: partial failures are logged and
//! counted, call failures end the run.

#![deny(clippy::all)]
#![deny(clippy::cargo)]
#![deny(clippy::pedantic)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]
#![deny(clippy::dbg_macro)]
#![deny(unused_extern_crates)]
#![deny(unused_allocation)]
#![deny(unused_assignments)]
#![deny(unused_comparisons)]
#![deny(unreachable_pub)]
#![deny(missing_docs)]
#![deny(missing_copy_implementations)]
#![deny(missing_debug_implementations)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::multiple_crate_versions)]
// Not published, there is no repository URL to declare.
#![allow(clippy::cargo_common_metadata)]

pub mod config;
pub mod driver;
pub mod record;
pub mod submit;
