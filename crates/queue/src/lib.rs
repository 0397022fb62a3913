//! Event queue adapter for the gnodex indexer.
//!
//! Implements the [`EventQueue`] port from `gnodex-core` on AWS SQS
//! (LocalStack in development). The queue is the at-least-once buffer
//! between the event extractor and the balance applier.
//!
//! [`EventQueue`]: gnodex_core::ports::EventQueue

mod sqs;

pub use sqs::{QueueConfig, SqsEventQueue, LONG_POLL_SECONDS, VISIBILITY_TIMEOUT_SECONDS};
