//! Upstream adapter for the gnodex indexer.
//!
//! This crate implements the [`UpstreamSource`] and [`HeadSubscription`]
//! ports from `gnodex-core`, speaking the upstream indexer's GraphQL API
//! over two transports:
//!
//! - [`client::GraphqlClient`] - request/response queries over HTTP with a
//!   20 s deadline and no internal retries
//! - [`ws::SubscriptionClient`] - the graphql-ws protocol over WebSocket,
//!   with a subscription registry and automatic reconnection (2 s backoff,
//!   original subscription ids re-issued)
//!
//! # Usage
//!
//! ```ignore
//! use gnodex_upstream::{GnoUpstream, UpstreamConfig};
//!
//! let upstream = GnoUpstream::connect(UpstreamConfig {
//!     query_endpoint: "https://indexer.example/graphql/query".into(),
//!     stream_endpoint: "wss://indexer.example/graphql/query".into(),
//! })?;
//!
//! let blocks = upstream.blocks(0, 1001).await?;
//! ```
//!
//! [`UpstreamSource`]: gnodex_core::ports::UpstreamSource
//! [`HeadSubscription`]: gnodex_core::ports::HeadSubscription

pub mod client;
pub mod documents;
mod gno;
pub mod ws;

pub use client::GraphqlClient;
pub use gno::{GnoUpstream, UpstreamConfig};
pub use ws::{SubscriptionClient, SubscriptionHandler};
