//! Storage layer for the gnodex indexer.
//!
//! This crate provides PostgreSQL implementations of the repository traits
//! defined in `gnodex-core`. It handles all database interactions including
//! connection pooling, migrations, and idempotent writes.
//!
//! # Architecture
//!
//! The storage layer follows the repository pattern:
//!
//! - [`postgres::Database`] - Connection pool management
//! - [`postgres::PgRepositories`] - Composite repository for all entity types
//! - Individual repositories for blocks, transactions, events, transfers,
//!   balances, and tokens
//!
//! Every write is idempotent on its natural key (`ON CONFLICT` clauses),
//! so live sync, backfill, and integrity re-walks can overlap safely.

pub mod postgres;

pub use postgres::{Database, DatabaseConfig, PgRepositories};
