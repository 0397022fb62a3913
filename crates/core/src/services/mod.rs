//! Core business logic services.

mod applier;
mod extractor;
mod fetcher;
mod integrity;
mod orchestrator;
mod syncer;

#[cfg(test)]
pub(crate) mod support;

pub use applier::{ApplierConfig, BalanceApplier};
pub use extractor::{
    decode_events, determine_event_type, is_token_event, parse_token_event,
    parse_transaction_events, EventExtractor,
};
pub use fetcher::{FetcherConfig, RangeFetcher};
pub use integrity::IntegrityScanner;
pub use orchestrator::{probe_head, Orchestrator, OrchestratorConfig};
pub use syncer::Syncer;
