//! GraphQL documents for the upstream indexer API.
//!
//! The where-clause bounds are exclusive (`gt`/`lt`); callers convert
//! inclusive intent with a ±1 adjustment.

/// Blocks in an exclusive height window.
pub const BLOCKS_QUERY: &str = r#"
query($gt:Int!, $lt:Int!){
  getBlocks(where:{height:{gt:$gt, lt:$lt}}){
    hash height last_block_hash time num_txs total_txs
  }
}"#;

/// Transactions in an exclusive height window, with a per-block index cap.
pub const TXS_QUERY: &str = r#"
query($gt:Int!, $lt:Int!, $imax:Int!){
  getTransactions(where:{
    block_height:{gt:$gt, lt:$lt},
    index:{lt:$imax}
  }){
    index hash success block_height gas_wanted gas_used memo content_raw
    gas_fee { amount denom }
    messages {
      route
      value {
        __typename
      }
    }
    response {
      events {
        ... on GnoEvent {
          type func pkg_path
          attrs { key value }
        }
      }
    }
  }
}"#;

/// The newest block.
pub const LATEST_BLOCK_QUERY: &str = r#"
query {
  getBlocks(where:{}, limit: 1, orderBy: {height: DESC}) {
    hash height last_block_hash time num_txs total_txs
  }
}"#;

/// Head stream: one block per frame.
pub const HEADS_SUBSCRIPTION: &str = r#"
subscription {
  getBlocks {
    hash height last_block_hash time num_txs total_txs
  }
}"#;
