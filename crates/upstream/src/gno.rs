//! Adapter implementing the core upstream ports over the two transports.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use gnodex_core::error::ClientResult;
use gnodex_core::ports::{HeadHandler, HeadSubscription, RawBlock, RawTransaction, UpstreamSource};

use crate::client::GraphqlClient;
use crate::documents::{BLOCKS_QUERY, HEADS_SUBSCRIPTION, LATEST_BLOCK_QUERY, TXS_QUERY};
use crate::ws::{SubscriptionClient, SubscriptionHandler};

/// Configuration for the upstream adapter.
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// GraphQL query endpoint (HTTP).
    pub query_endpoint: String,
    /// GraphQL subscription endpoint (WebSocket).
    pub stream_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct BlocksData {
    #[serde(rename = "getBlocks", default)]
    get_blocks: Vec<RawBlock>,
}

#[derive(Debug, Deserialize)]
struct TxsData {
    #[serde(rename = "getTransactions", default)]
    get_transactions: Vec<RawTransaction>,
}

/// Head frames carry a single block per message.
#[derive(Debug, Deserialize)]
struct HeadFrame {
    #[serde(rename = "getBlocks")]
    get_blocks: RawBlock,
}

/// Upstream adapter: ranged queries over HTTP, head frames over WebSocket.
pub struct GnoUpstream {
    query: GraphqlClient,
    stream: SubscriptionClient,
}

impl GnoUpstream {
    pub fn connect(config: UpstreamConfig) -> ClientResult<Self> {
        Ok(Self {
            query: GraphqlClient::new(config.query_endpoint)?,
            stream: SubscriptionClient::new(config.stream_endpoint),
        })
    }

    /// Wrap a domain head handler into a raw frame handler: decode the
    /// frame, skip it with a warning when it does not carry a block.
    fn head_frame_handler(handler: HeadHandler) -> SubscriptionHandler {
        Arc::new(move |data: serde_json::Value| {
            let handler = handler.clone();
            Box::pin(async move {
                match serde_json::from_value::<HeadFrame>(data) {
                    Ok(frame) => handler(frame.get_blocks).await,
                    Err(e) => {
                        warn!(error = %e, "Undecodable head frame, skipping");
                        Ok(())
                    }
                }
            })
        })
    }
}

#[async_trait]
impl UpstreamSource for GnoUpstream {
    async fn blocks(&self, gt: u64, lt: u64) -> ClientResult<Vec<RawBlock>> {
        let data: BlocksData = self
            .query
            .query(BLOCKS_QUERY, json!({ "gt": gt, "lt": lt }))
            .await?;
        Ok(data.get_blocks)
    }

    async fn transactions(
        &self,
        gt: u64,
        lt: u64,
        imax: u32,
    ) -> ClientResult<Vec<RawTransaction>> {
        let data: TxsData = self
            .query
            .query(TXS_QUERY, json!({ "gt": gt, "lt": lt, "imax": imax }))
            .await?;
        Ok(data.get_transactions)
    }

    async fn latest_block(&self) -> ClientResult<Option<RawBlock>> {
        let data: BlocksData = self
            .query
            .query(LATEST_BLOCK_QUERY, serde_json::Value::Null)
            .await?;
        Ok(data.get_blocks.into_iter().next())
    }
}

#[async_trait]
impl HeadSubscription for GnoUpstream {
    async fn subscribe_heads(&self, handler: HeadHandler) -> ClientResult<String> {
        self.stream
            .subscribe(
                HEADS_SUBSCRIPTION,
                serde_json::Value::Null,
                Self::head_frame_handler(handler),
            )
            .await
    }

    async fn subscribe_heads_once(&self, handler: HeadHandler) -> ClientResult<()> {
        self.stream
            .subscribe_once(
                HEADS_SUBSCRIPTION,
                serde_json::Value::Null,
                Self::head_frame_handler(handler),
            )
            .await
    }

    async fn stop(&self, id: &str) -> ClientResult<()> {
        self.stream.stop(id).await
    }

    async fn close(&self) {
        self.stream.close().await;
    }
}
