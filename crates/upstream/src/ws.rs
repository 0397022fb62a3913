//! GraphQL-over-WebSocket stream transport.
//!
//! Implements the graphql-ws protocol: the client sends `connection_init`,
//! awaits `connection_ack`, then drives subscriptions with `start` /
//! `stop` frames keyed by id. A single reader task owns the read half of
//! the socket; writers and the subscription registry share one mutex.
//!
//! On abnormal close the reader waits a fixed 2 s backoff, redials,
//! re-runs the init/ack handshake, and re-issues `start` for every
//! still-active registration with its original id. Only the reader task
//! reconnects, so at most one reconnect is in flight.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpStream;
use tokio::sync::{oneshot, Mutex};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use gnodex_core::error::{ClientError, ClientResult, IndexerResult};
use gnodex_core::metrics::record_ws_reconnect;

// =============================================================================
// Protocol
// =============================================================================

pub const MSG_CONNECTION_INIT: &str = "connection_init";
pub const MSG_START: &str = "start";
pub const MSG_STOP: &str = "stop";
pub const MSG_CONNECTION_TERMINATE: &str = "connection_terminate";

pub const MSG_DATA: &str = "data";
pub const MSG_ERROR: &str = "error";
pub const MSG_COMPLETE: &str = "complete";
pub const MSG_CONNECTION_ACK: &str = "connection_ack";
pub const MSG_CONNECTION_ERROR: &str = "connection_error";

/// Fixed backoff before a reconnect attempt.
pub const RECONNECT_BACKOFF: Duration = Duration::from_secs(2);

/// One graphql-ws frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WsMessage {
    #[serde(rename = "type")]
    pub msg_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
}

fn start_message(id: &str, document: &str, variables: &serde_json::Value) -> WsMessage {
    WsMessage {
        msg_type: MSG_START.to_string(),
        id: Some(id.to_string()),
        payload: Some(serde_json::json!({
            "query": document,
            "variables": variables,
        })),
    }
}

fn stop_message(id: &str) -> WsMessage {
    WsMessage {
        msg_type: MSG_STOP.to_string(),
        id: Some(id.to_string()),
        payload: None,
    }
}

// =============================================================================
// Client
// =============================================================================

/// Handler invoked with the `data` payload of each matching frame, on the
/// reader task. Errors are logged and do not terminate the subscription.
pub type SubscriptionHandler =
    Arc<dyn Fn(serde_json::Value) -> BoxFuture<'static, IndexerResult<()>> + Send + Sync>;

type WsSink = SplitSink<WebSocketStream<MaybeTlsStream<TcpStream>>, Message>;
type WsSource = SplitStream<WebSocketStream<MaybeTlsStream<TcpStream>>>;

struct Registration {
    document: String,
    variables: serde_json::Value,
    handler: SubscriptionHandler,
    active: bool,
    once: bool,
    done: Option<oneshot::Sender<ClientResult<()>>>,
}

/// Writer half and subscription registry, guarded by one mutex.
struct Shared {
    sink: Option<WsSink>,
    registry: HashMap<String, Registration>,
    reconnecting: bool,
    closed: bool,
}

/// GraphQL subscription client over WebSocket.
pub struct SubscriptionClient {
    endpoint: String,
    shared: Arc<Mutex<Shared>>,
    next_id: AtomicU64,
    cancel: CancellationToken,
}

impl SubscriptionClient {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            shared: Arc::new(Mutex::new(Shared {
                sink: None,
                registry: HashMap::new(),
                reconnecting: false,
                closed: false,
            })),
            next_id: AtomicU64::new(0),
            cancel: CancellationToken::new(),
        }
    }

    /// Register a long-lived subscription; returns its id.
    pub async fn subscribe(
        &self,
        document: &str,
        variables: serde_json::Value,
        handler: SubscriptionHandler,
    ) -> ClientResult<String> {
        let (id, _) = self
            .register(document, variables, handler, false)
            .await?;
        Ok(id)
    }

    /// Subscribe, wait for one `data` frame, then stop.
    pub async fn subscribe_once(
        &self,
        document: &str,
        variables: serde_json::Value,
        handler: SubscriptionHandler,
    ) -> ClientResult<()> {
        let (id, done) = self.register(document, variables, handler, true).await?;
        let done = done.ok_or_else(|| ClientError::Subscription("missing completion".into()))?;
        done.await.map_err(|_| {
            ClientError::Subscription(format!("subscription {id} dropped before completion"))
        })?
    }

    async fn register(
        &self,
        document: &str,
        variables: serde_json::Value,
        handler: SubscriptionHandler,
        once: bool,
    ) -> ClientResult<(String, Option<oneshot::Receiver<ClientResult<()>>>)> {
        self.ensure_connected().await?;

        let id = (self.next_id.fetch_add(1, Ordering::SeqCst) + 1).to_string();
        let (done_tx, done_rx) = if once {
            let (tx, rx) = oneshot::channel();
            (Some(tx), Some(rx))
        } else {
            (None, None)
        };

        let mut guard = self.shared.lock().await;
        let shared = &mut *guard;
        if shared.closed {
            return Err(ClientError::Closed);
        }

        shared.registry.insert(
            id.clone(),
            Registration {
                document: document.to_string(),
                variables: variables.clone(),
                handler,
                active: true,
                once,
                done: done_tx,
            },
        );

        // A missing sink means a reconnect is in flight; the reader will
        // issue start for this registration once the socket is back.
        if let Some(sink) = shared.sink.as_mut() {
            if let Err(e) = send_on(sink, &start_message(&id, document, &variables)).await {
                warn!(id = %id, error = %e, "Start frame failed; deferring to reconnect");
            }
        }

        debug!(id = %id, "Subscription registered");
        Ok((id, done_rx))
    }

    /// Stop a subscription by id.
    pub async fn stop(&self, id: &str) -> ClientResult<()> {
        let mut guard = self.shared.lock().await;
        let shared = &mut *guard;

        let registration = shared
            .registry
            .get_mut(id)
            .ok_or_else(|| ClientError::Subscription(format!("unknown subscription {id}")))?;
        if !registration.active {
            return Err(ClientError::Subscription(format!(
                "subscription {id} already stopped"
            )));
        }
        registration.active = false;

        if let Some(sink) = shared.sink.as_mut() {
            send_on(sink, &stop_message(id)).await?;
        }
        shared.registry.remove(id);

        debug!(id = %id, "Subscription stopped");
        Ok(())
    }

    /// Stop every active subscription, send `connection_terminate`, and
    /// close the socket. Idempotent.
    pub async fn close(&self) {
        let mut guard = self.shared.lock().await;
        let shared = &mut *guard;
        if shared.closed {
            return;
        }
        shared.closed = true;

        if let Some(mut sink) = shared.sink.take() {
            for (id, registration) in shared.registry.iter_mut() {
                if registration.active {
                    registration.active = false;
                    let _ = send_on(&mut sink, &stop_message(id)).await;
                }
            }
            let terminate = WsMessage {
                msg_type: MSG_CONNECTION_TERMINATE.to_string(),
                id: None,
                payload: None,
            };
            let _ = send_on(&mut sink, &terminate).await;
            let _ = sink.close().await;
        }
        shared.registry.clear();
        drop(guard);

        self.cancel.cancel();
        debug!("Stream client closed");
    }

    /// Dial and handshake if there is no live connection, then spawn the
    /// reader task.
    async fn ensure_connected(&self) -> ClientResult<()> {
        let mut guard = self.shared.lock().await;
        if guard.closed {
            return Err(ClientError::Closed);
        }
        if guard.sink.is_some() || guard.reconnecting {
            return Ok(());
        }

        let ws = dial(&self.endpoint).await?;
        let (sink, source) = ws.split();
        guard.sink = Some(sink);
        drop(guard);

        tokio::spawn(read_loop(
            self.endpoint.clone(),
            self.shared.clone(),
            source,
            self.cancel.clone(),
        ));
        Ok(())
    }
}

// =============================================================================
// Connection plumbing
// =============================================================================

/// Open the socket and run the init/ack handshake.
async fn dial(endpoint: &str) -> ClientResult<WebSocketStream<MaybeTlsStream<TcpStream>>> {
    let (mut ws, _) = connect_async(endpoint)
        .await
        .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;

    let init = WsMessage {
        msg_type: MSG_CONNECTION_INIT.to_string(),
        id: None,
        payload: None,
    };
    let text = serde_json::to_string(&init).map_err(|e| ClientError::Decode(e.to_string()))?;
    ws.send(Message::text(text))
        .await
        .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;

    loop {
        match ws.next().await {
            Some(Ok(Message::Text(text))) => {
                let msg: WsMessage = serde_json::from_str(text.as_str())
                    .map_err(|e| ClientError::Decode(e.to_string()))?;
                match msg.msg_type.as_str() {
                    MSG_CONNECTION_ACK => return Ok(ws),
                    MSG_CONNECTION_ERROR => {
                        return Err(ClientError::ConnectionFailed(format!(
                            "connection_error: {:?}",
                            msg.payload
                        )));
                    }
                    other => {
                        debug!(msg_type = other, "Ignoring frame during handshake");
                    }
                }
            }
            Some(Ok(_)) => continue,
            Some(Err(e)) => return Err(ClientError::ConnectionFailed(e.to_string())),
            None => {
                return Err(ClientError::ConnectionFailed(
                    "socket closed during handshake".into(),
                ));
            }
        }
    }
}

async fn send_on(sink: &mut WsSink, msg: &WsMessage) -> ClientResult<()> {
    let text = serde_json::to_string(msg).map_err(|e| ClientError::Decode(e.to_string()))?;
    sink.send(Message::text(text))
        .await
        .map_err(|e| ClientError::Transport(e.to_string()))
}

/// Single reader task: dispatches frames in arrival order and owns the
/// reconnect loop.
async fn read_loop(
    endpoint: String,
    shared: Arc<Mutex<Shared>>,
    mut source: WsSource,
    cancel: CancellationToken,
) {
    loop {
        let frame = tokio::select! {
            _ = cancel.cancelled() => return,
            frame = source.next() => frame,
        };

        match frame {
            Some(Ok(Message::Text(text))) => dispatch(&shared, text.as_str()).await,
            Some(Ok(Message::Close(close))) => {
                warn!(?close, "Server closed the stream");
                match reconnect(&endpoint, &shared, &cancel).await {
                    Some(new_source) => source = new_source,
                    None => return,
                }
            }
            Some(Ok(_)) => {} // ping/pong/binary
            Some(Err(e)) => {
                warn!(error = %e, "Stream read failed");
                match reconnect(&endpoint, &shared, &cancel).await {
                    Some(new_source) => source = new_source,
                    None => return,
                }
            }
            None => match reconnect(&endpoint, &shared, &cancel).await {
                Some(new_source) => source = new_source,
                None => return,
            },
        }
    }
}

/// Route one frame to its registration.
async fn dispatch(shared: &Arc<Mutex<Shared>>, text: &str) {
    let msg: WsMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            warn!(error = %e, "Undecodable stream frame");
            return;
        }
    };

    match msg.msg_type.as_str() {
        MSG_DATA => {
            let Some(id) = msg.id else {
                warn!("data frame without id");
                return;
            };

            // Clone the handler out so it never runs under the mutex;
            // handlers may call stop() themselves.
            let (handler, once) = {
                let guard = shared.lock().await;
                match guard.registry.get(&id) {
                    Some(registration) if registration.active => {
                        (registration.handler.clone(), registration.once)
                    }
                    _ => {
                        debug!(id = %id, "Frame for inactive subscription");
                        return;
                    }
                }
            };

            let data = msg
                .payload
                .as_ref()
                .and_then(|p| p.get("data"))
                .cloned()
                .unwrap_or(serde_json::Value::Null);

            if data.is_null() {
                warn!(id = %id, "data frame without data payload");
                if once {
                    finish_once(
                        shared,
                        &id,
                        Err(ClientError::Decode("data frame without payload".into())),
                    )
                    .await;
                }
                return;
            }

            if let Err(e) = handler(data).await {
                warn!(id = %id, error = %e, "Subscription handler failed");
            }

            if once {
                finish_once(shared, &id, Ok(())).await;
            }
        }
        MSG_ERROR => {
            let id = msg.id.unwrap_or_default();
            warn!(id = %id, payload = ?msg.payload, "Subscription error frame");

            let is_once = {
                let guard = shared.lock().await;
                guard.registry.get(&id).map(|r| r.once).unwrap_or(false)
            };
            if is_once {
                finish_once(
                    shared,
                    &id,
                    Err(ClientError::Upstream(format!("{:?}", msg.payload))),
                )
                .await;
            }
        }
        MSG_COMPLETE => {
            let id = msg.id.unwrap_or_default();
            debug!(id = %id, "Subscription completed by server");

            let mut guard = shared.lock().await;
            if let Some(mut registration) = guard.registry.remove(&id) {
                if let Some(done) = registration.done.take() {
                    let _ = done.send(Err(ClientError::Subscription(format!(
                        "subscription {id} completed without data"
                    ))));
                }
            }
        }
        MSG_CONNECTION_ERROR => {
            warn!(payload = ?msg.payload, "Connection error frame");
        }
        other => {
            debug!(msg_type = other, "Ignoring frame");
        }
    }
}

/// Complete a one-shot subscription: deactivate, signal the waiter, send
/// `stop`, and drop the registration.
async fn finish_once(shared: &Arc<Mutex<Shared>>, id: &str, result: ClientResult<()>) {
    let mut guard = shared.lock().await;
    let state = &mut *guard;

    if let Some(mut registration) = state.registry.remove(id) {
        registration.active = false;
        if let Some(done) = registration.done.take() {
            let _ = done.send(result);
        }
    }
    if let Some(sink) = state.sink.as_mut() {
        let _ = send_on(sink, &stop_message(id)).await;
    }
}

/// Redial until the socket is back or the client goes away, then restore
/// every still-active subscription under its original id.
async fn reconnect(
    endpoint: &str,
    shared: &Arc<Mutex<Shared>>,
    cancel: &CancellationToken,
) -> Option<WsSource> {
    {
        let mut guard = shared.lock().await;
        if guard.closed {
            return None;
        }
        guard.sink = None;
        guard.reconnecting = true;
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                shared.lock().await.reconnecting = false;
                return None;
            }
            _ = tokio::time::sleep(RECONNECT_BACKOFF) => {}
        }

        record_ws_reconnect();
        info!(endpoint, "🔄 Reconnecting to upstream stream");

        match dial(endpoint).await {
            Ok(ws) => {
                let (mut sink, source) = ws.split();
                let mut guard = shared.lock().await;
                let state = &mut *guard;
                if state.closed {
                    state.reconnecting = false;
                    return None;
                }

                for (id, registration) in state.registry.iter() {
                    if !registration.active {
                        continue;
                    }
                    if let Err(e) = send_on(
                        &mut sink,
                        &start_message(id, &registration.document, &registration.variables),
                    )
                    .await
                    {
                        warn!(id = %id, error = %e, "Failed to re-start subscription");
                    }
                }

                state.sink = Some(sink);
                state.reconnecting = false;
                info!("🔄 Reconnected, subscriptions restored");
                return Some(source);
            }
            Err(e) => {
                warn!(error = %e, "Reconnect attempt failed");
            }
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
