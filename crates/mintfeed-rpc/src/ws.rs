//! WebSocket JSON-RPC client with auto-reconnect and subscription management.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use mintfeed_core::error::TransportError;
use mintfeed_core::policy::{Backoff, RetryConfig, RetryPolicy};
use mintfeed_core::request::{
    next_request_id, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, RpcId,
};
use mintfeed_core::transport::RpcTransport;

use crate::subscriptions::{
    SubscriptionEntry, SubscriptionId, SubscriptionManager, SubscriptionRequest,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type Reply = oneshot::Sender<Result<JsonRpcResponse, TransportError>>;
type SubscribeReply =
    oneshot::Sender<Result<(SubscriptionId, mpsc::UnboundedReceiver<Value>), TransportError>>;

/// Configuration for the WebSocket client.
#[derive(Debug, Clone)]
pub struct WsClientConfig {
    /// Reconnect backoff starting duration.
    pub reconnect_initial: Duration,
    /// Maximum reconnect backoff.
    pub reconnect_max: Duration,
    /// Give up after this many consecutive failed reconnects. `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
}

impl Default for WsClientConfig {
    fn default() -> Self {
        Self {
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(60),
            max_reconnect_attempts: None,
        }
    }
}

impl WsClientConfig {
    /// Doubling reconnect spacing from `reconnect_initial` up to `reconnect_max`.
    pub fn reconnect_policy(&self) -> RetryPolicy {
        RetryPolicy::new(RetryConfig {
            max_attempts: self.max_reconnect_attempts.unwrap_or(u32::MAX),
            delay: self.reconnect_initial,
            backoff: Backoff::Exponential {
                multiplier: 2.0,
                max_delay: self.reconnect_max,
            },
        })
    }
}

/// Command sent from callers to the background WS task.
enum WsCommand {
    Send { req: JsonRpcRequest, tx: Reply },
    Subscribe { request: SubscriptionRequest, tx: SubscribeReply },
    Close,
}

/// A request that is waiting for its response on the current connection.
enum Pending {
    Call(Reply),
    Subscribe {
        request: SubscriptionRequest,
        reply: SubscribeReply,
    },
    /// A live feed re-opened after a reconnect, held here until the node
    /// assigns its new id.
    Resubscribe(SubscriptionEntry),
}

/// WebSocket JSON-RPC client.
///
/// A background task owns the connection, reconnects with exponential
/// backoff and re-opens every live subscription under its new node id.
pub struct WsRpcClient {
    url: String,
    cmd_tx: mpsc::UnboundedSender<WsCommand>,
    subscriptions: SubscriptionManager,
}

impl WsRpcClient {
    /// Connect to `url` and start the background task.
    ///
    /// The first handshake happens here so a bad endpoint fails fast;
    /// later disconnects are handled by the background task.
    pub async fn connect(
        url: impl Into<String>,
        config: WsClientConfig,
    ) -> Result<Self, TransportError> {
        let url = url.into();
        let (stream, _) = tokio_tungstenite::connect_async(url.as_str())
            .await
            .map_err(|e| TransportError::WebSocket(format!("connect {url}: {e}")))?;
        tracing::info!(url = %url, "WebSocket connected");

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<WsCommand>();
        let subscriptions = SubscriptionManager::new();

        tokio::spawn(ws_task(
            url.clone(),
            stream,
            cmd_rx,
            subscriptions.clone(),
            config.reconnect_policy(),
        ));

        Ok(Self {
            url,
            cmd_tx,
            subscriptions,
        })
    }

    /// Open a subscription with `method` (e.g. `"logsSubscribe"`).
    ///
    /// The receiver is registered before any later frame is read, so no
    /// notification sent right after the subscribe response is lost. It
    /// yields the `params.result` of every notification and ends when the
    /// client gives up on the connection or the node rejects a resubscribe.
    pub async fn subscribe(
        &self,
        method: &str,
        params: Value,
    ) -> Result<(SubscriptionId, mpsc::UnboundedReceiver<Value>), TransportError> {
        let (tx, rx) = oneshot::channel();
        let request = SubscriptionRequest::new(method, params);
        self.cmd_tx
            .send(WsCommand::Subscribe { request, tx })
            .map_err(|_| TransportError::Closed)?;
        rx.await.map_err(|_| TransportError::Closed)?
    }

    /// Subscribe to log lines of transactions that mention `program`.
    pub async fn logs_subscribe(
        &self,
        program: &str,
        commitment: &str,
    ) -> Result<(SubscriptionId, mpsc::UnboundedReceiver<Value>), TransportError> {
        self.subscribe(
            "logsSubscribe",
            json!([{ "mentions": [program] }, { "commitment": commitment }]),
        )
        .await
    }

    /// Subscriptions currently routed under a node id.
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.len()
    }
}

impl Drop for WsRpcClient {
    fn drop(&mut self) {
        let _ = self.cmd_tx.send(WsCommand::Close);
    }
}

#[async_trait]
impl RpcTransport for WsRpcClient {
    async fn send(&self, req: JsonRpcRequest) -> Result<JsonRpcResponse, TransportError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(WsCommand::Send { req, tx })
            .map_err(|_| TransportError::Closed)?;
        rx.await.map_err(|_| TransportError::Closed)?
    }

    fn url(&self) -> &str {
        &self.url
    }
}

/// How one connected session ended.
enum SessionEnd {
    Closed,
    Disconnected,
}

/// Background task that owns the WebSocket connection.
async fn ws_task(
    url: String,
    initial: WsStream,
    mut cmd_rx: mpsc::UnboundedReceiver<WsCommand>,
    subscriptions: SubscriptionManager,
    policy: RetryPolicy,
) {
    let mut stream = Some(initial);
    let mut failures = 0u32;
    // Feeds whose resubscribe was still unanswered when a session dropped.
    let mut carried: Vec<SubscriptionEntry> = Vec::new();

    loop {
        let ws = match stream.take() {
            Some(ws) => ws,
            None => match tokio_tungstenite::connect_async(url.as_str()).await {
                Ok((ws, _)) => {
                    tracing::info!(url = %url, "WebSocket reconnected");
                    ws
                }
                Err(e) => {
                    failures += 1;
                    let Some(delay) = policy.delay_after(failures) else {
                        tracing::error!(url = %url, attempts = failures, error = %e, "giving up on WebSocket endpoint");
                        break;
                    };
                    tracing::warn!(url = %url, attempt = failures, error = %e, "WS connect failed, retrying in {delay:?}");
                    time::sleep(delay).await;
                    continue;
                }
            },
        };
        failures = 0;

        let (end, unanswered) =
            run_session(&url, ws, &mut cmd_rx, &subscriptions, std::mem::take(&mut carried)).await;
        carried = unanswered;
        match end {
            SessionEnd::Closed => return,
            SessionEnd::Disconnected => {
                let delay = policy.config.delay;
                tracing::warn!(url = %url, "WS disconnected, reconnecting in {delay:?}");
                time::sleep(delay).await;
            }
        }
    }

    // Giving up: end every subscription stream and refuse further commands.
    drop(carried);
    subscriptions.clear();
    cmd_rx.close();
}

/// Drive one connection until it drops or the client closes.
///
/// Returns how the session ended and the feeds whose resubscribe was never
/// answered, to be re-opened on the next connection.
async fn run_session(
    url: &str,
    ws: WsStream,
    cmd_rx: &mut mpsc::UnboundedReceiver<WsCommand>,
    subscriptions: &SubscriptionManager,
    carried: Vec<SubscriptionEntry>,
) -> (SessionEnd, Vec<SubscriptionEntry>) {
    let (mut sink, mut stream) = ws.split();
    let mut pending: HashMap<u64, Pending> = HashMap::new();

    // Node ids from the previous connection mean nothing on this one: every
    // feed is detached and re-attached as its new id comes back.
    let mut detached = carried;
    detached.extend(subscriptions.detach_all());
    detached.retain(|entry| !entry.is_closed());

    let mut queue = detached.into_iter();
    while let Some(entry) = queue.next() {
        let id = next_request_id();
        let req = JsonRpcRequest::with_params(id, entry.request.method.as_str(), entry.request.params.clone());
        let sent = match serde_json::to_string(&req) {
            Ok(msg) => sink.send(Message::Text(msg)).await.is_ok(),
            Err(e) => {
                tracing::error!(method = %entry.request.method, error = %e, "cannot encode resubscribe, dropping feed");
                continue;
            }
        };
        pending.insert(id, Pending::Resubscribe(entry));
        if !sent {
            let mut unanswered = fail_pending(pending);
            unanswered.extend(queue);
            return (SessionEnd::Disconnected, unanswered);
        }
    }

    let mut unrouted = 0usize;

    let end = loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let (req, entry) = match cmd {
                    None | Some(WsCommand::Close) => {
                        let _ = sink.send(Message::Close(None)).await;
                        break SessionEnd::Closed;
                    }
                    Some(WsCommand::Send { req, tx }) => (req, Pending::Call(tx)),
                    Some(WsCommand::Subscribe { request, tx }) => {
                        let req = JsonRpcRequest::with_params(
                            next_request_id(),
                            request.method.as_str(),
                            request.params.clone(),
                        );
                        (req, Pending::Subscribe { request, reply: tx })
                    }
                };
                let RpcId::Number(id) = req.id else {
                    reject(entry, TransportError::Other("WS requests need a numeric id".into()));
                    continue;
                };
                let msg = match serde_json::to_string(&req) {
                    Ok(msg) => msg,
                    Err(e) => {
                        reject(entry, e.into());
                        continue;
                    }
                };
                pending.insert(id, entry);
                if sink.send(Message::Text(msg)).await.is_err() {
                    break SessionEnd::Disconnected;
                }
            }
            msg = stream.next() => {
                match msg {
                    None => break SessionEnd::Disconnected,
                    Some(Err(e)) => {
                        tracing::warn!(url = %url, error = %e, "WS receive error");
                        break SessionEnd::Disconnected;
                    }
                    Some(Ok(Message::Text(text))) => {
                        let resubscribing = is_resubscribing(&pending);
                        let routed = handle_message(&text, &mut pending, subscriptions);
                        if resubscribing && routed == Routed::Unknown {
                            unrouted += 1;
                        }
                        if unrouted > 0 && !is_resubscribing(&pending) {
                            report_unrouted(url, unrouted);
                            unrouted = 0;
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::debug!(url = %url, ?frame, "server closed WS");
                        break SessionEnd::Disconnected;
                    }
                    Some(Ok(_)) => {}
                }
            }
        }
    };

    if unrouted > 0 {
        report_unrouted(url, unrouted);
    }
    (end, fail_pending(pending))
}

fn is_resubscribing(pending: &HashMap<u64, Pending>) -> bool {
    pending.values().any(|p| matches!(p, Pending::Resubscribe(_)))
}

fn report_unrouted(url: &str, dropped: usize) {
    tracing::warn!(url = %url, dropped, "notifications arrived before their resubscribe completed and were lost");
}

fn reject(entry: Pending, err: TransportError) {
    match entry {
        Pending::Call(tx) => {
            let _ = tx.send(Err(err));
        }
        Pending::Subscribe { reply, .. } => {
            let _ = reply.send(Err(err));
        }
        Pending::Resubscribe(_) => {}
    }
}

/// Fail every in-flight call and hand back the feeds still waiting for
/// their resubscribe answer.
fn fail_pending(pending: HashMap<u64, Pending>) -> Vec<SubscriptionEntry> {
    let mut unanswered = Vec::new();
    for (_, entry) in pending {
        match entry {
            Pending::Resubscribe(feed) => unanswered.push(feed),
            other => reject(other, TransportError::WebSocket("connection lost".into())),
        }
    }
    unanswered
}

/// What became of one inbound text frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Routed {
    /// A notification handed to its subscriber.
    Delivered,
    /// A notification for an id with no live subscriber.
    Unknown,
    /// A response, or something unrecognised.
    Other,
}

fn handle_message(
    text: &str,
    pending: &mut HashMap<u64, Pending>,
    subscriptions: &SubscriptionManager,
) -> Routed {
    let Ok(val) = serde_json::from_str::<Value>(text) else {
        tracing::debug!("failed to parse WS message as JSON");
        return Routed::Other;
    };

    // Notifications carry a method and `params.subscription`, never an id.
    if val.get("method").is_some() {
        let notification = match serde_json::from_value::<JsonRpcNotification>(val) {
            Ok(n) => n,
            Err(e) => {
                tracing::debug!(error = %e, "malformed WS notification");
                return Routed::Other;
            }
        };
        let Some(id) = SubscriptionId::from_value(&notification.params.subscription) else {
            return Routed::Other;
        };
        return if subscriptions.dispatch(&id, notification.params.result) {
            Routed::Delivered
        } else {
            Routed::Unknown
        };
    }

    let resp = match serde_json::from_value::<JsonRpcResponse>(val) {
        Ok(resp) => resp,
        Err(e) => {
            tracing::debug!(error = %e, "unrecognised WS message");
            return Routed::Other;
        }
    };
    let RpcId::Number(id) = resp.id else {
        return Routed::Other;
    };
    let Some(entry) = pending.remove(&id) else {
        return Routed::Other;
    };

    match entry {
        Pending::Call(tx) => {
            let _ = tx.send(Ok(resp));
        }
        Pending::Subscribe { request, reply } => {
            let outcome = match resp.into_result() {
                Ok(result) => match SubscriptionId::from_value(&result) {
                    Some(sub_id) => {
                        tracing::info!(method = %request.method, subscription = %sub_id, "subscribed");
                        let rx = subscriptions.register(sub_id.clone(), request);
                        Ok((sub_id, rx))
                    }
                    None => Err(TransportError::Other(format!(
                        "{} returned no subscription id",
                        request.method
                    ))),
                },
                Err(e) => Err(TransportError::Rpc(e)),
            };
            let _ = reply.send(outcome);
        }
        Pending::Resubscribe(feed) => match resp.into_result() {
            Ok(result) => match SubscriptionId::from_value(&result) {
                Some(new_id) => {
                    tracing::info!(method = %feed.request.method, subscription = %new_id, "resubscribed");
                    if subscriptions.attach(new_id.clone(), feed).is_some() {
                        tracing::warn!(subscription = %new_id, "node reused a live subscription id, older feed ended");
                    }
                }
                None => {
                    tracing::error!(method = %feed.request.method, "resubscribe returned no id, ending feed");
                }
            },
            Err(e) => {
                tracing::error!(method = %feed.request.method, code = e.code, error = %e.message, "resubscribe rejected, ending feed");
            }
        },
    }
    Routed::Other
}

#[cfg(test)]
mod tests {
    use super::*;

    fn logs_request() -> SubscriptionRequest {
        SubscriptionRequest::new("logsSubscribe", json!([]))
    }

    fn notification(subscription: u64, payload: &str) -> String {
        json!({
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": { "subscription": subscription, "result": payload }
        })
        .to_string()
    }

    /// Detach every live feed and park it under request ids 100, 101, ...
    fn pending_resubscribes(subs: &SubscriptionManager) -> HashMap<u64, Pending> {
        subs.detach_all()
            .into_iter()
            .enumerate()
            .map(|(i, feed)| (100 + i as u64, Pending::Resubscribe(feed)))
            .collect()
    }

    #[test]
    fn notification_is_routed_to_subscription() {
        let subs = SubscriptionManager::new();
        let mut rx = subs.register(SubscriptionId("5".into()), logs_request());
        let mut pending = HashMap::new();
        let text = json!({
            "jsonrpc": "2.0",
            "method": "logsNotification",
            "params": { "subscription": 5, "result": { "value": { "signature": "abc" } } }
        })
        .to_string();

        assert_eq!(handle_message(&text, &mut pending, &subs), Routed::Delivered);
        assert_eq!(rx.try_recv().unwrap()["value"]["signature"], "abc");
        assert_eq!(handle_message(&notification(6, "x"), &mut pending, &subs), Routed::Unknown);
    }

    #[test]
    fn subscribe_response_registers_before_reply() {
        let subs = SubscriptionManager::new();
        let (tx, mut rx) = oneshot::channel();
        let mut pending = HashMap::new();
        pending.insert(
            9,
            Pending::Subscribe {
                request: logs_request(),
                reply: tx,
            },
        );

        handle_message(r#"{"jsonrpc":"2.0","id":9,"result":77}"#, &mut pending, &subs);

        let (id, _feed) = rx.try_recv().unwrap().unwrap();
        assert_eq!(id, SubscriptionId("77".into()));
        assert_eq!(subs.len(), 1);
    }

    #[test]
    fn resubscribe_response_attaches_under_new_id() {
        let subs = SubscriptionManager::new();
        let mut feed = subs.register(SubscriptionId("1".into()), logs_request());
        let mut pending = pending_resubscribes(&subs);
        assert!(subs.is_empty());

        handle_message(r#"{"jsonrpc":"2.0","id":100,"result":2}"#, &mut pending, &subs);
        assert!(subs.dispatch(&SubscriptionId("2".into()), json!("after")));
        assert!(!subs.dispatch(&SubscriptionId("1".into()), json!("stale")));

        assert_eq!(feed.try_recv().unwrap(), json!("after"));
        assert!(feed.try_recv().is_err());
    }

    #[test]
    fn swapped_ids_after_reconnect_do_not_cross_feeds() {
        let subs = SubscriptionManager::new();
        let mut a = subs.register(SubscriptionId("0".into()), logs_request());
        let mut b = subs.register(SubscriptionId("1".into()), logs_request());
        let mut pending = pending_resubscribes(&subs);

        // Whichever feed sits at request 100 gets the other's old id.
        handle_message(r#"{"jsonrpc":"2.0","id":100,"result":1}"#, &mut pending, &subs);
        handle_message(r#"{"jsonrpc":"2.0","id":101,"result":0}"#, &mut pending, &subs);
        assert_eq!(subs.len(), 2);
        assert!(pending.is_empty());

        for (id, payload) in [(0, "zero"), (1, "one")] {
            assert_eq!(handle_message(&notification(id, payload), &mut pending, &subs), Routed::Delivered);
        }
        let got_a = a.try_recv().unwrap();
        let got_b = b.try_recv().unwrap();
        assert_ne!(got_a, got_b);
        assert!(a.try_recv().is_err());
        assert!(b.try_recv().is_err());
    }

    #[test]
    fn rejected_resubscribe_ends_the_feed() {
        let subs = SubscriptionManager::new();
        let mut feed = subs.register(SubscriptionId("3".into()), logs_request());
        let mut pending = pending_resubscribes(&subs);

        handle_message(
            r#"{"jsonrpc":"2.0","id":100,"error":{"code":-32602,"message":"Invalid params"}}"#,
            &mut pending,
            &subs,
        );

        assert!(subs.is_empty());
        assert_eq!(feed.try_recv().unwrap_err(), mpsc::error::TryRecvError::Disconnected);
    }

    #[test]
    fn unanswered_resubscribes_survive_a_dropped_session() {
        let subs = SubscriptionManager::new();
        let mut feed = subs.register(SubscriptionId("3".into()), logs_request());
        let (tx, mut call) = oneshot::channel();
        let mut pending = pending_resubscribes(&subs);
        pending.insert(7, Pending::Call(tx));

        let carried = fail_pending(pending);

        assert_eq!(carried.len(), 1);
        assert!(matches!(call.try_recv().unwrap(), Err(TransportError::WebSocket(_))));
        assert_eq!(feed.try_recv().unwrap_err(), mpsc::error::TryRecvError::Empty);
    }

    #[test]
    fn rpc_error_fails_subscribe() {
        let subs = SubscriptionManager::new();
        let (tx, mut rx) = oneshot::channel();
        let mut pending = HashMap::new();
        pending.insert(
            4,
            Pending::Subscribe {
                request: logs_request(),
                reply: tx,
            },
        );

        handle_message(
            r#"{"jsonrpc":"2.0","id":4,"error":{"code":-32602,"message":"Invalid params"}}"#,
            &mut pending,
            &subs,
        );

        assert!(matches!(rx.try_recv().unwrap(), Err(TransportError::Rpc(_))));
        assert!(subs.is_empty());
    }

    #[test]
    fn reconnect_policy_doubles_then_gives_up() {
        let config = WsClientConfig {
            reconnect_initial: Duration::from_millis(500),
            reconnect_max: Duration::from_secs(2),
            max_reconnect_attempts: Some(4),
        };
        let policy = config.reconnect_policy();
        assert_eq!(policy.delay_after(1), Some(Duration::from_millis(500)));
        assert_eq!(policy.delay_after(2), Some(Duration::from_secs(1)));
        assert_eq!(policy.delay_after(3), Some(Duration::from_secs(2)));
        assert_eq!(policy.delay_after(4), None);

        let forever = WsClientConfig::default().reconnect_policy();
        assert_eq!(forever.delay_after(500), Some(Duration::from_secs(60)));
    }
}
