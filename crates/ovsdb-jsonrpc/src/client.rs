//! JSON-RPC client connection
//!
//! One `JsonRpcClient` drives one byte stream. Two tasks are spawned per
//! connection:
//!
//! - the read loop owns frame decoding and dispatch (responses, peer
//!   requests, notifications)
//! - the write loop owns the write half and drains the outbound queue
//!
//! The call registry (state, id counter, pending calls) is the only shared
//! mutable state and lives behind a single mutex, so id allocation, response
//! matching and teardown are each atomic with respect to one another.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::task::{Context, Poll};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use crate::config::TransportConfig;
use crate::error::{JsonRpcError, Result};
use crate::framing::FrameDecoder;
use crate::protocol::{classify, Incoming, JsonRpcRequest, JsonRpcResponse, RequestId};

const READ_CHUNK: usize = 8 * 1024;

/// Lifecycle of a connection. Only `Open` accepts new calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ConnectionState::Connecting => "connecting",
            ConnectionState::Open => "open",
            ConnectionState::Closing => "closing",
            ConnectionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// Receiver for unsolicited traffic on a connection.
///
/// Called from the read loop, so implementations must not block: hand slow
/// work to another task.
pub trait NotificationHandler: Send + Sync + 'static {
    /// A notification (`id: null`) arrived
    fn handle_notification(&self, method: &str, params: Value);

    /// The connection was torn down. Called exactly once.
    fn connection_closed(&self, _error: &JsonRpcError) {}
}

/// Handler that discards every notification
#[derive(Debug, Default)]
pub struct IgnoreNotifications;

impl NotificationHandler for IgnoreNotifications {
    fn handle_notification(&self, method: &str, _params: Value) {
        debug!("Ignoring notification: {}", method);
    }
}

/// Diagnostic snapshot of an outstanding call
#[derive(Debug, Clone)]
pub struct PendingCallInfo {
    pub id: RequestId,
    pub method: String,
    pub created_at: DateTime<Utc>,
}

struct PendingCall {
    method: String,
    created_at: DateTime<Utc>,
    slot: oneshot::Sender<Result<Value>>,
}

struct Registry {
    state: ConnectionState,
    next_id: RequestId,
    pending: HashMap<RequestId, PendingCall>,
    outbound: Option<mpsc::UnboundedSender<String>>,
}

struct Shared {
    registry: Mutex<Registry>,
    state_tx: watch::Sender<ConnectionState>,
    handler: Arc<dyn NotificationHandler>,
    config: TransportConfig,
}

impl Shared {
    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_state(&self, registry: &mut Registry, state: ConnectionState) {
        registry.state = state;
        self.state_tx.send_replace(state);
    }

    fn enqueue(&self, frame: String) -> bool {
        let registry = self.registry();
        registry
            .outbound
            .as_ref()
            .is_some_and(|outbound| outbound.send(frame).is_ok())
    }

    fn dispatch(&self, incoming: Incoming) {
        match incoming {
            Incoming::Response(response) => self.resolve(response),
            Incoming::Notification(notification) => {
                debug!("Notification: {}", notification.method);
                self.handler
                    .handle_notification(&notification.method, notification.params);
            }
            Incoming::Request(request) => self.answer_peer_request(request),
        }
    }

    fn resolve(&self, response: JsonRpcResponse) {
        let Some(id) = response.request_id() else {
            warn!("Dropping response with unexpected id {}", response.id);
            return;
        };

        let call = {
            let mut registry = self.registry();
            let call = registry.pending.remove(&id);
            if call.is_none() {
                // Ids are issued in order, so anything below `next_id` is ours
                // and was cancelled or timed out.
                if (1..registry.next_id).contains(&id) {
                    debug!("Dropping late response for cancelled call {}", id);
                } else {
                    warn!("Dropping response for unknown call {}", id);
                }
            }
            call
        };

        if let Some(call) = call {
            let elapsed = Utc::now() - call.created_at;
            debug!(
                "Call {} ({}) answered after {}ms",
                id,
                call.method,
                elapsed.num_milliseconds()
            );
            // The caller may have dropped its future between lookup and send.
            let _ = call.slot.send(response.into_result());
        }
    }

    fn answer_peer_request(&self, request: JsonRpcRequest) {
        let response = match request.method.as_str() {
            "echo" => JsonRpcResponse::success(request.id, request.params),
            other => {
                warn!("Peer called unsupported method: {}", other);
                JsonRpcResponse::error(request.id, format!("unknown method: {}", other))
            }
        };

        match serde_json::to_string(&response) {
            Ok(frame) => {
                if !self.enqueue(frame) {
                    debug!("Connection closed before reply to peer request could be sent");
                }
            }
            Err(e) => warn!("Failed to encode reply to peer request: {}", e),
        }
    }

    /// Move to `Closed` and fail all outstanding work. Idempotent.
    fn teardown(&self, reason: String) {
        let pending = {
            let mut registry = self.registry();
            if registry.state == ConnectionState::Closed {
                return;
            }
            registry.outbound = None;
            self.set_state(&mut registry, ConnectionState::Closed);
            std::mem::take(&mut registry.pending)
        };

        let error = JsonRpcError::closed(reason);
        info!(
            "JSON-RPC connection closed ({}), failing {} pending call(s)",
            error,
            pending.len()
        );

        for (id, call) in pending {
            if call.slot.send(Err(error.clone())).is_err() {
                debug!("Call {} ({}) was abandoned before teardown", id, call.method);
            }
        }

        self.handler.connection_closed(&error);
    }
}

/// Handle to a JSON-RPC connection. Cheap to clone.
#[derive(Clone)]
pub struct JsonRpcClient {
    shared: Arc<Shared>,
}

impl JsonRpcClient {
    /// Start driving an established byte stream.
    ///
    /// Must be called from within a tokio runtime. The connection moves to
    /// `Open` as soon as its read and write tasks are running.
    pub fn start<R, W>(
        reader: R,
        writer: W,
        config: TransportConfig,
        handler: Arc<dyn NotificationHandler>,
    ) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (state_tx, _) = watch::channel(ConnectionState::Connecting);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let shared = Arc::new(Shared {
            registry: Mutex::new(Registry {
                state: ConnectionState::Connecting,
                next_id: 1,
                pending: HashMap::new(),
                outbound: Some(outbound_tx),
            }),
            state_tx,
            handler,
            config,
        });

        tokio::spawn(write_loop(Arc::clone(&shared), writer, outbound_rx));
        tokio::spawn(read_loop(Arc::clone(&shared), reader));

        {
            let mut registry = shared.registry();
            // The read loop may already have seen EOF.
            if registry.state == ConnectionState::Connecting {
                shared.set_state(&mut registry, ConnectionState::Open);
                info!("JSON-RPC connection open");
            }
        }

        Self { shared }
    }

    /// Issue a call and return a handle to its eventual response.
    ///
    /// Fails immediately with `ConnectionClosed` unless the connection is
    /// `Open`.
    pub fn call(&self, method: &str, params: Value) -> Result<ResponseFuture> {
        let mut registry = self.shared.registry();
        if registry.state != ConnectionState::Open {
            return Err(JsonRpcError::closed(format!(
                "cannot call {} on a {} connection",
                method, registry.state
            )));
        }

        let id = registry.next_id;
        registry.next_id += 1;

        let frame = serde_json::to_string(&JsonRpcRequest::new(method, params, id))?;
        let sent = registry
            .outbound
            .as_ref()
            .is_some_and(|outbound| outbound.send(frame).is_ok());
        if !sent {
            return Err(JsonRpcError::closed("writer has stopped"));
        }

        let (slot, receiver) = oneshot::channel();
        registry.pending.insert(
            id,
            PendingCall {
                method: method.to_string(),
                created_at: Utc::now(),
                slot,
            },
        );
        debug!("Call {} -> {}", id, method);

        Ok(ResponseFuture {
            id,
            receiver,
            shared: Arc::downgrade(&self.shared),
            finished: false,
        })
    }

    /// Issue a call and wait for it, honouring the configured call timeout
    pub async fn request(&self, method: &str, params: Value) -> Result<Value> {
        let call = self.call(method, params)?;
        match self.shared.config.call_timeout {
            Some(timeout) => call.with_timeout(timeout).await,
            None => call.await,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        self.shared.registry().state
    }

    /// Watch lifecycle transitions
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.shared.state_tx.subscribe()
    }

    /// Snapshot of outstanding calls, oldest first
    pub fn pending_calls(&self) -> Vec<PendingCallInfo> {
        let registry = self.shared.registry();
        let mut calls: Vec<_> = registry
            .pending
            .iter()
            .map(|(id, call)| PendingCallInfo {
                id: *id,
                method: call.method.clone(),
                created_at: call.created_at,
            })
            .collect();
        calls.sort_by_key(|call| call.id);
        calls
    }

    /// Close the connection, failing every outstanding call.
    ///
    /// The connection never reopens; build a new client to reconnect.
    pub fn close(&self) {
        {
            let mut registry = self.shared.registry();
            match registry.state {
                ConnectionState::Connecting | ConnectionState::Open => {
                    self.shared.set_state(&mut registry, ConnectionState::Closing);
                }
                ConnectionState::Closing | ConnectionState::Closed => return,
            }
        }
        self.shared.teardown("closed by client".to_string());
    }
}

/// The eventual response to one call.
///
/// Dropping it, or calling `cancel`, withdraws the call locally. The peer is
/// not told; a late reply is discarded.
#[must_use = "dropping a ResponseFuture cancels the call"]
pub struct ResponseFuture {
    id: RequestId,
    receiver: oneshot::Receiver<Result<Value>>,
    shared: Weak<Shared>,
    finished: bool,
}

impl ResponseFuture {
    /// The request id allocated for this call
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Withdraw the call
    pub fn cancel(mut self) {
        self.release();
    }

    /// Wait at most `timeout`; on expiry the call is withdrawn
    pub async fn with_timeout(mut self, timeout: Duration) -> Result<Value> {
        match tokio::time::timeout(timeout, &mut self).await {
            Ok(outcome) => outcome,
            Err(_) => {
                self.release();
                Err(JsonRpcError::Timeout(timeout))
            }
        }
    }

    fn release(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;

        if let Some(shared) = self.shared.upgrade() {
            let mut registry = shared.registry();
            if registry.pending.remove(&self.id).is_some() {
                debug!("Call {} cancelled", self.id);
            }
        }
    }
}

impl Future for ResponseFuture {
    type Output = Result<Value>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.receiver).poll(cx) {
            Poll::Ready(outcome) => {
                self.finished = true;
                Poll::Ready(outcome.unwrap_or_else(|_| {
                    Err(JsonRpcError::closed("response slot dropped"))
                }))
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl Drop for ResponseFuture {
    fn drop(&mut self) {
        self.release();
    }
}

async fn read_loop<R>(shared: Arc<Shared>, mut reader: R)
where
    R: AsyncRead + Unpin,
{
    let mut decoder = FrameDecoder::new(shared.config.max_frame_bytes);
    let mut state_rx = shared.state_tx.subscribe();
    let mut chunk = vec![0u8; READ_CHUNK];

    let reason = loop {
        let read = tokio::select! {
            read = reader.read(&mut chunk) => read,
            _ = state_rx.wait_for(|state| *state == ConnectionState::Closed) => break None,
        };

        match read {
            Ok(0) => break Some("connection closed by peer".to_string()),
            Ok(n) => {
                decoder.extend(&chunk[..n]);
                if let Err(e) = drain_frames(&shared, &mut decoder) {
                    error!("Tearing down JSON-RPC connection: {}", e);
                    break Some(e.to_string());
                }
            }
            Err(e) => break Some(format!("read failed: {}", e)),
        }
    };

    if let Some(reason) = reason {
        shared.teardown(reason);
    }
    debug!("JSON-RPC read loop finished");
}

fn drain_frames(shared: &Shared, decoder: &mut FrameDecoder) -> Result<()> {
    while let Some(frame) = decoder.next_frame()? {
        shared.dispatch(classify(frame)?);
    }
    Ok(())
}

async fn write_loop<W>(
    shared: Arc<Shared>,
    mut writer: W,
    mut outbound: mpsc::UnboundedReceiver<String>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = outbound.recv().await {
        debug!("Sending frame: {}", frame);
        let written = async {
            writer.write_all(frame.as_bytes()).await?;
            writer.write_all(b"\n").await?;
            writer.flush().await
        }
        .await;

        if let Err(e) = written {
            error!("Failed to write JSON-RPC frame: {}", e);
            shared.teardown(format!("write failed: {}", e));
            break;
        }
    }

    if let Err(e) = writer.shutdown().await {
        debug!("Writer shutdown: {}", e);
    }
    debug!("JSON-RPC write loop finished");
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::io::{DuplexStream, ReadHalf, WriteHalf};

    /// The far end of a duplex pipe, playing the OVSDB server
    struct FakePeer {
        reader: ReadHalf<DuplexStream>,
        writer: WriteHalf<DuplexStream>,
        decoder: FrameDecoder,
    }

    impl FakePeer {
        async fn recv(&mut self) -> Value {
            loop {
                if let Some(frame) = self.decoder.next_frame().unwrap() {
                    return frame;
                }
                let mut buf = [0u8; 4096];
                let n = self.reader.read(&mut buf).await.unwrap();
                assert!(n > 0, "client hung up");
                self.decoder.extend(&buf[..n]);
            }
        }

        async fn send_raw(&mut self, raw: &[u8]) {
            self.writer.write_all(raw).await.unwrap();
        }

        async fn send(&mut self, frame: Value) {
            self.send_raw(frame.to_string().as_bytes()).await;
        }

        async fn reply(&mut self, id: &Value, result: Value) {
            self.send(json!({"result": result, "error": null, "id": id}))
                .await;
        }
    }

    #[derive(Default)]
    struct Recorder {
        notifications: Mutex<Vec<(String, Value)>>,
        closed: AtomicUsize,
    }

    impl NotificationHandler for Recorder {
        fn handle_notification(&self, method: &str, params: Value) {
            self.notifications
                .lock()
                .unwrap()
                .push((method.to_string(), params));
        }

        fn connection_closed(&self, error: &JsonRpcError) {
            assert!(error.is_connection_closed());
            self.closed.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn connect(handler: Arc<dyn NotificationHandler>) -> (JsonRpcClient, FakePeer) {
        let (client_io, peer_io) = tokio::io::duplex(64 * 1024);
        let (reader, writer) = tokio::io::split(client_io);
        let client = JsonRpcClient::start(reader, writer, TransportConfig::default(), handler);

        let (reader, writer) = tokio::io::split(peer_io);
        let peer = FakePeer {
            reader,
            writer,
            decoder: FrameDecoder::new(1024 * 1024),
        };
        (client, peer)
    }

    #[tokio::test]
    async fn test_out_of_order_responses_are_correlated() {
        let (client, mut peer) = connect(Arc::new(IgnoreNotifications));
        assert_eq!(client.state(), ConnectionState::Open);

        let first = client.call("echo", json!(["a"])).unwrap();
        let second = client.call("echo", json!(["b"])).unwrap();
        let third = client.call("echo", json!(["c"])).unwrap();
        assert_eq!((first.id(), second.id(), third.id()), (1, 2, 3));

        let mut requests = Vec::new();
        for _ in 0..3 {
            requests.push(peer.recv().await);
        }
        for index in [2, 0, 1] {
            let request = &requests[index];
            peer.reply(&request["id"], request["params"].clone()).await;
        }

        assert_eq!(first.await.unwrap(), json!(["a"]));
        assert_eq!(second.await.unwrap(), json!(["b"]));
        assert_eq!(third.await.unwrap(), json!(["c"]));
        assert!(client.pending_calls().is_empty());
    }

    #[tokio::test]
    async fn test_remote_error_reaches_caller() {
        let (client, mut peer) = connect(Arc::new(IgnoreNotifications));
        let call = client.call("get_schema", json!(["nope"])).unwrap();

        let request = peer.recv().await;
        assert_eq!(request["method"], json!("get_schema"));
        peer.send(json!({"result": null, "error": {"error": "unknown database"}, "id": request["id"]}))
            .await;

        match call.await {
            Err(JsonRpcError::Remote(error)) => assert_eq!(error["error"], json!("unknown database")),
            other => panic!("expected remote error, got {:?}", other),
        }
        assert_eq!(client.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_teardown_fails_every_pending_call_once() {
        let recorder = Arc::new(Recorder::default());
        let (client, peer) = connect(recorder.clone());

        let calls: Vec<_> = (0..5)
            .map(|_| client.call("transact", json!(["db"])).unwrap())
            .collect();
        drop(peer);

        for outcome in futures::future::join_all(calls).await {
            assert!(matches!(outcome, Err(JsonRpcError::ConnectionClosed(_))));
        }
        assert_eq!(recorder.closed.load(Ordering::SeqCst), 1);
        assert_eq!(client.state(), ConnectionState::Closed);
        assert!(matches!(
            client.call("list_dbs", json!([])),
            Err(JsonRpcError::ConnectionClosed(_))
        ));

        client.close();
        assert_eq!(recorder.closed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_close_fails_pending_calls() {
        let (client, _peer) = connect(Arc::new(IgnoreNotifications));
        let mut states = client.state_changes();
        let pending = client.call("list_dbs", json!([])).unwrap();

        client.close();

        assert_eq!(*states.borrow_and_update(), ConnectionState::Closed);
        assert!(matches!(pending.await, Err(JsonRpcError::ConnectionClosed(_))));
    }

    #[tokio::test]
    async fn test_cancelled_call_ignores_late_response() {
        let (client, mut peer) = connect(Arc::new(IgnoreNotifications));

        let call = client.call("transact", json!(["db"])).unwrap();
        let request = peer.recv().await;
        call.cancel();
        assert!(client.pending_calls().is_empty());

        peer.reply(&request["id"], json!([{}])).await;

        let next = client.call("list_dbs", json!([])).unwrap();
        let request = peer.recv().await;
        assert_eq!(request["id"], json!(2));
        peer.reply(&request["id"], json!(["Open_vSwitch"])).await;
        assert_eq!(next.await.unwrap(), json!(["Open_vSwitch"]));
        assert_eq!(client.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_timeout_withdraws_call() {
        let (client, mut peer) = connect(Arc::new(IgnoreNotifications));

        let call = client.call("transact", json!(["db"])).unwrap();
        let outcome = call.with_timeout(Duration::from_millis(20)).await;
        assert!(matches!(outcome, Err(JsonRpcError::Timeout(_))));
        assert!(client.pending_calls().is_empty());

        let request = peer.recv().await;
        peer.reply(&request["id"], json!([])).await;
        assert_eq!(client.state(), ConnectionState::Open);
    }

    #[tokio::test]
    async fn test_timeouts_leave_no_bookkeeping_behind() {
        let (client, mut peer) = connect(Arc::new(IgnoreNotifications));

        for _ in 0..1000 {
            let call = client.call("echo", json!([])).unwrap();
            let outcome = call.with_timeout(Duration::ZERO).await;
            assert!(matches!(outcome, Err(JsonRpcError::Timeout(_))));
        }
        {
            let registry = client.shared.registry();
            assert!(registry.pending.is_empty());
            assert_eq!(registry.next_id, 1001);
        }

        // A late reply to an issued id and a reply to an id never issued are
        // both dropped without harming the connection.
        peer.reply(&json!(1), json!([])).await;
        peer.reply(&json!(5000), json!([])).await;

        let call = client.call("list_dbs", json!([])).unwrap();
        let request = loop {
            let frame = peer.recv().await;
            if frame["method"] == json!("list_dbs") {
                break frame;
            }
        };
        peer.reply(&request["id"], json!(["Open_vSwitch"])).await;
        assert_eq!(call.await.unwrap(), json!(["Open_vSwitch"]));
        assert_eq!(client.state(), ConnectionState::Open);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_ids_are_unique_across_threads() {
        let (client, _peer) = connect(Arc::new(IgnoreNotifications));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let client = client.clone();
                tokio::spawn(async move {
                    let mut ids = Vec::new();
                    for _ in 0..50 {
                        let call = client.call("echo", json!([])).unwrap();
                        ids.push(call.id());
                        call.cancel();
                        tokio::task::yield_now().await;
                    }
                    ids
                })
            })
            .collect();

        let mut seen = std::collections::HashSet::new();
        for task in futures::future::join_all(tasks).await {
            for id in task.unwrap() {
                assert!(seen.insert(id), "id {} issued twice", id);
            }
        }
        assert_eq!(seen.len(), 16 * 50);
        assert!(client.pending_calls().is_empty());
    }

    #[tokio::test]
    async fn test_peer_echo_is_answered() {
        let (_client, mut peer) = connect(Arc::new(IgnoreNotifications));

        peer.send(json!({"method": "echo", "params": [], "id": "echo"}))
            .await;
        let reply = peer.recv().await;
        assert_eq!(reply, json!({"result": [], "error": null, "id": "echo"}));
    }

    #[tokio::test]
    async fn test_notifications_are_routed_to_handler() {
        let recorder = Arc::new(Recorder::default());
        let (client, mut peer) = connect(recorder.clone());

        peer.send(json!({"method": "update", "params": ["m1", {}], "id": null}))
            .await;
        // Round-trip a call so the notification has been dispatched.
        let call = client.call("echo", json!([])).unwrap();
        let request = peer.recv().await;
        peer.reply(&request["id"], json!([])).await;
        call.await.unwrap();

        let notifications = recorder.notifications.lock().unwrap();
        assert_eq!(notifications.len(), 1);
        assert_eq!(notifications[0].0, "update");
        assert_eq!(notifications[0].1, json!(["m1", {}]));
    }

    #[tokio::test]
    async fn test_malformed_frame_tears_down_connection() {
        let recorder = Arc::new(Recorder::default());
        let (client, mut peer) = connect(recorder.clone());

        let call = client.call("list_dbs", json!([])).unwrap();
        peer.send_raw(b"{\"id\": 1,, }").await;

        assert!(matches!(call.await, Err(JsonRpcError::ConnectionClosed(_))));
        assert_eq!(client.state(), ConnectionState::Closed);
        assert_eq!(recorder.closed.load(Ordering::SeqCst), 1);
    }
}
