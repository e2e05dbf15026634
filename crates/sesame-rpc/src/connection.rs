//! Client side of a connection to the service.
//!
//! Requests go through one writer task, so they reach the peer in the order
//! they were issued. A reader task correlates replies by id and fans
//! notifications out to subscribers. Waiters whose caller gave up (timeout or
//! cancellation) stay in the table until their reply arrives, which is then
//! dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use sesame_core::config::ServiceAddress;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::RpcError;
use crate::protocol::Method;
use crate::rpc::{Frame, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::Result;

/// Longest frame accepted from the peer.
pub const MAX_FRAME_LENGTH: usize = 16 * 1024 * 1024;

const NOTIFICATION_CAPACITY: usize = 256;

type Reply = Result<serde_json::Value>;

#[derive(Default)]
struct Waiters {
    pending: HashMap<u64, oneshot::Sender<Reply>>,
    closed: bool,
    signal: CancellationToken,
}

impl Waiters {
    /// Fail every waiter and refuse new ones.
    fn close(&mut self) {
        self.closed = true;
        self.signal.cancel();
        for (_, waiter) in self.pending.drain() {
            let _ = waiter.send(Err(RpcError::Closed));
        }
    }
}

/// A connection to a Secret Service peer.
pub struct Connection {
    outgoing: mpsc::UnboundedSender<String>,
    waiters: Arc<Mutex<Waiters>>,
    notifications: broadcast::Sender<JsonRpcNotification>,
    next_id: AtomicU64,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Connection {
    /// Connect to the service at `address`.
    pub async fn connect(address: &ServiceAddress) -> Result<Self> {
        match address {
            ServiceAddress::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path).await?;
                info!(address = %address, "connected to secret service");
                Ok(Self::new(stream))
            }
        }
    }

    /// Run the protocol over an already-open stream.
    ///
    /// Must be called from within a tokio runtime.
    pub fn new<S>(stream: S) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let waiters = Arc::new(Mutex::new(Waiters::default()));
        let (notifications, _) = broadcast::channel(NOTIFICATION_CAPACITY);
        let (outgoing, rx) = mpsc::unbounded_channel();

        let writer = tokio::spawn(write_loop(
            FramedWrite::new(write_half, LinesCodec::new()),
            rx,
            waiters.clone(),
        ));
        let reader = tokio::spawn(read_loop(
            FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_FRAME_LENGTH)),
            waiters.clone(),
            notifications.clone(),
        ));

        Self {
            outgoing,
            waiters,
            notifications,
            next_id: AtomicU64::new(1),
            reader,
            writer,
        }
    }

    /// Subscribe to peer notifications.
    ///
    /// Only notifications sent after this call are seen, so subscribe before
    /// issuing the call that triggers them.
    pub fn subscribe(&self) -> broadcast::Receiver<JsonRpcNotification> {
        self.notifications.subscribe()
    }

    /// Whether the peer has gone away.
    pub fn is_closed(&self) -> bool {
        self.waiters.lock().closed
    }

    /// Resolves once the connection is closed, from either side.
    pub async fn closed(&self) {
        let signal = self.waiters.lock().signal.clone();
        signal.cancelled().await;
    }

    /// Like [`Connection::closed`], but owns what it waits on.
    pub fn on_close(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let signal = self.waiters.lock().signal.clone();
        async move { signal.cancelled().await }
    }

    /// Number of requests still waiting for a reply.
    pub fn pending_replies(&self) -> usize {
        self.waiters.lock().pending.len()
    }

    /// Call `method` with raw JSON parameters.
    pub async fn call(&self, method: &str, params: serde_json::Value) -> Result<serde_json::Value> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let request = JsonRpcRequest::new(method).with_id(id).with_params(params);
        let line = serde_json::to_string(&request)?;

        let (tx, rx) = oneshot::channel();
        {
            // Registering and queueing happen without an await in between, so
            // a cancelled caller never leaves a waiter for an unsent request.
            let mut waiters = self.waiters.lock();
            if waiters.closed {
                return Err(RpcError::Closed);
            }
            if self.outgoing.send(line).is_err() {
                waiters.close();
                return Err(RpcError::Closed);
            }
            waiters.pending.insert(id, tx);
        }
        debug!(id, method, "request sent");

        rx.await.unwrap_or(Err(RpcError::Closed))
    }

    /// Call a typed protocol method.
    pub async fn invoke<M: Method>(&self, params: &M::Params) -> Result<M::Output> {
        let params = serde_json::to_value(params)?;
        let result = self.call(M::NAME, params).await?;
        serde_json::from_value(result).map_err(|e| {
            RpcError::Protocol(format!("malformed {} reply: {e}", M::NAME))
        })
    }

    /// Stop both I/O tasks and fail every outstanding call.
    pub fn close(&self) {
        self.waiters.lock().close();
        self.reader.abort();
        self.writer.abort();
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.close();
    }
}

async fn write_loop<W>(
    mut sink: FramedWrite<W, LinesCodec>,
    mut rx: mpsc::UnboundedReceiver<String>,
    waiters: Arc<Mutex<Waiters>>,
) where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = rx.recv().await {
        if let Err(e) = sink.send(line).await {
            warn!(error = %e, "write to secret service failed");
            break;
        }
    }
    waiters.lock().close();
}

async fn read_loop<R>(
    mut stream: FramedRead<R, LinesCodec>,
    waiters: Arc<Mutex<Waiters>>,
    notifications: broadcast::Sender<JsonRpcNotification>,
) where
    R: AsyncRead + Unpin,
{
    while let Some(line) = stream.next().await {
        let line = match line {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "read from secret service failed");
                break;
            }
        };
        if line.trim().is_empty() {
            continue;
        }

        match Frame::parse(&line) {
            Ok(Frame::Response(response)) => deliver(&waiters, response),
            Ok(Frame::Notification(notification)) => {
                debug!(method = %notification.method, "notification received");
                // No subscribers is fine.
                let _ = notifications.send(notification);
            }
            Ok(Frame::Request(request)) => {
                warn!(method = %request.method, "ignoring request from service");
            }
            Err(e) => warn!(error = %e, "ignoring malformed frame"),
        }
    }

    debug!("secret service connection closed");
    waiters.lock().close();
}

fn deliver(waiters: &Mutex<Waiters>, response: JsonRpcResponse) {
    let Some(id) = response.id else {
        if let Some(error) = response.error {
            warn!(message = %error.message, "service reported an uncorrelated error");
        }
        return;
    };

    let Some(waiter) = waiters.lock().pending.remove(&id) else {
        warn!(id, "reply for unknown request");
        return;
    };

    let reply = match (response.result, response.error) {
        (_, Some(error)) => Err(RpcError::from_jsonrpc(error)),
        (Some(result), None) => Ok(result),
        (None, None) => Ok(serde_json::Value::Null),
    };
    if waiter.send(reply).is_err() {
        debug!(id, "discarding reply for abandoned request");
    }
}
