//! Serving side of the protocol, used by test doubles and local services.

use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::UnixListener;
use tokio::sync::{broadcast, mpsc};
use tokio_util::codec::{FramedRead, FramedWrite, LinesCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::connection::MAX_FRAME_LENGTH;
use crate::methods::MethodRegistry;
use crate::rpc::{Frame, JsonRpcError, JsonRpcNotification, JsonRpcRequest, JsonRpcResponse};
use crate::Result;

/// Callback run on every request before it is dispatched.
pub type RequestObserver = Arc<dyn Fn(&JsonRpcRequest) + Send + Sync>;

/// Sends notifications to every connected client.
#[derive(Clone)]
pub struct Notifier {
    tx: broadcast::Sender<JsonRpcNotification>,
}

impl Notifier {
    /// Broadcast a notification.
    pub fn notify(&self, method: &str, params: serde_json::Value) {
        let _ = self.tx.send(JsonRpcNotification::new(method, params));
    }
}

/// A JSON-RPC server dispatching to a [`MethodRegistry`].
///
/// Requests on one connection are handled concurrently, so a method that
/// never answers does not hold up the others.
pub struct Server {
    methods: Arc<MethodRegistry>,
    notifications: broadcast::Sender<JsonRpcNotification>,
    observer: Option<RequestObserver>,
}

impl Server {
    pub fn new(methods: Arc<MethodRegistry>) -> Self {
        let (notifications, _) = broadcast::channel(1000);
        Self {
            methods,
            notifications,
            observer: None,
        }
    }

    /// Observe every incoming request.
    pub fn with_observer(mut self, observer: RequestObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Handle for pushing notifications to clients.
    pub fn notifier(&self) -> Notifier {
        Notifier {
            tx: self.notifications.clone(),
        }
    }

    pub fn methods(&self) -> &Arc<MethodRegistry> {
        &self.methods
    }

    /// Accept clients on `listener` until `shutdown` fires.
    pub async fn run_unix(self: Arc<Self>, listener: UnixListener, shutdown: CancellationToken) {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("server shutting down");
                    break;
                }
                accepted = listener.accept() => match accepted {
                    Ok((stream, _)) => {
                        let server = self.clone();
                        let shutdown = shutdown.clone();
                        tokio::spawn(async move {
                            tokio::select! {
                                _ = shutdown.cancelled() => {}
                                result = server.serve(stream) => {
                                    if let Err(e) = result {
                                        warn!(error = %e, "client connection failed");
                                    }
                                }
                            }
                        });
                    }
                    Err(e) => {
                        error!(error = %e, "accept failed");
                        break;
                    }
                },
            }
        }
    }

    /// Serve one client until it disconnects.
    pub async fn serve<S>(&self, stream: S) -> Result<()>
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (read_half, write_half) = tokio::io::split(stream);
        let mut lines = FramedRead::new(read_half, LinesCodec::new_with_max_length(MAX_FRAME_LENGTH));
        let mut sink = FramedWrite::new(write_half, LinesCodec::new());
        let mut notes = self.notifications.subscribe();
        let (reply_tx, mut replies) = mpsc::unbounded_channel::<String>();

        debug!("client connected");
        loop {
            tokio::select! {
                line = lines.next() => match line {
                    Some(Ok(line)) => self.dispatch(&line, &reply_tx),
                    Some(Err(e)) => {
                        warn!(error = %e, "unreadable frame from client");
                        break;
                    }
                    None => break,
                },
                Some(reply) = replies.recv() => {
                    sink.send(reply).await.map_err(std::io::Error::other)?;
                }
                note = notes.recv() => match note {
                    Ok(note) => {
                        let line = serde_json::to_string(&note)?;
                        sink.send(line).await.map_err(std::io::Error::other)?;
                    }
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "client fell behind on notifications");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                },
            }
        }
        debug!("client disconnected");
        Ok(())
    }

    fn dispatch(&self, line: &str, reply_tx: &mpsc::UnboundedSender<String>) {
        if line.trim().is_empty() {
            return;
        }

        let request = match Frame::parse(line) {
            Ok(Frame::Request(request)) => request,
            Ok(_) => {
                warn!("ignoring non-request frame from client");
                return;
            }
            Err(e) => {
                let response = JsonRpcResponse::error(None, JsonRpcError::parse_error(e.to_string()));
                let _ = reply_tx.send(serde_json::to_string(&response).unwrap_or_default());
                return;
            }
        };

        if let Some(observer) = &self.observer {
            observer(&request);
        }
        debug!(id = request.id, method = %request.method, "request received");

        let methods = self.methods.clone();
        let reply_tx = reply_tx.clone();
        tokio::spawn(async move {
            let response = match methods.call(&request.method, request.params).await {
                Ok(value) => JsonRpcResponse::success(Some(request.id), value),
                Err(e) => JsonRpcResponse::error(Some(request.id), e.to_jsonrpc()),
            };
            let _ = reply_tx.send(serde_json::to_string(&response).unwrap_or_default());
        });
    }
}
