//! Running a mock service on a socket or an in-memory pipe.

use std::io;
use std::sync::Arc;
use std::thread::JoinHandle;

use sesame_core::config::ServiceAddress;
use sesame_core::ClientConfig;
use sesame_rpc::{JsonRpcRequest, MethodRegistry, Server};
use tempfile::TempDir;
use tokio::io::DuplexStream;
use tokio::net::UnixListener;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::handlers;
use crate::state::MockState;

/// Shared handle to a running mock's state.
pub type MockHandle = Arc<MockState>;

const PIPE_CAPACITY: usize = 64 * 1024;

async fn build_server(state: &MockHandle) -> Server {
    let registry = Arc::new(MethodRegistry::new());
    let observed = state.clone();
    let server = Server::new(registry.clone())
        .with_observer(Arc::new(move |request: &JsonRpcRequest| observed.record(request)));
    handlers::install(&registry, state, server.notifier()).await;
    server
}

/// A mock service listening on a unix socket in a private directory.
///
/// The service runs on its own thread and runtime, so blocking clients can
/// use it from plain `#[test]` functions. Stopped on drop.
pub struct MockService {
    name: String,
    state: MockHandle,
    address: ServiceAddress,
    shutdown: CancellationToken,
    thread: Option<JoinHandle<()>>,
    _dir: TempDir,
}

impl MockService {
    /// Start a service with the seeded fixture.
    pub fn start(name: &str) -> io::Result<Self> {
        Self::start_with(name, MockState::seeded())
    }

    /// Start a service over `state`.
    pub fn start_with(name: &str, state: MockState) -> io::Result<Self> {
        let dir = tempfile::Builder::new().prefix("sesame-mock-").tempdir()?;
        let socket = dir.path().join("bus");
        let address = ServiceAddress::Unix(socket.clone());
        let state = Arc::new(state);
        let shutdown = CancellationToken::new();

        let (ready_tx, ready_rx) = std::sync::mpsc::channel::<io::Result<()>>();
        let thread = {
            let state = state.clone();
            let shutdown = shutdown.clone();
            std::thread::Builder::new()
                .name(format!("mock-{name}"))
                .spawn(move || {
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime,
                        Err(e) => {
                            let _ = ready_tx.send(Err(e));
                            return;
                        }
                    };
                    runtime.block_on(async move {
                        let listener = match UnixListener::bind(&socket) {
                            Ok(listener) => listener,
                            Err(e) => {
                                let _ = ready_tx.send(Err(e));
                                return;
                            }
                        };
                        let server = Arc::new(build_server(&state).await);
                        let _ = ready_tx.send(Ok(()));
                        server.run_unix(listener, shutdown).await;
                    });
                })?
        };

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(io::Error::other("mock service thread exited during startup")),
        }
        info!(name, address = %address, "mock service started");

        Ok(Self {
            name: name.to_string(),
            state,
            address,
            shutdown,
            thread: Some(thread),
            _dir: dir,
        })
    }

    /// Serve the seeded fixture over an in-memory pipe on the current runtime.
    ///
    /// Returns the client end of the pipe.
    pub async fn pair() -> (DuplexStream, MockHandle) {
        Self::pair_with(MockState::seeded()).await
    }

    pub async fn pair_with(state: MockState) -> (DuplexStream, MockHandle) {
        let state = Arc::new(state);
        let server = build_server(&state).await;
        let (client, stream) = tokio::io::duplex(PIPE_CAPACITY);
        tokio::spawn(async move {
            if let Err(e) = server.serve(stream).await {
                warn!(error = %e, "mock pipe failed");
            }
        });
        (client, state)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn address(&self) -> &ServiceAddress {
        &self.address
    }

    /// Client configuration pointing at this service.
    pub fn config(&self) -> ClientConfig {
        ClientConfig {
            address: Some(self.address.to_string()),
            ..ClientConfig::default()
        }
    }

    pub fn handle(&self) -> &MockHandle {
        &self.state
    }

    /// Stop the service and wait for its thread.
    pub fn stop(mut self) {
        self.shutdown_now();
    }

    fn shutdown_now(&mut self) {
        self.shutdown.cancel();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                warn!(name = %self.name, "mock service thread panicked");
            }
            debug!(name = %self.name, "mock service stopped");
        }
    }
}

impl Drop for MockService {
    fn drop(&mut self) {
        self.shutdown_now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sesame_rpc::protocol::{ReadAlias, ReadAliasParams};
    use sesame_rpc::Connection;

    use crate::state::{collection_path, DEFAULT_COLLECTION};

    #[tokio::test]
    async fn test_pair_answers_and_records() {
        let (stream, handle) = MockService::pair().await;
        let conn = Connection::new(stream);

        let reply = conn
            .invoke::<ReadAlias>(&ReadAliasParams {
                name: "default".to_string(),
            })
            .await
            .unwrap();
        assert_eq!(reply.collection, collection_path(DEFAULT_COLLECTION));
        assert_eq!(handle.methods_called(), vec!["ReadAlias".to_string()]);
    }

    #[test]
    fn test_socket_service_accepts_connections() {
        let service = MockService::start("socket-accepts").unwrap();
        let address = service.address().clone();

        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        runtime.block_on(async {
            let conn = Connection::connect(&address).await.unwrap();
            let reply = conn
                .invoke::<ReadAlias>(&ReadAliasParams {
                    name: "missing".to_string(),
                })
                .await
                .unwrap();
            assert_eq!(reply.collection, "/");
        });
        service.stop();
    }
}
