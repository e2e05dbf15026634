//! The connection object every operation runs against.

use std::collections::HashMap;
use std::sync::Arc;

use sesame_core::ClientConfig;
use sesame_core::config::SessionAlgorithmPreference;
use sesame_rpc::protocol::{CloseSession, CloseSessionParams, Method, OpenSession, OpenSessionParams};
use sesame_rpc::{Connection, RemoteErrorKind, RpcError};
use sesame_session::{Algorithm, Handshake, Session, SessionError};
use tokio::io::{AsyncRead, AsyncWrite};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};

pub(crate) struct Inner {
    pub(crate) conn: Connection,
    pub(crate) config: ClientConfig,
    session: tokio::sync::Mutex<Option<Arc<Session>>>,
    pub(crate) aliases: parking_lot::Mutex<HashMap<String, String>>,
}

impl Inner {
    /// Destroy the cached session key once the peer is gone.
    async fn drop_session(&self) {
        if let Some(session) = self.session.lock().await.take() {
            session.close();
            debug!(session = session.handle(), "connection closed; session key destroyed");
        }
        self.aliases.lock().clear();
    }
}

/// A client connection to a Secret Service.
///
/// Cheap to clone; clones share the connection, the transport session and
/// the alias cache. There is no process-wide instance: create one with
/// [`SecretService::connect`] and pass it where it is needed.
#[derive(Clone)]
pub struct SecretService {
    pub(crate) inner: Arc<Inner>,
}

impl SecretService {
    /// Connect to the service named by `config`.
    pub async fn connect(config: ClientConfig) -> Result<Self> {
        config.validate()?;
        let address = config.service_address()?;
        let conn = Connection::connect(&address).await?;
        Ok(Self::with_connection(conn, config))
    }

    /// Connect using the configuration file and environment.
    pub async fn connect_default() -> Result<Self> {
        Self::connect(ClientConfig::load_or_default()?).await
    }

    /// Speak the protocol over an already-open stream.
    pub fn from_stream<S>(stream: S, config: ClientConfig) -> Self
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        Self::with_connection(Connection::new(stream), config)
    }

    pub fn with_connection(conn: Connection, config: ClientConfig) -> Self {
        let closed = conn.on_close();
        let inner = Arc::new(Inner {
            conn,
            config,
            session: tokio::sync::Mutex::new(None),
            aliases: parking_lot::Mutex::new(HashMap::new()),
        });

        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let weak = Arc::downgrade(&inner);
            runtime.spawn(async move {
                closed.await;
                if let Some(inner) = weak.upgrade() {
                    inner.drop_session().await;
                }
            });
        }
        Self { inner }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn connection(&self) -> &Connection {
        &self.inner.conn
    }

    pub fn is_connected(&self) -> bool {
        !self.inner.conn.is_closed()
    }

    pub(crate) async fn call<M: Method>(&self, params: &M::Params) -> Result<M::Output> {
        Ok(self.inner.conn.invoke::<M>(params).await?)
    }

    /// The transport session, negotiated on first use.
    ///
    /// Concurrent first callers wait for a single negotiation.
    pub async fn session(&self) -> Result<Arc<Session>> {
        if self.inner.conn.is_closed() {
            self.inner.drop_session().await;
            return Err(RpcError::Closed.into());
        }

        let mut current = self.inner.session.lock().await;
        if let Some(session) = current.as_ref() {
            if !session.is_closed() {
                return Ok(session.clone());
            }
        }

        let session = Arc::new(self.negotiate().await?);
        *current = Some(session.clone());
        Ok(session)
    }

    /// Forget `stale` so the next operation negotiates afresh.
    pub(crate) async fn invalidate_session(&self, stale: &Arc<Session>) {
        let mut current = self.inner.session.lock().await;
        if current.as_ref().map_or(false, |s| Arc::ptr_eq(s, stale)) {
            warn!(session = stale.handle(), "service lost the session");
            *current = None;
        }
        stale.close();
    }

    /// Pass `result` through, dropping the session if the service lost it.
    pub(crate) async fn check_session<T>(&self, result: Result<T>, session: &Arc<Session>) -> Result<T> {
        if let Err(e) = &result {
            if e.is(RemoteErrorKind::NoSession) {
                self.invalidate_session(session).await;
            }
        }
        result
    }

    async fn negotiate(&self) -> Result<Session> {
        let session_config = &self.inner.config.session;
        let preferred = match session_config.algorithm {
            SessionAlgorithmPreference::Aes => Algorithm::DhAes,
            SessionAlgorithmPreference::Plain => Algorithm::Plain,
        };

        match self.open_session(Handshake::new(preferred)).await {
            Err(Error::Negotiation(SessionError::NegotiationRejected(reason)))
                if preferred == Algorithm::DhAes && session_config.allow_plain_fallback =>
            {
                warn!(%reason, "falling back to an unencrypted session");
                self.open_session(Handshake::plain()).await
            }
            other => other,
        }
    }

    async fn open_session(&self, handshake: Handshake) -> Result<Session> {
        let algorithm = handshake.algorithm();
        let params = OpenSessionParams {
            algorithm: algorithm.as_str().to_string(),
            input: handshake.input(),
        };

        let reply = match self.call::<OpenSession>(&params).await {
            Ok(reply) => reply,
            Err(e) if e.is(RemoteErrorKind::NotSupported) => {
                return Err(SessionError::NegotiationRejected(format!(
                    "service does not support {algorithm}"
                ))
                .into());
            }
            Err(e) => return Err(e),
        };

        let handle = reply.session.clone();
        match handshake.complete(&reply.output, reply.session) {
            Ok(session) => {
                info!(session = session.handle(), %algorithm, "opened transport session");
                Ok(session)
            }
            Err(e) => {
                // The service holds a half-made session; let it go.
                let _ = self
                    .call::<CloseSession>(&CloseSessionParams { session: handle })
                    .await;
                Err(e.into())
            }
        }
    }

    /// Close the transport session and the connection.
    ///
    /// The session key is destroyed even if the service cannot be told.
    pub async fn disconnect(&self) -> Result<()> {
        let session = self.inner.session.lock().await.take();
        self.inner.aliases.lock().clear();

        let mut result = Ok(());
        if let Some(session) = session {
            let handle = session.handle().to_string();
            session.close();
            if !self.inner.conn.is_closed() {
                result = self
                    .call::<CloseSession>(&CloseSessionParams { session: handle })
                    .await
                    .map(|_| ());
            }
        }

        self.inner.conn.close();
        debug!("disconnected from secret service");
        result
    }
}
