//! Blocking and callback entry points over the async operations.
//!
//! A [`Dispatcher`] owns a single-threaded runtime. Every call, blocking or
//! not, spawns the same operation future on it. When an operation finishes
//! its callback is queued, and callbacks only run from [`Dispatcher::iterate`]
//! after the runtime has returned control. That is what makes it legal for a
//! callback to make another blocking call.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};
use std::time::Duration;

use sesame_core::{AttributeSet, ClientConfig, Schema, SecretValue};
use sesame_rpc::RpcError;
use tokio::runtime::Runtime;
use tokio::sync::Notify;
use tokio::task::LocalSet;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{Error, Result};
use crate::item::{Item, SearchFlags};
use crate::service::SecretService;

type Completion = Box<dyn FnOnce()>;
type Sink<T> = Rc<RefCell<Option<Box<dyn FnOnce(Result<T>)>>>>;

/// Where a [`PendingOperation`] stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationState {
    Pending,
    /// Finished, successfully or with an error; the callback is queued or ran.
    Completed,
    Cancelled,
    TimedOut,
}

/// Handle to an operation started with one of the `*_async` calls.
pub struct PendingOperation {
    state: Rc<Cell<OperationState>>,
    cancel: Rc<dyn Fn()>,
}

impl PendingOperation {
    pub fn state(&self) -> OperationState {
        self.state.get()
    }

    pub fn is_pending(&self) -> bool {
        self.state() == OperationState::Pending
    }

    /// Cancel the operation.
    ///
    /// The callback runs right away with [`Error::Cancelled`]. A request
    /// already sent is not recalled; its reply is read and dropped. Does
    /// nothing once the operation has finished.
    pub fn cancel(&self) {
        (self.cancel)();
    }
}

impl fmt::Debug for PendingOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingOperation")
            .field("state", &self.state())
            .finish()
    }
}

impl fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Dispatcher")
            .field("in_flight", &self.inner.in_flight.get())
            .field("queued", &self.inner.completions.borrow().len())
            .field("connected", &self.inner.service.is_connected())
            .finish()
    }
}

struct Inner {
    // Field order is drop order: the connection goes before the runtime.
    service: SecretService,
    local: LocalSet,
    runtime: Runtime,
    completions: RefCell<VecDeque<Completion>>,
    wake: Rc<Notify>,
    in_flight: Cell<usize>,
    timeout: Cell<Option<Duration>>,
}

/// Runs operations for code that is not itself async.
///
/// Not `Send`: use it from the thread that created it. Clones share the same
/// loop, so a callback can capture one and make further calls.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Rc<Inner>,
}

impl Dispatcher {
    /// Connect to the service named by `config`.
    pub fn connect(config: ClientConfig) -> Result<Self> {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::WouldBlock);
        }
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| Error::Transport(RpcError::Io(e)))?;
        let local = LocalSet::new();
        let timeout = config.call_timeout();
        let service = local.block_on(&runtime, SecretService::connect(config))?;

        Ok(Self {
            inner: Rc::new(Inner {
                service,
                local,
                runtime,
                completions: RefCell::new(VecDeque::new()),
                wake: Rc::new(Notify::new()),
                in_flight: Cell::new(0),
                timeout: Cell::new(timeout),
            }),
        })
    }

    /// Connect using the configuration file and environment.
    pub fn connect_default() -> Result<Self> {
        Self::connect(ClientConfig::load_or_default()?)
    }

    /// The service the operations run against.
    pub fn service(&self) -> &SecretService {
        &self.inner.service
    }

    /// Deadline for operations started from now on.
    pub fn set_timeout(&self, timeout: Option<Duration>) {
        self.inner.timeout.set(timeout);
    }

    /// Operations that have not finished.
    pub fn pending(&self) -> usize {
        self.inner.in_flight.get()
    }

    /// Start `future` and call `callback` with its result from a later
    /// [`iterate`](Self::iterate).
    pub fn spawn<T, F, C>(&self, future: F, callback: C) -> PendingOperation
    where
        T: 'static,
        F: Future<Output = Result<T>> + 'static,
        C: FnOnce(Result<T>) + 'static,
    {
        let token = CancellationToken::new();
        let state = Rc::new(Cell::new(OperationState::Pending));
        let sink: Sink<T> = Rc::new(RefCell::new(Some(Box::new(callback))));
        let deadline = self.inner.timeout.get();

        let task = {
            let token = token.clone();
            let state = state.clone();
            let sink = sink.clone();
            let inner = Rc::downgrade(&self.inner);
            async move {
                let outcome = tokio::select! {
                    biased;
                    _ = token.cancelled() => None,
                    result = with_deadline(deadline, future) => Some(result),
                };
                finish(&inner, &state, &sink, outcome);
            }
        };

        self.inner.in_flight.set(self.inner.in_flight.get() + 1);
        self.inner.local.spawn_local(task);

        let cancel = {
            let state = state.clone();
            move || {
                token.cancel();
                let taken = sink.borrow_mut().take();
                if let Some(callback) = taken {
                    debug!("operation cancelled");
                    state.set(OperationState::Cancelled);
                    callback(Err(Error::Cancelled));
                }
            }
        };

        PendingOperation {
            state,
            cancel: Rc::new(cancel),
        }
    }

    /// Run `future` to completion, letting other operations progress.
    pub fn block_on<T, F>(&self, future: F) -> Result<T>
    where
        T: 'static,
        F: Future<Output = Result<T>> + 'static,
    {
        if tokio::runtime::Handle::try_current().is_ok() {
            return Err(Error::WouldBlock);
        }

        let slot: Rc<RefCell<Option<Result<T>>>> = Rc::new(RefCell::new(None));
        let writer = slot.clone();
        let _operation = self.spawn(future, move |result| {
            *writer.borrow_mut() = Some(result);
        });

        loop {
            let done = slot.borrow_mut().take();
            if let Some(result) = done {
                return result;
            }
            self.iterate();
        }
    }

    /// Run one turn of the loop.
    ///
    /// Drives the runtime until at least one operation finishes (unless a
    /// callback is already waiting), then runs every queued callback.
    /// Returns whether any callback ran.
    pub fn iterate(&self) -> bool {
        let idle = self.inner.completions.borrow().is_empty();
        if idle {
            if self.inner.in_flight.get() == 0 {
                return false;
            }
            let wake = self.inner.wake.clone();
            self.inner
                .local
                .block_on(&self.inner.runtime, async move { wake.notified().await });
        }
        self.run_completions()
    }

    /// Iterate until no operation is pending.
    pub fn run_until_idle(&self) {
        loop {
            self.iterate();
            if self.inner.in_flight.get() == 0 && self.inner.completions.borrow().is_empty() {
                break;
            }
        }
    }

    fn run_completions(&self) -> bool {
        let mut ran = false;
        loop {
            let next = self.inner.completions.borrow_mut().pop_front();
            let Some(completion) = next else {
                break;
            };
            completion();
            ran = true;
        }
        ran
    }

    /// Close the session and the connection.
    pub fn disconnect(&self) -> Result<()> {
        let service = self.inner.service.clone();
        self.block_on(async move { service.disconnect().await })
    }

    pub fn lookup_async<C>(&self, schema: &Schema, attributes: &AttributeSet, callback: C) -> PendingOperation
    where
        C: FnOnce(Result<Option<SecretValue>>) + 'static,
    {
        self.spawn(self.lookup_future(schema, attributes), callback)
    }

    pub fn lookup_sync(&self, schema: &Schema, attributes: &AttributeSet) -> Result<Option<SecretValue>> {
        self.block_on(self.lookup_future(schema, attributes))
    }

    fn lookup_future(
        &self,
        schema: &Schema,
        attributes: &AttributeSet,
    ) -> impl Future<Output = Result<Option<SecretValue>>> + 'static {
        let service = self.inner.service.clone();
        let schema = schema.clone();
        let attributes = attributes.clone();
        async move { service.lookup(&schema, &attributes).await }
    }

    #[allow(clippy::too_many_arguments)]
    pub fn store_async<C>(
        &self,
        schema: &Schema,
        attributes: &AttributeSet,
        collection: Option<&str>,
        label: &str,
        secret: &SecretValue,
        replace: bool,
        callback: C,
    ) -> PendingOperation
    where
        C: FnOnce(Result<String>) + 'static,
    {
        let future = self.store_future(schema, attributes, collection, label, secret, replace);
        self.spawn(future, callback)
    }

    pub fn store_sync(
        &self,
        schema: &Schema,
        attributes: &AttributeSet,
        collection: Option<&str>,
        label: &str,
        secret: &SecretValue,
        replace: bool,
    ) -> Result<String> {
        self.block_on(self.store_future(schema, attributes, collection, label, secret, replace))
    }

    fn store_future(
        &self,
        schema: &Schema,
        attributes: &AttributeSet,
        collection: Option<&str>,
        label: &str,
        secret: &SecretValue,
        replace: bool,
    ) -> impl Future<Output = Result<String>> + 'static {
        let service = self.inner.service.clone();
        let schema = schema.clone();
        let attributes = attributes.clone();
        let collection = collection.map(str::to_string);
        let label = label.to_string();
        let secret = secret.clone();
        async move {
            service
                .store(&schema, &attributes, collection.as_deref(), &label, &secret, replace)
                .await
        }
    }

    pub fn remove_async<C>(&self, schema: &Schema, attributes: &AttributeSet, callback: C) -> PendingOperation
    where
        C: FnOnce(Result<bool>) + 'static,
    {
        self.spawn(self.remove_future(schema, attributes), callback)
    }

    pub fn remove_sync(&self, schema: &Schema, attributes: &AttributeSet) -> Result<bool> {
        self.block_on(self.remove_future(schema, attributes))
    }

    fn remove_future(
        &self,
        schema: &Schema,
        attributes: &AttributeSet,
    ) -> impl Future<Output = Result<bool>> + 'static {
        let service = self.inner.service.clone();
        let schema = schema.clone();
        let attributes = attributes.clone();
        async move { service.remove(&schema, &attributes).await }
    }

    pub fn search_async<C>(
        &self,
        schema: &Schema,
        attributes: &AttributeSet,
        flags: SearchFlags,
        callback: C,
    ) -> PendingOperation
    where
        C: FnOnce(Result<Vec<Item>>) + 'static,
    {
        self.spawn(self.search_future(schema, attributes, flags), callback)
    }

    pub fn search_sync(
        &self,
        schema: &Schema,
        attributes: &AttributeSet,
        flags: SearchFlags,
    ) -> Result<Vec<Item>> {
        self.block_on(self.search_future(schema, attributes, flags))
    }

    fn search_future(
        &self,
        schema: &Schema,
        attributes: &AttributeSet,
        flags: SearchFlags,
    ) -> impl Future<Output = Result<Vec<Item>>> + 'static {
        let service = self.inner.service.clone();
        let schema = schema.clone();
        let attributes = attributes.clone();
        async move { service.search(&schema, &attributes, flags).await }
    }

    pub fn clear_async<C>(&self, schema: &Schema, attributes: &AttributeSet, callback: C) -> PendingOperation
    where
        C: FnOnce(Result<usize>) + 'static,
    {
        self.spawn(self.clear_future(schema, attributes), callback)
    }

    pub fn clear_sync(&self, schema: &Schema, attributes: &AttributeSet) -> Result<usize> {
        self.block_on(self.clear_future(schema, attributes))
    }

    fn clear_future(
        &self,
        schema: &Schema,
        attributes: &AttributeSet,
    ) -> impl Future<Output = Result<usize>> + 'static {
        let service = self.inner.service.clone();
        let schema = schema.clone();
        let attributes = attributes.clone();
        async move { service.clear(&schema, &attributes).await }
    }
}

async fn with_deadline<T>(deadline: Option<Duration>, future: impl Future<Output = Result<T>>) -> Result<T> {
    match deadline {
        Some(deadline) => tokio::time::timeout(deadline, future)
            .await
            .unwrap_or(Err(Error::Timeout)),
        None => future.await,
    }
}

/// Record how an operation ended and queue its callback.
fn finish<T: 'static>(
    inner: &Weak<Inner>,
    state: &Cell<OperationState>,
    sink: &Sink<T>,
    outcome: Option<Result<T>>,
) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    inner.in_flight.set(inner.in_flight.get().saturating_sub(1));

    if let Some(result) = outcome {
        let taken = sink.borrow_mut().take();
        if let Some(callback) = taken {
            state.set(match &result {
                Err(Error::Timeout) => OperationState::TimedOut,
                _ => OperationState::Completed,
            });
            inner
                .completions
                .borrow_mut()
                .push_back(Box::new(move || callback(result)));
        }
    }
    inner.wake.notify_one();
}
