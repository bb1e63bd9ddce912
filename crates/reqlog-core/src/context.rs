//! Request context and ambient lookup
//!
//! A [`RequestContext`] carries the buffering and correlation state of one
//! request. Code running inside the request finds it through [`current`]
//! without threading it through call signatures.
//!
//! Binding is kept on a per-thread stack:
//!
//! - synchronous code binds with [`RequestContext::enter`], which returns a
//!   guard that unbinds on drop (including during unwinding);
//! - asynchronous code binds with [`scope`] or [`RequestFutureExt::in_request`],
//!   which bind only while the wrapped future is being polled, so a context
//!   never leaks to another task that later runs on the same worker thread.
//!
//! A closed context is never returned by [`current`].

use crate::queue::BatchQueue;
use pin_project_lite::pin_project;
use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::{Duration, Instant};

thread_local! {
    static CONTEXT_STACK: RefCell<Vec<Arc<RequestContext>>> = const { RefCell::new(Vec::new()) };
}

/// Static attributes of a request, known when it starts.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RequestMeta {
    /// HTTP method, upper-case
    pub method: String,
    /// Path including the query string
    pub path: String,
    /// Client address
    pub remote_address: Option<String>,
    /// `User-Agent` header
    pub user_agent: Option<String>,
    /// `Referer` header
    pub referer: Option<String>,
    /// Request payload size in bytes
    pub request_size: Option<u64>,
}

impl RequestMeta {
    /// Create request metadata for a method and path.
    pub fn new(method: impl AsRef<str>, path: impl Into<String>) -> Self {
        Self {
            method: method.as_ref().to_ascii_uppercase(),
            path: path.into(),
            ..Default::default()
        }
    }

    /// Set the client address
    pub fn remote_address(mut self, addr: impl Into<String>) -> Self {
        self.remote_address = Some(addr.into());
        self
    }

    /// Set the user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.user_agent = Some(agent.into());
        self
    }

    /// Set the referer
    pub fn referer(mut self, referer: impl Into<String>) -> Self {
        self.referer = Some(referer.into());
        self
    }

    /// Set the request payload size
    pub fn request_size(mut self, size: u64) -> Self {
        self.request_size = Some(size);
        self
    }
}

/// Outcome of a request, known once the response is produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpOutcome {
    /// Response status code
    pub status: u16,
    /// Response body size in bytes
    pub response_size: Option<u64>,
    /// Time taken to produce the response
    pub latency: Option<Duration>,
}

impl HttpOutcome {
    /// Create an outcome with only a status code.
    pub fn new(status: u16) -> Self {
        Self {
            status,
            response_size: None,
            latency: None,
        }
    }

    /// Set the response size
    pub fn response_size(mut self, size: u64) -> Self {
        self.response_size = Some(size);
        self
    }

    /// Set the latency
    pub fn latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }
}

/// Lifecycle phase of a request context.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Entries are appended; threshold flushes dispatch partial groups.
    Accumulating,
    /// The final flush is running.
    Finalizing,
    /// Torn down. Nothing is appended or flushed any more.
    Closed,
}

/// Whether the group carrying `operation.first` has been dispatched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum FirstMarker {
    Pending,
    Sent,
}

/// Mutable per-request state, guarded by the context's lock.
#[derive(Debug)]
pub(crate) struct ContextState {
    pub(crate) queue: BatchQueue,
    first: FirstMarker,
    phase: Phase,
    outcome: Option<HttpOutcome>,
}

impl ContextState {
    pub(crate) fn phase(&self) -> Phase {
        self.phase
    }

    pub(crate) fn outcome(&self) -> Option<&HttpOutcome> {
        self.outcome.as_ref()
    }

    pub(crate) fn set_outcome(&mut self, outcome: HttpOutcome) {
        if self.phase != Phase::Closed {
            self.outcome = Some(outcome);
        }
    }

    /// Claim the first marker. Returns `true` exactly once per request.
    pub(crate) fn claim_first(&mut self) -> bool {
        match self.first {
            FirstMarker::Pending => {
                self.first = FirstMarker::Sent;
                true
            }
            FirstMarker::Sent => false,
        }
    }

    /// `Accumulating -> Finalizing`. Returns `false` if finalization already began.
    pub(crate) fn begin_finalizing(&mut self) -> bool {
        if self.phase == Phase::Accumulating {
            self.phase = Phase::Finalizing;
            true
        } else {
            false
        }
    }
}

/// Buffering and correlation state of one request.
#[derive(Debug)]
pub struct RequestContext {
    request_id: String,
    meta: RequestMeta,
    started_at: Instant,
    closed: AtomicBool,
    state: Mutex<ContextState>,
}

impl RequestContext {
    pub(crate) fn new(request_id: String, meta: RequestMeta, batch_size: usize) -> Arc<Self> {
        Arc::new(Self {
            request_id,
            meta,
            started_at: Instant::now(),
            closed: AtomicBool::new(false),
            state: Mutex::new(ContextState {
                queue: BatchQueue::new(batch_size),
                first: FirstMarker::Pending,
                phase: Phase::Accumulating,
                outcome: None,
            }),
        })
    }

    /// Correlation key shared by every group of this request
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Request attributes captured at start
    pub fn meta(&self) -> &RequestMeta {
        &self.meta
    }

    /// Time since the context was created
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    /// Current lifecycle phase
    pub fn phase(&self) -> Phase {
        self.lock().phase
    }

    /// Check if the context has been torn down
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Number of entries waiting to be flushed
    pub fn queued(&self) -> usize {
        self.lock().queue.len()
    }

    /// Recorded HTTP outcome, if any
    pub fn outcome(&self) -> Option<HttpOutcome> {
        self.lock().outcome.clone()
    }

    /// Record the HTTP outcome. Ignored once the context is closed.
    pub fn set_outcome(&self, outcome: HttpOutcome) {
        self.lock().set_outcome(outcome);
    }

    /// Tear the context down without flushing.
    ///
    /// Returns `true` for the call that closed it; every later call is a no-op.
    pub(crate) fn close(&self) -> bool {
        let mut state = self.lock();
        self.close_locked(&mut state)
    }

    /// [`close`](Self::close) for a caller already holding the state lock.
    pub(crate) fn close_locked(&self, state: &mut ContextState) -> bool {
        if state.phase == Phase::Closed {
            return false;
        }
        state.phase = Phase::Closed;
        self.closed.store(true, Ordering::Release);
        true
    }

    /// Bind this context to the current thread until the guard is dropped.
    pub fn enter(self: &Arc<Self>) -> ContextGuard {
        let depth = CONTEXT_STACK.with(|stack| {
            let mut stack = stack.borrow_mut();
            stack.push(Arc::clone(self));
            stack.len() - 1
        });
        ContextGuard {
            depth,
            _not_send: PhantomData,
        }
    }

    /// Lock the mutable state. A poisoned lock is recovered; the state
    /// itself is never left half-updated by a panicking writer.
    pub(crate) fn lock(&self) -> MutexGuard<'_, ContextState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Keeps a context bound to the current thread.
///
/// Not `Send`: a binding belongs to the thread that created it.
#[must_use = "the context is unbound as soon as the guard is dropped"]
pub struct ContextGuard {
    depth: usize,
    _not_send: PhantomData<*const ()>,
}

impl Drop for ContextGuard {
    fn drop(&mut self) {
        // `try_with`: the guard may outlive the thread-local during thread exit
        let _ = CONTEXT_STACK.try_with(|stack| stack.borrow_mut().truncate(self.depth));
    }
}

/// The context bound to the current execution flow, unless it is closed.
pub fn current() -> Option<Arc<RequestContext>> {
    CONTEXT_STACK
        .try_with(|stack| {
            stack
                .borrow()
                .last()
                .filter(|ctx| !ctx.is_closed())
                .cloned()
        })
        .ok()
        .flatten()
}

pin_project! {
    /// Future bound to a request context while it is polled.
    pub struct InRequest<F> {
        #[pin]
        inner: F,
        context: Option<Arc<RequestContext>>,
    }
}

impl<F: Future> Future for InRequest<F> {
    type Output = F::Output;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let _guard = this.context.as_ref().map(|ctx| ctx.enter());
        this.inner.poll(cx)
    }
}

/// Run a future with `context` bound.
pub fn scope<F: Future>(context: Arc<RequestContext>, future: F) -> InRequest<F> {
    InRequest {
        inner: future,
        context: Some(context),
    }
}

/// Run a future with the caller's current context bound, if there is one.
///
/// Use this for sub-tasks spawned from inside a request that should log
/// against the same request.
pub fn in_current_request<F: Future>(future: F) -> InRequest<F> {
    InRequest {
        inner: future,
        context: current(),
    }
}

/// Extension methods for binding futures to a request context.
pub trait RequestFutureExt: Future + Sized {
    /// Bind `context` while this future is polled.
    fn in_request(self, context: Arc<RequestContext>) -> InRequest<Self> {
        scope(context, self)
    }

    /// Bind the caller's current context while this future is polled.
    fn in_current_request(self) -> InRequest<Self> {
        in_current_request(self)
    }
}

impl<F: Future> RequestFutureExt for F {}
