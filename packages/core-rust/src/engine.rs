//! Contract between the dispatch core and the protocol engine underneath it.
//!
//! The engine owns every in-flight request between submission and completion.
//! For each one it holds a [`PendingRequest`]: a stateless raw callback plus
//! an opaque, move-only [`CallbackContext`]. Handing the context back (through
//! [`PendingRequest::invoke`] or [`PendingRequest::cancel`]) consumes it, so a
//! request can complete at most once by construction.

use std::fmt;
use std::time::Duration;

use crate::error::BadStatus;
use crate::status::StatusCode;

/// Identifier the engine assigns to a submitted request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub u32);

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Entry point the engine calls when a request completes.
///
/// `None` signals that no response is available; it is a terminal failure for
/// the request, not a retry.
pub type RawCallback<R> = fn(CallbackContext<R>, RequestId, Option<&mut R>);

// ---------------------------------------------------------------------------
// CallbackContext
// ---------------------------------------------------------------------------

/// Per-request correlation state, erased to the engine's response type.
pub(crate) trait Completion<R> {
    /// The raw callback fired.
    fn complete(self: Box<Self>, response: Option<&mut R>);

    /// The request ended without a response (teardown, timeout, rejection).
    fn abort(self: Box<Self>, status: StatusCode);
}

/// Opaque per-request state handed to the engine at submission.
///
/// The engine stores it untouched and gives it back exactly once. If the
/// engine drops it instead, the request completes with `BadDisconnect` so no
/// waiting future is left unfulfilled.
pub struct CallbackContext<R> {
    completion: Option<Box<dyn Completion<R>>>,
}

impl<R> CallbackContext<R> {
    pub(crate) fn new(completion: Box<dyn Completion<R>>) -> Self {
        Self {
            completion: Some(completion),
        }
    }

    pub(crate) fn complete(mut self, response: Option<&mut R>) {
        if let Some(completion) = self.completion.take() {
            completion.complete(response);
        }
    }

    pub(crate) fn abort(mut self, status: StatusCode) {
        if let Some(completion) = self.completion.take() {
            completion.abort(status);
        }
    }
}

impl<R> Drop for CallbackContext<R> {
    fn drop(&mut self) {
        let Some(completion) = self.completion.take() else {
            return;
        };
        if std::thread::panicking() {
            // Running user handlers now could panic again and abort the process.
            tracing::warn!("callback context dropped during unwinding, handler skipped");
            return;
        }
        tracing::warn!("callback context dropped without completion, reporting disconnect");
        completion.abort(StatusCode::BAD_DISCONNECT);
    }
}

impl<R> fmt::Debug for CallbackContext<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CallbackContext")
            .field("live", &self.completion.is_some())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// PendingRequest / Delivery / Rejected
// ---------------------------------------------------------------------------

/// Callback and context for one outstanding request.
///
/// Both delivery paths take `self` by value, so the same request cannot be
/// completed twice:
///
/// ```compile_fail
/// use ua_async_core::engine::{PendingRequest, RequestId};
///
/// fn deliver_twice<R: 'static>(pending: PendingRequest<R>, mut response: R) {
///     pending.invoke(RequestId(1), Some(&mut response));
///     pending.invoke(RequestId(1), Some(&mut response));
/// }
/// ```
pub struct PendingRequest<R> {
    callback: RawCallback<R>,
    context: CallbackContext<R>,
}

impl<R> PendingRequest<R> {
    pub(crate) fn new(callback: RawCallback<R>, context: CallbackContext<R>) -> Self {
        Self { callback, context }
    }

    /// Fires the raw callback, consuming the context.
    pub fn invoke(self, request_id: RequestId, response: Option<&mut R>) {
        (self.callback)(self.context, request_id, response);
    }

    /// Completes the request with `status` and no response, bypassing the transform.
    pub fn cancel(self, status: StatusCode) {
        self.context.abort(status);
    }
}

impl<R> fmt::Debug for PendingRequest<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingRequest")
            .field("context", &self.context)
            .finish_non_exhaustive()
    }
}

/// A completion the engine has ready for dispatch.
pub struct Delivery<R> {
    pub request_id: RequestId,
    pub pending: PendingRequest<R>,
    /// The engine's response structure; `None` when it has none to offer.
    pub response: Option<R>,
}

impl<R> Delivery<R> {
    /// Invokes the raw callback, then drops the response.
    ///
    /// Transforms may move data out of the response; whatever is left is freed
    /// here, after the callback returned.
    pub fn dispatch(self) {
        let Self {
            request_id,
            pending,
            mut response,
        } = self;
        pending.invoke(request_id, response.as_mut());
    }
}

impl<R> fmt::Debug for Delivery<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("request_id", &self.request_id)
            .field("has_response", &self.response.is_some())
            .finish_non_exhaustive()
    }
}

/// A submission the engine refused. The context is handed back unconsumed.
pub struct Rejected<R> {
    pub status: BadStatus,
    pub pending: PendingRequest<R>,
}

impl<R> fmt::Debug for Rejected<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejected")
            .field("status", &self.status)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// The protocol engine driven by a [`Connection`](crate::Connection).
///
/// Implementations never invoke callbacks themselves: [`Engine::poll`] returns
/// the ready completions and the connection dispatches them after releasing
/// its borrow of the engine, so handlers are free to submit new requests.
pub trait Engine: 'static {
    /// Native request envelope.
    type Request;
    /// Native response envelope.
    type Response: 'static;

    /// Queues a request and returns immediately.
    ///
    /// # Errors
    ///
    /// Returns the pending request together with the reason when the engine
    /// cannot accept it (closed session, encoding failure, ...).
    fn submit(
        &mut self,
        request: Self::Request,
        pending: PendingRequest<Self::Response>,
    ) -> Result<RequestId, Rejected<Self::Response>>;

    /// Waits at most `timeout` and returns the completions that are ready.
    ///
    /// Completions may come back in any order.
    ///
    /// # Errors
    ///
    /// An error means the session is lost; the connection tears itself down.
    fn poll(&mut self, timeout: Duration) -> Result<Vec<Delivery<Self::Response>>, BadStatus>;

    /// Withdraws one outstanding request, if the engine still holds it.
    fn cancel(&mut self, request_id: RequestId) -> Option<PendingRequest<Self::Response>>;

    /// Closes the session and returns every request that was still outstanding.
    fn close(&mut self) -> Vec<PendingRequest<Self::Response>>;

    /// Number of requests submitted but not yet handed back.
    fn outstanding(&self) -> usize;

    fn is_connected(&self) -> bool;
}
