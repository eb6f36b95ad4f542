//! Completion tokens: how the caller wants the outcome of a request delivered.
//!
//! Every operation takes a token as its last argument and returns
//! `K::Output`. The same [`Operation`] is wired up differently per token:
//!
//! | token | output | behavior |
//! |---|---|---|
//! | [`UseFuture`] | [`ResponseFuture<T>`] | submits now, resolves on completion |
//! | [`UseDeferred`] | [`Deferred<E, T>`] | submits when launched with another token |
//! | [`UseDetached`] | `()` | submits now, ignores the outcome |
//! | closure / [`OnStatus`] | `()` | submits now, the callable is the handler |
//! | [`UseSync`](crate::UseSync) | `anyhow::Result<T>` | submits and pumps until done |

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::sync::oneshot;

use crate::adapter::{Discard, OnStatus};
use crate::catcher::HandlerOutcome;
use crate::connection::Connection;
use crate::engine::Engine;
use crate::error::{BadStatus, DispatchError};
use crate::request::Operation;
use crate::status::StatusCode;
use crate::sync::pump_until;

/// Selects how an operation's outcome reaches the caller.
pub trait CompletionToken<E: Engine, T> {
    type Output;

    /// Wires `operation` up for this token and returns what the caller gets back.
    fn initiate(self, operation: Operation<E, T>) -> Self::Output;
}

/// Token to pass to an `_async` operation when the caller has no preference:
/// `DefaultCompletionToken::default()`.
pub type DefaultCompletionToken = UseFuture;

// ---------------------------------------------------------------------------
// Future
// ---------------------------------------------------------------------------

/// Deliver the outcome through a [`ResponseFuture`].
#[derive(Debug, Clone, Copy, Default)]
pub struct UseFuture;

/// Resolves once the request completes.
///
/// A bad status resolves to `Err(BadStatus)`. If the request is torn down
/// without a handler run, the future resolves to [`BadStatus::Disconnect`].
///
/// Nothing resolves the future unless the connection is pumped, either by the
/// caller or through [`ResponseFuture::wait`].
#[derive(Debug)]
#[must_use = "the outcome is lost if the future is dropped"]
pub struct ResponseFuture<T> {
    rx: oneshot::Receiver<Result<T, BadStatus>>,
}

impl<T> ResponseFuture<T> {
    /// Takes the outcome if the request has completed.
    ///
    /// Returns `None` while the request is outstanding. The outcome can be
    /// taken only once; later calls report a disconnect.
    pub fn try_get(&mut self) -> Option<Result<T, BadStatus>> {
        match self.rx.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(BadStatus::Disconnect)),
        }
    }

    /// Pumps `connection` until the request completes.
    ///
    /// Faults raised by other handlers meanwhile are left in the catcher for
    /// the next [`Connection::run_iterate`].
    ///
    /// # Errors
    ///
    /// Returns the request's bad status, the engine's error if the session
    /// fails, or [`DispatchError::Timeout`] once the connection's
    /// `sync_timeout` elapses.
    pub fn wait<E: Engine>(mut self, connection: &Connection<E>) -> anyhow::Result<T> {
        let timeout = connection.config().sync_timeout;
        match pump_until(connection, timeout, || self.try_get())? {
            Some(outcome) => Ok(outcome?),
            None => Err(DispatchError::Timeout {
                timeout_ms: crate::sync::millis(timeout.unwrap_or_default()),
            }
            .into()),
        }
    }
}

impl<T> Future for ResponseFuture<T> {
    type Output = Result<T, BadStatus>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            Poll::Ready(Err(_)) => Poll::Ready(Err(BadStatus::Disconnect)),
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<E, T> CompletionToken<E, T> for UseFuture
where
    E: Engine,
    T: Default + 'static,
{
    type Output = ResponseFuture<T>;

    fn initiate(self, operation: Operation<E, T>) -> ResponseFuture<T> {
        let (tx, rx) = oneshot::channel();
        operation.submit(move |status: StatusCode, result: T| {
            let outcome = if status.is_bad() {
                Err(BadStatus::new(status))
            } else {
                Ok(result)
            };
            // The receiver may be gone already; nobody is waiting then.
            let _ = tx.send(outcome);
        });
        ResponseFuture { rx }
    }
}

// ---------------------------------------------------------------------------
// Deferred
// ---------------------------------------------------------------------------

/// Postpone submission until the caller picks the real token.
#[derive(Debug, Clone, Copy, Default)]
pub struct UseDeferred;

/// An operation that has not been submitted yet.
///
/// Dropping it submits nothing.
#[must_use = "a deferred operation does nothing until launched"]
pub struct Deferred<E: Engine, T> {
    operation: Operation<E, T>,
}

impl<E, T> Deferred<E, T>
where
    E: Engine,
    T: Default + 'static,
{
    /// Submits the operation now, delivering the outcome through `token`.
    pub fn launch<K>(self, token: K) -> K::Output
    where
        K: CompletionToken<E, T>,
    {
        token.initiate(self.operation)
    }
}

impl<E, T> CompletionToken<E, T> for UseDeferred
where
    E: Engine,
    T: Default + 'static,
{
    type Output = Deferred<E, T>;

    fn initiate(self, operation: Operation<E, T>) -> Deferred<E, T> {
        Deferred { operation }
    }
}

// ---------------------------------------------------------------------------
// Detached and user callbacks
// ---------------------------------------------------------------------------

/// Submit and forget about the outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct UseDetached;

impl<E, T> CompletionToken<E, T> for UseDetached
where
    E: Engine,
    T: Default + 'static,
{
    type Output = ();

    fn initiate(self, operation: Operation<E, T>) {
        operation.submit(Discard);
    }
}

impl<E, T, F, O> CompletionToken<E, T> for F
where
    E: Engine,
    T: Default + 'static,
    F: FnOnce(StatusCode, T) -> O + 'static,
    O: HandlerOutcome,
{
    type Output = ();

    fn initiate(self, operation: Operation<E, T>) {
        operation.submit(self);
    }
}

impl<E, F, O> CompletionToken<E, ()> for OnStatus<F>
where
    E: Engine,
    F: FnOnce(StatusCode) -> O + 'static,
    O: HandlerOutcome,
{
    type Output = ();

    fn initiate(self, operation: Operation<E, ()>) {
        operation.submit(self);
    }
}
