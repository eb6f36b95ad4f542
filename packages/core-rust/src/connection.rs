//! Connection handle: owns the engine, the fault catcher and the pump.
//!
//! All callbacks run on the thread that pumps ([`Connection::run_iterate`]).
//! The handle is `Rc`-based and deliberately `!Send`.

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};
use std::sync::Arc;
use std::time::Duration;

use crate::catcher::FaultCatcher;
use crate::config::ConnectionConfig;
use crate::engine::{Engine, PendingRequest, Rejected, RequestId};
use crate::error::BadStatus;
use crate::status::StatusCode;

struct Inner<E: Engine> {
    engine: RefCell<E>,
    catcher: Arc<FaultCatcher>,
    config: ConnectionConfig,
}

impl<E: Engine> Inner<E> {
    /// Closes the engine and aborts whatever it still held.
    fn abort_outstanding(&self, status: StatusCode) -> usize {
        let pending = self.engine.borrow_mut().close();
        let count = pending.len();
        for request in pending {
            request.cancel(status);
        }
        count
    }
}

impl<E: Engine> Drop for Inner<E> {
    fn drop(&mut self) {
        let pending = self.engine.get_mut().close();
        if pending.is_empty() {
            return;
        }
        let count = pending.len();
        if std::thread::panicking() {
            tracing::warn!(outstanding = count, "connection dropped during unwinding");
            return;
        }
        for request in pending {
            request.cancel(StatusCode::BAD_DISCONNECT);
        }
        tracing::info!(outstanding = count, "connection dropped, outstanding requests aborted");
        if let Some(fault) = self.catcher.take() {
            tracing::warn!(fault = %fault.message(), "connection dropped with an undelivered handler fault");
        }
    }
}

/// Shared handle to one engine session.
///
/// Cloning is cheap; the session is torn down when the last clone is dropped.
/// A clone captured by a handler of a still-pending request keeps the session
/// alive: such handlers should hold a [`WeakConnection`], otherwise the session
/// only ends through [`Connection::disconnect`].
pub struct Connection<E: Engine> {
    inner: Rc<Inner<E>>,
}

impl<E: Engine> Clone for Connection<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<E: Engine> fmt::Debug for Connection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("config", &self.inner.config)
            .field("catcher", &self.inner.catcher)
            .finish_non_exhaustive()
    }
}

/// Non-owning handle obtained from [`Connection::downgrade`].
pub struct WeakConnection<E: Engine> {
    inner: Weak<Inner<E>>,
}

impl<E: Engine> WeakConnection<E> {
    /// Returns the connection unless every strong handle is gone.
    #[must_use]
    pub fn upgrade(&self) -> Option<Connection<E>> {
        self.inner.upgrade().map(|inner| Connection { inner })
    }
}

impl<E: Engine> Clone for WeakConnection<E> {
    fn clone(&self) -> Self {
        Self {
            inner: Weak::clone(&self.inner),
        }
    }
}

impl<E: Engine> fmt::Debug for WeakConnection<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakConnection")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

impl<E: Engine> Connection<E> {
    #[must_use]
    pub fn new(engine: E, config: ConnectionConfig) -> Self {
        let catcher = Arc::new(FaultCatcher::new(config.capture_policy));
        Self {
            inner: Rc::new(Inner {
                engine: RefCell::new(engine),
                catcher,
                config,
            }),
        }
    }

    #[must_use]
    pub fn downgrade(&self) -> WeakConnection<E> {
        WeakConnection {
            inner: Rc::downgrade(&self.inner),
        }
    }

    #[must_use]
    pub fn catcher(&self) -> &Arc<FaultCatcher> {
        &self.inner.catcher
    }

    #[must_use]
    pub fn config(&self) -> &ConnectionConfig {
        &self.inner.config
    }

    /// Gives `f` direct access to the engine.
    ///
    /// # Panics
    ///
    /// Panics if the engine is already borrowed, i.e. when called from inside
    /// an [`Engine`] method.
    pub fn with_engine<O>(&self, f: impl FnOnce(&mut E) -> O) -> O {
        f(&mut self.inner.engine.borrow_mut())
    }

    #[must_use]
    pub fn outstanding(&self) -> usize {
        self.inner.engine.borrow().outstanding()
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.inner.engine.borrow().is_connected()
    }

    /// Hands a request and its pending callback to the engine.
    ///
    /// If the engine refuses it, the request completes right away with the
    /// rejection status and `None` is returned.
    pub fn submit(&self, request: E::Request, pending: PendingRequest<E::Response>) -> Option<RequestId> {
        let submitted = self.inner.engine.borrow_mut().submit(request, pending);
        match submitted {
            Ok(request_id) => {
                tracing::debug!(%request_id, "request submitted");
                Some(request_id)
            }
            Err(Rejected { status, pending }) => {
                tracing::warn!(%status, "engine rejected request");
                pending.cancel(status.code());
                None
            }
        }
    }

    /// Withdraws an outstanding request and completes it with `status`.
    ///
    /// Returns `false` if the engine no longer holds the request.
    pub fn cancel(&self, request_id: RequestId, status: StatusCode) -> bool {
        let withdrawn = self.inner.engine.borrow_mut().cancel(request_id);
        match withdrawn {
            Some(pending) => {
                tracing::debug!(%request_id, %status, "request cancelled");
                pending.cancel(status);
                true
            }
            None => false,
        }
    }

    /// Pumps the engine once, bounded by the configured `iterate_timeout`.
    ///
    /// # Errors
    ///
    /// See [`Connection::run_iterate_timeout`].
    pub fn run_iterate(&self) -> anyhow::Result<()> {
        self.run_iterate_timeout(self.inner.config.iterate_timeout)
    }

    /// Pumps the engine once: dispatches every ready completion, then raises
    /// the fault a handler left in the catcher, if any.
    ///
    /// # Errors
    ///
    /// Returns the first deferred handler fault (a deferred panic resumes
    /// unwinding instead), or the engine's error if the session failed. In the
    /// latter case every outstanding request has been aborted with that status.
    pub fn run_iterate_timeout(&self, timeout: Duration) -> anyhow::Result<()> {
        self.pump(timeout)?;
        self.inner.catcher.rethrow()
    }

    /// Polls the engine once and dispatches what it returned. Captured handler
    /// faults stay in the catcher.
    pub(crate) fn pump(&self, timeout: Duration) -> Result<(), BadStatus> {
        let polled = self.inner.engine.borrow_mut().poll(timeout);
        let deliveries = match polled {
            Ok(deliveries) => deliveries,
            Err(status) => {
                let aborted = self.inner.abort_outstanding(status.code());
                tracing::warn!(%status, aborted, "engine failed, connection torn down");
                return Err(status);
            }
        };

        if !deliveries.is_empty() {
            tracing::debug!(count = deliveries.len(), "dispatching completions");
        }
        for delivery in deliveries {
            delivery.dispatch();
        }
        Ok(())
    }

    /// Closes the session. Outstanding requests complete with `BadDisconnect`.
    ///
    /// # Errors
    ///
    /// Returns a handler fault captured during or before the teardown.
    pub fn disconnect(&self) -> anyhow::Result<()> {
        let aborted = self.inner.abort_outstanding(StatusCode::BAD_DISCONNECT);
        tracing::info!(aborted, "connection closed");
        self.inner.catcher.rethrow()
    }
}
