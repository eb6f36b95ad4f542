//! Blocking call style: submit, then pump the engine until this request is done.
//!
//! The synchronous path has no user handler. Its context writes the transform's
//! outcome straight into a slot shared with the driver, keeping the original
//! fault instead of a coarsened status. The driver then returns the value,
//! returns the original error, or resumes the original panic.

use std::cell::RefCell;
use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::adapter::{catch_transform, service_callback};
use crate::catcher::CapturedFault;
use crate::connection::Connection;
use crate::engine::{CallbackContext, Completion, Engine, PendingRequest};
use crate::error::{BadStatus, DispatchError};
use crate::request::{BoxedTransform, Operation};
use crate::status::StatusCode;
use crate::token::CompletionToken;

/// Block the caller until the request completes.
///
/// Without an explicit timeout the connection's `sync_timeout` applies.
#[derive(Debug, Clone, Copy, Default)]
pub struct UseSync {
    timeout: Option<Duration>,
}

impl UseSync {
    /// Overrides the connection's `sync_timeout` for this call.
    #[must_use]
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
        }
    }

    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }
}

type SyncSlot<T> = Rc<RefCell<Option<Result<T, CapturedFault>>>>;

struct SyncContext<R, T> {
    slot: SyncSlot<T>,
    transform: BoxedTransform<R, T>,
}

impl<R, T> Completion<R> for SyncContext<R, T> {
    fn complete(self: Box<Self>, response: Option<&mut R>) {
        let Self { slot, transform } = *self;
        let outcome = match response {
            None => Err(CapturedFault::Error(
                BadStatus::new(StatusCode::BAD_UNEXPECTED_ERROR).into(),
            )),
            Some(response) => catch_transform(transform, response),
        };
        *slot.borrow_mut() = Some(outcome);
    }

    fn abort(self: Box<Self>, status: StatusCode) {
        *self.slot.borrow_mut() = Some(Err(CapturedFault::Error(BadStatus::new(status).into())));
    }
}

impl<E, T> CompletionToken<E, T> for UseSync
where
    E: Engine,
    T: Default + 'static,
{
    type Output = anyhow::Result<T>;

    fn initiate(self, operation: Operation<E, T>) -> anyhow::Result<T> {
        let (connection, request, transform) = operation.into_parts();
        let slot = SyncSlot::<T>::default();
        let context = SyncContext {
            slot: Rc::clone(&slot),
            transform,
        };
        let pending = PendingRequest::new(
            service_callback::<E::Response>,
            CallbackContext::new(Box::new(context)),
        );
        let request_id = connection.submit(request, pending);

        let timeout = self.timeout.or(connection.config().sync_timeout);
        let finished = pump_until(&connection, timeout, || slot.borrow_mut().take())?;
        match finished {
            Some(Ok(value)) => Ok(value),
            Some(Err(fault)) => Err(fault.into_error()),
            None => {
                let timeout_ms = millis(timeout.unwrap_or_default());
                if let Some(request_id) = request_id {
                    connection.cancel(request_id, StatusCode::BAD_TIMEOUT);
                }
                tracing::warn!(?request_id, timeout_ms, "synchronous request timed out");
                Err(DispatchError::Timeout { timeout_ms }.into())
            }
        }
    }
}

/// Pumps `connection` until `ready` yields a value or `timeout` elapses.
///
/// Returns `Ok(None)` on timeout. Faults raised by other requests' handlers
/// stay in the catcher for the next [`Connection::run_iterate`].
///
/// # Errors
///
/// Returns the engine's error if the session fails before `ready` yields.
pub(crate) fn pump_until<E, O, F>(
    connection: &Connection<E>,
    timeout: Option<Duration>,
    mut ready: F,
) -> Result<Option<O>, BadStatus>
where
    E: Engine,
    F: FnMut() -> Option<O>,
{
    let deadline = timeout.map(|timeout| Instant::now() + timeout);
    let step = connection.config().iterate_timeout;
    loop {
        if let Some(out) = ready() {
            return Ok(Some(out));
        }
        let wait = match deadline {
            None => step,
            Some(deadline) => {
                let now = Instant::now();
                if now >= deadline {
                    return Ok(None);
                }
                step.min(deadline - now)
            }
        };
        if let Err(status) = connection.pump(wait) {
            // The teardown may have completed the awaited request.
            return ready().map(Some).ok_or(status);
        }
    }
}

pub(crate) fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;
    use std::panic::{self, AssertUnwindSafe};

    use super::*;
    use crate::catcher::panic_message;
    use crate::request::send_request;
    use crate::testing::{connect, Script, TestResponse};

    #[derive(Debug, thiserror::Error)]
    #[error("Transform")]
    struct TransformError;

    fn value(response: &mut TestResponse) -> anyhow::Result<i32> {
        Ok(response.value)
    }

    #[test]
    fn returns_transformed_value() {
        let (conn, log) = connect();
        let result = send_request(&conn, Script::Echo(5), value, UseSync::default()).unwrap();
        assert_eq!(result, 5);
        assert_eq!(log.borrow().delivered.len(), 1);
    }

    #[test]
    fn transform_error_is_returned_verbatim() {
        let (conn, _log) = connect();
        let err = send_request(
            &conn,
            Script::Echo(5),
            |_: &mut TestResponse| -> anyhow::Result<i32> { Err(TransformError.into()) },
            UseSync::default(),
        )
        .unwrap_err();
        assert!(err.downcast_ref::<TransformError>().is_some());
        assert_eq!(err.to_string(), "Transform");
    }

    #[test]
    fn transform_panic_is_resumed() {
        let (conn, _log) = connect();
        let payload = panic::catch_unwind(AssertUnwindSafe(|| {
            send_request(
                &conn,
                Script::Echo(5),
                |_: &mut TestResponse| -> anyhow::Result<i32> { panic!("Transform") },
                UseSync::default(),
            )
        }))
        .unwrap_err();
        assert_eq!(panic_message(payload.as_ref()), "Transform");
    }

    #[test]
    fn missing_response_is_unexpected_error() {
        let (conn, _log) = connect();
        let err = send_request(&conn, Script::Missing, value, UseSync::default()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<BadStatus>(),
            Some(&BadStatus::Status(StatusCode::BAD_UNEXPECTED_ERROR))
        );
    }

    #[test]
    fn embedded_status_does_not_fail_the_call() {
        let (conn, _log) = connect();
        let result = send_request(
            &conn,
            Script::Embedded(2, StatusCode::BAD_NOTHING_TO_DO),
            value,
            UseSync::default(),
        )
        .unwrap();
        assert_eq!(result, 2);
    }

    #[test]
    fn future_and_sync_agree_on_embedded_status() {
        let (conn, _log) = connect();
        let script = Script::Embedded(3, StatusCode::BAD_NOTHING_TO_DO);
        let future = send_request(&conn, script, value, crate::UseFuture);
        assert_eq!(future.wait(&conn).unwrap(), 3);
        assert_eq!(send_request(&conn, script, value, UseSync::default()).unwrap(), 3);

        let checked = |response: &mut TestResponse| -> anyhow::Result<i32> {
            response.status.check()?;
            Ok(response.value)
        };
        let future = send_request(&conn, script, checked, crate::UseFuture);
        let from_future = future.wait(&conn).unwrap_err();
        let from_sync = send_request(&conn, script, checked, UseSync::default()).unwrap_err();
        assert_eq!(
            from_future.downcast_ref::<BadStatus>(),
            Some(&BadStatus::Status(StatusCode::BAD_NOTHING_TO_DO))
        );
        assert_eq!(
            from_sync.downcast_ref::<BadStatus>(),
            Some(&BadStatus::Status(StatusCode::BAD_NOTHING_TO_DO))
        );
    }

    #[test]
    fn rejected_submission_fails_immediately() {
        let (conn, log) = connect();
        conn.with_engine(|engine| engine.reject_with = Some(StatusCode::BAD_ENCODING_ERROR));
        let err = send_request(&conn, Script::Echo(1), value, UseSync::default()).unwrap_err();
        assert_eq!(
            err.downcast_ref::<BadStatus>(),
            Some(&BadStatus::Status(StatusCode::BAD_ENCODING_ERROR))
        );
        assert!(log.borrow().submitted.is_empty());
    }

    #[test]
    fn timeout_cancels_own_request() {
        let (conn, log) = connect();
        conn.with_engine(|engine| engine.stalled = true);
        let err = send_request(
            &conn,
            Script::Echo(1),
            value,
            UseSync::with_timeout(Duration::from_millis(10)),
        )
        .unwrap_err();

        assert_eq!(
            err.downcast_ref::<DispatchError>(),
            Some(&DispatchError::Timeout { timeout_ms: 10 })
        );
        assert_eq!(conn.outstanding(), 0);
        assert_eq!(log.borrow().withdrawn, log.borrow().submitted);
    }

    #[test]
    fn waits_for_its_own_request_among_others() {
        let (conn, _log) = connect();
        conn.with_engine(|engine| engine.reverse = true);
        let seen = Rc::new(Cell::new(0));
        let sink = Rc::clone(&seen);
        send_request(&conn, Script::Echo(1), value, move |_s: StatusCode, v: i32| {
            sink.set(v);
        });

        let result = send_request(&conn, Script::Echo(2), value, UseSync::default()).unwrap();
        assert_eq!(result, 2);
        assert_eq!(seen.get(), 1);
    }

    #[test]
    fn foreign_handler_fault_stays_parked_during_sync_call() {
        let (conn, _log) = connect();
        send_request(
            &conn,
            Script::Echo(1),
            value,
            |_s: StatusCode, _v: i32| -> anyhow::Result<()> { Err(anyhow::anyhow!("Error")) },
        );
        let result = send_request(&conn, Script::Echo(2), value, UseSync::default()).unwrap();
        assert_eq!(result, 2);
        assert_eq!(conn.outstanding(), 0);
        assert!(conn.catcher().has_fault());

        assert_eq!(conn.run_iterate().unwrap_err().to_string(), "Error");
        assert!(conn.run_iterate().is_ok());
    }

    #[test]
    fn foreign_handler_fault_stays_parked_while_waiting_on_future() {
        let (conn, _log) = connect();
        conn.with_engine(|engine| engine.reverse = true);
        send_request(
            &conn,
            Script::Echo(1),
            value,
            |_s: StatusCode, _v: i32| -> anyhow::Result<()> { anyhow::bail!("Error") },
        );
        let future = send_request(&conn, Script::Echo(2), value, crate::UseFuture);
        assert_eq!(future.wait(&conn).unwrap(), 2);
        assert_eq!(conn.run_iterate().unwrap_err().to_string(), "Error");
    }

    #[test]
    fn engine_failure_reports_disconnect_to_sync_call() {
        let (conn, _log) = connect();
        conn.with_engine(|engine| {
            engine.stalled = true;
            engine.fail_next_poll = true;
        });
        let err = send_request(&conn, Script::Echo(1), value, UseSync::default()).unwrap_err();
        assert_eq!(err.downcast_ref::<BadStatus>(), Some(&BadStatus::Disconnect));
        assert_eq!(conn.outstanding(), 0);
    }

    #[test]
    fn disconnected_engine_reports_disconnect() {
        let (conn, _log) = connect();
        conn.disconnect().unwrap();
        let err = send_request(&conn, Script::Echo(1), value, UseSync::default()).unwrap_err();
        assert_eq!(err.downcast_ref::<BadStatus>(), Some(&BadStatus::Disconnect));
    }

    #[test]
    fn millis_saturates() {
        assert_eq!(millis(Duration::from_millis(1500)), 1500);
        assert_eq!(millis(Duration::MAX), u64::MAX);
    }
}
