//! Binds the engine's single raw callback slot to a (transform, handler) pair.
//!
//! [`create_callback_and_context`] erases a typed transform and completion
//! handler into a [`PendingRequest`]. When the engine hands it back, the
//! stateless [`service_callback`] reclaims the context and runs:
//!
//! 1. no response: handler gets `BadUnexpectedError` and a default result;
//! 2. transform ok: handler gets `Good` and the value; checking the response's
//!    own service result is the transform's job;
//! 3. transform error: handler gets the error's explicit status (or
//!    `BadInternalError`) and a default result.
//!
//! The handler runs under the connection's [`FaultCatcher`]; nothing it does
//! can unwind into the engine.

use std::marker::PhantomData;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use crate::catcher::{CapturedFault, FaultCatcher, HandlerOutcome};
use crate::engine::{CallbackContext, Completion, PendingRequest, RequestId};
use crate::error::status_of;
use crate::status::StatusCode;

// ---------------------------------------------------------------------------
// Completion handlers
// ---------------------------------------------------------------------------

/// Receives the outcome of one request: a status and a (possibly default) result.
pub trait CompletionHandler<T>: 'static {
    type Outcome: HandlerOutcome;

    fn call(self, status: StatusCode, result: T) -> Self::Outcome;
}

impl<T, F, O> CompletionHandler<T> for F
where
    F: FnOnce(StatusCode, T) -> O + 'static,
    O: HandlerOutcome,
{
    type Outcome = O;

    fn call(self, status: StatusCode, result: T) -> O {
        self(status, result)
    }
}

/// Handler form for operations without a result value.
#[derive(Debug, Clone, Copy)]
pub struct OnStatus<F>(F);

/// Wraps a `FnOnce(StatusCode)` so it can complete a `()`-returning operation.
pub fn on_status<F, O>(f: F) -> OnStatus<F>
where
    F: FnOnce(StatusCode) -> O + 'static,
    O: HandlerOutcome,
{
    OnStatus(f)
}

impl<F, O> CompletionHandler<()> for OnStatus<F>
where
    F: FnOnce(StatusCode) -> O + 'static,
    O: HandlerOutcome,
{
    type Outcome = O;

    fn call(self, status: StatusCode, (): ()) -> O {
        (self.0)(status)
    }
}

/// Handler that ignores every outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct Discard;

impl<T: 'static> CompletionHandler<T> for Discard {
    type Outcome = ();

    fn call(self, status: StatusCode, _result: T) {
        tracing::trace!(%status, "detached request completed");
    }
}

// ---------------------------------------------------------------------------
// Callback and context
// ---------------------------------------------------------------------------

struct ServiceContext<T, F, H> {
    catcher: Arc<FaultCatcher>,
    transform: F,
    handler: H,
    _result: PhantomData<fn() -> T>,
}

impl<R, T, F, H> Completion<R> for ServiceContext<T, F, H>
where
    T: Default,
    F: FnOnce(&mut R) -> anyhow::Result<T>,
    H: CompletionHandler<T>,
{
    fn complete(self: Box<Self>, response: Option<&mut R>) {
        let Self {
            catcher,
            transform,
            handler,
            ..
        } = *self;

        let (status, result) = match response {
            None => (StatusCode::BAD_UNEXPECTED_ERROR, T::default()),
            Some(response) => match catch_transform(transform, response) {
                Ok(value) => (StatusCode::GOOD, value),
                Err(fault) => {
                    let status = coarsen(&fault);
                    tracing::debug!(%status, fault = %fault.message(), "transform failed");
                    (status, T::default())
                }
            },
        };
        deliver(&catcher, handler, status, result);
    }

    fn abort(self: Box<Self>, status: StatusCode) {
        let Self {
            catcher, handler, ..
        } = *self;
        deliver(&catcher, handler, status, T::default());
    }
}

/// Builds the raw callback and context for one request.
///
/// The returned [`PendingRequest`] is meant to be handed to
/// [`Engine::submit`](crate::Engine::submit) unchanged.
pub fn create_callback_and_context<R, T, F, H>(
    catcher: Arc<FaultCatcher>,
    transform: F,
    handler: H,
) -> PendingRequest<R>
where
    R: 'static,
    T: Default + 'static,
    F: FnOnce(&mut R) -> anyhow::Result<T> + 'static,
    H: CompletionHandler<T>,
{
    let context = ServiceContext {
        catcher,
        transform,
        handler,
        _result: PhantomData,
    };
    PendingRequest::new(
        service_callback::<R>,
        CallbackContext::new(Box::new(context)),
    )
}

/// The raw callback installed for every request. Stateless; never unwinds.
pub fn service_callback<R>(
    context: CallbackContext<R>,
    request_id: RequestId,
    response: Option<&mut R>,
) {
    tracing::trace!(%request_id, has_response = response.is_some(), "service callback");
    context.complete(response);
}

/// Runs a transform, containing both returned errors and panics.
pub(crate) fn catch_transform<R, T, F>(transform: F, response: &mut R) -> Result<T, CapturedFault>
where
    F: FnOnce(&mut R) -> anyhow::Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(|| transform(response))) {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(err)) => Err(CapturedFault::Error(err)),
        Err(payload) => Err(CapturedFault::Panic(payload)),
    }
}

fn coarsen(fault: &CapturedFault) -> StatusCode {
    match fault {
        CapturedFault::Error(err) => status_of(err),
        CapturedFault::Panic(_) => StatusCode::BAD_INTERNAL_ERROR,
    }
}

fn deliver<T, H>(catcher: &FaultCatcher, handler: H, status: StatusCode, result: T)
where
    H: CompletionHandler<T>,
{
    if !catcher.invoke(|| handler.call(status, result)) {
        tracing::debug!(%status, "completion handler failed, fault deferred to the pump");
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::*;
    use crate::catcher::panic_message;
    use crate::error::BadStatus;
    use crate::testing::TestResponse;

    #[derive(Debug, thiserror::Error)]
    #[error("CompletionHandler")]
    struct HandlerError;

    #[derive(Default)]
    struct Observed {
        status: Cell<Option<StatusCode>>,
        result: Cell<Option<i32>>,
    }

    struct Harness {
        catcher: Arc<FaultCatcher>,
        observed: Rc<Observed>,
        fail_transform: bool,
        fail_handler: bool,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                catcher: Arc::new(FaultCatcher::default()),
                observed: Rc::default(),
                fail_transform: false,
                fail_handler: false,
            }
        }

        fn pending(&self) -> PendingRequest<TestResponse> {
            let fail_transform = self.fail_transform;
            let fail_handler = self.fail_handler;
            let observed = Rc::clone(&self.observed);
            create_callback_and_context(
                Arc::clone(&self.catcher),
                move |response: &mut TestResponse| {
                    if fail_transform {
                        anyhow::bail!("Transform");
                    }
                    Ok(response.value)
                },
                move |status: StatusCode, value: i32| {
                    observed.status.set(Some(status));
                    observed.result.set(Some(value));
                    if fail_handler {
                        return Err(HandlerError);
                    }
                    Ok(())
                },
            )
        }

        fn status(&self) -> Option<StatusCode> {
            self.observed.status.get()
        }

        fn result(&self) -> Option<i32> {
            self.observed.result.get()
        }
    }

    fn response(value: i32) -> TestResponse {
        TestResponse {
            value,
            status: StatusCode::GOOD,
        }
    }

    #[test]
    fn success_forwards_good_status_and_value() {
        let harness = Harness::new();
        let mut response = response(5);
        harness.pending().invoke(RequestId(0), Some(&mut response));

        assert_eq!(harness.status(), Some(StatusCode::GOOD));
        assert_eq!(harness.result(), Some(5));
        assert!(!harness.catcher.has_fault());
    }

    #[test]
    fn missing_response_reports_unexpected_error() {
        let harness = Harness::new();
        harness.pending().invoke(RequestId(0), None);

        assert_eq!(harness.status(), Some(StatusCode::BAD_UNEXPECTED_ERROR));
        assert_eq!(harness.result(), Some(0));
        assert!(!harness.catcher.has_fault());
    }

    #[test]
    fn transform_error_is_coarsened() {
        let mut harness = Harness::new();
        harness.fail_transform = true;
        let mut response = response(5);
        harness.pending().invoke(RequestId(0), Some(&mut response));

        assert_eq!(harness.status(), Some(StatusCode::BAD_INTERNAL_ERROR));
        assert_eq!(harness.result(), Some(0));
        assert!(!harness.catcher.has_fault());
    }

    #[test]
    fn handler_error_is_captured_after_delivery() {
        let mut harness = Harness::new();
        harness.fail_handler = true;
        let mut response = response(5);
        harness.pending().invoke(RequestId(0), Some(&mut response));

        assert_eq!(harness.status(), Some(StatusCode::GOOD));
        assert_eq!(harness.result(), Some(5));
        assert!(harness.catcher.has_fault());

        let err = harness.catcher.rethrow().unwrap_err();
        assert!(err.downcast_ref::<HandlerError>().is_some());
        assert_eq!(err.to_string(), "CompletionHandler");
    }

    #[test]
    fn handler_panic_is_captured() {
        let catcher = Arc::new(FaultCatcher::default());
        let pending = create_callback_and_context(
            Arc::clone(&catcher),
            |response: &mut TestResponse| Ok(response.value),
            |_status: StatusCode, _value: i32| -> () { panic!("CompletionHandler") },
        );
        let mut response = response(5);
        pending.invoke(RequestId(0), Some(&mut response));

        let fault = catcher.take().unwrap();
        assert!(matches!(fault, CapturedFault::Panic(_)));
        assert_eq!(fault.message(), "CompletionHandler");
    }

    #[test]
    fn transform_panic_becomes_internal_error() {
        let catcher = Arc::new(FaultCatcher::default());
        let seen = Rc::new(Cell::new(None));
        let sink = Rc::clone(&seen);
        let pending = create_callback_and_context(
            Arc::clone(&catcher),
            |_: &mut TestResponse| -> anyhow::Result<i32> { panic!("Transform") },
            move |status: StatusCode, value: i32| sink.set(Some((status, value))),
        );
        let mut response = response(5);
        pending.invoke(RequestId(0), Some(&mut response));

        assert_eq!(seen.get(), Some((StatusCode::BAD_INTERNAL_ERROR, 0)));
        assert!(!catcher.has_fault());
    }

    #[test]
    fn transform_error_with_status_keeps_it() {
        let catcher = Arc::new(FaultCatcher::default());
        let seen = Rc::new(Cell::new(None));
        let sink = Rc::clone(&seen);
        let pending = create_callback_and_context(
            catcher,
            |_: &mut TestResponse| -> anyhow::Result<i32> {
                Err(BadStatus::new(StatusCode::BAD_NODE_ID_UNKNOWN).into())
            },
            move |status: StatusCode, _value: i32| sink.set(Some(status)),
        );
        let mut response = response(5);
        pending.invoke(RequestId(0), Some(&mut response));

        assert_eq!(seen.get(), Some(StatusCode::BAD_NODE_ID_UNKNOWN));
    }

    #[test]
    fn embedded_bad_status_is_left_to_the_transform() {
        let harness = Harness::new();
        let mut response = TestResponse {
            value: 9,
            status: StatusCode::BAD_NOTHING_TO_DO,
        };
        harness.pending().invoke(RequestId(0), Some(&mut response));

        assert_eq!(harness.status(), Some(StatusCode::GOOD));
        assert_eq!(harness.result(), Some(9));
    }

    #[test]
    fn cancel_skips_transform() {
        let transformed = Rc::new(Cell::new(false));
        let flag = Rc::clone(&transformed);
        let seen = Rc::new(Cell::new(None));
        let sink = Rc::clone(&seen);
        let pending = create_callback_and_context(
            Arc::new(FaultCatcher::default()),
            move |response: &mut TestResponse| {
                flag.set(true);
                Ok(response.value)
            },
            move |status: StatusCode, value: i32| sink.set(Some((status, value))),
        );
        pending.cancel(StatusCode::BAD_TIMEOUT);

        assert!(!transformed.get());
        assert_eq!(seen.get(), Some((StatusCode::BAD_TIMEOUT, 0)));
    }

    #[test]
    fn dropped_pending_request_reports_disconnect() {
        let harness = Harness::new();
        drop(harness.pending());
        assert_eq!(harness.status(), Some(StatusCode::BAD_DISCONNECT));
        assert_eq!(harness.result(), Some(0));
    }

    #[test]
    fn transform_may_move_data_out_of_response() {
        let catcher = Arc::new(FaultCatcher::default());
        let seen = Rc::new(RefCell::new(None));
        let sink = Rc::clone(&seen);
        let pending = create_callback_and_context(
            catcher,
            |response: &mut TestResponse| Ok(std::mem::take(response)),
            move |_status: StatusCode, taken: TestResponse| *sink.borrow_mut() = Some(taken),
        );
        let mut native = response(7);
        pending.invoke(RequestId(0), Some(&mut native));

        assert_eq!(seen.borrow().as_ref().map(|r| r.value), Some(7));
        assert_eq!(native, TestResponse::default());
    }

    #[test]
    fn on_status_handler_receives_status_only() {
        let seen = Rc::new(Cell::new(None));
        let sink = Rc::clone(&seen);
        let pending = create_callback_and_context(
            Arc::new(FaultCatcher::default()),
            |_: &mut TestResponse| Ok(()),
            on_status(move |status| sink.set(Some(status))),
        );
        pending.invoke(RequestId(0), None);
        assert_eq!(seen.get(), Some(StatusCode::BAD_UNEXPECTED_ERROR));
    }

    #[test]
    fn discard_handler_never_faults() {
        let catcher = Arc::new(FaultCatcher::default());
        let pending = create_callback_and_context(
            Arc::clone(&catcher),
            |response: &mut TestResponse| Ok(response.value),
            Discard,
        );
        let mut response = response(1);
        pending.invoke(RequestId(0), Some(&mut response));
        assert!(!catcher.has_fault());
    }

    #[test]
    fn catch_transform_keeps_panic_payload() {
        let mut response = response(1);
        let fault = catch_transform(
            |_: &mut TestResponse| -> anyhow::Result<i32> { panic!("Transform") },
            &mut response,
        )
        .unwrap_err();
        match fault {
            CapturedFault::Panic(payload) => assert_eq!(panic_message(payload.as_ref()), "Transform"),
            CapturedFault::Error(err) => panic!("expected panic, got {err}"),
        }
    }
}
