//! `ua-async` core: completion-token dispatch over a single-callback,
//! pump-driven protocol engine.
//!
//! A request is submitted together with a transform (native response to typed
//! result) and a completion token choosing how the caller receives the
//! outcome: a future, a deferred launch, a detached submission, a plain
//! callback, or a blocking call. Callbacks only ever run inside
//! [`Connection::run_iterate`]; faults raised by user handlers are parked in
//! the connection's [`FaultCatcher`] and raised from that call.

pub mod adapter;
pub mod catcher;
pub mod config;
pub mod connection;
pub mod engine;
pub mod error;
pub mod request;
pub mod status;
pub mod sync;
pub mod token;

#[cfg(test)]
pub(crate) mod testing;

pub use adapter::{create_callback_and_context, on_status, service_callback, CompletionHandler, Discard, OnStatus};
pub use catcher::{CapturePolicy, CapturedFault, FaultCatcher, HandlerOutcome};
pub use config::ConnectionConfig;
pub use connection::{Connection, WeakConnection};
pub use engine::{
    CallbackContext, Delivery, Engine, PendingRequest, RawCallback, Rejected, RequestId,
};
pub use error::{status_of, BadStatus, DispatchError};
pub use request::{send_request, take_response, BoxedTransform, Operation};
pub use status::{Severity, StatusCode};
pub use sync::UseSync;
pub use token::{
    CompletionToken, DefaultCompletionToken, Deferred, ResponseFuture, UseDeferred, UseDetached,
    UseFuture,
};
