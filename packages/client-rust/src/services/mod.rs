//! Service operations built on [`ua_async_core::send_request`].

pub mod node_management;
pub mod response;

use ua_async_core::Engine;

use crate::messages::{ServiceRequest, ServiceResponse};

/// Engines speaking this crate's request/response envelopes.
pub trait ServiceEngine: Engine<Request = ServiceRequest, Response = ServiceResponse> {}

impl<E> ServiceEngine for E where E: Engine<Request = ServiceRequest, Response = ServiceResponse> {}
