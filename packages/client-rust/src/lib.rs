//! `ua-async` client: typed NodeManagement operations over the dispatch core.
//!
//! Operations speak the native [`ServiceRequest`](messages::ServiceRequest) /
//! [`ServiceResponse`](messages::ServiceResponse) envelopes. Any engine using
//! those envelopes can carry them; [`loopback::LoopbackEngine`] is the
//! in-memory one shipped with the crate.

pub mod config;
pub mod logging;
pub mod loopback;
pub mod messages;
pub mod services;
pub mod types;

pub use config::{ClientConfig, LoopbackConfig};
pub use loopback::{connect_loopback, LoopbackEngine, NodeStore};
pub use messages::{ServiceRequest, ServiceResponse};
pub use services::node_management::{NewNode, ReferenceToDelete};
pub use services::ServiceEngine;
pub use types::{ids, ModellingRule, NodeClass, NodeId, QualifiedName};
