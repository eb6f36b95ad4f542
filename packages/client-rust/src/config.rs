//! Client configuration.

use ua_async_core::ConnectionConfig;

/// Settings for the in-memory loopback engine.
#[derive(Debug, Clone)]
pub struct LoopbackConfig {
    /// Maximum number of completions handed out by one poll.
    pub max_batch: usize,
    /// Answer newest requests first instead of in submission order.
    pub reverse_delivery: bool,
    /// Namespace of node ids the server assigns when the client requests none.
    pub assign_namespace: u16,
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            max_batch: 64,
            reverse_delivery: false,
            assign_namespace: 1,
        }
    }
}

/// Top-level client configuration consumed by [`connect_loopback`](crate::connect_loopback).
#[derive(Debug, Clone, Default)]
pub struct ClientConfig {
    pub connection: ConnectionConfig,
    pub loopback: LoopbackConfig,
}
