//! In-memory engine that frames every request and response as `MsgPack` and
//! serves them from a [`NodeStore`].
//!
//! The engine stands in for a real session in tests and demos. It offers the
//! same contract as a network engine (asynchronous completion, out-of-order
//! delivery, lost responses, session loss) with deterministic control over
//! each of them.

pub mod node_store;

use std::collections::VecDeque;
use std::time::Duration;

use ua_async_core::{
    BadStatus, Connection, Delivery, Engine, PendingRequest, Rejected, RequestId, StatusCode,
};

use crate::config::{ClientConfig, LoopbackConfig};
use crate::messages::{decode_frame, encode_frame, FrameError, ServiceRequest, ServiceResponse};

pub use node_store::{Node, NodeStore, Reference};

/// Upper bound for the idle sleep inside [`LoopbackEngine::poll`].
const IDLE_SLEEP: Duration = Duration::from_millis(1);

struct Queued {
    request_id: RequestId,
    frame: Vec<u8>,
    pending: PendingRequest<ServiceResponse>,
}

/// Engine answering requests from an in-memory address space.
pub struct LoopbackEngine {
    config: LoopbackConfig,
    store: NodeStore,
    queue: VecDeque<Queued>,
    next_request_id: u32,
    connected: bool,
    stalled: bool,
    drop_next_response: bool,
    lose_connection: bool,
}

impl LoopbackEngine {
    #[must_use]
    pub fn new(config: LoopbackConfig) -> Self {
        let store = NodeStore::new(config.assign_namespace);
        Self {
            config,
            store,
            queue: VecDeque::new(),
            next_request_id: 1,
            connected: true,
            stalled: false,
            drop_next_response: false,
            lose_connection: false,
        }
    }

    #[must_use]
    pub fn store(&self) -> &NodeStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut NodeStore {
        &mut self.store
    }

    /// Stops answering until [`LoopbackEngine::resume`].
    pub fn stall(&mut self) {
        self.stalled = true;
    }

    pub fn resume(&mut self) {
        self.stalled = false;
    }

    /// The next completion is delivered without a response.
    pub fn drop_next_response(&mut self) {
        self.drop_next_response = true;
    }

    /// The next poll fails with [`BadStatus::Disconnect`].
    pub fn lose_connection(&mut self) {
        self.lose_connection = true;
    }

    fn next_id(&mut self) -> RequestId {
        let id = RequestId(self.next_request_id);
        self.next_request_id = self.next_request_id.wrapping_add(1).max(1);
        id
    }

    fn take_batch(&mut self) -> Vec<Queued> {
        let count = self.queue.len().min(self.config.max_batch);
        if self.config.reverse_delivery {
            let mut batch: Vec<Queued> = self.queue.drain(self.queue.len() - count..).collect();
            batch.reverse();
            batch
        } else {
            self.queue.drain(..count).collect()
        }
    }

    /// Decodes the request frame, serves it and returns a freshly decoded response.
    fn serve(&mut self, request_id: RequestId, frame: &[u8]) -> ServiceResponse {
        let handle = request_id.0;
        let answered = decode_frame::<ServiceRequest>(frame)
            .map(|request| self.store.process(request, handle))
            .and_then(|response| encode_frame(&response))
            .and_then(|bytes| decode_frame::<ServiceResponse>(&bytes));
        answered.unwrap_or_else(|err: FrameError| {
            tracing::warn!(%request_id, error = %err, "loopback framing failed");
            ServiceResponse::fault(handle, err.status())
        })
    }
}

impl Default for LoopbackEngine {
    fn default() -> Self {
        Self::new(LoopbackConfig::default())
    }
}

impl Engine for LoopbackEngine {
    type Request = ServiceRequest;
    type Response = ServiceResponse;

    fn submit(
        &mut self,
        request: ServiceRequest,
        pending: PendingRequest<ServiceResponse>,
    ) -> Result<RequestId, Rejected<ServiceResponse>> {
        if !self.connected {
            return Err(Rejected {
                status: BadStatus::new(StatusCode::BAD_SERVER_NOT_CONNECTED),
                pending,
            });
        }
        let frame = match encode_frame(&request) {
            Ok(frame) => frame,
            Err(err) => {
                return Err(Rejected {
                    status: err.into(),
                    pending,
                })
            }
        };
        let request_id = self.next_id();
        tracing::trace!(%request_id, kind = request.kind(), bytes = frame.len(), "loopback request queued");
        self.queue.push_back(Queued {
            request_id,
            frame,
            pending,
        });
        Ok(request_id)
    }

    fn poll(&mut self, timeout: Duration) -> Result<Vec<Delivery<ServiceResponse>>, BadStatus> {
        if self.lose_connection {
            self.lose_connection = false;
            self.connected = false;
            return Err(BadStatus::Disconnect);
        }
        if !self.connected {
            return Err(BadStatus::Disconnect);
        }
        if self.stalled || self.queue.is_empty() {
            std::thread::sleep(timeout.min(IDLE_SLEEP));
            return Ok(Vec::new());
        }

        let batch = self.take_batch();
        let mut deliveries = Vec::with_capacity(batch.len());
        for Queued {
            request_id,
            frame,
            pending,
        } in batch
        {
            let response = self.serve(request_id, &frame);
            let response = if self.drop_next_response {
                self.drop_next_response = false;
                tracing::debug!(%request_id, "loopback response dropped");
                None
            } else {
                Some(response)
            };
            deliveries.push(Delivery {
                request_id,
                pending,
                response,
            });
        }
        Ok(deliveries)
    }

    fn cancel(&mut self, request_id: RequestId) -> Option<PendingRequest<ServiceResponse>> {
        let index = self.queue.iter().position(|q| q.request_id == request_id)?;
        self.queue.remove(index).map(|q| q.pending)
    }

    fn close(&mut self) -> Vec<PendingRequest<ServiceResponse>> {
        self.connected = false;
        self.queue.drain(..).map(|q| q.pending).collect()
    }

    fn outstanding(&self) -> usize {
        self.queue.len()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Opens a connection to a fresh loopback engine.
#[must_use]
pub fn connect_loopback(config: ClientConfig) -> Connection<LoopbackEngine> {
    tracing::info!(
        max_batch = config.loopback.max_batch,
        reverse = config.loopback.reverse_delivery,
        "loopback connection opened"
    );
    Connection::new(LoopbackEngine::new(config.loopback), config.connection)
}
