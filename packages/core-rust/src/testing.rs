//! Scripted engine used by the unit tests of this crate.
//!
//! Every request carries a [`Script`] telling the engine what to answer. The
//! engine keeps a log of the ids it handed back and asserts that no id is
//! delivered twice.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Duration;

use crate::config::ConnectionConfig;
use crate::connection::Connection;
use crate::engine::{Delivery, Engine, PendingRequest, Rejected, RequestId};
use crate::error::BadStatus;
use crate::status::StatusCode;

#[derive(Debug, Clone, Copy)]
pub(crate) enum Script {
    /// Respond with this value and a good service result.
    Echo(i32),
    /// Respond with this value and the given service result.
    Embedded(i32, StatusCode),
    /// Deliver without a response.
    Missing,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub(crate) struct TestResponse {
    pub value: i32,
    pub status: StatusCode,
}

#[derive(Debug, Default)]
pub(crate) struct EngineLog {
    pub submitted: Vec<RequestId>,
    pub delivered: Vec<RequestId>,
    pub withdrawn: Vec<RequestId>,
}

pub(crate) type SharedLog = Rc<RefCell<EngineLog>>;

struct Queued {
    id: RequestId,
    script: Script,
    pending: PendingRequest<TestResponse>,
}

pub(crate) struct ScriptedEngine {
    queue: VecDeque<Queued>,
    next_id: u32,
    log: SharedLog,
    pub stalled: bool,
    pub connected: bool,
    pub fail_next_poll: bool,
    pub reject_with: Option<StatusCode>,
    pub reverse: bool,
}

impl ScriptedEngine {
    pub fn new() -> (Self, SharedLog) {
        let log = SharedLog::default();
        let engine = Self {
            queue: VecDeque::new(),
            next_id: 0,
            log: Rc::clone(&log),
            stalled: false,
            connected: true,
            fail_next_poll: false,
            reject_with: None,
            reverse: false,
        };
        (engine, log)
    }
}

impl Engine for ScriptedEngine {
    type Request = Script;
    type Response = TestResponse;

    fn submit(
        &mut self,
        request: Script,
        pending: PendingRequest<TestResponse>,
    ) -> Result<RequestId, Rejected<TestResponse>> {
        if !self.connected {
            return Err(Rejected {
                status: BadStatus::Disconnect,
                pending,
            });
        }
        if let Some(code) = self.reject_with {
            return Err(Rejected {
                status: BadStatus::new(code),
                pending,
            });
        }
        self.next_id += 1;
        let id = RequestId(self.next_id);
        self.log.borrow_mut().submitted.push(id);
        self.queue.push_back(Queued {
            id,
            script: request,
            pending,
        });
        Ok(id)
    }

    fn poll(&mut self, timeout: Duration) -> Result<Vec<Delivery<TestResponse>>, BadStatus> {
        if self.fail_next_poll {
            self.fail_next_poll = false;
            self.connected = false;
            return Err(BadStatus::Disconnect);
        }
        if self.stalled {
            std::thread::sleep(timeout.min(Duration::from_millis(1)));
            return Ok(Vec::new());
        }

        let mut ready: Vec<Queued> = self.queue.drain(..).collect();
        if self.reverse {
            ready.reverse();
        }
        let mut log = self.log.borrow_mut();
        let deliveries = ready
            .into_iter()
            .map(|queued| {
                assert!(
                    !log.delivered.contains(&queued.id),
                    "request {} delivered twice",
                    queued.id
                );
                log.delivered.push(queued.id);
                let response = match queued.script {
                    Script::Echo(value) => Some(TestResponse {
                        value,
                        status: StatusCode::GOOD,
                    }),
                    Script::Embedded(value, status) => Some(TestResponse { value, status }),
                    Script::Missing => None,
                };
                Delivery {
                    request_id: queued.id,
                    pending: queued.pending,
                    response,
                }
            })
            .collect();
        Ok(deliveries)
    }

    fn cancel(&mut self, request_id: RequestId) -> Option<PendingRequest<TestResponse>> {
        let position = self.queue.iter().position(|q| q.id == request_id)?;
        let queued = self.queue.remove(position)?;
        self.log.borrow_mut().withdrawn.push(request_id);
        Some(queued.pending)
    }

    fn close(&mut self) -> Vec<PendingRequest<TestResponse>> {
        self.connected = false;
        let mut log = self.log.borrow_mut();
        self.queue
            .drain(..)
            .map(|queued| {
                log.withdrawn.push(queued.id);
                queued.pending
            })
            .collect()
    }

    fn outstanding(&self) -> usize {
        self.queue.len()
    }

    fn is_connected(&self) -> bool {
        self.connected
    }
}

/// Opens a connection over a fresh scripted engine.
pub(crate) fn connect() -> (Connection<ScriptedEngine>, SharedLog) {
    connect_with(ConnectionConfig::default())
}

pub(crate) fn connect_with(config: ConnectionConfig) -> (Connection<ScriptedEngine>, SharedLog) {
    let (engine, log) = ScriptedEngine::new();
    (Connection::new(engine, config), log)
}
