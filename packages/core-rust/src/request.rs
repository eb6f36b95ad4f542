//! The per-operation entry point: request + transform + token.

use std::sync::Arc;

use crate::adapter::{create_callback_and_context, CompletionHandler};
use crate::connection::Connection;
use crate::engine::{Engine, RequestId};
use crate::token::CompletionToken;

/// Type-erased transform from a native response to the operation's result.
pub type BoxedTransform<R, T> = Box<dyn FnOnce(&mut R) -> anyhow::Result<T>>;

/// A request that has been built but not yet submitted.
///
/// Completion tokens receive an `Operation` and decide when to submit it and
/// with which handler.
pub struct Operation<E: Engine, T> {
    connection: Connection<E>,
    request: E::Request,
    transform: BoxedTransform<E::Response, T>,
}

impl<E, T> Operation<E, T>
where
    E: Engine,
    T: Default + 'static,
{
    pub fn new<F>(connection: Connection<E>, request: E::Request, transform: F) -> Self
    where
        F: FnOnce(&mut E::Response) -> anyhow::Result<T> + 'static,
    {
        Self {
            connection,
            request,
            transform: Box::new(transform),
        }
    }

    #[must_use]
    pub fn connection(&self) -> &Connection<E> {
        &self.connection
    }

    /// Submits the request with `handler` as its completion handler.
    ///
    /// Returns the engine's request id, or `None` if the engine rejected the
    /// request (the handler has already run in that case).
    pub fn submit<H>(self, handler: H) -> Option<RequestId>
    where
        H: CompletionHandler<T>,
    {
        let Self {
            connection,
            request,
            transform,
        } = self;
        let pending = create_callback_and_context(Arc::clone(connection.catcher()), transform, handler);
        connection.submit(request, pending)
    }

    pub(crate) fn into_parts(self) -> (Connection<E>, E::Request, BoxedTransform<E::Response, T>) {
        (self.connection, self.request, self.transform)
    }
}

/// Sends `request` over `connection`, delivering the transformed response
/// through `token`.
///
/// The transform receives the engine's response by mutable reference and may
/// move data out of it; the engine drops what is left after the transform
/// returns. Fallible checks belong before any data is moved out.
pub fn send_request<E, Q, T, F, K>(
    connection: &Connection<E>,
    request: Q,
    transform: F,
    token: K,
) -> K::Output
where
    E: Engine,
    Q: Into<E::Request>,
    T: Default + 'static,
    F: FnOnce(&mut E::Response) -> anyhow::Result<T> + 'static,
    K: CompletionToken<E, T>,
{
    token.initiate(Operation::new(connection.clone(), request.into(), transform))
}

/// Transform that moves the whole native response out.
///
/// # Errors
///
/// Never fails; the signature matches the transform contract.
#[allow(clippy::unnecessary_wraps)]
pub fn take_response<R: Default>(response: &mut R) -> anyhow::Result<R> {
    Ok(std::mem::take(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusCode;
    use crate::sync::UseSync;
    use crate::testing::{connect, Script, TestResponse};
    use crate::token::UseFuture;

    #[test]
    fn take_response_leaves_default_behind() {
        let mut response = TestResponse {
            value: 4,
            status: StatusCode::UNCERTAIN,
        };
        let taken = take_response(&mut response).unwrap();
        assert_eq!(taken.value, 4);
        assert_eq!(response, TestResponse::default());
    }

    #[test]
    fn send_request_with_take_response() {
        let (conn, _log) = connect();
        let response = send_request(&conn, Script::Echo(12), take_response, UseSync::default()).unwrap();
        assert_eq!(response.value, 12);
    }

    #[test]
    fn operation_submit_returns_engine_id() {
        let (conn, _log) = connect();
        let first = Operation::new(conn.clone(), Script::Echo(1), take_response).submit(
            |_status: StatusCode, _response: TestResponse| {},
        );
        let second = Operation::new(conn.clone(), Script::Echo(2), take_response).submit(
            |_status: StatusCode, _response: TestResponse| {},
        );
        assert_eq!(first, Some(RequestId(1)));
        assert_eq!(second, Some(RequestId(2)));
        assert_eq!(conn.outstanding(), 2);
    }

    #[test]
    fn operation_exposes_its_connection() {
        let (conn, _log) = connect();
        let operation: Operation<_, i32> =
            Operation::new(conn.clone(), Script::Echo(1), |r: &mut TestResponse| Ok(r.value));
        assert_eq!(operation.connection().outstanding(), 0);
        let mut future = UseFuture.initiate(operation);
        conn.run_iterate().unwrap();
        assert_eq!(future.try_get(), Some(Ok(1)));
    }
}
