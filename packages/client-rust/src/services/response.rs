//! Transforms shared by the service operations.
//!
//! Every transform validates first and moves data out of the engine's response
//! last, so a failed check never leaves a half-extracted response behind.

use ua_async_core::{BadStatus, StatusCode};

use crate::messages::{ResponseVariant, ServiceResponse};
use crate::types::{
    AddReferencesResponse, DeleteNodesResponse, DeleteReferencesResponse, ResponseHeader,
};

/// Transform that moves the typed response `Resp` out of the envelope.
pub fn wrap_response<Resp>() -> impl FnOnce(&mut ServiceResponse) -> anyhow::Result<Resp> + 'static
where
    Resp: ResponseVariant + 'static,
{
    |response| Ok(Resp::take_from(response)?)
}

/// Checks the service result and returns the only entry of `results`.
///
/// # Errors
///
/// Returns the service result if it is bad, and `BadUnexpectedError` unless
/// `results` holds exactly one entry.
pub fn single_result<'a, T>(
    header: &ResponseHeader,
    results: &'a mut [T],
) -> Result<&'a mut T, BadStatus> {
    header.service_result.check()?;
    match results {
        [only] => Ok(only),
        _ => Err(BadStatus::new(StatusCode::BAD_UNEXPECTED_ERROR)),
    }
}

/// Responses whose results are plain status codes.
pub trait StatusResults: ResponseVariant {
    fn header_and_results(&mut self) -> (&ResponseHeader, &mut [StatusCode]);
}

macro_rules! status_results {
    ($($response:ty),* $(,)?) => {
        $(
            impl StatusResults for $response {
                fn header_and_results(&mut self) -> (&ResponseHeader, &mut [StatusCode]) {
                    (&self.response_header, self.results.as_mut_slice())
                }
            }
        )*
    };
}

status_results!(AddReferencesResponse, DeleteNodesResponse, DeleteReferencesResponse);

/// Transform for single-item requests answered with one status code.
///
/// # Errors
///
/// Fails with the service result, the single result's status, or
/// `BadUnexpectedError` for a malformed result list.
pub fn single_status<Resp: StatusResults>(response: &mut ServiceResponse) -> anyhow::Result<()> {
    let typed = Resp::variant_mut(response)?;
    let (header, results) = typed.header_and_results();
    let status = *single_result(header, results)?;
    status.check()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::AddNodesResponse;

    fn header(status: StatusCode) -> ResponseHeader {
        ResponseHeader {
            request_handle: 1,
            service_result: status,
        }
    }

    #[test]
    fn single_result_requires_exactly_one_entry() {
        let good = header(StatusCode::GOOD);
        assert_eq!(single_result(&good, &mut [7]).map(|v| *v), Ok(7));
        assert_eq!(
            single_result::<u8>(&good, &mut []),
            Err(BadStatus::Status(StatusCode::BAD_UNEXPECTED_ERROR))
        );
        assert_eq!(
            single_result(&good, &mut [1, 2]).map(|v| *v),
            Err(BadStatus::Status(StatusCode::BAD_UNEXPECTED_ERROR))
        );
    }

    #[test]
    fn single_result_checks_service_result_first() {
        let bad = header(StatusCode::BAD_NOTHING_TO_DO);
        assert_eq!(
            single_result(&bad, &mut [1]).map(|v| *v),
            Err(BadStatus::Status(StatusCode::BAD_NOTHING_TO_DO))
        );
    }

    #[test]
    fn wrap_response_moves_typed_response() {
        let mut envelope = ServiceResponse::AddNodes(AddNodesResponse {
            response_header: header(StatusCode::GOOD),
            results: Vec::new(),
        });
        let typed = wrap_response::<AddNodesResponse>()(&mut envelope).unwrap();
        assert_eq!(typed.response_header.request_handle, 1);
    }

    #[test]
    fn wrap_response_rejects_other_types() {
        let mut envelope = ServiceResponse::DeleteNodes(DeleteNodesResponse::default());
        let err = wrap_response::<AddNodesResponse>()(&mut envelope).unwrap_err();
        assert_eq!(
            err.downcast_ref::<BadStatus>(),
            Some(&BadStatus::Status(StatusCode::BAD_UNKNOWN_RESPONSE))
        );
    }

    #[test]
    fn single_status_reports_item_status() {
        let mut envelope = ServiceResponse::DeleteNodes(DeleteNodesResponse {
            response_header: header(StatusCode::GOOD),
            results: vec![StatusCode::BAD_NODE_ID_UNKNOWN],
        });
        let err = single_status::<DeleteNodesResponse>(&mut envelope).unwrap_err();
        assert_eq!(
            err.downcast_ref::<BadStatus>(),
            Some(&BadStatus::Status(StatusCode::BAD_NODE_ID_UNKNOWN))
        );

        let mut envelope = ServiceResponse::DeleteNodes(DeleteNodesResponse {
            response_header: header(StatusCode::GOOD),
            results: vec![StatusCode::GOOD],
        });
        assert!(single_status::<DeleteNodesResponse>(&mut envelope).is_ok());
    }
}
