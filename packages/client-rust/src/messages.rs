//! Native request/response envelopes exchanged with the engine, and their
//! `MsgPack` framing.

use serde::{Deserialize, Serialize};
use ua_async_core::{BadStatus, StatusCode};

use crate::types::{
    AddNodesRequest, AddNodesResponse, AddReferencesRequest, AddReferencesResponse,
    DeleteNodesRequest, DeleteNodesResponse, DeleteReferencesRequest, DeleteReferencesResponse,
    ResponseHeader,
};

/// Every request the engine accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServiceRequest {
    #[serde(rename = "ADD_NODES")]
    AddNodes(AddNodesRequest),
    #[serde(rename = "ADD_REFERENCES")]
    AddReferences(AddReferencesRequest),
    #[serde(rename = "DELETE_NODES")]
    DeleteNodes(DeleteNodesRequest),
    #[serde(rename = "DELETE_REFERENCES")]
    DeleteReferences(DeleteReferencesRequest),
}

impl ServiceRequest {
    /// Wire name of the request, for logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::AddNodes(_) => "ADD_NODES",
            Self::AddReferences(_) => "ADD_REFERENCES",
            Self::DeleteNodes(_) => "DELETE_NODES",
            Self::DeleteReferences(_) => "DELETE_REFERENCES",
        }
    }
}

/// Every response the engine delivers.
///
/// `Fault` is what a server sends when it cannot process a request at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum ServiceResponse {
    #[serde(rename = "ADD_NODES")]
    AddNodes(AddNodesResponse),
    #[serde(rename = "ADD_REFERENCES")]
    AddReferences(AddReferencesResponse),
    #[serde(rename = "DELETE_NODES")]
    DeleteNodes(DeleteNodesResponse),
    #[serde(rename = "DELETE_REFERENCES")]
    DeleteReferences(DeleteReferencesResponse),
    #[serde(rename = "SERVICE_FAULT")]
    Fault(ResponseHeader),
}

impl ServiceResponse {
    #[must_use]
    pub fn header(&self) -> &ResponseHeader {
        match self {
            Self::AddNodes(r) => &r.response_header,
            Self::AddReferences(r) => &r.response_header,
            Self::DeleteNodes(r) => &r.response_header,
            Self::DeleteReferences(r) => &r.response_header,
            Self::Fault(header) => header,
        }
    }

    /// A fault response for `status`.
    #[must_use]
    pub fn fault(request_handle: u32, status: StatusCode) -> Self {
        Self::Fault(ResponseHeader {
            request_handle,
            service_result: status,
        })
    }
}

/// An empty fault; what a handler receives when no response arrived.
impl Default for ServiceResponse {
    fn default() -> Self {
        Self::Fault(ResponseHeader::default())
    }
}

macro_rules! envelope_conversions {
    ($($variant:ident => $request:ty, $response:ty;)*) => {
        $(
            impl From<$request> for ServiceRequest {
                fn from(request: $request) -> Self {
                    Self::$variant(request)
                }
            }

            impl ResponseVariant for $response {
                fn variant_mut(response: &mut ServiceResponse) -> Result<&mut Self, BadStatus> {
                    match response {
                        ServiceResponse::$variant(inner) => Ok(inner),
                        ServiceResponse::Fault(header) => Err(fault_status(header)),
                        _ => Err(BadStatus::new(StatusCode::BAD_UNKNOWN_RESPONSE)),
                    }
                }
            }
        )*
    };
}

/// Typed responses carried by a [`ServiceResponse`].
pub trait ResponseVariant: Default {
    /// Borrows the typed response inside the envelope.
    ///
    /// # Errors
    ///
    /// Returns the fault's status for a `Fault` envelope and
    /// `BadUnknownResponse` when the envelope holds a different response type.
    fn variant_mut(response: &mut ServiceResponse) -> Result<&mut Self, BadStatus>;

    /// Moves the typed response out, leaving a default value behind.
    ///
    /// # Errors
    ///
    /// Same as [`ResponseVariant::variant_mut`].
    fn take_from(response: &mut ServiceResponse) -> Result<Self, BadStatus> {
        Self::variant_mut(response).map(std::mem::take)
    }
}

fn fault_status(header: &ResponseHeader) -> BadStatus {
    if header.service_result.is_bad() {
        BadStatus::new(header.service_result)
    } else {
        BadStatus::new(StatusCode::BAD_UNKNOWN_RESPONSE)
    }
}

envelope_conversions! {
    AddNodes => AddNodesRequest, AddNodesResponse;
    AddReferences => AddReferencesRequest, AddReferencesResponse;
    DeleteNodes => DeleteNodesRequest, DeleteNodesResponse;
    DeleteReferences => DeleteReferencesRequest, DeleteReferencesResponse;
}

// ---------------------------------------------------------------------------
// Framing
// ---------------------------------------------------------------------------

/// Failure to frame or unframe an envelope.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("failed to encode frame: {0}")]
    Encode(#[from] rmp_serde::encode::Error),
    #[error("failed to decode frame: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

impl FrameError {
    /// Status reported for this failure.
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Encode(_) => StatusCode::BAD_ENCODING_ERROR,
            Self::Decode(_) => StatusCode::BAD_DECODING_ERROR,
        }
    }
}

impl From<FrameError> for BadStatus {
    fn from(err: FrameError) -> Self {
        BadStatus::new(err.status())
    }
}

/// Encodes `value` as named `MsgPack`.
///
/// # Errors
///
/// Returns [`FrameError::Encode`] if serialization fails.
pub fn encode_frame<T: Serialize>(value: &T) -> Result<Vec<u8>, FrameError> {
    Ok(rmp_serde::to_vec_named(value)?)
}

/// Decodes a named `MsgPack` frame.
///
/// # Errors
///
/// Returns [`FrameError::Decode`] if the bytes are not a valid `T`.
pub fn decode_frame<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, FrameError> {
    Ok(rmp_serde::from_slice(bytes)?)
}
