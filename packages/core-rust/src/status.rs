//! Protocol status codes and their Good / Uncertain / Bad classification.
//!
//! A status code is a 32-bit value whose two most significant bits carry the
//! severity. The remaining bits identify the reason; only the reasons used
//! somewhere in the workspace are given named constants.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::BadStatus;

/// Severity class of a [`StatusCode`], taken from its top two bits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Severity {
    /// The operation succeeded.
    Good,
    /// The operation succeeded but the result may be unreliable.
    Uncertain,
    /// The operation failed.
    Bad,
}

/// A protocol status code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StatusCode(u32);

macro_rules! status_codes {
    ($($(#[$meta:meta])* $ident:ident = $value:literal => $name:literal;)*) => {
        impl StatusCode {
            $(
                $(#[$meta])*
                pub const $ident: Self = Self($value);
            )*
        }

        const NAMES: &[(u32, &str)] = &[$(($value, $name)),*];
    };
}

status_codes! {
    /// Success.
    GOOD = 0x0000_0000 => "Good";
    /// Generic uncertain result.
    UNCERTAIN = 0x4000_0000 => "Uncertain";
    /// The engine delivered no response for a request.
    BAD_UNEXPECTED_ERROR = 0x8001_0000 => "BadUnexpectedError";
    /// A fault without a more specific status.
    BAD_INTERNAL_ERROR = 0x8002_0000 => "BadInternalError";
    BAD_OUT_OF_MEMORY = 0x8003_0000 => "BadOutOfMemory";
    BAD_COMMUNICATION_ERROR = 0x8005_0000 => "BadCommunicationError";
    BAD_ENCODING_ERROR = 0x8006_0000 => "BadEncodingError";
    BAD_DECODING_ERROR = 0x8007_0000 => "BadDecodingError";
    /// The response did not have the type the request called for.
    BAD_UNKNOWN_RESPONSE = 0x8009_0000 => "BadUnknownResponse";
    BAD_TIMEOUT = 0x800A_0000 => "BadTimeout";
    BAD_SHUTDOWN = 0x800C_0000 => "BadShutdown";
    BAD_SERVER_NOT_CONNECTED = 0x800D_0000 => "BadServerNotConnected";
    BAD_NOTHING_TO_DO = 0x800F_0000 => "BadNothingToDo";
    BAD_NODE_ID_INVALID = 0x8033_0000 => "BadNodeIdInvalid";
    BAD_NODE_ID_UNKNOWN = 0x8034_0000 => "BadNodeIdUnknown";
    BAD_NOT_FOUND = 0x803E_0000 => "BadNotFound";
    BAD_REFERENCE_TYPE_ID_INVALID = 0x804C_0000 => "BadReferenceTypeIdInvalid";
    BAD_PARENT_NODE_ID_INVALID = 0x805B_0000 => "BadParentNodeIdInvalid";
    BAD_REFERENCE_NOT_ALLOWED = 0x805C_0000 => "BadReferenceNotAllowed";
    BAD_NODE_ID_EXISTS = 0x805E_0000 => "BadNodeIdExists";
    BAD_NODE_CLASS_INVALID = 0x805F_0000 => "BadNodeClassInvalid";
    BAD_BROWSE_NAME_INVALID = 0x8060_0000 => "BadBrowseNameInvalid";
    BAD_TYPE_DEFINITION_INVALID = 0x8063_0000 => "BadTypeDefinitionInvalid";
    BAD_SOURCE_NODE_ID_INVALID = 0x8064_0000 => "BadSourceNodeIdInvalid";
    BAD_TARGET_NODE_ID_INVALID = 0x8065_0000 => "BadTargetNodeIdInvalid";
    BAD_DUPLICATE_REFERENCE_NOT_ALLOWED = 0x8066_0000 => "BadDuplicateReferenceNotAllowed";
    /// The session was lost. Always surfaced as [`BadStatus::Disconnect`].
    BAD_DISCONNECT = 0x80AD_0000 => "BadDisconnect";
    BAD_CONNECTION_CLOSED = 0x80AE_0000 => "BadConnectionClosed";
}

impl StatusCode {
    /// Wraps a raw status value.
    #[must_use]
    pub const fn new(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw status value.
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Severity encoded in the two most significant bits.
    #[must_use]
    pub const fn severity(self) -> Severity {
        match self.0 >> 30 {
            0 => Severity::Good,
            1 => Severity::Uncertain,
            _ => Severity::Bad,
        }
    }

    #[must_use]
    pub const fn is_good(self) -> bool {
        matches!(self.severity(), Severity::Good)
    }

    #[must_use]
    pub const fn is_uncertain(self) -> bool {
        matches!(self.severity(), Severity::Uncertain)
    }

    #[must_use]
    pub const fn is_bad(self) -> bool {
        matches!(self.severity(), Severity::Bad)
    }

    /// Symbolic name of the code, if it is one of the named constants.
    #[must_use]
    pub fn name(self) -> Option<&'static str> {
        NAMES
            .iter()
            .find(|(raw, _)| *raw == self.0)
            .map(|(_, name)| *name)
    }

    /// Converts a bad code into an error, leaving good and uncertain codes alone.
    ///
    /// # Errors
    ///
    /// Returns [`BadStatus::Disconnect`] for [`StatusCode::BAD_DISCONNECT`] and
    /// [`BadStatus::Status`] for every other bad code.
    pub fn check(self) -> Result<(), BadStatus> {
        if self.is_bad() {
            Err(BadStatus::new(self))
        } else {
            Ok(())
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => f.write_str(name),
            None => write!(f, "0x{:08X}", self.0),
        }
    }
}

impl From<u32> for StatusCode {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}
