use bacnode_core::types::{AbortReason, ErrorClass, ErrorCode, RejectReason};
use bacnode_datalink::DataLinkError;
use thiserror::Error;

/// A typed failure raised by a service handler, mapped by the server
/// transaction state machine onto the corresponding PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceError {
    /// Becomes an Error-PDU with the given class and code.
    Error(ErrorClass, ErrorCode),
    /// Becomes a Reject-PDU.
    Reject(RejectReason),
    /// Becomes an Abort-PDU (sent by server).
    Abort(AbortReason),
}

impl ServiceError {
    pub const fn unknown_object() -> Self {
        Self::Error(ErrorClass::Object, ErrorCode::UnknownObject)
    }

    pub const fn unknown_property() -> Self {
        Self::Error(ErrorClass::Property, ErrorCode::UnknownProperty)
    }

    pub const fn write_access_denied() -> Self {
        Self::Error(ErrorClass::Property, ErrorCode::WriteAccessDenied)
    }

    pub const fn value_out_of_range() -> Self {
        Self::Error(ErrorClass::Property, ErrorCode::ValueOutOfRange)
    }

    pub const fn invalid_array_index() -> Self {
        Self::Error(ErrorClass::Property, ErrorCode::InvalidArrayIndex)
    }

    pub const fn invalid_data_type() -> Self {
        Self::Error(ErrorClass::Property, ErrorCode::InvalidDataType)
    }

    pub const fn duplicate_name() -> Self {
        Self::Error(ErrorClass::Property, ErrorCode::DuplicateName)
    }
}

/// Errors surfaced to callers of the application API.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("datalink error: {0}")]
    DataLink(#[from] DataLinkError),
    #[error("encode error: {0}")]
    Encode(#[from] bacnode_core::EncodeError),
    #[error("decode error: {0}")]
    Decode(#[from] bacnode_core::DecodeError),
    #[error("request timed out")]
    Timeout,
    #[error("all 256 invoke ids to this peer are in flight")]
    TooManyPending,
    #[error("transaction cancelled")]
    Cancelled,
    #[error("application is shut down")]
    ShutDown,
    #[error("communication is disabled by DeviceCommunicationControl")]
    CommunicationDisabled,
    #[error("peer returned error class {class:?} code {code:?}")]
    RemoteError {
        class: Option<ErrorClass>,
        code: Option<ErrorCode>,
        class_raw: Option<u32>,
        code_raw: Option<u32>,
    },
    #[error("peer rejected request: reason {reason:?}")]
    RemoteReject { reason: RejectReason },
    #[error("peer aborted request: reason {reason:?} (server={server})")]
    RemoteAbort { reason: AbortReason, server: bool },
    #[error("destination network {0} is unreachable")]
    UnreachableNetwork(u16),
    #[error("invalid configuration: {0}")]
    Configuration(String),
    #[error("unsupported response")]
    UnsupportedResponse,
}

impl AppError {
    pub fn from_error_pdu(error_class: Option<u32>, error_code: Option<u32>) -> Self {
        Self::RemoteError {
            class: error_class.and_then(ErrorClass::from_u32),
            code: error_code.map(ErrorCode::from_u32),
            class_raw: error_class,
            code_raw: error_code,
        }
    }
}
