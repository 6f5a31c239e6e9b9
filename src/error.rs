//! Error types for snmp-session.
//!
//! All errors are `#[non_exhaustive]` to allow adding new variants without breaking changes.
//!
//! Errors are grouped the way a session reports them:
//!
//! - [`Error::RequestInvalid`]: caller misuse caught before any network I/O.
//! - [`Error::ResponseInvalid`]: a reply violated a protocol invariant; carries a
//!   stable [`ResponseInvalidCode`].
//! - [`Error::RequestFailed`] / [`Error::VarbindException`]: the agent reported a failure.
//! - [`Error::Timeout`]: retries exhausted without a reply.
//! - [`Error::Processing`]: an inbound datagram could not be decoded.

use std::net::SocketAddr;
use std::time::Duration;

use bytes::Bytes;

use crate::oid::Oid;
use crate::value::Exception;

/// Result type alias using the library's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Value decode error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecodeErrorKind {
    /// Ran out of content bytes mid-value.
    TruncatedData,
    /// Integer content longer than the target type allows.
    IntegerOverflow,
    /// Zero-length integer.
    ZeroLengthInteger,
    /// Boolean content must be exactly one octet.
    InvalidBoolean { length: usize },
    /// OID exceeds the maximum number of arcs.
    OidTooLong { count: usize, max: usize },
    /// Counter64 content too long.
    Integer64TooLong { length: usize },
    /// NULL or exception with non-zero length.
    InvalidNull,
    /// Opaque-wrapped value was malformed.
    InvalidOpaque,
}

impl std::fmt::Display for DecodeErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::TruncatedData => write!(f, "truncated data"),
            Self::IntegerOverflow => write!(f, "integer overflow"),
            Self::ZeroLengthInteger => write!(f, "zero-length integer"),
            Self::InvalidBoolean { length } => {
                write!(f, "boolean must be 1 byte, got {}", length)
            }
            Self::OidTooLong { count, max } => {
                write!(f, "OID has {} arcs, exceeds maximum {}", count, max)
            }
            Self::Integer64TooLong { length } => {
                write!(f, "integer64 too long: {} bytes", length)
            }
            Self::InvalidNull => write!(f, "NULL with non-zero length"),
            Self::InvalidOpaque => write!(f, "malformed opaque-wrapped value"),
        }
    }
}

/// OID validation error kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OidErrorKind {
    /// Empty OID string.
    Empty,
    /// Invalid arc value.
    InvalidArc,
    /// OID has too many arcs (exceeds MAX_OID_LEN).
    TooManyArcs { count: usize, max: usize },
}

impl std::fmt::Display for OidErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty OID"),
            Self::InvalidArc => write!(f, "invalid arc value"),
            Self::TooManyArcs { count, max } => {
                write!(f, "OID has {} arcs, exceeds maximum {}", count, max)
            }
        }
    }
}

/// Stable codes attached to [`Error::ResponseInvalid`].
///
/// The numeric values are part of the public contract and never change.
/// Code 7 is retired.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ResponseInvalidCode {
    Ip4AddressSize,
    UnknownObjectType,
    UnknownPduType,
    CouldNotDecrypt,
    AuthFailure,
    ReqResOidNoMatch,
    OutOfOrder,
    VersionNoMatch,
    CommunityNoMatch,
    UnexpectedReport,
    ResponseNotHandled,
    UnexpectedResponse,
}

impl ResponseInvalidCode {
    /// Numeric code.
    pub const fn as_u8(self) -> u8 {
        match self {
            Self::Ip4AddressSize => 1,
            Self::UnknownObjectType => 2,
            Self::UnknownPduType => 3,
            Self::CouldNotDecrypt => 4,
            Self::AuthFailure => 5,
            Self::ReqResOidNoMatch => 6,
            Self::OutOfOrder => 8,
            Self::VersionNoMatch => 9,
            Self::CommunityNoMatch => 10,
            Self::UnexpectedReport => 11,
            Self::ResponseNotHandled => 12,
            Self::UnexpectedResponse => 13,
        }
    }

    /// Look up a code by its numeric value.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            1 => Some(Self::Ip4AddressSize),
            2 => Some(Self::UnknownObjectType),
            3 => Some(Self::UnknownPduType),
            4 => Some(Self::CouldNotDecrypt),
            5 => Some(Self::AuthFailure),
            6 => Some(Self::ReqResOidNoMatch),
            8 => Some(Self::OutOfOrder),
            9 => Some(Self::VersionNoMatch),
            10 => Some(Self::CommunityNoMatch),
            11 => Some(Self::UnexpectedReport),
            12 => Some(Self::ResponseNotHandled),
            13 => Some(Self::UnexpectedResponse),
            _ => None,
        }
    }
}

impl std::fmt::Display for ResponseInvalidCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Ip4AddressSize => "EIp4AddressSize",
            Self::UnknownObjectType => "EUnknownObjectType",
            Self::UnknownPduType => "EUnknownPduType",
            Self::CouldNotDecrypt => "ECouldNotDecrypt",
            Self::AuthFailure => "EAuthFailure",
            Self::ReqResOidNoMatch => "EReqResOidNoMatch",
            Self::OutOfOrder => "EOutOfOrder",
            Self::VersionNoMatch => "EVersionNoMatch",
            Self::CommunityNoMatch => "ECommunityNoMatch",
            Self::UnexpectedReport => "EUnexpectedReport",
            Self::ResponseNotHandled => "EResponseNotHandled",
            Self::UnexpectedResponse => "EUnexpectedResponse",
        };
        write!(f, "{}({})", name, self.as_u8())
    }
}

/// SNMP error status codes (RFC 3416).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorStatus {
    NoError,
    TooBig,
    NoSuchName,
    BadValue,
    ReadOnly,
    GenErr,
    NoAccess,
    WrongType,
    WrongLength,
    WrongEncoding,
    WrongValue,
    NoCreation,
    InconsistentValue,
    ResourceUnavailable,
    CommitFailed,
    UndoFailed,
    AuthorizationError,
    NotWritable,
    InconsistentName,
    /// Unknown/future error status code.
    Unknown(i32),
}

impl ErrorStatus {
    /// Create from raw status code.
    pub fn from_i32(value: i32) -> Self {
        match value {
            0 => Self::NoError,
            1 => Self::TooBig,
            2 => Self::NoSuchName,
            3 => Self::BadValue,
            4 => Self::ReadOnly,
            5 => Self::GenErr,
            6 => Self::NoAccess,
            7 => Self::WrongType,
            8 => Self::WrongLength,
            9 => Self::WrongEncoding,
            10 => Self::WrongValue,
            11 => Self::NoCreation,
            12 => Self::InconsistentValue,
            13 => Self::ResourceUnavailable,
            14 => Self::CommitFailed,
            15 => Self::UndoFailed,
            16 => Self::AuthorizationError,
            17 => Self::NotWritable,
            18 => Self::InconsistentName,
            other => Self::Unknown(other),
        }
    }

    /// Convert to raw status code.
    pub fn as_i32(&self) -> i32 {
        match self {
            Self::NoError => 0,
            Self::TooBig => 1,
            Self::NoSuchName => 2,
            Self::BadValue => 3,
            Self::ReadOnly => 4,
            Self::GenErr => 5,
            Self::NoAccess => 6,
            Self::WrongType => 7,
            Self::WrongLength => 8,
            Self::WrongEncoding => 9,
            Self::WrongValue => 10,
            Self::NoCreation => 11,
            Self::InconsistentValue => 12,
            Self::ResourceUnavailable => 13,
            Self::CommitFailed => 14,
            Self::UndoFailed => 15,
            Self::AuthorizationError => 16,
            Self::NotWritable => 17,
            Self::InconsistentName => 18,
            Self::Unknown(code) => *code,
        }
    }
}

impl std::fmt::Display for ErrorStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoError => write!(f, "noError"),
            Self::TooBig => write!(f, "tooBig"),
            Self::NoSuchName => write!(f, "noSuchName"),
            Self::BadValue => write!(f, "badValue"),
            Self::ReadOnly => write!(f, "readOnly"),
            Self::GenErr => write!(f, "genErr"),
            Self::NoAccess => write!(f, "noAccess"),
            Self::WrongType => write!(f, "wrongType"),
            Self::WrongLength => write!(f, "wrongLength"),
            Self::WrongEncoding => write!(f, "wrongEncoding"),
            Self::WrongValue => write!(f, "wrongValue"),
            Self::NoCreation => write!(f, "noCreation"),
            Self::InconsistentValue => write!(f, "inconsistentValue"),
            Self::ResourceUnavailable => write!(f, "resourceUnavailable"),
            Self::CommitFailed => write!(f, "commitFailed"),
            Self::UndoFailed => write!(f, "undoFailed"),
            Self::AuthorizationError => write!(f, "authorizationError"),
            Self::NotWritable => write!(f, "notWritable"),
            Self::InconsistentName => write!(f, "inconsistentName"),
            Self::Unknown(code) => write!(f, "unknown({})", code),
        }
    }
}

/// Library error type.
#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// I/O error during communication.
    #[error("I/O error{}: {source}", target.map(|t| format!(" communicating with {}", t)).unwrap_or_default())]
    Io {
        target: Option<SocketAddr>,
        #[source]
        source: std::io::Error,
    },

    /// Request rejected locally before anything was sent. Never retried.
    #[error("invalid request: {message}")]
    RequestInvalid { message: String },

    /// Reply violated a protocol invariant. Terminal for that request.
    #[error("invalid response [{code}]: {message}")]
    ResponseInvalid {
        code: ResponseInvalidCode,
        message: String,
    },

    /// Agent returned a non-zero error status.
    #[error("SNMP error{}: {status}{}", target.map(|t| format!(" from {}", t)).unwrap_or_default(), oid.as_ref().map(|o| format!(": {}", o)).unwrap_or_default())]
    RequestFailed {
        target: Option<SocketAddr>,
        status: ErrorStatus,
        index: u32,
        oid: Option<Oid>,
    },

    /// A varbind carried an exception value where a real value was required.
    #[error("{exception}: {oid}")]
    VarbindException { oid: Oid, exception: Exception },

    /// Request timed out (after retries if configured).
    #[error("request timed out after {elapsed:?}{} (request_id={request_id}, retries={retries})", target.map(|t| format!(" waiting for {}", t)).unwrap_or_default())]
    Timeout {
        target: Option<SocketAddr>,
        elapsed: Duration,
        request_id: i32,
        retries: u32,
    },

    /// Inbound datagram could not be decoded or processed.
    #[error("failed to process datagram from {source_addr}: {reason}")]
    Processing {
        source_addr: SocketAddr,
        data: Bytes,
        reason: String,
    },

    /// Invalid OID format.
    #[error("invalid OID: {kind}")]
    InvalidOid {
        kind: OidErrorKind,
        input: Option<Box<str>>,
    },

    /// Primitive value decoding error.
    #[error("decode error at offset {offset}: {kind}")]
    Decode {
        offset: usize,
        kind: DecodeErrorKind,
    },

    /// Non-increasing OID detected during walk (agent misbehavior).
    #[error("walk detected non-increasing OID: {previous} >= {current}")]
    NonIncreasingOid { previous: Oid, current: Oid },

    /// Walk issued more requests than the configured bound.
    #[error("walk exceeded {limit} requests")]
    WalkLimitExceeded { limit: usize },

    /// Session was closed while the request was outstanding.
    #[error("socket closed")]
    SessionClosed,
}

impl Error {
    /// Create a decode error.
    pub fn decode(offset: usize, kind: DecodeErrorKind) -> Self {
        Self::Decode { offset, kind }
    }

    /// Create a request-invalid error.
    pub fn request_invalid(message: impl Into<String>) -> Self {
        Self::RequestInvalid {
            message: message.into(),
        }
    }

    /// Create a response-invalid error.
    pub fn response_invalid(code: ResponseInvalidCode, message: impl Into<String>) -> Self {
        Self::ResponseInvalid {
            code,
            message: message.into(),
        }
    }

    /// Create an invalid OID error from a kind (no input string).
    pub fn invalid_oid(kind: OidErrorKind) -> Self {
        Self::InvalidOid { kind, input: None }
    }

    /// Create an invalid OID error with the input string that failed.
    pub fn invalid_oid_with_input(kind: OidErrorKind, input: impl Into<Box<str>>) -> Self {
        Self::InvalidOid {
            kind,
            input: Some(input.into()),
        }
    }

    /// The [`ResponseInvalidCode`] if this is a response-invalid error.
    pub fn response_code(&self) -> Option<ResponseInvalidCode> {
        match self {
            Self::ResponseInvalid { code, .. } => Some(*code),
            _ => None,
        }
    }

    /// Get the target address if this error has one.
    pub fn target(&self) -> Option<SocketAddr> {
        match self {
            Self::Io { target, .. } => *target,
            Self::Timeout { target, .. } => *target,
            Self::RequestFailed { target, .. } => *target,
            Self::Processing { source_addr, .. } => Some(*source_addr),
            _ => None,
        }
    }
}
