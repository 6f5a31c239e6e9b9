//! USM security parameters and Report PDU classification (RFC 3414).

use bytes::Bytes;

use crate::error::{Error, ResponseInvalidCode};
use crate::oid::Oid;
use crate::pdu::Pdu;

/// Default msgMaxSize for UDP transport (65535 - 20 IPv4 - 8 UDP = 65507).
pub const DEFAULT_MSG_MAX_SIZE: u32 = 65507;

/// USM security parameters carried in a v3 message header.
///
/// `auth_params` and `priv_params` are placeholders on outgoing messages; the
/// codec fills them in when it signs and encrypts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SecurityParameters {
    /// Authoritative engine ID
    pub engine_id: Bytes,
    /// Engine boot count
    pub engine_boots: u32,
    /// Engine time (seconds since last boot)
    pub engine_time: u32,
    /// User name
    pub user_name: Bytes,
    /// Authentication parameters (HMAC digest, or empty)
    pub auth_params: Bytes,
    /// Privacy parameters (salt/IV, or empty)
    pub priv_params: Bytes,
}

impl SecurityParameters {
    /// Parameters for `user_name` under a known engine identity.
    pub fn new(engine_id: Bytes, engine_boots: u32, engine_time: u32, user_name: &str) -> Self {
        Self {
            engine_id,
            engine_boots,
            engine_time,
            user_name: Bytes::copy_from_slice(user_name.as_bytes()),
            auth_params: Bytes::new(),
            priv_params: Bytes::new(),
        }
    }

    /// Empty parameters used by the discovery request.
    pub fn discovery() -> Self {
        Self::default()
    }

    /// Boots and time both zero: the agent wants another round trip before
    /// its clock can be trusted.
    pub fn time_unsynchronized(&self) -> bool {
        self.engine_boots == 0 && self.engine_time == 0
    }
}

/// usmStats (1.3.6.1.6.3.15.1.1), parent of the USM error counters.
pub fn usm_stats() -> Oid {
    crate::oid!(1, 3, 6, 1, 6, 3, 15, 1, 1)
}

/// USM statistics counters that agents report on security failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UsmStat {
    UnsupportedSecLevels = 1,
    NotInTimeWindows = 2,
    UnknownUserNames = 3,
    UnknownEngineIds = 4,
    WrongDigests = 5,
    DecryptionErrors = 6,
}

impl UsmStat {
    /// Look up a counter by its arc under usmStats.
    pub fn from_arc(arc: u32) -> Option<Self> {
        match arc {
            1 => Some(Self::UnsupportedSecLevels),
            2 => Some(Self::NotInTimeWindows),
            3 => Some(Self::UnknownUserNames),
            4 => Some(Self::UnknownEngineIds),
            5 => Some(Self::WrongDigests),
            6 => Some(Self::DecryptionErrors),
            _ => None,
        }
    }

    /// Instance OID (`usmStats.<n>.0`).
    pub fn oid(self) -> Oid {
        usm_stats().extend(&[self as u32, 0])
    }

    /// Human-readable failure name.
    pub fn description(self) -> &'static str {
        match self {
            Self::UnsupportedSecLevels => "Unsupported Security Level",
            Self::NotInTimeWindows => "Not In Time Window",
            Self::UnknownUserNames => "Unknown User Name",
            Self::UnknownEngineIds => "Unknown Engine ID",
            Self::WrongDigests => "Wrong Digest",
            Self::DecryptionErrors => "Decryption Error",
        }
    }
}

/// Turn a Report PDU that cannot be retried into the error delivered to the caller.
///
/// A first varbind under usmStats becomes an `AuthFailure` naming the counter
/// (the instance `.0` is ignored). Anything else is an unexpected report.
pub fn report_error(report: &Pdu) -> Error {
    let stats = usm_stats();
    let Some(first) = report.varbinds.first() else {
        return unexpected_report();
    };
    let Some(suffix) = first.oid.suffix(&stats) else {
        return unexpected_report();
    };

    let suffix = match suffix {
        [head @ .., 0] if !head.is_empty() => head,
        other => other,
    };
    let description = match suffix {
        [arc] => UsmStat::from_arc(*arc).map(UsmStat::description),
        _ => None,
    };

    Error::response_invalid(
        ResponseInvalidCode::AuthFailure,
        description.unwrap_or("Unexpected Report PDU"),
    )
}

fn unexpected_report() -> Error {
    Error::response_invalid(ResponseInvalidCode::UnexpectedReport, "Unexpected Report PDU")
}
