//! SNMP messages: a PDU plus the version-specific header around it.

use bytes::Bytes;

use crate::pdu::{Pdu, TrapV1Pdu};
use crate::v3::{DEFAULT_MSG_MAX_SIZE, SecurityLevel, SecurityParameters, UsmUser};
use crate::version::Version;

/// An SNMP message of any version.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    /// SNMPv1 / SNMPv2c request or response.
    Community(CommunityMessage),
    /// SNMPv1 Trap-PDU.
    TrapV1(TrapV1Message),
    /// SNMPv3 message.
    V3(V3Message),
}

/// Community-based message.
#[derive(Debug, Clone, PartialEq)]
pub struct CommunityMessage {
    pub version: Version,
    pub community: Bytes,
    pub pdu: Pdu,
}

/// SNMPv1 trap message.
#[derive(Debug, Clone, PartialEq)]
pub struct TrapV1Message {
    pub community: Bytes,
    pub trap: TrapV1Pdu,
}

/// Scoped PDU payload, either readable or still encrypted.
#[derive(Debug, Clone, PartialEq)]
pub enum ScopedPduData {
    Plaintext(Pdu),
    Encrypted(Bytes),
}

/// SNMPv3 message (RFC 3412).
#[derive(Debug, Clone, PartialEq)]
pub struct V3Message {
    pub msg_id: i32,
    pub max_size: u32,
    pub level: SecurityLevel,
    pub reportable: bool,
    pub security_params: SecurityParameters,
    pub context_engine_id: Bytes,
    pub context_name: Bytes,
    pub data: ScopedPduData,
}

impl V3Message {
    /// The plaintext PDU, if the payload has been decrypted.
    pub fn pdu(&self) -> Option<&Pdu> {
        match &self.data {
            ScopedPduData::Plaintext(pdu) => Some(pdu),
            ScopedPduData::Encrypted(_) => None,
        }
    }
}

impl Message {
    /// v1/v2c message carrying `pdu`.
    pub fn community(version: Version, community: impl Into<Bytes>, pdu: Pdu) -> Self {
        Message::Community(CommunityMessage {
            version,
            community: community.into(),
            pdu,
        })
    }

    /// v3 message for `user` under `params`.
    ///
    /// The message id equals the PDU's request id, so replies can be matched
    /// on either.
    pub fn v3_request(
        user: &UsmUser,
        params: SecurityParameters,
        context_engine_id: Bytes,
        context_name: &str,
        pdu: Pdu,
        reportable: bool,
    ) -> Self {
        Message::V3(V3Message {
            msg_id: pdu.request_id,
            max_size: DEFAULT_MSG_MAX_SIZE,
            level: user.level(),
            reportable,
            security_params: params,
            context_engine_id,
            context_name: Bytes::copy_from_slice(context_name.as_bytes()),
            data: ScopedPduData::Plaintext(pdu),
        })
    }

    /// Unauthenticated, reportable discovery request (RFC 3414 Section 4).
    pub fn discovery(request_id: i32) -> Self {
        Message::V3(V3Message {
            msg_id: request_id,
            max_size: DEFAULT_MSG_MAX_SIZE,
            level: SecurityLevel::NoAuthNoPriv,
            reportable: true,
            security_params: SecurityParameters::discovery(),
            context_engine_id: Bytes::new(),
            context_name: Bytes::new(),
            data: ScopedPduData::Plaintext(Pdu::discovery(request_id)),
        })
    }

    pub fn version(&self) -> Version {
        match self {
            Message::Community(m) => m.version,
            Message::TrapV1(_) => Version::V1,
            Message::V3(_) => Version::V3,
        }
    }

    /// Id used to correlate replies: msgID for v3, the PDU request id otherwise.
    pub fn request_id(&self) -> Option<i32> {
        match self {
            Message::Community(m) => Some(m.pdu.request_id),
            Message::TrapV1(_) => None,
            Message::V3(m) => Some(m.msg_id),
        }
    }

    /// The request/response PDU, if readable.
    pub fn pdu(&self) -> Option<&Pdu> {
        match self {
            Message::Community(m) => Some(&m.pdu),
            Message::TrapV1(_) => None,
            Message::V3(m) => m.pdu(),
        }
    }

    /// Consume the message, returning its readable PDU.
    pub fn into_pdu(self) -> Option<Pdu> {
        match self {
            Message::Community(m) => Some(m.pdu),
            Message::TrapV1(_) => None,
            Message::V3(V3Message {
                data: ScopedPduData::Plaintext(pdu),
                ..
            }) => Some(pdu),
            Message::V3(_) => None,
        }
    }

    pub fn community_string(&self) -> Option<&Bytes> {
        match self {
            Message::Community(m) => Some(&m.community),
            Message::TrapV1(m) => Some(&m.community),
            Message::V3(_) => None,
        }
    }
}
