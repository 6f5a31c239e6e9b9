//! SNMP Protocol Data Units (PDUs).
//!
//! PDUs are plain data here; turning them into bytes is the job of the
//! [`Codec`](crate::codec::Codec).

use crate::ber::tag;
use crate::error::ErrorStatus;
use crate::oid::Oid;
use crate::value::Value;
use crate::varbind::{VarBind, null_varbinds};

/// sysUpTime.0
pub const SYS_UP_TIME: [u32; 9] = [1, 3, 6, 1, 2, 1, 1, 3, 0];
/// snmpTrapOID.0
pub const SNMP_TRAP_OID: [u32; 11] = [1, 3, 6, 1, 6, 3, 1, 1, 4, 1, 0];
/// snmpTraps, parent of the well-known notification OIDs
pub const SNMP_TRAPS: [u32; 9] = [1, 3, 6, 1, 6, 3, 1, 1, 5];

/// PDU type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PduType {
    GetRequest = tag::pdu::GET_REQUEST,
    GetNextRequest = tag::pdu::GET_NEXT_REQUEST,
    Response = tag::pdu::RESPONSE,
    SetRequest = tag::pdu::SET_REQUEST,
    TrapV1 = tag::pdu::TRAP_V1,
    GetBulkRequest = tag::pdu::GET_BULK_REQUEST,
    InformRequest = tag::pdu::INFORM_REQUEST,
    TrapV2 = tag::pdu::TRAP_V2,
    Report = tag::pdu::REPORT,
}

impl PduType {
    /// Create from tag byte.
    pub fn from_tag(value: u8) -> Option<Self> {
        match value {
            tag::pdu::GET_REQUEST => Some(Self::GetRequest),
            tag::pdu::GET_NEXT_REQUEST => Some(Self::GetNextRequest),
            tag::pdu::RESPONSE => Some(Self::Response),
            tag::pdu::SET_REQUEST => Some(Self::SetRequest),
            tag::pdu::TRAP_V1 => Some(Self::TrapV1),
            tag::pdu::GET_BULK_REQUEST => Some(Self::GetBulkRequest),
            tag::pdu::INFORM_REQUEST => Some(Self::InformRequest),
            tag::pdu::TRAP_V2 => Some(Self::TrapV2),
            tag::pdu::REPORT => Some(Self::Report),
            _ => None,
        }
    }

    /// Get the tag byte.
    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl std::fmt::Display for PduType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::GetRequest => write!(f, "GetRequest"),
            Self::GetNextRequest => write!(f, "GetNextRequest"),
            Self::Response => write!(f, "Response"),
            Self::SetRequest => write!(f, "SetRequest"),
            Self::TrapV1 => write!(f, "TrapV1"),
            Self::GetBulkRequest => write!(f, "GetBulkRequest"),
            Self::InformRequest => write!(f, "InformRequest"),
            Self::TrapV2 => write!(f, "TrapV2"),
            Self::Report => write!(f, "Report"),
        }
    }
}

/// Generic PDU structure for request/response operations.
#[derive(Debug, Clone, PartialEq)]
pub struct Pdu {
    /// PDU type
    pub pdu_type: PduType,
    /// Request ID for correlating requests and responses
    pub request_id: i32,
    /// Error status (0 for requests, error code for responses)
    pub error_status: i32,
    /// Error index (1-based index of problematic varbind)
    pub error_index: i32,
    /// Variable bindings
    pub varbinds: Vec<VarBind>,
}

impl Pdu {
    fn with_varbinds(pdu_type: PduType, request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self {
            pdu_type,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    /// GET request PDU.
    pub fn get_request(request_id: i32, oids: &[Oid]) -> Self {
        Self::with_varbinds(PduType::GetRequest, request_id, null_varbinds(oids))
    }

    /// GETNEXT request PDU.
    pub fn get_next_request(request_id: i32, oids: &[Oid]) -> Self {
        Self::with_varbinds(PduType::GetNextRequest, request_id, null_varbinds(oids))
    }

    /// SET request PDU.
    pub fn set_request(request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self::with_varbinds(PduType::SetRequest, request_id, varbinds)
    }

    /// GETBULK request PDU.
    ///
    /// For GETBULK, error_status holds non_repeaters and error_index holds max_repetitions.
    pub fn get_bulk(request_id: i32, non_repeaters: i32, max_repetitions: i32, oids: &[Oid]) -> Self {
        Self {
            pdu_type: PduType::GetBulkRequest,
            request_id,
            error_status: non_repeaters,
            error_index: max_repetitions,
            varbinds: null_varbinds(oids),
        }
    }

    /// InformRequest PDU.
    pub fn inform_request(request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self::with_varbinds(PduType::InformRequest, request_id, varbinds)
    }

    /// SNMPv2-Trap PDU.
    pub fn trap_v2(request_id: i32, varbinds: Vec<VarBind>) -> Self {
        Self::with_varbinds(PduType::TrapV2, request_id, varbinds)
    }

    /// Empty GET used to provoke a USM discovery report.
    pub fn discovery(request_id: i32) -> Self {
        Self::with_varbinds(PduType::GetRequest, request_id, Vec::new())
    }

    /// GETBULK non_repeaters (stored in error_status).
    pub fn non_repeaters(&self) -> i32 {
        self.error_status
    }

    /// GETBULK max_repetitions (stored in error_index).
    pub fn max_repetitions(&self) -> i32 {
        self.error_index
    }

    /// Check if this is an error response.
    pub fn is_error(&self) -> bool {
        self.pdu_type != PduType::GetBulkRequest && self.error_status != 0
    }

    /// Get the error status as an enum.
    pub fn error_status_enum(&self) -> ErrorStatus {
        ErrorStatus::from_i32(self.error_status)
    }

    /// OID named by a 1-based error index, if in range.
    pub fn error_oid(&self) -> Option<Oid> {
        let index = usize::try_from(self.error_index).ok()?;
        index
            .checked_sub(1)
            .and_then(|i| self.varbinds.get(i))
            .map(|vb| vb.oid.clone())
    }

    /// Copy of this PDU under a new request id.
    pub fn with_request_id(&self, request_id: i32) -> Self {
        Self {
            request_id,
            ..self.clone()
        }
    }
}

/// SNMPv1 generic trap types (RFC 1157 Section 4.1.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum GenericTrap {
    ColdStart = 0,
    WarmStart = 1,
    LinkDown = 2,
    LinkUp = 3,
    AuthenticationFailure = 4,
    EgpNeighborLoss = 5,
    EnterpriseSpecific = 6,
}

impl GenericTrap {
    /// Create from integer value.
    pub fn from_i32(v: i32) -> Option<Self> {
        match v {
            0 => Some(Self::ColdStart),
            1 => Some(Self::WarmStart),
            2 => Some(Self::LinkDown),
            3 => Some(Self::LinkUp),
            4 => Some(Self::AuthenticationFailure),
            5 => Some(Self::EgpNeighborLoss),
            6 => Some(Self::EnterpriseSpecific),
            _ => None,
        }
    }

    /// Get the integer value.
    pub fn as_i32(self) -> i32 {
        self as i32
    }

    /// Notification OID for this trap under SNMPv2 (`snmpTraps.(n+1)`).
    ///
    /// ```
    /// use snmp_session::oid;
    /// use snmp_session::pdu::GenericTrap;
    ///
    /// assert_eq!(GenericTrap::LinkDown.v2_trap_oid(), oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 3));
    /// ```
    pub fn v2_trap_oid(self) -> Oid {
        Oid::from_slice(&SNMP_TRAPS).child(self as u32 + 1)
    }
}

/// SNMPv1 Trap PDU (RFC 1157 Section 4.1.6).
#[derive(Debug, Clone, PartialEq)]
pub struct TrapV1Pdu {
    /// Enterprise OID
    pub enterprise: Oid,
    /// Agent address
    pub agent_addr: [u8; 4],
    /// Generic trap type
    pub generic_trap: i32,
    /// Specific trap code
    pub specific_trap: i32,
    /// Time since (re)initialization, hundredths of seconds
    pub time_stamp: u32,
    /// Variable bindings
    pub varbinds: Vec<VarBind>,
}

/// Leading `sysUpTime.0` and `snmpTrapOID.0` varbinds of a notification.
pub fn notification_varbinds(up_time: u32, trap_oid: Oid, mut varbinds: Vec<VarBind>) -> Vec<VarBind> {
    let mut out = Vec::with_capacity(varbinds.len() + 2);
    out.push(VarBind::new(
        Oid::from_slice(&SYS_UP_TIME),
        Value::TimeTicks(up_time),
    ));
    out.push(VarBind::new(
        Oid::from_slice(&SNMP_TRAP_OID),
        Value::ObjectIdentifier(trap_oid),
    ));
    out.append(&mut varbinds);
    out
}
