//! Session configuration and per-operation options.

use std::net::{IpAddr, Ipv4Addr};
use std::time::Duration;

use bytes::Bytes;

use crate::oid::Oid;
use crate::pdu::GenericTrap;
use crate::transport::TransportKind;
use crate::v3::UsmUser;
use crate::version::Version;

/// Width of generated request ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdBits {
    /// Ids in `0..=0x7FFF`, for agents that mishandle larger values.
    Bits16,
    #[default]
    Bits32,
}

impl IdBits {
    pub(crate) fn mask(self) -> u32 {
        match self {
            IdBits::Bits16 => 0x7FFF,
            IdBits::Bits32 => 0x7FFF_FFFF,
        }
    }
}

/// Session configuration.
///
/// Most users should use the builders from [`Session::v1`](super::Session::v1),
/// [`Session::v2c`](super::Session::v2c) or [`Session::v3`](super::Session::v3)
/// rather than constructing this directly.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Protocol version (default: V2c)
    pub version: Version,
    /// Community string for v1/v2c (default: "public")
    pub community: Bytes,
    /// USM credentials, required for v3
    pub user: Option<UsmUser>,
    /// Agent port for requests (default: 161)
    pub port: u16,
    /// Agent port for traps and informs (default: 162)
    pub trap_port: u16,
    /// Retransmissions after the first send (default: 1)
    pub retries: u32,
    /// Wait before the first retransmission (default: 5 seconds)
    pub timeout: Duration,
    /// Timeout multiplier applied on every retransmission (default: 1.0, minimum 1.0)
    pub backoff: f64,
    /// Socket address family (default: UDP over IPv4)
    pub transport: TransportKind,
    /// Local bind address (default: wildcard)
    pub source_address: Option<IpAddr>,
    /// Local bind port (default: 0, ephemeral)
    pub source_port: u16,
    /// Request id width (default: 32 bits)
    pub id_bits: IdBits,
    /// v3 context name (default: empty)
    pub context: String,
    /// Tolerate GETNEXT/GETBULK results that do not move forward (default: true)
    pub backwards_get_nexts: bool,
    /// Fail GET/SET replies whose OIDs differ from the request (default: false)
    pub report_oid_mismatch_errors: bool,
    /// Upper bound on requests issued by one walk (default: 10 000)
    pub max_walk_requests: usize,
}

impl Default for SessionConfig {
    /// Returns configuration for SNMPv2c with community "public".
    fn default() -> Self {
        Self {
            version: Version::V2c,
            community: Bytes::from_static(b"public"),
            user: None,
            port: 161,
            trap_port: 162,
            retries: 1,
            timeout: Duration::from_secs(5),
            backoff: 1.0,
            transport: TransportKind::Udp4,
            source_address: None,
            source_port: 0,
            id_bits: IdBits::Bits32,
            context: String::new(),
            backwards_get_nexts: true,
            report_oid_mismatch_errors: false,
            max_walk_requests: 10_000,
        }
    }
}

/// GETBULK parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOptions {
    /// Leading OIDs fetched once (default: 0)
    pub non_repeaters: u32,
    /// Rounds fetched for the remaining OIDs (default: 10)
    pub max_repetitions: u32,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            non_repeaters: 0,
            max_repetitions: 10,
        }
    }
}

/// Notification identity: a well-known generic trap or an explicit OID.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TrapType {
    Generic(GenericTrap),
    Oid(Oid),
}

impl TrapType {
    /// snmpTrapOID value used by SNMPv2 notifications.
    pub fn notification_oid(&self) -> Oid {
        match self {
            TrapType::Generic(generic) => generic.v2_trap_oid(),
            TrapType::Oid(oid) => oid.clone(),
        }
    }
}

impl From<GenericTrap> for TrapType {
    fn from(generic: GenericTrap) -> Self {
        TrapType::Generic(generic)
    }
}

impl From<Oid> for TrapType {
    fn from(oid: Oid) -> Self {
        TrapType::Oid(oid)
    }
}

/// Options for [`Session::trap`](super::Session::trap) and
/// [`Session::inform`](super::Session::inform).
#[derive(Debug, Clone, Default)]
pub struct TrapOptions {
    /// sysUpTime in hundredths of a second (default: time since the session started)
    pub up_time: Option<u32>,
    /// v1 agent-addr (default: the local IPv4 address, or 0.0.0.0)
    pub agent_addr: Option<Ipv4Addr>,
    /// v1 enterprise for generic traps (default: 1.3.6.1.4.1)
    pub enterprise: Option<Oid>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oid;

    #[test]
    fn defaults() {
        let config = SessionConfig::default();
        assert_eq!(config.port, 161);
        assert_eq!(config.trap_port, 162);
        assert_eq!(config.retries, 1);
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.backoff, 1.0);
        assert_eq!(config.id_bits, IdBits::Bits32);
        assert!(config.backwards_get_nexts);
        assert!(!config.report_oid_mismatch_errors);
        assert_eq!(BulkOptions::default().max_repetitions, 10);
    }

    #[test]
    fn trap_type_oids() {
        assert_eq!(
            TrapType::from(GenericTrap::ColdStart).notification_oid(),
            oid!(1, 3, 6, 1, 6, 3, 1, 1, 5, 1)
        );
        let custom = oid!(1, 3, 6, 1, 4, 1, 2021, 0, 7);
        assert_eq!(TrapType::from(custom.clone()).notification_oid(), custom);
    }
}
