//! Common test fixtures and constants.

use std::collections::BTreeMap;

use bytes::Bytes;
use snmp_session::{Oid, Value, oid};

// =============================================================================
// Standard system MIB OIDs (1.3.6.1.2.1.1.*)
// =============================================================================

pub fn sys_descr() -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)
}
pub fn sys_object_id() -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 1, 2, 0)
}
pub fn sys_uptime() -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 1, 3, 0)
}
pub fn sys_contact() -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 1, 4, 0)
}
pub fn sys_name() -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 1, 5, 0)
}

// =============================================================================
// Subtree roots (for walks)
// =============================================================================

/// System subtree root: 1.3.6.1.2.1.1
pub fn system_subtree() -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 1)
}

/// ifTable: 1.3.6.1.2.1.2.2
pub fn if_table() -> Oid {
    oid!(1, 3, 6, 1, 2, 1, 2, 2)
}

/// Nonexistent OID for testing noSuchObject/noSuchName
pub fn nonexistent_oid() -> Oid {
    oid!(1, 3, 6, 1, 99, 99, 99, 0)
}

pub const COMMUNITY: &[u8] = b"public";

/// A small agent MIB: the system group, a two-row ifTable and one ipForwarding
/// scalar after the table.
pub fn standard_mib() -> BTreeMap<Oid, Value> {
    let if_entry = |column: u32, index: u32| if_table().extend(&[1, column, index]);

    BTreeMap::from([
        (sys_descr(), Value::from("Linux router 6.1")),
        (sys_object_id(), Value::ObjectIdentifier(oid!(1, 3, 6, 1, 4, 1, 8072, 3, 2, 10))),
        (sys_uptime(), Value::TimeTicks(123_456)),
        (sys_contact(), Value::from("noc@example.net")),
        (sys_name(), Value::from("router1")),
        (oid!(1, 3, 6, 1, 2, 1, 2, 1, 0), Value::Integer(2)),
        (if_entry(1, 1), Value::Integer(1)),
        (if_entry(1, 2), Value::Integer(2)),
        (if_entry(2, 1), Value::from("eth0")),
        (if_entry(2, 2), Value::from("eth1")),
        (if_entry(6, 1), Value::OctetString(Bytes::from_static(&[0x00, 0x1b, 0x21, 0x0a, 0x0b, 0x0c]))),
        (if_entry(6, 2), Value::OctetString(Bytes::from_static(&[0x00, 0x1b, 0x21, 0x0d, 0x0e, 0x0f]))),
        (if_entry(8, 1), Value::Integer(1)),
        (if_entry(8, 2), Value::Integer(2)),
        (oid!(1, 3, 6, 1, 2, 1, 4, 1, 0), Value::Integer(1)),
    ])
}
