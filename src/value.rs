//! SNMP value types.
//!
//! [`Value`] carries every decoded SMI type plus the three varbind exception
//! markers. Code that must treat the markers separately from real values
//! matches on [`Value::exception`] instead of comparing type tags.

use bytes::Bytes;

use crate::ber::tag;
use crate::oid::Oid;
use crate::util::hex;

/// SNMP value.
#[derive(Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum Value {
    /// BOOLEAN (rare, but some agents return it)
    Boolean(bool),

    /// INTEGER (signed 32-bit)
    Integer(i32),

    /// OCTET STRING (arbitrary bytes)
    OctetString(Bytes),

    /// NULL
    Null,

    /// OBJECT IDENTIFIER
    ObjectIdentifier(Oid),

    /// IpAddress (4 bytes, big-endian)
    IpAddress([u8; 4]),

    /// Counter32 (unsigned 32-bit, wrapping)
    Counter32(u32),

    /// Gauge32 / Unsigned32 (unsigned 32-bit, non-wrapping)
    Gauge32(u32),

    /// TimeTicks (hundredths of seconds)
    TimeTicks(u32),

    /// Opaque with no recognised inner type
    Opaque(Bytes),

    /// Counter64 (unsigned 64-bit, wrapping). SNMPv2c/v3 only.
    Counter64(u64),

    /// Opaque-wrapped single precision float
    Float(f32),

    /// Opaque-wrapped double precision float
    Double(f64),

    /// noSuchObject exception
    NoSuchObject,

    /// noSuchInstance exception
    NoSuchInstance,

    /// endOfMibView exception
    EndOfMibView,
}

/// The three varbind exception markers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Exception {
    NoSuchObject,
    NoSuchInstance,
    EndOfMibView,
}

impl Exception {
    /// The BER tag of the marker.
    pub const fn tag(self) -> u8 {
        match self {
            Exception::NoSuchObject => tag::context::NO_SUCH_OBJECT,
            Exception::NoSuchInstance => tag::context::NO_SUCH_INSTANCE,
            Exception::EndOfMibView => tag::context::END_OF_MIB_VIEW,
        }
    }
}

impl std::fmt::Display for Exception {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Exception::NoSuchObject => write!(f, "noSuchObject"),
            Exception::NoSuchInstance => write!(f, "noSuchInstance"),
            Exception::EndOfMibView => write!(f, "endOfMibView"),
        }
    }
}

impl From<Exception> for Value {
    fn from(e: Exception) -> Self {
        match e {
            Exception::NoSuchObject => Value::NoSuchObject,
            Exception::NoSuchInstance => Value::NoSuchInstance,
            Exception::EndOfMibView => Value::EndOfMibView,
        }
    }
}

impl Value {
    /// Try to get as i32.
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::Integer(v) => Some(*v),
            _ => None,
        }
    }

    /// Try to get as u32.
    ///
    /// Returns `Some(u32)` for [`Value::Counter32`], [`Value::Gauge32`],
    /// [`Value::TimeTicks`], or non-negative [`Value::Integer`].
    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::Counter32(v) | Value::Gauge32(v) | Value::TimeTicks(v) => Some(*v),
            Value::Integer(v) if *v >= 0 => Some(*v as u32),
            _ => None,
        }
    }

    /// Try to get as u64 (any unsigned type, or a non-negative Integer).
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            Value::Counter64(v) => Some(*v),
            other => other.as_u32().map(u64::from),
        }
    }

    /// Raw bytes of an OctetString or Opaque.
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::OctetString(data) | Value::Opaque(data) => Some(data),
            _ => None,
        }
    }

    /// OctetString as UTF-8, if valid.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::OctetString(data) => std::str::from_utf8(data).ok(),
            _ => None,
        }
    }

    /// Try to get as an OID.
    pub fn as_oid(&self) -> Option<&Oid> {
        match self {
            Value::ObjectIdentifier(oid) => Some(oid),
            _ => None,
        }
    }

    /// Try to get as an IPv4 address.
    pub fn as_ip(&self) -> Option<std::net::Ipv4Addr> {
        match self {
            Value::IpAddress(bytes) => Some(std::net::Ipv4Addr::from(*bytes)),
            _ => None,
        }
    }

    /// The exception marker this value represents, if any.
    pub fn exception(&self) -> Option<Exception> {
        match self {
            Value::NoSuchObject => Some(Exception::NoSuchObject),
            Value::NoSuchInstance => Some(Exception::NoSuchInstance),
            Value::EndOfMibView => Some(Exception::EndOfMibView),
            _ => None,
        }
    }

    /// Check if this is an exception value.
    pub fn is_exception(&self) -> bool {
        self.exception().is_some()
    }

    /// The BER tag this value is carried under.
    ///
    /// Float and Double report the Opaque tag they are wrapped in.
    pub fn tag(&self) -> u8 {
        match self {
            Value::Boolean(_) => tag::universal::BOOLEAN,
            Value::Integer(_) => tag::universal::INTEGER,
            Value::OctetString(_) => tag::universal::OCTET_STRING,
            Value::Null => tag::universal::NULL,
            Value::ObjectIdentifier(_) => tag::universal::OBJECT_IDENTIFIER,
            Value::IpAddress(_) => tag::application::IP_ADDRESS,
            Value::Counter32(_) => tag::application::COUNTER32,
            Value::Gauge32(_) => tag::application::GAUGE32,
            Value::TimeTicks(_) => tag::application::TIMETICKS,
            Value::Opaque(_) | Value::Float(_) | Value::Double(_) => tag::application::OPAQUE,
            Value::Counter64(_) => tag::application::COUNTER64,
            Value::NoSuchObject => tag::context::NO_SUCH_OBJECT,
            Value::NoSuchInstance => tag::context::NO_SUCH_INSTANCE,
            Value::EndOfMibView => tag::context::END_OF_MIB_VIEW,
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Boolean(v) => write!(f, "{}", v),
            Value::Integer(v) => write!(f, "{}", v),
            Value::OctetString(data) => match std::str::from_utf8(data) {
                Ok(s) => write!(f, "{}", s),
                Err(_) => write!(f, "0x{}", hex::encode(data)),
            },
            Value::Null => write!(f, "NULL"),
            Value::ObjectIdentifier(oid) => write!(f, "{}", oid),
            Value::IpAddress(addr) => {
                write!(f, "{}", std::net::Ipv4Addr::from(*addr))
            }
            Value::Counter32(v) | Value::Gauge32(v) => write!(f, "{}", v),
            Value::TimeTicks(v) => {
                let secs = v / 100;
                let days = secs / 86400;
                let hours = (secs % 86400) / 3600;
                let mins = (secs % 3600) / 60;
                let s = secs % 60;
                write!(f, "{}d {}h {}m {}s", days, hours, mins, s)
            }
            Value::Opaque(data) => write!(f, "Opaque(0x{})", hex::encode(data)),
            Value::Counter64(v) => write!(f, "{}", v),
            Value::Float(v) => write!(f, "{}", v),
            Value::Double(v) => write!(f, "{}", v),
            Value::NoSuchObject => write!(f, "noSuchObject"),
            Value::NoSuchInstance => write!(f, "noSuchInstance"),
            Value::EndOfMibView => write!(f, "endOfMibView"),
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::OctetString(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::OctetString(Bytes::from(s))
    }
}

impl From<&[u8]> for Value {
    fn from(data: &[u8]) -> Self {
        Value::OctetString(Bytes::copy_from_slice(data))
    }
}

impl From<Bytes> for Value {
    fn from(data: Bytes) -> Self {
        Value::OctetString(data)
    }
}

impl From<Oid> for Value {
    fn from(oid: Oid) -> Self {
        Value::ObjectIdentifier(oid)
    }
}

impl From<std::net::Ipv4Addr> for Value {
    fn from(addr: std::net::Ipv4Addr) -> Self {
        Value::IpAddress(addr.octets())
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Counter64(v)
    }
}
