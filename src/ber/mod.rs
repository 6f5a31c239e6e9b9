//! BER value primitives for SNMP.
//!
//! Whole-message framing belongs to the [`Codec`](crate::codec::Codec)
//! implementation; this module only provides the tag table and typed decoding
//! of primitive value contents, following X.690 with permissive parsing
//! aligned with net-snmp behavior.

mod decode;
pub mod tag;

pub use decode::{decode_counter64, decode_integer, decode_unsigned32, decode_value};
