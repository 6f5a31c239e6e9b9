//! Typed decoding of primitive SNMP values.
//!
//! A [`Codec`](crate::codec::Codec) that has already split a varbind into
//! `(tag, content)` hands the content octets here to obtain a [`Value`].
//! Parsing is permissive where net-snmp is permissive (leading zero octets on
//! unsigned types) and strict where a wrong length cannot be interpreted.

use bytes::Bytes;

use super::tag;
use crate::error::{DecodeErrorKind, Error, ResponseInvalidCode, Result};
use crate::oid::Oid;
use crate::value::Value;

/// Decode the content octets of a value with the given tag.
///
/// ```
/// use bytes::Bytes;
/// use snmp_session::ber::{decode_value, tag};
/// use snmp_session::Value;
///
/// let v = decode_value(tag::application::COUNTER32, Bytes::from_static(&[0x00, 0xFF, 0xFF, 0xFF, 0xFF])).unwrap();
/// assert_eq!(v, Value::Counter32(u32::MAX));
/// ```
pub fn decode_value(value_tag: u8, content: Bytes) -> Result<Value> {
    match value_tag {
        tag::universal::BOOLEAN => {
            if content.len() != 1 {
                return Err(decode_error(
                    0,
                    DecodeErrorKind::InvalidBoolean {
                        length: content.len(),
                    },
                ));
            }
            Ok(Value::Boolean(content[0] != 0))
        }
        tag::universal::INTEGER => decode_integer(&content).map(Value::Integer),
        tag::universal::OCTET_STRING => Ok(Value::OctetString(content)),
        tag::universal::NULL => {
            if !content.is_empty() {
                return Err(decode_error(0, DecodeErrorKind::InvalidNull));
            }
            Ok(Value::Null)
        }
        tag::universal::OBJECT_IDENTIFIER => Oid::from_ber(&content).map(Value::ObjectIdentifier),
        tag::application::IP_ADDRESS => {
            let octets: [u8; 4] = content.as_ref().try_into().map_err(|_| {
                Error::response_invalid(
                    ResponseInvalidCode::Ip4AddressSize,
                    format!("IpAddress must be 4 octets, got {}", content.len()),
                )
            })?;
            Ok(Value::IpAddress(octets))
        }
        tag::application::COUNTER32 => decode_unsigned32(&content).map(Value::Counter32),
        tag::application::GAUGE32 => decode_unsigned32(&content).map(Value::Gauge32),
        tag::application::TIMETICKS => decode_unsigned32(&content).map(Value::TimeTicks),
        tag::application::OPAQUE => decode_opaque(content),
        tag::application::COUNTER64 => decode_counter64(&content).map(Value::Counter64),
        tag::context::NO_SUCH_OBJECT => Ok(Value::NoSuchObject),
        tag::context::NO_SUCH_INSTANCE => Ok(Value::NoSuchInstance),
        tag::context::END_OF_MIB_VIEW => Ok(Value::EndOfMibView),
        other => Err(Error::response_invalid(
            ResponseInvalidCode::UnknownObjectType,
            format!("unknown object type 0x{:02X}", other),
        )),
    }
}

/// Decode a two's-complement INTEGER of at most four octets.
pub fn decode_integer(content: &[u8]) -> Result<i32> {
    if content.is_empty() {
        return Err(decode_error(0, DecodeErrorKind::ZeroLengthInteger));
    }
    if content.len() > 4 {
        return Err(decode_error(0, DecodeErrorKind::IntegerOverflow));
    }

    let mut value: i32 = if content[0] & 0x80 != 0 { -1 } else { 0 };
    for &byte in content {
        value = (value << 8) | i32::from(byte);
    }
    Ok(value)
}

/// Decode an unsigned 32-bit value (Counter32, Gauge32, TimeTicks).
///
/// Five octets are accepted only when the first is the zero pad that keeps
/// the high bit clear.
pub fn decode_unsigned32(content: &[u8]) -> Result<u32> {
    let digits = strip_pad(content, 5, DecodeErrorKind::IntegerOverflow)?;
    Ok(digits
        .iter()
        .fold(0u32, |acc, &b| (acc << 8) | u32::from(b)))
}

/// Decode a Counter64 as a big-endian unsigned value of at most eight
/// significant octets.
///
/// ```
/// use snmp_session::ber::decode_counter64;
///
/// assert_eq!(decode_counter64(&[0x00, 0xFF, 0, 0, 0, 0, 0, 0, 1]).unwrap(), 0xFF00_0000_0000_0001);
/// assert!(decode_counter64(&[0x01, 0, 0, 0, 0, 0, 0, 0, 0]).is_err());
/// ```
pub fn decode_counter64(content: &[u8]) -> Result<u64> {
    let digits = strip_pad(
        content,
        9,
        DecodeErrorKind::Integer64TooLong {
            length: content.len(),
        },
    )?;
    Ok(digits
        .iter()
        .fold(0u64, |acc, &b| (acc << 8) | u64::from(b)))
}

/// Validate length and drop the optional leading zero pad octet.
fn strip_pad(content: &[u8], max: usize, too_long: DecodeErrorKind) -> Result<&[u8]> {
    if content.is_empty() {
        return Err(decode_error(0, DecodeErrorKind::ZeroLengthInteger));
    }
    if content.len() > max {
        return Err(decode_error(0, too_long));
    }
    if content.len() == max {
        if content[0] != 0 {
            return Err(decode_error(0, too_long));
        }
        return Ok(&content[1..]);
    }
    Ok(content)
}

/// Unwrap the net-snmp Opaque extensions (float, double, counter64).
///
/// Content that does not start with the extension tag is returned as a raw
/// [`Value::Opaque`].
fn decode_opaque(content: Bytes) -> Result<Value> {
    if content.len() < 3 || content[0] != tag::opaque::EXTENSION {
        return Ok(Value::Opaque(content));
    }
    let (inner, len) = (content[1], usize::from(content[2]));
    let body = &content[3..];
    if body.len() != len {
        return Err(decode_error(2, DecodeErrorKind::InvalidOpaque));
    }

    match inner {
        tag::opaque::FLOAT => {
            let raw: [u8; 4] = body
                .try_into()
                .map_err(|_| decode_error(3, DecodeErrorKind::InvalidOpaque))?;
            Ok(Value::Float(f32::from_be_bytes(raw)))
        }
        tag::opaque::DOUBLE => {
            let raw: [u8; 8] = body
                .try_into()
                .map_err(|_| decode_error(3, DecodeErrorKind::InvalidOpaque))?;
            Ok(Value::Double(f64::from_be_bytes(raw)))
        }
        tag::opaque::COUNTER64 => decode_counter64(body).map(Value::Counter64),
        _ => Ok(Value::Opaque(content)),
    }
}

fn decode_error(offset: usize, kind: DecodeErrorKind) -> Error {
    tracing::debug!(target: "snmp_session::ber", { snmp.offset = offset, kind = %kind }, "value decode failed");
    Error::decode(offset, kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(t: u8, content: &'static [u8]) -> Result<Value> {
        decode_value(t, Bytes::from_static(content))
    }

    #[test]
    fn integer_sign_extends() {
        assert_eq!(decode_integer(&[0xFF]).unwrap(), -1);
        assert_eq!(decode_integer(&[0x00, 0x80]).unwrap(), 128);
        assert_eq!(decode_integer(&[0x80, 0x00, 0x00, 0x00]).unwrap(), i32::MIN);
        assert!(decode_integer(&[]).is_err());
        assert!(decode_integer(&[0, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn unsigned_accepts_pad_octet_only() {
        assert_eq!(decode_unsigned32(&[0xFF]).unwrap(), 255);
        assert_eq!(
            decode_unsigned32(&[0x00, 0x80, 0x00, 0x00, 0x00]).unwrap(),
            0x8000_0000
        );
        assert!(decode_unsigned32(&[0x01, 0, 0, 0, 0]).is_err());
        assert!(decode_unsigned32(&[0, 0, 0, 0, 0, 1]).is_err());
    }

    #[test]
    fn counter64_big_endian() {
        assert_eq!(decode_counter64(&[0x01, 0x00]).unwrap(), 256);
        assert_eq!(
            decode_counter64(&[0x00, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]).unwrap(),
            u64::MAX
        );
        assert!(matches!(
            decode_counter64(&[0; 10]),
            Err(Error::Decode {
                kind: DecodeErrorKind::Integer64TooLong { length: 10 },
                ..
            })
        ));
    }

    #[test]
    fn ip_address_length_is_checked() {
        assert_eq!(
            decode(tag::application::IP_ADDRESS, &[10, 0, 0, 1]).unwrap(),
            Value::IpAddress([10, 0, 0, 1])
        );
        let err = decode(tag::application::IP_ADDRESS, &[10, 0, 0]).unwrap_err();
        assert_eq!(err.response_code(), Some(ResponseInvalidCode::Ip4AddressSize));
    }

    #[test]
    fn unknown_tag_is_unknown_object_type() {
        let err = decode(0x47, &[1]).unwrap_err();
        assert_eq!(
            err.response_code(),
            Some(ResponseInvalidCode::UnknownObjectType)
        );
    }

    #[test]
    fn opaque_float_and_double() {
        let v = decode(tag::application::OPAQUE, &[0x9F, 0x78, 0x04, 0x3F, 0xC0, 0x00, 0x00]).unwrap();
        assert_eq!(v, Value::Float(1.5));

        let v = decode(
            tag::application::OPAQUE,
            &[0x9F, 0x79, 0x08, 0x40, 0x09, 0x21, 0xFB, 0x54, 0x44, 0x2D, 0x18],
        )
        .unwrap();
        assert_eq!(v, Value::Double(std::f64::consts::PI));
    }

    #[test]
    fn opaque_counter64_and_raw() {
        let v = decode(tag::application::OPAQUE, &[0x9F, 0x76, 0x02, 0x01, 0x00]).unwrap();
        assert_eq!(v, Value::Counter64(256));

        let v = decode(tag::application::OPAQUE, &[0x04, 0x01, 0x41]).unwrap();
        assert_eq!(v, Value::Opaque(Bytes::from_static(&[0x04, 0x01, 0x41])));
    }

    #[test]
    fn opaque_with_bad_inner_length_fails() {
        assert!(decode(tag::application::OPAQUE, &[0x9F, 0x78, 0x04, 0x3F]).is_err());
        assert!(decode(tag::application::OPAQUE, &[0x9F, 0x78, 0x02, 0x3F, 0xC0]).is_err());
    }

    #[test]
    fn boolean_null_and_exceptions() {
        assert_eq!(decode(tag::universal::BOOLEAN, &[0x01]).unwrap(), Value::Boolean(true));
        assert!(decode(tag::universal::BOOLEAN, &[]).is_err());
        assert_eq!(decode(tag::universal::NULL, &[]).unwrap(), Value::Null);
        assert!(decode(tag::universal::NULL, &[0]).is_err());
        assert_eq!(
            decode(tag::context::END_OF_MIB_VIEW, &[]).unwrap(),
            Value::EndOfMibView
        );
    }

    #[test]
    fn object_identifier_content() {
        assert_eq!(
            decode(tag::universal::OBJECT_IDENTIFIER, &[0x2B, 0x06, 0x01]).unwrap(),
            Value::ObjectIdentifier(crate::oid!(1, 3, 6, 1))
        );
    }
}
