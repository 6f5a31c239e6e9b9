//! GETBULK response reassembly.
//!
//! An agent answers GETBULK with one flat varbind list: the non-repeater
//! values first, then up to `max_repetitions` rounds of the repeater columns
//! interleaved. [`BulkReassembler`] rebuilds the per-column shape and checks
//! that every repetition moves forward through the MIB.

use crate::error::{Error, ResponseInvalidCode, Result};
use crate::oid::{Oid, oid_follows};
use crate::varbind::VarBind;

/// A reassembled GETBULK response.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResult {
    /// One varbind per non-repeater OID.
    pub non_repeaters: Vec<VarBind>,
    /// One list per repeater OID, in repetition order.
    pub repeaters: Vec<Vec<VarBind>>,
}

/// Rebuilds the non-repeater/repeater shape of a GETBULK response.
///
/// ```
/// use snmp_session::{oid, BulkReassembler, Value, VarBind};
///
/// let request = [oid!(1, 1), oid!(2, 1), oid!(3, 1)];
/// let reply = vec![
///     VarBind::new(oid!(1, 1, 0), Value::Integer(0)),
///     VarBind::new(oid!(2, 1, 1), Value::Integer(1)),
///     VarBind::new(oid!(3, 1, 1), Value::Integer(2)),
///     VarBind::new(oid!(2, 1, 2), Value::Integer(3)),
///     VarBind::new(oid!(3, 1, 2), Value::Integer(4)),
/// ];
///
/// let result = BulkReassembler::new(1).reassemble(&request, reply).unwrap();
/// assert_eq!(result.non_repeaters.len(), 1);
/// assert_eq!(result.repeaters[0][1].oid, oid!(2, 1, 2));
/// assert_eq!(result.repeaters[1][1].oid, oid!(3, 1, 2));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct BulkReassembler {
    non_repeaters: usize,
    backwards_get_nexts: bool,
    strict_oids: bool,
}

impl BulkReassembler {
    /// Reassembler for a request with `non_repeaters` leading single-shot OIDs.
    ///
    /// Ordering is not enforced until [`backwards_get_nexts`](Self::backwards_get_nexts)
    /// is turned off.
    pub fn new(non_repeaters: usize) -> Self {
        Self {
            non_repeaters,
            backwards_get_nexts: true,
            strict_oids: false,
        }
    }

    /// Tolerate repetitions whose OID does not follow the previous one.
    pub fn backwards_get_nexts(mut self, allow: bool) -> Self {
        self.backwards_get_nexts = allow;
        self
    }

    /// Require exception varbinds to carry the OID they answer.
    pub fn strict_oids(mut self, strict: bool) -> Self {
        self.strict_oids = strict;
        self
    }

    /// Reassemble `response` against the requested OIDs.
    pub fn reassemble(&self, request: &[Oid], response: Vec<VarBind>) -> Result<BulkResult> {
        let request_len = request.len();
        let non_repeaters = self.non_repeaters.min(request_len);
        let repeaters = request_len - non_repeaters;

        let mut result = BulkResult {
            non_repeaters: Vec::with_capacity(non_repeaters),
            repeaters: Vec::with_capacity(repeaters),
        };

        for (i, vb) in response.into_iter().enumerate() {
            if i < request_len {
                self.check(&request[i], &vb)?;
                if i < non_repeaters {
                    result.non_repeaters.push(vb);
                } else {
                    result.repeaters.push(vec![vb]);
                }
                continue;
            }

            if repeaters == 0 {
                return Err(Error::response_invalid(
                    ResponseInvalidCode::ReqResOidNoMatch,
                    format!(
                        "GetBulk response has {} varbinds beyond {} non-repeaters",
                        i + 1 - request_len,
                        non_repeaters
                    ),
                ));
            }

            let column = &mut result.repeaters[(i - non_repeaters) % repeaters];
            if let Some(previous) = column.last() {
                self.check(&previous.oid, &vb)?;
            }
            column.push(vb);
        }

        Ok(result)
    }

    fn check(&self, previous: &Oid, vb: &VarBind) -> Result<()> {
        if vb.is_exception() {
            if self.strict_oids && vb.oid != *previous {
                return Err(Error::response_invalid(
                    ResponseInvalidCode::ReqResOidNoMatch,
                    format!("OID {} in request does not match OID {} in response", previous, vb.oid),
                ));
            }
            return Ok(());
        }

        if !self.backwards_get_nexts && !oid_follows(previous, &vb.oid) {
            return Err(Error::response_invalid(
                ResponseInvalidCode::OutOfOrder,
                format!("OID {} in response does not follow OID {}", vb.oid, previous),
            ));
        }
        Ok(())
    }
}
