//! Per-operation checks applied to a matched response.

use super::bulk::{BulkReassembler, BulkResult};
use crate::error::{Error, ResponseInvalidCode, Result};
use crate::oid::Oid;
use crate::varbind::VarBind;

/// Result handed back to the caller of a request.
#[derive(Debug)]
pub(crate) enum Reply {
    VarBinds(Vec<VarBind>),
    Bulk(BulkResult),
}

/// How a response is validated and shaped for the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ResponseShape {
    /// GET and SET: same length, optionally the same OIDs.
    Exact,
    /// GETNEXT: same length, OIDs are expected to differ.
    Next,
    /// GETBULK.
    Bulk { non_repeaters: usize },
    /// InformRequest: same length and always the same OIDs.
    Inform,
}

/// Session flags that affect response checks.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ShapeRules {
    pub backwards_get_nexts: bool,
    pub report_oid_mismatch_errors: bool,
}

impl ResponseShape {
    pub(crate) fn apply(
        self,
        request: &[VarBind],
        response: Vec<VarBind>,
        rules: ShapeRules,
    ) -> Result<Reply> {
        match self {
            ResponseShape::Exact => {
                check_len(request, &response)?;
                if rules.report_oid_mismatch_errors {
                    check_oids(request, &response)?;
                }
                Ok(Reply::VarBinds(response))
            }
            ResponseShape::Next => {
                check_len(request, &response)?;
                Ok(Reply::VarBinds(response))
            }
            ResponseShape::Inform => {
                check_len(request, &response)?;
                check_oids(request, &response)?;
                Ok(Reply::VarBinds(response))
            }
            ResponseShape::Bulk { non_repeaters } => {
                let oids: Vec<Oid> = request.iter().map(|vb| vb.oid.clone()).collect();
                BulkReassembler::new(non_repeaters)
                    .backwards_get_nexts(rules.backwards_get_nexts)
                    .strict_oids(rules.report_oid_mismatch_errors)
                    .reassemble(&oids, response)
                    .map(Reply::Bulk)
            }
        }
    }
}

fn check_len(request: &[VarBind], response: &[VarBind]) -> Result<()> {
    if request.len() != response.len() {
        return Err(Error::response_invalid(
            ResponseInvalidCode::ReqResOidNoMatch,
            format!(
                "requested {} varbinds but response has {}",
                request.len(),
                response.len()
            ),
        ));
    }
    Ok(())
}

fn check_oids(request: &[VarBind], response: &[VarBind]) -> Result<()> {
    for (req, res) in request.iter().zip(response) {
        if req.oid != res.oid {
            return Err(Error::response_invalid(
                ResponseInvalidCode::ReqResOidNoMatch,
                format!("OID {} in request does not match OID {} in response", req.oid, res.oid),
            ));
        }
    }
    Ok(())
}
