//! Variable binding (VarBind) type.
//!
//! A VarBind pairs an OID with a value.

use crate::oid::Oid;
use crate::value::{Exception, Value};

/// Variable binding - an OID-value pair.
#[derive(Debug, Clone, PartialEq)]
pub struct VarBind {
    /// The object identifier.
    pub oid: Oid,
    /// The value.
    pub value: Value,
}

impl VarBind {
    /// Create a new VarBind.
    pub fn new(oid: Oid, value: Value) -> Self {
        Self { oid, value }
    }

    /// Create a VarBind with a NULL value (for GET requests).
    pub fn null(oid: Oid) -> Self {
        Self {
            oid,
            value: Value::Null,
        }
    }

    /// The exception marker carried instead of a value, if any.
    pub fn exception(&self) -> Option<Exception> {
        self.value.exception()
    }

    /// Returns true if the value is one of the exception markers.
    pub fn is_exception(&self) -> bool {
        self.value.is_exception()
    }
}

impl std::fmt::Display for VarBind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} = {}", self.oid, self.value)
    }
}

/// NULL-valued varbinds for a list of OIDs.
pub fn null_varbinds(oids: &[Oid]) -> Vec<VarBind> {
    oids.iter().cloned().map(VarBind::null).collect()
}
