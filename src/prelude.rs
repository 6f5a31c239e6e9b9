//! Commonly used types in one import.
//!
//! ```rust,no_run
//! use snmp_session::prelude::*;
//! ```
//!
//! Brings in [`Session`], [`Oid`], [`Value`], [`VarBind`], [`Error`],
//! [`Result`], the option structs for bulk, trap and table operations, and
//! the [`oid!`] macro.

pub use crate::codec::Codec;
pub use crate::error::{Error, Result};
pub use crate::oid::Oid;
pub use crate::session::{BulkOptions, Session, TableOptions, TrapOptions, TrapType};
pub use crate::v3::{AuthProtocol, PrivProtocol};
pub use crate::value::Value;
pub use crate::varbind::VarBind;
pub use crate::version::Version;

#[doc(no_inline)]
pub use crate::oid;
