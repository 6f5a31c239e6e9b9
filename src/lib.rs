// The Error enum carries OIDs and addresses inline for diagnostics.
#![allow(clippy::result_large_err)]

//! # snmp-session
//!
//! Async SNMP manager sessions for Tokio.
//!
//! A [`Session`] talks to one agent. It owns request-id allocation,
//! retransmission with backoff, response validation, SNMPv3 USM engine
//! discovery and time resynchronisation, GETBULK reassembly, MIB walks and
//! conceptual table retrieval. Message encoding and decoding (and with it
//! USM authentication and privacy) is supplied through the [`Codec`] trait.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use snmp_session::{Codec, Session, oid};
//! use std::time::Duration;
//!
//! async fn run(codec: impl Codec) -> snmp_session::Result<()> {
//!     let session = Session::v2c("192.168.1.1")
//!         .community(b"public")
//!         .timeout(Duration::from_secs(2))
//!         .retries(2)
//!         .codec(codec)
//!         .connect()
//!         .await?;
//!
//!     let varbinds = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await?;
//!     println!("sysDescr: {}", varbinds[0].value);
//!
//!     for vb in session.subtree(&oid!(1, 3, 6, 1, 2, 1, 1), 10).await? {
//!         println!("{}", vb);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## SNMPv3
//!
//! ```rust,no_run
//! use snmp_session::{Codec, Session, oid};
//! use snmp_session::v3::{AuthProtocol, PrivProtocol};
//!
//! async fn run(codec: impl Codec) -> snmp_session::Result<()> {
//!     let session = Session::v3("192.168.1.1", "admin")
//!         .auth(AuthProtocol::Sha256, "authpass123")
//!         .privacy(PrivProtocol::Aes128, "privpass123")
//!         .codec(codec)
//!         .connect()
//!         .await?;
//!
//!     // The first request triggers engine discovery transparently.
//!     let varbinds = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 5, 0)]).await?;
//!     println!("{}", varbinds[0]);
//!     Ok(())
//! }
//! ```

pub mod ber;
pub mod codec;
pub mod error;
pub mod message;
pub mod oid;
pub mod pdu;
pub mod prelude;
pub mod session;
pub mod transport;
pub mod v3;
pub mod value;
pub mod varbind;
pub mod version;

pub(crate) mod util;

pub use codec::Codec;
pub use error::{
    DecodeErrorKind, Error, ErrorStatus, OidErrorKind, ResponseInvalidCode, Result,
};
pub use message::Message;
pub use oid::{Oid, oid_follows, oid_in_subtree};
pub use pdu::{GenericTrap, Pdu, PduType, TrapV1Pdu};
pub use session::{
    BulkOptions, BulkReassembler, BulkResult, Cell, Coercion, ColumnSpec, IdBits, Row, Session,
    SessionConfig, SessionEvent, Table, TableBuilder, TableOptions, TrapOptions, TrapType,
    V1SessionBuilder, V2cSessionBuilder, V3AuthPrivSessionBuilder, V3AuthSessionBuilder,
    V3SessionBuilder,
};
pub use transport::{Transport, TransportKind, UdpTransport};
pub use v3::{AuthProtocol, PrivProtocol, SecurityLevel, UsmUser};
pub use value::{Exception, Value};
pub use varbind::VarBind;
pub use version::Version;
