//! Typestate builders for SNMP sessions.
//!
//! The factory fixes the protocol version: [`Session::v1`], [`Session::v2c`]
//! and [`Session::v3`]. Under v3, calling `.privacy()` before `.auth()` is a
//! compile error, not a runtime failure.
//!
//! # Examples
//!
//! ```rust,no_run
//! # use snmp_session::{Codec, Session};
//! # use std::time::Duration;
//! # async fn example(codec: impl Codec + Clone) -> snmp_session::Result<()> {
//! // SNMPv2c
//! let session = Session::v2c("192.168.1.1")
//!     .community(b"public")
//!     .timeout(Duration::from_secs(2))
//!     .retries(3)
//!     .codec(codec.clone())
//!     .connect()
//!     .await?;
//!
//! // SNMPv3 with auth and privacy
//! let session = Session::v3("192.168.1.1", "admin")
//!     .auth(snmp_session::v3::AuthProtocol::Sha256, "authpass123")
//!     .privacy(snmp_session::v3::PrivProtocol::Aes128, "privpass123")
//!     .codec(codec)
//!     .connect()
//!     .await?;
//! # Ok(())
//! # }
//! ```

use std::net::{IpAddr, SocketAddr, ToSocketAddrs};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;

use super::Session;
use super::config::{IdBits, SessionConfig};
use crate::codec::Codec;
use crate::error::{Error, Result};
use crate::transport::{Transport, TransportKind, UdpTransport};
use crate::v3::{AuthProtocol, PrivProtocol, UsmUser};
use crate::version::Version;

/// Configuration shared by all builder types.
struct BaseConfig {
    host: String,
    config: SessionConfig,
    codec: Option<Arc<dyn Codec>>,
}

impl BaseConfig {
    fn new(host: impl Into<String>, version: Version) -> Self {
        Self {
            host: host.into(),
            config: SessionConfig {
                version,
                ..SessionConfig::default()
            },
            codec: None,
        }
    }

    /// Resolve the agent host, preferring the configured address family.
    fn resolve_host(&self) -> Result<IpAddr> {
        if let Ok(ip) = self.host.parse::<IpAddr>() {
            return Ok(ip);
        }

        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.config.port)
            .to_socket_addrs()
            .map_err(|e| Error::Io {
                target: None,
                source: e,
            })?
            .collect();

        let wants_v6 = self.config.transport == TransportKind::Udp6;
        addrs
            .iter()
            .find(|a| a.is_ipv6() == wants_v6)
            .or_else(|| addrs.first())
            .map(|a| a.ip())
            .ok_or_else(|| Error::Io {
                target: None,
                source: std::io::Error::new(
                    std::io::ErrorKind::NotFound,
                    "could not resolve address",
                ),
            })
    }

    fn bind_addr(&self) -> SocketAddr {
        let ip = self
            .config
            .source_address
            .unwrap_or_else(|| self.config.transport.unspecified());
        SocketAddr::new(ip, self.config.source_port)
    }

    fn connect(self) -> Result<Session> {
        let transport = UdpTransport::bind(self.bind_addr())?;
        self.build(transport)
    }

    fn build<T: Transport>(self, transport: T) -> Result<Session> {
        if !self.config.backoff.is_finite() {
            return Err(Error::request_invalid("backoff factor must be finite"));
        }
        let host = self.resolve_host()?;
        let codec = self
            .codec
            .ok_or_else(|| Error::request_invalid("no codec configured"))?;
        Session::spawn(transport, host, self.config, codec)
    }
}

// Macro to implement common builder methods
macro_rules! impl_common_methods {
    ($builder:ty) => {
        impl $builder {
            /// Set the agent port for requests (default: 161).
            pub fn port(mut self, port: u16) -> Self {
                self.base.config.port = port;
                self
            }

            /// Set the agent port for traps and informs (default: 162).
            pub fn trap_port(mut self, port: u16) -> Self {
                self.base.config.trap_port = port;
                self
            }

            /// Set the number of retransmissions after the first send (default: 1).
            pub fn retries(mut self, retries: u32) -> Self {
                self.base.config.retries = retries;
                self
            }

            /// Set the wait before the first retransmission (default: 5 seconds).
            pub fn timeout(mut self, timeout: Duration) -> Self {
                self.base.config.timeout = timeout;
                self
            }

            /// Multiply the timeout by `factor` on every retransmission.
            ///
            /// Values below 1.0 are treated as 1.0; an infinite factor fails
            /// `connect`/`build`. Each wait is capped at one year.
            pub fn backoff(mut self, factor: f64) -> Self {
                self.base.config.backoff = factor.max(1.0);
                self
            }

            /// Choose the socket address family (default: UDP over IPv4).
            pub fn transport(mut self, kind: TransportKind) -> Self {
                self.base.config.transport = kind;
                self
            }

            /// Bind the local socket to this address.
            pub fn source_address(mut self, addr: IpAddr) -> Self {
                self.base.config.source_address = Some(addr);
                self
            }

            /// Bind the local socket to this port (default: ephemeral).
            pub fn source_port(mut self, port: u16) -> Self {
                self.base.config.source_port = port;
                self
            }

            /// Set the request id width (default: 32 bits).
            pub fn id_bits(mut self, bits: IdBits) -> Self {
                self.base.config.id_bits = bits;
                self
            }

            /// Tolerate walk results that do not move forward (default: true).
            pub fn backwards_get_nexts(mut self, allow: bool) -> Self {
                self.base.config.backwards_get_nexts = allow;
                self
            }

            /// Fail GET/SET replies whose OIDs differ from the request (default: false).
            pub fn report_oid_mismatch_errors(mut self, report: bool) -> Self {
                self.base.config.report_oid_mismatch_errors = report;
                self
            }

            /// Cap the number of requests one walk may issue (default: 10 000).
            pub fn max_walk_requests(mut self, max: usize) -> Self {
                self.base.config.max_walk_requests = max;
                self
            }

            /// Set the wire codec and security provider. Required.
            pub fn codec(mut self, codec: impl Codec) -> Self {
                self.base.codec = Some(Arc::new(codec));
                self
            }

            /// Set a shared wire codec.
            pub fn shared_codec(mut self, codec: Arc<dyn Codec>) -> Self {
                self.base.codec = Some(codec);
                self
            }
        }
    };
}

// Macro to implement V3-specific context method
macro_rules! impl_context {
    ($builder:ty) => {
        impl $builder {
            /// Set the context name carried in scoped PDUs (default: empty).
            pub fn context(mut self, context: impl Into<String>) -> Self {
                self.base.config.context = context.into();
                self
            }
        }
    };
}

// Macro to implement connect/build for every builder
macro_rules! impl_connect {
    ($builder:ty) => {
        impl $builder {
            /// Bind a UDP socket and start the session.
            ///
            /// Must be called from within a tokio runtime.
            pub async fn connect(self) -> Result<Session> {
                self.finish().connect()
            }

            /// Start the session on a pre-supplied transport.
            ///
            /// Must be called from within a tokio runtime.
            pub fn build<T: Transport>(self, transport: T) -> Result<Session> {
                self.finish().build(transport)
            }
        }
    };
}

// ============================================================================
// Community builders
// ============================================================================

/// Builder for SNMPv1 sessions.
///
/// Created via [`Session::v1()`].
pub struct V1SessionBuilder {
    base: BaseConfig,
}

impl V1SessionBuilder {
    pub(crate) fn new(host: impl Into<String>) -> Self {
        Self {
            base: BaseConfig::new(host, Version::V1),
        }
    }

    /// Set the community string (default: "public").
    pub fn community(mut self, community: &[u8]) -> Self {
        self.base.config.community = Bytes::copy_from_slice(community);
        self
    }

    fn finish(self) -> BaseConfig {
        self.base
    }
}

impl_common_methods!(V1SessionBuilder);
impl_connect!(V1SessionBuilder);

/// Builder for SNMPv2c sessions.
///
/// Created via [`Session::v2c()`].
pub struct V2cSessionBuilder {
    base: BaseConfig,
}

impl V2cSessionBuilder {
    pub(crate) fn new(host: impl Into<String>) -> Self {
        Self {
            base: BaseConfig::new(host, Version::V2c),
        }
    }

    /// Set the community string (default: "public").
    pub fn community(mut self, community: &[u8]) -> Self {
        self.base.config.community = Bytes::copy_from_slice(community);
        self
    }

    fn finish(self) -> BaseConfig {
        self.base
    }
}

impl_common_methods!(V2cSessionBuilder);
impl_connect!(V2cSessionBuilder);

// ============================================================================
// V3 builders (typestate progression)
// ============================================================================

/// Builder for SNMPv3 sessions with noAuthNoPriv security.
///
/// Created via [`Session::v3()`]. Call [`.auth()`](Self::auth) to add authentication.
pub struct V3SessionBuilder {
    base: BaseConfig,
    username: String,
}

impl V3SessionBuilder {
    pub(crate) fn new(host: impl Into<String>, username: impl Into<String>) -> Self {
        Self {
            base: BaseConfig::new(host, Version::V3),
            username: username.into(),
        }
    }

    /// Add authentication protocol and password.
    ///
    /// This transitions to [`V3AuthSessionBuilder`] with authNoPriv security level.
    pub fn auth(self, protocol: AuthProtocol, password: impl Into<String>) -> V3AuthSessionBuilder {
        V3AuthSessionBuilder {
            base: self.base,
            user: UsmUser::new(self.username).auth(protocol, password),
        }
    }

    fn finish(mut self) -> BaseConfig {
        self.base.config.user = Some(UsmUser::new(self.username));
        self.base
    }
}

impl_common_methods!(V3SessionBuilder);
impl_context!(V3SessionBuilder);
impl_connect!(V3SessionBuilder);

/// Builder for SNMPv3 sessions with authNoPriv security.
///
/// Created from [`V3SessionBuilder::auth()`]. Call [`.privacy()`](Self::privacy)
/// to add encryption.
pub struct V3AuthSessionBuilder {
    base: BaseConfig,
    user: UsmUser,
}

impl V3AuthSessionBuilder {
    /// Add privacy (encryption) protocol and password.
    ///
    /// This transitions to [`V3AuthPrivSessionBuilder`] with authPriv security level.
    pub fn privacy(
        self,
        protocol: PrivProtocol,
        password: impl Into<String>,
    ) -> V3AuthPrivSessionBuilder {
        V3AuthPrivSessionBuilder {
            base: self.base,
            user: self.user.privacy(protocol, password),
        }
    }

    fn finish(mut self) -> BaseConfig {
        self.base.config.user = Some(self.user);
        self.base
    }
}

impl_common_methods!(V3AuthSessionBuilder);
impl_context!(V3AuthSessionBuilder);
impl_connect!(V3AuthSessionBuilder);

/// Builder for SNMPv3 sessions with authPriv security.
///
/// Created from [`V3AuthSessionBuilder::privacy()`].
pub struct V3AuthPrivSessionBuilder {
    base: BaseConfig,
    user: UsmUser,
}

impl V3AuthPrivSessionBuilder {
    fn finish(mut self) -> BaseConfig {
        self.base.config.user = Some(self.user);
        self.base
    }
}

impl_common_methods!(V3AuthPrivSessionBuilder);
impl_context!(V3AuthPrivSessionBuilder);
impl_connect!(V3AuthPrivSessionBuilder);

// ============================================================================
// Entry points on Session
// ============================================================================

impl Session {
    /// Create an SNMPv1 session builder.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use snmp_session::{Codec, Session};
    /// # async fn example(codec: impl Codec) -> snmp_session::Result<()> {
    /// let session = Session::v1("192.168.1.1")
    ///     .community(b"public")
    ///     .codec(codec)
    ///     .connect()
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub fn v1(host: impl Into<String>) -> V1SessionBuilder {
        V1SessionBuilder::new(host)
    }

    /// Create an SNMPv2c session builder.
    pub fn v2c(host: impl Into<String>) -> V2cSessionBuilder {
        V2cSessionBuilder::new(host)
    }

    /// Create an SNMPv3 session builder.
    ///
    /// The session starts with noAuthNoPriv security level. Use
    /// [`.auth()`](V3SessionBuilder::auth) to add authentication, and
    /// [`.privacy()`](V3AuthSessionBuilder::privacy) to add encryption.
    pub fn v3(host: impl Into<String>, username: impl Into<String>) -> V3SessionBuilder {
        V3SessionBuilder::new(host, username)
    }
}
