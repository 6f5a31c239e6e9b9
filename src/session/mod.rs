//! SNMP manager sessions.
//!
//! A [`Session`] is a cheap-to-clone handle onto one spawned task that owns the
//! socket, the outstanding requests and, for SNMPv3, the USM state of one
//! agent. Every operation is an `async fn` that hands a command to that task
//! and waits for the reply, so any number of requests may be in flight at
//! once while replies are still processed one at a time.
//!
//! # Example
//!
//! ```rust,no_run
//! # use snmp_session::{Codec, Session, oid};
//! # async fn example(codec: impl Codec) -> snmp_session::Result<()> {
//! let session = Session::v2c("192.168.1.1")
//!     .community(b"public")
//!     .codec(codec)
//!     .connect()
//!     .await?;
//!
//! let varbinds = session.get(&[oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)]).await?;
//! println!("{}", varbinds[0]);
//! session.close();
//! # Ok(())
//! # }
//! ```

mod builder;
mod bulk;
mod config;
mod engine;
mod registry;
mod shape;
mod table;
mod walk;

pub use builder::{V1SessionBuilder, V2cSessionBuilder, V3AuthPrivSessionBuilder, V3AuthSessionBuilder, V3SessionBuilder};
pub use bulk::{BulkReassembler, BulkResult};
pub use config::{BulkOptions, IdBits, SessionConfig, TrapOptions, TrapType};
pub use table::{Cell, Coercion, ColumnSpec, Row, Table, TableBuilder, TableOptions};

use std::future::poll_fn;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tracing::instrument;

use crate::codec::Codec;
use crate::error::{Error, ResponseInvalidCode, Result};
use crate::oid::Oid;
use crate::transport::Transport;
use crate::varbind::VarBind;
use crate::version::Version;
use engine::{Engine, Operation, TrapRequest};
use registry::Responder;
use shape::Reply;

/// Largest datagram a session will receive.
const RECV_BUFFER_SIZE: usize = 65535;

/// Capacity of the session event channel.
const EVENT_CAPACITY: usize = 64;

/// Session-wide notifications not tied to a single request.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// The socket failed to receive.
    SocketError(Arc<Error>),
    /// A datagram could not be decoded. Carries [`Error::Processing`].
    Processing(Arc<Error>),
}

enum Command {
    Request { op: Operation, reply: Responder },
    Trap {
        trap: TrapRequest,
        reply: oneshot::Sender<Result<()>>,
    },
    Close,
}

/// Handle to a running SNMP session.
///
/// Cloning is cheap; all clones drive the same session. The session stops
/// when [`close`](Self::close) is called or the last handle is dropped,
/// failing every outstanding request with [`Error::SessionClosed`].
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    commands: mpsc::UnboundedSender<Command>,
    host: IpAddr,
    local_addr: SocketAddr,
    config: SessionConfig,
    activity: watch::Receiver<bool>,
    events: broadcast::Sender<SessionEvent>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("target", &self.target())
            .field("version", &self.version())
            .field("local_addr", &self.inner.local_addr)
            .finish()
    }
}

impl Session {
    /// Spawn the session task on `transport`.
    ///
    /// Must be called from within a tokio runtime.
    pub(crate) fn spawn<T: Transport>(
        transport: T,
        host: IpAddr,
        config: SessionConfig,
        codec: Arc<dyn Codec>,
    ) -> Result<Self> {
        let (commands, command_rx) = mpsc::unbounded_channel();
        let (activity_tx, activity) = watch::channel(false);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        let local_addr = transport.local_addr();

        let engine = Engine::new(
            config.clone(),
            host,
            local_addr,
            codec,
            activity_tx,
            events.clone(),
        )?;

        tracing::debug!(
            target: "snmp_session::session",
            { snmp.target = %SocketAddr::new(host, config.port), snmp.local_addr = %local_addr, snmp.version = %config.version },
            "session started"
        );
        tokio::spawn(run(engine, transport, command_rx));

        Ok(Self {
            inner: Arc::new(SessionInner {
                commands,
                host,
                local_addr,
                config,
                activity,
                events,
            }),
        })
    }

    /// Agent address requests are sent to.
    pub fn target(&self) -> SocketAddr {
        SocketAddr::new(self.inner.host, self.inner.config.port)
    }

    /// Local socket address.
    pub fn local_addr(&self) -> SocketAddr {
        self.inner.local_addr
    }

    pub fn version(&self) -> Version {
        self.inner.config.version
    }

    pub fn config(&self) -> &SessionConfig {
        &self.inner.config
    }

    /// True while at least one request is outstanding.
    pub fn is_active(&self) -> bool {
        *self.inner.activity.borrow()
    }

    /// Watch the active/idle state of the session's socket.
    pub fn activity(&self) -> watch::Receiver<bool> {
        self.inner.activity.clone()
    }

    /// Subscribe to session-wide events.
    pub fn events(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.events.subscribe()
    }

    /// Stop the session.
    ///
    /// Every outstanding request fails with [`Error::SessionClosed`] and the
    /// socket is released. Later operations fail the same way.
    pub fn close(&self) {
        let _ = self.inner.commands.send(Command::Close);
    }

    async fn submit(&self, op: Operation) -> Result<Reply> {
        let (reply, rx) = oneshot::channel();
        self.inner
            .commands
            .send(Command::Request { op, reply })
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }

    async fn submit_varbinds(&self, op: Operation) -> Result<Vec<VarBind>> {
        match self.submit(op).await? {
            Reply::VarBinds(varbinds) => Ok(varbinds),
            Reply::Bulk(_) => Err(unexpected_reply()),
        }
    }

    /// GET the given OIDs.
    ///
    /// The reply must have one varbind per requested OID. Exception values
    /// (noSuchObject, noSuchInstance) are returned as varbinds.
    #[instrument(skip(self, oids), err, fields(snmp.target = %self.target(), snmp.pdu_type = "GetRequest", snmp.oid_count = oids.len()))]
    pub async fn get(&self, oids: &[Oid]) -> Result<Vec<VarBind>> {
        self.submit_varbinds(Operation::Get(oids.to_vec())).await
    }

    /// GETNEXT for each of the given OIDs.
    #[instrument(skip(self, oids), err, fields(snmp.target = %self.target(), snmp.pdu_type = "GetNextRequest", snmp.oid_count = oids.len()))]
    pub async fn get_next(&self, oids: &[Oid]) -> Result<Vec<VarBind>> {
        self.submit_varbinds(Operation::GetNext(oids.to_vec())).await
    }

    /// GETBULK. Not available under SNMPv1.
    ///
    /// # Example
    ///
    /// ```rust,no_run
    /// # use snmp_session::{BulkOptions, Session, oid};
    /// # async fn example(session: Session) -> snmp_session::Result<()> {
    /// // sysUpTime once, then up to 10 interface descriptions
    /// let result = session
    ///     .get_bulk(
    ///         &[oid!(1, 3, 6, 1, 2, 1, 1, 3), oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 2)],
    ///         BulkOptions { non_repeaters: 1, max_repetitions: 10 },
    ///     )
    ///     .await?;
    /// for vb in &result.repeaters[0] {
    ///     println!("{}", vb);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    #[instrument(skip(self, oids), err, fields(
        snmp.target = %self.target(),
        snmp.pdu_type = "GetBulkRequest",
        snmp.oid_count = oids.len(),
        snmp.non_repeaters = options.non_repeaters,
        snmp.max_repetitions = options.max_repetitions
    ))]
    pub async fn get_bulk(&self, oids: &[Oid], options: BulkOptions) -> Result<BulkResult> {
        let op = Operation::GetBulk {
            oids: oids.to_vec(),
            options,
        };
        match self.submit(op).await? {
            Reply::Bulk(result) => Ok(result),
            Reply::VarBinds(_) => Err(unexpected_reply()),
        }
    }

    /// SET the given varbinds.
    #[instrument(skip(self, varbinds), err, fields(snmp.target = %self.target(), snmp.pdu_type = "SetRequest", snmp.oid_count = varbinds.len()))]
    pub async fn set(&self, varbinds: &[VarBind]) -> Result<Vec<VarBind>> {
        self.submit_varbinds(Operation::Set(varbinds.to_vec())).await
    }

    /// Send an acknowledged notification to the trap port.
    ///
    /// sysUpTime.0 and snmpTrapOID.0 are prepended to `varbinds`. Not
    /// available under SNMPv1.
    #[instrument(skip(self, trap, varbinds, options), err, fields(snmp.target = %self.target(), snmp.pdu_type = "InformRequest"))]
    pub async fn inform(
        &self,
        trap: impl Into<TrapType>,
        varbinds: Vec<VarBind>,
        options: TrapOptions,
    ) -> Result<Vec<VarBind>> {
        self.submit_varbinds(Operation::Inform {
            trap: trap.into(),
            varbinds,
            options,
        })
        .await
    }

    /// Send an unacknowledged notification to the trap port.
    ///
    /// Completes once the datagram has been sent; nothing is retried.
    #[instrument(skip(self, trap, varbinds, options), err, fields(snmp.target = %self.target(), snmp.pdu_type = "Trap"))]
    pub async fn trap(
        &self,
        trap: impl Into<TrapType>,
        varbinds: Vec<VarBind>,
        options: TrapOptions,
    ) -> Result<()> {
        let (reply, rx) = oneshot::channel();
        let trap = TrapRequest {
            trap: trap.into(),
            varbinds,
            options,
        };
        self.inner
            .commands
            .send(Command::Trap { trap, reply })
            .map_err(|_| Error::SessionClosed)?;
        rx.await.map_err(|_| Error::SessionClosed)?
    }
}

fn unexpected_reply() -> Error {
    Error::response_invalid(ResponseInvalidCode::ResponseNotHandled, "reply shape does not match request")
}

enum Event {
    Command(Option<Command>),
    Expired(i32),
    Received(Result<(usize, SocketAddr)>),
}

/// The session task: one loop owning the engine and the socket.
async fn run<T: Transport>(
    mut engine: Engine,
    transport: T,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    let mut buf = vec![0u8; RECV_BUFFER_SIZE];

    loop {
        let event = tokio::select! {
            command = commands.recv() => Event::Command(command),
            Some(id) = poll_fn(|cx| engine.poll_expired(cx)), if engine.has_pending() => Event::Expired(id),
            received = transport.recv_from(&mut buf) => Event::Received(received),
        };

        let transmit = match event {
            Event::Command(Some(Command::Request { op, reply })) => engine.request(op, reply),
            Event::Command(Some(Command::Trap { trap, reply })) => engine.trap(trap, reply),
            Event::Command(Some(Command::Close)) | Event::Command(None) => {
                engine.close();
                break;
            }
            Event::Expired(id) => engine.expired(id),
            Event::Received(Ok((len, source))) => {
                tracing::trace!(target: "snmp_session::session", { snmp.source = %source, snmp.bytes = len }, "datagram received");
                engine.datagram(Bytes::copy_from_slice(&buf[..len]), source)
            }
            Event::Received(Err(e)) => {
                engine.socket_error(e);
                None
            }
        };

        if let Some(transmit) = transmit {
            match transport.send_to(&transmit.data, transmit.target).await {
                Ok(()) => engine.sent(transmit.purpose),
                Err(e) => engine.send_failed(transmit.purpose, e),
            }
        }
    }

    tracing::debug!(target: "snmp_session::session", { snmp.local_addr = %transport.local_addr() }, "session stopped");
}
