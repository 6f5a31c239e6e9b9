//! Protocol state machine of a session.
//!
//! [`Engine`] never performs I/O. The session task feeds it commands, fired
//! timers and received datagrams; it answers with the datagram to send next,
//! if any. This keeps every protocol decision testable without a socket.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::task::{Context, Poll};

use bytes::Bytes;
use tokio::sync::{broadcast, oneshot, watch};
use tokio::time::Instant;

use super::SessionEvent;
use super::config::{BulkOptions, SessionConfig, TrapOptions, TrapType};
use super::registry::{Expiry, PendingRequest, RequestRegistry, Responder};
use super::shape::{ResponseShape, ShapeRules};
use crate::codec::Codec;
use crate::error::{Error, ResponseInvalidCode, Result};
use crate::message::{Message, ScopedPduData, TrapV1Message};
use crate::oid::Oid;
use crate::pdu::{GenericTrap, Pdu, PduType, TrapV1Pdu, notification_varbinds};
use crate::util::random_u32;
use crate::v3::{ReportDecision, SecurityCoordinator, SecurityParameters, report_error};
use crate::varbind::VarBind;
use crate::version::Version;

/// Default v1 enterprise (`enterprises`).
const DEFAULT_ENTERPRISE: [u32; 6] = [1, 3, 6, 1, 4, 1];

/// Random draws tried before giving up on finding a free request id.
const MAX_ID_ATTEMPTS: usize = 64;

/// A request submitted to the session task.
#[derive(Debug)]
pub(crate) enum Operation {
    Get(Vec<Oid>),
    GetNext(Vec<Oid>),
    GetBulk { oids: Vec<Oid>, options: BulkOptions },
    Set(Vec<VarBind>),
    Inform {
        trap: TrapType,
        varbinds: Vec<VarBind>,
        options: TrapOptions,
    },
}

impl Operation {
    fn name(&self) -> &'static str {
        match self {
            Operation::Get(_) => "GetRequest",
            Operation::GetNext(_) => "GetNextRequest",
            Operation::GetBulk { .. } => "GetBulkRequest",
            Operation::Set(_) => "SetRequest",
            Operation::Inform { .. } => "InformRequest",
        }
    }
}

/// A fire-and-forget notification.
#[derive(Debug)]
pub(crate) struct TrapRequest {
    pub trap: TrapType,
    pub varbinds: Vec<VarBind>,
    pub options: TrapOptions,
}

/// What a sent datagram was for.
#[derive(Debug)]
pub(crate) enum Purpose {
    Request(i32),
    /// A trap; the caller is told once the datagram is out.
    Notify(oneshot::Sender<Result<()>>),
}

/// A datagram the session task must send.
#[derive(Debug)]
pub(crate) struct Transmit {
    pub data: Bytes,
    pub target: SocketAddr,
    pub purpose: Purpose,
}

pub(crate) struct Engine {
    config: SessionConfig,
    host: IpAddr,
    local_addr: SocketAddr,
    codec: Arc<dyn Codec>,
    registry: RequestRegistry,
    security: Option<SecurityCoordinator>,
    events: broadcast::Sender<SessionEvent>,
    started: Instant,
}

impl Engine {
    pub(crate) fn new(
        config: SessionConfig,
        host: IpAddr,
        local_addr: SocketAddr,
        codec: Arc<dyn Codec>,
        activity: watch::Sender<bool>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Result<Self> {
        let security = match (config.version, &config.user) {
            (Version::V3, Some(user)) => Some(SecurityCoordinator::new(
                user.clone(),
                config.context.clone(),
                SecurityCoordinator::generate_local_engine_id()?,
            )),
            (Version::V3, None) => {
                return Err(Error::request_invalid("SNMPv3 session requires a user"));
            }
            _ => None,
        };

        Ok(Self {
            registry: RequestRegistry::new(config.backoff, activity),
            config,
            host,
            local_addr,
            codec,
            security,
            events,
            started: Instant::now(),
        })
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.registry.is_empty()
    }

    pub(crate) fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<Option<i32>> {
        self.registry.poll_expired(cx)
    }

    fn target(&self, port: u16) -> SocketAddr {
        SocketAddr::new(self.host, port)
    }

    fn rules(&self) -> ShapeRules {
        ShapeRules {
            backwards_get_nexts: self.config.backwards_get_nexts,
            report_oid_mismatch_errors: self.config.report_oid_mismatch_errors,
        }
    }

    /// A random id, masked to the configured width, not currently outstanding.
    fn allocate_id(&self) -> Result<i32> {
        let mask = self.config.id_bits.mask();
        for _ in 0..MAX_ID_ATTEMPTS {
            let id = (random_u32()? & mask) as i32;
            if !self.registry.contains(id) {
                return Ok(id);
            }
        }
        Err(Error::request_invalid(format!(
            "no free request id after {MAX_ID_ATTEMPTS} attempts ({} outstanding)",
            self.registry.len()
        )))
    }

    fn up_time(&self, options: &TrapOptions) -> u32 {
        options.up_time.unwrap_or_else(|| {
            let hundredths = self.started.elapsed().as_millis() / 10;
            u32::try_from(hundredths).unwrap_or(u32::MAX)
        })
    }

    /// Start a request. Local failures are answered immediately.
    pub(crate) fn request(&mut self, op: Operation, responder: Responder) -> Option<Transmit> {
        match self.start_request(op) {
            Ok(started) => {
                let StartedRequest {
                    id,
                    encoded,
                    shape,
                    request_varbinds,
                    port,
                    probe_for,
                } = started;
                let mut pending = PendingRequest::new(
                    id,
                    encoded.clone(),
                    shape,
                    request_varbinds,
                    responder,
                    self.config.retries,
                    self.config.timeout,
                    port,
                );
                if let Some(original) = probe_for {
                    pending = pending.with_original(original, true, 0);
                }
                self.registry.register(pending);
                Some(Transmit {
                    data: encoded,
                    target: self.target(port),
                    purpose: Purpose::Request(id),
                })
            }
            Err(e) => {
                let _ = responder.send(Err(e));
                None
            }
        }
    }

    fn start_request(&self, op: Operation) -> Result<StartedRequest> {
        let version = self.config.version;
        let name = op.name();
        let id = self.allocate_id()?;

        let (pdu, shape, port) = match op {
            Operation::Get(oids) => {
                require_oids(&oids)?;
                (Pdu::get_request(id, &oids), ResponseShape::Exact, self.config.port)
            }
            Operation::GetNext(oids) => {
                require_oids(&oids)?;
                (Pdu::get_next_request(id, &oids), ResponseShape::Next, self.config.port)
            }
            Operation::GetBulk { oids, options } => {
                if version == Version::V1 {
                    return Err(Error::request_invalid("GetBulk not allowed in SNMPv1"));
                }
                require_oids(&oids)?;
                let non_repeaters = options.non_repeaters as usize;
                if non_repeaters > oids.len() {
                    return Err(Error::request_invalid(format!(
                        "non-repeaters ({}) exceeds the number of OIDs ({})",
                        non_repeaters,
                        oids.len()
                    )));
                }
                let pdu = Pdu::get_bulk(
                    id,
                    clamp_i32(options.non_repeaters),
                    clamp_i32(options.max_repetitions),
                    &oids,
                );
                (pdu, ResponseShape::Bulk { non_repeaters }, self.config.port)
            }
            Operation::Set(varbinds) => {
                if varbinds.is_empty() {
                    return Err(Error::request_invalid("no varbinds to set"));
                }
                (Pdu::set_request(id, varbinds), ResponseShape::Exact, self.config.port)
            }
            Operation::Inform {
                trap,
                varbinds,
                options,
            } => {
                if version == Version::V1 {
                    return Err(Error::request_invalid("Inform not allowed in SNMPv1"));
                }
                let varbinds =
                    notification_varbinds(self.up_time(&options), trap.notification_oid(), varbinds);
                (Pdu::inform_request(id, varbinds), ResponseShape::Inform, self.config.trap_port)
            }
        };

        let request_varbinds = pdu.varbinds.clone();
        let (message, user, probe_for) = match &self.security {
            Some(security) => match security.request_message(pdu.clone()) {
                Some(message) => (message, Some(security.user()), None),
                None => {
                    tracing::debug!(target: "snmp_session::engine", { snmp.request_id = id }, "sending USM discovery probe");
                    (Message::discovery(id), None, Some(pdu))
                }
            },
            None => (
                Message::community(version, self.config.community.clone(), pdu),
                None,
                None,
            ),
        };
        let encoded = self.codec.encode(&message, user)?;

        tracing::trace!(
            target: "snmp_session::engine",
            { snmp.request_id = id, snmp.pdu_type = name, snmp.port = port, snmp.bytes = encoded.len() },
            "request built"
        );

        Ok(StartedRequest {
            id,
            encoded,
            shape,
            request_varbinds,
            port,
            probe_for,
        })
    }

    /// Build and encode a trap.
    pub(crate) fn trap(
        &mut self,
        trap: TrapRequest,
        reply: oneshot::Sender<Result<()>>,
    ) -> Option<Transmit> {
        match self.build_trap(trap) {
            Ok(data) => Some(Transmit {
                data,
                target: self.target(self.config.trap_port),
                purpose: Purpose::Notify(reply),
            }),
            Err(e) => {
                let _ = reply.send(Err(e));
                None
            }
        }
    }

    fn build_trap(&self, request: TrapRequest) -> Result<Bytes> {
        let TrapRequest {
            trap,
            varbinds,
            options,
        } = request;
        let up_time = self.up_time(&options);

        let message = match self.config.version {
            Version::V1 => {
                let (enterprise, generic, specific) = match &trap {
                    TrapType::Generic(generic) => (
                        options
                            .enterprise
                            .clone()
                            .unwrap_or_else(|| Oid::from_slice(&DEFAULT_ENTERPRISE)),
                        *generic,
                        0,
                    ),
                    TrapType::Oid(oid) => {
                        let (enterprise, specific) = split_enterprise_specific(oid);
                        (enterprise, GenericTrap::EnterpriseSpecific, specific)
                    }
                };
                let agent_addr = options.agent_addr.unwrap_or_else(|| match self.local_addr.ip() {
                    IpAddr::V4(ip) if !ip.is_unspecified() => ip,
                    _ => Ipv4Addr::UNSPECIFIED,
                });
                Message::TrapV1(TrapV1Message {
                    community: self.config.community.clone(),
                    trap: TrapV1Pdu {
                        enterprise,
                        agent_addr: agent_addr.octets(),
                        generic_trap: generic.as_i32(),
                        specific_trap: specific,
                        time_stamp: up_time,
                        varbinds,
                    },
                })
            }
            version => {
                let id = self.allocate_id()?;
                let pdu = Pdu::trap_v2(
                    id,
                    notification_varbinds(up_time, trap.notification_oid(), varbinds),
                );
                match &self.security {
                    Some(security) => {
                        let message = security.trap_message(pdu);
                        return self.codec.encode(&message, Some(security.user()));
                    }
                    None => Message::community(version, self.config.community.clone(), pdu),
                }
            }
        };

        self.codec.encode(&message, None)
    }

    /// A request timer fired.
    pub(crate) fn expired(&mut self, id: i32) -> Option<Transmit> {
        match self.registry.expire(id)? {
            Expiry::Retransmit { id, data, port } => Some(Transmit {
                data,
                target: self.target(port),
                purpose: Purpose::Request(id),
            }),
            Expiry::TimedOut(req) => {
                let target = self.target(req.port);
                tracing::debug!(target: "snmp_session::engine", { snmp.request_id = id, snmp.target = %target }, "request timed out");
                let error = Error::Timeout {
                    target: Some(target),
                    elapsed: req.started.elapsed(),
                    request_id: id,
                    retries: req.sends.saturating_sub(1),
                };
                req.complete(Err(error));
                None
            }
        }
    }

    /// A datagram went out.
    pub(crate) fn sent(&mut self, purpose: Purpose) {
        if let Purpose::Notify(reply) = purpose {
            let _ = reply.send(Ok(()));
        }
    }

    /// Sending a datagram failed; the error belongs to the request that sent it.
    pub(crate) fn send_failed(&mut self, purpose: Purpose, error: Error) {
        tracing::error!(target: "snmp_session::engine", { error = %error }, "send failed");
        match purpose {
            Purpose::Request(id) => {
                if let Some(req) = self.registry.unregister(id) {
                    req.complete(Err(error));
                }
            }
            Purpose::Notify(reply) => {
                let _ = reply.send(Err(error));
            }
        }
    }

    /// Receiving failed; not tied to any request.
    pub(crate) fn socket_error(&self, error: Error) {
        tracing::error!(target: "snmp_session::engine", { error = %error }, "socket receive error");
        let _ = self.events.send(SessionEvent::SocketError(Arc::new(error)));
    }

    /// Cancel everything with "socket closed".
    pub(crate) fn close(&mut self) {
        tracing::debug!(target: "snmp_session::engine", { snmp.pending = self.registry.len() }, "closing session");
        self.registry.cancel_all(|| Error::SessionClosed);
    }

    /// Handle one received datagram.
    pub(crate) fn datagram(&mut self, data: Bytes, source: SocketAddr) -> Option<Transmit> {
        let message = match self.codec.decode(data.clone()) {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(target: "snmp_session::engine", { snmp.source = %source, error = %e }, "undecodable datagram");
                let _ = self.events.send(SessionEvent::Processing(Arc::new(Error::Processing {
                    source_addr: source,
                    data,
                    reason: e.to_string(),
                })));
                return None;
            }
        };

        let Some(id) = message.request_id() else {
            tracing::warn!(target: "snmp_session::engine", { snmp.source = %source }, "datagram without request id");
            return None;
        };
        let Some(req) = self.registry.unregister(id) else {
            tracing::warn!(target: "snmp_session::engine", { snmp.source = %source, snmp.request_id = id }, "response for unknown request id");
            return None;
        };

        match self.dispatch(message, req, source) {
            Dispatch::Done(req, result) => {
                tracing::debug!(
                    target: "snmp_session::engine",
                    { snmp.request_id = id, snmp.source = %source, ok = result.is_ok() },
                    "request completed"
                );
                req.complete(result);
                None
            }
            Dispatch::Resend(transmit) => Some(transmit),
        }
    }

    fn dispatch(
        &mut self,
        mut message: Message,
        req: PendingRequest,
        source: SocketAddr,
    ) -> Dispatch {
        if matches!(message, Message::V3(_))
            && let Some(security) = &self.security
            && let Err(e) = self.codec.process_incoming_security(&mut message, security.user())
        {
            return Dispatch::Done(req, Err(e));
        }

        if message.version() != self.config.version {
            tracing::warn!(target: "snmp_session::engine", { snmp.source = %source, version = %message.version() }, "version mismatch");
            return Dispatch::Done(
                req,
                Err(Error::response_invalid(
                    ResponseInvalidCode::VersionNoMatch,
                    "Version in request does not match version in response",
                )),
            );
        }

        let mut reported = None;
        match &message {
            Message::Community(m) if m.community != self.config.community => {
                tracing::warn!(target: "snmp_session::engine", { snmp.source = %source }, "community mismatch");
                return Dispatch::Done(
                    req,
                    Err(Error::response_invalid(
                        ResponseInvalidCode::CommunityNoMatch,
                        "Community in request does not match community in response",
                    )),
                );
            }
            Message::V3(m) => {
                if let ScopedPduData::Encrypted(_) = m.data {
                    return Dispatch::Done(
                        req,
                        Err(Error::response_invalid(
                            ResponseInvalidCode::CouldNotDecrypt,
                            "Could not decrypt scoped PDU",
                        )),
                    );
                }
                reported = Some(m.security_params.clone());
            }
            _ => {}
        }

        let Some(pdu) = message.into_pdu() else {
            return Dispatch::Done(
                req,
                Err(Error::response_invalid(
                    ResponseInvalidCode::UnknownPduType,
                    "Unknown PDU type in response",
                )),
            );
        };

        match pdu.pdu_type {
            PduType::Report => self.on_report(req, reported, pdu),
            PduType::Response => {
                if let (Some(security), Some(params)) = (self.security.as_mut(), &reported) {
                    security.refresh(params);
                }
                if pdu.error_status != 0 {
                    let status = pdu.error_status_enum();
                    tracing::debug!(target: "snmp_session::engine", { snmp.request_id = pdu.request_id, %status, index = pdu.error_index }, "agent returned error status");
                    let error = Error::RequestFailed {
                        target: Some(source),
                        status,
                        index: u32::try_from(pdu.error_index).unwrap_or(0),
                        oid: pdu.error_oid(),
                    };
                    return Dispatch::Done(req, Err(error));
                }
                let result = req.shape.apply(&req.request_varbinds, pdu.varbinds, self.rules());
                Dispatch::Done(req, result)
            }
            other => Dispatch::Done(
                req,
                Err(Error::response_invalid(
                    ResponseInvalidCode::UnknownPduType,
                    format!("Unknown PDU type '{}' in response", other),
                )),
            ),
        }
    }

    fn on_report(
        &mut self,
        mut req: PendingRequest,
        reported: Option<SecurityParameters>,
        report: Pdu,
    ) -> Dispatch {
        let (Some(security), Some(params)) = (self.security.as_mut(), reported) else {
            return Dispatch::Done(req, Err(report_error(&report)));
        };

        let can_resend = req.original_pdu.is_some() && req.allow_report;
        let allow_report = match security.on_report(&params, &report, can_resend, req.report_rounds) {
            ReportDecision::Fail(e) => return Dispatch::Done(req, Err(e)),
            ReportDecision::Resend { allow_report } => allow_report,
        };
        let Some(original) = req.original_pdu.take() else {
            return Dispatch::Done(req, Err(report_error(&report)));
        };

        match self.resend(&req, original) {
            Ok((id, encoded, pdu)) => {
                let mut pending = PendingRequest::new(
                    id,
                    encoded.clone(),
                    req.shape,
                    req.request_varbinds,
                    req.responder,
                    self.config.retries,
                    self.config.timeout,
                    req.port,
                )
                .with_original(pdu, allow_report, req.report_rounds + 1);
                pending.started = req.started;
                let target = self.target(pending.port);
                self.registry.register(pending);
                Dispatch::Resend(Transmit {
                    data: encoded,
                    target,
                    purpose: Purpose::Request(id),
                })
            }
            Err(e) => Dispatch::Done(req, Err(e)),
        }
    }

    /// Rebuild `original` under the current security parameters with a fresh id.
    fn resend(&self, req: &PendingRequest, original: Pdu) -> Result<(i32, Bytes, Pdu)> {
        let security = self
            .security
            .as_ref()
            .ok_or_else(|| report_error(&original))?;
        let id = self.allocate_id()?;
        let pdu = original.with_request_id(id);
        let message = security
            .request_message(pdu.clone())
            .ok_or_else(|| report_error(&original))?;
        let encoded = self.codec.encode(&message, Some(security.user()))?;
        tracing::debug!(
            target: "snmp_session::engine",
            { snmp.request_id = id, snmp.previous_request_id = req.id },
            "resending request after report"
        );
        Ok((id, encoded, pdu))
    }
}

struct StartedRequest {
    id: i32,
    encoded: Bytes,
    shape: ResponseShape,
    request_varbinds: Vec<VarBind>,
    port: u16,
    /// Set when `encoded` is a discovery probe standing in for this PDU.
    probe_for: Option<Pdu>,
}

enum Dispatch {
    Done(PendingRequest, Result<super::shape::Reply>),
    Resend(Transmit),
}

fn require_oids(oids: &[Oid]) -> Result<()> {
    if oids.is_empty() {
        return Err(Error::request_invalid("no OIDs requested"));
    }
    Ok(())
}

fn clamp_i32(n: u32) -> i32 {
    i32::try_from(n).unwrap_or(i32::MAX)
}

/// Split a notification OID into a v1 enterprise and specific trap number.
///
/// `enterprise.0.specific` (RFC 3584 Section 3.1) drops the `.0`; otherwise
/// the last arc is the specific trap.
fn split_enterprise_specific(oid: &Oid) -> (Oid, i32) {
    let arcs = oid.arcs();
    match arcs {
        [head @ .., 0, specific] if !head.is_empty() => {
            (Oid::from_slice(head), i32::try_from(*specific).unwrap_or(i32::MAX))
        }
        [head @ .., specific] if !head.is_empty() => {
            (Oid::from_slice(head), i32::try_from(*specific).unwrap_or(i32::MAX))
        }
        _ => (Oid::from_slice(&DEFAULT_ENTERPRISE), 0),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{DecodeErrorKind, ErrorStatus};
    use crate::message::V3Message;
    use crate::oid;
    use crate::session::shape::Reply;
    use crate::v3::{MAX_RESYNC_ROUNDS, SecurityLevel, UsmStat, UsmUser};
    use crate::session::config::IdBits;
    use crate::value::Value;
    use std::collections::HashMap;
    use std::future::poll_fn;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::time::Duration;

    /// Stores messages and hands out their keys as the "wire" bytes.
    #[derive(Default)]
    struct MemoryCodec {
        messages: Mutex<HashMap<u64, Message>>,
        next: AtomicU64,
    }

    impl Codec for MemoryCodec {
        fn encode(&self, message: &Message, _user: Option<&UsmUser>) -> Result<Bytes> {
            let key = self.next.fetch_add(1, Ordering::Relaxed);
            self.messages.lock().unwrap().insert(key, message.clone());
            Ok(Bytes::copy_from_slice(&key.to_be_bytes()))
        }

        fn decode(&self, data: Bytes) -> Result<Message> {
            let key: [u8; 8] = data
                .as_ref()
                .try_into()
                .map_err(|_| Error::decode(0, DecodeErrorKind::TruncatedData))?;
            self.messages
                .lock()
                .unwrap()
                .get(&u64::from_be_bytes(key))
                .cloned()
                .ok_or_else(|| Error::decode(0, DecodeErrorKind::TruncatedData))
        }

        fn process_incoming_security(&self, _message: &mut Message, _user: &UsmUser) -> Result<()> {
            Ok(())
        }
    }

    struct Harness {
        engine: Engine,
        codec: Arc<MemoryCodec>,
        events: broadcast::Receiver<SessionEvent>,
        activity: watch::Receiver<bool>,
    }

    fn agent() -> SocketAddr {
        "127.0.0.1:161".parse().unwrap()
    }

    fn harness(config: SessionConfig) -> Harness {
        let codec = Arc::new(MemoryCodec::default());
        let (activity, activity_rx) = watch::channel(false);
        let (events, events_rx) = broadcast::channel(8);
        let engine = Engine::new(
            config,
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            "127.0.0.1:40000".parse().unwrap(),
            codec.clone(),
            activity,
            events,
        )
        .unwrap();
        Harness {
            engine,
            codec,
            events: events_rx,
            activity: activity_rx,
        }
    }

    fn v2c() -> SessionConfig {
        SessionConfig {
            timeout: Duration::from_secs(1),
            ..SessionConfig::default()
        }
    }

    fn v3() -> SessionConfig {
        SessionConfig {
            version: Version::V3,
            user: Some(UsmUser::new("alice")),
            ..v2c()
        }
    }

    type ReplyRx = oneshot::Receiver<Result<Reply>>;

    impl Harness {
        fn start(&mut self, op: Operation) -> (Option<Transmit>, ReplyRx) {
            let (tx, rx) = oneshot::channel();
            (self.engine.request(op, tx), rx)
        }

        fn sent(&self, transmit: &Transmit) -> Message {
            self.codec.decode(transmit.data.clone()).unwrap()
        }

        fn answer(&mut self, message: &Message) -> Option<Transmit> {
            let data = self.codec.encode(message, None).unwrap();
            self.engine.datagram(data, agent())
        }
    }

    fn response_pdu(request_id: i32, varbinds: Vec<VarBind>) -> Pdu {
        Pdu {
            pdu_type: PduType::Response,
            request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        }
    }

    fn respond(request: &Message, varbinds: Vec<VarBind>) -> Message {
        let Message::Community(m) = request else {
            panic!("expected community message, got {request:?}");
        };
        Message::community(m.version, m.community.clone(), response_pdu(m.pdu.request_id, varbinds))
    }

    fn v3_reply(request: &Message, params: SecurityParameters, pdu: Pdu) -> Message {
        let Message::V3(m) = request else {
            panic!("expected v3 message, got {request:?}");
        };
        Message::V3(V3Message {
            msg_id: m.msg_id,
            max_size: m.max_size,
            level: SecurityLevel::NoAuthNoPriv,
            reportable: false,
            context_engine_id: params.engine_id.clone(),
            security_params: params,
            context_name: Bytes::new(),
            data: ScopedPduData::Plaintext(Pdu {
                request_id: m.msg_id,
                ..pdu
            }),
        })
    }

    fn report(stat: UsmStat) -> Pdu {
        Pdu {
            pdu_type: PduType::Report,
            request_id: 0,
            error_status: 0,
            error_index: 0,
            varbinds: vec![VarBind::new(stat.oid(), Value::Counter32(1))],
        }
    }

    fn engine_params(boots: u32, time: u32) -> SecurityParameters {
        SecurityParameters::new(Bytes::from_static(b"agent-engine"), boots, time, "alice")
    }

    fn varbinds(rx: &mut ReplyRx) -> Vec<VarBind> {
        match rx.try_recv().unwrap() {
            Ok(Reply::VarBinds(varbinds)) => varbinds,
            other => panic!("unexpected {other:?}"),
        }
    }

    fn error(rx: &mut ReplyRx) -> Error {
        match rx.try_recv().unwrap() {
            Err(e) => e,
            other => panic!("unexpected {other:?}"),
        }
    }

    fn sys_descr() -> Oid {
        oid!(1, 3, 6, 1, 2, 1, 1, 1, 0)
    }

    #[tokio::test(start_paused = true)]
    async fn get_completes_on_matching_response() {
        let mut h = harness(v2c());
        let (transmit, mut rx) = h.start(Operation::Get(vec![sys_descr()]));
        let transmit = transmit.unwrap();
        assert_eq!(transmit.target, agent());
        assert!(*h.activity.borrow());

        let request = h.sent(&transmit);
        let answer = respond(&request, vec![VarBind::new(sys_descr(), Value::from("router"))]);
        assert!(h.answer(&answer).is_none());

        let vbs = varbinds(&mut rx);
        assert_eq!(vbs[0].value, Value::from("router"));
        assert!(!h.engine.has_pending());
        assert!(!*h.activity.borrow());
    }

    #[tokio::test(start_paused = true)]
    async fn retransmits_then_times_out() {
        let mut h = harness(SessionConfig {
            retries: 1,
            ..v2c()
        });
        let (transmit, mut rx) = h.start(Operation::Get(vec![sys_descr()]));
        let first = transmit.unwrap();

        let id = poll_fn(|cx| h.engine.poll_expired(cx)).await.unwrap();
        let retry = h.engine.expired(id).unwrap();
        assert_eq!(retry.data, first.data);
        assert!(matches!(retry.purpose, Purpose::Request(rid) if rid == id));

        let id = poll_fn(|cx| h.engine.poll_expired(cx)).await.unwrap();
        assert!(h.engine.expired(id).is_none());

        match error(&mut rx) {
            Error::Timeout {
                target,
                request_id,
                retries,
                elapsed,
            } => {
                assert_eq!(target, Some(agent()));
                assert_eq!(request_id, id);
                assert_eq!(retries, 1);
                assert!(elapsed >= Duration::from_secs(2));
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!h.engine.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn community_mismatch_is_terminal() {
        let mut h = harness(v2c());
        let (transmit, mut rx) = h.start(Operation::Get(vec![sys_descr()]));
        let request = h.sent(&transmit.unwrap());
        let Message::Community(m) = &request else {
            unreachable!()
        };
        let answer = Message::community(
            Version::V2c,
            "private",
            response_pdu(m.pdu.request_id, vec![VarBind::null(sys_descr())]),
        );
        assert!(h.answer(&answer).is_none());

        match error(&mut rx) {
            Error::ResponseInvalid { code, .. } => {
                assert_eq!(code, ResponseInvalidCode::CommunityNoMatch)
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!h.engine.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn version_mismatch_is_terminal() {
        let mut h = harness(v2c());
        let (transmit, mut rx) = h.start(Operation::Get(vec![sys_descr()]));
        let request = h.sent(&transmit.unwrap());
        let Message::Community(m) = &request else {
            unreachable!()
        };
        let answer = Message::community(
            Version::V1,
            "public",
            response_pdu(m.pdu.request_id, vec![VarBind::null(sys_descr())]),
        );
        let _ = h.answer(&answer);

        match error(&mut rx) {
            Error::ResponseInvalid { code, .. } => {
                assert_eq!(code, ResponseInvalidCode::VersionNoMatch)
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn error_status_names_the_failing_oid() {
        let mut h = harness(v2c());
        let (transmit, mut rx) = h.start(Operation::Set(vec![VarBind::new(
            sys_descr(),
            Value::from("x"),
        )]));
        let request = h.sent(&transmit.unwrap());
        let Message::Community(m) = &request else {
            unreachable!()
        };
        let mut pdu = response_pdu(m.pdu.request_id, m.pdu.varbinds.clone());
        pdu.error_status = 17;
        pdu.error_index = 1;
        let _ = h.answer(&Message::community(Version::V2c, "public", pdu));

        match error(&mut rx) {
            Error::RequestFailed {
                status, index, oid, ..
            } => {
                assert_eq!(status, ErrorStatus::NotWritable);
                assert_eq!(index, 1);
                assert_eq!(oid, Some(sys_descr()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn unknown_request_id_is_ignored() {
        let mut h = harness(v2c());
        let (transmit, mut rx) = h.start(Operation::Get(vec![sys_descr()]));
        let request = h.sent(&transmit.unwrap());
        let Message::Community(m) = &request else {
            unreachable!()
        };
        let stray = Message::community(
            Version::V2c,
            "public",
            response_pdu(m.pdu.request_id.wrapping_add(1), vec![VarBind::null(sys_descr())]),
        );
        assert!(h.answer(&stray).is_none());
        assert!(h.engine.has_pending());
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn undecodable_datagram_is_published() {
        let mut h = harness(v2c());
        assert!(h.engine.datagram(Bytes::from_static(b"junk"), agent()).is_none());
        match h.events.try_recv().unwrap() {
            SessionEvent::Processing(e) => match e.as_ref() {
                Error::Processing { source_addr, data, .. } => {
                    assert_eq!(*source_addr, agent());
                    assert_eq!(data.as_ref(), b"junk");
                }
                other => panic!("unexpected {other:?}"),
            },
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn local_validation_failures() {
        let mut h = harness(SessionConfig {
            version: Version::V1,
            ..v2c()
        });

        let (transmit, mut rx) = h.start(Operation::GetBulk {
            oids: vec![sys_descr()],
            options: BulkOptions::default(),
        });
        assert!(transmit.is_none());
        assert!(matches!(error(&mut rx), Error::RequestInvalid { .. }));

        let (transmit, mut rx) = h.start(Operation::Inform {
            trap: TrapType::Generic(GenericTrap::ColdStart),
            varbinds: vec![],
            options: TrapOptions::default(),
        });
        assert!(transmit.is_none());
        assert!(matches!(error(&mut rx), Error::RequestInvalid { .. }));

        let (transmit, mut rx) = h.start(Operation::Get(vec![]));
        assert!(transmit.is_none());
        assert!(matches!(error(&mut rx), Error::RequestInvalid { .. }));
        assert!(!h.engine.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn non_repeaters_beyond_oids_rejected() {
        let mut h = harness(v2c());
        let (transmit, mut rx) = h.start(Operation::GetBulk {
            oids: vec![sys_descr()],
            options: BulkOptions {
                non_repeaters: 2,
                max_repetitions: 5,
            },
        });
        assert!(transmit.is_none());
        assert!(matches!(error(&mut rx), Error::RequestInvalid { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn bulk_response_is_reassembled() {
        let mut h = harness(v2c());
        let (transmit, mut rx) = h.start(Operation::GetBulk {
            oids: vec![oid!(1, 3, 6, 1, 2, 1, 1, 3), oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 2)],
            options: BulkOptions {
                non_repeaters: 1,
                max_repetitions: 2,
            },
        });
        let request = h.sent(&transmit.unwrap());
        let Message::Community(m) = &request else {
            unreachable!()
        };
        assert_eq!(m.pdu.non_repeaters(), 1);
        assert_eq!(m.pdu.max_repetitions(), 2);

        let answer = respond(
            &request,
            vec![
                VarBind::new(oid!(1, 3, 6, 1, 2, 1, 1, 3, 0), Value::TimeTicks(100)),
                VarBind::new(oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 2, 1), Value::from("eth0")),
                VarBind::new(oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 2, 2), Value::from("eth1")),
            ],
        );
        let _ = h.answer(&answer);

        match rx.try_recv().unwrap() {
            Ok(Reply::Bulk(result)) => {
                assert_eq!(result.non_repeaters.len(), 1);
                assert_eq!(result.repeaters.len(), 1);
                assert_eq!(result.repeaters[0].len(), 2);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn v3_discovery_then_resend() {
        let mut h = harness(v3());
        let (transmit, mut rx) = h.start(Operation::Get(vec![sys_descr()]));
        let probe = h.sent(&transmit.unwrap());
        let Message::V3(p) = &probe else {
            panic!("expected v3 probe");
        };
        assert!(p.security_params.engine_id.is_empty());
        assert_eq!(p.level, SecurityLevel::NoAuthNoPriv);
        assert!(probe.pdu().unwrap().varbinds.is_empty());

        let reply = v3_reply(&probe, engine_params(3, 1200), report(UsmStat::UnknownEngineIds));
        let resend = h.answer(&reply).expect("request re-sent after discovery");
        assert!(rx.try_recv().is_err());

        let request = h.sent(&resend);
        let Message::V3(r) = &request else {
            panic!("expected v3 request");
        };
        assert_eq!(r.security_params.engine_id.as_ref(), b"agent-engine");
        assert_eq!(r.security_params.engine_boots, 3);
        assert_eq!(r.security_params.engine_time, 1200);
        assert_eq!(r.context_engine_id.as_ref(), b"agent-engine");
        assert_eq!(r.msg_id, r.pdu().unwrap().request_id);
        assert_eq!(r.pdu().unwrap().varbinds, vec![VarBind::null(sys_descr())]);

        let answer = v3_reply(
            &request,
            engine_params(3, 1201),
            response_pdu(0, vec![VarBind::new(sys_descr(), Value::from("router"))]),
        );
        assert!(h.answer(&answer).is_none());
        assert_eq!(varbinds(&mut rx)[0].value, Value::from("router"));

        // Later requests go straight out under the learned engine.
        let (transmit, _rx) = h.start(Operation::Get(vec![sys_descr()]));
        let Message::V3(next) = h.sent(&transmit.unwrap()) else {
            panic!("expected v3 request");
        };
        assert_eq!(next.security_params.engine_time, 1201);
        assert!(next.pdu().is_some_and(|pdu| !pdu.varbinds.is_empty()));
    }

    #[tokio::test(start_paused = true)]
    async fn unsynchronized_clock_gets_a_second_round() {
        let mut h = harness(v3());
        let (transmit, mut rx) = h.start(Operation::Get(vec![sys_descr()]));
        let probe = h.sent(&transmit.unwrap());

        let first = h
            .answer(&v3_reply(&probe, engine_params(0, 0), report(UsmStat::UnknownEngineIds)))
            .expect("discovery resend");
        let request = h.sent(&first);

        let second = h
            .answer(&v3_reply(&request, engine_params(7, 50), report(UsmStat::NotInTimeWindows)))
            .expect("time sync resend");
        let request = h.sent(&second);
        let Message::V3(r) = &request else {
            unreachable!()
        };
        assert_eq!(r.security_params.engine_boots, 7);

        // Synchronized now, so another report is fatal.
        assert!(h
            .answer(&v3_reply(&request, engine_params(7, 51), report(UsmStat::NotInTimeWindows)))
            .is_none());
        match error(&mut rx) {
            Error::ResponseInvalid { code, message } => {
                assert_eq!(code, ResponseInvalidCode::AuthFailure);
                assert_eq!(message, "Not In Time Window");
            }
            other => panic!("unexpected {other:?}"),
        }
        assert!(!h.engine.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn third_report_is_fatal() {
        let mut h = harness(v3());
        let (transmit, mut rx) = h.start(Operation::Get(vec![sys_descr()]));
        let mut message = h.sent(&transmit.unwrap());

        for _ in 0..MAX_RESYNC_ROUNDS {
            let resend = h
                .answer(&v3_reply(&message, engine_params(0, 0), report(UsmStat::NotInTimeWindows)))
                .expect("resend");
            message = h.sent(&resend);
        }
        assert!(h
            .answer(&v3_reply(&message, engine_params(0, 0), report(UsmStat::NotInTimeWindows)))
            .is_none());
        assert!(matches!(
            error(&mut rx),
            Error::ResponseInvalid {
                code: ResponseInvalidCode::AuthFailure,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn report_without_usm_stats_is_unexpected() {
        let mut h = harness(v2c());
        let (transmit, mut rx) = h.start(Operation::Get(vec![sys_descr()]));
        let request = h.sent(&transmit.unwrap());
        let Message::Community(m) = &request else {
            unreachable!()
        };
        let mut pdu = response_pdu(m.pdu.request_id, vec![]);
        pdu.pdu_type = PduType::Report;
        let _ = h.answer(&Message::community(Version::V2c, "public", pdu));
        assert!(matches!(
            error(&mut rx),
            Error::ResponseInvalid {
                code: ResponseInvalidCode::UnexpectedReport,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn v1_trap_splits_enterprise() {
        let mut h = harness(SessionConfig {
            version: Version::V1,
            ..v2c()
        });
        let (tx, mut rx) = oneshot::channel();
        let transmit = h
            .engine
            .trap(
                TrapRequest {
                    trap: TrapType::Oid(oid!(1, 3, 6, 1, 4, 1, 9, 0, 5)),
                    varbinds: vec![],
                    options: TrapOptions {
                        up_time: Some(42),
                        ..TrapOptions::default()
                    },
                },
                tx,
            )
            .unwrap();
        assert_eq!(transmit.target.port(), 162);

        let Message::TrapV1(trap) = h.sent(&transmit) else {
            panic!("expected v1 trap");
        };
        assert_eq!(trap.trap.enterprise, oid!(1, 3, 6, 1, 4, 1, 9));
        assert_eq!(trap.trap.generic_trap, GenericTrap::EnterpriseSpecific.as_i32());
        assert_eq!(trap.trap.specific_trap, 5);
        assert_eq!(trap.trap.time_stamp, 42);
        assert_eq!(trap.trap.agent_addr, [127, 0, 0, 1]);

        assert!(rx.try_recv().is_err());
        h.engine.sent(transmit.purpose);
        assert!(rx.try_recv().unwrap().is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn v2c_trap_carries_notification_varbinds() {
        let mut h = harness(v2c());
        let (tx, _rx) = oneshot::channel();
        let transmit = h
            .engine
            .trap(
                TrapRequest {
                    trap: TrapType::Generic(GenericTrap::LinkDown),
                    varbinds: vec![VarBind::new(oid!(1, 3, 6, 1, 2, 1, 2, 2, 1, 1, 3), Value::Integer(3))],
                    options: TrapOptions {
                        up_time: Some(7),
                        ..TrapOptions::default()
                    },
                },
                tx,
            )
            .unwrap();
        let message = h.sent(&transmit);
        let pdu = message.pdu().unwrap();
        assert_eq!(pdu.pdu_type, PduType::TrapV2);
        assert_eq!(pdu.varbinds.len(), 3);
        assert_eq!(pdu.varbinds[0].value, Value::TimeTicks(7));
        assert_eq!(
            pdu.varbinds[1].value,
            Value::ObjectIdentifier(GenericTrap::LinkDown.v2_trap_oid())
        );
        assert!(!h.engine.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn inform_goes_to_trap_port_and_checks_oids() {
        let mut h = harness(v2c());
        let (transmit, mut rx) = h.start(Operation::Inform {
            trap: TrapType::Oid(oid!(1, 3, 6, 1, 4, 1, 9, 9, 1)),
            varbinds: vec![],
            options: TrapOptions {
                up_time: Some(1),
                ..TrapOptions::default()
            },
        });
        let transmit = transmit.unwrap();
        assert_eq!(transmit.target.port(), 162);

        let request = h.sent(&transmit);
        let mut echoed = request.pdu().unwrap().varbinds.clone();
        echoed[1].oid = oid!(1, 3, 6, 1, 9);
        let _ = h.answer(&respond(&request, echoed));
        assert!(matches!(
            error(&mut rx),
            Error::ResponseInvalid {
                code: ResponseInvalidCode::ReqResOidNoMatch,
                ..
            }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn close_cancels_outstanding() {
        let mut h = harness(v2c());
        let (_t1, mut rx1) = h.start(Operation::Get(vec![sys_descr()]));
        let (_t2, mut rx2) = h.start(Operation::GetNext(vec![sys_descr()]));
        h.engine.close();
        assert!(matches!(error(&mut rx1), Error::SessionClosed));
        assert!(matches!(error(&mut rx2), Error::SessionClosed));
        assert!(!h.engine.has_pending());
    }

    #[tokio::test(start_paused = true)]
    async fn exhausted_id_space_fails_request() {
        let mut h = harness(SessionConfig {
            id_bits: IdBits::Bits16,
            ..v2c()
        });
        let mut receivers = Vec::new();
        for id in 0..=IdBits::Bits16.mask() as i32 {
            let (tx, rx) = oneshot::channel();
            receivers.push(rx);
            h.engine.registry.register(PendingRequest::new(
                id,
                Bytes::new(),
                ResponseShape::Exact,
                Vec::new(),
                tx,
                0,
                Duration::from_secs(1),
                161,
            ));
        }

        let (transmit, mut rx) = h.start(Operation::Get(vec![sys_descr()]));
        assert!(transmit.is_none());
        match error(&mut rx) {
            Error::RequestInvalid { message } => assert!(message.contains("request id")),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn send_failure_completes_request() {
        let mut h = harness(v2c());
        let (transmit, mut rx) = h.start(Operation::Get(vec![sys_descr()]));
        let transmit = transmit.unwrap();
        h.engine.send_failed(
            transmit.purpose,
            Error::Io {
                target: Some(agent()),
                source: std::io::Error::other("unreachable"),
            },
        );
        assert!(matches!(error(&mut rx), Error::Io { .. }));
        assert!(!h.engine.has_pending());
    }

    #[test]
    fn v3_requires_user() {
        let (activity, _rx) = watch::channel(false);
        let (events, _) = broadcast::channel(1);
        let result = Engine::new(
            SessionConfig {
                version: Version::V3,
                ..SessionConfig::default()
            },
            IpAddr::V4(Ipv4Addr::LOCALHOST),
            "127.0.0.1:0".parse().unwrap(),
            Arc::new(MemoryCodec::default()),
            activity,
            events,
        );
        assert!(matches!(result, Err(Error::RequestInvalid { .. })));
    }

    #[test]
    fn enterprise_specific_split() {
        assert_eq!(
            split_enterprise_specific(&oid!(1, 3, 6, 1, 4, 1, 8072, 0, 2)),
            (oid!(1, 3, 6, 1, 4, 1, 8072), 2)
        );
        assert_eq!(
            split_enterprise_specific(&oid!(1, 3, 6, 1, 4, 1, 8072, 7)),
            (oid!(1, 3, 6, 1, 4, 1, 8072), 7)
        );
        assert_eq!(
            split_enterprise_specific(&oid!(5)),
            (Oid::from_slice(&DEFAULT_ENTERPRISE), 0)
        );
    }
}
