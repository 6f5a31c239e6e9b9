//! Scripted SNMP agent on a localhost UDP socket.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::ops::Bound;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use snmp_session::message::{ScopedPduData, V3Message};
use snmp_session::v3::{SecurityParameters, UsmStat};
use snmp_session::{
    Codec, Message, Oid, Pdu, PduType, Transport, UdpTransport, Value, VarBind, Version,
};
use tokio::task::JoinHandle;

use super::codec::LoopbackCodec;
use super::fixtures::COMMUNITY;

/// Behavior of a [`FakeAgent`].
#[derive(Debug, Clone)]
pub struct AgentOptions {
    pub community: Bytes,
    pub mib: BTreeMap<Oid, Value>,
    /// Ignore this many datagrams before answering.
    pub drop_first: usize,
    /// Never answer.
    pub silent: bool,
    pub engine_id: Bytes,
    pub engine_boots: u32,
    pub engine_time: u32,
    /// Answer discovery with zeroed boots/time, then demand a time sync.
    pub unsynchronized_discovery: bool,
}

impl Default for AgentOptions {
    fn default() -> Self {
        Self {
            community: Bytes::from_static(COMMUNITY),
            mib: BTreeMap::new(),
            drop_first: 0,
            silent: false,
            engine_id: Bytes::from_static(b"\x80\x00\x1f\x88\x80fake-agent"),
            engine_boots: 4,
            engine_time: 9000,
            unsynchronized_discovery: false,
        }
    }
}

/// Handle to a running agent task; the task stops when the handle drops.
pub struct FakeAgent {
    addr: SocketAddr,
    log: Arc<Mutex<Vec<Message>>>,
    task: JoinHandle<()>,
}

impl FakeAgent {
    pub fn start(codec: LoopbackCodec, options: AgentOptions) -> Self {
        let transport = UdpTransport::bind("127.0.0.1:0".parse().unwrap()).unwrap();
        let addr = transport.local_addr();
        let log = Arc::new(Mutex::new(Vec::new()));

        let state = AgentState {
            options,
            time_sync_pending: false,
        };
        let task = tokio::spawn(serve(transport, codec, state, log.clone()));
        Self { addr, log, task }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    /// Every message received so far, answered or not.
    pub fn received(&self) -> Vec<Message> {
        self.log.lock().unwrap().clone()
    }

    /// Wait until `check` holds for the received messages.
    pub async fn wait_for(&self, check: impl Fn(&[Message]) -> bool) -> Vec<Message> {
        for _ in 0..100 {
            let received = self.received();
            if check(&received) {
                return received;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("agent never received the expected messages: {:?}", self.received());
    }
}

impl Drop for FakeAgent {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(
    transport: UdpTransport,
    codec: LoopbackCodec,
    mut state: AgentState,
    log: Arc<Mutex<Vec<Message>>>,
) {
    let mut buf = vec![0u8; 65535];
    loop {
        let Ok((len, source)) = transport.recv_from(&mut buf).await else {
            return;
        };
        let Ok(message) = codec.decode(Bytes::copy_from_slice(&buf[..len])) else {
            continue;
        };
        let seen = {
            let mut log = log.lock().unwrap();
            log.push(message.clone());
            log.len()
        };
        if state.options.silent || seen <= state.options.drop_first {
            continue;
        }
        if let Some(reply) = state.answer(&message) {
            let data = codec.encode(&reply, None).unwrap();
            let _ = transport.send_to(&data, source).await;
        }
    }
}

struct AgentState {
    options: AgentOptions,
    time_sync_pending: bool,
}

impl AgentState {
    fn answer(&mut self, message: &Message) -> Option<Message> {
        match message {
            Message::Community(m) => {
                if m.community != self.options.community {
                    return None;
                }
                let pdu = self.respond(m.version, &m.pdu)?;
                Some(Message::community(m.version, m.community.clone(), pdu))
            }
            Message::V3(m) => self.answer_v3(m),
            Message::TrapV1(_) => None,
        }
    }

    fn answer_v3(&mut self, m: &V3Message) -> Option<Message> {
        let synced = SecurityParameters::new(
            self.options.engine_id.clone(),
            self.options.engine_boots,
            self.options.engine_time,
            "",
        );

        let (params, pdu) = if m.security_params.engine_id.is_empty() {
            let params = if self.options.unsynchronized_discovery {
                self.time_sync_pending = true;
                SecurityParameters::new(self.options.engine_id.clone(), 0, 0, "")
            } else {
                synced
            };
            (params, report(m.msg_id, UsmStat::UnknownEngineIds))
        } else if self.time_sync_pending {
            self.time_sync_pending = false;
            (synced, report(m.msg_id, UsmStat::NotInTimeWindows))
        } else {
            let pdu = self.respond(Version::V3, m.pdu()?)?;
            (synced, pdu)
        };

        Some(Message::V3(V3Message {
            msg_id: m.msg_id,
            max_size: m.max_size,
            level: m.level,
            reportable: false,
            context_engine_id: params.engine_id.clone(),
            security_params: params,
            context_name: m.context_name.clone(),
            data: ScopedPduData::Plaintext(pdu),
        }))
    }

    fn respond(&mut self, version: Version, request: &Pdu) -> Option<Pdu> {
        let v1 = version == Version::V1;
        let mut varbinds = Vec::with_capacity(request.varbinds.len());

        match request.pdu_type {
            PduType::GetRequest => {
                for (i, vb) in request.varbinds.iter().enumerate() {
                    match self.options.mib.get(&vb.oid) {
                        Some(value) => varbinds.push(VarBind::new(vb.oid.clone(), value.clone())),
                        None if v1 => return Some(no_such_name(request, i)),
                        None => varbinds.push(VarBind::new(vb.oid.clone(), Value::NoSuchObject)),
                    }
                }
            }
            PduType::GetNextRequest => {
                for (i, vb) in request.varbinds.iter().enumerate() {
                    match self.next_after(&vb.oid) {
                        Some(next) => varbinds.push(next),
                        None if v1 => return Some(no_such_name(request, i)),
                        None => varbinds.push(VarBind::new(vb.oid.clone(), Value::EndOfMibView)),
                    }
                }
            }
            PduType::GetBulkRequest => {
                let non_repeaters = usize::try_from(request.non_repeaters())
                    .unwrap_or(0)
                    .min(request.varbinds.len());
                let max_repetitions = usize::try_from(request.max_repetitions()).unwrap_or(0);

                for vb in &request.varbinds[..non_repeaters] {
                    varbinds.push(self.next_or_end(&vb.oid));
                }
                let mut cursors: Vec<Oid> = request.varbinds[non_repeaters..]
                    .iter()
                    .map(|vb| vb.oid.clone())
                    .collect();
                for _ in 0..max_repetitions {
                    if cursors.is_empty() {
                        break;
                    }
                    let mut all_ended = true;
                    for cursor in &mut cursors {
                        let next = self.next_or_end(cursor);
                        if next.value != Value::EndOfMibView {
                            all_ended = false;
                        }
                        *cursor = next.oid.clone();
                        varbinds.push(next);
                    }
                    if all_ended {
                        break;
                    }
                }
            }
            PduType::SetRequest => {
                for vb in &request.varbinds {
                    self.options.mib.insert(vb.oid.clone(), vb.value.clone());
                }
                varbinds = request.varbinds.clone();
            }
            PduType::InformRequest => varbinds = request.varbinds.clone(),
            _ => return None,
        }

        Some(Pdu {
            pdu_type: PduType::Response,
            request_id: request.request_id,
            error_status: 0,
            error_index: 0,
            varbinds,
        })
    }

    fn next_after(&self, oid: &Oid) -> Option<VarBind> {
        self.options
            .mib
            .range((Bound::Excluded(oid.clone()), Bound::Unbounded))
            .next()
            .map(|(oid, value)| VarBind::new(oid.clone(), value.clone()))
    }

    fn next_or_end(&self, oid: &Oid) -> VarBind {
        self.next_after(oid)
            .unwrap_or_else(|| VarBind::new(oid.clone(), Value::EndOfMibView))
    }
}

fn no_such_name(request: &Pdu, index: usize) -> Pdu {
    Pdu {
        pdu_type: PduType::Response,
        request_id: request.request_id,
        error_status: 2,
        error_index: i32::try_from(index + 1).unwrap(),
        varbinds: request.varbinds.clone(),
    }
}

fn report(request_id: i32, stat: UsmStat) -> Pdu {
    Pdu {
        pdu_type: PduType::Report,
        request_id,
        error_status: 0,
        error_index: 0,
        varbinds: vec![VarBind::new(stat.oid(), Value::Counter32(1))],
    }
}
