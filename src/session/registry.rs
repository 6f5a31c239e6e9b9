//! Outstanding request bookkeeping.
//!
//! Every in-flight request lives in a map keyed by request id, with a matching
//! entry in a [`DelayQueue`] for its retry timer. Removing a request always
//! removes its timer, so a request can complete at most once no matter
//! whether the reply or the timer gets there first.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::task::{Context, Poll};
use std::time::Duration;

use bytes::Bytes;
use tokio::sync::{oneshot, watch};
use tokio::time::Instant;
use tokio_util::time::DelayQueue;
use tokio_util::time::delay_queue::Key;

use super::shape::{Reply, ResponseShape};
use crate::error::{Error, Result};
use crate::pdu::Pdu;
use crate::varbind::VarBind;

/// Longest wait a single timer is armed for; longer timeouts are clamped.
const MAX_TIMEOUT: Duration = Duration::from_secs(365 * 24 * 60 * 60);

pub(crate) type Responder = oneshot::Sender<Result<Reply>>;

/// A request waiting for its reply.
#[derive(Debug)]
pub(crate) struct PendingRequest {
    pub id: i32,
    /// Encoded datagram, re-sent unchanged on retry.
    pub encoded: Bytes,
    pub shape: ResponseShape,
    /// Varbinds the reply is checked against.
    pub request_varbinds: Vec<VarBind>,
    pub responder: Responder,
    /// Retries left.
    pub retries: u32,
    /// Wait for the next timer; grows by the backoff factor on each arm.
    pub timeout: Duration,
    pub port: u16,
    /// The real PDU behind a discovery probe or resync attempt.
    pub original_pdu: Option<Pdu>,
    pub allow_report: bool,
    pub report_rounds: u8,
    pub started: Instant,
    pub sends: u32,
    key: Option<Key>,
}

impl PendingRequest {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: i32,
        encoded: Bytes,
        shape: ResponseShape,
        request_varbinds: Vec<VarBind>,
        responder: Responder,
        retries: u32,
        timeout: Duration,
        port: u16,
    ) -> Self {
        Self {
            id,
            encoded,
            shape,
            request_varbinds,
            responder,
            retries,
            timeout,
            port,
            original_pdu: None,
            allow_report: false,
            report_rounds: 0,
            started: Instant::now(),
            sends: 1,
            key: None,
        }
    }

    /// Mark this request as a security exchange standing in for `original`.
    pub(crate) fn with_original(mut self, original: Pdu, allow_report: bool, rounds: u8) -> Self {
        self.original_pdu = Some(original);
        self.allow_report = allow_report;
        self.report_rounds = rounds;
        self
    }

    /// Deliver the terminal outcome. A caller that stopped waiting is ignored.
    pub(crate) fn complete(self, result: Result<Reply>) {
        let _ = self.responder.send(result);
    }
}

/// Outcome of a fired timer.
#[derive(Debug)]
pub(crate) enum Expiry {
    /// Retries remain: send these bytes again.
    Retransmit { id: i32, data: Bytes, port: u16 },
    /// Out of retries; the request has been removed.
    TimedOut(PendingRequest),
}

pub(crate) struct RequestRegistry {
    pending: HashMap<i32, PendingRequest>,
    timers: DelayQueue<i32>,
    backoff: f64,
    activity: watch::Sender<bool>,
}

impl RequestRegistry {
    /// `backoff` below 1.0 is treated as 1.0.
    pub(crate) fn new(backoff: f64, activity: watch::Sender<bool>) -> Self {
        Self {
            pending: HashMap::new(),
            timers: DelayQueue::new(),
            backoff: if backoff.is_finite() && backoff >= 1.0 { backoff } else { 1.0 },
            activity,
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.pending.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub(crate) fn contains(&self, id: i32) -> bool {
        self.pending.contains_key(&id)
    }

    /// Store `req` and arm its timer.
    ///
    /// An id that is already registered keeps its stored record and only has
    /// its timer restarted; ids are allocated so this does not happen for new
    /// requests.
    pub(crate) fn register(&mut self, req: PendingRequest) {
        let id = req.id;
        match self.pending.entry(id) {
            Entry::Occupied(mut entry) => {
                tracing::warn!(target: "snmp_session::registry", { snmp.request_id = id }, "request id already registered");
                Self::arm(&mut self.timers, self.backoff, entry.get_mut());
            }
            Entry::Vacant(entry) => {
                let stored = entry.insert(req);
                Self::arm(&mut self.timers, self.backoff, stored);
            }
        }
        self.publish_activity();
    }

    /// Remove a request and cancel its timer. Unknown ids return `None`.
    pub(crate) fn unregister(&mut self, id: i32) -> Option<PendingRequest> {
        let mut req = self.pending.remove(&id)?;
        if let Some(key) = req.key.take() {
            self.timers.remove(&key);
        }
        self.publish_activity();
        Some(req)
    }

    /// Poll the next fired timer.
    ///
    /// Returns `Ready(None)` when no timer is armed and does not register a
    /// waker in that case; callers only poll while the registry is non-empty.
    pub(crate) fn poll_expired(&mut self, cx: &mut Context<'_>) -> Poll<Option<i32>> {
        self.timers
            .poll_expired(cx)
            .map(|expired| expired.map(|e| e.into_inner()))
    }

    /// Handle a fired timer for `id`.
    pub(crate) fn expire(&mut self, id: i32) -> Option<Expiry> {
        let req = self.pending.get_mut(&id)?;
        req.key = None;

        if req.retries > 0 {
            req.retries -= 1;
            req.sends += 1;
            Self::arm(&mut self.timers, self.backoff, req);
            tracing::debug!(
                target: "snmp_session::registry",
                { snmp.request_id = id, snmp.retries_left = req.retries, snmp.timeout_ms = req.timeout.as_millis() as u64 },
                "retransmitting"
            );
            return Some(Expiry::Retransmit {
                id,
                data: req.encoded.clone(),
                port: req.port,
            });
        }

        self.unregister(id).map(Expiry::TimedOut)
    }

    /// Fail every outstanding request with the error from `make_error`.
    pub(crate) fn cancel_all(&mut self, make_error: impl Fn() -> Error) {
        let ids: Vec<i32> = self.pending.keys().copied().collect();
        for id in ids {
            if let Some(req) = self.unregister(id) {
                req.complete(Err(make_error()));
            }
        }
    }

    fn arm(timers: &mut DelayQueue<i32>, backoff: f64, req: &mut PendingRequest) {
        if let Some(key) = req.key.take() {
            timers.remove(&key);
        }
        req.timeout = req.timeout.min(MAX_TIMEOUT);
        req.key = Some(timers.insert(req.id, req.timeout));
        tracing::trace!(
            target: "snmp_session::registry",
            { snmp.request_id = req.id, snmp.timeout_ms = req.timeout.as_millis() as u64 },
            "timer armed"
        );
        req.timeout = Duration::try_from_secs_f64(req.timeout.as_secs_f64() * backoff)
            .map_or(MAX_TIMEOUT, |next| next.min(MAX_TIMEOUT));
    }

    fn publish_activity(&self) {
        let active = !self.pending.is_empty();
        self.activity.send_if_modified(|current| {
            if *current == active {
                return false;
            }
            tracing::trace!(target: "snmp_session::registry", { active }, "transport activity changed");
            *current = active;
            true
        });
    }
}
