//! USM discovery, report handling and time resynchronization.
//!
//! A v3 session starts without knowing the agent's authoritative engine. The
//! first request goes out as an unauthenticated discovery probe; the agent
//! answers with a Report carrying its engine id, boots and time, and the real
//! request is then re-sent under those parameters. Agents that report zeroed
//! boots/time get one more round trip before their clock is trusted.

use bytes::Bytes;

use super::UsmUser;
use super::usm::{SecurityParameters, report_error};
use crate::error::{Error, Result};
use crate::message::Message;
use crate::pdu::Pdu;

/// Maximum number of Reports answered with a re-send for one logical request.
///
/// The discovery report uses the first round and a time-sync report the
/// second. A third report is delivered to the caller as a failure.
pub const MAX_RESYNC_ROUNDS: u8 = 2;

/// Enterprise prefix of locally generated engine ids (RFC 3411 format,
/// enterprise 47491, random octets).
const LOCAL_ENGINE_ID_PREFIX: [u8; 5] = [0x80, 0x00, 0xB9, 0x83, 0x80];

/// What to do with a Report PDU that answered a pending request.
#[derive(Debug)]
pub enum ReportDecision {
    /// Re-send the original PDU under the freshly learned parameters.
    ///
    /// `allow_report` is set when the agent's time is still unsynchronized,
    /// so the re-sent request may itself be answered by another Report.
    Resend { allow_report: bool },
    /// Deliver this error to the caller.
    Fail(Error),
}

/// Per-session v3 security state.
#[derive(Debug, Clone)]
pub struct SecurityCoordinator {
    user: UsmUser,
    context_name: String,
    /// Authoritative engine id, boots and time of the agent, once known.
    engine: Option<SecurityParameters>,
    /// Engine id used when this session is the authoritative side (traps).
    local_engine_id: Bytes,
}

impl SecurityCoordinator {
    pub fn new(user: UsmUser, context_name: impl Into<String>, local_engine_id: Bytes) -> Self {
        Self {
            user,
            context_name: context_name.into(),
            engine: None,
            local_engine_id,
        }
    }

    /// A random engine id in the local enterprise format.
    pub fn generate_local_engine_id() -> Result<Bytes> {
        let mut id = [0u8; 17];
        id[..5].copy_from_slice(&LOCAL_ENGINE_ID_PREFIX);
        crate::util::fill_random(&mut id[5..])?;
        Ok(Bytes::copy_from_slice(&id))
    }

    pub fn user(&self) -> &UsmUser {
        &self.user
    }

    pub fn local_engine_id(&self) -> &Bytes {
        &self.local_engine_id
    }

    /// Discovered engine parameters, if any exchange has succeeded yet.
    pub fn engine(&self) -> Option<&SecurityParameters> {
        self.engine.as_ref()
    }

    /// True until a Report or response has told us the agent's engine id.
    pub fn needs_discovery(&self) -> bool {
        self.engine.is_none()
    }

    /// Build the message for `pdu` under the known engine parameters.
    ///
    /// Returns `None` when discovery has not happened yet.
    pub fn request_message(&self, pdu: Pdu) -> Option<Message> {
        let engine = self.engine.as_ref()?;
        let params = SecurityParameters::new(
            engine.engine_id.clone(),
            engine.engine_boots,
            engine.engine_time,
            self.user.name(),
        );
        Some(Message::v3_request(
            &self.user,
            params,
            engine.engine_id.clone(),
            &self.context_name,
            pdu,
            true,
        ))
    }

    /// Build an authoritative notification (SNMPv2-Trap) message.
    ///
    /// Traps are sent under the local engine id with boots and time zero.
    pub fn trap_message(&self, pdu: Pdu) -> Message {
        let params = SecurityParameters::new(self.local_engine_id.clone(), 0, 0, self.user.name());
        Message::v3_request(
            &self.user,
            params,
            self.local_engine_id.clone(),
            &self.context_name,
            pdu,
            false,
        )
    }

    /// Handle a Report PDU that answered a pending request.
    ///
    /// The reported engine id, boots and time are always stored. A re-send is
    /// only allowed when the request kept its original PDU and still accepts
    /// reports, and only for [`MAX_RESYNC_ROUNDS`] rounds.
    pub fn on_report(
        &mut self,
        reported: &SecurityParameters,
        report: &Pdu,
        can_resend: bool,
        rounds: u8,
    ) -> ReportDecision {
        self.store(reported);

        if !can_resend {
            return ReportDecision::Fail(report_error(report));
        }
        if rounds >= MAX_RESYNC_ROUNDS {
            tracing::debug!(target: "snmp_session::v3", { snmp.rounds = rounds }, "resync rounds exhausted");
            return ReportDecision::Fail(report_error(report));
        }

        let allow_report = reported.time_unsynchronized();
        tracing::debug!(
            target: "snmp_session::v3",
            {
                snmp.engine_boots = reported.engine_boots,
                snmp.engine_time = reported.engine_time,
                snmp.rounds = rounds + 1,
                allow_report,
            },
            "resending after report"
        );
        ReportDecision::Resend { allow_report }
    }

    /// Refresh boots and time from an authenticated response.
    pub fn refresh(&mut self, reported: &SecurityParameters) {
        if reported.engine_id.is_empty() {
            return;
        }
        self.store(reported);
    }

    fn store(&mut self, reported: &SecurityParameters) {
        let changed = self
            .engine
            .as_ref()
            .is_none_or(|e| e.engine_id != reported.engine_id);
        if changed {
            tracing::debug!(
                target: "snmp_session::v3",
                { snmp.engine_id = %crate::util::hex::encode(&reported.engine_id) },
                "learned authoritative engine id"
            );
        }
        self.engine = Some(SecurityParameters::new(
            reported.engine_id.clone(),
            reported.engine_boots,
            reported.engine_time,
            self.user.name(),
        ));
    }
}
