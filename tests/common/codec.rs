//! In-process codec: messages stay in memory and the wire carries their keys.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use snmp_session::error::DecodeErrorKind;
use snmp_session::v3::UsmUser;
use snmp_session::{Codec, Error, Message, Result};

/// Codec shared by a session and a [`FakeAgent`](super::FakeAgent).
///
/// Each encoded message is stored under a fresh 8-byte key, so a
/// retransmission carries the same bytes and decodes to the same message.
#[derive(Clone, Default)]
pub struct LoopbackCodec {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    messages: Mutex<HashMap<u64, Message>>,
    next: AtomicU64,
}

impl Codec for LoopbackCodec {
    fn encode(&self, message: &Message, _user: Option<&UsmUser>) -> Result<Bytes> {
        let key = self.inner.next.fetch_add(1, Ordering::Relaxed);
        self.inner
            .messages
            .lock()
            .unwrap()
            .insert(key, message.clone());
        Ok(Bytes::copy_from_slice(&key.to_be_bytes()))
    }

    fn decode(&self, data: Bytes) -> Result<Message> {
        let key: [u8; 8] = data
            .as_ref()
            .try_into()
            .map_err(|_| Error::decode(0, DecodeErrorKind::TruncatedData))?;
        self.inner
            .messages
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
