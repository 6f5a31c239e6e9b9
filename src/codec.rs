//! Wire codec and USM security provider.
//!
//! The session never touches bytes directly. A [`Codec`] turns [`Message`]s
//! into datagrams and back, and applies USM authentication and privacy.
//! Implementations typically use [`crate::ber`] to decode varbind values.

use bytes::Bytes;

use crate::error::Result;
use crate::message::Message;
use crate::v3::UsmUser;

/// Serialization and security collaborator of a session.
pub trait Codec: Send + Sync + 'static {
    /// Serialize `message`.
    ///
    /// For v3 messages `user` is the session's credentials (absent for the
    /// discovery request, which is always noAuthNoPriv); the codec localizes
    /// keys against `security_params.engine_id`, fills in the authentication
    /// and privacy parameters, and encrypts the scoped PDU as the message's
    /// security level requires.
    fn encode(&self, message: &Message, user: Option<&UsmUser>) -> Result<Bytes>;

    /// Parse a received datagram.
    ///
    /// v3 messages whose scoped PDU is encrypted are returned with
    /// [`ScopedPduData::Encrypted`](crate::message::ScopedPduData::Encrypted);
    /// [`process_incoming_security`](Self::process_incoming_security) decrypts them.
    fn decode(&self, data: Bytes) -> Result<Message>;

    /// Verify authentication and decrypt an incoming v3 message in place.
    ///
    /// Errors are delivered to the request the message answers.
    fn process_incoming_security(&self, message: &mut Message, user: &UsmUser) -> Result<()>;
}
