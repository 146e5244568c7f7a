// secure_chat/shared_crypto/src/handshake.rs

//! Certificate and nonce exchange.
//!
//! Both sides are plain state machines fed one parsed [`Record`] at a time and
//! answering with the records to send back. The async drivers at the bottom
//! of this file connect them to a [`RecordTransport`]; every `recv_record`
//! there is a point where the session waits on the peer.
//!
//! ```text
//! server                                client
//!   CA <e_CA> <n_CA>            ──▶     AwaitCaKey
//!   PUBLIC_KEY <e'> <n'>        ──▶     AwaitServerKey
//!   AwaitClientAck              ◀──     ACK 226
//!   AwaitNonce                  ◀──     NONCE <nonce^e_S mod n_S>
//!   ACK 220                     ──▶     AwaitNonceAck
//!   Ready                               Ready
//! ```

use rand::Rng;
use tracing::{debug, info};

use crate::cipher::Nonce;
use crate::config::{KeyGenConfig, Range, ACK_NONCE_RECEIVED, ACK_PUBLIC_KEY_RECEIVED};
use crate::error::{CryptoError, ProtocolError, Result};
use crate::models::Record;
use crate::rsa::{Certificate, KeyPair, ServerKeys};
use crate::transport::RecordTransport;

/// Position of either side in the exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    /// Client: waiting for the plaintext CA key.
    AwaitCaKey,
    /// Client: waiting for the signed server key.
    AwaitServerKey,
    /// Client: server key verified, acknowledging it and sending the nonce.
    SendAckAndNonce,
    /// Server: keys sent, waiting for `ACK 226`.
    AwaitClientAck,
    /// Server: waiting for the encrypted nonce.
    AwaitNonce,
    /// Client: nonce sent, waiting for `ACK 220`.
    AwaitNonceAck,
    /// Both: message phase.
    Ready,
}

/// Keys and nonce negotiated for one connection.
///
/// On the server `key` is its own pair, private exponent included. On the
/// client it is the server public key recovered from the certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandshakeSession {
    pub key: KeyPair,
    pub nonce: Nonce,
}

/// Server side of the exchange for one accepted connection.
#[derive(Debug)]
pub struct ServerHandshake<'k> {
    keys: &'k ServerKeys,
    state: HandshakeState,
    nonce: Option<Nonce>,
}

impl<'k> ServerHandshake<'k> {
    /// Starts the exchange and returns the two opening records: the CA key in
    /// the clear, then the server key signed with the CA private exponent.
    pub fn start(keys: &'k ServerKeys) -> Result<(Self, [Record; 2])> {
        let Certificate { e, n } = keys.certificate()?;
        let opening = [
            Record::CaKey {
                e: keys.ca.e,
                n: keys.ca.n,
            },
            Record::PublicKey { e, n },
        ];
        let handshake = Self {
            keys,
            state: HandshakeState::AwaitClientAck,
            nonce: None,
        };
        Ok((handshake, opening))
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Feeds one client record, returning the reply if there is one.
    pub fn handle(&mut self, record: Record) -> Result<Option<Record>> {
        match (self.state, record) {
            (HandshakeState::AwaitClientAck, Record::Ack(ACK_PUBLIC_KEY_RECEIVED)) => {
                info!("Client acknowledged the public key (ACK {})", ACK_PUBLIC_KEY_RECEIVED);
                self.state = HandshakeState::AwaitNonce;
                Ok(None)
            }
            (HandshakeState::AwaitClientAck, Record::Ack(got)) => Err(ProtocolError::AckMismatch {
                expected: ACK_PUBLIC_KEY_RECEIVED,
                got,
            }),
            (HandshakeState::AwaitNonce, Record::Nonce(encrypted)) => {
                // plain RSA, the nonce itself is not chained
                let nonce = self.keys.server.decrypt_raw(encrypted)?;
                debug!(encrypted, nonce, "Decrypted session nonce");
                self.nonce = Some(Nonce::new(nonce));
                self.state = HandshakeState::Ready;
                Ok(Some(Record::Ack(ACK_NONCE_RECEIVED)))
            }
            (state, record) => Err(ProtocolError::UnexpectedRecord { state, record }),
        }
    }

    /// The negotiated session, once the state machine is ready.
    pub fn session(&self) -> Option<HandshakeSession> {
        match (self.state, self.nonce) {
            (HandshakeState::Ready, Some(nonce)) => Some(HandshakeSession {
                key: self.keys.server,
                nonce,
            }),
            _ => None,
        }
    }
}

/// Client side of the exchange.
#[derive(Debug)]
pub struct ClientHandshake {
    state: HandshakeState,
    nonce_range: Range,
    ca_key: Option<KeyPair>,
    server_key: Option<KeyPair>,
    nonce: Option<Nonce>,
}

impl ClientHandshake {
    pub fn new(config: &KeyGenConfig) -> Self {
        Self {
            state: HandshakeState::AwaitCaKey,
            nonce_range: config.nonce_range,
            ca_key: None,
            server_key: None,
            nonce: None,
        }
    }

    pub fn state(&self) -> HandshakeState {
        self.state
    }

    /// Feeds one server record, returning the records to send back in order.
    pub fn handle<R: Rng>(&mut self, record: Record, rng: &mut R) -> Result<Vec<Record>> {
        match (self.state, record, self.ca_key) {
            (HandshakeState::AwaitCaKey, Record::CaKey { e, n }, _) => {
                if n < 2 {
                    return Err(ProtocolError::InvalidCertificate(format!("CA modulus {}", n)));
                }
                info!("Received the CA public key: e = {}, n = {}", e, n);
                // trusted as received
                self.ca_key = Some(KeyPair::public(e, n));
                self.state = HandshakeState::AwaitServerKey;
                Ok(Vec::new())
            }
            (HandshakeState::AwaitServerKey, Record::PublicKey { e, n }, Some(ca)) => {
                let server = Certificate { e, n }.open(&ca);
                self.check_server_key(&server)?;
                info!(
                    "Verified the server public key: e = {}, n = {}",
                    server.e, server.n
                );
                self.server_key = Some(server);
                self.state = HandshakeState::SendAckAndNonce;

                let (lo, hi) = self.nonce_range;
                let nonce = rng.gen_range(lo..=hi);
                let encrypted = server.encrypt_raw(nonce);
                debug!(nonce, encrypted, "Generated session nonce");
                self.nonce = Some(Nonce::new(nonce));
                self.state = HandshakeState::AwaitNonceAck;
                Ok(vec![
                    Record::Ack(ACK_PUBLIC_KEY_RECEIVED),
                    Record::Nonce(encrypted),
                ])
            }
            (HandshakeState::AwaitNonceAck, Record::Ack(ACK_NONCE_RECEIVED), _) => {
                info!("Server acknowledged the nonce (ACK {})", ACK_NONCE_RECEIVED);
                self.state = HandshakeState::Ready;
                Ok(Vec::new())
            }
            (HandshakeState::AwaitNonceAck, Record::Ack(got), _) => Err(ProtocolError::AckMismatch {
                expected: ACK_NONCE_RECEIVED,
                got,
            }),
            (state, record, _) => Err(ProtocolError::UnexpectedRecord { state, record }),
        }
    }

    /// The recovered key must be able to carry every nonce the client may draw.
    fn check_server_key(&self, server: &KeyPair) -> Result<()> {
        let (lo, hi) = self.nonce_range;
        if lo > hi {
            return Err(CryptoError::InvalidRange { lo, hi }.into());
        }
        if server.e == 0 {
            return Err(ProtocolError::InvalidCertificate("public exponent is zero".into()));
        }
        if server.n <= hi {
            return Err(ProtocolError::InvalidCertificate(format!(
                "server modulus {} does not exceed nonce bound {}",
                server.n, hi
            )));
        }
        Ok(())
    }

    pub fn session(&self) -> Option<HandshakeSession> {
        match (self.state, self.server_key, self.nonce) {
            (HandshakeState::Ready, Some(key), Some(nonce)) => Some(HandshakeSession { key, nonce }),
            _ => None,
        }
    }
}

/// Runs the server side of the exchange on an accepted connection.
pub async fn server_handshake<T>(transport: &mut T, keys: &ServerKeys) -> Result<HandshakeSession>
where
    T: RecordTransport + ?Sized,
{
    let (mut handshake, opening) = ServerHandshake::start(keys)?;
    for record in &opening {
        info!("----> Sending {}", record);
        transport.send_record(record).await?;
    }

    loop {
        let record = transport.recv_record().await?;
        debug!(%record, kind = record.kind(), "Handshake record from client");
        if let Some(reply) = handshake.handle(record)? {
            info!("----> Sending {}", reply);
            transport.send_record(&reply).await?;
        }
        if let Some(session) = handshake.session() {
            return Ok(session);
        }
    }
}

/// Runs the client side of the exchange on a fresh connection.
pub async fn client_handshake<T, R>(
    transport: &mut T,
    rng: &mut R,
    config: &KeyGenConfig,
) -> Result<HandshakeSession>
where
    T: RecordTransport + ?Sized,
    R: Rng,
{
    let mut handshake = ClientHandshake::new(config);
    loop {
        let record = transport.recv_record().await?;
        debug!(%record, kind = record.kind(), "Handshake record from server");
        for reply in handshake.handle(record, rng)? {
            info!("----> Sending {}", reply);
            transport.send_record(&reply).await?;
        }
        if let Some(session) = handshake.session() {
            return Ok(session);
        }
    }
}
