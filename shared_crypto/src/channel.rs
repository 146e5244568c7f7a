// secure_chat/shared_crypto/src/channel.rs

//! Message framing on top of the chained cipher.
//!
//! A message goes out as one ciphertext record per byte, with an encrypted
//! space between words and an empty record at the end. The receiving side
//! decrypts as records arrive and hands back the finished message when the
//! empty record shows up.

use tracing::{debug, info};

use crate::cipher::{decrypt_char, encrypt_char, Nonce};
use crate::config::END_OF_SESSION;
use crate::error::{ProtocolError, Result};
use crate::handshake::{HandshakeSession, HandshakeState};
use crate::models::Record;
use crate::rsa::KeyPair;
use crate::transport::RecordTransport;

/// True for the input that ends the client's session instead of being sent.
pub fn is_end_of_session(input: &str) -> bool {
    input.trim() == END_OF_SESSION
}

fn join_ciphertext(values: &[u64]) -> String {
    values.iter().map(u64::to_string).collect()
}

/// A message ready to go on the wire, with its transcript.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FramedMessage {
    /// Records in send order, end-of-message marker last.
    pub records: Vec<Record>,
    /// Words joined by single spaces, as the receiver will rebuild it.
    pub plaintext: String,
    pub ciphertext: Vec<u64>,
}

impl FramedMessage {
    /// Ciphertext values written back to back.
    pub fn ciphertext_string(&self) -> String {
        join_ciphertext(&self.ciphertext)
    }
}

/// Sending half of the message phase, owned by the client.
#[derive(Debug)]
pub struct OutboundChannel {
    peer_key: KeyPair,
    nonce: Nonce,
}

impl OutboundChannel {
    pub fn new(session: HandshakeSession) -> Self {
        Self {
            peer_key: session.key.public_key(),
            nonce: session.nonce,
        }
    }

    pub fn nonce(&self) -> Nonce {
        self.nonce
    }

    /// Encrypts a message word by word, advancing the nonce for every record.
    pub fn frame(&mut self, message: &str) -> FramedMessage {
        let mut records = Vec::new();
        let mut plaintext = String::new();
        let mut ciphertext = Vec::new();

        for (index, word) in message.split_whitespace().enumerate() {
            if index > 0 {
                let cipher = encrypt_char(b' ', &mut self.nonce, &self.peer_key);
                debug!(cipher, "Encrypted word separator");
                records.push(Record::CipherChar(cipher));
                ciphertext.push(cipher);
                plaintext.push(' ');
            }
            for byte in word.bytes() {
                let cipher = encrypt_char(byte, &mut self.nonce, &self.peer_key);
                debug!(plain = %char::from(byte), cipher, "Encrypted character");
                records.push(Record::CipherChar(cipher));
                ciphertext.push(cipher);
            }
            plaintext.push_str(word);
        }
        records.push(Record::EndOfMessage);

        FramedMessage {
            records,
            plaintext,
            ciphertext,
        }
    }

    /// Frames and writes a whole message.
    pub async fn send<T>(&mut self, transport: &mut T, message: &str) -> Result<FramedMessage>
    where
        T: RecordTransport + ?Sized,
    {
        let framed = self.frame(message);
        for record in &framed.records {
            transport.send_record(record).await?;
        }
        info!("The plain text message was:   {}", framed.plaintext);
        info!("The fully encrypted message is:   {}", framed.ciphertext_string());
        Ok(framed)
    }
}

/// A message rebuilt from the records between two end-of-message markers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedMessage {
    pub plaintext: String,
    pub ciphertext: Vec<u64>,
}

impl ReceivedMessage {
    pub fn ciphertext_string(&self) -> String {
        join_ciphertext(&self.ciphertext)
    }
}

/// Receiving half of the message phase, owned by the server.
#[derive(Debug)]
pub struct InboundChannel {
    own_key: KeyPair,
    nonce: Nonce,
    plaintext: Vec<u8>,
    ciphertext: Vec<u64>,
}

impl InboundChannel {
    pub fn new(session: HandshakeSession) -> Self {
        Self {
            own_key: session.key,
            nonce: session.nonce,
            plaintext: Vec::new(),
            ciphertext: Vec::new(),
        }
    }

    pub fn nonce(&self) -> Nonce {
        self.nonce
    }

    /// True while part of a message has been received.
    pub fn in_message(&self) -> bool {
        !self.ciphertext.is_empty()
    }

    /// Consumes one record. Returns the finished message on the end marker.
    pub fn accept(&mut self, record: Record) -> Result<Option<ReceivedMessage>> {
        match record {
            Record::CipherChar(cipher) => {
                let byte = decrypt_char(cipher, &mut self.nonce, &self.own_key)?;
                debug!(cipher, plain = %char::from(byte), "Decrypted character");
                self.plaintext.push(byte);
                self.ciphertext.push(cipher);
                Ok(None)
            }
            Record::EndOfMessage => {
                let plaintext = String::from_utf8_lossy(&std::mem::take(&mut self.plaintext)).into_owned();
                let ciphertext = std::mem::take(&mut self.ciphertext);
                Ok(Some(ReceivedMessage {
                    plaintext,
                    ciphertext,
                }))
            }
            record => Err(ProtocolError::UnexpectedRecord {
                state: HandshakeState::Ready,
                record,
            }),
        }
    }

    /// Waits for the next full message. `None` when the peer hangs up
    /// between messages.
    pub async fn receive<T>(&mut self, transport: &mut T) -> Result<Option<ReceivedMessage>>
    where
        T: RecordTransport + ?Sized,
    {
        loop {
            let record = match transport.recv_record().await {
                Ok(record) => record,
                Err(ProtocolError::ConnectionClosed) if !self.in_message() => return Ok(None),
                Err(e) => return Err(e),
            };
            if let Some(message) = self.accept(record)? {
                info!("The fully encrypted message is:   {}", message.ciphertext_string());
                info!("The fully decrypted message is:   {}", message.plaintext);
                return Ok(Some(message));
            }
        }
    }
}
