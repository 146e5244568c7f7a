// secure_chat/shared_crypto/src/session.rs

//! One connection from handshake to hang-up, for each side.

use rand::Rng;
use tracing::{info, warn};

use crate::channel::{FramedMessage, InboundChannel, OutboundChannel, ReceivedMessage};
use crate::config::KeyGenConfig;
use crate::error::Result;
use crate::handshake::{client_handshake, server_handshake};
use crate::rsa::ServerKeys;
use crate::transport::RecordTransport;

/// Serves one client: handshake, then messages until the client disconnects.
///
/// Returns every message received. Any error ends the session; the caller
/// decides whether to accept another connection.
pub async fn run_server_session<T>(transport: &mut T, keys: &ServerKeys) -> Result<Vec<ReceivedMessage>>
where
    T: RecordTransport + ?Sized,
{
    let session = server_handshake(transport, keys).await?;
    info!(peer = transport.peer_addr(), "Handshake complete, waiting for messages");

    let mut inbound = InboundChannel::new(session);
    let mut transcript = Vec::new();
    while let Some(message) = inbound.receive(transport).await? {
        transcript.push(message);
    }
    info!(
        peer = transport.peer_addr(),
        messages = transcript.len(),
        "Client disconnected"
    );
    Ok(transcript)
}

/// Client side of an established session.
pub struct ClientSession<T> {
    transport: T,
    channel: OutboundChannel,
}

impl<T: RecordTransport> ClientSession<T> {
    /// Runs the handshake over `transport` and keeps it for the message phase.
    pub async fn establish<R: Rng>(mut transport: T, rng: &mut R, config: &KeyGenConfig) -> Result<Self> {
        let session = client_handshake(&mut transport, rng, config).await?;
        info!(peer = transport.peer_addr(), "Handshake complete, ready to send");
        Ok(Self {
            transport,
            channel: OutboundChannel::new(session),
        })
    }

    pub async fn send(&mut self, message: &str) -> Result<FramedMessage> {
        self.channel.send(&mut self.transport, message).await
    }

    /// Shuts down the write side so the server sees a clean hang-up.
    pub async fn close(mut self) -> Result<()> {
        if let Err(e) = self.transport.close().await {
            warn!("Error while closing the connection: {}", e);
            return Err(e);
        }
        Ok(())
    }
}
