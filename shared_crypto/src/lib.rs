// secure_chat/shared_crypto/src/lib.rs

// Declaração dos módulos da biblioteca.
pub mod channel;
pub mod cipher;
pub mod config;
pub mod error;
pub mod handshake;
pub mod models;
pub mod number_theory;
pub mod rsa;
pub mod session;
pub mod transport;

// Exporta as structs e funções públicas principais para fácil acesso pelas aplicações.
pub use channel::{is_end_of_session, FramedMessage, InboundChannel, OutboundChannel, ReceivedMessage};
pub use cipher::{decrypt_char, encrypt_char, Nonce};
pub use config::KeyGenConfig;
pub use error::{CryptoError, ProtocolError};
pub use handshake::{HandshakeSession, HandshakeState};
pub use models::Record;
pub use rsa::{generate_ca_keys, generate_server_keys, KeyPair, ServerKeys};
pub use session::{run_server_session, ClientSession};
pub use transport::{LineConnection, RecordTransport, TcpConnection};
