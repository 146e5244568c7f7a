// secure_chat/shared_crypto/tests/session.rs

use rand::rngs::StdRng;
use rand::SeedableRng;
use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader};

use shared_crypto::handshake::client_handshake;
use shared_crypto::{
    run_server_session, ClientSession, HandshakeState, KeyGenConfig, KeyPair, LineConnection,
    ProtocolError, Record, RecordTransport, ServerKeys,
};

fn fixed_keys() -> ServerKeys {
    ServerKeys {
        ca: KeyPair::from_primes(7_919, 7_907, 5_003).unwrap(),
        server: KeyPair::from_primes(5_009, 5_011, 5_021).unwrap(),
    }
}

#[tokio::test]
async fn test_full_session_with_generated_keys() {
    let mut rng = StdRng::seed_from_u64(31);
    let keys = ServerKeys::generate(&mut rng, &KeyGenConfig::default()).unwrap();
    let (server_io, client_io) = duplex(4096);

    let server = tokio::spawn(async move {
        let mut conn = LineConnection::new(server_io, "client");
        run_server_session(&mut conn, &keys).await
    });

    let conn = LineConnection::new(client_io, "server");
    let mut client = ClientSession::establish(conn, &mut rng, &KeyGenConfig::default())
        .await
        .unwrap();
    let first = client.send("HI BOB").await.unwrap();
    let second = client.send("the quick brown fox").await.unwrap();
    client.close().await.unwrap();

    let transcript = server.await.unwrap().unwrap();
    assert_eq!(transcript.len(), 2);
    assert_eq!(transcript[0].plaintext, "HI BOB");
    assert_eq!(transcript[0].ciphertext, first.ciphertext);
    assert_eq!(transcript[1].plaintext, "the quick brown fox");
    assert_eq!(transcript[1].ciphertext, second.ciphertext);
}

#[tokio::test]
async fn test_server_wire_sequence() {
    let keys = fixed_keys();
    let (server_io, client_io) = duplex(4096);

    let server = tokio::spawn(async move {
        let mut conn = LineConnection::new(server_io, "client");
        run_server_session(&mut conn, &keys).await
    });

    let (read_half, mut write_half) = tokio::io::split(client_io);
    let mut lines = BufReader::new(read_half).lines();

    let ca_line = lines.next_line().await.unwrap().unwrap();
    assert_eq!(ca_line, format!("CA {} {}", keys.ca.e, keys.ca.n));

    let key_line = lines.next_line().await.unwrap().unwrap();
    let Ok(Record::PublicKey { e, n }) = key_line.parse::<Record>() else {
        panic!("unexpected line {:?}", key_line);
    };
    let ca = keys.ca.public_key();
    let server_key = KeyPair::public(ca.encrypt_raw(e), ca.encrypt_raw(n));
    assert_eq!(server_key, keys.server.public_key());

    let nonce = 4_321u64;
    let request = format!("ACK 226\r\nNONCE {}\r\n", server_key.encrypt_raw(nonce));
    write_half.write_all(request.as_bytes()).await.unwrap();
    assert_eq!(lines.next_line().await.unwrap().unwrap(), "ACK 220");

    // 'A' chained from the negotiated nonce, then the end-of-message marker
    let cipher = server_key.encrypt_raw(u64::from(b'A') ^ nonce);
    write_half.write_all(format!("{}\r\n\r\n", cipher).as_bytes()).await.unwrap();
    write_half.shutdown().await.unwrap();

    let transcript = server.await.unwrap().unwrap();
    assert_eq!(transcript.len(), 1);
    assert_eq!(transcript[0].plaintext, "A");
    assert_eq!(transcript[0].ciphertext, vec![cipher]);
}

#[tokio::test]
async fn test_client_aborts_on_malformed_ca_record() {
    let (mut server_io, client_io) = duplex(1024);
    server_io.write_all(b"CA 123\n").await.unwrap();

    let mut rng = StdRng::seed_from_u64(0);
    let mut conn = LineConnection::new(client_io, "server");
    let err = client_handshake(&mut conn, &mut rng, &KeyGenConfig::default())
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::MalformedRecord { keyword: "CA", expected: 2, got: 1 }
    ));
}

#[tokio::test]
async fn test_server_aborts_on_bad_ack() {
    let keys = fixed_keys();
    let (server_io, client_io) = duplex(4096);
    let server = tokio::spawn(async move {
        let mut conn = LineConnection::new(server_io, "client");
        run_server_session(&mut conn, &keys).await
    });

    let mut client = LineConnection::new(client_io, "server");
    client.recv_record().await.unwrap();
    client.recv_record().await.unwrap();
    client.send_record(&Record::Ack(500)).await.unwrap();

    let err = server.await.unwrap().unwrap_err();
    assert!(matches!(err, ProtocolError::AckMismatch { expected: 226, got: 500 }));
}

#[tokio::test]
async fn test_server_aborts_on_record_out_of_order() {
    let keys = fixed_keys();
    let (server_io, client_io) = duplex(4096);
    let server = tokio::spawn(async move {
        let mut conn = LineConnection::new(server_io, "client");
        run_server_session(&mut conn, &keys).await
    });

    let mut client = LineConnection::new(client_io, "server");
    client.recv_record().await.unwrap();
    client.recv_record().await.unwrap();
    client.send_record(&Record::CipherChar(42)).await.unwrap();

    let err = server.await.unwrap().unwrap_err();
    assert!(matches!(
        err,
        ProtocolError::UnexpectedRecord {
            state: HandshakeState::AwaitClientAck,
            record: Record::CipherChar(42)
        }
    ));
}

#[tokio::test]
async fn test_server_reports_hang_up_mid_message() {
    let keys = fixed_keys();
    let (server_io, client_io) = duplex(4096);
    let server = tokio::spawn(async move {
        let mut conn = LineConnection::new(server_io, "client");
        run_server_session(&mut conn, &keys).await
    });

    let mut rng = StdRng::seed_from_u64(8);
    let mut conn = LineConnection::new(client_io, "server");
    let session = client_handshake(&mut conn, &mut rng, &KeyGenConfig::default())
        .await
        .unwrap();
    let mut nonce = session.nonce;
    let cipher = shared_crypto::encrypt_char(b'x', &mut nonce, &session.key);
    conn.send_record(&Record::CipherChar(cipher)).await.unwrap();
    conn.close().await.unwrap();

    let err = server.await.unwrap().unwrap_err();
    assert!(matches!(err, ProtocolError::ConnectionClosed));
}
