// secure_chat/shared_crypto/src/transport.rs

//! Line-framed record transport over any tokio byte stream.

use async_trait::async_trait;
use tokio::io::{
    AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, BufReader, BufWriter,
    ReadHalf, WriteHalf,
};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::trace;

use crate::config::MAX_RECORD_LEN;
use crate::error::{ProtocolError, Result};
use crate::models::Record;

/// Ordered, reliable exchange of records with one peer.
#[async_trait]
pub trait RecordTransport: Send {
    /// Writes one record followed by a line feed.
    async fn send_record(&mut self, record: &Record) -> Result<()>;

    /// Waits for the next full line and parses it.
    async fn recv_record(&mut self) -> Result<Record>;

    /// Flushes and shuts down the write side.
    async fn close(&mut self) -> Result<()>;

    /// Peer address, for logs.
    fn peer_addr(&self) -> &str;
}

/// Splits a byte stream into LF-terminated records.
pub struct LineConnection<S> {
    reader: BufReader<ReadHalf<S>>,
    writer: BufWriter<WriteHalf<S>>,
    peer_addr: String,
}

/// A record connection over TCP.
pub type TcpConnection = LineConnection<TcpStream>;

impl<S: AsyncRead + AsyncWrite> LineConnection<S> {
    pub fn new(stream: S, peer_addr: impl Into<String>) -> Self {
        let (read_half, write_half) = tokio::io::split(stream);
        Self {
            reader: BufReader::new(read_half),
            writer: BufWriter::new(write_half),
            peer_addr: peer_addr.into(),
        }
    }

    /// Reads up to the next LF. CRs are dropped wherever they appear.
    pub async fn read_line(&mut self) -> Result<String> {
        let mut buf = Vec::new();
        // room for the longest record plus "\r\n"
        let limit = MAX_RECORD_LEN as u64 + 2;
        let read = (&mut self.reader).take(limit).read_until(b'\n', &mut buf).await?;
        if read == 0 {
            return Err(ProtocolError::ConnectionClosed);
        }
        if buf.last() != Some(&b'\n') {
            if read as u64 == limit {
                return Err(ProtocolError::RecordTooLong(MAX_RECORD_LEN));
            }
            // stream ended in the middle of a line
            return Err(ProtocolError::ConnectionClosed);
        }
        buf.pop();
        buf.retain(|&b| b != b'\r');
        if buf.len() > MAX_RECORD_LEN {
            return Err(ProtocolError::RecordTooLong(MAX_RECORD_LEN));
        }
        if !buf.is_ascii() {
            return Err(ProtocolError::NotAscii);
        }
        String::from_utf8(buf).map_err(|_| ProtocolError::NotAscii)
    }
}

impl TcpConnection {
    pub fn from_stream(stream: TcpStream) -> Self {
        let peer_addr = stream
            .peer_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| "unknown".to_string());
        Self::new(stream, peer_addr)
    }

    pub async fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        Ok(Self::from_stream(stream))
    }
}

#[async_trait]
impl<S> RecordTransport for LineConnection<S>
where
    S: AsyncRead + AsyncWrite + Send,
{
    async fn send_record(&mut self, record: &Record) -> Result<()> {
        let line = format!("{}\n", record);
        trace!(peer = %self.peer_addr, line = line.trim_end(), "send");
        self.writer.write_all(line.as_bytes()).await?;
        self.writer.flush().await?;
        Ok(())
    }

    async fn recv_record(&mut self) -> Result<Record> {
        let line = self.read_line().await?;
        trace!(peer = %self.peer_addr, line = %line, "recv");
        line.parse()
    }

    async fn close(&mut self) -> Result<()> {
        self.writer.flush().await?;
        self.writer.shutdown().await?;
        Ok(())
    }

    fn peer_addr(&self) -> &str {
        &self.peer_addr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::duplex;

    #[tokio::test]
    async fn test_records_cross_the_stream() {
        let (a, b) = duplex(1024);
        let mut left = LineConnection::new(a, "left");
        let mut right = LineConnection::new(b, "right");

        left.send_record(&Record::CaKey { e: 7, n: 143 }).await.unwrap();
        left.send_record(&Record::CipherChar(42)).await.unwrap();
        left.send_record(&Record::EndOfMessage).await.unwrap();

        assert_eq!(right.recv_record().await.unwrap(), Record::CaKey { e: 7, n: 143 });
        assert_eq!(right.recv_record().await.unwrap(), Record::CipherChar(42));
        assert_eq!(right.recv_record().await.unwrap(), Record::EndOfMessage);
    }

    #[tokio::test]
    async fn test_crlf_lines_are_accepted() {
        let (mut raw, b) = duplex(1024);
        let mut conn = LineConnection::new(b, "peer");
        raw.write_all(b"ACK 226\r\n\r\n").await.unwrap();
        assert_eq!(conn.recv_record().await.unwrap(), Record::Ack(226));
        assert_eq!(conn.recv_record().await.unwrap(), Record::EndOfMessage);
    }

    #[tokio::test]
    async fn test_closed_stream() {
        let (raw, b) = duplex(64);
        let mut conn = LineConnection::new(b, "peer");
        drop(raw);
        assert!(matches!(conn.recv_record().await, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_partial_line_then_close() {
        let (mut raw, b) = duplex(64);
        let mut conn = LineConnection::new(b, "peer");
        raw.write_all(b"NONCE 12").await.unwrap();
        drop(raw);
        assert!(matches!(conn.recv_record().await, Err(ProtocolError::ConnectionClosed)));
    }

    #[tokio::test]
    async fn test_overlong_line_is_rejected() {
        let (mut raw, b) = duplex(4096);
        let mut conn = LineConnection::new(b, "peer");
        let mut line = vec![b'1'; MAX_RECORD_LEN + 10];
        line.push(b'\n');
        raw.write_all(&line).await.unwrap();
        assert!(matches!(
            conn.recv_record().await,
            Err(ProtocolError::RecordTooLong(MAX_RECORD_LEN))
        ));
    }

    #[tokio::test]
    async fn test_non_ascii_line_is_rejected() {
        let (mut raw, b) = duplex(64);
        let mut conn = LineConnection::new(b, "peer");
        raw.write_all("ACK 2é6\n".as_bytes()).await.unwrap();
        assert!(matches!(conn.recv_record().await, Err(ProtocolError::NotAscii)));
    }
}
