//! Wire framing for UDP and TCP: UDP is a bare datagram capped at 512
//! octets unless EDNS0 raised the limit; TCP messages are prefixed
//! with a two-octet big-endian length (RFC 1035 section 4.2.2).

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};

use crate::TransportError;

/// The historical UDP message size limit absent EDNS0 (RFC 1035
/// section 2.3.4).
pub const CLASSIC_UDP_MAX: usize = 512;

/// Sends `message` as a single UDP datagram. The caller is
/// responsible for having already shaped `message` to fit within the
/// negotiated payload size (see `dns-server`'s truncation strategy);
/// this function only refuses to send something that can't possibly
/// be a valid DNS message.
pub async fn send_udp_message(socket: &UdpSocket, message: &[u8]) -> Result<(), TransportError> {
    if message.len() < 12 {
        return Err(TransportError::MessageTooLargeForUdp(message.len()));
    }
    socket
        .send(message)
        .await
        .map_err(|source| TransportError::Io {
            endpoint: crate::Endpoint::default(),
            source,
        })?;
    Ok(())
}

/// Receives one UDP datagram into a buffer sized for the classic
/// 512-octet limit plus headroom for EDNS0-negotiated larger
/// payloads.
pub async fn recv_udp_message(socket: &UdpSocket, max_len: usize) -> Result<BytesMut, TransportError> {
    let mut buf = BytesMut::zeroed(max_len);
    let n = socket.recv(&mut buf).await.map_err(|source| TransportError::Io {
        endpoint: crate::Endpoint::default(),
        source,
    })?;
    buf.truncate(n);
    Ok(buf)
}

/// Writes `message` to `stream` with its two-octet length prefix.
pub async fn send_tcp_message(stream: &mut TcpStream, message: &[u8]) -> Result<(), TransportError> {
    let len = u16::try_from(message.len())
        .map_err(|_| TransportError::TcpLengthPrefixInvalid(u16::MAX))?;
    stream.write_all(&len.to_be_bytes()).await.map_err(io_err)?;
    stream.write_all(message).await.map_err(io_err)?;
    Ok(())
}

/// Reads one length-prefixed message from `stream`.
pub async fn read_tcp_message(stream: &mut TcpStream) -> Result<BytesMut, TransportError> {
    let mut len_octets = [0u8; 2];
    stream.read_exact(&mut len_octets).await.map_err(io_err)?;
    let len = u16::from_be_bytes(len_octets) as usize;

    let mut buf = BytesMut::with_capacity(len);
    buf.resize(len, 0);
    stream.read_exact(&mut buf).await.map_err(io_err)?;
    Ok(buf)
}

/// Reads as many length-prefixed messages as are available without
/// blocking for more than one TCP frame's worth of I/O, used by the
/// client when draining a multi-message AXFR/IXFR response. Returns
/// an empty vector once the peer closes the connection cleanly.
pub async fn read_tcp_messages_until_closed(
    stream: &mut TcpStream,
) -> Result<Vec<BytesMut>, TransportError> {
    let mut messages = Vec::new();
    loop {
        let mut len_octets = [0u8; 2];
        match stream.read_exact(&mut len_octets).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(e) => return Err(io_err(e)),
        }
        let len = u16::from_be_bytes(len_octets) as usize;
        let mut buf = BytesMut::with_capacity(len);
        buf.resize(len, 0);
        stream.read_exact(&mut buf).await.map_err(io_err)?;
        messages.push(buf);
    }
    Ok(messages)
}

fn io_err(source: std::io::Error) -> TransportError {
    TransportError::Io {
        endpoint: crate::Endpoint::default(),
        source,
    }
}

/// Convenience: `true` if `message` must go out over TCP (either it
/// is itself too large for a UDP datagram at `udp_payload_size`, or
/// the caller has already decided this transaction requires TCP,
/// e.g. AXFR).
pub fn requires_tcp(message: &[u8], udp_payload_size: usize) -> bool {
    message.len() > udp_payload_size
}
