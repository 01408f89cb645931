//! Zone transfer (AXFR, RFC 5936; IXFR, RFC 1995): a TCP-only
//! exchange whose response may span many length-prefixed messages,
//! bounded by an SOA record at the start and end of the sequence.

use tokio::net::TcpStream;

use dns_proto::message::Message;
use dns_proto::record::RecordTypeWithData;
use dns_transport::framing::{read_tcp_message, send_tcp_message};

use crate::query::QueryError;

/// Reads every message of an AXFR response from an already-connected,
/// already-sent-to `stream`, stopping once the closing SOA (matching
/// the opening SOA's serial) has been seen, per RFC 5936 section 2.2.
pub async fn receive_axfr(stream: &mut TcpStream) -> Result<Vec<Message>, QueryError> {
    let mut messages = Vec::new();
    let mut opening_serial = None;
    let mut records_seen_since_opening = 0u64;

    loop {
        let raw = read_tcp_message(stream)
            .await
            .map_err(QueryError::Transport)?;
        let message = Message::deserialise(&raw).map_err(|_| QueryError::ResponseMismatch)?;
        messages.push(message);
        let message = messages.last().unwrap();

        for rr in &message.answers {
            let RecordTypeWithData::Soa { serial, .. } = &rr.rdata else {
                records_seen_since_opening += 1;
                continue;
            };
            match opening_serial {
                None => opening_serial = Some(*serial),
                Some(first) if *serial == first && records_seen_since_opening > 0 => {
                    return Ok(messages);
                }
                _ => {}
            }
            records_seen_since_opening += 1;
        }

        // RFC 5936 section 2.2: a single-record zone (just the SOA)
        // opens and closes the transfer in the same message.
        if messages.len() == 1 && records_seen_since_opening == 1 && message.answers.len() == 1 {
            return Ok(messages);
        }
    }
}

/// Sends an AXFR request over a fresh TCP connection and assembles
/// the full response.
pub async fn axfr(stream: &mut TcpStream, request: &Message) -> Result<Vec<Message>, QueryError> {
    let wire = request.serialise().map_err(|_| QueryError::ResponseMismatch)?;
    send_tcp_message(stream, &wire)
        .await
        .map_err(QueryError::Transport)?;
    receive_axfr(stream).await
}
