//! UDP response truncation (RFC 1035 section 4.1.1's TC bit; RFC 6891
//! section 6.2.3 raises the ceiling when the requestor advertised a
//! larger EDNS0 payload size).
//!
//! When a response does not fit, sections are dropped from the back
//! of the message forward, cheapest first: additional records other
//! than OPT, then authority, then answers, then (as a last resort)
//! questions, setting TC once anything at all had to go.

use dns_proto::message::Message;
use dns_proto::record::RecordType;

/// Shrinks `message` in place until its serialised form fits within
/// `max_len` octets, setting the TC bit if anything was dropped.
/// Returns the serialised, possibly-truncated message.
///
/// The OPT pseudo-record (if present) is never dropped: a truncated
/// response still needs to tell the client how large a retry over
/// TCP, or a larger UDP payload, can be.
pub fn shrink_to_fit(mut message: Message, max_len: usize) -> Vec<u8> {
    if let Ok(wire) = message.serialise() {
        if wire.len() <= max_len {
            return wire;
        }
    }

    let mut truncated = false;

    while message.serialise().map_or(true, |w| w.len() > max_len) && !message.additional.is_empty() {
        let drop_at = message
            .additional
            .iter()
            .rposition(|rr| rr.rtype() != RecordType::OPT);
        match drop_at {
            Some(i) => {
                message.additional.remove(i);
                truncated = true;
            }
            None => break, // only OPT left; nothing more to drop here
        }
    }

    while message.serialise().map_or(true, |w| w.len() > max_len) && !message.authority.is_empty() {
        message.authority.pop();
        truncated = true;
    }

    while message.serialise().map_or(true, |w| w.len() > max_len) && !message.answers.is_empty() {
        message.answers.pop();
        truncated = true;
    }

    while message.serialise().map_or(true, |w| w.len() > max_len) && !message.questions.is_empty() {
        message.questions.pop();
        truncated = true;
    }

    if truncated {
        message.header.is_truncated = true;
    }

    message.serialise().unwrap_or_else(|_| {
        // Even a bare header with TC set always fits; this only
        // happens if section counts somehow still overflowed u16,
        // which the loops above already drove to zero.
        let mut minimal = message;
        minimal.questions.clear();
        minimal.answers.clear();
        minimal.authority.clear();
        minimal.additional.clear();
        minimal.header.is_truncated = true;
        minimal.serialise().expect("an empty message always serialises")
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_proto::message::{Header, Question};
    use dns_proto::name::DomainName;
    use dns_proto::record::{QueryClass, QueryType, RecordClass, RecordTypeWithData, ResourceRecord};
    use std::net::Ipv4Addr;

    fn big_response(answer_count: usize) -> Message {
        let name = DomainName::from_dotted_string("example.com.").unwrap();
        let mut header = Header::query(1, false);
        header.is_response = true;
        let mut message = Message {
            header,
            questions: vec![Question {
                name: name.clone(),
                qtype: QueryType::Record(RecordType::A),
                qclass: QueryClass::Record(RecordClass::IN),
            }],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        };
        for i in 0..answer_count {
            message.answers.push(ResourceRecord::new(
                name.clone(),
                RecordClass::IN,
                300,
                RecordTypeWithData::A {
                    address: Ipv4Addr::new(10, 0, 0, (i % 255) as u8),
                },
            ));
        }
        message
    }

    #[test]
    fn fits_untouched_when_small_enough() {
        let message = big_response(1);
        let wire = shrink_to_fit(message.clone(), 512);
        let decoded = Message::deserialise(&wire).unwrap();
        assert!(!decoded.header.is_truncated);
        assert_eq!(1, decoded.answers.len());
    }

    #[test]
    fn drops_answers_and_sets_tc_when_oversized() {
        let message = big_response(200);
        let wire = shrink_to_fit(message, 512);
        assert!(wire.len() <= 512);
        let decoded = Message::deserialise(&wire).unwrap();
        assert!(decoded.header.is_truncated);
        assert!(decoded.answers.len() < 200);
    }
}
