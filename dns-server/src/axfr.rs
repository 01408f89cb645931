//! Multi-packet AXFR responses (RFC 5936 section 2.2): a zone's full
//! record set, split across as many length-prefixed TCP messages as
//! it takes, each kept under a conservative size so it fits
//! comfortably within a single TCP segment chain.

use dns_proto::message::{Message, Question};
use dns_proto::record::ResourceRecord;

/// Packets are kept under this many records, or this many octets of
/// estimated RDATA, whichever comes first — generous enough that
/// real zones rarely need more than a handful of packets, small
/// enough that a single packet never risks exceeding the 65,535-octet
/// TCP message ceiling.
pub const MAX_RECORDS_PER_PACKET: usize = 100;
pub const SOFT_OCTET_CEILING: usize = 32_000;

/// Splits `records` (SOA-first, SOA-last, as produced by
/// [`crate::zone::Zone::all_records_for_axfr`]) into one or more
/// response messages answering `question`, each a valid, independently
/// serialisable [`Message`].
pub fn split_into_packets(question: &Question, records: Vec<ResourceRecord>) -> Vec<Message> {
    let mut packets = Vec::new();
    let mut current = Vec::new();
    let mut current_octets = 0usize;

    for rr in records {
        let estimated_len = rr.name.wire_len() + 10 + estimate_rdata_len(&rr);
        if !current.is_empty()
            && (current.len() >= MAX_RECORDS_PER_PACKET || current_octets + estimated_len > SOFT_OCTET_CEILING)
        {
            packets.push(current_octets_to_message(question, std::mem::take(&mut current)));
            current_octets = 0;
        }
        current_octets += estimated_len;
        current.push(rr);
    }
    if !current.is_empty() {
        packets.push(current_octets_to_message(question, current));
    }
    packets
}

fn current_octets_to_message(question: &Question, records: Vec<ResourceRecord>) -> Message {
    let mut header = dns_proto::message::Header::query(0, false);
    header.is_response = true;
    header.is_authoritative = true;
    Message {
        header,
        questions: vec![question.clone()],
        answers: records,
        authority: Vec::new(),
        additional: Vec::new(),
    }
}

fn estimate_rdata_len(rr: &ResourceRecord) -> usize {
    // A generous fixed estimate rather than a precise serialisation:
    // precise packing only matters for staying under the soft
    // ceiling, and overestimating just means slightly smaller
    // packets, never an oversized one.
    match &rr.rdata {
        dns_proto::record::RecordTypeWithData::Txt { octets } => {
            octets.iter().map(|c| c.len() + 1).sum()
        }
        dns_proto::record::RecordTypeWithData::Unknown { octets, .. } => octets.len(),
        _ => 64,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_proto::name::DomainName;
    use dns_proto::record::{QueryClass, QueryType, RecordClass, RecordType, RecordTypeWithData};

    fn question() -> Question {
        Question {
            name: DomainName::from_dotted_string("example.com.").unwrap(),
            qtype: QueryType::Axfr,
            qclass: QueryClass::Record(RecordClass::IN),
        }
    }

    fn dummy_a(i: u8) -> ResourceRecord {
        ResourceRecord::new(
            DomainName::from_dotted_string("example.com.").unwrap(),
            RecordClass::IN,
            300,
            RecordTypeWithData::A {
                address: std::net::Ipv4Addr::new(10, 0, 0, i),
            },
        )
    }

    #[test]
    fn splits_large_zones_across_multiple_packets() {
        let records: Vec<ResourceRecord> = (0..250).map(|i| dummy_a((i % 255) as u8)).collect();
        let packets = split_into_packets(&question(), records);
        assert!(packets.len() >= 3);
        for packet in &packets {
            assert!(packet.answers.len() <= MAX_RECORDS_PER_PACKET);
        }
    }

    #[test]
    fn small_zone_fits_one_packet() {
        let records = vec![dummy_a(1), dummy_a(2)];
        let packets = split_into_packets(&question(), records);
        assert_eq!(1, packets.len());
        assert_eq!(RecordType::A, packets[0].answers[0].rtype());
    }
}
