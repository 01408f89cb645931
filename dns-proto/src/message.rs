//! The DNS message: header, question section, and the three resource
//! record sections (RFC 1035 section 4).

use crate::name::DomainName;
use crate::record::{QueryClass, QueryType, ResourceRecord};
use crate::wire::{
    usize_to_u16, ConsumableBuffer, EncodeError, Error, WritableBuffer, HEADER_MASK_AA,
    HEADER_MASK_AD, HEADER_MASK_CD, HEADER_MASK_OPCODE, HEADER_MASK_QR, HEADER_MASK_RA,
    HEADER_MASK_RCODE, HEADER_MASK_RD, HEADER_MASK_TC, HEADER_MASK_Z, HEADER_OFFSET_OPCODE,
};

/// OPCODE values (RFC 1035 section 4.1.1, RFC 1996, RFC 2136).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Opcode {
    Query,
    IQuery,
    Status,
    Notify,
    Update,
    Unknown(u8),
}

impl From<u8> for Opcode {
    fn from(value: u8) -> Self {
        match value {
            0 => Opcode::Query,
            1 => Opcode::IQuery,
            2 => Opcode::Status,
            4 => Opcode::Notify,
            5 => Opcode::Update,
            other => Opcode::Unknown(other),
        }
    }
}

impl From<Opcode> for u8 {
    fn from(value: Opcode) -> Self {
        match value {
            Opcode::Query => 0,
            Opcode::IQuery => 1,
            Opcode::Status => 2,
            Opcode::Notify => 4,
            Opcode::Update => 5,
            Opcode::Unknown(other) => other,
        }
    }
}

/// The full 12-bit RCODE space: the wire header only carries the low
/// 4 bits (RFC 1035), EDNS0 extends it to 12 bits by borrowing 8 more
/// from the OPT record's TTL field (RFC 6891 section 6.1.3), and TSIG
/// defines extended values above 15 exclusively reachable that way
/// (RFC 8945 section 5.3).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct Rcode(pub u16);

impl Rcode {
    pub const NO_ERROR: Rcode = Rcode(0);
    pub const FORMAT_ERROR: Rcode = Rcode(1);
    pub const SERVER_FAILURE: Rcode = Rcode(2);
    pub const NAME_ERROR: Rcode = Rcode(3);
    pub const NOT_IMPLEMENTED: Rcode = Rcode(4);
    pub const REFUSED: Rcode = Rcode(5);
    pub const BADSIG: Rcode = Rcode(16);
    pub const BADKEY: Rcode = Rcode(17);
    pub const BADTIME: Rcode = Rcode(18);
    pub const BADTRUNC: Rcode = Rcode(22);

    /// The low 4 bits stored directly in the header.
    pub fn low4(self) -> u8 {
        (self.0 & 0x000F) as u8
    }

    /// The high 8 bits an EDNS0-aware sender stores in the OPT
    /// record's TTL field.
    pub fn extended_high8(self) -> u8 {
        (self.0 >> 4) as u8
    }

    /// Combines the header's low 4 bits with the OPT record's
    /// extended high 8 bits into the effective 12-bit RCODE (RFC 6891
    /// section 6.1.3).
    pub fn from_parts(low4: u8, extended_high8: u8) -> Self {
        Rcode((u16::from(extended_high8) << 4) | u16::from(low4 & 0x0F))
    }
}

/// The fixed-width fields of a DNS header excluding the four 16-bit
/// section counts, which [`WireHeader`] tracks separately since they
/// are derived from the section vectors once a [`Message`] is built
/// in memory.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct Header {
    pub id: u16,
    pub is_response: bool,
    pub opcode: Opcode,
    pub is_authoritative: bool,
    pub is_truncated: bool,
    pub recursion_desired: bool,
    pub recursion_available: bool,
    pub z: bool,
    pub authentic_data: bool,
    pub checking_disabled: bool,
    pub rcode_low4: u8,
}

impl Header {
    pub fn query(id: u16, recursion_desired: bool) -> Self {
        Header {
            id,
            is_response: false,
            opcode: Opcode::Query,
            is_authoritative: false,
            is_truncated: false,
            recursion_desired,
            recursion_available: false,
            z: false,
            authentic_data: false,
            checking_disabled: false,
            rcode_low4: 0,
        }
    }

    pub(crate) fn serialise(&self, buf: &mut WritableBuffer) {
        buf.write_u16(self.id);
        let mut flags: u16 = 0;
        if self.is_response {
            flags |= HEADER_MASK_QR;
        }
        flags |= (u16::from(u8::from(self.opcode)) << HEADER_OFFSET_OPCODE) & HEADER_MASK_OPCODE;
        if self.is_authoritative {
            flags |= HEADER_MASK_AA;
        }
        if self.is_truncated {
            flags |= HEADER_MASK_TC;
        }
        if self.recursion_desired {
            flags |= HEADER_MASK_RD;
        }
        if self.recursion_available {
            flags |= HEADER_MASK_RA;
        }
        if self.z {
            flags |= HEADER_MASK_Z;
        }
        if self.authentic_data {
            flags |= HEADER_MASK_AD;
        }
        if self.checking_disabled {
            flags |= HEADER_MASK_CD;
        }
        flags |= u16::from(self.rcode_low4) & HEADER_MASK_RCODE;
        buf.write_u16(flags);
    }

    pub(crate) fn deserialise(buf: &mut ConsumableBuffer) -> Result<Self, Error> {
        let id = buf.next_u16().ok_or(Error::HeaderTooShort)?;
        let flags = buf.next_u16().ok_or(Error::HeaderTooShort)?;
        let opcode_bits = ((flags & HEADER_MASK_OPCODE) >> HEADER_OFFSET_OPCODE) as u8;
        Ok(Header {
            id,
            is_response: flags & HEADER_MASK_QR != 0,
            opcode: Opcode::from(opcode_bits),
            is_authoritative: flags & HEADER_MASK_AA != 0,
            is_truncated: flags & HEADER_MASK_TC != 0,
            recursion_desired: flags & HEADER_MASK_RD != 0,
            recursion_available: flags & HEADER_MASK_RA != 0,
            z: flags & HEADER_MASK_Z != 0,
            authentic_data: flags & HEADER_MASK_AD != 0,
            checking_disabled: flags & HEADER_MASK_CD != 0,
            rcode_low4: (flags & HEADER_MASK_RCODE) as u8,
        })
    }
}

/// [`Header`] plus the four section counts, as they appear on the
/// wire. A `WireHeader` is only constructed transiently during
/// (de)serialisation; in memory a [`Message`]'s counts are always the
/// length of its section vectors.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct WireHeader {
    pub header: Header,
    pub qdcount: u16,
    pub ancount: u16,
    pub nscount: u16,
    pub arcount: u16,
}

impl WireHeader {
    pub(crate) fn serialise(&self, buf: &mut WritableBuffer) {
        self.header.serialise(buf);
        buf.write_u16(self.qdcount);
        buf.write_u16(self.ancount);
        buf.write_u16(self.nscount);
        buf.write_u16(self.arcount);
    }

    pub(crate) fn deserialise(buf: &mut ConsumableBuffer) -> Result<Self, Error> {
        let header = Header::deserialise(buf)?;
        let qdcount = buf.next_u16().ok_or(Error::HeaderTooShort)?;
        let ancount = buf.next_u16().ok_or(Error::HeaderTooShort)?;
        let nscount = buf.next_u16().ok_or(Error::HeaderTooShort)?;
        let arcount = buf.next_u16().ok_or(Error::HeaderTooShort)?;
        Ok(WireHeader {
            header,
            qdcount,
            ancount,
            nscount,
            arcount,
        })
    }
}

/// A single entry in the question section (RFC 1035 section 4.1.2).
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Question {
    pub name: DomainName,
    pub qtype: QueryType,
    pub qclass: QueryClass,
}

impl Question {
    pub(crate) fn serialise(&self, buf: &mut WritableBuffer) {
        self.name.serialise(buf, true);
        buf.write_u16(self.qtype.into());
        buf.write_u16(self.qclass.into());
    }

    pub(crate) fn deserialise(buf: &mut ConsumableBuffer) -> Result<Self, Error> {
        let start = buf.position();
        let name = DomainName::deserialise(buf)?;
        let qtype = buf.next_u16().ok_or(Error::QuestionTooShort(start))?.into();
        let qclass = buf.next_u16().ok_or(Error::QuestionTooShort(start))?.into();
        Ok(Question { name, qtype, qclass })
    }
}

/// A complete DNS message: header, question, and the answer,
/// authority and additional sections (RFC 1035 section 4.1).
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub header: Header,
    pub questions: Vec<Question>,
    pub answers: Vec<ResourceRecord>,
    pub authority: Vec<ResourceRecord>,
    pub additional: Vec<ResourceRecord>,
}

impl Message {
    /// Builds a minimal query message for `question`, with a fresh ID
    /// and RD set according to `recursion_desired`.
    pub fn from_question(id: u16, question: Question, recursion_desired: bool) -> Self {
        Message {
            header: Header::query(id, recursion_desired),
            questions: vec![question],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// Builds an empty response header (QR set, ID and question
    /// copied from `self`) that a server can fill in with answer
    /// records and an RCODE.
    pub fn make_response(&self) -> Self {
        let mut header = self.header;
        header.is_response = true;
        header.recursion_available = false;
        header.rcode_low4 = Rcode::NO_ERROR.low4();
        Message {
            header,
            questions: self.questions.clone(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    /// Builds a `FormatError` response to a request that could not be
    /// fully parsed: only the ID (and, where recoverable, the
    /// question) need to be known.
    pub fn make_format_error_response(id: u16) -> Self {
        let mut header = Header::query(id, false);
        header.is_response = true;
        header.rcode_low4 = Rcode::FORMAT_ERROR.low4();
        Message {
            header,
            questions: Vec::new(),
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    pub fn is_query(&self) -> bool {
        !self.header.is_response
    }

    /// The OPT pseudo-record in the additional section, if present.
    pub fn opt(&self) -> Option<&ResourceRecord> {
        self.additional
            .iter()
            .find(|rr| rr.rtype() == crate::record::RecordType::OPT)
    }

    /// The effective 12-bit RCODE, combining the header's low 4 bits
    /// with the OPT record's extended high 8 bits when present.
    pub fn rcode(&self) -> Rcode {
        match self.opt() {
            Some(opt) => Rcode::from_parts(self.header.rcode_low4, opt.edns_fields().extended_rcode_high8),
            None => Rcode(u16::from(self.header.rcode_low4)),
        }
    }

    pub fn serialise(&self) -> Result<Vec<u8>, EncodeError> {
        let mut buf = WritableBuffer::new();
        let wire_header = WireHeader {
            header: self.header,
            qdcount: usize_to_u16("question", self.questions.len())?,
            ancount: usize_to_u16("answer", self.answers.len())?,
            nscount: usize_to_u16("authority", self.authority.len())?,
            arcount: usize_to_u16("additional", self.additional.len())?,
        };
        wire_header.serialise(&mut buf);
        for question in &self.questions {
            question.serialise(&mut buf);
        }
        for rr in self.answers.iter().chain(&self.authority).chain(&self.additional) {
            rr.serialise(&mut buf)?;
        }
        Ok(buf.into_octets())
    }

    pub fn deserialise(octets: &[u8]) -> Result<Self, Error> {
        let mut buf = ConsumableBuffer::new(octets);
        let wire_header = WireHeader::deserialise(&mut buf)?;

        let mut questions = Vec::with_capacity(wire_header.qdcount as usize);
        for _ in 0..wire_header.qdcount {
            questions.push(Question::deserialise(&mut buf)?);
        }

        let mut answers = Vec::with_capacity(wire_header.ancount as usize);
        for _ in 0..wire_header.ancount {
            answers.push(ResourceRecord::deserialise(&mut buf)?);
        }

        let mut authority = Vec::with_capacity(wire_header.nscount as usize);
        for _ in 0..wire_header.nscount {
            authority.push(ResourceRecord::deserialise(&mut buf)?);
        }

        let mut additional = Vec::with_capacity(wire_header.arcount as usize);
        for _ in 0..wire_header.arcount {
            additional.push(ResourceRecord::deserialise(&mut buf)?);
        }

        Ok(Message {
            header: wire_header.header,
            questions,
            answers,
            authority,
            additional,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::{RecordClass, RecordType, RecordTypeWithData};
    use std::net::Ipv4Addr;

    fn question(name: &str) -> Question {
        Question {
            name: DomainName::from_dotted_string(name).unwrap(),
            qtype: QueryType::Record(RecordType::A),
            qclass: QueryClass::Record(RecordClass::IN),
        }
    }

    #[test]
    fn query_round_trips() {
        let msg = Message::from_question(0xBEEF, question("example.com."), true);
        let octets = msg.serialise().unwrap();
        let decoded = Message::deserialise(&octets).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn response_with_answer_round_trips_and_compresses() {
        let mut msg = Message::from_question(1, question("www.example.com."), true);
        msg.header.is_response = true;
        msg.answers.push(ResourceRecord::new(
            DomainName::from_dotted_string("www.example.com.").unwrap(),
            RecordClass::IN,
            60,
            RecordTypeWithData::A {
                address: Ipv4Addr::new(127, 0, 0, 1),
            },
        ));
        let octets = msg.serialise().unwrap();
        // The answer's owner name is identical to the question's, so
        // a compliant encoder should have pointed back to it instead
        // of repeating "www.example.com." in full.
        assert!(octets.len() < 2 * "www.example.com.".len());
        let decoded = Message::deserialise(&octets).unwrap();
        assert_eq!(msg, decoded);
    }

    #[test]
    fn rcode_combines_header_and_opt() {
        let mut msg = Message::from_question(1, question("example.com."), false);
        msg.header.rcode_low4 = Rcode::BADSIG.low4();
        msg.additional.push(ResourceRecord::new_opt(
            crate::opt::EdnsFields {
                udp_payload_size: 4096,
                extended_rcode_high8: Rcode::BADSIG.extended_high8(),
                version: 0,
                do_flag: false,
            },
            vec![],
        ));
        assert_eq!(Rcode::BADSIG, msg.rcode());
    }
}
