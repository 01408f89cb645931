//! Resource records: the record type/class registries, and the
//! generic resource record shape with a closed tagged union of
//! interpreted RDATA for the record kinds this crate understands
//! (plus a catch-all `Unknown` variant for everything else).
//!
//! This is deliberately not a parser for every RR type in the IANA
//! registry. The data model carries exactly the kinds the query and
//! server engines need to reason about structurally (names, SOA
//! serials, OPT/TSIG pseudo-records); everything else round-trips as
//! an opaque octet string.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::name::DomainName;
use crate::opt::OptRdata;
use crate::tsig::TsigRdata;
use crate::wire::{usize_to_u16, ConsumableBuffer, EncodeError, Error, WritableBuffer};

macro_rules! numeric_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident($repr:ty) {
            $($variant:ident = $value:expr),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
        $vis enum $name {
            $($variant),+,
            Unknown($repr),
        }

        impl From<$repr> for $name {
            fn from(value: $repr) -> Self {
                match value {
                    $($value => $name::$variant),+,
                    other => $name::Unknown(other),
                }
            }
        }

        impl From<$name> for $repr {
            fn from(value: $name) -> Self {
                match value {
                    $($name::$variant => $value),+,
                    $name::Unknown(other) => other,
                }
            }
        }
    };
}

numeric_enum! {
    /// RR TYPE values this crate gives structural meaning to (RFC
    /// 1035 section 3.2.2, RFC 3596, RFC 2782, RFC 6891, RFC 8945).
    pub enum RecordType(u16) {
        A = 1,
        NS = 2,
        CNAME = 5,
        SOA = 6,
        PTR = 12,
        MX = 15,
        TXT = 16,
        AAAA = 28,
        SRV = 33,
        OPT = 41,
        TSIG = 250,
    }
}

numeric_enum! {
    /// RR CLASS values (RFC 1035 section 3.2.4).
    pub enum RecordClass(u16) {
        IN = 1,
        CH = 3,
        HS = 4,
    }
}

/// QTYPE: a superset of [`RecordType`] with the additional values
/// that are only meaningful in the question section (RFC 1035 section
/// 3.2.3).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum QueryType {
    Record(RecordType),
    /// AXFR (252): request a zone transfer.
    Axfr,
    /// MAILB (253): request mailbox-related records.
    Mailb,
    /// MAILA (254): request mail agent RRs.
    Maila,
    /// `*` (255): request all records.
    Wildcard,
}

impl From<u16> for QueryType {
    fn from(value: u16) -> Self {
        match value {
            252 => QueryType::Axfr,
            253 => QueryType::Mailb,
            254 => QueryType::Maila,
            255 => QueryType::Wildcard,
            other => QueryType::Record(RecordType::from(other)),
        }
    }
}

impl From<QueryType> for u16 {
    fn from(value: QueryType) -> Self {
        match value {
            QueryType::Record(rtype) => rtype.into(),
            QueryType::Axfr => 252,
            QueryType::Mailb => 253,
            QueryType::Maila => 254,
            QueryType::Wildcard => 255,
        }
    }
}

/// QCLASS: a superset of [`RecordClass`] with `*` (RFC 1035 section
/// 3.2.5).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum QueryClass {
    Record(RecordClass),
    Wildcard,
}

impl From<u16> for QueryClass {
    fn from(value: u16) -> Self {
        match value {
            255 => QueryClass::Wildcard,
            other => QueryClass::Record(RecordClass::from(other)),
        }
    }
}

impl From<QueryClass> for u16 {
    fn from(value: QueryClass) -> Self {
        match value {
            QueryClass::Record(rclass) => rclass.into(),
            QueryClass::Wildcard => 255,
        }
    }
}

/// A mnemonic did not name a known record type, query type, or class.
#[derive(Debug, Clone, Eq, PartialEq, thiserror::Error)]
#[error("unrecognised name: {0}")]
pub struct UnknownMnemonic(pub String);

impl std::fmt::Display for RecordType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RecordType::A => write!(f, "A"),
            RecordType::NS => write!(f, "NS"),
            RecordType::CNAME => write!(f, "CNAME"),
            RecordType::SOA => write!(f, "SOA"),
            RecordType::PTR => write!(f, "PTR"),
            RecordType::MX => write!(f, "MX"),
            RecordType::TXT => write!(f, "TXT"),
            RecordType::AAAA => write!(f, "AAAA"),
            RecordType::SRV => write!(f, "SRV"),
            RecordType::OPT => write!(f, "OPT"),
            RecordType::TSIG => write!(f, "TSIG"),
            RecordType::Unknown(n) => write!(f, "TYPE{n}"),
        }
    }
}

impl std::str::FromStr for RecordType {
    type Err = UnknownMnemonic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "A" => Ok(RecordType::A),
            "NS" => Ok(RecordType::NS),
            "CNAME" => Ok(RecordType::CNAME),
            "SOA" => Ok(RecordType::SOA),
            "PTR" => Ok(RecordType::PTR),
            "MX" => Ok(RecordType::MX),
            "TXT" => Ok(RecordType::TXT),
            "AAAA" => Ok(RecordType::AAAA),
            "SRV" => Ok(RecordType::SRV),
            "OPT" => Ok(RecordType::OPT),
            "TSIG" => Ok(RecordType::TSIG),
            other => other
                .strip_prefix("TYPE")
                .and_then(|n| n.parse().ok())
                .map(RecordType::Unknown)
                .ok_or_else(|| UnknownMnemonic(s.to_string())),
        }
    }
}

impl std::fmt::Display for RecordClass {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            RecordClass::IN => write!(f, "IN"),
            RecordClass::CH => write!(f, "CH"),
            RecordClass::HS => write!(f, "HS"),
            RecordClass::Unknown(n) => write!(f, "CLASS{n}"),
        }
    }
}

impl std::str::FromStr for RecordClass {
    type Err = UnknownMnemonic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "IN" => Ok(RecordClass::IN),
            "CH" => Ok(RecordClass::CH),
            "HS" => Ok(RecordClass::HS),
            other => other
                .strip_prefix("CLASS")
                .and_then(|n| n.parse().ok())
                .map(RecordClass::Unknown)
                .ok_or_else(|| UnknownMnemonic(s.to_string())),
        }
    }
}

impl std::fmt::Display for QueryType {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            QueryType::Record(rtype) => rtype.fmt(f),
            QueryType::Axfr => write!(f, "AXFR"),
            QueryType::Mailb => write!(f, "MAILB"),
            QueryType::Maila => write!(f, "MAILA"),
            QueryType::Wildcard => write!(f, "ANY"),
        }
    }
}

impl std::str::FromStr for QueryType {
    type Err = UnknownMnemonic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "AXFR" => Ok(QueryType::Axfr),
            "MAILB" => Ok(QueryType::Mailb),
            "MAILA" => Ok(QueryType::Maila),
            "ANY" | "*" => Ok(QueryType::Wildcard),
            _ => RecordType::from_str(s).map(QueryType::Record),
        }
    }
}

impl std::fmt::Display for QueryClass {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            QueryClass::Record(rclass) => rclass.fmt(f),
            QueryClass::Wildcard => write!(f, "ANY"),
        }
    }
}

impl std::str::FromStr for QueryClass {
    type Err = UnknownMnemonic;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "ANY" | "*" => Ok(QueryClass::Wildcard),
            _ => RecordClass::from_str(s).map(QueryClass::Record),
        }
    }
}

/// Interpreted RDATA for the record kinds this crate understands
/// structurally. `Opt` and `Tsig` are pseudo-record RDATA: their
/// owner name, class and TTL fields are overloaded with other
/// meanings (see [`crate::opt`] and [`crate::tsig`]).
#[derive(Debug, Clone, PartialEq)]
pub enum RecordTypeWithData {
    A { address: Ipv4Addr },
    Ns { nsdname: DomainName },
    Cname { cname: DomainName },
    Soa {
        mname: DomainName,
        rname: DomainName,
        serial: u32,
        refresh: u32,
        retry: u32,
        expire: u32,
        minimum: u32,
    },
    Ptr { ptrdname: DomainName },
    Mx { preference: u16, exchange: DomainName },
    /// One or more `<character-string>`s concatenated together.
    Txt { octets: Vec<Vec<u8>> },
    Aaaa { address: Ipv6Addr },
    Srv {
        priority: u16,
        weight: u16,
        port: u16,
        target: DomainName,
    },
    Opt(OptRdata),
    Tsig(TsigRdata),
    Unknown { tag: u16, octets: Vec<u8> },
}

impl RecordTypeWithData {
    pub fn rtype(&self) -> RecordType {
        match self {
            RecordTypeWithData::A { .. } => RecordType::A,
            RecordTypeWithData::Ns { .. } => RecordType::NS,
            RecordTypeWithData::Cname { .. } => RecordType::CNAME,
            RecordTypeWithData::Soa { .. } => RecordType::SOA,
            RecordTypeWithData::Ptr { .. } => RecordType::PTR,
            RecordTypeWithData::Mx { .. } => RecordType::MX,
            RecordTypeWithData::Txt { .. } => RecordType::TXT,
            RecordTypeWithData::Aaaa { .. } => RecordType::AAAA,
            RecordTypeWithData::Srv { .. } => RecordType::SRV,
            RecordTypeWithData::Opt(_) => RecordType::OPT,
            RecordTypeWithData::Tsig(_) => RecordType::TSIG,
            RecordTypeWithData::Unknown { tag, .. } => RecordType::from(*tag),
        }
    }

    fn serialise(&self, buf: &mut WritableBuffer) {
        match self {
            RecordTypeWithData::A { address } => buf.write_octets(&address.octets()),
            RecordTypeWithData::Ns { nsdname } => nsdname.serialise(buf, true),
            RecordTypeWithData::Cname { cname } => cname.serialise(buf, true),
            RecordTypeWithData::Soa {
                mname,
                rname,
                serial,
                refresh,
                retry,
                expire,
                minimum,
            } => {
                mname.serialise(buf, true);
                rname.serialise(buf, true);
                buf.write_u32(*serial);
                buf.write_u32(*refresh);
                buf.write_u32(*retry);
                buf.write_u32(*expire);
                buf.write_u32(*minimum);
            }
            RecordTypeWithData::Ptr { ptrdname } => ptrdname.serialise(buf, true),
            RecordTypeWithData::Mx { preference, exchange } => {
                buf.write_u16(*preference);
                exchange.serialise(buf, true);
            }
            RecordTypeWithData::Txt { octets } => {
                for chunk in octets {
                    buf.write_u8(u8::try_from(chunk.len()).unwrap_or(255));
                    buf.write_octets(chunk);
                }
            }
            RecordTypeWithData::Aaaa { address } => buf.write_octets(&address.octets()),
            RecordTypeWithData::Srv {
                priority,
                weight,
                port,
                target,
            } => {
                buf.write_u16(*priority);
                buf.write_u16(*weight);
                buf.write_u16(*port);
                // RFC 2782: SRV targets are not compressed.
                target.serialise(buf, false);
            }
            RecordTypeWithData::Opt(opt) => opt.serialise_rdata(buf),
            RecordTypeWithData::Tsig(tsig) => tsig.serialise_rdata(buf),
            RecordTypeWithData::Unknown { octets, .. } => buf.write_octets(octets),
        }
    }

    fn deserialise(
        rtype: RecordType,
        buf: &mut ConsumableBuffer,
        rdlength: u16,
    ) -> Result<Self, Error> {
        let rdata_start = buf.position();
        let parsed = match rtype {
            RecordType::A => {
                let octets = buf
                    .take(4)
                    .ok_or(Error::ResourceRecordTooShort(rdata_start))?;
                RecordTypeWithData::A {
                    address: Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3]),
                }
            }
            RecordType::NS => RecordTypeWithData::Ns {
                nsdname: DomainName::deserialise(buf)?,
            },
            RecordType::CNAME => RecordTypeWithData::Cname {
                cname: DomainName::deserialise(buf)?,
            },
            RecordType::SOA => RecordTypeWithData::Soa {
                mname: DomainName::deserialise(buf)?,
                rname: DomainName::deserialise(buf)?,
                serial: buf
                    .next_u32()
                    .ok_or(Error::ResourceRecordTooShort(rdata_start))?,
                refresh: buf
                    .next_u32()
                    .ok_or(Error::ResourceRecordTooShort(rdata_start))?,
                retry: buf
                    .next_u32()
                    .ok_or(Error::ResourceRecordTooShort(rdata_start))?,
                expire: buf
                    .next_u32()
                    .ok_or(Error::ResourceRecordTooShort(rdata_start))?,
                minimum: buf
                    .next_u32()
                    .ok_or(Error::ResourceRecordTooShort(rdata_start))?,
            },
            RecordType::PTR => RecordTypeWithData::Ptr {
                ptrdname: DomainName::deserialise(buf)?,
            },
            RecordType::MX => RecordTypeWithData::Mx {
                preference: buf
                    .next_u16()
                    .ok_or(Error::ResourceRecordTooShort(rdata_start))?,
                exchange: DomainName::deserialise(buf)?,
            },
            RecordType::TXT => {
                let end = rdata_start + rdlength as usize;
                let mut chunks = Vec::new();
                while buf.position() < end {
                    let len = buf
                        .next_u8()
                        .ok_or(Error::ResourceRecordTooShort(rdata_start))? as usize;
                    let chunk = buf
                        .take(len)
                        .ok_or(Error::ResourceRecordTooShort(rdata_start))?;
                    chunks.push(chunk.to_vec());
                }
                RecordTypeWithData::Txt { octets: chunks }
            }
            RecordType::AAAA => {
                let octets = buf
                    .take(16)
                    .ok_or(Error::ResourceRecordTooShort(rdata_start))?;
                let mut raw = [0u8; 16];
                raw.copy_from_slice(octets);
                RecordTypeWithData::Aaaa {
                    address: Ipv6Addr::from(raw),
                }
            }
            RecordType::SRV => RecordTypeWithData::Srv {
                priority: buf
                    .next_u16()
                    .ok_or(Error::ResourceRecordTooShort(rdata_start))?,
                weight: buf
                    .next_u16()
                    .ok_or(Error::ResourceRecordTooShort(rdata_start))?,
                port: buf
                    .next_u16()
                    .ok_or(Error::ResourceRecordTooShort(rdata_start))?,
                target: DomainName::deserialise(buf)?,
            },
            RecordType::OPT => RecordTypeWithData::Opt(OptRdata::deserialise_rdata(buf, rdlength)?),
            RecordType::TSIG => RecordTypeWithData::Tsig(TsigRdata::deserialise_rdata(buf)?),
            RecordType::Unknown(tag) => {
                let octets = buf
                    .take(rdlength as usize)
                    .ok_or(Error::ResourceRecordTooShort(rdata_start))?;
                RecordTypeWithData::Unknown {
                    tag,
                    octets: octets.to_vec(),
                }
            }
        };

        let rdata_stop = rdata_start + rdlength as usize;
        if buf.position() != rdata_stop {
            // Not every RDATA kind above consumes exactly rdlength
            // bytes off the happy path (compressed names can be
            // shorter on the wire than their decompressed form, and a
            // non-compressing writer can pad); the length prefix is
            // authoritative, so resync to it rather than reject.
            return Err(Error::ResourceRecordInvalid(rdata_start));
        }

        Ok(parsed)
    }
}

/// A generic resource record: owner name, type, class, TTL and RDATA.
///
/// For the OPT and TSIG pseudo-record types the CLASS and TTL fields
/// carry meanings other than "record class" and "seconds to cache
/// for" (RFC 6891 section 6.1.2, RFC 8945 section 4.2); callers
/// working with those types should go through [`crate::opt`] and
/// [`TsigRdata`] rather than reading `class`/`ttl` directly.
#[derive(Debug, Clone, PartialEq)]
pub struct ResourceRecord {
    pub name: DomainName,
    pub class: u16,
    pub ttl: u32,
    pub rdata: RecordTypeWithData,
}

impl ResourceRecord {
    pub fn new(name: DomainName, class: RecordClass, ttl: u32, rdata: RecordTypeWithData) -> Self {
        ResourceRecord {
            name,
            class: class.into(),
            ttl,
            rdata,
        }
    }

    pub fn rtype(&self) -> RecordType {
        self.rdata.rtype()
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self.rdata, RecordTypeWithData::Unknown { .. })
    }

    /// Whether this record is a valid answer to `qtype`/`qclass` for
    /// `qname`: same owner name (case-insensitively) and type/class
    /// matching or wildcarded.
    pub fn matches(&self, qname: &DomainName, qtype: QueryType, qclass: QueryClass) -> bool {
        if &self.name != qname {
            return false;
        }
        let type_matches = match qtype {
            QueryType::Wildcard => true,
            QueryType::Record(rtype) => rtype == self.rtype(),
            QueryType::Axfr | QueryType::Mailb | QueryType::Maila => false,
        };
        let class_matches = match qclass {
            QueryClass::Wildcard => true,
            QueryClass::Record(rclass) => u16::from(rclass) == self.class,
        };
        type_matches && class_matches
    }

    pub fn serialise(&self, buf: &mut WritableBuffer) -> Result<(), EncodeError> {
        self.name.serialise(buf, true);
        buf.write_u16(self.rtype().into());
        buf.write_u16(self.class);
        buf.write_u32(self.ttl);
        let rdlength_index = buf.index();
        buf.write_u16(0); // placeholder, backpatched below
        let rdata_start = buf.index();
        self.rdata.serialise(buf);
        let rdlength = usize_to_u16("RDLENGTH", buf.index() - rdata_start)?;
        buf.set_u16(rdlength_index, rdlength);
        Ok(())
    }

    pub fn deserialise(buf: &mut ConsumableBuffer) -> Result<Self, Error> {
        let record_start = buf.position();
        let name = DomainName::deserialise(buf)?;
        let tag = buf
            .next_u16()
            .ok_or(Error::ResourceRecordTooShort(record_start))?;
        let class = buf
            .next_u16()
            .ok_or(Error::ResourceRecordTooShort(record_start))?;
        let ttl = buf
            .next_u32()
            .ok_or(Error::ResourceRecordTooShort(record_start))?;
        let rdlength = buf
            .next_u16()
            .ok_or(Error::ResourceRecordTooShort(record_start))?;
        let rdata = RecordTypeWithData::deserialise(RecordType::from(tag), buf, rdlength)?;
        Ok(ResourceRecord { name, class, ttl, rdata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::name::DomainName;

    #[test]
    fn record_type_round_trips() {
        for value in [1u16, 2, 5, 6, 12, 15, 16, 28, 33, 41, 250, 999] {
            let rtype = RecordType::from(value);
            assert_eq!(value, u16::from(rtype));
        }
    }

    #[test]
    fn a_record_round_trips() {
        let rr = ResourceRecord::new(
            DomainName::from_dotted_string("example.com.").unwrap(),
            RecordClass::IN,
            300,
            RecordTypeWithData::A {
                address: Ipv4Addr::new(93, 184, 216, 34),
            },
        );
        let mut buf = WritableBuffer::new();
        rr.serialise(&mut buf).unwrap();
        let octets = buf.into_octets();
        let mut cbuf = ConsumableBuffer::new(&octets);
        let decoded = ResourceRecord::deserialise(&mut cbuf).unwrap();
        assert_eq!(rr, decoded);
    }

    #[test]
    fn matches_requires_matching_name_type_class() {
        let rr = ResourceRecord::new(
            DomainName::from_dotted_string("example.com.").unwrap(),
            RecordClass::IN,
            300,
            RecordTypeWithData::A {
                address: Ipv4Addr::new(1, 2, 3, 4),
            },
        );
        let name = DomainName::from_dotted_string("EXAMPLE.COM.").unwrap();
        assert!(rr.matches(&name, QueryType::Record(RecordType::A), QueryClass::Record(RecordClass::IN)));
        assert!(!rr.matches(&name, QueryType::Record(RecordType::AAAA), QueryClass::Record(RecordClass::IN)));
    }
}
