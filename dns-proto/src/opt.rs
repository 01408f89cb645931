//! The EDNS0 OPT pseudo-record (RFC 6891).
//!
//! OPT is carried as an ordinary resource record in the additional
//! section, but it overloads the generic RR fields: the owner name is
//! always the root, CLASS carries the requestor's UDP payload size,
//! and TTL is split into the extended RCODE high octet, the EDNS
//! version, and a flag word (of which only DO, bit 15, is defined).
//! [`RecordTypeWithData::Opt`](crate::record::RecordTypeWithData::Opt)
//! only carries the options list; the rest lives in the generic
//! [`ResourceRecord`](crate::record::ResourceRecord)'s `class`/`ttl`
//! fields, unpacked by the functions below.

use crate::name::DomainName;
use crate::record::{RecordTypeWithData, ResourceRecord};
use crate::wire::{ConsumableBuffer, Error, WritableBuffer};

const DO_FLAG: u32 = 0x0000_8000;

/// A single EDNS option (RFC 6891 section 6.1.2): an opaque
/// `(code, data)` pair. Option semantics (e.g. COOKIE, NSID) are out
/// of scope for this crate; options round-trip uninterpreted.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct OptOption {
    pub code: u16,
    pub data: Vec<u8>,
}

/// The RDATA of an OPT record: just its option list. See the module
/// docs for where the rest of EDNS0's fields live.
#[derive(Debug, Clone, Eq, PartialEq, Default)]
pub struct OptRdata {
    pub options: Vec<OptOption>,
}

impl OptRdata {
    pub(crate) fn serialise_rdata(&self, buf: &mut WritableBuffer) {
        for option in &self.options {
            buf.write_u16(option.code);
            buf.write_u16(u16::try_from(option.data.len()).unwrap_or(u16::MAX));
            buf.write_octets(&option.data);
        }
    }

    pub(crate) fn deserialise_rdata(buf: &mut ConsumableBuffer, rdlength: u16) -> Result<Self, Error> {
        let start = buf.position();
        let end = start + rdlength as usize;
        let mut options = Vec::new();
        while buf.position() < end {
            let code = buf.next_u16().ok_or(Error::ResourceRecordTooShort(start))?;
            let len = buf.next_u16().ok_or(Error::ResourceRecordTooShort(start))? as usize;
            let data = buf
                .take(len)
                .ok_or(Error::ResourceRecordTooShort(start))?
                .to_vec();
            options.push(OptOption { code, data });
        }
        Ok(OptRdata { options })
    }
}

/// The fields of EDNS0 that live outside the OPT record's RDATA,
/// unpacked from / packed into the generic `class`/`ttl` fields.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct EdnsFields {
    pub udp_payload_size: u16,
    pub extended_rcode_high8: u8,
    pub version: u8,
    pub do_flag: bool,
}

impl EdnsFields {
    fn pack_ttl(self) -> u32 {
        (u32::from(self.extended_rcode_high8) << 24)
            | (u32::from(self.version) << 16)
            | if self.do_flag { DO_FLAG } else { 0 }
    }

    fn unpack(class: u16, ttl: u32) -> Self {
        EdnsFields {
            udp_payload_size: class,
            extended_rcode_high8: (ttl >> 24) as u8,
            version: (ttl >> 16) as u8,
            do_flag: ttl & DO_FLAG != 0,
        }
    }
}

impl ResourceRecord {
    /// Builds the OPT pseudo-record an EDNS0-aware sender attaches to
    /// the additional section: root owner name, CLASS as UDP payload
    /// size, TTL carrying the extended RCODE/version/flags.
    pub fn new_opt(fields: EdnsFields, options: Vec<OptOption>) -> Self {
        ResourceRecord {
            name: DomainName::root(),
            class: fields.udp_payload_size,
            ttl: fields.pack_ttl(),
            rdata: RecordTypeWithData::Opt(OptRdata { options }),
        }
    }

    /// Reinterprets this record's `class`/`ttl` as EDNS0 fields. Only
    /// meaningful when [`ResourceRecord::rtype`](crate::record::ResourceRecord::rtype)
    /// is [`crate::record::RecordType::OPT`].
    pub fn edns_fields(&self) -> EdnsFields {
        EdnsFields::unpack(self.class, self.ttl)
    }

    pub fn opt_options(&self) -> Option<&[OptOption]> {
        match &self.rdata {
            RecordTypeWithData::Opt(opt) => Some(&opt.options),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordType;
    use crate::wire::{ConsumableBuffer, WritableBuffer};

    #[test]
    fn edns_fields_round_trip_through_ttl() {
        let fields = EdnsFields {
            udp_payload_size: 4096,
            extended_rcode_high8: 0x01,
            version: 0,
            do_flag: true,
        };
        let rr = ResourceRecord::new_opt(fields, vec![]);
        assert_eq!(RecordType::OPT, rr.rtype());
        assert_eq!(fields, rr.edns_fields());
    }

    #[test]
    fn options_round_trip() {
        let rr = ResourceRecord::new_opt(
            EdnsFields {
                udp_payload_size: 1232,
                extended_rcode_high8: 0,
                version: 0,
                do_flag: false,
            },
            vec![OptOption {
                code: 10,
                data: vec![1, 2, 3],
            }],
        );
        let mut buf = WritableBuffer::new();
        rr.serialise(&mut buf).unwrap();
        let octets = buf.into_octets();
        let mut cbuf = ConsumableBuffer::new(&octets);
        let decoded = crate::record::ResourceRecord::deserialise(&mut cbuf).unwrap();
        assert_eq!(
            Some(&[OptOption { code: 10, data: vec![1, 2, 3] }][..]),
            decoded.opt_options()
        );
    }
}
