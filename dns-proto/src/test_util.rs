//! Fixtures shared by this crate's tests and by the tests of crates
//! downstream of it (`dns-client`, `dns-server`, `dns-spf`), gated
//! behind the `test-util` feature so they never ship in a release
//! build.

use std::net::{Ipv4Addr, Ipv6Addr};

use crate::name::DomainName;
use crate::record::{RecordClass, RecordTypeWithData, ResourceRecord};

pub fn domain(dotted: &str) -> DomainName {
    DomainName::from_dotted_string(dotted).expect("test fixture domain names are well-formed")
}

pub fn a_record(name: &str, ttl: u32, address: Ipv4Addr) -> ResourceRecord {
    ResourceRecord::new(domain(name), RecordClass::IN, ttl, RecordTypeWithData::A { address })
}

pub fn aaaa_record(name: &str, ttl: u32, address: Ipv6Addr) -> ResourceRecord {
    ResourceRecord::new(domain(name), RecordClass::IN, ttl, RecordTypeWithData::Aaaa { address })
}

pub fn cname_record(name: &str, ttl: u32, target: &str) -> ResourceRecord {
    ResourceRecord::new(
        domain(name),
        RecordClass::IN,
        ttl,
        RecordTypeWithData::Cname { cname: domain(target) },
    )
}

pub fn ns_record(name: &str, ttl: u32, nameserver: &str) -> ResourceRecord {
    ResourceRecord::new(
        domain(name),
        RecordClass::IN,
        ttl,
        RecordTypeWithData::Ns { nsdname: domain(nameserver) },
    )
}

pub fn soa_record(name: &str, ttl: u32, mname: &str, rname: &str, serial: u32) -> ResourceRecord {
    ResourceRecord::new(
        domain(name),
        RecordClass::IN,
        ttl,
        RecordTypeWithData::Soa {
            mname: domain(mname),
            rname: domain(rname),
            serial,
            refresh: 7200,
            retry: 3600,
            expire: 1_209_600,
            minimum: 3600,
        },
    )
}

pub fn unknown_record(name: &str, ttl: u32, tag: u16, octets: Vec<u8>) -> ResourceRecord {
    ResourceRecord::new(domain(name), RecordClass::IN, ttl, RecordTypeWithData::Unknown { tag, octets })
}

#[cfg(feature = "arbitrary")]
mod arbitrary_impls {
    use super::domain;
    use crate::name::DomainName;
    use arbitrary::{Arbitrary, Unstructured};

    impl<'a> Arbitrary<'a> for DomainName {
        fn arbitrary(u: &mut Unstructured<'a>) -> arbitrary::Result<Self> {
            let label_count = u.int_in_range(0..=8)?;
            let mut parts = Vec::with_capacity(label_count);
            for _ in 0..label_count {
                let len = u.int_in_range(1..=20)?;
                let mut label = Vec::with_capacity(len);
                for _ in 0..len {
                    label.push(*u.choose(b"abcdefghijklmnopqrstuvwxyz0123456789-")?);
                }
                parts.push(label);
            }
            DomainName::from_labels(parts).or_else(|_| Ok(domain("fallback.example.")))
        }
    }
}
