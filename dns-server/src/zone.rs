//! In-memory authoritative zone storage: a flat table of resource
//! records, keyed by owner name, that answers queries by exact match
//! or CNAME indirection. No zone file parsing lives here (the
//! surrounding binary is expected to build a `Zone` however it likes
//! — from a config-driven literal record list, in this workspace);
//! see the crate's non-goals.

use std::collections::HashMap;

use dns_proto::name::DomainName;
use dns_proto::record::{QueryClass, QueryType, RecordType, RecordTypeWithData, ResourceRecord};

/// A single authoritative zone: its apex name, SOA, NS set, and every
/// other record it serves.
#[derive(Debug, Clone, Default)]
pub struct Zone {
    pub apex: Option<DomainName>,
    records: HashMap<DomainName, Vec<ResourceRecord>>,
}

/// The result of looking a name up in a [`Zones`] table.
pub enum ZoneLookup {
    /// The zone holds records at this exact name.
    Answer(Vec<ResourceRecord>),
    /// The name has no records, but resolves via one or more CNAMEs;
    /// each hop's RR is included, in order, for the caller to chase
    /// or return as-is.
    Cname(Vec<ResourceRecord>),
    /// The name is provably absent from the zone (NXDOMAIN): the
    /// zone's SOA is returned for the negative-response authority
    /// section.
    NameError { soa: Option<ResourceRecord> },
    /// No zone in this table is authoritative for the name.
    NotAuthoritative,
}

impl Zone {
    pub fn insert(&mut self, rr: ResourceRecord) {
        if rr.rtype() == RecordType::SOA && self.apex.is_none() {
            self.apex = Some(rr.name.clone());
        }
        self.records.entry(rr.name.clone()).or_default().push(rr);
    }

    fn soa(&self) -> Option<ResourceRecord> {
        let apex = self.apex.as_ref()?;
        self.records
            .get(apex)?
            .iter()
            .find(|rr| rr.rtype() == RecordType::SOA)
            .cloned()
    }

    fn ns_records(&self) -> Vec<ResourceRecord> {
        let Some(apex) = &self.apex else { return Vec::new() };
        self.records
            .get(apex)
            .map(|rrs| {
                rrs.iter()
                    .filter(|rr| rr.rtype() == RecordType::NS)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    fn contains_subdomain(&self, name: &DomainName) -> bool {
        self.apex.as_ref().is_some_and(|apex| name.is_subdomain_of(apex) || name == apex)
    }

    fn lookup(&self, qname: &DomainName, qtype: QueryType, qclass: QueryClass) -> ZoneLookup {
        if !self.contains_subdomain(qname) {
            return ZoneLookup::NotAuthoritative;
        }
        let Some(rrs) = self.records.get(qname) else {
            return ZoneLookup::NameError { soa: self.soa() };
        };
        let matching: Vec<ResourceRecord> = rrs
            .iter()
            .filter(|rr| rr.matches(qname, qtype, qclass))
            .cloned()
            .collect();
        if !matching.is_empty() {
            return ZoneLookup::Answer(matching);
        }
        let cname: Vec<ResourceRecord> = rrs
            .iter()
            .filter(|rr| rr.rtype() == RecordType::CNAME)
            .cloned()
            .collect();
        if !cname.is_empty() {
            ZoneLookup::Cname(cname)
        } else {
            ZoneLookup::NameError { soa: self.soa() }
        }
    }

    /// Every resource record this zone holds, in insertion order, for
    /// AXFR (RFC 5936 section 2.2: SOA first, then the rest, then SOA
    /// again).
    pub fn all_records_for_axfr(&self) -> Vec<ResourceRecord> {
        let Some(soa) = self.soa() else { return Vec::new() };
        let mut out = vec![soa.clone()];
        for (name, rrs) in &self.records {
            if name == self.apex.as_ref().unwrap() {
                out.extend(rrs.iter().filter(|rr| rr.rtype() != RecordType::SOA).cloned());
            } else {
                out.extend(rrs.iter().cloned());
            }
        }
        out.push(soa);
        out
    }

    pub fn ns_set(&self) -> Vec<ResourceRecord> {
        self.ns_records()
    }
}

/// All zones a server is authoritative for, keyed by apex name.
#[derive(Debug, Clone, Default)]
pub struct Zones {
    zones: Vec<Zone>,
}

impl Zones {
    pub fn insert(&mut self, zone: Zone) {
        self.zones.push(zone);
    }

    /// Finds the zone whose apex is the longest suffix match for
    /// `qname` (ordinary DNS zone-cut delegation), then answers the
    /// query within it.
    pub fn lookup(&self, qname: &DomainName, qtype: QueryType, qclass: QueryClass) -> ZoneLookup {
        let mut best: Option<&Zone> = None;
        for zone in &self.zones {
            if !zone.contains_subdomain(qname) {
                continue;
            }
            let candidate_len = zone.apex.as_ref().map_or(0, |a| a.labels().len());
            let current_len = best.and_then(|z| z.apex.as_ref()).map_or(0, |a| a.labels().len());
            if best.is_none() || candidate_len > current_len {
                best = Some(zone);
            }
        }
        match best {
            Some(zone) => zone.lookup(qname, qtype, qclass),
            None => ZoneLookup::NotAuthoritative,
        }
    }

    pub fn zone_for_apex(&self, apex: &DomainName) -> Option<&Zone> {
        self.zones.iter().find(|z| z.apex.as_ref() == Some(apex))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_proto::record::{QueryClass, QueryType, RecordClass};
    use std::net::Ipv4Addr;

    fn domain(s: &str) -> DomainName {
        DomainName::from_dotted_string(s).unwrap()
    }

    fn a(name: &str, addr: Ipv4Addr) -> ResourceRecord {
        ResourceRecord::new(domain(name), RecordClass::IN, 300, RecordTypeWithData::A { address: addr })
    }

    fn soa(name: &str) -> ResourceRecord {
        ResourceRecord::new(
            domain(name),
            RecordClass::IN,
            3600,
            RecordTypeWithData::Soa {
                mname: domain(name),
                rname: domain(&format!("hostmaster.{name}")),
                serial: 1,
                refresh: 7200,
                retry: 3600,
                expire: 1_209_600,
                minimum: 3600,
            },
        )
    }

    #[test]
    fn exact_match_answers() {
        let mut zone = Zone::default();
        zone.insert(soa("example.com."));
        zone.insert(a("www.example.com.", Ipv4Addr::new(1, 2, 3, 4)));
        let mut zones = Zones::default();
        zones.insert(zone);

        let result = zones.lookup(
            &domain("www.example.com."),
            QueryType::Record(RecordType::A),
            QueryClass::Record(RecordClass::IN),
        );
        assert!(matches!(result, ZoneLookup::Answer(rrs) if rrs.len() == 1));
    }

    #[test]
    fn missing_name_is_nxdomain_with_soa() {
        let mut zone = Zone::default();
        zone.insert(soa("example.com."));
        let mut zones = Zones::default();
        zones.insert(zone);

        let result = zones.lookup(
            &domain("nope.example.com."),
            QueryType::Record(RecordType::A),
            QueryClass::Record(RecordClass::IN),
        );
        assert!(matches!(result, ZoneLookup::NameError { soa: Some(_) }));
    }

    #[test]
    fn unrelated_name_is_not_authoritative() {
        let mut zone = Zone::default();
        zone.insert(soa("example.com."));
        let mut zones = Zones::default();
        zones.insert(zone);

        let result = zones.lookup(
            &domain("example.org."),
            QueryType::Record(RecordType::A),
            QueryClass::Record(RecordClass::IN),
        );
        assert!(matches!(result, ZoneLookup::NotAuthoritative));
    }
}
