//! Loads the literal, config-driven zone data this binary serves:
//! a YAML file naming each zone's records, since the underlying
//! `dns-server` library deliberately has no zone file parser (see its
//! crate-level docs).

use std::net::{Ipv4Addr, Ipv6Addr};
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

use dns_proto::name::DomainName;
use dns_proto::record::{RecordClass, RecordTypeWithData, ResourceRecord};
use dns_server::Zone;
use dns_server::Zones;

#[derive(Debug, Deserialize)]
pub struct RecordConfig {
    pub name: String,
    #[serde(default = "default_ttl")]
    pub ttl: u32,
    #[serde(default = "default_class")]
    pub class: String,
    #[serde(rename = "type")]
    pub rtype: String,
    pub rdata: String,
}

fn default_ttl() -> u32 {
    3600
}

fn default_class() -> String {
    "IN".to_string()
}

#[derive(Debug, Deserialize)]
pub struct ZoneConfig {
    pub records: Vec<RecordConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ZonesConfig {
    pub zones: Vec<ZoneConfig>,
}

#[derive(Debug, Error)]
pub enum ZoneConfigError {
    #[error("could not read zone configuration: {0}")]
    Load(#[from] config::ConfigError),
    #[error("invalid owner name {0:?}: {1}")]
    InvalidName(String, &'static str),
    #[error("unrecognised record class {0:?}")]
    InvalidClass(String),
    #[error("unrecognised or malformed record {rtype:?} {rdata:?} for {name:?}")]
    InvalidRecord { name: String, rtype: String, rdata: String },
}

pub fn load(path: &Path) -> Result<Zones, ZoneConfigError> {
    let parsed: ZonesConfig = config::Config::builder()
        .add_source(config::File::from(path))
        .build()?
        .try_deserialize()?;

    let mut zones = Zones::default();
    for zone_config in parsed.zones {
        let mut zone = Zone::default();
        for record in zone_config.records {
            zone.insert(build_record(&record)?);
        }
        zones.insert(zone);
    }
    Ok(zones)
}

fn build_record(record: &RecordConfig) -> Result<ResourceRecord, ZoneConfigError> {
    let name = DomainName::from_dotted_string(&record.name)
        .map_err(|_| ZoneConfigError::InvalidName(record.name.clone(), "malformed dotted name"))?;
    let class: RecordClass = record
        .class
        .parse()
        .map_err(|_| ZoneConfigError::InvalidClass(record.class.clone()))?;
    let rdata = parse_rdata(record)?;
    Ok(ResourceRecord::new(name, class, record.ttl, rdata))
}

fn parse_rdata(record: &RecordConfig) -> Result<RecordTypeWithData, ZoneConfigError> {
    let invalid = || ZoneConfigError::InvalidRecord {
        name: record.name.clone(),
        rtype: record.rtype.clone(),
        rdata: record.rdata.clone(),
    };
    let fields: Vec<&str> = record.rdata.split_whitespace().collect();

    Ok(match record.rtype.to_ascii_uppercase().as_str() {
        "A" => RecordTypeWithData::A {
            address: record.rdata.parse::<Ipv4Addr>().map_err(|_| invalid())?,
        },
        "AAAA" => RecordTypeWithData::Aaaa {
            address: record.rdata.parse::<Ipv6Addr>().map_err(|_| invalid())?,
        },
        "NS" => RecordTypeWithData::Ns {
            nsdname: DomainName::from_dotted_string(&record.rdata).map_err(|_| invalid())?,
        },
        "CNAME" => RecordTypeWithData::Cname {
            cname: DomainName::from_dotted_string(&record.rdata).map_err(|_| invalid())?,
        },
        "PTR" => RecordTypeWithData::Ptr {
            ptrdname: DomainName::from_dotted_string(&record.rdata).map_err(|_| invalid())?,
        },
        "MX" => {
            let [preference, exchange] = fields[..] else { return Err(invalid()) };
            RecordTypeWithData::Mx {
                preference: preference.parse().map_err(|_| invalid())?,
                exchange: DomainName::from_dotted_string(exchange).map_err(|_| invalid())?,
            }
        }
        "TXT" => RecordTypeWithData::Txt {
            octets: vec![record.rdata.as_bytes().to_vec()],
        },
        "SRV" => {
            let [priority, weight, port, target] = fields[..] else { return Err(invalid()) };
            RecordTypeWithData::Srv {
                priority: priority.parse().map_err(|_| invalid())?,
                weight: weight.parse().map_err(|_| invalid())?,
                port: port.parse().map_err(|_| invalid())?,
                target: DomainName::from_dotted_string(target).map_err(|_| invalid())?,
            }
        }
        "SOA" => {
            let [mname, rname, serial, refresh, retry, expire, minimum] = fields[..] else {
                return Err(invalid());
            };
            RecordTypeWithData::Soa {
                mname: DomainName::from_dotted_string(mname).map_err(|_| invalid())?,
                rname: DomainName::from_dotted_string(rname).map_err(|_| invalid())?,
                serial: serial.parse().map_err(|_| invalid())?,
                refresh: refresh.parse().map_err(|_| invalid())?,
                retry: retry.parse().map_err(|_| invalid())?,
                expire: expire.parse().map_err(|_| invalid())?,
                minimum: minimum.parse().map_err(|_| invalid())?,
            }
        }
        _ => return Err(invalid()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_proto::record::{QueryClass, QueryType};

    #[test]
    fn parses_an_a_record() {
        let record = RecordConfig {
            name: "www.example.".to_string(),
            ttl: 300,
            class: "IN".to_string(),
            rtype: "A".to_string(),
            rdata: "192.0.2.1".to_string(),
        };
        let rr = build_record(&record).unwrap();
        assert!(matches!(rr.rdata, RecordTypeWithData::A { address } if address == Ipv4Addr::new(192, 0, 2, 1)));
    }

    #[test]
    fn parses_an_soa_record() {
        let record = RecordConfig {
            name: "example.".to_string(),
            ttl: 3600,
            class: "IN".to_string(),
            rtype: "SOA".to_string(),
            rdata: "ns1.example. hostmaster.example. 1 7200 3600 1209600 3600".to_string(),
        };
        build_record(&record).unwrap();
    }

    #[test]
    fn zone_loaded_from_records_answers_lookups() {
        let mut zone = Zone::default();
        zone.insert(
            build_record(&RecordConfig {
                name: "example.".to_string(),
                ttl: 3600,
                class: "IN".to_string(),
                rtype: "SOA".to_string(),
                rdata: "ns1.example. hostmaster.example. 1 7200 3600 1209600 3600".to_string(),
            })
            .unwrap(),
        );
        zone.insert(
            build_record(&RecordConfig {
                name: "www.example.".to_string(),
                ttl: 300,
                class: "IN".to_string(),
                rtype: "A".to_string(),
                rdata: "192.0.2.1".to_string(),
            })
            .unwrap(),
        );
        let mut zones = Zones::default();
        zones.insert(zone);
        let name = DomainName::from_dotted_string("www.example.").unwrap();
        match zones.lookup(&name, QueryType::Record(dns_proto::record::RecordType::A), QueryClass::Record(RecordClass::IN)) {
            dns_server::zone::ZoneLookup::Answer(rrs) => assert_eq!(1, rrs.len()),
            _ => panic!("expected an answer"),
        }
    }
}
