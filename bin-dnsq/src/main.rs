use std::net::IpAddr;
use std::process;

use clap::Parser;
use tokio_util::sync::CancellationToken;

use dns_client::config::ClientConfig;
use dns_client::query::{query, QueryError, TsigContext};
use dns_proto::message::{Message, Question, Rcode};
use dns_proto::name::DomainName;
use dns_proto::record::{QueryClass, QueryType, RecordClass, RecordType, RecordTypeWithData};
use dns_proto::tsig::{Algorithm, KeySelector};
use dns_transport::endpoint::{Endpoint, Protocol};

fn print_section(heading: &str, records: &[dns_proto::record::ResourceRecord]) {
    if records.is_empty() {
        return;
    }
    println!("\n;; {heading}");
    for rr in records {
        println!(
            "{}\t{}\t{}\t{}\t{}",
            rr.name,
            rr.ttl,
            RecordClass::from(rr.class),
            rr.rtype(),
            format_rdata(&rr.rdata),
        );
    }
}

fn format_rdata(rdata: &RecordTypeWithData) -> String {
    match rdata {
        RecordTypeWithData::A { address } => address.to_string(),
        RecordTypeWithData::Ns { nsdname } => nsdname.to_string(),
        RecordTypeWithData::Cname { cname } => cname.to_string(),
        RecordTypeWithData::Soa { mname, rname, serial, refresh, retry, expire, minimum } => {
            format!("{mname} {rname} {serial} {refresh} {retry} {expire} {minimum}")
        }
        RecordTypeWithData::Ptr { ptrdname } => ptrdname.to_string(),
        RecordTypeWithData::Mx { preference, exchange } => format!("{preference} {exchange}"),
        RecordTypeWithData::Txt { octets } => octets
            .iter()
            .map(|chunk| format!("\"{}\"", String::from_utf8_lossy(chunk)))
            .collect::<Vec<_>>()
            .join(" "),
        RecordTypeWithData::Aaaa { address } => address.to_string(),
        RecordTypeWithData::Srv { priority, weight, port, target } => {
            format!("{priority} {weight} {port} {target}")
        }
        RecordTypeWithData::Opt(_) => "<OPT>".to_string(),
        RecordTypeWithData::Tsig(_) => "<TSIG>".to_string(),
        RecordTypeWithData::Unknown { tag, octets } => format!("TYPE{tag} {} octets", octets.len()),
    }
}

struct SingleKey {
    name: DomainName,
    algorithm: Algorithm,
    secret: Vec<u8>,
}

impl KeySelector for SingleKey {
    fn key_for(&self, key_name: &DomainName, algorithm: Algorithm) -> Option<Vec<u8>> {
        if *key_name == self.name && algorithm == self.algorithm {
            Some(self.secret.clone())
        } else {
            None
        }
    }
}

fn base64_decode(input: &str) -> Option<Vec<u8>> {
    const ALPHABET: &[u8] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789+/";
    let stripped: Vec<u8> = input.bytes().filter(|&b| b != b'=').collect();
    let mut out = Vec::with_capacity(stripped.len() * 3 / 4);
    for chunk in stripped.chunks(4) {
        let mut buf = [0u8; 4];
        for (i, &b) in chunk.iter().enumerate() {
            buf[i] = u8::try_from(ALPHABET.iter().position(|&c| c == b)?).ok()?;
        }
        out.push((buf[0] << 2) | (buf[1] >> 4));
        if chunk.len() > 2 {
            out.push((buf[1] << 4) | (buf[2] >> 2));
        }
        if chunk.len() > 3 {
            out.push((buf[2] << 6) | buf[3]);
        }
    }
    Some(out)
}

// the doc comments for this struct turn into the CLI help text
#[derive(Parser)]
/// DNS lookup utility
struct Args {
    /// Domain name to resolve
    #[clap(value_parser)]
    domain: DomainName,

    /// Query type to resolve
    #[clap(default_value_t = QueryType::Record(RecordType::A), value_parser)]
    qtype: QueryType,

    /// Nameserver to query
    #[clap(short = '@', long = "server", value_parser, default_value_t = IpAddr::V4(std::net::Ipv4Addr::new(127, 0, 0, 1)))]
    server: IpAddr,

    /// Port to query the nameserver on
    #[clap(short, long, value_parser, default_value_t = 53)]
    port: u16,

    /// Send the query over TCP instead of UDP
    #[clap(long, action(clap::ArgAction::SetTrue))]
    tcp: bool,

    /// Enable 0x20 case randomization on the outgoing query
    #[clap(long, action(clap::ArgAction::SetTrue))]
    case_randomize: bool,

    /// TSIG key name to sign the query with
    #[clap(long, value_parser, requires = "tsig-secret")]
    tsig_key_name: Option<DomainName>,

    /// Base64-encoded TSIG shared secret
    #[clap(long, value_parser, requires = "tsig-key-name")]
    tsig_secret: Option<String>,

    /// TSIG algorithm mnemonic
    #[clap(long, value_parser, default_value = "hmac-sha256")]
    tsig_algorithm: String,
}

fn parse_algorithm(mnemonic: &str) -> Option<Algorithm> {
    match mnemonic.to_ascii_lowercase().as_str() {
        "hmac-md5" => Some(Algorithm::HmacMd5),
        "hmac-sha1" => Some(Algorithm::HmacSha1),
        "hmac-sha1-96" => Some(Algorithm::HmacSha1_96),
        "hmac-sha256" => Some(Algorithm::HmacSha256),
        "hmac-sha256-128" => Some(Algorithm::HmacSha256_128),
        "hmac-sha384" => Some(Algorithm::HmacSha384),
        "hmac-sha384-192" => Some(Algorithm::HmacSha384_192),
        "hmac-sha512" => Some(Algorithm::HmacSha512),
        "hmac-sha512-256" => Some(Algorithm::HmacSha512_256),
        _ => None,
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();

    let question = Question {
        name: args.domain,
        qtype: args.qtype,
        qclass: QueryClass::Record(RecordClass::IN),
    };

    let protocol = if args.tcp { Protocol::Tcp } else { Protocol::Udp };
    let endpoint = Endpoint::new(args.server, protocol).with_port(args.port);

    let config = ClientConfig {
        case_randomization_0x20: args.case_randomize,
        ..ClientConfig::default()
    };

    let key = match (&args.tsig_key_name, &args.tsig_secret) {
        (Some(name), Some(secret)) => {
            let algorithm = match parse_algorithm(&args.tsig_algorithm) {
                Some(a) => a,
                None => {
                    eprintln!("unrecognised TSIG algorithm: {}", args.tsig_algorithm);
                    process::exit(1);
                }
            };
            let secret = match base64_decode(secret) {
                Some(s) => s,
                None => {
                    eprintln!("TSIG secret is not valid base64");
                    process::exit(1);
                }
            };
            Some(SingleKey { name: name.clone(), algorithm, secret })
        }
        _ => None,
    };
    let tsig_context = key.as_ref().map(|k| TsigContext {
        key_name: k.name.clone(),
        algorithm: k.algorithm,
        key: k.secret.clone(),
        fudge: 300,
        keys: k as &(dyn KeySelector + Send + Sync),
    });

    println!(";; QUESTION");
    println!("{}\t{}\t{}", question.name, question.qclass, question.qtype);

    let result = query(
        &[endpoint],
        question,
        &config,
        tsig_context.as_ref(),
        &CancellationToken::new(),
    )
    .await;

    match result {
        Ok(outcome) => print_response(&outcome.message),
        Err(err) => report_error(&err),
    }
}

fn print_response(message: &Message) {
    println!("\n;; rcode: {}", message.rcode().0);
    print_section("ANSWER", &message.answers);
    print_section("AUTHORITY", &message.authority);
    print_section("ADDITIONAL", &message.additional);
    if message.rcode() == Rcode::NAME_ERROR {
        println!("\n;; name does not exist");
    }
}

fn report_error(err: &QueryError) {
    eprintln!(";; {err}");
    process::exit(1);
}
