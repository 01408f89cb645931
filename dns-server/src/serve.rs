//! The accept/dispatch loop: receives requests over UDP and TCP,
//! answers them from the configured zones, verifies and signs TSIG,
//! shrinks oversized UDP responses, and splits AXFR responses across
//! as many TCP messages as RFC 5936 needs.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream, UdpSocket};
use tokio_util::sync::CancellationToken;

use dns_proto::message::{Message, Rcode};
use dns_proto::record::QueryType;
use dns_proto::tsig::KeySelector;
use dns_transport::framing::{read_tcp_message, send_tcp_message, CLASSIC_UDP_MAX};
use dns_transport::TransportError;

use crate::axfr::split_into_packets;
use crate::config::ServerConfig;
use crate::hooks::SharedHooks;
use crate::metrics;
use crate::truncation::shrink_to_fit;
use crate::tsig::{self, Check};
use crate::zone::{ZoneLookup, Zones};

/// Everything a running server needs to answer a request: the zones
/// it is authoritative for, the TSIG keys it knows, its tuning
/// options, and the event hooks the surrounding binary wired up.
pub struct ServerState {
    pub zones: Zones,
    pub keys: Arc<dyn KeySelector + Send + Sync>,
    pub config: ServerConfig,
    pub hooks: SharedHooks,
}

impl ServerState {
    /// Answers a single non-AXFR request. `transport` is only used to
    /// label metrics ("udp" or "tcp").
    pub fn handle(&self, request: &Message, peer: SocketAddr, transport: &str) -> Message {
        self.hooks.query_received(peer, request);
        metrics::record_request(transport);

        match tsig::check_request(request, self.keys.as_ref()) {
            Check::Failed { response_rcode, tsig_error } => {
                self.hooks.invalid_signed_message_received(peer, tsig_error);
                metrics::record_tsig_outcome("failed");
                let mut response = request.make_response();
                response.header.rcode_low4 = response_rcode.low4();
                let key_name = tsig_key_name(request);
                tsig::attach_failure_tsig(
                    &mut response,
                    &key_name,
                    dns_proto::tsig::Algorithm::HmacSha256,
                    tsig_error,
                );
                metrics::record_response(transport, response.rcode().0);
                response
            }
            verified_or_unsigned => {
                if matches!(verified_or_unsigned, Check::Verified { .. }) {
                    metrics::record_tsig_outcome("verified");
                }
                let mut response = self.answer(request);
                if let Check::Verified { key_name, algorithm, mac } = &verified_or_unsigned {
                    if let Some(key) = self.keys.key_for(key_name, *algorithm) {
                        if let Err(error) = tsig::sign_response(&mut response, key_name, *algorithm, &key, mac) {
                            tracing::warn!(?error, "failed to sign response");
                        }
                    }
                }
                metrics::record_response(transport, response.rcode().0);
                response
            }
        }
    }

    fn answer(&self, request: &Message) -> Message {
        let mut response = request.make_response();
        response.header.is_authoritative = true;
        response.header.recursion_available = false;

        let mut is_refused = false;
        for question in &request.questions {
            if question.qtype == QueryType::Axfr {
                // A single non-TCP AXFR question is always refused;
                // TCP callers route AXFR through `handle_axfr` instead
                // of this path (RFC 5936 section 4.3.6 requires TCP).
                is_refused = true;
                continue;
            }
            match self.zones.lookup(&question.name, question.qtype, question.qclass) {
                ZoneLookup::Answer(rrs) | ZoneLookup::Cname(rrs) => response.answers.extend(rrs),
                ZoneLookup::NameError { soa } => {
                    if response.header.rcode_low4 == Rcode::NO_ERROR.low4() {
                        response.header.rcode_low4 = Rcode::NAME_ERROR.low4();
                    }
                    response.authority.extend(soa);
                }
                ZoneLookup::NotAuthoritative => is_refused = true,
            }
        }
        if is_refused && response.answers.is_empty() {
            response.header.rcode_low4 = Rcode::REFUSED.low4();
            response.header.is_authoritative = false;
        }

        // Both sides have signalled EDNS only if the request carried
        // an OPT record; echo one back advertising this server's own
        // UDP payload size so the truncation budget isn't stuck at the
        // classic 512-byte floor.
        if request.opt().is_some() {
            response.additional.push(dns_proto::record::ResourceRecord::new_opt(
                dns_proto::opt::EdnsFields {
                    udp_payload_size: self.config.udp_payload_size,
                    extended_rcode_high8: 0,
                    version: 0,
                    do_flag: false,
                },
                Vec::new(),
            ));
        }

        response
    }

    /// Answers an AXFR request with a sequence of messages, one per
    /// TCP frame in the reply (RFC 5936 section 2.2).
    pub fn handle_axfr(&self, request: &Message) -> Vec<Message> {
        let Some(question) = request.questions.first() else {
            return vec![Message::make_format_error_response(request.header.id)];
        };
        match self.zones.zone_for_apex(&question.name) {
            Some(zone) => split_into_packets(question, zone.all_records_for_axfr())
                .into_iter()
                .map(|mut message| {
                    message.header.id = request.header.id;
                    message.header.is_response = true;
                    message
                })
                .collect(),
            None => {
                let mut refused = request.make_response();
                refused.header.rcode_low4 = Rcode::REFUSED.low4();
                vec![refused]
            }
        }
    }
}

fn tsig_key_name(request: &Message) -> dns_proto::name::DomainName {
    request
        .additional
        .last()
        .filter(|rr| rr.rtype() == dns_proto::record::RecordType::TSIG)
        .map(|rr| rr.name.clone())
        .unwrap_or_else(|| dns_proto::name::DomainName::from_labels(Vec::new()).expect("the root name is always valid"))
}

async fn respond_over_udp(socket: &UdpSocket, peer: SocketAddr, response: Message) {
    let max_payload = response
        .opt()
        .map_or(CLASSIC_UDP_MAX, |opt| opt.edns_fields().udp_payload_size as usize)
        .max(CLASSIC_UDP_MAX);
    let wire = shrink_to_fit(response, max_payload);
    if let Err(error) = socket.send_to(&wire, peer).await {
        tracing::debug!(%peer, ?error, "UDP send error");
    }
}

/// Serves UDP requests on `socket` until `cancellation` fires.
pub async fn serve_udp(socket: UdpSocket, state: Arc<ServerState>, cancellation: CancellationToken) {
    let socket = Arc::new(socket);
    let mut buf = vec![0u8; 65_535];
    loop {
        tokio::select! {
            () = cancellation.cancelled() => return,
            result = socket.recv_from(&mut buf) => {
                let Ok((len, peer)) = result else { continue };
                tracing::info!(%peer, "UDP request");
                let raw = buf[..len].to_vec();
                let state = Arc::clone(&state);
                let socket = Arc::clone(&socket);
                tokio::spawn(async move {
                    state.hooks.client_connected(peer);
                    let response = match Message::deserialise(&raw) {
                        Ok(request) if request.is_query() => state.handle(&request, peer, "udp"),
                        Ok(request) => Message::make_format_error_response(request.header.id),
                        Err(_) => return,
                    };
                    respond_over_udp(&socket, peer, response).await;
                });
            }
        }
    }
}

/// Serves TCP connections on `listener` until `cancellation` fires.
pub async fn serve_tcp(listener: TcpListener, state: Arc<ServerState>, cancellation: CancellationToken) {
    loop {
        tokio::select! {
            () = cancellation.cancelled() => return,
            result = listener.accept() => {
                let Ok((stream, peer)) = result else { continue };
                tracing::info!(%peer, "TCP request");
                let state = Arc::clone(&state);
                tokio::spawn(handle_tcp_connection(stream, peer, state));
            }
        }
    }
}

async fn handle_tcp_connection(mut stream: TcpStream, peer: SocketAddr, state: Arc<ServerState>) {
    state.hooks.client_connected(peer);
    loop {
        let raw = match read_tcp_message(&mut stream).await {
            Ok(raw) => raw,
            Err(error) => {
                tracing::debug!(%peer, ?error, "TCP read error");
                return;
            }
        };
        let request = match Message::deserialise(&raw) {
            Ok(request) if request.is_query() => request,
            Ok(request) => {
                let response = Message::make_format_error_response(request.header.id);
                if send_response(&mut stream, &response).await.is_err() {
                    return;
                }
                continue;
            }
            Err(_) => return,
        };

        let is_axfr = request.questions.first().map(|q| q.qtype) == Some(QueryType::Axfr);
        if is_axfr {
            for response in state.handle_axfr(&request) {
                metrics::record_response("tcp", response.rcode().0);
                if send_response(&mut stream, &response).await.is_err() {
                    return;
                }
            }
            continue;
        }

        let response = state.handle(&request, peer, "tcp");
        if send_response(&mut stream, &response).await.is_err() {
            return;
        }
    }
}

async fn send_response(stream: &mut TcpStream, response: &Message) -> Result<(), TransportError> {
    let wire = response
        .serialise()
        .map_err(|_| TransportError::TcpLengthPrefixInvalid(0))?;
    send_tcp_message(stream, &wire).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_proto::name::DomainName;
    use dns_proto::record::{QueryClass, RecordClass, RecordTypeWithData, ResourceRecord};
    use dns_proto::message::{Header, Question};
    use std::net::Ipv4Addr;

    struct NoKeys;
    impl KeySelector for NoKeys {
        fn key_for(&self, _key_name: &DomainName, _algorithm: dns_proto::tsig::Algorithm) -> Option<Vec<u8>> {
            None
        }
    }

    fn state_with_one_record() -> ServerState {
        let mut zone = crate::zone::Zone::default();
        zone.insert(ResourceRecord::new(
            DomainName::from_dotted_string("example.com.").unwrap(),
            RecordClass::IN,
            3600,
            RecordTypeWithData::Soa {
                mname: DomainName::from_dotted_string("example.com.").unwrap(),
                rname: DomainName::from_dotted_string("hostmaster.example.com.").unwrap(),
                serial: 1,
                refresh: 7200,
                retry: 3600,
                expire: 1_209_600,
                minimum: 3600,
            },
        ));
        zone.insert(ResourceRecord::new(
            DomainName::from_dotted_string("www.example.com.").unwrap(),
            RecordClass::IN,
            300,
            RecordTypeWithData::A { address: Ipv4Addr::new(93, 184, 216, 34) },
        ));
        let mut zones = Zones::default();
        zones.insert(zone);
        ServerState {
            zones,
            keys: Arc::new(NoKeys),
            config: ServerConfig::default(),
            hooks: Arc::new(crate::hooks::DefaultHooks),
        }
    }

    fn request(name: &str, qtype: QueryType) -> Message {
        Message {
            header: Header::query(7, false),
            questions: vec![Question {
                name: DomainName::from_dotted_string(name).unwrap(),
                qtype,
                qclass: QueryClass::Record(RecordClass::IN),
            }],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        }
    }

    #[test]
    fn answers_a_known_name() {
        let state = state_with_one_record();
        let response = state.answer(&request(
            "www.example.com.",
            QueryType::Record(dns_proto::record::RecordType::A),
        ));
        assert_eq!(1, response.answers.len());
        assert_eq!(Rcode::NO_ERROR, response.rcode());
    }

    #[test]
    fn no_opt_request_gets_no_opt_response() {
        let state = state_with_one_record();
        let response = state.answer(&request(
            "www.example.com.",
            QueryType::Record(dns_proto::record::RecordType::A),
        ));
        assert!(response.opt().is_none());
    }

    #[test]
    fn edns_request_is_echoed_with_the_servers_payload_size() {
        let state = state_with_one_record();
        let mut req = request(
            "www.example.com.",
            QueryType::Record(dns_proto::record::RecordType::A),
        );
        req.additional.push(dns_proto::record::ResourceRecord::new_opt(
            dns_proto::opt::EdnsFields {
                udp_payload_size: 4096,
                extended_rcode_high8: 0,
                version: 0,
                do_flag: false,
            },
            Vec::new(),
        ));
        let response = state.answer(&req);
        let opt = response.opt().expect("response should echo an OPT record");
        assert_eq!(state.config.udp_payload_size, opt.edns_fields().udp_payload_size);
    }

    #[test]
    fn refuses_unrelated_zone() {
        let state = state_with_one_record();
        let response = state.answer(&request(
            "example.org.",
            QueryType::Record(dns_proto::record::RecordType::A),
        ));
        assert_eq!(Rcode::REFUSED, response.rcode());
    }

    #[test]
    fn axfr_opens_and_closes_with_matching_soa() {
        let state = state_with_one_record();
        let packets = state.handle_axfr(&request("example.com.", QueryType::Axfr));
        assert_eq!(1, packets.len());
        let RecordTypeWithData::Soa { serial: opening, .. } = &packets[0].answers.first().unwrap().rdata else {
            panic!("expected an opening SOA");
        };
        let RecordTypeWithData::Soa { serial: closing, .. } = &packets[0].answers.last().unwrap().rdata else {
            panic!("expected a closing SOA");
        };
        assert_eq!(opening, closing);
    }
}
