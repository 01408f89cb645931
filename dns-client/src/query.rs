//! The per-call query state machine: try each candidate endpoint in
//! turn, sending over UDP first unless the question demands TCP
//! (AXFR/IXFR, or a prior attempt came back truncated), validating
//! every response against the request before accepting it.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;
use tokio::net::{TcpStream, UdpSocket};
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;

use dns_proto::message::{Message, Question, Rcode};
use dns_proto::name::DomainName;
use dns_proto::record::QueryType;
use dns_proto::tsig::{self, KeySelector, TsigError};
use dns_transport::endpoint::{Endpoint, Protocol};
use dns_transport::framing::{read_tcp_message, recv_udp_message, send_tcp_message, send_udp_message};

use crate::case::{echoes_case, randomize_case};
use crate::config::ClientConfig;

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("no candidate nameservers were given")]
    NoEndpoints,
    #[error("every candidate nameserver failed (last error: {0})")]
    AllEndpointsFailed(String),
    #[error("query was cancelled")]
    Cancelled,
    #[error("transport error: {0}")]
    Transport(#[from] dns_transport::TransportError),
    #[error("response did not match the request")]
    ResponseMismatch,
    #[error("TSIG verification failed: {0}")]
    Tsig(#[from] TsigError),
    #[error("response timed out")]
    Timeout,
}

/// A TSIG key to attach to outgoing queries and expect on responses,
/// if this query should be signed.
pub struct TsigContext<'a> {
    pub key_name: DomainName,
    pub algorithm: tsig::Algorithm,
    pub key: Vec<u8>,
    pub fudge: u16,
    pub keys: &'a (dyn KeySelector + Send + Sync),
}

pub struct QueryOutcome {
    pub message: Message,
    pub endpoint: Endpoint,
    pub used_tcp: bool,
}

/// Sends `question` to each endpoint in `endpoints`, in order,
/// stopping at the first one that returns a usable response.
/// `ServerFailure` and transport errors move on to the next
/// candidate; everything else (including a well-formed `NameError`)
/// is returned immediately, since it is an authoritative answer about
/// the name, not a reason to keep trying other servers.
pub async fn query(
    endpoints: &[Endpoint],
    question: Question,
    config: &ClientConfig,
    tsig_context: Option<&TsigContext<'_>>,
    cancellation: &CancellationToken,
) -> Result<QueryOutcome, QueryError> {
    if endpoints.is_empty() {
        return Err(QueryError::NoEndpoints);
    }

    let mut last_error = None;
    for endpoint in endpoints {
        if cancellation.is_cancelled() {
            return Err(QueryError::Cancelled);
        }
        match query_one_endpoint(endpoint, question.clone(), config, tsig_context, cancellation).await {
            Ok(outcome) => {
                if outcome.message.rcode() == Rcode::SERVER_FAILURE {
                    last_error = Some(format!("{endpoint}: SERVFAIL"));
                    continue;
                }
                return Ok(outcome);
            }
            Err(e) => {
                tracing::debug!(%endpoint, error = %e, "candidate nameserver failed");
                last_error = Some(e.to_string());
            }
        }
    }
    Err(QueryError::AllEndpointsFailed(
        last_error.unwrap_or_else(|| "no attempts were made".to_string()),
    ))
}

async fn query_one_endpoint(
    endpoint: &Endpoint,
    question: Question,
    config: &ClientConfig,
    tsig_context: Option<&TsigContext<'_>>,
    cancellation: &CancellationToken,
) -> Result<QueryOutcome, QueryError> {
    let requires_tcp = matches!(
        question.qtype,
        QueryType::Axfr | QueryType::Mailb | QueryType::Maila
    ) || endpoint.protocol == Protocol::Tcp;

    if requires_tcp || endpoint.protocol == Protocol::Tls {
        return query_tcp(endpoint, question, config, tsig_context, cancellation).await;
    }

    let outcome = query_udp(endpoint, question.clone(), config, tsig_context, cancellation).await?;
    if outcome.message.header.is_truncated {
        tracing::debug!(%endpoint, "response truncated, retrying over TCP");
        return query_tcp(endpoint, question, config, tsig_context, cancellation).await;
    }
    Ok(outcome)
}

fn build_request(
    question: Question,
    config: &ClientConfig,
    id: u16,
) -> (Message, DomainName) {
    let mut rng = rand::thread_rng();
    let qname = if config.case_randomization_0x20 {
        randomize_case(&question.name, &mut rng)
    } else {
        question.name.clone()
    };
    let question = Question { name: qname.clone(), ..question };
    (Message::from_question(id, question, true), qname)
}

async fn query_udp(
    endpoint: &Endpoint,
    question: Question,
    config: &ClientConfig,
    tsig_context: Option<&TsigContext<'_>>,
    cancellation: &CancellationToken,
) -> Result<QueryOutcome, QueryError> {
    let id = rand::thread_rng().gen();
    let (request, qname) = build_request(question.clone(), config, id);
    let wire = sign_if_needed(&request, tsig_context)?;

    let fut = async {
        let socket = UdpSocket::bind("0.0.0.0:0")
            .await
            .map_err(|source| dns_transport::TransportError::Io { endpoint: endpoint.clone(), source })?;
        socket
            .connect(endpoint.socket_addr())
            .await
            .map_err(|source| dns_transport::TransportError::Io { endpoint: endpoint.clone(), source })?;
        send_udp_message(&socket, &wire).await?;
        let response = recv_udp_message(&socket, config.udp_payload_size as usize).await?;
        Ok::<_, dns_transport::TransportError>(response)
    };

    let response = select_with_cancellation(timeout(config.query_timeout(), fut), cancellation).await?;
    let message = Message::deserialise(&response).map_err(|_| QueryError::ResponseMismatch)?;
    verify_response(&request, &message, &qname, &question, config, tsig_context)?;
    Ok(QueryOutcome {
        message,
        endpoint: endpoint.clone(),
        used_tcp: false,
    })
}

async fn query_tcp(
    endpoint: &Endpoint,
    question: Question,
    config: &ClientConfig,
    tsig_context: Option<&TsigContext<'_>>,
    cancellation: &CancellationToken,
) -> Result<QueryOutcome, QueryError> {
    let id = rand::thread_rng().gen();
    let (request, qname) = build_request(question.clone(), config, id);
    let wire = sign_if_needed(&request, tsig_context)?;

    let fut = async {
        let mut stream = TcpStream::connect(endpoint.socket_addr())
            .await
            .map_err(|source| dns_transport::TransportError::Io { endpoint: endpoint.clone(), source })?;
        send_tcp_message(&mut stream, &wire).await?;
        let response = read_tcp_message(&mut stream).await?;
        Ok::<_, dns_transport::TransportError>(response)
    };

    let response = select_with_cancellation(timeout(config.query_timeout(), fut), cancellation).await?;
    let message = Message::deserialise(&response).map_err(|_| QueryError::ResponseMismatch)?;
    verify_response(&request, &message, &qname, &question, config, tsig_context)?;
    Ok(QueryOutcome {
        message,
        endpoint: endpoint.clone(),
        used_tcp: true,
    })
}

async fn select_with_cancellation<T, E>(
    fut: impl std::future::Future<Output = Result<Result<T, E>, tokio::time::error::Elapsed>>,
    cancellation: &CancellationToken,
) -> Result<T, QueryError>
where
    QueryError: From<E>,
{
    tokio::select! {
        result = fut => {
            match result {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(e)) => Err(QueryError::from(e)),
                Err(_) => Err(QueryError::Timeout),
            }
        }
        () = cancellation.cancelled() => Err(QueryError::Cancelled),
    }
}

fn sign_if_needed(
    request: &Message,
    tsig_context: Option<&TsigContext<'_>>,
) -> Result<Vec<u8>, QueryError> {
    let Some(ctx) = tsig_context else {
        return request.serialise().map_err(|_| QueryError::ResponseMismatch);
    };

    let wire_without_tsig = request
        .serialise()
        .map_err(|_| QueryError::ResponseMismatch)?;
    let arcount_without_tsig =
        u16::try_from(request.additional.len()).map_err(|_| QueryError::ResponseMismatch)?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_secs();

    let mac = tsig::sign(
        &ctx.key,
        ctx.algorithm,
        &wire_without_tsig,
        request.header.id,
        arcount_without_tsig,
        None,
        &ctx.key_name,
        now,
        ctx.fudge,
        ctx.algorithm.default_mac_len(),
        false,
    )?;

    let rdata = dns_proto::tsig::TsigRdata {
        algorithm_name: DomainName::from_dotted_string(ctx.algorithm.dotted_name())
            .expect("algorithm names are well-formed dotted strings"),
        time_signed: now,
        fudge: ctx.fudge,
        mac,
        original_id: request.header.id,
        error: 0,
        other_data: Vec::new(),
    };
    let tsig_record = dns_proto::record::ResourceRecord {
        name: ctx.key_name.clone(),
        class: 255, // ANY
        ttl: 0,
        rdata: dns_proto::record::RecordTypeWithData::Tsig(rdata),
    };

    let mut signed = request.clone();
    signed.additional.push(tsig_record);
    signed.serialise().map_err(|_| QueryError::ResponseMismatch)
}

/// Validates that `response` is a legitimate answer to `request`,
/// without judging the RCODE it carries: a well-formed `REFUSED` or
/// `NotImplemented` answer is just as much an answer as `NoError`, and
/// is returned to the caller rather than treated as a failed attempt.
/// Only the transaction/opcode match and (when `response_validation`
/// is enabled) the echoed question section are checked here.
fn verify_response(
    request: &Message,
    response: &Message,
    qname: &DomainName,
    sent_question: &Question,
    config: &ClientConfig,
    tsig_context: Option<&TsigContext<'_>>,
) -> Result<(), QueryError> {
    if response.header.id != request.header.id
        || !response.header.is_response
        || response.header.opcode != request.header.opcode
    {
        return Err(QueryError::ResponseMismatch);
    }

    if config.response_validation {
        let Some(question) = response.questions.first() else {
            return Err(QueryError::ResponseMismatch);
        };
        if !echoes_case(qname, &question.name)
            || question.qtype != sent_question.qtype
            || question.qclass != sent_question.qclass
        {
            return Err(QueryError::ResponseMismatch);
        }
    }

    if let Some(ctx) = tsig_context {
        verify_tsig(response, ctx)?;
    }

    Ok(())
}

fn verify_tsig(response: &Message, ctx: &TsigContext<'_>) -> Result<(), QueryError> {
    let mut without_tsig = response.clone();
    let tsig_record = without_tsig
        .additional
        .pop()
        .filter(|rr| matches!(rr.rdata, dns_proto::record::RecordTypeWithData::Tsig(_)))
        .ok_or(QueryError::Tsig(TsigError::BadKey))?;
    let dns_proto::record::RecordTypeWithData::Tsig(rdata) = &tsig_record.rdata else {
        unreachable!("checked above");
    };

    let arcount_without_tsig =
        u16::try_from(without_tsig.additional.len()).map_err(|_| QueryError::ResponseMismatch)?;
    let wire_without_tsig = without_tsig
        .serialise()
        .map_err(|_| QueryError::ResponseMismatch)?;

    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is after the Unix epoch")
        .as_secs();

    tsig::verify(
        ctx.keys,
        rdata,
        &wire_without_tsig,
        arcount_without_tsig,
        None,
        &tsig_record.name,
        now,
        false,
    )
    .map_err(QueryError::Tsig)
}
