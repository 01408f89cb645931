//! Server-side TSIG verification and the failure-reply table (RFC
//! 8945 section 5.3): what to send back when a signed request fails
//! to verify, and how to sign a response to a request that did
//! verify.

use std::time::{SystemTime, UNIX_EPOCH};

use dns_proto::message::{Message, Rcode};
use dns_proto::name::DomainName;
use dns_proto::record::{RecordTypeWithData, ResourceRecord};
use dns_proto::tsig::{self, Algorithm, KeySelector, TsigError, TsigRdata};

/// The outcome of checking a request for a TSIG record.
pub enum Check {
    /// The request carried no TSIG record; process it as unsigned.
    Unsigned,
    /// The request's TSIG verified; `key_name`/`algorithm`/`mac` are
    /// carried forward so the response can be signed in turn (RFC
    /// 8945 section 4.3, using the request's MAC as `prior_mac`).
    Verified {
        key_name: DomainName,
        algorithm: Algorithm,
        mac: Vec<u8>,
    },
    /// The request carried a TSIG record that failed to verify; the
    /// caller should send back `response_rcode` with an unsigned TSIG
    /// record carrying `tsig_error`, per RFC 8945 section 5.3's
    /// "Server TSIG Checks" table.
    Failed {
        response_rcode: Rcode,
        tsig_error: u16,
    },
}

const DEFAULT_FUDGE: u16 = 300;

pub fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Checks `request` (already fully parsed) for a trailing TSIG record
/// and verifies it against `keys`.
pub fn check_request(request: &Message, keys: &dyn KeySelector) -> Check {
    let Some(tsig_rr) = request.additional.last().filter(|rr| rr.rtype() == dns_proto::record::RecordType::TSIG)
    else {
        return Check::Unsigned;
    };
    let RecordTypeWithData::Tsig(rdata) = &tsig_rr.rdata else {
        return Check::Unsigned;
    };

    let mut without_tsig = request.clone();
    without_tsig.additional.pop();
    let arcount_without_tsig = without_tsig.additional.len() as u16;
    let Ok(wire_without_tsig) = without_tsig.serialise() else {
        return Check::Failed {
            response_rcode: Rcode::FORMAT_ERROR,
            tsig_error: 0,
        };
    };

    match tsig::verify(
        keys,
        rdata,
        &wire_without_tsig,
        arcount_without_tsig,
        None,
        &tsig_rr.name,
        now_unix(),
        false,
    ) {
        Ok(()) => {
            let algorithm = Algorithm::from_dotted_name(&rdata.algorithm_name.to_dotted_string())
                .expect("verify already validated the algorithm name");
            Check::Verified {
                key_name: tsig_rr.name.clone(),
                algorithm,
                mac: rdata.mac.clone(),
            }
        }
        Err(err) => Check::Failed {
            response_rcode: rcode_for(err),
            tsig_error: tsig_error_code(err),
        },
    }
}

/// RFC 8945 section 5.3's "Server TSIG Checks": every verification
/// failure, including a stale timestamp, produces a response header
/// RCODE of NOTAUTH.
fn rcode_for(_err: TsigError) -> Rcode {
    Rcode(9) // NOTAUTH
}

fn tsig_error_code(err: TsigError) -> u16 {
    match err {
        TsigError::BadKey => tsig::tsig_rcode::BADKEY,
        TsigError::BadSig => tsig::tsig_rcode::BADSIG,
        TsigError::BadTime => tsig::tsig_rcode::BADTIME,
        TsigError::BadTrunc => tsig::tsig_rcode::BADTRUNC,
        TsigError::BadAlg => tsig::tsig_rcode::BADSIG,
    }
}

/// Appends an unsigned TSIG record carrying `tsig_error` to a failure
/// response, per RFC 8945 section 5.3 (failure responses are not
/// themselves signed, except BADTIME responses still carry the
/// server's idea of the current time, as a 48-bit big-endian integer
/// in `other_data`, so the client can correct its clock and retry).
pub fn attach_failure_tsig(response: &mut Message, key_name: &DomainName, algorithm: Algorithm, tsig_error: u16) {
    let now = now_unix();
    let other_data = if tsig_error == tsig::tsig_rcode::BADTIME {
        encode_u48(now)
    } else {
        Vec::new()
    };
    response.additional.push(ResourceRecord {
        name: key_name.clone(),
        class: 255,
        ttl: 0,
        rdata: RecordTypeWithData::Tsig(TsigRdata {
            algorithm_name: DomainName::from_dotted_string(algorithm.dotted_name())
                .expect("algorithm names are well-formed dotted strings"),
            time_signed: now,
            fudge: DEFAULT_FUDGE,
            mac: Vec::new(),
            original_id: response.header.id,
            error: tsig_error,
            other_data,
        }),
    });
}

fn encode_u48(value: u64) -> Vec<u8> {
    value.to_be_bytes()[2..].to_vec()
}

/// Signs a response to a request that verified, chaining the
/// request's MAC in as `prior_mac` (RFC 8945 section 4.3's
/// response-to-signed-request rule).
pub fn sign_response(
    response: &mut Message,
    key_name: &DomainName,
    algorithm: Algorithm,
    key: &[u8],
    request_mac: &[u8],
) -> Result<(), TsigError> {
    let arcount_without_tsig = response.additional.len() as u16;
    let wire = response
        .serialise()
        .map_err(|_| TsigError::BadSig)?;
    let time_signed = now_unix();
    let mac = tsig::sign(
        key,
        algorithm,
        &wire,
        response.header.id,
        arcount_without_tsig,
        Some(request_mac),
        key_name,
        time_signed,
        DEFAULT_FUDGE,
        algorithm.default_mac_len(),
        false,
    )?;
    response.additional.push(ResourceRecord {
        name: key_name.clone(),
        class: 255,
        ttl: 0,
        rdata: RecordTypeWithData::Tsig(TsigRdata {
            algorithm_name: DomainName::from_dotted_string(algorithm.dotted_name())
                .expect("algorithm names are well-formed dotted strings"),
            time_signed,
            fudge: DEFAULT_FUDGE,
            mac,
            original_id: response.header.id,
            error: 0,
            other_data: Vec::new(),
        }),
    });
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use dns_proto::message::{Header, Question};
    use dns_proto::record::{QueryClass, QueryType, RecordClass};

    struct StaticKey(Vec<u8>);
    impl KeySelector for StaticKey {
        fn key_for(&self, _key_name: &DomainName, _algorithm: Algorithm) -> Option<Vec<u8>> {
            Some(self.0.clone())
        }
    }

    struct NoKeys;
    impl KeySelector for NoKeys {
        fn key_for(&self, _key_name: &DomainName, _algorithm: Algorithm) -> Option<Vec<u8>> {
            None
        }
    }

    fn question() -> Question {
        Question {
            name: DomainName::from_dotted_string("example.com.").unwrap(),
            qtype: QueryType::Record(dns_proto::record::RecordType::A),
            qclass: QueryClass::Record(RecordClass::IN),
        }
    }

    fn signed_request(key: &[u8]) -> Message {
        let mut message = Message {
            header: Header::query(42, false),
            questions: vec![question()],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        };
        let key_name = DomainName::from_dotted_string("key.example.").unwrap();
        sign_response(&mut message, &key_name, Algorithm::HmacSha256, key, &[]).unwrap();
        // sign_response sets response.header.id from the message it
        // signs, which is already 42 here; reuse it as a stand-in for
        // a signed request since the canonical form doesn't care
        // which direction the message flows.
        message
    }

    #[test]
    fn unsigned_request_is_unsigned() {
        let message = Message {
            header: Header::query(1, false),
            questions: vec![question()],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        };
        let keys = NoKeys;
        assert!(matches!(check_request(&message, &keys), Check::Unsigned));
    }

    #[test]
    fn verifies_correctly_signed_request() {
        let key = b"a-shared-secret".to_vec();
        let request = signed_request(&key);
        let keys = StaticKey(key);
        assert!(matches!(check_request(&request, &keys), Check::Verified { .. }));
    }

    #[test]
    fn unknown_key_fails_with_notauth() {
        let request = signed_request(b"a-shared-secret");
        let keys = NoKeys;
        match check_request(&request, &keys) {
            Check::Failed { response_rcode, tsig_error } => {
                assert_eq!(Rcode(9), response_rcode);
                assert_eq!(tsig::tsig_rcode::BADKEY, tsig_error);
            }
            _ => panic!("expected a Failed outcome"),
        }
    }

    #[test]
    fn bad_time_also_maps_to_notauth() {
        assert_eq!(Rcode(9), rcode_for(TsigError::BadTime));
    }

    #[test]
    fn bad_time_failure_tsig_carries_current_time_as_other_data() {
        let key_name = DomainName::from_dotted_string("key.example.").unwrap();
        let mut response = Message {
            header: Header::query(1, true),
            questions: vec![question()],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        };
        attach_failure_tsig(&mut response, &key_name, Algorithm::HmacSha256, tsig::tsig_rcode::BADTIME);
        let RecordTypeWithData::Tsig(rdata) = &response.additional[0].rdata else {
            panic!("expected a TSIG record");
        };
        assert_eq!(encode_u48(rdata.time_signed), rdata.other_data);
        assert_eq!(6, rdata.other_data.len());
    }

    #[test]
    fn non_bad_time_failure_tsig_has_no_other_data() {
        let key_name = DomainName::from_dotted_string("key.example.").unwrap();
        let mut response = Message {
            header: Header::query(1, true),
            questions: vec![question()],
            answers: Vec::new(),
            authority: Vec::new(),
            additional: Vec::new(),
        };
        attach_failure_tsig(&mut response, &key_name, Algorithm::HmacSha256, tsig::tsig_rcode::BADKEY);
        let RecordTypeWithData::Tsig(rdata) = &response.additional[0].rdata else {
            panic!("expected a TSIG record");
        };
        assert!(rdata.other_data.is_empty());
    }
}
