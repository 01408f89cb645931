//! TSIG (RFC 8945): transaction signatures over DNS messages using a
//! shared secret and an HMAC.
//!
//! Like OPT, TSIG is carried as a resource record in the additional
//! section whose owner name is overloaded (it names the key) and
//! whose CLASS is always ANY and TTL always 0; [`TsigRdata`] only
//! covers the RDATA proper. The signing and verification functions
//! here work directly on the serialised message bytes, since the
//! "message" a TSIG MAC covers is defined in terms of the wire
//! encoding, not the parsed [`crate::message::Message`].

use hmac::{Hmac, Mac, digest::KeyInit};
use md5::Md5;
use sha1::Sha1;
use sha2::{Sha256, Sha384, Sha512};

use crate::name::DomainName;
use crate::wire::{ConsumableBuffer, Error, WritableBuffer};

/// The RDATA of a TSIG record (RFC 8945 section 4.2).
#[derive(Debug, Clone, PartialEq)]
pub struct TsigRdata {
    pub algorithm_name: DomainName,
    /// Seconds since the Unix epoch, 48 bits wide on the wire.
    pub time_signed: u64,
    pub fudge: u16,
    pub mac: Vec<u8>,
    pub original_id: u16,
    pub error: u16,
    pub other_data: Vec<u8>,
}

impl TsigRdata {
    pub(crate) fn serialise_rdata(&self, buf: &mut WritableBuffer) {
        // RFC 8945 section 4.2: the algorithm name is never
        // compressed and canonicalised to lowercase when signed, but
        // is written in whatever case the caller gave it here.
        self.algorithm_name.serialise(buf, false);
        buf.write_u48(self.time_signed);
        buf.write_u16(self.fudge);
        buf.write_u16(u16::try_from(self.mac.len()).unwrap_or(u16::MAX));
        buf.write_octets(&self.mac);
        buf.write_u16(self.original_id);
        buf.write_u16(self.error);
        buf.write_u16(u16::try_from(self.other_data.len()).unwrap_or(u16::MAX));
        buf.write_octets(&self.other_data);
    }

    pub(crate) fn deserialise_rdata(buf: &mut ConsumableBuffer) -> Result<Self, Error> {
        let start = buf.position();
        let algorithm_name = DomainName::deserialise(buf)?;
        let time_signed = buf.next_u48().ok_or(Error::ResourceRecordTooShort(start))?;
        let fudge = buf.next_u16().ok_or(Error::ResourceRecordTooShort(start))?;
        let mac_size = buf.next_u16().ok_or(Error::ResourceRecordTooShort(start))? as usize;
        let mac = buf
            .take(mac_size)
            .ok_or(Error::ResourceRecordTooShort(start))?
            .to_vec();
        let original_id = buf.next_u16().ok_or(Error::ResourceRecordTooShort(start))?;
        let error = buf.next_u16().ok_or(Error::ResourceRecordTooShort(start))?;
        let other_len = buf.next_u16().ok_or(Error::ResourceRecordTooShort(start))? as usize;
        let other_data = buf
            .take(other_len)
            .ok_or(Error::ResourceRecordTooShort(start))?
            .to_vec();
        Ok(TsigRdata {
            algorithm_name,
            time_signed,
            fudge,
            mac,
            original_id,
            error,
            other_data,
        })
    }
}

/// Extended RCODEs defined for TSIG verification failures (RFC 8945
/// section 5.3), on top of the ordinary RCODE space.
pub mod tsig_rcode {
    pub const BADSIG: u16 = 16;
    pub const BADKEY: u16 = 17;
    pub const BADTIME: u16 = 18;
    pub const BADTRUNC: u16 = 22;
}

/// A TSIG HMAC algorithm, including the truncated variants defined by
/// RFC 4635 and RFC 8945 section 6 (`-128`, `-192`, `-256` suffixes
/// shorten the MAC to that many bits).
#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub enum Algorithm {
    HmacMd5,
    HmacSha1,
    HmacSha1_96,
    HmacSha256,
    HmacSha256_128,
    HmacSha384,
    HmacSha384_192,
    HmacSha512,
    HmacSha512_256,
}

impl Algorithm {
    pub fn dotted_name(self) -> &'static str {
        match self {
            Algorithm::HmacMd5 => "hmac-md5.sig-alg.reg.int.",
            Algorithm::HmacSha1 | Algorithm::HmacSha1_96 => "hmac-sha1.",
            Algorithm::HmacSha256 | Algorithm::HmacSha256_128 => "hmac-sha256.",
            Algorithm::HmacSha384 | Algorithm::HmacSha384_192 => "hmac-sha384.",
            Algorithm::HmacSha512 | Algorithm::HmacSha512_256 => "hmac-sha512.",
        }
    }

    pub fn from_dotted_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "hmac-md5.sig-alg.reg.int." => Some(Algorithm::HmacMd5),
            "hmac-sha1." => Some(Algorithm::HmacSha1),
            "hmac-sha256." => Some(Algorithm::HmacSha256),
            "hmac-sha384." => Some(Algorithm::HmacSha384),
            "hmac-sha512." => Some(Algorithm::HmacSha512),
            _ => None,
        }
    }

    /// The full, untruncated MAC length this algorithm produces, in
    /// octets.
    fn full_mac_len(self) -> usize {
        match self {
            Algorithm::HmacMd5 => 16,
            Algorithm::HmacSha1 | Algorithm::HmacSha1_96 => 20,
            Algorithm::HmacSha256 | Algorithm::HmacSha256_128 => 32,
            Algorithm::HmacSha384 | Algorithm::HmacSha384_192 => 48,
            Algorithm::HmacSha512 | Algorithm::HmacSha512_256 => 64,
        }
    }

    /// The MAC length a signer should use absent any other
    /// constraint: the algorithm's fixed length for a `-nnn`
    /// truncated variant, or the full untruncated length otherwise.
    pub fn default_mac_len(self) -> usize {
        self.fixed_truncated_len().unwrap_or_else(|| self.full_mac_len())
    }

    /// The minimum MAC length RFC 8945 section 5.2.2.1 permits this
    /// algorithm to be truncated to: the larger of half the full
    /// length and 10 octets.
    fn min_mac_len(self) -> usize {
        (self.full_mac_len() / 2).max(10)
    }

    /// The length a truncated variant's MAC is fixed at; `None` for
    /// the untruncated variants (where the signer may still shorten
    /// the MAC, subject to [`Algorithm::min_mac_len`]).
    fn fixed_truncated_len(self) -> Option<usize> {
        match self {
            Algorithm::HmacSha1_96 => Some(12),
            Algorithm::HmacSha256_128 => Some(16),
            Algorithm::HmacSha384_192 => Some(24),
            Algorithm::HmacSha512_256 => Some(32),
            _ => None,
        }
    }

    fn compute(self, key: &[u8], data: &[u8]) -> Vec<u8> {
        fn run<M: Mac + KeyInit>(key: &[u8], data: &[u8]) -> Vec<u8> {
            let mut mac = <M as KeyInit>::new_from_slice(key).expect("HMAC accepts keys of any length");
            mac.update(data);
            mac.finalize().into_bytes().to_vec()
        }
        match self {
            Algorithm::HmacMd5 => run::<Hmac<Md5>>(key, data),
            Algorithm::HmacSha1 | Algorithm::HmacSha1_96 => run::<Hmac<Sha1>>(key, data),
            Algorithm::HmacSha256 | Algorithm::HmacSha256_128 => run::<Hmac<Sha256>>(key, data),
            Algorithm::HmacSha384 | Algorithm::HmacSha384_192 => run::<Hmac<Sha384>>(key, data),
            Algorithm::HmacSha512 | Algorithm::HmacSha512_256 => run::<Hmac<Sha512>>(key, data),
        }
    }

    /// Computes the MAC over `data` with `key`, truncating it to
    /// `requested_len` octets (the length the RDATA on the wire
    /// asked for, when verifying; the algorithm's natural fixed
    /// length, when signing a `-nnn` variant).
    fn mac(self, key: &[u8], data: &[u8], requested_len: usize) -> Result<Vec<u8>, TsigError> {
        if requested_len < self.min_mac_len() || requested_len > self.full_mac_len() {
            return Err(TsigError::BadTrunc);
        }
        if let Some(fixed) = self.fixed_truncated_len() {
            if requested_len != fixed {
                return Err(TsigError::BadTrunc);
            }
        }
        let mut full = self.compute(key, data);
        full.truncate(requested_len);
        Ok(full)
    }
}

/// Looks up the shared secret for a TSIG key by name and algorithm.
/// Implemented by the server and client configuration layers, which
/// hold the actual key material.
pub trait KeySelector {
    /// Returns the key bytes for `key_name`/`algorithm`, or `None` if
    /// no such key is configured (the caller should respond with
    /// [`tsig_rcode::BADKEY`]).
    fn key_for(&self, key_name: &DomainName, algorithm: Algorithm) -> Option<Vec<u8>>;
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum TsigError {
    #[error("no key configured with this name and algorithm")]
    BadKey,
    #[error("MAC did not verify")]
    BadSig,
    #[error("time signed is outside the fudge window")]
    BadTime,
    #[error("requested MAC length is not permitted for this algorithm")]
    BadTrunc,
    #[error("unrecognised algorithm name")]
    BadAlg,
}

/// Builds the canonical buffer a TSIG MAC is computed over (RFC 8945
/// section 4.3.2): optionally a prior MAC (for the response-to-signed-
/// request case and AXFR continuation packets), the message with its
/// ID and ARCOUNT adjusted to exclude the TSIG record, then the TSIG
/// variables.
///
/// `prior_mac` is `Some` for a response signed against a signed
/// request (section 4.3.2 step 1) or a continuation packet in a
/// multi-message AXFR sequence (section 5.3.2); it is `None` for a
/// request or a first AXFR packet.
///
/// `abbreviated` selects the shortened variable set RFC 8945 section
/// 5.3.2 allows for messages after the first in a multi-message
/// sequence: only the time signed and fudge, no key/algorithm name or
/// error/other-data fields.
fn canonical_buffer(
    message_octets_without_tsig: &[u8],
    message_id: u16,
    arcount_without_tsig: u16,
    prior_mac: Option<&[u8]>,
    key_name: &DomainName,
    algorithm: Algorithm,
    time_signed: u64,
    fudge: u16,
    error: u16,
    other_data: &[u8],
    abbreviated: bool,
) -> Vec<u8> {
    let mut buf = WritableBuffer::new();

    if let Some(mac) = prior_mac {
        buf.write_u16(u16::try_from(mac.len()).unwrap_or(u16::MAX));
        buf.write_octets(mac);
    }

    // The message itself, with ID restored to original_id and
    // ARCOUNT adjusted to not count the TSIG record.
    let mut patched = message_octets_without_tsig.to_vec();
    patched[0..2].copy_from_slice(&message_id.to_be_bytes());
    patched[10..12].copy_from_slice(&arcount_without_tsig.to_be_bytes());
    buf.write_octets(&patched);

    if abbreviated {
        buf.write_u48(time_signed);
        buf.write_u16(fudge);
        return buf.into_octets();
    }

    key_name.serialise(&mut buf, false);
    buf.write_u16(255); // CLASS ANY
    buf.write_u32(0); // TTL
    let algorithm_name = DomainName::from_dotted_string(algorithm.dotted_name())
        .expect("algorithm names are well-formed dotted strings");
    algorithm_name.serialise(&mut buf, false);
    buf.write_u48(time_signed);
    buf.write_u16(fudge);
    buf.write_u16(error);
    buf.write_u16(u16::try_from(other_data.len()).unwrap_or(u16::MAX));
    buf.write_octets(other_data);

    buf.into_octets()
}

/// Computes the TSIG MAC for a message, for use building the TSIG
/// record a signer attaches before sending.
#[allow(clippy::too_many_arguments)]
pub fn sign(
    key: &[u8],
    algorithm: Algorithm,
    message_octets_without_tsig: &[u8],
    original_id: u16,
    arcount_without_tsig: u16,
    prior_mac: Option<&[u8]>,
    key_name: &DomainName,
    time_signed: u64,
    fudge: u16,
    requested_mac_len: usize,
    abbreviated: bool,
) -> Result<Vec<u8>, TsigError> {
    let data = canonical_buffer(
        message_octets_without_tsig,
        original_id,
        arcount_without_tsig,
        prior_mac,
        key_name,
        algorithm,
        time_signed,
        fudge,
        0,
        &[],
        abbreviated,
    );
    algorithm.mac(key, &data, requested_mac_len)
}

/// Verifies a received TSIG record against the message it was
/// attached to.
///
/// `now` and `fudge` bound the acceptable clock skew: the time
/// signed must be within `fudge` seconds of `now` or
/// [`TsigError::BadTime`] is returned.
#[allow(clippy::too_many_arguments)]
pub fn verify(
    keys: &dyn KeySelector,
    rdata: &TsigRdata,
    message_octets_without_tsig: &[u8],
    arcount_without_tsig: u16,
    prior_mac: Option<&[u8]>,
    key_name: &DomainName,
    now: u64,
    abbreviated: bool,
) -> Result<(), TsigError> {
    let algorithm =
        Algorithm::from_dotted_name(&rdata.algorithm_name.to_dotted_string()).ok_or(TsigError::BadAlg)?;
    let key = keys.key_for(key_name, algorithm).ok_or(TsigError::BadKey)?;

    let data = canonical_buffer(
        message_octets_without_tsig,
        rdata.original_id,
        arcount_without_tsig,
        prior_mac,
        key_name,
        algorithm,
        rdata.time_signed,
        rdata.fudge,
        rdata.error,
        &rdata.other_data,
        abbreviated,
    );
    let expected = algorithm.mac(&key, &data, rdata.mac.len())?;
    // Constant-time-ish comparison: both sides are attacker-influenced
    // lengths, so compare full vectors rather than shortcutting.
    if expected.len() != rdata.mac.len() || !constant_time_eq(&expected, &rdata.mac) {
        return Err(TsigError::BadSig);
    }

    let skew = now.abs_diff(rdata.time_signed);
    if skew > u64::from(rdata.fudge) {
        return Err(TsigError::BadTime);
    }

    Ok(())
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    struct StaticKey(Vec<u8>);
    impl KeySelector for StaticKey {
        fn key_for(&self, _key_name: &DomainName, _algorithm: Algorithm) -> Option<Vec<u8>> {
            Some(self.0.clone())
        }
    }

    fn fake_message() -> Vec<u8> {
        // A minimal 12-octet header is enough to exercise canonical
        // buffer construction; ARCOUNT is at offset 10.
        let mut msg = vec![0u8; 12];
        msg[0] = 0x12;
        msg[1] = 0x34;
        msg
    }

    #[test]
    fn sign_then_verify_round_trips() {
        let key = b"super-secret-key".to_vec();
        let key_name = DomainName::from_dotted_string("key.example.").unwrap();
        let message = fake_message();
        let mac = sign(
            &key,
            Algorithm::HmacSha256,
            &message,
            0x1234,
            0,
            None,
            &key_name,
            1_700_000_000,
            300,
            32,
            false,
        )
        .unwrap();

        let rdata = TsigRdata {
            algorithm_name: DomainName::from_dotted_string("hmac-sha256.").unwrap(),
            time_signed: 1_700_000_000,
            fudge: 300,
            mac,
            original_id: 0x1234,
            error: 0,
            other_data: vec![],
        };

        let selector = StaticKey(key);
        verify(
            &selector,
            &rdata,
            &message,
            0,
            None,
            &key_name,
            1_700_000_100,
            false,
        )
        .unwrap();
    }

    #[test]
    fn wrong_key_fails_verification() {
        let key_name = DomainName::from_dotted_string("key.example.").unwrap();
        let message = fake_message();
        let mac = sign(
            b"correct-key",
            Algorithm::HmacSha256,
            &message,
            0x1234,
            0,
            None,
            &key_name,
            1_700_000_000,
            300,
            32,
            false,
        )
        .unwrap();
        let rdata = TsigRdata {
            algorithm_name: DomainName::from_dotted_string("hmac-sha256.").unwrap(),
            time_signed: 1_700_000_000,
            fudge: 300,
            mac,
            original_id: 0x1234,
            error: 0,
            other_data: vec![],
        };
        let selector = StaticKey(b"wrong-key".to_vec());
        let err = verify(&selector, &rdata, &message, 0, None, &key_name, 1_700_000_000, false)
            .unwrap_err();
        assert_eq!(TsigError::BadSig, err);
    }

    #[test]
    fn stale_time_signed_fails_verification() {
        let key = b"a-key".to_vec();
        let key_name = DomainName::from_dotted_string("key.example.").unwrap();
        let message = fake_message();
        let mac = sign(
            &key,
            Algorithm::HmacSha256,
            &message,
            0x1234,
            0,
            None,
            &key_name,
            1_700_000_000,
            5,
            32,
            false,
        )
        .unwrap();
        let rdata = TsigRdata {
            algorithm_name: DomainName::from_dotted_string("hmac-sha256.").unwrap(),
            time_signed: 1_700_000_000,
            fudge: 5,
            mac,
            original_id: 0x1234,
            error: 0,
            other_data: vec![],
        };
        let selector = StaticKey(key);
        let err = verify(&selector, &rdata, &message, 0, None, &key_name, 1_700_001_000, false)
            .unwrap_err();
        assert_eq!(TsigError::BadTime, err);
    }
}
