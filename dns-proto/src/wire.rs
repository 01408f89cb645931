//! Low-level wire buffers and the error types produced while reading
//! or writing them.
//!
//! `ConsumableBuffer` and `WritableBuffer` are deliberately dumb: they
//! know nothing about DNS semantics, only how to pull fixed-width
//! integers and byte runs off (or push them onto) a cursor. Message,
//! name and record (de)serialisation is layered on top in
//! `message.rs`, `name.rs` and `record.rs`.

use std::collections::HashMap;

use crate::name::{DomainName, Label, NameError};

/// Bit layout of the third and fourth octets of a DNS header (RFC
/// 1035 section 4.1.1), packed into one `u16` the way it appears on
/// the wire.
///
/// ```text
///                                 1  1  1  1  1  1
///   0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// |QR|   Opcode  |AA|TC|RD|RA| Z|AD|CD|   RCODE   |
/// +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
/// ```
pub const HEADER_MASK_QR: u16 = 0b1000_0000_0000_0000;
pub const HEADER_MASK_OPCODE: u16 = 0b0111_1000_0000_0000;
pub const HEADER_OFFSET_OPCODE: u16 = 11;
pub const HEADER_MASK_AA: u16 = 0b0000_0100_0000_0000;
pub const HEADER_MASK_TC: u16 = 0b0000_0010_0000_0000;
pub const HEADER_MASK_RD: u16 = 0b0000_0001_0000_0000;
pub const HEADER_MASK_RA: u16 = 0b0000_0000_1000_0000;
pub const HEADER_MASK_Z: u16 = 0b0000_0000_0100_0000;
pub const HEADER_MASK_AD: u16 = 0b0000_0000_0010_0000;
pub const HEADER_MASK_CD: u16 = 0b0000_0000_0001_0000;
pub const HEADER_MASK_RCODE: u16 = 0b0000_0000_0000_1111;
pub const HEADER_OFFSET_RCODE: u16 = 0;

/// A cursor over a borrowed byte slice, used by every `deserialise`
/// implementation in this crate. Positions are absolute offsets from
/// the start of the *message*, not from the start of whatever sub-slice
/// a record happens to be read from, so that name compression pointers
/// (which are message-relative) can be followed with `at_offset`.
#[derive(Debug, Clone, Copy)]
pub struct ConsumableBuffer<'a> {
    octets: &'a [u8],
    position: usize,
}

impl<'a> ConsumableBuffer<'a> {
    pub fn new(octets: &'a [u8]) -> Self {
        ConsumableBuffer {
            octets,
            position: 0,
        }
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn remaining(&self) -> usize {
        self.octets.len().saturating_sub(self.position)
    }

    pub fn next_u8(&mut self) -> Option<u8> {
        let byte = *self.octets.get(self.position)?;
        self.position += 1;
        Some(byte)
    }

    pub fn next_u16(&mut self) -> Option<u16> {
        let hi = self.next_u8()?;
        let lo = self.next_u8()?;
        Some(u16::from_be_bytes([hi, lo]))
    }

    pub fn next_u32(&mut self) -> Option<u32> {
        let a = self.next_u8()?;
        let b = self.next_u8()?;
        let c = self.next_u8()?;
        let d = self.next_u8()?;
        Some(u32::from_be_bytes([a, b, c, d]))
    }

    /// Reads the 48-bit big-endian integer used by the TSIG "time
    /// signed" field.
    pub fn next_u48(&mut self) -> Option<u64> {
        let hi = u64::from(self.next_u16()?);
        let lo = u64::from(self.next_u32()?);
        Some((hi << 32) | lo)
    }

    pub fn take(&mut self, n: usize) -> Option<&'a [u8]> {
        let end = self.position.checked_add(n)?;
        let slice = self.octets.get(self.position..end)?;
        self.position = end;
        Some(slice)
    }

    /// A fresh cursor over the same underlying bytes, positioned at
    /// `offset`. Used to follow name compression pointers, which are
    /// always backward-pointing absolute offsets into the message.
    pub fn at_offset(&self, offset: usize) -> Option<Self> {
        if offset <= self.octets.len() {
            Some(ConsumableBuffer {
                octets: self.octets,
                position: offset,
            })
        } else {
            None
        }
    }

    pub fn all_octets(&self) -> &'a [u8] {
        self.octets
    }
}

/// An append-only byte buffer used by every `serialise` implementation
/// in this crate, plus the name-compression table the encoder
/// maintains across a whole message.
#[derive(Debug, Default)]
pub struct WritableBuffer {
    octets: Vec<u8>,
    /// Maps a previously-written name suffix (lower-cased labels) to
    /// the offset it was first written at, so later occurrences of
    /// the same suffix can be replaced with a compression pointer
    /// instead of being written out again.
    name_suffixes: HashMap<Vec<Vec<u8>>, u16>,
}

impl WritableBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn index(&self) -> usize {
        self.octets.len()
    }

    pub fn into_octets(self) -> Vec<u8> {
        self.octets
    }

    pub fn octets(&self) -> &[u8] {
        &self.octets
    }

    pub fn write_u8(&mut self, value: u8) {
        self.octets.push(value);
    }

    pub fn write_u16(&mut self, value: u16) {
        self.octets.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.octets.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_u48(&mut self, value: u64) {
        let bytes = value.to_be_bytes();
        // u64::to_be_bytes gives 8 bytes; a 48-bit field is the low 6.
        self.octets.extend_from_slice(&bytes[2..]);
    }

    pub fn write_octets(&mut self, value: &[u8]) {
        self.octets.extend_from_slice(value);
    }

    /// Overwrites two already-written octets at `index` with `value`,
    /// big-endian. Used to backpatch RDLENGTH once a record's RDATA
    /// has been written.
    pub fn set_u16(&mut self, index: usize, value: u16) {
        let bytes = value.to_be_bytes();
        self.octets[index] = bytes[0];
        self.octets[index + 1] = bytes[1];
    }

    /// Writes `name`, compressing against any suffix already written
    /// earlier in this buffer. Only ever emits a pointer to a
    /// strictly earlier offset, so a decoder reading the result can
    /// never loop.
    ///
    /// `compress` lets TSIG and AXFR-continuation framing turn
    /// compression off for a single name (some verifiers expect an
    /// uncompressed canonical form).
    pub fn write_name(&mut self, name: &DomainName, compress: bool) {
        let labels = name.labels();
        for (i, label) in labels.iter().enumerate() {
            if label.is_empty() {
                self.write_u8(0);
                break;
            }
            if compress {
                let suffix = Self::suffix_key(&labels[i..]);
                if let Some(&pointer) = self.name_suffixes.get(&suffix) {
                    self.write_u16(0b1100_0000_0000_0000 | pointer);
                    return;
                }
                if self.index() <= 0x3FFF {
                    self.name_suffixes
                        .insert(suffix, u16::try_from(self.index()).unwrap());
                }
            }
            self.write_u8(u8::try_from(label.as_bytes().len()).unwrap());
            self.write_octets(label.as_bytes());
        }
    }

    fn suffix_key(labels: &[Label]) -> Vec<Vec<u8>> {
        labels
            .iter()
            .map(|l| l.as_bytes().iter().map(u8::to_ascii_lowercase).collect())
            .collect()
    }
}

/// An error encountered while decoding a message. Carries the octet
/// offset the failure occurred at rather than the message ID, since
/// the ID itself may not have parsed yet; callers that need to
/// synthesize a `FormatError` reply read the ID separately before
/// attempting a full parse.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum Error {
    #[error("message shorter than a header (12 octets)")]
    HeaderTooShort,
    #[error("question section truncated at octet {0}")]
    QuestionTooShort(usize),
    #[error("resource record truncated at octet {0}")]
    ResourceRecordTooShort(usize),
    #[error("resource record at octet {0} has RDLENGTH inconsistent with its RDATA")]
    ResourceRecordInvalid(usize),
    #[error("domain name truncated at octet {0}")]
    DomainTooShort(usize),
    #[error("domain name at octet {0} exceeds 255 octets")]
    DomainTooLong(usize),
    #[error("compression pointer at octet {0} does not point strictly backward")]
    DomainPointerInvalid(usize),
    #[error("label at octet {0} uses a reserved length-prefix bit pattern")]
    DomainLabelInvalid(usize),
}

impl From<NameError> for Error {
    fn from(_: NameError) -> Self {
        Error::DomainLabelInvalid(0)
    }
}

/// An error encountered while encoding a message. Unlike decoding,
/// there is really only one way this can fail: a section grew past
/// what its 16-bit wire count field can represent.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum EncodeError {
    #[error("{section} has {count} entries, which does not fit in a 16-bit count field")]
    CounterTooLarge { section: &'static str, count: usize },
}

pub(crate) fn usize_to_u16(section: &'static str, value: usize) -> Result<u16, EncodeError> {
    u16::try_from(value).map_err(|_| EncodeError::CounterTooLarge {
        section,
        count: value,
    })
}
