//! Domain names: an ordered sequence of labels, case-preserving on the
//! wire but case-insensitive (ASCII fold) for equality, hashing and
//! ordering. See RFC 1035 section 3.1.

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::wire::{ConsumableBuffer, WritableBuffer};

/// A name may not chase more than this many compression pointers
/// while decoding; each pointer must point strictly backward, so this
/// is already generous, but it keeps a deliberately-crafted pointer
/// chain from costing more than a bounded amount of work.
const MAX_POINTER_HOPS: usize = 128;

/// A label must be 63 octets or shorter.
pub const LABEL_MAX_LEN: usize = 63;

/// A name must be 255 octets or shorter in total, including length
/// octets and the root terminator.
pub const DOMAINNAME_MAX_LEN: usize = 255;

/// A single label, 0..=63 octets.  The empty label only ever appears
/// as the final (root) label of a [`DomainName`].
#[derive(Debug, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct Label(Vec<u8>);

impl Label {
    pub fn root() -> Self {
        Label(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn eq_ignore_ascii_case(&self, other: &Label) -> bool {
        self.0.eq_ignore_ascii_case(&other.0)
    }

    fn cmp_ignore_ascii_case(&self, other: &Label) -> Ordering {
        self.0
            .iter()
            .map(u8::to_ascii_lowercase)
            .cmp(other.0.iter().map(u8::to_ascii_lowercase))
    }
}

impl TryFrom<&[u8]> for Label {
    type Error = LabelTooLong;

    fn try_from(bytes: &[u8]) -> Result<Self, LabelTooLong> {
        if bytes.len() <= LABEL_MAX_LEN {
            Ok(Label(bytes.to_vec()))
        } else {
            Err(LabelTooLong)
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub struct LabelTooLong;

/// A domain name: labels in wire order (leftmost label first, root
/// last), kept in their original case.  Equality, ordering and
/// hashing all ASCII-fold; serialisation does not.
#[derive(Debug, Clone)]
pub struct DomainName {
    labels: Vec<Label>,
}

impl DomainName {
    pub fn root() -> Self {
        DomainName {
            labels: vec![Label::root()],
        }
    }

    pub fn is_root(&self) -> bool {
        self.labels.len() == 1
    }

    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// Number of octets this name takes up on the wire, uncompressed
    /// (one length octet per label, plus the label bytes, plus the
    /// root's zero octet).
    pub fn wire_len(&self) -> usize {
        self.labels.iter().map(|l| 1 + l.as_bytes().len()).sum()
    }

    pub fn is_subdomain_of(&self, other: &DomainName) -> bool {
        if other.labels.len() > self.labels.len() {
            return false;
        }
        let offset = self.labels.len() - other.labels.len();
        self.labels[offset..]
            .iter()
            .zip(&other.labels)
            .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }

    /// Builds a name from labels already split, preserving their
    /// case.  The caller does not supply the trailing root label; it
    /// is added automatically.
    ///
    /// # Errors
    ///
    /// If any label is empty, too long, non-ASCII, or the overall
    /// name would exceed [`DOMAINNAME_MAX_LEN`].
    pub fn from_labels(parts: Vec<Vec<u8>>) -> Result<Self, NameError> {
        let mut labels = Vec::with_capacity(parts.len() + 1);
        let mut wire_len = 1; // root terminator
        for part in parts {
            if part.is_empty() {
                return Err(NameError::EmptyLabel);
            }
            if !part.is_ascii() {
                return Err(NameError::NonAscii);
            }
            let label = Label::try_from(part.as_slice()).map_err(|_| NameError::LabelTooLong)?;
            wire_len += 1 + label.as_bytes().len();
            if wire_len > DOMAINNAME_MAX_LEN {
                return Err(NameError::NameTooLong);
            }
            labels.push(label);
        }
        labels.push(Label::root());
        Ok(DomainName { labels })
    }

    /// Appends labels one at a time, checking the running total stays
    /// within [`DOMAINNAME_MAX_LEN`].  Used by the decoder.
    pub(crate) fn from_raw_labels(labels: Vec<Label>) -> Result<Self, NameError> {
        let wire_len: usize = labels.iter().map(|l| 1 + l.as_bytes().len()).sum();
        if wire_len > DOMAINNAME_MAX_LEN {
            return Err(NameError::NameTooLong);
        }
        Ok(DomainName { labels })
    }

    pub fn from_dotted_string(s: &str) -> Result<Self, NameError> {
        if s == "." {
            return Ok(DomainName::root());
        }
        let s = s.strip_suffix('.').unwrap_or(s);
        let parts = s
            .split('.')
            .map(|label| label.as_bytes().to_vec())
            .collect();
        Self::from_labels(parts)
    }

    /// Writes this name to `buf`, compressing against any suffix
    /// already written earlier in the same message when `compress` is
    /// set.
    pub fn serialise(&self, buf: &mut WritableBuffer, compress: bool) {
        buf.write_name(self, compress);
    }

    /// Reads a name from `buf`, following compression pointers. The
    /// cursor position after a pointer is restored to just past the
    /// pointer itself, not to wherever the pointer chain ended up, so
    /// that reading the record that follows the name continues from
    /// the right place.
    pub fn deserialise(buf: &mut ConsumableBuffer) -> Result<Self, crate::wire::Error> {
        let start = buf.position();
        let mut labels = Vec::new();
        let mut cursor = *buf;
        let mut hops = 0;
        let mut end_position = None;

        loop {
            let length_octet_pos = cursor.position();
            let length = cursor
                .next_u8()
                .ok_or(crate::wire::Error::DomainTooShort(start))?;

            match length & 0b1100_0000 {
                0b0000_0000 => {
                    if length == 0 {
                        labels.push(Label::root());
                        if end_position.is_none() {
                            end_position = Some(cursor.position());
                        }
                        break;
                    }
                    let octets = cursor
                        .take(length as usize)
                        .ok_or(crate::wire::Error::DomainTooShort(start))?;
                    labels.push(
                        Label::try_from(octets)
                            .map_err(|_| crate::wire::Error::DomainLabelInvalid(length_octet_pos))?,
                    );
                }
                0b1100_0000 => {
                    let lo = cursor
                        .next_u8()
                        .ok_or(crate::wire::Error::DomainTooShort(start))?;
                    let pointer = (u16::from(length & 0b0011_1111) << 8) | u16::from(lo);
                    let pointer = pointer as usize;
                    if end_position.is_none() {
                        end_position = Some(cursor.position());
                    }
                    if pointer >= length_octet_pos {
                        return Err(crate::wire::Error::DomainPointerInvalid(length_octet_pos));
                    }
                    hops += 1;
                    if hops > MAX_POINTER_HOPS {
                        return Err(crate::wire::Error::DomainPointerInvalid(length_octet_pos));
                    }
                    cursor = cursor
                        .at_offset(pointer)
                        .ok_or(crate::wire::Error::DomainPointerInvalid(length_octet_pos))?;
                }
                _ => return Err(crate::wire::Error::DomainLabelInvalid(length_octet_pos)),
            }

            let wire_len: usize = labels.iter().map(|l| 1 + l.as_bytes().len()).sum();
            if wire_len > DOMAINNAME_MAX_LEN {
                return Err(crate::wire::Error::DomainTooLong(start));
            }
        }

        *buf = buf
            .at_offset(end_position.unwrap())
            .ok_or(crate::wire::Error::DomainTooShort(start))?;

        DomainName::from_raw_labels(labels).map_err(|_| crate::wire::Error::DomainTooLong(start))
    }

    pub fn to_dotted_string(&self) -> String {
        if self.is_root() {
            return ".".to_string();
        }
        let mut out = String::with_capacity(self.wire_len());
        for label in &self.labels {
            if label.is_empty() {
                continue;
            }
            for &octet in label.as_bytes() {
                if octet == b'.' || octet == b'\\' {
                    out.push('\\');
                }
                out.push(octet as char);
            }
            out.push('.');
        }
        out
    }
}

impl fmt::Display for DomainName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_dotted_string())
    }
}

impl std::str::FromStr for DomainName {
    type Err = NameError;

    fn from_str(s: &str) -> Result<Self, NameError> {
        Self::from_dotted_string(s)
    }
}

impl PartialEq for DomainName {
    fn eq(&self, other: &Self) -> bool {
        self.labels.len() == other.labels.len()
            && self
                .labels
                .iter()
                .zip(&other.labels)
                .all(|(a, b)| a.eq_ignore_ascii_case(b))
    }
}

impl Eq for DomainName {}

impl PartialOrd for DomainName {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DomainName {
    fn cmp(&self, other: &Self) -> Ordering {
        for (a, b) in self.labels.iter().zip(&other.labels) {
            match a.cmp_ignore_ascii_case(b) {
                Ordering::Equal => continue,
                other => return other,
            }
        }
        self.labels.len().cmp(&other.labels.len())
    }
}

impl Hash for DomainName {
    fn hash<H: Hasher>(&self, state: &mut H) {
        for label in &self.labels {
            for &octet in label.as_bytes() {
                octet.to_ascii_lowercase().hash(state);
            }
            0xFFu8.hash(state);
        }
    }
}

#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum NameError {
    #[error("a label other than the root label was empty")]
    EmptyLabel,
    #[error("label contains non-ASCII bytes")]
    NonAscii,
    #[error("label exceeds {LABEL_MAX_LEN} octets")]
    LabelTooLong,
    #[error("name exceeds {DOMAINNAME_MAX_LEN} octets")]
    NameTooLong,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn root_round_trips() {
        assert_eq!(".", DomainName::root().to_dotted_string());
        assert_eq!(DomainName::root(), DomainName::from_dotted_string(".").unwrap());
    }

    #[test]
    fn dotted_string_round_trips() {
        let n = DomainName::from_dotted_string("www.Example.com.").unwrap();
        assert_eq!("www.Example.com.", n.to_dotted_string());
    }

    #[test]
    fn equality_is_case_insensitive() {
        let a = DomainName::from_dotted_string("WWW.example.com.").unwrap();
        let b = DomainName::from_dotted_string("www.EXAMPLE.com.").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn serialisation_preserves_case() {
        let n = DomainName::from_dotted_string("WwW.example.com.").unwrap();
        assert_eq!("WwW.example.com.", n.to_dotted_string());
    }

    #[test]
    fn is_subdomain_of() {
        let child = DomainName::from_dotted_string("www.example.com.").unwrap();
        let parent = DomainName::from_dotted_string("example.com.").unwrap();
        assert!(child.is_subdomain_of(&parent));
        assert!(!parent.is_subdomain_of(&child));
        assert!(child.is_subdomain_of(&child));
    }

    #[test]
    fn rejects_long_label() {
        let long = vec![b'a'; 64];
        assert_eq!(
            Err(NameError::LabelTooLong),
            DomainName::from_labels(vec![long])
        );
    }

    #[test]
    fn rejects_long_name() {
        // 4 bytes of length-prefixed overhead per label; 60-octet
        // labels keep well under the per-label cap but blow the
        // 255-octet whole-name budget once there are enough of them.
        let parts: Vec<Vec<u8>> = (0..5).map(|_| vec![b'a'; 60]).collect();
        assert_eq!(Err(NameError::NameTooLong), DomainName::from_labels(parts));
    }
}
