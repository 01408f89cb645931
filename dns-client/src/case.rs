//! 0x20 case randomization (draft-vixie-dnsext-dns0x20): randomizing
//! the case of a query's QNAME adds a few extra bits of entropy an
//! off-path attacker forging a response has to guess, on top of the
//! transaction ID.

use rand::RngCore;

use dns_proto::name::DomainName;

/// Returns a copy of `name` with each ASCII alphabetic octet's case
/// flipped independently at random.
pub fn randomize_case<R: RngCore>(name: &DomainName, rng: &mut R) -> DomainName {
    let mut parts = Vec::with_capacity(name.labels().len());
    for label in name.labels() {
        if label.is_empty() {
            continue;
        }
        let mut bytes = label.as_bytes().to_vec();
        for byte in &mut bytes {
            if byte.is_ascii_alphabetic() && rng.next_u32() % 2 == 0 {
                *byte ^= 0x20;
            }
        }
        parts.push(bytes);
    }
    DomainName::from_labels(parts).expect("case-flipping preserves label lengths")
}

/// Whether `echoed` is byte-for-byte the same name as `sent`,
/// including label case. `DomainName`'s own `PartialEq` ASCII-folds
/// case, which is right for ordinary name comparison but wrong here:
/// 0x20 randomization only works as a forgery check if the server is
/// required to echo the exact case it was asked with, so this compares
/// the raw label bytes instead of going through `==`.
pub fn echoes_case(sent: &DomainName, echoed: &DomainName) -> bool {
    let sent_labels = sent.labels();
    let echoed_labels = echoed.labels();
    sent_labels.len() == echoed_labels.len()
        && sent_labels
            .iter()
            .zip(echoed_labels)
            .all(|(a, b)| a.as_bytes() == b.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn randomization_preserves_name_identity() {
        let name = DomainName::from_dotted_string("example.com.").unwrap();
        let mut rng = StdRng::seed_from_u64(42);
        let randomized = randomize_case(&name, &mut rng);
        assert_eq!(name, randomized);
        assert_eq!(name.to_dotted_string().len(), randomized.to_dotted_string().len());
    }

    #[test]
    fn identical_case_echoes() {
        let sent = DomainName::from_dotted_string("ExAmPlE.com.").unwrap();
        let echoed = DomainName::from_dotted_string("ExAmPlE.com.").unwrap();
        assert!(echoes_case(&sent, &echoed));
    }

    #[test]
    fn altered_case_does_not_echo() {
        let sent = DomainName::from_dotted_string("ExAmPlE.com.").unwrap();
        let echoed = DomainName::from_dotted_string("example.com.").unwrap();
        assert!(!echoes_case(&sent, &echoed));
        assert_eq!(sent, echoed, "DomainName equality still folds case");
    }
}
