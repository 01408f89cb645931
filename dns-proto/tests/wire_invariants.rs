//! Integration tests for the wire-format invariants: malformed
//! compression pointers and label length prefixes must be rejected
//! rather than accepted or looped on forever.

use dns_proto::message::Message;
use dns_proto::name::DomainName;
use dns_proto::wire::{ConsumableBuffer, Error};

fn header(qdcount: u16) -> Vec<u8> {
    let mut h = vec![0u8; 12];
    h[4..6].copy_from_slice(&qdcount.to_be_bytes());
    h
}

#[test]
fn rejects_pointer_that_points_forward() {
    // Header claims one question; the name at offset 12 is a pointer
    // to offset 14, which is later in the message than the pointer
    // itself.
    let mut msg = header(1);
    msg.extend_from_slice(&[0b1100_0000, 14, 0, 1, 0, 1]);
    let err = Message::deserialise(&msg).unwrap_err();
    assert!(matches!(err, Error::DomainPointerInvalid(_)));
}

#[test]
fn rejects_pointer_that_points_to_itself() {
    let mut msg = header(1);
    // The pointer at offset 12 points to offset 12, i.e. itself.
    msg.extend_from_slice(&[0b1100_0000, 12]);
    let err = Message::deserialise(&msg).unwrap_err();
    assert!(matches!(err, Error::DomainPointerInvalid(_)));
}

#[test]
fn rejects_reserved_length_prefix_bit_pattern() {
    // 0b01_000000 is neither a normal label length (00) nor a
    // compression pointer (11); RFC 1035 leaves 01 and 10 undefined,
    // and this crate refuses to guess.
    let mut msg = header(1);
    msg.push(0b0100_0000);
    let err = Message::deserialise(&msg).unwrap_err();
    assert!(matches!(err, Error::DomainLabelInvalid(_)));
}

#[test]
fn rejects_name_over_255_octets_on_the_wire() {
    let mut msg = header(1);
    // 4 labels of 63 octets each, repeated enough times to exceed
    // 255 octets before hitting the root label.
    for _ in 0..5 {
        msg.push(63);
        msg.extend(std::iter::repeat(b'a').take(63));
    }
    msg.push(0);
    let err = Message::deserialise(&msg).unwrap_err();
    assert!(matches!(err, Error::DomainTooLong(_)));
}

#[test]
fn decodes_a_name_via_a_single_valid_pointer_hop() {
    // "a." written out in full at offset 12, then a second name at
    // offset 15 that points back to it.
    let mut msg = header(2);
    msg.extend_from_slice(&[1, b'a', 0]); // offset 12..15: "a."
    msg.extend_from_slice(&(0b1100_0000_0000_0000 | 12u16).to_be_bytes());

    let mut full = ConsumableBuffer::new(&msg);
    for _ in 0..12 {
        full.next_u8();
    }
    let decoded = DomainName::deserialise(&mut full).unwrap();
    assert_eq!("a.", decoded.to_dotted_string());
    let decoded_second = DomainName::deserialise(&mut full).unwrap();
    assert_eq!("a.", decoded_second.to_dotted_string());
}
