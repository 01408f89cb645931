#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::wildcard_imports)]
#![allow(clippy::upper_case_acronyms)]

//! Wire-format codec and message model for DNS (RFC 1035), EDNS0
//! (RFC 6891) and TSIG (RFC 8945).
//!
//! This crate has no knowledge of sockets or async runtimes: it only
//! turns bytes into [`message::Message`]s and back, and signs/verifies
//! TSIG pseudo-records over the resulting buffers.

pub mod message;
pub mod name;
pub mod opt;
pub mod record;
pub mod tsig;
pub mod wire;

pub use message::{Header, Message, Opcode, Question, Rcode, WireHeader};
pub use name::DomainName;
pub use record::{QueryClass, QueryType, RecordClass, RecordType, RecordTypeWithData, ResourceRecord};

#[cfg(any(feature = "test-util", test))]
pub mod test_util;
