#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]

//! Transport-aware query engine: sends a question to a list of
//! candidate nameservers in turn, handling UDP-to-TCP fallback on
//! truncation, TSIG signing/verification, 0x20 case randomization,
//! and multi-message AXFR/IXFR responses.

pub mod axfr;
pub mod case;
pub mod config;
pub mod query;

pub use config::ClientConfig;
pub use query::{query, QueryError, QueryOutcome};
