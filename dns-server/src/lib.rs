//! An authoritative DNS server library: in-memory zone storage,
//! TSIG-aware request handling, UDP truncation, multi-packet AXFR,
//! and the accept/dispatch loop that ties them together.

#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::wildcard_imports)]
#![allow(clippy::upper_case_acronyms)]

pub mod axfr;
pub mod config;
pub mod hooks;
pub mod metrics;
pub mod serve;
pub mod spf_watch;
pub mod truncation;
pub mod tsig;
pub mod zone;

pub use config::ServerConfig;
pub use serve::{serve_tcp, serve_udp, ServerState};
pub use zone::{Zone, Zones};
