#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::wildcard_imports)]
#![allow(clippy::upper_case_acronyms)]

pub mod eval;
pub mod macros;
pub mod record;
pub mod resolver;

pub use eval::{evaluate, Request, SpfResult};
pub use resolver::{LookupError, Resolver};
