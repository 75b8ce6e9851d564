pub mod backoff;
pub mod branch;
pub mod cleanup;
pub mod config;
pub mod errors;
pub mod host;
pub mod job;
pub mod runner;
pub mod signals;
pub mod supervisor;
pub mod util;
pub mod worker;
