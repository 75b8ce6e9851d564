//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `run`    | `Run`            |
//! | `config` | `Config`         |
//! | `worker` | `Worker`         |

pub mod config;
pub mod run;
pub mod worker;

pub use config::cmd_config;
pub use run::cmd_run;
pub use worker::cmd_worker;
