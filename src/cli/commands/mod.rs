//! CLI command implementations.

mod config;
mod doctor;
mod init;
mod run;
mod tiktok_auth;
mod topics;

pub use config::run_config;
pub use doctor::run_doctor;
pub use init::run_init;
pub use run::run_pipeline;
pub use tiktok_auth::run_tiktok_auth;
pub use topics::{run_topics, run_validate};
