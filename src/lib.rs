// Library crate: the daemon in main.rs and the integration tests both
// build on these modules.

pub mod artifacts;
pub mod capture;
pub mod comparison;
pub mod config;
pub mod diff;
pub mod error;
pub mod log_capture;
pub mod notify;
pub mod orchestrator;
pub mod retention;
pub mod routes;
pub mod scheduler;
pub mod server;
pub mod settings;
pub mod state;
pub mod store;
