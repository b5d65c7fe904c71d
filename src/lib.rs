pub mod client;
pub mod config;
pub mod decoder;
pub mod error;
pub mod gfa;
pub mod handlers;
pub mod imagery;
pub mod models;
pub mod orchestrator;
pub mod regions;
pub mod routes;
pub mod scheduler;
pub mod session;
pub mod utils;
