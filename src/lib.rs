// Core propagation
pub mod cluster;
pub mod logout;
pub mod message;
pub mod receiver;
pub mod session;
pub mod signer;

// Application layer
pub mod access;
pub mod api;
pub mod server;

// Supporting modules
pub mod config;
pub mod error;
pub mod metrics;
pub mod shutdown;
pub mod tasks;
pub mod telemetry;
