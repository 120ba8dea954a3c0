// Shared infrastructure
pub mod auth;
pub mod config;
pub mod error;
pub mod metrics;

// Presence and relay core
pub mod presence;
pub mod relay;

// Application layer
pub mod api;
pub mod server;
pub mod websocket;

// Supporting modules
pub mod shutdown;
pub mod tasks;
