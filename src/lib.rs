// Public API for integration tests and the server binary

pub mod config;
pub mod protocol;
pub mod registry;
pub mod routes;
pub mod state;
pub mod ws;
