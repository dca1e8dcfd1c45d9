// Core modules
pub mod events;
pub mod exchange;
pub mod execution;
pub mod indicators;
pub mod market;
pub mod models;
pub mod persistence;
pub mod strategy;

// Re-export commonly used types
pub use exchange::{Connector, VenueApi};
pub use models::*;
pub use strategy::SignalRule;

// Error handling
pub type Result<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;
