//! Gaia proxy - HTTP front end for the Gaia assistant service
//!
//! Forwards questions to the upstream assistant with bounded retries and
//! session-scoped token accounting, and reshapes answers into a fixed
//! citation schema for downstream clients.

pub mod catalog;
pub mod config;
pub mod error;
pub mod logging;
pub mod server;
pub mod upstream;
pub mod votes;

pub use error::GaiaError;
