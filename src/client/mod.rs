//! The `client` module provides a small WebSocket client for boardhub.
//!
//! It is used by the `client` subcommand for smoke tests against a running
//! server, and by the end-to-end transport tests.

pub mod board_client;
pub use board_client::BoardClient;
