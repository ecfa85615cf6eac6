//! # boardhub
//!
//! `boardhub` is a real-time fan-out hub for collaborative boards. Clients
//! connect over WebSockets to `/ws/{board}`, every message a client sends is
//! broadcast to the other clients of the same board, and clients joining
//! later start from the latest broadcast state, which is persisted per board.
//!
//! ## Core Modules
//!
//! - `hub`: topic registry, non-blocking fan-out and the snapshot decorator.
//! - `persistence`: snapshot stores (sled, Redis, in-memory).
//! - `transport`: the per-connection adapter and the WebSocket server.
//! - `client`: a small WebSocket client for smoke tests.
//! - `config`: Handles loading and managing server configuration.
//! - `utils`: Contains shared utilities, such as error handling and logging.

pub mod client;
pub mod config;
pub mod hub;
pub mod persistence;
pub mod transport;
pub mod utils;
