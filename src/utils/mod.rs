//! The `utils` module provides a collection of utility functions and common
//! definitions used across the `boardhub` application.
//!
//! It centralizes the error types shared by the hub, the snapshot stores and
//! the transport, together with the tracing setup used by the binary.

pub mod error;
pub mod logging;

pub use error::{Error, HubError, StoreError, TransportError};
