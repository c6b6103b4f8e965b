//! Core types shared by every relayctl module.
//!
//! At the moment this is the error taxonomy; see [`error`].

pub mod error;

pub use error::{
    ErrorContext, HealthCheckFailure, RelayError, find_relay_error, user_friendly_error,
};
