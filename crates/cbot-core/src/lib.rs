//! Core of the chatbot runtime: the message model, per-user session state,
//! the messaging port and the worker pool that ties them together.
//!
//! Transports (Telegram today) live in adapter crates and plug in through the
//! [`ports::Frontend`] and [`messaging::MessagingService`] traits.

pub mod config;
pub mod dispatch;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod message;
pub mod messaging;
pub mod ports;
pub mod session;
pub mod utils;

#[cfg(test)]
mod testing;

pub use errors::{Error, Result};
