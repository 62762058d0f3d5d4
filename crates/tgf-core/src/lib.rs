//! Core domain + routing logic for the Telegram keyword forwarder.
//!
//! This crate is transport-agnostic. Telegram lives behind the
//! `MessageSource` port implemented in the adapter crate; everything here
//! works against that trait, so tests run with in-process fakes.

pub mod config;
pub mod delivery;
pub mod domain;
pub mod errors;
pub mod logging;
pub mod messaging;
pub mod resolver;
pub mod routing;
pub mod supervisor;
pub mod webhook;
pub mod worker;

pub use errors::{Error, RateLimit, Result};
