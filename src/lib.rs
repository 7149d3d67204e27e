//! Signaling conductor for a single-peer media session: decodes relay
//! messages, drives the offer/answer exchange and trickled candidates through
//! a pluggable session engine, keeps outbound payloads ordered one-at-a-time,
//! and mirrors engine stats into two text sinks.
//!
//! The [`Conductor`] owns everything and processes every relay, engine and
//! command event on one serialized channel. The engine, relay transport and
//! UI are collaborator traits ([`engine`], [`relay`], [`ui`]) so the loop is
//! testable without any network or media stack.

pub mod conductor;
pub mod config;
pub mod engine;
pub mod queue;
pub mod relay;
pub mod session;
pub mod signaling;
pub mod stats;
pub mod telemetry;
pub mod ui;


pub use conductor::{Conductor, ConductorEvent};
pub use config::ConductorConfig;
