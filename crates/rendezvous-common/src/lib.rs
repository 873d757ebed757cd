//! Common types shared by everything that speaks the rendezvous signaling
//! protocol.
//!
//! This crate provides:
//! - The JSON signaling envelope and its text codec ([`envelope`])
//! - Protocol constants and reserved identifiers ([`types`])

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod envelope;
pub mod types;

pub use envelope::{DecodeError, Envelope, SignalKind};
pub use types::PeerId;
