//! Conversion between wire text and message parts.
//!
//! - [`message_decoder`] splits a raw buffer into start line, headers and body
//! - [`message_encoder`] writes a message back out, canonicalizing header names

pub mod message_decoder;
pub mod message_encoder;

pub use message_decoder::{RawMessage, parse_message};
