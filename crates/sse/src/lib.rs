//! Minimal server-sent events support for HTTP response bodies.
//!
//! Both the model endpoint and the MCP tool host may answer with a
//! `text/event-stream` body. This crate turns such a body into a sequence
//! of event payloads, leaving their interpretation to the caller.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod chunks;
mod reader;

pub use chunks::{Chunks, Error as ChunksError};
pub use reader::{Error, Sse};

/// The MIME subtype of a server-sent events body.
pub const EVENT_STREAM_SUBTYPE: &str = "event-stream";
