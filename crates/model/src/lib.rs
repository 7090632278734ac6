//! An abstraction layer for chat-completion backends.
//!
//! This crate establishes the protocol the agent uses to talk to a model
//! endpoint: a request template goes in, and a sequence of events comes
//! out, whether the backend answered in one piece or streamed chunk by
//! chunk. Agents can therefore switch between backends, or be driven by a
//! scripted fake in tests, without touching the core codebase.
//!
//! Types in this crate don't define any behavior, instead they are the
//! constraints that the implementors should adhere to.

#![deny(missing_docs)]

mod error;
mod provider;
mod request;
mod response;

pub use error::*;
pub use provider::*;
pub use request::*;
pub use response::*;
