//! A command-line assistant that answers with the help of tools hosted on
//! an MCP server.
//!
//! The binary is a thin terminal front-end. Everything needed to embed the
//! assistant elsewhere lives here: [`Settings`] reads the configuration,
//! [`Prompts`] holds the instructions, and [`SessionBuilder`] wires the two
//! agents and the tool host into a conversation.

#![deny(missing_docs)]

#[macro_use]
extern crate tracing;

mod prompts;
mod session;
mod settings;

pub use prompts::Prompts;
pub use session::{Session, SessionBuilder};
pub use settings::Settings;
