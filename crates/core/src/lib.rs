//! Core logic of the assistant: agents wrapping a model endpoint, the seam
//! to the tool host, and the conversation loop tying them together.

#![deny(missing_docs)]
#![deny(clippy::missing_safety_doc)]

#[macro_use]
extern crate tracing;

pub mod agent;
pub mod conversation;
mod model_client;
pub mod tool;

pub use agent::{Agent, AgentConfig};
pub use model_client::{ModelClient, ModelStream};
pub use tokio_util::sync::CancellationToken;
