//! golem: a single autonomous conversational actor embedded in a
//! long-running real-time world.
//!
//! The actor receives chat over a websocket bridge, classifies each message
//! as a directive or conversation, and drives a bounded generate/classify/
//! execute loop against an LLM. A fixed-period background tick advances
//! environment automations and an autonomous self-prompt cycle; a shared
//! interrupt gate lets any of it be cancelled cooperatively at turn
//! boundaries.

pub mod agent;
pub mod automations;
pub mod commands;
pub mod config;
pub mod history;
pub mod llm_client;
pub mod world;

#[cfg(test)]
pub(crate) mod testutil;

pub use agent::{Agent, AgentEvent, Speaker};
pub use config::AgentConfig;
