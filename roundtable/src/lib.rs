//! Roundtable - real-time multi-persona requirements elicitation.
//!
//! A panel of persona agents interviews a human about a product idea over a
//! WebSocket session, walking the conversation through a fixed sequence of
//! phases until a specification can be generated.

pub mod api;
pub mod config;
pub mod generation;
pub mod orchestrator;
pub mod personas;
pub mod session;
pub mod store;
