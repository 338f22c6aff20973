//! Stream Coordinator
//!
//! Orchestrates one conversational turn end-to-end: appends the user
//! message, builds the context window, drives the model gateway (streaming
//! or blocking), forwards tokens to the session transport, and persists the
//! final assistant message exactly once.

mod coordinator;


pub use coordinator::{StreamCoordinator, TurnOutcome, TurnRequest, TurnState};
