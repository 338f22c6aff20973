//! Model backend adapters
//!
//! Each adapter owns one backend's wire protocol and normalizes it into the
//! [`ModelGateway`](super::ModelGateway) contract.

pub mod anthropic;
pub mod openai;

pub use anthropic::AnthropicGateway;
pub use openai::OpenAIGateway;
