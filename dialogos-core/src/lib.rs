//! # Dialogos - Streaming Conversational Session Engine
//!
//! Dialogos (Διάλογος) drives one conversational turn end-to-end: it
//! accepts a user message, assembles a bounded context window, streams an
//! incremental response from a language-model backend, delivers tokens to
//! the client as they are produced, and durably persists the final result
//! even when the stream is interrupted.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use dialogos_core::prelude::*;
//! use std::sync::Arc;
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<()> {
//!     let config = EngineConfig::load()?;
//!
//!     let store = Arc::new(ConversationStore::new());
//!     let gateway = GatewayFactory::create(&config.gateway)?;
//!     let coordinator = StreamCoordinator::new(
//!         store,
//!         gateway,
//!         ContextWindow::from_config(&config.context),
//!         config.turn.clone(),
//!     )
//!     .with_gateway_config(&config.gateway);
//!
//!     let (mut transport, mut rx) = ChannelTransport::channel(32, config.turn.write_timeout);
//!     tokio::spawn(async move {
//!         while let Some(frame) = rx.recv().await {
//!             println!("{:?}", frame);
//!         }
//!     });
//!
//!     let outcome = coordinator
//!         .run_streaming_turn(
//!             TurnRequest::new("explain recursion"),
//!             &mut transport,
//!             CancellationToken::new(),
//!         )
//!         .await?;
//!     println!("turn ended in {:?}", outcome.state);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **Conversation Store**: conversation/message CRUD with ordering
//!   invariants
//! - **Context Window Builder**: system directive plus the last N messages
//! - **Model Gateway**: blocking and streaming calls over one backend
//!   abstraction, with provider adapters for OpenAI and Anthropic
//! - **Stream Coordinator**: the turn state machine; persists exactly once
//! - **Session Transport**: per-turn server-push channel with bounded writes
//! - **Client Stream Reducer**: client-side message list reconciliation

pub mod client;
pub mod config;
pub mod context;
pub mod error;
pub mod llm;
pub mod ratelimit;
pub mod store;
pub mod transport;
pub mod turn;

/// Current library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Re-export commonly used types
pub mod prelude {
    pub use crate::client::{BegunTurn, ConversationView, ViewMessage};
    pub use crate::config::{
        ContextConfig, EngineConfig, GatewayConfig, GatewayProvider, RateLimitConfig, TurnConfig,
    };
    pub use crate::context::ContextWindow;
    pub use crate::error::{EngineError, Result};
    pub use crate::llm::{
        ChatMessage, ChatRole, Completion, CompletionRequest, GatewayFactory, ModelGateway,
        ModelInfo, RetryConfig, TokenStream, UsageStats, with_retry,
    };
    pub use crate::ratelimit::{InMemoryRateLimitStore, RateLimitStore, RateLimiter};
    pub use crate::store::{
        Conversation, ConversationStatus, ConversationStore, ConversationSummary, Message,
        derive_title,
    };
    pub use crate::transport::{ChannelTransport, EventFrame, TurnTransport};
    pub use crate::turn::{StreamCoordinator, TurnOutcome, TurnRequest, TurnState};
}
