//! Chat orchestration for leetbot
//!
//! Composes the history manager and a completion provider into a single
//! chat-turn operation.

pub mod locks;
pub mod service;

pub use locks::SessionLocks;
pub use service::{ChatError, ChatReply, ChatResult, ChatService, ChatSettings};
