//! Completion provider integrations for leetbot
//!
//! This crate provides the provider abstraction and an OpenAI-compatible
//! client usable with Groq, OpenAI, OpenRouter, DeepSeek or a local gateway.

pub mod base;
pub mod openai_compat;
pub mod registry;

pub use base::{
    messages_from_turns, LLMProvider, LLMResponse, Message, ProviderError, ProviderResult,
};
pub use openai_compat::OpenAICompatClient;
pub use registry::{ProviderRegistry, ProviderSpec};
