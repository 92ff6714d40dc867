//! LLM collaborator interface.
//!
//! The engine never talks to a provider directly: it consumes an
//! [`LlmInvoker`] and treats every call as a blocking request that either
//! yields content or a failure the pipeline degrades around. Provider
//! identity is invisible to the core.

mod invoker;
mod parse;
mod types;

pub use invoker::{LlmInvoker, RateLimiter, RetryConfig, RetryingInvoker};
pub use parse::extract_json_object;
pub use types::{ChatRequest, LlmResponse, TokenUsage};
