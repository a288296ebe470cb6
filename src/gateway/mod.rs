//! Provider gateway for the hosted conversational model.
//!
//! One best-effort call per request, bounded by the client timeout. Failures
//! surface as [`ProviderError`] and are never retried here; the responder
//! degrades to deterministic answers instead.

pub mod error;
pub mod openai;
pub mod types;

pub use error::{ErrorContext, ProviderError};
pub use openai::OpenAiAdapter;
pub use types::*;

/// Trait for chat completion providers.
#[async_trait::async_trait]
pub trait ChatGateway: Send + Sync {
    async fn chat(&self, req: ChatRequest) -> Result<ChatResponse, ProviderError>;
}
