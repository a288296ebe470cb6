//! Conversational responder: routes each query through deterministic
//! handlers or the hosted model, with graceful degradation.
//!
//! The pipeline is model -> rules -> generic help; every stage failure falls
//! through to the next, and nothing is retried. The transcript is a sliding
//! window owned here, shared by every path.

pub mod answers;
pub mod digest;

use std::sync::Arc;

use tracing::warn;

use crate::engine::ReferralEngine;
use crate::gateway::{ChatGateway, ChatRequest, Message};
use crate::router::{route, QueryRoute};

/// Most recent turns kept in the transcript; oldest dropped first.
pub const HISTORY_CAP: usize = 20;

/// Transcript turns handed to the model alongside the system prompt.
pub const MODEL_CONTEXT_TURNS: usize = 6;

/// Default completion budget for a chat reply.
pub const REPLY_MAX_TOKENS: u32 = 300;

/// Default sampling temperature for chat replies.
pub const REPLY_TEMPERATURE: f32 = 0.7;

/// Which stage of the pipeline produced a reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReplySource {
    /// Router-directed deterministic handler.
    Rules,
    /// The hosted conversational model.
    Model,
    /// Deterministic handler reached after a model failure or with no model.
    Fallback,
    /// Fixed help text; nothing else matched.
    Help,
}

/// A reply plus where it came from.
#[derive(Debug, Clone)]
pub struct Reply {
    pub text: String,
    pub source: ReplySource,
}

/// Hybrid responder over one engine's data.
pub struct Responder {
    gateway: Option<Arc<dyn ChatGateway>>,
    model: String,
    history: Vec<Message>,
}

impl Responder {
    pub fn new(gateway: Option<Arc<dyn ChatGateway>>, model: impl Into<String>) -> Self {
        Self {
            gateway,
            model: model.into(),
            history: Vec::new(),
        }
    }

    /// Rule-based mode: no model, deterministic answers and help text only.
    pub fn rule_based() -> Self {
        Self::new(None, "")
    }

    pub fn model_enabled(&self) -> bool {
        self.gateway.is_some()
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    /// Answer one query. Non-empty queries append exactly one user turn and
    /// one assistant turn to the transcript; blank input short-circuits with
    /// a prompt for a question and leaves the transcript untouched.
    pub async fn process_query(&mut self, engine: &ReferralEngine, query: &str) -> Reply {
        let query = query.trim();
        if query.is_empty() {
            return Reply {
                text: "Please ask me a question about your tea business!".to_string(),
                source: ReplySource::Help,
            };
        }

        self.push_turn(Message::user(query));
        let reply = self.answer(engine, query).await;
        self.push_turn(Message::assistant(&reply.text));
        reply
    }

    async fn answer(&self, engine: &ReferralEngine, query: &str) -> Reply {
        // Deterministic route first; a miss in the phrase table falls through
        // to the model path rather than failing.
        if let QueryRoute::Deterministic(_) = route(query) {
            if let Some(text) = answers::deterministic_answer(engine, query) {
                return Reply {
                    text,
                    source: ReplySource::Rules,
                };
            }
        }

        if let Some(gateway) = &self.gateway {
            match self.model_reply(gateway.as_ref(), engine, query).await {
                Ok(text) if !text.is_empty() => {
                    return Reply {
                        text,
                        source: ReplySource::Model,
                    }
                }
                Ok(_) => warn!("model returned empty content; falling back to rules"),
                Err(err) => {
                    warn!(code = err.code(), error = %err, "model call failed; falling back to rules");
                }
            }
        }

        if let Some(text) = answers::deterministic_answer(engine, query) {
            return Reply {
                text,
                source: ReplySource::Fallback,
            };
        }

        Reply {
            text: answers::help_text(),
            source: ReplySource::Help,
        }
    }

    /// One best-effort model call: fixed system prompt with the bounded data
    /// digest, plus the most recent transcript turns (the current user turn
    /// included).
    async fn model_reply(
        &self,
        gateway: &dyn ChatGateway,
        engine: &ReferralEngine,
        query: &str,
    ) -> Result<String, crate::gateway::ProviderError> {
        let mut messages = vec![Message::system(digest::system_prompt(engine, query))];
        let start = self.history.len().saturating_sub(MODEL_CONTEXT_TURNS);
        messages.extend(self.history[start..].iter().cloned());

        let req = ChatRequest::new(&self.model, messages)
            .temperature(REPLY_TEMPERATURE)
            .max_tokens(REPLY_MAX_TOKENS);

        let resp = gateway.chat(req).await?;
        Ok(resp.content)
    }

    fn push_turn(&mut self, message: Message) {
        self.history.push(message);
        let overflow = self.history.len().saturating_sub(HISTORY_CAP);
        if overflow > 0 {
            self.history.drain(..overflow);
        }
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::Role;

    fn seeded_engine() -> ReferralEngine {
        let mut engine = ReferralEngine::in_memory();
        engine
            .register_customer("John Doe", "0771234567", None)
            .unwrap();
        engine
    }

    #[tokio::test]
    async fn deterministic_query_bypasses_model() {
        let engine = seeded_engine();
        let mut responder = Responder::rule_based();
        let reply = responder
            .process_query(&engine, "how many customers do I have")
            .await;
        assert_eq!(reply.source, ReplySource::Rules);
        assert!(reply.text.contains("1 customers"));
    }

    #[tokio::test]
    async fn conversational_without_model_falls_back_to_help() {
        let engine = seeded_engine();
        let mut responder = Responder::rule_based();
        let reply = responder
            .process_query(&engine, "what tea do you recommend")
            .await;
        assert_eq!(reply.source, ReplySource::Help);
        assert!(reply.text.contains("I can help you with your tea business!"));
    }

    #[tokio::test]
    async fn conversational_with_data_phrase_falls_back_to_rules() {
        let engine = seeded_engine();
        let mut responder = Responder::rule_based();
        // Routed conversational (name-like tokens), but the phrase table can
        // still answer it once the model is unavailable.
        let reply = responder
            .process_query(&engine, "hmm, recently anyone new?")
            .await;
        assert_eq!(reply.source, ReplySource::Fallback);
        assert!(reply.text.contains("Recent customers"));
    }

    #[tokio::test]
    async fn each_query_appends_one_user_and_one_assistant_turn() {
        let engine = seeded_engine();
        let mut responder = Responder::rule_based();
        responder.process_query(&engine, "customer count").await;
        responder.process_query(&engine, "stats").await;

        let roles: Vec<Role> = responder.history().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
    }

    #[tokio::test]
    async fn blank_query_leaves_transcript_untouched() {
        let engine = seeded_engine();
        let mut responder = Responder::rule_based();
        let reply = responder.process_query(&engine, "   ").await;
        assert_eq!(reply.source, ReplySource::Help);
        assert!(responder.history().is_empty());
    }

    #[tokio::test]
    async fn history_is_a_sliding_window() {
        let engine = seeded_engine();
        let mut responder = Responder::rule_based();
        for i in 0..15 {
            responder
                .process_query(&engine, &format!("customer count {i}"))
                .await;
        }
        assert_eq!(responder.history().len(), HISTORY_CAP);
        // The earliest surviving turn is no longer the first query.
        assert!(responder.history()[0].content.contains("count 5"));
    }
}
