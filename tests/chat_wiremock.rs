use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use steepdesk::chat::{Responder, ReplySource, MODEL_CONTEXT_TURNS};
use steepdesk::engine::ReferralEngine;
use steepdesk::gateway::{ChatGateway, OpenAiAdapter};

fn seeded_engine() -> ReferralEngine {
    let mut engine = ReferralEngine::in_memory();
    engine
        .register_customer("John Doe", "0771234567", None)
        .unwrap();
    engine
        .register_customer("Jane Roe", "0759876543", Some("JO4567R1"))
        .unwrap();
    engine
}

fn responder_for(server: &MockServer, timeout: Duration) -> Responder {
    let adapter = OpenAiAdapter::with_config("sk-test", server.uri(), timeout).unwrap();
    let gateway: Arc<dyn ChatGateway> = Arc::new(adapter);
    Responder::new(Some(gateway), "gpt-3.5-turbo")
}

fn completion_body(content: &str) -> serde_json::Value {
    json!({
        "choices": [{
            "message": { "content": content },
            "finish_reason": "stop"
        }],
        "usage": { "prompt_tokens": 50, "completion_tokens": 20 }
    })
}

#[tokio::test]
async fn conversational_query_uses_the_model() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body(
            "A light oolong suits most afternoons.",
        )))
        .mount(&server)
        .await;

    let engine = seeded_engine();
    let mut responder = responder_for(&server, Duration::from_secs(5));

    let reply = responder
        .process_query(&engine, "what tea do you recommend")
        .await;
    assert_eq!(reply.source, ReplySource::Model);
    assert_eq!(reply.text, "A light oolong suits most afternoons.");

    // System prompt with the bounded digest leads the message list.
    let requests = server.received_requests().await.unwrap();
    assert_eq!(requests.len(), 1);
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    assert_eq!(body["model"], "gpt-3.5-turbo");
    assert_eq!(body["messages"][0]["role"], "system");
    let system = body["messages"][0]["content"].as_str().unwrap();
    assert!(system.contains("\"total_customers\": 2"));
    assert_eq!(body["messages"][1]["role"], "user");
    assert_eq!(body["max_tokens"], 300);
}

#[tokio::test]
async fn deterministic_query_sends_no_requests() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("unused")))
        .mount(&server)
        .await;

    let engine = seeded_engine();
    let mut responder = responder_for(&server, Duration::from_secs(5));

    let reply = responder
        .process_query(&engine, "how many customers do I have")
        .await;
    assert_eq!(reply.source, ReplySource::Rules);
    assert!(reply.text.contains("2 customers"));

    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn model_failure_falls_back_to_rules() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": { "message": "upstream exploded", "code": "server_error" }
        })))
        .mount(&server)
        .await;

    let engine = seeded_engine();
    let mut responder = responder_for(&server, Duration::from_secs(5));

    // Conversational phrasing that the rule table can still answer.
    let reply = responder
        .process_query(&engine, "hmm, anyone recently?")
        .await;
    assert_eq!(reply.source, ReplySource::Fallback);
    assert!(reply.text.contains("Recent customers"));

    // Exactly one attempt: failures are not retried.
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn model_failure_without_rule_match_yields_help() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(503).set_body_string("unavailable"))
        .mount(&server)
        .await;

    let engine = seeded_engine();
    let mut responder = responder_for(&server, Duration::from_secs(5));

    let reply = responder
        .process_query(&engine, "what tea do you recommend")
        .await;
    assert_eq!(reply.source, ReplySource::Help);
    assert!(reply.text.contains("I can help you with your tea business!"));
}

#[tokio::test]
async fn timeout_is_abandoned_and_falls_back() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(completion_body("too late"))
                .set_delay(Duration::from_secs(2)),
        )
        .mount(&server)
        .await;

    let engine = seeded_engine();
    let mut responder = responder_for(&server, Duration::from_millis(200));

    let reply = responder
        .process_query(&engine, "what tea do you recommend")
        .await;
    assert_eq!(reply.source, ReplySource::Help);
    assert_eq!(server.received_requests().await.unwrap().len(), 1);
}

#[tokio::test]
async fn model_context_is_capped_to_recent_turns() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("noted")))
        .mount(&server)
        .await;

    let engine = seeded_engine();
    let mut responder = responder_for(&server, Duration::from_secs(5));

    for i in 0..8 {
        responder
            .process_query(&engine, &format!("thoughts on blend number {i}?"))
            .await;
    }

    let requests = server.received_requests().await.unwrap();
    let last: serde_json::Value = serde_json::from_slice(&requests.last().unwrap().body).unwrap();
    let messages = last["messages"].as_array().unwrap();
    // One system message plus at most the recent window.
    assert!(messages.len() <= 1 + MODEL_CONTEXT_TURNS);
    assert_eq!(messages[0]["role"], "system");
    assert_eq!(messages.last().unwrap()["role"], "user");
}

#[tokio::test]
async fn transcript_records_model_turns() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(ResponseTemplate::new(200).set_body_json(completion_body("Hello!")))
        .mount(&server)
        .await;

    let engine = seeded_engine();
    let mut responder = responder_for(&server, Duration::from_secs(5));

    responder.process_query(&engine, "hello").await;
    assert_eq!(responder.history().len(), 2);
    assert_eq!(responder.history()[1].content, "Hello!");
}
