use nic::chat::{exchange, ChatClient, ConversationStore};
use nic::config::Config;
use nic::models::{ChatMessage, Role};
use nic::web_server::{create_router, AppState};
use serde_json::json;
use wiremock::matchers::{body_partial_json, body_string_contains, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn completion(content: &str) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "choices": [{"message": {"role": "assistant", "content": content}}]
    }))
}

/// Runs the real router on an ephemeral port and returns its base URL.
async fn spawn_nic(openai: &MockServer, fdc: &MockServer) -> String {
    let config = Config {
        openai_api_key: Some("sk-test".to_string()),
        fdc_api_key: Some("fdc-test".to_string()),
        openai_base_url: openai.uri(),
        fdc_base_url: fdc.uri(),
        chat_model: "chat-model".to_string(),
        aux_model: "aux-model".to_string(),
        expose_error_details: true,
    };
    let app = create_router(AppState::new(config, "templates"), "static");
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    format!("http://{}", addr)
}

#[tokio::test]
async fn test_conversation_round_trip_through_server() {
    let openai = MockServer::start().await;
    let fdc = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Extract the food items"))
        .respond_with(completion("oatmeal"))
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Generate a short title"))
        .respond_with(completion("Oatmeal Breakfast Fiber"))
        .expect(1)
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("You are NIC"))
        .and(body_partial_json(json!({"stream": false})))
        .respond_with(completion("Oatmeal is rich in fiber."))
        .mount(&openai)
        .await;
    Mock::given(method("GET"))
        .and(path("/foods/search"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"foods": []})))
        .mount(&fdc)
        .await;

    let base = spawn_nic(&openai, &fdc).await;
    let client = ChatClient::new(&base);
    let mut store = ConversationStore::new();

    let reply = exchange(&client, &mut store, "Is oatmeal good for breakfast?", false, |_| {})
        .await
        .unwrap();
    assert_eq!(reply, "Oatmeal is rich in fiber.");
    assert_eq!(store.active().title, "Oatmeal Breakfast Fiber");
    assert_eq!(store.active().messages.len(), 2);

    // The follow-up carries the history and must not regenerate the title
    let reply = exchange(&client, &mut store, "And with milk?", false, |_| {})
        .await
        .unwrap();
    assert_eq!(reply, "Oatmeal is rich in fiber.");
    assert_eq!(store.active().title, "Oatmeal Breakfast Fiber");
    assert_eq!(store.active().messages.len(), 4);
    assert_eq!(store.active().messages[3].role, Role::Assistant);
}

#[tokio::test]
async fn test_streaming_exchange_collects_tokens() {
    let openai = MockServer::start().await;
    let fdc = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Extract the food items"))
        .respond_with(completion("none"))
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Generate a short title"))
        .respond_with(completion("Friendly Greeting"))
        .mount(&openai)
        .await;
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Hi! \"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"Ask me about food.\"}}]}\n\n",
        "data: [DONE]\n\n"
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&openai)
        .await;

    let base = spawn_nic(&openai, &fdc).await;
    let client = ChatClient::new(&base);
    let mut store = ConversationStore::new();

    let mut seen = String::new();
    let reply = exchange(&client, &mut store, "hello", true, |token| seen.push_str(token))
        .await
        .unwrap();
    assert_eq!(reply, "Hi! Ask me about food.");
    assert_eq!(seen, reply);
    assert_eq!(store.active().title, "Friendly Greeting");
}

#[tokio::test]
async fn test_streaming_exchange_keeps_non_ascii_title() {
    let openai = MockServer::start().await;
    let fdc = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Extract the food items"))
        .respond_with(completion("none"))
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Generate a short title"))
        .respond_with(completion("Caf\u{e9} Au Lait Calories"))
        .mount(&openai)
        .await;
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"About 100 kcal.\"}}]}\n\n",
        "data: [DONE]\n\n"
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&openai)
        .await;

    let base = spawn_nic(&openai, &fdc).await;
    let client = ChatClient::new(&base);
    let mut store = ConversationStore::new();

    exchange(&client, &mut store, "Calories in a caf\u{e9} au lait?", true, |_| {})
        .await
        .unwrap();
    assert_eq!(store.active().title, "Caf\u{e9} Au Lait Calories");
    assert_eq!(store.active().messages.len(), 2);
}

#[tokio::test]
async fn test_streaming_exchange_rolls_back_on_upstream_error() {
    let openai = MockServer::start().await;
    let fdc = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Extract the food items"))
        .respond_with(completion("none"))
        .mount(&openai)
        .await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_string_contains("Generate a short title"))
        .respond_with(completion("Never Applied"))
        .mount(&openai)
        .await;
    let sse = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"Partial\"}}]}\n\n",
        "data: {\"error\":{\"message\":\"The server had an error\",\"type\":\"server_error\"}}\n\n"
    );
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .and(body_partial_json(json!({"stream": true})))
        .respond_with(ResponseTemplate::new(200).set_body_raw(sse, "text/event-stream"))
        .mount(&openai)
        .await;

    let base = spawn_nic(&openai, &fdc).await;
    let client = ChatClient::new(&base);
    let mut store = ConversationStore::new();

    let result = exchange(&client, &mut store, "hello", true, |_| {}).await;
    assert!(result.is_err());
    assert!(store.active().messages.is_empty());
    assert_eq!(store.active().title, "New conversation");
}

#[tokio::test]
async fn test_failed_exchange_rolls_back_user_message() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(500).set_body_json(json!({
            "error": "configuration error: missing credentials: OPENAI_API_KEY",
            "code": "CONFIGURATION_ERROR"
        })))
        .mount(&server)
        .await;

    let client = ChatClient::new(&server.uri());
    let mut store = ConversationStore::new();
    let err = exchange(&client, &mut store, "banana?", false, |_| {})
        .await
        .unwrap_err();

    assert!(err.to_string().contains("CONFIGURATION_ERROR"));
    assert!(store.active().messages.is_empty());
}

#[tokio::test]
async fn test_client_sends_at_most_fifty_messages() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/chat"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"message": "ok"})))
        .expect(1)
        .mount(&server)
        .await;

    let client = ChatClient::new(&server.uri());
    let mut store = ConversationStore::new();
    for i in 0..60 {
        store
            .active_mut()
            .messages
            .push(ChatMessage::user(format!("old {}", i)));
    }
    exchange(&client, &mut store, "latest", false, |_| {})
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let sent = body["messages"].as_array().unwrap();
    assert_eq!(sent.len(), 50);
    assert_eq!(sent.last().unwrap()["content"], "latest");
}
