use std::sync::Arc;

use axum::{
    extract::State,
    http::StatusCode,
    response::Html,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use freightdesk_agent::{AgentRuntime, ChatTurn};
use freightdesk_db::SchemaCache;

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<AgentRuntime>,
    pub schema_cache: Arc<SchemaCache>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ChatRequest {
    pub message: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ChatResponse {
    pub correlation_id: String,
    pub turns: Vec<ChatTurn>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/chat", post(chat))
        .route("/schema/reset", post(reset_schema))
        .with_state(state)
}

async fn index() -> Html<&'static str> {
    Html(CHAT_PAGE)
}

async fn chat(
    State(state): State<AppState>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, Json<serde_json::Value>)> {
    let correlation_id = Uuid::new_v4().to_string();

    if request.message.trim().is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(json!({ "error": "message must not be empty", "correlation_id": correlation_id })),
        ));
    }

    tracing::info!(
        event_name = "server.chat.received",
        correlation_id,
        "chat message received"
    );

    match state.runtime.handle_user_message(&correlation_id, &request.message).await {
        Ok(turns) => Ok(Json(ChatResponse { correlation_id, turns })),
        Err(error) => {
            tracing::error!(
                event_name = "server.chat.failed",
                correlation_id,
                error = %error,
                "conversation failed"
            );
            Err((
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": error.to_string(), "correlation_id": correlation_id })),
            ))
        }
    }
}

/// Drops the cached schema snapshots. The next `get_schema_info` call scans
/// the catalog again; until then sessions keep serving the cached blob.
async fn reset_schema(State(state): State<AppState>) -> StatusCode {
    state.schema_cache.reset().await;
    tracing::info!(
        event_name = "server.schema.reset",
        correlation_id = "admin",
        "schema cache cleared"
    );
    StatusCode::NO_CONTENT
}

const CHAT_PAGE: &str = r#"<!doctype html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>Freightdesk</title>
<style>
  body { font-family: system-ui, sans-serif; max-width: 48rem; margin: 2rem auto; padding: 0 1rem; }
  #log { border: 1px solid #ccc; border-radius: 6px; padding: 1rem; min-height: 16rem; }
  .turn { margin: 0.5rem 0; }
  .speaker { font-weight: 600; }
  .user .speaker { color: #1a5fb4; }
  form { display: flex; gap: 0.5rem; margin-top: 1rem; }
  input { flex: 1; padding: 0.5rem; }
</style>
</head>
<body>
<h1>Freightdesk</h1>
<p>Ask about customers, shipments, or the database schema.</p>
<div id="log"></div>
<form id="form">
  <input id="message" placeholder="Type your message here..." autocomplete="off">
  <button type="submit">Send</button>
  <button type="button" id="clear">Clear</button>
</form>
<script>
const log = document.getElementById('log');
const form = document.getElementById('form');
const input = document.getElementById('message');

function append(speaker, content, cls) {
  const div = document.createElement('div');
  div.className = 'turn ' + (cls || '');
  const who = document.createElement('span');
  who.className = 'speaker';
  who.textContent = speaker + ': ';
  div.appendChild(who);
  div.appendChild(document.createTextNode(content));
  log.appendChild(div);
  log.scrollTop = log.scrollHeight;
}

form.addEventListener('submit', async (event) => {
  event.preventDefault();
  const message = input.value.trim();
  if (!message) return;
  input.value = '';
  append('You', message, 'user');
  append('…', 'Processing...');
  const placeholder = log.lastChild;
  try {
    const response = await fetch('/chat', {
      method: 'POST',
      headers: { 'Content-Type': 'application/json' },
      body: JSON.stringify({ message }),
    });
    const body = await response.json();
    placeholder.remove();
    if (!response.ok) {
      append('Error', body.error || response.statusText);
      return;
    }
    for (const turn of body.turns) {
      append(turn.speaker, turn.content);
    }
  } catch (error) {
    placeholder.remove();
    append('Error', String(error));
  }
});

document.getElementById('clear').addEventListener('click', () => {
  log.replaceChildren();
});
</script>
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use anyhow::Result;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::{header, Request, StatusCode};
    use serde_json::Value;
    use tower::util::ServiceExt;

    use freightdesk_agent::{
        AgentProfile, AgentRuntime, AssistantTurn, ChatMessage, LlmClient, ToolRegistry,
    };
    use freightdesk_db::SchemaCache;

    use super::{router, AppState};

    struct CannedLlm {
        reply: String,
    }

    #[async_trait]
    impl LlmClient for CannedLlm {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _functions: &[Value],
        ) -> Result<AssistantTurn> {
            Ok(AssistantTurn::Message(self.reply.clone()))
        }
    }

    fn test_state(reply: &str) -> AppState {
        let profile = AgentProfile {
            name: "TestAgent",
            description: "Answers for tests.",
            system_message: "Answer the user.",
            functions: &[],
        };
        let runtime = AgentRuntime::new(
            Arc::new(CannedLlm { reply: reply.to_string() }),
            ToolRegistry::default(),
            vec![profile],
            5,
        );
        AppState { runtime: Arc::new(runtime), schema_cache: Arc::new(SchemaCache::new()) }
    }

    #[tokio::test]
    async fn index_serves_the_chat_page() {
        let response = router(test_state("hi"))
            .oneshot(Request::builder().uri("/").body(Body::empty()).expect("request"))
            .await
            .expect("router responds");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let page = String::from_utf8(bytes.to_vec()).expect("page is utf-8");
        assert!(page.contains("Freightdesk"));
        assert!(page.contains("/chat"));
    }

    #[tokio::test]
    async fn chat_replies_with_the_conversation_transcript() {
        let request = Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"message\":\"list customers\"}"))
            .expect("request");

        let response =
            router(test_state("There are 3 customers.")).oneshot(request).await.expect("responds");

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .expect("body reads");
        let body: Value = serde_json::from_slice(&bytes).expect("body is JSON");
        assert_eq!(body["turns"][0]["speaker"], "TestAgent");
        assert_eq!(body["turns"][0]["content"], "There are 3 customers.");
        assert!(body["correlation_id"].as_str().is_some());
    }

    #[tokio::test]
    async fn schema_reset_clears_the_cache() {
        let state = test_state("unused");
        state
            .schema_cache
            .prime(freightdesk_core::procedure::TargetStore::Crm, "[]".to_string())
            .await;

        let request = Request::builder()
            .method("POST")
            .uri("/schema/reset")
            .body(Body::empty())
            .expect("request");
        let response = router(state).oneshot(request).await.expect("responds");

        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    #[tokio::test]
    async fn blank_messages_are_rejected() {
        let request = Request::builder()
            .method("POST")
            .uri("/chat")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from("{\"message\":\"   \"}"))
            .expect("request");

        let response = router(test_state("unused")).oneshot(request).await.expect("responds");
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
