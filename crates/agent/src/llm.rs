use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use freightdesk_core::config::{LlmConfig, LlmProvider};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Function,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, name: None, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, name: None, content: content.into() }
    }

    pub fn assistant(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, name: Some(name.into()), content: content.into() }
    }

    /// The result of a function the assistant asked for, fed back by name.
    pub fn function(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: Role::Function, name: Some(name.into()), content: content.into() }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    /// JSON-encoded arguments, exactly as the model produced them.
    pub arguments: String,
}

/// What the model did with its turn: answer in prose, or ask for a function.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AssistantTurn {
    Message(String),
    FunctionCall(FunctionCall),
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        functions: &[Value],
    ) -> Result<AssistantTurn>;
}

/// Chat-completions client for the OpenAI-compatible providers the deployment
/// targets: OpenAI itself, an Azure OpenAI deployment, or a local Ollama.
pub struct HttpLlmClient {
    http: reqwest::Client,
    provider: LlmProvider,
    api_key: Option<SecretString>,
    base_url: Option<String>,
    model: String,
    api_version: String,
}

impl HttpLlmClient {
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .context("could not build the LLM HTTP client")?;

        Ok(Self {
            http,
            provider: config.provider,
            api_key: config.api_key.clone(),
            base_url: config.base_url.clone(),
            model: config.model.clone(),
            api_version: config.api_version.clone(),
        })
    }

    fn endpoint(&self) -> Result<String> {
        match self.provider {
            LlmProvider::OpenAi => {
                let base = self.base_url.as_deref().unwrap_or("https://api.openai.com/v1");
                Ok(format!("{}/chat/completions", base.trim_end_matches('/')))
            }
            LlmProvider::AzureOpenAi => {
                let base = self
                    .base_url
                    .as_deref()
                    .ok_or_else(|| anyhow!("azure_openai requires llm.base_url"))?;
                Ok(format!(
                    "{}/openai/deployments/{}/chat/completions?api-version={}",
                    base.trim_end_matches('/'),
                    self.model,
                    self.api_version
                ))
            }
            LlmProvider::Ollama => {
                let base = self
                    .base_url
                    .as_deref()
                    .ok_or_else(|| anyhow!("ollama requires llm.base_url"))?;
                Ok(format!("{}/v1/chat/completions", base.trim_end_matches('/')))
            }
        }
    }
}

#[async_trait]
impl LlmClient for HttpLlmClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        functions: &[Value],
    ) -> Result<AssistantTurn> {
        let mut body = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "temperature": 0.7,
        });
        if !functions.is_empty() {
            body["functions"] = Value::Array(functions.to_vec());
        }

        let mut request = self.http.post(self.endpoint()?).json(&body);
        request = match self.provider {
            LlmProvider::OpenAi => match &self.api_key {
                Some(key) => request.bearer_auth(key.expose_secret()),
                None => return Err(anyhow!("openai requires llm.api_key")),
            },
            LlmProvider::AzureOpenAi => match &self.api_key {
                Some(key) => request.header("api-key", key.expose_secret()),
                None => return Err(anyhow!("azure_openai requires llm.api_key")),
            },
            LlmProvider::Ollama => request,
        };

        let response = request.send().await.context("LLM request failed")?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(anyhow!("LLM request returned {status}: {detail}"));
        }

        let payload: Value =
            response.json().await.context("could not parse the LLM response body")?;
        turn_from_payload(&payload)
    }
}

fn turn_from_payload(payload: &Value) -> Result<AssistantTurn> {
    let message = payload
        .pointer("/choices/0/message")
        .ok_or_else(|| anyhow!("LLM response carried no message"))?;

    if let Some(call) = message.get("function_call") {
        let name = call
            .get("name")
            .and_then(Value::as_str)
            .ok_or_else(|| anyhow!("LLM produced a function call without a name"))?;
        let arguments = call.get("arguments").and_then(Value::as_str).unwrap_or("{}");
        return Ok(AssistantTurn::FunctionCall(FunctionCall {
            name: name.to_string(),
            arguments: arguments.to_string(),
        }));
    }

    let content = message.get("content").and_then(Value::as_str).unwrap_or_default();
    Ok(AssistantTurn::Message(content.to_string()))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{turn_from_payload, AssistantTurn};

    #[test]
    fn plain_content_becomes_a_message_turn() {
        let payload = json!({
            "choices": [{ "message": { "role": "assistant", "content": "All set." } }]
        });
        assert_eq!(
            turn_from_payload(&payload).expect("payload parses"),
            AssistantTurn::Message("All set.".to_string())
        );
    }

    #[test]
    fn function_call_wins_over_content() {
        let payload = json!({
            "choices": [{
                "message": {
                    "role": "assistant",
                    "content": null,
                    "function_call": {
                        "name": "add_customer",
                        "arguments": "{\"parameters\":{\"name\":\"Marc\"}}"
                    }
                }
            }]
        });

        match turn_from_payload(&payload).expect("payload parses") {
            AssistantTurn::FunctionCall(call) => {
                assert_eq!(call.name, "add_customer");
                assert!(call.arguments.contains("Marc"));
            }
            other => panic!("expected a function call, got {other:?}"),
        }
    }

    #[test]
    fn response_without_choices_is_an_error() {
        assert!(turn_from_payload(&json!({ "choices": [] })).is_err());
    }
}
