use std::sync::Arc;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::llm::{AssistantTurn, ChatMessage, LlmClient};
use crate::profiles::AgentProfile;
use crate::tools::ToolRegistry;

/// One visible entry of the conversation, as rendered in the chat UI.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub speaker: String,
    pub content: String,
}

/// Drives a bounded group conversation over the registered agents: pick a
/// speaker, let it answer or call a function, feed function results back, and
/// stop at the first prose answer or at the round limit.
pub struct AgentRuntime {
    llm: Arc<dyn LlmClient>,
    registry: ToolRegistry,
    profiles: Vec<AgentProfile>,
    max_rounds: u32,
}

impl AgentRuntime {
    pub fn new(
        llm: Arc<dyn LlmClient>,
        registry: ToolRegistry,
        profiles: Vec<AgentProfile>,
        max_rounds: u32,
    ) -> Self {
        Self { llm, registry, profiles, max_rounds }
    }

    pub async fn handle_user_message(
        &self,
        correlation_id: &str,
        text: &str,
    ) -> Result<Vec<ChatTurn>> {
        let mut history = vec![ChatMessage::user(text)];
        let mut transcript = Vec::new();

        for round in 0..self.max_rounds {
            let profile = self.select_speaker(&history, round).await;

            let mut messages = vec![ChatMessage::system(profile.system_message)];
            messages.extend(history.iter().cloned());
            let functions = self.registry.function_specs(profile.functions);

            match self.llm.complete(&messages, &functions).await? {
                AssistantTurn::Message(content) => {
                    tracing::info!(
                        event_name = "agent.turn.message",
                        correlation_id,
                        speaker = profile.name,
                        round,
                        "agent answered in prose"
                    );
                    history.push(ChatMessage::assistant(profile.name, content.clone()));
                    transcript.push(ChatTurn { speaker: profile.name.to_string(), content });
                    // A prose reply is the final answer for this request.
                    return Ok(transcript);
                }
                AssistantTurn::FunctionCall(call) => {
                    tracing::info!(
                        event_name = "agent.turn.function_call",
                        correlation_id,
                        speaker = profile.name,
                        function = %call.name,
                        round,
                        "agent called a function"
                    );
                    let arguments: Value = serde_json::from_str(&call.arguments)
                        .with_context(|| {
                            format!("model produced invalid arguments for `{}`", call.name)
                        })?;
                    let output = self.registry.execute(&call.name, arguments).await?;
                    let rendered = render_output(&output);

                    history.push(ChatMessage::assistant(
                        profile.name,
                        format!("Calling `{}`.", call.name),
                    ));
                    history.push(ChatMessage::function(call.name.clone(), rendered.clone()));
                    transcript.push(ChatTurn {
                        speaker: format!("{} · {}", profile.name, call.name),
                        content: rendered,
                    });
                }
            }
        }

        tracing::warn!(
            event_name = "agent.conversation.round_limit",
            correlation_id,
            max_rounds = self.max_rounds,
            "conversation stopped at the round limit"
        );
        Ok(transcript)
    }

    /// Asks the model which agent should act next, the way the source
    /// framework's chat manager does; an unusable reply degrades to a
    /// round-robin pick so the conversation always proceeds.
    async fn select_speaker(&self, history: &[ChatMessage], round: u32) -> &AgentProfile {
        if self.profiles.len() == 1 {
            return &self.profiles[0];
        }

        let roster = self
            .profiles
            .iter()
            .map(|profile| format!("- {}: {}", profile.name, profile.description))
            .collect::<Vec<_>>()
            .join("\n");
        let prompt = format!(
            "You coordinate a team of database agents:\n{roster}\n\
             Given the conversation so far, reply with exactly one agent name: \
             the one best placed to act next."
        );

        let mut messages = vec![ChatMessage::system(prompt)];
        messages.extend(history.iter().cloned());

        match self.llm.complete(&messages, &[]).await {
            Ok(AssistantTurn::Message(choice)) => {
                if let Some(profile) =
                    self.profiles.iter().find(|profile| choice.contains(profile.name))
                {
                    return profile;
                }
            }
            Ok(AssistantTurn::FunctionCall(_)) => {}
            Err(error) => {
                tracing::warn!(
                    event_name = "agent.select_speaker.failed",
                    error = %error,
                    "speaker selection failed, using round-robin"
                );
            }
        }

        &self.profiles[(round as usize) % self.profiles.len()]
    }
}

fn render_output(output: &Value) -> String {
    match output {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};

    use anyhow::{anyhow, Result};
    use async_trait::async_trait;
    use serde_json::{json, Value};

    use crate::llm::{AssistantTurn, ChatMessage, FunctionCall, LlmClient};
    use crate::profiles::AgentProfile;
    use crate::tools::{Tool, ToolRegistry};

    use super::AgentRuntime;

    struct ScriptedLlm {
        turns: Mutex<VecDeque<AssistantTurn>>,
    }

    impl ScriptedLlm {
        fn new(turns: Vec<AssistantTurn>) -> Self {
            Self { turns: Mutex::new(turns.into()) }
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _functions: &[Value],
        ) -> Result<AssistantTurn> {
            self.turns
                .lock()
                .expect("script lock")
                .pop_front()
                .ok_or_else(|| anyhow!("scripted responses exhausted"))
        }
    }

    struct EchoTool;

    #[async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &'static str {
            "echo"
        }

        fn description(&self) -> &'static str {
            "Returns its input unchanged"
        }

        fn parameters(&self) -> Value {
            json!({ "type": "object", "properties": {}, "required": [] })
        }

        async fn execute(&self, input: Value) -> Result<Value> {
            Ok(input)
        }
    }

    fn echo_profile() -> AgentProfile {
        AgentProfile {
            name: "EchoAgent",
            description: "Echoes things.",
            system_message: "Echo what you are asked to echo.",
            functions: &["echo"],
        }
    }

    fn echo_registry() -> ToolRegistry {
        let mut registry = ToolRegistry::default();
        registry.register(EchoTool);
        registry
    }

    #[tokio::test]
    async fn function_call_then_answer_produces_two_turns() {
        let llm = Arc::new(ScriptedLlm::new(vec![
            AssistantTurn::FunctionCall(FunctionCall {
                name: "echo".to_string(),
                arguments: "{\"value\":42}".to_string(),
            }),
            AssistantTurn::Message("The value is 42.".to_string()),
        ]));
        let runtime = AgentRuntime::new(llm, echo_registry(), vec![echo_profile()], 30);

        let transcript =
            runtime.handle_user_message("corr-1", "echo 42").await.expect("conversation runs");

        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[0].speaker, "EchoAgent · echo");
        assert_eq!(transcript[0].content, "{\"value\":42}");
        assert_eq!(transcript[1].speaker, "EchoAgent");
        assert_eq!(transcript[1].content, "The value is 42.");
    }

    #[tokio::test]
    async fn round_limit_bounds_the_conversation() {
        let call = AssistantTurn::FunctionCall(FunctionCall {
            name: "echo".to_string(),
            arguments: "{}".to_string(),
        });
        let llm = Arc::new(ScriptedLlm::new(vec![call.clone(), call.clone(), call]));
        let runtime = AgentRuntime::new(llm, echo_registry(), vec![echo_profile()], 2);

        let transcript =
            runtime.handle_user_message("corr-2", "loop forever").await.expect("bounded run");

        assert_eq!(transcript.len(), 2);
    }

    #[tokio::test]
    async fn invalid_function_arguments_fail_the_conversation() {
        let llm = Arc::new(ScriptedLlm::new(vec![AssistantTurn::FunctionCall(FunctionCall {
            name: "echo".to_string(),
            arguments: "not json".to_string(),
        })]));
        let runtime = AgentRuntime::new(llm, echo_registry(), vec![echo_profile()], 30);

        let error =
            runtime.handle_user_message("corr-3", "break").await.expect_err("invalid args fail");
        assert!(error.to_string().contains("invalid arguments"));
    }

    #[tokio::test]
    async fn unusable_speaker_selection_degrades_to_round_robin() {
        let second_profile = AgentProfile {
            name: "OtherAgent",
            description: "Does other things.",
            system_message: "Do other things.",
            functions: &["echo"],
        };
        // First response answers the selection prompt with nonsense, the
        // second is the chosen (round-robin: first) agent's actual reply.
        let llm = Arc::new(ScriptedLlm::new(vec![
            AssistantTurn::Message("no such agent".to_string()),
            AssistantTurn::Message("done".to_string()),
        ]));
        let runtime = AgentRuntime::new(
            llm,
            echo_registry(),
            vec![echo_profile(), second_profile],
            30,
        );

        let transcript =
            runtime.handle_user_message("corr-4", "anything").await.expect("conversation runs");

        assert_eq!(transcript.len(), 1);
        assert_eq!(transcript[0].speaker, "EchoAgent");
    }
}
