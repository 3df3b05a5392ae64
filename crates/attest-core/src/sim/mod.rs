pub mod faults;
pub mod personas;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::errors::ProviderError;
use crate::model::{ChatMessage, CompletionRequest, Role};
use crate::providers::llm::LlmProvider;

pub use faults::{FaultConfig, FaultInjector};
pub use personas::{Persona, END_TOKEN};

/// The agent under test; the client supplies the implementation.
#[async_trait]
pub trait Agent: Send {
    async fn respond(&mut self, user_message: &str) -> anyhow::Result<String>;
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Turn {
    pub user_message: String,
    pub agent_reply: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoppedBy {
    MaxTurns,
    PersonaEnd,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationResult {
    pub simulation_id: String,
    pub turns: Vec<Turn>,
    pub stopped_by: StoppedBy,
}

impl SimulationResult {
    fn new(turns: Vec<Turn>, stopped_by: StoppedBy) -> Self {
        Self {
            simulation_id: uuid::Uuid::new_v4().to_string(),
            turns,
            stopped_by,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub persona: Persona,
    pub max_turns: u32,
    pub fault: Option<FaultConfig>,
}

/// Hosts the multi-turn user/agent loop: the first user message is the
/// initial prompt, later ones come from the persona-driven provider.
pub struct Simulator {
    provider: Arc<dyn LlmProvider>,
    config: SimulationConfig,
}

impl Simulator {
    pub fn new(provider: Arc<dyn LlmProvider>, config: SimulationConfig) -> Self {
        let provider: Arc<dyn LlmProvider> = match &config.fault {
            Some(fault) => Arc::new(FaultInjector::new(provider, fault.clone())),
            None => provider,
        };
        Self { provider, config }
    }

    pub async fn run(
        &self,
        initial_prompt: &str,
        agent: &mut dyn Agent,
    ) -> anyhow::Result<SimulationResult> {
        let mut turns: Vec<Turn> = Vec::new();
        let mut user_message = initial_prompt.to_string();

        loop {
            let agent_reply = agent.respond(&user_message).await?;
            turns.push(Turn {
                user_message: user_message.clone(),
                agent_reply,
            });
            tracing::debug!(turn = turns.len(), "simulation turn recorded");

            if turns.len() as u32 >= self.config.max_turns {
                return Ok(SimulationResult::new(turns, StoppedBy::MaxTurns));
            }

            let history = turns_to_history(&turns);
            match next_user_message(self.provider.as_ref(), &self.config.persona, &history).await? {
                Some(next) => user_message = next,
                None => return Ok(SimulationResult::new(turns, StoppedBy::PersonaEnd)),
            }
        }
    }
}

fn turns_to_history(turns: &[Turn]) -> Vec<ChatMessage> {
    let mut history = Vec::with_capacity(turns.len() * 2);
    for turn in turns {
        history.push(ChatMessage::user(&turn.user_message));
        history.push(ChatMessage::assistant(&turn.agent_reply));
    }
    history
}

/// Generate the next simulated user message from a conversation history in
/// client convention (user = simulated user, assistant = agent under test).
/// Returns `None` when the persona signals end-of-conversation.
pub async fn next_user_message(
    provider: &dyn LlmProvider,
    persona: &Persona,
    history: &[ChatMessage],
) -> Result<Option<String>, ProviderError> {
    // From the persona provider's perspective the roles flip: the agent's
    // replies are its input and the simulated user's messages its own.
    let messages: Vec<ChatMessage> = history
        .iter()
        .map(|m| ChatMessage {
            role: match m.role {
                Role::User => Role::Assistant,
                _ => Role::User,
            },
            content: m.content.clone(),
        })
        .collect();

    let request = CompletionRequest {
        model: String::new(),
        system_prompt: Some(format!(
            "{}\n\nConversation style: {}.",
            persona.system_prompt, persona.style
        )),
        messages,
        temperature: persona.temperature,
        max_tokens: 512,
    };

    let response = provider.complete(&request).await?;
    let content = response.content.trim().to_string();
    if content.contains(END_TOKEN) {
        return Ok(None);
    }
    Ok(Some(content))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::llm::MockProvider;

    struct EchoAgent;

    #[async_trait]
    impl Agent for EchoAgent {
        async fn respond(&mut self, user_message: &str) -> anyhow::Result<String> {
            Ok(format!("echo: {user_message}"))
        }
    }

    fn simulator(mock: MockProvider, max_turns: u32) -> Simulator {
        Simulator::new(
            Arc::new(mock),
            SimulationConfig {
                persona: Persona::friendly_user(),
                max_turns,
                fault: None,
            },
        )
    }

    #[tokio::test]
    async fn echo_loop_stops_at_max_turns() {
        let sim = simulator(MockProvider::from_texts(&["A", "B"]), 3);
        let result = sim.run("hello", &mut EchoAgent).await.unwrap();

        assert_eq!(result.stopped_by, StoppedBy::MaxTurns);
        assert_eq!(
            result.turns,
            vec![
                Turn {
                    user_message: "hello".into(),
                    agent_reply: "echo: hello".into()
                },
                Turn {
                    user_message: "A".into(),
                    agent_reply: "echo: A".into()
                },
                Turn {
                    user_message: "B".into(),
                    agent_reply: "echo: B".into()
                },
            ]
        );
    }

    #[tokio::test]
    async fn sentinel_stops_the_loop_early() {
        let sim = simulator(MockProvider::from_texts(&["A", END_TOKEN]), 10);
        let result = sim.run("hello", &mut EchoAgent).await.unwrap();

        assert_eq!(result.stopped_by, StoppedBy::PersonaEnd);
        assert_eq!(result.turns.len(), 2);
        assert_eq!(result.turns[1].user_message, "A");
    }

    #[tokio::test]
    async fn persona_provider_sees_flipped_roles() {
        let mock = Arc::new(MockProvider::from_texts(&["next question"]));
        let history = vec![
            ChatMessage::user("hi"),
            ChatMessage::assistant("hello, how can I help?"),
        ];
        let next = next_user_message(mock.as_ref(), &Persona::friendly_user(), &history)
            .await
            .unwrap();
        assert_eq!(next.as_deref(), Some("next question"));

        let seen = mock.history();
        assert_eq!(seen[0].messages[0].role, Role::Assistant);
        assert_eq!(seen[0].messages[0].content, "hi");
        assert_eq!(seen[0].messages[1].role, Role::User);
        assert!(seen[0]
            .system_prompt
            .as_deref()
            .unwrap()
            .contains("friendly"));
    }

    #[tokio::test]
    async fn single_turn_simulation_never_calls_the_provider() {
        let mock = MockProvider::from_texts(&["unused"]);
        let sim = simulator(mock, 1);
        let result = sim.run("only turn", &mut EchoAgent).await.unwrap();
        assert_eq!(result.stopped_by, StoppedBy::MaxTurns);
        assert_eq!(result.turns.len(), 1);
    }
}
