//! Chat handling: history bookkeeping, context window, model call.

use crate::provider::{Provider, ProviderError};
use crate::session::{ConversationStore, Turn};
use finchat_common::config::ChatConfig;
use std::sync::Arc;
use thiserror::Error;

/// Persona prepended to every prompt unless configuration replaces it.
///
/// Starts and ends with a newline, so the model sees a blank line before the
/// persona and two blank lines before the transcript.
pub const DEFAULT_SYSTEM_PROMPT: &str = "
You are a highly skilled financial assistant for a Finance Tracker application.
Your role:
- Help users understand their income, expenses, savings, and investments.
- Provide short, concise, actionable advice.
- Maintain context of previous messages in the conversation.
- Always respond politely and clearly.
- If the query is not finance-related, gently redirect the user back to finance topics.
Respond in plain text, no greetings, no Markdown symbols, and keep answers brief.
";

/// Marker that tells the model where its completion starts.
const COMPLETION_MARKER: &str = "Assistant:";

/// Errors surfaced by [`ChatService::send`].
#[derive(Debug, Error)]
pub enum ChatError {
    /// The message was missing or blank after trimming.
    #[error("Message field is required")]
    InvalidInput,

    /// The model provider failed.
    #[error(transparent)]
    Upstream(#[from] ProviderError),
}

/// Result of a successful exchange.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    /// The trimmed user message
    pub user: String,
    /// The trimmed model completion
    pub reply: String,
}

/// Runtime settings for [`ChatService`].
#[derive(Debug, Clone)]
pub struct ChatSettings {
    pub context_turns: usize,
    pub default_session_id: String,
    pub system_prompt: String,
}

impl Default for ChatSettings {
    fn default() -> Self {
        Self::from(&ChatConfig::default())
    }
}

impl From<&ChatConfig> for ChatSettings {
    fn from(config: &ChatConfig) -> Self {
        Self {
            context_turns: config.context_turns.max(1),
            default_session_id: config.default_session_id.clone(),
            system_prompt: config
                .system_prompt
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_PROMPT.to_string()),
        }
    }
}

/// Render turns as a `User:` / `Assistant:` transcript, one line per turn.
pub fn render_transcript(turns: &[Turn]) -> String {
    turns
        .iter()
        .map(|turn| format!("{}: {}\n", turn.role.label(), turn.content))
        .collect()
}

/// Build the full model prompt from the system prompt and the context window.
pub fn build_prompt(system_prompt: &str, context: &[Turn]) -> String {
    format!(
        "{system_prompt}\n\n{}{COMPLETION_MARKER}",
        render_transcript(context)
    )
}

/// Conversation front end: owns the store and the provider.
pub struct ChatService {
    store: Arc<ConversationStore>,
    provider: Arc<dyn Provider>,
    settings: ChatSettings,
}

impl ChatService {
    pub fn new(
        store: Arc<ConversationStore>,
        provider: Arc<dyn Provider>,
        settings: ChatSettings,
    ) -> Self {
        Self {
            store,
            provider,
            settings,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    /// Handle one user message.
    ///
    /// The session lock is held from the user append to the assistant append, so
    /// concurrent messages for one session are processed one at a time. A provider
    /// failure leaves the user turn in the history.
    pub async fn send(
        &self,
        session_id: Option<&str>,
        message: &str,
    ) -> Result<ChatReply, ChatError> {
        let message = message.trim();
        if message.is_empty() {
            return Err(ChatError::InvalidInput);
        }

        let session_id = session_id.unwrap_or(&self.settings.default_session_id);
        let handle = self.store.get_or_create(session_id).await;
        let mut history = handle.lock().await;

        history.push(Turn::user(message));
        let prompt = build_prompt(
            &self.settings.system_prompt,
            history.recent(self.settings.context_turns),
        );

        tracing::debug!(
            session_id = %session_id,
            stored_turns = history.len(),
            context_turns = history.recent(self.settings.context_turns).len(),
            "Calling model"
        );

        let completion = match self.provider.generate(&prompt).await {
            Ok(completion) => completion,
            Err(e) => {
                tracing::warn!(
                    session_id = %session_id,
                    provider = %self.provider.name(),
                    status = ?e.status_code,
                    error = %e,
                    "Model call failed"
                );
                return Err(e.into());
            }
        };

        let reply = completion.text.trim().to_string();
        history.push(Turn::assistant(reply.clone()));

        tracing::info!(
            session_id = %session_id,
            model = %self.provider.model(),
            latency_ms = completion.latency_ms,
            input_tokens = completion.usage.input_tokens,
            output_tokens = completion.usage.output_tokens,
            stored_turns = history.len(),
            "Chat reply generated"
        );

        Ok(ChatReply {
            user: message.to_string(),
            reply,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::Completion;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Echoes a fixed reply and records every prompt.
    struct RecordingProvider {
        reply: String,
        fail: bool,
        prompts: Mutex<Vec<String>>,
    }

    impl RecordingProvider {
        fn replying(reply: &str) -> Arc<Self> {
            Arc::new(Self {
                reply: reply.into(),
                fail: false,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn failing() -> Arc<Self> {
            Arc::new(Self {
                reply: String::new(),
                fail: true,
                prompts: Mutex::new(Vec::new()),
            })
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl Provider for RecordingProvider {
        fn name(&self) -> &str {
            "recording"
        }

        fn model(&self) -> &str {
            "test-model"
        }

        async fn generate(&self, prompt: &str) -> Result<Completion, ProviderError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            if self.fail {
                return Err(ProviderError::new("recording", "test-model", "boom").with_status(503));
            }
            Ok(Completion::text(self.reply.clone()))
        }
    }

    fn service(provider: Arc<RecordingProvider>) -> ChatService {
        ChatService::new(
            Arc::new(ConversationStore::new()),
            provider,
            ChatSettings::default(),
        )
    }

    #[test]
    fn transcript_labels_each_turn() {
        let turns = vec![Turn::user("How do I save?"), Turn::assistant("Budget first.")];
        assert_eq!(
            render_transcript(&turns),
            "User: How do I save?\nAssistant: Budget first.\n"
        );
    }

    #[test]
    fn prompt_layout() {
        let prompt = build_prompt("SYSTEM", &[Turn::user("hi")]);
        assert_eq!(prompt, "SYSTEM\n\nUser: hi\nAssistant:");
    }

    #[test]
    fn settings_use_default_persona() {
        let settings = ChatSettings::default();
        assert_eq!(settings.context_turns, 6);
        assert_eq!(settings.default_session_id, "default");
        assert!(settings
            .system_prompt
            .starts_with("\nYou are a highly skilled financial assistant"));
        assert!(settings.system_prompt.ends_with("keep answers brief.\n"));
    }

    #[test]
    fn default_prompt_layout() {
        let prompt = build_prompt(DEFAULT_SYSTEM_PROMPT, &[Turn::user("hi")]);
        assert!(prompt.starts_with("\nYou are"));
        assert!(prompt.ends_with("keep answers brief.\n\n\nUser: hi\nAssistant:"));
    }

    #[test]
    fn settings_honour_prompt_override() {
        let config = ChatConfig {
            system_prompt: Some("Be terse.".into()),
            ..Default::default()
        };
        assert_eq!(ChatSettings::from(&config).system_prompt, "Be terse.");
    }

    #[tokio::test]
    async fn send_trims_and_stores_both_turns() {
        let provider = RecordingProvider::replying("  Track every expense.\n");
        let chat = service(provider.clone());

        let reply = chat.send(Some("s1"), "  How do I budget?  ").await.unwrap();
        assert_eq!(reply.user, "How do I budget?");
        assert_eq!(reply.reply, "Track every expense.");

        let history = chat.store().history("s1").await.unwrap();
        assert_eq!(
            history,
            vec![
                Turn::user("How do I budget?"),
                Turn::assistant("Track every expense.")
            ]
        );
        assert!(provider.last_prompt().ends_with("User: How do I budget?\nAssistant:"));
    }

    #[tokio::test]
    async fn blank_completion_is_stored_as_empty_reply() {
        let chat = service(RecordingProvider::replying("  \n "));

        let reply = chat.send(Some("s1"), "hi").await.unwrap();
        assert_eq!(reply.reply, "");

        let history = chat.store().history("s1").await.unwrap();
        assert_eq!(history, vec![Turn::user("hi"), Turn::assistant("")]);
    }

    #[tokio::test]
    async fn missing_session_id_uses_default() {
        let chat = service(RecordingProvider::replying("ok"));
        chat.send(None, "hello").await.unwrap();
        assert!(chat.store().contains("default").await);
    }

    #[tokio::test]
    async fn blank_message_is_rejected_without_side_effects() {
        let provider = RecordingProvider::replying("unused");
        let chat = service(provider.clone());

        let err = chat.send(Some("s1"), " \n\t ").await.unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput));
        assert_eq!(err.to_string(), "Message field is required");
        assert!(chat.store().is_empty().await);
        assert!(provider.prompts.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn context_window_keeps_last_six_turns() {
        let provider = RecordingProvider::replying("noted");
        let chat = service(provider.clone());

        for i in 1..=4 {
            chat.send(Some("s"), &format!("message {i}")).await.unwrap();
        }

        // 7 turns stored when the fourth prompt was built; the first is dropped
        let prompt = provider.last_prompt();
        assert!(!prompt.contains("message 1"));
        assert!(prompt.contains("User: message 2"));
        assert!(prompt.contains("User: message 4\nAssistant:"));
        assert_eq!(prompt.matches("Assistant: noted").count(), 3);

        assert_eq!(chat.store().history("s").await.unwrap().len(), 8);
    }

    #[tokio::test]
    async fn provider_failure_keeps_user_turn() {
        let chat = service(RecordingProvider::failing());

        let err = chat.send(Some("s"), "What is an ETF?").await.unwrap_err();
        assert!(matches!(err, ChatError::Upstream(_)));
        assert!(err.to_string().contains("boom"));

        let history = chat.store().history("s").await.unwrap();
        assert_eq!(history, vec![Turn::user("What is an ETF?")]);
    }
}
