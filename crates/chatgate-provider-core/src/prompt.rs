use chatgate_protocol::chat::ConversationTurn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptMessage {
    pub role: Role,
    pub content: String,
}

impl PromptMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// History turns in order, then the current user input.
pub fn assemble_messages(history: &[ConversationTurn], user_input: &str) -> Vec<PromptMessage> {
    let mut messages = Vec::with_capacity(history.len() * 2 + 1);
    for turn in history {
        messages.push(PromptMessage::user(turn.user_message.as_str()));
        messages.push(PromptMessage::assistant(turn.ai_message.as_str()));
    }
    messages.push(PromptMessage::user(user_input));
    messages
}

/// Flat transcript used for input-token accounting.
pub fn render_transcript(messages: &[PromptMessage]) -> String {
    messages
        .iter()
        .map(|message| match message.role {
            Role::User => format!("Human: {}", message.content),
            Role::Assistant => format!("AI: {}", message.content),
        })
        .collect::<Vec<_>>()
        .join("\n")
}
