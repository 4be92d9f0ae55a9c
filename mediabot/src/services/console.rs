//! Console stand-in for the chat front-end.

use async_trait::async_trait;
use tracing::info;

use crate::Result;
use crate::bus::{Action, Actor, ActorContext, ChatMessage, Component, Envelope};

const CHAT_ACTIONS: [Action; 1] = [Action::SendMessage];

/// Logs every outbound user message instead of delivering it.
#[derive(Debug, Default)]
pub struct ConsoleChat;

impl ConsoleChat {
    pub fn new() -> Self {
        Self
    }
}

/// Plain-text rendering of a message and its options.
pub fn render(message: &ChatMessage) -> String {
    let mut out = message.text.clone();
    if let Some(choices) = &message.choices {
        for option in &choices.options {
            out.push_str(&format!("\n  [{}] {}", option.button, option.text));
        }
    }
    out
}

#[async_trait]
impl Actor for ConsoleChat {
    fn component(&self) -> Component {
        Component::ChatClient
    }

    fn accepted_actions(&self) -> &'static [Action] {
        &CHAT_ACTIONS
    }

    async fn handle_message(&self, envelope: Envelope, _ctx: &ActorContext) -> Result<()> {
        let Some(message) = envelope.as_chat() else {
            return Err(crate::Error::validation(format!(
                "{envelope:?} does not carry a chat message"
            )));
        };
        info!(
            user_id = message.user_id,
            source = %envelope.source(),
            choices = message.choices.as_ref().map(|c| c.action.as_str()),
            "\n{}",
            render(message)
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{Choice, Choices};
    use serde_json::json;

    #[test]
    fn test_render_plain_text() {
        assert_eq!(render(&ChatMessage::text(1, "hello")), "hello");
    }

    #[test]
    fn test_render_lists_options() {
        let message = ChatMessage::text(1, "Pick one").with_choices(Choices {
            action: "select_torrent".to_string(),
            options: vec![
                Choice {
                    text: "http://t/topic/1".to_string(),
                    button: "0".to_string(),
                    callback: json!({}),
                },
                Choice {
                    text: "http://t/topic/2".to_string(),
                    button: "1".to_string(),
                    callback: json!({}),
                },
            ],
        });
        assert_eq!(
            render(&message),
            "Pick one\n  [0] http://t/topic/1\n  [1] http://t/topic/2"
        );
    }
}
