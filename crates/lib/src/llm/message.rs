//! Conversation messages in the OpenAI chat format, and the message builder
//! that turns one user turn (text + image URLs) into a multimodal message.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One part of a multimodal message. Wire: `{"type":"text","text":..}` or
/// `{"type":"image_url","image_url":{"url":..}}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

/// Message content: a plain string, or an ordered list of parts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

/// A single message in a conversation (role + content).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationMessage {
    pub role: Role,
    pub content: MessageContent,
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    pub fn image(url: impl Into<String>) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl { url: url.into() },
        }
    }
}

impl ConversationMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: MessageContent::Text(content.into()),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: MessageContent::Text(content.into()),
        }
    }

    /// Build a user message for one turn: one image part per URL (in the given order),
    /// then exactly one text part. The provider expects images ahead of the question,
    /// so caller ordering between text and images is not preserved.
    pub fn user_turn<S: AsRef<str>>(text: &str, images: &[S]) -> Self {
        let mut parts: Vec<ContentPart> = images
            .iter()
            .map(|url| ContentPart::image(url.as_ref()))
            .collect();
        parts.push(ContentPart::text(text));
        Self {
            role: Role::User,
            content: MessageContent::Parts(parts),
        }
    }

    /// Concatenated text of this message (text parts only).
    pub fn text(&self) -> String {
        match &self.content {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter_map(|p| match p {
                    ContentPart::Text { text } => Some(text.as_str()),
                    ContentPart::ImageUrl { .. } => None,
                })
                .collect(),
        }
    }
}

/// Ordered message list for one upstream call: optional system prompt, then the
/// existing history, then the new user message. Does not touch the history.
pub fn build_messages(
    system_prompt: Option<&str>,
    history: &[ConversationMessage],
    user: &ConversationMessage,
) -> Vec<ConversationMessage> {
    let mut out = Vec::with_capacity(history.len() + 2);
    if let Some(prompt) = system_prompt {
        if !prompt.trim().is_empty() {
            out.push(ConversationMessage::system(prompt));
        }
    }
    out.extend(history.iter().cloned());
    out.push(user.clone());
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_turn_puts_images_before_text_in_input_order() {
        let msg = ConversationMessage::user_turn("compare", &["https://x/a.jpg", "https://x/b.jpg"]);
        assert_eq!(msg.role, Role::User);
        assert_eq!(
            msg.content,
            MessageContent::Parts(vec![
                ContentPart::image("https://x/a.jpg"),
                ContentPart::image("https://x/b.jpg"),
                ContentPart::text("compare"),
            ])
        );
    }

    #[test]
    fn user_turn_without_images_has_single_text_part() {
        let msg = ConversationMessage::user_turn::<&str>("hi", &[]);
        assert_eq!(msg.content, MessageContent::Parts(vec![ContentPart::text("hi")]));
        assert_eq!(msg.text(), "hi");
    }

    #[test]
    fn serializes_in_openai_wire_format() {
        let msg = ConversationMessage::user_turn("describe this", &["https://x/a.jpg"]);
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(
            value,
            json!({
                "role": "user",
                "content": [
                    { "type": "image_url", "image_url": { "url": "https://x/a.jpg" } },
                    { "type": "text", "text": "describe this" }
                ]
            })
        );
        let value = serde_json::to_value(ConversationMessage::assistant("Hello!")).unwrap();
        assert_eq!(value, json!({ "role": "assistant", "content": "Hello!" }));
    }

    #[test]
    fn build_appends_user_after_history() {
        let history = vec![
            ConversationMessage::user_turn::<&str>("first", &[]),
            ConversationMessage::assistant("answer"),
        ];
        let user = ConversationMessage::user_turn::<&str>("second", &[]);
        let out = build_messages(None, &history, &user);
        assert_eq!(out.len(), 3);
        assert_eq!(&out[..2], &history[..]);
        assert_eq!(out[2], user);
    }

    #[test]
    fn build_prepends_system_prompt_when_set() {
        let user = ConversationMessage::user_turn::<&str>("q", &[]);
        let out = build_messages(Some("be brief"), &[], &user);
        assert_eq!(out, vec![ConversationMessage::system("be brief"), user.clone()]);

        let out = build_messages(Some("   "), &[], &user);
        assert_eq!(out, vec![user]);
    }
}
