//! Message types and content blocks.
//!
//! These mirror the agent's session wire format: tools return
//! [`ContentBlock`] output, and the context hook works on [`Message`] lists.

use serde::{Deserialize, Serialize};

// ============================================================================
// Message Types
// ============================================================================

/// A message in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "role", rename_all = "camelCase")]
pub enum Message {
    /// Message authored by the user.
    User(UserMessage),
}

/// A user message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserMessage {
    pub content: UserContent,
    pub timestamp: i64,
}

/// User message content - either plain text or blocks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum UserContent {
    /// Plain text content (common for interactive input).
    Text(String),
    /// Structured content blocks (e.g. text + images).
    Blocks(Vec<ContentBlock>),
}

impl Message {
    /// A user message made of a single text block, stamped now.
    pub fn user_text_block(text: impl Into<String>) -> Self {
        Self::User(UserMessage {
            content: UserContent::Blocks(vec![ContentBlock::Text(TextContent::new(text))]),
            timestamp: chrono::Utc::now().timestamp_millis(),
        })
    }

    /// Whether this is a user message with a block-form text part
    /// containing `needle`.
    pub fn user_blocks_contain(&self, needle: &str) -> bool {
        let Self::User(UserMessage {
            content: UserContent::Blocks(blocks),
            ..
        }) = self
        else {
            return false;
        };
        blocks.iter().any(|block| match block {
            ContentBlock::Text(text) => text.text.contains(needle),
            ContentBlock::Image(_) => false,
        })
    }
}

// ============================================================================
// Content Blocks
// ============================================================================

/// A content block in a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ContentBlock {
    /// Plain text content.
    Text(TextContent),
    /// An inline image (base64 + MIME type).
    Image(ImageContent),
}

impl ContentBlock {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(&text.text),
            Self::Image(_) => None,
        }
    }
}

/// Text content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextContent {
    pub text: String,
}

impl TextContent {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

/// Image content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageContent {
    pub data: String, // Base64 encoded
    pub mime_type: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn user_message_serializes_with_role_tag() {
        let msg = Message::User(UserMessage {
            content: UserContent::Text("hi".to_string()),
            timestamp: 1,
        });
        let value = serde_json::to_value(&msg).unwrap();
        assert_eq!(value, json!({"role": "user", "content": "hi", "timestamp": 1}));
    }

    #[test]
    fn content_blocks_are_type_tagged() {
        let block = ContentBlock::Image(ImageContent {
            data: "aGk=".to_string(),
            mime_type: "image/png".to_string(),
        });
        assert_eq!(
            serde_json::to_value(&block).unwrap(),
            json!({"type": "image", "data": "aGk=", "mimeType": "image/png"})
        );

        let parsed: ContentBlock =
            serde_json::from_value(json!({"type": "text", "text": "x"})).unwrap();
        assert_eq!(parsed.as_text(), Some("x"));
    }

    #[test]
    fn marker_search_only_looks_at_text_blocks() {
        assert!(Message::user_text_block("[Remote AGENTS.md]\nrules").user_blocks_contain("[Remote AGENTS.md]"));

        let plain = Message::User(UserMessage {
            content: UserContent::Text("[Remote AGENTS.md]".to_string()),
            timestamp: 0,
        });
        assert!(!plain.user_blocks_contain("[Remote AGENTS.md]"));

        let image_only = Message::User(UserMessage {
            content: UserContent::Blocks(vec![ContentBlock::Image(ImageContent {
                data: "aGk=".to_string(),
                mime_type: "image/png".to_string(),
            })]),
            timestamp: 0,
        });
        assert!(!image_only.user_blocks_contain("[Remote AGENTS.md]"));
    }
}
