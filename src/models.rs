//! Wire types exchanged with clients and request validation.

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::constants::MAX_MESSAGES;
use crate::error::NicError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
    System,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Nutrient {
    pub name: String,
    pub value: f64,
    pub unit: String,
}

impl fmt::Display for Nutrient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} {}", self.name, self.value, self.unit)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NutritionEntry {
    pub item: String,
    pub nutrients: Vec<Nutrient>,
}

/// Body of a successful non-streamed chat reply.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatReply {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub message: String,
}

/// Checks a raw chat request body and returns its messages.
///
/// Rejects bodies whose `messages` is missing or not an array, holds more than
/// [`MAX_MESSAGES`] entries, is empty, or contains entries that are not `{role, content}`.
pub fn parse_chat_request(body: &serde_json::Value) -> Result<Vec<ChatMessage>, NicError> {
    let messages = body
        .get("messages")
        .and_then(|m| m.as_array())
        .ok_or_else(|| NicError::validation("`messages` must be an array"))?;

    if messages.len() > MAX_MESSAGES {
        return Err(NicError::validation(format!(
            "too many messages: {} (at most {} allowed)",
            messages.len(),
            MAX_MESSAGES
        )));
    }
    if messages.is_empty() {
        return Err(NicError::validation("`messages` must not be empty"));
    }

    messages
        .iter()
        .enumerate()
        .map(|(i, m)| {
            serde_json::from_value::<ChatMessage>(m.clone())
                .map_err(|e| NicError::validation(format!("invalid message at index {}: {}", i, e)))
        })
        .collect()
}

/// True when the list opens a conversation: one user message and no assistant reply yet.
pub fn is_first_exchange(messages: &[ChatMessage]) -> bool {
    let users = messages.iter().filter(|m| m.role == Role::User).count();
    let assistants = messages.iter().filter(|m| m.role == Role::Assistant).count();
    users == 1 && assistants == 0
}
