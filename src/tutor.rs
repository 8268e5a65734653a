use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::{Error, Result};
use crate::models::{Card, CardType};

pub const GREETING: &str = "Hi! I'm your AI Tutor. Stuck on a card? Ask me anything!";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TutorRequest {
    pub message: String,
    pub context: Card,
    pub weaknesses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TutorResponse {
    pub response: String,
}

pub trait Tutor {
    fn respond(&self, request: &TutorRequest) -> Result<TutorResponse>;
}

/// Chat history shown beside the card, opened with the tutor's greeting.
#[derive(Debug, Clone, Serialize)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
}

impl Default for Conversation {
    fn default() -> Self {
        Self {
            messages: vec![ChatMessage::assistant(GREETING)],
        }
    }
}

impl Conversation {
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Sends `input` about `card`. Blank input is ignored and yields `None`.
    ///
    /// The user's message is kept even when the tutor fails.
    pub fn ask<T: Tutor + ?Sized>(
        &mut self,
        tutor: &T,
        input: &str,
        card: &Card,
        weaknesses: &[String],
    ) -> Result<Option<&ChatMessage>> {
        let message = input.trim();
        if message.is_empty() {
            return Ok(None);
        }

        self.messages.push(ChatMessage::user(message));

        let request = TutorRequest {
            message: message.to_string(),
            context: card.clone(),
            weaknesses: weaknesses.to_vec(),
        };

        match tutor.respond(&request) {
            Ok(reply) => {
                self.messages.push(ChatMessage::assistant(reply.response));
                Ok(self.messages.last())
            }
            Err(e) => {
                warn!(card_id = %card.id, error = %e, "tutor request failed");
                Err(e)
            }
        }
    }
}

/// Answers from the card alone, without a model behind it.
#[derive(Debug, Clone, Copy, Default)]
pub struct OfflineTutor;

impl Tutor for OfflineTutor {
    fn respond(&self, request: &TutorRequest) -> Result<TutorResponse> {
        let card = &request.context;
        if card.answer.trim().is_empty() {
            return Err(Error::Tutor(format!("card {} has no answer", card.id)));
        }

        let asked = request.message.to_lowercase();
        let mut response = if asked.contains("answer") || asked.contains("solution") {
            format!("The answer is: {}", card.answer)
        } else if card.card_type == CardType::MultipleChoice {
            let options = card.options.as_deref().unwrap_or_default().join(", ");
            format!(
                "One of these is right: {}. Think about where in the {} material it fits.",
                options, card.topic
            )
        } else {
            let first = card.answer.chars().next().unwrap_or_default();
            format!(
                "Hint: the answer starts with '{}' and is {} characters long. It comes from {}.",
                first,
                card.answer.chars().count(),
                card.topic
            )
        };

        if !request.weaknesses.is_empty() {
            let start = request.weaknesses.len().saturating_sub(2);
            response.push_str(&format!(
                " We'll keep working on {}.",
                request.weaknesses[start..].join(", ")
            ));
        }

        Ok(TutorResponse { response })
    }
}
