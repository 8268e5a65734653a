use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

pub const INITIAL_EASE: f64 = 2.5;
pub const MIN_EASE: f64 = 1.3;

/// SM-2 bookkeeping owned by each card.
///
/// Serialized as the card's `sm2` object; `nextReview` is epoch milliseconds
/// so decks written by the browser client load unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewState {
    pub ease: f64,
    pub interval: u32,
    pub repetitions: u32,
    #[serde(default, with = "chrono::serde::ts_milliseconds_option")]
    pub next_review: Option<DateTime<Utc>>,
}

impl Default for ReviewState {
    fn default() -> Self {
        Self {
            ease: INITIAL_EASE,
            interval: 0,
            repetitions: 0,
            next_review: None,
        }
    }
}

impl ReviewState {
    pub fn stage(&self) -> Stage {
        match self.repetitions {
            0 => Stage::New,
            1 => Stage::Learned,
            _ => Stage::Established,
        }
    }

    // Never-scheduled cards are always due
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        match self.next_review {
            Some(next) => next <= now,
            None => true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    New,
    Learned,
    Established,
}

impl Stage {
    pub fn label(&self) -> &'static str {
        match self {
            Stage::New => "New",
            Stage::Learned => "Learned",
            Stage::Established => "Established",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CardType {
    Definition,
    MultipleChoice,
    Cloze,
    ShortAnswer,
}

impl CardType {
    pub fn as_str(&self) -> &'static str {
        match self {
            CardType::Definition => "definition",
            CardType::MultipleChoice => "multiple_choice",
            CardType::Cloze => "cloze",
            CardType::ShortAnswer => "short_answer",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Card {
    pub id: String,
    pub question: String,
    pub answer: String,
    #[serde(rename = "type")]
    pub card_type: CardType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(rename = "sm2", default)]
    pub review: ReviewState,
    pub topic: String,
}

impl Card {
    /// Copy of this card carrying `review` in place of its current state.
    pub fn reviewed(&self, review: ReviewState) -> Card {
        Card {
            review,
            ..self.clone()
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = |reason: &str| Error::InvalidCard {
            card_id: self.id.clone(),
            reason: reason.to_string(),
        };

        match (&self.card_type, &self.options) {
            (CardType::MultipleChoice, None) => {
                return Err(invalid("multiple choice card has no options"))
            }
            (CardType::MultipleChoice, Some(opts)) if opts.is_empty() => {
                return Err(invalid("multiple choice card has no options"))
            }
            (CardType::MultipleChoice, _) => {}
            (_, Some(_)) => return Err(invalid("only multiple choice cards carry options")),
            (_, None) => {}
        }

        if self.review.ease < MIN_EASE {
            return Err(invalid("ease is below the 1.3 floor"));
        }

        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Topic {
    pub name: String,
    pub cards: Vec<Card>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Deck {
    pub title: String,
    pub topics: Vec<Topic>,
    pub total_cards: usize,
}

impl Deck {
    /// Groups cards by topic label, topics ordered by first appearance.
    pub fn from_cards(title: impl Into<String>, cards: Vec<Card>) -> Self {
        let total_cards = cards.len();
        let mut topics: Vec<Topic> = Vec::new();

        for card in cards {
            match topics.iter_mut().find(|t| t.name == card.topic) {
                Some(topic) => topic.cards.push(card),
                None => topics.push(Topic {
                    name: card.topic.clone(),
                    cards: vec![card],
                }),
            }
        }

        Self {
            title: title.into(),
            topics,
            total_cards,
        }
    }

    /// All cards in review order.
    pub fn cards(&self) -> impl Iterator<Item = &Card> {
        self.topics.iter().flat_map(|t| t.cards.iter())
    }

    pub fn card(&self, card_id: &str) -> Option<&Card> {
        self.cards().find(|c| c.id == card_id)
    }

    pub fn due_cards(&self, now: DateTime<Utc>) -> impl Iterator<Item = &Card> {
        self.cards().filter(move |c| c.review.is_due(now))
    }

    /// Topics holding a card whose most recent review failed, in deck order.
    pub fn weak_topics(&self) -> Vec<String> {
        let mut topics: Vec<String> = Vec::new();
        for card in self.cards() {
            let lapsed = card.review.repetitions == 0 && card.review.next_review.is_some();
            if lapsed && !topics.contains(&card.topic) {
                topics.push(card.topic.clone());
            }
        }
        topics
    }

    /// Substitutes the card's review state, returning the replacement card.
    pub fn apply_review(&mut self, card_id: &str, review: ReviewState) -> Result<&Card> {
        let slot = self
            .topics
            .iter_mut()
            .flat_map(|t| t.cards.iter_mut())
            .find(|c| c.id == card_id)
            .ok_or_else(|| Error::CardNotFound(card_id.to_string()))?;

        *slot = slot.reviewed(review);
        Ok(slot)
    }

    pub fn validate(&self) -> Result<()> {
        let actual = self.cards().count();
        if actual != self.total_cards {
            return Err(Error::InvalidDeck(format!(
                "totalCards is {} but the deck holds {} cards",
                self.total_cards, actual
            )));
        }

        let mut seen = HashSet::new();
        for topic in &self.topics {
            for card in &topic.cards {
                if !seen.insert(card.id.as_str()) {
                    return Err(Error::InvalidCard {
                        card_id: card.id.clone(),
                        reason: "card id appears more than once".to_string(),
                    });
                }
                if card.topic != topic.name {
                    return Err(Error::InvalidCard {
                        card_id: card.id.clone(),
                        reason: format!(
                            "topic label '{}' does not match topic '{}'",
                            card.topic, topic.name
                        ),
                    });
                }
                card.validate()?;
            }
        }

        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeckSummary {
    pub id: String,
    pub title: String,
    pub input_type: String,
    pub total_cards: i64,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReviewRecord {
    pub id: i64,
    pub deck_id: String,
    pub card_id: String,
    pub quality: u8,
    pub ease: f64,
    pub interval: u32,
    pub repetitions: u32,
    pub reviewed_at: String,
}

// JSON output wrapper for CLI
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }

    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}
