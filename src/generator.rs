use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::models::{Card, CardType, Deck, ReviewState};

/// Kind of study material submitted for generation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputType {
    Text,
    Youtube,
    File,
    Image,
    Web,
}

impl InputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InputType::Text => "text",
            InputType::Youtube => "youtube",
            InputType::File => "file",
            InputType::Image => "image",
            InputType::Web => "web",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "notes" => Some(InputType::Text),
            "youtube" | "video" => Some(InputType::Youtube),
            "file" | "pdf" | "document" => Some(InputType::File),
            "image" => Some(InputType::Image),
            "web" | "webpage" | "url" => Some(InputType::Web),
            _ => None,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            InputType::Text => "Text",
            InputType::Youtube => "YouTube",
            InputType::File => "File",
            InputType::Image => "Image",
            InputType::Web => "Webpage",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateRequest {
    pub input: String,
    #[serde(rename = "type")]
    pub input_type: InputType,
}

impl GenerateRequest {
    pub fn new(input: impl Into<String>, input_type: InputType) -> Result<Self> {
        let input = input.into();
        if input.trim().is_empty() {
            return Err(Error::EmptyInput);
        }
        Ok(Self { input, input_type })
    }
}

/// A generator may decline to produce a deck, in which case `deck` is absent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub deck: Option<Deck>,
}

/// Turns study material into a flashcard deck.
pub trait DeckGenerator {
    fn generate(&self, request: &GenerateRequest, now: DateTime<Utc>) -> Result<GenerateResponse>;
}

/// Offline stand-in for the generation service: always returns the same
/// three-card cell biology deck.
#[derive(Debug, Clone, Copy, Default)]
pub struct MockGenerator;

impl DeckGenerator for MockGenerator {
    fn generate(&self, request: &GenerateRequest, now: DateTime<Utc>) -> Result<GenerateResponse> {
        if request.input.trim().is_empty() {
            return Err(Error::EmptyInput);
        }

        let stamp = now.timestamp_millis();
        let cards = vec![
            mock_card(
                stamp,
                1,
                "What is the primary function of the Mitochondria?",
                "The powerhouse of the cell, responsible for generating ATP through cellular respiration.",
                CardType::Definition,
                &[],
                "Cell Biology",
            ),
            mock_card(
                stamp,
                2,
                "Which process occurs in the cytoplasm?",
                "Glycolysis",
                CardType::MultipleChoice,
                &[
                    "Glycolysis",
                    "Krebs Cycle",
                    "Electron Transport Chain",
                    "Oxidative Phosphorylation",
                ],
                "Cell Biology",
            ),
            mock_card(
                stamp,
                3,
                "During mitosis, chromosomes align at the _______ plate.",
                "Metaphase",
                CardType::Cloze,
                &[],
                "Cell Division",
            ),
        ];

        let deck = Deck::from_cards(
            format!("Generated Study Set: {}", request.input_type.as_str()),
            cards,
        );
        info!(
            input_type = request.input_type.as_str(),
            cards = deck.total_cards,
            "generated deck"
        );

        Ok(GenerateResponse { deck: Some(deck) })
    }
}

fn mock_card(
    stamp: i64,
    n: u32,
    question: &str,
    answer: &str,
    card_type: CardType,
    options: &[&str],
    topic: &str,
) -> Card {
    Card {
        id: format!("c_{}_{}", stamp, n),
        question: question.to_string(),
        answer: answer.to_string(),
        card_type,
        options: if options.is_empty() {
            None
        } else {
            Some(options.iter().map(|s| s.to_string()).collect())
        },
        review: ReviewState::default(),
        topic: topic.to_string(),
    }
}
