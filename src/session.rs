use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::{Card, Deck, ReviewState};
use crate::scheduler::Quality;

const FOCUS_TOPICS: usize = 2;

/// Whether rating a card moved on to another card or finished a pass over the deck.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Advance {
    Next,
    Complete,
}

#[derive(Debug, Clone, Serialize)]
pub struct Rated {
    pub card_id: String,
    pub topic: String,
    pub quality: Quality,
    pub state: ReviewState,
    pub advance: Advance,
}

/// One pass through a deck. Holds card ids only; the deck stays with the caller.
#[derive(Debug, Clone)]
pub struct StudySession {
    order: Vec<String>,
    position: usize,
    weaknesses: Vec<String>,
}

impl StudySession {
    pub fn new(deck: &Deck) -> Self {
        Self {
            order: deck.cards().map(|c| c.id.clone()).collect(),
            position: 0,
            weaknesses: Vec::new(),
        }
    }

    pub fn shuffled<R: Rng + ?Sized>(deck: &Deck, rng: &mut R) -> Self {
        let mut session = Self::new(deck);
        session.order.shuffle(rng);
        session
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn current<'d>(&self, deck: &'d Deck) -> Option<&'d Card> {
        self.order
            .get(self.position)
            .and_then(|id| deck.card(id))
    }

    /// Writes a freshly scheduled state for the current card into `deck` and
    /// advances. After the last card the session wraps to the first.
    pub fn rate(&mut self, deck: &mut Deck, quality: Quality, state: ReviewState) -> Result<Rated> {
        let card_id = self.order.get(self.position).ok_or(Error::EmptyDeck)?.clone();
        let topic = deck.apply_review(&card_id, state)?.topic.clone();

        if !quality.passed() && !self.weaknesses.contains(&topic) {
            debug!(topic = %topic, "weak topic noted");
            self.weaknesses.push(topic.clone());
        }

        let advance = if self.position + 1 < self.order.len() {
            self.position += 1;
            Advance::Next
        } else {
            self.position = 0;
            Advance::Complete
        };

        Ok(Rated {
            card_id,
            topic,
            quality,
            state,
            advance,
        })
    }

    /// Topics rated below passing this session, oldest first.
    pub fn weaknesses(&self) -> &[String] {
        &self.weaknesses
    }

    pub fn focus(&self) -> &[String] {
        let start = self.weaknesses.len().saturating_sub(FOCUS_TOPICS);
        &self.weaknesses[start..]
    }
}
