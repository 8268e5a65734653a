use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::generator::InputType;
use crate::models::{Deck, DeckSummary, ReviewRecord, ReviewState};
use crate::scheduler::{self, Quality};

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        Ok(Self { conn })
    }

    pub fn init(&self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS decks (
                id TEXT PRIMARY KEY,
                title TEXT NOT NULL,
                input_type TEXT NOT NULL DEFAULT 'text',
                total_cards INTEGER NOT NULL DEFAULT 0,
                body TEXT NOT NULL,
                created_at TEXT NOT NULL DEFAULT (datetime('now')),
                updated_at TEXT NOT NULL DEFAULT (datetime('now'))
            );

            CREATE TABLE IF NOT EXISTS review_history (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                deck_id TEXT NOT NULL,
                card_id TEXT NOT NULL,
                quality INTEGER NOT NULL CHECK(quality BETWEEN 0 AND 5),
                ease REAL NOT NULL,
                interval INTEGER NOT NULL,
                repetitions INTEGER NOT NULL,
                reviewed_at TEXT NOT NULL,
                FOREIGN KEY (deck_id) REFERENCES decks(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_decks_created ON decks(created_at);
            CREATE INDEX IF NOT EXISTS idx_history_deck ON review_history(deck_id);
            CREATE INDEX IF NOT EXISTS idx_history_card ON review_history(deck_id, card_id);
            "#,
        )?;
        Ok(())
    }

    // Deck operations
    /// Stores a freshly generated deck and returns its id.
    ///
    /// Ids are the creation time in epoch milliseconds, bumped past any
    /// collision so two decks created in the same millisecond stay distinct.
    pub fn insert_deck(
        &self,
        deck: &Deck,
        input_type: InputType,
        now: DateTime<Utc>,
    ) -> Result<String> {
        deck.validate()?;

        let mut millis = now.timestamp_millis();
        while self.deck_exists(&millis.to_string())? {
            millis += 1;
        }
        let id = millis.to_string();

        self.conn.execute(
            r#"
            INSERT INTO decks (id, title, input_type, total_cards, body, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
            "#,
            params![
                id,
                deck.title,
                input_type.as_str(),
                deck.total_cards as i64,
                serde_json::to_string(deck)?,
                now.to_rfc3339()
            ],
        )?;

        info!(deck_id = %id, cards = deck.total_cards, "deck saved");
        Ok(id)
    }

    fn deck_exists(&self, id: &str) -> Result<bool> {
        let found: Option<i64> = self
            .conn
            .query_row("SELECT 1 FROM decks WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;
        Ok(found.is_some())
    }

    pub fn get_deck(&self, id: &str) -> Result<Option<Deck>> {
        let body: Option<String> = self
            .conn
            .query_row("SELECT body FROM decks WHERE id = ?1", params![id], |row| row.get(0))
            .optional()?;

        match body {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    pub fn require_deck(&self, id: &str) -> Result<Deck> {
        self.get_deck(id)?
            .ok_or_else(|| Error::DeckNotFound(id.to_string()))
    }

    pub fn list_decks(&self) -> Result<Vec<DeckSummary>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, title, input_type, total_cards, created_at, updated_at
            FROM decks
            ORDER BY created_at DESC, id DESC
            "#,
        )?;

        let rows = stmt.query_map([], |row| {
            Ok(DeckSummary {
                id: row.get(0)?,
                title: row.get(1)?,
                input_type: row.get(2)?,
                total_cards: row.get(3)?,
                created_at: row.get(4)?,
                updated_at: row.get(5)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    /// Overwrites the stored body of an existing deck.
    pub fn save_deck(&self, id: &str, deck: &Deck, now: DateTime<Utc>) -> Result<()> {
        deck.validate()?;

        let rows = self.conn.execute(
            r#"
            UPDATE decks
            SET title = ?1, total_cards = ?2, body = ?3, updated_at = ?4
            WHERE id = ?5
            "#,
            params![
                deck.title,
                deck.total_cards as i64,
                serde_json::to_string(deck)?,
                now.to_rfc3339(),
                id
            ],
        )?;

        if rows == 0 {
            return Err(Error::DeckNotFound(id.to_string()));
        }
        Ok(())
    }

    pub fn delete_deck(&self, id: &str) -> Result<bool> {
        let rows = self
            .conn
            .execute("DELETE FROM decks WHERE id = ?1", params![id])?;
        Ok(rows > 0)
    }

    // Review operations
    /// Schedules one card, persists the deck and logs the review atomically.
    pub fn record_review(
        &self,
        deck_id: &str,
        card_id: &str,
        quality: Quality,
        now: DateTime<Utc>,
    ) -> Result<ReviewState> {
        let tx = self.conn.unchecked_transaction()?;

        let mut deck = self.require_deck(deck_id)?;
        let current = deck
            .card(card_id)
            .ok_or_else(|| Error::CardNotFound(card_id.to_string()))?
            .review;

        let next = scheduler::schedule(&current, quality, now);
        deck.apply_review(card_id, next)?;
        self.write_review(deck_id, &deck, card_id, quality, &next, now)?;

        tx.commit()?;
        Ok(next)
    }

    fn write_review(
        &self,
        deck_id: &str,
        deck: &Deck,
        card_id: &str,
        quality: Quality,
        state: &ReviewState,
        now: DateTime<Utc>,
    ) -> Result<()> {
        self.save_deck(deck_id, deck, now)?;
        self.conn.execute(
            r#"
            INSERT INTO review_history (deck_id, card_id, quality, ease, interval, repetitions, reviewed_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
            "#,
            params![
                deck_id,
                card_id,
                quality.value(),
                state.ease,
                state.interval,
                state.repetitions,
                now.to_rfc3339()
            ],
        )?;

        debug!(
            deck_id,
            card_id,
            quality = quality.value(),
            interval = state.interval,
            ease = state.ease,
            "review recorded"
        );
        Ok(())
    }

    pub fn review_history(&self, deck_id: &str) -> Result<Vec<ReviewRecord>> {
        let mut stmt = self.conn.prepare(
            r#"
            SELECT id, deck_id, card_id, quality, ease, interval, repetitions, reviewed_at
            FROM review_history
            WHERE deck_id = ?1
            ORDER BY id ASC
            "#,
        )?;

        let rows = stmt.query_map(params![deck_id], |row| {
            Ok(ReviewRecord {
                id: row.get(0)?,
                deck_id: row.get(1)?,
                card_id: row.get(2)?,
                quality: row.get(3)?,
                ease: row.get(4)?,
                interval: row.get(5)?,
                repetitions: row.get(6)?,
                reviewed_at: row.get(7)?,
            })
        })?;

        Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
    }

    pub fn get_stats(&self, now: DateTime<Utc>) -> Result<Stats> {
        let total_decks: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM decks", [], |row| row.get(0))?;

        let total_reviews: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM review_history", [], |row| row.get(0))?;

        let lapses: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM review_history WHERE quality < 3",
            [],
            |row| row.get(0),
        )?;

        // Due counts and ease live inside the deck bodies
        let mut stmt = self.conn.prepare("SELECT body FROM decks")?;
        let bodies = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut total_cards = 0_i64;
        let mut due_now = 0_i64;
        let mut ease_sum = 0.0;
        for body in bodies {
            let deck: Deck = serde_json::from_str(&body)?;
            for card in deck.cards() {
                total_cards += 1;
                ease_sum += card.review.ease;
                if card.review.is_due(now) {
                    due_now += 1;
                }
            }
        }

        let avg_ease = if total_cards == 0 {
            0.0
        } else {
            ease_sum / total_cards as f64
        };

        Ok(Stats {
            total_decks,
            total_cards,
            total_reviews,
            lapses,
            due_now,
            avg_ease,
        })
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct Stats {
    pub total_decks: i64,
    pub total_cards: i64,
    pub total_reviews: i64,
    pub lapses: i64,
    pub due_now: i64,
    pub avg_ease: f64,
}
