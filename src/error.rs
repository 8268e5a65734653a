use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid quality '{0}'. Use an integer from 0 to 5, or again/hard/good/easy")]
    InvalidQuality(String),

    #[error("Invalid card {card_id}: {reason}")]
    InvalidCard { card_id: String, reason: String },

    #[error("Invalid deck: {0}")]
    InvalidDeck(String),

    #[error("Invalid input type '{0}'. Use: text, youtube, file, image, or web")]
    InvalidInputType(String),

    #[error("Input is empty")]
    EmptyInput,

    #[error("Deck has no cards")]
    EmptyDeck,

    #[error("Deck not found: {0}")]
    DeckNotFound(String),

    #[error("Card not found: {0}")]
    CardNotFound(String),

    #[error("Tutor error: {0}")]
    Tutor(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
