mod config;
mod error;
mod generator;
mod logging;
mod models;
mod scheduler;
mod session;
mod store;
mod tutor;

use std::io::{self, BufRead, Write};

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;

use config::Config;
use error::{Error, Result};
use generator::{DeckGenerator, GenerateRequest, InputType, MockGenerator};
use models::{Card, JsonOutput};
use scheduler::Quality;
use session::{Advance, StudySession};
use store::Database;
use tutor::{Conversation, OfflineTutor};

#[derive(Parser)]
#[command(name = "studybuddy")]
#[command(about = "Flashcard decks with SM-2 spaced repetition and a study tutor")]
#[command(version)]
struct Cli {
    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Generate a flashcard deck from study material
    Generate {
        /// Notes, or a URL / path for the other input types
        input: String,

        /// Input type: text/youtube/file/image/web
        #[arg(long = "type", short, default_value = "text")]
        input_type: String,
    },

    /// Manage decks
    #[command(subcommand)]
    Deck(DeckCommands),

    /// Show the next card due for review
    Next {
        /// Deck ID
        deck: String,
    },

    /// Record a review for a card
    Review {
        /// Deck ID
        deck: String,

        /// Card ID
        card: String,

        /// Recall quality: 0-5 or again/hard/good/easy
        #[arg(long, short)]
        quality: String,
    },

    /// Study a deck interactively, reading answers from stdin
    Study {
        /// Deck ID
        deck: String,

        /// Shuffle the card order
        #[arg(long)]
        shuffle: bool,
    },

    /// Ask the tutor about a card
    Tutor {
        /// Deck ID
        deck: String,

        /// Card ID
        card: String,

        /// Question for the tutor
        message: String,
    },

    /// Show the review log of a deck
    History {
        /// Deck ID
        deck: String,
    },

    /// Show study statistics
    Stats,
}

#[derive(Subcommand)]
enum DeckCommands {
    /// List all decks
    List,

    /// Show deck details
    Show {
        /// Deck ID
        id: String,
    },

    /// Delete a deck
    Delete {
        /// Deck ID
        id: String,
    },
}

fn main() {
    let cli = Cli::parse();
    let config = Config::from_env();
    logging::init_tracing(&config.log_filter);

    let json = cli.json;
    if let Err(e) = run(cli, &config) {
        if json {
            let output = JsonOutput::<()>::err(e.to_string());
            match serde_json::to_string(&output) {
                Ok(line) => println!("{}", line),
                Err(_) => eprintln!("Error: {}", e),
            }
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(1);
    }
}

fn print_json<T: Serialize>(output: &JsonOutput<T>) -> Result<()> {
    println!("{}", serde_json::to_string(output)?);
    Ok(())
}

fn run(cli: Cli, config: &Config) -> Result<()> {
    let db = Database::open(&config.db_path)?;
    db.init()?;

    match cli.command {
        Commands::Init => {
            if cli.json {
                print_json(&JsonOutput::<()>::ok(()))?;
            } else {
                println!("Database initialized at: {}", config.db_path.display());
            }
        }

        Commands::Generate { input, input_type } => {
            let input_type = InputType::from_str(&input_type)
                .ok_or_else(|| Error::InvalidInputType(input_type.clone()))?;
            let now = Utc::now();
            let request = GenerateRequest::new(input, input_type)?;

            match MockGenerator.generate(&request, now)?.deck {
                Some(deck) => {
                    let id = db.insert_deck(&deck, input_type, now)?;
                    if cli.json {
                        print_json(&JsonOutput::ok(serde_json::json!({
                            "id": id,
                            "deck": deck
                        })))?;
                    } else {
                        println!(
                            "Generated '{}' from {} input with {} cards.",
                            deck.title,
                            input_type.label(),
                            deck.total_cards
                        );
                        println!("Deck ID: {}", id);
                        println!();
                        println!("Start studying with:");
                        println!("  studybuddy study {}", id);
                    }
                }
                None if cli.json => print_json(&JsonOutput::<()>::err("No deck generated"))?,
                None => println!("No deck generated."),
            }
        }

        Commands::Deck(deck_cmd) => match deck_cmd {
            DeckCommands::List => {
                let decks = db.list_decks()?;
                if cli.json {
                    print_json(&JsonOutput::ok(&decks))?;
                } else if decks.is_empty() {
                    println!("No decks found.");
                } else {
                    println!("{:<15} {:<40} {:<8} CARDS", "ID", "TITLE", "TYPE");
                    println!("{}", "-".repeat(72));
                    for deck in decks {
                        println!(
                            "{:<15} {:<40} {:<8} {}",
                            deck.id,
                            truncate(&deck.title, 38),
                            deck.input_type,
                            deck.total_cards
                        );
                    }
                }
            }

            DeckCommands::Show { id } => {
                let deck = db.require_deck(&id)?;
                if cli.json {
                    print_json(&JsonOutput::ok(&deck))?;
                } else {
                    let now = Utc::now();
                    println!("Deck: {}", deck.title);
                    println!("ID: {}", id);
                    println!(
                        "Cards: {} ({} due now)",
                        deck.total_cards,
                        deck.due_cards(now).count()
                    );
                    for topic in &deck.topics {
                        println!();
                        println!("--- {} ---", topic.name);
                        println!(
                            "{:<22} {:<16} {:<12} {:<9} NEXT REVIEW",
                            "ID", "TYPE", "STAGE", "INTERVAL"
                        );
                        for card in &topic.cards {
                            println!(
                                "{:<22} {:<16} {:<12} {:<9} {}",
                                truncate(&card.id, 20),
                                card.card_type.as_str(),
                                card.review.stage().label(),
                                format!("{}d", card.review.interval),
                                format_next_review(card.review.next_review)
                            );
                        }
                    }
                }
            }

            DeckCommands::Delete { id } => {
                if db.delete_deck(&id)? {
                    if cli.json {
                        print_json(&JsonOutput::<()>::ok(()))?;
                    } else {
                        println!("Deck {} deleted.", id);
                    }
                } else {
                    return Err(Error::DeckNotFound(id));
                }
            }
        },

        Commands::Next { deck: deck_id } => {
            let deck = db.require_deck(&deck_id)?;
            let due = deck.due_cards(Utc::now()).next();
            if cli.json {
                print_json(&JsonOutput::ok(due))?;
            } else if let Some(card) = due {
                println!("=== Next Card to Review ===");
                println!();
                print_question(card);
                println!();
                println!("After answering, record the review with:");
                println!(
                    "  studybuddy review {} {} --quality <0-5|again|hard|good|easy>",
                    deck_id, card.id
                );
            } else {
                println!("Nothing due in '{}'. Come back later!", deck.title);
            }
        }

        Commands::Review {
            deck,
            card,
            quality,
        } => {
            let quality: Quality = quality.parse()?;
            let state = db.record_review(&deck, &card, quality, Utc::now())?;

            if cli.json {
                print_json(&JsonOutput::ok(&state))?;
            } else {
                println!("Review recorded for card {} (quality {}).", card, quality);
                println!(
                    "Ease: {:.2}  Interval: {} day(s)  Streak: {}",
                    state.ease, state.interval, state.repetitions
                );
                println!("Next review: {}", format_next_review(state.next_review));
            }
        }

        Commands::Study { deck, shuffle } => {
            let stdin = io::stdin();
            let summary = if cli.json {
                study(&db, &deck, shuffle, stdin.lock(), &mut io::stderr(), &Utc::now)?
            } else {
                study(&db, &deck, shuffle, stdin.lock(), &mut io::stdout(), &Utc::now)?
            };

            if cli.json {
                print_json(&JsonOutput::ok(&summary))?;
            } else {
                println!();
                println!("Reviewed {} card(s).", summary.reviewed);
                if !summary.weaknesses.is_empty() {
                    println!("Weak topics: {}", summary.weaknesses.join(", "));
                }
            }
        }

        Commands::Tutor {
            deck: deck_id,
            card: card_id,
            message,
        } => {
            let deck = db.require_deck(&deck_id)?;
            let card = deck
                .card(&card_id)
                .ok_or_else(|| Error::CardNotFound(card_id.clone()))?;

            let mut conversation = Conversation::default();
            let reply = conversation
                .ask(&OfflineTutor, &message, card, &deck.weak_topics())?
                .ok_or(Error::EmptyInput)?;

            if cli.json {
                print_json(&JsonOutput::ok(conversation.messages()))?;
            } else {
                println!("Tutor: {}", reply.content);
            }
        }

        Commands::History { deck } => {
            db.require_deck(&deck)?;
            let history = db.review_history(&deck)?;
            if cli.json {
                print_json(&JsonOutput::ok(&history))?;
            } else if history.is_empty() {
                println!("No reviews recorded yet.");
            } else {
                println!(
                    "{:<26} {:<22} {:<8} {:<6} {:<9} STREAK",
                    "REVIEWED", "CARD", "QUALITY", "EASE", "INTERVAL"
                );
                println!("{}", "-".repeat(80));
                for r in history {
                    println!(
                        "{:<26} {:<22} {:<8} {:<6.2} {:<9} {}",
                        truncate(&r.reviewed_at, 25),
                        truncate(&r.card_id, 20),
                        r.quality,
                        r.ease,
                        format!("{}d", r.interval),
                        r.repetitions
                    );
                }
            }
        }

        Commands::Stats => {
            let stats = db.get_stats(Utc::now())?;
            if cli.json {
                print_json(&JsonOutput::ok(&stats))?;
            } else {
                println!("=== Study Statistics ===");
                println!("Decks: {}", stats.total_decks);
                println!("Cards: {}", stats.total_cards);
                println!("Reviews: {} ({} lapses)", stats.total_reviews, stats.lapses);
                println!("Due for review: {}", stats.due_now);
                println!("Average ease: {:.2}", stats.avg_ease);
            }
        }
    }

    Ok(())
}

#[derive(Debug, Clone, Serialize)]
struct StudySummary {
    reviewed: usize,
    weaknesses: Vec<String>,
}

/// Line-driven study loop. Each card shows its question, waits for a line
/// (`? <message>` asks the tutor, `q` quits), reveals the answer, then reads a
/// rating. Stops at `q` or end of input.
fn study<R: BufRead, W: Write>(
    db: &Database,
    deck_id: &str,
    shuffle: bool,
    input: R,
    out: &mut W,
    clock: &dyn Fn() -> DateTime<Utc>,
) -> Result<StudySummary> {
    let mut deck = db.require_deck(deck_id)?;
    let mut session = if shuffle {
        StudySession::shuffled(&deck, &mut rand::thread_rng())
    } else {
        StudySession::new(&deck)
    };
    if session.is_empty() {
        return Err(Error::EmptyDeck);
    }

    let mut conversation = Conversation::default();
    let mut lines = input.lines();
    let mut reviewed = 0;

    'cards: loop {
        // Another writer may have reviewed cards since the last one.
        deck = db.require_deck(deck_id)?;
        let card = match session.current(&deck) {
            Some(card) => card.clone(),
            None => break,
        };

        writeln!(out)?;
        writeln!(
            out,
            "Card {} / {}  [{}]",
            session.position() + 1,
            session.len(),
            card.topic
        )?;
        writeln!(out, "Q: {}", card.question)?;

        loop {
            writeln!(out, "(enter: flip, ? <message>: ask the tutor, q: quit)")?;
            let Some(line) = lines.next() else { break 'cards };
            let line = line?;
            let command = line.trim();

            if command.eq_ignore_ascii_case("q") {
                break 'cards;
            }
            let Some(message) = command.strip_prefix('?') else { break };

            if !session.focus().is_empty() {
                writeln!(out, "Focusing on: {}", session.focus().join(", "))?;
            }
            match conversation.ask(&OfflineTutor, message, &card, session.weaknesses()) {
                Ok(Some(reply)) => writeln!(out, "Tutor: {}", reply.content)?,
                Ok(None) => {}
                Err(e) => writeln!(out, "Tutor unavailable: {}", e)?,
            }
        }

        writeln!(out, "A: {}", card.answer)?;
        if let Some(options) = &card.options {
            for option in options {
                let marker = if *option == card.answer { "*" } else { " " };
                writeln!(out, "  {} {}", marker, option)?;
            }
        }

        let preview = scheduler::preview(&card.review, clock())
            .iter()
            .map(|(rating, days)| format!("{} ({}d)", rating.label(), days))
            .collect::<Vec<_>>()
            .join("  ");
        writeln!(out, "{}", preview)?;

        let quality = loop {
            write!(out, "Rate [0-5 | again/hard/good/easy]: ")?;
            out.flush()?;
            let Some(line) = lines.next() else { break 'cards };
            let line = line?;
            if line.trim().eq_ignore_ascii_case("q") {
                break 'cards;
            }
            match line.parse::<Quality>() {
                Ok(quality) => break quality,
                Err(e) => writeln!(out, "{}", e)?,
            }
        };

        let now = clock();
        let state = db.record_review(deck_id, &card.id, quality, now)?;
        let rated = session.rate(&mut deck, quality, state)?;
        reviewed += 1;

        writeln!(out, "Next review in {} day(s).", rated.state.interval)?;
        if rated.advance == Advance::Complete {
            writeln!(out, "Session complete!")?;
        }
    }

    Ok(StudySummary {
        reviewed,
        weaknesses: session.weaknesses().to_vec(),
    })
}

fn print_question(card: &Card) {
    println!("Card: {} [{}]", card.id, card.topic);
    println!("Q: {}", card.question);
    if let Some(options) = &card.options {
        for (i, option) in options.iter().enumerate() {
            println!("  {}. {}", i + 1, option);
        }
    }
}

fn format_next_review(next: Option<DateTime<Utc>>) -> String {
    match next {
        Some(at) => at.format("%Y-%m-%d %H:%M UTC").to_string(),
        None => String::from("-"),
    }
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let head: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", head)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    mod truncate_tests {
        use super::*;

        #[test]
        fn truncate_short_string() {
            assert_eq!(truncate("hello", 10), "hello");
        }

        #[test]
        fn truncate_exact_length() {
            assert_eq!(truncate("hello", 5), "hello");
        }

        #[test]
        fn truncate_long_string() {
            assert_eq!(truncate("hello world", 8), "hello...");
        }

        #[test]
        fn truncate_multibyte() {
            assert_eq!(truncate("Zellbiologie für Anfänger", 10), "Zellbio...");
        }
    }

    mod format_tests {
        use super::*;
        use chrono::TimeZone;

        #[test]
        fn next_review_formats_date() {
            let at = Utc.with_ymd_and_hms(2024, 7, 4, 9, 5, 0).unwrap();
            assert_eq!(format_next_review(Some(at)), "2024-07-04 09:05 UTC");
            assert_eq!(format_next_review(None), "-");
        }
    }

    mod cli_parsing_tests {
        use super::*;

        #[test]
        fn parse_init_with_json() {
            let cli = Cli::try_parse_from(["studybuddy", "--json", "init"]).unwrap();
            assert!(cli.json);
            assert!(matches!(cli.command, Commands::Init));
        }

        #[test]
        fn parse_generate_defaults_to_text() {
            let cli = Cli::try_parse_from(["studybuddy", "generate", "my notes"]).unwrap();
            match cli.command {
                Commands::Generate { input, input_type } => {
                    assert_eq!(input, "my notes");
                    assert_eq!(input_type, "text");
                }
                _ => panic!("Expected Generate command"),
            }
        }

        #[test]
        fn parse_generate_with_type() {
            let cli = Cli::try_parse_from([
                "studybuddy",
                "generate",
                "https://youtu.be/x",
                "--type",
                "youtube",
            ])
            .unwrap();
            match cli.command {
                Commands::Generate { input_type, .. } => assert_eq!(input_type, "youtube"),
                _ => panic!("Expected Generate command"),
            }
        }

        #[test]
        fn parse_deck_show() {
            let cli = Cli::try_parse_from(["studybuddy", "deck", "show", "1700000000000"]).unwrap();
            match cli.command {
                Commands::Deck(DeckCommands::Show { id }) => assert_eq!(id, "1700000000000"),
                _ => panic!("Expected Deck Show command"),
            }
        }

        #[test]
        fn parse_review_short_flags() {
            let cli =
                Cli::try_parse_from(["studybuddy", "review", "17", "c_1_2", "-q", "good"]).unwrap();
            match cli.command {
                Commands::Review {
                    deck,
                    card,
                    quality,
                } => {
                    assert_eq!(deck, "17");
                    assert_eq!(card, "c_1_2");
                    assert_eq!(quality, "good");
                }
                _ => panic!("Expected Review command"),
            }
        }

        #[test]
        fn parse_study_shuffle() {
            let cli = Cli::try_parse_from(["studybuddy", "study", "17", "--shuffle"]).unwrap();
            match cli.command {
                Commands::Study { deck, shuffle } => {
                    assert_eq!(deck, "17");
                    assert!(shuffle);
                }
                _ => panic!("Expected Study command"),
            }
        }

        #[test]
        fn parse_missing_required_arg_fails() {
            assert!(Cli::try_parse_from(["studybuddy", "generate"]).is_err());
            assert!(Cli::try_parse_from(["studybuddy", "review", "17", "c_1"]).is_err());
            assert!(Cli::try_parse_from(["studybuddy", "tutor", "17", "c_1"]).is_err());
        }

        #[test]
        fn parse_invalid_command_fails() {
            assert!(Cli::try_parse_from(["studybuddy", "flip"]).is_err());
        }
    }

    mod study_tests {
        use super::*;
        use chrono::{Duration, TimeZone};
        use std::io::Cursor;

        fn now() -> DateTime<Utc> {
            Utc.with_ymd_and_hms(2024, 9, 1, 7, 0, 0).unwrap()
        }

        fn setup() -> (Database, String) {
            let db = Database::open(":memory:").unwrap();
            db.init().unwrap();
            let request = GenerateRequest::new("notes", InputType::Text).unwrap();
            let deck = MockGenerator.generate(&request, now()).unwrap().deck.unwrap();
            let id = db.insert_deck(&deck, InputType::Text, now()).unwrap();
            (db, id)
        }

        fn run_study(db: &Database, id: &str, script: &str) -> (StudySummary, String) {
            let mut out = Vec::new();
            let summary = study(db, id, false, Cursor::new(script), &mut out, &now).unwrap();
            (summary, String::from_utf8(out).unwrap())
        }

        #[test]
        fn rates_cards_and_persists() {
            let (db, id) = setup();
            let (summary, out) = run_study(&db, &id, "\n4\n\nagain\nq\n");

            assert_eq!(summary.reviewed, 2);
            assert_eq!(summary.weaknesses, vec!["Cell Biology"]);
            assert!(out.contains("Q: What is the primary function of the Mitochondria?"));
            assert!(out.contains("  * Glycolysis"));

            let deck = db.get_deck(&id).unwrap().unwrap();
            let cards: Vec<_> = deck.cards().collect();
            assert_eq!(cards[0].review.repetitions, 1);
            assert_eq!(cards[0].review.next_review, Some(now() + Duration::days(1)));
            assert_eq!(cards[1].review.repetitions, 0);
            assert!(cards[1].review.next_review.is_some());
            assert_eq!(db.review_history(&id).unwrap().len(), 2);
        }

        #[test]
        fn invalid_rating_reprompts() {
            let (db, id) = setup();
            let (summary, out) = run_study(&db, &id, "\n9\ngood\n");

            assert_eq!(summary.reviewed, 1);
            assert!(out.contains("Invalid quality '9'"));
        }

        #[test]
        fn tutor_question_answered_before_flip() {
            let (db, id) = setup();
            let (summary, out) = run_study(&db, &id, "? what is the answer\n");

            assert_eq!(summary.reviewed, 0);
            assert!(out.contains("Tutor: The answer is: The powerhouse of the cell"));
        }

        #[test]
        fn full_pass_reports_completion() {
            let (db, id) = setup();
            let (summary, out) = run_study(&db, &id, "\n5\n\n5\n\n5\n");

            assert_eq!(summary.reviewed, 3);
            assert!(out.contains("Session complete!"));
            assert!(out.contains("Card 1 / 3"));
        }

        #[test]
        fn keeps_reviews_written_by_another_handle() {
            let dir = tempfile::TempDir::new().unwrap();
            let path = dir.path().join("studybuddy.db");
            let db = Database::open(&path).unwrap();
            db.init().unwrap();
            let request = GenerateRequest::new("notes", InputType::Text).unwrap();
            let deck = MockGenerator.generate(&request, now()).unwrap().deck.unwrap();
            let id = db.insert_deck(&deck, InputType::Text, now()).unwrap();
            let last_id = deck.cards().last().unwrap().id.clone();

            // The other shell reviews the last card while this session is on the first.
            let other = Database::open(&path).unwrap();
            let written = std::cell::Cell::new(false);
            let clock = || {
                if !written.replace(true) {
                    other
                        .record_review(&id, &last_id, Quality::new(5).unwrap(), now())
                        .unwrap();
                }
                now()
            };

            let mut out = Vec::new();
            let script = Cursor::new("\n4\nq\n");
            let summary = study(&db, &id, false, script, &mut out, &clock).unwrap();
            assert_eq!(summary.reviewed, 1);

            let stored = db.require_deck(&id).unwrap();
            let cards: Vec<_> = stored.cards().collect();
            assert_eq!(cards[0].review.repetitions, 1);
            assert_eq!(stored.card(&last_id).unwrap().review.repetitions, 1);
            assert_eq!(db.review_history(&id).unwrap().len(), 2);
        }

        #[test]
        fn unknown_deck_fails() {
            let (db, _) = setup();
            let mut out = Vec::new();
            let result = study(&db, "missing", false, Cursor::new(""), &mut out, &now);
            assert!(matches!(result, Err(Error::DeckNotFound(_))));
        }
    }
}
