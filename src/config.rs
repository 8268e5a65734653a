use std::path::PathBuf;

const DEFAULT_DB_NAME: &str = "studybuddy.db";
const DEFAULT_LOG_FILTER: &str = "warn";

pub const DB_ENV: &str = "STUDYBUDDY_DB";
pub const LOG_ENV: &str = "STUDYBUDDY_LOG";

#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: PathBuf,
    pub log_filter: String,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            db_path: db_path(),
            log_filter: std::env::var(LOG_ENV).unwrap_or_else(|_| DEFAULT_LOG_FILTER.to_string()),
        }
    }
}

fn db_path() -> PathBuf {
    if let Ok(path) = std::env::var(DB_ENV) {
        return PathBuf::from(path);
    }

    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("studybuddy");

    std::fs::create_dir_all(&config_dir).ok();
    config_dir.join(DEFAULT_DB_NAME)
}
