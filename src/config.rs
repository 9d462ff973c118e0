use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use chrono::Duration as ChronoDuration;

use crate::models::ScoringTable;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be set in the environment or .env file")]
    Missing(&'static str),
    #[error("{key} has an invalid value: {value:?}")]
    Invalid { key: &'static str, value: String },
}

#[derive(Clone, Debug)]
pub struct Settings {
    pub discord_token: String,
    pub database_url: String,
    pub command_prefix: String,
    pub owner_id: Option<u64>,
    pub wiki_url: String,
    pub wiki_api_endpoint: String,
    pub wiki_page_size: usize,
    pub wiki_timeout: Duration,
    pub reconcile_interval: Duration,
    pub lookahead: ChronoDuration,
    pub close_buffer: ChronoDuration,
    pub reaction_fetch_concurrency: usize,
    pub dialog_ttl: Duration,
    pub default_scoring: ScoringTable,
    pub log_dir: Option<PathBuf>,
}

/// Reads a variable, treating blank values as unset.
pub fn env_default(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

struct Lookup<F>(F);

impl<F: Fn(&str) -> Option<String>> Lookup<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
            .map(|value| value.trim().to_string())
            .filter(|value| !value.is_empty())
    }

    fn required(&self, key: &'static str) -> Result<String, ConfigError> {
        self.get(key).ok_or(ConfigError::Missing(key))
    }

    fn parsed<T: FromStr>(&self, key: &'static str, default: T) -> Result<T, ConfigError> {
        match self.get(key) {
            None => Ok(default),
            Some(value) => value.parse().map_err(|_| ConfigError::Invalid { key, value }),
        }
    }

    fn parsed_opt<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        match self.get(key) {
            None => Ok(None),
            Some(value) => value
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::Invalid { key, value }),
        }
    }
}

impl Settings {
    pub fn from_env() -> Result<Settings, ConfigError> {
        Settings::from_lookup(env_default)
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Settings, ConfigError> {
        let env = Lookup(lookup);
        let defaults = ScoringTable::default();

        let mut wiki_url = env
            .get("WIKI_URL")
            .unwrap_or_else(|| "https://lol.fandom.com/wiki/".to_string());
        if !wiki_url.ends_with('/') {
            wiki_url.push('/');
        }

        Ok(Settings {
            discord_token: env.required("DISCORD_TOKEN")?,
            database_url: env.required("DATABASE_URL")?,
            command_prefix: env.get("COMMAND_PREFIX").unwrap_or_else(|| "+".to_string()),
            owner_id: env.parsed_opt("OWNER_ID")?,
            wiki_url,
            wiki_api_endpoint: env
                .get("WIKI_API_ENDPOINT")
                .unwrap_or_else(|| "https://lol.fandom.com/api.php".to_string()),
            wiki_page_size: env.parsed("WIKI_PAGE_SIZE", 500)?,
            wiki_timeout: Duration::from_secs(env.parsed("WIKI_TIMEOUT_SECS", 30)?),
            reconcile_interval: Duration::from_secs(env.parsed("RECONCILE_INTERVAL_SECS", 300)?),
            lookahead: ChronoDuration::days(env.parsed("RECONCILE_LOOKAHEAD_DAYS", 4)?),
            close_buffer: ChronoDuration::minutes(env.parsed("CLOSE_BUFFER_MINUTES", 30)?),
            reaction_fetch_concurrency: env.parsed("REACTION_FETCH_CONCURRENCY", 4usize)?.max(1),
            dialog_ttl: Duration::from_secs(env.parsed("DIALOG_TTL_SECS", 86_400)?),
            default_scoring: ScoringTable {
                bo1_team: env.parsed("SCORE_BO1_TEAM", defaults.bo1_team)?,
                bo3_team: env.parsed("SCORE_BO3_TEAM", defaults.bo3_team)?,
                bo3_games: env.parsed("SCORE_BO3_GAMES", defaults.bo3_games)?,
                bo5_team: env.parsed("SCORE_BO5_TEAM", defaults.bo5_team)?,
                bo5_games: env.parsed("SCORE_BO5_GAMES", defaults.bo5_games)?,
            },
            log_dir: env.get("LOG_DIR").map(PathBuf::from),
        })
    }
}
