//! Persistence for teams, tournaments, matches, users and predictions.
//!
//! Postgres is the single source of truth. Status changes go through
//! compare-and-swap methods so a command and the reconciliation loop racing
//! on the same match cannot both apply a transition.

use uuid::Uuid;

use crate::models::{
    BestOf, Match, MatchCounts, MatchFilter, Prediction, Team, Tournament, TournamentStatus, User,
};

pub mod pg;

pub use pg::PgStore;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// A uniqueness constraint rejected the write.
    #[error("{0} already exists")]
    Conflict(String),
    #[error("Database connection unavailable: {0}")]
    Pool(String),
    #[error("Database error: {0}")]
    Query(String),
    #[error("Corrupt row in {table}: {detail}")]
    Corrupt { table: &'static str, detail: String },
}

/// A prediction on an ended match, joined with what the scoring needs.
#[derive(Clone, Debug, PartialEq)]
pub struct ScoredPrediction {
    pub user: User,
    pub best_of: BestOf,
    pub result: i16,
    pub games_played: i16,
    pub team: i16,
    pub games: i16,
}

pub trait Store: Send + Sync {
    fn insert_team(&self, team: &Team) -> Result<(), StoreError>;
    fn update_team(&self, team: &Team) -> Result<(), StoreError>;
    fn delete_team(&self, team_id: Uuid) -> Result<(), StoreError>;
    fn team(&self, team_id: Uuid) -> Result<Option<Team>, StoreError>;
    fn team_by_code(&self, guild_id: u64, code: &str) -> Result<Option<Team>, StoreError>;
    fn teams_in_guild(&self, guild_id: u64) -> Result<Vec<Team>, StoreError>;

    fn insert_tournament(&self, tournament: &Tournament) -> Result<(), StoreError>;
    fn tournament(&self, id: Uuid) -> Result<Option<Tournament>, StoreError>;
    fn tournament_by_name(&self, guild_id: u64, name: &str) -> Result<Option<Tournament>, StoreError>;
    fn running_tournament_in_channel(&self, channel_id: u64) -> Result<Option<Tournament>, StoreError>;
    fn tournaments_in_guild(&self, guild_id: u64) -> Result<Vec<Tournament>, StoreError>;
    /// Running tournaments bound to an external schedule page.
    fn running_external_tournaments(&self) -> Result<Vec<Tournament>, StoreError>;
    /// Returns false when the tournament was not in `from`.
    fn transition_tournament(
        &self,
        id: Uuid,
        from: TournamentStatus,
        to: TournamentStatus,
    ) -> Result<bool, StoreError>;
    fn set_updates_channel(&self, id: Uuid, channel_id: Option<u64>) -> Result<(), StoreError>;

    fn max_match_sequence(&self, tournament_id: Uuid) -> Result<Option<i32>, StoreError>;
    fn insert_match(&self, m: &Match) -> Result<(), StoreError>;
    fn match_by_id(&self, id: Uuid) -> Result<Option<Match>, StoreError>;
    fn match_by_message(&self, message_id: u64) -> Result<Option<Match>, StoreError>;
    /// Ordered by sequence number.
    fn matches_in_tournament(&self, tournament_id: Uuid) -> Result<Vec<Match>, StoreError>;
    fn matches_with_team(&self, team_id: Uuid) -> Result<Vec<Match>, StoreError>;
    fn count_matches(&self, tournament_id: Uuid) -> Result<MatchCounts, StoreError>;
    /// OPEN to CLOSED plus the prediction upserts, atomically. False when not OPEN.
    fn close_match(&self, match_id: Uuid, predictions: &[Prediction]) -> Result<bool, StoreError>;
    /// CLOSED to ENDED with the result. False when not CLOSED.
    fn end_match(&self, match_id: Uuid, result: i16, games_played: i16) -> Result<bool, StoreError>;

    fn users_by_discord_ids(&self, discord_ids: &[u64]) -> Result<Vec<User>, StoreError>;
    /// Creates the user or refreshes the stored name.
    fn upsert_user(&self, discord_id: u64, name: &str) -> Result<User, StoreError>;
    fn predictions_for_match(&self, match_id: Uuid) -> Result<Vec<(User, Prediction)>, StoreError>;
    /// Predictions on ENDED matches of the tournament that pass `filter`.
    fn scored_predictions(
        &self,
        tournament_id: Uuid,
        filter: &MatchFilter,
    ) -> Result<Vec<ScoredPrediction>, StoreError>;
}
