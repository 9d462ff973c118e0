use crate::gateway::GatewayError;
use crate::leaguepedia::WikiError;
use crate::models::MatchStatus;
use crate::store::StoreError;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Everything a command or a state transition can fail with.
///
/// The `Display` text is what gets shown in chat, so it is written for users.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    // Validation
    #[error("{0} is not a valid value for the 'best of' field.")]
    InvalidBestOf(i64),
    #[error("{games} is not a valid amount of games for a best of {best_of}.")]
    InvalidGameCount { best_of: i16, games: i16 },
    #[error("Team {0} is not one of the teams in this match.")]
    InvalidWinner(i16),
    #[error("There is no team with code {0}")]
    UnknownTeam(String),
    #[error("There is already a team with code {0}")]
    TeamExists(String),
    #[error("Team codes cannot contain spaces: {0}")]
    InvalidCode(String),
    #[error("{0} is not an emoji from this server or a default emoji.")]
    InvalidEmoji(String),
    #[error("Could not edit team {code} ({reason})")]
    CantEditTeam { code: String, reason: &'static str },
    #[error("Could not delete team {0} (It is still used in matches.)")]
    TeamInUse(String),
    #[error("Usage: {0}")]
    Usage(&'static str),
    /// An end-match dialog was confirmed without exactly one choice per kind.
    #[error("{0}")]
    DialogSelection(&'static str),

    // Preconditions
    #[error("There is already a running tournament in this channel: {0}. You can only have one running tournament per channel.")]
    TournamentAlreadyRunning(String),
    #[error("There is no running tournament in this channel.")]
    NoRunningTournament,
    #[error("Could not find tournament (There is no tournament with the name {0} in this server.)")]
    TournamentNotFound(String),
    #[error("Tournament {0} is not running.")]
    TournamentNotRunning(String),
    #[error("Could not end tournament {0} (There are still open matches.)")]
    TournamentHasOpenMatches(String),
    #[error("Could not end tournament {0} (There are still closed matches.)")]
    TournamentHasClosedMatches(String),
    #[error("Match {0} does not exist.")]
    MatchNotFound(i32),
    #[error("A match called {0} already exists in this tournament.")]
    MatchAlreadyExists(String),
    #[error("Could not close match {sequence} (It is {status}.)")]
    CantCloseMatch { sequence: i32, status: MatchStatus },
    #[error("Could not end match {sequence} (It is {status}.)")]
    CantEndMatch { sequence: i32, status: MatchStatus },
    #[error("You do not have permission to do that.")]
    NotPermitted,

    // External tournament links
    #[error("That is not a Leaguepedia link.")]
    NotAWikiLink,
    #[error("This page doesn't exist.")]
    PageDoesNotExist,
    #[error("This is not a regular page.")]
    NotARegularPage,
    #[error("This is not a tournament overview page.")]
    NotAnOverviewPage,
    #[error("There was an error while creating the teams participating in this tournament. Perhaps the bot doesn't have permission to create new emoji or there aren't any emote slots left.")]
    TeamSyncFailed,

    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Chat(#[from] GatewayError),
    #[error(transparent)]
    Wiki(#[from] WikiError),
}

impl Error {
    /// True for errors caused by the caller's input rather than by state or collaborators.
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::InvalidBestOf(_)
                | Error::InvalidGameCount { .. }
                | Error::InvalidWinner(_)
                | Error::UnknownTeam(_)
                | Error::TeamExists(_)
                | Error::InvalidCode(_)
                | Error::InvalidEmoji(_)
                | Error::CantEditTeam { .. }
                | Error::Usage(_)
                | Error::DialogSelection(_)
        )
    }
}
