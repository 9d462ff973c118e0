use std::fmt;
use std::ops::RangeInclusive;

use uuid::Uuid;

use crate::emoji::{Emoji, GAMES_SYMBOLS};
use crate::error::Error;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BestOf {
    One,
    Three,
    Five,
}

impl BestOf {
    pub fn new(value: i64) -> Result<BestOf, Error> {
        match value {
            1 => Ok(BestOf::One),
            3 => Ok(BestOf::Three),
            5 => Ok(BestOf::Five),
            other => Err(Error::InvalidBestOf(other)),
        }
    }

    pub fn count(self) -> i16 {
        match self {
            BestOf::One => 1,
            BestOf::Three => 3,
            BestOf::Five => 5,
        }
    }

    /// Games needed to win the series, `ceil(best_of / 2)`.
    pub fn win_games(self) -> i16 {
        (self.count() + 1) / 2
    }

    pub fn valid_games(self) -> RangeInclusive<i16> {
        self.win_games()..=self.count()
    }

    pub fn check_games(self, games: i16) -> Result<(), Error> {
        if self.valid_games().contains(&games) {
            Ok(())
        } else {
            Err(Error::InvalidGameCount {
                best_of: self.count(),
                games,
            })
        }
    }

    /// The games reactions offered for this format, as `(games, symbol)`.
    ///
    /// Keycap indices `floor(n/2)..n` map to game counts `ceil(n/2)..=n`. A best of 1
    /// has no games choice at all.
    pub fn games_choices(self) -> Vec<(i16, Emoji)> {
        if self == BestOf::One {
            return Vec::new();
        }
        let n = self.count() as usize;
        (n / 2..n)
            .map(|index| {
                let games = (index - n / 2) as i16 + self.win_games();
                (games, Emoji::unicode(GAMES_SYMBOLS[index]))
            })
            .collect()
    }
}

impl fmt::Display for BestOf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BO{}", self.count())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MatchStatus {
    Open,
    Closed,
    Ended,
}

impl MatchStatus {
    pub fn code(self) -> i16 {
        match self {
            MatchStatus::Ended => 0,
            MatchStatus::Open => 1,
            MatchStatus::Closed => 2,
        }
    }

    pub fn from_code(code: i16) -> Option<MatchStatus> {
        match code {
            0 => Some(MatchStatus::Ended),
            1 => Some(MatchStatus::Open),
            2 => Some(MatchStatus::Closed),
            _ => None,
        }
    }
}

impl fmt::Display for MatchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MatchStatus::Open => "open",
            MatchStatus::Closed => "closed",
            MatchStatus::Ended => "ended",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum TournamentStatus {
    Running,
    Ended,
}

impl TournamentStatus {
    pub fn code(self) -> i16 {
        match self {
            TournamentStatus::Ended => 0,
            TournamentStatus::Running => 1,
        }
    }

    pub fn from_code(code: i16) -> Option<TournamentStatus> {
        match code {
            0 => Some(TournamentStatus::Ended),
            1 => Some(TournamentStatus::Running),
            _ => None,
        }
    }
}

/// Points per correct prediction, keyed by series format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ScoringTable {
    pub bo1_team: i16,
    pub bo3_team: i16,
    pub bo3_games: i16,
    pub bo5_team: i16,
    pub bo5_games: i16,
}

impl Default for ScoringTable {
    fn default() -> ScoringTable {
        ScoringTable {
            bo1_team: 1,
            bo3_team: 2,
            bo3_games: 1,
            bo5_team: 3,
            bo5_games: 1,
        }
    }
}

impl ScoringTable {
    pub fn team_points(&self, best_of: BestOf) -> i16 {
        match best_of {
            BestOf::One => self.bo1_team,
            BestOf::Three => self.bo3_team,
            BestOf::Five => self.bo5_team,
        }
    }

    /// `None` for a best of 1, which never awards games points.
    pub fn games_points(&self, best_of: BestOf) -> Option<i16> {
        match best_of {
            BestOf::One => None,
            BestOf::Three => Some(self.bo3_games),
            BestOf::Five => Some(self.bo5_games),
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Team {
    pub id: Uuid,
    pub name: String,
    pub code: String,
    pub emoji: Emoji,
    pub guild_id: u64,
    pub external_page: Option<String>,
    pub bot_created: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tournament {
    pub id: Uuid,
    pub name: String,
    pub channel_id: u64,
    pub guild_id: u64,
    pub message_id: u64,
    pub status: TournamentStatus,
    pub external_page: Option<String>,
    pub updates_channel_id: Option<u64>,
    pub scoring: ScoringTable,
}

impl Tournament {
    pub fn is_running(&self) -> bool {
        self.status == TournamentStatus::Running
    }
}

/// Where a match came from in the external schedule.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExternalMatchRef {
    pub match_id: String,
    pub tab: String,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Match {
    pub id: Uuid,
    pub sequence: i32,
    pub name: String,
    pub message_id: u64,
    pub status: MatchStatus,
    pub best_of: BestOf,
    pub team1_id: Uuid,
    pub team2_id: Uuid,
    pub tournament_id: Uuid,
    /// 0 until ended, then 1 or 2.
    pub result: i16,
    pub games_played: i16,
    pub external: Option<ExternalMatchRef>,
}

impl Match {
    pub fn win_games(&self) -> i16 {
        self.best_of.win_games()
    }

    /// Only meaningful once the match has ended.
    pub fn lose_games(&self) -> i16 {
        self.games_played - self.win_games()
    }

    pub fn tab(&self) -> Option<&str> {
        self.external.as_ref().map(|e| e.tab.as_str())
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct User {
    pub id: Uuid,
    pub discord_id: u64,
    pub name: String,
}

/// One user's guess for one match. 0 means no choice on that dimension.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Prediction {
    pub user_id: Uuid,
    pub match_id: Uuid,
    pub team: i16,
    pub games: i16,
}

/// Which ended matches feed a leaderboard.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MatchFilter {
    All,
    Tabs(Vec<String>),
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MatchCounts {
    pub open: i64,
    pub closed: i64,
    pub ended: i64,
}
