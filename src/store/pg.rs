use std::convert::TryFrom;

use diesel::pg::upsert::excluded;
use diesel::prelude::*;
use diesel::r2d2::{ConnectionManager, PooledConnection};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use tracing::info;
use uuid::Uuid;

use super::{ScoredPrediction, Store, StoreError};
use crate::emoji::Emoji;
use crate::models::{
    BestOf, ExternalMatchRef, Match, MatchCounts, MatchFilter, MatchStatus, Prediction,
    ScoringTable, Team, Tournament, TournamentStatus, User,
};
use crate::schema::{matches, predictions, teams, tournaments, users};

pub type Pool = diesel::r2d2::Pool<ConnectionManager<PgConnection>>;
type Connection = PooledConnection<ConnectionManager<PgConnection>>;

impl From<DieselError> for StoreError {
    fn from(err: DieselError) -> StoreError {
        match err {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                StoreError::Conflict(
                    info.constraint_name()
                        .unwrap_or_else(|| info.message())
                        .to_string(),
                )
            }
            other => StoreError::Query(other.to_string()),
        }
    }
}

#[derive(Queryable, Insertable, AsChangeset)]
#[table_name = "teams"]
#[changeset_options(treat_none_as_null = "true")]
struct TeamRow {
    id: Uuid,
    name: String,
    code: String,
    emoji: String,
    guild_id: i64,
    external_page: Option<String>,
    bot_created: bool,
}

impl From<&Team> for TeamRow {
    fn from(team: &Team) -> TeamRow {
        TeamRow {
            id: team.id,
            name: team.name.clone(),
            code: team.code.clone(),
            emoji: team.emoji.to_string(),
            guild_id: team.guild_id as i64,
            external_page: team.external_page.clone(),
            bot_created: team.bot_created,
        }
    }
}

impl TryFrom<TeamRow> for Team {
    type Error = StoreError;

    fn try_from(row: TeamRow) -> Result<Team, StoreError> {
        let emoji = Emoji::parse(&row.emoji).ok_or_else(|| StoreError::Corrupt {
            table: "teams",
            detail: format!("unparseable emoji {:?}", row.emoji),
        })?;
        Ok(Team {
            id: row.id,
            name: row.name,
            code: row.code,
            emoji,
            guild_id: row.guild_id as u64,
            external_page: row.external_page,
            bot_created: row.bot_created,
        })
    }
}

#[derive(Queryable, Insertable)]
#[table_name = "tournaments"]
struct TournamentRow {
    id: Uuid,
    name: String,
    channel_id: i64,
    guild_id: i64,
    message_id: i64,
    status: i16,
    external_page: Option<String>,
    updates_channel_id: Option<i64>,
    score_bo1_team: i16,
    score_bo3_team: i16,
    score_bo3_games: i16,
    score_bo5_team: i16,
    score_bo5_games: i16,
}

impl From<&Tournament> for TournamentRow {
    fn from(t: &Tournament) -> TournamentRow {
        TournamentRow {
            id: t.id,
            name: t.name.clone(),
            channel_id: t.channel_id as i64,
            guild_id: t.guild_id as i64,
            message_id: t.message_id as i64,
            status: t.status.code(),
            external_page: t.external_page.clone(),
            updates_channel_id: t.updates_channel_id.map(|c| c as i64),
            score_bo1_team: t.scoring.bo1_team,
            score_bo3_team: t.scoring.bo3_team,
            score_bo3_games: t.scoring.bo3_games,
            score_bo5_team: t.scoring.bo5_team,
            score_bo5_games: t.scoring.bo5_games,
        }
    }
}

impl TryFrom<TournamentRow> for Tournament {
    type Error = StoreError;

    fn try_from(row: TournamentRow) -> Result<Tournament, StoreError> {
        let status = TournamentStatus::from_code(row.status).ok_or_else(|| StoreError::Corrupt {
            table: "tournaments",
            detail: format!("unknown status {}", row.status),
        })?;
        Ok(Tournament {
            id: row.id,
            name: row.name,
            channel_id: row.channel_id as u64,
            guild_id: row.guild_id as u64,
            message_id: row.message_id as u64,
            status,
            external_page: row.external_page,
            updates_channel_id: row.updates_channel_id.map(|c| c as u64),
            scoring: ScoringTable {
                bo1_team: row.score_bo1_team,
                bo3_team: row.score_bo3_team,
                bo3_games: row.score_bo3_games,
                bo5_team: row.score_bo5_team,
                bo5_games: row.score_bo5_games,
            },
        })
    }
}

#[derive(Queryable, Insertable)]
#[table_name = "matches"]
struct MatchRow {
    id: Uuid,
    sequence: i32,
    name: String,
    message_id: i64,
    status: i16,
    best_of: i16,
    team1_id: Uuid,
    team2_id: Uuid,
    tournament_id: Uuid,
    result: i16,
    games_played: i16,
    external_match_id: Option<String>,
    external_tab: Option<String>,
}

impl From<&Match> for MatchRow {
    fn from(m: &Match) -> MatchRow {
        MatchRow {
            id: m.id,
            sequence: m.sequence,
            name: m.name.clone(),
            message_id: m.message_id as i64,
            status: m.status.code(),
            best_of: m.best_of.count(),
            team1_id: m.team1_id,
            team2_id: m.team2_id,
            tournament_id: m.tournament_id,
            result: m.result,
            games_played: m.games_played,
            external_match_id: m.external.as_ref().map(|e| e.match_id.clone()),
            external_tab: m.external.as_ref().map(|e| e.tab.clone()),
        }
    }
}

fn best_of_column(table: &'static str, value: i16) -> Result<BestOf, StoreError> {
    BestOf::new(i64::from(value)).map_err(|_| StoreError::Corrupt {
        table,
        detail: format!("best of {}", value),
    })
}

impl TryFrom<MatchRow> for Match {
    type Error = StoreError;

    fn try_from(row: MatchRow) -> Result<Match, StoreError> {
        let status = MatchStatus::from_code(row.status).ok_or_else(|| StoreError::Corrupt {
            table: "matches",
            detail: format!("unknown status {}", row.status),
        })?;
        let external = match (row.external_match_id, row.external_tab) {
            (Some(match_id), Some(tab)) => Some(ExternalMatchRef { match_id, tab }),
            _ => None,
        };
        Ok(Match {
            id: row.id,
            sequence: row.sequence,
            name: row.name,
            message_id: row.message_id as u64,
            status,
            best_of: best_of_column("matches", row.best_of)?,
            team1_id: row.team1_id,
            team2_id: row.team2_id,
            tournament_id: row.tournament_id,
            result: row.result,
            games_played: row.games_played,
            external,
        })
    }
}

#[derive(Queryable)]
struct UserRow {
    id: Uuid,
    discord_id: i64,
    name: String,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> User {
        User {
            id: row.id,
            discord_id: row.discord_id as u64,
            name: row.name,
        }
    }
}

#[derive(Insertable)]
#[table_name = "users"]
struct NewUser<'a> {
    id: Uuid,
    discord_id: i64,
    name: &'a str,
}

#[derive(Queryable, Insertable)]
#[table_name = "predictions"]
struct PredictionRow {
    id: Uuid,
    user_id: Uuid,
    match_id: Uuid,
    team: i16,
    games: i16,
}

impl From<PredictionRow> for Prediction {
    fn from(row: PredictionRow) -> Prediction {
        Prediction {
            user_id: row.user_id,
            match_id: row.match_id,
            team: row.team,
            games: row.games,
        }
    }
}

fn collect_rows<R, T>(rows: Vec<R>) -> Result<Vec<T>, StoreError>
where
    T: TryFrom<R, Error = StoreError>,
{
    rows.into_iter().map(T::try_from).collect()
}

/// Postgres store backed by an r2d2 connection pool.
pub struct PgStore {
    pool: Pool,
}

impl PgStore {
    pub fn connect(database_url: &str, max_connections: u32) -> Result<PgStore, StoreError> {
        let pool = Pool::builder()
            .max_size(max_connections)
            .build(ConnectionManager::new(database_url))
            .map_err(|e| StoreError::Pool(e.to_string()))?;
        info!("Connected to the database.");
        Ok(PgStore { pool })
    }

    fn conn(&self) -> Result<Connection, StoreError> {
        self.pool.get().map_err(|e| StoreError::Pool(e.to_string()))
    }
}

impl Store for PgStore {
    fn insert_team(&self, team: &Team) -> Result<(), StoreError> {
        diesel::insert_into(teams::table)
            .values(&TeamRow::from(team))
            .execute(&self.conn()?)?;
        Ok(())
    }

    fn update_team(&self, team: &Team) -> Result<(), StoreError> {
        diesel::update(teams::table.find(team.id))
            .set(&TeamRow::from(team))
            .execute(&self.conn()?)?;
        Ok(())
    }

    fn delete_team(&self, team_id: Uuid) -> Result<(), StoreError> {
        diesel::delete(teams::table.find(team_id)).execute(&self.conn()?)?;
        Ok(())
    }

    fn team(&self, team_id: Uuid) -> Result<Option<Team>, StoreError> {
        let row = teams::table
            .find(team_id)
            .first::<TeamRow>(&self.conn()?)
            .optional()?;
        row.map(Team::try_from).transpose()
    }

    fn team_by_code(&self, guild_id: u64, code: &str) -> Result<Option<Team>, StoreError> {
        let row = teams::table
            .filter(teams::guild_id.eq(guild_id as i64))
            .filter(teams::code.eq(code))
            .first::<TeamRow>(&self.conn()?)
            .optional()?;
        row.map(Team::try_from).transpose()
    }

    fn teams_in_guild(&self, guild_id: u64) -> Result<Vec<Team>, StoreError> {
        let rows = teams::table
            .filter(teams::guild_id.eq(guild_id as i64))
            .order(teams::name.asc())
            .load::<TeamRow>(&self.conn()?)?;
        collect_rows(rows)
    }

    fn insert_tournament(&self, tournament: &Tournament) -> Result<(), StoreError> {
        diesel::insert_into(tournaments::table)
            .values(&TournamentRow::from(tournament))
            .execute(&self.conn()?)?;
        Ok(())
    }

    fn tournament(&self, id: Uuid) -> Result<Option<Tournament>, StoreError> {
        let row = tournaments::table
            .find(id)
            .first::<TournamentRow>(&self.conn()?)
            .optional()?;
        row.map(Tournament::try_from).transpose()
    }

    fn tournament_by_name(&self, guild_id: u64, name: &str) -> Result<Option<Tournament>, StoreError> {
        let row = tournaments::table
            .filter(tournaments::guild_id.eq(guild_id as i64))
            .filter(tournaments::name.eq(name))
            .first::<TournamentRow>(&self.conn()?)
            .optional()?;
        row.map(Tournament::try_from).transpose()
    }

    fn running_tournament_in_channel(&self, channel_id: u64) -> Result<Option<Tournament>, StoreError> {
        let row = tournaments::table
            .filter(tournaments::channel_id.eq(channel_id as i64))
            .filter(tournaments::status.eq(TournamentStatus::Running.code()))
            .first::<TournamentRow>(&self.conn()?)
            .optional()?;
        row.map(Tournament::try_from).transpose()
    }

    fn tournaments_in_guild(&self, guild_id: u64) -> Result<Vec<Tournament>, StoreError> {
        let rows = tournaments::table
            .filter(tournaments::guild_id.eq(guild_id as i64))
            .order(tournaments::name.asc())
            .load::<TournamentRow>(&self.conn()?)?;
        collect_rows(rows)
    }

    fn running_external_tournaments(&self) -> Result<Vec<Tournament>, StoreError> {
        let rows = tournaments::table
            .filter(tournaments::status.eq(TournamentStatus::Running.code()))
            .filter(tournaments::external_page.is_not_null())
            .load::<TournamentRow>(&self.conn()?)?;
        collect_rows(rows)
    }

    fn transition_tournament(
        &self,
        id: Uuid,
        from: TournamentStatus,
        to: TournamentStatus,
    ) -> Result<bool, StoreError> {
        let updated = diesel::update(
            tournaments::table
                .filter(tournaments::id.eq(id))
                .filter(tournaments::status.eq(from.code())),
        )
        .set(tournaments::status.eq(to.code()))
        .execute(&self.conn()?)?;
        Ok(updated == 1)
    }

    fn set_updates_channel(&self, id: Uuid, channel_id: Option<u64>) -> Result<(), StoreError> {
        diesel::update(tournaments::table.find(id))
            .set(tournaments::updates_channel_id.eq(channel_id.map(|c| c as i64)))
            .execute(&self.conn()?)?;
        Ok(())
    }

    fn max_match_sequence(&self, tournament_id: Uuid) -> Result<Option<i32>, StoreError> {
        let max = matches::table
            .filter(matches::tournament_id.eq(tournament_id))
            .select(diesel::dsl::max(matches::sequence))
            .first::<Option<i32>>(&self.conn()?)?;
        Ok(max)
    }

    fn insert_match(&self, m: &Match) -> Result<(), StoreError> {
        diesel::insert_into(matches::table)
            .values(&MatchRow::from(m))
            .execute(&self.conn()?)?;
        Ok(())
    }

    fn match_by_id(&self, id: Uuid) -> Result<Option<Match>, StoreError> {
        let row = matches::table
            .find(id)
            .first::<MatchRow>(&self.conn()?)
            .optional()?;
        row.map(Match::try_from).transpose()
    }

    fn match_by_message(&self, message_id: u64) -> Result<Option<Match>, StoreError> {
        let row = matches::table
            .filter(matches::message_id.eq(message_id as i64))
            .first::<MatchRow>(&self.conn()?)
            .optional()?;
        row.map(Match::try_from).transpose()
    }

    fn matches_in_tournament(&self, tournament_id: Uuid) -> Result<Vec<Match>, StoreError> {
        let rows = matches::table
            .filter(matches::tournament_id.eq(tournament_id))
            .order(matches::sequence.asc())
            .load::<MatchRow>(&self.conn()?)?;
        collect_rows(rows)
    }

    fn matches_with_team(&self, team_id: Uuid) -> Result<Vec<Match>, StoreError> {
        let rows = matches::table
            .filter(matches::team1_id.eq(team_id).or(matches::team2_id.eq(team_id)))
            .order(matches::sequence.asc())
            .load::<MatchRow>(&self.conn()?)?;
        collect_rows(rows)
    }

    fn count_matches(&self, tournament_id: Uuid) -> Result<MatchCounts, StoreError> {
        let conn = self.conn()?;
        let count = |status: MatchStatus| -> Result<i64, StoreError> {
            Ok(matches::table
                .filter(matches::tournament_id.eq(tournament_id))
                .filter(matches::status.eq(status.code()))
                .count()
                .get_result::<i64>(&conn)?)
        };
        Ok(MatchCounts {
            open: count(MatchStatus::Open)?,
            closed: count(MatchStatus::Closed)?,
            ended: count(MatchStatus::Ended)?,
        })
    }

    fn close_match(&self, match_id: Uuid, new_predictions: &[Prediction]) -> Result<bool, StoreError> {
        let conn = self.conn()?;
        let closed = conn.transaction::<bool, DieselError, _>(|| {
            let updated = diesel::update(
                matches::table
                    .filter(matches::id.eq(match_id))
                    .filter(matches::status.eq(MatchStatus::Open.code())),
            )
            .set(matches::status.eq(MatchStatus::Closed.code()))
            .execute(&conn)?;
            if updated == 0 {
                return Ok(false);
            }

            if !new_predictions.is_empty() {
                let rows: Vec<PredictionRow> = new_predictions
                    .iter()
                    .map(|p| PredictionRow {
                        id: Uuid::new_v4(),
                        user_id: p.user_id,
                        match_id: p.match_id,
                        team: p.team,
                        games: p.games,
                    })
                    .collect();
                diesel::insert_into(predictions::table)
                    .values(&rows)
                    .on_conflict((predictions::user_id, predictions::match_id))
                    .do_update()
                    .set((
                        predictions::team.eq(excluded(predictions::team)),
                        predictions::games.eq(excluded(predictions::games)),
                    ))
                    .execute(&conn)?;
            }
            Ok(true)
        })?;
        Ok(closed)
    }

    fn end_match(&self, match_id: Uuid, result: i16, games_played: i16) -> Result<bool, StoreError> {
        let updated = diesel::update(
            matches::table
                .filter(matches::id.eq(match_id))
                .filter(matches::status.eq(MatchStatus::Closed.code())),
        )
        .set((
            matches::status.eq(MatchStatus::Ended.code()),
            matches::result.eq(result),
            matches::games_played.eq(games_played),
        ))
        .execute(&self.conn()?)?;
        Ok(updated == 1)
    }

    fn users_by_discord_ids(&self, discord_ids: &[u64]) -> Result<Vec<User>, StoreError> {
        let ids: Vec<i64> = discord_ids.iter().map(|id| *id as i64).collect();
        let rows = users::table
            .filter(users::discord_id.eq_any(ids))
            .load::<UserRow>(&self.conn()?)?;
        Ok(rows.into_iter().map(User::from).collect())
    }

    fn upsert_user(&self, discord_id: u64, name: &str) -> Result<User, StoreError> {
        let row = diesel::insert_into(users::table)
            .values(&NewUser {
                id: Uuid::new_v4(),
                discord_id: discord_id as i64,
                name,
            })
            .on_conflict(users::discord_id)
            .do_update()
            .set(users::name.eq(excluded(users::name)))
            .get_result::<UserRow>(&self.conn()?)?;
        Ok(User::from(row))
    }

    fn predictions_for_match(&self, match_id: Uuid) -> Result<Vec<(User, Prediction)>, StoreError> {
        let rows = predictions::table
            .inner_join(users::table)
            .filter(predictions::match_id.eq(match_id))
            .select((users::all_columns, predictions::all_columns))
            .load::<(UserRow, PredictionRow)>(&self.conn()?)?;
        Ok(rows
            .into_iter()
            .map(|(user, prediction)| (User::from(user), Prediction::from(prediction)))
            .collect())
    }

    fn scored_predictions(
        &self,
        tournament_id: Uuid,
        filter: &MatchFilter,
    ) -> Result<Vec<ScoredPrediction>, StoreError> {
        let mut query = predictions::table
            .inner_join(matches::table)
            .inner_join(users::table)
            .filter(matches::tournament_id.eq(tournament_id))
            .filter(matches::status.eq(MatchStatus::Ended.code()))
            .select((
                users::all_columns,
                matches::best_of,
                matches::result,
                matches::games_played,
                predictions::team,
                predictions::games,
            ))
            .into_boxed();
        if let MatchFilter::Tabs(tabs) = filter {
            query = query.filter(matches::external_tab.eq_any(tabs.clone()));
        }
        let rows = query.load::<(UserRow, i16, i16, i16, i16, i16)>(&self.conn()?)?;

        rows.into_iter()
            .map(|(user, best_of, result, games_played, team, games)| {
                Ok(ScoredPrediction {
                    user: User::from(user),
                    best_of: best_of_column("matches", best_of)?,
                    result,
                    games_played,
                    team,
                    games,
                })
            })
            .collect()
    }
}
