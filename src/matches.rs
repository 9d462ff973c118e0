//! Match lifecycle: open, closed, ended.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::emoji::Emoji;
use crate::error::{Error, Result};
use crate::gateway::{edit_or_skip, paginate};
use crate::models::{BestOf, ExternalMatchRef, Match, MatchFilter, MatchStatus, Team, Tournament};
use crate::render::{self, MatchView};
use crate::scoring::scores_by_user;
use crate::tournaments::TournamentManager;
use crate::votes::{self, classify, choice_symbols};

/// One lock per message, so reactions on the same message are handled one at a time.
#[derive(Default)]
pub(crate) struct MessageLocks {
    locks: Mutex<HashMap<u64, Arc<Mutex<()>>>>,
}

impl MessageLocks {
    fn map(&self) -> MutexGuard<'_, HashMap<u64, Arc<Mutex<()>>>> {
        self.locks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn acquire(&self, message_id: u64) -> Arc<Mutex<()>> {
        self.map().entry(message_id).or_default().clone()
    }

    /// Drops the entry once no one else is waiting on it.
    fn release(&self, message_id: u64, handle: Arc<Mutex<()>>) {
        drop(handle);
        let mut map = self.map();
        if map.get(&message_id).map_or(false, |lock| Arc::strong_count(lock) == 1) {
            map.remove(&message_id);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.map().len()
    }
}

impl TournamentManager {
    /// Posts a new match in the tournament channel and records it.
    pub fn start_match(
        &self,
        tournament: &Tournament,
        name: &str,
        team1: &Team,
        team2: &Team,
        best_of: BestOf,
        external: Option<ExternalMatchRef>,
    ) -> Result<Match> {
        if !tournament.is_running() {
            return Err(Error::TournamentNotRunning(tournament.name.clone()));
        }
        let existing = self.store.matches_in_tournament(tournament.id)?;
        let duplicate = existing.iter().any(|m| {
            m.name == name
                || matches!((&m.external, &external), (Some(a), Some(b)) if a.match_id == b.match_id)
        });
        if duplicate {
            return Err(Error::MatchAlreadyExists(name.to_string()));
        }
        let sequence = self.store.max_match_sequence(tournament.id)?.unwrap_or(0) + 1;

        let mut m = Match {
            id: Uuid::new_v4(),
            sequence,
            name: name.to_string(),
            message_id: 0,
            status: MatchStatus::Open,
            best_of,
            team1_id: team1.id,
            team2_id: team2.id,
            tournament_id: tournament.id,
            result: 0,
            games_played: 0,
            external,
        };
        let text = render::match_text(MatchView {
            m: &m,
            team1,
            team2,
        });
        m.message_id = self.chat.send_message(tournament.channel_id, &text)?;

        if let Err(err) = self.store.insert_match(&m) {
            self.discard_message(tournament.channel_id, m.message_id);
            return Err(match err {
                crate::store::StoreError::Conflict(_) => Error::MatchAlreadyExists(m.name),
                other => other.into(),
            });
        }

        self.add_choice_reactions(tournament.channel_id, m.message_id, &choice_symbols(&m, team1, team2));
        info!(tournament = %tournament.name, sequence, name = %m.name, "match started");
        Ok(m)
    }

    pub(crate) fn add_choice_reactions(&self, channel_id: u64, message_id: u64, symbols: &[(votes::Choice, Emoji)]) {
        for (_, emoji) in symbols {
            if let Err(err) = self.chat.add_reaction(channel_id, message_id, emoji) {
                warn!(channel_id, message_id, %emoji, "could not add reaction: {}", err);
            }
        }
    }

    pub fn match_by_sequence(&self, tournament: &Tournament, sequence: i32) -> Result<Match> {
        self.store
            .matches_in_tournament(tournament.id)?
            .into_iter()
            .find(|m| m.sequence == sequence)
            .ok_or(Error::MatchNotFound(sequence))
    }

    /// Reads the votes and moves OPEN to CLOSED. False when another caller got there first.
    fn collect_and_close(&self, m: &Match, tournament: &Tournament, team1: &Team, team2: &Team) -> Result<bool> {
        let predictions = votes::collect_predictions(
            self.store.as_ref(),
            self.chat.as_ref(),
            tournament.channel_id,
            m,
            team1,
            team2,
            self.settings.reaction_fetch_concurrency,
        )?;
        let closed = self.store.close_match(m.id, &predictions)?;
        if closed {
            info!(tournament = %tournament.name, sequence = m.sequence, predictions = predictions.len(), "match closed");
        }
        Ok(closed)
    }

    fn current_status(&self, m: &Match) -> Result<MatchStatus> {
        Ok(self
            .store
            .match_by_id(m.id)?
            .map(|current| current.status)
            .unwrap_or(m.status))
    }

    /// Freezes the votes of an OPEN match.
    pub fn close_match(&self, m: &Match) -> Result<Match> {
        if m.status != MatchStatus::Open {
            return Err(Error::CantCloseMatch {
                sequence: m.sequence,
                status: m.status,
            });
        }
        let tournament = self.tournament_of(m)?;
        let (team1, team2) = self.teams_of(m)?;
        if !self.collect_and_close(m, &tournament, &team1, &team2)? {
            return Err(Error::CantCloseMatch {
                sequence: m.sequence,
                status: self.current_status(m)?,
            });
        }

        let mut closed = m.clone();
        closed.status = MatchStatus::Closed;
        let text = render::match_text(MatchView {
            m: &closed,
            team1: &team1,
            team2: &team2,
        });
        if let Err(err) = edit_or_skip(self.chat.as_ref(), tournament.channel_id, closed.message_id, &text) {
            warn!(match_id = %closed.id, "could not refresh closed match message: {}", err);
        }
        Ok(closed)
    }

    /// Closes the OPEN matches among `sequences`; anything else is skipped.
    /// Unknown numbers fail the whole batch before anything is closed.
    pub fn close_matches(&self, tournament: &Tournament, sequences: &[i32]) -> Result<Vec<Match>> {
        let matches = self.store.matches_in_tournament(tournament.id)?;
        let targets = sequences
            .iter()
            .map(|sequence| {
                matches
                    .iter()
                    .find(|m| m.sequence == *sequence)
                    .ok_or(Error::MatchNotFound(*sequence))
            })
            .collect::<Result<Vec<_>>>()?;
        let mut closed = Vec::new();
        for m in targets {
            if m.status == MatchStatus::Open && !closed.iter().any(|c: &Match| c.id == m.id) {
                closed.push(self.close_match(m)?);
            }
        }
        Ok(closed)
    }

    /// Records the result and refreshes the tournament leaderboard.
    ///
    /// The result is saved once this returns Ok; a failed refresh is only logged.
    pub fn end_match(&self, m: &Match, winner: i16, games_played: i16) -> Result<Match> {
        let (ended, tournament) = self.finish_match(m, winner, games_played)?;
        if let Err(err) = self.update_tournament_message(&tournament) {
            warn!(tournament = %tournament.name, sequence = m.sequence, "could not refresh tournament message: {}", err);
        }
        Ok(ended)
    }

    /// Ends a match without touching the tournament message, for callers that
    /// end several matches and refresh the leaderboard once.
    pub(crate) fn finish_match(&self, m: &Match, winner: i16, games_played: i16) -> Result<(Match, Tournament)> {
        if winner != 1 && winner != 2 {
            return Err(Error::InvalidWinner(winner));
        }
        m.best_of.check_games(games_played)?;
        if m.status == MatchStatus::Ended {
            return Err(Error::CantEndMatch {
                sequence: m.sequence,
                status: m.status,
            });
        }

        let tournament = self.tournament_of(m)?;
        let (team1, team2) = self.teams_of(m)?;
        if m.status == MatchStatus::Open && !self.collect_and_close(m, &tournament, &team1, &team2)? {
            debug!(match_id = %m.id, "match was closed concurrently");
        }
        if !self.store.end_match(m.id, winner, games_played)? {
            return Err(Error::CantEndMatch {
                sequence: m.sequence,
                status: self.current_status(m)?,
            });
        }

        let mut ended = m.clone();
        ended.status = MatchStatus::Ended;
        ended.result = winner;
        ended.games_played = games_played;
        info!(tournament = %tournament.name, sequence = m.sequence, winner, games_played, "match ended");

        let view = MatchView {
            m: &ended,
            team1: &team1,
            team2: &team2,
        };
        if let Err(err) = edit_or_skip(self.chat.as_ref(), tournament.channel_id, ended.message_id, &render::match_text(view)) {
            warn!(match_id = %ended.id, "could not refresh ended match message: {}", err);
        }
        if let Err(err) = self.announce_match_end(&tournament, view) {
            warn!(tournament = %tournament.name, sequence = m.sequence, "could not announce match result: {}", err);
        }
        Ok((ended, tournament))
    }

    /// Posts who called the result to the updates channel, plus the tab
    /// leaderboard once every match of the tab is over.
    fn announce_match_end(&self, tournament: &Tournament, view: MatchView<'_>) -> Result<()> {
        let channel_id = match tournament.updates_channel_id {
            Some(channel_id) => channel_id,
            None => return Ok(()),
        };
        let m = view.m;
        let scores = scores_by_user(&self.leaderboard(tournament, &MatchFilter::All)?);
        let predictions = self.store.predictions_for_match(m.id)?;

        let ranked = |pred: &dyn Fn(i16, i16) -> bool| {
            let mut users: Vec<(String, i64)> = predictions
                .iter()
                .filter(|(_, p)| pred(p.team, p.games))
                .map(|(user, _)| (user.name.clone(), scores.get(&user.id).copied().unwrap_or(0)))
                .collect();
            users.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
            users
        };
        let team_correct = ranked(&|team, _| team == m.result);
        let games_correct = ranked(&|_, games| games == m.games_played);
        let games_correct = if m.best_of == BestOf::One {
            None
        } else {
            Some(games_correct.as_slice())
        };

        self.post(
            channel_id,
            render::match_end_lines(&tournament.name, view, &team_correct, games_correct),
        );

        if let Some(tab) = m.tab() {
            let tab_done = self
                .store
                .matches_in_tournament(tournament.id)?
                .iter()
                .filter(|other| other.tab() == Some(tab))
                .all(|other| other.status == MatchStatus::Ended);
            if tab_done {
                let text = self.tab_leaderboard_text(tournament, &[tab.to_string()])?;
                self.post(channel_id, vec![text]);
            }
        }
        Ok(())
    }

    /// Puts back the bot's reactions and rewrites the text of a match message.
    pub fn fix_match(&self, m: &Match) -> Result<()> {
        let tournament = self.tournament_of(m)?;
        let (team1, team2) = self.teams_of(m)?;
        if m.status == MatchStatus::Open {
            let message = self.chat.fetch_message(tournament.channel_id, m.message_id)?;
            let bot_id = self.chat.current_user_id();
            for reaction in message.reactions.iter().filter(|r| r.me) {
                self.chat
                    .remove_reaction(tournament.channel_id, m.message_id, bot_id, &reaction.emoji)?;
            }
            self.add_choice_reactions(tournament.channel_id, m.message_id, &choice_symbols(m, &team1, &team2));
        }
        let text = render::match_text(MatchView {
            m,
            team1: &team1,
            team2: &team2,
        });
        self.chat.edit_message(tournament.channel_id, m.message_id, &text)?;
        info!(tournament = %tournament.name, sequence = m.sequence, "match fixed");
        Ok(())
    }

    /// Keeps at most one choice per kind for a user on an OPEN match message.
    ///
    /// Returns false when the message is not a match message.
    pub fn on_match_reaction(&self, channel_id: u64, message_id: u64, user_id: u64, emoji: &Emoji) -> Result<bool> {
        if user_id == self.chat.current_user_id() {
            return Ok(false);
        }
        let handle = self.reaction_locks.acquire(message_id);
        let outcome = {
            let _guard = handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
            self.keep_one_choice(channel_id, message_id, user_id, emoji)
        };
        self.reaction_locks.release(message_id, handle);
        outcome
    }

    fn keep_one_choice(&self, channel_id: u64, message_id: u64, user_id: u64, emoji: &Emoji) -> Result<bool> {
        let m = match self.store.match_by_message(message_id)? {
            Some(m) => m,
            None => return Ok(false),
        };
        if m.status != MatchStatus::Open {
            return Ok(true);
        }
        let (team1, team2) = self.teams_of(&m)?;
        let symbols = choice_symbols(&m, &team1, &team2);
        let added = match classify(&symbols, emoji) {
            Some(choice) => choice,
            None => return Ok(true),
        };

        let message = match self.chat.fetch_message(channel_id, message_id) {
            Ok(message) => message,
            Err(err) if err.is_soft() => return Ok(true),
            Err(err) => return Err(err.into()),
        };
        // a later reaction of the same kind may already have replaced this one
        let holders = self.chat.reaction_users(channel_id, message_id, emoji)?;
        if !holders.iter().any(|u| u.id == user_id) {
            debug!(message_id, user_id, "reaction already withdrawn");
            return Ok(true);
        }
        for (choice, other) in &symbols {
            if !choice.same_kind(added) || other == emoji || !message.has_reaction(other) {
                continue;
            }
            let users = self.chat.reaction_users(channel_id, message_id, other)?;
            if users.iter().any(|u| u.id == user_id) {
                match self.chat.remove_reaction(channel_id, message_id, user_id, other) {
                    Err(err) if err.is_soft() => debug!(message_id, "reaction already gone: {}", err),
                    other => other?,
                }
            }
        }
        Ok(true)
    }

    pub fn list_matches(&self, guild_id: u64, channel_id: u64, name: Option<&str>) -> Result<Vec<String>> {
        let tournament = self.find_tournament(guild_id, channel_id, name)?;
        let matches = self.store.matches_in_tournament(tournament.id)?;
        let teams: HashMap<Uuid, Team> = self
            .store
            .teams_in_guild(tournament.guild_id)?
            .into_iter()
            .map(|t| (t.id, t))
            .collect();

        let mut views = Vec::with_capacity(matches.len());
        for m in &matches {
            match (teams.get(&m.team1_id), teams.get(&m.team2_id)) {
                (Some(team1), Some(team2)) => views.push(MatchView { m, team1, team2 }),
                _ => warn!(match_id = %m.id, "match references a team outside its guild"),
            }
        }
        Ok(paginate(render::match_list_lines(&tournament.name, &views)))
    }
}
