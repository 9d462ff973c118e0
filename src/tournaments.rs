//! Tournament lifecycle and the service object shared by every entry point.

use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::gateway::{edit_or_skip, paginate, ChatGateway};
use crate::leaguepedia::{page_from_link, ScheduleSource};
use crate::matches::MessageLocks;
use crate::models::{Match, MatchFilter, Team, Tournament, TournamentStatus};
use crate::render::{self, MatchView};
use crate::scoring::{compute_leaderboard, LeaderboardEntry};
use crate::store::{Store, StoreError};

/// Drives tournaments, matches and teams against the store and the chat.
///
/// Holds no tournament state of its own; every operation reads what it needs
/// from the store.
pub struct TournamentManager {
    pub(crate) store: Arc<dyn Store>,
    pub(crate) chat: Arc<dyn ChatGateway>,
    pub(crate) schedule: Arc<dyn ScheduleSource>,
    pub(crate) settings: Settings,
    pub(crate) reaction_locks: MessageLocks,
}

impl TournamentManager {
    pub fn new(
        store: Arc<dyn Store>,
        chat: Arc<dyn ChatGateway>,
        schedule: Arc<dyn ScheduleSource>,
        settings: Settings,
    ) -> TournamentManager {
        TournamentManager {
            store,
            chat,
            schedule,
            settings,
            reaction_locks: MessageLocks::default(),
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &dyn Store {
        self.store.as_ref()
    }

    pub fn chat(&self) -> &dyn ChatGateway {
        self.chat.as_ref()
    }

    pub fn start_tournament(
        &self,
        name: &str,
        channel_id: u64,
        guild_id: u64,
        external_page: Option<String>,
    ) -> Result<Tournament> {
        if let Some(running) = self.store.running_tournament_in_channel(channel_id)? {
            return Err(Error::TournamentAlreadyRunning(running.name));
        }

        let base = name.replace(':', " ").trim().to_string();
        let mut name = base.clone();
        let mut n = 1;
        while self.store.tournament_by_name(guild_id, &name)?.is_some() {
            name = format!("{} ({})", base, n);
            n += 1;
        }

        let mut tournament = Tournament {
            id: Uuid::new_v4(),
            name,
            channel_id,
            guild_id,
            message_id: 0,
            status: TournamentStatus::Running,
            external_page,
            updates_channel_id: None,
            scoring: self.settings.default_scoring,
        };
        let text = render::tournament_text(&tournament, &self.settings.wiki_url, &[]);
        tournament.message_id = self.chat.send_message(channel_id, &text)?;

        if let Err(err) = self.store.insert_tournament(&tournament) {
            self.discard_message(channel_id, tournament.message_id);
            if let StoreError::Conflict(_) = err {
                if let Some(running) = self.store.running_tournament_in_channel(channel_id)? {
                    return Err(Error::TournamentAlreadyRunning(running.name));
                }
            }
            return Err(err.into());
        }

        info!(tournament = %tournament.name, channel_id, "tournament started");
        Ok(tournament)
    }

    /// Starts a tournament bound to a wiki overview page, importing its teams first.
    pub fn start_tournament_from_link(&self, link: &str, channel_id: u64, guild_id: u64) -> Result<Tournament> {
        let page = page_from_link(&self.settings.wiki_url, link).ok_or(Error::NotAWikiLink)?;
        let info = self.schedule.page_info(&page).map_err(|err| match err.api_code() {
            Some("missingtitle") => Error::PageDoesNotExist,
            Some("pagecannotexist") => Error::NotARegularPage,
            _ => Error::Wiki(err),
        })?;
        let row = self
            .schedule
            .tournament(&info.title)?
            .ok_or(Error::NotAnOverviewPage)?;

        if let Some(running) = self.store.running_tournament_in_channel(channel_id)? {
            return Err(Error::TournamentAlreadyRunning(running.name));
        }
        if !self.sync_external_teams(&info.title, guild_id)? {
            return Err(Error::TeamSyncFailed);
        }
        self.start_tournament(&row.name, channel_id, guild_id, Some(info.title))
    }

    /// Ends a tournament once none of its matches is open or closed.
    pub fn end_tournament(&self, tournament: &Tournament) -> Result<Tournament> {
        let counts = self.store.count_matches(tournament.id)?;
        if counts.open > 0 {
            return Err(Error::TournamentHasOpenMatches(tournament.name.clone()));
        }
        if counts.closed > 0 {
            return Err(Error::TournamentHasClosedMatches(tournament.name.clone()));
        }
        if !self
            .store
            .transition_tournament(tournament.id, TournamentStatus::Running, TournamentStatus::Ended)?
        {
            return Err(Error::TournamentNotRunning(tournament.name.clone()));
        }

        let mut ended = tournament.clone();
        ended.status = TournamentStatus::Ended;
        self.update_tournament_message(&ended)?;
        info!(tournament = %ended.name, "tournament ended");
        Ok(ended)
    }

    /// By name within the guild, otherwise the channel's running tournament.
    pub fn find_tournament(&self, guild_id: u64, channel_id: u64, name: Option<&str>) -> Result<Tournament> {
        match name {
            Some(name) => self
                .store
                .tournament_by_name(guild_id, name)?
                .ok_or_else(|| Error::TournamentNotFound(name.to_string())),
            None => self
                .store
                .running_tournament_in_channel(channel_id)?
                .ok_or(Error::NoRunningTournament),
        }
    }

    pub fn running_tournament(&self, channel_id: u64) -> Result<Tournament> {
        self.store
            .running_tournament_in_channel(channel_id)?
            .ok_or(Error::NoRunningTournament)
    }

    pub fn leaderboard(&self, tournament: &Tournament, filter: &MatchFilter) -> Result<Vec<LeaderboardEntry>> {
        let predictions = self.store.scored_predictions(tournament.id, filter)?;
        Ok(compute_leaderboard(&tournament.scoring, &predictions))
    }

    pub fn tournament_text(&self, tournament: &Tournament) -> Result<String> {
        let board = self.leaderboard(tournament, &MatchFilter::All)?;
        Ok(render::tournament_text(tournament, &self.settings.wiki_url, &board))
    }

    pub fn tab_leaderboard_text(&self, tournament: &Tournament, tabs: &[String]) -> Result<String> {
        let board = self.leaderboard(tournament, &MatchFilter::Tabs(tabs.to_vec()))?;
        Ok(render::tab_leaderboard_text(tournament, tabs, &board))
    }

    /// A one-off copy of the tournament message, paged to fit.
    pub fn tournament_info(&self, guild_id: u64, channel_id: u64, name: Option<&str>) -> Result<Vec<String>> {
        let tournament = self.find_tournament(guild_id, channel_id, name)?;
        let board = self.leaderboard(&tournament, &MatchFilter::All)?;
        Ok(render::tournament_info_pages(&tournament, &self.settings.wiki_url, &board))
    }

    pub fn list_tournaments(&self, guild_id: u64) -> Result<Vec<String>> {
        let tournaments = self.store.tournaments_in_guild(guild_id)?;
        Ok(paginate(render::tournament_list_lines(&tournaments)))
    }

    pub fn set_updates_channel(&self, guild_id: u64, name: &str, channel_id: u64) -> Result<Tournament> {
        let mut tournament = self
            .store
            .tournament_by_name(guild_id, name)?
            .ok_or_else(|| Error::TournamentNotFound(name.to_string()))?;
        self.store.set_updates_channel(tournament.id, Some(channel_id))?;
        tournament.updates_channel_id = Some(channel_id);
        info!(tournament = %tournament.name, channel_id, "updates channel set");
        Ok(tournament)
    }

    /// Rewrites the tournament message; a deleted message is left alone.
    pub fn update_tournament_message(&self, tournament: &Tournament) -> Result<()> {
        let text = self.tournament_text(tournament)?;
        edit_or_skip(self.chat.as_ref(), tournament.channel_id, tournament.message_id, &text)?;
        Ok(())
    }

    pub(crate) fn teams_of(&self, m: &Match) -> Result<(Team, Team)> {
        let load = |id: Uuid| -> Result<Team> {
            self.store.team(id)?.ok_or_else(|| {
                Error::Store(StoreError::Corrupt {
                    table: "matches",
                    detail: format!("match {} references missing team {}", m.id, id),
                })
            })
        };
        Ok((load(m.team1_id)?, load(m.team2_id)?))
    }

    pub(crate) fn tournament_of(&self, m: &Match) -> Result<Tournament> {
        self.store.tournament(m.tournament_id)?.ok_or_else(|| {
            Error::Store(StoreError::Corrupt {
                table: "matches",
                detail: format!("match {} references missing tournament", m.id),
            })
        })
    }

    pub fn update_match_message(&self, m: &Match) -> Result<()> {
        let tournament = self.tournament_of(m)?;
        let (team1, team2) = self.teams_of(m)?;
        let text = render::match_text(MatchView {
            m,
            team1: &team1,
            team2: &team2,
        });
        edit_or_skip(self.chat.as_ref(), tournament.channel_id, m.message_id, &text)?;
        Ok(())
    }

    /// Best-effort removal of a message posted for something that was not saved.
    pub(crate) fn discard_message(&self, channel_id: u64, message_id: u64) {
        if let Err(err) = self.chat.delete_message(channel_id, message_id) {
            warn!(channel_id, message_id, "could not delete orphaned message: {}", err);
        }
    }

    /// Sends text in chunks that fit one message, logging instead of failing.
    pub(crate) fn post(&self, channel_id: u64, lines: Vec<String>) {
        for page in paginate(lines) {
            if let Err(err) = self.chat.send_message(channel_id, &page) {
                warn!(channel_id, "could not post message: {}", err);
                return;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{BestOf, MatchStatus};
    use crate::testing::{chat_user, Harness, CHANNEL, GUILD};

    #[test]
    fn one_running_tournament_per_channel() {
        let h = Harness::new();
        let first = h.tournament("Spring Cup");
        let err = h.manager.start_tournament("Other", CHANNEL, GUILD, None).unwrap_err();
        assert!(matches!(err, Error::TournamentAlreadyRunning(name) if name == first.name));

        h.manager.end_tournament(&first).unwrap();
        let second = h.manager.start_tournament("Other", CHANNEL, GUILD, None).unwrap();
        assert!(second.is_running());
    }

    #[test]
    fn colliding_names_get_a_suffix() {
        let h = Harness::new();
        let a = h.manager.start_tournament("Cup: Finals", 1, GUILD, None).unwrap();
        let b = h.manager.start_tournament("Cup  Finals", 2, GUILD, None).unwrap();
        let c = h.manager.start_tournament("Cup  Finals", 3, GUILD, None).unwrap();
        assert_eq!(a.name, "Cup  Finals");
        assert_eq!(b.name, "Cup  Finals (1)");
        assert_eq!(c.name, "Cup  Finals (2)");
        assert!(h.chat.content(a.message_id).unwrap().starts_with("**Cup  Finals**\n\n***Scoring Table***"));
    }

    #[test]
    fn ending_requires_no_open_or_closed_matches() {
        let h = Harness::new();
        let t = h.tournament("Spring Cup");
        let g2 = h.team("G2", "g2", "🐺");
        let fnc = h.team("Fnatic", "fnc", "🦊");
        let m = h.manager.start_match(&t, "R1", &g2, &fnc, BestOf::Three, None).unwrap();

        assert!(matches!(h.manager.end_tournament(&t), Err(Error::TournamentHasOpenMatches(_))));
        let m = h.manager.close_match(&m).unwrap();
        assert!(matches!(h.manager.end_tournament(&t), Err(Error::TournamentHasClosedMatches(_))));
        h.manager.end_match(&m, 1, 2).unwrap();

        let ended = h.manager.end_tournament(&t).unwrap();
        assert_eq!(ended.status, TournamentStatus::Ended);
        assert!(h.chat.content(t.message_id).unwrap().starts_with("**Spring Cup** - Ended"));
        assert!(matches!(h.manager.end_tournament(&t), Err(Error::TournamentNotRunning(_))));
        assert!(h.manager.start_match(&ended, "R2", &g2, &fnc, BestOf::One, None).is_err());
    }

    #[test]
    fn spring_cup_scenario() {
        let h = Harness::new();
        let t = h.tournament("Spring Cup");
        let g2 = h.team("G2", "g2", "🐺");
        let fnc = h.team("Fnatic", "fnc", "🦊");
        let m = h.manager.start_match(&t, "R1", &g2, &fnc, BestOf::Three, None).unwrap();

        h.chat.react(m.message_id, chat_user(1, "amy"), &g2.emoji);
        h.chat.react(m.message_id, chat_user(1, "amy"), &crate::emoji::Emoji::unicode("2️⃣"));
        h.chat.react(m.message_id, chat_user(2, "bob"), &crate::emoji::Emoji::unicode("2️⃣"));
        h.chat.react(m.message_id, chat_user(3, "cat"), &fnc.emoji);

        let m = h.manager.close_match(&m).unwrap();
        assert_eq!(m.status, MatchStatus::Closed);
        h.manager.end_match(&m, 1, 2).unwrap();

        let board = h.manager.leaderboard(&t, &MatchFilter::All).unwrap();
        let summary: Vec<(&str, i64)> = board.iter().map(|e| (e.user.name.as_str(), e.score)).collect();
        assert_eq!(summary, vec![("amy", 3), ("bob", 1), ("cat", 0)]);

        let text = h.chat.content(t.message_id).unwrap();
        assert!(text.contains("***Leaderboard***"));
        assert!(text.contains("amy  3 points"));
    }

    #[test]
    fn info_and_lists() {
        let h = Harness::new();
        let t = h.tournament("Spring Cup");
        let info = h.manager.tournament_info(GUILD, CHANNEL, None).unwrap();
        assert_eq!(info.len(), 1);
        assert!(info[0].ends_with("\n`This message does not get updated.`"));
        assert!(matches!(
            h.manager.tournament_info(GUILD, CHANNEL, Some("nope")),
            Err(Error::TournamentNotFound(_))
        ));
        assert!(matches!(
            h.manager.tournament_info(GUILD, 55, None),
            Err(Error::NoRunningTournament)
        ));
        assert_eq!(
            h.manager.list_tournaments(GUILD).unwrap(),
            vec![format!("**Tournaments:**\n**Spring Cup** - Channel: <#{}>", t.channel_id)]
        );
        assert_eq!(
            h.manager.list_tournaments(77).unwrap(),
            vec!["There are no tournaments in this server."]
        );
    }

    #[test]
    fn deleted_tournament_message_is_not_an_error() {
        let h = Harness::new();
        let t = h.tournament("Spring Cup");
        h.chat.delete_out_of_band(t.message_id);
        assert!(h.manager.update_tournament_message(&t).is_ok());
    }

    #[test]
    fn links_are_resolved_before_starting() {
        let h = Harness::new();
        let wiki = h.manager.settings().wiki_url.clone();
        assert!(matches!(
            h.manager.start_tournament_from_link("https://example.com/x", CHANNEL, GUILD),
            Err(Error::NotAWikiLink)
        ));
        assert!(matches!(
            h.manager.start_tournament_from_link(&format!("{}Missing", wiki), CHANNEL, GUILD),
            Err(Error::PageDoesNotExist)
        ));
        h.schedule.add_page_error("Special:Thing", "pagecannotexist");
        assert!(matches!(
            h.manager.start_tournament_from_link(&format!("{}Special:Thing", wiki), CHANNEL, GUILD),
            Err(Error::NotARegularPage)
        ));
        h.schedule.add_page("G2 Esports");
        assert!(matches!(
            h.manager.start_tournament_from_link(&format!("{}G2_Esports", wiki), CHANNEL, GUILD),
            Err(Error::NotAnOverviewPage)
        ));

        h.schedule.add_page("LEC/2021 Season/Summer Season");
        h.schedule.add_tournament("LEC/2021 Season/Summer Season", "LEC 2021 Summer");
        let t = h
            .manager
            .start_tournament_from_link(&format!("{}LEC/2021_Season/Summer_Season", wiki), CHANNEL, GUILD)
            .unwrap();
        assert_eq!(t.name, "LEC 2021 Summer");
        assert_eq!(t.external_page.as_deref(), Some("LEC/2021 Season/Summer Season"));
    }
}
