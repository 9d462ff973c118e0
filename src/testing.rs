//! In-memory stand-ins for the store, the chat platform and the wiki.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::config::Settings;
use crate::emoji::Emoji;
use crate::gateway::{ChatGateway, ChatMessage, ChatUser, GatewayError, ReactionCount};
use crate::leaguepedia::{
    cargo_titles, parse_match_schedule, MatchScheduleRow, PageInfo, ScheduleSource, TeamsRow, TournamentsRow, WikiError,
};
use crate::models::{
    Match, MatchCounts, MatchFilter, MatchStatus, Prediction, Team, Tournament, TournamentStatus, User,
};
use crate::store::{ScoredPrediction, Store, StoreError};
use crate::tournaments::TournamentManager;

pub const BOT_ID: u64 = 999;
pub const GUILD: u64 = 1;
pub const CHANNEL: u64 = 10;
pub const UPDATES: u64 = 20;

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub fn settings() -> Settings {
    Settings::from_lookup(|key| match key {
        "DISCORD_TOKEN" => Some("token".into()),
        "DATABASE_URL" => Some("postgres://test".into()),
        "OWNER_ID" => Some("7".into()),
        "REACTION_FETCH_CONCURRENCY" => Some("2".into()),
        _ => None,
    })
    .unwrap()
}

pub fn chat_user(id: u64, name: &str) -> ChatUser {
    ChatUser {
        id,
        name: name.to_string(),
        bot: false,
    }
}

/// A manager wired to fresh fakes.
pub struct Harness {
    pub store: Arc<MemoryStore>,
    pub chat: Arc<FakeChat>,
    pub schedule: Arc<FakeSchedule>,
    pub manager: Arc<TournamentManager>,
}

impl Harness {
    pub fn new() -> Harness {
        let store = Arc::new(MemoryStore::default());
        let chat = Arc::new(FakeChat::new());
        let schedule = Arc::new(FakeSchedule::default());
        let manager = Arc::new(TournamentManager::new(
            store.clone(),
            chat.clone(),
            schedule.clone(),
            settings(),
        ));
        Harness {
            store,
            chat,
            schedule,
            manager,
        }
    }

    pub fn team(&self, name: &str, code: &str, emoji: &str) -> Team {
        self.manager.create_team(GUILD, name, code, emoji).unwrap()
    }

    pub fn tournament(&self, name: &str) -> Tournament {
        self.manager.start_tournament(name, CHANNEL, GUILD, None).unwrap()
    }
}

#[derive(Default)]
struct MemoryState {
    teams: Vec<Team>,
    tournaments: Vec<Tournament>,
    matches: Vec<Match>,
    users: Vec<User>,
    predictions: Vec<Prediction>,
    fail_next_match_insert: bool,
}

/// Keeps the same uniqueness rules and status compare-and-swap as Postgres.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<MemoryState>,
}

impl MemoryStore {
    pub fn fail_next_match_insert(&self) {
        lock(&self.state).fail_next_match_insert = true;
    }

    pub fn all_matches(&self) -> Vec<Match> {
        lock(&self.state).matches.clone()
    }

    pub fn all_users(&self) -> Vec<User> {
        lock(&self.state).users.clone()
    }

    pub fn all_predictions(&self) -> Vec<Prediction> {
        lock(&self.state).predictions.clone()
    }

    /// Moves a match straight to a status, bypassing the transitions.
    pub fn force_status(&self, match_id: Uuid, status: MatchStatus) {
        if let Some(m) = lock(&self.state).matches.iter_mut().find(|m| m.id == match_id) {
            m.status = status;
        }
    }
}

impl Store for MemoryStore {
    fn insert_team(&self, team: &Team) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        if state
            .teams
            .iter()
            .any(|t| t.guild_id == team.guild_id && t.code == team.code)
        {
            return Err(StoreError::Conflict("teams_code_guild_id_key".into()));
        }
        if team.external_page.is_some()
            && state
                .teams
                .iter()
                .any(|t| t.guild_id == team.guild_id && t.external_page == team.external_page)
        {
            return Err(StoreError::Conflict("teams_external_page_guild_id_key".into()));
        }
        state.teams.push(team.clone());
        Ok(())
    }

    fn update_team(&self, team: &Team) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        if state
            .teams
            .iter()
            .any(|t| t.id != team.id && t.guild_id == team.guild_id && t.code == team.code)
        {
            return Err(StoreError::Conflict("teams_code_guild_id_key".into()));
        }
        if let Some(t) = state.teams.iter_mut().find(|t| t.id == team.id) {
            *t = team.clone();
        }
        Ok(())
    }

    fn delete_team(&self, team_id: Uuid) -> Result<(), StoreError> {
        lock(&self.state).teams.retain(|t| t.id != team_id);
        Ok(())
    }

    fn team(&self, team_id: Uuid) -> Result<Option<Team>, StoreError> {
        Ok(lock(&self.state).teams.iter().find(|t| t.id == team_id).cloned())
    }

    fn team_by_code(&self, guild_id: u64, code: &str) -> Result<Option<Team>, StoreError> {
        Ok(lock(&self.state)
            .teams
            .iter()
            .find(|t| t.guild_id == guild_id && t.code == code)
            .cloned())
    }

    fn teams_in_guild(&self, guild_id: u64) -> Result<Vec<Team>, StoreError> {
        let mut teams: Vec<Team> = lock(&self.state)
            .teams
            .iter()
            .filter(|t| t.guild_id == guild_id)
            .cloned()
            .collect();
        teams.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(teams)
    }

    fn insert_tournament(&self, tournament: &Tournament) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        if state
            .tournaments
            .iter()
            .any(|t| t.guild_id == tournament.guild_id && t.name == tournament.name)
        {
            return Err(StoreError::Conflict("tournaments_name_guild_id_key".into()));
        }
        if tournament.is_running()
            && state
                .tournaments
                .iter()
                .any(|t| t.channel_id == tournament.channel_id && t.is_running())
        {
            return Err(StoreError::Conflict("tournaments_running_channel_idx".into()));
        }
        state.tournaments.push(tournament.clone());
        Ok(())
    }

    fn tournament(&self, id: Uuid) -> Result<Option<Tournament>, StoreError> {
        Ok(lock(&self.state).tournaments.iter().find(|t| t.id == id).cloned())
    }

    fn tournament_by_name(&self, guild_id: u64, name: &str) -> Result<Option<Tournament>, StoreError> {
        Ok(lock(&self.state)
            .tournaments
            .iter()
            .find(|t| t.guild_id == guild_id && t.name == name)
            .cloned())
    }

    fn running_tournament_in_channel(&self, channel_id: u64) -> Result<Option<Tournament>, StoreError> {
        Ok(lock(&self.state)
            .tournaments
            .iter()
            .find(|t| t.channel_id == channel_id && t.is_running())
            .cloned())
    }

    fn tournaments_in_guild(&self, guild_id: u64) -> Result<Vec<Tournament>, StoreError> {
        Ok(lock(&self.state)
            .tournaments
            .iter()
            .filter(|t| t.guild_id == guild_id)
            .cloned()
            .collect())
    }

    fn running_external_tournaments(&self) -> Result<Vec<Tournament>, StoreError> {
        Ok(lock(&self.state)
            .tournaments
            .iter()
            .filter(|t| t.is_running() && t.external_page.is_some())
            .cloned()
            .collect())
    }

    fn transition_tournament(
        &self,
        id: Uuid,
        from: TournamentStatus,
        to: TournamentStatus,
    ) -> Result<bool, StoreError> {
        let mut state = lock(&self.state);
        match state.tournaments.iter_mut().find(|t| t.id == id && t.status == from) {
            Some(t) => {
                t.status = to;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn set_updates_channel(&self, id: Uuid, channel_id: Option<u64>) -> Result<(), StoreError> {
        if let Some(t) = lock(&self.state).tournaments.iter_mut().find(|t| t.id == id) {
            t.updates_channel_id = channel_id;
        }
        Ok(())
    }

    fn max_match_sequence(&self, tournament_id: Uuid) -> Result<Option<i32>, StoreError> {
        Ok(lock(&self.state)
            .matches
            .iter()
            .filter(|m| m.tournament_id == tournament_id)
            .map(|m| m.sequence)
            .max())
    }

    fn insert_match(&self, m: &Match) -> Result<(), StoreError> {
        let mut state = lock(&self.state);
        if std::mem::take(&mut state.fail_next_match_insert) {
            return Err(StoreError::Query("injected failure".into()));
        }
        if state.matches.iter().any(|o| o.message_id == m.message_id) {
            return Err(StoreError::Conflict("matches_message_id_key".into()));
        }
        if state
            .matches
            .iter()
            .any(|o| o.tournament_id == m.tournament_id && o.sequence == m.sequence)
        {
            return Err(StoreError::Conflict("matches_sequence_tournament_id_key".into()));
        }
        if let Some(ext) = &m.external {
            if state.matches.iter().any(|o| {
                o.tournament_id == m.tournament_id
                    && o.external.as_ref().map(|e| &e.match_id) == Some(&ext.match_id)
            }) {
                return Err(StoreError::Conflict("matches_tournament_id_external_match_id_key".into()));
            }
        }
        state.matches.push(m.clone());
        Ok(())
    }

    fn match_by_id(&self, id: Uuid) -> Result<Option<Match>, StoreError> {
        Ok(lock(&self.state).matches.iter().find(|m| m.id == id).cloned())
    }

    fn match_by_message(&self, message_id: u64) -> Result<Option<Match>, StoreError> {
        Ok(lock(&self.state)
            .matches
            .iter()
            .find(|m| m.message_id == message_id)
            .cloned())
    }

    fn matches_in_tournament(&self, tournament_id: Uuid) -> Result<Vec<Match>, StoreError> {
        let mut matches: Vec<Match> = lock(&self.state)
            .matches
            .iter()
            .filter(|m| m.tournament_id == tournament_id)
            .cloned()
            .collect();
        matches.sort_by_key(|m| m.sequence);
        Ok(matches)
    }

    fn matches_with_team(&self, team_id: Uuid) -> Result<Vec<Match>, StoreError> {
        Ok(lock(&self.state)
            .matches
            .iter()
            .filter(|m| m.team1_id == team_id || m.team2_id == team_id)
            .cloned()
            .collect())
    }

    fn count_matches(&self, tournament_id: Uuid) -> Result<MatchCounts, StoreError> {
        let state = lock(&self.state);
        let mut counts = MatchCounts::default();
        for m in state.matches.iter().filter(|m| m.tournament_id == tournament_id) {
            match m.status {
                MatchStatus::Open => counts.open += 1,
                MatchStatus::Closed => counts.closed += 1,
                MatchStatus::Ended => counts.ended += 1,
            }
        }
        Ok(counts)
    }

    fn close_match(&self, match_id: Uuid, predictions: &[Prediction]) -> Result<bool, StoreError> {
        let mut state = lock(&self.state);
        match state
            .matches
            .iter_mut()
            .find(|m| m.id == match_id && m.status == MatchStatus::Open)
        {
            Some(m) => m.status = MatchStatus::Closed,
            None => return Ok(false),
        }
        for p in predictions {
            state
                .predictions
                .retain(|o| !(o.user_id == p.user_id && o.match_id == p.match_id));
            state.predictions.push(p.clone());
        }
        Ok(true)
    }

    fn end_match(&self, match_id: Uuid, result: i16, games_played: i16) -> Result<bool, StoreError> {
        let mut state = lock(&self.state);
        match state
            .matches
            .iter_mut()
            .find(|m| m.id == match_id && m.status == MatchStatus::Closed)
        {
            Some(m) => {
                m.status = MatchStatus::Ended;
                m.result = result;
                m.games_played = games_played;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn users_by_discord_ids(&self, discord_ids: &[u64]) -> Result<Vec<User>, StoreError> {
        Ok(lock(&self.state)
            .users
            .iter()
            .filter(|u| discord_ids.contains(&u.discord_id))
            .cloned()
            .collect())
    }

    fn upsert_user(&self, discord_id: u64, name: &str) -> Result<User, StoreError> {
        let mut state = lock(&self.state);
        if let Some(user) = state.users.iter_mut().find(|u| u.discord_id == discord_id) {
            user.name = name.to_string();
            return Ok(user.clone());
        }
        let user = User {
            id: Uuid::new_v4(),
            discord_id,
            name: name.to_string(),
        };
        state.users.push(user.clone());
        Ok(user)
    }

    fn predictions_for_match(&self, match_id: Uuid) -> Result<Vec<(User, Prediction)>, StoreError> {
        let state = lock(&self.state);
        Ok(state
            .predictions
            .iter()
            .filter(|p| p.match_id == match_id)
            .filter_map(|p| {
                let user = state.users.iter().find(|u| u.id == p.user_id)?;
                Some((user.clone(), p.clone()))
            })
            .collect())
    }

    fn scored_predictions(
        &self,
        tournament_id: Uuid,
        filter: &MatchFilter,
    ) -> Result<Vec<ScoredPrediction>, StoreError> {
        let state = lock(&self.state);
        let mut scored = Vec::new();
        for m in state.matches.iter().filter(|m| {
            m.tournament_id == tournament_id
                && m.status == MatchStatus::Ended
                && match filter {
                    MatchFilter::All => true,
                    MatchFilter::Tabs(tabs) => m.tab().map_or(false, |tab| tabs.iter().any(|t| t == tab)),
                }
        }) {
            for p in state.predictions.iter().filter(|p| p.match_id == m.id) {
                if let Some(user) = state.users.iter().find(|u| u.id == p.user_id) {
                    scored.push(ScoredPrediction {
                        user: user.clone(),
                        best_of: m.best_of,
                        result: m.result,
                        games_played: m.games_played,
                        team: p.team,
                        games: p.games,
                    });
                }
            }
        }
        Ok(scored)
    }
}

struct FakeMessage {
    channel_id: u64,
    content: String,
    reactions: Vec<(Emoji, Vec<ChatUser>)>,
}

#[derive(Default)]
struct ChatState {
    next_id: u64,
    messages: HashMap<u64, FakeMessage>,
    order: Vec<u64>,
    deleted: HashSet<u64>,
    fail_next_edit: Option<GatewayError>,
    fail_next_send: Option<GatewayError>,
    broken_edits: HashSet<u64>,
    refuse_emoji: bool,
    created_emoji: Vec<String>,
    managers: HashSet<u64>,
}

/// Records messages and reactions the way Discord would hold them.
pub struct FakeChat {
    state: Mutex<ChatState>,
}

impl FakeChat {
    pub fn new() -> FakeChat {
        FakeChat {
            state: Mutex::new(ChatState {
                next_id: 1000,
                ..ChatState::default()
            }),
        }
    }

    fn bot(&self) -> ChatUser {
        ChatUser {
            id: BOT_ID,
            name: "bot".into(),
            bot: true,
        }
    }

    pub fn fail_next_edit(&self, err: GatewayError) {
        lock(&self.state).fail_next_edit = Some(err);
    }

    /// Every later edit of this message fails, like an over-long content would.
    pub fn break_edits_of(&self, message_id: u64) {
        lock(&self.state).broken_edits.insert(message_id);
    }

    pub fn fail_next_send(&self, err: GatewayError) {
        lock(&self.state).fail_next_send = Some(err);
    }

    pub fn refuse_emoji(&self) {
        lock(&self.state).refuse_emoji = true;
    }

    pub fn created_emoji(&self) -> Vec<String> {
        lock(&self.state).created_emoji.clone()
    }

    pub fn grant_manage(&self, user_id: u64) {
        lock(&self.state).managers.insert(user_id);
    }

    /// A user reacting on a message.
    pub fn react(&self, message_id: u64, user: ChatUser, emoji: &Emoji) {
        let mut state = lock(&self.state);
        if let Some(message) = state.messages.get_mut(&message_id) {
            match message.reactions.iter_mut().find(|(e, _)| e == emoji) {
                Some((_, users)) => {
                    if !users.iter().any(|u| u.id == user.id) {
                        users.push(user);
                    }
                }
                None => message.reactions.push((emoji.clone(), vec![user])),
            }
        }
    }

    /// The reactions a user currently has on a message.
    pub fn reactions_of(&self, message_id: u64, user_id: u64) -> Vec<Emoji> {
        lock(&self.state)
            .messages
            .get(&message_id)
            .map(|m| {
                m.reactions
                    .iter()
                    .filter(|(_, users)| users.iter().any(|u| u.id == user_id))
                    .map(|(e, _)| e.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn content(&self, message_id: u64) -> Option<String> {
        lock(&self.state).messages.get(&message_id).map(|m| m.content.clone())
    }

    pub fn is_deleted(&self, message_id: u64) -> bool {
        lock(&self.state).deleted.contains(&message_id)
    }

    /// Live messages in a channel, oldest first.
    pub fn messages_in(&self, channel_id: u64) -> Vec<(u64, String)> {
        let state = lock(&self.state);
        state
            .order
            .iter()
            .filter_map(|id| {
                let m = state.messages.get(id)?;
                (m.channel_id == channel_id).then(|| (*id, m.content.clone()))
            })
            .collect()
    }

    /// Drops a message without the bot's involvement.
    pub fn delete_out_of_band(&self, message_id: u64) {
        lock(&self.state).messages.remove(&message_id);
    }
}

impl ChatGateway for FakeChat {
    fn current_user_id(&self) -> u64 {
        BOT_ID
    }

    fn send_message(&self, channel_id: u64, content: &str) -> Result<u64, GatewayError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_next_send.take() {
            return Err(err);
        }
        state.next_id += 1;
        let id = state.next_id;
        state.messages.insert(
            id,
            FakeMessage {
                channel_id,
                content: content.to_string(),
                reactions: Vec::new(),
            },
        );
        state.order.push(id);
        Ok(id)
    }

    fn edit_message(&self, _channel_id: u64, message_id: u64, content: &str) -> Result<(), GatewayError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_next_edit.take() {
            return Err(err);
        }
        if state.broken_edits.contains(&message_id) {
            return Err(GatewayError::Other("Invalid Form Body".into()));
        }
        let message = state.messages.get_mut(&message_id).ok_or(GatewayError::NotFound)?;
        message.content = content.to_string();
        Ok(())
    }

    fn fetch_message(&self, channel_id: u64, message_id: u64) -> Result<ChatMessage, GatewayError> {
        let state = lock(&self.state);
        let message = state.messages.get(&message_id).ok_or(GatewayError::NotFound)?;
        Ok(ChatMessage {
            id: message_id,
            channel_id,
            content: message.content.clone(),
            reactions: message
                .reactions
                .iter()
                .filter(|(_, users)| !users.is_empty())
                .map(|(emoji, users)| ReactionCount {
                    emoji: emoji.clone(),
                    count: users.len() as u64,
                    me: users.iter().any(|u| u.id == BOT_ID),
                })
                .collect(),
        })
    }

    fn delete_message(&self, _channel_id: u64, message_id: u64) -> Result<(), GatewayError> {
        let mut state = lock(&self.state);
        state.messages.remove(&message_id).ok_or(GatewayError::NotFound)?;
        state.deleted.insert(message_id);
        Ok(())
    }

    fn add_reaction(&self, _channel_id: u64, message_id: u64, emoji: &Emoji) -> Result<(), GatewayError> {
        if !lock(&self.state).messages.contains_key(&message_id) {
            return Err(GatewayError::NotFound);
        }
        self.react(message_id, self.bot(), emoji);
        Ok(())
    }

    fn remove_reaction(
        &self,
        _channel_id: u64,
        message_id: u64,
        user_id: u64,
        emoji: &Emoji,
    ) -> Result<(), GatewayError> {
        let mut state = lock(&self.state);
        let message = state.messages.get_mut(&message_id).ok_or(GatewayError::NotFound)?;
        for (e, users) in message.reactions.iter_mut() {
            if e == emoji {
                users.retain(|u| u.id != user_id);
            }
        }
        Ok(())
    }

    fn reaction_users(
        &self,
        _channel_id: u64,
        message_id: u64,
        emoji: &Emoji,
    ) -> Result<Vec<ChatUser>, GatewayError> {
        let state = lock(&self.state);
        let message = state.messages.get(&message_id).ok_or(GatewayError::NotFound)?;
        Ok(message
            .reactions
            .iter()
            .filter(|(e, _)| e == emoji)
            .flat_map(|(_, users)| users.iter().cloned())
            .collect())
    }

    fn create_emoji(&self, _guild_id: u64, name: &str, _image: &[u8]) -> Result<Emoji, GatewayError> {
        let mut state = lock(&self.state);
        if state.refuse_emoji {
            return Err(GatewayError::Forbidden);
        }
        state.created_emoji.push(name.to_string());
        state.next_id += 1;
        Ok(Emoji::Custom {
            id: state.next_id,
            name: name.to_string(),
            animated: false,
        })
    }

    fn can_manage_messages(&self, _guild_id: u64, user_id: u64) -> Result<bool, GatewayError> {
        Ok(lock(&self.state).managers.contains(&user_id))
    }
}

#[derive(Default)]
struct ScheduleState {
    pages: HashMap<String, Result<PageInfo, (String, String)>>,
    tournaments: HashMap<String, TournamentsRow>,
    teams: HashMap<String, Vec<TeamsRow>>,
    matches: HashMap<String, Vec<MatchScheduleRow>>,
    failing: HashSet<String>,
    match_queries: usize,
}

/// Canned wiki answers.
#[derive(Default)]
pub struct FakeSchedule {
    state: Mutex<ScheduleState>,
}

impl FakeSchedule {
    pub fn add_page(&self, title: &str) {
        lock(&self.state).pages.insert(
            title.to_string(),
            Ok(PageInfo {
                title: title.to_string(),
                page_id: 1,
            }),
        );
    }

    pub fn add_page_error(&self, title: &str, code: &str) {
        lock(&self.state)
            .pages
            .insert(title.to_string(), Err((code.to_string(), "refused".to_string())));
    }

    pub fn add_tournament(&self, overview_page: &str, name: &str) {
        lock(&self.state).tournaments.insert(
            overview_page.to_string(),
            TournamentsRow {
                name: name.to_string(),
                overview_page: overview_page.to_string(),
                region: None,
                league: None,
                date_start: None,
                date_end: None,
            },
        );
    }

    pub fn set_teams(&self, overview_page: &str, teams: Vec<TeamsRow>) {
        lock(&self.state).teams.insert(overview_page.to_string(), teams);
    }

    /// Serves a raw cargoquery body, read the way the wiki client reads it.
    pub fn set_payload(&self, overview_page: &str, body: serde_json::Value) {
        let rows = parse_match_schedule(cargo_titles(body).unwrap());
        self.set_matches(overview_page, rows);
    }

    pub fn set_matches(&self, overview_page: &str, rows: Vec<MatchScheduleRow>) {
        lock(&self.state).matches.insert(overview_page.to_string(), rows);
    }

    pub fn fail(&self, overview_page: &str) {
        lock(&self.state).failing.insert(overview_page.to_string());
    }

    pub fn match_queries(&self) -> usize {
        lock(&self.state).match_queries
    }
}

impl ScheduleSource for FakeSchedule {
    fn page_info(&self, page: &str) -> Result<PageInfo, WikiError> {
        match lock(&self.state).pages.get(page) {
            Some(Ok(info)) => Ok(info.clone()),
            Some(Err((code, info))) => Err(WikiError::Api {
                code: code.clone(),
                info: info.clone(),
            }),
            None => Err(WikiError::Api {
                code: "missingtitle".into(),
                info: "The page you specified doesn't exist.".into(),
            }),
        }
    }

    fn tournament(&self, overview_page: &str) -> Result<Option<TournamentsRow>, WikiError> {
        Ok(lock(&self.state).tournaments.get(overview_page).cloned())
    }

    fn tournament_teams(&self, overview_page: &str) -> Result<Vec<TeamsRow>, WikiError> {
        Ok(lock(&self.state)
            .teams
            .get(overview_page)
            .cloned()
            .unwrap_or_default())
    }

    fn upcoming_matches(
        &self,
        overview_page: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<MatchScheduleRow>, WikiError> {
        let mut state = lock(&self.state);
        state.match_queries += 1;
        if state.failing.contains(overview_page) {
            return Err(WikiError::Server("HTTP Error. Status code: 503.".into()));
        }
        let rows = state.matches.get(overview_page).cloned().unwrap_or_default();
        let tabs: HashSet<String> = rows
            .iter()
            .filter(|r| r.start <= cutoff)
            .map(|r| r.tab.clone())
            .collect();
        Ok(rows.into_iter().filter(|r| tabs.contains(&r.tab)).collect())
    }

    fn file(&self, _name: &str, _width: u32) -> Result<Vec<u8>, WikiError> {
        Ok(vec![0x89, b'P', b'N', b'G'])
    }
}
