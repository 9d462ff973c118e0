//! Pending "which team won" dialogs.
//!
//! Entries live in memory only, keyed by the dialog message, and expire after
//! a fixed time so abandoned dialogs do not pile up.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use tracing::{info, warn};
use uuid::Uuid;

use crate::emoji::Emoji;
use crate::error::{Error, Result};
use crate::models::{BestOf, Match, MatchStatus};
use crate::render;
use crate::tournaments::TournamentManager;
use crate::votes::{choice_symbols, Choice};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PendingEnd {
    pub match_id: Uuid,
    pub channel_id: u64,
    opened: Instant,
}

pub struct Dialogs {
    ttl: Duration,
    entries: Mutex<HashMap<u64, PendingEnd>>,
}

impl Dialogs {
    pub fn new(ttl: Duration) -> Dialogs {
        Dialogs {
            ttl,
            entries: Mutex::new(HashMap::new()),
        }
    }

    fn entries(&self) -> std::sync::MutexGuard<'_, HashMap<u64, PendingEnd>> {
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn purge(&self, entries: &mut HashMap<u64, PendingEnd>, now: Instant) {
        let ttl = self.ttl;
        entries.retain(|_, entry| now.duration_since(entry.opened) < ttl);
    }

    pub fn insert(&self, message_id: u64, match_id: Uuid, channel_id: u64) {
        self.insert_at(message_id, match_id, channel_id, Instant::now());
    }

    fn insert_at(&self, message_id: u64, match_id: Uuid, channel_id: u64, now: Instant) {
        let mut entries = self.entries();
        self.purge(&mut entries, now);
        entries.insert(
            message_id,
            PendingEnd {
                match_id,
                channel_id,
                opened: now,
            },
        );
    }

    pub fn get(&self, message_id: u64) -> Option<PendingEnd> {
        self.get_at(message_id, Instant::now())
    }

    fn get_at(&self, message_id: u64, now: Instant) -> Option<PendingEnd> {
        let mut entries = self.entries();
        self.purge(&mut entries, now);
        entries.get(&message_id).cloned()
    }

    pub fn has_match(&self, match_id: Uuid) -> bool {
        let mut entries = self.entries();
        self.purge(&mut entries, Instant::now());
        entries.values().any(|e| e.match_id == match_id)
    }

    pub fn remove(&self, message_id: u64) -> Option<PendingEnd> {
        self.entries().remove(&message_id)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Posts the dialog for a match, unless one is already waiting.
    pub fn open(&self, manager: &TournamentManager, m: &Match, channel_id: u64) -> Result<bool> {
        if self.has_match(m.id) {
            return Ok(false);
        }
        let (team1, team2) = manager.teams_of(m)?;
        let message_id = manager.chat().send_message(channel_id, &render::end_dialog_text(m))?;
        self.insert(message_id, m.id, channel_id);

        let mut symbols = choice_symbols(m, &team1, &team2);
        symbols.push((Choice::Team(0), Emoji::confirm()));
        manager.add_choice_reactions(channel_id, message_id, &symbols);
        Ok(true)
    }

    /// Handles a ✅ on a dialog message.
    ///
    /// Returns `Ok(None)` when the reaction does not concern a dialog, the
    /// ended match on success, and a selection error when the user's choices
    /// are incomplete. A rejected ✅ is taken back so it can be pressed again.
    pub fn confirm(
        &self,
        manager: &TournamentManager,
        guild_id: u64,
        message_id: u64,
        user_id: u64,
        emoji: &Emoji,
    ) -> Result<Option<Match>> {
        if *emoji != Emoji::confirm() || user_id == manager.chat().current_user_id() {
            return Ok(None);
        }
        let pending = match self.get(message_id) {
            Some(pending) => pending,
            None => return Ok(None),
        };
        let chat = manager.chat();
        if !chat.can_manage_messages(guild_id, user_id)? {
            return Ok(None);
        }

        let m = match manager.store().match_by_id(pending.match_id)? {
            Some(m) if m.status != MatchStatus::Ended => m,
            _ => {
                self.remove(message_id);
                return Ok(None);
            }
        };

        let outcome = self.read_selection(manager, &pending, message_id, user_id, &m).and_then(|(winner, games)| {
            manager.end_match(&m, winner, games)
        });
        match outcome {
            Ok(ended) => {
                self.remove(message_id);
                if let Err(err) = chat.delete_message(pending.channel_id, message_id) {
                    warn!(message_id, "could not delete end-match dialog: {}", err);
                }
                info!(match_id = %ended.id, "match ended through dialog");
                Ok(Some(ended))
            }
            Err(err) => {
                if let Err(remove_err) = chat.remove_reaction(pending.channel_id, message_id, user_id, emoji) {
                    warn!(message_id, "could not reset confirmation: {}", remove_err);
                }
                Err(err)
            }
        }
    }

    /// The confirming user's own reactions, read back from the dialog message.
    fn read_selection(
        &self,
        manager: &TournamentManager,
        pending: &PendingEnd,
        message_id: u64,
        user_id: u64,
        m: &Match,
    ) -> Result<(i16, i16)> {
        let (team1, team2) = manager.teams_of(m)?;
        let mut teams = Vec::new();
        let mut games = Vec::new();
        for (choice, emoji) in choice_symbols(m, &team1, &team2) {
            let users = manager.chat().reaction_users(pending.channel_id, message_id, &emoji)?;
            if !users.iter().any(|u| u.id == user_id) {
                continue;
            }
            match choice {
                Choice::Team(team) => teams.push(team),
                Choice::Games(count) => games.push(count),
            }
        }

        let winner = match teams.as_slice() {
            [] => return Err(Error::DialogSelection("You must select a team!")),
            [team] => *team,
            _ => return Err(Error::DialogSelection("You can only select one team!")),
        };
        let games = if m.best_of == BestOf::One {
            1
        } else {
            match games.as_slice() {
                [] => return Err(Error::DialogSelection("You must select an amount of games!")),
                [count] => *count,
                _ => return Err(Error::DialogSelection("You can only select one amount of games!")),
            }
        };
        Ok((winner, games))
    }
}
