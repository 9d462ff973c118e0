//! Turns the reactions on a match message into predictions.

use std::collections::HashMap;
use std::thread;

use tracing::{debug, warn};

use crate::emoji::Emoji;
use crate::error::Result;
use crate::gateway::{ChatGateway, ChatUser, GatewayError};
use crate::models::{Match, Prediction, Team};
use crate::store::Store;

/// What a reaction on a match message means.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Choice {
    Team(i16),
    Games(i16),
}

impl Choice {
    pub fn same_kind(self, other: Choice) -> bool {
        matches!(
            (self, other),
            (Choice::Team(_), Choice::Team(_)) | (Choice::Games(_), Choice::Games(_))
        )
    }
}

/// The reaction symbols of a match in visiting order: team 1, team 2, then games ascending.
pub fn choice_symbols(m: &Match, team1: &Team, team2: &Team) -> Vec<(Choice, Emoji)> {
    let mut symbols = vec![
        (Choice::Team(1), team1.emoji.clone()),
        (Choice::Team(2), team2.emoji.clone()),
    ];
    symbols.extend(
        m.best_of
            .games_choices()
            .into_iter()
            .map(|(games, emoji)| (Choice::Games(games), emoji)),
    );
    symbols
}

pub fn classify(symbols: &[(Choice, Emoji)], emoji: &Emoji) -> Option<Choice> {
    symbols
        .iter()
        .rev()
        .find(|(_, e)| e == emoji)
        .map(|(choice, _)| *choice)
}

/// One user's choices as read from the message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Ballot {
    pub user: ChatUser,
    pub team: i16,
    pub games: i16,
}

/// Folds reaction lists into one ballot per user, skipping bots.
///
/// Lists are applied in order, so when a user holds several reactions of one
/// kind the last one visited wins.
pub fn tally(reactions: Vec<(Choice, Vec<ChatUser>)>, bot_id: u64) -> Vec<Ballot> {
    let mut ballots: HashMap<u64, Ballot> = HashMap::new();
    for (choice, users) in reactions {
        for user in users {
            if user.bot || user.id == bot_id {
                continue;
            }
            let ballot = ballots.entry(user.id).or_insert_with(|| Ballot {
                user: user.clone(),
                team: 0,
                games: 0,
            });
            match choice {
                Choice::Team(team) => ballot.team = team,
                Choice::Games(games) => ballot.games = games,
            }
        }
    }
    let mut ballots: Vec<Ballot> = ballots.into_values().collect();
    ballots.sort_by_key(|b| b.user.id);
    ballots
}

/// Fetches the users behind each present reaction, a few requests at a time.
pub fn fetch_reactions(
    chat: &dyn ChatGateway,
    channel_id: u64,
    message_id: u64,
    symbols: &[(Choice, Emoji)],
    concurrency: usize,
) -> std::result::Result<Vec<(Choice, Vec<ChatUser>)>, GatewayError> {
    let message = chat.fetch_message(channel_id, message_id)?;
    let present: Vec<&(Choice, Emoji)> = symbols
        .iter()
        .filter(|(_, emoji)| message.has_reaction(emoji))
        .collect();

    let mut reactions = Vec::with_capacity(present.len());
    for chunk in present.chunks(concurrency.max(1)) {
        let results = thread::scope(|scope| {
            let handles: Vec<_> = chunk
                .iter()
                .map(|(choice, emoji)| {
                    let choice = *choice;
                    scope.spawn(move || (choice, chat.reaction_users(channel_id, message_id, emoji)))
                })
                .collect();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .unwrap_or_else(|_| (Choice::Team(0), Err(GatewayError::Other("reaction fetch panicked".into()))))
                })
                .collect::<Vec<_>>()
        });
        for (choice, users) in results {
            reactions.push((choice, users?));
        }
    }
    Ok(reactions)
}

/// Reads the votes on a match message and registers every voter.
///
/// Returns one prediction per user; persisting them is left to the status
/// transition so both happen atomically. A deleted match message yields no
/// predictions.
pub fn collect_predictions(
    store: &dyn Store,
    chat: &dyn ChatGateway,
    channel_id: u64,
    m: &Match,
    team1: &Team,
    team2: &Team,
    concurrency: usize,
) -> Result<Vec<Prediction>> {
    let symbols = choice_symbols(m, team1, team2);
    let reactions = match fetch_reactions(chat, channel_id, m.message_id, &symbols, concurrency) {
        Ok(reactions) => reactions,
        Err(err) if err.is_soft() => {
            warn!(match_id = %m.id, "match message unavailable, recording no predictions: {}", err);
            return Ok(Vec::new());
        }
        Err(err) => return Err(err.into()),
    };
    let ballots = tally(reactions, chat.current_user_id());

    let ids: Vec<u64> = ballots.iter().map(|b| b.user.id).collect();
    let known: HashMap<u64, _> = store
        .users_by_discord_ids(&ids)?
        .into_iter()
        .map(|u| (u.discord_id, u))
        .collect();

    let mut predictions = Vec::with_capacity(ballots.len());
    for ballot in ballots {
        let user = match known.get(&ballot.user.id) {
            Some(user) if user.name == ballot.user.name => user.clone(),
            _ => store.upsert_user(ballot.user.id, &ballot.user.name)?,
        };
        predictions.push(Prediction {
            user_id: user.id,
            match_id: m.id,
            team: ballot.team,
            games: ballot.games,
        });
    }
    debug!(match_id = %m.id, count = predictions.len(), "collected predictions");
    Ok(predictions)
}
