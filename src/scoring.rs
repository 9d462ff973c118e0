//! Leaderboard computation over persisted predictions.

use std::collections::HashMap;

use uuid::Uuid;

use crate::models::{ScoringTable, User};
use crate::store::ScoredPrediction;

#[derive(Clone, Debug, PartialEq)]
pub struct LeaderboardEntry {
    pub user: User,
    pub score: i64,
    pub correct: i64,
    pub total: i64,
    pub rank: usize,
}

impl LeaderboardEntry {
    /// Share of correct team picks, `None` without any prediction.
    pub fn percentage(&self) -> Option<f64> {
        if self.total == 0 {
            None
        } else {
            Some(100.0 * self.correct as f64 / self.total as f64)
        }
    }
}

/// Scores every prediction on an ended match and ranks the users.
///
/// Sorted by score descending, then name ascending. Ties share a rank and the
/// next lower score is ranked after all of them (1, 2, 2, 4).
pub fn compute_leaderboard(table: &ScoringTable, predictions: &[ScoredPrediction]) -> Vec<LeaderboardEntry> {
    let mut by_user: HashMap<Uuid, LeaderboardEntry> = HashMap::new();

    for p in predictions {
        let entry = by_user.entry(p.user.id).or_insert_with(|| LeaderboardEntry {
            user: p.user.clone(),
            score: 0,
            correct: 0,
            total: 0,
            rank: 0,
        });
        entry.total += 1;
        if p.team == p.result {
            entry.correct += 1;
            entry.score += i64::from(table.team_points(p.best_of));
        }
        if let Some(points) = table.games_points(p.best_of) {
            if p.games == p.games_played {
                entry.score += i64::from(points);
            }
        }
    }

    let mut entries: Vec<LeaderboardEntry> = by_user.into_values().collect();
    entries.sort_by(|a, b| {
        b.score
            .cmp(&a.score)
            .then_with(|| a.user.name.cmp(&b.user.name))
            .then_with(|| a.user.discord_id.cmp(&b.user.discord_id))
    });

    let mut previous_score = None;
    let mut rank = 0;
    for (index, entry) in entries.iter_mut().enumerate() {
        if previous_score != Some(entry.score) {
            rank = index + 1;
            previous_score = Some(entry.score);
        }
        entry.rank = rank;
    }
    entries
}

/// Total score per user, for announcements.
pub fn scores_by_user(entries: &[LeaderboardEntry]) -> HashMap<Uuid, i64> {
    entries.iter().map(|e| (e.user.id, e.score)).collect()
}
