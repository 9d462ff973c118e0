//! Periodic sync of externally sourced tournaments with the wiki schedule.

use std::collections::{HashMap, HashSet};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, sleep, JoinHandle};
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::error::Result;
use crate::leaguepedia::{MatchScheduleRow, ScheduleSource};
use crate::models::{BestOf, ExternalMatchRef, Match, MatchStatus, Team, Tournament};
use crate::tournaments::TournamentManager;

const SHUTDOWN_POLL: Duration = Duration::from_millis(500);

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Report {
    pub created: usize,
    pub closed: usize,
    pub ended: usize,
    pub failed: usize,
}

impl Report {
    fn absorb(&mut self, other: Report) {
        self.created += other.created;
        self.closed += other.closed;
        self.ended += other.ended;
        self.failed += other.failed;
    }
}

pub struct Reconciler {
    manager: Arc<TournamentManager>,
    schedule: Arc<dyn ScheduleSource>,
    /// Matches already reported as mismatched.
    notified: Mutex<HashSet<Uuid>>,
}

impl Reconciler {
    pub fn new(manager: Arc<TournamentManager>, schedule: Arc<dyn ScheduleSource>) -> Reconciler {
        Reconciler {
            manager,
            schedule,
            notified: Mutex::new(HashSet::new()),
        }
    }

    /// One pass over every running external tournament. A failing tournament
    /// is logged and counted, the others are still processed.
    pub fn run_pass(&self, now: DateTime<Utc>) -> Result<Report> {
        let tournaments = self.manager.store().running_external_tournaments()?;
        let mut report = Report::default();
        for tournament in &tournaments {
            match self.reconcile_tournament(tournament, now) {
                Ok(r) => report.absorb(r),
                Err(err) => {
                    warn!(tournament = %tournament.name, "reconciliation failed: {}", err);
                    report.failed += 1;
                }
            }
        }
        if let Err(err) = self.forget_settled(&tournaments) {
            debug!("could not prune mismatch notices: {}", err);
        }
        if report != Report::default() {
            info!(?report, "reconciliation pass finished");
        }
        Ok(report)
    }

    /// Drops mismatch notices for matches that ended or left the running tournaments.
    fn forget_settled(&self, tournaments: &[Tournament]) -> Result<()> {
        let mut live = HashSet::new();
        for tournament in tournaments {
            for m in self.manager.store().matches_in_tournament(tournament.id)? {
                if m.status != MatchStatus::Ended {
                    live.insert(m.id);
                }
            }
        }
        self.notified
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .retain(|id| live.contains(id));
        Ok(())
    }

    pub fn reconcile_tournament(&self, tournament: &Tournament, now: DateTime<Utc>) -> Result<Report> {
        let mut report = Report::default();
        let page = match &tournament.external_page {
            Some(page) => page,
            None => return Ok(report),
        };
        let settings = self.manager.settings();
        let rows = self.schedule.upcoming_matches(page, now + settings.lookahead)?;
        debug!(tournament = %tournament.name, rows = rows.len(), "fetched schedule");

        let local: HashMap<String, Match> = self
            .manager
            .store()
            .matches_in_tournament(tournament.id)?
            .into_iter()
            .filter_map(|m| Some((m.external.as_ref()?.match_id.clone(), m)))
            .collect();
        let teams = self.manager.store().teams_in_guild(tournament.guild_id)?;

        for row in &rows {
            let outcome = match local.get(&row.match_id) {
                None => self.create(tournament, row, &teams).map(|created| {
                    if created {
                        report.created += 1;
                    }
                }),
                Some(m) => self.advance(tournament, m, row, &teams, now, &mut report),
            };
            if let Err(err) = outcome {
                warn!(tournament = %tournament.name, match_id = %row.match_id, "could not sync match: {}", err);
                report.failed += 1;
            }
        }

        if report.ended > 0 {
            if let Err(err) = self.manager.update_tournament_message(tournament) {
                warn!(tournament = %tournament.name, "could not refresh tournament message: {}", err);
            }
        }
        Ok(report)
    }

    fn create(&self, tournament: &Tournament, row: &MatchScheduleRow, teams: &[Team]) -> Result<bool> {
        if row.winner.is_some() {
            return Ok(false);
        }
        let (team1, team2) = match (find_team(teams, &row.team1), find_team(teams, &row.team2)) {
            (Some(team1), Some(team2)) => (team1, team2),
            _ => {
                warn!(tournament = %tournament.name, team1 = %row.team1, team2 = %row.team2, "schedule team not known locally");
                return Ok(false);
            }
        };
        let best_of = BestOf::new(row.best_of)?;
        let name = format!("{} Match {}", row.tab, row.n_match_in_tab);
        self.manager.start_match(
            tournament,
            &name,
            team1,
            team2,
            best_of,
            Some(ExternalMatchRef {
                match_id: row.match_id.clone(),
                tab: row.tab.clone(),
            }),
        )?;
        Ok(true)
    }

    fn advance(
        &self,
        tournament: &Tournament,
        m: &Match,
        row: &MatchScheduleRow,
        teams: &[Team],
        now: DateTime<Utc>,
        report: &mut Report,
    ) -> Result<()> {
        match (row.winner, m.status) {
            (Some(_), MatchStatus::Ended) => Ok(()),
            (Some(winner), _) => {
                // a forfeit counts as the minimum win
                let games = match (row.games_played(), row.forfeit) {
                    (Some(games), _) => games,
                    (None, true) => m.best_of.win_games(),
                    (None, false) => return Ok(()),
                };
                if !same_slots(m, row, teams) {
                    self.notify_mismatch(tournament, m);
                    return Ok(());
                }
                self.manager.finish_match(m, winner, games)?;
                report.ended += 1;
                Ok(())
            }
            (None, MatchStatus::Open) if row.start - self.manager.settings().close_buffer <= now => {
                self.manager.close_match(m)?;
                report.closed += 1;
                Ok(())
            }
            (None, _) => Ok(()),
        }
    }

    fn notify_mismatch(&self, tournament: &Tournament, m: &Match) {
        let first = self
            .notified
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .insert(m.id);
        if !first {
            return;
        }
        warn!(tournament = %tournament.name, sequence = m.sequence, "schedule teams differ from the local match");
        let channel_id = tournament.updates_channel_id.unwrap_or(tournament.channel_id);
        self.manager.post(
            channel_id,
            vec![format!(
                "There was a problem closing match {} in tournament {}.",
                m.sequence, tournament.name
            )],
        );
    }

    /// Runs passes on a dedicated thread until `shutdown` is set.
    pub fn spawn(self: Arc<Self>, interval: Duration, shutdown: Arc<AtomicBool>) -> JoinHandle<()> {
        thread::spawn(move || {
            info!(interval_secs = interval.as_secs(), "reconciliation loop started");
            while !shutdown.load(Ordering::Relaxed) {
                match panic::catch_unwind(AssertUnwindSafe(|| self.run_pass(Utc::now()))) {
                    Ok(Ok(_)) => {}
                    Ok(Err(err)) => error!("reconciliation pass failed: {}", err),
                    Err(_) => error!("reconciliation pass panicked"),
                }
                let started = Instant::now();
                while started.elapsed() < interval && !shutdown.load(Ordering::Relaxed) {
                    sleep(SHUTDOWN_POLL.min(interval));
                }
            }
            info!("reconciliation loop stopped");
        })
    }
}

fn find_team<'a>(teams: &'a [Team], external: &str) -> Option<&'a Team> {
    teams
        .iter()
        .find(|t| t.external_page.as_deref() == Some(external))
}

/// Whether the local match has the schedule's teams in the same slots.
fn same_slots(m: &Match, row: &MatchScheduleRow, teams: &[Team]) -> bool {
    let page_of = |id: Uuid| {
        teams
            .iter()
            .find(|t| t.id == id)
            .and_then(|t| t.external_page.as_deref())
    };
    page_of(m.team1_id) == Some(row.team1.as_str()) && page_of(m.team2_id) == Some(row.team2.as_str())
}
