//! Chat text for tournaments, matches and listings.
//!
//! Everything here is pure so the exact layout can be checked in tests.

use crate::gateway::{paginate, MESSAGE_LIMIT};
use crate::leaguepedia::page_link;
use crate::models::{Match, MatchStatus, ScoringTable, Team, Tournament, TournamentStatus};
use crate::scoring::LeaderboardEntry;

/// A match together with its two teams.
#[derive(Clone, Copy, Debug)]
pub struct MatchView<'a> {
    pub m: &'a Match,
    pub team1: &'a Team,
    pub team2: &'a Team,
}

impl<'a> MatchView<'a> {
    /// `(winner, loser)` once the match has ended.
    pub fn winner_loser(&self) -> Option<(&'a Team, &'a Team)> {
        match (self.m.status, self.m.result) {
            (MatchStatus::Ended, 1) => Some((self.team1, self.team2)),
            (MatchStatus::Ended, 2) => Some((self.team2, self.team1)),
            _ => None,
        }
    }

    /// Games won by team 1 and team 2.
    fn score_line(&self) -> (i16, i16) {
        if self.m.result == 1 {
            (self.m.win_games(), self.m.lose_games())
        } else {
            (self.m.lose_games(), self.m.win_games())
        }
    }
}

fn percentage_text(entry: &LeaderboardEntry) -> String {
    match entry.percentage() {
        Some(pct) => format!("{:.1}%", pct),
        None => "-".to_string(),
    }
}

/// The fixed-width leaderboard lines; column widths fit the widest row.
pub fn leaderboard_lines(board: &[LeaderboardEntry]) -> Vec<String> {
    let rank_width = board.len().to_string().len();
    let width = |f: &dyn Fn(&LeaderboardEntry) -> usize| board.iter().map(f).max().unwrap_or(0);
    let name_width = width(&|e| e.user.name.chars().count());
    let score_width = width(&|e| e.score.to_string().len());
    let correct_width = width(&|e| format!("{}/{}", e.correct, e.total).len());
    let percent_width = width(&|e| percentage_text(e).len());

    board
        .iter()
        .map(|e| {
            format!(
                "{:>rw$}  -  {:<nw$}  {:>sw$} points  -  {:>cw$} correct ({:>pw$})",
                e.rank,
                e.user.name,
                e.score,
                format!("{}/{}", e.correct, e.total),
                percentage_text(e),
                rw = rank_width,
                nw = name_width,
                sw = score_width,
                cw = correct_width,
                pw = percent_width,
            )
        })
        .collect()
}

const LEADERBOARD_TITLE: &str = "***Leaderboard***";
const INFO_FOOTER: &str = "`This message does not get updated.`";
/// "```c\n" and "\n```" around the rows.
const CODE_BLOCK_OVERHEAD: usize = 9;

fn code_block(lines: &[String]) -> String {
    format!("```c\n{}\n```", lines.join("\n"))
}

/// The leaderboard as one code block of at most `budget` bytes. Rows that do
/// not fit are summarized on a last `+ N more` row.
fn capped_leaderboard_block(board: &[LeaderboardEntry], budget: usize) -> Option<String> {
    if board.is_empty() {
        return None;
    }
    let lines = leaderboard_lines(board);
    let full = code_block(&lines);
    if full.len() <= budget {
        return Some(full);
    }
    let reserve = format!("+ {} more", lines.len()).len() + 1;
    let mut used = CODE_BLOCK_OVERHEAD + reserve;
    if used > budget {
        return None;
    }
    let mut kept = 0;
    for line in &lines {
        if used + line.len() + 1 > budget {
            break;
        }
        used += line.len() + 1;
        kept += 1;
    }
    let mut shown = lines[..kept].to_vec();
    shown.push(format!("+ {} more", lines.len() - kept));
    Some(code_block(&shown))
}

/// The full leaderboard as code blocks that each fit in one message.
pub fn leaderboard_blocks(board: &[LeaderboardEntry]) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut current: Vec<String> = Vec::new();
    let mut used = CODE_BLOCK_OVERHEAD;
    for line in leaderboard_lines(board) {
        if !current.is_empty() && used + line.len() + 1 > MESSAGE_LIMIT {
            blocks.push(code_block(&current));
            current.clear();
            used = CODE_BLOCK_OVERHEAD;
        }
        used += line.len() + 1;
        current.push(line);
    }
    if !current.is_empty() {
        blocks.push(code_block(&current));
    }
    blocks
}

pub fn scoring_table_block(table: &ScoringTable) -> String {
    format!(
        "***Scoring Table***\n```Correct team - BO1: {}\nCorrect team - BO3: {}\tCorrect number of games - BO3: {}\nCorrect team - BO5: {}\tCorrect number of games - BO5: {}```\n",
        table.bo1_team, table.bo3_team, table.bo3_games, table.bo5_team, table.bo5_games
    )
}

pub fn tournament_header(tournament: &Tournament, wiki_url: &str) -> String {
    let mut header = format!("**{}**", tournament.name);
    if let Some(page) = &tournament.external_page {
        header.push_str(&format!(" (<{}>)", page_link(wiki_url, page)));
    }
    if tournament.status == TournamentStatus::Ended {
        header.push_str(" - Ended");
    }
    header
}

fn tournament_intro(tournament: &Tournament, wiki_url: &str) -> String {
    format!(
        "{}\n\n{}",
        tournament_header(tournament, wiki_url),
        scoring_table_block(&tournament.scoring).trim_end()
    )
}

/// The live tournament message; a long leaderboard is cut to fit one message.
pub fn tournament_text(tournament: &Tournament, wiki_url: &str, board: &[LeaderboardEntry]) -> String {
    let mut text = tournament_intro(tournament, wiki_url);
    let budget = MESSAGE_LIMIT.saturating_sub(text.len() + LEADERBOARD_TITLE.len() + 2);
    if let Some(block) = capped_leaderboard_block(board, budget) {
        text.push('\n');
        text.push_str(LEADERBOARD_TITLE);
        text.push('\n');
        text.push_str(&block);
    }
    text
}

/// A one-off copy of the tournament message with the whole leaderboard,
/// split between messages only at code block boundaries.
pub fn tournament_info_pages(tournament: &Tournament, wiki_url: &str, board: &[LeaderboardEntry]) -> Vec<String> {
    let mut parts = vec![tournament_intro(tournament, wiki_url)];
    if !board.is_empty() {
        parts.push(LEADERBOARD_TITLE.to_string());
        parts.extend(leaderboard_blocks(board));
    }
    parts.push(INFO_FOOTER.to_string());
    paginate(parts)
}

/// Leaderboard restricted to some schedule tabs.
pub fn tab_leaderboard_text(tournament: &Tournament, tabs: &[String], board: &[LeaderboardEntry]) -> String {
    let mut text = format!("**{} Leaderboard", tournament.name);
    if !tabs.is_empty() {
        text.push_str(" - ");
        text.push_str(&tabs.join(" "));
    }
    text.push_str("**");
    let budget = MESSAGE_LIMIT.saturating_sub(text.len() + 2);
    if let Some(block) = capped_leaderboard_block(board, budget) {
        text.push_str("\n\n");
        text.push_str(&block);
    }
    text
}

pub fn match_text(view: MatchView<'_>) -> String {
    let MatchView { m, team1, team2 } = view;
    let mut header = format!("{}. {}", m.sequence, m.name);
    let (mut left, mut right) = (team1.name.clone(), team2.name.clone());

    match m.status {
        MatchStatus::Open => {}
        MatchStatus::Closed => header.push_str(" - Closed"),
        MatchStatus::Ended => {
            let (games1, games2) = view.score_line();
            header.push_str(&format!(" - Result: {}-{}", games1, games2));
            if m.result == 1 {
                left = format!("**{}**", team1.name);
                right = format!("~~{}~~", team2.name);
            } else {
                left = format!("~~{}~~", team1.name);
                right = format!("**{}**", team2.name);
            }
        }
    }

    format!("{}\n{} {} vs {} {}", header, team1.emoji, left, right, team2.emoji)
}

/// The question posted when a match is being ended interactively.
pub fn end_dialog_text(m: &Match) -> String {
    let mut text = format!(
        "**Match End:** Which team won in match {} \"{}\"",
        m.sequence, m.name
    );
    if m.best_of.count() > 1 {
        text.push_str(" and in how many games");
    }
    text.push_str("? Press ✅ after you're done to end the match.");
    text
}

/// Lines announcing a finished match. Names come with their running total.
pub fn match_end_lines(
    tournament_name: &str,
    view: MatchView<'_>,
    team_correct: &[(String, i64)],
    games_correct: Option<&[(String, i64)]>,
) -> Vec<String> {
    let m = view.m;
    let (winner, loser) = match view.winner_loser() {
        Some(pair) => pair,
        None => return Vec::new(),
    };

    let mut lines = vec![
        format!(
            "**Results: {} Match {} ({})**",
            tournament_name, m.sequence, m.name
        ),
        format!(
            "**{}** defeated **{}** by **{}-{}**",
            winner.name,
            loser.name,
            m.win_games(),
            m.lose_games()
        ),
        String::new(),
    ];

    let mut section = |title: &str, nobody: &str, users: &[(String, i64)]| {
        if users.is_empty() {
            lines.push(format!("**{}**", nobody));
        } else {
            lines.push(format!("**{}**", title));
            lines.extend(users.iter().map(|(name, score)| format!("{} - {} points", name, score)));
        }
    };

    section(
        "The following player(s) predicted the correct winning team:",
        "No one predicted the correct team",
        team_correct,
    );
    if let Some(games_correct) = games_correct {
        section(
            "The following player(s) predicted the correct amount of games:",
            "No one predicted the correct amount of games",
            games_correct,
        );
    }
    lines
}

fn match_list_line(view: MatchView<'_>) -> String {
    let MatchView { m, team1, team2 } = view;
    let side1 = format!("{} {}", team1.emoji, team1.name);
    let side2 = format!("{} {}", team2.name, team2.emoji);
    match view.winner_loser() {
        Some(_) => {
            let (games1, games2) = view.score_line();
            let (side1, side2) = if m.result == 1 {
                (format!("**{}**", side1), side2)
            } else {
                (side1, format!("**{}**", side2))
            };
            format!(
                "{}. {}: {} vs {} - {} - Result: {}-{}",
                m.sequence, m.name, side1, side2, m.best_of, games1, games2
            )
        }
        None => format!("{}. {}: {} vs {} - {}", m.sequence, m.name, side1, side2, m.best_of),
    }
}

/// Matches grouped by status, each group in sequence order.
pub fn match_list_lines(tournament_name: &str, views: &[MatchView<'_>]) -> Vec<String> {
    let mut lines = vec![format!("***{} Matches***", tournament_name)];
    let sections = [
        (MatchStatus::Ended, "**Ended Matches:**"),
        (MatchStatus::Closed, "**Closed Matches:**"),
        (MatchStatus::Open, "**Open Matches:**"),
    ];
    for (status, title) in sections {
        let mut group: Vec<&MatchView<'_>> = views.iter().filter(|v| v.m.status == status).collect();
        if group.is_empty() {
            continue;
        }
        group.sort_by_key(|v| v.m.sequence);
        lines.push(String::new());
        lines.push(title.to_string());
        lines.extend(group.into_iter().map(|v| match_list_line(*v)));
    }
    if views.is_empty() {
        lines.push("There are no matches in this tournament.".to_string());
    }
    lines
}

pub fn tournament_list_lines(tournaments: &[Tournament]) -> Vec<String> {
    if tournaments.is_empty() {
        return vec!["There are no tournaments in this server.".to_string()];
    }
    let mut lines = vec!["**Tournaments:**".to_string()];
    for t in tournaments {
        let mut line = format!("**{}** - Channel: <#{}>", t.name, t.channel_id);
        if t.status == TournamentStatus::Ended {
            line.push_str(" - Ended");
        }
        lines.push(line);
    }
    lines
}

pub fn team_list_lines(teams: &[Team]) -> Vec<String> {
    if teams.is_empty() {
        return vec!["`No teams found.`".to_string()];
    }
    teams
        .iter()
        .map(|t| format!("{} {} - Code: `{}`", t.emoji, t.name, t.code))
        .collect()
}
