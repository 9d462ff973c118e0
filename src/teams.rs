//! The per-guild team registry.

use tracing::{info, warn};
use uuid::Uuid;

use crate::emoji::Emoji;
use crate::error::{Error, Result};
use crate::gateway::paginate;
use crate::leaguepedia::TeamsRow;
use crate::models::Team;
use crate::render;
use crate::store::StoreError;
use crate::tournaments::TournamentManager;

const LOGO_WIDTH: u32 = 256;

/// Lower-cases a team code and rejects whitespace.
pub fn normalize_code(raw: &str) -> Result<String> {
    let code = raw.trim().to_lowercase();
    if code.is_empty() || code.chars().any(char::is_whitespace) {
        return Err(Error::InvalidCode(raw.to_string()));
    }
    Ok(code)
}

/// Guild emoji names allow letters, digits and underscores, at least two of them.
fn emoji_name(code: &str) -> String {
    let mut name: String = code
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    while name.len() < 2 {
        name.push('_');
    }
    name
}

fn conflict_to_exists(err: StoreError, code: &str) -> Error {
    match err {
        StoreError::Conflict(_) => Error::TeamExists(code.to_string()),
        other => other.into(),
    }
}

impl TournamentManager {
    pub fn team_by_code(&self, guild_id: u64, code: &str) -> Result<Team> {
        let code = normalize_code(code)?;
        self.store
            .team_by_code(guild_id, &code)?
            .ok_or(Error::UnknownTeam(code))
    }

    pub fn create_team(&self, guild_id: u64, name: &str, code: &str, emoji: &str) -> Result<Team> {
        let code = normalize_code(code)?;
        let emoji = Emoji::parse(emoji).ok_or_else(|| Error::InvalidEmoji(emoji.to_string()))?;
        let team = Team {
            id: Uuid::new_v4(),
            name: name.trim().to_string(),
            code,
            emoji,
            guild_id,
            external_page: None,
            bot_created: false,
        };
        self.store
            .insert_team(&team)
            .map_err(|err| conflict_to_exists(err, &team.code))?;
        info!(guild_id, code = %team.code, "team created");
        Ok(team)
    }

    /// Renames a team and rewrites every match message that shows it.
    pub fn edit_team_name(&self, guild_id: u64, code: &str, name: &str) -> Result<Team> {
        let mut team = self.team_by_code(guild_id, code)?;
        let name = name.trim();
        if team.name == name {
            return Err(Error::CantEditTeam {
                code: team.code,
                reason: "New name is the same as the current name.",
            });
        }
        team.name = name.to_string();
        self.store.update_team(&team)?;

        for m in self.store.matches_with_team(team.id)? {
            if let Err(err) = self.update_match_message(&m) {
                warn!(match_id = %m.id, "could not refresh match after rename: {}", err);
            }
        }
        Ok(team)
    }

    pub fn edit_team_code(&self, guild_id: u64, old_code: &str, new_code: &str) -> Result<Team> {
        let mut team = self.team_by_code(guild_id, old_code)?;
        let new_code = normalize_code(new_code)?;
        if team.code == new_code {
            return Err(Error::CantEditTeam {
                code: team.code,
                reason: "New code is the same as the current code.",
            });
        }
        team.code = new_code;
        self.store
            .update_team(&team)
            .map_err(|err| conflict_to_exists(err, &team.code))?;
        Ok(team)
    }

    /// Only for teams without matches, whose messages would lose their reactions.
    pub fn edit_team_emoji(&self, guild_id: u64, code: &str, emoji: &str) -> Result<Team> {
        let mut team = self.team_by_code(guild_id, code)?;
        let emoji = Emoji::parse(emoji).ok_or_else(|| Error::InvalidEmoji(emoji.to_string()))?;
        if !self.store.matches_with_team(team.id)?.is_empty() {
            return Err(Error::CantEditTeam {
                code: team.code,
                reason: "Cannot edit emoji for a team that is already in matches.",
            });
        }
        if team.emoji == emoji {
            return Err(Error::CantEditTeam {
                code: team.code,
                reason: "New emoji is the same as the current emoji.",
            });
        }
        team.emoji = emoji;
        self.store.update_team(&team)?;
        Ok(team)
    }

    pub fn delete_team(&self, guild_id: u64, code: &str) -> Result<Team> {
        let team = self.team_by_code(guild_id, code)?;
        if !self.store.matches_with_team(team.id)?.is_empty() {
            return Err(Error::TeamInUse(team.code));
        }
        self.store.delete_team(team.id)?;
        info!(guild_id, code = %team.code, "team deleted");
        Ok(team)
    }

    pub fn list_teams(&self, guild_id: u64) -> Result<Vec<String>> {
        let teams = self.store.teams_in_guild(guild_id)?;
        Ok(paginate(render::team_list_lines(&teams)))
    }

    /// Makes sure every team on the wiki roster exists in the guild.
    ///
    /// Returns false if any team could not be created, typically because the
    /// guild refused the emoji upload.
    pub fn sync_external_teams(&self, overview_page: &str, guild_id: u64) -> Result<bool> {
        let roster = self.schedule.tournament_teams(overview_page)?;
        let mut complete = true;
        for row in roster {
            if row.short.trim().is_empty() {
                warn!(team = %row.overview_page, "roster team without a short name");
                complete = false;
                continue;
            }
            let code = row.short.trim().to_lowercase();
            match self.store.team_by_code(guild_id, &code)? {
                Some(mut existing) => {
                    if existing.external_page.is_none() {
                        existing.external_page = Some(row.overview_page.clone());
                        self.store.update_team(&existing)?;
                        info!(guild_id, %code, "bound existing team to wiki page");
                    }
                }
                None => {
                    if let Err(err) = self.create_external_team(&row, &code, guild_id) {
                        warn!(guild_id, %code, "could not create team: {}", err);
                        complete = false;
                    }
                }
            }
        }
        Ok(complete)
    }

    fn create_external_team(&self, row: &TeamsRow, code: &str, guild_id: u64) -> Result<Team> {
        let logo = self
            .schedule
            .file(&format!("{}logo square.png", row.overview_page), LOGO_WIDTH)?;
        let emoji = self.chat.create_emoji(guild_id, &emoji_name(code), &logo)?;
        let team = Team {
            id: Uuid::new_v4(),
            name: row.name.clone(),
            code: code.to_string(),
            emoji,
            guild_id,
            external_page: Some(row.overview_page.clone()),
            bot_created: true,
        };
        self.store
            .insert_team(&team)
            .map_err(|err| conflict_to_exists(err, code))?;
        info!(guild_id, %code, "team imported from wiki");
        Ok(team)
    }
}
