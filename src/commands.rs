//! Chat commands, parsed from message text and run against the core.

use std::sync::OnceLock;

use chrono::Utc;
use regex::Regex;
use tracing::{debug, warn};

use crate::app::App;
use crate::error::{Error, Result};
use crate::models::{BestOf, MatchStatus};

const HELP: &str = "**Commands**
`tournament|tr start <name or Leaguepedia link>` - start a tournament in this channel
`tournament|tr end` - end this channel's tournament
`tournament|tr info [name]` - show a tournament
`tournament|tr setupdates <name>` - post match results in this channel
`tournament|tr list` - list tournaments
`match|m start <name> <team1> <team2> <best of>` - start a match
`match|m close <ids>` - close predictions, e.g. `1 3-5`
`match|m end <ids>` - choose the winners of matches
`match|m list [tournament]` - list matches
`team|tm new <name> <code> <emoji>` - add a team
`team|tm edit name|code|emoji <code> <value>` - edit a team
`team|tm delete <code>` - delete a team
`team|tm list` - list teams";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    TournamentStart { name_or_link: String },
    TournamentEnd,
    TournamentInfo { name: Option<String> },
    TournamentSetUpdates { name: String },
    TournamentList,
    MatchStart { name: String, team1: String, team2: String, best_of: BestOf },
    MatchClose { ids: Vec<i32> },
    MatchEnd { ids: Vec<i32> },
    MatchFix { id: i32 },
    MatchList { name: Option<String> },
    TeamNew { name: String, code: String, emoji: String },
    TeamEditName { code: String, name: String },
    TeamEditCode { code: String, new_code: String },
    TeamEditEmoji { code: String, emoji: String },
    TeamDelete { code: String },
    TeamList,
    Help,
}

/// Who ran a command, and where.
#[derive(Clone, Copy, Debug)]
pub struct Invocation {
    pub guild_id: u64,
    pub channel_id: u64,
    pub author_id: u64,
    pub can_manage: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Reply {
    pub messages: Vec<String>,
    pub delete_invocation: bool,
}

impl Reply {
    fn text(message: String) -> Reply {
        Reply {
            messages: vec![message],
            delete_invocation: false,
        }
    }

    fn pages(messages: Vec<String>) -> Reply {
        Reply {
            messages,
            delete_invocation: false,
        }
    }

    /// The command's own effect is the visible answer.
    fn silent() -> Reply {
        Reply {
            messages: Vec::new(),
            delete_invocation: true,
        }
    }
}

fn token_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#""([^"]*)"|(\S+)"#).expect("valid token regex"))
}

/// Splits arguments on whitespace, keeping "quoted text" together.
pub fn tokenize(input: &str) -> Vec<String> {
    token_regex()
        .captures_iter(input)
        .filter_map(|caps| caps.get(1).or_else(|| caps.get(2)))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Accepts `3` and `bo3`.
pub fn parse_best_of(raw: &str) -> Result<BestOf> {
    let lower = raw.trim().to_lowercase();
    let digits = lower.strip_prefix("bo").unwrap_or(&lower);
    let value: i64 = digits
        .parse()
        .map_err(|_| Error::Usage("best of must be 1, 3 or 5 (or bo1, bo3, bo5)"))?;
    BestOf::new(value)
}

/// Most match ids one command may name.
const MAX_IDS: usize = 100;

/// Match numbers: single values and inclusive ranges like `3-5`, sorted and
/// without duplicates.
pub fn parse_ids(args: &[String]) -> Result<Vec<i32>> {
    const USAGE: &str = "match ids are numbers or ranges, e.g. 1 3-5";
    const TOO_MANY: &str = "at most 100 match ids at once";
    let mut ids = Vec::new();
    for arg in args {
        match arg.split_once('-') {
            Some((from, to)) => {
                let from: i32 = from.trim().parse().map_err(|_| Error::Usage(USAGE))?;
                let to: i32 = to.trim().parse().map_err(|_| Error::Usage(USAGE))?;
                if from > to {
                    return Err(Error::Usage(USAGE));
                }
                if (to as i64 - from as i64) as usize >= MAX_IDS {
                    return Err(Error::Usage(TOO_MANY));
                }
                ids.extend(from..=to);
            }
            None => ids.push(arg.trim().parse().map_err(|_| Error::Usage(USAGE))?),
        }
        if ids.len() > MAX_IDS {
            return Err(Error::Usage(TOO_MANY));
        }
    }
    if ids.is_empty() {
        return Err(Error::Usage(USAGE));
    }
    ids.sort_unstable();
    ids.dedup();
    Ok(ids)
}

fn joined(args: &[String]) -> Option<String> {
    let text = args.join(" ");
    let text = text.trim();
    (!text.is_empty()).then(|| text.to_string())
}

/// Parses a message. `None` when it is not addressed to the bot.
pub fn parse(prefix: &str, content: &str) -> Option<Result<Command>> {
    let rest = content.trim_start().strip_prefix(prefix)?;
    let tokens = tokenize(rest);
    let group = tokens.first()?.to_lowercase();
    let sub = tokens.get(1).map(|s| s.to_lowercase()).unwrap_or_default();
    let args = tokens.get(2..).unwrap_or(&[]);

    let command = match group.as_str() {
        "tournament" | "tr" => parse_tournament(&sub, args),
        "match" | "m" => parse_match(&sub, args),
        "team" | "tm" => parse_team(&sub, args),
        "help" => Ok(Command::Help),
        _ => return None,
    };
    Some(command)
}

fn parse_tournament(sub: &str, args: &[String]) -> Result<Command> {
    match sub {
        "start" | "s" => joined(args)
            .map(|name_or_link| Command::TournamentStart { name_or_link })
            .ok_or(Error::Usage("tournament start <name or Leaguepedia link>")),
        "end" | "e" => Ok(Command::TournamentEnd),
        "info" | "i" => Ok(Command::TournamentInfo { name: joined(args) }),
        "setupdates" => joined(args)
            .map(|name| Command::TournamentSetUpdates { name })
            .ok_or(Error::Usage("tournament setupdates <name>")),
        "list" | "l" | "ls" => Ok(Command::TournamentList),
        _ => Ok(Command::Help),
    }
}

fn parse_match(sub: &str, args: &[String]) -> Result<Command> {
    match sub {
        "start" | "s" => {
            const USAGE: &str = "match start <name> <team1 code> <team2 code> <best of>";
            if args.len() < 4 {
                return Err(Error::Usage(USAGE));
            }
            let n = args.len();
            let name = joined(&args[..n - 3]).ok_or(Error::Usage(USAGE))?;
            Ok(Command::MatchStart {
                name,
                team1: args[n - 3].clone(),
                team2: args[n - 2].clone(),
                best_of: parse_best_of(&args[n - 1])?,
            })
        }
        "close" | "c" => Ok(Command::MatchClose { ids: parse_ids(args)? }),
        "end" | "e" => Ok(Command::MatchEnd { ids: parse_ids(args)? }),
        "fix" => match parse_ids(args)?.as_slice() {
            [id] => Ok(Command::MatchFix { id: *id }),
            _ => Err(Error::Usage("match fix <id>")),
        },
        "list" | "l" | "ls" => Ok(Command::MatchList { name: joined(args) }),
        _ => Ok(Command::Help),
    }
}

fn parse_team(sub: &str, args: &[String]) -> Result<Command> {
    match sub {
        "new" | "n" => {
            const USAGE: &str = "team new <name> <code> <emoji>";
            if args.len() < 3 {
                return Err(Error::Usage(USAGE));
            }
            let n = args.len();
            Ok(Command::TeamNew {
                name: joined(&args[..n - 2]).ok_or(Error::Usage(USAGE))?,
                code: args[n - 2].clone(),
                emoji: args[n - 1].clone(),
            })
        }
        "edit" | "e" => {
            const USAGE: &str = "team edit name|code|emoji <code> <value>";
            let field = args.first().map(|s| s.to_lowercase()).ok_or(Error::Usage(USAGE))?;
            let code = args.get(1).cloned().ok_or(Error::Usage(USAGE))?;
            let value = joined(args.get(2..).unwrap_or(&[])).ok_or(Error::Usage(USAGE))?;
            match field.as_str() {
                "name" | "n" => Ok(Command::TeamEditName { code, name: value }),
                "code" | "c" => Ok(Command::TeamEditCode { code, new_code: value }),
                "emoji" | "e" => Ok(Command::TeamEditEmoji { code, emoji: value }),
                _ => Err(Error::Usage(USAGE)),
            }
        }
        "delete" | "d" => args
            .first()
            .map(|code| Command::TeamDelete { code: code.clone() })
            .ok_or(Error::Usage("team delete <code>")),
        "list" | "l" | "ls" => Ok(Command::TeamList),
        _ => Ok(Command::Help),
    }
}

impl Command {
    fn requires_manage(&self) -> bool {
        !matches!(
            self,
            Command::TournamentInfo { .. }
                | Command::TournamentList
                | Command::MatchList { .. }
                | Command::TeamList
                | Command::Help
        )
    }
}

pub fn error_text(err: &Error) -> String {
    format!("`ERROR: {}`", err)
}

/// Runs a command; failures come back as an error reply.
pub fn execute(app: &App, inv: &Invocation, command: Command) -> Reply {
    debug!(?command, guild_id = inv.guild_id, channel_id = inv.channel_id, "executing command");
    match run(app, inv, command) {
        Ok(reply) => reply,
        Err(err) => {
            if !err.is_validation() {
                warn!(channel_id = inv.channel_id, "command failed: {}", err);
            }
            Reply::text(error_text(&err))
        }
    }
}

fn run(app: &App, inv: &Invocation, command: Command) -> Result<Reply> {
    if command.requires_manage() && !inv.can_manage {
        return Err(Error::NotPermitted);
    }
    let manager = &app.manager;
    let (guild, channel) = (inv.guild_id, inv.channel_id);

    match command {
        Command::TournamentStart { name_or_link } => {
            if name_or_link.starts_with("http://") || name_or_link.starts_with("https://") {
                let tournament = manager.start_tournament_from_link(&name_or_link, channel, guild)?;
                if let Err(err) = app.reconciler.reconcile_tournament(&tournament, Utc::now()) {
                    warn!(tournament = %tournament.name, "initial sync failed: {}", err);
                }
            } else {
                manager.start_tournament(&name_or_link, channel, guild, None)?;
            }
            Ok(Reply::silent())
        }
        Command::TournamentEnd => {
            let tournament = manager.running_tournament(channel)?;
            manager.end_tournament(&tournament)?;
            Ok(Reply::silent())
        }
        Command::TournamentInfo { name } => {
            Ok(Reply::pages(manager.tournament_info(guild, channel, name.as_deref())?))
        }
        Command::TournamentSetUpdates { name } => {
            let tournament = manager.set_updates_channel(guild, &name, channel)?;
            Ok(Reply::text(format!(
                "Match results for **{}** will be posted in <#{}>.",
                tournament.name, channel
            )))
        }
        Command::TournamentList => Ok(Reply::pages(manager.list_tournaments(guild)?)),
        Command::MatchStart {
            name,
            team1,
            team2,
            best_of,
        } => {
            let tournament = manager.running_tournament(channel)?;
            let team1 = manager.team_by_code(guild, &team1)?;
            let team2 = manager.team_by_code(guild, &team2)?;
            manager.start_match(&tournament, &name, &team1, &team2, best_of, None)?;
            Ok(Reply::silent())
        }
        Command::MatchClose { ids } => {
            let tournament = manager.running_tournament(channel)?;
            manager.close_matches(&tournament, &ids)?;
            Ok(Reply::silent())
        }
        Command::MatchEnd { ids } => {
            let tournament = manager.running_tournament(channel)?;
            let matches = ids
                .iter()
                .map(|id| manager.match_by_sequence(&tournament, *id))
                .collect::<Result<Vec<_>>>()?;
            for mut m in matches {
                if m.status == MatchStatus::Ended {
                    continue;
                }
                if m.status == MatchStatus::Open {
                    m = manager.close_match(&m)?;
                }
                app.dialogs.open(manager, &m, channel)?;
            }
            Ok(Reply::silent())
        }
        Command::MatchFix { id } => {
            if app.manager.settings().owner_id != Some(inv.author_id) {
                return Err(Error::NotPermitted);
            }
            let tournament = manager.running_tournament(channel)?;
            let m = manager.match_by_sequence(&tournament, id)?;
            manager.fix_match(&m)?;
            Ok(Reply::silent())
        }
        Command::MatchList { name } => Ok(Reply::pages(manager.list_matches(guild, channel, name.as_deref())?)),
        Command::TeamNew { name, code, emoji } => {
            let team = manager.create_team(guild, &name, &code, &emoji)?;
            Ok(Reply::text(format!("Added team `{}`", team.code)))
        }
        Command::TeamEditName { code, name } => {
            let old = manager.team_by_code(guild, &code)?;
            let team = manager.edit_team_name(guild, &code, &name)?;
            Ok(Reply::text(format!("Changed name:\n \"{}\" => \"{}\"", old.name, team.name)))
        }
        Command::TeamEditCode { code, new_code } => {
            let old = manager.team_by_code(guild, &code)?;
            let team = manager.edit_team_code(guild, &code, &new_code)?;
            Ok(Reply::text(format!("Changed code:\n \"{}\" => \"{}\"", old.code, team.code)))
        }
        Command::TeamEditEmoji { code, emoji } => {
            let old = manager.team_by_code(guild, &code)?;
            let team = manager.edit_team_emoji(guild, &code, &emoji)?;
            Ok(Reply::text(format!("Changed emoji:\n {} => {}", old.emoji, team.emoji)))
        }
        Command::TeamDelete { code } => {
            let team = manager.delete_team(guild, &code)?;
            Ok(Reply::text(format!("Deleted team {}.", team.name)))
        }
        Command::TeamList => Ok(Reply::pages(manager.list_teams(guild)?)),
        Command::Help => Ok(Reply::text(HELP.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emoji::Emoji;
    use crate::testing::{chat_user, Harness, CHANNEL, GUILD};

    fn parsed(content: &str) -> Result<Command> {
        parse("+", content).expect("addressed to the bot")
    }

    fn app() -> (Harness, App) {
        let h = Harness::new();
        let app = App::from_parts(h.manager.clone(), h.schedule.clone());
        (h, app)
    }

    fn moderator() -> Invocation {
        Invocation {
            guild_id: GUILD,
            channel_id: CHANNEL,
            author_id: 5,
            can_manage: true,
        }
    }

    fn run_text(app: &App, inv: &Invocation, content: &str) -> Reply {
        execute(app, inv, parsed(content).unwrap())
    }

    #[test]
    fn tokenizer_keeps_quotes_together() {
        assert_eq!(tokenize(r#"start "Grand Final" g2 fnc bo5"#), vec!["start", "Grand Final", "g2", "fnc", "bo5"]);
    }

    #[test]
    fn parses_groups_and_aliases() {
        assert!(parse("+", "hello").is_none());
        assert!(parse("+", "+unknown thing").is_none());
        assert_eq!(
            parsed("+m s Grand Final g2 fnc bo3").unwrap(),
            Command::MatchStart {
                name: "Grand Final".into(),
                team1: "g2".into(),
                team2: "fnc".into(),
                best_of: BestOf::Three,
            }
        );
        assert_eq!(parsed("+match close 1 3-5").unwrap(), Command::MatchClose { ids: vec![1, 3, 4, 5] });
        assert_eq!(parsed("+tr i").unwrap(), Command::TournamentInfo { name: None });
        assert_eq!(
            parsed("+tm edit name g2 G2 Esports").unwrap(),
            Command::TeamEditName {
                code: "g2".into(),
                name: "G2 Esports".into()
            }
        );
        assert!(matches!(parsed("+m s R1 g2 fnc 4"), Err(Error::InvalidBestOf(4))));
        assert!(matches!(parsed("+m s R1 g2 fnc"), Err(Error::Usage(_))));
        assert!(matches!(parsed("+m c 5-3"), Err(Error::Usage(_))));
        assert!(matches!(parsed("+m fix 1-2"), Err(Error::Usage(_))));
        assert_eq!(parsed("+m c 3 1 3 2-3").unwrap(), Command::MatchClose { ids: vec![1, 2, 3] });
    }

    #[test]
    fn id_lists_are_bounded() {
        let ids = |args: &[&str]| parse_ids(&args.iter().map(|a| a.to_string()).collect::<Vec<_>>());
        assert_eq!(ids(&["1-100"]).unwrap().len(), 100);
        assert!(matches!(ids(&["1-2000000000"]), Err(Error::Usage(_))));
        assert!(matches!(ids(&["-2147483648-2147483647"]), Err(Error::Usage(_))));
        assert!(matches!(ids(&["1-60", "61-120"]), Err(Error::Usage(_))));
        assert_eq!(ids(&["2", "1", "2"]).unwrap(), vec![1, 2]);
    }

    #[test]
    fn best_of_forms() {
        assert_eq!(parse_best_of("BO5").unwrap(), BestOf::Five);
        assert_eq!(parse_best_of("1").unwrap(), BestOf::One);
        assert!(matches!(parse_best_of("bo2"), Err(Error::InvalidBestOf(2))));
        assert!(matches!(parse_best_of("three"), Err(Error::Usage(_))));
    }

    #[test]
    fn permissions_are_enforced() {
        let (_h, app) = app();
        let member = Invocation {
            can_manage: false,
            ..moderator()
        };
        let reply = run_text(&app, &member, "+tr start Spring Cup");
        assert_eq!(reply.messages, vec!["`ERROR: You do not have permission to do that.`"]);
        let reply = run_text(&app, &member, "+tr list");
        assert_eq!(reply.messages, vec!["There are no tournaments in this server."]);

        run_text(&app, &moderator(), "+tr start Spring Cup");
        let reply = run_text(&app, &moderator(), "+m fix 1");
        assert_eq!(reply.messages, vec!["`ERROR: You do not have permission to do that.`"]);
    }

    #[test]
    fn full_flow_through_commands() {
        let (h, app) = app();
        let inv = moderator();
        h.chat.grant_manage(inv.author_id);

        assert_eq!(run_text(&app, &inv, "+tm n G2 Esports g2 🐺").messages, vec!["Added team `g2`"]);
        run_text(&app, &inv, "+tm n Fnatic fnc 🦊");
        assert!(run_text(&app, &inv, "+tr s Spring Cup").delete_invocation);
        assert!(run_text(&app, &inv, "+m s R1 g2 fnc bo3").messages.is_empty());

        let m = h.store.all_matches()[0].clone();
        h.chat.react(m.message_id, chat_user(1, "amy"), &Emoji::unicode("🐺"));
        h.chat.react(m.message_id, chat_user(1, "amy"), &Emoji::unicode("2️⃣"));

        assert!(run_text(&app, &inv, "+m e 1").messages.is_empty());
        let (dialog_id, _) = h.chat.messages_in(CHANNEL).pop().unwrap();
        let mod_user = chat_user(inv.author_id, "mod");
        h.chat.react(dialog_id, mod_user.clone(), &Emoji::unicode("🐺"));
        h.chat.react(dialog_id, mod_user.clone(), &Emoji::unicode("2️⃣"));
        h.chat.react(dialog_id, mod_user, &Emoji::confirm());
        app.handle_reaction(Some(GUILD), CHANNEL, dialog_id, inv.author_id, &Emoji::confirm());

        let reply = run_text(&app, &inv, "+tr info");
        assert!(reply.messages.concat().contains("amy  3 points"));
        assert_eq!(run_text(&app, &inv, "+tr end").messages, Vec::<String>::new());
        let reply = run_text(&app, &inv, "+m s R2 g2 fnc 1");
        assert_eq!(reply.messages, vec!["`ERROR: There is no running tournament in this channel.`"]);
    }
}
