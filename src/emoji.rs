use std::fmt;
use std::hash::{Hash, Hasher};
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;

/// Keycap symbols used for the "amount of games" reactions, indexed by `games - 1`.
pub const GAMES_SYMBOLS: [&str; 5] = ["1️⃣", "2️⃣", "3️⃣", "4️⃣", "5️⃣"];

/// Reaction that confirms an end-match dialog.
pub const CONFIRM_SYMBOL: &str = "✅";

const VARIATION_SELECTOR: char = '\u{fe0f}';

/// A reaction symbol: either a guild emoji or a plain unicode emoji.
///
/// Custom emoji compare by id only, since names can be edited after the fact.
/// Unicode emoji compare with variation selectors stripped, because Discord
/// reports keycaps both with and without them.
#[derive(Clone, Debug)]
pub enum Emoji {
    Custom { id: u64, name: String, animated: bool },
    Unicode(String),
}

fn custom_emoji_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^<(a?):([^:\s]+):(\d+)>$").expect("valid emoji regex"))
}

impl Emoji {
    pub fn unicode(symbol: &str) -> Emoji {
        Emoji::Unicode(symbol.to_string())
    }

    pub fn confirm() -> Emoji {
        Emoji::unicode(CONFIRM_SYMBOL)
    }

    /// Parses either `<:name:id>` / `<a:name:id>` or a non-ASCII symbol without whitespace.
    pub fn parse(raw: &str) -> Option<Emoji> {
        let raw = raw.trim();
        if let Some(caps) = custom_emoji_regex().captures(raw) {
            let id = caps[3].parse().ok()?;
            return Some(Emoji::Custom {
                id,
                name: caps[2].to_string(),
                animated: &caps[1] == "a",
            });
        }
        if raw.is_empty() || raw.is_ascii() || raw.chars().any(char::is_whitespace) {
            return None;
        }
        Some(Emoji::Unicode(raw.to_string()))
    }

    pub fn custom_id(&self) -> Option<u64> {
        match self {
            Emoji::Custom { id, .. } => Some(*id),
            Emoji::Unicode(_) => None,
        }
    }

    fn normalized_unicode(symbol: &str) -> String {
        symbol.chars().filter(|c| *c != VARIATION_SELECTOR).collect()
    }
}

impl PartialEq for Emoji {
    fn eq(&self, other: &Emoji) -> bool {
        match (self, other) {
            (Emoji::Custom { id: a, .. }, Emoji::Custom { id: b, .. }) => a == b,
            (Emoji::Unicode(a), Emoji::Unicode(b)) => {
                Emoji::normalized_unicode(a) == Emoji::normalized_unicode(b)
            }
            _ => false,
        }
    }
}

impl Eq for Emoji {}

impl Hash for Emoji {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Emoji::Custom { id, .. } => {
                0u8.hash(state);
                id.hash(state);
            }
            Emoji::Unicode(symbol) => {
                1u8.hash(state);
                Emoji::normalized_unicode(symbol).hash(state);
            }
        }
    }
}

impl fmt::Display for Emoji {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Emoji::Custom {
                id,
                name,
                animated: true,
            } => write!(f, "<a:{}:{}>", name, id),
            Emoji::Custom { id, name, .. } => write!(f, "<:{}:{}>", name, id),
            Emoji::Unicode(symbol) => f.write_str(symbol),
        }
    }
}

impl FromStr for Emoji {
    type Err = String;

    fn from_str(s: &str) -> Result<Emoji, String> {
        Emoji::parse(s).ok_or_else(|| s.to_string())
    }
}
